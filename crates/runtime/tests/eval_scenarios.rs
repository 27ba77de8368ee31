//! End-to-end evaluator scenarios: enfix ordering, deferred operators,
//! invisibles, throw propagation, and stack balance across evaluations.

use sigil_runtime::{Interp, InterpConfig, Kind};

fn interp() -> Interp {
    Interp::new(InterpConfig::default())
}

#[test]
fn test_no_precedence_left_to_right() {
    let mut i = interp();
    // (1 + 2) * 3, never 1 + (2 * 3).
    assert_eq!(i.do_source("1 + 2 * 3").unwrap().as_integer(), Some(9));
    assert_eq!(i.do_source("10 - 2 - 3").unwrap().as_integer(), Some(5));
}

#[test]
fn test_enfix_deferred_else() {
    let mut i = interp();
    assert_eq!(
        i.do_source("if false [10] else [20]").unwrap().as_integer(),
        Some(20)
    );
    assert_eq!(
        i.do_source("if true [10] else [20]").unwrap().as_integer(),
        Some(10)
    );
}

#[test]
fn test_invisibles_preserve_expression() {
    let mut i = interp();
    // The comment vanishes between the operands.
    assert_eq!(
        i.do_source("1 + comment \"x\" 2").unwrap().as_integer(),
        Some(3)
    );
    // With no right-hand side left, the operator reports a missing
    // argument, same as `do [1 +]`.
    let err = i.do_source("1 + comment \"x\"").unwrap_err();
    assert!(err.message().contains("missing"), "got: {}", err.message());
    let err2 = i.do_source("1 +").unwrap_err();
    assert!(err2.message().contains("missing"), "got: {}", err2.message());
}

#[test]
fn test_throw_propagation_stops_loop() {
    let mut i = interp();
    let out = i.do_source("catch [loop 10 [throw 'done]]").unwrap();
    assert_eq!(out.kind(), Kind::Word);
    assert_eq!(i.mold_value(&out), "done");

    // The loop really stopped at the first iteration.
    let out = i
        .do_source("n: 0 catch [loop 10 [n: n + 1 throw 'done]] n")
        .unwrap();
    assert_eq!(out.as_integer(), Some(1));
}

#[test]
fn test_throw_unwinds_to_matching_catcher() {
    let mut i = interp();
    // The inner catch consumes the throw; no intermediate frame sees it.
    let err = i.do_source("1 + catch [throw 'x]").unwrap_err();
    // The word 'x reached the addition, proving the throw stopped at the
    // inner catch rather than unwinding further.
    assert!(err.message().contains("does not allow"), "got: {}", err.message());
}

#[test]
fn test_uncaught_throw_is_no_catch_error() {
    let mut i = interp();
    let err = i.do_source("throw 'loose").unwrap_err();
    assert!(err.message().contains("no CATCH"), "got: {}", err.message());
}

#[test]
fn test_also_returns_left() {
    let mut i = interp();
    let out = i.do_source("x: 0 1 + 1 also [x: 9] + 1").unwrap();
    // also yields its left (2), then + 1.
    assert_eq!(out.as_integer(), Some(3));
    assert_eq!(i.user_get("x").unwrap().as_integer(), Some(9));
}

#[test]
fn test_get_word_fetches_action_without_invoking() {
    let mut i = interp();
    let out = i.do_source(":add").unwrap();
    assert_eq!(out.kind(), Kind::Action);
}

#[test]
fn test_refinement_invocation_through_path() {
    let mut i = interp();
    let out = i
        .do_source("f: func [a /double] [either double [a * 2] [a]] f/double 21")
        .unwrap();
    assert_eq!(out.as_integer(), Some(42));
    let out = i.do_source("f 21").unwrap();
    assert_eq!(out.as_integer(), Some(21));
}

#[test]
fn test_halt_raises_at_next_step() {
    let mut i = interp();
    i.request_halt();
    let err = i.do_source("1 + 1").unwrap_err();
    assert!(err.kind.is_halt());
    // Afterwards the interpreter keeps working.
    assert_eq!(i.do_source("1 + 1").unwrap().as_integer(), Some(2));
}

#[test]
fn test_recursion_depth_is_bounded() {
    let mut i = Interp::new(InterpConfig::new().with_level_limit(48));
    let err = i.do_source("f: func [] [f] f").unwrap_err();
    assert!(err.message().contains("stack overflow"), "got: {}", err.message());
}

#[test]
fn test_balance_survives_many_evaluations() {
    let mut i = interp();
    for _ in 0..50 {
        let _ = i.do_source("x: [1 2 3] either true [x/2] [x/3]");
        let _ = i.do_source("trap [fail \"expected\"]");
    }
    // shutdown asserts level/call/data-stack balance in debug builds.
    let stats = i.shutdown();
    assert!(stats.live_nodes > 0);
}

#[test]
fn test_script_loaded_from_a_file() {
    use std::io::Write;
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "total: 0 loop 5 [total: total + 2] total").unwrap();
    let source = std::fs::read_to_string(file.path()).unwrap();
    let mut i = interp();
    assert_eq!(i.do_source(&source).unwrap().as_integer(), Some(10));
}

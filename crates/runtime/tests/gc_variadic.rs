//! Collector behavior under live evaluation: variadic feed reification
//! mid-collection, root handles, idempotent back-to-back cycles.

use sigil_core::Cell;
use sigil_runtime::{Interp, InterpConfig, Kind, VaItem};

fn interp() -> Interp {
    Interp::new(InterpConfig::default())
}

#[test]
fn test_recycle_mid_variadic_preserves_pending_items() {
    let mut i = interp();
    // RECYCLE runs while the feed still has unscanned text and an
    // unspliced cell pending; reification must not lose either.
    let out = i
        .eval_variadic(
            vec![
                VaItem::Text("recycle add 1".to_string()),
                VaItem::Cell(Cell::integer(2)),
            ],
            0,
        )
        .unwrap();
    assert_eq!(out.as_integer(), Some(3));
    assert!(i.stats().gc_cycles >= 1);
}

#[test]
fn test_recycle_mid_variadic_with_open_bracket() {
    let mut i = interp();
    let out = i
        .eval_variadic(
            vec![
                VaItem::Text("recycle [1".to_string()),
                VaItem::Cell(Cell::integer(2)),
                VaItem::Text("3]".to_string()),
            ],
            0,
        )
        .unwrap();
    assert_eq!(out.kind(), Kind::Block);
    assert_eq!(i.mold_value(&out), "[1 2 3]");
}

#[test]
fn test_second_recycle_frees_zero() {
    let mut i = interp();
    i.do_source("loop 20 [elide mold [deep [values here]]]").unwrap();
    i.recycle();
    assert_eq!(i.recycle(), 0);
}

#[test]
fn test_ballast_triggers_automatic_collection() {
    let mut i = Interp::new(InterpConfig::new().with_gc_ballast(64));
    i.do_source("loop 200 [elide mold [1 2 3]]").unwrap();
    assert!(i.stats().gc_cycles >= 1, "ballast should have forced a cycle");
}

#[test]
fn test_user_variables_survive_many_cycles() {
    let mut i = interp();
    i.do_source("keep: [alpha \"beta\" 3 [gamma]]").unwrap();
    for _ in 0..5 {
        i.do_source("loop 10 [elide mold [junk junk junk]]").unwrap();
        i.recycle();
    }
    let kept = i.user_get("keep").unwrap();
    assert_eq!(i.mold_value(&kept), "[alpha \"beta\" 3 [gamma]]");
}

#[test]
fn test_signal_requested_collection_runs_at_step() {
    let mut i = interp();
    i.request_recycle();
    i.do_source("1 + 1").unwrap();
    assert!(i.stats().gc_cycles >= 1);
}

#[test]
fn test_handle_survives_release_frees() {
    let mut i = interp();
    let v = i.do_source("[rooted block]").unwrap();
    let handle = i.alloc_handle(v);
    i.recycle();
    assert_eq!(i.mold_value(&i.handle_value(&handle)), "[rooted block]");
    let before = i.stats().live_nodes;
    i.release(handle);
    i.recycle();
    assert!(i.stats().live_nodes < before);
}

#[test]
fn test_collection_with_tracing_enabled() {
    // Collection statistics go through tracing; make sure a cycle runs
    // cleanly with a subscriber installed.
    let _ = tracing_subscriber::fmt()
        .with_env_filter("sigil_runtime=debug")
        .try_init();
    let mut i = interp();
    i.do_source("loop 5 [elide mold [a b c]]").unwrap();
    assert!(i.recycle() > 0);
}

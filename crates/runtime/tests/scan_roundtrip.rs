//! Scanner round trips and error reporting: `load (mold x)` equals `x`
//! for every literal kind, path promotion, construct syntax, the header
//! probe, and relaxed-mode error capture.

use sigil_core::values_equal;
use sigil_runtime::{Interp, InterpConfig, Kind, scan_header};

fn interp() -> Interp {
    Interp::new(InterpConfig::default())
}

/// First value of a loaded block.
fn first_of(i: &Interp, block: &sigil_core::Cell) -> sigil_core::Cell {
    let node = block.series_node().expect("load returns a block");
    i.heap().cell_at(node, 0)
}

#[test]
fn test_load_mold_round_trip() {
    let sources = [
        "42",
        "-17",
        "3.25",
        "1.5e10",
        "10%",
        "$12.5",
        "#\"a\"",
        "#\"^/\"",
        "12:30:05",
        "31-Dec-1999",
        "640x480",
        "1.2.3",
        "\"plain text\"",
        "{brace ^{nested^} text}",
        "%some/file.txt",
        "me@example.com",
        "http://example.com/path",
        "<tag body>",
        "#{DEADBEEF}",
        "#issue",
        "word",
        "word:",
        ":word",
        "'word",
        "/refine",
        "_",
        "|",
        "#[true]",
        "#[false]",
        "#[void]",
        "#[none]",
        "#[datatype! integer!]",
        "[1 two \"three\" [4 five]]",
        "(1 two)",
        "a/b/c",
        "a/b:",
        ":a/b",
        "'a/b",
        "''double",
    ];
    let mut i = interp();
    for src in sources {
        let loaded = i.load(src).unwrap_or_else(|e| panic!("{src}: {}", e.message()));
        let value = first_of(&i, &loaded);
        let molded = i.mold_value(&value);
        let reloaded = i
            .load(&molded)
            .unwrap_or_else(|e| panic!("{molded}: {}", e.message()));
        let value2 = first_of(&i, &reloaded);
        assert!(
            values_equal(i.heap(), &value, &value2, true),
            "round trip broke: {src} -> {molded} -> {}",
            i.mold_value(&value2)
        );
    }
}

#[test]
fn test_empty_input_is_empty_block() {
    let mut i = interp();
    let loaded = i.load("").unwrap();
    let node = loaded.series_node().unwrap();
    assert_eq!(i.heap().array(node).len(), 0);
    let loaded = i.load("  ; only a comment\n").unwrap();
    assert_eq!(i.heap().array(loaded.series_node().unwrap()).len(), 0);
}

#[test]
fn test_path_promotion_from_get_word_head() {
    let mut i = interp();
    let loaded = i.load(":a/b/c").unwrap();
    let path = first_of(&i, &loaded);
    assert_eq!(path.kind(), Kind::GetPath);
    let node = path.series_node().unwrap();
    let parts = i.heap().array(node).to_vec();
    assert_eq!(parts.len(), 3);
    // Every element, including the stolen head, is a plain WORD!.
    for part in parts {
        assert_eq!(part.kind(), Kind::Word);
    }
}

#[test]
fn test_set_path_and_lit_path_promotion() {
    let mut i = interp();
    let loaded = i.load("a/b: 'c/d").unwrap();
    let node = loaded.series_node().unwrap();
    assert_eq!(i.heap().cell_at(node, 0).kind(), Kind::SetPath);
    assert_eq!(i.heap().cell_at(node, 1).kind(), Kind::LitPath);
}

#[test]
fn test_newline_markers_round_trip() {
    let mut i = interp();
    let loaded = i.load("[1 2\n3 4]").unwrap();
    let molded = i.mold_value(&first_of(&i, &loaded));
    assert_eq!(molded, "[1 2\n3 4]");
}

#[test]
fn test_missing_close_reports_opener_line() {
    let mut i = interp();
    let err = i.load("; leading comment\n[\n  1 2\n").unwrap_err();
    let text = err.message();
    assert!(text.contains(']'), "got: {text}");
    assert!(text.contains("line 2"), "got: {text}");
}

#[test]
fn test_mismatched_close_names_both() {
    let mut i = interp();
    let err = i.load("(1 2]").unwrap_err();
    let text = err.message();
    assert!(text.contains('('), "got: {text}");
    assert!(text.contains(']'), "got: {text}");
}

#[test]
fn test_syntax_error_carries_line_text() {
    let mut i = interp();
    let err = i.load("good\n1:2:3:4 bad\n").unwrap_err();
    match err.kind {
        sigil_runtime::ErrorKind::Syntax { line, ref text, .. } => {
            assert_eq!(line, 2);
            assert!(text.contains("1:2:3:4"), "line text: {text}");
        }
        other => panic!("expected a syntax error, got {other:?}"),
    }
}

#[test]
fn test_relaxed_scan_emits_error_values() {
    let mut i = Interp::new(InterpConfig::new().with_relaxed_scan(true));
    let loaded = i.load("1 3x 4").unwrap();
    let node = loaded.series_node().unwrap();
    let cells = i.heap().array(node).to_vec();
    assert_eq!(cells.len(), 3);
    assert_eq!(cells[0].kind(), Kind::Integer);
    assert_eq!(cells[1].kind(), Kind::Error);
    assert_eq!(cells[2].as_integer(), Some(4));
}

#[test]
fn test_string_escapes_decode() {
    let mut i = interp();
    let out = i.do_source(r#""a^/b^-c^(41)^(tab)""#).unwrap();
    let node = out.series_node().unwrap();
    assert_eq!(i.heap().series(node).text_str(), "a\nb\tcA\t");
}

#[test]
fn test_crlf_normalizes_inside_braces() {
    let mut i = interp();
    let out = i.do_source("{a\r\nb}").unwrap();
    let node = out.series_node().unwrap();
    assert_eq!(i.heap().series(node).text_str(), "a\nb");
}

#[test]
fn test_newline_illegal_in_quoted_string() {
    let mut i = interp();
    assert!(i.load("\"a\nb\"").is_err());
}

#[test]
fn test_construct_length_two_dispatch() {
    let mut i = interp();
    let loaded = i.load("#[typeset! [integer! word!]]").unwrap();
    let ts = first_of(&i, &loaded);
    assert_eq!(ts.kind(), Kind::Typeset);
    let bits = ts.typeset_bits().unwrap();
    assert!(bits & Kind::Integer.bit() != 0);
    assert!(bits & Kind::Word.bit() != 0);
    assert!(bits & Kind::Text.bit() == 0);
}

#[test]
fn test_header_probe() {
    assert_eq!(scan_header("REBOL [Title: \"x\"] 1 2"), 1);
    assert_eq!(scan_header("; comment\nREBOL [\n]"), 1);
    assert_eq!(scan_header("[REBOL [Title: \"x\"]]"), -1);
    assert_eq!(scan_header("1 2 3"), 0);
    assert_eq!(scan_header(""), 0);
}

#[test]
fn test_get_group_and_set_group_scan() {
    let mut i = interp();
    let loaded = i.load(":(a b) (c):").unwrap();
    let node = loaded.series_node().unwrap();
    assert_eq!(i.heap().cell_at(node, 0).kind(), Kind::GetGroup);
    assert_eq!(i.heap().cell_at(node, 1).kind(), Kind::SetGroup);
}

//! Mold: Value Notation Writer
//!
//! Serializes values back to source notation. For every kind the scanner
//! can produce, `load (mold value)` yields an equal value (whitespace
//! aside). Reference kinds with no literal notation (objects, frames,
//! actions) get a readable display form instead.
//!
//! The interpreter shares one [`MoldBuffer`]; operations record a mark
//! and unwind to it on failure so the buffer stays balanced across every
//! evaluation step.

use crate::cell::{Cell, Kind, Payload};
use crate::heap::Heap;
use crate::node::NodeId;
use crate::series::SeriesFlags;
use crate::symbol::SymbolTable;

/// Shared, balance-checked text buffer.
#[derive(Debug, Default)]
pub struct MoldBuffer {
    buf: String,
}

impl MoldBuffer {
    pub fn new() -> Self {
        MoldBuffer::default()
    }

    pub fn mark(&self) -> usize {
        self.buf.len()
    }

    pub fn unwind(&mut self, mark: usize) {
        self.buf.truncate(mark);
    }

    pub fn push_str(&mut self, s: &str) {
        self.buf.push_str(s);
    }

    /// Take the text above `mark`, restoring the buffer to it.
    pub fn take_from(&mut self, mark: usize) -> String {
        let tail = self.buf[mark..].to_string();
        self.buf.truncate(mark);
        tail
    }

    pub fn is_balanced_with(&self, mark: usize) -> bool {
        self.buf.len() == mark
    }
}

const MONTH_NAMES: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Month abbreviation -> 1-based month number (scanner's inverse).
pub fn month_number(name: &str) -> Option<u8> {
    MONTH_NAMES
        .iter()
        .position(|m| m.eq_ignore_ascii_case(name))
        .map(|i| i as u8 + 1)
}

/// Format a number the way pair/tuple/percent components print: integral
/// values without a decimal point.
fn push_num(out: &mut String, f: f64) {
    if f == f.trunc() && f.abs() < 1e15 {
        out.push_str(&format!("{}", f as i64));
    } else {
        out.push_str(&format!("{f:?}"));
    }
}

fn push_char_escaped(out: &mut String, ch: char, in_braces: bool) {
    match ch {
        '^' => out.push_str("^^"),
        '\n' if in_braces => out.push('\n'),
        '\n' => out.push_str("^/"),
        '\t' => out.push_str("^-"),
        '"' if !in_braces => out.push_str("^\""),
        '{' if in_braces => out.push_str("^{"),
        '}' if in_braces => out.push_str("^}"),
        '\u{7f}' => out.push_str("^~"),
        c if (c as u32) < 0x20 => out.push_str(&format!("^({:02X})", c as u32)),
        c => out.push(c),
    }
}

fn push_text_literal(out: &mut String, s: &str) {
    let braced = s.contains('\n') || s.contains('"');
    if braced {
        out.push('{');
        for ch in s.chars() {
            push_char_escaped(out, ch, true);
        }
        out.push('}');
    } else {
        out.push('"');
        for ch in s.chars() {
            push_char_escaped(out, ch, false);
        }
        out.push('"');
    }
}

/// Mold `cell` to a fresh string.
pub fn mold_cell(heap: &Heap, syms: &SymbolTable, cell: &Cell) -> String {
    let mut out = String::new();
    mold_into(heap, syms, &mut out, cell, 0, usize::MAX);
    out
}

/// Mold with a nesting limit; arrays deeper than `max_depth` collapse to
/// an ellipsis word.
pub fn mold_cell_limited(
    heap: &Heap,
    syms: &SymbolTable,
    cell: &Cell,
    max_depth: usize,
) -> String {
    let mut out = String::new();
    mold_into(heap, syms, &mut out, cell, 0, max_depth);
    out
}

fn mold_array_contents(
    heap: &Heap,
    syms: &SymbolTable,
    out: &mut String,
    node: NodeId,
    index: usize,
    depth: usize,
    max_depth: usize,
    sep: char,
) {
    let len = heap.array_len(node);
    for i in index..len {
        let item = heap.cell_at(node, i);
        if i > index {
            if item.flags.contains(crate::cell::CellFlags::NEWLINE_BEFORE) {
                out.push('\n');
            } else {
                out.push(sep);
            }
        }
        mold_into(heap, syms, out, &item, depth, max_depth);
    }
    if heap.flags(node).contains(SeriesFlags::NEWLINE_AT_TAIL) && len > index {
        out.push('\n');
    }
}

fn mold_path(
    heap: &Heap,
    syms: &SymbolTable,
    out: &mut String,
    node: NodeId,
    index: usize,
    depth: usize,
    max_depth: usize,
) {
    let len = heap.array_len(node);
    for i in index..len {
        if i > index {
            out.push('/');
        }
        let item = heap.cell_at(node, i);
        if item.kind() == Kind::Blank {
            continue; // a blank path segment molds as the bare slash
        }
        mold_into(heap, syms, out, &item, depth, max_depth);
    }
}

fn mold_into(
    heap: &Heap,
    syms: &SymbolTable,
    out: &mut String,
    cell: &Cell,
    depth: usize,
    max_depth: usize,
) {
    for _ in 0..cell.quotes() {
        out.push('\'');
    }
    let kind = cell.kind();

    if kind.is_array() && depth >= max_depth {
        out.push_str("...");
        return;
    }

    match kind {
        Kind::Nulled => {} // no notation; never inside arrays
        Kind::Void => out.push_str("#[void]"),
        Kind::Blank => out.push('_'),
        Kind::Bar => out.push('|'),
        Kind::LitBar => out.push_str("'|"),
        Kind::Logic => out.push_str(if cell.as_logic() == Some(true) {
            "#[true]"
        } else {
            "#[false]"
        }),
        Kind::Integer => {
            if let Some(i) = cell.as_integer() {
                out.push_str(&i.to_string());
            }
        }
        Kind::Decimal => {
            if let Some(d) = cell.as_decimal() {
                out.push_str(&format!("{d:?}"));
            }
        }
        Kind::Percent => {
            if let Some(d) = cell.as_decimal() {
                push_num(out, d);
                out.push('%');
            }
        }
        Kind::Money => {
            if let Some(d) = cell.as_decimal() {
                out.push('$');
                out.push_str(&format!("{d:?}"));
            }
        }
        Kind::Char => {
            if let Some(c) = cell.as_char() {
                out.push_str("#\"");
                push_char_escaped(out, c, false);
                out.push('"');
            }
        }
        Kind::Pair => {
            if let Payload::Pair { x, y } = *cell.payload() {
                push_num(out, x);
                out.push('x');
                push_num(out, y);
            }
        }
        Kind::Tuple => {
            if let Payload::Tuple { len, bytes } = *cell.payload() {
                for (i, b) in bytes[..len as usize].iter().enumerate() {
                    if i > 0 {
                        out.push('.');
                    }
                    out.push_str(&b.to_string());
                }
            }
        }
        Kind::Time => {
            if let Payload::Time { nanos } = *cell.payload() {
                let neg = nanos < 0;
                let mut n = nanos.unsigned_abs();
                if neg {
                    out.push('-');
                }
                let hours = n / 3_600_000_000_000;
                n %= 3_600_000_000_000;
                let minutes = n / 60_000_000_000;
                n %= 60_000_000_000;
                let seconds = n / 1_000_000_000;
                let frac = n % 1_000_000_000;
                out.push_str(&format!("{hours}:{minutes:02}:{seconds:02}"));
                if frac != 0 {
                    let f = format!("{:09}", frac);
                    out.push('.');
                    out.push_str(f.trim_end_matches('0'));
                }
            }
        }
        Kind::Date => {
            if let Payload::Date { year, month, day } = *cell.payload() {
                let name = MONTH_NAMES
                    .get((month as usize).saturating_sub(1))
                    .unwrap_or(&"Jan");
                out.push_str(&format!("{day}-{name}-{year}"));
            }
        }
        Kind::Word => out.push_str(word_text(syms, cell)),
        Kind::SetWord => {
            out.push_str(word_text(syms, cell));
            out.push(':');
        }
        Kind::GetWord => {
            out.push(':');
            out.push_str(word_text(syms, cell));
        }
        Kind::LitWord => {
            out.push('\'');
            out.push_str(word_text(syms, cell));
        }
        Kind::Refinement => {
            out.push('/');
            out.push_str(word_text(syms, cell));
        }
        Kind::Issue => {
            out.push('#');
            out.push_str(series_text(heap, cell));
        }
        Kind::Text => push_text_literal(out, series_text(heap, cell)),
        Kind::File => {
            out.push('%');
            for ch in series_text(heap, cell).chars() {
                match ch {
                    ' ' => out.push_str("%20"),
                    c => out.push(c),
                }
            }
        }
        Kind::Email | Kind::Url => out.push_str(series_text(heap, cell)),
        Kind::Tag => {
            out.push('<');
            out.push_str(series_text(heap, cell));
            out.push('>');
        }
        Kind::Binary => {
            out.push_str("#{");
            if let Some(node) = cell.series_node() {
                let index = cell.series_index().unwrap_or(0);
                let bytes = heap.series(node).bytes();
                for b in bytes.iter().skip(index) {
                    out.push_str(&format!("{b:02X}"));
                }
            }
            out.push('}');
        }
        Kind::Bitset => {
            out.push_str("make bitset! #{");
            if let Some(node) = cell.series_node() {
                for b in heap.series(node).bytes() {
                    out.push_str(&format!("{b:02X}"));
                }
            }
            out.push('}');
        }
        Kind::Block => {
            out.push('[');
            if let Some(node) = cell.series_node() {
                mold_array_contents(
                    heap,
                    syms,
                    out,
                    node,
                    cell.series_index().unwrap_or(0),
                    depth + 1,
                    max_depth,
                    ' ',
                );
            }
            out.push(']');
        }
        Kind::Group | Kind::GetGroup | Kind::SetGroup => {
            if kind == Kind::GetGroup {
                out.push(':');
            }
            out.push('(');
            if let Some(node) = cell.series_node() {
                mold_array_contents(
                    heap,
                    syms,
                    out,
                    node,
                    cell.series_index().unwrap_or(0),
                    depth + 1,
                    max_depth,
                    ' ',
                );
            }
            out.push(')');
            if kind == Kind::SetGroup {
                out.push(':');
            }
        }
        Kind::Path | Kind::SetPath | Kind::GetPath | Kind::LitPath => {
            match kind {
                Kind::GetPath => out.push(':'),
                Kind::LitPath => out.push('\''),
                _ => {}
            }
            if let Some(node) = cell.series_node() {
                mold_path(
                    heap,
                    syms,
                    out,
                    node,
                    cell.series_index().unwrap_or(0),
                    depth + 1,
                    max_depth,
                );
            }
            if kind == Kind::SetPath {
                out.push(':');
            }
        }
        Kind::Datatype => {
            out.push_str("#[datatype! ");
            out.push_str(cell.datatype_kind().map(|k| k.name()).unwrap_or("?"));
            out.push(']');
        }
        Kind::Typeset => {
            out.push_str("#[typeset! [");
            if let Some(bits) = cell.typeset_bits() {
                let mut first = true;
                for k in 0..crate::cell::KIND_MAX {
                    if bits & (1 << k) != 0 {
                        if let Ok(kind) = Kind::try_from(k) {
                            if !first {
                                out.push(' ');
                            }
                            out.push_str(kind.name());
                            first = false;
                        }
                    }
                }
            }
            out.push_str("]]");
        }
        Kind::Action => out.push_str("#[action!]"),
        Kind::Context => {
            out.push_str("make object! [");
            if let Some(varlist) = cell.context_varlist() {
                let keylist = crate::context::keylist_of(heap, varlist);
                let len = heap.array_len(varlist);
                for i in 1..len {
                    if i > 1 {
                        out.push(' ');
                    }
                    if let Some(sym) = crate::context::key_symbol(&heap.cell_at(keylist, i)) {
                        out.push_str(syms.text(sym));
                        out.push_str(": ");
                    }
                    let slot = heap.cell_at(varlist, i);
                    mold_into(heap, syms, out, &slot, depth + 1, max_depth.min(depth + 3));
                }
            }
            out.push(']');
        }
        Kind::Frame => out.push_str("#[frame!]"),
        Kind::Error => {
            out.push_str("make error! ");
            if let Some(node) = cell.error_node() {
                if let Some(data) = heap.series(node).error_data() {
                    push_text_literal(out, &data.message());
                }
            }
        }
        Kind::Handle => out.push_str("#[handle!]"),
        Kind::Param => out.push_str("#[param]"),
        Kind::End => out.push_str("#[end]"),
    }
}

fn word_text<'a>(syms: &'a SymbolTable, cell: &Cell) -> &'a str {
    cell.symbol().map(|s| syms.text(s)).unwrap_or("?")
}

fn series_text<'a>(heap: &'a Heap, cell: &Cell) -> &'a str {
    match cell.series_node() {
        Some(node) => {
            let s = heap.series(node).text_str();
            let index = cell.series_index().unwrap_or(0);
            match s.char_indices().nth(index) {
                Some((byte, _)) => &s[byte..],
                None => "",
            }
        }
        None => "",
    }
}

/// Source snippet for error reporting: up to six values around `index`
/// with a marker at the fault point, deep arrays collapsed.
pub fn mold_near(heap: &Heap, syms: &SymbolTable, node: NodeId, index: usize) -> String {
    let len = heap.array_len(node);
    let start = index.saturating_sub(3);
    let stop = (start + 6).min(len);
    let mut out = String::new();
    for i in start..stop {
        if !out.is_empty() {
            out.push(' ');
        }
        if i == index {
            out.push_str("** ");
        }
        let item = heap.cell_at(node, i);
        let mut fragment = String::new();
        mold_into(heap, syms, &mut fragment, &item, 0, 3);
        out.push_str(&fragment);
    }
    if index >= len {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str("** (at tail)");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::SeriesData;

    fn setup() -> (Heap, SymbolTable) {
        (Heap::new(32), SymbolTable::new())
    }

    #[test]
    fn test_scalars() {
        let (heap, syms) = setup();
        assert_eq!(mold_cell(&heap, &syms, &Cell::integer(42)), "42");
        assert_eq!(mold_cell(&heap, &syms, &Cell::decimal(1.5)), "1.5");
        assert_eq!(mold_cell(&heap, &syms, &Cell::blank()), "_");
        assert_eq!(mold_cell(&heap, &syms, &Cell::logic(true)), "#[true]");
        assert_eq!(mold_cell(&heap, &syms, &Cell::percent(10.0)), "10%");
        assert_eq!(mold_cell(&heap, &syms, &Cell::pair(640.0, 480.0)), "640x480");
        assert_eq!(mold_cell(&heap, &syms, &Cell::tuple(&[1, 2, 3])), "1.2.3");
    }

    #[test]
    fn test_words_and_quotes() {
        let (heap, mut syms) = setup();
        let foo = syms.intern("foo");
        assert_eq!(mold_cell(&heap, &syms, &Cell::word(foo)), "foo");
        assert_eq!(mold_cell(&heap, &syms, &Cell::set_word(foo)), "foo:");
        assert_eq!(mold_cell(&heap, &syms, &Cell::get_word(foo)), ":foo");
        assert_eq!(mold_cell(&heap, &syms, &Cell::lit_word(foo)), "'foo");
        assert_eq!(mold_cell(&heap, &syms, &Cell::word(foo).quoted(2)), "''foo");
    }

    #[test]
    fn test_time_and_date() {
        let (heap, syms) = setup();
        let t = Cell::time(5 * 1_000_000_000 + 90 * 60_000_000_000);
        assert_eq!(mold_cell(&heap, &syms, &t), "1:30:05");
        let d = Cell::date(1999, 12, 31);
        assert_eq!(mold_cell(&heap, &syms, &d), "31-Dec-1999");
    }

    #[test]
    fn test_string_forms() {
        let (mut heap, syms) = setup();
        let plain = heap.alloc(SeriesData::Text { string: "abc".into(), chars: 3 });
        assert_eq!(mold_cell(&heap, &syms, &Cell::text(plain)), "\"abc\"");
        let multi = heap.alloc(SeriesData::Text { string: "a\nb".into(), chars: 3 });
        assert_eq!(mold_cell(&heap, &syms, &Cell::text(multi)), "{a\nb}");
    }

    #[test]
    fn test_block_and_binary() {
        let (mut heap, mut syms) = setup();
        let w = syms.intern("x");
        let arr = heap.alloc(SeriesData::Array {
            cells: vec![Cell::integer(1), Cell::word(w)],
        });
        assert_eq!(mold_cell(&heap, &syms, &Cell::block(arr)), "[1 x]");
        let bin = heap.alloc(SeriesData::Binary { bytes: vec![0xde, 0xad], bias: 0 });
        assert_eq!(mold_cell(&heap, &syms, &Cell::binary(bin)), "#{DEAD}");
    }

    #[test]
    fn test_near_marker() {
        let (mut heap, syms) = setup();
        let arr = heap.alloc(SeriesData::Array {
            cells: vec![Cell::integer(1), Cell::integer(2), Cell::integer(3)],
        });
        let near = mold_near(&heap, &syms, arr, 1);
        assert_eq!(near, "1 ** 2 3");
    }
}

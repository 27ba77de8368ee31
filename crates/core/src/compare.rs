//! Value Equality
//!
//! Equality the way the language sees it: numbers compare across
//! INTEGER!/DECIMAL!/PERCENT!, strings fold case unless asked not to,
//! words compare by canon symbol, series compare element-wise from their
//! position to the tail. Quote depths must agree.

use crate::cell::{Cell, Kind, Payload};
use crate::heap::Heap;
use crate::node::NodeId;

/// Numeric view of a cell, when it has one.
fn as_number(cell: &Cell) -> Option<f64> {
    match *cell.payload() {
        Payload::Integer(i) => Some(i as f64),
        Payload::Decimal(d) => Some(d),
        _ => None,
    }
}

fn text_of(heap: &Heap, node: NodeId, index: usize) -> String {
    let s = heap.series(node).text_str();
    s.chars().skip(index).collect()
}

/// Deep equality of two values.
pub fn values_equal(heap: &Heap, a: &Cell, b: &Cell, case_sensitive: bool) -> bool {
    if a.quotes() != b.quotes() {
        return false;
    }
    let (ka, kb) = (a.kind(), b.kind());

    // Cross-kind numeric equivalence.
    if ka != kb {
        if let (Some(x), Some(y)) = (as_number(a), as_number(b)) {
            if (ka == Kind::Integer || ka == Kind::Decimal)
                && (kb == Kind::Integer || kb == Kind::Decimal)
            {
                return x == y;
            }
        }
        return false;
    }

    match ka {
        Kind::Nulled | Kind::Void | Kind::Blank | Kind::Bar | Kind::LitBar | Kind::End => true,
        Kind::Logic => a.as_logic() == b.as_logic(),
        Kind::Integer => a.as_integer() == b.as_integer(),
        Kind::Decimal | Kind::Percent | Kind::Money => a.as_decimal() == b.as_decimal(),
        Kind::Char => match (a.as_char(), b.as_char()) {
            (Some(x), Some(y)) => {
                if case_sensitive {
                    x == y
                } else {
                    x.to_lowercase().eq(y.to_lowercase())
                }
            }
            _ => false,
        },
        Kind::Word | Kind::SetWord | Kind::GetWord | Kind::LitWord | Kind::Refinement => {
            // Canon ids already fold case.
            a.symbol() == b.symbol()
        }
        Kind::Datatype => a.datatype_kind() == b.datatype_kind(),
        Kind::Typeset => a.typeset_bits() == b.typeset_bits(),
        Kind::Pair | Kind::Tuple | Kind::Time | Kind::Date | Kind::Handle => {
            a.payload() == b.payload()
        }
        Kind::Issue | Kind::Text | Kind::File | Kind::Email | Kind::Url | Kind::Tag => {
            let (na, nb) = (a.series_node(), b.series_node());
            match (na, nb) {
                (Some(na), Some(nb)) => {
                    let sa = text_of(heap, na, a.series_index().unwrap_or(0));
                    let sb = text_of(heap, nb, b.series_index().unwrap_or(0));
                    if case_sensitive {
                        sa == sb
                    } else {
                        sa.to_lowercase() == sb.to_lowercase()
                    }
                }
                _ => false,
            }
        }
        Kind::Binary => {
            match (a.series_node(), b.series_node()) {
                (Some(na), Some(nb)) => {
                    let ia = a.series_index().unwrap_or(0);
                    let ib = b.series_index().unwrap_or(0);
                    let ba = heap.series(na).bytes();
                    let bb = heap.series(nb).bytes();
                    ba.get(ia.min(ba.len())..) == bb.get(ib.min(bb.len())..)
                }
                _ => false,
            }
        }
        Kind::Bitset => a.series_node() == b.series_node(),
        k if k.is_array() => {
            match (a.series_node(), b.series_node()) {
                (Some(na), Some(nb)) => {
                    let ia = a.series_index().unwrap_or(0);
                    let ib = b.series_index().unwrap_or(0);
                    if na == nb && ia == ib {
                        return true;
                    }
                    let la = heap.array_len(na).saturating_sub(ia);
                    let lb = heap.array_len(nb).saturating_sub(ib);
                    if la != lb {
                        return false;
                    }
                    for i in 0..la {
                        let ca = heap.cell_at(na, ia + i);
                        let cb = heap.cell_at(nb, ib + i);
                        if !values_equal(heap, &ca, &cb, case_sensitive) {
                            return false;
                        }
                    }
                    true
                }
                _ => false,
            }
        }
        // Identity for the remaining reference kinds.
        Kind::Action => a.action_parts().map(|p| p.0) == b.action_parts().map(|p| p.0),
        Kind::Context | Kind::Frame => a.context_varlist() == b.context_varlist(),
        Kind::Error => a.error_node() == b.error_node(),
        _ => a.payload() == b.payload(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::SeriesData;
    use crate::symbol::SymbolTable;

    #[test]
    fn test_numeric_cross_kind() {
        let heap = Heap::new(4);
        assert!(values_equal(&heap, &Cell::integer(1), &Cell::decimal(1.0), false));
        assert!(!values_equal(&heap, &Cell::integer(1), &Cell::decimal(1.5), false));
    }

    #[test]
    fn test_quote_depth_must_agree() {
        let heap = Heap::new(4);
        let plain = Cell::integer(3);
        let quoted = Cell::integer(3).quoted(1);
        assert!(!values_equal(&heap, &plain, &quoted, false));
    }

    #[test]
    fn test_string_case_folding() {
        let mut heap = Heap::new(4);
        let a = heap.alloc(SeriesData::Text { string: "Hello".into(), chars: 5 });
        let b = heap.alloc(SeriesData::Text { string: "hello".into(), chars: 5 });
        let ca = Cell::text(a);
        let cb = Cell::text(b);
        assert!(values_equal(&heap, &ca, &cb, false));
        assert!(!values_equal(&heap, &ca, &cb, true));
    }

    #[test]
    fn test_array_compare_from_position() {
        let mut heap = Heap::new(8);
        let mut syms = SymbolTable::new();
        let w = syms.intern("x");
        let a = heap.alloc(SeriesData::Array {
            cells: vec![Cell::integer(1), Cell::word(w)],
        });
        let b = heap.alloc(SeriesData::Array {
            cells: vec![Cell::integer(9), Cell::integer(1), Cell::word(w)],
        });
        let ca = Cell::block(a);
        let cb = Cell::block(b).at_index(1);
        assert!(values_equal(&heap, &ca, &cb, false));
    }
}

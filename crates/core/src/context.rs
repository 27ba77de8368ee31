//! Contexts and Varlists
//!
//! A context is an array series whose cell 0 is the archetype value and
//! whose remaining cells are variable slots. The parallel keylist hangs
//! off the varlist's LINK slot: keylist cell `i` names varlist slot `i`
//! for `i >= 1` (both reserve slot 0).
//!
//! Ordinary contexts use WORD! cells as keys. A frame is a context whose
//! keylist is an action's paramlist, so its keys are PARAM cells; the
//! helpers here read the symbol out of either shape.

use crate::cell::{Cell, Kind};
use crate::heap::Heap;
use crate::node::NodeId;
use crate::series::{SeriesData, SeriesFlags};
use crate::symbol::SymbolId;

/// Symbol of a keylist cell (WORD! for contexts, PARAM for frames).
pub fn key_symbol(key: &Cell) -> Option<SymbolId> {
    match key.kind() {
        Kind::Word | Kind::SetWord | Kind::GetWord | Kind::LitWord | Kind::Refinement => {
            key.symbol()
        }
        Kind::Param => key.symbol(),
        _ => None,
    }
}

/// Build an empty context over the given keys. The varlist is unmanaged;
/// manage it once it is reachable from user values.
pub fn make_context(heap: &mut Heap, keys: &[SymbolId]) -> NodeId {
    let mut key_cells = Vec::with_capacity(keys.len() + 1);
    key_cells.push(Cell::blank()); // slot 0 reserved
    key_cells.extend(keys.iter().map(|&s| Cell::word(s)));
    let keylist = heap.alloc(SeriesData::Array { cells: key_cells });

    let mut slots = Vec::with_capacity(keys.len() + 1);
    slots.push(Cell::end()); // patched to the archetype below
    slots.extend(std::iter::repeat_n(Cell::nulled(), keys.len()));
    let varlist = heap.alloc(SeriesData::Array { cells: slots });

    heap.array_mut(varlist)[0] = Cell::context(varlist);
    heap.series_mut(varlist).link = Some(keylist);
    heap.set_flag(varlist, SeriesFlags::LINK_MARK);
    // The keylist is owned by the varlist; same management fate.
    heap.manage(keylist);
    varlist
}

/// The keylist node of a context.
pub fn keylist_of(heap: &Heap, varlist: NodeId) -> NodeId {
    heap.series(varlist)
        .link
        .expect("context varlist without keylist")
}

/// Number of variable slots (archetype excluded).
pub fn context_len(heap: &Heap, varlist: NodeId) -> usize {
    heap.array_len(varlist).saturating_sub(1)
}

/// Slot index (1-based) of `symbol`, if present.
pub fn find_index(heap: &Heap, varlist: NodeId, symbol: SymbolId) -> Option<usize> {
    let keylist = keylist_of(heap, varlist);
    let keys = heap.array(keylist);
    keys.iter()
        .enumerate()
        .skip(1)
        .find(|(_, key)| key_symbol(key) == Some(symbol))
        .map(|(i, _)| i)
}

pub fn slot(heap: &Heap, varlist: NodeId, index: usize) -> Cell {
    debug_assert!(index >= 1, "slot 0 is the archetype");
    heap.cell_at(varlist, index)
}

pub fn set_slot(heap: &mut Heap, varlist: NodeId, index: usize, cell: Cell) {
    debug_assert!(index >= 1, "slot 0 is the archetype");
    let cells = heap.array_mut(varlist);
    cells[index] = cell;
}

/// Append a new variable slot, returning its index. The keylist must not
/// be a paramlist (frames are fixed-shape).
pub fn append_slot(heap: &mut Heap, varlist: NodeId, symbol: SymbolId) -> usize {
    let keylist = keylist_of(heap, varlist);
    debug_assert!(
        heap.array(keylist)
            .get(1)
            .map(|k| k.kind() != Kind::Param)
            .unwrap_or(true),
        "appending to a frame varlist"
    );
    heap.array_mut(keylist).push(Cell::word(symbol));
    heap.array_mut(varlist).push(Cell::nulled());
    heap.array_len(varlist) - 1
}

/// Find `symbol`, appending a slot when absent.
pub fn find_or_append(heap: &mut Heap, varlist: NodeId, symbol: SymbolId) -> usize {
    match find_index(heap, varlist, symbol) {
        Some(i) => i,
        None => append_slot(heap, varlist, symbol),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::SymbolTable;

    #[test]
    fn test_make_and_resolve() {
        let mut heap = Heap::new(16);
        let mut syms = SymbolTable::new();
        let a = syms.intern("a");
        let b = syms.intern("b");
        let ctx = make_context(&mut heap, &[a, b]);

        assert_eq!(context_len(&heap, ctx), 2);
        assert_eq!(find_index(&heap, ctx, a), Some(1));
        assert_eq!(find_index(&heap, ctx, b), Some(2));
        assert!(slot(&heap, ctx, 1).is_nulled());

        set_slot(&mut heap, ctx, 1, Cell::integer(42));
        assert_eq!(slot(&heap, ctx, 1).as_integer(), Some(42));

        // Archetype points back at its own varlist.
        let arche = heap.cell_at(ctx, 0);
        assert_eq!(arche.kind(), Kind::Context);
        assert_eq!(arche.context_varlist(), Some(ctx));
    }

    #[test]
    fn test_find_or_append_grows() {
        let mut heap = Heap::new(16);
        let mut syms = SymbolTable::new();
        let a = syms.intern("a");
        let c = syms.intern("c");
        let ctx = make_context(&mut heap, &[a]);
        let idx = find_or_append(&mut heap, ctx, c);
        assert_eq!(idx, 2);
        assert_eq!(find_index(&heap, ctx, c), Some(2));
        assert_eq!(context_len(&heap, ctx), 2);
    }
}

//! Host API
//!
//! The variadic evaluator entry for embedding hosts: a call is a sequence
//! of [`VaItem`]s — UTF-8 source fragments, spliced cells, quoting
//! instructions — evaluated left to right as one stream. Brackets may
//! open in one fragment and close in another, with cells spliced in
//! between:
//!
//! ```ignore
//! let three = interp.eval_variadic(vec![
//!     VaItem::Text("add 1".into()),
//!     VaItem::Cell(Cell::integer(2)),
//! ], 0)?;
//! ```
//!
//! Handles give host code rooted references that survive collection
//! until released. The byte-buffer allocator hands out a plain mutable
//! byte series that `repossess` turns into a BINARY! value without
//! copying. `rescue` runs host logic under a trap, converting any `fail`
//! into an ERROR! value and re-raising uncaught throws as errors.

use crate::feed::{Feed, VaItem};
use crate::interp::{Abort, Interp, Outcome};
use crate::scanner::ScanSession;
use sigil_core::{Cell, ErrorData, ErrorKind, NodeId, SeriesData, SeriesFlags};

/// A rooted reference to a value, held alive for host code until
/// released. Backed by a singular array node with the ROOT flag.
#[derive(Debug)]
pub struct ValueHandle {
    node: NodeId,
}

impl ValueHandle {
    /// Use the handle as a feed item, releasing it when consumed.
    pub fn consumed(self) -> VaItem {
        VaItem::HandleOnce(self.node)
    }
}

impl Interp {
    /// Evaluate a variadic item stream; `quotes` adds that many quote
    /// levels to every spliced cell.
    pub fn eval_variadic(
        &mut self,
        items: Vec<VaItem>,
        quotes: u8,
    ) -> Result<Cell, ErrorData> {
        let session = ScanSession::new(self.ds.dsp(), false);
        let feed = Feed::variadic(items, quotes, Some(self.user), session);
        let li = match self.push_level(feed) {
            Ok(li) => li,
            Err(abort) => return Err(self.abort_to_error(abort)),
        };
        let result = self.run_to_end(li);
        self.pop_level(li, result.is_err());
        match result {
            Ok(out) => Ok(out),
            Err(abort) => Err(self.abort_to_error(abort)),
        }
    }

    // ----- handles --------------------------------------------------------

    /// Root a value for the host. The handle keeps it (and everything it
    /// references) alive across collections.
    pub fn alloc_handle(&mut self, value: Cell) -> ValueHandle {
        let node = self.heap.alloc_managed(SeriesData::Array { cells: vec![value] });
        self.heap.set_flag(node, SeriesFlags::ROOT);
        ValueHandle { node }
    }

    pub fn handle_value(&self, handle: &ValueHandle) -> Cell {
        self.heap.cell_at(handle.node, 0)
    }

    /// Release a handle; the backing node becomes ordinary garbage.
    pub fn release(&mut self, handle: ValueHandle) {
        self.heap.clear_flag(handle.node, SeriesFlags::ROOT);
    }

    // ----- byte buffers ---------------------------------------------------

    /// Allocate a zeroed, unmanaged byte buffer the host may fill.
    pub fn alloc_bytes(&mut self, len: usize) -> NodeId {
        self.heap.alloc(SeriesData::Binary {
            bytes: vec![0; len],
            bias: 0,
        })
    }

    /// Mutable access to a buffer from [`Interp::alloc_bytes`].
    pub fn buffer_mut(&mut self, node: NodeId) -> &mut Vec<u8> {
        self.heap.series_mut(node).bytes_mut()
    }

    /// Convert an allocated buffer into a BINARY! value without copying;
    /// the series becomes managed.
    pub fn repossess(&mut self, node: NodeId) -> Cell {
        self.heap.manage(node);
        Cell::binary(node)
    }

    // ----- rescue ---------------------------------------------------------

    /// Run host logic under a trap. A `fail` becomes an ERROR! value in
    /// `Err`; an uncaught throw re-raises as a no-catch error; a normal
    /// non-null result is proxied to a fresh handle.
    pub fn rescue<F>(&mut self, body: F) -> Result<Option<ValueHandle>, Cell>
    where
        F: FnOnce(&mut Interp) -> Outcome<Cell>,
    {
        match body(self) {
            Ok(value) if value.is_nulled() || value.is_void() => Ok(None),
            Ok(value) => Ok(Some(self.alloc_handle(value))),
            Err(Abort::Fail(node)) => Err(Cell::error(node)),
            Err(Abort::Throw) => {
                let abort = {
                    let thrown = self.take_thrown();
                    let label = sigil_core::mold_cell(&self.heap, &self.syms, &thrown.label);
                    self.raise(ErrorKind::NoCatch { label })
                };
                match abort {
                    Abort::Fail(node) => Err(Cell::error(node)),
                    Abort::Throw => unreachable!("raise always fails"),
                }
            }
        }
    }

    /// Evaluate source under rescue semantics (host convenience).
    pub fn rescue_source(&mut self, source: &str) -> Result<Option<ValueHandle>, Cell> {
        self.rescue(|interp| {
            let block = interp.scan_source(source)?;
            let user = interp.user;
            interp.do_at(block, 0, Some(user))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InterpConfig;
    use sigil_core::Kind;

    fn interp() -> Interp {
        Interp::new(InterpConfig::default())
    }

    #[test]
    fn test_variadic_text_and_splice() {
        let mut i = interp();
        let out = i
            .eval_variadic(
                vec![
                    VaItem::Text("add 1".to_string()),
                    VaItem::Cell(Cell::integer(2)),
                ],
                0,
            )
            .unwrap();
        assert_eq!(out.as_integer(), Some(3));
    }

    #[test]
    fn test_bracket_spans_fragments() {
        let mut i = interp();
        let out = i
            .eval_variadic(
                vec![
                    VaItem::Text("[1".to_string()),
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
    fn test_splice_is_inert_without_eval() {
        let mut i = interp();
        // A spliced WORD! does not get looked up.
        let sym = i.intern("no-such-word");
        let out = i.eval_variadic(vec![VaItem::Cell(Cell::word(sym))], 0).unwrap();
        assert_eq!(out.kind(), Kind::Word);
    }

    #[test]
    fn test_quote_level_parameter() {
        let mut i = interp();
        let out = i
            .eval_variadic(vec![VaItem::Cell(Cell::integer(7))], 1)
            .unwrap();
        assert_eq!(out.quotes(), 1);
    }

    #[test]
    fn test_handles_root_values() {
        let mut i = interp();
        let block = i.do_source("[1 2 3]").unwrap();
        let handle = i.alloc_handle(block);
        // The handle's referent survives collection even with no other
        // reference.
        i.recycle();
        let value = i.handle_value(&handle);
        assert_eq!(i.mold_value(&value), "[1 2 3]");
        i.release(handle);
    }

    #[test]
    fn test_repossess_buffer() {
        let mut i = interp();
        let buf = i.alloc_bytes(3);
        i.buffer_mut(buf).copy_from_slice(&[0xAA, 0xBB, 0xCC]);
        let bin = i.repossess(buf);
        assert_eq!(i.mold_value(&bin), "#{AABBCC}");
    }

    #[test]
    fn test_rescue_converts_fail() {
        let mut i = interp();
        let err = i.rescue_source("fail \"nope\"").unwrap_err();
        assert_eq!(err.kind(), Kind::Error);
        let data = i.error_data(&err).unwrap();
        assert!(data.message().contains("nope"));
    }

    #[test]
    fn test_rescue_reraises_throws() {
        let mut i = interp();
        let err = i.rescue_source("throw 'loose").unwrap_err();
        let data = i.error_data(&err).unwrap().clone();
        assert!(data.message().contains("no CATCH"), "got: {}", data.message());
    }
}

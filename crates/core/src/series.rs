//! Series Storage
//!
//! A series is a resizable buffer of uniform-width elements behind a heap
//! node: bytes (BINARY!), UTF-8 text with a cached codepoint length
//! (TEXT! and friends), or value cells (any-array, varlists, paramlists).
//! ERROR! storage also lives here so errors are ordinary heap values.
//!
//! Every series carries a flag word and two custom node slots, LINK and
//! MISC, whose meaning belongs to the subsystem that made the series
//! (keylist of a varlist, reuse chains, owners). The collector only marks
//! them when the corresponding needs-mark flag is set.
//!
//! Byte series keep a `bias`: a count of unused prefix bytes, letting
//! pop-from-head and buffer repossession adjust an offset instead of
//! shifting memory.

use crate::cell::Cell;
use crate::error::{ErrorData, ErrorKind};
use crate::node::NodeId;
use crate::symbol::SymbolId;
use bitflags::bitflags;

bitflags! {
    /// Per-node flag word (shared by series and pairing nodes).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SeriesFlags: u16 {
        /// Candidate for garbage collection. Unmanaged nodes live on the
        /// manuals list and must be freed or managed explicitly.
        const MANAGED = 1 << 0;
        /// Reached from the root set during the current mark phase.
        const MARKED = 1 << 1;
        /// API handle root; always treated as reachable.
        const ROOT = 1 << 2;
        /// Storage retired; all access answers with a defined error.
        const INACCESSIBLE = 1 << 3;
        /// A feed is iterating this series; mutation fails.
        const HOLD = 1 << 4;
        /// User-level mutation refused.
        const PROTECTED = 1 << 5;
        /// LINK slot holds a node the collector must mark.
        const LINK_MARK = 1 << 6;
        /// MISC slot holds a node the collector must mark.
        const MISC_MARK = 1 << 7;
        /// Mold a line break before the closing bracket.
        const NEWLINE_AT_TAIL = 1 << 8;
    }
}

/// Typed storage behind a series node.
#[derive(Debug)]
pub enum SeriesData {
    Binary {
        bytes: Vec<u8>,
        /// Unused prefix; live content is `bytes[bias..]`.
        bias: usize,
    },
    Text {
        string: String,
        /// Cached codepoint length of `string`.
        chars: usize,
    },
    Array {
        cells: Vec<Cell>,
    },
    Error(ErrorData),
}

/// A series header: flags, custom slots, provenance, storage.
#[derive(Debug)]
pub struct Series {
    pub flags: SeriesFlags,
    /// Subsystem-owned node slot (e.g. keylist of a varlist).
    pub link: Option<NodeId>,
    /// Subsystem-owned node slot (e.g. a reuse chain).
    pub misc: Option<NodeId>,
    /// Scanner provenance, when known.
    pub file: Option<SymbolId>,
    pub line: u32,
    data: SeriesData,
}

impl Series {
    pub fn new(data: SeriesData) -> Self {
        Series {
            flags: SeriesFlags::empty(),
            link: None,
            misc: None,
            file: None,
            line: 0,
            data,
        }
    }

    pub fn array_with_capacity(capacity: usize) -> Self {
        Series::new(SeriesData::Array {
            cells: Vec::with_capacity(capacity),
        })
    }

    pub fn array_from(cells: Vec<Cell>) -> Self {
        Series::new(SeriesData::Array { cells })
    }

    pub fn text_from(string: String) -> Self {
        let chars = string.chars().count();
        Series::new(SeriesData::Text { string, chars })
    }

    pub fn binary_from(bytes: Vec<u8>) -> Self {
        Series::new(SeriesData::Binary { bytes, bias: 0 })
    }

    pub fn error(data: ErrorData) -> Self {
        Series::new(SeriesData::Error(data))
    }

    #[inline]
    pub fn data(&self) -> &SeriesData {
        &self.data
    }

    /// Element count: cells for arrays, codepoints for text, live bytes
    /// for binaries. Errors report 0.
    pub fn len(&self) -> usize {
        match &self.data {
            SeriesData::Binary { bytes, bias } => bytes.len() - bias,
            SeriesData::Text { chars, .. } => *chars,
            SeriesData::Array { cells } => cells.len(),
            SeriesData::Error(_) => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_array(&self) -> bool {
        matches!(self.data, SeriesData::Array { .. })
    }

    /// Check the access contract before mutation.
    pub fn ensure_mutable(&self) -> Result<(), ErrorKind> {
        if self.flags.contains(SeriesFlags::INACCESSIBLE) {
            return Err(ErrorKind::Inaccessible);
        }
        if self.flags.contains(SeriesFlags::HOLD) {
            return Err(ErrorKind::Held);
        }
        if self.flags.contains(SeriesFlags::PROTECTED) {
            return Err(ErrorKind::Protected);
        }
        Ok(())
    }

    /// Check the access contract before reading.
    pub fn ensure_readable(&self) -> Result<(), ErrorKind> {
        if self.flags.contains(SeriesFlags::INACCESSIBLE) {
            return Err(ErrorKind::Inaccessible);
        }
        Ok(())
    }

    // ----- array access ---------------------------------------------------

    pub fn cells(&self) -> &[Cell] {
        match &self.data {
            SeriesData::Array { cells } => cells,
            _ => &[],
        }
    }

    pub fn cells_mut(&mut self) -> &mut Vec<Cell> {
        match &mut self.data {
            SeriesData::Array { cells } => cells,
            _ => panic!("cells_mut on non-array series"),
        }
    }

    /// Cell at `index`, or a stale END past the tail ("input at end of
    /// array is END for feed consumers").
    pub fn cell_at(&self, index: usize) -> Cell {
        match &self.data {
            SeriesData::Array { cells } => cells.get(index).copied().unwrap_or_else(Cell::end),
            _ => Cell::end(),
        }
    }

    // ----- byte access ----------------------------------------------------

    pub fn bytes(&self) -> &[u8] {
        match &self.data {
            SeriesData::Binary { bytes, bias } => &bytes[*bias..],
            _ => &[],
        }
    }

    pub fn bytes_mut(&mut self) -> &mut Vec<u8> {
        match &mut self.data {
            SeriesData::Binary { bytes, bias } => {
                debug_assert_eq!(*bias, 0, "mutating a biased binary");
                bytes
            }
            _ => panic!("bytes_mut on non-binary series"),
        }
    }

    /// Drop `n` bytes from the head by advancing the bias.
    pub fn pop_head(&mut self, n: usize) {
        if let SeriesData::Binary { bytes, bias } = &mut self.data {
            *bias = (*bias + n).min(bytes.len());
        }
    }

    // ----- text access ----------------------------------------------------

    pub fn text_str(&self) -> &str {
        match &self.data {
            SeriesData::Text { string, .. } => string,
            _ => "",
        }
    }

    /// Codepoint at position `index` (cached length, O(n) seek).
    pub fn char_at(&self, index: usize) -> Option<char> {
        match &self.data {
            SeriesData::Text { string, .. } => string.chars().nth(index),
            _ => None,
        }
    }

    pub fn text_push(&mut self, ch: char) {
        if let SeriesData::Text { string, chars } = &mut self.data {
            string.push(ch);
            *chars += 1;
        }
    }

    pub fn text_push_str(&mut self, s: &str) {
        if let SeriesData::Text { string, chars } = &mut self.data {
            string.push_str(s);
            *chars += s.chars().count();
        }
    }

    /// Replace the codepoint range `[start, start+span)` with `insert`.
    /// Used by PARSE's REMOVE/INSERT/CHANGE on string input.
    pub fn text_splice(&mut self, start: usize, span: usize, insert: &str) {
        if let SeriesData::Text { string, chars } = &mut self.data {
            let byte_of = |s: &str, n: usize| {
                s.char_indices()
                    .nth(n)
                    .map(|(i, _)| i)
                    .unwrap_or_else(|| s.len())
            };
            let b0 = byte_of(string, start);
            let b1 = byte_of(string, start + span);
            string.replace_range(b0..b1, insert);
            *chars = string.chars().count();
        }
    }

    // ----- error access ---------------------------------------------------

    pub fn error_data(&self) -> Option<&ErrorData> {
        match &self.data {
            SeriesData::Error(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_cached_length() {
        let mut s = Series::text_from("héllo".to_string());
        assert_eq!(s.len(), 5);
        s.text_push('!');
        assert_eq!(s.len(), 6);
        assert_eq!(s.char_at(1), Some('é'));
    }

    #[test]
    fn test_binary_bias_pop_head() {
        let mut s = Series::binary_from(vec![1, 2, 3, 4]);
        s.pop_head(2);
        assert_eq!(s.bytes(), &[3, 4]);
        assert_eq!(s.len(), 2);
        s.pop_head(10);
        assert_eq!(s.len(), 0);
    }

    #[test]
    fn test_array_end_past_tail() {
        let s = Series::array_from(vec![Cell::integer(1)]);
        assert_eq!(s.cell_at(0).as_integer(), Some(1));
        assert!(s.cell_at(1).is_end());
    }

    #[test]
    fn test_access_contracts() {
        let mut s = Series::array_with_capacity(0);
        assert!(s.ensure_mutable().is_ok());
        s.flags |= SeriesFlags::HOLD;
        assert_eq!(s.ensure_mutable(), Err(ErrorKind::Held));
        s.flags -= SeriesFlags::HOLD;
        s.flags |= SeriesFlags::INACCESSIBLE;
        assert_eq!(s.ensure_readable(), Err(ErrorKind::Inaccessible));
    }

    #[test]
    fn test_text_splice() {
        let mut s = Series::text_from("aaabbb".to_string());
        s.text_splice(0, 3, "xy");
        assert_eq!(s.text_str(), "xybbb");
        assert_eq!(s.len(), 5);
    }
}

//! Feeds: the "next values to evaluate" abstraction
//!
//! A feed is either a position in an array or a variadic stream of host
//! items (UTF-8 text fragments, spliced cells, quoting instructions).
//! The evaluator only ever sees cells; text fragments are scanned as they
//! are reached, and bracket nesting is allowed to span fragments via the
//! scanner's resumable session.
//!
//! A variadic feed cannot be rewound, so before the collector marks
//! anything every live variadic feed is **reified**: its unread remainder
//! becomes an ordinary array and the feed continues from there.

use crate::scanner::ScanSession;
use sigil_core::{Cell, NodeId};
use std::collections::VecDeque;

/// One element of a variadic host feed.
#[derive(Debug)]
pub enum VaItem {
    /// UTF-8 source fragment, scanned when reached.
    Text(String),
    /// The host's null, spliced as a NULLED value.
    Null,
    /// Pre-built value spliced inertly.
    Cell(Cell),
    /// Pre-built value spliced evaluator-active.
    Eval(Cell),
    /// Instruction: add one quote level to every later splice.
    QuoteMore,
    /// Instruction: strip one quote level from every later splice.
    QuoteLess,
    /// Splice an API handle's value and release the handle.
    HandleOnce(NodeId),
}

#[derive(Debug)]
pub enum FeedSource {
    Array {
        node: NodeId,
        /// Index of the next cell to fetch.
        index: usize,
    },
    Variadic {
        /// Cells already scanned/spliced, not yet consumed.
        queue: VecDeque<Cell>,
        /// Host items not yet processed.
        items: VecDeque<VaItem>,
        /// Resumable scanner state (brackets may span fragments).
        session: ScanSession,
    },
}

#[derive(Debug)]
pub struct Feed {
    pub source: FeedSource,
    /// Binding context for words without their own binding.
    pub specifier: Option<NodeId>,
    /// The next value to consume; END when exhausted.
    pub current: Cell,
    /// Cached variable lookup when `current` is a word.
    pub gotten: Option<Cell>,
    /// The most recently consumed value.
    pub lookback: Cell,
    /// Default quote level added to spliced cells.
    pub quotes: u8,
    /// Net quoting adjustment from instructions seen so far.
    pub quote_adjust: i8,
    /// Array this feed placed a HOLD on (released when the level pops).
    pub held: Option<NodeId>,
}

impl Feed {
    pub fn at_array(node: NodeId, index: usize, specifier: Option<NodeId>) -> Self {
        Feed {
            source: FeedSource::Array { node, index },
            specifier,
            current: Cell::end(),
            gotten: None,
            lookback: Cell::end(),
            quotes: 0,
            quote_adjust: 0,
            held: None,
        }
    }

    pub fn variadic(
        items: Vec<VaItem>,
        quotes: u8,
        specifier: Option<NodeId>,
        session: ScanSession,
    ) -> Self {
        Feed {
            source: FeedSource::Variadic {
                queue: VecDeque::new(),
                items: items.into(),
                session,
            },
            specifier,
            current: Cell::end(),
            gotten: None,
            lookback: Cell::end(),
            quotes,
            quote_adjust: 0,
            held: None,
        }
    }

    pub fn is_variadic(&self) -> bool {
        matches!(self.source, FeedSource::Variadic { .. })
    }

    /// Apply the feed's splice quoting to a host-provided cell.
    pub fn apply_splice_quotes(&self, cell: Cell) -> Cell {
        let net = self.quotes as i16 + self.quote_adjust as i16;
        if net >= 0 {
            cell.quoted(net as u8)
        } else {
            let mut c = cell;
            for _ in 0..net.unsigned_abs() {
                c = c.unquoted();
            }
            c
        }
    }
}

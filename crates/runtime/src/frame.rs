//! Levels and Call Frames
//!
//! A [`Level`] is one feed being stepped by the evaluator: the feed, the
//! output cell the caller reads, a scratch cell, and the marks needed to
//! verify balance on exit (data stack, mold buffer, manuals list).
//!
//! A [`CallFrame`] is one action invocation in flight: the action value,
//! its label for tracebacks, and the varlist holding argument cells. The
//! collector walks both stacks; PARSE recursions push call frames too, so
//! they show up in traces the same way action calls do.

use crate::feed::Feed;
use bitflags::bitflags;
use sigil_core::{Cell, NodeId, SymbolId};

bitflags! {
    /// Modifiers for a single evaluator step.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct StepFlags: u8 {
        /// This step is filling an action argument; deferred enfix must
        /// wait for the outer expression instead of running here.
        const FULFILLING_ARG = 1 << 0;
        /// Tight step: no enfix lookahead after the unit value. Used for
        /// the right argument of a non-deferred enfix action, which is
        /// what makes chains evaluate strictly left to right.
        const NO_LOOKAHEAD = 1 << 1;
    }
}

/// One evaluation level (one feed being consumed).
#[derive(Debug)]
pub struct Level {
    pub feed: Feed,
    /// Result cell; starts as a stale END.
    pub out: Cell,
    /// Scratch cell, marked by the collector.
    pub spare: Cell,
    /// Data stack mark for balance checking.
    pub dsp_orig: usize,
    /// Mold buffer mark for balance checking.
    pub mold_orig: usize,
    /// Manuals list mark; unwinding frees series leaked by a failed
    /// subtree.
    pub manuals_orig: usize,
}

impl Level {
    pub fn new(feed: Feed, dsp_orig: usize, mold_orig: usize, manuals_orig: usize) -> Self {
        Level {
            feed,
            out: Cell::end(),
            spare: Cell::end(),
            dsp_orig,
            mold_orig,
            manuals_orig,
        }
    }
}

/// One action invocation in flight.
#[derive(Debug)]
pub struct CallFrame {
    /// The action value being run (phase archetype).
    pub original: Cell,
    /// Invocation name for tracebacks, when invoked through a word.
    pub label: Option<SymbolId>,
    /// Context holding the argument cells; keylist is the paramlist.
    pub varlist: NodeId,
    /// Data stack mark at invocation.
    pub dsp_orig: usize,
}

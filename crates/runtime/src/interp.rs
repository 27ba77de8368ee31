//! The Interpreter Value
//!
//! Everything the original kept in globals — node pools, the data stack,
//! the mold buffer, the canon symbol table, signal bits — lives in one
//! [`Interp`] the host constructs and owns. Construction and shutdown are
//! explicit; two interpreters never share state.
//!
//! The evaluator is single-threaded and cooperative. Cancellation is a
//! signal bit checked between expressions; a collection request is
//! honored at the same safe points.

use crate::config::InterpConfig;
use crate::feed::{Feed, FeedSource};
use crate::frame::{CallFrame, Level};
use crate::parse::ParseWords;
use sigil_core::{
    Cell, DataStack, ErrorData, ErrorKind, Heap, HeapStats, Kind, MoldBuffer, NodeId, SeriesData,
    SeriesFlags, SymbolId, SymbolTable, context, mold_cell, mold_near,
};
use bitflags::bitflags;
use tracing::debug;

bitflags! {
    /// Signal bits checked at step boundaries.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Signals: u8 {
        /// Collect at the next safe point.
        const RECYCLE = 1 << 0;
        /// Raise a halt at the next step.
        const HALT = 1 << 1;
    }
}

/// Non-local exit of an evaluation step.
///
/// A `fail` is an ERROR! node unwinding to the nearest trap. A throw is
/// signaled here while its label/payload pair rides in the interpreter's
/// task-local slot; every unwinder propagates it untouched until a
/// catcher claims it.
#[derive(Debug, Clone, Copy)]
pub enum Abort {
    Fail(NodeId),
    Throw,
}

pub type Outcome<T> = Result<T, Abort>;

/// What a dispatcher did with the output cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Output written.
    Out,
    /// Invisible: the previous output (possibly stale) stands.
    Invisible,
}

/// Per-action dispatch function; entries live in a flat table indexed by
/// the DispatchId carried in ACTION! payloads.
pub type Dispatcher = fn(&mut Interp, usize) -> Outcome<Disposition>;

/// The two-part throw state (label + payload).
#[derive(Debug, Clone)]
pub struct Thrown {
    pub label: Cell,
    pub payload: Cell,
}

/// Well-known sentinel natives used as throw labels.
#[derive(Debug, Clone, Default)]
pub struct Sentinels {
    pub return_: Option<Cell>,
    pub break_: Option<Cell>,
    pub continue_: Option<Cell>,
    pub quit: Option<Cell>,
    pub throw: Option<Cell>,
    pub parse_accept: Option<Cell>,
    pub parse_reject: Option<Cell>,
}

/// Point-in-time interpreter statistics.
#[derive(Debug, Clone, Copy)]
pub struct InterpStats {
    pub heap: HeapStats,
    pub live_nodes: usize,
    pub free_nodes: usize,
    pub symbols: usize,
    pub gc_cycles: u64,
}

pub struct Interp {
    pub(crate) heap: Heap,
    pub(crate) ds: DataStack,
    pub(crate) syms: SymbolTable,
    pub(crate) mold: MoldBuffer,
    pub(crate) levels: Vec<Level>,
    pub(crate) calls: Vec<CallFrame>,
    pub(crate) dispatchers: Vec<Dispatcher>,
    /// The library context (natives live here).
    pub(crate) lib: NodeId,
    /// The user context (top-level set-words land here).
    pub(crate) user: NodeId,
    pub(crate) sentinels: Sentinels,
    pub(crate) parse_words: ParseWords,
    pub(crate) thrown: Option<Thrown>,
    pub(crate) signals: Signals,
    pub(crate) gc_disabled: u32,
    pub(crate) gc_cycles: u64,
    /// Dispatcher id shared by every FUNC/DOES-built action.
    pub(crate) func_dispatch: sigil_core::DispatchId,
    pub(crate) config: InterpConfig,
}

impl Interp {
    /// Boot an interpreter: canon symbols, lib and user contexts, the
    /// native set.
    pub fn new(config: InterpConfig) -> Self {
        let mut heap = Heap::new(config.node_pool_capacity);
        heap.set_ballast(config.gc_ballast);
        let ds = DataStack::new(config.data_stack_capacity);
        let mut syms = SymbolTable::new();
        let parse_words = ParseWords::intern(&mut syms);

        let lib = context::make_context(&mut heap, &[]);
        let user = context::make_context(&mut heap, &[]);

        let mut interp = Interp {
            heap,
            ds,
            syms,
            mold: MoldBuffer::new(),
            levels: Vec::new(),
            calls: Vec::new(),
            dispatchers: Vec::new(),
            lib,
            user,
            sentinels: Sentinels::default(),
            parse_words,
            thrown: None,
            signals: Signals::empty(),
            gc_disabled: 0,
            gc_cycles: 0,
            func_dispatch: sigil_core::DispatchId(u16::MAX),
            config,
        };
        crate::natives::install(&mut interp);
        debug!(
            natives = interp.dispatchers.len(),
            symbols = interp.syms.len(),
            "interpreter booted"
        );
        interp
    }

    /// Shut the interpreter down, verifying the balance invariants.
    pub fn shutdown(self) -> InterpStats {
        debug_assert!(self.levels.is_empty(), "levels left on shutdown");
        debug_assert!(self.calls.is_empty(), "call frames left on shutdown");
        debug_assert_eq!(self.ds.dsp(), 0, "data stack unbalanced on shutdown");
        let stats = self.stats();
        debug!(
            live_nodes = stats.live_nodes,
            gc_cycles = stats.gc_cycles,
            "interpreter shut down"
        );
        stats
    }

    pub fn stats(&self) -> InterpStats {
        InterpStats {
            heap: self.heap.stats(),
            live_nodes: self.heap.node_count(),
            free_nodes: self.heap.free_count(),
            symbols: self.syms.len(),
            gc_cycles: self.gc_cycles,
        }
    }

    pub fn config(&self) -> &InterpConfig {
        &self.config
    }

    /// Request a halt at the next evaluator step.
    pub fn request_halt(&mut self) {
        self.signals |= Signals::HALT;
    }

    /// Request a collection at the next safe point.
    pub fn request_recycle(&mut self) {
        self.signals |= Signals::RECYCLE;
    }

    // ----- raising --------------------------------------------------------

    /// Build an ERROR! node for `kind`, attaching the call chain and the
    /// nearest source snippet, and return the abort carrying it.
    pub(crate) fn raise(&mut self, kind: ErrorKind) -> Abort {
        let where_: Vec<String> = self
            .calls
            .iter()
            .rev()
            .filter_map(|c| c.label)
            .map(|s| self.syms.text(s).to_string())
            .collect();
        let near = self.levels.last().and_then(|lvl| match lvl.feed.source {
            FeedSource::Array { node, index } => {
                Some(mold_near(&self.heap, &self.syms, node, index.saturating_sub(1)))
            }
            FeedSource::Variadic { .. } => None,
        });
        let mut data = ErrorData::new(kind);
        data.where_ = where_;
        data.near = near;
        let node = self.heap.alloc_managed(SeriesData::Error(data));
        Abort::Fail(node)
    }

    pub(crate) fn fail<T>(&mut self, kind: ErrorKind) -> Outcome<T> {
        Err(self.raise(kind))
    }

    /// Record a throw (label + payload) and return the abort signaling it.
    pub(crate) fn throw(&mut self, label: Cell, payload: Cell) -> Abort {
        self.thrown = Some(Thrown { label, payload });
        Abort::Throw
    }

    pub(crate) fn take_thrown(&mut self) -> Thrown {
        self.thrown.take().expect("throw signaled with empty thrown slot")
    }

    /// Convert an abort into host-facing error data.
    pub(crate) fn abort_to_error(&mut self, abort: Abort) -> ErrorData {
        match abort {
            Abort::Fail(node) => self
                .heap
                .series(node)
                .error_data()
                .cloned()
                .unwrap_or_else(|| ErrorData::new(ErrorKind::NoMemory)),
            Abort::Throw => {
                let thrown = self.take_thrown();
                let label = mold_cell(&self.heap, &self.syms, &thrown.label);
                ErrorData::new(ErrorKind::NoCatch { label })
            }
        }
    }

    /// The error data behind an ERROR! value.
    pub fn error_data(&self, cell: &Cell) -> Option<&ErrorData> {
        let node = cell.error_node()?;
        self.heap.series(node).error_data()
    }

    // ----- levels ---------------------------------------------------------

    /// Push an evaluation level over `feed`, placing a HOLD on array
    /// sources. Returns the level index.
    pub(crate) fn push_level(&mut self, mut feed: Feed) -> Outcome<usize> {
        if self.levels.len() + self.calls.len() >= self.config.level_limit {
            return self.fail(ErrorKind::StackOverflow);
        }
        if let FeedSource::Array { node, .. } = feed.source {
            if !self.heap.has_flag(node, SeriesFlags::HOLD) {
                self.heap.set_flag(node, SeriesFlags::HOLD);
                feed.held = Some(node);
            }
        }
        let level = Level::new(
            feed,
            self.ds.dsp(),
            self.mold.mark(),
            self.heap.manuals_mark(),
        );
        self.levels.push(level);
        let li = self.levels.len() - 1;
        if let Err(abort) = self.feed_prime(li) {
            self.pop_level(li, true);
            return Err(abort);
        }
        Ok(li)
    }

    /// Pop a level, releasing holds and (on unwind) restoring every
    /// balance mark.
    pub(crate) fn pop_level(&mut self, li: usize, unwinding: bool) {
        debug_assert_eq!(li, self.levels.len() - 1, "popping a non-top level");
        let level = self.levels.pop().expect("level stack empty on pop");
        if let Some(node) = level.feed.held {
            self.heap.clear_flag(node, SeriesFlags::HOLD);
        }
        if unwinding {
            self.ds.drop_to(level.dsp_orig);
            self.mold.unwind(level.mold_orig);
            self.heap.manuals_unwind(level.manuals_orig);
        } else {
            debug_assert!(
                self.ds.is_balanced_with(level.dsp_orig),
                "data stack unbalanced across a level"
            );
            debug_assert!(
                self.mold.is_balanced_with(level.mold_orig),
                "mold buffer unbalanced across a level"
            );
        }
    }

    // ----- variables ------------------------------------------------------

    /// Resolve a word to its variable cell: own binding first, then the
    /// specifier context, then user, then lib. `None` means unbound.
    pub(crate) fn lookup_word(&self, word: &Cell, specifier: Option<NodeId>) -> Option<Cell> {
        let sym = word.symbol()?;
        if let Some(ctx) = word.binding() {
            if !self.heap.is_free(ctx) {
                if let Some(i) = context::find_index(&self.heap, ctx, sym) {
                    return Some(context::slot(&self.heap, ctx, i));
                }
            }
        }
        if let Some(spec) = specifier {
            if let Some(i) = context::find_index(&self.heap, spec, sym) {
                return Some(context::slot(&self.heap, spec, i));
            }
        }
        if let Some(i) = context::find_index(&self.heap, self.user, sym) {
            return Some(context::slot(&self.heap, self.user, i));
        }
        if let Some(i) = context::find_index(&self.heap, self.lib, sym) {
            return Some(context::slot(&self.heap, self.lib, i));
        }
        None
    }

    /// Assign a word's variable. Unbound words land in the specifier
    /// context when they name an existing slot there, otherwise in user.
    pub(crate) fn set_var(
        &mut self,
        word: &Cell,
        specifier: Option<NodeId>,
        value: Cell,
    ) -> Outcome<()> {
        let sym = match word.symbol() {
            Some(s) => s,
            None => {
                let text = mold_cell(&self.heap, &self.syms, word);
                return self.fail(ErrorKind::NotBound { word: text });
            }
        };
        let (ctx, index) = if let Some(ctx) = word.binding() {
            match context::find_index(&self.heap, ctx, sym) {
                Some(i) => (ctx, i),
                None => (self.user, context::find_or_append(&mut self.heap, self.user, sym)),
            }
        } else if let Some(spec) = specifier {
            match context::find_index(&self.heap, spec, sym) {
                Some(i) => (spec, i),
                None => (self.user, context::find_or_append(&mut self.heap, self.user, sym)),
            }
        } else {
            (self.user, context::find_or_append(&mut self.heap, self.user, sym))
        };
        let slot = context::slot(&self.heap, ctx, index);
        if slot.flags.contains(sigil_core::CellFlags::PROTECTED) {
            return self.fail(ErrorKind::Protected);
        }
        context::set_slot(&mut self.heap, ctx, index, value);
        Ok(())
    }

    /// Install a value under `name` in the lib context.
    pub(crate) fn lib_set(&mut self, name: &str, value: Cell) {
        let sym = self.syms.intern(name);
        let index = context::find_or_append(&mut self.heap, self.lib, sym);
        context::set_slot(&mut self.heap, self.lib, index, value);
    }

    /// Read a lib variable (tests and host conveniences).
    pub fn lib_get(&self, name: &str) -> Option<Cell> {
        let sym = self.syms.lookup(name)?;
        let i = context::find_index(&self.heap, self.lib, sym)?;
        Some(context::slot(&self.heap, self.lib, i))
    }

    /// Read a user variable by name.
    pub fn user_get(&self, name: &str) -> Option<Cell> {
        let sym = self.syms.lookup(name)?;
        let i = context::find_index(&self.heap, self.user, sym)?;
        Some(context::slot(&self.heap, self.user, i))
    }

    // ----- drivers --------------------------------------------------------

    /// Scan source into a BLOCK! value.
    pub fn load(&mut self, source: &str) -> Result<Cell, ErrorData> {
        match self.scan_source(source) {
            Ok(node) => Ok(Cell::block(node)),
            Err(abort) => Err(self.abort_to_error(abort)),
        }
    }

    /// Scan and evaluate source, returning the last expression's value.
    pub fn do_source(&mut self, source: &str) -> Result<Cell, ErrorData> {
        let block = match self.scan_source(source) {
            Ok(node) => node,
            Err(abort) => return Err(self.abort_to_error(abort)),
        };
        match self.do_at(block, 0, Some(self.user)) {
            Ok(out) => Ok(out),
            Err(abort) => Err(self.abort_to_error(abort)),
        }
    }

    /// Evaluate an array from `index` to its end.
    pub(crate) fn do_at(
        &mut self,
        node: NodeId,
        index: usize,
        specifier: Option<NodeId>,
    ) -> Outcome<Cell> {
        let li = self.push_level(Feed::at_array(node, index, specifier))?;
        let result = self.run_to_end(li);
        self.pop_level(li, result.is_err());
        result
    }

    /// Step the level's feed to exhaustion; the result is the last
    /// non-stale output (VOID! if nothing produced one).
    pub(crate) fn run_to_end(&mut self, li: usize) -> Outcome<Cell> {
        loop {
            if self.feed_peek(li).is_end() {
                break;
            }
            self.eval_step(li, crate::frame::StepFlags::empty())?;
        }
        let out = self.levels[li].out;
        if out.is_end() || out.is_stale() {
            Ok(Cell::void())
        } else {
            Ok(out)
        }
    }

    /// Mold any value to its source notation.
    pub fn mold_value(&self, cell: &Cell) -> String {
        mold_cell(&self.heap, &self.syms, cell)
    }

    /// Intern a spelling (host convenience for building words).
    pub fn intern(&mut self, spelling: &str) -> SymbolId {
        self.syms.intern(spelling)
    }

    /// Direct heap access for hosts building values.
    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    // ----- dispatcher support ---------------------------------------------

    pub(crate) fn register_dispatcher(&mut self, f: Dispatcher) -> sigil_core::DispatchId {
        let id = sigil_core::DispatchId(self.dispatchers.len() as u16);
        self.dispatchers.push(f);
        id
    }

    /// The call frame of the action currently dispatching.
    pub(crate) fn call(&self) -> &CallFrame {
        self.calls.last().expect("dispatcher outside any call frame")
    }

    /// Argument cell `n` (1-based) of the current call.
    pub(crate) fn arg(&self, n: usize) -> Cell {
        context::slot(&self.heap, self.call().varlist, n)
    }

    pub(crate) fn set_out(&mut self, li: usize, value: Cell) {
        let mut v = value;
        v.flags.remove(sigil_core::CellFlags::STALE);
        self.levels[li].out = v;
    }

    /// Check HALT and pending collection requests between expressions.
    pub(crate) fn check_signals(&mut self) -> Outcome<()> {
        if self.signals.contains(Signals::HALT) {
            self.signals.remove(Signals::HALT);
            return self.fail(ErrorKind::Halt);
        }
        if self.signals.contains(Signals::RECYCLE) || self.heap.gc_due() {
            self.recycle();
        }
        Ok(())
    }

    /// True if `cell` is one of the sentinel throw-label actions.
    pub(crate) fn is_sentinel(label: &Option<Cell>, cell: &Cell) -> bool {
        match (label, cell.action_parts()) {
            (Some(l), Some((paramlist, _))) => {
                l.action_parts().map(|p| p.0) == Some(paramlist)
            }
            _ => false,
        }
    }

    /// Kind name of a value for error messages (QUOTED! aside).
    pub(crate) fn kind_name(cell: &Cell) -> &'static str {
        if cell.quotes() > 0 {
            "quoted!"
        } else {
            cell.kind().name()
        }
    }

    /// The datatype a value reports: its kind, or QUOTED! when quoted.
    pub fn type_of(cell: &Cell) -> Kind {
        cell.kind()
    }
}

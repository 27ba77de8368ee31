//! Expression Engine
//!
//! The single-step evaluator. One step consumes one expression from a
//! level's feed and writes the result to the level's output cell; an
//! invisible action leaves the output exactly as it was (stale if nothing
//! wrote it yet). Stepping repeats to exhaustion for DO-style drivers.
//!
//! Enfix: after a step produces a value, the evaluator peeks one feed
//! position. A word resolving to an ENFIX action consumes the value just
//! produced as its first argument. Non-deferred enfix takes a *tight*
//! right argument (no lookahead inside it), which yields strict
//! left-to-right chaining: `1 + 2 * 3` is 9. DEFER enfix (ELSE, THEN)
//! refuses to run while an argument is being fulfilled, so it sees the
//! whole finished expression to its left.
//!
//! Feed plumbing lives here too: fetching from arrays, draining variadic
//! host items (scanning text fragments as they are reached), and the
//! pre-collection reification of variadic feeds.

use crate::feed::{FeedSource, VaItem};
use crate::frame::StepFlags;
use crate::interp::{Abort, Interp, Outcome};
use sigil_core::{Cell, CellFlags, ErrorKind, Kind, SeriesData, SeriesFlags, mold_cell};

impl Interp {
    // ----- feed plumbing --------------------------------------------------

    /// Fetch the first value of a freshly pushed level's feed.
    pub(crate) fn feed_prime(&mut self, li: usize) -> Outcome<()> {
        let first = self.feed_fetch(li)?;
        self.levels[li].feed.current = first;
        Ok(())
    }

    /// The next value to consume (END at exhaustion).
    pub(crate) fn feed_peek(&self, li: usize) -> Cell {
        self.levels[li].feed.current
    }

    /// Consume the current value, fetching its successor.
    pub(crate) fn feed_advance(&mut self, li: usize) -> Outcome<Cell> {
        let taken = self.levels[li].feed.current;
        let next = self.feed_fetch(li)?;
        let feed = &mut self.levels[li].feed;
        feed.lookback = taken;
        feed.current = next;
        feed.gotten = None;
        Ok(taken)
    }

    /// Produce the next cell from the feed source.
    fn feed_fetch(&mut self, li: usize) -> Outcome<Cell> {
        match self.levels[li].feed.source {
            FeedSource::Array { node, index } => {
                let cell = self.heap.cell_at(node, index);
                if !cell.is_end() {
                    if let FeedSource::Array { index, .. } = &mut self.levels[li].feed.source {
                        *index += 1;
                    }
                }
                Ok(cell)
            }
            FeedSource::Variadic { .. } => self.variadic_fetch(li),
        }
    }

    /// Drain queued/spliced host items until a cell is available. Text
    /// fragments scan on the shared data stack; bracket nesting may span
    /// fragments.
    fn variadic_fetch(&mut self, li: usize) -> Outcome<Cell> {
        // Detach the source to work on it without aliasing the heap.
        let placeholder = FeedSource::Array { node: self.lib, index: usize::MAX };
        let source = std::mem::replace(&mut self.levels[li].feed.source, placeholder);
        let FeedSource::Variadic { mut queue, mut items, mut session } = source else {
            unreachable!("variadic_fetch on an array feed");
        };

        let fetched = loop {
            if let Some(cell) = queue.pop_front() {
                break Ok(cell);
            }
            let Some(item) = items.pop_front() else {
                if session.is_open() {
                    break Err(self.raise(ErrorKind::MissingClose { close: ']', line: session.line }));
                }
                break Ok(Cell::end());
            };
            match item {
                VaItem::Text(text) => {
                    // Values other feeds or natives pushed since the last
                    // fragment must stay theirs; rebase the accumulation
                    // mark unless a bracket is still open.
                    if !session.is_open() {
                        session.dsp_base = self.ds.dsp();
                    }
                    if let Err(abort) = self.scan_fragment(&mut session, &text) {
                        break Err(abort);
                    }
                    let completed = self.take_completed(&session);
                    queue.extend(completed);
                }
                VaItem::Null => {
                    // NULLED is legal in a feed (it will evaluate to
                    // null), but never inside an array under
                    // construction.
                    if session.is_open() {
                        break Err(self.raise(ErrorKind::CannotUse {
                            op: "splice into an array",
                            kind: "null",
                        }));
                    }
                    let mut c = Cell::nulled();
                    c.flags |= CellFlags::UNEVALUATED;
                    queue.push_back(c);
                }
                VaItem::Cell(cell) => {
                    let mut c = self.levels[li].feed.apply_splice_quotes(cell);
                    c.flags |= CellFlags::UNEVALUATED;
                    if session.is_open() {
                        self.splice_cell(&mut session, c);
                    } else {
                        queue.push_back(c);
                    }
                }
                VaItem::Eval(cell) => {
                    let mut c = self.levels[li].feed.apply_splice_quotes(cell);
                    c.flags |= CellFlags::UNEVALUATED | CellFlags::EVAL_FLIP;
                    if session.is_open() {
                        self.splice_cell(&mut session, c);
                    } else {
                        queue.push_back(c);
                    }
                }
                VaItem::QuoteMore => {
                    self.levels[li].feed.quote_adjust =
                        self.levels[li].feed.quote_adjust.saturating_add(1);
                }
                VaItem::QuoteLess => {
                    self.levels[li].feed.quote_adjust =
                        self.levels[li].feed.quote_adjust.saturating_sub(1);
                }
                VaItem::HandleOnce(node) => {
                    let mut c = self.heap.cell_at(node, 0);
                    c = self.levels[li].feed.apply_splice_quotes(c);
                    c.flags |= CellFlags::UNEVALUATED;
                    // Auto-release: the handle stops being a root now;
                    // the feed keeps the value reachable.
                    self.heap.clear_flag(node, SeriesFlags::ROOT);
                    if session.is_open() {
                        self.splice_cell(&mut session, c);
                    } else {
                        queue.push_back(c);
                    }
                }
            }
        };
        self.levels[li].feed.source = FeedSource::Variadic { queue, items, session };
        fetched
    }

    /// Convert a variadic feed into an array-backed one. Must run before
    /// any mark pass; a variadic cannot be rewound, so the unread tail
    /// becomes a real array the collector can see.
    pub(crate) fn feed_reify(&mut self, li: usize) {
        if !self.levels[li].feed.is_variadic() {
            return;
        }
        let placeholder = FeedSource::Array { node: self.lib, index: usize::MAX };
        let source = std::mem::replace(&mut self.levels[li].feed.source, placeholder);
        let FeedSource::Variadic { mut queue, mut items, mut session } = source else {
            unreachable!();
        };
        // Reification must not abort; scan the remainder relaxed so bad
        // text becomes ERROR! values instead.
        session.relax = true;
        let mut cells: Vec<Cell> = queue.drain(..).collect();
        if !session.is_open() {
            session.dsp_base = self.ds.dsp();
        }
        while let Some(item) = items.pop_front() {
            match item {
                VaItem::Text(text) => {
                    let _ = self.scan_fragment(&mut session, &text);
                }
                VaItem::Null => {
                    let mut c = Cell::nulled();
                    c.flags |= CellFlags::UNEVALUATED;
                    self.splice_cell(&mut session, c);
                }
                VaItem::Cell(cell) => {
                    let mut c = self.levels[li].feed.apply_splice_quotes(cell);
                    c.flags |= CellFlags::UNEVALUATED;
                    self.splice_cell(&mut session, c);
                }
                VaItem::Eval(cell) => {
                    let mut c = self.levels[li].feed.apply_splice_quotes(cell);
                    c.flags |= CellFlags::UNEVALUATED | CellFlags::EVAL_FLIP;
                    self.splice_cell(&mut session, c);
                }
                VaItem::QuoteMore => {
                    self.levels[li].feed.quote_adjust =
                        self.levels[li].feed.quote_adjust.saturating_add(1);
                }
                VaItem::QuoteLess => {
                    self.levels[li].feed.quote_adjust =
                        self.levels[li].feed.quote_adjust.saturating_sub(1);
                }
                VaItem::HandleOnce(node) => {
                    let mut c = self.heap.cell_at(node, 0);
                    c = self.levels[li].feed.apply_splice_quotes(c);
                    c.flags |= CellFlags::UNEVALUATED;
                    self.heap.clear_flag(node, SeriesFlags::ROOT);
                    self.splice_cell(&mut session, c);
                }
            }
        }
        // Anything still on the data stack (even under an unclosed
        // bracket) joins the reified tail.
        cells.extend(self.ds.take_above(session.dsp_base));
        let node = self.heap.alloc_managed(SeriesData::Array { cells });
        self.levels[li].feed.source = FeedSource::Array { node, index: 0 };
    }

    // ----- stepping -------------------------------------------------------

    /// Evaluate one expression from the level's feed into its output
    /// cell. Invisible steps leave the output stale.
    pub(crate) fn eval_step(&mut self, li: usize, flags: StepFlags) -> Outcome<()> {
        self.check_signals()?;
        let v = self.feed_peek(li);
        if v.is_end() {
            return Ok(());
        }
        let gotten = self.levels[li].feed.gotten.take();
        self.feed_advance(li)?;
        self.eval_core(li, v, gotten, flags)?;
        if !flags.contains(StepFlags::NO_LOOKAHEAD) {
            self.lookahead(li, flags)?;
        }
        Ok(())
    }

    /// One full step evaluated into a fresh output, preserving the
    /// level's current output cell. Loops over invisibles: a stale result
    /// keeps stepping until something writes or the feed ends. The
    /// returned cell is stale iff nothing wrote.
    pub(crate) fn eval_step_into(&mut self, li: usize, flags: StepFlags) -> Outcome<Cell> {
        let saved = self.levels[li].out;
        // The saved output lives only in this stack frame while the inner
        // steps run; guard it so a collection cannot free its nodes.
        self.heap.push_guard_cell(saved);
        self.levels[li].out = Cell::end();
        let result = loop {
            match self.eval_step(li, flags) {
                Ok(()) => {}
                Err(abort) => {
                    self.levels[li].out = saved;
                    self.heap.drop_guard_cell();
                    return Err(abort);
                }
            }
            let out = self.levels[li].out;
            if !out.is_stale() && !out.is_end() {
                break out;
            }
            if self.feed_peek(li).is_end() {
                break out;
            }
        };
        self.levels[li].out = saved;
        self.heap.drop_guard_cell();
        Ok(result)
    }

    fn eval_core(
        &mut self,
        li: usize,
        v: Cell,
        gotten: Option<Cell>,
        _flags: StepFlags,
    ) -> Outcome<()> {
        let specifier = self.levels[li].feed.specifier;

        // Host splices are inert unless marked evaluator-active.
        if v.flags.contains(CellFlags::UNEVALUATED) && !v.flags.contains(CellFlags::EVAL_FLIP) {
            self.set_out(li, v);
            return Ok(());
        }

        // Quoted values are inert; the quote depth survives untouched.
        if v.quotes() > 0 {
            let mut out = v;
            out.flags.remove(CellFlags::EVAL_FLIP);
            out.flags.insert(CellFlags::UNEVALUATED);
            self.set_out(li, out);
            return Ok(());
        }

        match v.kind() {
            Kind::LitWord => {
                // 'foo evaluates to the word foo.
                let out = match v.symbol() {
                    Some(sym) => Cell::word(sym).with_binding(v.binding()),
                    None => v,
                };
                self.set_out(li, out);
                Ok(())
            }
            Kind::LitBar => {
                self.set_out(li, Cell::bar());
                Ok(())
            }
            Kind::Word => {
                let looked = match gotten {
                    Some(g) => Some(g),
                    None => self.lookup_word(&v, specifier),
                };
                let word_text = |me: &Self| {
                    v.symbol()
                        .map(|s| me.syms.text(s).to_string())
                        .unwrap_or_default()
                };
                match looked {
                    None => {
                        let word = word_text(self);
                        self.fail(ErrorKind::NoValue { word })
                    }
                    Some(value) if value.is_nulled() => {
                        let word = word_text(self);
                        self.fail(ErrorKind::NoValue { word })
                    }
                    Some(value) if value.kind() == Kind::Action && value.quotes() == 0 => {
                        self.run_action(li, value, v.symbol(), None, &[])
                    }
                    Some(mut value) => {
                        value.flags.remove(CellFlags::UNEVALUATED | CellFlags::NEWLINE_BEFORE);
                        self.set_out(li, value);
                        Ok(())
                    }
                }
            }
            Kind::GetWord => {
                match self.lookup_word(&v, specifier) {
                    None => {
                        let word = v
                            .symbol()
                            .map(|s| self.syms.text(s).to_string())
                            .unwrap_or_default();
                        self.fail(ErrorKind::NoValue { word })
                    }
                    // Actions are fetched, not invoked; NULLED passes.
                    Some(value) => {
                        self.set_out(li, value);
                        Ok(())
                    }
                }
            }
            Kind::SetWord => {
                if self.feed_peek(li).is_end() {
                    let target = mold_cell(&self.heap, &self.syms, &v);
                    return self.fail(ErrorKind::NeedsValue { target });
                }
                let value = self.eval_step_into(li, StepFlags::FULFILLING_ARG)?;
                if value.is_stale() || value.is_end() {
                    let target = mold_cell(&self.heap, &self.syms, &v);
                    return self.fail(ErrorKind::NeedsValue { target });
                }
                self.set_var(&v, specifier, value)?;
                self.set_out(li, value);
                Ok(())
            }
            Kind::Group | Kind::GetGroup => {
                let node = v.series_node().expect("group without storage");
                let index = v.series_index().unwrap_or(0);
                let inner_spec = v.binding().or(specifier);
                let result = self.do_at(node, index, inner_spec)?;
                self.set_out(li, result);
                Ok(())
            }
            Kind::SetGroup => self.fail(ErrorKind::CannotUse {
                op: "evaluate",
                kind: "set-group!",
            }),
            Kind::Path => self.eval_path(li, v, false),
            Kind::GetPath => self.eval_path(li, v, true),
            Kind::SetPath => {
                if self.feed_peek(li).is_end() {
                    let target = mold_cell(&self.heap, &self.syms, &v);
                    return self.fail(ErrorKind::NeedsValue { target });
                }
                let value = self.eval_step_into(li, StepFlags::FULFILLING_ARG)?;
                if value.is_stale() || value.is_end() {
                    let target = mold_cell(&self.heap, &self.syms, &v);
                    return self.fail(ErrorKind::NeedsValue { target });
                }
                self.set_path(li, v, value)?;
                self.set_out(li, value);
                Ok(())
            }
            Kind::Action => self.run_action(li, v, None, None, &[]),
            Kind::Nulled | Kind::Void => {
                self.set_out(li, v);
                Ok(())
            }
            _ => {
                // Inert kinds (and FRAME!/CONTEXT! values met inline).
                let mut out = v;
                out.flags.remove(
                    CellFlags::UNEVALUATED | CellFlags::EVAL_FLIP | CellFlags::NEWLINE_BEFORE,
                );
                self.set_out(li, out);
                Ok(())
            }
        }
    }

    /// Enfix lookahead: peek one position; a word resolving to an ENFIX
    /// action consumes the just-produced output as its first argument.
    fn lookahead(&mut self, li: usize, flags: StepFlags) -> Outcome<()> {
        loop {
            let peek = self.feed_peek(li);
            if peek.is_end() || peek.kind() != Kind::Word || peek.quotes() > 0 {
                return Ok(());
            }
            if peek.flags.contains(CellFlags::UNEVALUATED)
                && !peek.flags.contains(CellFlags::EVAL_FLIP)
            {
                return Ok(());
            }
            let specifier = self.levels[li].feed.specifier;
            let gotten = match self.lookup_word(&peek, specifier) {
                Some(g) => g,
                None => return Ok(()),
            };
            // Cache the lookup for the ordinary step that will follow if
            // this is not an enfix consumer.
            self.levels[li].feed.gotten = Some(gotten);
            if gotten.kind() != Kind::Action || !gotten.flags.contains(CellFlags::ENFIX) {
                return Ok(());
            }
            if gotten.flags.contains(CellFlags::DEFER) && flags.contains(StepFlags::FULFILLING_ARG)
            {
                // Deferred enfix waits for the outer expression.
                return Ok(());
            }
            let label = peek.symbol();
            self.feed_advance(li)?;
            let left = self.levels[li].out;
            self.run_action(li, gotten, label, Some(left), &[])?;
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::InterpConfig;
    use crate::interp::Interp;
    use sigil_core::Kind;

    fn interp() -> Interp {
        Interp::new(InterpConfig::default())
    }

    #[test]
    fn test_left_to_right_enfix() {
        let mut i = interp();
        let out = i.do_source("1 + 2 * 3").unwrap();
        assert_eq!(out.as_integer(), Some(9));
    }

    #[test]
    fn test_inert_values() {
        let mut i = interp();
        assert_eq!(i.do_source("42").unwrap().as_integer(), Some(42));
        assert_eq!(i.do_source("\"abc\"").unwrap().kind(), Kind::Text);
        assert_eq!(i.do_source("[1 2]").unwrap().kind(), Kind::Block);
    }

    #[test]
    fn test_set_word_then_word() {
        let mut i = interp();
        let out = i.do_source("x: 5 x + 1").unwrap();
        assert_eq!(out.as_integer(), Some(6));
    }

    #[test]
    fn test_lit_word_evaluates_to_word() {
        let mut i = interp();
        let out = i.do_source("'foo").unwrap();
        assert_eq!(out.kind(), Kind::Word);
    }

    #[test]
    fn test_group_recursion() {
        let mut i = interp();
        let out = i.do_source("(1 + 2) * 3").unwrap();
        assert_eq!(out.as_integer(), Some(9));
    }

    #[test]
    fn test_no_value_error() {
        let mut i = interp();
        let err = i.do_source("utterly-unset-word").unwrap_err();
        assert!(err.message().contains("has no value"));
    }
}

//! Action Dispatch
//!
//! An action is a paramlist array (cell 0 the archetype, cells 1..n PARAM
//! descriptions) plus a dispatcher id into the runtime's flat function
//! table. Invocation pushes a call frame, allocates a varlist keyed by
//! the paramlist, fulfills arguments left to right, then invokes the
//! dispatcher.
//!
//! Parameter conventions:
//! - normal: one full evaluator step (tight when the action is enfix)
//! - hard literal: the next feed value, unevaluated
//! - soft literal: unevaluated unless GROUP!/GET-WORD!/GET-PATH! escapes
//! - refinement: LOGIC! slot; in-path order that disagrees with the
//!   paramlist order defers the refinement's arguments to a pickups pass
//! - local / return: start NULLED
//!
//! A parameter whose typeset carries the END bit is "endable": at feed
//! end (or, for hard literals, on a kind mismatch) it fills NULLED
//! instead of failing. That is how `<skip>`-style parameters behave.

use crate::frame::{CallFrame, StepFlags};
use crate::interp::{Disposition, Interp, Outcome};
use sigil_core::{
    Cell, CellFlags, DispatchId, ErrorKind, Kind, NodeId, ParamClass, SeriesData, SeriesFlags,
    SymbolId, context, typesets,
};
use std::collections::VecDeque;

/// Declaration of one parameter when building an action.
pub(crate) struct ParamSpec {
    pub name: &'static str,
    pub class: ParamClass,
    pub types: u64,
}

impl ParamSpec {
    pub fn normal(name: &'static str, types: u64) -> Self {
        ParamSpec { name, class: ParamClass::Normal, types }
    }

    pub fn hard(name: &'static str, types: u64) -> Self {
        ParamSpec { name, class: ParamClass::HardQuote, types }
    }

    pub fn soft(name: &'static str, types: u64) -> Self {
        ParamSpec { name, class: ParamClass::SoftQuote, types }
    }

    pub fn refinement(name: &'static str) -> Self {
        ParamSpec { name, class: ParamClass::Refinement, types: typesets::LOGIC }
    }
}

impl Interp {
    /// Build an action from parameter specs and a registered dispatcher.
    /// The paramlist is managed; the archetype cell carries `flags`.
    pub(crate) fn make_action(
        &mut self,
        specs: &[ParamSpec],
        dispatch: DispatchId,
        flags: CellFlags,
    ) -> Cell {
        let mut cells = Vec::with_capacity(specs.len() + 1);
        cells.push(Cell::end()); // patched to the archetype below
        for spec in specs {
            let sym = self.syms.intern(spec.name);
            cells.push(Cell::param(sym, spec.class, spec.types));
        }
        let paramlist = self.heap.alloc_managed(SeriesData::Array { cells });
        let mut archetype = Cell::action(paramlist, dispatch);
        archetype.flags |= flags;
        self.heap.array_mut(paramlist)[0] = archetype;
        archetype
    }

    /// Stash the body of a FUNC-style action on its paramlist (MISC slot,
    /// marked for collection).
    pub(crate) fn set_action_body(&mut self, action: &Cell, body: NodeId) {
        let (paramlist, _) = action.action_parts().expect("set_action_body on non-action");
        self.heap.series_mut(paramlist).misc = Some(body);
        self.heap.set_flag(paramlist, SeriesFlags::MISC_MARK);
    }

    pub(crate) fn action_body(&self, action: &Cell) -> Option<NodeId> {
        let (paramlist, _) = action.action_parts()?;
        self.heap.series(paramlist).misc
    }

    fn action_name(&self, label: Option<SymbolId>) -> String {
        label
            .map(|s| self.syms.text(s).to_string())
            .unwrap_or_else(|| "anonymous".to_string())
    }

    /// Invoke an action: push a call frame, fulfill arguments from the
    /// level's feed, dispatch, typecheck the return.
    ///
    /// `enfix_left` supplies the first argument from the already-evaluated
    /// expression on the left; `refines` is the in-path refinement order.
    pub(crate) fn run_action(
        &mut self,
        li: usize,
        action: Cell,
        label: Option<SymbolId>,
        enfix_left: Option<Cell>,
        refines: &[SymbolId],
    ) -> Outcome<()> {
        if self.levels.len() + self.calls.len() >= self.config.level_limit {
            return self.fail(ErrorKind::StackOverflow);
        }
        let (paramlist, dispatch) = match action.action_parts() {
            Some(parts) => parts,
            None => {
                return self.fail(ErrorKind::NotAnAction {
                    word: self.action_name(label),
                })
            }
        };
        let params: Vec<Cell> = self.heap.array(paramlist)[1..].to_vec();

        let dsp_orig = self.ds.dsp();
        let varlist = self.heap.alloc(SeriesData::Array {
            cells: vec![Cell::end(); params.len() + 1],
        });
        self.heap.array_mut(varlist)[0] = Cell::frame(varlist);
        self.heap.series_mut(varlist).link = Some(paramlist);
        self.heap.set_flag(varlist, SeriesFlags::LINK_MARK);
        self.calls.push(CallFrame {
            original: action,
            label,
            varlist,
            dsp_orig,
        });
        // The enfix left value is only reachable through this stack frame
        // until it lands in an argument slot.
        if let Some(left) = enfix_left {
            self.heap.push_guard_cell(left);
        }

        let result = self.fulfill_and_dispatch(li, action, label, &params, varlist, enfix_left, refines);

        if enfix_left.is_some() {
            self.heap.drop_guard_cell();
        }
        self.calls.pop();
        self.ds.drop_to(dsp_orig);
        if !self.heap.has_flag(varlist, SeriesFlags::MANAGED) {
            self.heap.free(varlist);
        }
        result
    }

    fn fulfill_and_dispatch(
        &mut self,
        li: usize,
        action: Cell,
        label: Option<SymbolId>,
        params: &[Cell],
        varlist: NodeId,
        enfix_left: Option<Cell>,
        refines: &[SymbolId],
    ) -> Outcome<()> {
        let mut pending: VecDeque<SymbolId> = refines.iter().copied().collect();
        let mut first_arg = enfix_left;
        let tight = action.flags.contains(CellFlags::ENFIX);

        // Argument slots belonging to a refinement that was requested out
        // of paramlist order; filled by the pickups pass afterward.
        let mut pickups: Vec<(SymbolId, usize, Cell)> = Vec::new();
        // Refinements seen in the paramlist but deferred to pickups.
        let mut deferred: Vec<SymbolId> = Vec::new();

        #[derive(Clone, Copy, PartialEq)]
        enum Region {
            Positional,
            ActiveRefinement,
            SkippedRefinement,
            PickupRefinement(SymbolId),
        }
        let mut region = Region::Positional;

        for (idx, param) in params.iter().enumerate() {
            let slot = idx + 1;
            let Some((sym, class, types)) = param.param_parts() else {
                continue;
            };
            match class {
                ParamClass::Local | ParamClass::Return => {
                    context::set_slot(&mut self.heap, varlist, slot, Cell::nulled());
                }
                ParamClass::Refinement => {
                    if let Some(pos) = pending.iter().position(|&s| s == sym) {
                        context::set_slot(&mut self.heap, varlist, slot, Cell::logic(true));
                        if pos == 0 {
                            pending.pop_front();
                            region = Region::ActiveRefinement;
                        } else {
                            // Out of order: arguments wait for pickups.
                            deferred.push(sym);
                            region = Region::PickupRefinement(sym);
                        }
                    } else {
                        context::set_slot(&mut self.heap, varlist, slot, Cell::logic(false));
                        region = Region::SkippedRefinement;
                    }
                }
                _ => match region {
                    Region::SkippedRefinement => {
                        context::set_slot(&mut self.heap, varlist, slot, Cell::nulled());
                    }
                    Region::PickupRefinement(ref_sym) => {
                        pickups.push((ref_sym, slot, *param));
                    }
                    _ => {
                        let arg = self.fulfill_one(li, label, sym, class, types, &mut first_arg, tight)?;
                        context::set_slot(&mut self.heap, varlist, slot, arg);
                    }
                },
            }
        }

        // Pickups: out-of-order refinements take their arguments in the
        // order the caller named them.
        while let Some(ref_sym) = pending.pop_front() {
            let mut found = false;
            for &(owner, slot, param) in &pickups {
                if owner != ref_sym {
                    continue;
                }
                found = true;
                let Some((sym, class, types)) = param.param_parts() else { continue };
                let arg = self.fulfill_one(li, label, sym, class, types, &mut None, tight)?;
                context::set_slot(&mut self.heap, varlist, slot, arg);
            }
            if !found && !deferred.contains(&ref_sym) {
                // A refinement that exists on no parameter at all.
                let action_name = self.action_name(label);
                let name = self.syms.text(ref_sym).to_string();
                return self.fail(ErrorKind::BadRefinement { action: action_name, name });
            }
        }

        // Dispatch.
        let dispatcher = match action.action_parts() {
            Some((_, DispatchId(id))) => match self.dispatchers.get(id as usize) {
                Some(f) => *f,
                None => {
                    return self.fail(ErrorKind::NotAnAction {
                        word: self.action_name(label),
                    })
                }
            },
            None => unreachable!("checked by run_action"),
        };
        // The prior output survives invisibles; guard it across the
        // dispatcher, which may collect.
        let prev_out = self.levels[li].out;
        self.heap.push_guard_cell(prev_out);
        let dispatched = dispatcher(self, li);
        self.heap.drop_guard_cell();
        match dispatched? {
            Disposition::Invisible => {
                // The prior output (possibly stale) stands.
                self.levels[li].out = prev_out;
            }
            Disposition::Out => {
                // Return typeset check, when declared.
                for param in params {
                    if let Some((_, ParamClass::Return, types)) = param.param_parts() {
                        let out = self.levels[li].out;
                        if !kind_in_typeset(&out, types) {
                            let action_name = self.action_name(label);
                            let found = Interp::kind_name(&out).to_string();
                            return self.fail(ErrorKind::ReturnType {
                                action: action_name,
                                found,
                            });
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn fulfill_one(
        &mut self,
        li: usize,
        label: Option<SymbolId>,
        sym: SymbolId,
        class: ParamClass,
        types: u64,
        first_arg: &mut Option<Cell>,
        tight: bool,
    ) -> Outcome<Cell> {
        let endable = types & Kind::End.bit() != 0;
        let no_arg = |me: &mut Self| {
            let action = me.action_name(label);
            let param = me.syms.text(sym).to_string();
            ErrorKind::NoArg { action, param }
        };

        let arg = if let Some(left) = first_arg.take() {
            if left.is_end() || left.is_stale() {
                if endable {
                    Cell::nulled()
                } else {
                    let e = no_arg(self);
                    return self.fail(e);
                }
            } else {
                left
            }
        } else {
            match class {
                ParamClass::HardQuote => {
                    let peek = self.feed_peek(li);
                    if peek.is_end() {
                        if endable {
                            Cell::nulled()
                        } else {
                            let e = no_arg(self);
                            return self.fail(e);
                        }
                    } else if endable && !kind_in_typeset(&peek, types) {
                        // <skip> behavior: mismatched kind, leave it.
                        Cell::nulled()
                    } else {
                        let mut c = self.feed_advance(li)?;
                        c.flags.insert(CellFlags::UNEVALUATED);
                        c
                    }
                }
                ParamClass::SoftQuote => {
                    let peek = self.feed_peek(li);
                    if peek.is_end() {
                        if endable {
                            Cell::nulled()
                        } else {
                            let e = no_arg(self);
                            return self.fail(e);
                        }
                    } else if peek.quotes() == 0
                        && matches!(peek.kind(), Kind::Group | Kind::GetWord | Kind::GetPath)
                    {
                        // Escapable literal: evaluate the escape form.
                        let escape = self.feed_advance(li)?;
                        self.eval_soft_escape(li, escape)?
                    } else {
                        let mut c = self.feed_advance(li)?;
                        c.flags.insert(CellFlags::UNEVALUATED);
                        c
                    }
                }
                _ => {
                    // Normal: one evaluator step.
                    if self.feed_peek(li).is_end() {
                        if endable {
                            Cell::nulled()
                        } else {
                            let e = no_arg(self);
                            return self.fail(e);
                        }
                    } else {
                        let mut flags = StepFlags::FULFILLING_ARG;
                        if tight {
                            flags |= StepFlags::NO_LOOKAHEAD;
                        }
                        let r = self.eval_step_into(li, flags)?;
                        if r.is_stale() || r.is_end() {
                            if endable {
                                Cell::nulled()
                            } else {
                                let e = no_arg(self);
                                return self.fail(e);
                            }
                        } else {
                            r
                        }
                    }
                }
            }
        };

        if !arg.is_nulled() || types & Kind::Nulled.bit() != 0 {
            if !kind_in_typeset(&arg, types) {
                let action = self.action_name(label);
                let param = self.syms.text(sym).to_string();
                let found = Interp::kind_name(&arg).to_string();
                return self.fail(ErrorKind::ArgType { action, param, found });
            }
        } else if !endable {
            // NULLED argument against a typeset that refuses it.
            let action = self.action_name(label);
            let param = self.syms.text(sym).to_string();
            let found = "null".to_string();
            return self.fail(ErrorKind::ArgType { action, param, found });
        }
        Ok(arg)
    }

    fn eval_soft_escape(&mut self, li: usize, escape: Cell) -> Outcome<Cell> {
        let specifier = self.levels[li].feed.specifier;
        match escape.kind() {
            Kind::Group => {
                let node = escape.series_node().expect("group without storage");
                self.do_at(node, escape.series_index().unwrap_or(0), specifier)
            }
            Kind::GetWord => match self.lookup_word(&escape, specifier) {
                Some(v) => Ok(v),
                None => {
                    let word = escape
                        .symbol()
                        .map(|s| self.syms.text(s).to_string())
                        .unwrap_or_default();
                    self.fail(ErrorKind::NoValue { word })
                }
            },
            Kind::GetPath => {
                let saved = self.levels[li].out;
                self.eval_path(li, escape, true)?;
                let picked = self.levels[li].out;
                self.levels[li].out = saved;
                Ok(picked)
            }
            _ => Ok(escape),
        }
    }

}

/// Typeset membership by kind bit; quoted values test their heart kind.
pub(crate) fn kind_in_typeset(cell: &Cell, types: u64) -> bool {
    types & cell.kind().bit() != 0
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
    fn test_missing_argument_reports() {
        let mut i = interp();
        let err = i.do_source("add 1").unwrap_err();
        assert!(err.message().contains("missing"), "got: {}", err.message());
    }

    #[test]
    fn test_arg_type_check() {
        let mut i = interp();
        let err = i.do_source("add 1 \"two\"").unwrap_err();
        assert!(err.message().contains("does not allow"), "got: {}", err.message());
    }

    #[test]
    fn test_func_creates_action() {
        let mut i = interp();
        let out = i.do_source("double: func [n] [n * 2] double 21").unwrap();
        assert_eq!(out.as_integer(), Some(42));
    }

    #[test]
    fn test_func_return_unwinds() {
        let mut i = interp();
        let out = i
            .do_source("f: func [n] [if n = 1 [return 10] 20] f 1")
            .unwrap();
        assert_eq!(out.as_integer(), Some(10));
        let out = i.do_source("f 2").unwrap();
        assert_eq!(out.as_integer(), Some(20));
    }

    #[test]
    fn test_hard_quote_takes_literally() {
        let mut i = interp();
        let out = i.do_source("quote (1 + 2)").unwrap();
        assert_eq!(out.kind(), Kind::Group);
    }
}

//! PARSE Engine
//!
//! A recursive rule interpreter over any-series input. Each BLOCK! rule
//! recursion pushes a real call frame, so PARSE shows up in tracebacks
//! and honors HALT like any other evaluation.
//!
//! Rule walking accumulates per-rule state (iteration bounds, NOT/AHEAD
//! toggles, capture targets, mutation commands) and then applies a single
//! target rule between `mincount` and `maxcount` times. Failure seeks the
//! next `|` alternative, rewinding the input; success past a THEN commits
//! the current alternative, so later failure refuses the remaining
//! alternatives.
//!
//! ACCEPT/BREAK and REJECT unwind through the ordinary throw protocol
//! with their own sentinel labels; the nearest SUBPARSE iteration (or the
//! PARSE native itself) catches them.

use crate::frame::{CallFrame, StepFlags};
use crate::feed::Feed;
use crate::interp::{Abort, Disposition, Interp, Outcome};
use crate::action::ParamSpec;
use bitflags::bitflags;
use sigil_core::{
    Cell, CellFlags, ErrorKind, Kind, NodeId, SeriesData, SeriesFlags, SymbolId, SymbolTable,
    typesets, values_equal,
};
use tracing::debug;

bitflags! {
    /// Matching options threaded through every rule application.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub(crate) struct FindFlags: u8 {
        /// Case-sensitive comparison for strings and chars.
        const CASE = 1 << 0;
    }
}

/// Canon symbols for every PARSE keyword, interned once at boot.
#[derive(Debug)]
pub(crate) struct ParseWords {
    pub skip: SymbolId,
    pub end: SymbolId,
    pub to: SymbolId,
    pub thru: SymbolId,
    pub quote: SymbolId,
    pub lit: SymbolId,
    pub literal: SymbolId,
    pub match_: SymbolId,
    pub into: SymbolId,
    pub do_: SymbolId,
    pub some: SymbolId,
    pub any: SymbolId,
    pub while_: SymbolId,
    pub opt: SymbolId,
    pub not: SymbolId,
    pub and: SymbolId,
    pub ahead: SymbolId,
    pub then: SymbolId,
    pub remove: SymbolId,
    pub insert: SymbolId,
    pub change: SymbolId,
    pub copy: SymbolId,
    pub set: SymbolId,
    pub accept: SymbolId,
    pub break_: SymbolId,
    pub reject: SymbolId,
    pub fail: SymbolId,
    pub limit: SymbolId,
    pub debug: SymbolId,
}

impl ParseWords {
    pub fn intern(syms: &mut SymbolTable) -> Self {
        ParseWords {
            skip: syms.intern("skip"),
            end: syms.intern("end"),
            to: syms.intern("to"),
            thru: syms.intern("thru"),
            quote: syms.intern("quote"),
            lit: syms.intern("lit"),
            literal: syms.intern("literal"),
            match_: syms.intern("match"),
            into: syms.intern("into"),
            do_: syms.intern("do"),
            some: syms.intern("some"),
            any: syms.intern("any"),
            while_: syms.intern("while"),
            opt: syms.intern("opt"),
            not: syms.intern("not"),
            and: syms.intern("and"),
            ahead: syms.intern("ahead"),
            then: syms.intern("then"),
            remove: syms.intern("remove"),
            insert: syms.intern("insert"),
            change: syms.intern("change"),
            copy: syms.intern("copy"),
            set: syms.intern("set"),
            accept: syms.intern("accept"),
            break_: syms.intern("break"),
            reject: syms.intern("reject"),
            fail: syms.intern("fail"),
            limit: syms.intern("limit"),
            debug: syms.intern("??"),
        }
    }
}

/// The input series being matched.
#[derive(Debug, Clone, Copy)]
struct ParseInput {
    node: NodeId,
    shape: InputShape,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputShape {
    Array,
    Text,
    Binary,
}

impl ParseInput {
    fn from_cell(cell: &Cell) -> Option<ParseInput> {
        let node = cell.series_node()?;
        let shape = match cell.kind() {
            k if k.is_array() => InputShape::Array,
            k if k.is_text() => InputShape::Text,
            Kind::Binary => InputShape::Binary,
            _ => return None,
        };
        Some(ParseInput { node, shape })
    }
}

pub(crate) fn install(interp: &mut Interp) {
    let id = interp.register_dispatcher(native_parse);
    let act = interp.make_action(
        &[
            ParamSpec::normal("input", typesets::ANY_SERIES),
            ParamSpec::normal("rules", typesets::BLOCK),
            ParamSpec::refinement("case"),
        ],
        id,
        CellFlags::empty(),
    );
    interp.lib_set("parse", act);

    // Sentinel labels for PARSE's control throws. Invoking them outside
    // PARSE raises.
    let id = interp.register_dispatcher(native_parse_escape);
    let accept = interp.make_action(&[], id, CellFlags::empty());
    interp.sentinels.parse_accept = Some(accept);
    let reject = interp.make_action(&[], id, CellFlags::empty());
    interp.sentinels.parse_reject = Some(reject);
}

fn native_parse_escape(interp: &mut Interp, _li: usize) -> Outcome<Disposition> {
    interp.fail(ErrorKind::ParseCommand {
        rule: "accept/reject outside PARSE".to_string(),
    })
}

fn native_parse(interp: &mut Interp, li: usize) -> Outcome<Disposition> {
    let input = interp.arg(1);
    let rules = interp.arg(2);
    let cased = interp.arg(3).as_logic() == Some(true);

    let wrapper_quotes = input.quotes();
    let inner = input.unescaped();
    let Some(pin) = ParseInput::from_cell(&inner) else {
        return interp.fail(ErrorKind::ParseSeries);
    };
    let mut flags = FindFlags::empty();
    if cased {
        flags |= FindFlags::CASE;
    }
    let rules_node = rules.series_node().expect("rules without storage");
    let rules_start = rules.series_index().unwrap_or(0);
    let start = inner.series_index().unwrap_or(0);

    let result = match interp.subparse(li, pin, start, rules_node, rules_start, flags) {
        Ok(r) => r,
        Err(Abort::Throw) => {
            let thrown = interp.take_thrown();
            if Interp::is_sentinel(&interp.sentinels.parse_accept, &thrown.label) {
                thrown.payload.as_integer().map(|i| i as usize)
            } else if Interp::is_sentinel(&interp.sentinels.parse_reject, &thrown.label) {
                None
            } else {
                interp.thrown = Some(thrown);
                return Err(Abort::Throw);
            }
        }
        Err(e) => return Err(e),
    };

    let out = match result {
        Some(pos) => inner.at_index(pos).quoted(wrapper_quotes),
        None => Cell::nulled(),
    };
    interp.set_out(li, out);
    Ok(Disposition::Out)
}

/// One rule-block application: returns the input index after the match,
/// or None on failure. Pushes a call frame so PARSE recursion shows in
/// traces.
impl Interp {
    fn subparse(
        &mut self,
        li: usize,
        input: ParseInput,
        start: usize,
        rules_node: NodeId,
        rules_start: usize,
        flags: FindFlags,
    ) -> Outcome<Option<usize>> {
        if self.levels.len() + self.calls.len() >= self.config.level_limit {
            return self.fail(ErrorKind::StackOverflow);
        }
        let label = self.syms.intern("subparse");
        let varlist = self.heap.alloc(SeriesData::Array { cells: vec![Cell::end()] });
        self.heap.array_mut(varlist)[0] = Cell::frame(varlist);
        let dsp_orig = self.ds.dsp();
        self.calls.push(CallFrame {
            original: self.sentinels.parse_accept.unwrap_or_else(Cell::nulled),
            label: Some(label),
            varlist,
            dsp_orig,
        });
        let result = self.subparse_core(li, input, start, rules_node, rules_start, flags);
        self.calls.pop();
        self.ds.drop_to(dsp_orig);
        if !self.heap.has_flag(varlist, SeriesFlags::MANAGED) {
            self.heap.free(varlist);
        }
        result
    }

    fn input_len(&self, input: ParseInput) -> usize {
        self.heap.series(input.node).len()
    }

    #[allow(clippy::too_many_lines)]
    fn subparse_core(
        &mut self,
        li: usize,
        input: ParseInput,
        start: usize,
        rules_node: NodeId,
        rules_start: usize,
        flags: FindFlags,
    ) -> Outcome<Option<usize>> {
        let rules_len = self.heap.array_len(rules_node);
        let mut pos = start;
        let mut r = rules_start;
        // Alternatives all retry from the block-entry position.
        let alt_start = start;
        let mut committed = false;

        'rules: while r < rules_len {
            self.check_signals()?;
            let rule = self.heap.cell_at(rules_node, r);

            // `|`: the current alternative has succeeded.
            if rule.kind() == Kind::Bar {
                return Ok(Some(pos));
            }

            // Groups run for side effect only.
            if rule.kind() == Kind::Group {
                let node = rule.series_node().expect("group without storage");
                let spec = rule.binding().or(Some(self.user));
                self.do_at(node, rule.series_index().unwrap_or(0), spec)?;
                r += 1;
                continue;
            }

            // SET-WORD!: capture the current position (also on
            // zero-length matches; the position is the capture).
            if rule.kind() == Kind::SetWord {
                let capture = self.input_at(input, pos);
                self.set_var(&rule, Some(self.user), capture)?;
                r += 1;
                continue;
            }

            // GET-WORD!: seek to the position held by the variable.
            if rule.kind() == Kind::GetWord {
                let held = match self.lookup_word(&rule, Some(self.user)) {
                    Some(v) => v,
                    None => {
                        let word = self.rule_text(&rule);
                        return self.fail(ErrorKind::NoValue { word });
                    }
                };
                match held.series_node() {
                    Some(node) if node == input.node => {
                        pos = held.series_index().unwrap_or(0);
                    }
                    _ => {
                        let command = self.rule_text(&rule);
                        return self.fail(ErrorKind::ParseVariable { command });
                    }
                }
                r += 1;
                continue;
            }

            // SET-GROUP!: evaluate to find the word to set to the
            // current position.
            if rule.kind() == Kind::SetGroup {
                let node = rule.series_node().expect("group without storage");
                let spec = rule.binding().or(Some(self.user));
                let name = self.do_at(node, rule.series_index().unwrap_or(0), spec)?;
                if !name.kind().is_word() {
                    let rule_text = self.rule_text(&rule);
                    return self.fail(ErrorKind::ParseVariable { command: rule_text });
                }
                let capture = self.input_at(input, pos);
                self.set_var(&name, Some(self.user), capture)?;
                r += 1;
                continue;
            }

            // ---- per-rule modifier accumulation ----
            let mut mincount: i64 = 1;
            let mut maxcount: i64 = 1;
            let mut not_flag = false;
            let mut ahead_flag = false;
            let mut while_flag = false;
            let mut then_flag = false;
            let mut literal_next = false;
            let mut copy_target: Option<Cell> = None;
            let mut set_target: Option<Cell> = None;
            let mut remove_flag = false;
            let mut change_flag = false;

            loop {
                let rule = self.heap.cell_at(rules_node, r);
                match rule.kind() {
                    Kind::Integer => {
                        mincount = rule.as_integer().unwrap_or(1);
                        maxcount = mincount;
                        let next = self.heap.cell_at(rules_node, r + 1);
                        if next.kind() == Kind::Integer {
                            maxcount = next.as_integer().unwrap_or(mincount);
                            r += 1;
                        }
                        r += 1;
                        continue;
                    }
                    Kind::Word if rule.quotes() == 0 => {
                        let Some(sym) = rule.symbol() else { break };
                        let pw = &self.parse_words;
                        if sym == pw.some {
                            mincount = 1;
                            maxcount = i64::MAX;
                        } else if sym == pw.any {
                            mincount = 0;
                            maxcount = i64::MAX;
                        } else if sym == pw.while_ {
                            mincount = 0;
                            maxcount = i64::MAX;
                            while_flag = true;
                        } else if sym == pw.opt {
                            mincount = 0;
                            maxcount = 1;
                        } else if sym == pw.not {
                            not_flag = !not_flag;
                        } else if sym == pw.and || sym == pw.ahead || sym == pw.match_ {
                            ahead_flag = true;
                        } else if sym == pw.then {
                            then_flag = true;
                        } else if sym == pw.quote || sym == pw.lit || sym == pw.literal {
                            literal_next = true;
                            r += 1;
                            break;
                        } else if sym == pw.copy || sym == pw.set {
                            let var = self.heap.cell_at(rules_node, r + 1);
                            if !var.kind().is_word() {
                                let command = self.rule_text(&rule);
                                return self.fail(ErrorKind::ParseVariable { command });
                            }
                            if sym == pw.copy {
                                copy_target = Some(var);
                            } else {
                                set_target = Some(var);
                            }
                            r += 2;
                            continue;
                        } else if sym == pw.remove {
                            remove_flag = true;
                            r += 1;
                            continue;
                        } else if sym == pw.change {
                            change_flag = true;
                            r += 1;
                            continue;
                        } else if sym == pw.insert {
                            // INSERT matches nothing; it splices a value.
                            let value_rule = self.heap.cell_at(rules_node, r + 1);
                            let value = self.parse_rule_value(&value_rule)?;
                            let inserted = self.parse_insert(input, pos, &value)?;
                            pos += inserted;
                            r += 2;
                            continue 'rules;
                        } else if sym == pw.limit {
                            return self.fail(ErrorKind::ParseRule {
                                rule: "limit is reserved".to_string(),
                            });
                        } else if sym == pw.debug {
                            let next = self.heap.cell_at(rules_node, r + 1);
                            let molded = self.mold_value(&next);
                            debug!(pos, rule = %molded, "parse ??");
                            r += 1;
                            continue;
                        } else if sym == pw.fail {
                            // Forced failure of this alternative.
                            if committed {
                                return Ok(None);
                            }
                            match self.next_alternative(rules_node, r, rules_len) {
                                Some(next_r) => {
                                    r = next_r;
                                    pos = alt_start;
                                    continue 'rules;
                                }
                                None => return Ok(None),
                            }
                        } else if sym == pw.accept || sym == pw.break_ {
                            let label = self
                                .sentinels
                                .parse_accept
                                .expect("parse sentinels installed at boot");
                            return Err(self.throw(label, Cell::integer(pos as i64)));
                        } else if sym == pw.reject {
                            let label = self
                                .sentinels
                                .parse_reject
                                .expect("parse sentinels installed at boot");
                            return Err(self.throw(label, Cell::nulled()));
                        } else {
                            break;
                        }
                        r += 1;
                    }
                    _ => break,
                }
            }

            if r >= rules_len {
                // Modifiers with no rule to apply.
                return self.fail(ErrorKind::ParseCommand {
                    rule: "end of rule block after modifier".to_string(),
                });
            }

            let target = self.heap.cell_at(rules_node, r);
            let pw = &self.parse_words;

            // TO/THRU get their own scan loop.
            let target_sym = if target.quotes() == 0 { target.symbol() } else { None };
            let is_to = target.kind() == Kind::Word && target_sym == Some(pw.to);
            let is_thru = target.kind() == Kind::Word && target_sym == Some(pw.thru);
            let (matched, width): (Option<usize>, usize) = if is_to || is_thru {
                let goal = self.heap.cell_at(rules_node, r + 1);
                (self.parse_seek(li, input, pos, &goal, is_thru, flags)?, 2)
            } else if target.kind() == Kind::Word && target_sym == Some(pw.into) {
                let sub = self.heap.cell_at(rules_node, r + 1);
                (self.parse_into(li, input, pos, &sub, flags)?, 2)
            } else if target.kind() == Kind::Word && target_sym == Some(pw.do_) {
                let sub = self.heap.cell_at(rules_node, r + 1);
                (self.parse_do(li, input, pos, &sub, flags)?, 2)
            } else {
                // Ordinary rule applied mincount..maxcount times.
                // ACCEPT/BREAK and REJECT thrown inside the rule
                // terminate this iteration, not the whole parse.
                let mut count: i64 = 0;
                let mut cursor = pos;
                let mut rejected = false;
                while count < maxcount {
                    let step = if literal_next {
                        self.match_literal(input, cursor, &target, flags)
                    } else {
                        self.match_single(li, input, cursor, &target, flags)
                    };
                    let one = match step {
                        Ok(one) => one,
                        Err(Abort::Throw) => {
                            let thrown = self.take_thrown();
                            if Interp::is_sentinel(&self.sentinels.parse_accept, &thrown.label) {
                                cursor = thrown
                                    .payload
                                    .as_integer()
                                    .map(|i| i as usize)
                                    .unwrap_or(cursor);
                                count = count.max(mincount);
                                break;
                            }
                            if Interp::is_sentinel(&self.sentinels.parse_reject, &thrown.label) {
                                rejected = true;
                                break;
                            }
                            self.thrown = Some(thrown);
                            return Err(Abort::Throw);
                        }
                        Err(e) => return Err(e),
                    };
                    match one {
                        Some(next) => {
                            let progressed = next > cursor;
                            cursor = next;
                            count += 1;
                            if !progressed && !while_flag && maxcount == i64::MAX {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                let width = if change_flag { 2 } else { 1 };
                if count >= mincount && !rejected {
                    (Some(cursor), width)
                } else {
                    (None, width)
                }
            };

            let mut success = matched.is_some();
            if not_flag {
                success = !success;
            }

            if !success {
                if committed {
                    return Ok(None);
                }
                // Seek the next alternative.
                match self.next_alternative(rules_node, r, rules_len) {
                    Some(next_r) => {
                        r = next_r;
                        pos = alt_start;
                        continue 'rules;
                    }
                    None => return Ok(None),
                }
            }

            let match_end = matched.unwrap_or(pos);

            // Captures and mutations act on the matched span.
            if let Some(var) = set_target {
                let value = if input.shape == InputShape::Array && match_end > pos {
                    self.heap.cell_at(input.node, pos)
                } else if match_end > pos {
                    match self.heap.series(input.node).char_at(pos) {
                        Some(c) => Cell::char(c),
                        None => Cell::nulled(),
                    }
                } else {
                    Cell::nulled()
                };
                self.set_var(&var, Some(self.user), value)?;
            }
            if let Some(var) = copy_target {
                let value = self.parse_copy(input, pos, match_end)?;
                self.set_var(&var, Some(self.user), value)?;
            }

            let mut new_pos = match_end;
            if remove_flag && match_end > pos {
                self.parse_remove(input, pos, match_end)?;
                new_pos = pos;
            }
            if change_flag {
                let value_rule = self.heap.cell_at(rules_node, r + 1);
                let value = self.parse_rule_value(&value_rule)?;
                self.parse_remove(input, pos, match_end)?;
                let inserted = self.parse_insert(input, pos, &value)?;
                new_pos = pos + inserted;
            }

            if ahead_flag || not_flag {
                new_pos = pos;
            }
            pos = new_pos;
            if then_flag {
                committed = true;
            }
            r += width;
        }

        Ok(Some(pos))
    }

    fn next_alternative(&self, rules_node: NodeId, from: usize, rules_len: usize) -> Option<usize> {
        let mut i = from;
        while i < rules_len {
            if self.heap.cell_at(rules_node, i).kind() == Kind::Bar {
                return Some(i + 1);
            }
            i += 1;
        }
        None
    }

    /// The input re-anchored at `pos` as a value (position capture).
    fn input_at(&self, input: ParseInput, pos: usize) -> Cell {
        match input.shape {
            InputShape::Array => Cell::block(input.node).at_index(pos),
            InputShape::Text => Cell::text(input.node).at_index(pos),
            InputShape::Binary => Cell::binary(input.node).at_index(pos),
        }
    }

    fn rule_text(&self, rule: &Cell) -> String {
        sigil_core::mold_cell(&self.heap, &self.syms, rule)
    }

    /// Match one rule at `pos` without iteration bookkeeping.
    fn match_single(
        &mut self,
        li: usize,
        input: ParseInput,
        pos: usize,
        rule: &Cell,
        flags: FindFlags,
    ) -> Outcome<Option<usize>> {
        let len = self.input_len(input);
        let pw_skip = self.parse_words.skip;
        let pw_end = self.parse_words.end;

        match rule.kind() {
            Kind::Word if rule.quotes() == 0 => {
                let sym = rule.symbol().expect("word without symbol");
                if sym == pw_skip {
                    return Ok(if pos < len { Some(pos + 1) } else { None });
                }
                if sym == pw_end {
                    return Ok(if pos >= len { Some(pos) } else { None });
                }
                // A variable holding a rule.
                let value = match self.lookup_word(rule, Some(self.user)) {
                    Some(v) if !v.is_nulled() => v,
                    _ => {
                        let rule_text = self.rule_text(rule);
                        return self.fail(ErrorKind::ParseRule { rule: rule_text });
                    }
                };
                self.match_single(li, input, pos, &value, flags)
            }
            Kind::LitWord => self.match_literal(input, pos, rule, flags),
            Kind::Blank => Ok(Some(pos)),
            Kind::Block => {
                let node = rule.series_node().expect("block without storage");
                let start = rule.series_index().unwrap_or(0);
                self.subparse(li, input, pos, node, start, flags)
            }
            Kind::GetGroup => {
                // Evaluate, use the result as a rule in place. A NULL
                // result is a no-op.
                let node = rule.series_node().expect("group without storage");
                let spec = rule.binding().or(Some(self.user));
                let produced = self.do_at(node, rule.series_index().unwrap_or(0), spec)?;
                if produced.is_nulled() || produced.is_void() {
                    return Ok(Some(pos));
                }
                self.match_single(li, input, pos, &produced, flags)
            }
            Kind::Group => {
                let node = rule.series_node().expect("group without storage");
                let spec = rule.binding().or(Some(self.user));
                self.do_at(node, rule.series_index().unwrap_or(0), spec)?;
                Ok(Some(pos))
            }
            Kind::Datatype => {
                if input.shape != InputShape::Array {
                    let rule_text = self.rule_text(rule);
                    return self.fail(ErrorKind::ParseRule { rule: rule_text });
                }
                if pos >= len {
                    return Ok(None);
                }
                let element = self.heap.cell_at(input.node, pos);
                let kind = rule.datatype_kind().expect("datatype without kind");
                Ok(if element.kind() == kind && element.quotes() == 0 {
                    Some(pos + 1)
                } else {
                    None
                })
            }
            Kind::Typeset => {
                if input.shape != InputShape::Array {
                    let rule_text = self.rule_text(rule);
                    return self.fail(ErrorKind::ParseRule { rule: rule_text });
                }
                if pos >= len {
                    return Ok(None);
                }
                let element = self.heap.cell_at(input.node, pos);
                let bits = rule.typeset_bits().expect("typeset without bits");
                Ok(if bits & element.kind().bit() != 0 {
                    Some(pos + 1)
                } else {
                    None
                })
            }
            _ => self.match_literal(input, pos, rule, flags),
        }
    }

    /// Literal element/substring match.
    fn match_literal(
        &mut self,
        input: ParseInput,
        pos: usize,
        rule: &Cell,
        flags: FindFlags,
    ) -> Outcome<Option<usize>> {
        let len = self.input_len(input);
        let cased = flags.contains(FindFlags::CASE);
        match input.shape {
            InputShape::Array => {
                if pos >= len {
                    return Ok(None);
                }
                let element = self.heap.cell_at(input.node, pos);
                // A lit-word rule matches the word element.
                let probe = if rule.kind() == Kind::LitWord {
                    match rule.symbol() {
                        Some(sym) => Cell::word(sym),
                        None => *rule,
                    }
                } else {
                    *rule
                };
                Ok(if values_equal(&self.heap, &element, &probe, cased) {
                    Some(pos + 1)
                } else {
                    None
                })
            }
            InputShape::Text => {
                match rule.kind() {
                    Kind::Char => {
                        let want = rule.as_char().expect("char without payload");
                        match self.heap.series(input.node).char_at(pos) {
                            Some(c) if chars_equal(c, want, cased) => Ok(Some(pos + 1)),
                            _ => Ok(None),
                        }
                    }
                    k if k.is_text() => {
                        let want = match rule.series_node() {
                            Some(n) => self.heap.series(n).text_str().to_string(),
                            None => return Ok(None),
                        };
                        let have: String = self
                            .heap
                            .series(input.node)
                            .text_str()
                            .chars()
                            .skip(pos)
                            .take(want.chars().count())
                            .collect();
                        let matched = if cased {
                            have == want
                        } else {
                            have.to_lowercase() == want.to_lowercase()
                        };
                        Ok(if matched && !want.is_empty() {
                            Some(pos + want.chars().count())
                        } else if want.is_empty() {
                            Some(pos)
                        } else {
                            None
                        })
                    }
                    Kind::Bitset => {
                        let set = match rule.series_node() {
                            Some(n) => self.heap.series(n).bytes().to_vec(),
                            None => return Ok(None),
                        };
                        match self.heap.series(input.node).char_at(pos) {
                            Some(c) => {
                                let code = c as u32 as usize;
                                let hit = set
                                    .get(code / 8)
                                    .map(|b| b & (1 << (code % 8)) != 0)
                                    .unwrap_or(false);
                                Ok(if hit { Some(pos + 1) } else { None })
                            }
                            None => Ok(None),
                        }
                    }
                    _ => {
                        let rule_text = self.rule_text(rule);
                        self.fail(ErrorKind::ParseRule { rule: rule_text })
                    }
                }
            }
            InputShape::Binary => {
                let want: Vec<u8> = match rule.kind() {
                    Kind::Binary => match rule.series_node() {
                        Some(n) => self.heap.series(n).bytes().to_vec(),
                        None => Vec::new(),
                    },
                    k if k.is_text() => match rule.series_node() {
                        Some(n) => self.heap.series(n).text_str().as_bytes().to_vec(),
                        None => Vec::new(),
                    },
                    Kind::Integer => {
                        let b = rule.as_integer().unwrap_or(-1);
                        if !(0..=255).contains(&b) {
                            return Ok(None);
                        }
                        vec![b as u8]
                    }
                    _ => {
                        let rule_text = self.rule_text(rule);
                        return self.fail(ErrorKind::ParseRule { rule: rule_text });
                    }
                };
                let have = self.heap.series(input.node).bytes();
                if have.len() >= pos + want.len() && have[pos..pos + want.len()] == want[..] {
                    Ok(Some(pos + want.len()))
                } else {
                    Ok(None)
                }
            }
        }
    }

    /// TO/THRU: scan forward for the goal; TO stops at the match start,
    /// THRU past its end. A block goal tries alternatives.
    fn parse_seek(
        &mut self,
        li: usize,
        input: ParseInput,
        pos: usize,
        goal: &Cell,
        thru: bool,
        flags: FindFlags,
    ) -> Outcome<Option<usize>> {
        let len = self.input_len(input);
        // `to end` / `thru end`.
        if goal.kind() == Kind::Word && goal.quotes() == 0 {
            if goal.symbol() == Some(self.parse_words.end) {
                return Ok(Some(len));
            }
        }
        // An integer goal is an absolute (1-based) position seek.
        if goal.kind() == Kind::Integer {
            let n = goal.as_integer().unwrap_or(0);
            if n < 1 {
                return Ok(None);
            }
            let target = (n as usize - 1).min(len);
            return Ok(Some(target));
        }
        let mut i = pos;
        while i <= len {
            if let Some(end) = self.match_single(li, input, i, goal, flags)? {
                return Ok(Some(if thru { end } else { i }));
            }
            i += 1;
        }
        Ok(None)
    }

    /// INTO: the current element must itself be a series; the sub-rule
    /// must match it to its end.
    fn parse_into(
        &mut self,
        li: usize,
        input: ParseInput,
        pos: usize,
        sub: &Cell,
        flags: FindFlags,
    ) -> Outcome<Option<usize>> {
        if input.shape != InputShape::Array {
            return self.fail(ErrorKind::ParseArrayRequired { command: "into" });
        }
        if pos >= self.input_len(input) {
            return Ok(None);
        }
        let element = self.heap.cell_at(input.node, pos);
        let Some(inner) = ParseInput::from_cell(&element.unescaped()) else {
            return Ok(None);
        };
        if sub.kind() != Kind::Block {
            return self.fail(ErrorKind::ParseCommand {
                rule: self.rule_text(sub),
            });
        }
        let node = sub.series_node().expect("block without storage");
        let start = element.series_index().unwrap_or(0);
        match self.subparse(li, inner, start, node, sub.series_index().unwrap_or(0), flags)? {
            Some(end) if end == self.input_len(inner) => Ok(Some(pos + 1)),
            _ => Ok(None),
        }
    }

    /// DO: evaluate one expression from the input (array only), then
    /// match the sub-rule against the single result, wrapped as a frozen
    /// singleton.
    fn parse_do(
        &mut self,
        li: usize,
        input: ParseInput,
        pos: usize,
        sub: &Cell,
        flags: FindFlags,
    ) -> Outcome<Option<usize>> {
        if input.shape != InputShape::Array {
            return self.fail(ErrorKind::ParseArrayRequired { command: "do" });
        }
        if pos >= self.input_len(input) {
            return Ok(None);
        }
        let user = self.user;
        let inner_li = self.push_level(Feed::at_array(input.node, pos, Some(user)))?;
        let evaluated = self.eval_step_into(inner_li, StepFlags::empty());
        let consumed = {
            let feed = &self.levels[inner_li].feed;
            match feed.source {
                crate::feed::FeedSource::Array { index, .. } => {
                    if feed.current.is_end() {
                        index
                    } else {
                        index - 1
                    }
                }
                _ => pos,
            }
        };
        self.pop_level(inner_li, evaluated.is_err());
        let value = evaluated?;
        if value.is_stale() || value.is_end() {
            return Ok(None);
        }

        let singleton = self.heap.alloc_managed(SeriesData::Array { cells: vec![value] });
        self.heap.set_flag(singleton, SeriesFlags::PROTECTED);
        // Nothing else references the singleton while the sub-rule runs.
        self.heap.push_guard(singleton);
        let wrapped = ParseInput { node: singleton, shape: InputShape::Array };
        let matched = self.match_single(li, wrapped, 0, sub, flags);
        self.heap.drop_guard();
        match matched? {
            Some(1) => Ok(Some(consumed)),
            _ => Ok(None),
        }
    }

    /// COPY capture: the matched span. A single array element captures
    /// as the element itself.
    fn parse_copy(&mut self, input: ParseInput, from: usize, to: usize) -> Outcome<Cell> {
        match input.shape {
            InputShape::Array => {
                if to == from + 1 {
                    return Ok(self.heap.cell_at(input.node, from));
                }
                let cells: Vec<Cell> = (from..to).map(|i| self.heap.cell_at(input.node, i)).collect();
                let node = self.heap.alloc_managed(SeriesData::Array { cells });
                Ok(Cell::block(node))
            }
            InputShape::Text => {
                let text: String = self
                    .heap
                    .series(input.node)
                    .text_str()
                    .chars()
                    .skip(from)
                    .take(to - from)
                    .collect();
                Ok(self.make_text(Kind::Text, &text))
            }
            InputShape::Binary => {
                let bytes = self.heap.series(input.node).bytes();
                let slice = bytes[from.min(bytes.len())..to.min(bytes.len())].to_vec();
                let node = self.heap.alloc_managed(SeriesData::Binary { bytes: slice, bias: 0 });
                Ok(Cell::binary(node))
            }
        }
    }

    fn parse_remove(&mut self, input: ParseInput, from: usize, to: usize) -> Outcome<()> {
        if let Err(e) = self.heap.ensure_mutable(input.node) {
            return self.fail(e);
        }
        match input.shape {
            InputShape::Array => {
                let cells = self.heap.array_mut(input.node);
                let to = to.min(cells.len());
                cells.drain(from.min(to)..to);
            }
            InputShape::Text => {
                self.heap.series_mut(input.node).text_splice(from, to - from, "");
            }
            InputShape::Binary => {
                let series = self.heap.series_mut(input.node);
                let bytes = series.bytes_mut();
                let to = to.min(bytes.len());
                bytes.drain(from.min(to)..to);
            }
        }
        Ok(())
    }

    /// Insert `value` at `pos`, returning how many positions it spans.
    fn parse_insert(&mut self, input: ParseInput, pos: usize, value: &Cell) -> Outcome<usize> {
        if let Err(e) = self.heap.ensure_mutable(input.node) {
            return self.fail(e);
        }
        match input.shape {
            InputShape::Array => {
                let cells = self.heap.array_mut(input.node);
                let at = pos.min(cells.len());
                cells.insert(at, *value);
                Ok(1)
            }
            InputShape::Text => {
                let text = match value.series_node() {
                    Some(n) if value.kind().is_text() => {
                        self.heap.series(n).text_str().to_string()
                    }
                    _ => match value.as_char() {
                        Some(c) => c.to_string(),
                        None => self.mold_value(value),
                    },
                };
                let span = text.chars().count();
                self.heap.series_mut(input.node).text_splice(pos, 0, &text);
                Ok(span)
            }
            InputShape::Binary => {
                let bytes: Vec<u8> = match value.as_integer() {
                    Some(b) if (0..=255).contains(&b) => vec![b as u8],
                    _ => match value.series_node() {
                        Some(n) if value.kind() == Kind::Binary => {
                            self.heap.series(n).bytes().to_vec()
                        }
                        _ => {
                            return self.fail(ErrorKind::ParseRule {
                                rule: self.rule_text(value),
                            })
                        }
                    },
                };
                let span = bytes.len();
                let series = self.heap.series_mut(input.node);
                let buf = series.bytes_mut();
                let at = pos.min(buf.len());
                for (offset, b) in bytes.into_iter().enumerate() {
                    buf.insert(at + offset, b);
                }
                Ok(span)
            }
        }
    }

    /// The value for INSERT/CHANGE: a group evaluates, anything else is
    /// taken literally.
    fn parse_rule_value(&mut self, rule: &Cell) -> Outcome<Cell> {
        match rule.kind() {
            Kind::Group => {
                let node = rule.series_node().expect("group without storage");
                let spec = rule.binding().or(Some(self.user));
                self.do_at(node, rule.series_index().unwrap_or(0), spec)
            }
            Kind::LitWord => Ok(match rule.symbol() {
                Some(sym) => Cell::word(sym),
                None => *rule,
            }),
            _ => Ok(*rule),
        }
    }
}

fn chars_equal(a: char, b: char, cased: bool) -> bool {
    if cased {
        a == b
    } else {
        a.to_lowercase().eq(b.to_lowercase())
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
    fn test_basic_string_rules() {
        let mut i = interp();
        let out = i.do_source(r#"parse "aaabbb" [some "a" some "b"]"#).unwrap();
        assert_eq!(out.kind(), Kind::Text);
        assert_eq!(out.series_index(), Some(6));
    }

    #[test]
    fn test_failure_returns_null() {
        let mut i = interp();
        let out = i.do_source(r#"parse "aaabbb" [some "a" end]"#).unwrap();
        assert!(out.is_nulled());
    }

    #[test]
    fn test_datatype_and_copy() {
        let mut i = interp();
        let out = i
            .do_source(r#"parse [1 foo "bar"] [integer! copy w word! text!]"#)
            .unwrap();
        assert!(!out.is_nulled());
        let w = i.user_get("w").unwrap();
        assert_eq!(w.kind(), Kind::Word);
        assert_eq!(i.mold_value(&w), "foo");
    }

    #[test]
    fn test_alternation() {
        let mut i = interp();
        let out = i.do_source(r#"parse "b" ["a" | "b"]"#).unwrap();
        assert!(!out.is_nulled());
    }

    #[test]
    fn test_to_and_thru() {
        let mut i = interp();
        let out = i.do_source(r#"parse "xxyz" [to "y" thru "z"]"#).unwrap();
        assert!(!out.is_nulled());
        let out = i.do_source(r#"parse "xxyz" [thru "q"]"#).unwrap();
        assert!(out.is_nulled());
    }

    #[test]
    fn test_to_end_always_matches() {
        let mut i = interp();
        let out = i.do_source(r#"parse "abc" [to end]"#).unwrap();
        assert_eq!(out.series_index(), Some(3));
    }

    #[test]
    fn test_into_requires_full_match() {
        let mut i = interp();
        let out = i.do_source("parse [[1 2]] [into [integer! integer!]]").unwrap();
        assert!(!out.is_nulled());
        let out = i.do_source("parse [[1 2]] [into [integer!]]").unwrap();
        assert!(out.is_nulled());
    }

    #[test]
    fn test_position_capture_and_seek() {
        let mut i = interp();
        let out = i
            .do_source(r#"parse "aab" [some "a" mark: :mark "b"]"#)
            .unwrap();
        assert!(!out.is_nulled());
        let mark = i.user_get("mark").unwrap();
        assert_eq!(mark.series_index(), Some(2));
    }

    #[test]
    fn test_accept_and_reject() {
        let mut i = interp();
        let out = i.do_source(r#"parse "ab" ["a" accept "never"]"#).unwrap();
        assert!(!out.is_nulled());
        assert_eq!(out.series_index(), Some(1));
        let out = i.do_source(r#"parse "ab" ["a" reject | "x"]"#).unwrap();
        assert!(out.is_nulled());
    }

    #[test]
    fn test_remove_mutates_input() {
        let mut i = interp();
        let out = i.do_source(r#"s: "aaabbb" parse s [remove some "a" some "b"] s"#).unwrap();
        let text = i.heap().series(out.series_node().unwrap()).text_str().to_string();
        assert_eq!(text, "bbb");
    }

    #[test]
    fn test_parse_case_refinement() {
        let mut i = interp();
        let out = i.do_source(r#"parse "ABC" ["abc"]"#).unwrap();
        assert!(!out.is_nulled());
        let out = i.do_source(r#"parse/case "ABC" ["abc"]"#).unwrap();
        assert!(out.is_nulled());
    }
}

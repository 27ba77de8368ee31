//! Path Evaluation
//!
//! Paths traverse from a looked-up head through per-kind picks: context
//! fields by word, arrays by 1-based index or SELECT-style word search,
//! strings and binaries by index, pairs/times/dates by component name.
//!
//! A PATH! whose traversal lands on an ACTION! invokes it, with the
//! remaining path segments collected as refinements in path order. A
//! GET-PATH! never invokes; it fetches. SET-PATH! evaluation happens in
//! the evaluator (right-hand step first), which then calls [`Interp::set_path`]
//! to store through the final segment.

use crate::interp::{Interp, Outcome};
use sigil_core::{Cell, ErrorKind, Kind, Payload, SymbolId, context, values_equal};

impl Interp {
    /// Evaluate a PATH! or GET-PATH! into the level's output.
    pub(crate) fn eval_path(&mut self, li: usize, path: Cell, get_only: bool) -> Outcome<()> {
        let node = match path.series_node() {
            Some(n) => n,
            None => return self.fail(ErrorKind::BadPathPick { kind: "path!" }),
        };
        let start = path.series_index().unwrap_or(0);
        let len = self.heap.array_len(node);
        if len <= start {
            return self.fail(ErrorKind::BadPathPick { kind: "path!" });
        }
        let specifier = self.levels[li].feed.specifier;
        let head = self.heap.cell_at(node, start);
        let head_label = head.symbol();

        let mut current = match head.kind() {
            Kind::Word => {
                let binding = head.binding().or(path.binding());
                let head_bound = head.with_binding(binding);
                match self.lookup_word(&head_bound, specifier) {
                    Some(v) if !v.is_nulled() => v,
                    _ => {
                        let word = self.word_spelling(&head);
                        return self.fail(ErrorKind::NoValue { word });
                    }
                }
            }
            _ => head,
        };

        let mut refines: Vec<SymbolId> = Vec::new();
        let mut i = start + 1;
        while i < len {
            let selector = self.heap.cell_at(node, i);
            if current.kind() == Kind::Action && !get_only {
                // Remaining segments are refinements.
                match selector.symbol() {
                    Some(sym) if selector.kind() == Kind::Word => refines.push(sym),
                    _ => {
                        return self.fail(ErrorKind::BadPathPick { kind: "action!" });
                    }
                }
                i += 1;
                continue;
            }
            current = self.pick(li, &current, &selector)?;
            i += 1;
        }

        if current.kind() == Kind::Action && current.quotes() == 0 && !get_only {
            return self.run_action(li, current, head_label, None, &refines);
        }
        self.set_out(li, current);
        Ok(())
    }

    /// Store `value` through a SET-PATH!'s final segment.
    pub(crate) fn set_path(&mut self, li: usize, path: Cell, value: Cell) -> Outcome<()> {
        let node = match path.series_node() {
            Some(n) => n,
            None => return self.fail(ErrorKind::BadPathPick { kind: "set-path!" }),
        };
        let start = path.series_index().unwrap_or(0);
        let len = self.heap.array_len(node);
        if len < start + 2 {
            return self.fail(ErrorKind::BadPathPick { kind: "set-path!" });
        }
        let specifier = self.levels[li].feed.specifier;
        let head = self.heap.cell_at(node, start);
        let mut current = match head.kind() {
            Kind::Word => {
                let binding = head.binding().or(path.binding());
                let head_bound = head.with_binding(binding);
                match self.lookup_word(&head_bound, specifier) {
                    Some(v) if !v.is_nulled() => v,
                    _ => {
                        let word = self.word_spelling(&head);
                        return self.fail(ErrorKind::NoValue { word });
                    }
                }
            }
            _ => head,
        };
        // Traverse to the penultimate segment.
        for i in start + 1..len - 1 {
            let selector = self.heap.cell_at(node, i);
            current = self.pick(li, &current, &selector)?;
        }
        let last = self.heap.cell_at(node, len - 1);
        self.poke(&current, &last, value)
    }

    fn word_spelling(&self, cell: &Cell) -> String {
        cell.symbol()
            .map(|s| self.syms.text(s).to_string())
            .unwrap_or_default()
    }

    /// One pick step: `target/selector`.
    fn pick(&mut self, li: usize, target: &Cell, selector: &Cell) -> Outcome<Cell> {
        let _ = li;
        match target.kind() {
            Kind::Context | Kind::Frame | Kind::Error => {
                let varlist = match target.kind() {
                    Kind::Error => {
                        return self.fail(ErrorKind::BadPathPick { kind: "error!" });
                    }
                    _ => target.context_varlist(),
                };
                let Some(varlist) = varlist else {
                    return self.fail(ErrorKind::BadPathPick { kind: "object!" });
                };
                let Some(sym) = selector.symbol() else {
                    return self.fail(ErrorKind::BadPathPick { kind: "object!" });
                };
                match context::find_index(&self.heap, varlist, sym) {
                    Some(idx) => Ok(context::slot(&self.heap, varlist, idx)),
                    None => {
                        let word = self.word_spelling(selector);
                        self.fail(ErrorKind::NoValue { word })
                    }
                }
            }
            k if k.is_array() => {
                let node = target.series_node().expect("array without storage");
                self.heap.series(node).ensure_readable().map_err(|e| self.raise(e))?;
                let base = target.series_index().unwrap_or(0);
                match selector.kind() {
                    Kind::Integer => {
                        let n = selector.as_integer().unwrap_or(0);
                        if n < 1 {
                            return Ok(Cell::nulled());
                        }
                        let cell = self.heap.cell_at(node, base + n as usize - 1);
                        Ok(if cell.is_end() { Cell::nulled() } else { cell })
                    }
                    Kind::Word => {
                        // SELECT semantics: find the word, return the
                        // value that follows it.
                        let len = self.heap.array_len(node);
                        let probe = Cell::word(selector.symbol().expect("word without symbol"));
                        for i in base..len {
                            let item = self.heap.cell_at(node, i);
                            if item.kind().is_word()
                                && values_equal(&self.heap, &item.unescaped(), &probe, false)
                            {
                                let next = self.heap.cell_at(node, i + 1);
                                return Ok(if next.is_end() { Cell::nulled() } else { next });
                            }
                        }
                        Ok(Cell::nulled())
                    }
                    _ => self.fail(ErrorKind::BadPathPick { kind: "block!" }),
                }
            }
            k if k.is_text() => {
                let node = target.series_node().expect("text without storage");
                let base = target.series_index().unwrap_or(0);
                match selector.as_integer() {
                    Some(n) if n >= 1 => {
                        match self.heap.series(node).char_at(base + n as usize - 1) {
                            Some(c) => Ok(Cell::char(c)),
                            None => Ok(Cell::nulled()),
                        }
                    }
                    _ => self.fail(ErrorKind::BadPathPick { kind: "text!" }),
                }
            }
            Kind::Binary => {
                let node = target.series_node().expect("binary without storage");
                let base = target.series_index().unwrap_or(0);
                match selector.as_integer() {
                    Some(n) if n >= 1 => {
                        let bytes = self.heap.series(node).bytes();
                        match bytes.get(base + n as usize - 1) {
                            Some(&b) => Ok(Cell::integer(b as i64)),
                            None => Ok(Cell::nulled()),
                        }
                    }
                    _ => self.fail(ErrorKind::BadPathPick { kind: "binary!" }),
                }
            }
            Kind::Pair => {
                let Payload::Pair { x, y } = *target.payload() else {
                    return self.fail(ErrorKind::BadPathPick { kind: "pair!" });
                };
                match self.selector_name(selector).as_deref() {
                    Some("x") => Ok(Cell::decimal(x)),
                    Some("y") => Ok(Cell::decimal(y)),
                    _ => self.fail(ErrorKind::BadPathPick { kind: "pair!" }),
                }
            }
            Kind::Time => {
                let Payload::Time { nanos } = *target.payload() else {
                    return self.fail(ErrorKind::BadPathPick { kind: "time!" });
                };
                match self.selector_name(selector).as_deref() {
                    Some("hour") => Ok(Cell::integer(nanos / 3_600_000_000_000)),
                    Some("minute") => Ok(Cell::integer(nanos % 3_600_000_000_000 / 60_000_000_000)),
                    Some("second") => Ok(Cell::integer(nanos % 60_000_000_000 / 1_000_000_000)),
                    _ => self.fail(ErrorKind::BadPathPick { kind: "time!" }),
                }
            }
            Kind::Date => {
                let Payload::Date { year, month, day } = *target.payload() else {
                    return self.fail(ErrorKind::BadPathPick { kind: "date!" });
                };
                match self.selector_name(selector).as_deref() {
                    Some("year") => Ok(Cell::integer(year as i64)),
                    Some("month") => Ok(Cell::integer(month as i64)),
                    Some("day") => Ok(Cell::integer(day as i64)),
                    _ => self.fail(ErrorKind::BadPathPick { kind: "date!" }),
                }
            }
            k => self.fail(ErrorKind::BadPathPick { kind: k.name() }),
        }
    }

    fn selector_name(&self, selector: &Cell) -> Option<String> {
        selector.symbol().map(|s| self.syms.text(s).to_lowercase())
    }

    /// Store through the final path segment.
    fn poke(&mut self, target: &Cell, selector: &Cell, value: Cell) -> Outcome<()> {
        match target.kind() {
            Kind::Context | Kind::Frame => {
                let Some(varlist) = target.context_varlist() else {
                    return self.fail(ErrorKind::BadPathPick { kind: "object!" });
                };
                let Some(sym) = selector.symbol() else {
                    return self.fail(ErrorKind::BadPathPick { kind: "object!" });
                };
                match context::find_index(&self.heap, varlist, sym) {
                    Some(idx) => {
                        let slot = context::slot(&self.heap, varlist, idx);
                        if slot.flags.contains(sigil_core::CellFlags::PROTECTED) {
                            return self.fail(ErrorKind::Protected);
                        }
                        context::set_slot(&mut self.heap, varlist, idx, value);
                        Ok(())
                    }
                    None => {
                        let word = self.word_spelling(selector);
                        self.fail(ErrorKind::NoValue { word })
                    }
                }
            }
            k if k.is_array() => {
                let node = target.series_node().expect("array without storage");
                if let Err(e) = self.heap.ensure_mutable(node) {
                    return self.fail(e);
                }
                let base = target.series_index().unwrap_or(0);
                match selector.kind() {
                    Kind::Integer => {
                        let n = selector.as_integer().unwrap_or(0);
                        if n < 1 {
                            return self.fail(ErrorKind::IndexOutOfRange);
                        }
                        let idx = base + n as usize - 1;
                        let cells = self.heap.array_mut(node);
                        if idx >= cells.len() {
                            return self.fail(ErrorKind::IndexOutOfRange);
                        }
                        cells[idx] = value;
                        Ok(())
                    }
                    Kind::Word => {
                        let len = self.heap.array_len(node);
                        let probe = Cell::word(selector.symbol().expect("word without symbol"));
                        for i in base..len {
                            let item = self.heap.cell_at(node, i);
                            if item.kind().is_word()
                                && values_equal(&self.heap, &item.unescaped(), &probe, false)
                            {
                                if i + 1 >= len {
                                    return self.fail(ErrorKind::IndexOutOfRange);
                                }
                                self.heap.array_mut(node)[i + 1] = value;
                                return Ok(());
                            }
                        }
                        self.fail(ErrorKind::IndexOutOfRange)
                    }
                    _ => self.fail(ErrorKind::BadPathPick { kind: "block!" }),
                }
            }
            k => self.fail(ErrorKind::BadPathPick { kind: k.name() }),
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
    fn test_block_pick_by_index() {
        let mut i = interp();
        let out = i.do_source("b: [10 20 30] b/2").unwrap();
        assert_eq!(out.as_integer(), Some(20));
    }

    #[test]
    fn test_block_select_by_word() {
        let mut i = interp();
        let out = i.do_source("b: [x 1 y 2] b/y").unwrap();
        assert_eq!(out.as_integer(), Some(2));
    }

    #[test]
    fn test_set_path_pokes() {
        let mut i = interp();
        let out = i.do_source("b: [1 2 3] b/2: 99 b/2").unwrap();
        assert_eq!(out.as_integer(), Some(99));
    }

    #[test]
    fn test_get_path_fetches_action() {
        let mut i = interp();
        let out = i.do_source(":add/only").unwrap_err();
        // GET-PATH! picks, it does not collect refinements.
        assert!(out.message().contains("path picking"), "got: {}", out.message());
        let ok = i.do_source(":add").unwrap();
        assert_eq!(ok.kind(), Kind::Action);
    }
}

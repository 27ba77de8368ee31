//! Boot Natives
//!
//! The single registration point for every native the interpreter ships
//! with: control flow, the throw/catch family, invisibles, function
//! construction, enfix arithmetic and comparison, and the datatype/lib
//! constants. Each native is one entry in the flat dispatcher table plus
//! an ACTION! value installed in the lib context.
//!
//! Enfix operators are ordinary actions; the ENFIX (and for ELSE/THEN
//! class, DEFER) bits live on the cell stored in the lib slot, so `+` and
//! `add` share one dispatcher and one paramlist.

use crate::action::ParamSpec;
use crate::interp::{Abort, Disposition, Interp, Outcome};
use sigil_core::{
    Cell, CellFlags, ErrorKind, Kind, NodeId, ParamClass, SeriesData, cell::KIND_MAX, typesets,
    values_equal,
};

/// Install every native and boot constant.
pub(crate) fn install(interp: &mut Interp) {
    install_constants(interp);
    install_control(interp);
    install_throwers(interp);
    install_functions(interp);
    install_series_and_values(interp);
    install_math(interp);
    crate::parse::install(interp);
}

fn install_constants(interp: &mut Interp) {
    for name in ["true", "yes", "on"] {
        interp.lib_set(name, Cell::logic(true));
    }
    for name in ["false", "no", "off"] {
        interp.lib_set(name, Cell::logic(false));
    }
    for name in ["blank", "none"] {
        interp.lib_set(name, Cell::blank());
    }

    // Every kind gets its datatype word: integer!, block!, ...
    for k in 0..KIND_MAX {
        if let Ok(kind) = Kind::try_from(k) {
            if kind == Kind::End || kind == Kind::Param || kind == Kind::Nulled {
                continue;
            }
            interp.lib_set(kind.name(), Cell::datatype(kind));
        }
    }

    interp.lib_set("any-value!", Cell::typeset(typesets::ANY_VALUE));
    interp.lib_set("any-series!", Cell::typeset(typesets::ANY_SERIES));
    interp.lib_set("any-array!", Cell::typeset(typesets::ANY_ARRAY));
    interp.lib_set("any-string!", Cell::typeset(typesets::ANY_STRING));
    interp.lib_set("any-word!", Cell::typeset(typesets::ANY_WORD));
    interp.lib_set("any-number!", Cell::typeset(typesets::ANY_NUMBER));
}

/// The specifier a branch block should run under.
fn branch_specifier(interp: &Interp, li: usize, branch: &Cell) -> Option<NodeId> {
    branch.binding().or(interp.levels[li].feed.specifier)
}

fn run_branch(interp: &mut Interp, li: usize, branch: &Cell) -> Outcome<Cell> {
    let node = match branch.series_node() {
        Some(n) => n,
        None => {
            return interp.fail(ErrorKind::CannotUse {
                op: "run",
                kind: "non-block branch",
            })
        }
    };
    let spec = branch_specifier(interp, li, branch);
    interp.do_at(node, branch.series_index().unwrap_or(0), spec)
}

// ---------------------------------------------------------------------------
// Control flow
// ---------------------------------------------------------------------------

fn install_control(interp: &mut Interp) {
    let id = interp.register_dispatcher(native_if);
    let act = interp.make_action(
        &[
            ParamSpec::normal("condition", typesets::OPT_ANY_VALUE),
            ParamSpec::normal("branch", typesets::BLOCK),
        ],
        id,
        CellFlags::empty(),
    );
    interp.lib_set("if", act);

    let id = interp.register_dispatcher(native_either);
    let act = interp.make_action(
        &[
            ParamSpec::normal("condition", typesets::OPT_ANY_VALUE),
            ParamSpec::normal("true-branch", typesets::BLOCK),
            ParamSpec::normal("false-branch", typesets::BLOCK),
        ],
        id,
        CellFlags::empty(),
    );
    interp.lib_set("either", act);

    let id = interp.register_dispatcher(native_else);
    let mut act = interp.make_action(
        &[
            ParamSpec::normal("left", typesets::OPT_ANY_VALUE),
            ParamSpec::normal("branch", typesets::BLOCK),
        ],
        id,
        CellFlags::empty(),
    );
    act.flags |= CellFlags::ENFIX | CellFlags::DEFER;
    interp.lib_set("else", act);

    let id = interp.register_dispatcher(native_then);
    let mut act = interp.make_action(
        &[
            ParamSpec::normal("left", typesets::OPT_ANY_VALUE),
            ParamSpec::normal("branch", typesets::BLOCK),
        ],
        id,
        CellFlags::empty(),
    );
    act.flags |= CellFlags::ENFIX | CellFlags::DEFER;
    interp.lib_set("then", act);

    let id = interp.register_dispatcher(native_also);
    let mut act = interp.make_action(
        &[
            ParamSpec::normal("left", typesets::OPT_ANY_VALUE),
            ParamSpec::normal("branch", typesets::BLOCK),
        ],
        id,
        CellFlags::empty(),
    );
    act.flags |= CellFlags::ENFIX | CellFlags::DEFER;
    interp.lib_set("also", act);

    let id = interp.register_dispatcher(native_comment);
    let mut act = interp.make_action(
        &[ParamSpec::hard("discarded", typesets::ANY_VALUE)],
        id,
        CellFlags::empty(),
    );
    act.flags |= CellFlags::INVISIBLE;
    interp.lib_set("comment", act);

    let id = interp.register_dispatcher(native_elide);
    let mut act = interp.make_action(
        &[ParamSpec::normal("discarded", typesets::OPT_ANY_VALUE)],
        id,
        CellFlags::empty(),
    );
    act.flags |= CellFlags::INVISIBLE;
    interp.lib_set("elide", act);

    let id = interp.register_dispatcher(native_do);
    let act = interp.make_action(
        &[ParamSpec::normal("source", typesets::OPT_ANY_VALUE)],
        id,
        CellFlags::empty(),
    );
    interp.lib_set("do", act);

    let id = interp.register_dispatcher(native_loop);
    let act = interp.make_action(
        &[
            ParamSpec::normal("count", typesets::INTEGER),
            ParamSpec::normal("body", typesets::BLOCK),
        ],
        id,
        CellFlags::empty(),
    );
    interp.lib_set("loop", act);

    let id = interp.register_dispatcher(native_catch);
    let act = interp.make_action(
        &[ParamSpec::normal("block", typesets::BLOCK)],
        id,
        CellFlags::empty(),
    );
    interp.lib_set("catch", act);

    let id = interp.register_dispatcher(native_trap);
    let act = interp.make_action(
        &[ParamSpec::normal("block", typesets::BLOCK)],
        id,
        CellFlags::empty(),
    );
    interp.lib_set("trap", act);

    let id = interp.register_dispatcher(native_fail);
    let act = interp.make_action(
        &[ParamSpec::normal("reason", typesets::ANY_STRING | Kind::Error.bit())],
        id,
        CellFlags::empty(),
    );
    interp.lib_set("fail", act);
}

fn native_if(interp: &mut Interp, li: usize) -> Outcome<Disposition> {
    let condition = interp.arg(1);
    let branch = interp.arg(2);
    if condition.is_truthy() {
        let result = run_branch(interp, li, &branch)?;
        interp.set_out(li, result);
    } else {
        interp.set_out(li, Cell::nulled());
    }
    Ok(Disposition::Out)
}

fn native_either(interp: &mut Interp, li: usize) -> Outcome<Disposition> {
    let condition = interp.arg(1);
    let branch = if condition.is_truthy() {
        interp.arg(2)
    } else {
        interp.arg(3)
    };
    let result = run_branch(interp, li, &branch)?;
    interp.set_out(li, result);
    Ok(Disposition::Out)
}

fn native_else(interp: &mut Interp, li: usize) -> Outcome<Disposition> {
    let left = interp.arg(1);
    let branch = interp.arg(2);
    if left.is_nulled() || left.is_void() {
        let result = run_branch(interp, li, &branch)?;
        interp.set_out(li, result);
    } else {
        interp.set_out(li, left);
    }
    Ok(Disposition::Out)
}

fn native_then(interp: &mut Interp, li: usize) -> Outcome<Disposition> {
    let left = interp.arg(1);
    let branch = interp.arg(2);
    if left.is_nulled() || left.is_void() {
        interp.set_out(li, Cell::nulled());
    } else {
        let result = run_branch(interp, li, &branch)?;
        interp.set_out(li, result);
    }
    Ok(Disposition::Out)
}

fn native_also(interp: &mut Interp, li: usize) -> Outcome<Disposition> {
    let left = interp.arg(1);
    let branch = interp.arg(2);
    if !left.is_nulled() && !left.is_void() {
        run_branch(interp, li, &branch)?;
    }
    interp.set_out(li, left);
    Ok(Disposition::Out)
}

fn native_comment(_interp: &mut Interp, _li: usize) -> Outcome<Disposition> {
    Ok(Disposition::Invisible)
}

fn native_elide(_interp: &mut Interp, _li: usize) -> Outcome<Disposition> {
    Ok(Disposition::Invisible)
}

fn native_do(interp: &mut Interp, li: usize) -> Outcome<Disposition> {
    let source = interp.arg(1);
    let out = match source.kind() {
        Kind::Block | Kind::Group => {
            let node = source.series_node().expect("array without storage");
            let spec = branch_specifier(interp, li, &source);
            interp.do_at(node, source.series_index().unwrap_or(0), spec)?
        }
        k if k.is_text() => {
            let text = {
                let node = source.series_node().expect("text without storage");
                interp.heap.series(node).text_str().to_string()
            };
            let block = interp.scan_source(&text)?;
            let user = interp.user;
            interp.do_at(block, 0, Some(user))?
        }
        _ => source,
    };
    interp.set_out(li, out);
    Ok(Disposition::Out)
}

fn native_loop(interp: &mut Interp, li: usize) -> Outcome<Disposition> {
    let count = interp.arg(1).as_integer().unwrap_or(0);
    let body = interp.arg(2);
    let mut last = Cell::void();
    for _ in 0..count.max(0) {
        match run_branch(interp, li, &body) {
            Ok(v) => {
                // Keep the body result collector-visible across the next
                // iteration.
                interp.levels[li].spare = v;
                last = v;
            }
            Err(Abort::Throw) => {
                let thrown = interp.take_thrown();
                if Interp::is_sentinel(&interp.sentinels.break_, &thrown.label) {
                    interp.set_out(li, Cell::nulled());
                    return Ok(Disposition::Out);
                }
                if Interp::is_sentinel(&interp.sentinels.continue_, &thrown.label) {
                    continue;
                }
                // Not ours; put it back and keep unwinding.
                interp.thrown = Some(thrown);
                return Err(Abort::Throw);
            }
            Err(e) => return Err(e),
        }
    }
    interp.set_out(li, last);
    Ok(Disposition::Out)
}

fn native_catch(interp: &mut Interp, li: usize) -> Outcome<Disposition> {
    let block = interp.arg(1);
    match run_branch(interp, li, &block) {
        Ok(v) => interp.set_out(li, v),
        Err(Abort::Throw) => {
            let thrown = interp.take_thrown();
            if Interp::is_sentinel(&interp.sentinels.throw, &thrown.label) {
                interp.set_out(li, thrown.payload);
            } else {
                interp.thrown = Some(thrown);
                return Err(Abort::Throw);
            }
        }
        Err(e) => return Err(e),
    }
    Ok(Disposition::Out)
}

fn native_trap(interp: &mut Interp, li: usize) -> Outcome<Disposition> {
    let block = interp.arg(1);
    match run_branch(interp, li, &block) {
        Ok(v) => interp.set_out(li, v),
        Err(Abort::Fail(node)) => {
            let is_halt = interp
                .heap
                .series(node)
                .error_data()
                .map(|d| d.kind.is_halt())
                .unwrap_or(false);
            if is_halt {
                return Err(Abort::Fail(node));
            }
            interp.set_out(li, Cell::error(node));
        }
        Err(Abort::Throw) => return Err(Abort::Throw),
    }
    Ok(Disposition::Out)
}

fn native_fail(interp: &mut Interp, li: usize) -> Outcome<Disposition> {
    let _ = li;
    let reason = interp.arg(1);
    if let Some(node) = reason.error_node() {
        return Err(Abort::Fail(node));
    }
    let message = match reason.series_node() {
        Some(node) => interp.heap.series(node).text_str().to_string(),
        None => interp.mold_value(&reason),
    };
    interp.fail(ErrorKind::User { message })
}

// ---------------------------------------------------------------------------
// Throwers (sentinel-labeled)
// ---------------------------------------------------------------------------

fn install_throwers(interp: &mut Interp) {
    let id = interp.register_dispatcher(native_throw);
    let act = interp.make_action(
        &[ParamSpec::normal("value", typesets::OPT_ANY_VALUE)],
        id,
        CellFlags::empty(),
    );
    interp.lib_set("throw", act);
    interp.sentinels.throw = Some(act);

    let id = interp.register_dispatcher(native_self_throw);
    let act = interp.make_action(&[], id, CellFlags::empty());
    interp.lib_set("break", act);
    interp.sentinels.break_ = Some(act);

    let id = interp.register_dispatcher(native_self_throw);
    let act = interp.make_action(&[], id, CellFlags::empty());
    interp.lib_set("continue", act);
    interp.sentinels.continue_ = Some(act);

    let id = interp.register_dispatcher(native_self_throw);
    let act = interp.make_action(&[], id, CellFlags::empty());
    interp.lib_set("quit", act);
    interp.sentinels.quit = Some(act);

    let id = interp.register_dispatcher(native_return);
    let act = interp.make_action(
        &[ParamSpec::normal("value", typesets::OPT_ANY_VALUE | Kind::End.bit())],
        id,
        CellFlags::empty(),
    );
    interp.lib_set("return", act);
    interp.sentinels.return_ = Some(act);
}

/// THROW: the label is the THROW native itself; CATCH matches on it.
fn native_throw(interp: &mut Interp, _li: usize) -> Outcome<Disposition> {
    let payload = interp.arg(1);
    let label = interp.call().original;
    Err(interp.throw(label, payload))
}

/// BREAK/CONTINUE/QUIT: label themselves, no payload.
fn native_self_throw(interp: &mut Interp, _li: usize) -> Outcome<Disposition> {
    let label = interp.call().original;
    Err(interp.throw(label, Cell::nulled()))
}

fn native_return(interp: &mut Interp, _li: usize) -> Outcome<Disposition> {
    let payload = interp.arg(1);
    let label = interp.call().original;
    Err(interp.throw(label, payload))
}

// ---------------------------------------------------------------------------
// Function construction
// ---------------------------------------------------------------------------

fn install_functions(interp: &mut Interp) {
    let body_id = interp.register_dispatcher(dispatch_func_body);
    interp.func_dispatch = body_id;

    let id = interp.register_dispatcher(native_func);
    let act = interp.make_action(
        &[
            ParamSpec::normal("spec", typesets::BLOCK),
            ParamSpec::normal("body", typesets::BLOCK),
        ],
        id,
        CellFlags::empty(),
    );
    interp.lib_set("func", act);

    let id = interp.register_dispatcher(native_does);
    let act = interp.make_action(
        &[ParamSpec::normal("body", typesets::BLOCK)],
        id,
        CellFlags::empty(),
    );
    interp.lib_set("does", act);
}

/// Translate a spec block into PARAM cells: `word` normal, `'word` hard,
/// `:word` soft, `/word` refinement, `return: [types]` the return
/// typeset, a block restricting the preceding parameter's typeset.
fn build_func_params(interp: &mut Interp, spec: &Cell) -> Outcome<Vec<Cell>> {
    let node = spec.series_node().expect("spec without storage");
    let len = interp.heap.array_len(node);
    let mut params: Vec<Cell> = vec![Cell::end()]; // archetype slot
    let mut locals_mode = false;
    let mut i = spec.series_index().unwrap_or(0);
    while i < len {
        let item = interp.heap.cell_at(node, i);
        match item.kind() {
            Kind::Tag => {
                let tag = match item.series_node() {
                    Some(n) => interp.heap.series(n).text_str().to_lowercase(),
                    None => String::new(),
                };
                if tag == "local" {
                    locals_mode = true;
                }
            }
            Kind::Word if locals_mode => {
                let sym = item.symbol().expect("word without symbol");
                params.push(Cell::param(sym, ParamClass::Local, typesets::OPT_ANY_VALUE));
            }
            Kind::Word => {
                let sym = item.symbol().expect("word without symbol");
                params.push(Cell::param(sym, ParamClass::Normal, typesets::ANY_VALUE));
            }
            Kind::LitWord => {
                let sym = item.symbol().expect("word without symbol");
                params.push(Cell::param(sym, ParamClass::HardQuote, typesets::ANY_VALUE));
            }
            Kind::GetWord => {
                let sym = item.symbol().expect("word without symbol");
                params.push(Cell::param(sym, ParamClass::SoftQuote, typesets::ANY_VALUE));
            }
            Kind::Refinement => {
                let sym = item.symbol().expect("word without symbol");
                params.push(Cell::param(sym, ParamClass::Refinement, typesets::LOGIC));
            }
            Kind::SetWord => {
                // `return: [types]`
                let sym = item.symbol().expect("word without symbol");
                if interp.syms.text(sym).eq_ignore_ascii_case("return") {
                    i += 1;
                    let types_block = interp.heap.cell_at(node, i);
                    let types = typeset_from_block(interp, &types_block)?;
                    params.push(Cell::param(sym, ParamClass::Return, types));
                } else {
                    let text = interp.mold_value(&item);
                    return interp.fail(ErrorKind::User {
                        message: format!("invalid function spec item: {text}"),
                    });
                }
            }
            Kind::Block => {
                // Typeset restriction on the preceding parameter.
                let types = typeset_from_block(interp, &item)?;
                if let Some(last) = params.last_mut() {
                    if let Some((sym, class, _)) = last.param_parts() {
                        *last = Cell::param(sym, class, types);
                    }
                }
            }
            Kind::Text => {} // description strings
            _ => {
                let text = interp.mold_value(&item);
                return interp.fail(ErrorKind::User {
                    message: format!("invalid function spec item: {text}"),
                });
            }
        }
        i += 1;
    }
    Ok(params)
}

fn typeset_from_block(interp: &mut Interp, block: &Cell) -> Outcome<u64> {
    let Some(node) = block.series_node() else {
        return interp.fail(ErrorKind::User {
            message: "function spec expected a block of types".to_string(),
        });
    };
    let len = interp.heap.array_len(node);
    let mut bits = 0u64;
    for i in 0..len {
        let item = interp.heap.cell_at(node, i);
        if item.kind() == Kind::Tag {
            // `<opt>` admits NULLED; `<end>` makes the parameter endable.
            let tag = match item.series_node() {
                Some(n) => interp.heap.series(n).text_str().to_lowercase(),
                None => String::new(),
            };
            match tag.as_str() {
                "opt" => bits |= Kind::Nulled.bit(),
                "end" => bits |= Kind::End.bit(),
                _ => {}
            }
            continue;
        }
        let Some(sym) = item.symbol() else {
            return interp.fail(ErrorKind::User {
                message: "type blocks hold datatype words".to_string(),
            });
        };
        let name = interp.syms.text(sym).to_string();
        match crate::scanner::kind_from_name(&name) {
            Some(kind) => bits |= kind.bit(),
            None => match interp.lib_get(&name).and_then(|c| c.typeset_bits()) {
                Some(mask) => bits |= mask,
                None => {
                    return interp.fail(ErrorKind::User {
                        message: format!("unknown type word: {name}"),
                    })
                }
            },
        }
    }
    Ok(bits)
}

fn native_func(interp: &mut Interp, li: usize) -> Outcome<Disposition> {
    let spec = interp.arg(1);
    let body = interp.arg(2);
    let params = build_func_params(interp, &spec)?;
    let paramlist = interp.heap.alloc_managed(SeriesData::Array { cells: params });
    let dispatch = interp.func_dispatch;
    let archetype = Cell::action(paramlist, dispatch);
    interp.heap.array_mut(paramlist)[0] = archetype;
    let body_node = body.series_node().expect("body without storage");
    interp.set_action_body(&archetype, body_node);
    interp.set_out(li, archetype);
    Ok(Disposition::Out)
}

fn native_does(interp: &mut Interp, li: usize) -> Outcome<Disposition> {
    let body = interp.arg(1);
    let paramlist = interp.heap.alloc_managed(SeriesData::Array { cells: vec![Cell::end()] });
    let dispatch = interp.func_dispatch;
    let archetype = Cell::action(paramlist, dispatch);
    interp.heap.array_mut(paramlist)[0] = archetype;
    let body_node = body.series_node().expect("body without storage");
    interp.set_action_body(&archetype, body_node);
    interp.set_out(li, archetype);
    Ok(Disposition::Out)
}

/// Run a FUNC body: the frame varlist is the body's specifier, so the
/// arguments resolve as words. RETURN throws unwind to the nearest
/// function frame.
fn dispatch_func_body(interp: &mut Interp, li: usize) -> Outcome<Disposition> {
    let action = interp.call().original;
    let varlist = interp.call().varlist;
    let body = match interp.action_body(&action) {
        Some(b) => b,
        None => {
            return interp.fail(ErrorKind::NotAnAction {
                word: "function without body".to_string(),
            })
        }
    };
    match interp.do_at(body, 0, Some(varlist)) {
        Ok(v) => {
            interp.set_out(li, v);
            Ok(Disposition::Out)
        }
        Err(Abort::Throw) => {
            let thrown = interp.take_thrown();
            if Interp::is_sentinel(&interp.sentinels.return_, &thrown.label) {
                interp.set_out(li, thrown.payload);
                Ok(Disposition::Out)
            } else {
                interp.thrown = Some(thrown);
                Err(Abort::Throw)
            }
        }
        Err(e) => Err(e),
    }
}

// ---------------------------------------------------------------------------
// Values and series
// ---------------------------------------------------------------------------

fn install_series_and_values(interp: &mut Interp) {
    let id = interp.register_dispatcher(native_get);
    let act = interp.make_action(
        &[ParamSpec::normal("source", typesets::ANY_WORD | typesets::ANY_ARRAY)],
        id,
        CellFlags::empty(),
    );
    interp.lib_set("get", act);

    let id = interp.register_dispatcher(native_set);
    let act = interp.make_action(
        &[
            ParamSpec::normal("target", typesets::ANY_WORD),
            ParamSpec::normal("value", typesets::OPT_ANY_VALUE),
        ],
        id,
        CellFlags::empty(),
    );
    interp.lib_set("set", act);

    let id = interp.register_dispatcher(native_mold);
    let act = interp.make_action(
        &[ParamSpec::normal("value", typesets::ANY_VALUE)],
        id,
        CellFlags::empty(),
    );
    interp.lib_set("mold", act);

    let id = interp.register_dispatcher(native_type_of);
    let act = interp.make_action(
        &[ParamSpec::normal("value", typesets::OPT_ANY_VALUE)],
        id,
        CellFlags::empty(),
    );
    interp.lib_set("type-of", act);

    let id = interp.register_dispatcher(native_quote);
    let act = interp.make_action(
        &[ParamSpec::hard("value", typesets::ANY_VALUE)],
        id,
        CellFlags::empty(),
    );
    interp.lib_set("quote", act);

    let id = interp.register_dispatcher(native_recycle);
    let act = interp.make_action(&[], id, CellFlags::empty());
    interp.lib_set("recycle", act);

    let id = interp.register_dispatcher(native_not);
    let act = interp.make_action(
        &[ParamSpec::normal("value", typesets::OPT_ANY_VALUE)],
        id,
        CellFlags::empty(),
    );
    interp.lib_set("not", act);
}

fn native_get(interp: &mut Interp, li: usize) -> Outcome<Disposition> {
    let source = interp.arg(1);
    let specifier = interp.levels[li].feed.specifier;
    let out = if source.kind().is_word() {
        interp.lookup_word(&source, specifier).unwrap_or_else(Cell::nulled)
    } else {
        source
    };
    interp.set_out(li, out);
    Ok(Disposition::Out)
}

fn native_set(interp: &mut Interp, li: usize) -> Outcome<Disposition> {
    let target = interp.arg(1);
    let value = interp.arg(2);
    let specifier = interp.levels[li].feed.specifier;
    interp.set_var(&target, specifier, value)?;
    interp.set_out(li, value);
    Ok(Disposition::Out)
}

fn native_mold(interp: &mut Interp, li: usize) -> Outcome<Disposition> {
    let value = interp.arg(1);
    let text = interp.mold_value(&value);
    let cell = interp.make_text(Kind::Text, &text);
    interp.set_out(li, cell);
    Ok(Disposition::Out)
}

fn native_type_of(interp: &mut Interp, li: usize) -> Outcome<Disposition> {
    let value = interp.arg(1);
    let out = if value.is_nulled() {
        Cell::nulled()
    } else {
        Cell::datatype(value.kind())
    };
    interp.set_out(li, out);
    Ok(Disposition::Out)
}

fn native_quote(interp: &mut Interp, li: usize) -> Outcome<Disposition> {
    let mut value = interp.arg(1);
    value.flags.remove(CellFlags::UNEVALUATED);
    interp.set_out(li, value);
    Ok(Disposition::Out)
}

fn native_recycle(interp: &mut Interp, li: usize) -> Outcome<Disposition> {
    let freed = interp.recycle();
    interp.set_out(li, Cell::integer(freed as i64));
    Ok(Disposition::Out)
}

fn native_not(interp: &mut Interp, li: usize) -> Outcome<Disposition> {
    let value = interp.arg(1);
    interp.set_out(li, Cell::logic(!value.is_truthy()));
    Ok(Disposition::Out)
}

// ---------------------------------------------------------------------------
// Math and comparison
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, PartialEq)]
enum MathOp {
    Add,
    Subtract,
    Multiply,
    Divide,
}

fn install_math(interp: &mut Interp) {
    let pairs: [(&str, &str, fn(&mut Interp, usize) -> Outcome<Disposition>); 4] = [
        ("add", "+", native_add),
        ("subtract", "-", native_subtract),
        ("multiply", "*", native_multiply),
        ("divide", "/", native_divide),
    ];
    for (name, op, dispatcher) in pairs {
        let id = interp.register_dispatcher(dispatcher);
        let act = interp.make_action(
            &[
                ParamSpec::normal("value1", typesets::ANY_NUMBER),
                ParamSpec::normal("value2", typesets::ANY_NUMBER),
            ],
            id,
            CellFlags::empty(),
        );
        interp.lib_set(name, act);
        let mut enfixed = act;
        enfixed.flags |= CellFlags::ENFIX;
        interp.lib_set(op, enfixed);
    }

    let cmps: [(&str, &str, fn(&mut Interp, usize) -> Outcome<Disposition>); 6] = [
        ("equal?", "=", native_equal),
        ("not-equal?", "<>", native_not_equal),
        ("lesser?", "<", native_lesser),
        ("greater?", ">", native_greater),
        ("lesser-or-equal?", "<=", native_lesser_eq),
        ("greater-or-equal?", ">=", native_greater_eq),
    ];
    for (name, op, dispatcher) in cmps {
        let id = interp.register_dispatcher(dispatcher);
        let act = interp.make_action(
            &[
                ParamSpec::normal("value1", typesets::OPT_ANY_VALUE),
                ParamSpec::normal("value2", typesets::OPT_ANY_VALUE),
            ],
            id,
            CellFlags::empty(),
        );
        interp.lib_set(name, act);
        let mut enfixed = act;
        enfixed.flags |= CellFlags::ENFIX;
        interp.lib_set(op, enfixed);
    }
}

fn math_op(interp: &mut Interp, li: usize, op: MathOp) -> Outcome<Disposition> {
    let a = interp.arg(1);
    let b = interp.arg(2);
    let out = match (a.as_integer(), b.as_integer()) {
        (Some(x), Some(y)) => {
            let result = match op {
                MathOp::Add => x.checked_add(y),
                MathOp::Subtract => x.checked_sub(y),
                MathOp::Multiply => x.checked_mul(y),
                MathOp::Divide => {
                    if y == 0 {
                        return interp.fail(ErrorKind::DivideByZero);
                    }
                    if x % y == 0 {
                        x.checked_div(y)
                    } else {
                        // Inexact integer division promotes to decimal.
                        interp.set_out(li, Cell::decimal(x as f64 / y as f64));
                        return Ok(Disposition::Out);
                    }
                }
            };
            match result {
                Some(v) => Cell::integer(v),
                None => return interp.fail(ErrorKind::Overflow),
            }
        }
        _ => {
            let x = number_of(&a);
            let y = number_of(&b);
            match (x, y) {
                (Some(x), Some(y)) => {
                    let v = match op {
                        MathOp::Add => x + y,
                        MathOp::Subtract => x - y,
                        MathOp::Multiply => x * y,
                        MathOp::Divide => {
                            if y == 0.0 {
                                return interp.fail(ErrorKind::DivideByZero);
                            }
                            x / y
                        }
                    };
                    if !v.is_finite() {
                        return interp.fail(ErrorKind::Overflow);
                    }
                    Cell::decimal(v)
                }
                _ => {
                    return interp.fail(ErrorKind::CannotUse {
                        op: "do math on",
                        kind: Interp::kind_name(&a),
                    })
                }
            }
        }
    };
    interp.set_out(li, out);
    Ok(Disposition::Out)
}

fn number_of(cell: &Cell) -> Option<f64> {
    cell.as_integer().map(|i| i as f64).or_else(|| cell.as_decimal())
}

fn native_add(interp: &mut Interp, li: usize) -> Outcome<Disposition> {
    math_op(interp, li, MathOp::Add)
}

fn native_subtract(interp: &mut Interp, li: usize) -> Outcome<Disposition> {
    math_op(interp, li, MathOp::Subtract)
}

fn native_multiply(interp: &mut Interp, li: usize) -> Outcome<Disposition> {
    math_op(interp, li, MathOp::Multiply)
}

fn native_divide(interp: &mut Interp, li: usize) -> Outcome<Disposition> {
    math_op(interp, li, MathOp::Divide)
}

fn native_equal(interp: &mut Interp, li: usize) -> Outcome<Disposition> {
    let a = interp.arg(1);
    let b = interp.arg(2);
    let eq = values_equal(&interp.heap, &a, &b, false);
    interp.set_out(li, Cell::logic(eq));
    Ok(Disposition::Out)
}

fn native_not_equal(interp: &mut Interp, li: usize) -> Outcome<Disposition> {
    let a = interp.arg(1);
    let b = interp.arg(2);
    let eq = values_equal(&interp.heap, &a, &b, false);
    interp.set_out(li, Cell::logic(!eq));
    Ok(Disposition::Out)
}

fn compare(interp: &mut Interp, li: usize, test: fn(std::cmp::Ordering) -> bool) -> Outcome<Disposition> {
    let a = interp.arg(1);
    let b = interp.arg(2);
    let ordering = match (number_of(&a), number_of(&b)) {
        (Some(x), Some(y)) => x.partial_cmp(&y),
        _ => match (a.as_char(), b.as_char()) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => {
                let (na, nb) = (a.series_node(), b.series_node());
                if a.kind().is_text() && b.kind().is_text() {
                    match (na, nb) {
                        (Some(na), Some(nb)) => {
                            let sa = interp.heap.series(na).text_str().to_lowercase();
                            let sb = interp.heap.series(nb).text_str().to_lowercase();
                            Some(sa.cmp(&sb))
                        }
                        _ => None,
                    }
                } else {
                    None
                }
            }
        },
    };
    match ordering {
        Some(ord) => {
            interp.set_out(li, Cell::logic(test(ord)));
            Ok(Disposition::Out)
        }
        None => interp.fail(ErrorKind::CannotUse {
            op: "compare",
            kind: Interp::kind_name(&a),
        }),
    }
}

fn native_lesser(interp: &mut Interp, li: usize) -> Outcome<Disposition> {
    compare(interp, li, |o| o == std::cmp::Ordering::Less)
}

fn native_greater(interp: &mut Interp, li: usize) -> Outcome<Disposition> {
    compare(interp, li, |o| o == std::cmp::Ordering::Greater)
}

fn native_lesser_eq(interp: &mut Interp, li: usize) -> Outcome<Disposition> {
    compare(interp, li, |o| o != std::cmp::Ordering::Greater)
}

fn native_greater_eq(interp: &mut Interp, li: usize) -> Outcome<Disposition> {
    compare(interp, li, |o| o != std::cmp::Ordering::Less)
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
    fn test_if_else_deferred() {
        let mut i = interp();
        let out = i.do_source("if false [10] else [20]").unwrap();
        assert_eq!(out.as_integer(), Some(20));
        let out = i.do_source("if true [10] else [20]").unwrap();
        assert_eq!(out.as_integer(), Some(10));
    }

    #[test]
    fn test_then_chains_on_value() {
        let mut i = interp();
        let out = i.do_source("1 then [2]").unwrap();
        assert_eq!(out.as_integer(), Some(2));
        let out = i.do_source("if false [1] then [2]").unwrap();
        assert!(out.is_nulled());
    }

    #[test]
    fn test_catch_throw_label() {
        let mut i = interp();
        let out = i.do_source("catch [loop 10 [throw 'done]]").unwrap();
        assert_eq!(out.kind(), Kind::Word);
        assert_eq!(i.mold_value(&out), "done");
    }

    #[test]
    fn test_loop_break_continue() {
        let mut i = interp();
        let out = i.do_source("x: 0 loop 10 [x: x + 1 if x = 3 [break]] x").unwrap();
        assert_eq!(out.as_integer(), Some(3));
    }

    #[test]
    fn test_trap_produces_error_value() {
        let mut i = interp();
        let out = i.do_source("trap [fail \"boom\"]").unwrap();
        assert_eq!(out.kind(), Kind::Error);
        let data = i.error_data(&out).unwrap();
        assert!(data.message().contains("boom"));
    }

    #[test]
    fn test_comment_is_invisible() {
        let mut i = interp();
        let out = i.do_source("1 comment \"x\" + 2").unwrap();
        assert_eq!(out.as_integer(), Some(3));
    }

    #[test]
    fn test_incomplete_enfix_right_errors() {
        let mut i = interp();
        let err = i.do_source("1 + comment \"x\"").unwrap_err();
        assert!(err.message().contains("missing"), "got: {}", err.message());
    }

    #[test]
    fn test_division() {
        let mut i = interp();
        assert_eq!(i.do_source("divide 7 2").unwrap().as_decimal(), Some(3.5));
        assert_eq!(i.do_source("divide 8 2").unwrap().as_integer(), Some(4));
        assert!(i.do_source("divide 1 0").is_err());
    }

    #[test]
    fn test_mold_native() {
        let mut i = interp();
        let out = i.do_source("mold [a 1 \"s\"]").unwrap();
        assert_eq!(i.heap().series(out.series_node().unwrap()).text_str(), "[a 1 \"s\"]");
    }
}

// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Per-block assembly.
//!
//! A block holds one or more DFAs sharing a condition namespace. The three
//! emission models shape the output differently:
//!
//! - goto/label: states are labeled code blocks joined by gotos;
//! - loop/switch: states are numbered cases of a switch on `yystate`,
//!   wrapped in an infinite loop;
//! - rec/func: every state is a function and transfers are tail calls.
//!
//! The common preamble declares `yych`/`yyaccept`, bitmap tables, and (for
//! computed gotos over conditions) the condition table.

use crate::dfa::{Dfa, Label};
use crate::opts::{CodeModel, Target};

use super::action::{emit_action, emit_state};
use super::api::gen_abort;
use super::code::{
    BlockKind, CaseKind, Code, CodeCases, CodeKind, CodeList, VarType,
};
use super::directives::gen_state_goto_implicit;
use super::go::{gen_bitmap, gen_go};
use super::{CodegenResult, Ctx, cond_enum_elem, fn_name_for_cond};

/// Prepend the storable-state resume cases to the `yystate` switch and widen
/// the first state case to also cover `yystate = -1` (initial entry, no
/// refill in flight).
fn gen_storable_state_cases<'a>(cx: &mut Ctx<'a, '_>, cases: &'a CodeCases<'a>) {
    let arena = cx.arena;
    if !cx.opts.storable_state || cx.opts.code_model == CodeModel::GotoLabel {
        return;
    }

    for (&idx, &resume) in cx.block.fill_goto.borrow().iter() {
        cases.push(arena, CaseKind::Number(idx as i64), resume);
    }

    let first = cases.head().expect("empty state switch");
    debug_assert!(matches!(*first.kind.borrow(), CaseKind::Number(0)));
    let ranges = &*arena.alloc_slice(&[(-1i64, 0i64)]);
    *first.kind.borrow_mut() = CaseKind::Ranges(ranges);
}

// In theory no guarantee is made about the order of conditions in the
// generated lexer; users should dispatch through the condition type and the
// get/set primitives. But it is possible to hardcode condition numbers and
// let the generator dispatch on them (nested ifs, computed gotos). Such code
// compiles yet silently depends on the internal numbering, so a warning
// fires unless the condition type is exported or the dispatch uses explicit
// names.

pub(crate) fn gen_cond_goto_binary<'a>(
    cx: &mut Ctx<'a, '_>,
    lower: usize,
    upper: usize,
) -> &'a CodeList<'a> {
    let arena = cx.arena;
    let stmts = CodeList::new_in(arena);

    if lower == upper {
        let target =
            cx.o.str(&cx.opts.cond_label_prefix).str(&cx.block.conds[lower].name).flush(arena);
        stmts.push(Code::goto(arena, target));
    } else {
        let middle = lower + (upper - lower + 1) / 2;
        let if_then = gen_cond_goto_binary(cx, lower, middle - 1);
        let if_else = gen_cond_goto_binary(cx, middle, upper);
        let cond_get = cx.cond_get();
        let cond = cx.o.str(cond_get).str(" < ").u64(middle as u64).flush(arena);
        stmts.push(Code::if_then_else(arena, cond, if_then, Some(if_else)));
    }
    stmts
}

fn gen_cond_goto<'a>(cx: &mut Ctx<'a, '_>) -> &'a CodeList<'a> {
    let arena = cx.arena;
    let ncond = cx.block.conds.len();
    let mut warn_cond_ord = cx.warn_condition_order.get();

    debug_assert!(cx.opts.code_model == CodeModel::GotoLabel);

    let stmts = CodeList::new_in(arena);

    if cx.opts.target == Target::Dot {
        for cond in &cx.block.conds {
            cx.o.str("0 -> ").str(&cond.name).str(" [label=\"state=").str(&cond.name).str("\"]");
            let text = cx.o.flush(arena);
            stmts.push(Code::text(arena, text));
        }
        return stmts;
    }

    if cx.opts.computed_gotos {
        let cond_get = cx.cond_get();
        let target =
            cx.o.chr('*').str(&cx.opts.var_cond_table).chr('[').str(cond_get).chr(']').flush(arena);
        stmts.push(Code::goto(arena, target));
    } else if cx.opts.nested_ifs {
        warn_cond_ord &= ncond > 1;
        stmts.append(gen_cond_goto_binary(cx, 0, ncond - 1));
    } else {
        warn_cond_ord = false;

        let ccases = CodeCases::new_in(arena);
        for cond in &cx.block.conds {
            let body = CodeList::new_in(arena);
            let target =
                cx.o.str(&cx.opts.cond_label_prefix).str(&cond.name).flush(arena);
            body.push(Code::goto(arena, target));
            let case = cond_enum_elem(cx, &cond.name);
            ccases.push(arena, CaseKind::Str(case), body);
        }
        if cx.opts.cond_abort {
            let abort = gen_abort(cx);
            ccases.push(arena, CaseKind::Default, abort);
        }
        let expr = cx.cond_get();
        stmts.push(Code::switch(arena, expr, ccases));
    }

    warn_cond_ord &= cx.opts.header_file.is_empty();
    if warn_cond_ord {
        cx.msg.warn_condition_order(cx.block.loc);
    }

    stmts
}

fn gen_cond_table<'a>(cx: &mut Ctx<'a, '_>) -> &'a CodeList<'a> {
    let arena = cx.arena;
    let code = CodeList::new_in(arena);

    let mut elems = Vec::with_capacity(cx.block.conds.len());
    for cond in &cx.block.conds {
        elems.push(
            cx.o.str("&&").str(&cx.opts.cond_label_prefix).str(&cond.name).flush(arena),
        );
    }
    let ty = cx.o.str(&cx.opts.type_yytarget).flush(arena);
    let name = cx.o.str(&cx.opts.var_cond_table).flush(arena);
    code.push(Code::array(arena, name, ty, arena.alloc_slice(&elems), false));
    code
}

fn gen_yystate_def<'a>(cx: &mut Ctx<'a, '_>) -> &'a Code<'a> {
    let arena = cx.arena;
    debug_assert!(cx.opts.code_model == CodeModel::LoopSwitch);

    let (ty, init) = if cx.opts.storable_state {
        // `yystate` must accommodate the -1 case, hence a signed type. When
        // conditions are used as well, YYGETSTATE takes priority over
        // YYGETCONDITION because the lexer may be re-entered after a refill;
        // final states use YYSETSTATE to match.
        (VarType::Int, cx.state_get())
    } else if cx.opts.start_conditions {
        (VarType::Uint, cx.cond_get())
    } else {
        (VarType::Uint, "0")
    };
    let name = cx.o.str(&cx.opts.var_state).flush(arena);
    Code::var(arena, ty, name, Some(init))
}

fn gen_dfa_as_blocks_with_labels<'a>(
    cx: &mut Ctx<'a, '_>,
    dfa: &Dfa<'a>,
    stmts: &'a CodeList<'a>,
) {
    let arena = cx.arena;
    debug_assert!(cx.opts.code_model == CodeModel::GotoLabel);

    // If the DFA has transitions into the initial state and eager skip is
    // off, the initial state carries a skip statement that the first entry
    // must bypass.
    if dfa.initial_label.used() {
        let target =
            cx.o.str(&cx.opts.label_prefix).u32(dfa.initial_label.index()).flush(arena);
        stmts.push(Code::goto(arena, target));
    }

    for s in dfa.states() {
        emit_state(cx, s, stmts);
        emit_action(cx, dfa, s, stmts);
        gen_go(cx, dfa, stmts, s);
    }
}

fn gen_dfa_as_switch_cases<'a>(cx: &mut Ctx<'a, '_>, dfa: &Dfa<'a>, cases: &'a CodeCases<'a>) {
    let arena = cx.arena;
    debug_assert!(cx.opts.code_model != CodeModel::GotoLabel);

    let mut state = Some(dfa.head);
    while let Some(s) = state {
        let body = CodeList::new_in(arena);

        emit_state(cx, s, body);
        emit_action(cx, dfa, s, body);
        gen_go(cx, dfa, body, s);
        let label = s.label.index();
        debug_assert!(label != Label::NONE);

        // While the following states have no incoming transitions, generate
        // them as a continuation of the current case instead of looping
        // through the switch just to fall into the next case.
        let mut next = s.next.get();
        while let Some(n) = next {
            if n.label.used() {
                break;
            }
            emit_state(cx, n, body);
            emit_action(cx, dfa, n, body);
            gen_go(cx, dfa, body, n);
            next = n.next.get();
        }

        cases.push(arena, CaseKind::Number(label as i64), body);
        state = next;
    }
}

fn wrap_dfas_in_loop_switch<'a>(
    cx: &mut Ctx<'a, '_>,
    stmts: &'a CodeList<'a>,
    cases: &'a CodeCases<'a>,
) {
    let arena = cx.arena;
    debug_assert!(cx.opts.code_model != CodeModel::GotoLabel);

    let body = CodeList::new_in(arena);
    gen_storable_state_cases(cx, cases);
    if cx.opts.state_abort {
        let abort = gen_abort(cx);
        cases.push(arena, CaseKind::Default, abort);
    }
    let expr = cx.o.str(&cx.opts.var_state).flush(arena);
    body.push(Code::switch(arena, expr, cases));
    stmts.push(Code::loop_(arena, body));
}

fn gen_dfa_as_recursive_functions<'a>(cx: &mut Ctx<'a, '_>, dfa: &Dfa<'a>, code: &'a CodeList<'a>) {
    let arena = cx.arena;
    let fn_common = cx.block.fn_common.as_ref().expect("rec/func data");
    let (ret, params, params_yych, args) =
        (fn_common.ret, fn_common.params, fn_common.params_yych, fn_common.args);

    let mut state = Some(dfa.head);
    while let Some(s) = state {
        debug_assert!(s.label.index() != Label::NONE);
        let name = cx.o.str(&cx.opts.label_prefix).u32(s.label.index()).flush(arena);
        let params = if s.need_yych_arg() { params_yych } else { params };

        // This state plus any following states without transitions into
        // them (the tunneling pass produces those).
        let body = CodeList::new_in(arena);
        let mut cur = Some(s);
        while let Some(c) = cur {
            emit_state(cx, c, body);
            emit_action(cx, dfa, c, body);
            gen_go(cx, dfa, body, c);
            cur = c.next.get();
            if cur.is_some_and(|n| n.label.used()) {
                break;
            }
        }

        code.push(Code::fndef(arena, name, ret, params, body));
        state = cur;
    }

    if !dfa.cond.is_empty() {
        let name = fn_name_for_cond(cx, &dfa.cond);
        let body = CodeList::new_in(arena);
        let entry = cx.o.str(&cx.opts.label_prefix).u32(dfa.head.label.index()).flush(arena);
        body.push(Code::tailcall(arena, entry, args, ret.is_some()));
        code.push(Code::fndef(arena, name, ret, params, body));
    }
}

/// The condition dispatch function in rec/func mode: a switch that
/// tail-calls each condition's entry function.
fn gen_cond_func<'a>(cx: &mut Ctx<'a, '_>) -> &'a Code<'a> {
    let arena = cx.arena;
    let fn_common = cx.block.fn_common.as_ref().expect("rec/func data");
    let (ret, params, args) = (fn_common.ret, fn_common.params, fn_common.args);

    debug_assert!(cx.opts.code_model == CodeModel::RecFunc);

    let cases = CodeCases::new_in(arena);
    for cond in &cx.block.conds {
        let body = CodeList::new_in(arena);
        let func = fn_name_for_cond(cx, &cond.name);
        body.push(Code::tailcall(arena, func, args, ret.is_some()));
        let case = cond_enum_elem(cx, &cond.name);
        cases.push(arena, CaseKind::Str(case), body);
    }
    if cx.opts.cond_abort {
        let abort = gen_abort(cx);
        cases.push(arena, CaseKind::Default, abort);
    }
    let body = CodeList::new_in(arena);
    let expr = cx.cond_get();
    body.push(Code::switch(arena, expr, cases));

    let start = cx.block.start_label.expect("condition block without start label");
    let name = cx.o.str(&cx.opts.label_prefix).u32(start.index()).flush(arena);
    Code::fndef(arena, name, ret, params, body)
}

fn gen_start_function<'a>(
    cx: &mut Ctx<'a, '_>,
    dfa: &Dfa<'a>,
    code: &'a CodeList<'a>,
) -> CodegenResult<()> {
    let arena = cx.arena;
    let is_cond_block = !dfa.cond.is_empty();

    if is_cond_block {
        code.push(gen_cond_func(cx));
    }

    if cx.opts.storable_state {
        gen_state_goto_implicit(cx, code)
    } else {
        let fn_common = cx.block.fn_common.as_ref().expect("rec/func data");
        let (fn_name, ret, params, args) =
            (fn_common.name, fn_common.ret, fn_common.params, fn_common.args);
        let body = CodeList::new_in(arena);
        let label = if is_cond_block {
            cx.block.start_label.expect("condition block without start label")
        } else {
            dfa.head.label
        };
        let entry = cx.o.str(&cx.opts.label_prefix).u32(label.index()).flush(arena);
        body.push(Code::tailcall(arena, entry, args, ret.is_some()));

        code.push(Code::fndef(arena, fn_name, ret, params, body));
        Ok(())
    }
}

pub(crate) fn gen_block_code<'a>(
    cx: &mut Ctx<'a, '_>,
    program: &'a CodeList<'a>,
) -> CodegenResult<()> {
    let arena = cx.arena;

    // All conditions are named, so checking the first DFA suffices.
    debug_assert!(!cx.block.dfas.is_empty());
    let is_cond_block = !cx.block.dfas[0].cond.is_empty();

    // The line directive that follows must start at zero indent.
    program.push(Code::new(arena, CodeKind::Newline));
    if cx.opts.line_dirs {
        program.push(Code::new(arena, CodeKind::LineInfoOutput));
    }

    let code = CodeList::new_in(arena);
    let mut local_decls = false;

    if !cx.opts.storable_state
        && cx.opts.char_emit
        && cx.opts.code_model != CodeModel::RecFunc
    {
        local_decls = true;
        let name = cx.o.str(&cx.opts.var_char).flush(arena);
        code.push(Code::var(arena, VarType::Char, name, None));
    }
    if !cx.opts.storable_state
        && cx.block.used_yyaccept
        && cx.opts.code_model != CodeModel::RecFunc
    {
        local_decls = true;
        let name = cx.o.str(&cx.opts.var_accept).flush(arena);
        code.push(Code::var(arena, VarType::Uint, name, Some("0")));
    }

    match cx.opts.code_model {
        CodeModel::GotoLabel => {
            // States become labeled blocks of code with gotos in between.
            if cx.opts.computed_gotos && is_cond_block {
                local_decls = true;
                code.append(gen_cond_table(cx));
            }
            if cx.opts.bitmaps {
                for dfa in &cx.block.dfas {
                    if let Some(bitmap) = dfa.bitmap
                        && let Some(table) = gen_bitmap(cx, bitmap, &dfa.cond)
                    {
                        local_decls = true;
                        code.append(table);
                    }
                }
            }
            if cx.opts.storable_state {
                gen_state_goto_implicit(cx, code)?;
            }
            if !cx.opts.label_start.is_empty() {
                // User-defined start label, for use by user-defined code.
                let name = cx.o.str(&cx.opts.label_start).flush(arena);
                code.push(Code::slabel(arena, name));
            }
            if let Some(start) = cx.block.start_label {
                // Numbered start label used by the generated code.
                code.push(Code::nlabel(arena, start));
            }
            if is_cond_block {
                code.append(gen_cond_goto(cx));
            }
            for dfa in &cx.block.dfas {
                if is_cond_block {
                    if !cx.opts.cond_div.is_empty() {
                        cx.o.str(&cx.opts.cond_div);
                        cx.o.subst(&cx.opts.cond_div_param, "cond", true, &dfa.cond);
                        let div = cx.o.flush(arena);
                        code.push(Code::text_raw(arena, div));
                    }
                    let label =
                        cx.o.str(&cx.opts.cond_label_prefix).str(&dfa.cond).flush(arena);
                    code.push(Code::slabel(arena, label));
                }
                gen_dfa_as_blocks_with_labels(cx, dfa, code);
            }
        }
        CodeModel::LoopSwitch => {
            // All DFA states become cases of the `yystate` switch; DFAs for
            // different conditions merge into one switch.
            local_decls = true;
            code.push(gen_yystate_def(cx));

            let cases = CodeCases::new_in(arena);
            for dfa in &cx.block.dfas {
                gen_dfa_as_switch_cases(cx, dfa, cases);
            }
            wrap_dfas_in_loop_switch(cx, code, cases);
        }
        CodeModel::RecFunc => {
            // States become co-recursive functions that tail-call each
            // other.
            let funcs = CodeList::new_in(arena);
            let dfas = &cx.block.dfas;
            for dfa in dfas {
                gen_dfa_as_recursive_functions(cx, dfa, funcs);
            }
            gen_start_function(cx, &dfas[0], funcs)?;
            code.push(Code::new(arena, CodeKind::Funcs(funcs)));
        }
    }

    // Wrap the block in braces if needed, giving the declarations local
    // scope.
    debug_assert!(!local_decls || cx.opts.code_model != CodeModel::RecFunc);
    let kind = if local_decls && cx.opts.wrap_blocks_in_braces {
        BlockKind::Wrapped
    } else if cx.opts.indent_top > 0 || cx.opts.code_model == CodeModel::RecFunc {
        BlockKind::Raw
    } else {
        BlockKind::Indented
    };
    program.push(Code::block(arena, code, kind));

    Ok(())
}

pub(crate) fn gen_block_dot<'a>(cx: &mut Ctx<'a, '_>, code: &'a CodeList<'a>) {
    let arena = cx.arena;

    code.push(Code::text(arena, "digraph lexc {"));
    code.append(gen_cond_goto(cx));

    for dfa in &cx.block.dfas {
        if !dfa.cond.is_empty() {
            cx.o.str(&dfa.cond).str(" -> yy").u32(dfa.head.label.index());
            let text = cx.o.flush(arena);
            code.push(Code::text(arena, text));
        }

        for s in dfa.states() {
            match s.action {
                crate::dfa::Action::Accept => {
                    for (i, a) in dfa.accepts.iter().enumerate() {
                        cx.o.str("yy")
                            .u32(s.label.index())
                            .str(" -> yy")
                            .u32(a.state.label.index())
                            .str(" [label=\"yyaccept=")
                            .u32(i as u32)
                            .str("\"]");
                        let text = cx.o.flush(arena);
                        code.push(Code::text(arena, text));
                    }
                }
                crate::dfa::Action::Rule { rule } => {
                    let semact = &dfa.rules[rule].semact;
                    if !semact.autogen {
                        let file = cx
                            .filenames
                            .get(semact.loc.file as usize)
                            .map(String::as_str)
                            .unwrap_or("");
                        cx.o.str("yy")
                            .u32(s.label.index())
                            .str(" [label=\"")
                            .str(file)
                            .chr(':')
                            .u32(semact.loc.line)
                            .str("\"]");
                        let text = cx.o.flush(arena);
                        code.push(Code::text(arena, text));
                    }
                }
                _ => {}
            }
            gen_go(cx, dfa, code, s);
        }
    }

    code.push(Code::text(arena, "}"));
}

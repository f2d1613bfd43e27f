// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! State-entry actions.
//!
//! Emits what happens when the automaton enters a state, before its
//! transitions: saving the accept slot, backing the cursor up, skipping,
//! refilling, peeking, the debug hook, and for final states the whole rule
//! epilogue (final tags, condition/state switch, the user action).

use crate::dfa::{AcceptTrans, Action, CodeJump, Dfa, State, TCID0};
use crate::opts::{CodeModel, Target};

use super::api::{gen_cond_set, gen_debug, gen_restore, gen_state_set};
use super::code::{CaseKind, Code, CodeCases, CodeKind, CodeList};
use super::fill::gen_fill_and_label;
use super::go::gen_goto;
use super::tags::gen_fintags;
use super::{Ctx, cond_enum_elem, fn_name_for_cond, gen_continue_loop, state_cond_shared};

fn gen_peek<'a>(cx: &mut Ctx<'a, '_>, s: &State<'a>, stmts: &'a CodeList<'a>) {
    if !s.omit_peek() {
        stmts.push(Code::new(cx.arena, CodeKind::Peek));
    }
}

fn accept_store<'a>(cx: &mut Ctx<'a, '_>, stmts: &'a CodeList<'a>, save: usize) {
    let arena = cx.arena;
    let lhs = cx.o.str(&cx.opts.var_accept).flush(arena);
    let rhs = cx.o.u64(save as u64).flush(arena);
    stmts.push(Code::assign(arena, lhs, rhs));
}

fn emit_accept_binary<'a>(
    cx: &mut Ctx<'a, '_>,
    dfa: &Dfa<'a>,
    acc: &[AcceptTrans<'a>],
    l: usize,
    r: usize,
) -> &'a CodeList<'a> {
    let arena = cx.arena;
    let stmts = CodeList::new_in(arena);

    if l < r {
        let m = (l + r) >> 1;
        let cmp = if r == l + 1 { " == " } else { " <= " };
        let cond = cx.o.str(&cx.opts.var_accept).str(cmp).u64(m as u64).flush(arena);
        let if_then = emit_accept_binary(cx, dfa, acc, l, m);
        let if_else = emit_accept_binary(cx, dfa, acc, m + 1, r);
        stmts.push(Code::if_then_else(arena, cond, if_then, Some(if_else)));
    } else {
        let jump =
            CodeJump { to: acc[l].state, tags: acc[l].tags, skip: false, elide: false, eof: false };
        gen_goto(cx, dfa, stmts, None, jump);
    }
    stmts
}

/// Backtrack to the latest partial match and dispatch on the accept slot.
pub(crate) fn emit_accept<'a>(
    cx: &mut Ctx<'a, '_>,
    stmts: &'a CodeList<'a>,
    dfa: &Dfa<'a>,
    acc: &[AcceptTrans<'a>],
) {
    let arena = cx.arena;
    let nacc = acc.len();

    if nacc == 0 {
        return;
    }

    gen_restore(cx, stmts);

    // Only one possible accept value: unconditional jump.
    if nacc == 1 {
        let jump =
            CodeJump { to: acc[0].state, tags: acc[0].tags, skip: false, elide: false, eof: false };
        gen_goto(cx, dfa, stmts, None, jump);
        return;
    }

    let have_tags = acc.iter().any(|a| a.tags != TCID0);

    // Jump table.
    if cx.opts.computed_gotos && nacc >= cx.opts.computed_gotos_threshold && !have_tags {
        let block = CodeList::new_in(arena);

        let mut elems = Vec::with_capacity(nacc);
        for a in acc {
            elems.push(
                cx.o.str("&&").str(&cx.opts.label_prefix).u32(a.state.label.index()).flush(arena),
            );
        }
        let ty = cx.o.str(&cx.opts.type_yytarget).flush(arena);
        let name = cx.o.str(&cx.opts.var_computed_gotos_table).flush(arena);
        block.push(Code::array(arena, name, ty, arena.alloc_slice(&elems), false));

        let target =
            cx.o.chr('*')
                .str(&cx.opts.var_computed_gotos_table)
                .chr('[')
                .str(&cx.opts.var_accept)
                .chr(']')
                .flush(arena);
        block.push(Code::goto(arena, target));

        stmts.push(Code::block(arena, block, super::code::BlockKind::Wrapped));
        return;
    }

    // Nested ifs.
    if cx.opts.nested_ifs || nacc == 2 {
        stmts.append(emit_accept_binary(cx, dfa, acc, 0, nacc - 1));
        return;
    }

    // Switch.
    let cases = CodeCases::new_in(arena);
    for (i, a) in acc.iter().enumerate() {
        let body = CodeList::new_in(arena);
        let jump = CodeJump { to: a.state, tags: a.tags, skip: false, elide: false, eof: false };
        gen_goto(cx, dfa, body, None, jump);
        if i == nacc - 1 {
            cases.push(arena, CaseKind::Default, body);
        } else {
            cases.push(arena, CaseKind::Number(i as i64), body);
        }
    }
    let expr = cx.o.str(&cx.opts.var_accept).flush(arena);
    stmts.push(Code::switch(arena, expr, cases));
}

fn emit_rule<'a>(cx: &mut Ctx<'a, '_>, stmts: &'a CodeList<'a>, dfa: &Dfa<'a>, rule_idx: usize) {
    let arena = cx.arena;
    let rule = &dfa.rules[rule_idx];
    let semact = &rule.semact;

    gen_fintags(cx, stmts, dfa, rule);
    debug_assert!(cx.opts.target != Target::Skeleton);

    // The condition set with `=>` or `:=>`, or the current one.
    let cond = semact.cond.as_deref().unwrap_or(&dfa.cond);
    let next_cond = cond_enum_elem(cx, cond);

    if cx.opts.storable_state {
        // The next state is normally -1 (the initial storable state, no
        // refill in flight). In loop/switch mode conditions and storable
        // states share `yystate`, so the next state is the next condition:
        // the user may wrap the lexer in an outer loop that re-enters
        // through the state dispatch, and it must resume at the initial
        // state of that condition.
        let next_state = if dfa.cond.is_empty() || cx.opts.code_model != CodeModel::LoopSwitch {
            "-1"
        } else {
            next_cond
        };
        let next_state = cx.o.str(next_state).flush(arena);
        gen_state_set(cx, stmts, next_state);
    }

    if cond != dfa.cond && !state_cond_shared(cx.opts) {
        // Omit the condition switch when the condition does not change.
        // Also omit it when conditions and storable states are combined in
        // loop/switch mode: `yystate` is initialized from YYGETSTATE there,
        // so final states record the next entry with YYSETSTATE instead.
        gen_cond_set(cx, stmts, next_cond);
    }

    if !semact.autogen {
        // User-defined semantic action.
        if !dfa.setup.is_empty() {
            let setup = cx.o.str(&dfa.setup).flush(arena);
            stmts.push(Code::text(arena, setup));
        }
        if cx.opts.line_dirs {
            stmts.push(Code::new(arena, CodeKind::LineInfoInput(semact.loc)));
        }
        if cx.opts.indentation_sensitive {
            for line in semact.text.split('\n') {
                let line = cx.o.str(line).flush(arena);
                stmts.push(Code::text(arena, line));
            }
        } else {
            let text = cx.o.str(&semact.text).flush(arena);
            stmts.push(Code::text(arena, text));
        }
        if cx.opts.line_dirs {
            stmts.push(Code::new(arena, CodeKind::LineInfoOutput));
        }
    } else {
        // Autogenerated action of a `:=>` rule: jump to the next condition.
        match cx.opts.code_model {
            CodeModel::GotoLabel => {
                let label = format!("{}{}", cx.opts.cond_label_prefix, cond);
                cx.o.str(&cx.opts.cond_goto);
                cx.o.subst(&cx.opts.cond_goto_param, "cond", true, &label);
                let text = cx.o.flush(arena);
                stmts.push(Code::text(arena, text));
            }
            CodeModel::LoopSwitch => {
                gen_continue_loop(cx, stmts, next_cond);
            }
            CodeModel::RecFunc => {
                let fn_common = cx.block.fn_common.as_ref().expect("rec/func data");
                let name = fn_name_for_cond(cx, cond);
                stmts.push(Code::tailcall(arena, name, fn_common.args, fn_common.ret.is_some()));
            }
        }
    }
}

pub(crate) fn emit_action<'a>(
    cx: &mut Ctx<'a, '_>,
    dfa: &Dfa<'a>,
    s: &'a State<'a>,
    stmts: &'a CodeList<'a>,
) {
    let arena = cx.arena;

    match s.action {
        Action::Match => {
            if !cx.opts.eager_skip {
                stmts.push(Code::new(arena, CodeKind::Skip));
            }
            gen_fill_and_label(cx, stmts, dfa, s);
            gen_peek(cx, s, stmts);
        }
        Action::Initial { save } => {
            let backup = save.is_some();
            let used = s.label.used();

            if used && dfa.accepts.len() > 1
                && let Some(save) = save
            {
                accept_store(cx, stmts, save);
            }
            if used && !cx.opts.eager_skip {
                stmts.push(Code::new(arena, CodeKind::Skip));
            }
            stmts.push(Code::nlabel(arena, dfa.initial_label));
            gen_fill_and_label(cx, stmts, dfa, s);
            if backup {
                stmts.push(Code::new(arena, CodeKind::Backup));
            }
            gen_peek(cx, s, stmts);
            gen_debug(cx, dfa.initial_label, stmts);
        }
        Action::Save { save } => {
            if dfa.accepts.len() > 1 {
                accept_store(cx, stmts, save);
            }
            if !cx.opts.eager_skip {
                stmts.push(Code::new(arena, CodeKind::Skip));
            }
            stmts.push(Code::new(arena, CodeKind::Backup));
            gen_fill_and_label(cx, stmts, dfa, s);
            gen_peek(cx, s, stmts);
        }
        Action::Move => {}
        Action::Accept => emit_accept(cx, stmts, dfa, &dfa.accepts),
        Action::Rule { rule } => emit_rule(cx, stmts, dfa, rule),
    }
}

/// Emit a state's label and debug hook. An unused label is suppressed, and
/// with it the debug statement: there is no state number to report.
pub(crate) fn emit_state<'a>(cx: &mut Ctx<'a, '_>, s: &'a State<'a>, stmts: &'a CodeList<'a>) {
    if !s.label.used() {
        return;
    }

    if cx.opts.code_model == CodeModel::GotoLabel {
        stmts.push(Code::nlabel(cx.arena, s.label));
    }
    if !matches!(s.action, Action::Initial { .. }) {
        gen_debug(cx, s.label, stmts);
    }
}

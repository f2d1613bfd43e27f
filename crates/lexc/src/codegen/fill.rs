// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Input refill and end-of-input handling.
//!
//! For each state this decides whether to emit a "not enough input" guard,
//! the refill call itself, a state save for resumable refills, and the
//! fallback transition taken when an end-of-input rule is in effect and the
//! refill cannot provide more characters.
//!
//! With the end-of-input rule the lexer may re-enter at the fill label to
//! rescan the current character, so tag operations must sit *before* that
//! label: re-applying non-idempotent tag commands would corrupt the match.

use std::ptr;

use crate::dfa::{CodeJump, Dfa, State, TCID0};
use crate::opts::CodeModel;

use super::api::{gen_less_than, gen_state_set};
use super::code::{Code, CodeList};
use super::tags::gen_settags;
use super::{Ctx, gen_continue_loop};

pub(crate) fn fill_label_name<'a>(cx: &mut Ctx<'a, '_>, index: u32) -> &'a str {
    let arena = cx.arena;
    cx.o.str(&cx.opts.label_fill).u32(index).flush(arena)
}

/// Model-dependent two-way branch. In rec/func mode both branches must end
/// in a tail call, so a real IF/ELSE is required (the ELSE may be empty,
/// e.g. YYFILL without an end-of-input rule). In the other modes the second
/// branch follows the IF as straight-line code, which keeps it elidable.
fn gen_if<'a>(
    cx: &mut Ctx<'a, '_>,
    cond: &'a str,
    trans1: &'a CodeList<'a>,
    trans2: Option<&'a CodeList<'a>>,
    code: &'a CodeList<'a>,
) {
    let arena = cx.arena;
    if cx.opts.code_model == CodeModel::RecFunc {
        code.push(Code::if_then_else(arena, cond, trans1, trans2));
    } else {
        code.push(Code::if_then_else(arena, cond, trans1, None));
        if let Some(trans2) = trans2 {
            code.append(trans2);
        }
    }
}

/// The fallback transition for a partial match at an EOF-rule state.
pub(crate) fn gen_fill_fallback<'a>(
    cx: &mut Ctx<'a, '_>,
    dfa: &Dfa<'a>,
    from: &'a State<'a>,
    jump: Option<&CodeJump<'a>>,
) -> &'a CodeList<'a> {
    let arena = cx.arena;
    debug_assert!(cx.opts.eof_rule());

    let (fallback, mut falltags) =
        from.fallback.get().expect("EOF-rule state without fallback");

    if from.go.borrow().tags != TCID0 {
        // Tags were hoisted out of the transitions into the state, which
        // means all transitions carry the same command, the fallback
        // included. Don't emit it twice.
        debug_assert_eq!(from.go.borrow().tags, falltags);
        falltags = TCID0;
    }

    let fallback_trans = CodeList::new_in(arena);
    let elide = jump.is_some_and(|j| {
        ptr::eq::<State>(fallback, j.to) && falltags == j.tags && !j.skip
    });
    // The fallback is one branch of an IF/THEN/ELSE. In rec/func mode both
    // branches must end in a tail call, so elision is forbidden there
    // (unless YYFILL is disabled and the IF collapses entirely).
    if elide && !(cx.opts.code_model == CodeModel::RecFunc && cx.opts.fill_enable) {
        // Control flow falls through to another transition with the same
        // destination, same tags and no skip.
        return fallback_trans;
    }

    gen_settags(cx, fallback_trans, dfa, falltags);

    match cx.opts.code_model {
        CodeModel::GotoLabel => {
            let target =
                cx.o.str(&cx.opts.label_prefix).u32(fallback.label.index()).flush(arena);
            fallback_trans.push(Code::goto(arena, target));
        }
        CodeModel::LoopSwitch => {
            let next = cx.o.u32(fallback.label.index()).flush(arena);
            gen_continue_loop(cx, fallback_trans, next);
        }
        CodeModel::RecFunc => {
            let fn_common = cx.block.fn_common.as_ref().expect("rec/func data");
            let name =
                cx.o.str(&cx.opts.label_prefix).u32(fallback.label.index()).flush(arena);
            fallback_trans.push(Code::tailcall(
                arena,
                name,
                fn_common.args,
                fn_common.ret.is_some(),
            ));
        }
    }
    fallback_trans
}

/// The transition to the fill label, taken from the state dispatch or after
/// YYFILL on a transition.
pub(crate) fn gen_goto_after_fill<'a>(
    cx: &mut Ctx<'a, '_>,
    dfa: &Dfa<'a>,
    from: &'a State<'a>,
    jump: Option<&CodeJump<'a>>,
) -> &'a CodeList<'a> {
    let arena = cx.arena;
    let eof_rule = cx.opts.eof_rule();
    debug_assert!(cx.opts.fill_enable);

    let resume = CodeList::new_in(arena);
    let s = from.fill_state.get().expect("fill state not wired");
    match cx.opts.code_model {
        CodeModel::GotoLabel => {
            if cx.opts.storable_state || eof_rule {
                let fill_label = s.fill_label.get().expect("fill label not assigned");
                let target = fill_label_name(cx, fill_label.index());
                resume.push(Code::goto(arena, target));
            }
        }
        CodeModel::LoopSwitch => {
            let next = cx.o.u32(s.label.index()).flush(arena);
            gen_continue_loop(cx, resume, next);
        }
        CodeModel::RecFunc => {
            let fn_common = cx.block.fn_common.as_ref().expect("rec/func data");
            let name = cx.o.str(&cx.opts.label_prefix).u32(s.label.index()).flush(arena);
            resume.push(Code::tailcall(arena, name, fn_common.args, fn_common.ret.is_some()));
        }
    }

    if cx.opts.storable_state && eof_rule {
        // With storable state and the end-of-input rule the state dispatch
        // must handle YYFILL failure itself: if there is still not enough
        // input, take the fallback transition of the state that triggered
        // the refill. The fallback is inlined rather than jumped to, since
        // not every target language supports jumps into nested blocks.
        let fallback_or_resume = CodeList::new_in(arena);
        let fallback = gen_fill_fallback(cx, dfa, from, jump);
        let less_than = gen_less_than(cx, 1);
        gen_if(cx, less_than, fallback, Some(resume), fallback_or_resume);
        fallback_or_resume
    } else {
        resume
    }
}

/// Emit the refill sequence for a state, wiring in `tail` (the transition
/// guarded together with the fill) according to the emission model.
pub(crate) fn gen_fill<'a>(
    cx: &mut Ctx<'a, '_>,
    stmts: &'a CodeList<'a>,
    tail: Option<&'a CodeList<'a>>,
    dfa: &Dfa<'a>,
    from: &'a State<'a>,
    jump: Option<&CodeJump<'a>>,
) {
    let arena = cx.arena;
    let eof_rule = cx.opts.eof_rule();
    let need = if eof_rule { 1 } else { from.fill };

    let fill = CodeList::new_in(arena);
    if cx.opts.fill_enable {
        if cx.opts.storable_state {
            let fill_state = from.fill_state.get().expect("fill state not wired");
            let fill_label = fill_state.fill_label.get().expect("fill label not assigned");
            let fillidx = cx.o.u32(fill_label.index()).flush(arena);
            gen_state_set(cx, fill, fillidx);
        }

        // With the end-of-input rule YYFILL has no length argument and no
        // parameter to substitute.
        cx.o.str(&cx.opts.api_fill);
        if !eof_rule {
            cx.o.subst_num(&cx.opts.fill_param, "len", true, need as i64);
        }
        if cx.opts.fill_param_enable {
            cx.o.chr('(');
            if !eof_rule {
                cx.o.u64(need as u64);
            }
            cx.o.chr(')');
        }

        if eof_rule && !cx.opts.storable_state {
            // End-of-input rule without storable state: check the YYFILL
            // return value. On success (zero) jump to the fill label and
            // rematch.
            if !cx.opts.fill_naked {
                cx.o.str(" == 0");
            }
            let mut call = cx.o.flush(arena);
            if !cx.opts.var_fill.is_empty() {
                let code =
                    if cx.opts.fill_naked { Code::text(arena, call) } else { Code::stmt(arena, call) };
                fill.push(code);
                // The condition tests the variable the call assigned to.
                call = cx.o.str(&cx.opts.var_fill).flush(arena);
            }
            let rematch = gen_goto_after_fill(cx, dfa, from, jump);
            let fallback = gen_fill_fallback(cx, dfa, from, jump);
            gen_if(cx, call, rematch, Some(fallback), fill);
        } else {
            // Otherwise assume that YYFILL does not return on failure.
            let call = cx.o.flush(arena);
            let code =
                if cx.opts.fill_naked { Code::text(arena, call) } else { Code::stmt(arena, call) };
            fill.push(code);
        }
    } else if eof_rule && !cx.opts.storable_state {
        fill.append(gen_fill_fallback(cx, dfa, from, jump));
    }

    if cx.opts.fill_check && !fill.is_empty() {
        let less_than = gen_less_than(cx, need);
        gen_if(cx, less_than, fill, tail, stmts);
    } else {
        stmts.append(fill);
        if let Some(tail) = tail {
            stmts.append(tail);
        }
    }
}

/// Per-state fill emission: the refill itself (when no EOF rule governs the
/// transitions), hoisted tag operations, and the fill label.
pub(crate) fn gen_fill_and_label<'a>(
    cx: &mut Ctx<'a, '_>,
    stmts: &'a CodeList<'a>,
    dfa: &Dfa<'a>,
    s: &'a State<'a>,
) {
    let arena = cx.arena;

    if cx.opts.fill_enable && !s.end_state() && !cx.opts.eof_rule() && s.fill > 0 {
        gen_fill(cx, stmts, None, dfa, s, None);
    }

    if cx.opts.eof_rule() {
        let tags = s.go.borrow().tags;
        gen_settags(cx, stmts, dfa, tags);
    }

    if cx.opts.code_model == CodeModel::GotoLabel {
        if let Some(fill_label) = s.fill_label.get() {
            let name = fill_label_name(cx, fill_label.index());
            stmts.push(Code::slabel(arena, name));
        }
    }
}

/// Build the resume code for every fill-labeled state of the block, keyed by
/// fill-label index. The state dispatch (local or global) picks these up.
pub(crate) fn populate_fill_goto<'a>(cx: &mut Ctx<'a, '_>) {
    debug_assert!(cx.opts.storable_state && cx.opts.fill_enable);

    for dfa in &cx.block.dfas {
        for s in dfa.states() {
            let Some(fill_label) = s.fill_label.get() else { continue };
            if s.fill_state.get().is_none() {
                continue;
            }
            let resume = gen_goto_after_fill(cx, dfa, s, None);
            cx.block.fill_goto.borrow_mut().insert(fill_label.index(), resume);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::{dump, empty_dfa, jump, new_state, set_go_linear, span, with_ctx};
    use super::*;
    use crate::arena::Arena;
    use crate::dfa::{Action, Label};
    use crate::opts::Opts;

    #[test]
    fn end_state_gets_no_fill() {
        let arena = Arena::new();
        with_ctx(&arena, Opts::default(), |cx| {
            let fin = new_state(cx.arena, 1, Action::Rule { rule: 0 }, 0);
            let s = new_state(cx.arena, 0, Action::Match, 2);
            set_go_linear(cx.arena, s, &[span(256, fin)], &[(None, jump(fin))], TCID0, false);
            let dfa = empty_dfa(cx.arena, s);

            let stmts = CodeList::new_in(cx.arena);
            gen_fill_and_label(cx, stmts, &dfa, s);
            assert!(stmts.is_empty());
        });
    }

    #[test]
    fn guarded_fill_with_length() {
        let arena = Arena::new();
        with_ctx(&arena, Opts::default(), |cx| {
            let mid = new_state(cx.arena, 1, Action::Match, 0);
            let s = new_state(cx.arena, 0, Action::Match, 2);
            set_go_linear(
                cx.arena,
                s,
                &[span(128, mid), span(256, mid)],
                &[(None, jump(mid))],
                TCID0,
                false,
            );
            let dfa = empty_dfa(cx.arena, s);

            let stmts = CodeList::new_in(cx.arena);
            gen_fill_and_label(cx, stmts, &dfa, s);
            assert_eq!(
                dump(stmts),
                "if (YYLIMIT - YYCURSOR) < 2:\n  \
                   stmt YYFILL(2)\n"
            );
        });
    }

    #[test]
    fn eof_rule_checks_fill_result() {
        let arena = Arena::new();
        let mut opts = Opts::default();
        opts.fill_eof = Some(0);
        with_ctx(&arena, opts, |cx| {
            let fallback = new_state(cx.arena, 9, Action::Rule { rule: 0 }, 0);
            let resume = new_state(cx.arena, 3, Action::Match, 0);
            let flabel = &*cx.arena.alloc(Label::new(5));
            resume.fill_label.set(Some(flabel));

            let s = new_state(cx.arena, 0, Action::Match, 1);
            s.fill_state.set(Some(resume));
            s.fallback.set(Some((fallback, TCID0)));
            set_go_linear(
                cx.arena,
                s,
                &[span(128, resume), span(256, resume)],
                &[(None, jump(resume))],
                TCID0,
                false,
            );
            let dfa = empty_dfa(cx.arena, s);

            let stmts = CodeList::new_in(cx.arena);
            gen_fill(cx, stmts, None, &dfa, s, None);
            assert_eq!(
                dump(stmts),
                "if YYLIMIT <= YYCURSOR:\n  \
                   if YYFILL() == 0:\n    \
                     goto yyFillLabel5\n  \
                   goto yy9\n"
            );
        });
    }

    #[test]
    fn storable_state_saves_the_fill_point() {
        let arena = Arena::new();
        let mut opts = Opts::default();
        opts.fill_eof = Some(0);
        opts.storable_state = true;
        with_ctx(&arena, opts, |cx| {
            let fallback = new_state(cx.arena, 9, Action::Rule { rule: 0 }, 0);
            let resume = new_state(cx.arena, 3, Action::Match, 0);
            let flabel = &*cx.arena.alloc(Label::new(5));
            resume.fill_label.set(Some(flabel));

            let s = new_state(cx.arena, 0, Action::Match, 1);
            s.fill_state.set(Some(resume));
            s.fallback.set(Some((fallback, TCID0)));
            set_go_linear(
                cx.arena,
                s,
                &[span(128, resume), span(256, resume)],
                &[(None, jump(resume))],
                TCID0,
                false,
            );
            let dfa = empty_dfa(cx.arena, s);

            // The fill call saves the resume slot and does not check the
            // result; failure is handled by the state dispatch.
            let stmts = CodeList::new_in(cx.arena);
            gen_fill(cx, stmts, None, &dfa, s, None);
            assert_eq!(
                dump(stmts),
                "if YYLIMIT <= YYCURSOR:\n  \
                   stmt YYSETSTATE(5)\n  \
                   stmt YYFILL()\n"
            );

            // The dispatch resume re-checks the guard and inlines the
            // fallback transition.
            let resume_code = gen_goto_after_fill(cx, &dfa, s, None);
            assert_eq!(
                dump(resume_code),
                "if YYLIMIT <= YYCURSOR:\n  \
                   goto yy9\n\
                 goto yyFillLabel5\n"
            );
        });
    }

    #[test]
    fn fallback_elided_when_jump_coincides() {
        let arena = Arena::new();
        let mut opts = Opts::default();
        opts.fill_eof = Some(0);
        with_ctx(&arena, opts, |cx| {
            let target = new_state(cx.arena, 4, Action::Match, 0);
            let s = new_state(cx.arena, 0, Action::Match, 1);
            s.fallback.set(Some((target, TCID0)));
            set_go_linear(
                cx.arena,
                s,
                &[span(128, target), span(256, target)],
                &[(None, jump(target))],
                TCID0,
                false,
            );
            let dfa = empty_dfa(cx.arena, s);

            let j = jump(target);
            let elided = gen_fill_fallback(cx, &dfa, s, Some(&j));
            assert!(elided.is_empty());

            let mut skip = jump(target);
            skip.skip = true;
            let kept = gen_fill_fallback(cx, &dfa, s, Some(&skip));
            assert_eq!(dump(kept), "goto yy4\n");
        });
    }

    #[test]
    fn hoisted_tags_are_not_repeated_on_the_fallback() {
        let arena = Arena::new();
        let mut opts = Opts::default();
        opts.fill_eof = Some(0);
        with_ctx(&arena, opts, |cx| {
            let target = new_state(cx.arena, 4, Action::Match, 0);
            let s = new_state(cx.arena, 0, Action::Match, 1);
            let other = new_state(cx.arena, 6, Action::Match, 0);

            let head = new_state(cx.arena, 9, Action::Match, 0);
            let mut dfa = empty_dfa(cx.arena, head);
            let cmd = crate::dfa::TagCmd { lhs: 2, rhs: 1, history: &[], next: None };
            let tcid = dfa.tcpool.insert(cx.arena.alloc(cmd));

            s.fallback.set(Some((target, tcid)));
            set_go_linear(
                cx.arena,
                s,
                &[span(128, target), span(256, other)],
                &[(None, jump(target))],
                tcid,
                false,
            );

            let kept = gen_fill_fallback(cx, &dfa, s, None);
            assert_eq!(dump(kept), "goto yy4\n");
        });
    }

    #[test]
    fn fallback_not_elided_in_rec_func_with_fill() {
        let arena = Arena::new();
        let mut opts = Opts::default();
        opts.fill_eof = Some(0);
        opts.code_model = CodeModel::RecFunc;

        let mut block = super::super::OutputBlock::new("b", opts);
        block.fn_common = Some(super::super::FnCommon {
            name: "yylex",
            ret: None,
            params: &[],
            params_yych: &[],
            args: &[],
            args_yych: &[],
        });
        super::super::testutil::with_block(&arena, block, |cx| {
            let target = new_state(cx.arena, 4, Action::Match, 0);
            let s = new_state(cx.arena, 0, Action::Match, 1);
            s.fallback.set(Some((target, TCID0)));
            set_go_linear(
                cx.arena,
                s,
                &[span(128, target), span(256, target)],
                &[(None, jump(target))],
                TCID0,
                false,
            );
            let dfa = empty_dfa(cx.arena, s);

            let j = jump(target);
            let kept = gen_fill_fallback(cx, &dfa, s, Some(&j));
            assert_eq!(dump(kept), "tailcall yy4()\n");
        });
    }
}

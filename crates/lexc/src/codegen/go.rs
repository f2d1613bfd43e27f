// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Transition emission.
//!
//! A state's transition group arrives pre-shaped as one of: a switch, a tree
//! of comparisons (binary or linear), a bitmap with an optional high-byte
//! branch, a computed-goto table, or plain graph edges for DOT output. This
//! module turns each shape into code and funnels every leaf through
//! [`gen_goto`], which emits tag actions, the optional skip, and the
//! destination transfer in that order.

use std::ptr;

use crate::dfa::{
    Cmp, CodeBitmap, CodeGoKind, CodeJump, Dfa, GoBitmapBranch, GoCpGoto, GoIf, GoSw, GoSwIf,
    State, CPGOTO_TABLE_SIZE, TCID0,
};
use crate::opts::CodeModel;

use super::code::{CaseKind, Code, CodeBranch, CodeCases, CodeKind, CodeList};
use super::fill::gen_fill;
use super::tags::{gen_settags, vartag_name};
use super::{Ctx, api, gen_continue_loop};

/// Emit one transition: tag actions (unless hoisted), skip, transfer.
pub(crate) fn gen_goto<'a>(
    cx: &mut Ctx<'a, '_>,
    dfa: &Dfa<'a>,
    stmts: &'a CodeList<'a>,
    from: Option<&'a State<'a>>,
    jump: CodeJump<'a>,
) {
    let arena = cx.arena;
    let transition = CodeList::new_in(arena);

    gen_settags(cx, transition, dfa, jump.tags);

    if jump.skip {
        transition.push(Code::new(arena, CodeKind::Skip));
    }

    if !jump.elide && jump.to.label.used() {
        match cx.opts.code_model {
            CodeModel::GotoLabel => {
                let target =
                    cx.o.str(&cx.opts.label_prefix).u32(jump.to.label.index()).flush(arena);
                transition.push(Code::goto(arena, target));
            }
            CodeModel::LoopSwitch => {
                let next = cx.o.u32(jump.to.label.index()).flush(arena);
                gen_continue_loop(cx, transition, next);
            }
            CodeModel::RecFunc => {
                let fn_common = cx.block.fn_common.as_ref().expect("rec/func data");
                let args =
                    if jump.to.need_yych_arg() { fn_common.args_yych } else { fn_common.args };
                let name =
                    cx.o.str(&cx.opts.label_prefix).u32(jump.to.label.index()).flush(arena);
                transition.push(Code::tailcall(arena, name, args, fn_common.ret.is_some()));
            }
        }
    } else {
        // The goto is elided: control flow falls through to the right DFA
        // state. This is the usual fate of the last statement in a chain of
        // linear ifs, and happens even in rec/func mode for split states.
    }

    if jump.eof {
        gen_fill(cx, stmts, Some(transition), dfa, from.expect("EOF jump without origin"), Some(&jump));
    } else {
        stmts.append(transition);
    }
}

fn gen_cond<'a>(cx: &mut Ctx<'a, '_>, cond: &Cmp) -> &'a str {
    let arena = cx.arena;
    cx.o.str(&cx.opts.var_char).chr(' ').str(cond.op.sign()).chr(' ');
    api::print_char(&mut cx.o, cx.opts, cond.val);
    cx.o.flush(arena)
}

fn gen_gosw<'a>(
    cx: &mut Ctx<'a, '_>,
    dfa: &Dfa<'a>,
    go: &GoSw<'a>,
    from: Option<&'a State<'a>>,
) -> &'a CodeList<'a> {
    let arena = cx.arena;
    let expr = cx.o.str(&cx.opts.var_char).flush(arena);

    let cases = CodeCases::new_in(arena);
    let mut defcase = None;
    for (i, c) in go.cases.iter().enumerate() {
        let body = CodeList::new_in(arena);
        gen_goto(cx, dfa, body, from, c.jump);
        if go.defcase == Some(i) {
            defcase = Some(body);
        } else {
            let ranges: Vec<(i64, i64)> =
                c.ranges.iter().map(|&(lo, hi)| (lo as i64, hi as i64)).collect();
            cases.push(arena, CaseKind::Ranges(arena.alloc_slice(&ranges)), body);
        }
    }
    if let Some(body) = defcase {
        cases.push(arena, CaseKind::Default, body);
    }

    let stmts = CodeList::new_in(arena);
    stmts.push(Code::switch(arena, expr, cases));
    stmts
}

fn gen_goifl<'a>(
    cx: &mut Ctx<'a, '_>,
    dfa: &Dfa<'a>,
    branches: &[crate::dfa::GoBranch<'a>],
    from: Option<&'a State<'a>>,
) -> &'a CodeList<'a> {
    let arena = cx.arena;
    let stmts = CodeList::new_in(arena);

    if cx.opts.code_model != CodeModel::RecFunc {
        // A sequence of independent IF statements. IF/ELSE-IF would work
        // too, but it prevents folding the YYSKIP of the last unconditional
        // branch into the following YYPEEK, as in `yych = *++YYCURSOR`.
        for (i, b) in branches.iter().enumerate() {
            match b.cond {
                Some(ref cond) => {
                    let cond = gen_cond(cx, cond);
                    let then = CodeList::new_in(arena);
                    gen_goto(cx, dfa, then, from, b.jump);
                    stmts.push(Code::if_then_else(arena, cond, then, None));
                }
                None => {
                    debug_assert!(i + 1 == branches.len());
                    gen_goto(cx, dfa, stmts, from, b.jump);
                }
            }
        }
    } else {
        // One IF/ELSE-IF/.../ELSE statement. In functional languages a
        // conditional is an expression whose branches must agree, so every
        // branch has to end in a tail call.
        if let [b] = branches
            && b.cond.is_none()
        {
            gen_goto(cx, dfa, stmts, from, b.jump);
        } else {
            let mut built = Vec::with_capacity(branches.len());
            for b in branches {
                let cond = b.cond.as_ref().map(|c| gen_cond(cx, c));
                let then = CodeList::new_in(arena);
                gen_goto(cx, dfa, then, from, b.jump);
                built.push(CodeBranch { cond, body: then });
            }
            stmts.push(Code::branches(arena, &built));
        }
    }

    stmts
}

fn gen_goif<'a>(
    cx: &mut Ctx<'a, '_>,
    dfa: &Dfa<'a>,
    go: &GoIf<'a>,
    from: Option<&'a State<'a>>,
) -> &'a CodeList<'a> {
    match go {
        GoIf::Binary(b) => {
            let arena = cx.arena;
            let stmts = CodeList::new_in(arena);
            let cond = gen_cond(cx, &b.cond);
            let then = gen_goif(cx, dfa, b.then, from);
            let els = gen_goif(cx, dfa, b.els, from);
            stmts.push(Code::if_then_else(arena, cond, then, Some(els)));
            stmts
        }
        GoIf::Linear(l) => gen_goifl(cx, dfa, l.branches, from),
    }
}

fn gen_goswif<'a>(
    cx: &mut Ctx<'a, '_>,
    dfa: &Dfa<'a>,
    go: &GoSwIf<'a>,
    from: Option<&'a State<'a>>,
) -> &'a CodeList<'a> {
    match go {
        GoSwIf::Sw(sw) => gen_gosw(cx, dfa, sw, from),
        GoSwIf::If(goif) => gen_goif(cx, dfa, goif, from),
    }
}

pub(crate) fn bitmap_name<'a>(cx: &mut Ctx<'a, '_>, cond: &str) -> &'a str {
    let arena = cx.arena;
    cx.o.str(&cx.opts.var_bitmaps);
    if !cond.is_empty() {
        cx.o.chr('_').str(cond);
    }
    cx.o.flush(arena)
}

fn gen_gobm<'a>(
    cx: &mut Ctx<'a, '_>,
    dfa: &Dfa<'a>,
    go: &GoBitmapBranch<'a>,
    from: Option<&'a State<'a>>,
) -> &'a CodeList<'a> {
    let arena = cx.arena;
    let need_compare = !cx.opts.implicit_bool_conversion;

    let name = bitmap_name(cx, &dfa.cond);
    if need_compare {
        cx.o.chr('(');
    }
    cx.o.str(name)
        .chr('[')
        .u32(go.bitmap.offset.get())
        .chr('+')
        .str(&cx.opts.var_char)
        .str("] & ");
    if cx.opts.bitmaps_hex {
        cx.o.hex(go.bitmap.mask.get());
    } else {
        cx.o.u32(go.bitmap.mask.get());
    }
    if need_compare {
        cx.o.str(") != 0");
    }
    let elif_cond = cx.o.flush(arena);

    let if_else = CodeList::new_in(arena);
    let jump =
        CodeJump { to: go.bitmap.state, tags: TCID0, skip: false, elide: false, eof: false };
    gen_goto(cx, dfa, if_else, from, jump);

    let stmts = CodeList::new_in(arena);
    if let Some(hgo) = go.hgo {
        if need_compare {
            cx.o.chr('(');
        }
        cx.o.str(&cx.opts.var_char).str(" & ~0xFF");
        if need_compare {
            cx.o.str(") != 0");
        }
        let if_cond = cx.o.flush(arena);
        let if_then = gen_goswif(cx, dfa, hgo, from);
        stmts.push(Code::if_then_elif(arena, if_cond, if_then, elif_cond, if_else));
    } else {
        stmts.push(Code::if_then_else(arena, elif_cond, if_else, None));
    }
    if let Some(lgo) = go.lgo {
        stmts.append(gen_goswif(cx, dfa, lgo, from));
    }

    stmts
}

fn gen_gocp_table<'a>(cx: &mut Ctx<'a, '_>, table: &[&'a State<'a>]) -> &'a CodeList<'a> {
    let arena = cx.arena;
    debug_assert_eq!(table.len(), CPGOTO_TABLE_SIZE);

    let mut elems = Vec::with_capacity(table.len());
    for s in table {
        elems.push(cx.o.str("&&").str(&cx.opts.label_prefix).u32(s.label.index()).flush(arena));
    }
    let elems = &*arena.alloc_slice(&elems);
    let ty = cx.o.str(&cx.opts.type_yytarget).flush(arena);
    let name = cx.o.str(&cx.opts.var_computed_gotos_table).flush(arena);

    let stmts = CodeList::new_in(arena);
    stmts.push(Code::array(arena, name, ty, elems, true));
    stmts
}

fn gen_gocp<'a>(
    cx: &mut Ctx<'a, '_>,
    dfa: &Dfa<'a>,
    go: &GoCpGoto<'a>,
    from: Option<&'a State<'a>>,
) -> &'a CodeList<'a> {
    let arena = cx.arena;
    let stmts = CodeList::new_in(arena);

    let if_else = gen_gocp_table(cx, go.table.table);
    let target =
        cx.o.chr('*')
            .str(&cx.opts.var_computed_gotos_table)
            .chr('[')
            .str(&cx.opts.var_char)
            .chr(']')
            .flush(arena);
    if_else.push(Code::goto(arena, target));

    if let Some(hgo) = go.hgo {
        let cond = cx.o.str(&cx.opts.var_char).str(" & ~0xFF").flush(arena);
        let if_then = gen_goswif(cx, dfa, hgo, from);
        stmts.push(Code::if_then_else(arena, cond, if_then, Some(if_else)));
    } else {
        stmts.push(Code::block(arena, if_else, super::code::BlockKind::Wrapped));
    }

    stmts
}

fn gen_godot<'a>(
    cx: &mut Ctx<'a, '_>,
    dfa: &Dfa<'a>,
    go: &GoSw<'a>,
    from: &'a State<'a>,
    stmts: &'a CodeList<'a>,
) {
    let arena = cx.arena;

    if let [c] = go.cases {
        cx.o.str("yy").u32(from.label.index()).str(" -> yy").u32(c.jump.to.label.index());
        let text = cx.o.flush(arena);
        stmts.push(Code::text(arena, text));
        return;
    }

    for c in go.cases {
        cx.o.str("yy")
            .u32(from.label.index())
            .str(" -> yy")
            .u32(c.jump.to.label.index())
            .str(" [label=\"");

        for &(lo, hi) in c.ranges {
            api::print_span(&mut cx.o, cx.opts, lo, hi);
        }

        let mut cmd = dfa.tcpool.get(c.jump.tags);
        while let Some(p) = cmd {
            let is_mtag = dfa.mtagvers.contains(&p.lhs);
            let lhs = vartag_name(p.lhs, &cx.opts.tags_prefix, is_mtag);
            cx.o.chr('<').str(&lhs);
            if p.is_copy() {
                let rhs = vartag_name(p.rhs, &cx.opts.tags_prefix, is_mtag);
                cx.o.chr('~').str(&rhs);
            }
            cx.o.chr('>');
            cmd = p.next;
        }

        let text = cx.o.str("\"]").flush(arena);
        stmts.push(Code::text(arena, text));
    }
}

/// Emit a state's transition group.
pub(crate) fn gen_go<'a>(
    cx: &mut Ctx<'a, '_>,
    dfa: &Dfa<'a>,
    stmts: &'a CodeList<'a>,
    from: &'a State<'a>,
) {
    let arena = cx.arena;
    let go = *from.go.borrow();

    if let CodeGoKind::Dot(sw) = go.kind {
        gen_godot(cx, dfa, sw, from, stmts);
        return;
    }

    if !cx.opts.eof_rule() {
        // With the end-of-input rule hoisted tag operations were already
        // generated before the fill label. Without it there is no strict
        // placement requirement, but emitting them here allows the renderer
        // to fuse skip and peek into one statement.
        gen_settags(cx, stmts, dfa, go.tags);
    }

    if go.skip {
        stmts.push(Code::new(arena, CodeKind::Skip));
    }

    match go.kind {
        CodeGoKind::SwitchIf(swif) => stmts.append(gen_goswif(cx, dfa, swif, Some(from))),
        CodeGoKind::Bitmap(bm) => stmts.append(gen_gobm(cx, dfa, bm, Some(from))),
        CodeGoKind::CpGoto(cp) => stmts.append(gen_gocp(cx, dfa, cp, Some(from))),
        CodeGoKind::Dot(_) => unreachable!(),
        CodeGoKind::Empty => {}
    }
}

/// Generate the bitmap table for a DFA and assign each participating state
/// its offset and mask. Up to 8 states overlay into one byte per character.
pub(crate) fn gen_bitmap<'a>(
    cx: &mut Ctx<'a, '_>,
    bitmap: &CodeBitmap<'a>,
    cond: &str,
) -> Option<&'a CodeList<'a>> {
    if bitmap.head.get().is_none() || !bitmap.used.get() {
        return None;
    }

    let arena = cx.arena;
    let nchars = bitmap.nchars as usize;

    let mut nmaps = 0usize;
    let mut b = bitmap.head.get();
    while let Some(s) = b {
        nmaps += 1;
        b = s.next.get();
    }

    let nelems = nchars * nmaps.div_ceil(8);
    let mut elems = Vec::with_capacity(nelems);
    let mut tmpbuf = vec![0u32; nchars];

    let mut b = bitmap.head.get();
    let mut bmidx = 0u32;
    while b.is_some() {
        let offset = bmidx * bitmap.nchars;
        tmpbuf.fill(0);

        let mut mask = 0x80u32;
        while mask != 0 {
            let Some(s) = b else { break };
            s.offset.set(offset);
            s.mask.set(mask);

            let mut c = 0usize;
            for span in s.spans {
                if ptr::eq::<State>(span.to, s.state) {
                    let ub = (span.ub as usize).min(nchars);
                    for slot in &mut tmpbuf[c.min(ub)..ub] {
                        *slot |= mask;
                    }
                }
                c = span.ub as usize;
            }

            mask >>= 1;
            b = s.next.get();
        }

        for &v in &tmpbuf {
            if cx.opts.bitmaps_hex {
                cx.o.hex(v);
            } else {
                cx.o.u32(v);
            }
            elems.push(cx.o.flush(arena));
        }
        bmidx += 1;
    }

    let name = bitmap_name(cx, cond);
    let ty = cx.o.str(&cx.opts.type_yybm).flush(arena);

    let stmts = CodeList::new_in(arena);
    stmts.push(Code::array(arena, name, ty, arena.alloc_slice(&elems), true));
    Some(stmts)
}

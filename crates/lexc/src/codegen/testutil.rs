// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Test fixtures: a compact code-tree dumper and DFA graph builders.
//!
//! The dumper is not a renderer. It prints one line per node in a fixed
//! format so tests can assert on emitted shapes without caring about
//! indentation, separators, or `#line` bookkeeping.

use std::cell::Cell;
use std::collections::HashSet;
use std::fmt::Write as _;

use crate::arena::{Arena, Scratch};
use crate::dfa::{
    Action, Cmp, CodeGo, CodeGoKind, CodeJump, Dfa, GoBranch, GoIf, GoIfLin, GoSwIf, Label, Loc,
    Rule, SemAct, Span, State, TcPool, Tcid,
};
use crate::opts::Opts;

use super::code::{CaseKind, CodeKind, CodeList, VarType};
use super::{Ctx, Msg, Output, OutputBlock};

pub(crate) fn with_ctx<'a, R>(
    arena: &'a Arena,
    opts: Opts,
    f: impl FnOnce(&mut Ctx<'a, '_>) -> R,
) -> R {
    let block = OutputBlock::new("test", opts);
    with_block(arena, block, f)
}

pub(crate) fn with_block<'a, R>(
    arena: &'a Arena,
    block: OutputBlock<'a>,
    f: impl FnOnce(&mut Ctx<'a, '_>) -> R,
) -> R {
    let total_opts = Opts::default();
    let msg = Msg::default();
    let state_goto = Cell::new(false);
    let warn_condition_order = Cell::new(true);
    let filenames: Vec<String> = Vec::new();

    let mut cx = Ctx {
        arena,
        o: Scratch::new(),
        opts: &block.opts,
        block: &block,
        cblocks: std::slice::from_ref(&block),
        hblocks: &[],
        total_opts: &total_opts,
        fn_common_global: None,
        filenames: &filenames,
        msg: &msg,
        state_goto: &state_goto,
        warn_condition_order: &warn_condition_order,
    };
    f(&mut cx)
}

pub(crate) fn new_state<'a>(
    arena: &'a Arena,
    label: u32,
    action: Action,
    fill: usize,
) -> &'a State<'a> {
    let label = arena.alloc(Label::new(label));
    label.mark_used();
    arena.alloc(State::new(label, action, fill))
}

pub(crate) fn jump<'a>(to: &'a State<'a>) -> CodeJump<'a> {
    CodeJump { to, tags: crate::dfa::TCID0, skip: false, elide: false, eof: false }
}

pub(crate) fn span<'a>(ub: u32, to: &'a State<'a>) -> Span<'a> {
    Span { ub, to, tags: crate::dfa::TCID0 }
}

/// Install a linear if-chain transition group on a state.
pub(crate) fn set_go_linear<'a>(
    arena: &'a Arena,
    s: &'a State<'a>,
    spans: &[Span<'a>],
    branches: &[(Option<Cmp>, CodeJump<'a>)],
    tags: Tcid,
    skip: bool,
) {
    let branches: Vec<GoBranch<'a>> =
        branches.iter().map(|&(cond, jump)| GoBranch { cond, jump }).collect();
    let lin = &*arena.alloc(GoIfLin { branches: arena.alloc_slice(&branches) });
    let goif = &*arena.alloc(GoIf::Linear(lin));
    let swif = &*arena.alloc(GoSwIf::If(goif));
    *s.go.borrow_mut() = CodeGo {
        spans: arena.alloc_slice(spans),
        tags,
        skip,
        kind: CodeGoKind::SwitchIf(swif),
    };
}

pub(crate) fn empty_dfa<'a>(arena: &'a Arena, head: &'a State<'a>) -> Dfa<'a> {
    Dfa {
        cond: String::new(),
        head,
        initial_label: arena.alloc(Label::new(0)),
        rules: Vec::new(),
        tags: Vec::new(),
        finvers: Vec::new(),
        mtagvers: HashSet::new(),
        accepts: Vec::new(),
        tcpool: TcPool::new(),
        oldstyle_ctxmarker: false,
        bitmap: None,
        setup: String::new(),
    }
}

pub(crate) fn user_rule(text: &str) -> Rule {
    Rule {
        semact: SemAct {
            loc: Loc { file: 0, line: 1 },
            cond: None,
            autogen: false,
            text: text.into(),
        },
        ltag: 0,
        htag: 0,
        ncap: 0,
    }
}

pub(crate) fn dump(list: &CodeList<'_>) -> String {
    let mut out = String::new();
    dump_list(&mut out, list, 0);
    out
}

fn indent(out: &mut String, level: usize) {
    for _ in 0..level {
        out.push_str("  ");
    }
}

fn dump_list(out: &mut String, list: &CodeList<'_>, level: usize) {
    for code in list.iter() {
        dump_code(out, &code.kind, level);
    }
}

fn dump_code(out: &mut String, kind: &CodeKind<'_>, level: usize) {
    // If-chains print one line per branch and manage their own indent.
    if let CodeKind::If(ifte) = kind {
        for (i, branch) in ifte.branches.iter().enumerate() {
            indent(out, level);
            match (i, branch.cond) {
                (0, Some(c)) => _ = writeln!(out, "if {c}:"),
                (_, Some(c)) => _ = writeln!(out, "elif {c}:"),
                (_, None) => _ = writeln!(out, "else:"),
            }
            dump_list(out, branch.body, level + 1);
        }
        return;
    }

    indent(out, level);
    match *kind {
        CodeKind::Stmt(s) => _ = writeln!(out, "stmt {s}"),
        CodeKind::Text(s) => _ = writeln!(out, "text {s}"),
        CodeKind::TextRaw(s) => _ = writeln!(out, "textraw {s}"),
        CodeKind::Raw(s) => _ = writeln!(out, "raw {s:?}"),
        CodeKind::Abort => _ = writeln!(out, "abort"),
        CodeKind::Skip => _ = writeln!(out, "skip"),
        CodeKind::Peek => _ = writeln!(out, "peek"),
        CodeKind::Backup => _ = writeln!(out, "backup"),
        CodeKind::Debug(n) => _ = writeln!(out, "debug {n}"),
        CodeKind::NLabel(l) => _ = writeln!(out, "label {}", l.index()),
        CodeKind::SLabel(s) => _ = writeln!(out, "label {s}"),
        CodeKind::Goto(t) => _ = writeln!(out, "goto {t}"),
        CodeKind::Assign(a) => {
            let lhs = a.lhs.join(", ");
            match a.op {
                Some(op) => _ = writeln!(out, "{lhs} {op}= {}", a.rhs),
                None => _ = writeln!(out, "{lhs} = {}", a.rhs),
            }
        }
        CodeKind::If(_) => unreachable!(),
        CodeKind::Switch(sw) => {
            _ = writeln!(out, "switch {}:", sw.expr);
            for case in sw.cases.iter() {
                indent(out, level + 1);
                match *case.kind.borrow() {
                    CaseKind::Number(n) => _ = writeln!(out, "case {n}:"),
                    CaseKind::Ranges(rs) => {
                        out.push_str("case ");
                        for (i, &(lo, hi)) in rs.iter().enumerate() {
                            if i > 0 {
                                out.push_str(", ");
                            }
                            _ = write!(out, "{lo}..{hi}");
                        }
                        out.push_str(":\n");
                    }
                    CaseKind::Str(s) => _ = writeln!(out, "case {s}:"),
                    CaseKind::Default => _ = writeln!(out, "default:"),
                }
                dump_list(out, case.body, level + 2);
            }
        }
        CodeKind::Block(b) => {
            let kind = match b.kind {
                super::code::BlockKind::Wrapped => "wrapped",
                super::code::BlockKind::Indented => "indented",
                super::code::BlockKind::Raw => "raw",
            };
            _ = writeln!(out, "block {kind}:");
            dump_list(out, b.stmts, level + 1);
        }
        CodeKind::Loop(body) => {
            _ = writeln!(out, "loop:");
            dump_list(out, body, level + 1);
        }
        CodeKind::Var(v) => {
            _ = write!(out, "var {} {}", var_type(v.ty), v.name);
            match v.init {
                Some(init) => _ = writeln!(out, " = {init}"),
                None => _ = writeln!(out),
            }
        }
        CodeKind::Const(v) => {
            _ = writeln!(out, "const {} {} = {}", var_type(v.ty), v.name, v.init.unwrap_or(""));
        }
        CodeKind::Array(a) => {
            _ = write!(out, "array {} {}[{}] =", a.name, a.ty, a.elems.len());
            for e in a.elems {
                _ = write!(out, " {e}");
            }
            _ = writeln!(out);
        }
        CodeKind::Enum(e) => {
            _ = write!(out, "enum {}:", e.name);
            for m in e.members {
                match m.value {
                    Some(v) => _ = write!(out, " {}={}", m.name, v),
                    None => _ = write!(out, " {}", m.name),
                }
            }
            _ = writeln!(out);
        }
        CodeKind::FnDef(f) => {
            _ = write!(out, "fn {}(", f.name);
            for (i, p) in f.params.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                _ = write!(out, "{}: {}", p.name, p.ty);
            }
            out.push(')');
            if let Some(ret) = f.ret {
                _ = write!(out, " -> {ret}");
            }
            out.push_str(":\n");
            dump_list(out, f.body, level + 1);
        }
        CodeKind::TailCall(t) => {
            let kw = if t.with_return { "tailcall-ret" } else { "tailcall" };
            _ = writeln!(out, "{kw} {}({})", t.name, t.args.join(", "));
        }
        CodeKind::Funcs(list) => {
            _ = writeln!(out, "funcs:");
            dump_list(out, list, level + 1);
        }
        CodeKind::LineInfoInput(loc) => _ = writeln!(out, "line_info in {}:{}", loc.file, loc.line),
        CodeKind::LineInfoOutput => _ = writeln!(out, "line_info out"),
        CodeKind::Newline => _ = writeln!(out, "newline"),
        CodeKind::Empty => _ = writeln!(out, "empty"),
    }
}

fn var_type(ty: VarType) -> &'static str {
    match ty {
        VarType::Int => "int",
        VarType::Uint => "uint",
        VarType::Char => "char",
    }
}

/// Run the whole pipeline on a prepared output and dump one block's result.
pub(crate) fn generate_and_dump(output: &Output<'_>, block: usize) -> String {
    super::generate(output).unwrap();
    let mut out = String::new();
    for code in output.cblocks[block].generated.borrow().iter() {
        dump_code(&mut out, &code.kind, 0);
    }
    out
}

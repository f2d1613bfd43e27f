// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Emission of the configurable API primitives.
//!
//! Each primitive comes in two shapes. Under the FUNCTIONS style the name is
//! called with parenthesized positional arguments and terminated as a
//! statement; under the FREEFORM style the option value is a template with
//! named placeholders (`@@{tag}`, `@@{len}`, ...) and an optional bare
//! sigil, and the result is emitted as raw text. Named substitutions must
//! run before the unnamed one so the bare sigil does not eat them, and a
//! "naked" flag on some primitives suppresses the statement terminator.

use crate::dfa::Label;
use crate::opts::{Api, ApiStyle, Opts};
use crate::arena::Scratch;

use super::Ctx;
use super::code::{Code, CodeKind, CodeList};

/// `YYSETSTATE(n)`: record the resume point for a storable-state lexer.
pub(crate) fn gen_state_set<'a>(cx: &mut Ctx<'a, '_>, stmts: &'a CodeList<'a>, fillidx: &'a str) {
    let arena = cx.arena;

    cx.o.str(&cx.opts.api_state_set);
    cx.o.subst(&cx.opts.state_set_param, "state", true, fillidx);
    if cx.opts.state_set_naked {
        let text = cx.o.flush(arena);
        stmts.push(Code::text(arena, text));
    } else {
        cx.o.chr('(').str(fillidx).chr(')');
        let text = cx.o.flush(arena);
        stmts.push(Code::stmt(arena, text));
    }
}

/// `YYSETCONDITION(c)`: switch the current start condition.
pub(crate) fn gen_cond_set<'a>(cx: &mut Ctx<'a, '_>, stmts: &'a CodeList<'a>, cond: &'a str) {
    let arena = cx.arena;

    cx.o.str(&cx.opts.api_cond_set);
    cx.o.subst(&cx.opts.cond_set_param, "cond", true, cond);
    if cx.opts.cond_set_naked {
        let text = cx.o.flush(arena);
        stmts.push(Code::text(arena, text));
    } else {
        cx.o.chr('(').str(cond).chr(')');
        let text = cx.o.flush(arena);
        stmts.push(Code::stmt(arena, text));
    }
}

/// The "not enough input" guard expression for `need` characters.
pub(crate) fn gen_less_than<'a>(cx: &mut Ctx<'a, '_>, need: usize) -> &'a str {
    let arena = cx.arena;

    if cx.opts.api == Api::Custom {
        cx.o.str(&cx.opts.api_less_than);
        if cx.opts.api_style == ApiStyle::Functions {
            cx.o.chr('(').u64(need as u64).chr(')');
        } else {
            cx.o.subst_num(&cx.opts.api_sigil, "len", true, need as i64);
        }
    } else if need == 1 {
        cx.o.str(&cx.opts.api_limit).str(" <= ").str(&cx.opts.api_cursor);
    } else {
        cx.o
            .chr('(')
            .str(&cx.opts.api_limit)
            .str(" - ")
            .str(&cx.opts.api_cursor)
            .str(") < ")
            .u64(need as u64);
    }
    cx.o.flush(arena)
}

/// Shift the cursor, or a tag, by a constant.
pub(crate) fn gen_shift<'a>(
    cx: &mut Ctx<'a, '_>,
    stmts: &'a CodeList<'a>,
    shift: i32,
    tag: Option<&'a str>,
    history: bool,
) {
    if shift == 0 {
        return;
    }

    let arena = cx.arena;
    let prim = match tag {
        None => &cx.opts.api_shift,
        Some(_) if history => &cx.opts.api_mtag_shift,
        Some(_) => &cx.opts.api_stag_shift,
    };

    cx.o.str(prim);
    if cx.opts.api_style == ApiStyle::Functions {
        cx.o.chr('(');
        if let Some(tag) = tag {
            cx.o.str(tag).str(", ");
        }
        cx.o.i32(shift).chr(')');
        let text = cx.o.flush(arena);
        stmts.push(Code::stmt(arena, text));
    } else {
        // Single-argument YYSHIFT allows the short unnamed form; the
        // two-argument tag shifts require named placeholders.
        if let Some(tag) = tag {
            cx.o.subst(&cx.opts.api_sigil, "tag", false, tag);
        }
        cx.o.subst_num(&cx.opts.api_sigil, "shift", tag.is_none(), shift as i64);
        let text = cx.o.flush(arena);
        stmts.push(Code::text(arena, text));
    }
}

/// Record a tag position. Four primitives: s-tag/m-tag crossed with
/// positive/negative.
pub(crate) fn gen_settag<'a>(
    cx: &mut Ctx<'a, '_>,
    stmts: &'a CodeList<'a>,
    tag: &'a str,
    negative: bool,
    history: bool,
) {
    let arena = cx.arena;
    let prim = if history {
        if negative { &cx.opts.api_mtag_set_neg } else { &cx.opts.api_mtag_set_pos }
    } else {
        if negative { &cx.opts.api_stag_set_neg } else { &cx.opts.api_stag_set_pos }
    };

    cx.o.str(prim);
    if cx.opts.api_style == ApiStyle::Functions {
        cx.o.chr('(').str(tag).chr(')');
        let text = cx.o.flush(arena);
        stmts.push(Code::stmt(arena, text));
    } else {
        cx.o.subst(&cx.opts.api_sigil, "tag", true, tag);
        let text = cx.o.flush(arena);
        stmts.push(Code::text(arena, text));
    }
}

/// Backtrack the cursor to the last saved position.
pub(crate) fn gen_restore<'a>(cx: &mut Ctx<'a, '_>, stmts: &'a CodeList<'a>) {
    let arena = cx.arena;

    if cx.opts.api == Api::Default {
        let cursor = cx.o.str(&cx.opts.api_cursor).flush(arena);
        let marker = cx.o.str(&cx.opts.api_marker).flush(arena);
        stmts.push(Code::assign(arena, cursor, marker));
    } else if cx.opts.api_style == ApiStyle::Functions {
        let text = cx.o.str(&cx.opts.api_restore).str("()").flush(arena);
        stmts.push(Code::stmt(arena, text));
    } else {
        let text = cx.o.str(&cx.opts.api_restore).flush(arena);
        stmts.push(Code::text(arena, text));
    }
}

/// Restore the cursor from the trailing-context marker, or from a tag.
pub(crate) fn gen_restore_ctx<'a>(
    cx: &mut Ctx<'a, '_>,
    stmts: &'a CodeList<'a>,
    tag: Option<&'a str>,
) {
    let arena = cx.arena;
    let prim =
        if tag.is_none() { &cx.opts.api_restore_ctx } else { &cx.opts.api_restore_tag };

    cx.o.str(prim);
    if cx.opts.api_style == ApiStyle::Functions {
        cx.o.chr('(').str(tag.unwrap_or("")).chr(')');
        let text = cx.o.flush(arena);
        stmts.push(Code::stmt(arena, text));
    } else {
        if let Some(tag) = tag {
            cx.o.subst(&cx.opts.api_sigil, "tag", true, tag);
        }
        let text = cx.o.flush(arena);
        stmts.push(Code::text(arena, text));
    }
}

/// Save the cursor as the trailing-context marker (old-style API).
pub(crate) fn gen_backup_ctx<'a>(cx: &mut Ctx<'a, '_>, stmts: &'a CodeList<'a>) {
    let arena = cx.arena;

    cx.o.str(&cx.opts.api_backup_ctx);
    if cx.opts.api_style == ApiStyle::Functions {
        cx.o.str("()");
        let text = cx.o.flush(arena);
        stmts.push(Code::stmt(arena, text));
    } else {
        let text = cx.o.flush(arena);
        stmts.push(Code::text(arena, text));
    }
}

/// The per-state debug hook.
///
/// The label may be unused but still carry a valid index (the initial label
/// in goto/label mode is one example); it still gets a debug statement.
pub(crate) fn gen_debug<'a>(cx: &mut Ctx<'a, '_>, label: &Label, stmts: &'a CodeList<'a>) {
    if !cx.opts.debug {
        return;
    }

    let arena = cx.arena;
    let state = label.index();

    if cx.opts.api == Api::Default {
        stmts.push(Code::new(arena, CodeKind::Debug(state)));
    } else if cx.opts.api_style == ApiStyle::Freeform {
        cx.o.str(&cx.opts.api_debug);
        cx.o.subst_num(&cx.opts.api_sigil, "state", false, state as i64);
        cx.o.subst(&cx.opts.api_sigil, "char", false, &cx.opts.var_char);
        let text = cx.o.flush(arena);
        stmts.push(Code::text(arena, text));
    } else {
        let text = cx.o.str(&cx.opts.api_debug).str("()").flush(arena);
        stmts.push(Code::stmt(arena, text));
    }
}

pub(crate) fn gen_abort<'a>(cx: &mut Ctx<'a, '_>) -> &'a CodeList<'a> {
    let abort = CodeList::new_in(cx.arena);
    abort.push(Code::new(cx.arena, CodeKind::Abort));
    abort
}

/// Print a character constant: a quoted literal for printable ASCII, hex
/// otherwise.
pub(crate) fn print_char(o: &mut Scratch, opts: &Opts, c: u32) {
    if !opts.chars_hex && (0x20..0x7f).contains(&c) {
        let c = c as u8 as char;
        match c {
            '\'' => o.str("'\\''"),
            '\\' => o.str("'\\\\'"),
            _ => o.chr('\'').chr(c).chr('\''),
        };
    } else {
        print_hex(o, c);
    }
}

pub(crate) fn print_hex(o: &mut Scratch, c: u32) {
    o.hex(c);
}

/// Print an inclusive character span as a graph edge label.
pub(crate) fn print_span(o: &mut Scratch, opts: &Opts, lo: u32, hi: u32) {
    o.chr('[');
    print_char(o, opts, lo);
    if hi > lo {
        o.chr('-');
        print_char(o, opts, hi);
    }
    o.chr(']');
}

// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Cross-block directives.
//!
//! These aggregate data over several blocks (or all of them) and synthesize
//! code: the stored-state dispatch, the condition type, the s-tag/m-tag name
//! lists, and the maximum fill/match constants.

use crate::opts::{CodeModel, Opts, Target};

use super::api::gen_abort;
use super::code::{
    CaseKind, Code, CodeCases, CodeKind, CodeList, EnumMember,
};
use super::{
    BlockKind, CodegenError, CodegenResult, Ctx, DirectiveFmt, OutputBlock, StartCond, empty_code,
};

fn find_blocks<'a, 'b>(
    cx: &Ctx<'a, 'b>,
    names: &[String],
    directive: &'static str,
) -> CodegenResult<Vec<&'b OutputBlock<'a>>> {
    let mut blocks = Vec::with_capacity(names.len());
    for name in names {
        match cx.find_block(name) {
            Some(b) => blocks.push(b),
            None => {
                return Err(CodegenError::UnknownBlock { name: name.clone(), directive });
            }
        }
    }
    Ok(blocks)
}

fn state_get_expr(opts: &Opts) -> String {
    let paren = if opts.state_get_naked { "" } else { "()" };
    format!("{}{paren}", opts.api_state_get)
}

fn gen_state_goto_cases<'a>(
    cx: &Ctx<'a, '_>,
    cases: &'a CodeCases<'a>,
    block: &OutputBlock<'a>,
) {
    for (&idx, &resume) in block.fill_goto.borrow().iter() {
        cases.push(cx.arena, CaseKind::Number(idx as i64), resume);
    }
}

/// The `getstate` dispatch: a switch on the stored state that jumps to the
/// fill label recorded by the matching YYSETSTATE.
///
/// Two forms exist: an explicit list of block names (user directive with
/// names, or the block-local dispatch of a reused block), and the global
/// form covering every non-use block.
pub(crate) fn expand_state_goto<'a>(
    cx: &mut Ctx<'a, '_>,
    fmt: &DirectiveFmt,
) -> CodegenResult<&'a Code<'a>> {
    let arena = cx.arena;
    // Target and code model are constant across blocks; block-level options
    // wait until the first contributing block is known.
    let target = cx.total_opts.target;
    let code_model = cx.total_opts.code_model;

    if target != Target::Code {
        return Ok(empty_code(arena));
    }

    let global = fmt.block_names.is_none();
    let cases = CodeCases::new_in(arena);
    let mut bstart: Option<&OutputBlock<'a>> = None;

    match &fmt.block_names {
        None => {
            // All blocks, except reused ones which have a local dispatch.
            cx.state_goto.set(true);
            for b in cx.cblocks.iter().chain(cx.hblocks.iter()) {
                if b.kind != BlockKind::Use {
                    gen_state_goto_cases(cx, cases, b);
                    if bstart.is_none() && b.start_label.is_some() {
                        bstart = Some(b);
                    }
                }
            }
        }
        Some(names) => {
            for b in find_blocks(cx, names, "getstate:re2c")? {
                if b.start_label.is_none() {
                    return Err(CodegenError::BlockWithoutCode {
                        name: b.name.clone(),
                        directive: "getstate:re2c",
                    });
                }
                if bstart.is_none() {
                    bstart = Some(b);
                }
                gen_state_goto_cases(cx, cases, b);
            }
        }
    }

    let Some(bstart) = bstart else {
        return Err(CodegenError::NoCodeBlocks { directive: "getstate:re2c" });
    };

    // A global dispatch follows the options accumulated over the whole
    // program; a named one follows the first block on the list.
    let opts = if global { cx.total_opts } else { &bstart.opts };

    // This is what makes a second labeling pass necessary: the start label
    // becomes used long after its states were emitted.
    let lstart = bstart.start_label.expect("checked above");
    lstart.mark_used();

    // The start state number depends on where the start block sits in the
    // file; user code must not rely on it, so entry goes through a special
    // case rather than a numbered one.
    let goto_start = CodeList::new_in(arena);
    match code_model {
        CodeModel::GotoLabel => {
            let target =
                cx.o.str(&bstart.opts.label_prefix).u32(lstart.index()).flush(arena);
            goto_start.push(Code::goto(arena, target));
        }
        CodeModel::RecFunc => {
            let fn_common = bstart.fn_common.as_ref().expect("rec/func data");
            let target =
                cx.o.str(&bstart.opts.label_prefix).u32(lstart.index()).flush(arena);
            goto_start.push(Code::tailcall(
                arena,
                target,
                fn_common.args,
                fn_common.ret.is_some(),
            ));
        }
        CodeModel::LoopSwitch => {
            // Handled by the special cases of the `yystate` switch.
        }
    }

    if opts.state_abort {
        cases.push_front(arena, CaseKind::Number(-1), goto_start);
        let abort = gen_abort(cx);
        cases.push(arena, CaseKind::Default, abort);
    } else {
        cases.push(arena, CaseKind::Default, goto_start);
    }

    let stmts = CodeList::new_in(arena);
    let expr = cx.o.str(&state_get_expr(opts)).flush(arena);
    stmts.push(Code::switch(arena, expr, cases));

    if opts.state_next {
        let label = cx.o.str(&opts.label_next).chr(':').flush(arena);
        stmts.push(Code::text_raw(arena, label));
    }

    if code_model == CodeModel::RecFunc {
        // A function that tail-calls into the state functions.
        let fn_common = if global {
            cx.fn_common_global.expect("rec/func data")
        } else {
            bstart.fn_common.as_ref().expect("rec/func data")
        };
        Ok(Code::fndef(arena, fn_common.name, fn_common.ret, fn_common.params, stmts))
    } else {
        Ok(Code::block(arena, stmts, super::code::BlockKind::Raw))
    }
}

/// Generate the state dispatch that was not written explicitly: reused
/// blocks always get a local one, other blocks share a single global one.
pub(crate) fn gen_state_goto_implicit<'a>(
    cx: &mut Ctx<'a, '_>,
    code: &'a CodeList<'a>,
) -> CodegenResult<()> {
    let block_names = if cx.block.kind == BlockKind::Use {
        // A reused block cannot have a user-visible name, so it cannot be
        // referenced by a `getstate` directive; link the local dispatch
        // through the autogenerated name.
        Some(vec![cx.block.name.clone()])
    } else if !cx.state_goto.get() {
        None
    } else {
        // An explicit `getstate` exists, nothing to do.
        return Ok(());
    };

    let fmt = DirectiveFmt { format: None, separator: None, block_names };
    code.push(expand_state_goto(cx, &fmt)?);
    Ok(())
}

/// The s-tag / m-tag name list directive.
pub(crate) fn expand_tags_directive<'a>(
    cx: &mut Ctx<'a, '_>,
    fmt: &DirectiveFmt,
    multival: bool,
) -> CodegenResult<&'a Code<'a>> {
    let arena = cx.arena;

    if cx.opts.target != Target::Code {
        return Ok(empty_code(arena));
    }

    let mut tags = std::collections::BTreeSet::new();
    let blocks: Vec<&OutputBlock<'a>> = match &fmt.block_names {
        None => cx.cblocks.iter().chain(cx.hblocks.iter()).collect(),
        Some(names) => {
            let directive = if multival { "mtags:re2c" } else { "stags:re2c" };
            find_blocks(cx, names, directive)?
        }
    };
    for b in blocks {
        let set = if multival { &b.mtags } else { &b.stags };
        tags.extend(set.iter().cloned());
    }

    let mut first = true;
    let mut buf = String::new();
    for tag in &tags {
        if first {
            first = false;
        } else if let Some(sep) = &fmt.separator {
            buf.push_str(sep);
        }
        if let Some(tpl) = &fmt.format {
            cx.o.str(tpl);
            cx.o.subst(&cx.opts.api_sigil, "tag", true, tag);
            buf.push_str(cx.o.flush(arena));
        }
    }
    if cx.opts.line_dirs && !buf.is_empty() && !buf.ends_with('\n') {
        buf.push('\n');
    }

    let raw = cx.o.str(&buf).flush(arena);
    Ok(Code::new(arena, CodeKind::Raw(raw)))
}

fn add_condition(
    conds: &mut Vec<StartCond>,
    block: &OutputBlock<'_>,
    cond: &StartCond,
) -> CodegenResult<()> {
    // The enum prefix is per-block: two blocks may define conditions with
    // the same name but different prefixes, giving distinct entries.
    let name = format!("{}{}", block.opts.cond_enum_prefix, cond.name);

    for c in conds.iter() {
        if c.name == name {
            return if c.number == cond.number {
                // A duplicate, not an error; don't add it again.
                Ok(())
            } else {
                Err(CodegenError::CondNumberCollision { name, loc: block.loc })
            };
        }
    }

    conds.push(StartCond { name, number: cond.number });
    Ok(())
}

/// The condition type directive: an enumeration of all conditions, or a
/// formatted text block.
pub(crate) fn expand_cond_enum<'a>(
    cx: &mut Ctx<'a, '_>,
    fmt: &DirectiveFmt,
) -> CodegenResult<&'a Code<'a>> {
    let arena = cx.arena;
    // Conditions may come from blocks with different option sets; follow the
    // options accumulated over the whole file.
    let globopts = cx.total_opts;

    if globopts.target != Target::Code {
        return Ok(empty_code(arena));
    }

    let mut conds: Vec<StartCond> = Vec::new();
    let blocks: Vec<&OutputBlock<'a>> = match &fmt.block_names {
        None => cx.cblocks.iter().chain(cx.hblocks.iter()).collect(),
        Some(names) => find_blocks(cx, names, "types:re2c")?,
    };
    for b in blocks {
        for cond in &b.conds {
            add_condition(&mut conds, b, cond)?;
        }
    }

    // An empty condition enum is more likely an error in user code than a
    // deliberate choice; don't generate one.
    if conds.is_empty() {
        return Ok(empty_code(arena));
    }

    // The exported type makes user code independent of the internal
    // numbering; the order warning no longer applies.
    cx.warn_condition_order.set(false);

    if let Some(tpl) = &fmt.format {
        let mut buf = String::new();
        for (cond_number, cond) in conds.iter().enumerate() {
            if cond_number > 0
                && let Some(sep) = &fmt.separator
            {
                buf.push_str(sep);
            }
            // The unnamed-capable substitution must go last or it would eat
            // the named placeholders.
            let cid = if globopts.code_model == CodeModel::GotoLabel {
                cond_number as u32
            } else {
                cond.number
            };
            cx.o.str(tpl);
            cx.o.subst_num(&globopts.api_sigil, "num", false, cid as i64);
            cx.o.subst(&globopts.api_sigil, "cond", true, &cond.name);
            buf.push_str(cx.o.flush(arena));
        }
        buf.push('\n');
        let raw = cx.o.str(&buf).flush(arena);
        Ok(Code::new(arena, CodeKind::Raw(raw)))
    } else {
        let mut members = Vec::with_capacity(conds.len());
        for cond in &conds {
            let name = cx.o.str(&cond.name).flush(arena);
            // Numbers are meaningful only when the dispatch is numeric.
            let value = (globopts.code_model != CodeModel::GotoLabel).then_some(cond.number);
            members.push(EnumMember { name, value });
        }
        let ty = cx.o.str(&globopts.api_cond_type).flush(arena);
        Ok(Code::enum_(arena, ty, arena.alloc_slice(&members)))
    }
}

/// The maximum-fill / maximum-match-count directive.
pub(crate) fn expand_max<'a>(
    cx: &mut Ctx<'a, '_>,
    fmt: &DirectiveFmt,
    maxfill: bool,
) -> CodegenResult<&'a Code<'a>> {
    let arena = cx.arena;

    if cx.opts.target != Target::Code {
        return Ok(empty_code(arena));
    }

    let dirname = if maxfill { "max:re2c" } else { "maxnmatch:re2c" };
    let blocks: Vec<&OutputBlock<'a>> = match &fmt.block_names {
        None => cx.cblocks.iter().chain(cx.hblocks.iter()).collect(),
        Some(names) => find_blocks(cx, names, dirname)?,
    };

    let mut max = 1;
    for b in blocks {
        max = max.max(if maxfill { b.max_fill } else { b.max_nmatch });
    }

    if let Some(tpl) = &fmt.format {
        cx.o.str(tpl);
        cx.o.subst_num(&cx.opts.api_sigil, "max", true, max as i64);
        let text = cx.o.flush(arena);
        Ok(Code::text(arena, text))
    } else {
        let varname =
            if maxfill { &cx.opts.api_maxfill } else { &cx.opts.api_maxnmatch };
        let name = cx.o.str(varname).flush(arena);
        let init = cx.o.u64(max as u64).flush(arena);
        Ok(Code::const_(arena, super::code::VarType::Uint, name, init))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::generate_and_dump;
    use super::*;
    use crate::arena::Arena;
    use crate::dfa::Label;
    use crate::opts::Opts;
    use super::super::{BlockItem, Output, generate};

    fn cond_block<'a>(name: &str, conds: &[(&str, u32)]) -> OutputBlock<'a> {
        let mut block = OutputBlock::new(name, Opts::default());
        block.items = Vec::new();
        block.conds = conds
            .iter()
            .map(|&(name, number)| StartCond { name: name.into(), number })
            .collect();
        block
    }

    #[test]
    fn cond_enum_across_two_blocks() {
        let arena = Arena::new();

        // goto/label mode: a bare name list.
        let mut output = Output::new(&arena, Opts::default());
        let mut b1 = cond_block("one", &[("c1", 0)]);
        b1.items = vec![BlockItem::CondEnum(DirectiveFmt::default())];
        output.cblocks.push(b1);
        output.cblocks.push(cond_block("two", &[("c2", 1)]));
        assert_eq!(generate_and_dump(&output, 0), "enum YYCONDTYPE: yycc1 yycc2\n");

        // loop/switch mode: numbered members.
        let mut opts = Opts::default();
        opts.code_model = CodeModel::LoopSwitch;
        let mut output = Output::new(&arena, opts.clone());
        let mut b1 = cond_block("one", &[("c1", 0)]);
        b1.opts = opts.clone();
        b1.items = vec![BlockItem::CondEnum(DirectiveFmt::default())];
        let mut b2 = cond_block("two", &[("c2", 1)]);
        b2.opts = opts;
        output.cblocks.push(b1);
        output.cblocks.push(b2);
        assert_eq!(generate_and_dump(&output, 0), "enum YYCONDTYPE: yycc1=0 yycc2=1\n");
    }

    #[test]
    fn cond_enum_rejects_conflicting_numbers() {
        let arena = Arena::new();
        let mut output = Output::new(&arena, Opts::default());
        let mut b1 = cond_block("one", &[("c1", 0)]);
        b1.items = vec![BlockItem::CondEnum(DirectiveFmt::default())];
        output.cblocks.push(b1);
        output.cblocks.push(cond_block("two", &[("c1", 1)]));

        let err = generate(&output).unwrap_err();
        assert!(matches!(err, CodegenError::CondNumberCollision { .. }));
    }

    #[test]
    fn cond_enum_with_format_template() {
        let arena = Arena::new();
        let mut output = Output::new(&arena, Opts::default());
        let mut b1 = cond_block("one", &[("c1", 0), ("c2", 1)]);
        b1.items = vec![BlockItem::CondEnum(DirectiveFmt {
            format: Some("#define @@{cond} @@{num}".into()),
            separator: Some("\n".into()),
            block_names: None,
        })];
        output.cblocks.push(b1);

        assert_eq!(
            generate_and_dump(&output, 0),
            "raw \"#define yycc1 0\\n#define yycc2 1\\n\"\n"
        );
    }

    #[test]
    fn tag_lists_union_across_blocks() {
        let arena = Arena::new();
        let mut output = Output::new(&arena, Opts::default());
        let mut b1 = OutputBlock::new("one", Opts::default());
        b1.stags.insert("t1".into());
        b1.items = vec![BlockItem::Stags(DirectiveFmt {
            format: Some("long @@;".into()),
            separator: Some(" ".into()),
            block_names: None,
        })];
        let mut b2 = OutputBlock::new("two", Opts::default());
        b2.stags.insert("t2".into());
        b2.items = Vec::new();
        output.cblocks.push(b1);
        output.cblocks.push(b2);

        assert_eq!(generate_and_dump(&output, 0), "raw \"long t1; long t2;\\n\"\n");
    }

    #[test]
    fn maxfill_takes_the_maximum() {
        let arena = Arena::new();
        let mut output = Output::new(&arena, Opts::default());
        let mut b1 = OutputBlock::new("one", Opts::default());
        b1.max_fill = 3;
        b1.items = vec![BlockItem::MaxFill(DirectiveFmt::default())];
        let mut b2 = OutputBlock::new("two", Opts::default());
        b2.max_fill = 5;
        b2.items = Vec::new();
        output.cblocks.push(b1);
        output.cblocks.push(b2);

        assert_eq!(generate_and_dump(&output, 0), "const uint YYMAXFILL = 5\n");
    }

    #[test]
    fn state_dispatch_with_abort_default() {
        let arena = Arena::new();
        let mut opts = Opts::default();
        opts.storable_state = true;
        opts.state_abort = true;

        let mut output = Output::new(&arena, opts.clone());
        let mut b1 = OutputBlock::new("one", opts);
        let start = &*arena.alloc(Label::new(0));
        b1.start_label = Some(start);
        let resume = CodeList::new_in(&arena);
        resume.push(Code::goto(&arena, "yyFillLabel5"));
        b1.fill_goto.borrow_mut().insert(5, resume);
        b1.items = vec![BlockItem::StateGoto(DirectiveFmt::default())];
        output.cblocks.push(b1);

        assert_eq!(
            generate_and_dump(&output, 0),
            "block raw:\n  \
               switch YYGETSTATE():\n    \
                 case -1:\n      \
                   goto yy0\n    \
                 case 5:\n      \
                   goto yyFillLabel5\n    \
                 default:\n      \
                   abort\n"
        );
        assert!(start.used());
    }

    #[test]
    fn state_dispatch_requires_a_code_block() {
        let arena = Arena::new();
        let mut output = Output::new(&arena, Opts::default());
        let mut b1 = OutputBlock::new("one", Opts::default());
        b1.items = vec![BlockItem::StateGoto(DirectiveFmt {
            format: None,
            separator: None,
            block_names: Some(vec!["missing".into()]),
        })];
        output.cblocks.push(b1);

        let err = generate(&output).unwrap_err();
        assert!(matches!(err, CodegenError::UnknownBlock { .. }));
    }
}

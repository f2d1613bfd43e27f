// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The code generator
//!
//! ## Architecture
//!
//!   DFA(s) + options
//! → `api` (primitive substitution) ┐
//! → `tags` / `fill` / `go` / `action` (per-state emission)
//! → `block` (per-block assembly, one of three code models)
//! → `directives` (cross-block aggregates)
//! → code tree (see `code`), handed to the external renderer
//!
//! The generator is a synchronous tree-to-tree transformation: no I/O, no
//! internal concurrency. Everything it allocates lives in the caller's
//! arena and is released wholesale when the renderer is done with a block.
//!
//! ## Gotchas
//!
//! - Label use-flags are *discovered* during emission (e.g. the state
//!   dispatch marks the start label used after the states were already
//!   generated). Rendering must therefore run as a second pass; nothing
//!   here may assume a label's final used-flag before the whole block is
//!   emitted.
//! - The scratch buffer is shared by convention: every helper leaves it
//!   empty. Don't stash partial text across calls into other emitters.

pub mod action;
pub mod api;
pub mod block;
pub mod code;
pub mod directives;
pub mod fill;
pub mod go;
pub mod tags;

#[cfg(test)]
pub(crate) mod testutil;

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use crate::arena::{Arena, Scratch};
use crate::dfa::{Dfa, Label, Loc};
use crate::opts::{CodeModel, Opts, Target};
use code::{Code, CodeList, CodeParam};

pub type CodegenResult<T> = Result<T, CodegenError>;

#[derive(Debug, Error)]
pub enum CodegenError {
    #[error("cannot find block '{name}' listed in `{directive}` directive")]
    UnknownBlock { name: String, directive: &'static str },

    #[error("none of the blocks in `{directive}` generate any code")]
    NoCodeBlocks { directive: &'static str },

    #[error(
        "block '{name}' does not generate code, so it should not be listed in \
         `{directive}` directive"
    )]
    BlockWithoutCode { name: String, directive: &'static str },

    #[error(
        "cannot generate condition enumeration: condition '{name}' has different \
         numbers in different blocks (use a per-block condition prefix)"
    )]
    CondNumberCollision { name: String, loc: Loc },
}

/// Non-fatal diagnostics accumulated during generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Warning {
    /// Generated dispatch depends on the internal condition numbering and no
    /// condition type is exported, so user code could hardcode numbers that
    /// a later run reshuffles.
    ConditionOrder { loc: Loc },
}

#[derive(Default)]
pub struct Msg {
    warnings: RefCell<Vec<Warning>>,
}

impl Msg {
    pub fn warn_condition_order(&self, loc: Loc) {
        self.warnings.borrow_mut().push(Warning::ConditionOrder { loc });
    }

    pub fn warnings(&self) -> Vec<Warning> {
        self.warnings.borrow().clone()
    }
}

/// A named start condition with its dispatch number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartCond {
    pub name: String,
    pub number: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// A regular lexer block.
    Normal,
    /// A reused block; it gets a block-local state dispatch and is excluded
    /// from the global one.
    Use,
}

/// Function-emission data shared by all state functions of a block in
/// rec/func mode. The `_yych` variants additionally thread the peeked
/// character into states that don't peek themselves.
pub struct FnCommon<'a> {
    pub name: &'a str,
    pub ret: Option<&'a str>,
    pub params: &'a [CodeParam<'a>],
    pub params_yych: &'a [CodeParam<'a>],
    pub args: &'a [&'a str],
    pub args_yych: &'a [&'a str],
}

/// The format attached to a user directive: an optional per-element
/// template, an optional separator, and an optional explicit block list.
#[derive(Debug, Clone, Default)]
pub struct DirectiveFmt {
    pub format: Option<String>,
    pub separator: Option<String>,
    pub block_names: Option<Vec<String>>,
}

/// One item of a block's output sequence, in source order.
pub enum BlockItem {
    /// The lexer itself.
    Dfas,
    /// `getstate` directive: dispatch on the stored state.
    StateGoto(DirectiveFmt),
    /// Condition type / enumeration.
    CondEnum(DirectiveFmt),
    Stags(DirectiveFmt),
    Mtags(DirectiveFmt),
    MaxFill(DirectiveFmt),
    MaxNmatch(DirectiveFmt),
}

/// Everything the generator knows about one specification block.
pub struct OutputBlock<'a> {
    pub kind: BlockKind,
    pub name: String,
    pub loc: Loc,
    pub opts: Opts,
    pub dfas: Vec<Dfa<'a>>,
    pub items: Vec<BlockItem>,
    pub start_label: Option<&'a Label>,
    /// Resume code per fill-label index, feeding the state dispatch.
    pub fill_goto: RefCell<BTreeMap<u32, &'a CodeList<'a>>>,
    pub stags: BTreeSet<String>,
    pub mtags: BTreeSet<String>,
    pub conds: Vec<StartCond>,
    pub max_fill: usize,
    pub max_nmatch: usize,
    pub used_yyaccept: bool,
    pub fn_common: Option<FnCommon<'a>>,
    /// The generated code, one node per item, in item order.
    pub generated: RefCell<Vec<&'a Code<'a>>>,
}

impl<'a> OutputBlock<'a> {
    pub fn new(name: impl Into<String>, opts: Opts) -> Self {
        Self {
            kind: BlockKind::Normal,
            name: name.into(),
            loc: Loc::default(),
            opts,
            dfas: Vec::new(),
            items: vec![BlockItem::Dfas],
            start_label: None,
            fill_goto: RefCell::new(BTreeMap::new()),
            stags: BTreeSet::new(),
            mtags: BTreeSet::new(),
            conds: Vec::new(),
            max_fill: 1,
            max_nmatch: 1,
            used_yyaccept: false,
            fn_common: None,
            generated: RefCell::new(Vec::new()),
        }
    }
}

/// The whole generation job: blocks bound for the output file and blocks
/// bound for the header file, plus cross-block state.
pub struct Output<'a> {
    pub arena: &'a Arena,
    pub cblocks: Vec<OutputBlock<'a>>,
    pub hblocks: Vec<OutputBlock<'a>>,
    /// Options accumulated over the whole file; used by directives that span
    /// blocks with differing option sets.
    pub total_opts: Opts,
    pub fn_common: Option<FnCommon<'a>>,
    pub filenames: Vec<String>,
    pub msg: Msg,
    /// Set once the (implicit or explicit) global state dispatch exists.
    pub state_goto: Cell<bool>,
    /// Warning enable; cleared when a condition enum is exported.
    pub warn_condition_order: Cell<bool>,
}

impl<'a> Output<'a> {
    pub fn new(arena: &'a Arena, total_opts: Opts) -> Self {
        Self {
            arena,
            cblocks: Vec::new(),
            hblocks: Vec::new(),
            total_opts,
            fn_common: None,
            filenames: Vec::new(),
            msg: Msg::default(),
            state_goto: Cell::new(false),
            warn_condition_order: Cell::new(true),
        }
    }
}

/// Per-block emission context. Shared references all around; the scratch
/// buffer is the only mutable part, which keeps borrows trivial.
pub struct Ctx<'a, 'b> {
    pub arena: &'a Arena,
    pub o: Scratch,
    pub opts: &'b Opts,
    pub block: &'b OutputBlock<'a>,
    pub cblocks: &'b [OutputBlock<'a>],
    pub hblocks: &'b [OutputBlock<'a>],
    pub total_opts: &'b Opts,
    pub fn_common_global: Option<&'b FnCommon<'a>>,
    pub filenames: &'b [String],
    pub msg: &'b Msg,
    pub state_goto: &'b Cell<bool>,
    pub warn_condition_order: &'b Cell<bool>,
}

impl<'a, 'b> Ctx<'a, 'b> {
    fn for_block(output: &'b Output<'a>, block: &'b OutputBlock<'a>) -> Self {
        Ctx {
            arena: output.arena,
            o: Scratch::new(),
            opts: &block.opts,
            block,
            cblocks: &output.cblocks,
            hblocks: &output.hblocks,
            total_opts: &output.total_opts,
            fn_common_global: output.fn_common.as_ref(),
            filenames: &output.filenames,
            msg: &output.msg,
            state_goto: &output.state_goto,
            warn_condition_order: &output.warn_condition_order,
        }
    }

    /// Look up a block by name across output and header blocks.
    pub fn find_block(&self, name: &str) -> Option<&'b OutputBlock<'a>> {
        self.cblocks
            .iter()
            .chain(self.hblocks.iter())
            .find(|b| b.name == name)
    }

    /// The condition-read expression, e.g. `YYGETCONDITION()`.
    pub fn cond_get(&mut self) -> &'a str {
        let arena = self.arena;
        self.o.str(&self.opts.api_cond_get);
        if !self.opts.cond_get_naked {
            self.o.str("()");
        }
        self.o.flush(arena)
    }

    /// The state-read expression, e.g. `YYGETSTATE()`.
    pub fn state_get(&mut self) -> &'a str {
        let arena = self.arena;
        self.o.str(&self.opts.api_state_get);
        if !self.opts.state_get_naked {
            self.o.str("()");
        }
        self.o.flush(arena)
    }
}

/// In loop/switch mode, set the state variable and restart the loop.
pub(crate) fn gen_continue_loop<'a>(
    cx: &mut Ctx<'a, '_>,
    stmts: &'a CodeList<'a>,
    next: &'a str,
) {
    let arena = cx.arena;
    let state = cx.o.str(&cx.opts.var_state).flush(arena);
    stmts.push(Code::assign(arena, state, next));

    cx.o.str("continue");
    if !cx.opts.label_loop.is_empty() {
        cx.o.chr(' ').str(&cx.opts.label_loop);
    }
    let text = cx.o.flush(arena);
    stmts.push(Code::stmt(arena, text));
}

/// Run code generation for every block. Results land in each block's
/// `generated` list; warnings are collected in `output.msg`.
pub fn generate<'a>(output: &Output<'a>) -> CodegenResult<()> {
    // The state dispatch of any block may refer to the fill-resume points of
    // every other block, so resume code is built for all blocks up front.
    for block in output.cblocks.iter().chain(output.hblocks.iter()) {
        if block.opts.storable_state && block.opts.fill_enable {
            let mut cx = Ctx::for_block(output, block);
            fill::populate_fill_goto(&mut cx);
        }
    }

    for block in output.cblocks.iter().chain(output.hblocks.iter()) {
        log::debug!("generating code for block '{}'", block.name);
        let mut cx = Ctx::for_block(output, block);
        generate_block(&mut cx)?;
    }

    Ok(())
}

fn generate_block<'a>(cx: &mut Ctx<'a, '_>) -> CodegenResult<()> {
    let arena = cx.arena;

    for item in &cx.block.items {
        let code = match item {
            BlockItem::Dfas => {
                let program = CodeList::new_in(arena);
                match cx.opts.target {
                    Target::Dot => block::gen_block_dot(cx, program),
                    // The skeleton emitter is a separate subsystem; it owns
                    // the whole block when selected.
                    Target::Skeleton => {}
                    Target::Code => block::gen_block_code(cx, program)?,
                }
                Code::block(arena, program, code::BlockKind::Raw)
            }
            BlockItem::StateGoto(fmt) => directives::expand_state_goto(cx, fmt)?,
            BlockItem::CondEnum(fmt) => directives::expand_cond_enum(cx, fmt)?,
            BlockItem::Stags(fmt) => directives::expand_tags_directive(cx, fmt, false)?,
            BlockItem::Mtags(fmt) => directives::expand_tags_directive(cx, fmt, true)?,
            BlockItem::MaxFill(fmt) => directives::expand_max(cx, fmt, true)?,
            BlockItem::MaxNmatch(fmt) => directives::expand_max(cx, fmt, false)?,
        };
        cx.block.generated.borrow_mut().push(code);
    }

    debug_assert!(cx.o.is_empty());
    Ok(())
}

/// Skip emission entirely for non-code targets: directives only produce
/// output when real code is generated.
pub(crate) fn empty_code<'a>(arena: &'a Arena) -> &'a Code<'a> {
    Code::new(arena, code::CodeKind::Empty)
}

/// True when conditions and storable states share the `yystate` variable,
/// which changes how final states record the next entry point.
pub(crate) fn state_cond_shared(opts: &Opts) -> bool {
    opts.code_model == CodeModel::LoopSwitch && opts.storable_state
}

/// The enum member for a condition, qualified with the per-block prefix.
pub(crate) fn cond_enum_elem<'a>(cx: &mut Ctx<'a, '_>, name: &str) -> &'a str {
    let arena = cx.arena;
    cx.o.str(&cx.opts.cond_enum_prefix).str(name).flush(arena)
}

/// The entry function for a condition in rec/func mode.
pub(crate) fn fn_name_for_cond<'a>(cx: &mut Ctx<'a, '_>, cond: &str) -> &'a str {
    let arena = cx.arena;
    cx.o.str("yyfn").str(cond).flush(arena)
}

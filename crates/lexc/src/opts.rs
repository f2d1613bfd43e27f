// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The per-block option bundle.
//!
//! Option parsing happens upstream; the generator only reads this struct.
//! String options that name user-visible API primitives default to the
//! classic `YY*` names, and template options use the `@@` sigil with
//! optional named placeholders (`@@{len}`, `@@{tag}`, ...).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Code,
    Dot,
    Skeleton,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeModel {
    GotoLabel,
    LoopSwitch,
    RecFunc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Api {
    Default,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiStyle {
    Functions,
    Freeform,
}

#[derive(Debug, Clone)]
pub struct Opts {
    pub target: Target,
    pub code_model: CodeModel,
    pub api: Api,
    pub api_style: ApiStyle,

    /// Placeholder marker for freeform API templates.
    pub api_sigil: String,

    // Labels.
    pub label_prefix: String,
    pub label_fill: String,
    pub label_start: String,
    pub label_next: String,
    pub label_loop: String,
    pub cond_label_prefix: String,
    pub cond_enum_prefix: String,

    // Variables declared or referenced by the generated code.
    pub var_char: String,
    pub var_accept: String,
    pub var_state: String,
    pub var_bitmaps: String,
    pub var_cond_table: String,
    pub var_computed_gotos_table: String,
    pub var_fill: String,

    // API primitives.
    pub api_peek: String,
    pub api_skip: String,
    pub api_backup: String,
    pub api_backup_ctx: String,
    pub api_restore: String,
    pub api_restore_ctx: String,
    pub api_restore_tag: String,
    pub api_cursor: String,
    pub api_marker: String,
    pub api_ctxmarker: String,
    pub api_limit: String,
    pub api_fill: String,
    pub api_less_than: String,
    pub api_shift: String,
    pub api_stag_set_pos: String,
    pub api_stag_set_neg: String,
    pub api_mtag_set_pos: String,
    pub api_mtag_set_neg: String,
    pub api_stag_shift: String,
    pub api_mtag_shift: String,
    pub api_debug: String,
    pub api_cond_get: String,
    pub api_cond_set: String,
    pub api_cond_type: String,
    pub api_state_get: String,
    pub api_state_set: String,
    pub api_maxfill: String,
    pub api_maxnmatch: String,

    // Template parameters for the primitives above.
    pub fill_param: String,
    pub cond_set_param: String,
    pub state_set_param: String,
    pub cond_goto: String,
    pub cond_goto_param: String,
    pub cond_div: String,
    pub cond_div_param: String,
    pub tags_prefix: String,
    pub tags_expression: String,
    pub array_elem: String,
    pub type_yybm: String,
    pub type_yytarget: String,

    // Switches.
    pub fill_enable: bool,
    pub fill_check: bool,
    pub fill_naked: bool,
    pub fill_param_enable: bool,
    /// End-of-input rule: the character code standing for "end", if any.
    pub fill_eof: Option<u32>,
    pub storable_state: bool,
    pub start_conditions: bool,
    pub state_abort: bool,
    pub state_next: bool,
    pub cond_abort: bool,
    pub cond_get_naked: bool,
    pub cond_set_naked: bool,
    pub state_get_naked: bool,
    pub state_set_naked: bool,
    pub computed_gotos: bool,
    pub computed_gotos_threshold: usize,
    pub nested_ifs: bool,
    pub bitmaps: bool,
    pub bitmaps_hex: bool,
    pub eager_skip: bool,
    pub char_emit: bool,
    pub chars_hex: bool,
    pub debug: bool,
    pub line_dirs: bool,
    pub indentation_sensitive: bool,
    pub wrap_blocks_in_braces: bool,
    pub implicit_bool_conversion: bool,

    pub indent_top: u32,
    /// Non-empty when a type header is exported; silences the condition
    /// order warning.
    pub header_file: String,
}

impl Opts {
    /// End-of-input rule semantics are in effect.
    pub fn eof_rule(&self) -> bool {
        self.fill_eof.is_some()
    }
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            target: Target::Code,
            code_model: CodeModel::GotoLabel,
            api: Api::Default,
            api_style: ApiStyle::Functions,

            api_sigil: "@@".into(),

            label_prefix: "yy".into(),
            label_fill: "yyFillLabel".into(),
            label_start: String::new(),
            label_next: "yyNext".into(),
            label_loop: String::new(),
            cond_label_prefix: "yyc_".into(),
            cond_enum_prefix: "yyc".into(),

            var_char: "yych".into(),
            var_accept: "yyaccept".into(),
            var_state: "yystate".into(),
            var_bitmaps: "yybm".into(),
            var_cond_table: "yyctable".into(),
            var_computed_gotos_table: "yytarget".into(),
            var_fill: String::new(),

            api_peek: "YYPEEK".into(),
            api_skip: "YYSKIP".into(),
            api_backup: "YYBACKUP".into(),
            api_backup_ctx: "YYBACKUPCTX".into(),
            api_restore: "YYRESTORE".into(),
            api_restore_ctx: "YYRESTORECTX".into(),
            api_restore_tag: "YYRESTORETAG".into(),
            api_cursor: "YYCURSOR".into(),
            api_marker: "YYMARKER".into(),
            api_ctxmarker: "YYCTXMARKER".into(),
            api_limit: "YYLIMIT".into(),
            api_fill: "YYFILL".into(),
            api_less_than: "YYLESSTHAN".into(),
            api_shift: "YYSHIFT".into(),
            api_stag_set_pos: "YYSTAGP".into(),
            api_stag_set_neg: "YYSTAGN".into(),
            api_mtag_set_pos: "YYMTAGP".into(),
            api_mtag_set_neg: "YYMTAGN".into(),
            api_stag_shift: "YYSHIFTSTAG".into(),
            api_mtag_shift: "YYSHIFTMTAG".into(),
            api_debug: "YYDEBUG".into(),
            api_cond_get: "YYGETCONDITION".into(),
            api_cond_set: "YYSETCONDITION".into(),
            api_cond_type: "YYCONDTYPE".into(),
            api_state_get: "YYGETSTATE".into(),
            api_state_set: "YYSETSTATE".into(),
            api_maxfill: "YYMAXFILL".into(),
            api_maxnmatch: "YYMAXNMATCH".into(),

            fill_param: "@@".into(),
            cond_set_param: "@@".into(),
            state_set_param: "@@".into(),
            cond_goto: "goto @@;".into(),
            cond_goto_param: "@@".into(),
            cond_div: String::new(),
            cond_div_param: "@@".into(),
            tags_prefix: "yyt".into(),
            tags_expression: "@@".into(),
            array_elem: "@@{array}[@@{index}]".into(),
            type_yybm: "unsigned char".into(),
            type_yytarget: "void*".into(),

            fill_enable: true,
            fill_check: true,
            fill_naked: false,
            fill_param_enable: true,
            fill_eof: None,
            storable_state: false,
            start_conditions: false,
            state_abort: false,
            state_next: false,
            cond_abort: false,
            cond_get_naked: false,
            cond_set_naked: false,
            state_get_naked: false,
            state_set_naked: false,
            computed_gotos: false,
            computed_gotos_threshold: 9,
            nested_ifs: false,
            bitmaps: false,
            bitmaps_hex: false,
            eager_skip: false,
            char_emit: true,
            chars_hex: false,
            debug: false,
            line_dirs: true,
            indentation_sensitive: false,
            wrap_blocks_in_braces: false,
            implicit_bool_conversion: false,

            indent_top: 0,
            header_file: String::new(),
        }
    }
}

// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The input automaton.
//!
//! Everything in this module is produced by earlier passes (determinization,
//! minimization, tag-variable allocation, transition layout) and consumed
//! read-only by the code generator, with two exceptions: label use-flags and
//! bitmap offsets/masks are discovered *during* code-tree construction, so
//! those fields are cells. States form a graph and are arena-allocated; the
//! cyclic links (`next`, `fill_state`, fallback, transitions) are wired
//! after allocation.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;

/// A tag version number. Positive versions are tag variables; see the
/// sentinels below.
pub type TagVer = i32;

/// Terminates a tag history fed in from the tag allocator. Histories are
/// stored as slices here, so the terminator never appears inside one.
pub const TAGVER_ZERO: TagVer = 0;
/// A negative history element: the tag matched nothing on this path.
pub const TAGVER_BOTTOM: TagVer = -1;

/// An id into the tag-command pool.
pub type Tcid = u32;
/// The empty tag-command list.
pub const TCID0: Tcid = 0;

/// Root of the user-visible m-tag trie.
pub const MTAG_ROOT: i32 = -1;
/// "No match" element of the user-visible m-tag trie.
pub const MTAG_NIL: i32 = -2;

/// A numbered label attached to a DFA state.
///
/// The index is assigned by an earlier labeling pass; the use-flag is set
/// while the code tree is built and consumed by the renderer, which is why
/// rendering is a separate second pass (a label may become used *after* the
/// statements around it were emitted).
pub struct Label {
    index: Cell<u32>,
    used: Cell<bool>,
}

impl Label {
    pub const NONE: u32 = u32::MAX;

    pub fn new(index: u32) -> Self {
        Self { index: Cell::new(index), used: Cell::new(false) }
    }

    pub fn index(&self) -> u32 {
        self.index.get()
    }

    pub fn set_index(&self, index: u32) {
        self.index.set(index);
    }

    pub fn used(&self) -> bool {
        self.used.get()
    }

    pub fn mark_used(&self) {
        self.used.set(true);
    }
}

/// One command from the tag-command pool.
///
/// Classification mirrors the allocator's encoding:
/// - *copy*: empty history, `lhs = rhs`;
/// - *save*: `rhs == TAGVER_ZERO`, a single-element history carrying the
///   sign of the saved position;
/// - *save with history*: nonzero `rhs` and a multi-element history.
pub struct TagCmd<'a> {
    pub lhs: TagVer,
    pub rhs: TagVer,
    pub history: &'a [TagVer],
    pub next: Option<&'a TagCmd<'a>>,
}

impl<'a> TagCmd<'a> {
    pub fn is_copy(&self) -> bool {
        self.history.is_empty()
    }

    pub fn is_set(&self) -> bool {
        !self.history.is_empty() && self.rhs == TAGVER_ZERO
    }

    pub fn is_add(&self) -> bool {
        !self.history.is_empty() && self.rhs != TAGVER_ZERO
    }
}

/// The tag-command pool. `TCID0` is reserved for the empty list.
pub struct TcPool<'a> {
    cmds: Vec<Option<&'a TagCmd<'a>>>,
}

impl<'a> TcPool<'a> {
    pub fn new() -> Self {
        Self { cmds: vec![None] }
    }

    pub fn insert(&mut self, head: &'a TagCmd<'a>) -> Tcid {
        let id = self.cmds.len() as Tcid;
        self.cmds.push(Some(head));
        id
    }

    pub fn get(&self, id: Tcid) -> Option<&'a TagCmd<'a>> {
        self.cmds[id as usize]
    }
}

impl<'a> Default for TcPool<'a> {
    fn default() -> Self {
        Self::new()
    }
}

/// What happens when the automaton enters a state.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Advance past the matched character.
    Match,
    /// The initial state; `save` is the accept slot to store, if any.
    Initial { save: Option<usize> },
    /// Remember a partial match (backup point) in accept slot `save`.
    Save { save: usize },
    /// A tunneled state that reuses its predecessor's peeked character.
    Move,
    /// Backtrack to the latest partial match and dispatch on the stored
    /// accept slot (the table lives on the DFA).
    Accept,
    /// A final state: fire rule `rule`.
    Rule { rule: usize },
}

/// An interval of character values `[lb of previous span, ub)` mapping to
/// one destination.
#[derive(Clone, Copy)]
pub struct Span<'a> {
    pub ub: u32,
    pub to: &'a State<'a>,
    pub tags: Tcid,
}

/// A single compiled transition.
#[derive(Clone, Copy)]
pub struct CodeJump<'a> {
    pub to: &'a State<'a>,
    pub tags: Tcid,
    pub skip: bool,
    pub elide: bool,
    pub eof: bool,
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl CmpOp {
    pub fn sign(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Gt => ">",
            CmpOp::Le => "<=",
            CmpOp::Ge => ">=",
        }
    }
}

/// A comparison of the current character against a constant.
#[derive(Clone, Copy)]
pub struct Cmp {
    pub op: CmpOp,
    pub val: u32,
}

#[derive(Clone, Copy)]
pub struct GoCase<'a> {
    /// Closed ranges of character values handled by this case.
    pub ranges: &'a [(u32, u32)],
    pub jump: CodeJump<'a>,
}

pub struct GoSw<'a> {
    pub cases: &'a [GoCase<'a>],
    /// Index of the default case, if any.
    pub defcase: Option<usize>,
}

pub struct GoIfBin<'a> {
    pub cond: Cmp,
    pub then: &'a GoIf<'a>,
    pub els: &'a GoIf<'a>,
}

#[derive(Clone, Copy)]
pub struct GoBranch<'a> {
    /// `None` marks the final unconditional branch.
    pub cond: Option<Cmp>,
    pub jump: CodeJump<'a>,
}

pub struct GoIfLin<'a> {
    pub branches: &'a [GoBranch<'a>],
}

pub enum GoIf<'a> {
    Binary(&'a GoIfBin<'a>),
    Linear(&'a GoIfLin<'a>),
}

pub enum GoSwIf<'a> {
    Sw(&'a GoSw<'a>),
    If(&'a GoIf<'a>),
}

/// One destination state overlaid into a shared bitmap. Offset and mask are
/// assigned when the bitmap table itself is generated.
pub struct BmState<'a> {
    /// Span list of the origin state whose transitions this entry encodes.
    pub spans: &'a [Span<'a>],
    pub state: &'a State<'a>,
    pub offset: Cell<u32>,
    pub mask: Cell<u32>,
    pub next: Cell<Option<&'a BmState<'a>>>,
}

impl<'a> BmState<'a> {
    pub fn new(spans: &'a [Span<'a>], state: &'a State<'a>) -> Self {
        Self {
            spans,
            state,
            offset: Cell::new(0),
            mask: Cell::new(0),
            next: Cell::new(None),
        }
    }
}

/// Transition-presence bitmaps for up to 8 states per byte, shared by all
/// states of one DFA.
pub struct CodeBitmap<'a> {
    pub head: Cell<Option<&'a BmState<'a>>>,
    pub nchars: u32,
    pub used: Cell<bool>,
}

impl<'a> CodeBitmap<'a> {
    pub fn new(nchars: u32) -> Self {
        Self { head: Cell::new(None), nchars, used: Cell::new(false) }
    }
}

pub const CPGOTO_TABLE_SIZE: usize = 256;

pub struct GoCpTable<'a> {
    pub table: &'a [&'a State<'a>; CPGOTO_TABLE_SIZE],
}

pub struct GoCpGoto<'a> {
    pub table: &'a GoCpTable<'a>,
    pub hgo: Option<&'a GoSwIf<'a>>,
}

pub struct GoBitmapBranch<'a> {
    pub bitmap: &'a BmState<'a>,
    pub hgo: Option<&'a GoSwIf<'a>>,
    pub lgo: Option<&'a GoSwIf<'a>>,
}

#[derive(Clone, Copy)]
pub enum CodeGoKind<'a> {
    Empty,
    /// Graph edges, used only for DOT output.
    Dot(&'a GoSw<'a>),
    SwitchIf(&'a GoSwIf<'a>),
    Bitmap(&'a GoBitmapBranch<'a>),
    CpGoto(&'a GoCpGoto<'a>),
}

/// The outgoing-transitions group of a state.
#[derive(Clone, Copy)]
pub struct CodeGo<'a> {
    pub spans: &'a [Span<'a>],
    /// Tag command hoisted out of the transitions; `TCID0` if none. When
    /// set, every outgoing transition (including the fallback) carries the
    /// same command and must not duplicate it.
    pub tags: Tcid,
    pub skip: bool,
    pub kind: CodeGoKind<'a>,
}

impl<'a> CodeGo<'a> {
    pub fn empty() -> Self {
        Self { spans: &[], tags: TCID0, skip: false, kind: CodeGoKind::Empty }
    }
}

pub struct State<'a> {
    pub label: &'a Label,
    pub action: Action,
    /// Characters that must be available to proceed from this state.
    pub fill: usize,
    pub go: RefCell<CodeGo<'a>>,
    pub fill_label: Cell<Option<&'a Label>>,
    /// The state to resume at after a successful refill.
    pub fill_state: Cell<Option<&'a State<'a>>>,
    /// Precomputed fallback transition for partial matches at EOF-rule
    /// states: destination and tag command.
    pub fallback: Cell<Option<(&'a State<'a>, Tcid)>>,
    pub next: Cell<Option<&'a State<'a>>>,
}

impl<'a> State<'a> {
    pub fn new(label: &'a Label, action: Action, fill: usize) -> Self {
        Self {
            label,
            action,
            fill,
            go: RefCell::new(CodeGo::empty()),
            fill_label: Cell::new(None),
            fill_state: Cell::new(None),
            fallback: Cell::new(None),
            next: Cell::new(None),
        }
    }

    /// An 'end' state has no outgoing transitions on symbols. Usually these
    /// are final states, but an initial non-accepting state qualifies too,
    /// e.g. for a rule with an empty character class.
    pub fn end_state(&self) -> bool {
        let go = self.go.borrow();
        debug_assert!(!go.spans.is_empty());
        go.spans.len() == 1
            && matches!(go.spans[0].to.action, Action::Rule { .. } | Action::Accept)
    }

    /// The state's peeked character is never inspected, so no peek statement
    /// must be generated. True for "move" states (which reuse the
    /// predecessor's peek) and for states with a single transition into a
    /// non-"move" state; the latter appear when tunneling factors out common
    /// parts of similar states.
    pub fn omit_peek(&self) -> bool {
        let go = self.go.borrow();
        self.action == Action::Move
            || (go.spans.len() == 1 && go.spans[0].to.action != Action::Move)
    }

    /// In rec/func mode the peeked character is threaded as a function
    /// argument, but only into state-functions without their own peek
    /// (otherwise the peek would immediately overwrite the argument).
    pub fn need_yych_arg(&self) -> bool {
        self.omit_peek() && self.go.borrow().spans.len() > 1 && !self.end_state()
    }
}

/// An entry of the accept table: where to resume when backtracking with the
/// corresponding `yyaccept` value.
#[derive(Clone, Copy)]
pub struct AcceptTrans<'a> {
    pub state: &'a State<'a>,
    pub tags: Tcid,
}

/// A source location in the lexer specification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Loc {
    pub file: u32,
    pub line: u32,
}

/// The semantic action bound to a rule.
pub struct SemAct {
    pub loc: Loc,
    /// Condition to switch to, set with `=>` or `:=>`.
    pub cond: Option<String>,
    /// The action was autogenerated for a `:=>` rule and consists of a jump
    /// to the next condition.
    pub autogen: bool,
    pub text: String,
}

pub struct Rule {
    pub semact: SemAct,
    /// Tags of this rule, a range `[ltag, htag)` into the DFA tag list.
    pub ltag: usize,
    pub htag: usize,
    /// Number of capturing parentheses; zero if submatch extraction is off.
    pub ncap: usize,
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    /// Structural tag, only needed for disambiguation; never materialized.
    Fictive,
    /// User-named tag.
    Named,
    /// Capturing parenthesis.
    Capture,
}

/// A fixed tag lies at a constant distance from its base: another tag, or
/// the rightmost position (the cursor) when `base` is `None`.
#[derive(Clone, Copy)]
pub struct FixedTag {
    pub base: Option<usize>,
    pub dist: u32,
}

pub struct Tag {
    pub kind: TagKind,
    pub name: String,
    pub trailing: bool,
    /// History-carrying (m-)tag. Never set for fixed tags.
    pub history: bool,
    pub fixed: Option<FixedTag>,
    pub toplevel: bool,
    /// Submatch group range covered by a capture tag.
    pub lsub: usize,
    pub hsub: usize,
}

impl Tag {
    pub fn fictive(&self) -> bool {
        self.kind == TagKind::Fictive
    }

    pub fn capture(&self) -> bool {
        self.kind == TagKind::Capture
    }
}

/// One analyzed DFA, covering a single start condition.
pub struct Dfa<'a> {
    /// Condition name; empty for condition-less blocks.
    pub cond: String,
    pub head: &'a State<'a>,
    pub initial_label: &'a Label,
    pub rules: Vec<Rule>,
    pub tags: Vec<Tag>,
    /// Final tag version per tag index.
    pub finvers: Vec<TagVer>,
    /// Versions that belong to history-carrying tags.
    pub mtagvers: HashSet<TagVer>,
    pub accepts: Vec<AcceptTrans<'a>>,
    pub tcpool: TcPool<'a>,
    /// Single trailing context without tags, kept for backwards
    /// compatibility with the context-marker API.
    pub oldstyle_ctxmarker: bool,
    pub bitmap: Option<&'a CodeBitmap<'a>>,
    /// Prologue text pasted before every user action of this DFA.
    pub setup: String,
}

impl<'a> Dfa<'a> {
    pub fn states(&self) -> StateIter<'a> {
        StateIter { cur: Some(self.head) }
    }
}

pub struct StateIter<'a> {
    cur: Option<&'a State<'a>>,
}

impl<'a> Iterator for StateIter<'a> {
    type Item = &'a State<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let s = self.cur?;
        self.cur = s.next.get();
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_cmd_classification() {
        let copy = TagCmd { lhs: 2, rhs: 1, history: &[], next: None };
        assert!(copy.is_copy() && !copy.is_set() && !copy.is_add());

        let save = TagCmd { lhs: 2, rhs: TAGVER_ZERO, history: &[3], next: None };
        assert!(save.is_set() && !save.is_copy() && !save.is_add());

        let add = TagCmd { lhs: 2, rhs: 2, history: &[3, TAGVER_BOTTOM], next: None };
        assert!(add.is_add() && !add.is_copy() && !add.is_set());
    }

    #[test]
    fn tcpool_reserves_the_empty_list() {
        let cmd = TagCmd { lhs: 1, rhs: 1, history: &[], next: None };
        let mut pool = TcPool::new();
        assert!(pool.get(TCID0).is_none());
        let id = pool.insert(&cmd);
        assert_ne!(id, TCID0);
        assert!(pool.get(id).is_some());
    }
}

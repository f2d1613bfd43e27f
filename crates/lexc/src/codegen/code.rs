// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The code tree.
//!
//! Output of the generator and input of the (external) renderer: lists of
//! statements, labels, branches, switches, declarations, and raw text. All
//! nodes live in the block arena and link to each other with `&'a`
//! references; lists are intrusive singly-linked chains with cheap append
//! and splice, the same shape the DFA passes use.
//!
//! A handful of node kinds (`Skip`, `Peek`, `Backup`, `Debug`, `Abort`) stay
//! abstract instead of carrying resolved text: the renderer expands them
//! through the API options, which lets it fuse adjacent operations (e.g.
//! skip + peek into `yych = *++YYCURSOR`) that this pass keeps separate.

use std::cell::{Cell, RefCell};

use crate::arena::Arena;
use crate::dfa::{Label, Loc};

pub struct Code<'a> {
    next: Cell<Option<&'a Code<'a>>>,
    pub kind: CodeKind<'a>,
}

pub enum CodeKind<'a> {
    /// Statement text; the renderer appends the statement separator.
    Stmt(&'a str),
    /// Free-standing text line.
    Text(&'a str),
    /// Text emitted at column zero, ignoring the current indent.
    TextRaw(&'a str),
    /// Preformatted multi-line output of a directive.
    Raw(&'a str),
    Abort,
    Skip,
    Peek,
    Backup,
    Debug(u32),
    /// Numbered label; suppressed by the renderer unless marked used.
    NLabel(&'a Label),
    /// Named label.
    SLabel(&'a str),
    Goto(&'a str),
    Assign(&'a CodeAssign<'a>),
    If(&'a CodeIf<'a>),
    Switch(&'a CodeSwitch<'a>),
    Block(&'a CodeBlock<'a>),
    Loop(&'a CodeList<'a>),
    Var(&'a CodeVar<'a>),
    Const(&'a CodeVar<'a>),
    Array(&'a CodeArray<'a>),
    Enum(&'a CodeEnum<'a>),
    FnDef(&'a CodeFnDef<'a>),
    TailCall(&'a CodeTailCall<'a>),
    /// A group of mutually recursive functions, so the renderer can emit
    /// forward declarations where the language needs them.
    Funcs(&'a CodeList<'a>),
    LineInfoInput(Loc),
    LineInfoOutput,
    Newline,
    Empty,
}

/// (Possibly vectorized) assignment. `op` turns it into a compound
/// assignment, e.g. `-` for `lhs -= rhs`.
pub struct CodeAssign<'a> {
    pub lhs: &'a [&'a str],
    pub rhs: &'a str,
    pub op: Option<&'a str>,
}

#[derive(Clone, Copy)]
pub struct CodeBranch<'a> {
    /// `None` for the trailing `else` branch.
    pub cond: Option<&'a str>,
    pub body: &'a CodeList<'a>,
}

/// An `if`/`else if`/.../`else` chain. A single branch with no trailing
/// `else` is a plain `if`.
pub struct CodeIf<'a> {
    pub branches: &'a [CodeBranch<'a>],
}

pub struct CodeSwitch<'a> {
    pub expr: &'a str,
    pub cases: &'a CodeCases<'a>,
}

#[derive(Clone, Copy)]
pub enum CaseKind<'a> {
    Number(i64),
    /// Inclusive value ranges.
    Ranges(&'a [(i64, i64)]),
    Str(&'a str),
    Default,
}

pub struct CodeCase<'a> {
    pub kind: RefCell<CaseKind<'a>>,
    pub body: &'a CodeList<'a>,
    next: Cell<Option<&'a CodeCase<'a>>>,
}

pub struct CodeCases<'a> {
    head: Cell<Option<&'a CodeCase<'a>>>,
    tail: Cell<Option<&'a CodeCase<'a>>>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// Braced, so local declarations get their own scope.
    Wrapped,
    Indented,
    Raw,
}

pub struct CodeBlock<'a> {
    pub stmts: &'a CodeList<'a>,
    pub kind: BlockKind,
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum VarType {
    Int,
    Uint,
    /// The character type of the lexer (`YYCTYPE`).
    Char,
}

pub struct CodeVar<'a> {
    pub ty: VarType,
    pub name: &'a str,
    pub init: Option<&'a str>,
}

pub struct CodeArray<'a> {
    pub name: &'a str,
    pub ty: &'a str,
    pub elems: &'a [&'a str],
    /// Lay out elements in aligned rows.
    pub tabulate: bool,
}

#[derive(Clone, Copy)]
pub struct EnumMember<'a> {
    pub name: &'a str,
    pub value: Option<u32>,
}

pub struct CodeEnum<'a> {
    pub name: &'a str,
    pub members: &'a [EnumMember<'a>],
}

#[derive(Clone, Copy)]
pub struct CodeParam<'a> {
    pub name: &'a str,
    pub ty: &'a str,
}

pub struct CodeFnDef<'a> {
    pub name: &'a str,
    pub ret: Option<&'a str>,
    pub params: &'a [CodeParam<'a>],
    pub body: &'a CodeList<'a>,
}

pub struct CodeTailCall<'a> {
    pub name: &'a str,
    pub args: &'a [&'a str],
    /// The call must be returned (the enclosing function has a return
    /// type), as opposed to languages where a bare tail call suffices.
    pub with_return: bool,
}

impl<'a> Code<'a> {
    pub fn new(arena: &'a Arena, kind: CodeKind<'a>) -> &'a Code<'a> {
        arena.alloc(Code { next: Cell::new(None), kind })
    }

    pub fn stmt(arena: &'a Arena, text: &'a str) -> &'a Code<'a> {
        Self::new(arena, CodeKind::Stmt(text))
    }

    pub fn text(arena: &'a Arena, text: &'a str) -> &'a Code<'a> {
        Self::new(arena, CodeKind::Text(text))
    }

    pub fn text_raw(arena: &'a Arena, text: &'a str) -> &'a Code<'a> {
        Self::new(arena, CodeKind::TextRaw(text))
    }

    pub fn goto(arena: &'a Arena, target: &'a str) -> &'a Code<'a> {
        Self::new(arena, CodeKind::Goto(target))
    }

    pub fn nlabel(arena: &'a Arena, label: &'a Label) -> &'a Code<'a> {
        Self::new(arena, CodeKind::NLabel(label))
    }

    pub fn slabel(arena: &'a Arena, name: &'a str) -> &'a Code<'a> {
        Self::new(arena, CodeKind::SLabel(name))
    }

    pub fn assign(arena: &'a Arena, lhs: &'a str, rhs: &'a str) -> &'a Code<'a> {
        Self::assign_op(arena, lhs, rhs, None)
    }

    pub fn assign_op(
        arena: &'a Arena,
        lhs: &'a str,
        rhs: &'a str,
        op: Option<&'a str>,
    ) -> &'a Code<'a> {
        let lhs = &*arena.alloc_slice(&[lhs]);
        Self::new(arena, CodeKind::Assign(arena.alloc(CodeAssign { lhs, rhs, op })))
    }

    pub fn assign_many(arena: &'a Arena, lhs: &'a [&'a str], rhs: &'a str) -> &'a Code<'a> {
        Self::new(arena, CodeKind::Assign(arena.alloc(CodeAssign { lhs, rhs, op: None })))
    }

    /// `if (cond) { then }`, with an optional `else`.
    pub fn if_then_else(
        arena: &'a Arena,
        cond: &'a str,
        then: &'a CodeList<'a>,
        els: Option<&'a CodeList<'a>>,
    ) -> &'a Code<'a> {
        let mut branches = vec![CodeBranch { cond: Some(cond), body: then }];
        if let Some(els) = els {
            branches.push(CodeBranch { cond: None, body: els });
        }
        Self::branches(arena, &branches)
    }

    /// `if (cond1) { then } else if (cond2) { els }` — the second branch
    /// keeps its own condition.
    pub fn if_then_elif(
        arena: &'a Arena,
        cond1: &'a str,
        then: &'a CodeList<'a>,
        cond2: &'a str,
        els: &'a CodeList<'a>,
    ) -> &'a Code<'a> {
        Self::branches(
            arena,
            &[
                CodeBranch { cond: Some(cond1), body: then },
                CodeBranch { cond: Some(cond2), body: els },
            ],
        )
    }

    pub fn branches(arena: &'a Arena, branches: &[CodeBranch<'a>]) -> &'a Code<'a> {
        let branches = &*arena.alloc_slice(branches);
        Self::new(arena, CodeKind::If(arena.alloc(CodeIf { branches })))
    }

    pub fn switch(arena: &'a Arena, expr: &'a str, cases: &'a CodeCases<'a>) -> &'a Code<'a> {
        Self::new(arena, CodeKind::Switch(arena.alloc(CodeSwitch { expr, cases })))
    }

    pub fn block(
        arena: &'a Arena,
        stmts: &'a CodeList<'a>,
        kind: BlockKind,
    ) -> &'a Code<'a> {
        Self::new(arena, CodeKind::Block(arena.alloc(CodeBlock { stmts, kind })))
    }

    pub fn loop_(arena: &'a Arena, body: &'a CodeList<'a>) -> &'a Code<'a> {
        Self::new(arena, CodeKind::Loop(body))
    }

    pub fn var(
        arena: &'a Arena,
        ty: VarType,
        name: &'a str,
        init: Option<&'a str>,
    ) -> &'a Code<'a> {
        Self::new(arena, CodeKind::Var(arena.alloc(CodeVar { ty, name, init })))
    }

    pub fn const_(arena: &'a Arena, ty: VarType, name: &'a str, init: &'a str) -> &'a Code<'a> {
        Self::new(arena, CodeKind::Const(arena.alloc(CodeVar { ty, name, init: Some(init) })))
    }

    pub fn array(
        arena: &'a Arena,
        name: &'a str,
        ty: &'a str,
        elems: &'a [&'a str],
        tabulate: bool,
    ) -> &'a Code<'a> {
        Self::new(arena, CodeKind::Array(arena.alloc(CodeArray { name, ty, elems, tabulate })))
    }

    pub fn enum_(
        arena: &'a Arena,
        name: &'a str,
        members: &'a [EnumMember<'a>],
    ) -> &'a Code<'a> {
        Self::new(arena, CodeKind::Enum(arena.alloc(CodeEnum { name, members })))
    }

    pub fn fndef(
        arena: &'a Arena,
        name: &'a str,
        ret: Option<&'a str>,
        params: &'a [CodeParam<'a>],
        body: &'a CodeList<'a>,
    ) -> &'a Code<'a> {
        Self::new(arena, CodeKind::FnDef(arena.alloc(CodeFnDef { name, ret, params, body })))
    }

    pub fn tailcall(
        arena: &'a Arena,
        name: &'a str,
        args: &'a [&'a str],
        with_return: bool,
    ) -> &'a Code<'a> {
        Self::new(arena, CodeKind::TailCall(arena.alloc(CodeTailCall { name, args, with_return })))
    }

    pub fn next(&self) -> Option<&'a Code<'a>> {
        self.next.get()
    }
}

/// An appendable, spliceable list of code nodes.
pub struct CodeList<'a> {
    head: Cell<Option<&'a Code<'a>>>,
    tail: Cell<Option<&'a Code<'a>>>,
}

impl<'a> CodeList<'a> {
    pub fn new_in(arena: &'a Arena) -> &'a CodeList<'a> {
        arena.alloc(CodeList { head: Cell::new(None), tail: Cell::new(None) })
    }

    pub fn is_empty(&self) -> bool {
        self.head.get().is_none()
    }

    pub fn head(&self) -> Option<&'a Code<'a>> {
        self.head.get()
    }

    pub fn push(&self, code: &'a Code<'a>) {
        debug_assert!(code.next.get().is_none());
        match self.tail.get() {
            Some(tail) => tail.next.set(Some(code)),
            None => self.head.set(Some(code)),
        }
        self.tail.set(Some(code));
    }

    /// Splice another list onto the end of this one. The other list must not
    /// be appended to afterwards; both lists share the nodes.
    pub fn append(&self, other: &'a CodeList<'a>) {
        let Some(head) = other.head.get() else { return };
        match self.tail.get() {
            Some(tail) => tail.next.set(Some(head)),
            None => self.head.set(Some(head)),
        }
        self.tail.set(other.tail.get());
    }

    pub fn iter(&self) -> CodeIter<'a> {
        CodeIter { cur: self.head.get() }
    }
}

pub struct CodeIter<'a> {
    cur: Option<&'a Code<'a>>,
}

impl<'a> Iterator for CodeIter<'a> {
    type Item = &'a Code<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let code = self.cur?;
        self.cur = code.next.get();
        Some(code)
    }
}

impl<'a> CodeCase<'a> {
    pub fn next(&self) -> Option<&'a CodeCase<'a>> {
        self.next.get()
    }
}

impl<'a> CodeCases<'a> {
    pub fn new_in(arena: &'a Arena) -> &'a CodeCases<'a> {
        arena.alloc(CodeCases { head: Cell::new(None), tail: Cell::new(None) })
    }

    pub fn head(&self) -> Option<&'a CodeCase<'a>> {
        self.head.get()
    }

    pub fn push(&self, arena: &'a Arena, kind: CaseKind<'a>, body: &'a CodeList<'a>) {
        let case = arena.alloc(CodeCase {
            kind: RefCell::new(kind),
            body,
            next: Cell::new(None),
        });
        match self.tail.get() {
            Some(tail) => tail.next.set(Some(case)),
            None => self.head.set(Some(case)),
        }
        self.tail.set(Some(case));
    }

    pub fn push_front(&self, arena: &'a Arena, kind: CaseKind<'a>, body: &'a CodeList<'a>) {
        let case = arena.alloc(CodeCase {
            kind: RefCell::new(kind),
            body,
            next: Cell::new(self.head.get()),
        });
        if self.tail.get().is_none() {
            self.tail.set(Some(case));
        }
        self.head.set(Some(case));
    }

    pub fn iter(&self) -> CaseIter<'a> {
        CaseIter { cur: self.head.get() }
    }
}

pub struct CaseIter<'a> {
    cur: Option<&'a CodeCase<'a>>,
}

impl<'a> Iterator for CaseIter<'a> {
    type Item = &'a CodeCase<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let case = self.cur?;
        self.cur = case.next.get();
        Some(case)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_push_and_splice() {
        let arena = Arena::new();
        let a = CodeList::new_in(&arena);
        a.push(Code::stmt(&arena, "one"));

        let b = CodeList::new_in(&arena);
        b.push(Code::stmt(&arena, "two"));
        b.push(Code::stmt(&arena, "three"));

        a.append(b);
        a.push(Code::stmt(&arena, "four"));

        let texts: Vec<_> = a
            .iter()
            .map(|c| match c.kind {
                CodeKind::Stmt(s) => s,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(texts, ["one", "two", "three", "four"]);
    }

    #[test]
    fn splicing_an_empty_list_is_a_noop() {
        let arena = Arena::new();
        let a = CodeList::new_in(&arena);
        a.push(Code::stmt(&arena, "only"));
        a.append(CodeList::new_in(&arena));
        assert_eq!(a.iter().count(), 1);
    }

    #[test]
    fn cases_push_front() {
        let arena = Arena::new();
        let cases = CodeCases::new_in(&arena);
        cases.push(&arena, CaseKind::Number(0), CodeList::new_in(&arena));
        cases.push(&arena, CaseKind::Default, CodeList::new_in(&arena));
        cases.push_front(&arena, CaseKind::Number(-1), CodeList::new_in(&arena));

        let kinds: Vec<_> = cases.iter().map(|c| *c.kind.borrow()).collect();
        assert!(matches!(kinds[0], CaseKind::Number(-1)));
        assert!(matches!(kinds[1], CaseKind::Number(0)));
        assert!(matches!(kinds[2], CaseKind::Default));
    }
}

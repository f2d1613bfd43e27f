// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The lexc code-generation back end.
//!
//! ## Architecture
//!
//!   analyzed DFA(s) + option bundle
//! → `codegen` (tree building) → code tree
//! → renderer (external) → source text
//!
//! The front half of the generator (parsing the lexer spec, regex → NFA,
//! determinization, minimization, tag-variable allocation, transition
//! layout) runs elsewhere and hands this crate a finished [`dfa::Dfa`] per
//! start condition. This crate turns those automata into a structured code
//! tree: labels, gotos, switches, function definitions, tail calls, raw
//! text. The renderer owns indentation, statement separators, `#line`
//! directives, and the fusion of adjacent abstract ops (skip + peek into
//! one statement).
//!
//! ## Memory
//!
//! Everything generated lives in one [`arena::Arena`] per output block and
//! is connected by plain references, DFA graphs included. Nothing owns
//! anything else; the arena is dropped wholesale after rendering.
//!
//! ## Gotchas
//!
//! - Labels are mutable cells. Code that runs *late* (the `getstate`
//!   dispatch) marks labels used that were emitted much earlier, so no
//!   decision may depend on a label's used-flag until the whole block is
//!   done. The renderer runs as a second pass for exactly this reason.
//! - Bitmap offsets/masks are assigned while the bitmap *table* is
//!   generated, and consumed by transitions generated afterwards. Keep the
//!   preamble before the states.
//! - Tag histories are stored reversed; application order matters for
//!   interleaved positive/negative entries. See `codegen::tags`.

pub mod arena;
pub mod codegen;
pub mod dfa;
pub mod opts;

// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Tag operations.
//!
//! Two entry points: [`gen_settags`] translates a tag-command list into
//! assignments and API calls on a transition, and [`gen_fintags`] emits the
//! final submatch assignments right before a rule action fires.
//!
//! History arrays are stored in reverse, so they are applied back to front.
//! This is observable: forward application produces different captures for
//! histories with interleaved positive and negative elements.

use crate::dfa::{Dfa, Rule, TAGVER_BOTTOM, Tag, TagVer, Tcid};
use crate::opts::{Api, CodeModel};

use super::Ctx;
use super::api::{gen_backup_ctx, gen_restore_ctx, gen_settag, gen_shift};
use super::code::{Code, CodeList};

pub(crate) fn vartag_name(ver: TagVer, prefix: &str, is_mtag: bool) -> String {
    // S-tags and m-tags must not collide, so m-tags get an extra "m" (tag
    // variables in different conditions may share numbers).
    format!("{prefix}{}{ver}", if is_mtag { "m" } else { "" })
}

pub(crate) fn vartag_expr<'a>(cx: &mut Ctx<'a, '_>, ver: TagVer, is_mtag: bool) -> &'a str {
    let arena = cx.arena;
    let name = vartag_name(ver, &cx.opts.tags_prefix, is_mtag);
    cx.o.str(&cx.opts.tags_expression);
    cx.o.subst(&cx.opts.api_sigil, "tag", true, &name);
    cx.o.flush(arena)
}

/// Final tags are normally locals defined by the user around the lexer. In
/// rec/func mode every state is a separate function, so final tags must live
/// in the state threaded through those functions.
pub(crate) fn fintag_expr<'a>(cx: &mut Ctx<'a, '_>, name: &str) -> &'a str {
    let arena = cx.arena;
    if cx.opts.code_model == CodeModel::RecFunc {
        cx.o.str(&cx.opts.tags_expression);
        cx.o.subst(&cx.opts.api_sigil, "tag", true, name);
    } else {
        cx.o.str(name);
    }
    cx.o.flush(arena)
}

fn assign<'a>(cx: &mut Ctx<'a, '_>, stmts: &'a CodeList<'a>, lhs: &str, rhs: &str) {
    let arena = cx.arena;
    let lhs = cx.o.str(lhs).flush(arena);
    let rhs = cx.o.str(rhs).flush(arena);
    stmts.push(Code::assign(arena, lhs, rhs));
}

fn assign_many<'a>(cx: &mut Ctx<'a, '_>, stmts: &'a CodeList<'a>, many: &[&'a str], rhs: &str) {
    let arena = cx.arena;
    let lhs = &*arena.alloc_slice(many);
    let rhs = cx.o.str(rhs).flush(arena);
    stmts.push(Code::assign_many(arena, lhs, rhs));
}

fn assign_many_to_first<'a>(cx: &mut Ctx<'a, '_>, stmts: &'a CodeList<'a>, many: &[&'a str]) {
    if many.len() <= 1 {
        return;
    }
    let arena = cx.arena;
    let lhs = &*arena.alloc_slice(&many[1..]);
    stmts.push(Code::assign_many(arena, lhs, many[0]));
}

/// Emit the tag commands of one transition (or of a state, when hoisted).
pub(crate) fn gen_settags<'a>(
    cx: &mut Ctx<'a, '_>,
    tag_actions: &'a CodeList<'a>,
    dfa: &Dfa<'a>,
    tcid: Tcid,
) {
    let generic = cx.opts.api == Api::Custom;
    let cmd = dfa.tcpool.get(tcid);

    // Single tag, backwards compatibility: use the context marker.
    if cmd.is_some() && dfa.oldstyle_ctxmarker {
        if generic {
            gen_backup_ctx(cx, tag_actions);
        } else {
            let ctxmarker = cx.opts.api_ctxmarker.clone();
            let cursor = cx.opts.api_cursor.clone();
            assign(cx, tag_actions, &ctxmarker, &cursor);
        }
        return;
    }

    let mut cur = cmd;
    while let Some(p) = cur {
        let is_mtag = dfa.mtagvers.contains(&p.lhs);
        let le = vartag_expr(cx, p.lhs, is_mtag);
        let re = vartag_expr(cx, p.rhs, is_mtag);

        if p.is_copy() {
            assign(cx, tag_actions, le, re);
            cur = p.next;
        } else if p.is_add() {
            // Save with history.
            if p.lhs != p.rhs {
                assign(cx, tag_actions, le, re);
            }
            // The history is stored in reverse, apply it back to front.
            for &h in p.history.iter().rev() {
                gen_settag(cx, tag_actions, le, h == TAGVER_BOTTOM, true);
            }
            cur = p.next;
        } else if generic {
            // Plain save.
            let negative = p.history[0] == TAGVER_BOTTOM;
            gen_settag(cx, tag_actions, le, negative, false);
            cur = p.next;
        } else {
            // With the default API a run of consecutive saves collapses into
            // two vectorized assignments.
            let mut neg = Vec::new();
            let mut pos = Vec::new();
            let mut q = Some(p);
            while let Some(c) = q {
                if !c.is_set() {
                    break;
                }
                let mtag = dfa.mtagvers.contains(&c.lhs);
                let lhs = vartag_expr(cx, c.lhs, mtag);
                if c.history[0] == TAGVER_BOTTOM {
                    neg.push(lhs);
                } else {
                    pos.push(lhs);
                }
                q = c.next;
            }
            if !neg.is_empty() {
                assign_many(cx, tag_actions, &neg, "NULL");
            }
            if !pos.is_empty() {
                let cursor = cx.opts.api_cursor.clone();
                assign_many(cx, tag_actions, &pos, &cursor);
            }
            cur = q;
        }
    }
}

/// Expand a tag to the expressions that receive its final value: nothing for
/// trailing context, the tag name for named tags, and a run of submatch
/// array elements for capture tags.
pub(crate) fn expand_fintags<'a>(cx: &mut Ctx<'a, '_>, tag: &Tag) -> Vec<&'a str> {
    let arena = cx.arena;
    let mut fintags = Vec::new();

    if tag.trailing {
        return fintags;
    }
    if !tag.capture() {
        fintags.push(fintag_expr(cx, &tag.name));
        return fintags;
    }

    let yypmatch = fintag_expr(cx, "yypmatch");
    for i in (tag.lsub..=tag.hsub).step_by(2) {
        cx.o.str(&cx.opts.array_elem);
        cx.o.subst(&cx.opts.api_sigil, "array", false, yypmatch);
        cx.o.subst_num(&cx.opts.api_sigil, "index", false, i as i64);
        fintags.push(cx.o.flush(arena));
    }
    fintags
}

/// Emit the final tag assignments for a matched rule, before its action.
///
/// Variable tags are set before the fixed tags that depend on them, and the
/// trailing context is updated last because fixed tags may depend on the
/// rightmost position.
pub(crate) fn gen_fintags<'a>(
    cx: &mut Ctx<'a, '_>,
    stmts: &'a CodeList<'a>,
    dfa: &Dfa<'a>,
    rule: &Rule,
) {
    let arena = cx.arena;
    let generic = cx.opts.api == Api::Custom;

    if rule.ncap > 0 {
        let lhs = fintag_expr(cx, "yynmatch");
        let rhs = cx.o.u64(rule.ncap as u64).flush(arena);
        stmts.push(Code::assign(arena, lhs, rhs));
    }

    let varops = CodeList::new_in(arena);
    let fixops = CodeList::new_in(arena);
    let trailops = CodeList::new_in(arena);
    let fixpostops = CodeList::new_in(arena);
    let mut negtag: Option<&'a str> = None;

    for t in rule.ltag..rule.htag {
        let tag = &dfa.tags[t];

        // Structural tags disambiguate the match and have no user value.
        if tag.fictive() {
            continue;
        }

        let fintags = expand_fintags(cx, tag);

        let Some(fixed) = tag.fixed else {
            let expr = vartag_expr(cx, dfa.finvers[t], tag.history);
            if tag.trailing {
                let notag = dfa.oldstyle_ctxmarker;
                if generic {
                    gen_restore_ctx(cx, trailops, if notag { None } else { Some(expr) });
                } else {
                    let cursor = cx.opts.api_cursor.clone();
                    let rhs =
                        if notag { cx.opts.api_ctxmarker.clone() } else { expr.to_string() };
                    assign(cx, trailops, &cursor, &rhs);
                }
            } else {
                assign_many(cx, varops, &fintags, expr);
            }
            continue;
        };

        debug_assert!(!tag.history);

        // A fixed tag lies at a constant offset from a variable tag or from
        // the cursor.
        let dist = fixed.dist as i32;
        let fixed_on_cursor = fixed.base.is_none();
        let base = match fixed.base {
            None => {
                let cursor = cx.opts.api_cursor.clone();
                cx.o.str(&cursor).flush(arena)
            }
            Some(b) => vartag_expr(cx, dfa.finvers[b], tag.history),
        };

        if tag.trailing {
            debug_assert!(tag.toplevel);
            if generic {
                if !fixed_on_cursor {
                    gen_restore_ctx(cx, trailops, Some(base));
                }
                gen_shift(cx, trailops, -dist, None, false);
            } else {
                let cursor = cx.o.str(&cx.opts.api_cursor).flush(arena);
                if fixed_on_cursor {
                    let rhs = cx.o.i32(dist).flush(arena);
                    trailops.push(Code::assign_op(arena, cursor, rhs, Some("-")));
                } else {
                    cx.o.str(base);
                    if dist > 0 {
                        cx.o.str(" - ").i32(dist);
                    }
                    let rhs = cx.o.flush(arena);
                    trailops.push(Code::assign(arena, cursor, rhs));
                }
            }
            continue;
        }

        debug_assert!(!fintags.is_empty());
        let first = fintags[0];

        if generic {
            if fixed_on_cursor {
                gen_settag(cx, fixops, first, false, false);
                gen_shift(cx, fixops, -dist, Some(first), false);
                assign_many_to_first(cx, fixops, &fintags);
            } else if dist == 0 {
                assign_many(cx, fixops, &fintags, base);
            } else if tag.toplevel {
                assign(cx, fixops, first, base);
                gen_shift(cx, fixops, -dist, Some(first), false);
                assign_many_to_first(cx, fixops, &fintags);
            } else {
                // Two steps: set the fixed tags to their base, then compare
                // against a designated "negative" base tag before shifting
                // (there is no NULL constant in the generic API). The
                // comparison value is materialized after all uses of the
                // base tag.
                let negtag = *negtag.get_or_insert(base);
                assign(cx, fixops, first, base);
                let cond = cx.o.str(first).str(" != ").str(negtag).flush(arena);
                let then = CodeList::new_in(arena);
                gen_shift(cx, then, -dist, Some(first), false);
                fixpostops.push(Code::if_then_else(arena, cond, then, None));
            }
        } else if dist == 0 {
            assign_many(cx, fixops, &fintags, base);
        } else if tag.toplevel {
            let rhs = cx.o.str(base).str(" - ").i32(dist).flush(arena);
            assign_many(cx, fixops, &fintags, rhs);
        } else {
            // If the base tag is NULL the fixed tag is NULL as well,
            // otherwise it is the base plus a constant offset.
            assign(cx, fixops, first, base);
            let cond = cx.o.str(base).str(" != NULL").flush(arena);
            let then = CodeList::new_in(arena);
            let text = cx.o.str(first).str(" -= ").i32(dist).flush(arena);
            then.push(Code::stmt(arena, text));
            fixops.push(Code::if_then_else(arena, cond, then, None));
            assign_many_to_first(cx, fixops, &fintags);
        }
    }

    stmts.append(varops);
    stmts.append(fixops);
    stmts.append(trailops);

    if let Some(negtag) = negtag {
        debug_assert!(cx.opts.api == Api::Custom);
        let text = cx.o.str("/* materialize no-match value */").flush(arena);
        stmts.push(Code::text(arena, text));
        gen_settag(cx, stmts, negtag, true, false);
        stmts.append(fixpostops);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::super::testutil::{dump, new_state, with_ctx};
    use super::*;
    use crate::arena::Arena;
    use crate::dfa::{Action, FixedTag, Loc, SemAct, TAGVER_ZERO, TagCmd, TagKind};
    use crate::opts::{ApiStyle, Opts};

    fn tag(kind: TagKind, name: &str) -> Tag {
        Tag {
            kind,
            name: name.into(),
            trailing: false,
            history: false,
            fixed: None,
            toplevel: false,
            lsub: 0,
            hsub: 0,
        }
    }

    fn rule_with_tags(ltag: usize, htag: usize, ncap: usize) -> Rule {
        Rule {
            semact: SemAct { loc: Loc::default(), cond: None, autogen: false, text: "{}".into() },
            ltag,
            htag,
            ncap,
        }
    }

    fn dfa_for_tags<'a>(arena: &'a Arena, tags: Vec<Tag>, finvers: Vec<TagVer>) -> Dfa<'a> {
        let head = new_state(arena, 0, Action::Match, 0);
        let mut dfa = super::super::testutil::empty_dfa(arena, head);
        dfa.tags = tags;
        dfa.finvers = finvers;
        dfa
    }

    fn freeform_opts() -> Opts {
        let mut opts = Opts::default();
        opts.api = Api::Custom;
        opts.api_style = ApiStyle::Freeform;
        opts.api_stag_set_pos = "@@{tag} = cur;".into();
        opts.api_stag_set_neg = "@@{tag} = NONE;".into();
        opts.api_stag_shift = "@@{tag} += @@{shift};".into();
        opts
    }

    #[test]
    fn copy_command_is_one_assignment() {
        let arena = Arena::new();
        with_ctx(&arena, Opts::default(), |cx| {
            let cmd = TagCmd { lhs: 2, rhs: 1, history: &[], next: None };
            let head = new_state(cx.arena, 0, Action::Match, 0);
            let mut dfa = super::super::testutil::empty_dfa(cx.arena, head);
            let tcid = dfa.tcpool.insert(cx.arena.alloc(cmd));

            let stmts = CodeList::new_in(cx.arena);
            gen_settags(cx, stmts, &dfa, tcid);
            assert_eq!(dump(stmts), "yyt2 = yyt1\n");
        });
    }

    #[test]
    fn save_with_history_applies_in_reverse() {
        let arena = Arena::new();
        with_ctx(&arena, Opts::default(), |cx| {
            // Stored order [pos, bottom]; emitted order is bottom first.
            let cmd = TagCmd { lhs: 3, rhs: 2, history: &[5, TAGVER_BOTTOM], next: None };
            let head = new_state(cx.arena, 0, Action::Match, 0);
            let mut dfa = super::super::testutil::empty_dfa(cx.arena, head);
            dfa.mtagvers = HashSet::from([3, 2]);
            let tcid = dfa.tcpool.insert(cx.arena.alloc(cmd));

            let stmts = CodeList::new_in(cx.arena);
            gen_settags(cx, stmts, &dfa, tcid);
            assert_eq!(
                dump(stmts),
                "yytm3 = yytm2\n\
                 stmt YYMTAGN(yytm3)\n\
                 stmt YYMTAGP(yytm3)\n"
            );
        });
    }

    #[test]
    fn default_api_vectorizes_a_run_of_saves() {
        let arena = Arena::new();
        with_ctx(&arena, Opts::default(), |cx| {
            let copy = &*cx.arena.alloc(TagCmd { lhs: 9, rhs: 8, history: &[], next: None });
            let s3 = &*cx.arena.alloc(TagCmd {
                lhs: 3,
                rhs: TAGVER_ZERO,
                history: &[1],
                next: Some(copy),
            });
            let s2 = &*cx.arena.alloc(TagCmd {
                lhs: 2,
                rhs: TAGVER_ZERO,
                history: &[TAGVER_BOTTOM],
                next: Some(s3),
            });
            let s1 = &*cx.arena.alloc(TagCmd {
                lhs: 1,
                rhs: TAGVER_ZERO,
                history: &[1],
                next: Some(s2),
            });

            let head = new_state(cx.arena, 0, Action::Match, 0);
            let mut dfa = super::super::testutil::empty_dfa(cx.arena, head);
            let tcid = dfa.tcpool.insert(s1);

            let stmts = CodeList::new_in(cx.arena);
            gen_settags(cx, stmts, &dfa, tcid);
            assert_eq!(
                dump(stmts),
                "yyt2 = NULL\n\
                 yyt1, yyt3 = YYCURSOR\n\
                 yyt9 = yyt8\n"
            );
        });
    }

    #[test]
    fn oldstyle_context_marker() {
        let arena = Arena::new();
        with_ctx(&arena, Opts::default(), |cx| {
            let cmd = TagCmd { lhs: 1, rhs: TAGVER_ZERO, history: &[1], next: None };
            let head = new_state(cx.arena, 0, Action::Match, 0);
            let mut dfa = super::super::testutil::empty_dfa(cx.arena, head);
            dfa.oldstyle_ctxmarker = true;
            let tcid = dfa.tcpool.insert(cx.arena.alloc(cmd));

            let stmts = CodeList::new_in(cx.arena);
            gen_settags(cx, stmts, &dfa, tcid);
            assert_eq!(dump(stmts), "YYCTXMARKER = YYCURSOR\n");
        });
    }

    #[test]
    fn capture_rule_sets_match_count_and_pmatch() {
        let arena = Arena::new();
        with_ctx(&arena, Opts::default(), |cx| {
            let mut cap = tag(TagKind::Capture, "");
            cap.lsub = 0;
            cap.hsub = 2;
            cap.toplevel = true;
            let dfa = dfa_for_tags(cx.arena, vec![cap], vec![7]);

            let stmts = CodeList::new_in(cx.arena);
            gen_fintags(cx, stmts, &dfa, &rule_with_tags(0, 1, 2));
            assert_eq!(
                dump(stmts),
                "yynmatch = 2\n\
                 yypmatch[0], yypmatch[2] = yyt7\n"
            );
        });
    }

    #[test]
    fn trailing_variable_tag_restores_cursor() {
        let arena = Arena::new();
        with_ctx(&arena, Opts::default(), |cx| {
            let mut trail = tag(TagKind::Named, "");
            trail.trailing = true;
            let dfa = dfa_for_tags(cx.arena, vec![tag(TagKind::Named, "t"), trail], vec![4, 5]);

            let stmts = CodeList::new_in(cx.arena);
            gen_fintags(cx, stmts, &dfa, &rule_with_tags(0, 2, 0));
            assert_eq!(
                dump(stmts),
                "t = yyt4\n\
                 YYCURSOR = yyt5\n"
            );
        });
    }

    #[test]
    fn fixed_inner_tags_share_a_materialized_negative_base() {
        let arena = Arena::new();
        with_ctx(&arena, freeform_opts(), |cx| {
            let base = tag(TagKind::Fictive, "");
            let mut x = tag(TagKind::Named, "x");
            x.fixed = Some(FixedTag { base: Some(0), dist: 1 });
            let mut y = tag(TagKind::Named, "y");
            y.fixed = Some(FixedTag { base: Some(0), dist: 2 });
            let dfa = dfa_for_tags(cx.arena, vec![base, x, y], vec![1, 0, 0]);

            let stmts = CodeList::new_in(cx.arena);
            gen_fintags(cx, stmts, &dfa, &rule_with_tags(0, 3, 0));
            assert_eq!(
                dump(stmts),
                "x = yyt1\n\
                 y = yyt1\n\
                 text /* materialize no-match value */\n\
                 text yyt1 = NONE;\n\
                 if x != yyt1:\n  \
                   text x += -1;\n\
                 if y != yyt1:\n  \
                   text y += -2;\n"
            );
        });
    }

    #[test]
    fn fixed_toplevel_tag_under_default_api() {
        let arena = Arena::new();
        with_ctx(&arena, Opts::default(), |cx| {
            let base = tag(TagKind::Fictive, "");
            let mut x = tag(TagKind::Named, "x");
            x.fixed = Some(FixedTag { base: Some(0), dist: 3 });
            x.toplevel = true;
            let dfa = dfa_for_tags(cx.arena, vec![base, x], vec![2, 0]);

            let stmts = CodeList::new_in(cx.arena);
            gen_fintags(cx, stmts, &dfa, &rule_with_tags(0, 2, 0));
            assert_eq!(dump(stmts), "x = yyt2 - 3\n");
        });
    }
}

//! Rule-mode matching: the productive matcher that consumes input, appends
//! CST nodes and interleaves hidden/ignored skipping after each token.
//!
//! Contract for every element: on success the cursor advanced and nodes were
//! appended; on failure the state is exactly as it was at entry.

use crate::cst::NodeId;
use crate::grammar::{ElemId, GrammarElement, LitMatch, Repetition, RuleKind};
use crate::text::codepoint_complete;

use super::{terminal, ParseState};

/// Match `elem` at the state's cursor.
pub(crate) fn match_rule(state: &mut ParseState<'_>, elem: ElemId) -> bool {
    let grammar = state.grammar;
    match grammar.element(elem) {
        GrammarElement::Literal(lit) => match lit.match_at(state.src(), state.cursor()) {
            LitMatch::Hit(end) => {
                state.leaf(end, elem);
                state.skip_hidden();
                true
            }
            LitMatch::Miss(_) | LitMatch::Boundary(_) => false,
        },
        GrammarElement::CharacterRange(class) => {
            let at = state.cursor();
            let byte = state.src().as_bytes().get(at).copied();
            match byte {
                Some(byte) if class.test(byte) => {
                    state.leaf(at + 1, elem);
                    state.skip_hidden();
                    true
                }
                _ => false,
            }
        }
        GrammarElement::AnyCharacter => {
            let at = state.cursor();
            match codepoint_complete(state.src(), at) {
                Some(len) => {
                    state.leaf(at + len, elem);
                    state.skip_hidden();
                    true
                }
                None => false,
            }
        }
        GrammarElement::Group(items) => {
            let mark = state.mark();
            for &item in items {
                if !match_rule(state, item) {
                    state.rewind(mark);
                    return false;
                }
            }
            true
        }
        GrammarElement::OrderedChoice(items) => {
            for &item in items {
                let mark = state.mark();
                if match_rule(state, item) {
                    return true;
                }
                state.rewind(mark);
            }
            false
        }
        GrammarElement::UnorderedGroup(items) => {
            let entry = state.mark();
            let mut processed = vec![false; items.len()];
            loop {
                let mut any = false;
                for (i, &item) in items.iter().enumerate() {
                    if processed[i] {
                        continue;
                    }
                    let mark = state.mark();
                    if match_rule(state, item) {
                        processed[i] = true;
                        any = true;
                    } else {
                        state.rewind(mark);
                    }
                }
                if !any {
                    break;
                }
            }
            if processed.iter().all(|&p| p) {
                true
            } else {
                state.rewind(entry);
                false
            }
        }
        GrammarElement::Repetition(rep) => match_repetition(state, rep),
        GrammarElement::AndPredicate(inner) => {
            let mark = state.mark();
            let matched = match_rule(state, *inner);
            state.rewind(mark);
            matched
        }
        GrammarElement::NotPredicate(inner) => {
            let mark = state.mark();
            let matched = match_rule(state, *inner);
            state.rewind(mark);
            !matched
        }
        GrammarElement::Assignment(assignment) => {
            if matches!(
                grammar.element(assignment.inner),
                GrammarElement::OrderedChoice(_)
            ) {
                // run the choice into a fresh child node carrying the
                // assignment, so materialization sees which feature to set
                let mark = state.enter();
                if !match_rule(state, assignment.inner) {
                    state.rewind(mark);
                    return false;
                }
                state.exit(elem);
                true
            } else {
                // save one CST level: retag the first node the sub-element
                // produced
                let first = state.node_count();
                if !match_rule(state, assignment.inner) {
                    return false;
                }
                if state.node_count() > first {
                    state.override_grammar_element(NodeId(first), elem);
                }
                true
            }
        }
        GrammarElement::Action(_) => {
            // zero-width marker; materialization handles it in order
            let at = state.cursor();
            state.leaf(at, elem);
            true
        }
        GrammarElement::CrossReference(xref) => match_rule(state, xref.inner),
        GrammarElement::Rule(rule) => {
            let body = rule
                .body
                .unwrap_or_else(|| panic!("rule `{}` has no definition", rule.name));
            match rule.kind {
                RuleKind::Terminal => {
                    let m = terminal::match_element(grammar, body, state.src(), state.cursor());
                    if !m.valid {
                        return false;
                    }
                    state.leaf(m.end, elem);
                    state.skip_hidden();
                    true
                }
                RuleKind::DataType | RuleKind::Parser => {
                    let mark = state.enter();
                    if !match_rule(state, body) {
                        state.rewind(mark);
                        return false;
                    }
                    state.exit(elem);
                    true
                }
            }
        }
    }
}

fn match_repetition(state: &mut ParseState<'_>, rep: &Repetition) -> bool {
    let mark = state.mark();
    let mut count: u32 = 0;
    while count < rep.min {
        if !match_rule(state, rep.inner) {
            state.rewind(mark);
            return false;
        }
        count += 1;
    }
    while count < rep.max {
        let before = state.cursor();
        if !match_rule(state, rep.inner) || state.cursor() == before {
            break;
        }
        count += 1;
    }
    true
}

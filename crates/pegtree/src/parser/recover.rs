//! Recovery-mode matching: every element first tries its normal match and,
//! when allowed, spends bounded edits (insert / delete / replace) to get
//! past the mismatch. Same rewind contract as rule mode.

use tracing::trace;

use crate::cst::NodeId;
use crate::grammar::{ElemId, GrammarElement, LitMatch, Literal, Repetition, RuleKind};
use crate::text::{advance_one_codepoint_lossy, codepoint_complete, is_word, CharClass};

use super::{terminal, RecoverState};

/// Recover-match `elem` at the state's cursor.
pub(crate) fn recover(state: &mut RecoverState<'_>, elem: ElemId) -> bool {
    let grammar = state.grammar;
    match grammar.element(elem) {
        GrammarElement::Literal(lit) => recover_literal(state, elem, lit),
        GrammarElement::CharacterRange(class) => recover_class(state, elem, class),
        GrammarElement::AnyCharacter => recover_any(state, elem),
        GrammarElement::Group(items) => recover_group(state, items),
        GrammarElement::OrderedChoice(items) => recover_choice(state, items),
        GrammarElement::UnorderedGroup(items) => recover_unordered(state, items),
        GrammarElement::Repetition(rep) => recover_repetition(state, rep),
        GrammarElement::AndPredicate(inner) => probe(state, *inner),
        GrammarElement::NotPredicate(inner) => !probe(state, *inner),
        GrammarElement::Assignment(assignment) => {
            if matches!(
                grammar.element(assignment.inner),
                GrammarElement::OrderedChoice(_)
            ) {
                let mark = state.enter();
                if !recover(state, assignment.inner) {
                    state.rewind(mark);
                    return false;
                }
                state.exit(elem);
                true
            } else {
                let first = state.node_count();
                if !recover(state, assignment.inner) {
                    return false;
                }
                if state.node_count() > first {
                    state.override_grammar_element(NodeId(first), elem);
                }
                true
            }
        }
        GrammarElement::Action(_) => {
            let at = state.cursor();
            state.leaf(at, elem);
            true
        }
        GrammarElement::CrossReference(xref) => recover(state, xref.inner),
        GrammarElement::Rule(rule) => {
            let body = rule
                .body
                .unwrap_or_else(|| panic!("rule `{}` has no definition", rule.name));
            match rule.kind {
                RuleKind::Terminal => recover_terminal_rule(state, elem, body),
                RuleKind::DataType | RuleKind::Parser => {
                    let mark = state.enter();
                    if !recover(state, body) {
                        trace!(rule = &*rule.name, offset = state.cursor(), "rule recover fail");
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

fn recover_literal(state: &mut RecoverState<'_>, elem: ElemId, lit: &Literal) -> bool {
    let mut boundary = None;
    match lit.match_at(state.src(), state.cursor()) {
        LitMatch::Hit(end) => {
            state.leaf(end, elem);
            state.skip_hidden();
            return true;
        }
        LitMatch::Boundary(off) => boundary = Some(off),
        LitMatch::Miss(_) => {}
    }

    if state.is_strict_no_edit() {
        return false;
    }

    let mark = state.mark();
    if let Some(boundary_off) = boundary {
        // the literal's bytes are present but run into a word character:
        // either the offending character is spurious (delete it) or the
        // whole word is a one-char-longer form of the literal (replace it)
        let boundary_mark = state.mark();
        let boundary_end = advance_one_codepoint_lossy(state.src(), boundary_off);
        state.leaf(boundary_off, elem);
        if state.delete_one_codepoint() {
            trace!(lit = &*lit.text, "literal boundary delete");
            return true;
        }
        state.rewind(boundary_mark);
        if boundary_end > state.cursor() && state.replace_leaf(boundary_end, elem) {
            trace!(lit = &*lit.text, "literal boundary replace");
            state.skip_hidden();
            return true;
        }
        state.rewind(mark);
    }

    if lit.insertable() {
        if state.insert_hidden(elem) {
            state.skip_hidden();
            return true;
        }
        state.rewind(mark);
    }
    if state.insert_hidden_forced(elem) {
        state.skip_hidden();
        return true;
    }
    state.rewind(mark);

    if lit.typo_replaceable() {
        if let Some(typo_end) = lit.typo_replace_end(state.src(), state.cursor()) {
            let runs_into_word =
                typo_end < state.end() && is_word(state.src().as_bytes()[typo_end]);
            if !runs_into_word && state.replace_leaf(typo_end, elem) {
                trace!(lit = &*lit.text, "literal typo replace");
                state.skip_hidden();
                return true;
            }
        }
    }

    while state.delete_one_codepoint() {
        if let LitMatch::Hit(end) = lit.match_at(state.src(), state.cursor()) {
            trace!(lit = &*lit.text, offset = state.cursor(), "literal delete-scan match");
            state.leaf(end, elem);
            state.skip_hidden();
            return true;
        }
    }

    state.rewind(mark);
    false
}

fn recover_class(state: &mut RecoverState<'_>, elem: ElemId, class: &CharClass) -> bool {
    let at = state.cursor();
    let byte = state.src().as_bytes().get(at).copied();
    if byte.is_some_and(|b| class.test(b)) {
        state.leaf(at + 1, elem);
        state.skip_hidden();
        return true;
    }

    if state.is_strict_no_edit() {
        return false;
    }

    let mark = state.mark();
    while state.delete_one_codepoint() {
        let at = state.cursor();
        let byte = state.src().as_bytes().get(at).copied();
        if byte.is_some_and(|b| class.test(b)) {
            state.leaf(at + 1, elem);
            state.skip_hidden();
            return true;
        }
    }
    state.rewind(mark);
    false
}

fn recover_any(state: &mut RecoverState<'_>, elem: ElemId) -> bool {
    let at = state.cursor();
    if let Some(len) = codepoint_complete(state.src(), at) {
        state.leaf(at + len, elem);
        state.skip_hidden();
        return true;
    }

    if state.is_strict_no_edit() {
        return false;
    }

    let mark = state.mark();
    if state.insert_hidden(elem) {
        state.skip_hidden();
        return true;
    }
    state.rewind(mark);

    while state.delete_one_codepoint() {
        let at = state.cursor();
        if let Some(len) = codepoint_complete(state.src(), at) {
            state.leaf(at + len, elem);
            state.skip_hidden();
            return true;
        }
    }
    state.rewind(mark);
    false
}

fn recover_group(state: &mut RecoverState<'_>, items: &[ElemId]) -> bool {
    let mark = state.mark();
    for &item in items {
        if !recover(state, item) {
            state.rewind(mark);
            return false;
        }
    }
    true
}

fn choice_pass(state: &mut RecoverState<'_>, items: &[ElemId]) -> bool {
    for &item in items {
        let mark = state.mark();
        if recover(state, item) {
            return true;
        }
        state.rewind(mark);
    }
    false
}

fn recover_choice(state: &mut RecoverState<'_>, items: &[ElemId]) -> bool {
    if state.is_strict_no_edit() {
        return choice_pass(state, items);
    }

    // strict pass across all alternatives before any of them may spend
    // edits, so an exact later alternative beats an edited earlier one
    let entry = state.mark();
    let (allow_insert, allow_delete) = (state.allow_insert, state.allow_delete);
    state.allow_insert = false;
    state.allow_delete = false;
    let strict_hit = choice_pass(state, items);
    state.allow_insert = allow_insert;
    state.allow_delete = allow_delete;
    if strict_hit {
        return true;
    }
    state.rewind(entry);

    if choice_pass(state, items) {
        return true;
    }
    state.rewind(entry);
    false
}

fn unordered_pass(state: &mut RecoverState<'_>, items: &[ElemId]) -> bool {
    let mark = state.mark();
    let mut processed = vec![false; items.len()];
    loop {
        let mut any = false;
        for (i, &item) in items.iter().enumerate() {
            if processed[i] {
                continue;
            }
            let item_mark = state.mark();
            if recover(state, item) {
                processed[i] = true;
                any = true;
            } else {
                state.rewind(item_mark);
            }
        }
        if !any {
            break;
        }
    }
    if processed.iter().all(|&p| p) {
        true
    } else {
        state.rewind(mark);
        false
    }
}

fn recover_unordered(state: &mut RecoverState<'_>, items: &[ElemId]) -> bool {
    if state.is_strict_no_edit() {
        return unordered_pass(state, items);
    }

    let entry = state.mark();
    let (allow_insert, allow_delete) = (state.allow_insert, state.allow_delete);
    state.allow_insert = false;
    state.allow_delete = false;
    let strict_hit = unordered_pass(state, items);
    state.allow_insert = allow_insert;
    state.allow_delete = allow_delete;
    if strict_hit {
        return true;
    }
    // all elements are re-attempted from scratch in the editable pass,
    // including the ones the strict pass had matched
    state.rewind(entry);

    if unordered_pass(state, items) {
        return true;
    }
    state.rewind(entry);
    false
}

fn recover_repetition_strict(state: &mut RecoverState<'_>, rep: &Repetition) -> bool {
    let mark = state.mark();
    let mut count: u32 = 0;
    while count < rep.min {
        if !recover(state, rep.inner) {
            state.rewind(mark);
            return false;
        }
        count += 1;
    }
    while count < rep.max {
        let before = state.cursor();
        if !recover(state, rep.inner) || state.cursor() == before {
            break;
        }
        count += 1;
    }
    true
}

fn recover_repetition(state: &mut RecoverState<'_>, rep: &Repetition) -> bool {
    if state.is_strict_no_edit() {
        return recover_repetition_strict(state, rep);
    }

    if rep.is_optional() {
        let _ = recover(state, rep.inner);
        return true;
    }

    if rep.is_star() || rep.is_plus() {
        if rep.is_plus() {
            // the first occurrence must really be there and make progress
            let first_mark = state.mark();
            let before = state.cursor();
            let allow_insert = state.allow_insert;
            state.allow_insert = false;
            let matched = recover(state, rep.inner);
            state.allow_insert = allow_insert;
            if !matched || state.cursor() == before {
                state.rewind(first_mark);
                return false;
            }
        }
        // probing further occurrences never inserts: an edit-only iteration
        // would keep the loop alive without consuming anything
        loop {
            let before = state.cursor();
            let mark = state.mark();
            let allow_insert = state.allow_insert;
            state.allow_insert = false;
            let matched = recover(state, rep.inner);
            state.allow_insert = allow_insert;
            if matched && state.cursor() != before {
                continue;
            }
            state.rewind(mark);
            break;
        }
        return true;
    }

    // fixed and min/max shapes
    let mark = state.mark();
    let mut count: u32 = 0;
    while count < rep.min {
        if !recover(state, rep.inner) {
            state.rewind(mark);
            return false;
        }
        count += 1;
    }
    while count < rep.max {
        let before = state.cursor();
        let item_mark = state.mark();
        if !recover(state, rep.inner) || state.cursor() == before {
            state.rewind(item_mark);
            break;
        }
        count += 1;
    }
    true
}

/// Lookahead probe: edits are disabled and untracked, the cursor and builder
/// are always restored.
fn probe(state: &mut RecoverState<'_>, inner: ElemId) -> bool {
    if state.is_strict_no_edit() {
        return probe_strict(state, inner);
    }
    let (allow_insert, allow_delete) = (state.allow_insert, state.allow_delete);
    state.allow_insert = false;
    state.allow_delete = false;
    let matched = probe_strict(state, inner);
    state.allow_insert = allow_insert;
    state.allow_delete = allow_delete;
    matched
}

fn probe_strict(state: &mut RecoverState<'_>, inner: ElemId) -> bool {
    let track = state.track_edit_state;
    state.track_edit_state = false;
    let mark = state.mark();
    let matched = recover(state, inner);
    state.rewind(mark);
    state.track_edit_state = track;
    matched
}

fn recover_terminal_rule(state: &mut RecoverState<'_>, elem: ElemId, body: ElemId) -> bool {
    let m = terminal::match_element(state.grammar, body, state.src(), state.cursor());
    if m.valid {
        state.leaf(m.end, elem);
        state.skip_hidden();
        return true;
    }

    if state.is_strict_no_edit() {
        return false;
    }

    let mark = state.mark();
    if state.insert_hidden(elem) {
        state.skip_hidden();
        return true;
    }
    state.rewind(mark);
    if state.insert_hidden_forced(elem) {
        state.skip_hidden();
        return true;
    }
    state.rewind(mark);

    while state.delete_one_codepoint() {
        let m = terminal::match_element(state.grammar, body, state.src(), state.cursor());
        if m.valid {
            state.leaf(m.end, elem);
            state.skip_hidden();
            return true;
        }
    }
    state.rewind(mark);
    false
}

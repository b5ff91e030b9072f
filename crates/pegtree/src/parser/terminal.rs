//! Terminal-mode matching: pure, allocation-free, no hidden skipping. Used
//! inside terminal rules, by the skipper, and for lookahead probes.

use crate::grammar::{ElemId, Grammar, GrammarElement, LitMatch, Repetition};
use crate::text::codepoint_complete;

use super::MatchResult;

/// Match `elem` against `text` at byte position `at`.
pub(crate) fn match_element(
    grammar: &Grammar,
    elem: ElemId,
    text: &str,
    at: usize,
) -> MatchResult {
    match grammar.element(elem) {
        GrammarElement::Literal(lit) => match lit.match_at(text, at) {
            LitMatch::Hit(end) => MatchResult::success(end),
            LitMatch::Miss(off) | LitMatch::Boundary(off) => MatchResult::failure(off),
        },
        GrammarElement::CharacterRange(class) => {
            match text.as_bytes().get(at) {
                Some(&byte) if class.test(byte) => MatchResult::success(at + 1),
                _ => MatchResult::failure(at),
            }
        }
        GrammarElement::AnyCharacter => match codepoint_complete(text, at) {
            Some(len) => MatchResult::success(at + len),
            None => MatchResult::failure(at),
        },
        GrammarElement::Group(items) => {
            let mut pos = at;
            for &item in items {
                let m = match_element(grammar, item, text, pos);
                if !m.valid {
                    return m;
                }
                pos = m.end;
            }
            MatchResult::success(pos)
        }
        GrammarElement::OrderedChoice(items) => {
            for &item in items {
                let m = match_element(grammar, item, text, at);
                if m.valid {
                    return m;
                }
            }
            MatchResult::failure(at)
        }
        GrammarElement::UnorderedGroup(items) => {
            let mut processed = vec![false; items.len()];
            let mut pos = at;
            loop {
                let mut any = false;
                for (i, &item) in items.iter().enumerate() {
                    if processed[i] {
                        continue;
                    }
                    let m = match_element(grammar, item, text, pos);
                    if m.valid {
                        pos = m.end;
                        processed[i] = true;
                        any = true;
                    }
                }
                if !any {
                    break;
                }
            }
            if processed.iter().all(|&p| p) {
                MatchResult::success(pos)
            } else {
                MatchResult::failure(pos)
            }
        }
        GrammarElement::Repetition(rep) => match_repetition(grammar, rep, text, at),
        GrammarElement::AndPredicate(inner) => {
            if match_element(grammar, *inner, text, at).valid {
                MatchResult::success(at)
            } else {
                MatchResult::failure(at)
            }
        }
        GrammarElement::NotPredicate(inner) => {
            if match_element(grammar, *inner, text, at).valid {
                MatchResult::failure(at)
            } else {
                MatchResult::success(at)
            }
        }
        GrammarElement::Assignment(_) => {
            debug_assert!(false, "an assignment cannot appear in a terminal");
            MatchResult::failure(at)
        }
        GrammarElement::Action(_) => MatchResult::success(at),
        GrammarElement::CrossReference(xref) => match_element(grammar, xref.inner, text, at),
        GrammarElement::Rule(rule) => {
            let body = rule
                .body
                .unwrap_or_else(|| panic!("rule `{}` has no definition", rule.name));
            match_element(grammar, body, text, at)
        }
    }
}

fn match_repetition(
    grammar: &Grammar,
    rep: &Repetition,
    text: &str,
    at: usize,
) -> MatchResult {
    let mut pos = at;
    let mut count: u32 = 0;
    while count < rep.min {
        let m = match_element(grammar, rep.inner, text, pos);
        if !m.valid {
            return m;
        }
        pos = m.end;
        count += 1;
    }
    while count < rep.max {
        let m = match_element(grammar, rep.inner, text, pos);
        // a non-consuming iteration would loop forever
        if !m.valid || m.end == pos {
            break;
        }
        pos = m.end;
        count += 1;
    }
    MatchResult::success(pos)
}

//! Hidden/ignored token skipping between rule-mode matches.

use std::sync::Arc;

use crate::cst::CstBuilder;
use crate::grammar::{ElemId, Grammar, GrammarElement, RuleKind};

use super::terminal;

type ForceInsertFn = Arc<dyn Fn(&Grammar, ElemId, &str, usize) -> bool + Send + Sync>;

/// The composed skipper applied between tokens in rule mode.
///
/// *Ignored* terminals are consumed without leaving a trace; *hidden*
/// terminals are kept in the CST but tagged hidden. The skipper also owns
/// the force-insert policy consulted by the recovery layer.
#[derive(Clone)]
pub struct Skipper {
    ignored: Vec<ElemId>,
    hidden: Vec<ElemId>,
    force_insert: Option<ForceInsertFn>,
}

impl Skipper {
    /// A skipper that skips nothing; hidden-free grammars use this.
    pub fn none() -> Skipper {
        Skipper {
            ignored: Vec::new(),
            hidden: Vec::new(),
            force_insert: None,
        }
    }

    /// Skip from `pos`: consume as many ignored terminals as match, then at
    /// most one hidden terminal (emitting a hidden leaf), and repeat until
    /// neither applies.
    pub(crate) fn skip(
        &self,
        grammar: &Grammar,
        text: &str,
        mut pos: usize,
        builder: &mut CstBuilder,
    ) -> usize {
        loop {
            loop {
                let mut matched = false;
                for &rule in &self.ignored {
                    let m = terminal::match_element(grammar, rule, text, pos);
                    debug_assert!(
                        !(m.valid && m.end == pos),
                        "zero-width terminal in skipper"
                    );
                    if m.valid && m.end > pos {
                        pos = m.end;
                        matched = true;
                        break;
                    }
                }
                if !matched {
                    break;
                }
            }

            let mut matched_hidden = false;
            for &rule in &self.hidden {
                let m = terminal::match_element(grammar, rule, text, pos);
                debug_assert!(
                    !(m.valid && m.end == pos),
                    "zero-width terminal in skipper"
                );
                if m.valid && m.end > pos {
                    builder.leaf(pos as u32, m.end as u32, rule, true, false);
                    pos = m.end;
                    matched_hidden = true;
                    break;
                }
            }
            if !matched_hidden {
                return pos;
            }
        }
    }

    /// Whether recovery may conjure `elem` out of thin air at `cursor`.
    /// Default policy: any terminal rule, and single-character literals from
    /// the synchronization set `) ] } , ;`.
    pub(crate) fn can_force_insert(
        &self,
        grammar: &Grammar,
        elem: ElemId,
        text: &str,
        cursor: usize,
    ) -> bool {
        if let Some(policy) = &self.force_insert {
            return policy(grammar, elem, text, cursor);
        }
        default_can_force_insert(grammar, elem)
    }
}

fn default_can_force_insert(grammar: &Grammar, elem: ElemId) -> bool {
    match grammar.element(elem) {
        GrammarElement::Rule(rule) => rule.kind == RuleKind::Terminal,
        GrammarElement::Literal(lit) => {
            lit.text.len() == 1 && is_sync_punctuation(lit.text.as_bytes()[0])
        }
        _ => false,
    }
}

fn is_sync_punctuation(byte: u8) -> bool {
    matches!(byte, b')' | b']' | b'}' | b',' | b';')
}

/// Fluent construction of a [`Skipper`]: `.ignore(ws).hide(comment).build()`.
/// Both take terminal rules.
#[derive(Default)]
pub struct SkipperBuilder {
    ignored: Vec<ElemId>,
    hidden: Vec<ElemId>,
    force_insert: Option<ForceInsertFn>,
}

impl SkipperBuilder {
    pub fn new() -> SkipperBuilder {
        SkipperBuilder::default()
    }

    /// Elide matches of this terminal rule entirely.
    pub fn ignore(mut self, rule: impl Into<ElemId>) -> SkipperBuilder {
        self.ignored.push(rule.into());
        self
    }

    /// Keep matches of this terminal rule in the CST, tagged hidden.
    pub fn hide(mut self, rule: impl Into<ElemId>) -> SkipperBuilder {
        self.hidden.push(rule.into());
        self
    }

    /// Replace the default force-insert policy.
    pub fn force_insert_policy(
        mut self,
        policy: impl Fn(&Grammar, ElemId, &str, usize) -> bool + Send + Sync + 'static,
    ) -> SkipperBuilder {
        self.force_insert = Some(Arc::new(policy));
        self
    }

    pub fn build(self) -> Skipper {
        Skipper {
            ignored: self.ignored,
            hidden: self.hidden,
            force_insert: self.force_insert,
        }
    }
}

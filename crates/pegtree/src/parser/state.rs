//! The rule-mode parse state: cursor, builder and skipper, no edits.

use std::sync::Arc;

use crate::cst::{Checkpoint, CstBuilder, NodeId};
use crate::grammar::{ElemId, Grammar};

use super::Skipper;

/// State threaded through `rule()` matching. Mismatches rewind through
/// checkpoints; no edits ever happen here.
pub struct ParseState<'a> {
    pub(crate) grammar: &'a Grammar,
    pub(crate) skipper: &'a Skipper,
    text: Arc<str>,
    builder: &'a mut CstBuilder,
    cursor: usize,
    max_cursor: usize,
}

impl<'a> ParseState<'a> {
    pub fn new(
        grammar: &'a Grammar,
        skipper: &'a Skipper,
        builder: &'a mut CstBuilder,
    ) -> ParseState<'a> {
        let text = builder.shared_text();
        ParseState {
            grammar,
            skipper,
            text,
            builder,
            cursor: 0,
            max_cursor: 0,
        }
    }

    #[inline]
    pub fn src(&self) -> &str {
        &self.text
    }

    #[inline]
    pub fn end(&self) -> usize {
        self.text.len()
    }

    #[inline]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Furthest position the cursor ever reached; the recovery anchor.
    #[inline]
    pub fn max_cursor(&self) -> usize {
        self.max_cursor
    }

    pub fn mark(&self) -> Checkpoint {
        self.builder.mark(self.cursor as u32)
    }

    pub fn rewind(&mut self, checkpoint: Checkpoint) {
        self.cursor = self.builder.rewind(checkpoint) as usize;
    }

    /// Open a composite node at the cursor; the returned checkpoint undoes
    /// it on failure.
    pub fn enter(&mut self) -> Checkpoint {
        let checkpoint = self.mark();
        self.builder.enter(self.cursor as u32);
        checkpoint
    }

    pub fn exit(&mut self, elem: ElemId) {
        self.builder.exit(self.cursor as u32, elem);
    }

    /// Emit a leaf ending at `end` and advance the cursor to it.
    pub fn leaf(&mut self, end: usize, elem: ElemId) {
        self.builder
            .leaf(self.cursor as u32, end as u32, elem, false, false);
        self.cursor = end;
        if self.cursor > self.max_cursor {
            self.max_cursor = self.cursor;
        }
    }

    /// Let the skipper consume hidden/ignored input after a token.
    pub fn skip_hidden(&mut self) {
        self.cursor = self
            .skipper
            .skip(self.grammar, &self.text, self.cursor, self.builder);
        if self.cursor > self.max_cursor {
            self.max_cursor = self.cursor;
        }
    }

    pub fn node_count(&self) -> u32 {
        self.builder.node_count()
    }

    pub fn override_grammar_element(&mut self, id: NodeId, elem: ElemId) {
        self.builder.override_grammar_element(id, elem);
    }
}

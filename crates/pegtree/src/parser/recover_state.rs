//! The recovery-phase parse state: a cursor plus a mutable edit budget.

use std::sync::Arc;

use tracing::trace;

use crate::cst::{Checkpoint, CstBuilder, NodeId};
use crate::grammar::{ElemId, Grammar};
use crate::text::advance_one_codepoint_lossy;

use super::{Diagnostic, DiagnosticKind, Skipper};

/// Checkpoint for [`RecoverState`]: the builder state plus the edit
/// bookkeeping, so rewinding undoes edits and their diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct RecoverCheckpoint {
    builder: Checkpoint,
    had_edits: bool,
    consecutive_deletes: u32,
    diagnostic_len: usize,
}

/// State threaded through `recover()` matching. Same cursor/builder contract
/// as [`super::ParseState`], plus the right to spend bounded edits.
pub struct RecoverState<'a> {
    pub(crate) grammar: &'a Grammar,
    pub(crate) skipper: &'a Skipper,
    text: Arc<str>,
    builder: &'a mut CstBuilder,
    cursor: usize,
    max_cursor: usize,

    /// Ambient permission to insert hidden nodes.
    pub(crate) allow_insert: bool,
    /// Ambient permission to delete codepoints.
    pub(crate) allow_delete: bool,
    /// When false (predicate probes, strict replays) edits are disabled and
    /// not tracked at all.
    pub(crate) track_edit_state: bool,
    /// Whether any edit happened on this attempt.
    pub(crate) had_edits: bool,
    pub(crate) consecutive_deletes: u32,
    pub(crate) max_consecutive_deletes: u32,
    /// Half-open byte window outside of which edits are forbidden.
    pub(crate) edit_floor: usize,
    pub(crate) edit_ceiling: usize,
    pub(crate) diagnostics: Vec<Diagnostic>,
}

impl<'a> RecoverState<'a> {
    pub fn new(
        grammar: &'a Grammar,
        skipper: &'a Skipper,
        builder: &'a mut CstBuilder,
    ) -> RecoverState<'a> {
        let text = builder.shared_text();
        let end = text.len();
        RecoverState {
            grammar,
            skipper,
            text,
            builder,
            cursor: 0,
            max_cursor: 0,
            allow_insert: true,
            allow_delete: true,
            track_edit_state: true,
            had_edits: false,
            consecutive_deletes: 0,
            max_consecutive_deletes: 8,
            edit_floor: 0,
            edit_ceiling: end,
            diagnostics: Vec::new(),
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

    #[inline]
    pub fn max_cursor(&self) -> usize {
        self.max_cursor
    }

    pub fn mark(&self) -> RecoverCheckpoint {
        RecoverCheckpoint {
            builder: self.builder.mark(self.cursor as u32),
            had_edits: self.had_edits,
            consecutive_deletes: self.consecutive_deletes,
            diagnostic_len: self.diagnostics.len(),
        }
    }

    pub fn rewind(&mut self, checkpoint: RecoverCheckpoint) {
        self.cursor = self.builder.rewind(checkpoint.builder) as usize;
        if !self.track_edit_state {
            return;
        }
        self.had_edits = checkpoint.had_edits;
        self.consecutive_deletes = checkpoint.consecutive_deletes;
        self.diagnostics.truncate(checkpoint.diagnostic_len);
    }

    pub fn enter(&mut self) -> RecoverCheckpoint {
        let checkpoint = self.mark();
        self.builder.enter(self.cursor as u32);
        checkpoint
    }

    /// Close the current node. A successful node boundary reopens the
    /// deletion budget for the siblings that follow.
    pub fn exit(&mut self, elem: ElemId) {
        self.builder.exit(self.cursor as u32, elem);
        if self.track_edit_state {
            self.consecutive_deletes = 0;
        }
    }

    pub fn leaf(&mut self, end: usize, elem: ElemId) {
        self.leaf_full(end, elem, false, false);
    }

    pub fn leaf_full(&mut self, end: usize, elem: ElemId, hidden: bool, recovered: bool) {
        self.builder
            .leaf(self.cursor as u32, end as u32, elem, hidden, recovered);
        let widened = end > self.cursor;
        self.cursor = end;
        if self.cursor > self.max_cursor {
            self.max_cursor = self.cursor;
        }
        if self.track_edit_state && widened {
            self.consecutive_deletes = 0;
        }
    }

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

    // ---- edit budget -------------------------------------------------

    #[inline]
    pub fn is_strict_no_edit(&self) -> bool {
        !self.allow_insert && !self.allow_delete
    }

    #[inline]
    fn can_edit_at(&self, offset: usize) -> bool {
        offset >= self.edit_floor && offset <= self.edit_ceiling
    }

    #[inline]
    fn can_edit(&self) -> bool {
        self.can_edit_at(self.cursor)
    }

    #[inline]
    fn can_insert(&self) -> bool {
        self.allow_insert && self.can_edit()
    }

    #[inline]
    fn can_delete(&self) -> bool {
        self.allow_delete
            && self.consecutive_deletes < self.max_consecutive_deletes
            && self.cursor < self.text.len()
            && self.can_edit()
    }

    fn can_force_insert_expected(&self, elem: ElemId) -> bool {
        if self.allow_insert || !self.allow_delete || !self.can_edit() {
            return false;
        }
        self.skipper
            .can_force_insert(self.grammar, elem, &self.text, self.cursor)
    }

    /// Zero-width hidden insertion of an expected element.
    pub fn insert_hidden(&mut self, elem: ElemId) -> bool {
        if !self.track_edit_state || !self.can_insert() {
            return false;
        }
        self.push_edit(DiagnosticKind::Inserted, Some(elem));
        self.builder
            .leaf(self.cursor as u32, self.cursor as u32, elem, true, true);
        trace!(offset = self.cursor, elem = elem.index(), "recovery insert");
        self.had_edits = true;
        self.consecutive_deletes = 0;
        true
    }

    /// Forced insertion: only when inserts are ambiently disabled but
    /// deletes are not, and the skipper policy approves the element.
    pub fn insert_hidden_forced(&mut self, elem: ElemId) -> bool {
        if !self.track_edit_state || !self.can_force_insert_expected(elem) {
            return false;
        }
        self.push_edit(DiagnosticKind::Inserted, Some(elem));
        self.builder
            .leaf(self.cursor as u32, self.cursor as u32, elem, true, true);
        trace!(
            offset = self.cursor,
            elem = elem.index(),
            "recovery forced insert"
        );
        self.had_edits = true;
        self.consecutive_deletes = 0;
        true
    }

    /// Skip one input codepoint (one byte on an invalid sequence), then
    /// re-skip hidden input.
    pub fn delete_one_codepoint(&mut self) -> bool {
        if !self.track_edit_state || !self.can_delete() {
            return false;
        }
        let before = self.cursor;
        self.push_edit(DiagnosticKind::Deleted, None);
        self.cursor = advance_one_codepoint_lossy(&self.text, self.cursor);
        if self.cursor > self.max_cursor {
            self.max_cursor = self.cursor;
        }
        self.had_edits = true;
        self.consecutive_deletes += 1;
        self.skip_hidden();
        trace!(from = before, to = self.cursor, "recovery delete");
        true
    }

    /// Consume `[cursor, end)` as a recovered leaf standing in for `elem`.
    pub fn replace_leaf(&mut self, end: usize, elem: ElemId) -> bool {
        if !self.track_edit_state || end <= self.cursor || end > self.text.len() {
            return false;
        }
        if !self.can_edit() || !self.can_edit_at(end) {
            return false;
        }
        let before = self.cursor;
        self.push_edit(DiagnosticKind::Replaced, Some(elem));
        self.builder
            .leaf(self.cursor as u32, end as u32, elem, false, true);
        self.cursor = end;
        if self.cursor > self.max_cursor {
            self.max_cursor = self.cursor;
        }
        self.had_edits = true;
        self.consecutive_deletes = 0;
        trace!(
            from = before,
            to = end,
            elem = elem.index(),
            "recovery replace"
        );
        true
    }

    fn push_edit(&mut self, kind: DiagnosticKind, element: Option<ElemId>) {
        self.diagnostics.push(Diagnostic {
            kind,
            offset: self.cursor as u32,
            element,
        });
    }
}

//! The parser driving grammar elements over an input: terminal-mode
//! matching, rule-mode matching with CST construction, and the
//! error-recovery variants, plus the user-facing parse result types.

pub(crate) mod recover;
mod recover_state;
pub(crate) mod rule;
pub(crate) mod search;
mod skipper;
mod state;
pub(crate) mod terminal;

pub use recover_state::RecoverState;
pub use skipper::{Skipper, SkipperBuilder};
pub use state::ParseState;

use crate::cst::{RootCstNode, TextOffset};
use crate::grammar::ElemId;

/// Outcome of a terminal-mode match: `end` points at the end of the match on
/// success, or at the position that made the match fail (for error
/// reporting) otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchResult {
    pub end: usize,
    pub valid: bool,
}

impl MatchResult {
    #[inline]
    pub fn success(end: usize) -> MatchResult {
        MatchResult { end, valid: true }
    }

    #[inline]
    pub fn failure(end: usize) -> MatchResult {
        MatchResult { end, valid: false }
    }
}

/// What kind of edit a recovery step performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// A zero-width hidden node was inserted for an expected element.
    Inserted,
    /// One input codepoint was skipped.
    Deleted,
    /// An input span was consumed as a misspelled form of an element.
    Replaced,
}

/// One recovery edit, in the order it was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    /// Byte offset of the cursor at the time of the edit.
    pub offset: TextOffset,
    /// The grammar element involved, when known (deletes have none).
    pub element: Option<ElemId>,
}

/// Knobs for the recovery phase.
#[derive(Debug, Clone, Copy)]
pub struct ParseOptions {
    /// Cap on consecutive codepoint deletions between successful node
    /// boundaries.
    pub max_consecutive_codepoint_deletes: u32,
    /// When non-zero, recovery first retries strictly, then edits only
    /// inside a window of this many bytes past the furthest strict match,
    /// then over the whole remaining input. When zero, the edit window
    /// starts at the furthest match and recovery repeats while it makes
    /// progress.
    pub local_recovery_window_bytes: u32,
}

impl Default for ParseOptions {
    fn default() -> ParseOptions {
        ParseOptions {
            max_consecutive_codepoint_deletes: 8,
            local_recovery_window_bytes: 0,
        }
    }
}

/// What a parse call returns.
#[derive(Debug)]
pub struct ParseResult<T> {
    /// Whether the rule matched the complete input.
    pub ret: bool,
    /// Whether the match needed recovery edits.
    pub recovered: bool,
    /// Byte length of the furthest successful prefix.
    pub len: usize,
    /// The finished CST (also owns the input copy).
    pub root_node: triomphe::Arc<RootCstNode>,
    /// The typed value, when the parse succeeded and conversion applied.
    pub value: Option<T>,
    /// Recovery edits, in application order. Non-empty iff `recovered`.
    pub diagnostics: Vec<Diagnostic>,
}

/// A parse result with the typed value erased.
pub type GenericParseResult = ParseResult<()>;

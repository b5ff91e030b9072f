use thiserror::Error;

/// Errors raised while turning matched text or CST nodes into typed values.
///
/// Grammar *mismatch* is never an error: matchers report it through their
/// return value. `ValueError` covers the converter and assignment layer —
/// malformed literals fed to a default converter, rules parsed with a type
/// that has no converter, and feature assignments that do not fit the
/// declared storage shape.
#[derive(Debug, Error)]
pub enum ValueError {
    /// A default converter rejected the matched text (e.g. `"12x"` as an
    /// integer). Recovery can synthesize empty leaves that land here.
    #[error("invalid {expected} literal {text:?}")]
    InvalidLiteral {
        expected: &'static str,
        text: String,
    },

    /// The rule's declared type has no default converter and none was
    /// supplied with `set_converter`.
    #[error("rule `{rule}` has no value converter for its declared type")]
    MissingConverter { rule: String },

    /// An assignment operator was applied to a storage shape that does not
    /// support it (e.g. `+=` into a scalar).
    #[error("feature `{feature}` does not support {op} from {got}")]
    Mismatch {
        feature: &'static str,
        op: &'static str,
        got: &'static str,
    },

    /// A child node of the wrong concrete type was assigned into a typed
    /// feature slot.
    #[error("feature `{feature}` expects a {expected} node, got {got}")]
    WrongNodeType {
        feature: &'static str,
        expected: &'static str,
        got: &'static str,
    },

    /// An assignment was executed against an AST node of the wrong type.
    #[error("expected a {expected} node to assign into, got {got}")]
    WrongTargetType {
        expected: &'static str,
        got: &'static str,
    },
}

impl ValueError {
    /// Conversion failures are tolerated during materialization (the feature
    /// keeps its default); everything else is a grammar-author error.
    pub(crate) fn is_conversion(&self) -> bool {
        matches!(
            self,
            ValueError::InvalidLiteral { .. } | ValueError::MissingConverter { .. }
        )
    }
}

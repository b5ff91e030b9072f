//! Deferred, name-based cross-references between AST nodes.

use std::cell::{OnceCell, RefCell};
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use super::{AstNode, AstPtr, DynNode};

/// Callback that turns a reference text into the referenced node, installed
/// by the surrounding grammar context (see [`crate::ast::install_resolvers`]).
pub type Resolver = Rc<dyn Fn(&str) -> Option<DynNode>>;

/// A deferred cross-reference to a node of type `T`.
///
/// Parsing only records the reference *text*; resolution happens lazily on
/// the first [`get`](Reference::get), through the installed resolver, and the
/// outcome is published exactly once — later calls read the cache and never
/// re-invoke the resolver, even when resolution failed.
pub struct Reference<T: AstNode> {
    text: String,
    resolver: RefCell<Option<Resolver>>,
    cache: OnceCell<Option<DynNode>>,
    _marker: PhantomData<T>,
}

impl<T: AstNode> Default for Reference<T> {
    fn default() -> Self {
        Reference::new(String::new())
    }
}

impl<T: AstNode> Reference<T> {
    pub fn new(text: impl Into<String>) -> Reference<T> {
        Reference {
            text: text.into(),
            resolver: RefCell::new(None),
            cache: OnceCell::new(),
            _marker: PhantomData,
        }
    }

    /// The reference text as matched from the input.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Whether resolution has been attempted (successfully or not).
    pub fn is_resolved(&self) -> bool {
        self.cache.get().is_some()
    }

    /// Resolve the reference. Returns `None` when no resolver is installed,
    /// when the resolver finds nothing, or when the found node is not a `T`.
    pub fn get(&self) -> Option<AstPtr<T>> {
        let cached = self.cache.get_or_init(|| {
            let resolver = self.resolver.borrow();
            debug_assert!(
                resolver.is_some(),
                "resolver must be installed before resolving a reference"
            );
            resolver.as_ref().and_then(|r| r(&self.text))
        });
        cached.clone().and_then(AstPtr::from_dyn)
    }

    pub(crate) fn set_resolver(&self, resolver: Resolver) {
        *self.resolver.borrow_mut() = Some(resolver);
    }
}

impl<T: AstNode> fmt::Debug for Reference<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reference")
            .field("text", &self.text)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

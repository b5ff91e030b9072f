//! The combinator surface: [`Expr`] values composed with `+` (sequence),
//! `|` (ordered choice), `&` (unordered group) and `!` (not-predicate), plus
//! the free-function combinators. Expressions are plain trees; they are
//! interned into the element arena when a rule is defined.

use std::ops::{Add, BitAnd, BitOr, Not};

use super::feature::Feature;
use super::{AssignOp, ElemId, NodeFactory};
use crate::ast::AstNode;
use crate::text::CharClass;

/// A grammar expression under construction.
#[derive(Clone)]
pub struct Expr {
    pub(crate) node: ExprNode,
}

#[derive(Clone)]
pub(crate) enum ExprNode {
    Literal {
        text: String,
        fold: bool,
    },
    Class(CharClass),
    Any,
    Group(Vec<ExprNode>),
    Choice(Vec<ExprNode>),
    Unordered(Vec<ExprNode>),
    Repeat {
        min: u32,
        max: u32,
        inner: Box<ExprNode>,
    },
    Ahead(Box<ExprNode>),
    Not(Box<ExprNode>),
    Call(ElemId),
    Assign {
        op: AssignOp,
        feature: Feature,
        inner: Box<ExprNode>,
    },
    Action {
        construct: NodeFactory,
        feature: Option<Feature>,
        type_name: &'static str,
    },
    CrossRef {
        target: &'static str,
        inner: Box<ExprNode>,
    },
}

impl Expr {
    fn new(node: ExprNode) -> Expr {
        Expr { node }
    }

    /// Case-insensitive variant of a literal or character class.
    pub fn i(self) -> Expr {
        match self.node {
            ExprNode::Literal { text, .. } => Expr::new(ExprNode::Literal { text, fold: true }),
            ExprNode::Class(class) => Expr::new(ExprNode::Class(class.fold_case())),
            node => {
                debug_assert!(false, ".i() applies to literals and character classes");
                Expr::new(node)
            }
        }
    }
}

/// A keyword / punctuation literal. Word-final literals respect keyword
/// boundaries when matching.
pub fn kw(text: &str) -> Expr {
    debug_assert!(!text.is_empty(), "empty literal");
    Expr::new(ExprNode::Literal {
        text: text.to_string(),
        fold: false,
    })
}

/// A case-insensitive literal.
pub fn ikw(text: &str) -> Expr {
    kw(text).i()
}

/// A character class compiled from a range DSL like `"a-zA-Z0-9_"`; a
/// leading `^` negates (ASCII only).
pub fn cr(spec: &str) -> Expr {
    Expr::new(ExprNode::Class(CharClass::compile(spec)))
}

/// Any single UTF-8 codepoint, the regex `.`.
pub fn dot() -> Expr {
    Expr::new(ExprNode::Any)
}

/// End of input.
pub fn eof() -> Expr {
    not(dot())
}

/// End of line: `\r\n`, `\n` or `\r`.
pub fn eol() -> Expr {
    kw("\r\n") | kw("\n") | kw("\r")
}

/// A whitespace character, the regex `\s`.
pub fn s() -> Expr {
    cr(" \t\r\n\x0b\x0c")
}

/// A word character, the regex `\w`.
pub fn w() -> Expr {
    cr("a-zA-Z0-9_")
}

/// A digit, the regex `\d`.
pub fn d() -> Expr {
    cr("0-9")
}

/// Zero or one occurrence.
pub fn option(element: impl Into<Expr>) -> Expr {
    rep(element, 0, 1)
}

/// Zero or more occurrences.
pub fn many(element: impl Into<Expr>) -> Expr {
    rep(element, 0, u32::MAX)
}

/// One or more occurrences.
pub fn some(element: impl Into<Expr>) -> Expr {
    rep(element, 1, u32::MAX)
}

/// Between `min` and `max` occurrences; `u32::MAX` means unbounded.
pub fn rep(element: impl Into<Expr>, min: u32, max: u32) -> Expr {
    debug_assert!(min <= max);
    Expr::new(ExprNode::Repeat {
        min,
        max,
        inner: Box::new(element.into().node),
    })
}

/// One or more `element`, separated by `separator`:
/// `element (separator element)*`.
pub fn some_sep(element: impl Into<Expr>, separator: impl Into<Expr>) -> Expr {
    let element = element.into();
    element.clone() + many(separator.into() + element)
}

/// Zero or more `element`, separated by `separator`.
pub fn many_sep(element: impl Into<Expr>, separator: impl Into<Expr>) -> Expr {
    option(some_sep(element, separator))
}

/// Zero-width positive lookahead.
pub fn ahead(element: impl Into<Expr>) -> Expr {
    Expr::new(ExprNode::Ahead(Box::new(element.into().node)))
}

/// Zero-width negative lookahead.
pub fn not(element: impl Into<Expr>) -> Expr {
    Expr::new(ExprNode::Not(Box::new(element.into().node)))
}

/// Scan from `from` until `to`, consuming everything in between:
/// `from (!to .)* to`. The classic use is block comments,
/// `scan_until(kw("/*"), kw("*/"))`.
pub fn scan_until(from: impl Into<Expr>, to: impl Into<Expr>) -> Expr {
    let to = to.into();
    from.into() + many(not(to.clone()) + dot()) + to
}

/// Bind `inner`'s value to a feature, replacing the previous value. Usually
/// written through the [`assign!`](crate::assign) macro.
pub fn assign(feature: Feature, inner: impl Into<Expr>) -> Expr {
    Expr::new(ExprNode::Assign {
        op: AssignOp::Assign,
        feature,
        inner: Box::new(inner.into().node),
    })
}

/// Bind `inner`'s value to a list feature, appending.
pub fn append(feature: Feature, inner: impl Into<Expr>) -> Expr {
    Expr::new(ExprNode::Assign {
        op: AssignOp::Append,
        feature,
        inner: Box::new(inner.into().node),
    })
}

/// Set a boolean feature to `true` when `inner` matched.
pub fn enable_if(feature: Feature, inner: impl Into<Expr>) -> Expr {
    Expr::new(ExprNode::Assign {
        op: AssignOp::EnableIf,
        feature,
        inner: Box::new(inner.into().node),
    })
}

/// Match `inner` as the text of a deferred cross-reference to a node of type
/// `T`; the enclosing assignment stores it into a `Reference<T>` feature.
pub fn xref<T: AstNode>(inner: impl Into<Expr>) -> Expr {
    Expr::new(ExprNode::CrossRef {
        target: std::any::type_name::<T>(),
        inner: Box::new(inner.into().node),
    })
}

/// `new T()`: discard the current AST value and start a fresh `T`.
pub fn action_new<T: AstNode + Default>() -> Expr {
    Expr::new(ExprNode::Action {
        construct: std::sync::Arc::new(|| {
            std::rc::Rc::new(std::cell::RefCell::new(T::default())) as crate::ast::DynNode
        }),
        feature: None,
        type_name: std::any::type_name::<T>(),
    })
}

/// `new T(feature = current)`: start a fresh `T` and store the previous
/// current value into one of its features. Usually written through the
/// [`action!`](crate::action) macro.
pub fn action_init<T, S, A>(feature_name: &'static str, access: A) -> Expr
where
    T: AstNode + Default,
    S: super::FeatureStorage,
    A: Fn(&mut T) -> &mut S + Copy + Send + Sync + 'static,
{
    Expr::new(ExprNode::Action {
        construct: std::sync::Arc::new(|| {
            std::rc::Rc::new(std::cell::RefCell::new(T::default())) as crate::ast::DynNode
        }),
        feature: Some(Feature::of(feature_name, access)),
        type_name: std::any::type_name::<T>(),
    })
}

impl<R: Into<Expr>> Add<R> for Expr {
    type Output = Expr;

    /// Sequencing. Adjacent groups flatten into one tuple, so `a + b + c`
    /// and `a + (b + c)` build the same element.
    fn add(self, rhs: R) -> Expr {
        let rhs = rhs.into();
        let mut items = match self.node {
            ExprNode::Group(items) => items,
            node => vec![node],
        };
        match rhs.node {
            ExprNode::Group(rhs_items) => items.extend(rhs_items),
            node => items.push(node),
        }
        Expr::new(ExprNode::Group(items))
    }
}

impl<R: Into<Expr>> BitOr<R> for Expr {
    type Output = Expr;

    /// Ordered choice; flattens like `+`.
    fn bitor(self, rhs: R) -> Expr {
        let rhs = rhs.into();
        let mut items = match self.node {
            ExprNode::Choice(items) => items,
            node => vec![node],
        };
        match rhs.node {
            ExprNode::Choice(rhs_items) => items.extend(rhs_items),
            node => items.push(node),
        }
        Expr::new(ExprNode::Choice(items))
    }
}

impl<R: Into<Expr>> BitAnd<R> for Expr {
    type Output = Expr;

    /// Unordered group; flattens like `+`.
    fn bitand(self, rhs: R) -> Expr {
        let rhs = rhs.into();
        let mut items = match self.node {
            ExprNode::Unordered(items) => items,
            node => vec![node],
        };
        match rhs.node {
            ExprNode::Unordered(rhs_items) => items.extend(rhs_items),
            node => items.push(node),
        }
        Expr::new(ExprNode::Unordered(items))
    }
}

impl Not for Expr {
    type Output = Expr;

    fn not(self) -> Expr {
        not(self)
    }
}

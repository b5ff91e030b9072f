//! Feature slots: the runtime reflection layer that lets assignments and
//! actions write into typed AST fields through an erased interface.
//!
//! A [`Feature`] pairs a field name with an accessor `fn(&mut T) -> &mut S`.
//! The *storage shape* `S` decides what an assignment means via the
//! [`FeatureStorage`] trait — one implementation per shape (scalar, option,
//! list, owned child node, reference), mirroring how each shape behaves:
//! scalars replace, lists push, node shapes re-parent the child, reference
//! shapes record the text and register a resolver slot on the node.

use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use crate::ast::{AstNode, AstPtr, DataValue, DynNode, Reference, Resolver, Value};
use crate::ast::RefSlot;
use crate::error::ValueError;

use super::AssignOp;

/// The value an assignment delivers to a feature slot.
#[derive(Debug, Clone)]
pub enum FeatureValue {
    /// A converted scalar (from terminal/data-type rules or raw tokens).
    Data(Value),
    /// A materialized AST child (from a parser rule).
    Node(DynNode),
    /// The sub-element matched; used by `?=`.
    Flag,
}

impl FeatureValue {
    fn kind_name(&self) -> &'static str {
        match self {
            FeatureValue::Data(v) => v.kind_name(),
            FeatureValue::Node(_) => "node",
            FeatureValue::Flag => "flag",
        }
    }
}

/// Follow-up work the caller must do after a storage write.
pub enum Attach {
    None,
    /// A child node was stored: re-parent it under the assignment target.
    Child(DynNode),
    /// A reference was stored (at `index` for list shapes): register a
    /// resolver slot on the target.
    Reference(Option<usize>),
}

/// How a storage shape reacts to the three assignment operators.
///
/// Implemented for every supported field shape; user-defined value types
/// (e.g. a JSON value enum) can implement it to become assignable.
pub trait FeatureStorage: 'static {
    fn assign_value(
        &mut self,
        feature: &'static str,
        value: FeatureValue,
    ) -> Result<Attach, ValueError>;

    fn append_value(
        &mut self,
        feature: &'static str,
        value: FeatureValue,
    ) -> Result<Attach, ValueError> {
        let _ = value;
        Err(ValueError::Mismatch {
            feature,
            op: "append",
            got: "non-list storage",
        })
    }

    fn enable(&mut self, feature: &'static str) -> Result<Attach, ValueError> {
        Err(ValueError::Mismatch {
            feature,
            op: "enable",
            got: "non-bool storage",
        })
    }

    /// Install a resolver into the reference stored here (list shapes get
    /// the element index). Non-reference shapes ignore this.
    fn install_resolver(&mut self, index: Option<usize>, resolver: &Resolver) {
        let _ = (index, resolver);
    }
}

type ApplyFn =
    dyn Fn(&mut dyn AstNode, AssignOp, FeatureValue) -> Result<Attach, ValueError> + Send + Sync;
type InstallerFn = dyn Fn(Option<usize>) -> RefSlot + Send + Sync;

/// An erased handle to one feature of one AST node type.
#[derive(Clone)]
pub struct Feature {
    name: &'static str,
    apply: Arc<ApplyFn>,
    installer: Arc<InstallerFn>,
}

impl Feature {
    /// Build a feature slot from a field accessor. `assign!`/`append!` and
    /// friends expand to this.
    pub fn of<T, S, A>(name: &'static str, access: A) -> Feature
    where
        T: AstNode,
        S: FeatureStorage,
        A: Fn(&mut T) -> &mut S + Copy + Send + Sync + 'static,
    {
        let apply = Arc::new(
            move |node: &mut dyn AstNode, op: AssignOp, value: FeatureValue| {
                let got = node.type_name();
                let Some(target) = node.as_any_mut().downcast_mut::<T>() else {
                    return Err(ValueError::WrongTargetType {
                        expected: std::any::type_name::<T>(),
                        got,
                    });
                };
                let slot = access(target);
                match op {
                    AssignOp::Assign => slot.assign_value(name, value),
                    AssignOp::Append => slot.append_value(name, value),
                    AssignOp::EnableIf => slot.enable(name),
                }
            },
        );
        let installer = Arc::new(move |index: Option<usize>| RefSlot {
            install: Box::new(move |node: &mut dyn AstNode, resolver: &Resolver| {
                if let Some(target) = node.as_any_mut().downcast_mut::<T>() {
                    access(target).install_resolver(index, resolver);
                }
            }),
        });
        Feature {
            name,
            apply,
            installer,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Write `value` into `target`'s slot and perform the attach follow-up:
    /// container back-link plus content-list bookkeeping for children (the
    /// child is first removed from its previous container, if any), resolver
    /// slot registration for references.
    pub(crate) fn apply_to(
        &self,
        target: &DynNode,
        op: AssignOp,
        value: FeatureValue,
    ) -> Result<(), ValueError> {
        let attach = {
            let mut node = target.borrow_mut();
            (self.apply)(&mut *node, op, value)?
        };
        match attach {
            Attach::None => {}
            Attach::Child(child) => {
                let previous = child.borrow().base().container();
                if let Some(previous) = previous {
                    previous.borrow_mut().base_mut().remove_content(&child);
                }
                child
                    .borrow_mut()
                    .base_mut()
                    .set_container(Rc::downgrade(target));
                target.borrow_mut().base_mut().push_content(child);
            }
            Attach::Reference(index) => {
                let slot = (self.installer)(index);
                target.borrow_mut().base_mut().push_reference(slot);
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Feature({})", self.name)
    }
}

// ---- scalar shapes ----------------------------------------------------

macro_rules! scalar_storage {
    ($($ty:ty),+ $(,)?) => {$(
        impl FeatureStorage for $ty {
            fn assign_value(
                &mut self,
                feature: &'static str,
                value: FeatureValue,
            ) -> Result<Attach, ValueError> {
                match &value {
                    FeatureValue::Data(data) => match <$ty as DataValue>::from_value(data) {
                        Some(converted) => {
                            *self = converted;
                            Ok(Attach::None)
                        }
                        None => Err(ValueError::Mismatch {
                            feature,
                            op: "assign",
                            got: data.kind_name(),
                        }),
                    },
                    other => Err(ValueError::Mismatch {
                        feature,
                        op: "assign",
                        got: other.kind_name(),
                    }),
                }
            }
        }

        impl FeatureStorage for Option<$ty> {
            fn assign_value(
                &mut self,
                feature: &'static str,
                value: FeatureValue,
            ) -> Result<Attach, ValueError> {
                let mut slot = <$ty as Default>::default();
                slot.assign_value(feature, value)?;
                *self = Some(slot);
                Ok(Attach::None)
            }
        }

        impl FeatureStorage for Vec<$ty> {
            fn assign_value(
                &mut self,
                feature: &'static str,
                value: FeatureValue,
            ) -> Result<Attach, ValueError> {
                // `=` on a list feature appends, like the original helpers
                self.append_value(feature, value)
            }

            fn append_value(
                &mut self,
                feature: &'static str,
                value: FeatureValue,
            ) -> Result<Attach, ValueError> {
                let mut slot = <$ty as Default>::default();
                slot.assign_value(feature, value)?;
                self.push(slot);
                Ok(Attach::None)
            }
        }
    )+};
}

scalar_storage!(String, i8, i16, i32, i64, u8, u16, u32, u64, f32, f64, Value);

// `char` has no Default; only the bare shape is supported.
impl FeatureStorage for char {
    fn assign_value(
        &mut self,
        feature: &'static str,
        value: FeatureValue,
    ) -> Result<Attach, ValueError> {
        match &value {
            FeatureValue::Data(data) => match char::from_value(data) {
                Some(c) => {
                    *self = c;
                    Ok(Attach::None)
                }
                None => Err(ValueError::Mismatch {
                    feature,
                    op: "assign",
                    got: data.kind_name(),
                }),
            },
            other => Err(ValueError::Mismatch {
                feature,
                op: "assign",
                got: other.kind_name(),
            }),
        }
    }
}

impl FeatureStorage for bool {
    fn assign_value(
        &mut self,
        feature: &'static str,
        value: FeatureValue,
    ) -> Result<Attach, ValueError> {
        match &value {
            FeatureValue::Data(Value::Bool(b)) => {
                *self = *b;
                Ok(Attach::None)
            }
            FeatureValue::Flag => self.enable(feature),
            other => Err(ValueError::Mismatch {
                feature,
                op: "assign",
                got: other.kind_name(),
            }),
        }
    }

    fn enable(&mut self, _feature: &'static str) -> Result<Attach, ValueError> {
        *self = true;
        Ok(Attach::None)
    }
}

// ---- owned child shapes -----------------------------------------------

fn expect_node(feature: &'static str, value: FeatureValue) -> Result<DynNode, ValueError> {
    match value {
        FeatureValue::Node(node) => Ok(node),
        other => Err(ValueError::Mismatch {
            feature,
            op: "assign",
            got: other.kind_name(),
        }),
    }
}

impl FeatureStorage for DynNode {
    fn assign_value(
        &mut self,
        feature: &'static str,
        value: FeatureValue,
    ) -> Result<Attach, ValueError> {
        let node = expect_node(feature, value)?;
        *self = Rc::clone(&node);
        Ok(Attach::Child(node))
    }
}

impl FeatureStorage for Option<DynNode> {
    fn assign_value(
        &mut self,
        feature: &'static str,
        value: FeatureValue,
    ) -> Result<Attach, ValueError> {
        let node = expect_node(feature, value)?;
        *self = Some(Rc::clone(&node));
        Ok(Attach::Child(node))
    }
}

impl FeatureStorage for Vec<DynNode> {
    fn assign_value(
        &mut self,
        feature: &'static str,
        value: FeatureValue,
    ) -> Result<Attach, ValueError> {
        self.append_value(feature, value)
    }

    fn append_value(
        &mut self,
        feature: &'static str,
        value: FeatureValue,
    ) -> Result<Attach, ValueError> {
        let node = expect_node(feature, value)?;
        self.push(Rc::clone(&node));
        Ok(Attach::Child(node))
    }
}

fn typed_node<C: AstNode>(
    feature: &'static str,
    value: FeatureValue,
) -> Result<(AstPtr<C>, DynNode), ValueError> {
    let node = expect_node(feature, value)?;
    let got = node.borrow().type_name();
    match AstPtr::from_dyn(Rc::clone(&node)) {
        Some(ptr) => Ok((ptr, node)),
        None => Err(ValueError::WrongNodeType {
            feature,
            expected: std::any::type_name::<C>(),
            got,
        }),
    }
}

impl<C: AstNode> FeatureStorage for AstPtr<C> {
    fn assign_value(
        &mut self,
        feature: &'static str,
        value: FeatureValue,
    ) -> Result<Attach, ValueError> {
        let (ptr, node) = typed_node::<C>(feature, value)?;
        *self = ptr;
        Ok(Attach::Child(node))
    }
}

impl<C: AstNode> FeatureStorage for Option<AstPtr<C>> {
    fn assign_value(
        &mut self,
        feature: &'static str,
        value: FeatureValue,
    ) -> Result<Attach, ValueError> {
        let (ptr, node) = typed_node::<C>(feature, value)?;
        *self = Some(ptr);
        Ok(Attach::Child(node))
    }
}

impl<C: AstNode> FeatureStorage for Vec<AstPtr<C>> {
    fn assign_value(
        &mut self,
        feature: &'static str,
        value: FeatureValue,
    ) -> Result<Attach, ValueError> {
        self.append_value(feature, value)
    }

    fn append_value(
        &mut self,
        feature: &'static str,
        value: FeatureValue,
    ) -> Result<Attach, ValueError> {
        let (ptr, node) = typed_node::<C>(feature, value)?;
        self.push(ptr);
        Ok(Attach::Child(node))
    }
}

// ---- reference shapes -------------------------------------------------

fn expect_text(feature: &'static str, value: FeatureValue) -> Result<String, ValueError> {
    match value {
        FeatureValue::Data(Value::Str(text)) => Ok(text),
        other => Err(ValueError::Mismatch {
            feature,
            op: "assign",
            got: other.kind_name(),
        }),
    }
}

impl<C: AstNode> FeatureStorage for Reference<C> {
    fn assign_value(
        &mut self,
        feature: &'static str,
        value: FeatureValue,
    ) -> Result<Attach, ValueError> {
        *self = Reference::new(expect_text(feature, value)?);
        Ok(Attach::Reference(None))
    }

    fn install_resolver(&mut self, _index: Option<usize>, resolver: &Resolver) {
        self.set_resolver(Rc::clone(resolver));
    }
}

impl<C: AstNode> FeatureStorage for Vec<Reference<C>> {
    fn assign_value(
        &mut self,
        feature: &'static str,
        value: FeatureValue,
    ) -> Result<Attach, ValueError> {
        self.append_value(feature, value)
    }

    fn append_value(
        &mut self,
        feature: &'static str,
        value: FeatureValue,
    ) -> Result<Attach, ValueError> {
        self.push(Reference::new(expect_text(feature, value)?));
        Ok(Attach::Reference(Some(self.len() - 1)))
    }

    fn install_resolver(&mut self, index: Option<usize>, resolver: &Resolver) {
        if let Some(reference) = index.and_then(|i| self.get_mut(i)) {
            reference.set_resolver(Rc::clone(resolver));
        }
    }
}

/// Bind an expression's value to a field: `assign!(Module::name, id_rule)`.
#[macro_export]
macro_rules! assign {
    ($owner:ident :: $field:ident, $inner:expr) => {
        $crate::grammar::assign(
            $crate::grammar::Feature::of(stringify!($field), |node: &mut $owner| {
                &mut node.$field
            }),
            $inner,
        )
    };
}

/// Append an expression's value to a list field.
#[macro_export]
macro_rules! append {
    ($owner:ident :: $field:ident, $inner:expr) => {
        $crate::grammar::append(
            $crate::grammar::Feature::of(stringify!($field), |node: &mut $owner| {
                &mut node.$field
            }),
            $inner,
        )
    };
}

/// Set a boolean field to `true` when the expression matched.
#[macro_export]
macro_rules! enable_if {
    ($owner:ident :: $field:ident, $inner:expr) => {
        $crate::grammar::enable_if(
            $crate::grammar::Feature::of(stringify!($field), |node: &mut $owner| {
                &mut node.$field
            }),
            $inner,
        )
    };
}

/// Action marker: `action!(NumberLiteral)` starts a fresh node discarding
/// the current one; `action!(BinaryExpression::left)` starts a fresh node
/// and stores the previous current value into the named feature.
#[macro_export]
macro_rules! action {
    ($owner:ident :: $field:ident) => {
        $crate::grammar::action_init(stringify!($field), |node: &mut $owner| &mut node.$field)
    };
    ($ty:ty) => {
        $crate::grammar::action_new::<$ty>()
    };
}

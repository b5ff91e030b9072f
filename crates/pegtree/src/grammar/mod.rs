//! The grammar element model: an append-only arena of tagged variants,
//! composed once through the [`Expr`] DSL and then frozen into an immutable,
//! shareable [`Grammar`].
//!
//! Elements reference their children by [`ElemId`], which is also what CST
//! nodes record as their producing element. Rules live in the same arena as
//! ordinary elements; a rule *call* in an expression lowers to the callee's
//! id, so recursion between rules is just an id cycle.

mod expr;
mod feature;

pub use expr::{
    action_init, action_new, ahead, append, assign, cr, d, dot, enable_if, eof, eol, ikw, kw,
    many, many_sep, not, option, rep, s, scan_until, some, some_sep, w, xref, Expr,
};
pub(crate) use expr::ExprNode;
pub use feature::{Attach, Feature, FeatureStorage, FeatureValue};

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::ast::{AstNode, Converter, DataValue, DynNode};
use crate::rules::{DataTypeRule, ParserRule, TerminalRule};
use crate::text::{ascii_lower, escape_char, is_word, CharClass};

/// Identifier of a grammar element inside its [`Grammar`] arena.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElemId(pub(crate) u32);

impl ElemId {
    /// Sentinel for "no element" (only seen on still-open CST nodes).
    pub const NONE: ElemId = ElemId(u32::MAX);

    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for ElemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == ElemId::NONE {
            write!(f, "ElemId(none)")
        } else {
            write!(f, "ElemId({})", self.0)
        }
    }
}

/// Assignment operator of an [`GrammarElement::Assignment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    /// `=` — replace the feature value.
    Assign,
    /// `+=` — push into a list feature.
    Append,
    /// `?=` — set a boolean feature when the sub-element matched.
    EnableIf,
}

impl AssignOp {
    fn symbol(self) -> &'static str {
        match self {
            AssignOp::Assign => "=",
            AssignOp::Append => "+=",
            AssignOp::EnableIf => "?=",
        }
    }
}

/// A compile-time literal with optional ASCII case folding.
///
/// Case-insensitive literals store their folded form; input bytes are folded
/// before comparison.
#[derive(Debug, Clone)]
pub(crate) struct Literal {
    pub(crate) text: Box<str>,
    pub(crate) case_sensitive: bool,
}

/// Outcome of matching a literal at a fixed position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LitMatch {
    /// Matched; payload is the end offset.
    Hit(usize),
    /// Mismatch; payload is the first differing offset (for error reporting).
    Miss(usize),
    /// Bytes matched but a word character follows a word-final literal;
    /// payload is the boundary offset.
    Boundary(usize),
}

impl Literal {
    pub(crate) fn new(text: &str, case_sensitive: bool) -> Literal {
        let text: Box<str> = if case_sensitive {
            text.into()
        } else {
            text.to_ascii_lowercase().into()
        };
        Literal {
            text,
            case_sensitive,
        }
    }

    #[inline]
    fn byte_matches(&self, expected: u8, input: u8) -> bool {
        if self.case_sensitive {
            expected == input
        } else {
            expected == ascii_lower(input)
        }
    }

    pub(crate) fn last_is_word(&self) -> bool {
        self.text.as_bytes().last().copied().is_some_and(is_word)
    }

    /// Match the literal at `at`, enforcing the keyword boundary: a literal
    /// ending in a word character must not be followed by another word
    /// character, so that `class` does not accept `classy` as a prefix.
    pub(crate) fn match_at(&self, text: &str, at: usize) -> LitMatch {
        let input = text.as_bytes();
        let lit = self.text.as_bytes();
        if at + lit.len() > input.len() {
            return LitMatch::Miss(input.len());
        }
        for (i, &expected) in lit.iter().enumerate() {
            if !self.byte_matches(expected, input[at + i]) {
                return LitMatch::Miss(at + i);
            }
        }
        let end = at + lit.len();
        if self.last_is_word() && end < input.len() && is_word(input[end]) {
            return LitMatch::Boundary(end);
        }
        LitMatch::Hit(end)
    }

    /// Zero-width insertion is only offered for punctuation-like literals;
    /// word-final keywords are never conjured out of thin air.
    pub(crate) fn insertable(&self) -> bool {
        !self.text.is_empty() && !self.last_is_word()
    }

    /// Typo repair applies to keyword-shaped literals only.
    pub(crate) fn typo_replaceable(&self) -> bool {
        self.text.len() >= 2 && self.text.bytes().all(is_word)
    }

    /// End offset of a one-edit typo of this literal at `at`: a single
    /// substitution or adjacent transposition, one missing character, or one
    /// extra character.
    pub(crate) fn typo_replace_end(&self, text: &str, at: usize) -> Option<usize> {
        if self.can_replace_same_length(text, at) {
            return Some(at + self.text.len());
        }
        if self.can_replace_one_missing(text, at) {
            return Some(at + self.text.len() - 1);
        }
        if self.can_replace_one_extra(text, at) {
            return Some(at + self.text.len() + 1);
        }
        None
    }

    fn can_replace_same_length(&self, text: &str, at: usize) -> bool {
        let input = text.as_bytes();
        let lit = self.text.as_bytes();
        if lit.is_empty() || at + lit.len() > input.len() {
            return false;
        }
        let mut mismatches = 0usize;
        let mut first = 0usize;
        let mut second = 0usize;
        for (i, &expected) in lit.iter().enumerate() {
            if self.byte_matches(expected, input[at + i]) {
                continue;
            }
            match mismatches {
                0 => first = i,
                1 => second = i,
                _ => return false,
            }
            mismatches += 1;
        }
        match mismatches {
            1 => true,
            2 if second == first + 1 => {
                self.byte_matches(lit[first], input[at + second])
                    && self.byte_matches(lit[second], input[at + first])
            }
            _ => false,
        }
    }

    fn can_replace_one_missing(&self, text: &str, at: usize) -> bool {
        let input = text.as_bytes();
        let lit = self.text.as_bytes();
        if lit.len() < 2 {
            return false;
        }
        let expected_len = lit.len() - 1;
        if at + expected_len > input.len() {
            return false;
        }
        let mut li = 0usize;
        let mut ii = 0usize;
        let mut skipped = false;
        while li < lit.len() && ii < expected_len {
            if self.byte_matches(lit[li], input[at + ii]) {
                li += 1;
                ii += 1;
                continue;
            }
            if skipped {
                return false;
            }
            skipped = true;
            li += 1;
        }
        if !skipped {
            // missing the final character
            return li + 1 == lit.len() && ii == expected_len;
        }
        ii == expected_len && (li == lit.len() || li + 1 == lit.len())
    }

    fn can_replace_one_extra(&self, text: &str, at: usize) -> bool {
        let input = text.as_bytes();
        let lit = self.text.as_bytes();
        let expected_len = lit.len() + 1;
        if at + expected_len > input.len() {
            return false;
        }
        let mut li = 0usize;
        let mut ii = 0usize;
        let mut skipped = false;
        while li < lit.len() && ii < expected_len {
            if self.byte_matches(lit[li], input[at + ii]) {
                li += 1;
                ii += 1;
                continue;
            }
            if skipped {
                return false;
            }
            skipped = true;
            ii += 1;
        }
        if !skipped {
            // extra final character
            return li == lit.len() && ii + 1 == expected_len;
        }
        li == lit.len() && (ii == expected_len || ii + 1 == expected_len)
    }
}

/// Bounded repetition of a single element. `max == u32::MAX` means unbounded.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Repetition {
    pub(crate) min: u32,
    pub(crate) max: u32,
    pub(crate) inner: ElemId,
}

pub(crate) const REP_UNBOUNDED: u32 = u32::MAX;

impl Repetition {
    pub(crate) fn is_optional(&self) -> bool {
        self.min == 0 && self.max == 1
    }
    pub(crate) fn is_star(&self) -> bool {
        self.min == 0 && self.max == REP_UNBOUNDED
    }
    pub(crate) fn is_plus(&self) -> bool {
        self.min == 1 && self.max == REP_UNBOUNDED
    }
    pub(crate) fn is_fixed(&self) -> bool {
        self.min == self.max && self.min > 0
    }
}

/// Feature assignment wrapping a sub-element.
#[derive(Clone)]
pub(crate) struct Assignment {
    pub(crate) op: AssignOp,
    pub(crate) feature: Feature,
    pub(crate) inner: ElemId,
}

/// Factory producing a fresh AST node; the closure captures no state so the
/// grammar stays `Send + Sync` even though the nodes it creates are not.
pub(crate) type NodeFactory = std::sync::Arc<dyn Fn() -> DynNode + Send + Sync>;

/// `new T()` / `new T(feature = current)` action marker.
#[derive(Clone)]
pub(crate) struct ActionDef {
    pub(crate) construct: NodeFactory,
    /// `None` for a New action; for Init, the feature of the fresh node that
    /// receives the previous current value.
    pub(crate) feature: Option<Feature>,
    pub(crate) type_name: &'static str,
}

/// Cross-reference: matches `inner` as text and stores it into a
/// `Reference<T>` feature; resolution is deferred.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CrossReference {
    pub(crate) target: &'static str,
    pub(crate) inner: ElemId,
}

/// What a named rule is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    /// Matches in terminal mode, produces one leaf.
    Terminal,
    /// Matches in rule mode, value is converted text.
    DataType,
    /// Matches in rule mode, value is a materialized AST node.
    Parser,
}

pub(crate) struct RuleData {
    pub(crate) name: Box<str>,
    pub(crate) kind: RuleKind,
    pub(crate) body: Option<ElemId>,
    pub(crate) converter: Option<Converter>,
    pub(crate) factory: Option<NodeFactory>,
    pub(crate) type_name: &'static str,
}

/// One arena slot. Dispatch on the tag is a plain `match`, keeping the hot
/// path free of virtual calls.
pub(crate) enum GrammarElement {
    Literal(Literal),
    CharacterRange(CharClass),
    AnyCharacter,
    Group(Vec<ElemId>),
    OrderedChoice(Vec<ElemId>),
    UnorderedGroup(Vec<ElemId>),
    Repetition(Repetition),
    AndPredicate(ElemId),
    NotPredicate(ElemId),
    Assignment(Assignment),
    Action(ActionDef),
    CrossReference(CrossReference),
    Rule(RuleData),
}

/// A frozen, immutable grammar. Cheap to clone and safe to share across
/// threads for concurrent parses of different inputs.
#[derive(Clone)]
pub struct Grammar {
    elements: triomphe::Arc<Vec<GrammarElement>>,
}

impl Grammar {
    #[inline]
    pub(crate) fn element(&self, id: ElemId) -> &GrammarElement {
        &self.elements[id.0 as usize]
    }

    pub(crate) fn rule_data(&self, id: ElemId) -> &RuleData {
        match self.element(id) {
            GrammarElement::Rule(rule) => rule,
            _ => panic!("element {id:?} is not a rule"),
        }
    }

    /// The name of the rule behind `id`, if it is one.
    pub fn rule_name(&self, id: ElemId) -> Option<&str> {
        match self.element(id) {
            GrammarElement::Rule(rule) => Some(&rule.name),
            _ => None,
        }
    }

    /// Short tag for one element, used by the CST Debug dump.
    pub fn label(&self, id: ElemId) -> String {
        if id == ElemId::NONE {
            return "?".to_string();
        }
        match self.element(id) {
            GrammarElement::Literal(lit) => {
                let mut out = String::from("'");
                for c in lit.text.chars() {
                    out.push_str(&escape_char(c));
                }
                out.push('\'');
                if !lit.case_sensitive {
                    out.push('i');
                }
                out
            }
            GrammarElement::CharacterRange(class) => class.display(),
            GrammarElement::AnyCharacter => ".".to_string(),
            GrammarElement::Group(_) => "group".to_string(),
            GrammarElement::OrderedChoice(_) => "choice".to_string(),
            GrammarElement::UnorderedGroup(_) => "unordered".to_string(),
            GrammarElement::Repetition(_) => "repeat".to_string(),
            GrammarElement::AndPredicate(_) => "&pred".to_string(),
            GrammarElement::NotPredicate(_) => "!pred".to_string(),
            GrammarElement::Assignment(a) => format!("{}{}", a.feature.name(), a.op.symbol()),
            GrammarElement::Action(a) => match &a.feature {
                Some(f) => format!("new {}({}=current)", a.type_name, f.name()),
                None => format!("new {}", a.type_name),
            },
            GrammarElement::CrossReference(x) => format!("[{}]", x.target),
            GrammarElement::Rule(r) => r.name.to_string(),
        }
    }

    /// Full recursive rendering of one element, in the grammar notation the
    /// DSL uses (`('a' [0-9]+ | Rule)` style).
    pub fn display_element(&self, id: ElemId) -> String {
        match self.element(id) {
            GrammarElement::Literal(_)
            | GrammarElement::CharacterRange(_)
            | GrammarElement::AnyCharacter
            | GrammarElement::Rule(_) => self.label(id),
            GrammarElement::Group(items) => self.display_list(items, " "),
            GrammarElement::OrderedChoice(items) => self.display_list(items, " | "),
            GrammarElement::UnorderedGroup(items) => self.display_list(items, " & "),
            GrammarElement::Repetition(rep) => {
                let inner = self.display_element(rep.inner);
                if rep.is_optional() {
                    format!("{inner}?")
                } else if rep.is_star() {
                    format!("{inner}*")
                } else if rep.is_plus() {
                    format!("{inner}+")
                } else if rep.is_fixed() {
                    format!("{inner}{{{}}}", rep.min)
                } else if rep.max == REP_UNBOUNDED {
                    format!("{inner}{{{},}}", rep.min)
                } else {
                    format!("{inner}{{{},{}}}", rep.min, rep.max)
                }
            }
            GrammarElement::AndPredicate(inner) => format!("&{}", self.display_element(*inner)),
            GrammarElement::NotPredicate(inner) => format!("!{}", self.display_element(*inner)),
            GrammarElement::Assignment(a) => format!(
                "{}{}{}",
                a.feature.name(),
                a.op.symbol(),
                self.display_element(a.inner)
            ),
            GrammarElement::Action(_) => self.label(id),
            GrammarElement::CrossReference(x) => {
                format!("[{}|{}]", x.target, self.display_element(x.inner))
            }
        }
    }

    fn display_list(&self, items: &[ElemId], sep: &str) -> String {
        let mut out = String::from("(");
        for (i, &item) in items.iter().enumerate() {
            if i > 0 {
                out.push_str(sep);
            }
            out.push_str(&self.display_element(item));
        }
        out.push(')');
        out
    }
}

/// Builds a [`Grammar`]: declares rules, lowers [`Expr`] trees into the
/// element arena, and freezes the result.
pub struct GrammarBuilder {
    elements: Vec<GrammarElement>,
}

impl Default for GrammarBuilder {
    fn default() -> Self {
        GrammarBuilder::new()
    }
}

impl GrammarBuilder {
    pub fn new() -> GrammarBuilder {
        GrammarBuilder {
            elements: Vec::new(),
        }
    }

    fn push(&mut self, element: GrammarElement) -> ElemId {
        assert!(
            self.elements.len() < u32::MAX as usize,
            "grammar element arena overflow"
        );
        let id = ElemId(self.elements.len() as u32);
        self.elements.push(element);
        id
    }

    /// Declare a terminal rule producing `T`. Define its body with
    /// [`define`](GrammarBuilder::define).
    pub fn terminal<T: DataValue>(&mut self, name: &str) -> TerminalRule<T> {
        let id = self.push(GrammarElement::Rule(RuleData {
            name: name.into(),
            kind: RuleKind::Terminal,
            body: None,
            converter: T::default_converter(),
            factory: None,
            type_name: std::any::type_name::<T>(),
        }));
        TerminalRule::new(id)
    }

    /// Declare a data-type rule producing `T`.
    pub fn data_type<T: DataValue>(&mut self, name: &str) -> DataTypeRule<T> {
        let id = self.push(GrammarElement::Rule(RuleData {
            name: name.into(),
            kind: RuleKind::DataType,
            body: None,
            converter: None,
            factory: None,
            type_name: std::any::type_name::<T>(),
        }));
        DataTypeRule::new(id)
    }

    /// Declare a parser rule producing AST nodes of type `T`.
    pub fn parser<T: AstNode + Default>(&mut self, name: &str) -> ParserRule<T> {
        let id = self.push(GrammarElement::Rule(RuleData {
            name: name.into(),
            kind: RuleKind::Parser,
            body: None,
            converter: None,
            factory: Some(std::sync::Arc::new(|| {
                Rc::new(RefCell::new(T::default())) as DynNode
            })),
            type_name: std::any::type_name::<T>(),
        }));
        ParserRule::new(id)
    }

    /// Set (or replace) the body of a declared rule.
    pub fn define(&mut self, rule: impl Into<ElemId>, body: impl Into<Expr>) {
        let rule_id = rule.into();
        let body_id = self.lower(body.into().node);
        match &mut self.elements[rule_id.0 as usize] {
            GrammarElement::Rule(data) => data.body = Some(body_id),
            _ => panic!("define target is not a rule"),
        }
    }

    /// Install a text converter on a terminal rule.
    pub fn set_converter<T: DataValue>(
        &mut self,
        rule: &TerminalRule<T>,
        convert: impl Fn(&str) -> Result<T, crate::ValueError> + Send + Sync + 'static,
    ) {
        self.set_rule_converter(rule.elem(), convert);
    }

    /// Install a converter on a data-type rule; it receives the concatenated
    /// visible text of the rule's subtree.
    pub fn set_value_converter<T: DataValue>(
        &mut self,
        rule: &DataTypeRule<T>,
        convert: impl Fn(&str) -> Result<T, crate::ValueError> + Send + Sync + 'static,
    ) {
        self.set_rule_converter(rule.elem(), convert);
    }

    fn set_rule_converter<T: DataValue>(
        &mut self,
        rule: ElemId,
        convert: impl Fn(&str) -> Result<T, crate::ValueError> + Send + Sync + 'static,
    ) {
        match &mut self.elements[rule.0 as usize] {
            GrammarElement::Rule(data) => {
                data.converter =
                    Some(std::sync::Arc::new(move |text| {
                        convert(text).map(T::into_value)
                    }));
            }
            _ => panic!("converter target is not a rule"),
        }
    }

    /// Freeze into an immutable, shareable grammar.
    pub fn finish(self) -> Grammar {
        Grammar {
            elements: triomphe::Arc::new(self.elements),
        }
    }

    fn lower(&mut self, node: ExprNode) -> ElemId {
        match node {
            ExprNode::Literal { text, fold } => {
                self.push(GrammarElement::Literal(Literal::new(&text, !fold)))
            }
            ExprNode::Class(class) => self.push(GrammarElement::CharacterRange(class)),
            ExprNode::Any => self.push(GrammarElement::AnyCharacter),
            ExprNode::Group(items) => {
                let ids = items.into_iter().map(|e| self.lower(e)).collect();
                self.push(GrammarElement::Group(ids))
            }
            ExprNode::Choice(items) => {
                let ids = items.into_iter().map(|e| self.lower(e)).collect();
                self.push(GrammarElement::OrderedChoice(ids))
            }
            ExprNode::Unordered(items) => {
                let ids = items.into_iter().map(|e| self.lower(e)).collect();
                self.push(GrammarElement::UnorderedGroup(ids))
            }
            ExprNode::Repeat { min, max, inner } => {
                let inner = self.lower(*inner);
                self.push(GrammarElement::Repetition(Repetition { min, max, inner }))
            }
            ExprNode::Ahead(inner) => {
                let inner = self.lower(*inner);
                self.push(GrammarElement::AndPredicate(inner))
            }
            ExprNode::Not(inner) => {
                let inner = self.lower(*inner);
                self.push(GrammarElement::NotPredicate(inner))
            }
            ExprNode::Call(id) => id,
            ExprNode::Assign { op, feature, inner } => {
                let inner = self.lower(*inner);
                self.push(GrammarElement::Assignment(Assignment { op, feature, inner }))
            }
            ExprNode::Action {
                construct,
                feature,
                type_name,
            } => self.push(GrammarElement::Action(ActionDef {
                construct,
                feature,
                type_name,
            })),
            ExprNode::CrossRef { target, inner } => {
                let inner = self.lower(*inner);
                self.push(GrammarElement::CrossReference(CrossReference { target, inner }))
            }
        }
    }
}

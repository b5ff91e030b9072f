//! Typed rule handles and the parse entry points: terminal rules (terminal
//! mode, one leaf), data-type rules (rule mode, converted text) and parser
//! rules (rule mode, materialized AST, with error recovery).

use std::marker::PhantomData;

use tracing::debug;

use crate::ast::{AstNode, AstPtr, DataValue, DynNode, Value};
use crate::cst::{CstBuilder, CstNodeView, RootCstNode};
use crate::error::ValueError;
use crate::grammar::{
    Assignment, AssignOp, ElemId, FeatureValue, Grammar, GrammarElement, RuleKind,
};
use crate::parser::{
    recover, rule, search, terminal, GenericParseResult, ParseOptions, ParseResult, ParseState,
    RecoverState, Skipper,
};

macro_rules! rule_handle {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        pub struct $name<T> {
            id: ElemId,
            _marker: PhantomData<fn() -> T>,
        }

        impl<T> Clone for $name<T> {
            fn clone(&self) -> Self {
                *self
            }
        }

        impl<T> Copy for $name<T> {}

        impl<T> $name<T> {
            pub(crate) fn new(id: ElemId) -> Self {
                $name {
                    id,
                    _marker: PhantomData,
                }
            }

            /// The rule's element id in its grammar.
            pub fn elem(&self) -> ElemId {
                self.id
            }
        }

        impl<T> From<$name<T>> for ElemId {
            fn from(rule: $name<T>) -> ElemId {
                rule.id
            }
        }

        impl<T> From<$name<T>> for crate::grammar::Expr {
            fn from(rule: $name<T>) -> crate::grammar::Expr {
                crate::grammar::Expr {
                    node: crate::grammar::ExprNode::Call(rule.id),
                }
            }
        }

        impl<T, R: Into<crate::grammar::Expr>> std::ops::Add<R> for $name<T> {
            type Output = crate::grammar::Expr;
            fn add(self, rhs: R) -> crate::grammar::Expr {
                crate::grammar::Expr::from(self) + rhs
            }
        }

        impl<T, R: Into<crate::grammar::Expr>> std::ops::BitOr<R> for $name<T> {
            type Output = crate::grammar::Expr;
            fn bitor(self, rhs: R) -> crate::grammar::Expr {
                crate::grammar::Expr::from(self) | rhs
            }
        }

        impl<T, R: Into<crate::grammar::Expr>> std::ops::BitAnd<R> for $name<T> {
            type Output = crate::grammar::Expr;
            fn bitand(self, rhs: R) -> crate::grammar::Expr {
                crate::grammar::Expr::from(self) & rhs
            }
        }

        impl<T> std::ops::Not for $name<T> {
            type Output = crate::grammar::Expr;
            fn not(self) -> crate::grammar::Expr {
                !crate::grammar::Expr::from(self)
            }
        }

        impl<T> std::fmt::Debug for $name<T> {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!(stringify!($name), "({:?})"), self.id)
            }
        }
    };
}

rule_handle! {
    /// Handle to a terminal rule: matches in terminal mode (no internal
    /// skipping) and produces a single leaf converted to `T`.
    TerminalRule
}

rule_handle! {
    /// Handle to a data-type rule: matches in rule mode and produces a `T`
    /// converted from the subtree's visible text.
    DataTypeRule
}

rule_handle! {
    /// Handle to a parser rule: matches in rule mode and materializes an AST
    /// node of type `T`.
    ParserRule
}

impl<T: DataValue> TerminalRule<T> {
    /// Match the rule against the complete input, terminal mode only. No
    /// skipper and no recovery apply.
    pub fn parse(&self, grammar: &Grammar, input: &str) -> ParseResult<T> {
        let rule_data = grammar.rule_data(self.id);
        debug_assert_eq!(rule_data.kind, RuleKind::Terminal);
        let body = rule_data
            .body
            .unwrap_or_else(|| panic!("rule `{}` has no definition", rule_data.name));

        let mut builder = CstBuilder::new(input, grammar.clone());
        let m = terminal::match_element(grammar, body, input, 0);
        let mut value = None;
        if m.valid {
            builder.leaf(0, m.end as u32, self.id, false, false);
            value = self.value_of(grammar, &input[..m.end]).ok();
        }
        ParseResult {
            ret: m.valid && m.end == input.len(),
            recovered: false,
            len: m.end,
            root_node: builder.finalize(),
            value,
            diagnostics: Vec::new(),
        }
    }

    /// Convert a matched text slice through the rule's converter.
    pub fn value_of(&self, grammar: &Grammar, text: &str) -> Result<T, ValueError> {
        let rule_data = grammar.rule_data(self.id);
        let converter = rule_data
            .converter
            .as_ref()
            .ok_or_else(|| ValueError::MissingConverter {
                rule: rule_data.name.to_string(),
            })?;
        let value = converter(text)?;
        T::from_value(&value).ok_or(ValueError::InvalidLiteral {
            expected: rule_data.type_name,
            text: text.to_string(),
        })
    }
}

impl<T: DataValue> DataTypeRule<T> {
    /// Parse the complete input in rule mode (strict phase only, no
    /// recovery) and convert the matched subtree.
    pub fn parse(&self, grammar: &Grammar, input: &str, skipper: &Skipper) -> ParseResult<T> {
        let rule_data = grammar.rule_data(self.id);
        debug_assert_eq!(rule_data.kind, RuleKind::DataType);

        let mut builder = CstBuilder::new(input, grammar.clone());
        let (matched, len) = {
            let mut state = ParseState::new(grammar, skipper, &mut builder);
            state.skip_hidden();
            let matched = rule::match_rule(&mut state, self.id);
            let len = if matched {
                state.cursor()
            } else {
                state.max_cursor()
            };
            (matched, len)
        };
        let ret = matched && len == input.len();
        let root = builder.finalize();

        let mut value = None;
        if ret {
            if let Some(node) = search::find_first_root_matching(&root, self.id)
                .or_else(|| search::find_first_matching(&root, self.id))
            {
                value = rule_scalar_value(grammar, self.id, root.view(node))
                    .ok()
                    .and_then(|v| T::from_value(&v));
            }
        }
        ParseResult {
            ret,
            recovered: false,
            len,
            root_node: root,
            value,
            diagnostics: Vec::new(),
        }
    }

    /// Convert the concatenated visible text through the rule's converter.
    pub fn value_of(&self, grammar: &Grammar, view: CstNodeView<'_>) -> Result<T, ValueError> {
        let rule_data = grammar.rule_data(self.id);
        let value = rule_scalar_value(grammar, self.id, view)?;
        T::from_value(&value).ok_or_else(|| ValueError::MissingConverter {
            rule: rule_data.name.to_string(),
        })
    }
}

impl<T: AstNode + Default> ParserRule<T> {
    /// Parse the complete input: strict phase first, then the recovery loop
    /// of the options, then materialization of the typed value.
    pub fn parse(&self, grammar: &Grammar, input: &str, skipper: &Skipper) -> ParseResult<AstPtr<T>> {
        self.parse_with(grammar, input, skipper, ParseOptions::default())
    }

    pub fn parse_with(
        &self,
        grammar: &Grammar,
        input: &str,
        skipper: &Skipper,
        options: ParseOptions,
    ) -> ParseResult<AstPtr<T>> {
        let (core, node) = parse_parser_rule(grammar, self.id, input, skipper, &options);
        let value = node.map(|node| {
            AstPtr::from_dyn(node).unwrap_or_else(|| {
                panic!(
                    "rule `{}` materialized a node that is not a {}",
                    grammar.rule_data(self.id).name,
                    std::any::type_name::<T>(),
                )
            })
        });
        ParseResult {
            ret: core.ret,
            recovered: core.recovered,
            len: core.len,
            root_node: core.root_node,
            value,
            diagnostics: core.diagnostics,
        }
    }

    /// Parse, returning the materialized node without the typed downcast.
    /// Useful for rules whose alternatives produce different node types.
    pub fn parse_dyn(
        &self,
        grammar: &Grammar,
        input: &str,
        skipper: &Skipper,
    ) -> ParseResult<DynNode> {
        let (core, node) = parse_parser_rule(grammar, self.id, input, skipper, &ParseOptions::default());
        ParseResult {
            ret: core.ret,
            recovered: core.recovered,
            len: core.len,
            root_node: core.root_node,
            value: node,
            diagnostics: core.diagnostics,
        }
    }

    /// Parse without the typed value, for callers that only need the CST.
    pub fn parse_generic(
        &self,
        grammar: &Grammar,
        input: &str,
        skipper: &Skipper,
    ) -> GenericParseResult {
        let (core, _) = parse_parser_rule(grammar, self.id, input, skipper, &ParseOptions::default());
        ParseResult {
            ret: core.ret,
            recovered: core.recovered,
            len: core.len,
            root_node: core.root_node,
            value: None,
            diagnostics: core.diagnostics,
        }
    }

    /// Materialize the typed value from a CST node this rule produced.
    pub fn value_of(&self, grammar: &Grammar, view: CstNodeView<'_>) -> Option<AstPtr<T>> {
        AstPtr::from_dyn(materialize(grammar, self.id, view))
    }
}

struct CoreResult {
    ret: bool,
    recovered: bool,
    len: usize,
    root_node: triomphe::Arc<RootCstNode>,
    diagnostics: Vec<crate::parser::Diagnostic>,
}

struct AttemptOutcome {
    ret: bool,
    len: usize,
    recovered: bool,
    max_offset: usize,
    diagnostics: Vec<crate::parser::Diagnostic>,
}

fn parse_parser_rule(
    grammar: &Grammar,
    rule_elem: ElemId,
    input: &str,
    skipper: &Skipper,
    options: &ParseOptions,
) -> (CoreResult, Option<DynNode>) {
    debug_assert_eq!(grammar.rule_data(rule_elem).kind, RuleKind::Parser);
    let input_len = input.len();
    let mut builder = CstBuilder::new(input, grammar.clone());

    let (mut ret, mut len, mut max_offset) = {
        let mut state = ParseState::new(grammar, skipper, &mut builder);
        state.skip_hidden();
        let matched = rule::match_rule(&mut state, rule_elem);
        // on failure the cursor is rewound; the furthest successful prefix
        // is what maxCursor tracked
        let len = if matched {
            state.cursor()
        } else {
            state.max_cursor()
        };
        (matched && len == input_len, len, state.max_cursor())
    };

    let mut recovered = false;
    let mut diagnostics = Vec::new();

    if !ret {
        if options.local_recovery_window_bytes != 0 {
            // strict replay, then a local edit window past the furthest
            // strict match, then the whole remaining input
            let anchor = max_offset;
            let window_end = input_len.min(anchor + options.local_recovery_window_bytes as usize);
            let plan = [
                (true, 0usize, input_len),
                (false, anchor, window_end),
                (false, anchor, input_len),
            ];
            for (strict, floor, ceiling) in plan {
                let outcome = run_recovery_attempt(
                    grammar, rule_elem, skipper, &mut builder, options, strict, floor, ceiling,
                );
                ret = outcome.ret;
                len = outcome.len;
                recovered = outcome.recovered;
                diagnostics = outcome.diagnostics;
                if ret {
                    break;
                }
            }
        } else {
            // expanding-window mode: anchor the edit floor at the furthest
            // match and retry while attempts keep reaching further
            loop {
                let outcome = run_recovery_attempt(
                    grammar, rule_elem, skipper, &mut builder, options, false, max_offset,
                    input_len,
                );
                ret = outcome.ret;
                len = outcome.len;
                recovered = outcome.recovered;
                diagnostics = outcome.diagnostics;
                if ret || outcome.max_offset <= max_offset {
                    break;
                }
                max_offset = outcome.max_offset;
            }
        }
    }

    let root = builder.finalize();
    let mut node = None;
    if ret {
        let found = search::find_first_root_matching(&root, rule_elem)
            .or_else(|| search::find_first_matching(&root, rule_elem))
            .expect("matched parser-rule node not found in the CST");
        node = Some(materialize(grammar, rule_elem, root.view(found)));
    }
    (
        CoreResult {
            ret,
            recovered,
            len,
            root_node: root,
            diagnostics,
        },
        node,
    )
}

#[allow(clippy::too_many_arguments)]
fn run_recovery_attempt(
    grammar: &Grammar,
    rule_elem: ElemId,
    skipper: &Skipper,
    builder: &mut CstBuilder,
    options: &ParseOptions,
    strict: bool,
    floor: usize,
    ceiling: usize,
) -> AttemptOutcome {
    builder.reset();
    let input_len = builder.text().len();
    let mut state = RecoverState::new(grammar, skipper, builder);
    state.edit_floor = floor;
    state.edit_ceiling = ceiling;
    state.max_consecutive_deletes = options.max_consecutive_codepoint_deletes;
    if strict {
        state.allow_insert = false;
        state.allow_delete = false;
        state.track_edit_state = false;
    }
    state.skip_hidden();
    let matched = recover::recover(&mut state, rule_elem);
    let len = if matched {
        state.cursor()
    } else {
        state.max_cursor()
    };
    let outcome = AttemptOutcome {
        ret: matched && len == input_len,
        len,
        recovered: state.had_edits,
        max_offset: state.max_cursor(),
        diagnostics: std::mem::take(&mut state.diagnostics),
    };
    debug!(
        rule = grammar.rule_name(rule_elem).unwrap_or("?"),
        strict,
        floor,
        ceiling,
        matched,
        len = outcome.len,
        edits = outcome.diagnostics.len(),
        "recovery attempt"
    );
    outcome
}

// ---- materialization ---------------------------------------------------

/// Build the typed value of a parser rule from its CST subtree: walk the
/// visible children in order, maintaining the `current` node and a queue of
/// pending assignments; actions replace or wrap `current` mid-walk.
pub(crate) fn materialize(grammar: &Grammar, rule_elem: ElemId, view: CstNodeView<'_>) -> DynNode {
    let rule_data = grammar.rule_data(rule_elem);
    let factory = rule_data
        .factory
        .as_ref()
        .expect("parser rules carry a node factory");

    let mut current: Option<DynNode> = None;
    let mut pending: Vec<(ElemId, CstNodeView<'_>)> = Vec::new();

    for child in view.children() {
        if child.is_hidden() {
            continue;
        }
        match grammar.element(child.elem()) {
            GrammarElement::Assignment(_) => pending.push((child.elem(), child)),
            GrammarElement::Action(action) => match &action.feature {
                None => {
                    // a fresh node replaces the context: what was assigned
                    // so far belonged to the discarded one
                    current = Some((action.construct)());
                    pending.clear();
                }
                Some(feature) => {
                    let previous = current.take().unwrap_or_else(|| factory());
                    flush_pending(grammar, &previous, &mut pending);
                    let fresh = (action.construct)();
                    if let Err(error) =
                        feature.apply_to(&fresh, AssignOp::Assign, FeatureValue::Node(previous))
                    {
                        panic!("init action on `{}`: {error}", rule_data.name);
                    }
                    current = Some(fresh);
                }
            },
            GrammarElement::Rule(child_rule) if child_rule.kind == RuleKind::Parser => {
                current = Some(materialize(grammar, child.elem(), child));
            }
            _ => {}
        }
    }

    let current = current.unwrap_or_else(|| factory());
    flush_pending(grammar, &current, &mut pending);
    current
}

fn flush_pending(
    grammar: &Grammar,
    target: &DynNode,
    pending: &mut Vec<(ElemId, CstNodeView<'_>)>,
) {
    for (elem, node) in pending.drain(..) {
        let GrammarElement::Assignment(assignment) = grammar.element(elem) else {
            unreachable!("pending queue only holds assignments");
        };
        match assigned_value(grammar, assignment, node) {
            Ok(value) => {
                if let Err(error) = assignment.feature.apply_to(target, assignment.op, value) {
                    if error.is_conversion() {
                        debug!(feature = assignment.feature.name(), %error, "assignment skipped");
                    } else {
                        panic!("assignment to `{}`: {error}", assignment.feature.name());
                    }
                }
            }
            Err(error) if error.is_conversion() => {
                debug!(feature = assignment.feature.name(), %error, "assignment value skipped");
            }
            Err(error) => panic!("assignment to `{}`: {error}", assignment.feature.name()),
        }
    }
}

fn assigned_value(
    grammar: &Grammar,
    assignment: &Assignment,
    view: CstNodeView<'_>,
) -> Result<FeatureValue, ValueError> {
    if assignment.op == AssignOp::EnableIf {
        return Ok(FeatureValue::Flag);
    }
    value_from(grammar, assignment.inner, view)
}

/// The value produced by `src` for the CST node `view` (which `src` matched
/// before the enclosing assignment re-tagged it).
fn value_from(
    grammar: &Grammar,
    src: ElemId,
    view: CstNodeView<'_>,
) -> Result<FeatureValue, ValueError> {
    match grammar.element(src) {
        GrammarElement::Rule(rule_data) => match rule_data.kind {
            RuleKind::Parser => Ok(FeatureValue::Node(materialize(grammar, src, view))),
            RuleKind::Terminal | RuleKind::DataType => {
                Ok(FeatureValue::Data(rule_scalar_value(grammar, src, view)?))
            }
        },
        GrammarElement::OrderedChoice(_) => {
            // wrapper node: the winning alternative's node is the first
            // visible child
            match search::first_visible_child(view) {
                Some(child) => value_from(grammar, child.elem(), child),
                None => Ok(FeatureValue::Data(Value::Str(view.text().to_string()))),
            }
        }
        GrammarElement::Literal(lit) => {
            // a recovered (typo-replaced) keyword reads as its canonical text
            let text = if view.is_recovered() {
                lit.text.to_string()
            } else {
                view.text().to_string()
            };
            Ok(FeatureValue::Data(Value::Str(text)))
        }
        GrammarElement::CrossReference(xref) => value_from(grammar, xref.inner, view),
        _ => Ok(FeatureValue::Data(Value::Str(view.text().to_string()))),
    }
}

/// The scalar value of a terminal or data-type rule for one CST node.
pub(crate) fn rule_scalar_value(
    grammar: &Grammar,
    rule_elem: ElemId,
    view: CstNodeView<'_>,
) -> Result<Value, ValueError> {
    let rule_data = grammar.rule_data(rule_elem);
    match rule_data.kind {
        RuleKind::Terminal => {
            let converter =
                rule_data
                    .converter
                    .as_ref()
                    .ok_or_else(|| ValueError::MissingConverter {
                        rule: rule_data.name.to_string(),
                    })?;
            converter(view.text())
        }
        RuleKind::DataType => {
            let text = concat_visible(grammar, view);
            match &rule_data.converter {
                Some(converter) => converter(&text),
                None => Ok(Value::Str(text)),
            }
        }
        // a parser rule in scalar position falls back to its raw text
        RuleKind::Parser => Ok(Value::Str(view.text().to_string())),
    }
}

/// Concatenate the visible textual content of a subtree, preferring nested
/// rule values over raw text.
fn concat_visible(grammar: &Grammar, view: CstNodeView<'_>) -> String {
    let mut out = String::new();
    for child in view.visible_children() {
        match grammar.element(child.elem()) {
            GrammarElement::Rule(_) => match rule_scalar_value(grammar, child.elem(), child) {
                Ok(value) => out.push_str(&value.to_text()),
                Err(_) => out.push_str(child.text()),
            },
            GrammarElement::Literal(lit) if child.is_recovered() => out.push_str(&lit.text),
            _ => out.push_str(child.text()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::AstNodeBase;
    use crate::grammar::{cr, kw, many, option, s, some, w, GrammarBuilder};
    use crate::parser::SkipperBuilder;
    use crate::{action, append, assign, enable_if, impl_ast_node};
    use pretty_assertions::assert_eq;

    #[derive(Debug, Default)]
    struct Unit {
        base: AstNodeBase,
        name: String,
        labels: Vec<String>,
        sealed: bool,
        body: Option<AstPtr<Unit>>,
    }

    impl_ast_node!(Unit);

    fn ident(g: &mut GrammarBuilder) -> TerminalRule<String> {
        let id = g.terminal::<String>("ID");
        g.define(id, cr("a-zA-Z_") + many(w()));
        id
    }

    fn ws_skipper(g: &mut GrammarBuilder) -> Skipper {
        let ws = g.terminal::<String>("WS");
        g.define(ws, some(s()));
        SkipperBuilder::new().ignore(ws).build()
    }

    #[test]
    fn terminal_rule_parse_and_convert() {
        let mut g = GrammarBuilder::new();
        let number = g.terminal::<i64>("NUMBER");
        g.define(number, some(cr("0-9")));
        let grammar = g.finish();

        let result = number.parse(&grammar, "1234");
        assert!(result.ret);
        assert!(!result.recovered);
        assert_eq!(result.len, 4);
        assert_eq!(result.value, Some(1234));

        let partial = number.parse(&grammar, "12x");
        assert!(!partial.ret);
        assert_eq!(partial.len, 2);
        assert_eq!(partial.value, Some(12));
    }

    #[test]
    fn terminal_rule_without_converter_errors() {
        let mut g = GrammarBuilder::new();
        let one = g.terminal::<char>("ONE");
        g.define(one, cr("a-z"));
        let grammar = g.finish();

        let err = one.value_of(&grammar, "a").unwrap_err();
        assert!(matches!(err, ValueError::MissingConverter { .. }));

        let mut g = GrammarBuilder::new();
        let one = g.terminal::<char>("ONE");
        g.define(one, cr("a-z"));
        g.set_converter(&one, |text| {
            text.chars().next().ok_or(ValueError::InvalidLiteral {
                expected: "char",
                text: String::new(),
            })
        });
        let grammar = g.finish();
        assert_eq!(one.value_of(&grammar, "a").unwrap(), 'a');
    }

    #[test]
    fn data_type_rule_concatenates_visible_text() {
        let mut g = GrammarBuilder::new();
        let id = ident(&mut g);
        let skipper = ws_skipper(&mut g);
        let qualified = g.data_type::<String>("QualifiedName");
        g.define(qualified, id + many(kw(".") + id));
        let grammar = g.finish();

        let result = qualified.parse(&grammar, "a . b .c", &skipper);
        assert!(result.ret);
        assert_eq!(result.value.as_deref(), Some("a.b.c"));
    }

    #[test]
    fn parser_rule_assignments_build_the_node() {
        let mut g = GrammarBuilder::new();
        let id = ident(&mut g);
        let skipper = ws_skipper(&mut g);
        let unit = g.parser::<Unit>("Unit");
        g.define(
            unit,
            kw("unit")
                + assign!(Unit::name, id)
                + many(append!(Unit::labels, id))
                + option(enable_if!(Unit::sealed, kw("!"))),
        );
        let grammar = g.finish();

        let result = unit.parse(&grammar, "unit engine fast loud !", &skipper);
        assert!(result.ret, "diagnostics: {:?}", result.diagnostics);
        let value = result.value.unwrap();
        assert_eq!(value.borrow().name, "engine");
        assert_eq!(value.borrow().labels, vec!["fast", "loud"]);
        assert!(value.borrow().sealed);

        let plain = unit.parse(&grammar, "unit engine", &skipper);
        assert!(plain.ret);
        assert!(!plain.value.unwrap().borrow().sealed);
    }

    #[test]
    fn nested_parser_rule_sets_container_back_link() {
        let mut g = GrammarBuilder::new();
        let id = ident(&mut g);
        let skipper = ws_skipper(&mut g);
        let unit = g.parser::<Unit>("Unit");
        let inner = g.parser::<Unit>("Inner");
        g.define(inner, kw("{") + assign!(Unit::name, id) + kw("}"));
        g.define(unit, kw("unit") + assign!(Unit::name, id) + assign!(Unit::body, inner));
        let grammar = g.finish();

        let result = unit.parse(&grammar, "unit outer { core }", &skipper);
        assert!(result.ret);
        let outer = result.value.unwrap();
        let body = outer.borrow().body.clone().unwrap();
        assert_eq!(body.borrow().name, "core");

        let container = body.container().unwrap();
        assert!(std::rc::Rc::ptr_eq(&container, outer.as_dyn()));
        assert_eq!(outer.borrow().base.content().len(), 1);
    }

    #[test]
    fn new_action_replaces_current_and_drops_pending() {
        let mut g = GrammarBuilder::new();
        let id = ident(&mut g);
        let skipper = ws_skipper(&mut g);
        let unit = g.parser::<Unit>("Unit");
        // the first name is assigned before the action and must be discarded
        g.define(
            unit,
            assign!(Unit::name, id) + action!(Unit) + assign!(Unit::name, id),
        );
        let grammar = g.finish();

        let result = unit.parse(&grammar, "old new", &skipper);
        assert!(result.ret);
        assert_eq!(result.value.unwrap().borrow().name, "new");
    }

    #[test]
    fn init_action_wraps_previous_current() {
        let mut g = GrammarBuilder::new();
        let id = ident(&mut g);
        let skipper = ws_skipper(&mut g);
        let unit = g.parser::<Unit>("Unit");
        g.define(
            unit,
            assign!(Unit::name, id) + many(action!(Unit::body) + assign!(Unit::name, id)),
        );
        let grammar = g.finish();

        let result = unit.parse(&grammar, "a b c", &skipper);
        assert!(result.ret);
        let top = result.value.unwrap();
        assert_eq!(top.borrow().name, "c");
        let mid = top.borrow().body.clone().unwrap();
        assert_eq!(mid.borrow().name, "b");
        let leaf = mid.borrow().body.clone().unwrap();
        assert_eq!(leaf.borrow().name, "a");
        assert!(leaf.borrow().body.is_none());

        let container = mid.container().unwrap();
        assert!(std::rc::Rc::ptr_eq(&container, top.as_dyn()));
    }

    #[test]
    fn parse_is_deterministic() {
        let mut g = GrammarBuilder::new();
        let id = ident(&mut g);
        let skipper = ws_skipper(&mut g);
        let unit = g.parser::<Unit>("Unit");
        g.define(unit, kw("unit") + assign!(Unit::name, id));
        let grammar = g.finish();

        let first = unit.parse(&grammar, "unit a", &skipper);
        let second = unit.parse(&grammar, "unit a", &skipper);
        assert_eq!(first.ret, second.ret);
        assert_eq!(first.len, second.len);
        assert_eq!(
            format!("{:?}", first.root_node),
            format!("{:?}", second.root_node)
        );
        assert_eq!(
            first.value.unwrap().borrow().name,
            second.value.unwrap().borrow().name
        );
    }

    #[test]
    fn failed_alternatives_leave_no_trace_in_the_cst() {
        let mut g = GrammarBuilder::new();
        let id = ident(&mut g);
        let skipper = ws_skipper(&mut g);
        let unit = g.parser::<Unit>("Unit");
        // first alternative consumes "unit" and an id before failing on "!"
        g.define(
            unit,
            kw("unit") + assign!(Unit::name, id) + kw("!")
                | kw("unit") + assign!(Unit::labels, id),
        );
        let grammar = g.finish();

        let result = unit.parse(&grammar, "unit a", &skipper);
        assert!(result.ret);
        let value = result.value.unwrap();
        assert_eq!(value.borrow().name, "");
        assert_eq!(value.borrow().labels, vec!["a"]);

        // exactly one "unit" leaf and one id leaf under the rule node
        let root = result.root_node;
        let rule_node = root.children().next().unwrap();
        let leaves: Vec<&str> = rule_node
            .children()
            .filter(|c| !c.is_hidden())
            .map(|c| c.text())
            .collect();
        assert_eq!(leaves, vec!["unit", "a"]);
    }

    #[test]
    fn cst_debug_dump() {
        let mut g = GrammarBuilder::new();
        let letters = g.terminal::<String>("A");
        g.define(letters, some(cr("a-z")));
        let word = g.data_type::<String>("Word");
        g.define(word, crate::grammar::Expr::from(letters));
        let grammar = g.finish();

        let result = word.parse(&grammar, "hi", &Skipper::none());
        assert!(result.ret);
        assert_eq!(
            format!("{:?}", result.root_node),
            "Word@0..2\n  A@0..2 \"hi\"\n"
        );
    }

    #[test]
    fn concurrent_parses_share_one_grammar() {
        let mut g = GrammarBuilder::new();
        let word = g.data_type::<String>("Word");
        g.define(word, some(cr("a-z")));
        let grammar = g.finish();

        std::thread::scope(|scope| {
            for input in ["abc", "defg"] {
                let grammar = &grammar;
                scope.spawn(move || {
                    let result = word.parse(grammar, input, &Skipper::none());
                    assert!(result.ret);
                    assert_eq!(result.value.as_deref(), Some(input));
                });
            }
        });
    }

    #[test]
    fn nullable_repetition_terminates() {
        let mut g = GrammarBuilder::new();
        let word = g.data_type::<String>("Word");
        // option() matches the empty string, so the outer loop must detect
        // non-consuming iterations
        g.define(word, many(option(kw("a"))));
        let grammar = g.finish();

        let result = word.parse(&grammar, "aab", &Skipper::none());
        assert!(!result.ret);
        assert_eq!(result.len, 2);
    }

    #[test]
    fn case_insensitive_literal_matches_any_casing() {
        let mut g = GrammarBuilder::new();
        let word = g.data_type::<String>("Word");
        g.define(word, crate::grammar::ikw("abc"));
        let grammar = g.finish();

        for input in ["abc", "ABC", "aBc"] {
            assert!(word.parse(&grammar, input, &Skipper::none()).ret, "{input}");
        }
        assert!(!word.parse(&grammar, "abd", &Skipper::none()).ret);
    }

    #[test]
    fn terminal_and_rule_mode_agree_on_plain_elements() {
        let mut g = GrammarBuilder::new();
        let word = g.data_type::<String>("Word");
        g.define(word, cr("a-z") + many(cr("a-z0-9")));
        let grammar = g.finish();
        let body = grammar.rule_data(word.elem()).body.unwrap();

        for input in ["a", "abc9", "a1b2", "x"] {
            let m = terminal::match_element(&grammar, body, input, 0);
            let result = word.parse(&grammar, input, &Skipper::none());
            assert_eq!(m.valid && m.end == input.len(), result.ret, "{input}");
            if result.ret {
                assert_eq!(m.end, result.len, "{input}");
            }
        }
    }
}

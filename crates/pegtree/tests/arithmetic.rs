//! An arithmetic language with definitions, function calls and a small
//! interpreter: exercises precedence-climbing via init actions, typed
//! feature assignment and lazy cross-reference resolution.

use std::collections::HashMap;
use std::rc::Rc;

use pegtree::ast::{install_resolvers, AstNodeBase, AstPtr, DynNode, Reference, Resolver};
use pegtree::grammar::{cr, d, kw, many, option, s, scan_until, some, w, xref, Grammar, GrammarBuilder};
use pegtree::{action, append, assign, impl_ast_node};
use pegtree::{ParserRule, Skipper, SkipperBuilder};

#[derive(Debug, Default)]
struct Module {
    base: AstNodeBase,
    name: String,
    statements: Vec<DynNode>,
}

#[derive(Debug, Default)]
struct Definition {
    base: AstNodeBase,
    name: String,
    args: Vec<AstPtr<DeclaredParameter>>,
    expr: Option<DynNode>,
}

#[derive(Debug, Default)]
struct DeclaredParameter {
    base: AstNodeBase,
    name: String,
}

#[derive(Debug, Default)]
struct Evaluation {
    base: AstNodeBase,
    expression: Option<DynNode>,
}

#[derive(Debug, Default)]
struct BinaryExpression {
    base: AstNodeBase,
    left: Option<DynNode>,
    op: String,
    right: Option<DynNode>,
}

#[derive(Debug, Default)]
struct NumberLiteral {
    base: AstNodeBase,
    value: f64,
}

#[derive(Debug, Default)]
struct FunctionCall {
    base: AstNodeBase,
    func: Reference<Definition>,
    args: Vec<DynNode>,
}

/// Marker type for the expression-chain rules; every alternative of those
/// rules materializes a concrete expression node instead.
#[derive(Debug, Default)]
struct Expression {
    base: AstNodeBase,
}

impl_ast_node!(
    Module,
    Definition,
    DeclaredParameter,
    Evaluation,
    BinaryExpression,
    NumberLiteral,
    FunctionCall,
    Expression,
);

struct Arithmetic {
    grammar: Grammar,
    skipper: Skipper,
    module: ParserRule<Module>,
    program: ParserRule<Module>,
    addition: ParserRule<Expression>,
}

fn arithmetic() -> Arithmetic {
    let mut g = GrammarBuilder::new();

    let ws = g.terminal::<String>("WS");
    g.define(ws, some(s()));
    let ml_comment = g.terminal::<String>("ML_COMMENT");
    g.define(ml_comment, scan_until(kw("/*"), kw("*/")));
    let id = g.terminal::<String>("ID");
    g.define(id, cr("a-zA-Z_") + many(w()));
    let number = g.terminal::<f64>("NUMBER");
    g.define(number, some(d()) + option(kw(".") + many(d())));

    let module = g.parser::<Module>("Module");
    let program = g.parser::<Module>("Program");
    let definition = g.parser::<Definition>("Definition");
    let declared_parameter = g.parser::<DeclaredParameter>("DeclaredParameter");
    let evaluation = g.parser::<Evaluation>("Evaluation");
    let addition = g.parser::<Expression>("Addition");
    let multiplication = g.parser::<Expression>("Multiplication");
    let exponentiation = g.parser::<Expression>("Exponentiation");
    let primary = g.parser::<Expression>("PrimaryExpression");

    g.define(
        module,
        kw("module")
            + assign!(Module::name, id)
            + many(append!(Module::statements, definition | evaluation)),
    );
    g.define(
        program,
        some(append!(Module::statements, definition | evaluation)),
    );
    g.define(
        definition,
        kw("def")
            + assign!(Definition::name, id)
            + option(
                kw("(")
                    + append!(Definition::args, declared_parameter)
                    + many(kw(",") + append!(Definition::args, declared_parameter))
                    + kw(")"),
            )
            + kw(":")
            + assign!(Definition::expr, addition)
            + kw(";"),
    );
    g.define(declared_parameter, assign!(DeclaredParameter::name, id));
    g.define(
        evaluation,
        assign!(Evaluation::expression, addition) + kw(";"),
    );
    g.define(
        addition,
        multiplication
            + many(
                action!(BinaryExpression::left)
                    + assign!(BinaryExpression::op, kw("+") | kw("-"))
                    + assign!(BinaryExpression::right, multiplication),
            ),
    );
    g.define(
        multiplication,
        exponentiation
            + many(
                action!(BinaryExpression::left)
                    + assign!(BinaryExpression::op, kw("*") | kw("/"))
                    + assign!(BinaryExpression::right, exponentiation),
            ),
    );
    g.define(
        exponentiation,
        primary
            + many(
                action!(BinaryExpression::left)
                    + assign!(BinaryExpression::op, kw("^"))
                    + assign!(BinaryExpression::right, primary),
            ),
    );
    g.define(
        primary,
        kw("(") + addition + kw(")")
            | action!(NumberLiteral) + assign!(NumberLiteral::value, number)
            | action!(FunctionCall)
                + assign!(FunctionCall::func, xref::<Definition>(id))
                + option(
                    kw("(")
                        + append!(FunctionCall::args, addition)
                        + many(kw(",") + append!(FunctionCall::args, addition))
                        + kw(")"),
                ),
    );

    let skipper = SkipperBuilder::new().ignore(ws).hide(ml_comment).build();
    Arithmetic {
        grammar: g.finish(),
        skipper,
        module,
        program,
        addition,
    }
}

fn apply_op(op: &str, x: f64, y: f64) -> f64 {
    match op {
        "+" => x + y,
        "-" => x - y,
        "*" => x * y,
        "/" => x / y,
        "^" => x.powf(y),
        other => panic!("unknown operator {other}"),
    }
}

fn eval(expr: &DynNode, env: &HashMap<String, f64>) -> f64 {
    let node = expr.borrow();
    if let Some(number) = node.as_any().downcast_ref::<NumberLiteral>() {
        return number.value;
    }
    if let Some(binary) = node.as_any().downcast_ref::<BinaryExpression>() {
        let left = eval(binary.left.as_ref().expect("left operand"), env);
        let right = eval(binary.right.as_ref().expect("right operand"), env);
        return apply_op(&binary.op, left, right);
    }
    if let Some(call) = node.as_any().downcast_ref::<FunctionCall>() {
        if let Some(value) = env.get(call.func.text()) {
            return *value;
        }
        let def = call.func.get().expect("unresolved function reference");
        let mut local = env.clone();
        for (param, arg) in def.borrow().args.iter().zip(&call.args) {
            local.insert(param.borrow().name.clone(), eval(arg, env));
        }
        let body = def.borrow().expr.clone().expect("definition body");
        return eval(&body, &local);
    }
    panic!("unexpected expression node {:?}", node.type_name());
}

fn definition_resolver(module: &AstPtr<Module>) -> Resolver {
    let module = module.clone();
    Rc::new(move |name: &str| {
        let m = module.borrow();
        for statement in &m.statements {
            if let Some(def) = AstPtr::<Definition>::from_dyn(statement.clone()) {
                if def.borrow().name == name {
                    return Some(statement.clone());
                }
            }
        }
        None
    })
}

#[test]
fn expression_evaluates_with_precedence() {
    let a = arithmetic();
    let result = a
        .addition
        .parse_dyn(&a.grammar, "1 + 2 * 3 ^ 2 - 5", &a.skipper);
    assert!(result.ret, "diagnostics: {:?}", result.diagnostics);
    assert!(!result.recovered);
    assert_eq!(result.len, "1 + 2 * 3 ^ 2 - 5".len());

    let value = result.value.unwrap();
    assert_eq!(eval(&value, &HashMap::new()), 14.0);
}

#[test]
fn binary_trees_are_left_associative() {
    let a = arithmetic();
    let result = a.addition.parse_dyn(&a.grammar, "2 + 3 * 4 - 5", &a.skipper);
    assert!(result.ret);

    let top = AstPtr::<BinaryExpression>::from_dyn(result.value.unwrap()).unwrap();
    assert_eq!(top.borrow().op, "-");

    let plus =
        AstPtr::<BinaryExpression>::from_dyn(top.borrow().left.clone().unwrap()).unwrap();
    assert_eq!(plus.borrow().op, "+");

    let mul =
        AstPtr::<BinaryExpression>::from_dyn(plus.borrow().right.clone().unwrap()).unwrap();
    assert_eq!(mul.borrow().op, "*");

    let two = AstPtr::<NumberLiteral>::from_dyn(plus.borrow().left.clone().unwrap()).unwrap();
    assert_eq!(two.borrow().value, 2.0);
    let five = AstPtr::<NumberLiteral>::from_dyn(top.borrow().right.clone().unwrap()).unwrap();
    assert_eq!(five.borrow().value, 5.0);
}

#[test]
fn module_with_definitions_and_comments() {
    let a = arithmetic();
    let input = "\
module demo

def square(x): x * x;
def add(a, b): a + b;

/* call both */
add(1, 2) + square(3);
";
    let result = a.module.parse(&a.grammar, input, &a.skipper);
    assert!(result.ret, "diagnostics: {:?}", result.diagnostics);
    let module = result.value.unwrap();
    assert_eq!(module.borrow().name, "demo");
    assert_eq!(module.borrow().statements.len(), 3);

    let square =
        AstPtr::<Definition>::from_dyn(module.borrow().statements[0].clone()).unwrap();
    assert_eq!(square.borrow().name, "square");
    assert_eq!(square.borrow().args.len(), 1);
    assert_eq!(square.borrow().args[0].borrow().name, "x");

    let evaluation =
        AstPtr::<Evaluation>::from_dyn(module.borrow().statements[2].clone()).unwrap();
    let root = AstPtr::<BinaryExpression>::from_dyn(
        evaluation.borrow().expression.clone().unwrap(),
    )
    .unwrap();
    assert_eq!(root.borrow().op, "+");
}

#[test]
fn function_calls_resolve_and_evaluate() {
    let a = arithmetic();
    let input = "def f(x): x*x; f(3);";
    let result = a.program.parse(&a.grammar, input, &a.skipper);
    assert!(result.ret, "diagnostics: {:?}", result.diagnostics);

    let module = result.value.unwrap();
    let resolver = definition_resolver(&module);
    install_resolvers(module.as_dyn(), &resolver);

    let evaluation =
        AstPtr::<Evaluation>::from_dyn(module.borrow().statements[1].clone()).unwrap();
    let call = AstPtr::<FunctionCall>::from_dyn(
        evaluation.borrow().expression.clone().unwrap(),
    )
    .unwrap();

    // the reference resolves to the declared definition
    let resolved = call.borrow().func.get().expect("reference should resolve");
    assert_eq!(resolved.borrow().name, "f");

    let expr = evaluation.borrow().expression.clone().unwrap();
    assert_eq!(eval(&expr, &HashMap::new()), 9.0);
}

#[test]
fn definitions_and_constants_evaluate() {
    let a = arithmetic();
    let input = "\
def square(x): x * x;
def add(a, b): a + b;
def constant: 10;
add(square(2), constant);
";
    let result = a.program.parse(&a.grammar, input, &a.skipper);
    assert!(result.ret);

    let module = result.value.unwrap();
    let resolver = definition_resolver(&module);
    install_resolvers(module.as_dyn(), &resolver);

    let evaluation =
        AstPtr::<Evaluation>::from_dyn(module.borrow().statements[3].clone()).unwrap();
    let expr = evaluation.borrow().expression.clone().unwrap();
    assert_eq!(eval(&expr, &HashMap::new()), 14.0);
}

#[test]
fn parenthesized_expressions_override_precedence() {
    let a = arithmetic();
    let result = a.addition.parse_dyn(&a.grammar, "(1 + 2) * 3", &a.skipper);
    assert!(result.ret);
    assert_eq!(eval(&result.value.unwrap(), &HashMap::new()), 9.0);
}

#[test]
fn container_links_point_at_the_enclosing_node() {
    let a = arithmetic();
    let result = a.program.parse(&a.grammar, "def f(x): x; 1;", &a.skipper);
    assert!(result.ret);
    let module = result.value.unwrap();

    let def = AstPtr::<Definition>::from_dyn(module.borrow().statements[0].clone()).unwrap();
    let container = def.container().unwrap();
    assert!(Rc::ptr_eq(&container, module.as_dyn()));

    let param = def.borrow().args[0].clone();
    let container = param.container().unwrap();
    assert!(Rc::ptr_eq(&container, def.as_dyn()));
}

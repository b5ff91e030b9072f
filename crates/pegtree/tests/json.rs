//! A JSON grammar with a user-defined value storage enum, exercising choice
//! assignments across scalar and node alternatives.

use pegtree::ast::{AstNodeBase, AstPtr, Value};
use pegtree::grammar::{
    cr, d, kw, many, many_sep, option, s, some, Attach, FeatureStorage, FeatureValue, Grammar,
    GrammarBuilder,
};
use pegtree::{assign, append, impl_ast_node};
use pegtree::{ParserRule, Skipper, SkipperBuilder, ValueError};

#[derive(Debug, Default)]
struct Pair {
    base: AstNodeBase,
    key: String,
    value: Option<AstPtr<JsonValue>>,
}

#[derive(Debug, Default)]
struct JsonObject {
    base: AstNodeBase,
    values: Vec<AstPtr<Pair>>,
}

#[derive(Debug, Default)]
struct JsonArray {
    base: AstNodeBase,
    values: Vec<AstPtr<JsonValue>>,
}

#[derive(Debug, Default)]
struct JsonValue {
    base: AstNodeBase,
    value: JsonVal,
}

impl_ast_node!(Pair, JsonObject, JsonArray, JsonValue);

#[derive(Debug, Default)]
enum JsonVal {
    Str(String),
    Num(f64),
    Bool(bool),
    #[default]
    Null,
    Object(AstPtr<JsonObject>),
    Array(AstPtr<JsonArray>),
}

impl FeatureStorage for JsonVal {
    fn assign_value(
        &mut self,
        feature: &'static str,
        value: FeatureValue,
    ) -> Result<Attach, ValueError> {
        match value {
            FeatureValue::Data(Value::Str(s)) => {
                *self = JsonVal::Str(s);
                Ok(Attach::None)
            }
            FeatureValue::Data(Value::Float(f)) => {
                *self = JsonVal::Num(f.0);
                Ok(Attach::None)
            }
            FeatureValue::Data(Value::Bool(b)) => {
                *self = JsonVal::Bool(b);
                Ok(Attach::None)
            }
            FeatureValue::Data(Value::Null) => {
                *self = JsonVal::Null;
                Ok(Attach::None)
            }
            FeatureValue::Node(node) => {
                if let Some(object) = AstPtr::<JsonObject>::from_dyn(node.clone()) {
                    *self = JsonVal::Object(object);
                    return Ok(Attach::Child(node));
                }
                if let Some(array) = AstPtr::<JsonArray>::from_dyn(node.clone()) {
                    *self = JsonVal::Array(array);
                    return Ok(Attach::Child(node));
                }
                Err(ValueError::WrongNodeType {
                    feature,
                    expected: "JsonObject or JsonArray",
                    got: "other node",
                })
            }
            other => Err(ValueError::Mismatch {
                feature,
                op: "assign",
                got: match other {
                    FeatureValue::Flag => "flag",
                    _ => "value",
                },
            }),
        }
    }
}

struct Json {
    grammar: Grammar,
    skipper: Skipper,
    value: ParserRule<JsonValue>,
}

fn json() -> Json {
    let mut g = GrammarBuilder::new();

    let ws = g.terminal::<String>("WS");
    g.define(ws, some(s()));

    // "(\\. | [^"\])*"
    let string = g.terminal::<String>("STRING");
    g.define(
        string,
        kw("\"") + many(kw("\\") + pegtree::grammar::dot() | cr("^\"\\")) + kw("\""),
    );
    g.set_converter(&string, |text| Ok(text.trim_matches('"').to_string()));

    let number = g.terminal::<f64>("Number");
    g.define(
        number,
        option(kw("-"))
            + (kw("0") | cr("1-9") + many(d()))
            + option(kw(".") + some(d()))
            + option(cr("e").i() + option(cr("-+")) + some(d())),
    );

    let boolean = g.terminal::<bool>("Bool");
    g.define(boolean, kw("true") | kw("false"));

    let null = g.terminal::<Value>("Null");
    g.define(null, kw("null"));
    g.set_converter(&null, |_| Ok(Value::Null));

    let pair = g.parser::<Pair>("Pair");
    let object = g.parser::<JsonObject>("JsonObject");
    let array = g.parser::<JsonArray>("JsonArray");
    let value = g.parser::<JsonValue>("JsonValue");

    g.define(
        pair,
        assign!(Pair::key, string) + kw(":") + assign!(Pair::value, value),
    );
    g.define(
        object,
        kw("{") + many_sep(append!(JsonObject::values, pair), kw(",")) + kw("}"),
    );
    g.define(
        array,
        kw("[") + many_sep(append!(JsonArray::values, value), kw(",")) + kw("]"),
    );
    g.define(
        value,
        assign!(JsonValue::value, string | number | object | array | boolean | null),
    );

    Json {
        grammar: g.finish(),
        skipper: SkipperBuilder::new().ignore(ws).build(),
        value,
    }
}

fn render(value: &JsonVal) -> String {
    match value {
        JsonVal::Str(s) => format!("{s:?}"),
        JsonVal::Num(n) => n.to_string(),
        JsonVal::Bool(b) => b.to_string(),
        JsonVal::Null => "null".to_string(),
        JsonVal::Object(object) => {
            let fields: Vec<String> = object
                .borrow()
                .values
                .iter()
                .map(|pair| {
                    let pair = pair.borrow();
                    let inner = pair
                        .value
                        .as_ref()
                        .map(|v| render(&v.borrow().value))
                        .unwrap_or_default();
                    format!("{}:{}", pair.key, inner)
                })
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        JsonVal::Array(array) => {
            let items: Vec<String> = array
                .borrow()
                .values
                .iter()
                .map(|v| render(&v.borrow().value))
                .collect();
            format!("[{}]", items.join(","))
        }
    }
}

#[test]
fn object_with_mixed_array_round_trips() {
    let j = json();
    let input = r#"{ "a": [true, -1.5e3, null] }"#;
    let result = j.value.parse(&j.grammar, input, &j.skipper);
    assert!(result.ret, "diagnostics: {:?}", result.diagnostics);
    assert!(!result.recovered);

    let value = result.value.unwrap();
    let top = value.borrow();
    let JsonVal::Object(object) = &top.value else {
        panic!("expected an object, got {:?}", top.value);
    };
    let object = object.borrow();
    assert_eq!(object.values.len(), 1);

    let pair = object.values[0].borrow();
    assert_eq!(pair.key, "a");
    let inner = pair.value.as_ref().unwrap().borrow();
    let JsonVal::Array(array) = &inner.value else {
        panic!("expected an array, got {:?}", inner.value);
    };
    let array = array.borrow();
    assert_eq!(array.values.len(), 3);
    assert!(matches!(array.values[0].borrow().value, JsonVal::Bool(true)));
    match array.values[1].borrow().value {
        JsonVal::Num(n) => assert_eq!(n, -1500.0),
        ref other => panic!("expected a number, got {other:?}"),
    }
    assert!(matches!(array.values[2].borrow().value, JsonVal::Null));
}

#[test]
fn repeated_parses_are_deterministic() {
    let j = json();
    let input = r#"{ "a": [true, -1.5e3, null], "b": { "c": "d" } }"#;

    let first = j.value.parse(&j.grammar, input, &j.skipper);
    let second = j.value.parse(&j.grammar, input, &j.skipper);
    assert!(first.ret && second.ret);
    assert_eq!(
        render(&first.value.unwrap().borrow().value),
        render(&second.value.unwrap().borrow().value)
    );
    assert_eq!(
        format!("{:?}", first.root_node),
        format!("{:?}", second.root_node)
    );
}

#[test]
fn scalars_parse_alone() {
    let j = json();
    for (input, expected) in [
        ("true", "true"),
        ("null", "null"),
        ("42", "42"),
        ("-0.5", "-0.5"),
        (r#""hi""#, "\"hi\""),
        ("[]", "[]"),
        ("{}", "{}"),
    ] {
        let result = j.value.parse(&j.grammar, input, &j.skipper);
        assert!(result.ret, "failed on {input}");
        assert_eq!(render(&result.value.unwrap().borrow().value), expected);
    }
}

#[test]
fn truncated_input_recovers_with_insertions() {
    let j = json();
    let result = j.value.parse(&j.grammar, "[1, ", &j.skipper);
    assert!(result.ret);
    assert!(result.recovered);
    assert!(result
        .diagnostics
        .iter()
        .any(|d| d.kind == pegtree::DiagnosticKind::Inserted));
    assert_eq!(result.recovered, !result.diagnostics.is_empty());
}

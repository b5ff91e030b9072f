//! Scalar values produced by terminal and data-type rules, and the
//! conversions between them and the Rust types a rule declares.

use ordered_float::OrderedFloat;

use crate::error::ValueError;

/// A converted scalar. Floats are wrapped in [`OrderedFloat`] so parsed
/// values compare deterministically.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Str(String),
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(OrderedFloat<f64>),
    Char(char),
    Null,
}

impl Default for Value {
    fn default() -> Value {
        Value::Null
    }
}

impl Value {
    /// The textual form of the value, used when data-type rules concatenate
    /// nested rule values.
    pub fn to_text(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::UInt(u) => u.to_string(),
            Value::Float(f) => f.0.to_string(),
            Value::Char(c) => c.to_string(),
            Value::Null => String::new(),
        }
    }

    pub(crate) fn kind_name(&self) -> &'static str {
        match self {
            Value::Str(_) => "string",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::UInt(_) => "uint",
            Value::Float(_) => "float",
            Value::Char(_) => "char",
            Value::Null => "null",
        }
    }
}

/// Text-to-[`Value`] conversion installed on a terminal or data-type rule.
pub type Converter = std::sync::Arc<dyn Fn(&str) -> Result<Value, ValueError> + Send + Sync>;

/// Rust types a terminal or data-type rule may declare as its result.
///
/// `default_converter` supplies the out-of-the-box text conversion (§ strings,
/// booleans, integers, floats); types returning `None` require an explicit
/// `set_converter` call, mirroring the way `char` and domain types work in
/// the default converter family.
pub trait DataValue: Sized + 'static {
    fn into_value(self) -> Value;
    fn from_value(value: &Value) -> Option<Self>;
    fn default_converter() -> Option<Converter> {
        None
    }
}

impl DataValue for String {
    fn into_value(self) -> Value {
        Value::Str(self)
    }
    fn from_value(value: &Value) -> Option<String> {
        match value {
            Value::Str(s) => Some(s.clone()),
            _ => None,
        }
    }
    fn default_converter() -> Option<Converter> {
        Some(std::sync::Arc::new(|text| Ok(Value::Str(text.to_string()))))
    }
}

impl DataValue for bool {
    fn into_value(self) -> Value {
        Value::Bool(self)
    }
    fn from_value(value: &Value) -> Option<bool> {
        match value {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
    fn default_converter() -> Option<Converter> {
        Some(std::sync::Arc::new(|text| Ok(Value::Bool(text == "true"))))
    }
}

macro_rules! int_data_value {
    ($($ty:ty),+) => {$(
        impl DataValue for $ty {
            fn into_value(self) -> Value {
                Value::Int(self as i64)
            }
            fn from_value(value: &Value) -> Option<$ty> {
                match value {
                    Value::Int(i) => (*i).try_into().ok(),
                    Value::UInt(u) => (*u).try_into().ok(),
                    _ => None,
                }
            }
            fn default_converter() -> Option<Converter> {
                Some(std::sync::Arc::new(|text| {
                    text.parse::<i64>().map(Value::Int).map_err(|_| {
                        ValueError::InvalidLiteral {
                            expected: "integer",
                            text: text.to_string(),
                        }
                    })
                }))
            }
        }
    )+};
}

int_data_value!(i8, i16, i32, i64);

macro_rules! uint_data_value {
    ($($ty:ty),+) => {$(
        impl DataValue for $ty {
            fn into_value(self) -> Value {
                Value::UInt(self as u64)
            }
            fn from_value(value: &Value) -> Option<$ty> {
                match value {
                    Value::UInt(u) => (*u).try_into().ok(),
                    Value::Int(i) => u64::try_from(*i).ok().and_then(|u| u.try_into().ok()),
                    _ => None,
                }
            }
            fn default_converter() -> Option<Converter> {
                Some(std::sync::Arc::new(|text| {
                    text.parse::<u64>().map(Value::UInt).map_err(|_| {
                        ValueError::InvalidLiteral {
                            expected: "unsigned integer",
                            text: text.to_string(),
                        }
                    })
                }))
            }
        }
    )+};
}

uint_data_value!(u8, u16, u32, u64);

macro_rules! float_data_value {
    ($($ty:ty),+) => {$(
        impl DataValue for $ty {
            fn into_value(self) -> Value {
                Value::Float(OrderedFloat(self as f64))
            }
            fn from_value(value: &Value) -> Option<$ty> {
                match value {
                    Value::Float(f) => Some(f.0 as $ty),
                    Value::Int(i) => Some(*i as $ty),
                    Value::UInt(u) => Some(*u as $ty),
                    _ => None,
                }
            }
            fn default_converter() -> Option<Converter> {
                Some(std::sync::Arc::new(|text| {
                    text.parse::<f64>()
                        .map(|f| Value::Float(OrderedFloat(f)))
                        .map_err(|_| ValueError::InvalidLiteral {
                            expected: "float",
                            text: text.to_string(),
                        })
                }))
            }
        }
    )+};
}

float_data_value!(f32, f64);

impl DataValue for char {
    fn into_value(self) -> Value {
        Value::Char(self)
    }
    fn from_value(value: &Value) -> Option<char> {
        match value {
            Value::Char(c) => Some(*c),
            _ => None,
        }
    }
    // no default: a one-char rule must install its own converter
}

impl DataValue for Value {
    fn into_value(self) -> Value {
        self
    }
    fn from_value(value: &Value) -> Option<Value> {
        Some(value.clone())
    }
    fn default_converter() -> Option<Converter> {
        Some(std::sync::Arc::new(|text| Ok(Value::Str(text.to_string()))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_default_converter() {
        let conv = i32::default_converter().unwrap();
        assert_eq!(conv("42").unwrap(), Value::Int(42));
        assert_eq!(conv("-7").unwrap(), Value::Int(-7));
        assert!(conv("4x2").is_err());
        assert!(conv("").is_err());
    }

    #[test]
    fn bool_default_converter() {
        let conv = bool::default_converter().unwrap();
        assert_eq!(conv("true").unwrap(), Value::Bool(true));
        assert_eq!(conv("false").unwrap(), Value::Bool(false));
        assert_eq!(conv("TRUE").unwrap(), Value::Bool(false));
    }

    #[test]
    fn float_default_converter() {
        let conv = f64::default_converter().unwrap();
        assert_eq!(conv("-1.5e3").unwrap(), Value::Float(OrderedFloat(-1500.0)));
        assert!(conv("one").is_err());
    }

    #[test]
    fn char_has_no_default() {
        assert!(char::default_converter().is_none());
    }

    #[test]
    fn round_trips() {
        assert_eq!(i64::from_value(&42i64.into_value()), Some(42));
        assert_eq!(
            String::from_value(&"hi".to_string().into_value()),
            Some("hi".to_string())
        );
        assert_eq!(f64::from_value(&Value::Int(3)), Some(3.0));
        assert_eq!(bool::from_value(&Value::Str("true".into())), None);
    }
}

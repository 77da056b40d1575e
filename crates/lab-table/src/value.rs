use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use std::cmp::Ordering;
use std::fmt;

pub type ValueTree = IndexMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Primitive {
    Bool(bool),
    Number(f64),
    String(String),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveType {
    String,
    Number,
    Boolean,
    Null,
}

impl PrimitiveType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrimitiveType::String => "string",
            PrimitiveType::Number => "number",
            PrimitiveType::Boolean => "boolean",
            PrimitiveType::Null => "null",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Primitive(Primitive),
    Tree(ValueTree),
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Object(map) => {
                Value::Tree(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
            other => Value::Primitive(Primitive::from(other)),
        }
    }
}

impl From<serde_json::Value> for Primitive {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Primitive::Null,
            serde_json::Value::Bool(b) => Primitive::Bool(b),
            serde_json::Value::Number(n) => {
                n.as_f64().map(Primitive::Number).unwrap_or(Primitive::Null)
            }
            serde_json::Value::String(s) => Primitive::String(s),
            // arrays and objects are not valid cell values; keep their text so they stay visible
            other => Primitive::String(other.to_string()),
        }
    }
}

impl From<&str> for Primitive {
    fn from(value: &str) -> Self {
        Primitive::String(value.to_string())
    }
}

impl From<f64> for Primitive {
    fn from(value: f64) -> Self {
        Primitive::Number(value)
    }
}

impl From<bool> for Primitive {
    fn from(value: bool) -> Self {
        Primitive::Bool(value)
    }
}

impl Value {
    pub fn as_primitive(&self) -> Option<&Primitive> {
        match self {
            Value::Primitive(p) => Some(p),
            Value::Tree(_) => None,
        }
    }

    pub fn as_tree(&self) -> Option<&ValueTree> {
        match self {
            Value::Tree(t) => Some(t),
            Value::Primitive(_) => None,
        }
    }

    pub fn resolve<S: AsRef<str>>(&self, keys: &[S]) -> Option<&Value> {
        let mut cur = self;
        for key in keys {
            cur = cur.as_tree()?.get(key.as_ref())?;
        }
        Some(cur)
    }
}

impl Primitive {
    pub fn type_tag(&self) -> PrimitiveType {
        match self {
            Primitive::String(_) => PrimitiveType::String,
            Primitive::Number(_) => PrimitiveType::Number,
            Primitive::Bool(_) => PrimitiveType::Boolean,
            Primitive::Null => PrimitiveType::Null,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Primitive::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Primitive::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Numeric coercion with JavaScript `Number()` semantics.
    pub fn to_number(&self) -> f64 {
        match self {
            Primitive::Number(n) => *n,
            Primitive::Bool(true) => 1.0,
            Primitive::Bool(false) | Primitive::Null => 0.0,
            Primitive::String(s) => string_to_number(s),
        }
    }

    pub fn loose_eq(&self, other: &Primitive) -> bool {
        match (self, other) {
            (Primitive::Null, Primitive::Null) => true,
            (Primitive::Null, _) | (_, Primitive::Null) => false,
            (Primitive::String(a), Primitive::String(b)) => a == b,
            (Primitive::Bool(a), Primitive::Bool(b)) => a == b,
            (a, b) => a.to_number() == b.to_number(),
        }
    }

    /// Relational ordering: two strings compare lexicographically, everything
    /// else numerically. `None` when either side coerces to NaN.
    pub fn loose_cmp(&self, other: &Primitive) -> Option<Ordering> {
        match (self, other) {
            (Primitive::String(a), Primitive::String(b)) => Some(a.cmp(b)),
            (a, b) => a.to_number().partial_cmp(&b.to_number()),
        }
    }
}

fn string_to_number(s: &str) -> f64 {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    match trimmed {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    let numeric = trimmed
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E'));
    if !numeric {
        return f64::NAN;
    }
    trimmed.parse::<f64>().unwrap_or(f64::NAN)
}

/// Formats a number the way a JavaScript `String(n)` call would.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    let abs = n.abs();
    if n.fract() == 0.0 && abs < 1e21 {
        return format!("{:.0}", n);
    }
    if abs >= 1e21 || abs < 1e-6 {
        let formatted = format!("{:e}", n);
        return match formatted.split_once('e') {
            Some((mantissa, exp)) if !exp.starts_with('-') => format!("{}e+{}", mantissa, exp),
            _ => formatted,
        };
    }
    format!("{}", n)
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Primitive::String(s) => f.write_str(s),
            Primitive::Number(n) => f.write_str(&format_number(*n)),
            Primitive::Bool(b) => write!(f, "{}", b),
            Primitive::Null => f.write_str("null"),
        }
    }
}

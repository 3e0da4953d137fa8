use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::ast::FunctionDecl;
use crate::interp::{EnvRef, Exec, Runtime};

/// A script value. Objects are shared handles; cloning a `Value` never copies an object.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Arc<str>),
    Object(ObjectRef),
}

pub(crate) type NativeFn = fn(&mut Runtime, Value, Vec<Value>) -> Exec<Value>;

pub(crate) enum Callable {
    Script { decl: Arc<FunctionDecl>, env: EnvRef },
    Native { name: &'static str, func: NativeFn },
}

pub(crate) enum ObjectKind {
    Ordinary,
    Array(Vec<Value>),
    Function(Arc<Callable>),
    Error,
}

pub(crate) struct Object {
    pub props: Vec<(String, Value)>,
    pub kind: ObjectKind,
}

#[derive(Clone)]
pub struct ObjectRef(Arc<Mutex<Object>>);

impl ObjectRef {
    pub(crate) fn new(kind: ObjectKind, props: Vec<(String, Value)>) -> Self {
        Self(Arc::new(Mutex::new(Object { props, kind })))
    }

    pub(crate) fn ordinary(props: Vec<(String, Value)>) -> Self {
        Self::new(ObjectKind::Ordinary, props)
    }

    pub(crate) fn array(items: Vec<Value>) -> Self {
        Self::new(ObjectKind::Array(items), Vec::new())
    }

    pub(crate) fn error(name: &str, message: &str) -> Self {
        Self::new(
            ObjectKind::Error,
            vec![
                ("name".to_string(), Value::from(name)),
                ("message".to_string(), Value::from(message)),
            ],
        )
    }

    pub(crate) fn function(callable: Callable) -> Self {
        Self::new(ObjectKind::Function(Arc::new(callable)), Vec::new())
    }

    pub(crate) fn callable(&self) -> Option<Arc<Callable>> {
        match &self.0.lock().kind {
            ObjectKind::Function(callable) => Some(callable.clone()),
            _ => None,
        }
    }

    pub(crate) fn is_array(&self) -> bool {
        matches!(self.0.lock().kind, ObjectKind::Array(_))
    }

    pub(crate) fn with_array<R>(&self, f: impl FnOnce(&mut Vec<Value>) -> R) -> Option<R> {
        match &mut self.0.lock().kind {
            ObjectKind::Array(items) => Some(f(items)),
            _ => None,
        }
    }

    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn is_function(&self) -> bool {
        matches!(self.0.lock().kind, ObjectKind::Function(_))
    }

    pub fn class_name(&self) -> &'static str {
        match self.0.lock().kind {
            ObjectKind::Ordinary => "Object",
            ObjectKind::Array(_) => "Array",
            ObjectKind::Function(_) => "Function",
            ObjectKind::Error => "Error",
        }
    }

    /// Own enumerable keys, in insertion order (array indices first).
    pub fn keys(&self) -> Vec<String> {
        let object = self.0.lock();
        let mut keys = match &object.kind {
            ObjectKind::Array(items) => (0..items.len()).map(|i| i.to_string()).collect(),
            _ => Vec::new(),
        };
        keys.extend(object.props.iter().map(|(key, _)| key.clone()));
        keys
    }

    pub fn get(&self, key: &str) -> Value {
        let object = self.0.lock();
        if let ObjectKind::Array(items) = &object.kind {
            if key == "length" {
                return Value::Number(items.len() as f64);
            }
            if let Some(index) = array_index(key) {
                return items.get(index).cloned().unwrap_or_default();
            }
        }
        object
            .props
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
            .unwrap_or_default()
    }

    pub fn has(&self, key: &str) -> bool {
        let object = self.0.lock();
        if let ObjectKind::Array(items) = &object.kind {
            if key == "length" || array_index(key).is_some_and(|i| i < items.len()) {
                return true;
            }
        }
        object.props.iter().any(|(k, _)| k == key)
    }

    pub fn set(&self, key: &str, value: Value) {
        let mut object = self.0.lock();
        if let ObjectKind::Array(items) = &mut object.kind {
            if let Some(index) = array_index(key) {
                if index >= items.len() {
                    items.resize(index + 1, Value::Undefined);
                }
                items[index] = value;
                return;
            }
            if key == "length" {
                if let Value::Number(n) = value {
                    if n >= 0.0 && n.fract() == 0.0 {
                        items.resize(n as usize, Value::Undefined);
                    }
                }
                return;
            }
        }
        match object.props.iter_mut().find(|(k, _)| k == key) {
            Some((_, slot)) => *slot = value,
            None => object.props.push((key.to_string(), value)),
        }
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[object {}]", self.class_name())
    }
}

fn array_index(key: &str) -> Option<usize> {
    if key.is_empty() || (key.len() > 1 && key.starts_with('0')) {
        return None;
    }
    key.parse().ok()
}

impl Value {
    pub fn truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Object(_) => true,
        }
    }

    /// The `typeof` tag.
    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "object",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Object(obj) if obj.is_function() => "function",
            Value::Object(_) => "object",
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Number(n) => *n,
            Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    0.0
                } else if let Some(hex) = trimmed
                    .strip_prefix("0x")
                    .or_else(|| trimmed.strip_prefix("0X"))
                {
                    u64::from_str_radix(hex, 16).map_or(f64::NAN, |v| v as f64)
                } else {
                    match trimmed {
                        "Infinity" | "+Infinity" => f64::INFINITY,
                        "-Infinity" => f64::NEG_INFINITY,
                        // Rust accepts "inf" and "nan", which are not numeric strings here.
                        _ if trimmed.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') => {
                            f64::NAN
                        }
                        _ => trimmed.parse().unwrap_or(f64::NAN),
                    }
                }
            }
            Value::Object(obj) if obj.is_array() => {
                Value::from(obj_to_string(obj, 0)).to_number()
            }
            Value::Object(_) => f64::NAN,
        }
    }

    /// String conversion as performed by `+` concatenation and `String(value)`.
    pub fn to_js_string(&self) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::String(s) => s.to_string(),
            Value::Object(obj) => obj_to_string(obj, 0),
        }
    }

    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    pub fn loose_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined | Value::Null, Value::Undefined | Value::Null) => true,
            (Value::Undefined | Value::Null, _) | (_, Value::Undefined | Value::Null) => false,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Object(_), _) => Value::from(self.to_js_string()).loose_equals(other),
            (_, Value::Object(_)) => self.loose_equals(&Value::from(other.to_js_string())),
            (Value::String(a), Value::String(b)) => a == b,
            _ => self.to_number() == other.to_number(),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{s:?}"),
            Value::Object(obj) => write!(f, "{obj:?}"),
            other => f.write_str(&other.to_js_string()),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(Arc::from(value))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(Arc::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

// Nested arrays deeper than this render empty, which also cuts self-referencing cycles.
const MAX_STRING_DEPTH: usize = 8;

fn obj_to_string(obj: &ObjectRef, depth: usize) -> String {
    match obj.class_name() {
        "Array" => {
            if depth >= MAX_STRING_DEPTH {
                return String::new();
            }
            let items = obj.with_array(|items| items.clone()).unwrap_or_default();
            items
                .iter()
                .map(|item| match item {
                    Value::Undefined | Value::Null => String::new(),
                    Value::Object(inner) => obj_to_string(inner, depth + 1),
                    other => other.to_js_string(),
                })
                .collect::<Vec<_>>()
                .join(",")
        }
        "Error" => {
            let name = obj.get("name").to_js_string();
            let message = obj.get("message").to_js_string();
            if message.is_empty() {
                name
            } else {
                format!("{name}: {message}")
            }
        }
        "Function" => match obj.callable().as_deref() {
            Some(Callable::Native { name, .. }) => format!("function {name}() {{ [native code] }}"),
            Some(Callable::Script { decl, .. }) => {
                format!("function {}() {{ ... }}", decl.name.as_deref().unwrap_or(""))
            }
            None => "function".to_string(),
        },
        _ => "[object Object]".to_string(),
    }
}

/// Formats a number the way the script language prints it: the shortest digits that round-trip,
/// in plain decimal for magnitudes in `[1e-6, 1e21)` and exponent form (`1e+21`, `1.5e-7`)
/// outside it.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    if n.is_infinite() {
        return (if n > 0.0 { "Infinity" } else { "-Infinity" }).to_string();
    }

    let sign = if n < 0.0 { "-" } else { "" };
    let scientific = format!("{:e}", n.abs());
    let (mantissa, exponent) = scientific
        .split_once('e')
        .unwrap_or((scientific.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();
    let len = digits.len() as i32;
    // Digits before the decimal point.
    let point = exponent + 1;

    let body = if len <= point && point <= 21 {
        format!("{digits}{}", "0".repeat((point - len) as usize))
    } else if 0 < point && point <= 21 {
        let (int, frac) = digits.split_at(point as usize);
        format!("{int}.{frac}")
    } else if -6 < point && point <= 0 {
        format!("0.{}{digits}", "0".repeat(point.unsigned_abs() as usize))
    } else {
        let exp_sign = if point > 0 { '+' } else { '-' };
        let exp = (point - 1).abs();
        let (first, rest) = digits.split_at(1);
        if rest.is_empty() {
            format!("{first}e{exp_sign}{exp}")
        } else {
            format!("{first}.{rest}e{exp_sign}{exp}")
        }
    };
    format!("{sign}{body}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_numbers_without_trailing_zero() {
        assert_eq!(format_number(30.0), "30");
        assert_eq!(format_number(-2.0), "-2");
        assert_eq!(format_number(0.5), "0.5");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(f64::NAN), "NaN");
        assert_eq!(format_number(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn large_and_tiny_numbers_switch_to_exponent_form() {
        assert_eq!(format_number(123.456), "123.456");
        assert_eq!(format_number(1e20), "100000000000000000000");
        assert_eq!(format_number(1e21), "1e+21");
        assert_eq!(format_number(-2.5e25), "-2.5e+25");
        assert_eq!(format_number(0.000001), "0.000001");
        assert_eq!(format_number(1e-7), "1e-7");
        assert_eq!(format_number(1.5e-7), "1.5e-7");
    }

    #[test]
    fn loose_equality_coerces_strings_and_numbers() {
        assert!(Value::from("3").loose_equals(&Value::Number(3.0)));
        assert!(Value::Null.loose_equals(&Value::Undefined));
        assert!(!Value::Null.loose_equals(&Value::Number(0.0)));
        assert!(!Value::from("3").strict_equals(&Value::Number(3.0)));
    }

    #[test]
    fn arrays_expose_indices_and_length() {
        let arr = ObjectRef::array(vec![Value::Number(1.0), Value::Number(2.0)]);
        assert_eq!(arr.keys(), vec!["0".to_string(), "1".to_string()]);
        assert_eq!(arr.get("length").to_number(), 2.0);
        arr.set("3", Value::Bool(true));
        assert_eq!(arr.get("length").to_number(), 4.0);
        assert_eq!(Value::Object(arr).to_js_string(), "1,2,,true");
    }

    #[test]
    fn string_to_number_rejects_rust_only_spellings() {
        assert!(Value::from("inf").to_number().is_nan());
        assert_eq!(Value::from(" 12 ").to_number(), 12.0);
        assert_eq!(Value::from("1e3").to_number(), 1000.0);
        assert_eq!(Value::from("").to_number(), 0.0);
    }
}

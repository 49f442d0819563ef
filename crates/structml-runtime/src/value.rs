use std::cmp::Ordering;
use std::fmt;

use crate::error::ValueError;

type Result<T> = std::result::Result<T, ValueError>;

/// Largest string `*` repetition may produce, in bytes.
pub const MAX_REPEAT_LEN: usize = 16 * 1024 * 1024;

/// A script value.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    /// Ordered key-value pairs (preserves insertion order).
    Map(Vec<(String, Value)>),
    /// A failed completion, bound in place of its result.
    Error(String),
}

// ============================================================================
// Arithmetic operations
// ============================================================================

impl Value {
    pub fn add(&self, other: &Value) -> Result<Value> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a
                .checked_add(*b)
                .map(Value::Int)
                .ok_or(ValueError::Overflow("+")),
            (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a + b)),
            (Value::Int(a), Value::Float(b)) => Ok(Value::Float(*a as f64 + b)),
            (Value::Float(a), Value::Int(b)) => Ok(Value::Float(a + *b as f64)),
            (Value::List(a), Value::List(b)) => {
                let mut items = a.clone();
                items.extend(b.iter().cloned());
                Ok(Value::List(items))
            }
            // String + anything => concat
            (Value::String(a), other) => {
                let mut s = a.clone();
                s.push_str(&other.display_string());
                Ok(Value::String(s))
            }
            (other, Value::String(b)) => {
                let mut s = other.display_string();
                s.push_str(b);
                Ok(Value::String(s))
            }
            _ => Err(ValueError::Type(format!(
                "cannot add {} and {}",
                self.type_name(),
                other.type_name()
            ))),
        }
    }

    pub fn sub(&self, other: &Value) -> Result<Value> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a
                .checked_sub(*b)
                .map(Value::Int)
                .ok_or(ValueError::Overflow("-")),
            (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a - b)),
            (Value::Int(a), Value::Float(b)) => Ok(Value::Float(*a as f64 - b)),
            (Value::Float(a), Value::Int(b)) => Ok(Value::Float(a - *b as f64)),
            _ => Err(ValueError::Type(format!(
                "cannot subtract {} from {}",
                other.type_name(),
                self.type_name()
            ))),
        }
    }

    pub fn mul(&self, other: &Value) -> Result<Value> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a
                .checked_mul(*b)
                .map(Value::Int)
                .ok_or(ValueError::Overflow("*")),
            (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a * b)),
            (Value::Int(a), Value::Float(b)) => Ok(Value::Float(*a as f64 * b)),
            (Value::Float(a), Value::Int(b)) => Ok(Value::Float(a * *b as f64)),
            (Value::String(s), Value::Int(n)) | (Value::Int(n), Value::String(s)) => {
                let count = usize::try_from(*n).unwrap_or(0);
                match s.len().checked_mul(count) {
                    Some(len) if len <= MAX_REPEAT_LEN => Ok(Value::String(s.repeat(count))),
                    _ => Err(ValueError::Overflow("*")),
                }
            }
            _ => Err(ValueError::Type(format!(
                "cannot multiply {} and {}",
                self.type_name(),
                other.type_name()
            ))),
        }
    }

    /// Int / Int is integer division; any zero divisor is an error.
    pub fn div(&self, other: &Value) -> Result<Value> {
        match (self, other) {
            (Value::Int(_) | Value::Float(_), Value::Int(0)) => Err(ValueError::DivisionByZero),
            (Value::Int(_) | Value::Float(_), Value::Float(b)) if *b == 0.0 => {
                Err(ValueError::DivisionByZero)
            }
            (Value::Int(a), Value::Int(b)) => a
                .checked_div(*b)
                .map(Value::Int)
                .ok_or(ValueError::Overflow("/")),
            (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a / b)),
            (Value::Int(a), Value::Float(b)) => Ok(Value::Float(*a as f64 / b)),
            (Value::Float(a), Value::Int(b)) => Ok(Value::Float(a / *b as f64)),
            _ => Err(ValueError::Type(format!(
                "cannot divide {} by {}",
                self.type_name(),
                other.type_name()
            ))),
        }
    }

    pub fn neg(&self) -> Result<Value> {
        match self {
            Value::Int(a) => a
                .checked_neg()
                .map(Value::Int)
                .ok_or(ValueError::Overflow("-")),
            Value::Float(a) => Ok(Value::Float(-a)),
            _ => Err(ValueError::Type(format!(
                "cannot negate {}",
                self.type_name()
            ))),
        }
    }
}

// ============================================================================
// Comparison operations
// ============================================================================

impl Value {
    fn compare(&self, other: &Value, op: &str) -> Result<Ordering> {
        let ordering = match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            _ => {
                return Err(ValueError::Type(format!(
                    "cannot compare {} {} {}",
                    self.type_name(),
                    op,
                    other.type_name()
                )))
            }
        };
        ordering.ok_or_else(|| ValueError::Type("cannot compare NaN".to_string()))
    }

    pub fn lt(&self, other: &Value) -> Result<Value> {
        Ok(Value::Bool(self.compare(other, "<")? == Ordering::Less))
    }

    pub fn gt(&self, other: &Value) -> Result<Value> {
        Ok(Value::Bool(self.compare(other, ">")? == Ordering::Greater))
    }

    pub fn lte(&self, other: &Value) -> Result<Value> {
        Ok(Value::Bool(self.compare(other, "<=")? != Ordering::Greater))
    }

    pub fn gte(&self, other: &Value) -> Result<Value> {
        Ok(Value::Bool(self.compare(other, ">=")? != Ordering::Less))
    }

    pub fn eq_val(&self, other: &Value) -> Value {
        Value::Bool(self == other)
    }

    pub fn neq_val(&self, other: &Value) -> Value {
        Value::Bool(self != other)
    }

    /// Truthiness for conditions and logical operators.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Map(pairs) => !pairs.is_empty(),
            Value::Error(_) => false,
        }
    }
}

// ============================================================================
// Field and index access
// ============================================================================

impl Value {
    /// `map.name`
    pub fn field_get(&self, name: &str) -> Result<Value> {
        match self {
            Value::Map(pairs) => lookup(pairs, name),
            _ => Err(ValueError::Type(format!(
                "cannot access field '{}' on {}",
                name,
                self.type_name()
            ))),
        }
    }

    /// Access by index: List[Int] and String[Int] (negative counts from the
    /// end), Map[String].
    pub fn index_get(&self, index: &Value) -> Result<Value> {
        match (self, index) {
            (Value::List(items), Value::Int(i)) => resolve_index(*i, items.len())
                .map(|idx| items[idx].clone())
                .ok_or_else(|| out_of_bounds(*i, items.len())),
            (Value::String(s), Value::Int(i)) => {
                let len = s.chars().count();
                resolve_index(*i, len)
                    .and_then(|idx| s.chars().nth(idx))
                    .map(|c| Value::String(c.to_string()))
                    .ok_or_else(|| out_of_bounds(*i, len))
            }
            (Value::Map(pairs), Value::String(key)) => lookup(pairs, key),
            _ => Err(ValueError::Type(format!(
                "cannot index {} with {}",
                self.type_name(),
                index.type_name()
            ))),
        }
    }

    /// Elements visited by `@foreach`: list items, map keys, or characters.
    pub fn iter_items(&self) -> Option<Vec<Value>> {
        match self {
            Value::List(items) => Some(items.clone()),
            Value::Map(pairs) => Some(
                pairs
                    .iter()
                    .map(|(k, _)| Value::String(k.clone()))
                    .collect(),
            ),
            Value::String(s) => Some(s.chars().map(|c| Value::String(c.to_string())).collect()),
            _ => None,
        }
    }
}

fn lookup(pairs: &[(String, Value)], key: &str) -> Result<Value> {
    pairs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.clone())
        .ok_or_else(|| ValueError::Index(format!("key '{}' not found", key)))
}

fn resolve_index(index: i64, len: usize) -> Option<usize> {
    let idx = if index < 0 {
        len as i64 + index
    } else {
        index
    };
    (0..len as i64).contains(&idx).then_some(idx as usize)
}

fn out_of_bounds(index: i64, len: usize) -> ValueError {
    ValueError::Index(format!("index {} out of bounds (length {})", index, len))
}

// ============================================================================
// Type introspection and conversion
// ============================================================================

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Bool(_) => "Bool",
            Value::Int(_) => "Int",
            Value::Float(_) => "Float",
            Value::String(_) => "String",
            Value::List(_) => "List",
            Value::Map(_) => "Map",
            Value::Error(_) => "Error",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Human-readable string used for output lines.
    pub fn display_string(&self) -> String {
        format!("{}", self)
    }

    /// The value written as expression source, e.g. `"casa"` or `[1, 2]`.
    pub fn to_literal(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(n) => n.to_string(),
            Value::Float(f) if f.is_finite() => format_float(*f),
            Value::Float(_) => "null".to_string(),
            Value::String(s) => quote(s),
            Value::List(items) => {
                let items: Vec<String> = items.iter().map(Value::to_literal).collect();
                format!("[{}]", items.join(", "))
            }
            Value::Map(pairs) => {
                let pairs: Vec<String> = pairs
                    .iter()
                    .map(|(k, v)| format!("{}: {}", quote(k), v.to_literal()))
                    .collect();
                format!("{{{}}}", pairs.join(", "))
            }
            Value::Error(_) => quote(&self.display_string()),
        }
    }

    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if let Some(f) = n.as_f64() {
                    Value::Float(f)
                } else {
                    Value::Null
                }
            }
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(arr) => Value::List(arr.iter().map(Value::from_json).collect()),
            serde_json::Value::Object(obj) => Value::Map(
                obj.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convert to a JSON value for serialization.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(n) => serde_json::Value::Number((*n).into()),
            Value::Float(f) => serde_json::json!(*f),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(|v| v.to_json()).collect())
            }
            Value::Map(pairs) => {
                let map: serde_json::Map<String, serde_json::Value> = pairs
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect();
                serde_json::Value::Object(map)
            }
            Value::Error(message) => serde_json::json!({ "error": message }),
        }
    }
}

/// Double-quoted string literal with the lexer's escapes.
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    out.push_str(&escape(s, '"'));
    out.push('"');
    out
}

/// Escape `s` for embedding inside a string literal delimited by `quote`.
pub fn escape(s: &str, quote: char) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out
}

fn format_float(f: f64) -> String {
    if f.fract() == 0.0 && f.abs() < 1e16 {
        format!("{:.1}", f)
    } else {
        format!("{}", f)
    }
}

// ============================================================================
// PartialEq: structural equality
// ============================================================================

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) => (*a as f64) == *b,
            (Value::Float(a), Value::Int(b)) => *a == (*b as f64),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Error(a), Value::Error(b)) => a == b,
            _ => false,
        }
    }
}

// ============================================================================
// Display
// ============================================================================

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => f.write_str(s),
            Value::Float(n) if n.is_finite() => f.write_str(&format_float(*n)),
            Value::Float(n) => write!(f, "{}", n),
            Value::Error(message) => write!(f, "[error: {}]", message),
            other => f.write_str(&other.to_literal()),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &str) -> Value {
        Value::String(v.to_string())
    }

    #[test]
    fn int_arithmetic() {
        assert_eq!(Value::Int(3).add(&Value::Int(4)).unwrap(), Value::Int(7));
        assert_eq!(Value::Int(10).sub(&Value::Int(3)).unwrap(), Value::Int(7));
        assert_eq!(Value::Int(3).mul(&Value::Int(4)).unwrap(), Value::Int(12));
        assert_eq!(Value::Int(10).div(&Value::Int(3)).unwrap(), Value::Int(3));
        assert_eq!(Value::Int(5).neg().unwrap(), Value::Int(-5));
    }

    #[test]
    fn mixed_numeric() {
        assert_eq!(
            Value::Int(3).add(&Value::Float(0.5)).unwrap(),
            Value::Float(3.5)
        );
        assert_eq!(
            Value::Float(10.0).sub(&Value::Int(3)).unwrap(),
            Value::Float(7.0)
        );
        assert_eq!(Value::Int(2), Value::Float(2.0));
    }

    #[test]
    fn string_and_list_concat() {
        assert_eq!(s("x=").add(&Value::Int(42)).unwrap(), s("x=42"));
        assert_eq!(Value::Int(1).add(&s("st")).unwrap(), s("1st"));
        assert_eq!(
            Value::List(vec![Value::Int(1)])
                .add(&Value::List(vec![Value::Int(2)]))
                .unwrap(),
            Value::List(vec![Value::Int(1), Value::Int(2)])
        );
        assert_eq!(s("ab").mul(&Value::Int(3)).unwrap(), s("ababab"));
    }

    #[test]
    fn type_errors() {
        let err = Value::List(vec![]).sub(&Value::Int(1)).unwrap_err();
        assert_eq!(err, ValueError::Type("cannot subtract Int from List".into()));
        assert!(Value::Bool(true).neg().is_err());
        assert!(Value::Int(1).lt(&s("a")).is_err());
    }

    #[test]
    fn division_by_zero() {
        assert_eq!(
            Value::Int(5).div(&Value::Int(0)).unwrap_err(),
            ValueError::DivisionByZero
        );
        assert!(Value::Float(5.0).div(&Value::Float(0.0)).is_err());
    }

    #[test]
    fn int_overflow_is_an_error() {
        let max = Value::Int(i64::MAX);
        let min = Value::Int(i64::MIN);
        assert_eq!(max.add(&Value::Int(1)).unwrap_err(), ValueError::Overflow("+"));
        assert_eq!(min.sub(&Value::Int(1)).unwrap_err(), ValueError::Overflow("-"));
        assert_eq!(max.mul(&Value::Int(2)).unwrap_err(), ValueError::Overflow("*"));
        assert_eq!(min.div(&Value::Int(-1)).unwrap_err(), ValueError::Overflow("/"));
        assert_eq!(min.neg().unwrap_err(), ValueError::Overflow("-"));
    }

    #[test]
    fn string_repeat_is_bounded() {
        assert_eq!(s("ab").mul(&Value::Int(3)).unwrap(), s("ababab"));
        assert_eq!(Value::Int(-2).mul(&s("ab")).unwrap(), s(""));
        assert_eq!(s("").mul(&Value::Int(i64::MAX)).unwrap(), s(""));
        assert_eq!(
            s("abc").mul(&Value::Int(i64::MAX)).unwrap_err(),
            ValueError::Overflow("*")
        );
        assert!(s("x").mul(&Value::Int(MAX_REPEAT_LEN as i64 + 1)).is_err());
    }

    #[test]
    fn comparison() {
        assert_eq!(Value::Int(3).lt(&Value::Int(5)).unwrap(), Value::Bool(true));
        assert_eq!(Value::Int(5).gt(&Value::Float(4.5)).unwrap(), Value::Bool(true));
        assert_eq!(Value::Int(3).lte(&Value::Int(3)).unwrap(), Value::Bool(true));
        assert_eq!(Value::Int(3).gte(&Value::Int(5)).unwrap(), Value::Bool(false));
        assert_eq!(s("apple").lt(&s("banana")).unwrap(), Value::Bool(true));
    }

    #[test]
    fn truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(!Value::Float(0.0).is_truthy());
        assert!(!s("").is_truthy());
        assert!(!Value::List(vec![]).is_truthy());
        assert!(!Value::Map(vec![]).is_truthy());
        assert!(!Value::Error("boom".into()).is_truthy());
        assert!(Value::Int(-1).is_truthy());
        assert!(s("x").is_truthy());
    }

    #[test]
    fn index_access() {
        let list = Value::List(vec![Value::Int(10), Value::Int(20), Value::Int(30)]);
        assert_eq!(list.index_get(&Value::Int(1)).unwrap(), Value::Int(20));
        assert_eq!(list.index_get(&Value::Int(-1)).unwrap(), Value::Int(30));
        assert!(matches!(
            list.index_get(&Value::Int(3)),
            Err(ValueError::Index(_))
        ));
        assert_eq!(s("héllo").index_get(&Value::Int(1)).unwrap(), s("é"));

        let map = Value::Map(vec![("a".into(), Value::Int(1))]);
        assert_eq!(map.index_get(&s("a")).unwrap(), Value::Int(1));
        assert_eq!(map.field_get("a").unwrap(), Value::Int(1));
        assert!(matches!(map.index_get(&s("b")), Err(ValueError::Index(_))));
        assert!(matches!(map.index_get(&Value::Int(0)), Err(ValueError::Type(_))));
    }

    #[test]
    fn iteration_items() {
        let map = Value::Map(vec![("x".into(), Value::Int(1)), ("y".into(), Value::Int(2))]);
        assert_eq!(map.iter_items().unwrap(), vec![s("x"), s("y")]);
        assert_eq!(s("ab").iter_items().unwrap(), vec![s("a"), s("b")]);
        assert!(Value::Int(3).iter_items().is_none());
    }

    #[test]
    fn display_and_literal() {
        assert_eq!(s("casa").display_string(), "casa");
        assert_eq!(s("casa").to_literal(), "\"casa\"");
        assert_eq!(s("say \"hi\"\n").to_literal(), r#""say \"hi\"\n""#);
        assert_eq!(Value::Float(3.0).display_string(), "3.0");
        assert_eq!(Value::Float(0.25).to_literal(), "0.25");
        assert_eq!(Value::Null.display_string(), "null");
        let list = Value::List(vec![Value::Int(1), s("a")]);
        assert_eq!(list.display_string(), r#"[1, "a"]"#);
        let map = Value::Map(vec![("k".into(), Value::Bool(true))]);
        assert_eq!(map.to_literal(), r#"{"k": true}"#);
        assert_eq!(Value::Error("timeout".into()).display_string(), "[error: timeout]");
    }

    #[test]
    fn json_bridge_keeps_key_order() {
        let json: serde_json::Value =
            serde_json::from_str(r#"{"z": 1, "a": [true, null, 2.5]}"#).unwrap();
        let value = Value::from_json(&json);
        assert_eq!(
            value,
            Value::Map(vec![
                ("z".into(), Value::Int(1)),
                (
                    "a".into(),
                    Value::List(vec![Value::Bool(true), Value::Null, Value::Float(2.5)])
                ),
            ])
        );
        assert_eq!(value.to_json(), json);
    }
}

use crate::core::{DataError, Result};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A single field value inside a record.
///
/// The set of variants mirrors the primitive column types the remote
/// backend exposes: string, number, boolean, timestamp, plus NULL for
/// absent values.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
    Boolean(bool),
    Timestamp(DateTime<Utc>),
}

impl Value {
    /// Ordered comparison used by filters and sorting.
    ///
    /// NULL sorts last; Integer and Float compare through coercion;
    /// any other cross-type comparison is an error.
    pub fn compare(&self, other: &Value) -> Result<Ordering> {
        match (self, other) {
            // NULL LAST
            (Value::Null, Value::Null) => Ok(Ordering::Equal),
            (Value::Null, _) => Ok(Ordering::Greater),
            (_, Value::Null) => Ok(Ordering::Less),

            (Value::Integer(a), Value::Integer(b)) => Ok(a.cmp(b)),
            (Value::Float(a), Value::Float(b)) => Ok(cmp_f64(*a, *b)),
            (Value::Text(a), Value::Text(b)) => Ok(a.cmp(b)),
            (Value::Boolean(a), Value::Boolean(b)) => Ok(a.cmp(b)),
            (Value::Timestamp(a), Value::Timestamp(b)) => Ok(a.cmp(b)),

            // Mixed numeric types (implicit coercion)
            (Value::Integer(a), Value::Float(b)) => Ok(cmp_f64(*a as f64, *b)),
            (Value::Float(a), Value::Integer(b)) => Ok(cmp_f64(*a, *b as f64)),

            _ => Err(DataError::TypeMismatch(format!(
                "Cannot compare incompatible types: {} and {}",
                self.type_name(),
                other.type_name()
            ))),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "NULL",
            Self::Integer(_) => "INTEGER",
            Self::Float(_) => "FLOAT",
            Self::Text(_) => "TEXT",
            Self::Boolean(_) => "BOOLEAN",
            Self::Timestamp(_) => "TIMESTAMP",
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Empty for display purposes: NULL or a blank/whitespace-only string.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Case-insensitive substring match for client-side search.
    /// Non-text values match against their display form.
    pub fn contains_text(&self, needle: &str) -> bool {
        if needle.is_empty() {
            return true;
        }
        self.to_string()
            .to_lowercase()
            .contains(&needle.to_lowercase())
    }

    pub fn from_json(json: &serde_json::Value) -> Result<Self> {
        match json {
            serde_json::Value::Null => Ok(Self::Null),
            serde_json::Value::Bool(b) => Ok(Self::Boolean(*b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Self::Integer(i))
                } else if let Some(f) = n.as_f64() {
                    Ok(Self::Float(f))
                } else {
                    Err(DataError::TypeMismatch(format!(
                        "Unsupported JSON number: {n}"
                    )))
                }
            }
            serde_json::Value::String(s) => Ok(Self::Text(s.clone())),
            other => Err(DataError::TypeMismatch(format!(
                "Unsupported JSON value for a field: {other}"
            ))),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Integer(i) => serde_json::Value::from(*i),
            Self::Float(f) => serde_json::Value::from(*f),
            Self::Text(s) => serde_json::Value::from(s.clone()),
            Self::Boolean(b) => serde_json::Value::from(*b),
            Self::Timestamp(t) => serde_json::Value::from(t.to_rfc3339()),
        }
    }
}

fn cmp_f64(a: f64, b: f64) -> Ordering {
    // NaN sorts after every real number
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

impl PartialEq for Value {
    /// Strict per-variant equality, consistent with [`Hash`]: floats
    /// compare by bit pattern, and `Integer(2)` is never equal to
    /// `Float(2.0)`. Filters that want numeric coercion go through
    /// [`Value::compare`] instead.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Timestamp(a), Self::Timestamp(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Self::Null => 0u8.hash(state),
            Self::Integer(i) => {
                1u8.hash(state);
                i.hash(state);
            }
            Self::Float(f) => {
                2u8.hash(state);
                f.to_bits().hash(state);
            }
            Self::Text(s) => {
                3u8.hash(state);
                s.hash(state);
            }
            Self::Boolean(b) => {
                4u8.hash(state);
                b.hash(state);
            }
            Self::Timestamp(t) => {
                5u8.hash(state);
                t.timestamp_nanos_opt().unwrap_or_default().hash(state);
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Integer(i) => write!(f, "{i}"),
            // Whole floats keep their decimal point so "2" (integer) and
            // "2.0" (float) stay distinct in canonical key text.
            Self::Float(fl) if fl.fract() == 0.0 && fl.is_finite() => write!(f, "{fl:.1}"),
            Self::Float(fl) => write!(f, "{fl}"),
            Self::Text(s) => write!(f, "{s}"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Timestamp(t) => write!(f, "{}", t.to_rfc3339()),
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(t: DateTime<Utc>) -> Self {
        Self::Timestamp(t)
    }
}

/// Schema-side type tag for a resource field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Integer,
    Float,
    Text,
    Boolean,
    Timestamp,
}

impl FieldType {
    pub fn is_compatible(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (Self::Integer, Value::Integer(_)) => true,
            (Self::Float, Value::Float(_)) => true,
            (Self::Float, Value::Integer(_)) => true, // Integer widens to Float
            (Self::Text, Value::Text(_)) => true,
            (Self::Boolean, Value::Boolean(_)) => true,
            (Self::Timestamp, Value::Timestamp(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer => write!(f, "INTEGER"),
            Self::Float => write!(f, "FLOAT"),
            Self::Text => write!(f, "TEXT"),
            Self::Boolean => write!(f, "BOOLEAN"),
            Self::Timestamp => write!(f, "TIMESTAMP"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_equality_is_strict_per_variant() {
        assert_eq!(Value::Integer(42), Value::Integer(42));
        assert_eq!(Value::Text("a".into()), Value::Text("a".into()));
        assert_eq!(Value::Float(2.0), Value::Float(2.0));
        assert_ne!(Value::Integer(1), Value::Integer(2));
        // Coercion is compare()'s job, not eq's; eq must agree with hash.
        assert_ne!(Value::Integer(2), Value::Float(2.0));
        assert_eq!(
            Value::Integer(2).compare(&Value::Float(2.0)).unwrap(),
            Ordering::Equal
        );
    }

    #[test]
    fn test_equal_values_hash_identically() {
        use std::hash::{DefaultHasher, Hash, Hasher};

        fn hash_of(value: &Value) -> u64 {
            let mut hasher = DefaultHasher::new();
            value.hash(&mut hasher);
            hasher.finish()
        }

        let pairs = [
            (Value::Integer(7), Value::Integer(7)),
            (Value::Float(1.5), Value::Float(1.5)),
            (Value::Text("x".into()), Value::Text("x".into())),
        ];
        for (a, b) in pairs {
            assert_eq!(a, b);
            assert_eq!(hash_of(&a), hash_of(&b));
        }
    }

    #[test]
    fn test_display_keeps_integer_and_float_distinct() {
        assert_eq!(Value::Integer(2).to_string(), "2");
        assert_eq!(Value::Float(2.0).to_string(), "2.0");
        assert_eq!(Value::Float(2.5).to_string(), "2.5");
    }

    #[test]
    fn test_value_ordering() {
        assert_eq!(
            Value::Integer(1).compare(&Value::Integer(2)).unwrap(),
            Ordering::Less
        );
        assert_eq!(
            Value::Text("b".into()).compare(&Value::Text("a".into())).unwrap(),
            Ordering::Greater
        );
        // NULL sorts last
        assert_eq!(
            Value::Null.compare(&Value::Integer(0)).unwrap(),
            Ordering::Greater
        );
    }

    #[test]
    fn test_cross_type_comparison_fails() {
        let result = Value::Text("a".into()).compare(&Value::Boolean(true));
        assert!(matches!(result, Err(DataError::TypeMismatch(_))));
    }

    #[test]
    fn test_type_compatibility() {
        assert!(FieldType::Integer.is_compatible(&Value::Integer(42)));
        assert!(FieldType::Integer.is_compatible(&Value::Null));
        assert!(FieldType::Float.is_compatible(&Value::Integer(1)));
        assert!(!FieldType::Integer.is_compatible(&Value::Text("x".into())));
    }

    #[test]
    fn test_contains_text_is_case_insensitive() {
        assert!(Value::Text("Customer Name".into()).contains_text("customer"));
        assert!(Value::Text("Customer Name".into()).contains_text(""));
        assert!(!Value::Text("Customer".into()).contains_text("vendor"));
    }

    #[test]
    fn test_json_round_trip() {
        let values = vec![
            Value::Null,
            Value::Integer(7),
            Value::Float(1.5),
            Value::Text("hi".into()),
            Value::Boolean(true),
        ];
        for v in values {
            assert_eq!(Value::from_json(&v.to_json()).unwrap(), v);
        }
    }
}

//! Field value types

use lazy_regex::{regex_find, regex_is_match};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A field value as seen by formulas.
///
/// Host JSON maps directly onto this type: `null`, booleans, numbers and
/// strings deserialize into the matching variant.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Missing or unresolved value
    #[default]
    Null,

    /// Boolean value (TRUE/FALSE)
    Boolean(bool),

    /// Numeric value (all numbers stored as f64)
    Number(f64),

    /// Text value
    Text(String),
}

impl Value {
    /// Create a new text value
    pub fn text<S: Into<String>>(s: S) -> Self {
        Value::Text(s.into())
    }

    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Null, or text made only of whitespace
    pub fn is_blank(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Text(s) => s.trim().is_empty(),
            Value::Boolean(_) | Value::Number(_) => false,
        }
    }

    /// Truthiness.
    ///
    /// Null, empty text, zero (and NaN) are falsy; everything else is truthy.
    pub fn to_bool(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Boolean(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Text(s) => !s.is_empty(),
        }
    }

    /// Numeric coercion.
    ///
    /// Text contributes its leading numeric part (`"12kg"` is 12); anything that
    /// does not start with a number is 0.
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Null => 0.0,
            Value::Boolean(true) => 1.0,
            Value::Boolean(false) => 0.0,
            Value::Number(n) => *n,
            Value::Text(s) => leading_number(s).unwrap_or(0.0),
        }
    }

    /// Text coercion. Booleans render as `TRUE`/`FALSE`, null as empty text.
    pub fn to_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Boolean(true) => "TRUE".to_string(),
            Value::Boolean(false) => "FALSE".to_string(),
            Value::Number(n) => format_number(*n),
            Value::Text(s) => s.clone(),
        }
    }

    /// Numeric view for comparisons: numbers, and text that is entirely numeric.
    pub fn as_numeric(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Text(s) if regex_is_match!(r"^\s*[-+]?(\d+\.?\d*|\.\d+)\s*$", s) => {
                s.trim().parse().ok()
            }
            _ => None,
        }
    }
}

fn leading_number(s: &str) -> Option<f64> {
    regex_find!(r"^\s*[-+]?(\d+\.?\d*|\.\d+)([eE][-+]?\d+)?", s).and_then(|m| m.trim().parse().ok())
}

/// Render a number without a trailing `.0` for integral values
fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.to_bool());
        assert!(!Value::text("").to_bool());
        assert!(!Value::Number(0.0).to_bool());
        assert!(!Value::Number(f64::NAN).to_bool());
        assert!(Value::Number(-1.0).to_bool());
        assert!(Value::text("no").to_bool());
        assert!(Value::text("0").to_bool());
    }

    #[test]
    fn test_to_number_parses_leading_text() {
        assert_eq!(Value::text("42").to_number(), 42.0);
        assert_eq!(Value::text(" 3.5 kg").to_number(), 3.5);
        assert_eq!(Value::text("-7abc").to_number(), -7.0);
        assert_eq!(Value::text("abc").to_number(), 0.0);
        assert_eq!(Value::Boolean(true).to_number(), 1.0);
        assert_eq!(Value::Null.to_number(), 0.0);
    }

    #[test]
    fn test_to_text() {
        assert_eq!(Value::Boolean(true).to_text(), "TRUE");
        assert_eq!(Value::Boolean(false).to_text(), "FALSE");
        assert_eq!(Value::Number(13.0).to_text(), "13");
        assert_eq!(Value::Number(2.5).to_text(), "2.5");
        assert_eq!(Value::Null.to_text(), "");
    }

    #[test]
    fn test_as_numeric_requires_whole_text() {
        assert_eq!(Value::text("100").as_numeric(), Some(100.0));
        assert_eq!(Value::text(" 1.5 ").as_numeric(), Some(1.5));
        assert_eq!(Value::text("100 apples").as_numeric(), None);
        assert_eq!(Value::Boolean(true).as_numeric(), None);
    }

    #[test]
    fn test_blank() {
        assert!(Value::Null.is_blank());
        assert!(Value::text("   ").is_blank());
        assert!(!Value::Number(0.0).is_blank());
        assert!(!Value::Boolean(false).is_blank());
    }

    #[test]
    fn test_json_mapping() {
        let values: Vec<Value> = serde_json::from_str(r#"[null, true, 3, "x"]"#).unwrap();
        assert_eq!(
            values,
            vec![
                Value::Null,
                Value::Boolean(true),
                Value::Number(3.0),
                Value::text("x")
            ]
        );
    }
}

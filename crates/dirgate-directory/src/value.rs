//! Attribute value types
//!
//! [`AttributeValue`] is the typed form of a request payload value;
//! [`RawValue`] is the protocol form exchanged with the transport.

use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::filter::eq_ignore_case;

/// A typed attribute value taken from a request payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// A string value.
    String(String),
    /// An integer value.
    Integer(i64),
    /// A boolean value.
    Boolean(bool),
    /// Binary data.
    Binary(Vec<u8>),
}

impl AttributeValue {
    /// Get as a string if this is a string value.
    pub fn as_string(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as an integer if this is an integer value.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            AttributeValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// The magnitude used for range checks: numbers by value, strings by
    /// character count, binary by byte length. Booleans have none.
    pub fn range_measure(&self) -> Option<i64> {
        match self {
            AttributeValue::Integer(i) => Some(*i),
            AttributeValue::String(s) => Some(s.chars().count() as i64),
            AttributeValue::Binary(b) => Some(b.len() as i64),
            AttributeValue::Boolean(_) => None,
        }
    }

    /// Structural equality used by remove and de-duplication: strings
    /// compare case-insensitively, everything else exactly.
    pub fn matches(&self, other: &AttributeValue) -> bool {
        match (self, other) {
            (AttributeValue::String(a), AttributeValue::String(b)) => eq_ignore_case(a, b),
            (AttributeValue::Integer(a), AttributeValue::String(b))
            | (AttributeValue::String(b), AttributeValue::Integer(a)) => {
                b.trim().parse::<i64>().is_ok_and(|v| v == *a)
            }
            _ => self == other,
        }
    }

    /// Convert a JSON payload value. Arrays and objects are not single values.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(AttributeValue::String(s.clone())),
            Value::Bool(b) => Some(AttributeValue::Boolean(*b)),
            Value::Number(n) => n.as_i64().map(AttributeValue::Integer),
            _ => None,
        }
    }

    /// Convert into the protocol representation.
    pub fn to_raw(&self) -> RawValue {
        match self {
            AttributeValue::String(s) => RawValue::Text(s.clone()),
            AttributeValue::Integer(i) => RawValue::Text(i.to_string()),
            AttributeValue::Boolean(b) => RawValue::Text(if *b { "TRUE" } else { "FALSE" }.to_string()),
            AttributeValue::Binary(b) => RawValue::Binary(b.clone()),
        }
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::String(s)
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::String(s.to_string())
    }
}

impl From<i64> for AttributeValue {
    fn from(i: i64) -> Self {
        AttributeValue::Integer(i)
    }
}

impl From<i32> for AttributeValue {
    fn from(i: i32) -> Self {
        AttributeValue::Integer(i64::from(i))
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        AttributeValue::Boolean(b)
    }
}

impl From<Vec<u8>> for AttributeValue {
    fn from(bytes: Vec<u8>) -> Self {
        AttributeValue::Binary(bytes)
    }
}

/// A single attribute value as it travels on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RawValue {
    /// UTF-8 text value.
    Text(String),
    /// Value that is not valid UTF-8 (SIDs, GUIDs, certificates).
    Binary(Vec<u8>),
}

impl RawValue {
    /// Borrow the raw bytes of this value.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            RawValue::Text(s) => s.as_bytes(),
            RawValue::Binary(b) => b,
        }
    }

    /// Get the text if this value is valid UTF-8.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            RawValue::Text(s) => Some(s),
            RawValue::Binary(b) => std::str::from_utf8(b).ok(),
        }
    }

    /// Consume into owned bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            RawValue::Text(s) => s.into_bytes(),
            RawValue::Binary(b) => b,
        }
    }

    /// Render without interpretation: text stays text, binary becomes base64.
    pub fn pass_through(&self) -> Value {
        match self {
            RawValue::Text(s) => Value::String(s.clone()),
            RawValue::Binary(b) => match std::str::from_utf8(b) {
                Ok(s) => Value::String(s.to_string()),
                Err(_) => Value::String(base64::engine::general_purpose::STANDARD.encode(b)),
            },
        }
    }
}

impl From<&str> for RawValue {
    fn from(s: &str) -> Self {
        RawValue::Text(s.to_string())
    }
}

impl From<String> for RawValue {
    fn from(s: String) -> Self {
        RawValue::Text(s)
    }
}

impl From<Vec<u8>> for RawValue {
    fn from(b: Vec<u8>) -> Self {
        RawValue::Binary(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_range_measure() {
        assert_eq!(AttributeValue::from(42i64).range_measure(), Some(42));
        assert_eq!(AttributeValue::from("héllo").range_measure(), Some(5));
        assert_eq!(AttributeValue::from(vec![1u8, 2, 3]).range_measure(), Some(3));
        assert_eq!(AttributeValue::from(true).range_measure(), None);
    }

    #[test]
    fn test_matches_is_case_insensitive() {
        let a = AttributeValue::from("CN=Admins,DC=example,DC=com");
        let b = AttributeValue::from("cn=admins,dc=example,dc=com");
        assert!(a.matches(&b));
        assert!(AttributeValue::from(514i64).matches(&AttributeValue::from("514")));
        assert!(!AttributeValue::from("a").matches(&AttributeValue::from("b")));
    }

    #[test]
    fn test_from_json() {
        assert_eq!(
            AttributeValue::from_json(&json!("x")),
            Some(AttributeValue::String("x".to_string()))
        );
        assert_eq!(
            AttributeValue::from_json(&json!(7)),
            Some(AttributeValue::Integer(7))
        );
        assert_eq!(AttributeValue::from_json(&json!([1, 2])), None);
    }

    #[test]
    fn test_raw_pass_through() {
        assert_eq!(RawValue::from("plain").pass_through(), json!("plain"));
        assert_eq!(
            RawValue::Binary(vec![0xff, 0x00]).pass_through(),
            json!("/wA=")
        );
        assert_eq!(AttributeValue::from(true).to_raw(), RawValue::from("TRUE"));
    }
}

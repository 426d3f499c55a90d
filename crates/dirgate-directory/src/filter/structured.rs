//! Structured (JSON) form of filter statements.
//!
//! Shape:
//!
//! ```text
//! {"and": [ ... ]}    {"or": [ ... ]}    {"nor": [ ... ]}
//! {"not": {"<property>": <value>}}
//! {"<property>": <value>}
//! ```
//!
//! Leaf values are JSON strings, integers or booleans; `null` is the
//! wildcard, `{"pattern": "Sm*"}` is a substring pattern and
//! `{"base64": "..."}` carries binary. A `*` inside a plain string is matched
//! literally. Match-rule leaves use the
//! rendered attribute name (`"userAccountControl:1.2.840.113556.1.4.803:"`)
//! as key. Every object has exactly one key, and `not` may only wrap a leaf.

use base64::Engine;
use serde_json::{Map, Value};

use super::{validate_attribute_name, CompoundKind, EqualStatement, FilterStatement, FilterValue, MatchRule};
use crate::error::{DirectoryError, DirectoryResult};

const NOT_KEY: &str = "not";
const BASE64_KEY: &str = "base64";
const PATTERN_KEY: &str = "pattern";

/// Render a statement into its structured form.
pub fn to_structured(statement: &FilterStatement) -> Value {
    match statement {
        FilterStatement::Equal(leaf) => leaf_to_structured(leaf),
        FilterStatement::Not(leaf) => single(NOT_KEY, leaf_to_structured(leaf)),
        FilterStatement::And(children) => group(CompoundKind::And, children),
        FilterStatement::Or(children) => group(CompoundKind::Or, children),
        FilterStatement::Nor(children) => group(CompoundKind::Nor, children),
    }
}

/// Parse a statement from its structured form.
pub fn from_structured(value: &Value) -> DirectoryResult<FilterStatement> {
    let (key, inner) = single_entry(value)?;

    match key.to_ascii_lowercase().as_str() {
        "and" => Ok(FilterStatement::and(parse_children(key, inner)?)),
        "or" => Ok(FilterStatement::or(parse_children(key, inner)?)),
        "nor" => Ok(FilterStatement::nor(parse_children(key, inner)?)),
        NOT_KEY => {
            let negated = from_structured(inner)?;
            if !negated.is_leaf() {
                return Err(DirectoryError::malformed(format!(
                    "'not' must wrap an equality statement, got '{}'",
                    negated.kind_name()
                )));
            }
            Ok(negated.negate())
        }
        _ => parse_leaf(key, inner),
    }
}

fn leaf_to_structured(leaf: &EqualStatement) -> Value {
    let value = match &leaf.value {
        None => Value::Null,
        Some(FilterValue::Text(s)) => Value::String(s.clone()),
        Some(FilterValue::Pattern { pattern }) => {
            single(PATTERN_KEY, Value::String(pattern.clone()))
        }
        Some(FilterValue::Integer(i)) => Value::from(*i),
        Some(FilterValue::Boolean(b)) => Value::Bool(*b),
        Some(FilterValue::Binary(bytes)) => single(
            BASE64_KEY,
            Value::String(base64::engine::general_purpose::STANDARD.encode(bytes)),
        ),
    };
    single(&leaf.rendered_attribute(), value)
}

fn group(kind: CompoundKind, children: &[FilterStatement]) -> Value {
    single(
        kind.key(),
        Value::Array(children.iter().map(to_structured).collect()),
    )
}

fn single(key: &str, value: Value) -> Value {
    let mut map = Map::with_capacity(1);
    map.insert(key.to_string(), value);
    Value::Object(map)
}

fn single_entry(value: &Value) -> DirectoryResult<(&str, &Value)> {
    let Value::Object(map) = value else {
        return Err(DirectoryError::malformed(format!(
            "expected a filter object, got {}",
            json_type(value)
        )));
    };
    let mut entries = map.iter();
    match (entries.next(), entries.next()) {
        (Some((key, inner)), None) => Ok((key.as_str(), inner)),
        (None, _) => Err(DirectoryError::malformed("empty filter object")),
        (Some(_), Some(_)) => Err(DirectoryError::malformed(format!(
            "filter object must have exactly one key, got {}",
            map.len()
        ))),
    }
}

fn parse_children(key: &str, value: &Value) -> DirectoryResult<Vec<FilterStatement>> {
    let Value::Array(items) = value else {
        return Err(DirectoryError::malformed(format!(
            "'{key}' expects an array, got {}",
            json_type(value)
        )));
    };
    if items.is_empty() {
        return Err(DirectoryError::malformed(format!(
            "'{key}' requires at least one child"
        )));
    }
    items.iter().map(from_structured).collect()
}

fn parse_leaf(key: &str, value: &Value) -> DirectoryResult<FilterStatement> {
    let (property, rule) = split_match_rule(key)?;
    validate_attribute_name(property)?;

    let value = match value {
        Value::Null => None,
        Value::String(s) => Some(FilterValue::Text(s.clone())),
        Value::Bool(b) => Some(FilterValue::Boolean(*b)),
        Value::Number(n) => Some(FilterValue::Integer(n.as_i64().ok_or_else(|| {
            DirectoryError::malformed(format!("'{key}' expects an integer, got {n}"))
        })?)),
        Value::Object(_) => {
            let (inner_key, encoded) = single_entry(value)?;
            match (inner_key, encoded) {
                (BASE64_KEY, Value::String(encoded)) => Some(FilterValue::Binary(
                    base64::engine::general_purpose::STANDARD
                        .decode(encoded)
                        .map_err(|e| {
                            DirectoryError::malformed(format!("'{key}' has invalid base64: {e}"))
                        })?,
                )),
                (PATTERN_KEY, Value::String(pattern)) => Some(FilterValue::pattern(pattern.clone())),
                _ => {
                    return Err(DirectoryError::malformed(format!(
                        "'{key}' has an unsupported object value"
                    )))
                }
            }
        }
        Value::Array(_) => {
            return Err(DirectoryError::malformed(format!(
                "'{key}' expects a scalar value, got array"
            )))
        }
    };

    Ok(FilterStatement::with_match_rule(property, value, rule))
}

/// Split `attr:OID:` into the attribute and its match rule.
fn split_match_rule(key: &str) -> DirectoryResult<(&str, Option<MatchRule>)> {
    let Some((property, rest)) = key.split_once(':') else {
        return Ok((key, None));
    };
    let oid = rest.strip_suffix(':').unwrap_or(rest);
    let rule = MatchRule::from_oid(oid).ok_or_else(|| {
        DirectoryError::malformed(format!("unsupported matching rule '{oid}' in '{key}'"))
    })?;
    Ok((property, Some(rule)))
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> FilterStatement {
        FilterStatement::and([
            FilterStatement::equal("objectClass", "user"),
            FilterStatement::bitwise_and("userAccountControl", 2).negate(),
            FilterStatement::or([
                FilterStatement::equal("department", "Sales"),
                FilterStatement::present("manager"),
            ]),
            FilterStatement::nor([FilterStatement::equal("cn", "krbtgt")]),
            FilterStatement::equal("objectGUID", vec![0x01u8, 0x02]),
            FilterStatement::absent("mail"),
            FilterStatement::like("sn", "Sm*"),
        ])
    }

    #[test]
    fn test_structured_shape() {
        let structured = to_structured(&sample());
        assert_eq!(
            structured,
            json!({"and": [
                {"objectClass": "user"},
                {"not": {"userAccountControl:1.2.840.113556.1.4.803:": 2}},
                {"or": [{"department": "Sales"}, {"manager": null}]},
                {"nor": [{"cn": "krbtgt"}]},
                {"objectGUID": {"base64": "AQI="}},
                {"not": {"mail": null}},
                {"sn": {"pattern": "Sm*"}}
            ]})
        );
    }

    #[test]
    fn test_structured_round_trip_is_idempotent() {
        let once = to_structured(&sample());
        let parsed = from_structured(&once).unwrap();
        assert_eq!(parsed, sample());
        assert_eq!(to_structured(&parsed), once);
    }

    #[test]
    fn test_not_leaf_keeps_inner_value() {
        let filter = FilterStatement::equal("objectClass", "group").negate();
        assert_eq!(
            to_structured(&filter),
            json!({"not": {"objectClass": "group"}})
        );
        let parsed = from_structured(&json!({"not": {"objectClass": "group"}})).unwrap();
        assert_eq!(parsed.render(), "(!(objectClass=group))");
    }

    #[test]
    fn test_not_of_compound_is_malformed() {
        let err = from_structured(&json!({"not": {"and": [{"cn": "a"}]}})).unwrap_err();
        assert!(matches!(err, DirectoryError::MalformedFilter { .. }));
    }

    #[test]
    fn test_malformed_inputs() {
        let cases = [
            json!([]),
            json!({}),
            json!({"cn": "a", "sn": "b"}),
            json!({"and": {"cn": "a"}}),
            json!({"and": []}),
            json!({"cn": [1, 2]}),
            json!({"cn": 1.5}),
            json!({"cn:9.9.9:": 1}),
            json!({"cn)(x": "y"}),
            json!({"objectGUID": {"base64": "!!"}}),
        ];
        for case in cases {
            assert!(
                matches!(
                    from_structured(&case),
                    Err(DirectoryError::MalformedFilter { .. })
                ),
                "expected {case} to be malformed"
            );
        }
    }

    #[test]
    fn test_structured_empty_string_is_absence() {
        let parsed = from_structured(&json!({"manager": ""})).unwrap();
        assert_eq!(parsed.render(), "(!(manager=*))");
        assert_eq!(to_structured(&parsed), json!({"not": {"manager": null}}));
    }

    #[test]
    fn test_plain_string_wildcard_is_literal() {
        let parsed = from_structured(&json!({"cn": "*)(objectClass=*"})).unwrap();
        assert_eq!(parsed.render(), "(cn=\\2a\\29\\28objectClass=\\2a)");

        let parsed = from_structured(&json!({"cn": {"pattern": "adm*"}})).unwrap();
        assert_eq!(parsed.render(), "(cn=adm*)");
        assert!(from_structured(&json!({"cn": {"pattern": 1}})).is_err());
    }

    #[test]
    fn test_structured_dedups_children() {
        let parsed = from_structured(&json!({"or": [{"cn": "A"}, {"CN": "a"}]})).unwrap();
        assert_eq!(parsed.children().len(), 1);
    }
}

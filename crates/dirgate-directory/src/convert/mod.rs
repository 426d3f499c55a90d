//! Attribute value conversion
//!
//! A [`ConverterRegistry`] turns raw protocol values into the JSON shapes
//! returned to callers and back again. Lookup goes by attribute name first,
//! then by the attribute's [`ValueKind`], then falls back to a generic
//! pass-through.

pub mod filetime;
pub mod flags;
pub mod guid;
pub mod proxy_address;
pub mod sid;

use std::collections::HashMap;
use std::sync::Arc;

use base64::Engine;
use serde_json::Value;
use tracing::warn;

use crate::error::{DirectoryError, DirectoryResult};
use crate::name_key::{query, NameKey};
use crate::schema::{SchemaCatalog, ValueKind};
use crate::value::{AttributeValue, RawValue};

pub use filetime::{FileTimeConverter, GeneralizedTimeConverter};
pub use flags::{FlagsConverter, UserAccountControl};
pub use guid::GuidConverter;
pub use proxy_address::{ProxyAddress, ProxyAddressConverter, ProxyAddressList};
pub use sid::SidConverter;

/// Bidirectional conversion for the values of one attribute family.
///
/// Both directions are pure; the attribute name is only carried into
/// errors.
pub trait ValueConverter: Send + Sync {
    /// Render a single raw value for a response.
    fn to_external(&self, attribute: &str, raw: &RawValue) -> DirectoryResult<Value>;

    /// Turn a single external value into its protocol form.
    fn to_protocol(&self, attribute: &str, value: &Value) -> DirectoryResult<AttributeValue>;

    /// Render every raw value of an attribute, one result per value.
    fn to_external_list(&self, attribute: &str, raws: &[RawValue]) -> Vec<DirectoryResult<Value>> {
        raws.iter()
            .map(|raw| self.to_external(attribute, raw))
            .collect()
    }

    /// Turn an external payload into protocol values. Arrays fan out into
    /// one value per element.
    fn to_protocol_list(&self, attribute: &str, value: &Value) -> DirectoryResult<Vec<AttributeValue>> {
        match value {
            Value::Array(items) => items
                .iter()
                .map(|item| self.to_protocol(attribute, item))
                .collect(),
            single => Ok(vec![self.to_protocol(attribute, single)?]),
        }
    }
}

/// Text passes through, non-UTF-8 binary becomes base64.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThroughConverter;

impl ValueConverter for PassThroughConverter {
    fn to_external(&self, _attribute: &str, raw: &RawValue) -> DirectoryResult<Value> {
        Ok(raw.pass_through())
    }

    fn to_protocol(&self, attribute: &str, value: &Value) -> DirectoryResult<AttributeValue> {
        AttributeValue::from_json(value).ok_or_else(|| {
            DirectoryError::conversion(attribute, "expected a string, number or boolean")
        })
    }
}

/// `TRUE`/`FALSE` <-> JSON booleans.
#[derive(Debug, Clone, Copy, Default)]
pub struct BooleanConverter;

impl ValueConverter for BooleanConverter {
    fn to_external(&self, attribute: &str, raw: &RawValue) -> DirectoryResult<Value> {
        match raw.as_text().map(str::trim) {
            Some(text) if text.eq_ignore_ascii_case("true") => Ok(Value::Bool(true)),
            Some(text) if text.eq_ignore_ascii_case("false") => Ok(Value::Bool(false)),
            _ => Err(DirectoryError::conversion(attribute, "expected TRUE or FALSE")),
        }
    }

    fn to_protocol(&self, attribute: &str, value: &Value) -> DirectoryResult<AttributeValue> {
        match value {
            Value::Bool(b) => Ok(AttributeValue::Boolean(*b)),
            Value::String(s) if s.eq_ignore_ascii_case("true") => Ok(AttributeValue::Boolean(true)),
            Value::String(s) if s.eq_ignore_ascii_case("false") => Ok(AttributeValue::Boolean(false)),
            _ => Err(DirectoryError::conversion(attribute, "expected a boolean")),
        }
    }
}

/// Decimal integer text <-> JSON numbers.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntegerConverter;

impl ValueConverter for IntegerConverter {
    fn to_external(&self, attribute: &str, raw: &RawValue) -> DirectoryResult<Value> {
        parse_integer(attribute, raw).map(Value::from)
    }

    fn to_protocol(&self, attribute: &str, value: &Value) -> DirectoryResult<AttributeValue> {
        json_integer(attribute, value).map(AttributeValue::Integer)
    }
}

/// Octet strings <-> base64 text.
#[derive(Debug, Clone, Copy, Default)]
pub struct ByteArrayConverter;

impl ValueConverter for ByteArrayConverter {
    fn to_external(&self, _attribute: &str, raw: &RawValue) -> DirectoryResult<Value> {
        Ok(Value::String(
            base64::engine::general_purpose::STANDARD.encode(raw.as_bytes()),
        ))
    }

    fn to_protocol(&self, attribute: &str, value: &Value) -> DirectoryResult<AttributeValue> {
        let Value::String(encoded) = value else {
            return Err(DirectoryError::conversion(attribute, "expected base64 text"));
        };
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map(AttributeValue::Binary)
            .map_err(|e| DirectoryError::conversion(attribute, format!("invalid base64: {e}")))
    }
}

/// Parse a raw value as a decimal `i64`.
pub(crate) fn parse_integer(attribute: &str, raw: &RawValue) -> DirectoryResult<i64> {
    let text = raw
        .as_text()
        .ok_or_else(|| DirectoryError::conversion(attribute, "integer value is not text"))?;
    text.trim()
        .parse::<i64>()
        .map_err(|_| DirectoryError::conversion(attribute, format!("'{text}' is not an integer")))
}

/// Accept a JSON number or a numeric string.
pub(crate) fn json_integer(attribute: &str, value: &Value) -> DirectoryResult<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| DirectoryError::conversion(attribute, format!("{n} is not an integer"))),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| DirectoryError::conversion(attribute, format!("'{s}' is not an integer"))),
        _ => Err(DirectoryError::conversion(attribute, "expected an integer")),
    }
}

/// Explicit registration table of value converters.
///
/// Built once during startup and shared read-only behind an `Arc`.
#[derive(Clone)]
pub struct ConverterRegistry {
    by_name: HashMap<NameKey, Arc<dyn ValueConverter>>,
    by_kind: HashMap<ValueKind, Arc<dyn ValueConverter>>,
    fallback: Arc<dyn ValueConverter>,
}

impl std::fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.by_name.keys().map(NameKey::as_str).collect();
        names.sort_unstable();
        let mut kinds: Vec<&str> = self.by_kind.keys().map(ValueKind::as_str).collect();
        kinds.sort_unstable();
        f.debug_struct("ConverterRegistry")
            .field("attributes", &names)
            .field("kinds", &kinds)
            .finish()
    }
}

impl Default for ConverterRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl ConverterRegistry {
    /// A registry with nothing registered: every attribute passes through.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            by_name: HashMap::new(),
            by_kind: HashMap::new(),
            fallback: Arc::new(PassThroughConverter),
        }
    }

    /// The built-in Active Directory converters.
    #[must_use]
    pub fn with_defaults() -> Self {
        let sid: Arc<dyn ValueConverter> = Arc::new(SidConverter);
        let guid: Arc<dyn ValueConverter> = Arc::new(GuidConverter);
        let file_time: Arc<dyn ValueConverter> = Arc::new(FileTimeConverter);
        let generalized: Arc<dyn ValueConverter> = Arc::new(GeneralizedTimeConverter);

        let mut registry = Self::empty()
            .with_kind(ValueKind::Sid, Arc::clone(&sid))
            .with_kind(ValueKind::Guid, Arc::clone(&guid))
            .with_kind(ValueKind::DateTime, Arc::clone(&generalized))
            .with_kind(ValueKind::Bool, Arc::new(BooleanConverter))
            .with_kind(ValueKind::Int, Arc::new(IntegerConverter))
            .with_kind(ValueKind::Long, Arc::new(IntegerConverter))
            .with_kind(ValueKind::ByteArray, Arc::new(ByteArrayConverter));

        for name in ["objectSid", "securityIdentifier", "sIDHistory"] {
            registry.register_attribute(name, Arc::clone(&sid));
        }
        registry.register_attribute("objectGUID", guid);
        for name in filetime::FILE_TIME_ATTRIBUTES {
            registry.register_attribute(name, Arc::clone(&file_time));
        }
        for name in ["whenCreated", "whenChanged"] {
            registry.register_attribute(name, Arc::clone(&generalized));
        }
        registry.register_attribute("userAccountControl", Arc::new(FlagsConverter::user_account_control()));
        registry.register_attribute("groupType", Arc::new(FlagsConverter::group_type()));
        registry.register_attribute("sAMAccountType", Arc::new(FlagsConverter::sam_account_type()));
        registry.register_attribute("proxyAddresses", Arc::new(ProxyAddressConverter));

        registry
    }

    /// Register a converter for one attribute (case-insensitive).
    pub fn register_attribute(&mut self, attribute: &str, converter: Arc<dyn ValueConverter>) {
        self.by_name.insert(NameKey::new(attribute), converter);
    }

    /// Register a converter for every attribute of a value kind.
    pub fn register_kind(&mut self, kind: ValueKind, converter: Arc<dyn ValueConverter>) {
        self.by_kind.insert(kind, converter);
    }

    /// Register a kind converter using builder pattern.
    #[must_use]
    pub fn with_kind(mut self, kind: ValueKind, converter: Arc<dyn ValueConverter>) -> Self {
        self.register_kind(kind, converter);
        self
    }

    /// Register an attribute converter using builder pattern.
    #[must_use]
    pub fn with_attribute(mut self, attribute: &str, converter: Arc<dyn ValueConverter>) -> Self {
        self.register_attribute(attribute, converter);
        self
    }

    /// Resolve the converter for an attribute: name, then kind, then
    /// pass-through.
    pub fn resolve(&self, attribute: &str, kind: Option<ValueKind>) -> &dyn ValueConverter {
        self.by_name
            .get(query(&attribute))
            .or_else(|| kind.and_then(|k| self.by_kind.get(&k)))
            .unwrap_or(&self.fallback)
            .as_ref()
    }

    /// Convert one raw value for a response.
    pub fn convert(
        &self,
        attribute: &str,
        kind: Option<ValueKind>,
        raw: &RawValue,
    ) -> DirectoryResult<Value> {
        self.resolve(attribute, kind).to_external(attribute, raw)
    }

    /// Convert all raw values of an attribute, one result per value.
    pub fn convert_values(
        &self,
        attribute: &str,
        kind: Option<ValueKind>,
        raws: &[RawValue],
    ) -> Vec<DirectoryResult<Value>> {
        self.resolve(attribute, kind).to_external_list(attribute, raws)
    }

    /// Reverse path used by create and edit.
    pub fn to_protocol(
        &self,
        attribute: &str,
        kind: Option<ValueKind>,
        value: &Value,
    ) -> DirectoryResult<Vec<AttributeValue>> {
        self.resolve(attribute, kind).to_protocol_list(attribute, value)
    }

    /// Reverse path producing wire values directly.
    pub fn to_raw(
        &self,
        attribute: &str,
        kind: Option<ValueKind>,
        value: &Value,
    ) -> DirectoryResult<Vec<RawValue>> {
        Ok(self
            .to_protocol(attribute, kind, value)?
            .iter()
            .map(AttributeValue::to_raw)
            .collect())
    }

    /// Render the raw values of one response attribute.
    ///
    /// One value yields a scalar, several an array, none `None`. A value that
    /// fails to convert is logged and passed through unconverted so the rest
    /// of the entry survives.
    pub fn convert_for_response(
        &self,
        schema: &SchemaCatalog,
        attribute: &str,
        raws: &[RawValue],
    ) -> Option<Value> {
        let kind = schema.value_kind(attribute);
        let mut values: Vec<Value> = self
            .convert_values(attribute, kind, raws)
            .into_iter()
            .zip(raws)
            .map(|(converted, raw)| {
                converted.unwrap_or_else(|err| {
                    warn!(attribute = %attribute, error = %err, "Passing raw value through");
                    raw.pass_through()
                })
            })
            .collect();

        match values.len() {
            0 => None,
            1 => values.pop(),
            _ => Some(Value::Array(values)),
        }
    }
}

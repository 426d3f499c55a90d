//! `proxyAddresses` conversion.
//!
//! Each value is `<type>:<address>`; an all-uppercase type prefix marks the
//! primary address (`SMTP:jane@example.com`). A list holds at most one
//! primary record.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;

use super::ValueConverter;
use crate::error::{DirectoryError, DirectoryResult};
use crate::value::{AttributeValue, RawValue};

/// One proxy address record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyAddress {
    /// Address type, lowercase (`smtp`, `x500`, `sip`).
    #[serde(rename = "type")]
    pub address_type: String,
    pub address: String,
    #[serde(default)]
    pub is_primary: bool,
}

impl ProxyAddress {
    pub fn new(address_type: impl Into<String>, address: impl Into<String>, is_primary: bool) -> Self {
        Self {
            address_type: address_type.into().to_ascii_lowercase(),
            address: address.into(),
            is_primary,
        }
    }

    /// Parse the stored `<type>:<address>` form.
    pub fn parse(value: &str) -> Result<Self, String> {
        let (prefix, address) = value
            .split_once(':')
            .ok_or_else(|| format!("'{value}' has no address type prefix"))?;
        if prefix.is_empty() || address.is_empty() {
            return Err(format!("'{value}' is not a '<type>:<address>' pair"));
        }
        let is_primary =
            prefix.chars().any(char::is_alphabetic) && !prefix.chars().any(char::is_lowercase);
        Ok(Self::new(prefix, address, is_primary))
    }

    /// Stored form, uppercase prefix for the primary.
    #[must_use]
    pub fn to_stored(&self) -> String {
        let prefix = if self.is_primary {
            self.address_type.to_ascii_uppercase()
        } else {
            self.address_type.to_ascii_lowercase()
        };
        format!("{prefix}:{}", self.address)
    }

    fn matches_address(&self, candidate: &str) -> bool {
        match candidate.split_once(':') {
            Some((prefix, address)) => {
                prefix.eq_ignore_ascii_case(&self.address_type)
                    && address.eq_ignore_ascii_case(&self.address)
            }
            None => candidate.eq_ignore_ascii_case(&self.address),
        }
    }
}

/// An ordered proxy address list with at most one primary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProxyAddressList(Vec<ProxyAddress>);

impl ProxyAddressList {
    /// Parse stored values. The first primary wins; later ones are demoted.
    pub fn parse<'a>(values: impl IntoIterator<Item = &'a str>) -> Result<Self, String> {
        let mut list = Vec::new();
        let mut seen_primary = false;
        for value in values {
            let mut record = ProxyAddress::parse(value)?;
            if record.is_primary {
                if seen_primary {
                    warn!(address = %record.address, "Demoting second primary proxy address");
                    record.is_primary = false;
                }
                seen_primary = true;
            }
            list.push(record);
        }
        Ok(Self(list))
    }

    /// Build from records, rejecting more than one primary.
    pub fn from_records(records: Vec<ProxyAddress>) -> Result<Self, String> {
        let primaries = records.iter().filter(|r| r.is_primary).count();
        if primaries > 1 {
            return Err(format!("{primaries} primary proxy addresses given, at most one allowed"));
        }
        Ok(Self(records))
    }

    #[must_use]
    pub fn primary(&self) -> Option<&ProxyAddress> {
        self.0.iter().find(|r| r.is_primary)
    }

    /// Make `address` (with or without type prefix) the primary record.
    pub fn set_primary(&mut self, address: &str) -> Result<(), String> {
        let target = self
            .0
            .iter()
            .position(|r| r.matches_address(address))
            .ok_or_else(|| format!("no proxy address '{address}'"))?;
        for (index, record) in self.0.iter_mut().enumerate() {
            record.is_primary = index == target;
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProxyAddress> {
        self.0.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Stored values in list order.
    #[must_use]
    pub fn to_stored(&self) -> Vec<String> {
        self.0.iter().map(ProxyAddress::to_stored).collect()
    }
}

/// `proxyAddresses` <-> `{type, address, isPrimary}` records.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProxyAddressConverter;

fn record_to_value(record: &ProxyAddress) -> Value {
    json!({
        "type": record.address_type,
        "address": record.address,
        "isPrimary": record.is_primary,
    })
}

impl ProxyAddressConverter {
    fn record_from_value(attribute: &str, value: &Value) -> DirectoryResult<ProxyAddress> {
        match value {
            Value::String(stored) => {
                ProxyAddress::parse(stored).map_err(|message| DirectoryError::conversion(attribute, message))
            }
            Value::Object(_) => serde_json::from_value::<ProxyAddress>(value.clone())
                .map(|r| ProxyAddress::new(r.address_type, r.address, r.is_primary))
                .map_err(|e| DirectoryError::conversion(attribute, format!("invalid proxy address record: {e}"))),
            _ => Err(DirectoryError::conversion(
                attribute,
                "expected a proxy address record or '<type>:<address>' string",
            )),
        }
    }
}

impl ValueConverter for ProxyAddressConverter {
    fn to_external(&self, attribute: &str, raw: &RawValue) -> DirectoryResult<Value> {
        let text = raw
            .as_text()
            .ok_or_else(|| DirectoryError::conversion(attribute, "proxy address is not text"))?;
        ProxyAddress::parse(text)
            .map(|r| record_to_value(&r))
            .map_err(|message| DirectoryError::conversion(attribute, message))
    }

    fn to_protocol(&self, attribute: &str, value: &Value) -> DirectoryResult<AttributeValue> {
        Self::record_from_value(attribute, value).map(|r| AttributeValue::String(r.to_stored()))
    }

    fn to_external_list(&self, attribute: &str, raws: &[RawValue]) -> Vec<DirectoryResult<Value>> {
        let mut seen_primary = false;
        raws.iter()
            .map(|raw| {
                let mut value = self.to_external(attribute, raw)?;
                if value.get("isPrimary") == Some(&Value::Bool(true)) {
                    if seen_primary {
                        warn!(attribute = %attribute, "Demoting second primary proxy address");
                        value["isPrimary"] = Value::Bool(false);
                    }
                    seen_primary = true;
                }
                Ok(value)
            })
            .collect()
    }

    fn to_protocol_list(&self, attribute: &str, value: &Value) -> DirectoryResult<Vec<AttributeValue>> {
        let records = match value {
            Value::Array(items) => items
                .iter()
                .map(|item| Self::record_from_value(attribute, item))
                .collect::<DirectoryResult<Vec<_>>>()?,
            single => vec![Self::record_from_value(attribute, single)?],
        };
        let list = ProxyAddressList::from_records(records)
            .map_err(|message| DirectoryError::conversion(attribute, message))?;
        Ok(list.to_stored().into_iter().map(AttributeValue::String).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored() -> Vec<RawValue> {
        vec![
            RawValue::from("smtp:jane.doe@old.example.com"),
            RawValue::from("SMTP:jane.doe@example.com"),
            RawValue::from("X500:/o=Example/cn=jdoe"),
        ]
    }

    #[test]
    fn test_parse_record() {
        let record = ProxyAddress::parse("SMTP:jane.doe@example.com").unwrap();
        assert_eq!(record.address_type, "smtp");
        assert!(record.is_primary);
        assert_eq!(
            record_to_value(&record),
            json!({"type": "smtp", "address": "jane.doe@example.com", "isPrimary": true})
        );
        assert!(ProxyAddress::parse("no-prefix").is_err());
    }

    #[test]
    fn test_only_first_primary_survives_read() {
        let values: Vec<Value> = ProxyAddressConverter
            .to_external_list("proxyAddresses", &stored())
            .into_iter()
            .map(Result::unwrap)
            .collect();
        let primaries: Vec<&Value> = values
            .iter()
            .filter(|v| v["isPrimary"] == json!(true))
            .collect();
        assert_eq!(primaries.len(), 1);
        assert_eq!(primaries[0]["address"], json!("jane.doe@example.com"));
        assert_eq!(values[2]["isPrimary"], json!(false));
    }

    #[test]
    fn test_write_rejects_two_primaries() {
        let payload = json!([
            {"type": "smtp", "address": "a@example.com", "isPrimary": true},
            {"type": "smtp", "address": "b@example.com", "isPrimary": true}
        ]);
        let err = ProxyAddressConverter
            .to_protocol_list("proxyAddresses", &payload)
            .unwrap_err();
        assert!(matches!(err, DirectoryError::ConversionFailure { .. }));
    }

    #[test]
    fn test_write_renders_prefix_case() {
        let payload = json!([
            {"type": "SMTP", "address": "a@example.com", "isPrimary": true},
            {"type": "smtp", "address": "b@example.com"},
            "sip:a@example.com"
        ]);
        assert_eq!(
            ProxyAddressConverter
                .to_protocol_list("proxyAddresses", &payload)
                .unwrap(),
            vec![
                AttributeValue::from("SMTP:a@example.com"),
                AttributeValue::from("smtp:b@example.com"),
                AttributeValue::from("sip:a@example.com"),
            ]
        );
    }

    #[test]
    fn test_set_primary_moves_primary() {
        let mut list = ProxyAddressList::parse([
            "SMTP:jane.doe@example.com",
            "smtp:jane.doe@old.example.com",
            "sip:jane.doe@example.com",
        ])
        .unwrap();
        assert_eq!(list.primary().unwrap().address, "jane.doe@example.com");

        list.set_primary("smtp:Jane.Doe@old.example.com").unwrap();
        assert_eq!(list.primary().unwrap().address, "jane.doe@old.example.com");
        assert_eq!(list.iter().filter(|r| r.is_primary).count(), 1);
        assert_eq!(
            list.to_stored(),
            vec![
                "smtp:jane.doe@example.com",
                "SMTP:jane.doe@old.example.com",
                "sip:jane.doe@example.com",
            ]
        );

        assert!(list.set_primary("nobody@example.com").is_err());
        assert_eq!(list.primary().unwrap().address, "jane.doe@old.example.com");
    }
}

//! GUID conversion.
//!
//! Active Directory stores GUIDs in the mixed-endian layout used by
//! Windows: the first three fields little-endian, the rest as-is.

use serde_json::Value;
use uuid::Uuid;

use super::ValueConverter;
use crate::error::{DirectoryError, DirectoryResult};
use crate::value::{AttributeValue, RawValue};

/// Render stored GUID bytes as a dashed lowercase hex string.
pub fn guid_to_string(bytes: &[u8]) -> Result<String, String> {
    let bytes: [u8; 16] = bytes
        .try_into()
        .map_err(|_| format!("GUID must be 16 bytes, got {}", bytes.len()))?;
    Ok(Uuid::from_bytes_le(bytes).hyphenated().to_string())
}

/// Parse a GUID string (braces optional) into stored byte order.
pub fn guid_from_string(text: &str) -> Result<Vec<u8>, String> {
    let trimmed = text.trim().trim_start_matches('{').trim_end_matches('}');
    Uuid::parse_str(trimmed)
        .map(|guid| guid.to_bytes_le().to_vec())
        .map_err(|e| format!("'{text}' is not a GUID: {e}"))
}

/// Converts `objectGUID`-style attributes.
#[derive(Debug, Clone, Copy, Default)]
pub struct GuidConverter;

impl ValueConverter for GuidConverter {
    fn to_external(&self, attribute: &str, raw: &RawValue) -> DirectoryResult<Value> {
        let rendered = match raw {
            // Some servers hand back the text form already.
            RawValue::Text(text) if text.len() >= 32 => {
                guid_from_string(text).and_then(|bytes| guid_to_string(&bytes))
            }
            _ => guid_to_string(raw.as_bytes()),
        };
        rendered
            .map(Value::String)
            .map_err(|message| DirectoryError::conversion(attribute, message))
    }

    fn to_protocol(&self, attribute: &str, value: &Value) -> DirectoryResult<AttributeValue> {
        let Value::String(text) = value else {
            return Err(DirectoryError::conversion(
                attribute,
                "GUID must be given as a string",
            ));
        };
        guid_from_string(text)
            .map(AttributeValue::Binary)
            .map_err(|message| DirectoryError::conversion(attribute, message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const STORED: [u8; 16] = [
        0x33, 0x22, 0x11, 0x00, 0x55, 0x44, 0x77, 0x66, 0x88, 0x99, 0xaa, 0xbb, 0xcc, 0xdd, 0xee,
        0xff,
    ];

    #[test]
    fn test_guid_to_string() {
        assert_eq!(
            guid_to_string(&STORED).unwrap(),
            "00112233-4455-6677-8899-aabbccddeeff"
        );
    }

    #[test]
    fn test_guid_from_string_accepts_braces() {
        assert_eq!(
            guid_from_string("{00112233-4455-6677-8899-AABBCCDDEEFF}").unwrap(),
            STORED.to_vec()
        );
    }

    #[test]
    fn test_wrong_length_fails() {
        let err = GuidConverter
            .to_external("objectGUID", &RawValue::Binary(vec![0x01; 15]))
            .unwrap_err();
        assert!(matches!(err, DirectoryError::ConversionFailure { .. }));
    }

    #[test]
    fn test_converter_round_trip() {
        let external = GuidConverter
            .to_external("objectGUID", &RawValue::Binary(STORED.to_vec()))
            .unwrap();
        assert_eq!(external, json!("00112233-4455-6677-8899-aabbccddeeff"));
        assert_eq!(
            GuidConverter.to_protocol("objectGUID", &external).unwrap(),
            AttributeValue::Binary(STORED.to_vec())
        );
    }
}

//! Security identifier conversion.
//!
//! Binary layout: revision (1 byte), sub-authority count (1 byte),
//! identifier authority (6 bytes, big-endian), then `count` sub-authorities
//! (4 bytes each, little-endian). Text form: `S-1-5-21-...`.

use serde_json::Value;

use super::ValueConverter;
use crate::error::{DirectoryError, DirectoryResult};
use crate::value::{AttributeValue, RawValue};

const HEADER_LEN: usize = 8;
const MAX_SUB_AUTHORITIES: usize = 15;

/// Render a binary SID as its `S-R-I-S...` string.
///
/// Trailing bytes past the declared sub-authorities are ignored; a buffer
/// shorter than the declared length fails.
pub fn sid_to_string(bytes: &[u8]) -> Result<String, String> {
    if bytes.len() < HEADER_LEN {
        return Err(format!(
            "SID must be at least {HEADER_LEN} bytes, got {}",
            bytes.len()
        ));
    }

    let revision = bytes[0];
    let count = bytes[1] as usize;
    if count > MAX_SUB_AUTHORITIES {
        return Err(format!(
            "SID declares {count} sub-authorities (max {MAX_SUB_AUTHORITIES})"
        ));
    }
    let expected = HEADER_LEN + count * 4;
    if bytes.len() < expected {
        return Err(format!(
            "SID truncated: {count} sub-authorities need {expected} bytes, got {}",
            bytes.len()
        ));
    }

    let authority = bytes[2..8]
        .iter()
        .fold(0u64, |acc, b| (acc << 8) | u64::from(*b));

    let mut sid = if authority >= 1 << 32 {
        format!("S-{revision}-0x{authority:012X}")
    } else {
        format!("S-{revision}-{authority}")
    };

    for chunk in bytes[HEADER_LEN..expected].chunks_exact(4) {
        let sub = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        sid.push('-');
        sid.push_str(&sub.to_string());
    }

    Ok(sid)
}

/// Parse an `S-R-I-S...` string into its binary form.
pub fn sid_from_string(sid: &str) -> Result<Vec<u8>, String> {
    let mut parts = sid.trim().split('-');

    match parts.next() {
        Some(prefix) if prefix.eq_ignore_ascii_case("S") => {}
        _ => return Err(format!("'{sid}' does not start with 'S-'")),
    }

    let revision: u8 = parts
        .next()
        .ok_or_else(|| format!("'{sid}' is missing the revision"))?
        .parse()
        .map_err(|_| format!("'{sid}' has an invalid revision"))?;

    let authority_text = parts
        .next()
        .ok_or_else(|| format!("'{sid}' is missing the identifier authority"))?;
    let authority = match authority_text
        .strip_prefix("0x")
        .or_else(|| authority_text.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => authority_text.parse::<u64>(),
    }
    .map_err(|_| format!("'{sid}' has an invalid identifier authority"))?;
    if authority >= 1 << 48 {
        return Err(format!("'{sid}' identifier authority exceeds 48 bits"));
    }

    let subs = parts
        .map(|p| {
            p.parse::<u32>()
                .map_err(|_| format!("'{sid}' has an invalid sub-authority '{p}'"))
        })
        .collect::<Result<Vec<u32>, String>>()?;
    if subs.len() > MAX_SUB_AUTHORITIES {
        return Err(format!("'{sid}' has more than {MAX_SUB_AUTHORITIES} sub-authorities"));
    }

    let mut bytes = Vec::with_capacity(HEADER_LEN + subs.len() * 4);
    bytes.push(revision);
    bytes.push(subs.len() as u8);
    bytes.extend_from_slice(&authority.to_be_bytes()[2..]);
    for sub in subs {
        bytes.extend_from_slice(&sub.to_le_bytes());
    }
    Ok(bytes)
}

/// Converts `objectSid`-style attributes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SidConverter;

impl ValueConverter for SidConverter {
    fn to_external(&self, attribute: &str, raw: &RawValue) -> DirectoryResult<Value> {
        sid_to_string(raw.as_bytes())
            .map(Value::String)
            .map_err(|message| DirectoryError::conversion(attribute, message))
    }

    fn to_protocol(&self, attribute: &str, value: &Value) -> DirectoryResult<AttributeValue> {
        let Value::String(text) = value else {
            return Err(DirectoryError::conversion(
                attribute,
                "SID must be given as an 'S-...' string",
            ));
        };
        sid_from_string(text)
            .map(AttributeValue::Binary)
            .map_err(|message| DirectoryError::conversion(attribute, message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // S-1-5-21-1004336348-1177238915-682003330-512
    const DOMAIN_ADMINS: [u8; 28] = [
        0x01, 0x05, 0x00, 0x00, 0x00, 0x00, 0x00, 0x05, 0x15, 0x00, 0x00, 0x00, 0xdc, 0xf4, 0xdc,
        0x3b, 0x83, 0x3d, 0x2b, 0x46, 0x82, 0x8b, 0xa6, 0x28, 0x00, 0x02, 0x00, 0x00,
    ];

    #[test]
    fn test_sid_to_string() {
        assert_eq!(
            sid_to_string(&DOMAIN_ADMINS).unwrap(),
            "S-1-5-21-1004336348-1177238915-682003330-512"
        );
    }

    #[test]
    fn test_well_known_sid() {
        // BUILTIN\Administrators
        let bytes = [
            0x01, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x05, 0x20, 0x00, 0x00, 0x00, 0x20, 0x02,
            0x00, 0x00,
        ];
        assert_eq!(sid_to_string(&bytes).unwrap(), "S-1-5-32-544");
    }

    #[test]
    fn test_sid_round_trip() {
        let text = "S-1-5-21-1004336348-1177238915-682003330-512";
        assert_eq!(sid_from_string(text).unwrap(), DOMAIN_ADMINS.to_vec());
    }

    #[test]
    fn test_truncated_sid_fails() {
        assert!(sid_to_string(&DOMAIN_ADMINS[..18]).is_err());
        assert!(sid_to_string(&[0x01, 0x05]).is_err());
    }

    #[test]
    fn test_trailing_bytes_ignored() {
        let mut padded = DOMAIN_ADMINS.to_vec();
        padded.extend_from_slice(&[0xAA, 0xBB]);
        assert_eq!(
            sid_to_string(&padded).unwrap(),
            "S-1-5-21-1004336348-1177238915-682003330-512"
        );
    }

    #[test]
    fn test_invalid_sid_strings() {
        assert!(sid_from_string("X-1-5-21").is_err());
        assert!(sid_from_string("S-1").is_err());
        assert!(sid_from_string("S-1-5-abc").is_err());
        assert!(sid_from_string("S-1-0x1000000000000-1").is_err());
    }

    #[test]
    fn test_converter_attribution() {
        let err = SidConverter
            .to_external("objectSid", &RawValue::Binary(vec![1, 5, 0]))
            .unwrap_err();
        assert_eq!(err.attribute(), Some("objectSid"));
        assert_eq!(err.error_code(), "CONVERSION_FAILURE");
    }
}

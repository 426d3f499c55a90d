//! Bit-flag and enumeration attributes.
//!
//! `userAccountControl` and `groupType` are bit sets rendered as arrays of
//! flag names; `sAMAccountType` is a plain enumeration rendered as one name.
//! Values are signed 32-bit integers on the wire, so `groupType` security
//! groups come back negative.

use serde_json::Value;

use super::{json_integer, parse_integer, ValueConverter};
use crate::error::{DirectoryError, DirectoryResult};
use crate::value::{AttributeValue, RawValue};

type FlagTable = &'static [(u32, &'static str)];

const USER_ACCOUNT_CONTROL_FLAGS: FlagTable = &[
    (0x0000_0001, "Script"),
    (0x0000_0002, "AccountDisabled"),
    (0x0000_0008, "HomeDirectoryRequired"),
    (0x0000_0010, "Lockout"),
    (0x0000_0020, "PasswordNotRequired"),
    (0x0000_0040, "PasswordCannotChange"),
    (0x0000_0080, "EncryptedTextPasswordAllowed"),
    (0x0000_0100, "TempDuplicateAccount"),
    (0x0000_0200, "NormalAccount"),
    (0x0000_0800, "InterdomainTrustAccount"),
    (0x0000_1000, "WorkstationTrustAccount"),
    (0x0000_2000, "ServerTrustAccount"),
    (0x0001_0000, "DontExpirePassword"),
    (0x0002_0000, "MnsLogonAccount"),
    (0x0004_0000, "SmartcardRequired"),
    (0x0008_0000, "TrustedForDelegation"),
    (0x0010_0000, "NotDelegated"),
    (0x0020_0000, "UseDesKeyOnly"),
    (0x0040_0000, "DontRequirePreauth"),
    (0x0080_0000, "PasswordExpired"),
    (0x0100_0000, "TrustedToAuthForDelegation"),
    (0x0400_0000, "PartialSecretsAccount"),
];

const GROUP_TYPE_FLAGS: FlagTable = &[
    (0x0000_0001, "BuiltinLocal"),
    (0x0000_0002, "GlobalScope"),
    (0x0000_0004, "DomainLocalScope"),
    (0x0000_0008, "UniversalScope"),
    (0x0000_0010, "AppBasic"),
    (0x0000_0020, "AppQuery"),
    (0x8000_0000, "Security"),
];

const SAM_ACCOUNT_TYPES: FlagTable = &[
    (0x0000_0000, "DomainObject"),
    (0x1000_0000, "GroupObject"),
    (0x1000_0001, "NonSecurityGroupObject"),
    (0x2000_0000, "AliasObject"),
    (0x2000_0001, "NonSecurityAliasObject"),
    (0x3000_0000, "NormalUserAccount"),
    (0x3000_0001, "MachineAccount"),
    (0x3000_0002, "TrustAccount"),
    (0x4000_0000, "AppBasicGroup"),
    (0x4000_0001, "AppQueryGroup"),
];

/// Named bit flags or enumeration values of one attribute.
#[derive(Debug, Clone, Copy)]
pub struct FlagsConverter {
    table: FlagTable,
    exclusive: bool,
}

impl FlagsConverter {
    /// `userAccountControl` bit set.
    #[must_use]
    pub fn user_account_control() -> Self {
        Self {
            table: USER_ACCOUNT_CONTROL_FLAGS,
            exclusive: false,
        }
    }

    /// `groupType` bit set.
    #[must_use]
    pub fn group_type() -> Self {
        Self {
            table: GROUP_TYPE_FLAGS,
            exclusive: false,
        }
    }

    /// `sAMAccountType` enumeration.
    #[must_use]
    pub fn sam_account_type() -> Self {
        Self {
            table: SAM_ACCOUNT_TYPES,
            exclusive: true,
        }
    }

    /// Decompose bits into names. Bits without a name are kept as one
    /// trailing number so the set round-trips exactly.
    #[must_use]
    pub fn names(&self, bits: u32) -> Vec<Value> {
        let mut residual = bits;
        let mut names: Vec<Value> = self
            .table
            .iter()
            .filter(|(flag, _)| bits & flag == *flag)
            .map(|(flag, name)| {
                residual &= !flag;
                Value::String((*name).to_string())
            })
            .collect();
        if residual != 0 {
            names.push(Value::from(residual));
        }
        names
    }

    fn lookup(&self, attribute: &str, name: &str) -> DirectoryResult<u32> {
        self.table
            .iter()
            .find(|(_, candidate)| candidate.eq_ignore_ascii_case(name))
            .map(|(flag, _)| *flag)
            .ok_or_else(|| DirectoryError::conversion(attribute, format!("unknown flag '{name}'")))
    }

    fn element_bits(&self, attribute: &str, value: &Value) -> DirectoryResult<u32> {
        match value {
            Value::String(name) if name.trim().parse::<i64>().is_err() => self.lookup(attribute, name),
            other => to_bits(attribute, json_integer(attribute, other)?),
        }
    }

    /// Combine an external value (array of names/numbers, single name, or
    /// plain number) into a bit set.
    pub fn combine(&self, attribute: &str, value: &Value) -> DirectoryResult<u32> {
        match value {
            Value::Array(items) => {
                if self.exclusive && items.len() != 1 {
                    return Err(DirectoryError::conversion(
                        attribute,
                        "expected exactly one enumeration value",
                    ));
                }
                items
                    .iter()
                    .try_fold(0u32, |bits, item| Ok(bits | self.element_bits(attribute, item)?))
            }
            other => self.element_bits(attribute, other),
        }
    }
}

impl ValueConverter for FlagsConverter {
    fn to_external(&self, attribute: &str, raw: &RawValue) -> DirectoryResult<Value> {
        let bits = to_bits(attribute, parse_integer(attribute, raw)?)?;
        if self.exclusive {
            return Ok(self
                .table
                .iter()
                .find(|(value, _)| *value == bits)
                .map(|(_, name)| Value::String((*name).to_string()))
                .unwrap_or_else(|| Value::from(bits)));
        }
        Ok(Value::Array(self.names(bits)))
    }

    fn to_protocol(&self, attribute: &str, value: &Value) -> DirectoryResult<AttributeValue> {
        let bits = self.combine(attribute, value)?;
        Ok(AttributeValue::Integer(i64::from(bits as i32)))
    }

    // An array is one flag set, not several values.
    fn to_protocol_list(&self, attribute: &str, value: &Value) -> DirectoryResult<Vec<AttributeValue>> {
        Ok(vec![self.to_protocol(attribute, value)?])
    }
}

/// Reinterpret a wire integer as a 32-bit set. Unsigned and signed
/// renderings of the same bits are both accepted; anything wider is not.
fn to_bits(attribute: &str, value: i64) -> DirectoryResult<u32> {
    u32::try_from(value)
        .or_else(|_| i32::try_from(value).map(|signed| signed as u32))
        .map_err(|_| DirectoryError::conversion(attribute, format!("{value} does not fit in 32 bits")))
}

/// Typed view over a `userAccountControl` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserAccountControl(u32);

impl UserAccountControl {
    pub const ACCOUNT_DISABLED: u32 = 0x0002;
    pub const NORMAL_ACCOUNT: u32 = 0x0200;
    pub const DONT_EXPIRE_PASSWORD: u32 = 0x0001_0000;

    /// Build from the wire value.
    pub fn from_value(value: i64) -> DirectoryResult<Self> {
        to_bits("userAccountControl", value).map(Self)
    }

    /// Signed wire value.
    #[must_use]
    pub fn value(&self) -> i64 {
        i64::from(self.0 as i32)
    }

    #[must_use]
    pub fn contains(&self, flag: u32) -> bool {
        self.0 & flag == flag
    }

    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.contains(Self::ACCOUNT_DISABLED)
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.is_disabled()
    }

    /// Set the disabled bit.
    #[must_use]
    pub fn disable(self) -> Self {
        Self(self.0 | Self::ACCOUNT_DISABLED)
    }

    /// Clear the disabled bit.
    #[must_use]
    pub fn enable(self) -> Self {
        Self(self.0 & !Self::ACCOUNT_DISABLED)
    }

    /// Flag names, as rendered in responses.
    #[must_use]
    pub fn names(&self) -> Vec<Value> {
        FlagsConverter::user_account_control().names(self.0)
    }
}

impl From<u32> for UserAccountControl {
    fn from(bits: u32) -> Self {
        Self(bits)
    }
}

impl From<UserAccountControl> for u32 {
    fn from(uac: UserAccountControl) -> Self {
        uac.0
    }
}

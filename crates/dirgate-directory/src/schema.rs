//! Attribute schema metadata and validation
//!
//! A [`SchemaCatalog`] holds one [`AttributeSchema`] per attribute of a
//! directory forest. Catalogs are loaded once per partition root during
//! startup through [`SchemaCacheBuilder`] and then frozen into a read-only
//! [`SchemaCache`] that request handlers share.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{DirectoryError, DirectoryResult, RangeBound};
use crate::name_key::{query, NameKey};
use crate::value::AttributeValue;

/// Value type of a directory attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    /// Unicode or printable string (also DNs).
    String,
    /// 32-bit integer.
    Int,
    /// 64-bit "large integer" (file times, intervals).
    Long,
    /// 16-byte GUID.
    Guid,
    /// Boolean (`TRUE`/`FALSE`).
    Bool,
    /// Generalized time.
    DateTime,
    /// Opaque octet string.
    ByteArray,
    /// Security identifier blob.
    Sid,
}

impl ValueKind {
    /// Get the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::String => "string",
            ValueKind::Int => "int",
            ValueKind::Long => "long",
            ValueKind::Guid => "guid",
            ValueKind::Bool => "bool",
            ValueKind::DateTime => "datetime",
            ValueKind::ByteArray => "bytearray",
            ValueKind::Sid => "sid",
        }
    }

    /// Map an `attributeSchema` syntax pair to a value kind.
    ///
    /// `attribute_name` disambiguates octet strings that hold GUIDs.
    #[must_use]
    pub fn from_syntax(attribute_syntax: &str, om_syntax: Option<i32>, attribute_name: &str) -> Self {
        match attribute_syntax {
            "2.5.5.8" => ValueKind::Bool,
            "2.5.5.9" => ValueKind::Int,
            "2.5.5.16" => ValueKind::Long,
            "2.5.5.11" => ValueKind::DateTime,
            "2.5.5.17" => ValueKind::Sid,
            "2.5.5.10" => {
                if attribute_name.to_ascii_lowercase().ends_with("guid") {
                    ValueKind::Guid
                } else {
                    ValueKind::ByteArray
                }
            }
            // Object(Replica-Link) and Object(DN-Binary) with binary oMSyntax
            "2.5.5.7" if om_syntax == Some(4) => ValueKind::ByteArray,
            _ => ValueKind::String,
        }
    }
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Schema metadata for a single attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeSchema {
    /// LDAP display name (e.g. "sAMAccountName").
    pub name: String,

    /// Value type.
    pub value_kind: ValueKind,

    /// Whether the attribute holds more than one value.
    #[serde(default)]
    pub multi_valued: bool,

    /// Declared lower bound (value for numbers, length for strings).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range_lower: Option<i64>,

    /// Declared upper bound (value for numbers, length for strings).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range_upper: Option<i64>,
}

impl AttributeSchema {
    /// Create a single-valued attribute without range constraints.
    pub fn new(name: impl Into<String>, value_kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            value_kind,
            multi_valued: false,
            range_lower: None,
            range_upper: None,
        }
    }

    /// Mark this attribute as multi-valued.
    #[must_use]
    pub fn multi_valued(mut self) -> Self {
        self.multi_valued = true;
        self
    }

    /// Set the declared range.
    #[must_use]
    pub fn with_range(mut self, lower: Option<i64>, upper: Option<i64>) -> Self {
        self.range_lower = lower;
        self.range_upper = upper;
        self
    }

    /// Check a single candidate value against the declared range.
    pub fn check(&self, candidate: &AttributeValue) -> DirectoryResult<()> {
        let Some(measure) = candidate.range_measure() else {
            return Ok(());
        };

        if let Some(lower) = self.range_lower {
            if measure < lower {
                return Err(DirectoryError::ValueOutOfRange {
                    attribute: self.name.clone(),
                    bound: RangeBound::Lower(lower),
                    actual: measure,
                });
            }
        }
        if let Some(upper) = self.range_upper {
            if measure > upper {
                return Err(DirectoryError::ValueOutOfRange {
                    attribute: self.name.clone(),
                    bound: RangeBound::Upper(upper),
                    actual: measure,
                });
            }
        }
        Ok(())
    }
}

/// All attribute definitions of one directory forest.
#[derive(Debug, Clone, Default)]
pub struct SchemaCatalog {
    attributes: HashMap<NameKey, AttributeSchema>,
}

impl SchemaCatalog {
    /// Create an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an attribute definition.
    pub fn insert(&mut self, attribute: AttributeSchema) {
        self.attributes
            .insert(NameKey::new(attribute.name.clone()), attribute);
    }

    /// Add an attribute definition using builder pattern.
    #[must_use]
    pub fn with(mut self, attribute: AttributeSchema) -> Self {
        self.insert(attribute);
        self
    }

    /// Look up an attribute, ignoring case.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&AttributeSchema> {
        self.attributes.get(query(&name))
    }

    /// Check whether the attribute is defined.
    #[must_use]
    pub fn is_attribute_known(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Value kind of an attribute, if known.
    #[must_use]
    pub fn value_kind(&self, name: &str) -> Option<ValueKind> {
        self.get(name).map(|a| a.value_kind)
    }

    /// Validate a candidate against the attribute's declared range.
    ///
    /// Unknown attributes fail with [`DirectoryError::UnknownAttribute`];
    /// attributes without a declared range accept any value.
    pub fn range_check(&self, name: &str, candidate: &AttributeValue) -> DirectoryResult<()> {
        self.get(name)
            .ok_or_else(|| DirectoryError::UnknownAttribute {
                attribute: name.to_string(),
            })?
            .check(candidate)
    }

    /// Number of attributes in the catalog.
    #[must_use]
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Check if the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Iterate over all attribute definitions.
    pub fn iter(&self) -> impl Iterator<Item = &AttributeSchema> {
        self.attributes.values()
    }

    /// Built-in Active Directory attribute definitions.
    ///
    /// Used when the live schema cannot be read and as the baseline for
    /// tests. Ranges follow the AD schema, except `sAMAccountName` which is
    /// held to the 20-character pre-Windows 2000 logon name limit.
    #[must_use]
    pub fn active_directory_defaults() -> Self {
        AD_DEFAULT_ATTRIBUTES
            .iter()
            .map(|(name, kind, multi, lower, upper)| {
                let attribute = AttributeSchema::new(*name, *kind).with_range(*lower, *upper);
                if *multi {
                    attribute.multi_valued()
                } else {
                    attribute
                }
            })
            .collect()
    }
}

impl FromIterator<AttributeSchema> for SchemaCatalog {
    fn from_iter<T: IntoIterator<Item = AttributeSchema>>(iter: T) -> Self {
        let mut catalog = SchemaCatalog::new();
        for attribute in iter {
            catalog.insert(attribute);
        }
        catalog
    }
}

/// Format: (name, kind, multi_valued, range_lower, range_upper)
type AttributeRow = (&'static str, ValueKind, bool, Option<i64>, Option<i64>);

const AD_DEFAULT_ATTRIBUTES: &[AttributeRow] = &[
    // Identity
    ("distinguishedName", ValueKind::String, false, None, None),
    ("objectClass", ValueKind::String, true, None, None),
    ("objectCategory", ValueKind::String, false, None, None),
    ("objectGUID", ValueKind::Guid, false, None, None),
    ("objectSid", ValueKind::Sid, false, None, None),
    ("sIDHistory", ValueKind::Sid, true, None, None),
    ("cn", ValueKind::String, false, Some(1), Some(64)),
    ("name", ValueKind::String, false, Some(1), Some(255)),
    ("sAMAccountName", ValueKind::String, false, Some(0), Some(20)),
    ("sAMAccountType", ValueKind::Int, false, None, None),
    ("userPrincipalName", ValueKind::String, false, Some(0), Some(1024)),
    // Person
    ("displayName", ValueKind::String, false, Some(0), Some(256)),
    ("givenName", ValueKind::String, false, Some(1), Some(64)),
    ("sn", ValueKind::String, false, Some(1), Some(64)),
    ("initials", ValueKind::String, false, Some(1), Some(6)),
    ("description", ValueKind::String, true, Some(0), Some(1024)),
    ("mail", ValueKind::String, false, Some(0), Some(256)),
    ("telephoneNumber", ValueKind::String, false, Some(1), Some(64)),
    ("mobile", ValueKind::String, false, Some(1), Some(64)),
    ("otherTelephone", ValueKind::String, true, Some(1), Some(64)),
    ("title", ValueKind::String, false, Some(1), Some(128)),
    ("department", ValueKind::String, false, Some(1), Some(64)),
    ("company", ValueKind::String, false, Some(1), Some(64)),
    ("employeeID", ValueKind::String, false, Some(0), Some(16)),
    ("employeeNumber", ValueKind::String, false, Some(1), Some(512)),
    ("manager", ValueKind::String, false, None, None),
    ("proxyAddresses", ValueKind::String, true, Some(1), Some(1123)),
    ("info", ValueKind::String, false, Some(1), Some(1024)),
    // Account state
    ("userAccountControl", ValueKind::Int, false, None, None),
    ("accountExpires", ValueKind::Long, false, None, None),
    ("pwdLastSet", ValueKind::Long, false, None, None),
    ("lastLogon", ValueKind::Long, false, None, None),
    ("lastLogonTimestamp", ValueKind::Long, false, None, None),
    ("badPasswordTime", ValueKind::Long, false, None, None),
    ("badPwdCount", ValueKind::Int, false, None, None),
    ("lockoutTime", ValueKind::Long, false, None, None),
    ("logonCount", ValueKind::Int, false, None, None),
    ("unicodePwd", ValueKind::ByteArray, false, None, None),
    // Groups
    ("groupType", ValueKind::Int, false, None, None),
    ("member", ValueKind::String, true, None, None),
    ("memberOf", ValueKind::String, true, None, None),
    ("managedBy", ValueKind::String, false, None, None),
    // Housekeeping
    ("whenCreated", ValueKind::DateTime, false, None, None),
    ("whenChanged", ValueKind::DateTime, false, None, None),
    ("uSNChanged", ValueKind::Long, false, None, None),
    ("uSNCreated", ValueKind::Long, false, None, None),
    ("isDeleted", ValueKind::Bool, false, None, None),
    ("isCriticalSystemObject", ValueKind::Bool, false, None, None),
    ("ou", ValueKind::String, true, Some(1), Some(64)),
    ("dNSHostName", ValueKind::String, false, Some(0), Some(2048)),
    ("operatingSystem", ValueKind::String, false, Some(0), Some(256)),
];

/// A place a schema catalog can be read from (typically a live directory).
#[async_trait]
pub trait SchemaSource: Send + Sync {
    /// Identity of the partition root this source's schema belongs to.
    ///
    /// Two sources reporting the same root share one cached catalog.
    async fn partition_root(&self) -> DirectoryResult<String>;

    /// Read the full attribute catalog.
    async fn load_schema(&self) -> DirectoryResult<SchemaCatalog>;
}

/// Single-writer startup phase of the schema cache.
#[derive(Debug, Default)]
pub struct SchemaCacheBuilder {
    partitions: HashMap<NameKey, Arc<SchemaCatalog>>,
    domains: HashMap<NameKey, NameKey>,
}

impl SchemaCacheBuilder {
    /// Create an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load (or reuse) the catalog for a domain.
    ///
    /// The source is only asked for its schema if no catalog has been loaded
    /// for its partition root yet.
    pub async fn load_domain(
        &mut self,
        domain_key: &str,
        source: &dyn SchemaSource,
    ) -> DirectoryResult<Arc<SchemaCatalog>> {
        let root = NameKey::new(source.partition_root().await?);

        let catalog = if let Some(existing) = self.partitions.get(&root) {
            debug!(domain = %domain_key, partition = %root.as_str(), "Reusing cached schema");
            Arc::clone(existing)
        } else {
            let catalog = Arc::new(source.load_schema().await?);
            info!(
                domain = %domain_key,
                partition = %root.as_str(),
                attributes = catalog.len(),
                "Schema loaded"
            );
            self.partitions.insert(root.clone(), Arc::clone(&catalog));
            catalog
        };

        self.domains.insert(NameKey::new(domain_key), root);
        Ok(catalog)
    }

    /// Register an already-built catalog for a domain and partition root.
    pub fn insert(
        &mut self,
        domain_key: &str,
        partition_root: &str,
        catalog: SchemaCatalog,
    ) -> Arc<SchemaCatalog> {
        let root = NameKey::new(partition_root);
        let catalog = Arc::clone(
            self.partitions
                .entry(root.clone())
                .or_insert_with(|| Arc::new(catalog)),
        );
        self.domains.insert(NameKey::new(domain_key), root);
        catalog
    }

    /// Freeze into a read-only cache.
    #[must_use]
    pub fn build(self) -> SchemaCache {
        SchemaCache {
            partitions: self.partitions,
            domains: self.domains,
        }
    }
}

/// Read-only schema cache shared by request handlers.
#[derive(Debug, Clone, Default)]
pub struct SchemaCache {
    partitions: HashMap<NameKey, Arc<SchemaCatalog>>,
    domains: HashMap<NameKey, NameKey>,
}

impl SchemaCache {
    /// Catalog for a domain key.
    pub fn for_domain(&self, domain_key: &str) -> DirectoryResult<&Arc<SchemaCatalog>> {
        self.domains
            .get(query(&domain_key))
            .and_then(|root| self.partitions.get(root))
            .ok_or_else(|| DirectoryError::DomainNotFound {
                domain: domain_key.to_string(),
            })
    }

    /// Catalog for a partition root DN.
    #[must_use]
    pub fn for_partition(&self, partition_root: &str) -> Option<&Arc<SchemaCatalog>> {
        self.partitions.get(query(&partition_root))
    }

    /// Number of distinct catalogs held.
    #[must_use]
    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    /// Registered domain keys.
    pub fn domains(&self) -> impl Iterator<Item = &str> {
        self.domains.keys().map(NameKey::as_str)
    }
}

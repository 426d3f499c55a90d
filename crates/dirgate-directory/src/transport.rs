//! Transport collaborator contract
//!
//! The engine never talks to a directory server itself. It hands rendered
//! requests to a [`DirectoryConnection`] and gets raw entries back.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{DirectoryError, DirectoryResult};
use crate::search::{SearchScope, SortDirection};
use crate::value::RawValue;

/// A search in wire form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub base: String,
    pub scope: SearchScope,
    /// Rendered filter string.
    pub filter: String,
    /// Attributes to return; empty returns all user attributes.
    pub attributes: Vec<String>,
    pub page_size: u32,
    /// 0 means no limit.
    pub size_limit: u32,
    pub sort: Option<(String, SortDirection)>,
}

/// One entry as returned by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawEntry {
    pub dn: String,
    /// Attribute values in server order.
    pub attributes: Vec<(String, Vec<RawValue>)>,
}

impl RawEntry {
    /// Create an entry without attributes.
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes: Vec::new(),
        }
    }

    /// Add an attribute using builder pattern.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, values: impl IntoIterator<Item = RawValue>) -> Self {
        self.attributes.push((name.into(), values.into_iter().collect()));
        self
    }

    /// Values of an attribute, ignoring case.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&[RawValue]> {
        self.attributes
            .iter()
            .find(|(attribute, _)| attribute.eq_ignore_ascii_case(name))
            .map(|(_, values)| values.as_slice())
    }

    /// First value of an attribute as text.
    #[must_use]
    pub fn first_text(&self, name: &str) -> Option<&str> {
        self.get(name)?.first()?.as_text()
    }
}

/// Entries returned by one search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawResultSet {
    pub entries: Vec<RawEntry>,
    /// Whether the size limit cut the result short.
    pub truncated: bool,
}

impl RawResultSet {
    pub fn new(entries: Vec<RawEntry>) -> Self {
        Self {
            entries,
            truncated: false,
        }
    }

    /// Sort entries by the first text value of an attribute, ignoring case.
    /// Entries without the attribute sort last either way.
    pub fn sort_by(&mut self, attribute: &str, direction: SortDirection) {
        self.entries.sort_by(|a, b| {
            let key_a = a.first_text(attribute).map(str::to_lowercase);
            let key_b = b.first_text(attribute).map(str::to_lowercase);
            match (key_a, key_b) {
                (Some(x), Some(y)) => match direction {
                    SortDirection::Ascending => x.cmp(&y),
                    SortDirection::Descending => y.cmp(&x),
                },
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            }
        });
    }

    /// Cut the result to `limit` entries (0 keeps all).
    pub fn truncate(&mut self, limit: u32) {
        if limit > 0 && self.entries.len() > limit as usize {
            self.entries.truncate(limit as usize);
            self.truncated = true;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One change in a modify request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Modification {
    /// Add values.
    Add {
        attribute: String,
        values: Vec<RawValue>,
    },
    /// Replace all values (an empty list removes the attribute).
    Replace {
        attribute: String,
        values: Vec<RawValue>,
    },
    /// Delete the listed values, or all values when the list is empty.
    Delete {
        attribute: String,
        values: Vec<RawValue>,
    },
}

impl Modification {
    /// Attribute this modification targets.
    #[must_use]
    pub fn attribute(&self) -> &str {
        match self {
            Modification::Add { attribute, .. }
            | Modification::Replace { attribute, .. }
            | Modification::Delete { attribute, .. } => attribute,
        }
    }
}

/// A connection to one directory.
///
/// Failures are reported as [`DirectoryError::TransportFailure`] and are
/// never retried by the engine.
#[async_trait]
pub trait DirectoryConnection: Send + Sync {
    /// Run a search.
    async fn execute(&self, request: &SearchRequest) -> DirectoryResult<RawResultSet>;

    /// Apply modifications to one entry in a single request.
    async fn apply_modify(&self, dn: &str, modifications: &[Modification]) -> DirectoryResult<()>;

    /// Create an entry.
    async fn add(&self, dn: &str, attributes: &[(String, Vec<RawValue>)]) -> DirectoryResult<()>;

    /// Delete an entry.
    async fn delete(&self, dn: &str) -> DirectoryResult<()>;

    /// Rename and/or move an entry.
    async fn modify_dn(&self, dn: &str, new_rdn: &str, new_superior: Option<&str>) -> DirectoryResult<()>;
}

/// Hands out the connection for a domain key.
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    async fn connection(&self, domain_key: &str) -> DirectoryResult<Arc<dyn DirectoryConnection>>;
}

/// A fixed map of domain keys to connections.
#[derive(Clone, Default)]
pub struct StaticConnectionProvider {
    // Keyed by lowercase domain key.
    connections: HashMap<String, Arc<dyn DirectoryConnection>>,
}

impl StaticConnectionProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection for a domain key.
    pub fn insert(&mut self, domain_key: &str, connection: Arc<dyn DirectoryConnection>) {
        self.connections
            .insert(domain_key.to_ascii_lowercase(), connection);
    }

    /// Register a connection using builder pattern.
    #[must_use]
    pub fn with(mut self, domain_key: &str, connection: Arc<dyn DirectoryConnection>) -> Self {
        self.insert(domain_key, connection);
        self
    }

    pub fn domains(&self) -> impl Iterator<Item = &str> {
        self.connections.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for StaticConnectionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticConnectionProvider")
            .field("domains", &self.connections.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[async_trait]
impl ConnectionProvider for StaticConnectionProvider {
    async fn connection(&self, domain_key: &str) -> DirectoryResult<Arc<dyn DirectoryConnection>> {
        self.connections
            .get(&domain_key.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| DirectoryError::DomainNotFound {
                domain: domain_key.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person(dn: &str, sn: Option<&str>) -> RawEntry {
        let entry = RawEntry::new(dn);
        match sn {
            Some(sn) => entry.with("sn", [RawValue::from(sn)]),
            None => entry,
        }
    }

    #[test]
    fn test_sort_by_attribute() {
        let mut results = RawResultSet::new(vec![
            person("CN=b", Some("brown")),
            person("CN=none", None),
            person("CN=a", Some("Adams")),
            person("CN=c", Some("clark")),
        ]);

        results.sort_by("SN", SortDirection::Ascending);
        let order: Vec<&str> = results.entries.iter().map(|e| e.dn.as_str()).collect();
        assert_eq!(order, vec!["CN=a", "CN=b", "CN=c", "CN=none"]);

        results.sort_by("sn", SortDirection::Descending);
        let order: Vec<&str> = results.entries.iter().map(|e| e.dn.as_str()).collect();
        assert_eq!(order, vec!["CN=c", "CN=b", "CN=a", "CN=none"]);
    }

    #[test]
    fn test_truncate_marks_result() {
        let mut results = RawResultSet::new(vec![person("CN=a", None), person("CN=b", None)]);
        results.truncate(0);
        assert!(!results.truncated);
        results.truncate(1);
        assert_eq!(results.len(), 1);
        assert!(results.truncated);
    }

    #[tokio::test]
    async fn test_static_provider_unknown_domain() {
        let provider = StaticConnectionProvider::new();
        let err = provider.connection("emea").await.err().unwrap();
        assert_eq!(err.error_code(), "DOMAIN_NOT_FOUND");
    }
}

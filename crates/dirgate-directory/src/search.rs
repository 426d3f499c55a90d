//! Search query composition and result mapping
//!
//! A [`SearchQuery`] bundles the filter with base, scope, paging, sorting
//! and the attributes to load. Results come back from the transport as
//! [`RawEntry`] values and are mapped into [`DirectoryObject`]s through the
//! converter registry.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::convert::ConverterRegistry;
use crate::filter::FilterStatement;
use crate::schema::SchemaCatalog;
use crate::transport::{RawEntry, SearchRequest};

/// Sentinel in a property list standing for the configured defaults.
pub const DEFAULT_PROPERTIES_SENTINEL: &str = "default";

/// Page size used when none is given.
pub const DEFAULT_PAGE_SIZE: u32 = 500;

/// Search scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchScope {
    /// Only the base object.
    Base,
    /// Direct children of the base.
    OneLevel,
    /// The base and everything below it.
    #[default]
    Subtree,
}

impl SearchScope {
    /// Get the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchScope::Base => "base",
            SearchScope::OneLevel => "onelevel",
            SearchScope::Subtree => "subtree",
        }
    }
}

impl std::str::FromStr for SearchScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "base" => Ok(SearchScope::Base),
            "onelevel" | "one" => Ok(SearchScope::OneLevel),
            "subtree" | "sub" => Ok(SearchScope::Subtree),
            other => Err(format!("unknown search scope '{other}'")),
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

/// Configured default attribute lists per object class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultPropertySets {
    // Keyed by lowercase object class.
    #[serde(default)]
    by_class: HashMap<String, Vec<String>>,
    /// Used for object classes without their own list.
    #[serde(default)]
    fallback: Vec<String>,
}

impl Default for DefaultPropertySets {
    fn default() -> Self {
        Self::new(["distinguishedName", "objectGUID", "objectClass", "name"])
            .with_class(
                "user",
                [
                    "distinguishedName",
                    "objectGUID",
                    "objectSid",
                    "sAMAccountName",
                    "userPrincipalName",
                    "displayName",
                    "mail",
                    "userAccountControl",
                ],
            )
            .with_class(
                "group",
                [
                    "distinguishedName",
                    "objectGUID",
                    "objectSid",
                    "sAMAccountName",
                    "name",
                    "groupType",
                    "description",
                ],
            )
            .with_class(
                "computer",
                [
                    "distinguishedName",
                    "objectGUID",
                    "sAMAccountName",
                    "dNSHostName",
                    "operatingSystem",
                    "userAccountControl",
                ],
            )
    }
}

impl DefaultPropertySets {
    /// Create sets with only a fallback list.
    pub fn new(fallback: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            by_class: HashMap::new(),
            fallback: fallback.into_iter().map(Into::into).collect(),
        }
    }

    /// Set the list for an object class using builder pattern.
    #[must_use]
    pub fn with_class(
        mut self,
        object_class: &str,
        properties: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.insert(object_class, properties);
        self
    }

    /// Set the list for an object class.
    pub fn insert(&mut self, object_class: &str, properties: impl IntoIterator<Item = impl Into<String>>) {
        self.by_class.insert(
            object_class.to_ascii_lowercase(),
            properties.into_iter().map(Into::into).collect(),
        );
    }

    /// Replace the generic list.
    pub fn set_fallback(&mut self, properties: impl IntoIterator<Item = impl Into<String>>) {
        self.fallback = properties.into_iter().map(Into::into).collect();
    }

    /// Defaults for an object class, falling back to the generic list.
    #[must_use]
    pub fn for_class(&self, object_class: Option<&str>) -> &[String] {
        object_class
            .and_then(|class| self.by_class.get(&class.to_ascii_lowercase()))
            .unwrap_or(&self.fallback)
    }
}

/// Expand the `default` sentinel in a requested property list.
///
/// The sentinel (any case) is removed and the configured defaults for the
/// object class are appended after the caller's explicit properties.
/// Duplicates are dropped case-insensitively, first occurrence wins.
#[must_use]
pub fn resolve_properties(
    requested: &[String],
    object_class: Option<&str>,
    defaults: &DefaultPropertySets,
) -> Vec<String> {
    let mut resolved: Vec<String> = Vec::with_capacity(requested.len());
    let mut wants_defaults = false;

    for property in requested {
        let property = property.trim();
        if property.eq_ignore_ascii_case(DEFAULT_PROPERTIES_SENTINEL) {
            wants_defaults = true;
        } else if !property.is_empty() {
            push_unique(&mut resolved, property);
        }
    }

    if wants_defaults {
        for property in defaults.for_class(object_class) {
            push_unique(&mut resolved, property);
        }
    }
    resolved
}

fn push_unique(properties: &mut Vec<String>, property: &str) {
    if !properties.iter().any(|p| p.eq_ignore_ascii_case(property)) {
        properties.push(property.to_string());
    }
}

/// A fully described search, immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub filter: FilterStatement,
    pub base: String,
    pub scope: SearchScope,
    pub page_size: u32,
    /// Maximum entries returned; 0 means no limit.
    pub size_limit: u32,
    pub sort_property: Option<String>,
    pub sort_direction: SortDirection,
    /// Attributes to load; empty loads all user attributes.
    pub properties_to_load: Vec<String>,
}

impl SearchQuery {
    /// Start building a query for a filter.
    pub fn builder(filter: FilterStatement) -> SearchQueryBuilder {
        SearchQueryBuilder::new(filter)
    }

    /// The transport request for this query.
    #[must_use]
    pub fn to_request(&self) -> SearchRequest {
        SearchRequest {
            base: self.base.clone(),
            scope: self.scope,
            filter: self.filter.render(),
            attributes: self.properties_to_load.clone(),
            page_size: self.page_size,
            size_limit: self.size_limit,
            sort: self
                .sort_property
                .clone()
                .map(|property| (property, self.sort_direction)),
        }
    }
}

/// Builder for [`SearchQuery`].
#[derive(Debug, Clone)]
pub struct SearchQueryBuilder {
    query: SearchQuery,
}

impl SearchQueryBuilder {
    fn new(filter: FilterStatement) -> Self {
        Self {
            query: SearchQuery {
                filter,
                base: String::new(),
                scope: SearchScope::default(),
                page_size: DEFAULT_PAGE_SIZE,
                size_limit: 0,
                sort_property: None,
                sort_direction: SortDirection::default(),
                properties_to_load: Vec::new(),
            },
        }
    }

    #[must_use]
    pub fn base(mut self, base: impl Into<String>) -> Self {
        self.query.base = base.into();
        self
    }

    #[must_use]
    pub fn scope(mut self, scope: SearchScope) -> Self {
        self.query.scope = scope;
        self
    }

    /// Set the page size (0 is treated as the default).
    #[must_use]
    pub fn page_size(mut self, page_size: u32) -> Self {
        self.query.page_size = if page_size == 0 {
            DEFAULT_PAGE_SIZE
        } else {
            page_size
        };
        self
    }

    #[must_use]
    pub fn size_limit(mut self, size_limit: u32) -> Self {
        self.query.size_limit = size_limit;
        self
    }

    #[must_use]
    pub fn sort_by(mut self, property: impl Into<String>, direction: SortDirection) -> Self {
        self.query.sort_property = Some(property.into());
        self.query.sort_direction = direction;
        self
    }

    #[must_use]
    pub fn properties(mut self, properties: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.query.properties_to_load = properties.into_iter().map(Into::into).collect();
        self
    }

    /// Expand the `default` sentinel in the properties set so far.
    #[must_use]
    pub fn resolve_defaults(mut self, object_class: Option<&str>, defaults: &DefaultPropertySets) -> Self {
        self.query.properties_to_load =
            resolve_properties(&self.query.properties_to_load, object_class, defaults);
        self
    }

    #[must_use]
    pub fn build(self) -> SearchQuery {
        self.query
    }
}

/// A directory entry rendered for a response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DirectoryObject {
    #[serde(rename = "distinguishedName")]
    pub dn: String,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl DirectoryObject {
    /// Look up an attribute, ignoring case.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name).or_else(|| {
            self.attributes
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value)
        })
    }

    /// Look up a string attribute.
    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }
}

/// Convert a raw entry into its response form.
///
/// An attribute with one value becomes a scalar, with several an array, and
/// with none is omitted. A value that fails conversion is passed through raw
/// instead of failing the entry.
#[must_use]
pub fn map_entry(raw: &RawEntry, registry: &ConverterRegistry, catalog: &SchemaCatalog) -> DirectoryObject {
    let attributes = raw
        .attributes
        .iter()
        .filter(|(name, _)| !name.eq_ignore_ascii_case("distinguishedName"))
        .filter_map(|(name, values)| {
            registry
                .convert_for_response(catalog, name, values)
                .map(|value| (name.clone(), value))
        })
        .collect();

    DirectoryObject {
        dn: raw.dn.clone(),
        attributes,
    }
}

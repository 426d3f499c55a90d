//! # Directory Engine
//!
//! Query composition and attribute conversion for LDAP / Active Directory.
//!
//! The engine sits between request handlers and a directory transport. It
//! builds filters, validates edits against the directory schema and turns
//! raw wire values into JSON (and back).
//!
//! ## Example
//!
//! ```ignore
//! use dirgate_directory::prelude::*;
//!
//! let filter = FilterStatement::and([
//!     FilterStatement::equal("objectClass", "user"),
//!     FilterStatement::bitwise_and("userAccountControl", 2).negate(),
//! ]);
//!
//! let query = service
//!     .query(filter)
//!     .base("DC=corp,DC=example,DC=com")
//!     .properties(["default"])
//!     .resolve_defaults(Some("user"), &service.config().default_properties)
//!     .build();
//! let results = service.search("corp", query).await?;
//! ```
//!
//! ## Crate Organization
//!
//! - [`filter`] - Filter algebra, rendering and the structured JSON form
//! - [`schema`] - Attribute catalogs and the per-partition schema cache
//! - [`convert`] - Value converters and the converter registry
//! - [`edit`] - Edit operations, validation and batching
//! - [`search`] - Search queries, default property sets and result mapping
//! - [`transport`] - The connection contract implemented by transports
//! - [`service`] - Request-level facade
//! - [`config`] - Environment configuration
//! - [`error`] - Error taxonomy

pub mod config;
pub mod convert;
pub mod edit;
pub mod error;
pub mod filter;
mod name_key;
pub mod schema;
pub mod search;
pub mod service;
pub mod transport;
pub mod value;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::{ConfigError, EngineConfig};
    pub use crate::convert::{ConverterRegistry, ValueConverter};
    pub use crate::edit::{EditBatch, EditKind, EditOperation, EditRequest, EditState, ValidatedEdit};
    pub use crate::error::{DirectoryError, DirectoryResult, RangeBound};
    pub use crate::filter::{
        build_filter, from_structured, to_structured, CompoundKind, FilterBuilder, FilterStatement,
        FilterValue, MatchRule,
    };
    pub use crate::schema::{
        AttributeSchema, SchemaCache, SchemaCacheBuilder, SchemaCatalog, SchemaSource, ValueKind,
    };
    pub use crate::search::{
        map_entry, resolve_properties, DefaultPropertySets, DirectoryObject, SearchQuery,
        SearchScope, SortDirection,
    };
    pub use crate::service::{DirectoryService, SearchResults};
    pub use crate::transport::{
        ConnectionProvider, DirectoryConnection, Modification, RawEntry, RawResultSet,
        SearchRequest, StaticConnectionProvider,
    };
    pub use crate::value::{AttributeValue, RawValue};
}

// Re-export async_trait for transport implementors
pub use async_trait::async_trait;

//! # LDAP Transport
//!
//! LDAP / Active Directory transport for the dirgate engine.
//!
//! ## Features
//!
//! - LDAP v3 over plain, SSL/TLS and STARTTLS connections
//! - Paged searches with server-side size limits
//! - Attribute schema discovery from the schema naming context
//! - Per-operation timeouts
//!
//! ## Example
//!
//! ```ignore
//! use dirgate_directory::config::EngineConfig;
//! use dirgate_ldap::{build_service, DomainsConfig};
//!
//! let domains = DomainsConfig::from_env()?;
//! let service = build_service(&domains, EngineConfig::from_env()?).await?;
//! ```

pub mod bootstrap;
pub mod config;
pub mod connection;
mod schema_loader;

// Re-exports
pub use bootstrap::build_service;
pub use config::{DomainsConfig, LdapConfig};
pub use connection::LdapConnection;

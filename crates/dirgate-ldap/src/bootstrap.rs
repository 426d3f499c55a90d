//! Startup wiring
//!
//! Builds the connection provider and the schema cache for every configured
//! domain, then freezes them into a [`DirectoryService`].

use std::sync::Arc;

use tracing::{info, warn};

use dirgate_directory::config::EngineConfig;
use dirgate_directory::convert::ConverterRegistry;
use dirgate_directory::error::DirectoryResult;
use dirgate_directory::schema::{SchemaCacheBuilder, SchemaCatalog, SchemaSource};
use dirgate_directory::service::DirectoryService;
use dirgate_directory::transport::StaticConnectionProvider;

use crate::config::DomainsConfig;
use crate::connection::LdapConnection;

/// Partition key shared by every domain served from the built-in catalog.
pub const BUILTIN_SCHEMA_PARTITION: &str = "builtin:active-directory";

/// Connect every domain and load its schema.
///
/// A domain whose schema cannot be read falls back to the built-in Active
/// Directory catalog when `schema_fallback` is set, and fails startup
/// otherwise.
pub async fn build_service(domains: &DomainsConfig, engine: EngineConfig) -> DirectoryResult<DirectoryService> {
    let mut provider = StaticConnectionProvider::new();
    let mut schemas = SchemaCacheBuilder::new();

    for (key, config) in domains.iter() {
        let connection = Arc::new(LdapConnection::new(config.clone())?);
        load_schema(&mut schemas, key, connection.as_ref(), engine.schema_fallback).await?;
        provider.insert(key, connection);
    }

    let schemas = schemas.build();
    info!(
        domains = domains.iter().count(),
        partitions = schemas.partition_count(),
        "Directory service ready"
    );

    Ok(DirectoryService::new(
        Arc::new(provider),
        Arc::new(schemas),
        Arc::new(ConverterRegistry::with_defaults()),
        Arc::new(engine),
    ))
}

async fn load_schema(
    schemas: &mut SchemaCacheBuilder,
    domain_key: &str,
    source: &dyn SchemaSource,
    fallback: bool,
) -> DirectoryResult<()> {
    match schemas.load_domain(domain_key, source).await {
        Ok(_) => Ok(()),
        Err(err) if fallback => {
            warn!(domain = %domain_key, error = %err, "Schema unavailable, using built-in catalog");
            schemas.insert(
                domain_key,
                BUILTIN_SCHEMA_PARTITION,
                SchemaCatalog::active_directory_defaults(),
            );
            Ok(())
        }
        Err(err) => Err(err),
    }
}

//! Active Directory schema discovery
//!
//! Reads `attributeSchema` objects from the schema naming context and turns
//! them into a [`SchemaCatalog`].

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use dirgate_directory::error::{DirectoryError, DirectoryResult};
use dirgate_directory::schema::{AttributeSchema, SchemaCatalog, SchemaSource, ValueKind};
use dirgate_directory::search::{SearchScope, SortDirection};
use dirgate_directory::transport::{DirectoryConnection, RawEntry, SearchRequest};

use crate::connection::LdapConnection;

const SCHEMA_ATTRIBUTES: &[&str] = &[
    "lDAPDisplayName",
    "attributeSyntax",
    "oMSyntax",
    "isSingleValued",
    "rangeLower",
    "rangeUpper",
];

const SCHEMA_PAGE_SIZE: u32 = 1000;

impl LdapConnection {
    /// Read one attribute of the root DSE.
    async fn root_dse(&self, attribute: &str) -> DirectoryResult<String> {
        let request = SearchRequest {
            base: String::new(),
            scope: SearchScope::Base,
            filter: "(objectClass=*)".to_string(),
            attributes: vec![attribute.to_string()],
            page_size: 0,
            size_limit: 0,
            sort: None,
        };
        let results = self.execute(&request).await?;
        results
            .entries
            .first()
            .and_then(|entry| entry.first_text(attribute))
            .map(str::to_string)
            .ok_or_else(|| DirectoryError::transport(format!("root DSE has no {attribute}")))
    }
}

#[async_trait]
impl SchemaSource for LdapConnection {
    /// Domains of one forest share the schema naming context.
    async fn partition_root(&self) -> DirectoryResult<String> {
        self.root_dse("schemaNamingContext").await
    }

    #[instrument(skip(self), fields(host = %self.config().host))]
    async fn load_schema(&self) -> DirectoryResult<SchemaCatalog> {
        let schema_dn = self.root_dse("schemaNamingContext").await?;
        debug!(schema_dn = %schema_dn, "Reading attribute schema");

        let request = SearchRequest {
            base: schema_dn,
            scope: SearchScope::OneLevel,
            filter: "(objectClass=attributeSchema)".to_string(),
            attributes: SCHEMA_ATTRIBUTES.iter().map(|s| s.to_string()).collect(),
            page_size: SCHEMA_PAGE_SIZE,
            size_limit: 0,
            sort: Some(("lDAPDisplayName".to_string(), SortDirection::Ascending)),
        };
        let results = self.execute(&request).await?;

        let catalog: SchemaCatalog = results.entries.iter().filter_map(attribute_from_entry).collect();
        if catalog.is_empty() {
            return Err(DirectoryError::transport(
                "schema naming context returned no attribute definitions",
            ));
        }

        info!(attributes = catalog.len(), "Attribute schema read");
        Ok(catalog)
    }
}

/// Build an attribute definition from an `attributeSchema` entry.
pub(crate) fn attribute_from_entry(entry: &RawEntry) -> Option<AttributeSchema> {
    let Some(name) = entry.first_text("lDAPDisplayName") else {
        warn!(dn = %entry.dn, "attributeSchema entry without lDAPDisplayName");
        return None;
    };
    let syntax = entry.first_text("attributeSyntax").unwrap_or_default();
    let om_syntax = number(entry, "oMSyntax").and_then(|n| i32::try_from(n).ok());

    let attribute = AttributeSchema::new(name, ValueKind::from_syntax(syntax, om_syntax, name))
        .with_range(number(entry, "rangeLower"), number(entry, "rangeUpper"));

    let single = entry
        .first_text("isSingleValued")
        .is_some_and(|v| v.eq_ignore_ascii_case("TRUE"));
    Some(if single { attribute } else { attribute.multi_valued() })
}

fn number(entry: &RawEntry, attribute: &str) -> Option<i64> {
    entry.first_text(attribute)?.trim().parse().ok()
}

//! Request-level facade
//!
//! [`DirectoryService`] ties the pieces together for one request: it picks
//! the connection and schema catalog for a domain key, validates and
//! converts, and delegates to the transport.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument};

use crate::config::EngineConfig;
use crate::convert::ConverterRegistry;
use crate::edit::{EditBatch, EditOperation, EditRequest};
use crate::error::{DirectoryError, DirectoryResult};
use crate::filter::FilterStatement;
use crate::schema::{SchemaCache, SchemaCatalog};
use crate::search::{map_entry, DirectoryObject, SearchQuery, SearchQueryBuilder, SearchScope};
use crate::transport::{ConnectionProvider, DirectoryConnection};
use crate::value::RawValue;

/// Objects returned by a search.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchResults {
    pub objects: Vec<DirectoryObject>,
    /// Whether the size limit cut the result short.
    pub truncated: bool,
}

impl SearchResults {
    pub fn count(&self) -> usize {
        self.objects.len()
    }
}

/// Directory operations for request handlers.
#[derive(Clone)]
pub struct DirectoryService {
    connections: Arc<dyn ConnectionProvider>,
    schemas: Arc<SchemaCache>,
    registry: Arc<ConverterRegistry>,
    config: Arc<EngineConfig>,
}

impl std::fmt::Debug for DirectoryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryService")
            .field("partitions", &self.schemas.partition_count())
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl DirectoryService {
    pub fn new(
        connections: Arc<dyn ConnectionProvider>,
        schemas: Arc<SchemaCache>,
        registry: Arc<ConverterRegistry>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            connections,
            schemas,
            registry,
            config,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &ConverterRegistry {
        &self.registry
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Schema catalog for a domain.
    pub fn catalog(&self, domain: &str) -> DirectoryResult<&SchemaCatalog> {
        self.schemas.for_domain(domain).map(|catalog| catalog.as_ref())
    }

    /// A query builder carrying the configured page size.
    pub fn query(&self, filter: FilterStatement) -> SearchQueryBuilder {
        SearchQuery::builder(filter).page_size(self.config.default_page_size)
    }

    async fn connection(&self, domain: &str) -> DirectoryResult<Arc<dyn DirectoryConnection>> {
        self.connections.connection(domain).await
    }

    /// Run a query and map every entry for the response.
    #[instrument(skip(self, query), fields(filter = %query.filter))]
    pub async fn search(&self, domain: &str, query: SearchQuery) -> DirectoryResult<SearchResults> {
        query.filter.validate()?;
        let catalog = self.catalog(domain)?;
        let connection = self.connection(domain).await?;

        let mut request = query.to_request();
        request.size_limit = self.config.effective_size_limit(request.size_limit);

        let raw = connection.execute(&request).await?;
        let objects: Vec<DirectoryObject> = raw
            .entries
            .iter()
            .map(|entry| map_entry(entry, &self.registry, catalog))
            .collect();

        debug!(returned = objects.len(), truncated = raw.truncated, "Search completed");
        Ok(SearchResults {
            objects,
            truncated: raw.truncated,
        })
    }

    /// First object matching a filter below `base`.
    #[instrument(skip(self, filter))]
    pub async fn find_one(
        &self,
        domain: &str,
        base: &str,
        filter: FilterStatement,
    ) -> DirectoryResult<Option<DirectoryObject>> {
        let query = self
            .query(filter)
            .base(base)
            .scope(SearchScope::Subtree)
            .size_limit(1)
            .build();
        Ok(self.search(domain, query).await?.objects.into_iter().next())
    }

    /// Validate and apply edits to one entry. Nothing is sent unless every
    /// edit validates.
    #[instrument(skip(self, edits))]
    pub async fn edit(&self, domain: &str, dn: &str, edits: Vec<EditRequest>) -> DirectoryResult<()> {
        let catalog = self.catalog(domain)?;
        let modifications =
            EditBatch::from_requests(edits, &self.registry, catalog)?.into_modifications(catalog)?;
        if modifications.is_empty() {
            debug!("No modifications to apply");
            return Ok(());
        }

        self.connection(domain)
            .await?
            .apply_modify(dn, &modifications)
            .await?;
        info!(modifications = modifications.len(), "Entry modified");
        Ok(())
    }

    /// Create an entry from a JSON attribute map.
    #[instrument(skip(self, attributes))]
    pub async fn create(&self, domain: &str, dn: &str, attributes: &Map<String, Value>) -> DirectoryResult<()> {
        let catalog = self.catalog(domain)?;

        let mut entry: Vec<(String, Vec<RawValue>)> = Vec::with_capacity(attributes.len());
        for (name, value) in attributes {
            let values = self
                .registry
                .to_protocol(name, catalog.value_kind(name), value)?;
            let validated = EditOperation::set(name.as_str(), values).validate(catalog)?;
            entry.push((
                validated.attribute().to_string(),
                validated.values().iter().map(|v| v.to_raw()).collect(),
            ));
        }

        self.connection(domain).await?.add(dn, &entry).await?;
        info!(attributes = entry.len(), "Entry created");
        Ok(())
    }

    /// Give an entry a new RDN under the same parent.
    #[instrument(skip(self))]
    pub async fn rename(&self, domain: &str, dn: &str, new_rdn: &str) -> DirectoryResult<()> {
        validate_rdn(new_rdn)?;
        self.connection(domain)
            .await?
            .modify_dn(dn, new_rdn, None)
            .await?;
        info!("Entry renamed");
        Ok(())
    }

    /// Move an entry below a new parent, keeping its RDN.
    #[instrument(skip(self))]
    pub async fn move_object(&self, domain: &str, dn: &str, new_parent: &str) -> DirectoryResult<()> {
        let (rdn, _) = split_rdn(dn)
            .ok_or_else(|| DirectoryError::malformed(format!("'{dn}' is not a distinguished name")))?;
        self.connection(domain)
            .await?
            .modify_dn(dn, rdn, Some(new_parent))
            .await?;
        info!(new_parent = %new_parent, "Entry moved");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, domain: &str, dn: &str) -> DirectoryResult<()> {
        self.connection(domain).await?.delete(dn).await?;
        info!("Entry deleted");
        Ok(())
    }
}

/// Split a DN into its first RDN and the parent DN, honoring `\,` escapes.
pub fn split_rdn(dn: &str) -> Option<(&str, &str)> {
    let mut escaped = false;
    for (index, ch) in dn.char_indices() {
        match ch {
            '\\' if !escaped => escaped = true,
            ',' if !escaped => {
                let rdn = dn[..index].trim();
                return (!rdn.is_empty()).then(|| (rdn, dn[index + 1..].trim()));
            }
            _ => escaped = false,
        }
    }
    let rdn = dn.trim();
    (rdn.contains('=')).then_some((rdn, ""))
}

fn validate_rdn(rdn: &str) -> DirectoryResult<()> {
    match rdn.split_once('=') {
        Some((attribute, value)) if !attribute.trim().is_empty() && !value.trim().is_empty() => Ok(()),
        _ => Err(DirectoryError::malformed(format!("'{rdn}' is not a relative distinguished name"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaCacheBuilder;
    use crate::transport::{Modification, RawEntry, RawResultSet, SearchRequest, StaticConnectionProvider};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Search(SearchRequest),
        Modify(String, Vec<Modification>),
        Add(String, Vec<(String, Vec<RawValue>)>),
        Delete(String),
        ModifyDn(String, String, Option<String>),
    }

    #[derive(Default)]
    struct MemoryConnection {
        entries: Vec<RawEntry>,
        calls: Mutex<Vec<Call>>,
    }

    impl MemoryConnection {
        fn with_entries(entries: Vec<RawEntry>) -> Self {
            Self {
                entries,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: Call) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl DirectoryConnection for MemoryConnection {
        async fn execute(&self, request: &SearchRequest) -> DirectoryResult<RawResultSet> {
            self.record(Call::Search(request.clone()));
            let mut results = RawResultSet::new(self.entries.clone());
            results.truncate(request.size_limit);
            Ok(results)
        }

        async fn apply_modify(&self, dn: &str, modifications: &[Modification]) -> DirectoryResult<()> {
            self.record(Call::Modify(dn.to_string(), modifications.to_vec()));
            Ok(())
        }

        async fn add(&self, dn: &str, attributes: &[(String, Vec<RawValue>)]) -> DirectoryResult<()> {
            self.record(Call::Add(dn.to_string(), attributes.to_vec()));
            Ok(())
        }

        async fn delete(&self, dn: &str) -> DirectoryResult<()> {
            if dn.starts_with("CN=Missing") {
                return Err(DirectoryError::transport_with_code(32, "no such object"));
            }
            self.record(Call::Delete(dn.to_string()));
            Ok(())
        }

        async fn modify_dn(&self, dn: &str, new_rdn: &str, new_superior: Option<&str>) -> DirectoryResult<()> {
            self.record(Call::ModifyDn(
                dn.to_string(),
                new_rdn.to_string(),
                new_superior.map(str::to_string),
            ));
            Ok(())
        }
    }

    const DOMAIN_ADMINS: [u8; 28] = [
        0x01, 0x05, 0x00, 0x00, 0x00, 0x00, 0x00, 0x05, 0x15, 0x00, 0x00, 0x00, 0xdc, 0xf4, 0xdc,
        0x3b, 0x83, 0x3d, 0x2b, 0x46, 0x82, 0x8b, 0xa6, 0x28, 0x00, 0x02, 0x00, 0x00,
    ];

    fn service(connection: Arc<MemoryConnection>) -> DirectoryService {
        let mut schemas = SchemaCacheBuilder::new();
        schemas.insert(
            "corp",
            "DC=corp,DC=example,DC=com",
            SchemaCatalog::active_directory_defaults(),
        );
        let provider = StaticConnectionProvider::new().with("corp", connection);
        DirectoryService::new(
            Arc::new(provider),
            Arc::new(schemas.build()),
            Arc::new(ConverterRegistry::with_defaults()),
            Arc::new(EngineConfig::default()),
        )
    }

    fn jane() -> RawEntry {
        RawEntry::new("CN=Jane Doe,OU=Staff,DC=corp,DC=example,DC=com")
            .with("sAMAccountName", [RawValue::from("jdoe")])
            .with("objectSid", [RawValue::Binary(DOMAIN_ADMINS.to_vec())])
            .with("userAccountControl", [RawValue::from("512")])
            .with(
                "proxyAddresses",
                [
                    RawValue::from("SMTP:jane@example.com"),
                    RawValue::from("smtp:jdoe@example.com"),
                ],
            )
    }

    #[tokio::test]
    async fn test_search_maps_entries() {
        let connection = Arc::new(MemoryConnection::with_entries(vec![jane()]));
        let service = service(Arc::clone(&connection));

        let query = service
            .query(FilterStatement::equal("sAMAccountName", "jdoe"))
            .base("DC=corp,DC=example,DC=com")
            .properties(["sAMAccountName", "objectSid"])
            .build();
        let results = service.search("CORP", query).await.unwrap();

        assert_eq!(results.count(), 1);
        let object = &results.objects[0];
        assert_eq!(
            object.get_str("objectSid"),
            Some("S-1-5-21-1004336348-1177238915-682003330-512")
        );
        assert_eq!(object.get("userAccountControl"), Some(&json!(["NormalAccount"])));
        assert_eq!(
            object.get("proxyAddresses"),
            Some(&json!([
                {"type": "smtp", "address": "jane@example.com", "isPrimary": true},
                {"type": "smtp", "address": "jdoe@example.com", "isPrimary": false}
            ]))
        );

        match &connection.calls()[0] {
            Call::Search(request) => {
                assert_eq!(request.filter, "(sAMAccountName=jdoe)");
                assert_eq!(request.page_size, 500);
            }
            other => panic!("unexpected call {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_sid_keeps_other_attributes() {
        let broken = RawEntry::new("CN=Broken,DC=corp,DC=example,DC=com")
            .with("objectSid", [RawValue::Binary(vec![0x01, 0x05, 0x00, 0xff])])
            .with("sAMAccountName", [RawValue::from("broken")]);
        let service = service(Arc::new(MemoryConnection::with_entries(vec![broken])));

        let found = service
            .find_one("corp", "DC=corp,DC=example,DC=com", FilterStatement::equal("cn", "Broken"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.get_str("sAMAccountName"), Some("broken"));
        assert_eq!(found.get_str("objectSid"), Some("AQUA/w=="));
    }

    #[tokio::test]
    async fn test_unknown_domain() {
        let service = service(Arc::new(MemoryConnection::default()));
        let query = SearchQuery::builder(FilterStatement::present("cn")).build();
        let err = service.search("apac", query).await.unwrap_err();
        assert!(matches!(err, DirectoryError::DomainNotFound { .. }));
    }

    #[tokio::test]
    async fn test_edit_sends_one_modify() {
        let connection = Arc::new(MemoryConnection::default());
        let service = service(Arc::clone(&connection));
        let edits: Vec<EditRequest> = serde_json::from_value(json!([
            {"property": "userAccountControl", "kind": "set", "value": ["AccountDisabled", "NormalAccount"]},
            {"property": "description", "kind": "add", "value": ["contractor"]}
        ]))
        .unwrap();

        service
            .edit("corp", "CN=Jane Doe,DC=corp,DC=example,DC=com", edits)
            .await
            .unwrap();

        assert_eq!(
            connection.calls(),
            vec![Call::Modify(
                "CN=Jane Doe,DC=corp,DC=example,DC=com".to_string(),
                vec![
                    Modification::Replace {
                        attribute: "userAccountControl".to_string(),
                        values: vec![RawValue::from("514")],
                    },
                    Modification::Add {
                        attribute: "description".to_string(),
                        values: vec![RawValue::from("contractor")],
                    },
                ]
            )]
        );
    }

    #[tokio::test]
    async fn test_invalid_edit_sends_nothing() {
        let connection = Arc::new(MemoryConnection::default());
        let service = service(Arc::clone(&connection));
        let edits: Vec<EditRequest> = serde_json::from_value(json!([
            {"property": "displayName", "kind": "set", "value": "Jane"},
            {"property": "sAMAccountName", "kind": "set", "value": "a_string_of_length_21"}
        ]))
        .unwrap();

        let err = service
            .edit("corp", "CN=Jane Doe,DC=corp,DC=example,DC=com", edits)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "VALUE_OUT_OF_RANGE");
        assert!(connection.calls().is_empty());
    }

    #[tokio::test]
    async fn test_search_rejects_bad_attribute_name() {
        let connection = Arc::new(MemoryConnection::default());
        let service = service(Arc::clone(&connection));
        let query = service
            .query(FilterStatement::equal("cn=*)(objectClass", "x"))
            .base("DC=corp,DC=example,DC=com")
            .build();

        let err = service.search("corp", query).await.unwrap_err();
        assert_eq!(err.error_code(), "MALFORMED_FILTER");
        assert!(connection.calls().is_empty());
    }

    #[tokio::test]
    async fn test_create_converts_values() {
        let connection = Arc::new(MemoryConnection::default());
        let service = service(Arc::clone(&connection));
        let attributes = json!({
            "objectClass": ["top", "person", "organizationalPerson", "user"],
            "sAMAccountName": "jdoe",
            "userAccountControl": ["NormalAccount", "AccountDisabled"],
        });
        let Value::Object(attributes) = attributes else {
            unreachable!()
        };

        service
            .create("corp", "CN=Jane Doe,OU=Staff,DC=corp,DC=example,DC=com", &attributes)
            .await
            .unwrap();

        let Call::Add(_, entry) = &connection.calls()[0] else {
            panic!("expected an add");
        };
        let uac = entry
            .iter()
            .find(|(name, _)| name == "userAccountControl")
            .map(|(_, values)| values.clone());
        assert_eq!(uac, Some(vec![RawValue::from("514")]));
        let classes = entry
            .iter()
            .find(|(name, _)| name == "objectClass")
            .map(|(_, values)| values.len());
        assert_eq!(classes, Some(4));
    }

    #[tokio::test]
    async fn test_create_rejects_unknown_attribute() {
        let connection = Arc::new(MemoryConnection::default());
        let service = service(Arc::clone(&connection));
        let mut attributes = Map::new();
        attributes.insert("favouriteColour".to_string(), json!("blue"));

        let err = service
            .create("corp", "CN=x,DC=corp,DC=example,DC=com", &attributes)
            .await
            .unwrap_err();
        assert_eq!(err.attribute(), Some("favouriteColour"));
        assert!(connection.calls().is_empty());
    }

    #[tokio::test]
    async fn test_rename_and_move() {
        let connection = Arc::new(MemoryConnection::default());
        let service = service(Arc::clone(&connection));
        let dn = r"CN=Doe\, Jane,OU=Staff,DC=corp,DC=example,DC=com";

        service.rename("corp", dn, "CN=Jane Smith").await.unwrap();
        service
            .move_object("corp", dn, "OU=Former,DC=corp,DC=example,DC=com")
            .await
            .unwrap();
        assert!(service.rename("corp", dn, "Jane").await.is_err());

        assert_eq!(
            connection.calls(),
            vec![
                Call::ModifyDn(dn.to_string(), "CN=Jane Smith".to_string(), None),
                Call::ModifyDn(
                    dn.to_string(),
                    r"CN=Doe\, Jane".to_string(),
                    Some("OU=Former,DC=corp,DC=example,DC=com".to_string())
                ),
            ]
        );
    }

    #[tokio::test]
    async fn test_transport_failure_passes_through() {
        let service = service(Arc::new(MemoryConnection::default()));
        let err = service
            .delete("corp", "CN=Missing,DC=corp,DC=example,DC=com")
            .await
            .unwrap_err();
        assert!(matches!(err, DirectoryError::TransportFailure { code: Some(32), .. }));
    }

    #[test]
    fn test_split_rdn() {
        assert_eq!(
            split_rdn("CN=Jane,OU=Staff,DC=example,DC=com"),
            Some(("CN=Jane", "OU=Staff,DC=example,DC=com"))
        );
        assert_eq!(split_rdn(r"CN=Doe\, Jane,DC=com"), Some((r"CN=Doe\, Jane", "DC=com")));
        assert_eq!(split_rdn("DC=com"), Some(("DC=com", "")));
        assert_eq!(split_rdn(""), None);
    }
}

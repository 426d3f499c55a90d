//! ldap3-backed directory connection
//!
//! Implements [`DirectoryConnection`] over a lazily bound, cached [`Ldap`]
//! handle.

use std::collections::HashSet;
use std::future::Future;

use async_trait::async_trait;
use ldap3::adapters::{Adapter, EntriesOnly, PagedResults};
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, LdapError, LdapResult, Mod, Scope, SearchEntry, SearchOptions};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use dirgate_directory::error::{DirectoryError, DirectoryResult};
use dirgate_directory::search::SearchScope;
use dirgate_directory::transport::{DirectoryConnection, Modification, RawEntry, RawResultSet, SearchRequest};
use dirgate_directory::value::RawValue;

use crate::config::LdapConfig;

/// LDAP result codes the transport looks at.
const RC_SUCCESS: u32 = 0;
const RC_SIZE_LIMIT_EXCEEDED: u32 = 4;
const RC_INVALID_CREDENTIALS: u32 = 49;

/// A connection to one LDAP / Active Directory server.
pub struct LdapConnection {
    config: LdapConfig,

    /// Cached LDAP handle (lazily initialized).
    connection: RwLock<Option<Ldap>>,
}

impl LdapConnection {
    /// Create a connection; nothing is dialed until the first operation.
    pub fn new(config: LdapConfig) -> DirectoryResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            connection: RwLock::new(None),
        })
    }

    #[must_use]
    pub fn config(&self) -> &LdapConfig {
        &self.config
    }

    /// Get an LDAP handle, binding a new one if necessary.
    async fn handle(&self) -> DirectoryResult<Ldap> {
        {
            let guard = self.connection.read().await;
            if let Some(ref ldap) = *guard {
                return Ok(ldap.clone());
            }
        }

        let ldap = self.bind().await?;
        *self.connection.write().await = Some(ldap.clone());
        Ok(ldap)
    }

    /// Drop the cached handle so the next operation reconnects.
    async fn reset(&self) {
        if self.connection.write().await.take().is_some() {
            debug!(host = %self.config.host, "Discarded LDAP handle");
        }
    }

    async fn bind(&self) -> DirectoryResult<Ldap> {
        let url = self.config.url();
        debug!(url = %url, "Connecting to LDAP server");

        let settings = LdapConnSettings::new()
            .set_conn_timeout(self.config.timeout())
            .set_starttls(self.config.use_starttls);

        let (conn, mut ldap) = LdapConnAsync::with_settings(settings, &url)
            .await
            .map_err(|e| {
                DirectoryError::transport_with_source(
                    format!("failed to connect to LDAP server at {url}"),
                    e,
                )
            })?;

        // Spawn the connection driver
        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!(error = %e, "LDAP connection driver error");
            }
        });

        let bind_dn = &self.config.bind_dn;
        let password = self.config.bind_password.as_deref().unwrap_or("");
        debug!(bind_dn = %bind_dn, "Performing LDAP bind");

        let result = self
            .timed("bind", ldap.simple_bind(bind_dn, password))
            .await?;
        if result.rc == RC_INVALID_CREDENTIALS {
            return Err(DirectoryError::transport_with_code(
                result.rc,
                format!("invalid credentials for {bind_dn}"),
            ));
        }
        check(result, "bind", bind_dn)?;

        info!(host = %self.config.host, "LDAP connection established");
        Ok(ldap)
    }

    /// Run one protocol call under the configured timeout.
    async fn timed<T, F>(&self, operation: &str, call: F) -> DirectoryResult<T>
    where
        F: Future<Output = Result<T, LdapError>>,
    {
        match tokio::time::timeout(self.config.timeout(), call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                self.reset().await;
                Err(DirectoryError::transport_with_source(
                    format!("LDAP {operation} failed"),
                    e,
                ))
            }
            Err(_) => {
                self.reset().await;
                Err(DirectoryError::transport(format!(
                    "LDAP {operation} timed out after {}s",
                    self.config.timeout_secs
                )))
            }
        }
    }
}

impl std::fmt::Debug for LdapConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdapConnection")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl DirectoryConnection for LdapConnection {
    #[instrument(skip(self, request), fields(base = %request.base, filter = %request.filter))]
    async fn execute(&self, request: &SearchRequest) -> DirectoryResult<RawResultSet> {
        let mut ldap = self.handle().await?;

        let attributes: Vec<&str> = if request.attributes.is_empty() {
            vec!["*"]
        } else {
            request.attributes.iter().map(String::as_str).collect()
        };

        // Ordering is applied locally, so a sorted query must see every match
        // before the limit is taken.
        let server_limit = match request.sort {
            Some(_) => 0,
            None => request.size_limit,
        };
        if server_limit > 0 {
            ldap.with_search_options(SearchOptions::new().sizelimit(clamp_i32(server_limit)));
        }

        let mut adapters: Vec<Box<dyn Adapter<_, _>>> = vec![Box::new(EntriesOnly::new())];
        if request.page_size > 0 {
            adapters.push(Box::new(PagedResults::new(clamp_i32(request.page_size))));
        }

        let mut stream = self
            .timed(
                "search",
                ldap.streaming_search_with(
                    adapters,
                    &request.base,
                    to_scope(request.scope),
                    &request.filter,
                    attributes,
                ),
            )
            .await?;

        let mut entries = Vec::new();
        while let Some(entry) = self.timed("search", stream.next()).await? {
            entries.push(to_raw_entry(SearchEntry::construct(entry)));
        }
        let result = stream.finish().await;

        let mut results = RawResultSet::new(entries);
        match result.rc {
            RC_SUCCESS => {}
            RC_SIZE_LIMIT_EXCEEDED => results.truncated = true,
            _ => check(result, "search", &request.base)?,
        }

        if let Some((attribute, direction)) = &request.sort {
            results.sort_by(attribute, *direction);
        }
        results.truncate(request.size_limit);

        debug!(returned = results.len(), truncated = results.truncated, "LDAP search completed");
        Ok(results)
    }

    #[instrument(skip(self, modifications))]
    async fn apply_modify(&self, dn: &str, modifications: &[Modification]) -> DirectoryResult<()> {
        let mut ldap = self.handle().await?;
        let mods: Vec<Mod<Vec<u8>>> = modifications.iter().map(to_mod).collect();

        debug!(modifications = mods.len(), "Modifying LDAP entry");
        let result = self.timed("modify", ldap.modify(dn, mods)).await?;
        check(result, "modify", dn)?;

        info!("LDAP entry modified");
        Ok(())
    }

    #[instrument(skip(self, attributes))]
    async fn add(&self, dn: &str, attributes: &[(String, Vec<RawValue>)]) -> DirectoryResult<()> {
        let mut ldap = self.handle().await?;
        let entry: Vec<(Vec<u8>, HashSet<Vec<u8>>)> = attributes
            .iter()
            .filter(|(_, values)| !values.is_empty())
            .map(|(name, values)| (name.as_bytes().to_vec(), to_value_set(values)))
            .collect();

        let result = self.timed("add", ldap.add(dn, entry)).await?;
        check(result, "add", dn)?;

        info!("LDAP entry created");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, dn: &str) -> DirectoryResult<()> {
        let mut ldap = self.handle().await?;
        let result = self.timed("delete", ldap.delete(dn)).await?;
        check(result, "delete", dn)?;

        info!("LDAP entry deleted");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn modify_dn(&self, dn: &str, new_rdn: &str, new_superior: Option<&str>) -> DirectoryResult<()> {
        let mut ldap = self.handle().await?;
        let result = self
            .timed("modify DN", ldap.modifydn(dn, new_rdn, true, new_superior))
            .await?;
        check(result, "modify DN", dn)?;

        info!("LDAP entry renamed");
        Ok(())
    }
}

/// Turn a non-success result into a transport failure carrying its code.
fn check(result: LdapResult, operation: &str, dn: &str) -> DirectoryResult<()> {
    if result.rc == RC_SUCCESS {
        return Ok(());
    }
    let detail = if result.text.is_empty() {
        String::new()
    } else {
        format!(": {}", result.text)
    };
    Err(DirectoryError::transport_with_code(
        result.rc,
        format!("LDAP {operation} failed for '{dn}'{detail}"),
    ))
}

fn clamp_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

pub(crate) fn to_scope(scope: SearchScope) -> Scope {
    match scope {
        SearchScope::Base => Scope::Base,
        SearchScope::OneLevel => Scope::OneLevel,
        SearchScope::Subtree => Scope::Subtree,
    }
}

/// Text values stay text; values ldap3 could not decode as UTF-8 stay binary.
/// Attributes are ordered by name.
pub(crate) fn to_raw_entry(entry: SearchEntry) -> RawEntry {
    let mut attributes: Vec<(String, Vec<RawValue>)> = entry
        .attrs
        .into_iter()
        .map(|(name, values)| (name, values.into_iter().map(RawValue::Text).collect()))
        .chain(
            entry
                .bin_attrs
                .into_iter()
                .map(|(name, values)| (name, values.into_iter().map(RawValue::Binary).collect())),
        )
        .collect();
    attributes.sort_by(|(a, _), (b, _)| a.to_ascii_lowercase().cmp(&b.to_ascii_lowercase()));

    RawEntry {
        dn: entry.dn,
        attributes,
    }
}

fn to_value_set(values: &[RawValue]) -> HashSet<Vec<u8>> {
    values.iter().map(|v| v.as_bytes().to_vec()).collect()
}

pub(crate) fn to_mod(modification: &Modification) -> Mod<Vec<u8>> {
    match modification {
        Modification::Add { attribute, values } => {
            Mod::Add(attribute.as_bytes().to_vec(), to_value_set(values))
        }
        Modification::Replace { attribute, values } => {
            Mod::Replace(attribute.as_bytes().to_vec(), to_value_set(values))
        }
        Modification::Delete { attribute, values } => {
            Mod::Delete(attribute.as_bytes().to_vec(), to_value_set(values))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_to_raw_entry_keeps_binary() {
        let entry = SearchEntry {
            dn: "CN=Jane Doe,DC=corp,DC=com".to_string(),
            attrs: HashMap::from([
                ("sAMAccountName".to_string(), vec!["jdoe".to_string()]),
                ("cn".to_string(), vec!["Jane Doe".to_string()]),
            ]),
            bin_attrs: HashMap::from([("objectGUID".to_string(), vec![vec![0xff; 16]])]),
        };

        let raw = to_raw_entry(entry);
        assert_eq!(raw.dn, "CN=Jane Doe,DC=corp,DC=com");
        let names: Vec<&str> = raw.attributes.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["cn", "objectGUID", "sAMAccountName"]);
        assert_eq!(raw.get("objectguid"), Some(&[RawValue::Binary(vec![0xff; 16])][..]));
        assert_eq!(raw.first_text("samaccountname"), Some("jdoe"));
    }

    #[test]
    fn test_to_mod() {
        let clear = Modification::Delete {
            attribute: "info".to_string(),
            values: vec![],
        };
        match to_mod(&clear) {
            Mod::Delete(name, values) => {
                assert_eq!(name, b"info".to_vec());
                assert!(values.is_empty());
            }
            _ => panic!("expected a delete"),
        }

        let replace = Modification::Replace {
            attribute: "userAccountControl".to_string(),
            values: vec![RawValue::from("514")],
        };
        match to_mod(&replace) {
            Mod::Replace(name, values) => {
                assert_eq!(name, b"userAccountControl".to_vec());
                assert_eq!(values, HashSet::from([b"514".to_vec()]));
            }
            _ => panic!("expected a replace"),
        }
    }

    #[test]
    fn test_to_scope() {
        assert!(matches!(to_scope(SearchScope::Base), Scope::Base));
        assert!(matches!(to_scope(SearchScope::OneLevel), Scope::OneLevel));
        assert!(matches!(to_scope(SearchScope::Subtree), Scope::Subtree));
    }

    #[test]
    fn test_check_result_codes() {
        let ok = LdapResult {
            rc: 0,
            matched: String::new(),
            text: String::new(),
            refs: vec![],
            ctrls: vec![],
        };
        assert!(check(ok, "modify", "CN=x").is_ok());

        let missing = LdapResult {
            rc: 32,
            matched: String::new(),
            text: "0000208D: NameErr".to_string(),
            refs: vec![],
            ctrls: vec![],
        };
        let err = check(missing, "delete", "CN=x").unwrap_err();
        assert!(matches!(err, DirectoryError::TransportFailure { code: Some(32), .. }));
        assert!(err.to_string().contains("NameErr"));
    }

    #[test]
    fn test_new_validates_config() {
        let err = LdapConnection::new(LdapConfig::new("", "DC=corp,DC=com", "CN=svc")).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CONFIG");
    }
}

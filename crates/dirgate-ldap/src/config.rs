//! LDAP connection configuration
//!
//! One [`LdapConfig`] per domain key, grouped in a [`DomainsConfig`] that
//! loads from `DIRGATE_DOMAINS` and `DIRGATE_<KEY>_*` variables.

use std::collections::BTreeMap;
use std::time::Duration;

use dirgate_directory::config::ConfigError;
use dirgate_directory::error::{DirectoryError, DirectoryResult};
use serde::{Deserialize, Serialize};

/// Connection settings for one directory.
#[derive(Clone, Serialize, Deserialize)]
pub struct LdapConfig {
    /// LDAP server hostname or IP address.
    pub host: String,

    /// LDAP server port (389 for LDAP, 636 for LDAPS).
    #[serde(default = "default_ldap_port")]
    pub port: u16,

    /// Use SSL/TLS (LDAPS).
    #[serde(default)]
    pub use_ssl: bool,

    /// Use STARTTLS upgrade on plain LDAP connection.
    #[serde(default)]
    pub use_starttls: bool,

    /// Naming context of the domain (e.g., "DC=corp,DC=example,DC=com").
    pub base_dn: String,

    /// Bind DN for authentication.
    pub bind_dn: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_password: Option<String>,

    /// Connect and per-operation timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl std::fmt::Debug for LdapConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdapConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("use_ssl", &self.use_ssl)
            .field("use_starttls", &self.use_starttls)
            .field("base_dn", &self.base_dn)
            .field("bind_dn", &self.bind_dn)
            .field(
                "bind_password",
                &self.bind_password.as_ref().map(|_| "***REDACTED***"),
            )
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

fn default_ldap_port() -> u16 {
    389
}

fn default_timeout_secs() -> u64 {
    30
}

impl LdapConfig {
    /// Create a new LDAP config with required fields.
    pub fn new(
        host: impl Into<String>,
        base_dn: impl Into<String>,
        bind_dn: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: default_ldap_port(),
            use_ssl: false,
            use_starttls: false,
            base_dn: base_dn.into(),
            bind_dn: bind_dn.into(),
            bind_password: None,
            timeout_secs: default_timeout_secs(),
        }
    }

    /// Set bind password.
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.bind_password = Some(password.into());
        self
    }

    /// Enable SSL (LDAPS).
    #[must_use]
    pub fn with_ssl(mut self) -> Self {
        self.use_ssl = true;
        self.port = 636;
        self
    }

    /// Enable STARTTLS.
    #[must_use]
    pub fn with_starttls(mut self) -> Self {
        self.use_starttls = true;
        self
    }

    /// Get the LDAP URL.
    #[must_use]
    pub fn url(&self) -> String {
        let scheme = if self.use_ssl { "ldaps" } else { "ldap" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Check the settings are usable.
    pub fn validate(&self) -> DirectoryResult<()> {
        let invalid = |message: &str| -> DirectoryResult<()> {
            Err(DirectoryError::InvalidConfiguration {
                message: message.to_string(),
            })
        };

        if self.host.is_empty() {
            return invalid("host is required");
        }
        if self.base_dn.is_empty() {
            return invalid("base_dn is required");
        }
        if self.bind_dn.is_empty() {
            return invalid("bind_dn is required");
        }
        if self.use_ssl && self.use_starttls {
            return invalid("cannot use both SSL and STARTTLS");
        }
        if self.timeout_secs == 0 {
            return invalid("timeout_secs must be greater than 0");
        }
        Ok(())
    }
}

/// Directories served, keyed by lowercase domain key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DomainsConfig {
    pub domains: BTreeMap<String, LdapConfig>,
}

impl DomainsConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_reader(|key| std::env::var(key))
    }

    /// Load configuration from a custom variable reader.
    ///
    /// `DIRGATE_DOMAINS` lists the domain keys; each key `corp` then reads
    /// `DIRGATE_CORP_HOST`, `DIRGATE_CORP_BASE_DN`, `DIRGATE_CORP_BIND_DN`
    /// and the optional `_PORT`, `_USE_SSL`, `_STARTTLS`, `_BIND_PASSWORD`,
    /// `_TIMEOUT_SECS`.
    pub fn from_reader<F>(reader: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let keys = reader("DIRGATE_DOMAINS")
            .map_err(|_| ConfigError::MissingVar("DIRGATE_DOMAINS".into()))?;

        let mut domains = BTreeMap::new();
        for key in keys.split(',').map(str::trim).filter(|k| !k.is_empty()) {
            let config = domain_from_reader(&reader, key)?;
            domains.insert(key.to_ascii_lowercase(), config);
        }

        if domains.is_empty() {
            return Err(ConfigError::InvalidValue(
                "DIRGATE_DOMAINS".into(),
                "no domain keys listed".into(),
            ));
        }
        Ok(Self { domains })
    }

    pub fn get(&self, domain_key: &str) -> Option<&LdapConfig> {
        self.domains.get(&domain_key.to_ascii_lowercase())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &LdapConfig)> {
        self.domains.iter().map(|(key, config)| (key.as_str(), config))
    }
}

fn domain_from_reader<F>(reader: &F, key: &str) -> Result<LdapConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let prefix = format!("DIRGATE_{}", key.to_ascii_uppercase().replace('-', "_"));
    let var = |suffix: &str| format!("{prefix}_{suffix}");
    let required = |suffix: &str| {
        let name = var(suffix);
        reader(&name).map_err(|_| ConfigError::MissingVar(name))
    };
    let flag = |suffix: &str| -> Result<bool, ConfigError> {
        let name = var(suffix);
        reader(&name)
            .unwrap_or_else(|_| "false".to_string())
            .parse::<bool>()
            .map_err(|e| ConfigError::InvalidValue(name, e.to_string()))
    };

    let use_ssl = flag("USE_SSL")?;
    let use_starttls = flag("STARTTLS")?;
    let default_port = if use_ssl { 636 } else { default_ldap_port() };

    let port_var = var("PORT");
    let port = match reader(&port_var) {
        Ok(port) => port
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidValue(port_var, e.to_string()))?,
        Err(_) => default_port,
    };

    let timeout_var = var("TIMEOUT_SECS");
    let timeout_secs = match reader(&timeout_var) {
        Ok(secs) => secs
            .parse::<u64>()
            .map_err(|e| ConfigError::InvalidValue(timeout_var, e.to_string()))?,
        Err(_) => default_timeout_secs(),
    };

    let config = LdapConfig {
        host: required("HOST")?,
        port,
        use_ssl,
        use_starttls,
        base_dn: required("BASE_DN")?,
        bind_dn: required("BIND_DN")?,
        bind_password: reader(&var("BIND_PASSWORD")).ok(),
        timeout_secs,
    };
    config
        .validate()
        .map_err(|e| ConfigError::InvalidValue(prefix, e.to_string()))?;
    Ok(config)
}

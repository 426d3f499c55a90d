//! Engine configuration
//!
//! Loaded from `DIRGATE_*` environment variables, or deserialized from JSON.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::search::{DefaultPropertySets, DEFAULT_PAGE_SIZE};

/// Object classes whose default property list can be overridden through
/// `DIRGATE_DEFAULT_PROPERTIES_<CLASS>`.
const CONFIGURABLE_CLASSES: &[&str] = &["user", "group", "computer", "contact", "organizationalUnit"];

/// Settings that shape queries and result mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Page size used when a query does not set one.
    pub default_page_size: u32,

    /// Upper bound applied to every query's size limit (0 = none).
    pub max_size_limit: u32,

    /// Use the built-in Active Directory catalog when a live schema cannot
    /// be read.
    pub schema_fallback: bool,

    /// Properties substituted for the `default` sentinel.
    pub default_properties: DefaultPropertySets,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_page_size: DEFAULT_PAGE_SIZE,
            max_size_limit: 0,
            schema_fallback: true,
            default_properties: DefaultPropertySets::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_reader(|key| std::env::var(key))
    }

    /// Load configuration from a custom variable reader.
    ///
    /// This allows tests to supply variables without mutating process-global
    /// environment state.
    pub fn from_reader<F>(reader: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let default_page_size = reader("DIRGATE_PAGE_SIZE")
            .unwrap_or_else(|_| DEFAULT_PAGE_SIZE.to_string())
            .parse::<u32>()
            .map_err(|e| ConfigError::InvalidValue("DIRGATE_PAGE_SIZE".into(), e.to_string()))?;
        if default_page_size == 0 {
            return Err(ConfigError::InvalidValue(
                "DIRGATE_PAGE_SIZE".into(),
                "must be greater than 0".into(),
            ));
        }

        let max_size_limit = reader("DIRGATE_SIZE_LIMIT")
            .unwrap_or_else(|_| "0".to_string())
            .parse::<u32>()
            .map_err(|e| ConfigError::InvalidValue("DIRGATE_SIZE_LIMIT".into(), e.to_string()))?;

        let schema_fallback = match reader("DIRGATE_SCHEMA_FALLBACK") {
            Ok(raw) => raw.trim().parse::<bool>().unwrap_or_else(|_| {
                warn!(value = %raw, "Invalid DIRGATE_SCHEMA_FALLBACK, using default (true)");
                true
            }),
            Err(_) => true,
        };

        let mut default_properties = DefaultPropertySets::default();
        if let Ok(list) = reader("DIRGATE_DEFAULT_PROPERTIES") {
            default_properties.set_fallback(parse_list("DIRGATE_DEFAULT_PROPERTIES", &list)?);
        }
        for class in CONFIGURABLE_CLASSES {
            let key = format!("DIRGATE_DEFAULT_PROPERTIES_{}", class.to_ascii_uppercase());
            if let Ok(list) = reader(&key) {
                default_properties.insert(class, parse_list(&key, &list)?);
            }
        }

        Ok(Self {
            default_page_size,
            max_size_limit,
            schema_fallback,
            default_properties,
        })
    }

    /// Clamp a requested size limit to the configured maximum.
    #[must_use]
    pub fn effective_size_limit(&self, requested: u32) -> u32 {
        match (self.max_size_limit, requested) {
            (0, requested) => requested,
            (max, 0) => max,
            (max, requested) => requested.min(max),
        }
    }
}

fn parse_list(key: &str, list: &str) -> Result<Vec<String>, ConfigError> {
    let items: Vec<String> = list
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    if items.is_empty() {
        return Err(ConfigError::InvalidValue(key.into(), "empty property list".into()));
    }
    Ok(items)
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(String),

    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::env::VarError;

    /// Create a reader closure from a HashMap (no global env mutation).
    fn make_reader(vars: HashMap<&str, &str>) -> impl Fn(&str) -> Result<String, VarError> {
        let owned: HashMap<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| owned.get(key).cloned().ok_or(VarError::NotPresent)
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::from_reader(make_reader(HashMap::new())).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.default_page_size, 500);
        assert!(config.schema_fallback);
        assert!(config
            .default_properties
            .for_class(Some("user"))
            .iter()
            .any(|p| p == "sAMAccountName"));
    }

    #[test]
    fn test_custom_values() {
        let config = EngineConfig::from_reader(make_reader(HashMap::from([
            ("DIRGATE_PAGE_SIZE", "200"),
            ("DIRGATE_SIZE_LIMIT", "1000"),
            ("DIRGATE_SCHEMA_FALLBACK", "false"),
            ("DIRGATE_DEFAULT_PROPERTIES", "distinguishedName, cn"),
            ("DIRGATE_DEFAULT_PROPERTIES_USER", "sAMAccountName,mail"),
        ])))
        .unwrap();

        assert_eq!(config.default_page_size, 200);
        assert_eq!(config.max_size_limit, 1000);
        assert!(!config.schema_fallback);
        assert_eq!(
            config.default_properties.for_class(Some("printQueue")),
            ["distinguishedName".to_string(), "cn".to_string()]
        );
        assert_eq!(
            config.default_properties.for_class(Some("User")),
            ["sAMAccountName".to_string(), "mail".to_string()]
        );
        // Classes not overridden keep the built-in lists.
        assert!(config
            .default_properties
            .for_class(Some("group"))
            .iter()
            .any(|p| p == "groupType"));
    }

    #[test]
    fn test_invalid_page_size() {
        for value in ["zero", "0"] {
            let err = EngineConfig::from_reader(make_reader(HashMap::from([("DIRGATE_PAGE_SIZE", value)])))
                .unwrap_err();
            assert!(matches!(err, ConfigError::InvalidValue(..)));
            assert!(err.to_string().contains("DIRGATE_PAGE_SIZE"));
        }
    }

    #[test]
    fn test_unparseable_fallback_keeps_default() {
        let config = EngineConfig::from_reader(make_reader(HashMap::from([(
            "DIRGATE_SCHEMA_FALLBACK",
            "nope",
        )])))
        .unwrap();
        assert!(config.schema_fallback);

        let config = EngineConfig::from_reader(make_reader(HashMap::from([(
            "DIRGATE_SCHEMA_FALLBACK",
            " false ",
        )])))
        .unwrap();
        assert!(!config.schema_fallback);
    }

    #[test]
    fn test_empty_property_list_rejected() {
        let err = EngineConfig::from_reader(make_reader(HashMap::from([(
            "DIRGATE_DEFAULT_PROPERTIES_GROUP",
            " , ",
        )])))
        .unwrap_err();
        assert!(err.to_string().contains("DIRGATE_DEFAULT_PROPERTIES_GROUP"));
    }

    #[test]
    fn test_effective_size_limit() {
        let mut config = EngineConfig::default();
        assert_eq!(config.effective_size_limit(25), 25);
        config.max_size_limit = 100;
        assert_eq!(config.effective_size_limit(0), 100);
        assert_eq!(config.effective_size_limit(25), 25);
        assert_eq!(config.effective_size_limit(250), 100);
    }

    #[test]
    fn test_deserialize_partial_json() {
        let config: EngineConfig = serde_json::from_str(r#"{"default_page_size": 50}"#).unwrap();
        assert_eq!(config.default_page_size, 50);
        assert!(config.schema_fallback);
    }
}

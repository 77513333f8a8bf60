use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;

use crate::errors::{RetryConfig, StoreError};

/// Contents of `db.properties`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DbConfig {
    /// Dialect name; selects `<db_type>.properties`.
    pub db_type: String,
    /// Facade implementation to instantiate.
    pub class: String,
    pub url: String,
    pub user: String,
    #[serde(skip_serializing)]
    pub password: String,
}

impl DbConfig {
    pub fn from_properties(properties: &HashMap<String, String>) -> Result<Self, StoreError> {
        let required = |key: &str| -> Result<String, StoreError> {
            properties
                .get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| StoreError::Config(format!("Missing required property '{}'", key)))
        };
        let optional = |key: &str| properties.get(key).cloned().unwrap_or_default();

        Ok(Self {
            db_type: required("db.type")?,
            class: required("db.class")?,
            url: required("db.url")?,
            user: optional("db.user"),
            password: optional("db.password"),
        })
    }
}

/// Tuning applied to every connection of the embedded backend.
#[derive(Debug, Clone)]
pub struct EmbeddedOptions {
    /// When false the engine keeps its rollback journal in memory only.
    pub transaction_log: bool,
    pub busy_timeout: Duration,
    pub retry: RetryConfig,
}

impl Default for EmbeddedOptions {
    fn default() -> Self {
        Self {
            transaction_log: true,
            busy_timeout: Duration::from_secs(5),
            retry: RetryConfig::default(),
        }
    }
}

/// Tuning for connections opened by the generic backend.
#[derive(Debug, Clone)]
pub struct GenericOptions {
    pub busy_timeout: Duration,
    pub retry: RetryConfig,
}

impl Default for GenericOptions {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_secs(5),
            retry: RetryConfig::default(),
        }
    }
}

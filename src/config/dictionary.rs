use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::errors::StoreError;
use super::parser::{parse_properties, parse_properties_file};

/// SQL dialect shipped with the crate and used by the embedded backend.
pub const BUNDLED_DIALECT: &str = "sqlite";

static BUNDLED_SQL: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/config/db/sqlite.properties"));

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{(\d+)\}").expect("placeholder pattern is valid")
});

/// Per-dialect mapping from logical operation keys to parameterized SQL.
#[derive(Debug, Clone)]
pub struct SqlDictionary {
    dialect: String,
    statements: HashMap<String, String>,
}

impl SqlDictionary {
    pub fn new(dialect: impl Into<String>, statements: HashMap<String, String>) -> Self {
        Self { dialect: dialect.into(), statements }
    }

    /// The SQLite dictionary compiled into the crate.
    pub fn bundled() -> Result<Self, StoreError> {
        Ok(Self::new(BUNDLED_DIALECT, parse_properties(BUNDLED_SQL)?))
    }

    /// Load `<dialect>.properties` from `dir`.
    pub fn load(dir: &Path, dialect: &str) -> Result<Self, StoreError> {
        let path = dir.join(format!("{}.properties", dialect));
        Ok(Self::new(dialect, parse_properties_file(&path)?))
    }

    pub fn dialect(&self) -> &str {
        &self.dialect
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.statements.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Result<&str, StoreError> {
        self.statements.get(key).map(String::as_str).ok_or_else(|| {
            StoreError::Config(format!("No SQL for '{}' in the {} dictionary", key, self.dialect))
        })
    }

    /// Expand `{N}` placeholders into `arities[N]` comma separated `?` markers.
    pub fn render(&self, key: &str, arities: &[usize]) -> Result<String, StoreError> {
        let template = self.get(key)?;
        let mut missing = None;
        let rendered = PLACEHOLDER.replace_all(template, |caps: &regex::Captures<'_>| {
            let arity = caps[1].parse::<usize>().ok().and_then(|i| arities.get(i).copied());
            match arity {
                Some(n) if n > 0 => vec!["?"; n].join(", "),
                _ => {
                    missing.get_or_insert_with(|| caps[0].to_string());
                    String::new()
                }
            }
        });

        if let Some(placeholder) = missing {
            return Err(StoreError::Config(format!(
                "No arity supplied for {} in '{}'", placeholder, key
            )));
        }
        Ok(rendered.into_owned())
    }
}

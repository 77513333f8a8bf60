pub mod parser;
pub mod dictionary;
pub mod types;

use std::path::Path;

pub use types::*;
pub use dictionary::SqlDictionary;
pub use parser::{parse_properties, parse_properties_file};

use crate::errors::StoreError;

/// Name of the backend selection file inside the config directory.
pub const DB_PROPERTIES: &str = "db.properties";

/// Load `db.properties` and the dialect dictionary it names from `dir`.
pub fn load_db_config(dir: &Path) -> Result<(DbConfig, SqlDictionary), StoreError> {
    let properties = parse_properties_file(&dir.join(DB_PROPERTIES))?;
    let config = DbConfig::from_properties(&properties)?;
    let dictionary = SqlDictionary::load(dir, &config.db_type)?;
    Ok((config, dictionary))
}

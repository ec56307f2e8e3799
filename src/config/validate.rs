// src/config/validate.rs

use std::collections::{HashMap, HashSet};

use crate::config::model::{CollectionDescriptor, ConfigFile, ConnectionConfig, RawConfigFile};
use crate::errors::ConfigurationError;

type Result<T> = std::result::Result<T, ConfigurationError>;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = ConfigurationError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_connection(&raw.connection)?;

        let collections: Vec<CollectionDescriptor> = raw
            .collection
            .into_iter()
            .map(|(identity, section)| CollectionDescriptor::from_section(&identity, section))
            .collect();
        validate_collections(&collections)?;

        Ok(ConfigFile::new_unchecked(raw.connection, collections))
    }
}

/// Check database settings and the identifier property name.
pub fn validate_connection(cfg: &ConnectionConfig) -> Result<()> {
    if cfg.database.name.trim().is_empty() {
        return Err(ConfigurationError::Invalid(
            "[connection.database].name must not be empty".to_string(),
        ));
    }

    let id = &cfg.id_property;
    if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ConfigurationError::Invalid(format!(
            "[connection].id_property must be a non-empty identifier (got '{id}')"
        )));
    }

    Ok(())
}

/// Check collection declarations.
///
/// - identities and table names must be non-empty
/// - identities must be unique
/// - no two collections may share a table name, since the class map could
///   not tell them apart
pub fn validate_collections(collections: &[CollectionDescriptor]) -> Result<()> {
    let mut identities: HashSet<&str> = HashSet::new();
    let mut tables: HashMap<&str, &str> = HashMap::new();

    for collection in collections {
        if collection.identity.trim().is_empty() {
            return Err(ConfigurationError::Invalid(
                "collection identity must not be empty".to_string(),
            ));
        }
        if collection.table_name.trim().is_empty() {
            return Err(ConfigurationError::Invalid(format!(
                "collection '{}' has an empty table_name",
                collection.identity
            )));
        }
        if !identities.insert(&collection.identity) {
            return Err(ConfigurationError::Invalid(format!(
                "collection '{}' is declared more than once",
                collection.identity
            )));
        }
        if let Some(other) = tables.insert(&collection.table_name, &collection.identity) {
            return Err(ConfigurationError::Invalid(format!(
                "collections '{}' and '{}' both use table_name '{}'",
                other, collection.identity, collection.table_name
            )));
        }
    }

    Ok(())
}

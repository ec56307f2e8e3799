#![allow(dead_code)]

use std::collections::BTreeMap;

use serde_json::Value;
use vertexsync::config::{
    CollectionDescriptor, CollectionSection, ConfigFile, ConnectionConfig, DatabaseDescriptor,
    RawConfigFile, StorageKind,
};
use vertexsync::types::{Criteria, Record};

/// Builder for `ConnectionConfig` to simplify test setup.
pub struct ConnectionBuilder {
    config: ConnectionConfig,
}

impl ConnectionBuilder {
    pub fn new(database: &str) -> Self {
        let mut descriptor = DatabaseDescriptor::new(database);
        descriptor.storage = StorageKind::Memory;
        Self {
            config: ConnectionConfig::new(descriptor),
        }
    }

    pub fn custom_index(mut self, id_property: &str) -> Self {
        self.config = self.config.with_custom_index(id_property);
        self
    }

    pub fn server(mut self, host: &str, port: u16) -> Self {
        self.config.server.host = host.to_string();
        self.config.server.port = port;
        self
    }

    pub fn build(self) -> ConnectionConfig {
        self.config
    }
}

/// Builder for `ConfigFile`, going through the same validation as a loaded
/// file.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new(connection: ConnectionConfig) -> Self {
        Self {
            config: RawConfigFile {
                connection,
                collection: BTreeMap::new(),
            },
        }
    }

    pub fn with_collection(mut self, identity: &str, table_name: &str) -> Self {
        self.config.collection.insert(
            identity.to_string(),
            CollectionSection {
                table_name: Some(table_name.to_string()),
                options: BTreeMap::new(),
            },
        );
        self
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

/// `(identity, table_name)` pairs as descriptors.
pub fn collections(pairs: &[(&str, &str)]) -> Vec<CollectionDescriptor> {
    pairs
        .iter()
        .map(|(identity, table)| CollectionDescriptor::new(identity, table))
        .collect()
}

/// A JSON object literal as a record (or criteria) map.
pub fn record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

pub fn criteria(value: Value) -> Criteria {
    record(value)
}

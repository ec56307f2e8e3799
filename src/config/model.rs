// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [connection]
/// create_custom_index = true
/// id_property = "id"
///
/// [connection.server]
/// host = "localhost"
/// port = 2424
///
/// [connection.database]
/// name = "app"
/// type = "graph"
/// storage = "plocal"
///
/// [collection.user]
/// table_name = "Users"
/// ```
///
/// This is the raw deserialized form; use [`ConfigFile`] (via `TryFrom`) for
/// a validated config.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    pub connection: ConnectionConfig,

    /// All collections from `[collection.<identity>]`.
    ///
    /// Keys are the logical identities callers use (e.g. `"user"`).
    #[serde(default)]
    pub collection: BTreeMap<String, CollectionSection>,
}

/// A validated configuration.
///
/// Can only be constructed via `TryFrom<RawConfigFile>`, which checks
/// database settings and collection declarations.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub connection: ConnectionConfig,
    pub collections: Vec<CollectionDescriptor>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        connection: ConnectionConfig,
        collections: Vec<CollectionDescriptor>,
    ) -> Self {
        Self {
            connection,
            collections,
        }
    }
}

/// `[connection]` section: where the database lives and how schema
/// synchronization behaves.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default)]
    pub server: ServerConfig,

    pub database: DatabaseDescriptor,

    /// Ensure a uniquely indexed identifier property on the base vertex
    /// class during synchronization.
    #[serde(default)]
    pub create_custom_index: bool,

    /// Name of the identifier property (and of the `V.<id_property>` index).
    #[serde(default = "default_id_property")]
    pub id_property: String,
}

fn default_id_property() -> String {
    "id".to_string()
}

impl ConnectionConfig {
    pub fn new(database: DatabaseDescriptor) -> Self {
        Self {
            server: ServerConfig::default(),
            database,
            create_custom_index: false,
            id_property: default_id_property(),
        }
    }

    pub fn with_custom_index(mut self, id_property: &str) -> Self {
        self.create_custom_index = true;
        self.id_property = id_property.to_string();
        self
    }
}

/// `[connection.server]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_username")]
    pub username: String,

    #[serde(default)]
    pub password: String,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    2424
}

fn default_username() -> String {
    "root".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            username: default_username(),
            password: String::new(),
        }
    }
}

/// `[connection.database]` section: identifies the logical database and how
/// to create it when it does not exist yet.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DatabaseDescriptor {
    pub name: String,

    #[serde(default, rename = "type")]
    pub kind: DatabaseKind,

    #[serde(default)]
    pub storage: StorageKind,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,
}

impl DatabaseDescriptor {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: DatabaseKind::default(),
            storage: StorageKind::default(),
            username: None,
            password: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseKind {
    #[default]
    Graph,
    Document,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// Persistent, on the server's disk.
    #[default]
    Plocal,
    /// Volatile, lost on server restart.
    Memory,
}

/// `[collection.<identity>]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CollectionSection {
    /// Database class backing this collection. Defaults to the identity.
    #[serde(default)]
    pub table_name: Option<String>,

    /// Free-form per-collection settings, passed through untouched.
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

/// Application-level declaration of a collection and the class backing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionDescriptor {
    /// Logical name callers use.
    pub identity: String,
    /// Target database class name.
    pub table_name: String,
    pub options: BTreeMap<String, String>,
}

impl CollectionDescriptor {
    pub fn new(identity: &str, table_name: &str) -> Self {
        Self {
            identity: identity.to_string(),
            table_name: table_name.to_string(),
            options: BTreeMap::new(),
        }
    }

    pub(crate) fn from_section(identity: &str, section: CollectionSection) -> Self {
        Self {
            identity: identity.to_string(),
            table_name: section.table_name.unwrap_or_else(|| identity.to_string()),
            options: section.options,
        }
    }
}

// src/config/mod.rs

//! Configuration loading and validation for vertexsync.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate connection settings and collection declarations (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{
    CollectionDescriptor, CollectionSection, ConfigFile, ConnectionConfig, DatabaseDescriptor,
    DatabaseKind, RawConfigFile, ServerConfig, StorageKind,
};
pub use validate::{validate_collections, validate_connection};

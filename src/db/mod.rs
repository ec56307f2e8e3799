// src/db/mod.rs

//! Database driver abstraction.
//!
//! The orchestration layers talk to a [`Server`] and a [`Database`] instead
//! of a concrete client. This keeps the synchronizer and the record gateway
//! independent of the wire protocol, and lets tests swap in a recording or
//! failing driver.
//!
//! - [`memory`] is an in-process implementation used by the CLI and tests.

pub mod memory;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use thiserror::Error;

use crate::config::DatabaseDescriptor;
use crate::types::{ClassHandle, Criteria, DbRecord, Index, IndexSpec, Property, PropertyType};

pub use memory::{MemoryDatabase, MemoryServer};

/// Boxed future returned by driver operations.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub type DbResult<T> = std::result::Result<T, DbError>;

/// Errors reported by a database driver.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DbError {
    #[error("{kind} '{name}' not found")]
    NotFound { kind: &'static str, name: String },

    #[error("{kind} '{name}' already exists")]
    AlreadyExists { kind: &'static str, name: String },

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("constraint violation on index '{index}': duplicate value {value}")]
    ConstraintViolation { index: String, value: String },

    #[error("database backend error: {0}")]
    Backend(String),
}

impl DbError {
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        DbError::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub fn already_exists(kind: &'static str, name: impl Into<String>) -> Self {
        DbError::AlreadyExists {
            kind,
            name: name.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DbError::NotFound { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, DbError::AlreadyExists { .. })
    }
}

/// Summary of a database as listed by a server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseInfo {
    pub name: String,
}

/// A select against one class.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectQuery {
    pub class: String,
    pub criteria: Criteria,
    pub limit: Option<usize>,
}

/// Server-level operations: which databases exist, creating and opening them.
pub trait Server: Send + Sync {
    fn list_databases(&self) -> BoxFuture<'_, DbResult<Vec<DatabaseInfo>>>;

    fn create_database<'a>(
        &'a self,
        descriptor: &'a DatabaseDescriptor,
    ) -> BoxFuture<'a, DbResult<Arc<dyn Database>>>;

    fn use_database<'a>(
        &'a self,
        descriptor: &'a DatabaseDescriptor,
    ) -> BoxFuture<'a, DbResult<Arc<dyn Database>>>;
}

/// Operations on one open database.
///
/// Schema lookups report absence as [`DbError::NotFound`]; callers decide
/// whether that is an error.
pub trait Database: Send + Sync {
    fn name(&self) -> &str;

    fn get_class<'a>(&'a self, name: &'a str) -> BoxFuture<'a, DbResult<ClassHandle>>;

    fn list_classes(&self) -> BoxFuture<'_, DbResult<Vec<ClassHandle>>>;

    /// Create `name` as a subclass of `parent`.
    fn create_class<'a>(
        &'a self,
        name: &'a str,
        parent: &'a str,
    ) -> BoxFuture<'a, DbResult<ClassHandle>>;

    fn drop_class<'a>(&'a self, name: &'a str) -> BoxFuture<'a, DbResult<()>>;

    fn list_properties<'a>(&'a self, class: &'a str) -> BoxFuture<'a, DbResult<Vec<Property>>>;

    fn create_property<'a>(
        &'a self,
        class: &'a str,
        name: &'a str,
        kind: PropertyType,
    ) -> BoxFuture<'a, DbResult<Property>>;

    fn get_index<'a>(&'a self, name: &'a str) -> BoxFuture<'a, DbResult<Index>>;

    fn create_index<'a>(&'a self, spec: &'a IndexSpec) -> BoxFuture<'a, DbResult<Index>>;

    fn select(&self, query: SelectQuery) -> BoxFuture<'_, DbResult<Vec<DbRecord>>>;

    /// Insert a record and return it as stored, including its record id.
    fn insert<'a>(&'a self, class: &'a str, fields: DbRecord) -> BoxFuture<'a, DbResult<DbRecord>>;

    /// Set `values` on every record of `class` matching `criteria`; returns
    /// the number of records updated.
    fn update<'a>(
        &'a self,
        class: &'a str,
        criteria: Criteria,
        values: DbRecord,
    ) -> BoxFuture<'a, DbResult<u64>>;

    /// Delete every record of `class` matching `criteria`; returns the number
    /// of records deleted.
    fn delete<'a>(&'a self, class: &'a str, criteria: Criteria) -> BoxFuture<'a, DbResult<u64>>;
}

// src/engine/mod.rs

//! Connection engine for vertexsync.
//!
//! This module ties together:
//! - the connection gate that owns the shared server client ([`gate`])
//! - schema synchronization driven by task graphs ([`schema`])
//! - the record gateway handed to callers ([`gateway`])
//! - post-query value rendering ([`transform`])

pub mod gate;
pub mod gateway;
pub mod schema;
pub mod transform;

pub use gate::{ConnectionGate, ServerFactory};
pub use gateway::{ConnectionHandle, FindOptions, connect, connect_with};
pub use schema::{ClassMap, SchemaStep, SchemaSynchronizer, SyncOptions};
pub use transform::{RecordIdTransform, Transformers, ValueTransform};

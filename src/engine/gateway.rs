// src/engine/gateway.rs

//! Caller-facing connection surface.
//!
//! [`connect`] validates the declared collections, acquires the database
//! through the [`ConnectionGate`], runs schema synchronization and hands back
//! a [`ConnectionHandle`]. Record operations on the handle resolve a
//! collection identity through the synchronized [`ClassMap`], forward to the
//! database and render every returned value through [`Transformers`].

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::{CollectionDescriptor, ConnectionConfig, validate_collections, validate_connection};
use crate::db::{Database, DbError, SelectQuery};
use crate::engine::gate::ConnectionGate;
use crate::engine::schema::{ClassMap, SchemaSynchronizer, SyncOptions};
use crate::engine::transform::Transformers;
use crate::errors::{Result, VertexsyncError};
use crate::types::{ClassHandle, Criteria, Record, record_from_json};

/// Filter and limit for [`ConnectionHandle::find`].
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub criteria: Criteria,
    pub limit: Option<usize>,
}

impl FindOptions {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn matching(criteria: Criteria) -> Self {
        Self {
            criteria,
            limit: None,
        }
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Connect with the default value transformers.
pub async fn connect(
    gate: &ConnectionGate,
    config: ConnectionConfig,
    collections: Vec<CollectionDescriptor>,
) -> Result<ConnectionHandle> {
    connect_with(gate, config, collections, Transformers::default()).await
}

/// Connect and synchronize, rendering query results with `transformers`.
///
/// Nothing is published unless synchronization succeeded as a whole; calling
/// again after a failure is safe.
pub async fn connect_with(
    gate: &ConnectionGate,
    config: ConnectionConfig,
    collections: Vec<CollectionDescriptor>,
    transformers: Transformers,
) -> Result<ConnectionHandle> {
    validate_connection(&config)?;
    validate_collections(&collections)?;

    info!(
        database = %config.database.name,
        collections = collections.len(),
        "connecting"
    );

    let db = gate.acquire(&config).await?;
    let collections: Arc<[CollectionDescriptor]> = collections.into();
    let synchronizer =
        SchemaSynchronizer::new(db.clone(), collections.clone(), SyncOptions::from(&config));

    let classes = match synchronizer.sync().await {
        Ok(classes) => classes,
        Err(err) => {
            warn!(database = %config.database.name, error = %err, "schema synchronization failed");
            return Err(err);
        }
    };

    Ok(ConnectionHandle {
        db,
        classes: Arc::new(classes),
        collections,
        transformers,
    })
}

/// A synchronized connection. Cheap to clone.
#[derive(Clone)]
pub struct ConnectionHandle {
    db: Arc<dyn Database>,
    classes: Arc<ClassMap>,
    collections: Arc<[CollectionDescriptor]>,
    transformers: Transformers,
}

impl ConnectionHandle {
    pub fn database(&self) -> &Arc<dyn Database> {
        &self.db
    }

    pub fn classes(&self) -> &ClassMap {
        &self.classes
    }

    pub fn collections(&self) -> &[CollectionDescriptor] {
        &self.collections
    }

    /// Class backing `collection`, by identity (or raw class name).
    pub fn class(&self, collection: &str) -> Result<&ClassHandle> {
        self.classes
            .get(collection)
            .ok_or_else(|| VertexsyncError::UnknownCollection(collection.to_string()))
    }

    pub async fn find(&self, collection: &str, options: FindOptions) -> Result<Vec<Record>> {
        let class = self.class(collection)?;
        debug!(collection, class = %class.name, limit = ?options.limit, "find");

        let query = SelectQuery {
            class: class.name.clone(),
            criteria: options.criteria,
            limit: options.limit,
        };
        let rows = self
            .db
            .select(query)
            .await
            .map_err(|e| query_failed(collection, e))?;

        Ok(rows
            .iter()
            .map(|row| self.transformers.record_to_json(row))
            .collect())
    }

    /// Insert one record and return it as stored.
    pub async fn create(&self, collection: &str, fields: Record) -> Result<Record> {
        let class = self.class(collection)?;
        debug!(collection, class = %class.name, "create");

        let stored = self
            .db
            .insert(&class.name, record_from_json(fields))
            .await
            .map_err(|e| query_failed(collection, e))?;
        Ok(self.transformers.record_to_json(&stored))
    }

    /// Returns the number of records updated.
    pub async fn update(&self, collection: &str, criteria: Criteria, values: Record) -> Result<u64> {
        let class = self.class(collection)?;
        debug!(collection, class = %class.name, "update");

        self.db
            .update(&class.name, criteria, record_from_json(values))
            .await
            .map_err(|e| query_failed(collection, e))
    }

    /// Returns the number of records deleted.
    pub async fn destroy(&self, collection: &str, criteria: Criteria) -> Result<u64> {
        let class = self.class(collection)?;
        debug!(collection, class = %class.name, "destroy");

        self.db
            .delete(&class.name, criteria)
            .await
            .map_err(|e| query_failed(collection, e))
    }

    /// Drop the collection's class, then each relation class in order.
    ///
    /// Relations are resolved through the class map when possible and used
    /// as raw class names otherwise. Returns the class names dropped. The
    /// class map is left as synchronized.
    pub async fn drop(&self, collection: &str, relations: &[&str]) -> Result<Vec<String>> {
        let class = self.class(collection)?;

        let mut targets = vec![class.name.clone()];
        targets.extend(relations.iter().map(|relation| {
            self.classes
                .get(relation)
                .map(|c| c.name.clone())
                .unwrap_or_else(|| relation.to_string())
        }));

        let mut dropped = Vec::with_capacity(targets.len());
        for target in targets {
            info!(collection, class = %target, "dropping class");
            self.db
                .drop_class(&target)
                .await
                .map_err(|e| query_failed(collection, e))?;
            dropped.push(target);
        }
        Ok(dropped)
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("database", &self.db.name())
            .field("classes", &self.classes)
            .field("transformers", &self.transformers)
            .finish()
    }
}

fn query_failed(collection: &str, cause: DbError) -> VertexsyncError {
    VertexsyncError::QueryFailed {
        collection: collection.to_string(),
        cause,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::config::DatabaseDescriptor;

    fn criteria(value: serde_json::Value) -> Criteria {
        match value {
            serde_json::Value::Object(map) => map,
            _ => panic!("criteria must be an object"),
        }
    }

    async fn handle() -> ConnectionHandle {
        let gate = ConnectionGate::memory();
        let cfg = ConnectionConfig::new(DatabaseDescriptor::new("app"));
        connect(&gate, cfg, vec![CollectionDescriptor::new("user", "Users")])
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn create_then_find_renders_record_ids() {
        let conn = handle().await;

        let created = conn
            .create("user", criteria(json!({"name": "ada"})))
            .await
            .unwrap();
        let rid = created["@rid"].as_str().expect("rid rendered as string");
        assert!(rid.starts_with('#'));

        let found = conn
            .find("user", FindOptions::matching(criteria(json!({"name": "ada"}))))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["@rid"], json!(rid));
    }

    #[tokio::test]
    async fn update_and_destroy_report_counts() {
        let conn = handle().await;
        for name in ["ada", "bob"] {
            conn.create("user", criteria(json!({"name": name, "active": true})))
                .await
                .unwrap();
        }

        let updated = conn
            .update(
                "user",
                criteria(json!({"name": "bob"})),
                criteria(json!({"active": false})),
            )
            .await
            .unwrap();
        assert_eq!(updated, 1);

        let removed = conn
            .destroy("user", criteria(json!({"active": true})))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(conn.find("user", FindOptions::all()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_collection_is_rejected() {
        let conn = handle().await;
        let err = conn.find("order", FindOptions::all()).await.unwrap_err();
        assert!(matches!(err, VertexsyncError::UnknownCollection(ref c) if c == "order"));
    }

    #[tokio::test]
    async fn drop_removes_class_and_relations() {
        let conn = handle().await;
        conn.database().create_class("Follows", "E").await.unwrap();

        let dropped = conn.drop("user", &["Follows"]).await.unwrap();
        assert_eq!(dropped, vec!["Users".to_string(), "Follows".to_string()]);
        assert!(conn.database().get_class("Users").await.is_err());
        assert!(conn.class("user").is_ok());
    }

    #[tokio::test]
    async fn invalid_collections_fail_before_connecting() {
        let gate = ConnectionGate::memory();
        let cfg = ConnectionConfig::new(DatabaseDescriptor::new("app"));
        let err = connect(
            &gate,
            cfg,
            vec![
                CollectionDescriptor::new("user", "Users"),
                CollectionDescriptor::new("admin", "Users"),
            ],
        )
        .await
        .unwrap_err();

        assert!(matches!(err, VertexsyncError::Configuration(_)));
        assert!(!gate.is_initialized());
    }
}

// src/engine/gate.rs

use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::config::{ConnectionConfig, ServerConfig};
use crate::db::{Database, DbResult, MemoryServer, Server};
use crate::errors::{Result, VertexsyncError};

/// Builds the server client on first use.
pub type ServerFactory = Box<dyn Fn(&ServerConfig) -> DbResult<Arc<dyn Server>> + Send + Sync>;

/// Owns the one server client shared by every connection made through it.
///
/// The client is built lazily by the factory on the first [`acquire`] and
/// reused afterwards; later server settings are ignored. Create one gate per
/// process and pass it by reference to everything that connects.
///
/// [`acquire`]: ConnectionGate::acquire
pub struct ConnectionGate {
    factory: ServerFactory,
    server: OnceCell<Arc<dyn Server>>,
}

impl ConnectionGate {
    pub fn new(factory: ServerFactory) -> Self {
        Self {
            factory,
            server: OnceCell::new(),
        }
    }

    /// Gate over a fresh in-process [`MemoryServer`].
    pub fn memory() -> Self {
        Self::new(Box::new(|_: &ServerConfig| -> DbResult<Arc<dyn Server>> {
            Ok(Arc::new(MemoryServer::new()))
        }))
    }

    /// Gate over an existing server client.
    pub fn with_server(server: Arc<dyn Server>) -> Self {
        Self::new(Box::new(move |_: &ServerConfig| -> DbResult<Arc<dyn Server>> {
            Ok(server.clone())
        }))
    }

    /// True once the server client has been built.
    pub fn is_initialized(&self) -> bool {
        self.server.initialized()
    }

    /// The shared server client, building it on first call.
    pub async fn server(&self, cfg: &ServerConfig) -> Result<Arc<dyn Server>> {
        let server = self
            .server
            .get_or_try_init(|| async {
                info!(host = %cfg.host, port = cfg.port, "building database server client");
                (self.factory)(cfg)
            })
            .await
            .map_err(VertexsyncError::ConnectionFailed)?;
        Ok(server.clone())
    }

    /// Open the configured database, creating it if the server does not
    /// have it yet.
    pub async fn acquire(&self, cfg: &ConnectionConfig) -> Result<Arc<dyn Database>> {
        let server = self.server(&cfg.server).await?;
        let descriptor = &cfg.database;

        let databases = server
            .list_databases()
            .await
            .map_err(VertexsyncError::ConnectionFailed)?;
        let exists = databases.iter().any(|db| db.name == descriptor.name);

        let db = if exists {
            debug!(database = %descriptor.name, "database exists; opening");
            server.use_database(descriptor).await
        } else {
            info!(database = %descriptor.name, "database not found; creating");
            match server.create_database(descriptor).await {
                // Created by someone else since the listing.
                Err(err) if err.is_already_exists() => {
                    debug!(database = %descriptor.name, "database appeared after listing; opening");
                    server.use_database(descriptor).await
                }
                created => created,
            }
        }
        .map_err(VertexsyncError::ConnectionFailed)?;

        Ok(db)
    }
}

impl std::fmt::Debug for ConnectionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionGate")
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::config::DatabaseDescriptor;
    use crate::db::{BoxFuture, DatabaseInfo, DbError};

    /// Lists no databases even though its inner server has some.
    struct StaleListing(MemoryServer);

    impl Server for StaleListing {
        fn list_databases(&self) -> BoxFuture<'_, DbResult<Vec<DatabaseInfo>>> {
            Box::pin(async { Ok(Vec::new()) })
        }

        fn create_database<'a>(
            &'a self,
            descriptor: &'a DatabaseDescriptor,
        ) -> BoxFuture<'a, DbResult<Arc<dyn Database>>> {
            self.0.create_database(descriptor)
        }

        fn use_database<'a>(
            &'a self,
            descriptor: &'a DatabaseDescriptor,
        ) -> BoxFuture<'a, DbResult<Arc<dyn Database>>> {
            self.0.use_database(descriptor)
        }
    }

    #[tokio::test]
    async fn server_is_built_once_and_reused() {
        let builds = Arc::new(AtomicUsize::new(0));
        let counter = builds.clone();
        let gate = ConnectionGate::new(Box::new(move |_: &ServerConfig| -> DbResult<Arc<dyn Server>> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(MemoryServer::new()))
        }));
        assert!(!gate.is_initialized());

        let cfg = ConnectionConfig::new(DatabaseDescriptor::new("app"));
        gate.acquire(&cfg).await.unwrap();
        gate.acquire(&cfg).await.unwrap();

        assert!(gate.is_initialized());
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_database_is_created_then_reused() {
        let server = Arc::new(MemoryServer::new());
        let gate = ConnectionGate::with_server(server.clone());
        let cfg = ConnectionConfig::new(DatabaseDescriptor::new("app"));

        assert!(server.database("app").is_none());
        let first = gate.acquire(&cfg).await.unwrap();
        assert!(server.database("app").is_some());

        first.create_class("Users", "V").await.unwrap();
        let second = gate.acquire(&cfg).await.unwrap();
        assert!(second.get_class("Users").await.is_ok());
    }

    #[tokio::test]
    async fn other_databases_do_not_count_as_existing() {
        let server = Arc::new(MemoryServer::new().with_database("other"));
        let gate = ConnectionGate::with_server(server.clone());

        let cfg = ConnectionConfig::new(DatabaseDescriptor::new("app"));
        let db = gate.acquire(&cfg).await.unwrap();

        assert_eq!(db.name(), "app");
        assert!(server.database("app").is_some());
    }

    #[tokio::test]
    async fn database_created_after_listing_is_opened() {
        let inner = MemoryServer::new().with_database("app");
        inner
            .database("app")
            .unwrap()
            .create_class("Users", "V")
            .await
            .unwrap();
        let gate = ConnectionGate::with_server(Arc::new(StaleListing(inner)));

        let cfg = ConnectionConfig::new(DatabaseDescriptor::new("app"));
        let db = gate.acquire(&cfg).await.unwrap();

        assert_eq!(db.name(), "app");
        assert!(db.get_class("Users").await.is_ok());
    }

    #[tokio::test]
    async fn factory_failure_is_a_connection_failure() {
        let gate = ConnectionGate::new(Box::new(|_: &ServerConfig| -> DbResult<Arc<dyn Server>> {
            Err(DbError::Backend("connection refused".to_string()))
        }));
        let cfg = ConnectionConfig::new(DatabaseDescriptor::new("app"));

        let err = gate.acquire(&cfg).await.err().expect("acquire should fail");
        assert!(matches!(err, VertexsyncError::ConnectionFailed(_)));
        assert!(!gate.is_initialized());
    }
}

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use vertexsync::config::DatabaseDescriptor;
use vertexsync::db::{
    BoxFuture, Database, DatabaseInfo, DbError, DbResult, MemoryDatabase, MemoryServer,
    SelectQuery, Server,
};
use vertexsync::types::{ClassHandle, Criteria, DbRecord, Index, IndexSpec, Property, PropertyType};

/// One driver call as seen by [`RecordingDatabase`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub op: &'static str,
    pub target: String,
}

impl std::fmt::Display for Call {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.op, self.target)
    }
}

struct Fault {
    op: &'static str,
    target: String,
    error: DbError,
}

/// A database wrapper that:
/// - journals every call (operation + class/index name) in order
/// - fails a call with a preset error when its (operation, target) matches
///   an injected fault
/// - holds every `create_class` open for a short while and remembers how
///   many were in flight at once
pub struct RecordingDatabase {
    inner: Arc<dyn Database>,
    calls: Mutex<Vec<Call>>,
    faults: Mutex<Vec<Fault>>,
    creates_in_flight: AtomicUsize,
    peak_creates_in_flight: AtomicUsize,
}

impl RecordingDatabase {
    pub fn new(inner: Arc<dyn Database>) -> Self {
        Self {
            inner,
            calls: Mutex::new(Vec::new()),
            faults: Mutex::new(Vec::new()),
            creates_in_flight: AtomicUsize::new(0),
            peak_creates_in_flight: AtomicUsize::new(0),
        }
    }

    /// Wrap a fresh in-memory database.
    pub fn memory(name: &str) -> Arc<Self> {
        Arc::new(Self::new(Arc::new(MemoryDatabase::new(name))))
    }

    /// Make every later `op` on `target` fail with `error`.
    pub fn fail_on(&self, op: &'static str, target: &str, error: DbError) {
        self.faults.lock().unwrap().push(Fault {
            op,
            target: target.to_string(),
            error,
        });
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls rendered as `op:target`.
    pub fn journal(&self) -> Vec<String> {
        self.calls().iter().map(|c| c.to_string()).collect()
    }

    pub fn count(&self, op: &str, target: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.op == op && c.target == target)
            .count()
    }

    /// Calls to `op`, any target.
    pub fn count_op(&self, op: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| c.op == op).count()
    }

    /// Most `create_class` calls that were running at the same time.
    pub fn peak_concurrent_creates(&self) -> usize {
        self.peak_creates_in_flight.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn enter(&self, op: &'static str, target: &str) -> DbResult<()> {
        self.calls.lock().unwrap().push(Call {
            op,
            target: target.to_string(),
        });
        let faults = self.faults.lock().unwrap();
        match faults.iter().find(|f| f.op == op && f.target == target) {
            Some(fault) => Err(fault.error.clone()),
            None => Ok(()),
        }
    }
}

impl Database for RecordingDatabase {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn get_class<'a>(&'a self, name: &'a str) -> BoxFuture<'a, DbResult<ClassHandle>> {
        Box::pin(async move {
            self.enter("get_class", name)?;
            self.inner.get_class(name).await
        })
    }

    fn list_classes(&self) -> BoxFuture<'_, DbResult<Vec<ClassHandle>>> {
        Box::pin(async move {
            self.enter("list_classes", "")?;
            self.inner.list_classes().await
        })
    }

    fn create_class<'a>(
        &'a self,
        name: &'a str,
        parent: &'a str,
    ) -> BoxFuture<'a, DbResult<ClassHandle>> {
        Box::pin(async move {
            self.enter("create_class", name)?;

            let now = self.creates_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_creates_in_flight.fetch_max(now, Ordering::SeqCst);
            // Stay pending long enough for a concurrent caller to overlap.
            tokio::time::sleep(Duration::from_millis(10)).await;
            let created = self.inner.create_class(name, parent).await;
            self.creates_in_flight.fetch_sub(1, Ordering::SeqCst);

            created
        })
    }

    fn drop_class<'a>(&'a self, name: &'a str) -> BoxFuture<'a, DbResult<()>> {
        Box::pin(async move {
            self.enter("drop_class", name)?;
            self.inner.drop_class(name).await
        })
    }

    fn list_properties<'a>(&'a self, class: &'a str) -> BoxFuture<'a, DbResult<Vec<Property>>> {
        Box::pin(async move {
            self.enter("list_properties", class)?;
            self.inner.list_properties(class).await
        })
    }

    fn create_property<'a>(
        &'a self,
        class: &'a str,
        name: &'a str,
        kind: PropertyType,
    ) -> BoxFuture<'a, DbResult<Property>> {
        Box::pin(async move {
            self.enter("create_property", &format!("{class}.{name}"))?;
            self.inner.create_property(class, name, kind).await
        })
    }

    fn get_index<'a>(&'a self, name: &'a str) -> BoxFuture<'a, DbResult<Index>> {
        Box::pin(async move {
            self.enter("get_index", name)?;
            self.inner.get_index(name).await
        })
    }

    fn create_index<'a>(&'a self, spec: &'a IndexSpec) -> BoxFuture<'a, DbResult<Index>> {
        Box::pin(async move {
            self.enter("create_index", &spec.name)?;
            self.inner.create_index(spec).await
        })
    }

    fn select(&self, query: SelectQuery) -> BoxFuture<'_, DbResult<Vec<DbRecord>>> {
        Box::pin(async move {
            self.enter("select", &query.class)?;
            self.inner.select(query).await
        })
    }

    fn insert<'a>(&'a self, class: &'a str, fields: DbRecord) -> BoxFuture<'a, DbResult<DbRecord>> {
        Box::pin(async move {
            self.enter("insert", class)?;
            self.inner.insert(class, fields).await
        })
    }

    fn update<'a>(
        &'a self,
        class: &'a str,
        criteria: Criteria,
        values: DbRecord,
    ) -> BoxFuture<'a, DbResult<u64>> {
        Box::pin(async move {
            self.enter("update", class)?;
            self.inner.update(class, criteria, values).await
        })
    }

    fn delete<'a>(&'a self, class: &'a str, criteria: Criteria) -> BoxFuture<'a, DbResult<u64>> {
        Box::pin(async move {
            self.enter("delete", class)?;
            self.inner.delete(class, criteria).await
        })
    }
}

/// A server over [`MemoryServer`] that counts database creations and opens,
/// and hands out the databases it opens wrapped in [`RecordingDatabase`].
pub struct CountingServer {
    inner: MemoryServer,
    created: AtomicUsize,
    opened: AtomicUsize,
    recorders: Mutex<Vec<Arc<RecordingDatabase>>>,
    faults: Mutex<Vec<Fault>>,
}

impl CountingServer {
    pub fn new() -> Self {
        Self::over(MemoryServer::new())
    }

    pub fn over(inner: MemoryServer) -> Self {
        Self {
            inner,
            created: AtomicUsize::new(0),
            opened: AtomicUsize::new(0),
            recorders: Mutex::new(Vec::new()),
            faults: Mutex::new(Vec::new()),
        }
    }

    /// Inject a fault into every database handed out from now on.
    pub fn fail_on(&self, op: &'static str, target: &str, error: DbError) {
        self.faults.lock().unwrap().push(Fault {
            op,
            target: target.to_string(),
            error,
        });
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Every database handle given out so far, in order.
    pub fn recorders(&self) -> Vec<Arc<RecordingDatabase>> {
        self.recorders.lock().unwrap().clone()
    }

    fn wrap(&self, db: Arc<dyn Database>) -> Arc<dyn Database> {
        let recorder = Arc::new(RecordingDatabase::new(db));
        for fault in self.faults.lock().unwrap().iter() {
            recorder.fail_on(fault.op, &fault.target, fault.error.clone());
        }
        self.recorders.lock().unwrap().push(recorder.clone());
        recorder
    }
}

impl Default for CountingServer {
    fn default() -> Self {
        Self::new()
    }
}

impl Server for CountingServer {
    fn list_databases(&self) -> BoxFuture<'_, DbResult<Vec<DatabaseInfo>>> {
        self.inner.list_databases()
    }

    fn create_database<'a>(
        &'a self,
        descriptor: &'a DatabaseDescriptor,
    ) -> BoxFuture<'a, DbResult<Arc<dyn Database>>> {
        Box::pin(async move {
            self.created.fetch_add(1, Ordering::SeqCst);
            let db = self.inner.create_database(descriptor).await?;
            Ok(self.wrap(db))
        })
    }

    fn use_database<'a>(
        &'a self,
        descriptor: &'a DatabaseDescriptor,
    ) -> BoxFuture<'a, DbResult<Arc<dyn Database>>> {
        Box::pin(async move {
            self.opened.fetch_add(1, Ordering::SeqCst);
            let db = self.inner.use_database(descriptor).await?;
            Ok(self.wrap(db))
        })
    }
}

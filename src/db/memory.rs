// src/db/memory.rs

//! In-process implementation of the driver traits.
//!
//! Behaves like a small graph database server: every database starts with the
//! base classes `V` and `E`, classes get their own cluster, records get a
//! `#cluster:position` id, and unique indexes declared on a class are
//! enforced for that class and all of its subclasses.
//!
//! Operations complete synchronously; the returned futures are already
//! resolved.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::config::DatabaseDescriptor;
use crate::db::{BoxFuture, Database, DatabaseInfo, DbError, DbResult, SelectQuery, Server};
use crate::types::{
    BASE_EDGE_CLASS, BASE_VERTEX_CLASS, ClassHandle, Criteria, DbRecord, DbValue, Index, IndexKind,
    IndexSpec, Property, PropertyType, RecordId,
};

/// Record metadata fields attached to every returned record.
pub const RID_FIELD: &str = "@rid";
pub const CLASS_FIELD: &str = "@class";

/// First cluster id handed out; lower ids are reserved for system clusters.
const FIRST_CLUSTER: i32 = 9;

fn ready<T: Send + 'static>(value: T) -> BoxFuture<'static, T> {
    Box::pin(std::future::ready(value))
}

#[derive(Default)]
pub struct MemoryServer {
    databases: Mutex<BTreeMap<String, Arc<MemoryDatabase>>>,
}

impl MemoryServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-create a database, e.g. to simulate a server that already has it.
    pub fn with_database(self, name: &str) -> Self {
        if let Ok(mut dbs) = self.databases.lock() {
            dbs.entry(name.to_string())
                .or_insert_with(|| Arc::new(MemoryDatabase::new(name)));
        }
        self
    }

    /// Direct access to a database, bypassing the trait.
    pub fn database(&self, name: &str) -> Option<Arc<MemoryDatabase>> {
        self.databases.lock().ok()?.get(name).cloned()
    }

    fn databases(&self) -> DbResult<MutexGuard<'_, BTreeMap<String, Arc<MemoryDatabase>>>> {
        self.databases
            .lock()
            .map_err(|_| DbError::Backend("memory server lock poisoned".to_string()))
    }

    fn create_sync(&self, descriptor: &DatabaseDescriptor) -> DbResult<Arc<dyn Database>> {
        let mut dbs = self.databases()?;
        if dbs.contains_key(&descriptor.name) {
            return Err(DbError::already_exists("database", &descriptor.name));
        }
        let db = Arc::new(MemoryDatabase::new(&descriptor.name));
        dbs.insert(descriptor.name.clone(), db.clone());
        debug!(database = %descriptor.name, "memory server: database created");
        Ok(db)
    }

    fn use_sync(&self, descriptor: &DatabaseDescriptor) -> DbResult<Arc<dyn Database>> {
        let dbs = self.databases()?;
        match dbs.get(&descriptor.name) {
            Some(db) => Ok(db.clone() as Arc<dyn Database>),
            None => Err(DbError::not_found("database", &descriptor.name)),
        }
    }
}

impl Server for MemoryServer {
    fn list_databases(&self) -> BoxFuture<'_, DbResult<Vec<DatabaseInfo>>> {
        let listed = self.databases().map(|dbs| {
            dbs.keys()
                .map(|name| DatabaseInfo { name: name.clone() })
                .collect()
        });
        ready(listed)
    }

    fn create_database<'a>(
        &'a self,
        descriptor: &'a DatabaseDescriptor,
    ) -> BoxFuture<'a, DbResult<Arc<dyn Database>>> {
        ready(self.create_sync(descriptor))
    }

    fn use_database<'a>(
        &'a self,
        descriptor: &'a DatabaseDescriptor,
    ) -> BoxFuture<'a, DbResult<Arc<dyn Database>>> {
        ready(self.use_sync(descriptor))
    }
}

struct ClassEntry {
    handle: ClassHandle,
    properties: Vec<Property>,
    records: BTreeMap<i64, DbRecord>,
    next_position: i64,
}

impl ClassEntry {
    fn new(handle: ClassHandle) -> Self {
        Self {
            handle,
            properties: Vec::new(),
            records: BTreeMap::new(),
            next_position: 0,
        }
    }
}

struct State {
    classes: BTreeMap<String, ClassEntry>,
    indexes: BTreeMap<String, Index>,
    next_cluster: i32,
}

impl State {
    fn bootstrap() -> Self {
        let mut state = Self {
            classes: BTreeMap::new(),
            indexes: BTreeMap::new(),
            next_cluster: FIRST_CLUSTER,
        };
        state.add_class(BASE_VERTEX_CLASS, None);
        state.add_class(BASE_EDGE_CLASS, None);
        state
    }

    fn add_class(&mut self, name: &str, parent: Option<&str>) -> ClassHandle {
        let handle = ClassHandle::new(name, parent, self.next_cluster);
        self.next_cluster += 1;
        self.classes
            .insert(name.to_string(), ClassEntry::new(handle.clone()));
        handle
    }

    fn class(&self, name: &str) -> DbResult<&ClassEntry> {
        self.classes
            .get(name)
            .ok_or_else(|| DbError::not_found("class", name))
    }

    fn class_mut(&mut self, name: &str) -> DbResult<&mut ClassEntry> {
        self.classes
            .get_mut(name)
            .ok_or_else(|| DbError::not_found("class", name))
    }

    /// True if `class` is `ancestor` or inherits from it.
    fn is_a(&self, class: &str, ancestor: &str) -> bool {
        let mut current = Some(class.to_string());
        while let Some(name) = current {
            if name == ancestor {
                return true;
            }
            current = self
                .classes
                .get(&name)
                .and_then(|c| c.handle.superclass.clone());
        }
        false
    }

    /// Check unique indexes for a record about to be stored in `class`.
    ///
    /// `replacing` is the position of the record being updated, which must
    /// not conflict with itself.
    fn check_unique(&self, class: &str, record: &DbRecord, replacing: Option<i64>) -> DbResult<()> {
        for index in self.indexes.values() {
            if index.kind != IndexKind::Unique || !self.is_a(class, &index.class) {
                continue;
            }
            let Some(value) = record.get(&index.property) else {
                continue;
            };
            if matches!(value, DbValue::Scalar(serde_json::Value::Null)) {
                continue;
            }

            for entry in self.classes.values() {
                if !self.is_a(&entry.handle.name, &index.class) {
                    continue;
                }
                let clash = entry.records.iter().any(|(pos, other)| {
                    let same_record = entry.handle.name == class && Some(*pos) == replacing;
                    !same_record && other.get(&index.property) == Some(value)
                });
                if clash {
                    return Err(DbError::ConstraintViolation {
                        index: index.name.clone(),
                        value: render(value),
                    });
                }
            }
        }
        Ok(())
    }
}

pub struct MemoryDatabase {
    name: String,
    state: Mutex<State>,
}

impl MemoryDatabase {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: Mutex::new(State::bootstrap()),
        }
    }

    fn state(&self) -> DbResult<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| DbError::Backend(format!("memory database '{}' lock poisoned", self.name)))
    }

    fn create_class_sync(&self, name: &str, parent: &str) -> DbResult<ClassHandle> {
        let mut state = self.state()?;
        if state.classes.contains_key(name) {
            return Err(DbError::already_exists("class", name));
        }
        state.class(parent)?;
        let handle = state.add_class(name, Some(parent));
        debug!(database = %self.name, class = %handle, "memory database: class created");
        Ok(handle)
    }

    fn drop_class_sync(&self, name: &str) -> DbResult<()> {
        if name == BASE_VERTEX_CLASS || name == BASE_EDGE_CLASS {
            return Err(DbError::InvalidQuery(format!("cannot drop base class '{name}'")));
        }
        let mut state = self.state()?;
        state.class(name)?;
        let has_subclasses = state
            .classes
            .values()
            .any(|c| c.handle.superclass.as_deref() == Some(name));
        if has_subclasses {
            return Err(DbError::InvalidQuery(format!(
                "class '{name}' has subclasses and cannot be dropped"
            )));
        }
        state.classes.remove(name);
        state.indexes.retain(|_, index| index.class != name);
        debug!(database = %self.name, class = %name, "memory database: class dropped");
        Ok(())
    }

    fn create_property_sync(&self, class: &str, name: &str, kind: PropertyType) -> DbResult<Property> {
        let mut state = self.state()?;
        let entry = state.class_mut(class)?;
        if entry.properties.iter().any(|p| p.name == name) {
            return Err(DbError::already_exists("property", format!("{class}.{name}")));
        }
        let property = Property::new(name, kind);
        entry.properties.push(property.clone());
        Ok(property)
    }

    fn get_index_sync(&self, name: &str) -> DbResult<Index> {
        let state = self.state()?;
        state
            .indexes
            .get(name)
            .cloned()
            .ok_or_else(|| DbError::not_found("index", name))
    }

    fn create_index_sync(&self, spec: &IndexSpec) -> DbResult<Index> {
        let mut state = self.state()?;
        if state.indexes.contains_key(&spec.name) {
            return Err(DbError::already_exists("index", &spec.name));
        }
        let entry = state.class(&spec.class)?;
        if !entry.properties.iter().any(|p| p.name == spec.property) {
            return Err(DbError::not_found(
                "property",
                format!("{}.{}", spec.class, spec.property),
            ));
        }
        let index = Index::from(spec);
        state.indexes.insert(spec.name.clone(), index.clone());
        debug!(database = %self.name, index = %spec.name, kind = %spec.kind, "memory database: index created");
        Ok(index)
    }

    fn select_sync(&self, query: &SelectQuery) -> DbResult<Vec<DbRecord>> {
        let state = self.state()?;
        let entry = state.class(&query.class)?;
        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(entry
            .records
            .iter()
            .filter(|(pos, record)| matches_criteria(entry, **pos, record, &query.criteria))
            .take(limit)
            .map(|(pos, record)| with_metadata(entry, *pos, record))
            .collect())
    }

    fn insert_sync(&self, class: &str, fields: DbRecord) -> DbResult<DbRecord> {
        let mut state = self.state()?;
        let record = strip_metadata(fields);
        state.class(class)?;
        state.check_unique(class, &record, None)?;

        let entry = state.class_mut(class)?;
        let position = entry.next_position;
        entry.next_position += 1;
        let stored = with_metadata(entry, position, &record);
        entry.records.insert(position, record);
        Ok(stored)
    }

    fn update_sync(&self, class: &str, criteria: &Criteria, values: DbRecord) -> DbResult<u64> {
        let mut state = self.state()?;
        let values = strip_metadata(values);

        let updated: Vec<(i64, DbRecord)> = {
            let entry = state.class(class)?;
            entry
                .records
                .iter()
                .filter(|(pos, record)| matches_criteria(entry, **pos, record, criteria))
                .map(|(pos, record)| {
                    let mut next = record.clone();
                    next.extend(values.clone());
                    (*pos, next)
                })
                .collect()
        };

        // Apply the whole batch first so candidates are checked against each
        // other too, then roll back if any of them clashes.
        let entry = state.class_mut(class)?;
        let mut previous: Vec<(i64, DbRecord)> = Vec::with_capacity(updated.len());
        for (pos, record) in updated {
            if let Some(old) = entry.records.insert(pos, record) {
                previous.push((pos, old));
            }
        }

        let checked = previous.iter().try_for_each(|(pos, _)| {
            match state.class(class)?.records.get(pos) {
                Some(record) => state.check_unique(class, record, Some(*pos)),
                None => Ok(()),
            }
        });

        if let Err(err) = checked {
            let entry = state.class_mut(class)?;
            for (pos, old) in previous {
                entry.records.insert(pos, old);
            }
            return Err(err);
        }

        Ok(previous.len() as u64)
    }

    fn delete_sync(&self, class: &str, criteria: &Criteria) -> DbResult<u64> {
        let mut state = self.state()?;
        let doomed: Vec<i64> = {
            let entry = state.class(class)?;
            entry
                .records
                .iter()
                .filter(|(pos, record)| matches_criteria(entry, **pos, record, criteria))
                .map(|(pos, _)| *pos)
                .collect()
        };
        let entry = state.class_mut(class)?;
        for pos in doomed.iter() {
            entry.records.remove(pos);
        }
        Ok(doomed.len() as u64)
    }
}

impl Database for MemoryDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    fn get_class<'a>(&'a self, name: &'a str) -> BoxFuture<'a, DbResult<ClassHandle>> {
        let found = self
            .state()
            .and_then(|state| state.class(name).map(|c| c.handle.clone()));
        ready(found)
    }

    fn list_classes(&self) -> BoxFuture<'_, DbResult<Vec<ClassHandle>>> {
        let listed = self
            .state()
            .map(|state| state.classes.values().map(|c| c.handle.clone()).collect());
        ready(listed)
    }

    fn create_class<'a>(
        &'a self,
        name: &'a str,
        parent: &'a str,
    ) -> BoxFuture<'a, DbResult<ClassHandle>> {
        ready(self.create_class_sync(name, parent))
    }

    fn drop_class<'a>(&'a self, name: &'a str) -> BoxFuture<'a, DbResult<()>> {
        ready(self.drop_class_sync(name))
    }

    fn list_properties<'a>(&'a self, class: &'a str) -> BoxFuture<'a, DbResult<Vec<Property>>> {
        let listed = self
            .state()
            .and_then(|state| state.class(class).map(|c| c.properties.clone()));
        ready(listed)
    }

    fn create_property<'a>(
        &'a self,
        class: &'a str,
        name: &'a str,
        kind: PropertyType,
    ) -> BoxFuture<'a, DbResult<Property>> {
        ready(self.create_property_sync(class, name, kind))
    }

    fn get_index<'a>(&'a self, name: &'a str) -> BoxFuture<'a, DbResult<Index>> {
        ready(self.get_index_sync(name))
    }

    fn create_index<'a>(&'a self, spec: &'a IndexSpec) -> BoxFuture<'a, DbResult<Index>> {
        ready(self.create_index_sync(spec))
    }

    fn select(&self, query: SelectQuery) -> BoxFuture<'_, DbResult<Vec<DbRecord>>> {
        ready(self.select_sync(&query))
    }

    fn insert<'a>(&'a self, class: &'a str, fields: DbRecord) -> BoxFuture<'a, DbResult<DbRecord>> {
        ready(self.insert_sync(class, fields))
    }

    fn update<'a>(
        &'a self,
        class: &'a str,
        criteria: Criteria,
        values: DbRecord,
    ) -> BoxFuture<'a, DbResult<u64>> {
        ready(self.update_sync(class, &criteria, values))
    }

    fn delete<'a>(&'a self, class: &'a str, criteria: Criteria) -> BoxFuture<'a, DbResult<u64>> {
        ready(self.delete_sync(class, &criteria))
    }
}

fn record_id(entry: &ClassEntry, position: i64) -> RecordId {
    RecordId::new(entry.handle.cluster_id, position)
}

/// Equality match on top-level fields; `@rid` matches the rendered record id.
fn matches_criteria(entry: &ClassEntry, position: i64, record: &DbRecord, criteria: &Criteria) -> bool {
    criteria.iter().all(|(field, expected)| {
        if field == RID_FIELD {
            return expected.as_str() == Some(record_id(entry, position).to_string().as_str());
        }
        record.get(field) == Some(&DbValue::from(expected.clone()))
    })
}

fn with_metadata(entry: &ClassEntry, position: i64, record: &DbRecord) -> DbRecord {
    let mut out = record.clone();
    out.insert(
        RID_FIELD.to_string(),
        DbValue::Link(record_id(entry, position)),
    );
    out.insert(
        CLASS_FIELD.to_string(),
        DbValue::Scalar(serde_json::Value::String(entry.handle.name.clone())),
    );
    out
}

fn strip_metadata(mut record: DbRecord) -> DbRecord {
    record.retain(|field, _| !field.starts_with('@'));
    record
}

fn render(value: &DbValue) -> String {
    match value {
        DbValue::Scalar(v) => v.to_string(),
        DbValue::Link(rid) => rid.to_string(),
        other => format!("{other:?}"),
    }
}

// src/engine/schema.rs

//! Schema synchronization.
//!
//! Two task graphs reconcile the declared collections with the classes in the
//! database:
//!
//! ```text
//! ensureIndex graph (only with create_custom_index):
//!   getVClass -> getProps -> getIdProp -> ensureIndex
//!
//! registration graph:
//!   ensureIndex -> getClasses -> registerClasses
//! ```
//!
//! Every step checks before it creates, so running a synchronization again
//! against the same database creates nothing new.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, anyhow, bail};
use tracing::{debug, info};

use crate::config::{CollectionDescriptor, ConnectionConfig};
use crate::dag::{TaskGraph, TaskResults};
use crate::db::Database;
use crate::errors::{Result, TaskGraphError};
use crate::types::{BASE_VERTEX_CLASS, ClassHandle, IndexSpec, Property, PropertyType};

pub const GET_V_CLASS: &str = "getVClass";
pub const GET_PROPS: &str = "getProps";
pub const GET_ID_PROP: &str = "getIdProp";
pub const ENSURE_INDEX: &str = "ensureIndex";
pub const GET_CLASSES: &str = "getClasses";
pub const REGISTER_CLASSES: &str = "registerClasses";

/// Task names and dependencies of the index graph.
pub const INDEX_TASKS: [(&str, &[&str]); 4] = [
    (GET_V_CLASS, &[]),
    (GET_PROPS, &[GET_V_CLASS]),
    (GET_ID_PROP, &[GET_PROPS]),
    (ENSURE_INDEX, &[GET_ID_PROP]),
];

/// Task names and dependencies of the registration graph.
pub const REGISTRATION_TASKS: [(&str, &[&str]); 3] = [
    (ENSURE_INDEX, &[]),
    (GET_CLASSES, &[ENSURE_INDEX]),
    (REGISTER_CLASSES, &[GET_CLASSES]),
];

/// Value produced by a schema task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaStep {
    Class(ClassHandle),
    Properties(Vec<Property>),
    Property(Property),
    /// Whether the identifier index is in place (`false` when not requested).
    IndexEnsured(bool),
    Classes(Vec<ClassHandle>),
}

impl SchemaStep {
    fn kind(&self) -> &'static str {
        match self {
            SchemaStep::Class(_) => "class",
            SchemaStep::Properties(_) => "property list",
            SchemaStep::Property(_) => "property",
            SchemaStep::IndexEnsured(_) => "index status",
            SchemaStep::Classes(_) => "class list",
        }
    }

    pub fn as_class(&self) -> anyhow::Result<&ClassHandle> {
        match self {
            SchemaStep::Class(class) => Ok(class),
            other => Err(anyhow!("expected a class, got a {}", other.kind())),
        }
    }

    pub fn as_properties(&self) -> anyhow::Result<&[Property]> {
        match self {
            SchemaStep::Properties(props) => Ok(props),
            other => Err(anyhow!("expected a property list, got a {}", other.kind())),
        }
    }

    pub fn as_classes(&self) -> anyhow::Result<&[ClassHandle]> {
        match self {
            SchemaStep::Classes(classes) => Ok(classes),
            other => Err(anyhow!("expected a class list, got a {}", other.kind())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    pub create_custom_index: bool,
    pub id_property: String,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            create_custom_index: false,
            id_property: "id".to_string(),
        }
    }
}

impl From<&ConnectionConfig> for SyncOptions {
    fn from(cfg: &ConnectionConfig) -> Self {
        Self {
            create_custom_index: cfg.create_custom_index,
            id_property: cfg.id_property.clone(),
        }
    }
}

/// Collection identity (or raw class name) → class handle.
///
/// Built once from a successful synchronization and never mutated
/// afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassMap {
    classes: BTreeMap<String, ClassHandle>,
}

impl ClassMap {
    /// Key each class by the identity of the collection whose table name
    /// matches it, or by its own name when no collection does.
    pub fn build(classes: Vec<ClassHandle>, collections: &[CollectionDescriptor]) -> Self {
        let classes = classes
            .into_iter()
            .map(|class| {
                let key = collections
                    .iter()
                    .find(|c| c.table_name == class.name)
                    .map(|c| c.identity.clone())
                    .unwrap_or_else(|| class.name.clone());
                (key, class)
            })
            .collect();
        Self { classes }
    }

    pub fn get(&self, key: &str) -> Option<&ClassHandle> {
        self.classes.get(key)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ClassHandle)> {
        self.classes.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Reconciles declared collections with the classes of one database.
pub struct SchemaSynchronizer {
    db: Arc<dyn Database>,
    collections: Arc<[CollectionDescriptor]>,
    options: SyncOptions,
}

impl SchemaSynchronizer {
    pub fn new(
        db: Arc<dyn Database>,
        collections: Arc<[CollectionDescriptor]>,
        options: SyncOptions,
    ) -> Self {
        Self {
            db,
            collections,
            options,
        }
    }

    /// Run the registration graph and build the class map.
    ///
    /// Nothing is returned unless every task succeeded; a failing task
    /// surfaces as `SchemaSyncFailed` naming it.
    pub async fn sync(&self) -> Result<ClassMap> {
        info!(
            database = %self.db.name(),
            collections = self.collections.len(),
            create_custom_index = self.options.create_custom_index,
            "synchronizing schema"
        );

        let mut results = self.registration_graph().run().await?;
        let classes = match results.take(REGISTER_CLASSES) {
            Some(SchemaStep::Classes(classes)) => classes,
            other => {
                return Err(anyhow!("{REGISTER_CLASSES} produced unexpected value {other:?}").into());
            }
        };

        let map = ClassMap::build(classes, &self.collections);
        info!(database = %self.db.name(), classes = map.len(), "schema synchronized");
        Ok(map)
    }

    /// Ensure the identifier property and its unique index, regardless of
    /// `create_custom_index`.
    pub async fn ensure_index(&self) -> Result<bool> {
        Ok(run_index_graph(self.db.clone(), &self.options.id_property).await?)
    }

    pub fn registration_graph(&self) -> TaskGraph<SchemaStep> {
        let mut graph = TaskGraph::new("registerCollections");

        let db = self.db.clone();
        let options = self.options.clone();
        graph.add_task(ENSURE_INDEX, &[], move |_| async move {
            if !options.create_custom_index {
                debug!("custom index disabled; skipping index graph");
                return Ok(SchemaStep::IndexEnsured(false));
            }
            let ensured = run_index_graph(db, &options.id_property).await?;
            Ok(SchemaStep::IndexEnsured(ensured))
        });

        let db = self.db.clone();
        graph.add_task(GET_CLASSES, &[ENSURE_INDEX], move |_| async move {
            let classes = db.list_classes().await.context("listing classes")?;
            Ok(SchemaStep::Classes(classes))
        });

        let db = self.db.clone();
        let collections = self.collections.clone();
        graph.add_task(REGISTER_CLASSES, &[GET_CLASSES], move |results| async move {
            register_classes(db.as_ref(), &collections, &results).await
        });

        graph
    }
}

/// Build the index graph for `id_property` on the base vertex class.
pub fn index_graph(db: Arc<dyn Database>, id_property: &str) -> TaskGraph<SchemaStep> {
    let mut graph = TaskGraph::new(ENSURE_INDEX);

    let d = db.clone();
    graph.add_task(GET_V_CLASS, &[], move |_| async move {
        let class = d
            .get_class(BASE_VERTEX_CLASS)
            .await
            .context("fetching base vertex class")?;
        Ok(SchemaStep::Class(class))
    });

    let d = db.clone();
    graph.add_task(GET_PROPS, &[GET_V_CLASS], move |results| async move {
        let class = results.require(GET_V_CLASS)?.as_class()?;
        let properties = d
            .list_properties(&class.name)
            .await
            .with_context(|| format!("listing properties of class '{}'", class.name))?;
        Ok(SchemaStep::Properties(properties))
    });

    let d = db.clone();
    let id = id_property.to_string();
    graph.add_task(GET_ID_PROP, &[GET_PROPS], move |results| async move {
        let properties = results.require(GET_PROPS)?.as_properties()?;
        if let Some(existing) = properties.iter().find(|p| p.name == id) {
            debug!(property = %id, "identifier property already exists");
            return Ok(SchemaStep::Property(existing.clone()));
        }

        info!(class = BASE_VERTEX_CLASS, property = %id, "creating identifier property");
        let created = d
            .create_property(BASE_VERTEX_CLASS, &id, PropertyType::String)
            .await
            .with_context(|| format!("creating property '{BASE_VERTEX_CLASS}.{id}'"))?;
        Ok(SchemaStep::Property(created))
    });

    let d = db;
    let spec = IndexSpec::unique_id(id_property);
    graph.add_task(ENSURE_INDEX, &[GET_ID_PROP], move |_| async move {
        match d.get_index(&spec.name).await {
            Ok(_) => {
                debug!(index = %spec.name, "identifier index already exists");
            }
            Err(err) if err.is_not_found() => {
                info!(index = %spec.name, kind = %spec.kind, "creating identifier index");
                d.create_index(&spec)
                    .await
                    .with_context(|| format!("creating index '{}'", spec.name))?;
            }
            Err(err) => {
                return Err(anyhow::Error::new(err)
                    .context(format!("looking up index '{}'", spec.name)));
            }
        }
        Ok(SchemaStep::IndexEnsured(true))
    });

    graph
}

async fn run_index_graph(
    db: Arc<dyn Database>,
    id_property: &str,
) -> std::result::Result<bool, TaskGraphError> {
    let mut results = index_graph(db, id_property).run().await?;
    match results.take(ENSURE_INDEX) {
        Some(SchemaStep::IndexEnsured(ensured)) => Ok(ensured),
        other => Err(TaskGraphError::TaskFailed {
            name: ENSURE_INDEX.to_string(),
            cause: anyhow!("unexpected result {other:?}"),
        }),
    }
}

/// Create the classes no listed class matches, one after another, and return
/// them together with the already existing matches.
async fn register_classes(
    db: &dyn Database,
    collections: &[CollectionDescriptor],
    results: &TaskResults<SchemaStep>,
) -> anyhow::Result<SchemaStep> {
    let existing = results.require(GET_CLASSES)?.as_classes()?;

    let mut registered = Vec::with_capacity(collections.len());
    let mut missing = Vec::new();
    for collection in collections {
        match existing.iter().find(|k| k.name == collection.table_name) {
            Some(class) => registered.push(class.clone()),
            None => missing.push(collection),
        }
    }

    if missing.is_empty() {
        debug!(classes = registered.len(), "all collection classes already exist");
    }

    // Sequential on purpose: concurrent creates can race into duplicates.
    for collection in missing {
        info!(
            class = %collection.table_name,
            collection = %collection.identity,
            "creating class"
        );
        let class = db
            .create_class(&collection.table_name, BASE_VERTEX_CLASS)
            .await
            .with_context(|| {
                format!(
                    "creating class '{}' for collection '{}'",
                    collection.table_name, collection.identity
                )
            })?;
        registered.push(class);
    }

    if registered.len() != collections.len() {
        bail!(
            "registered {} classes for {} collections",
            registered.len(),
            collections.len()
        );
    }

    Ok(SchemaStep::Classes(registered))
}

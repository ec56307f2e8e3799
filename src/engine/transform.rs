// src/engine/transform.rs

//! Post-query value transformation.
//!
//! Driver values are turned into plain JSON before they reach callers. Values
//! with a recognizable [`ValueShape`] go through the hook registered for that
//! shape; everything else uses the default conversion.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Value, json};

use crate::types::{DbRecord, DbValue, Record, ValueShape};

/// A hook rendering one shape of driver value as JSON.
pub trait ValueTransform: Send + Sync {
    fn shape(&self) -> ValueShape;

    fn apply(&self, value: &DbValue) -> Value;
}

/// Renders record ids as `"#cluster:position"`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordIdTransform;

impl ValueTransform for RecordIdTransform {
    fn shape(&self) -> ValueShape {
        ValueShape::RecordId
    }

    fn apply(&self, value: &DbValue) -> Value {
        match value {
            DbValue::Link(rid) => Value::String(rid.to_string()),
            other => default_json(other, &Transformers::empty()),
        }
    }
}

/// Registry of value hooks, keyed by shape.
#[derive(Clone)]
pub struct Transformers {
    hooks: HashMap<ValueShape, Arc<dyn ValueTransform>>,
}

impl Transformers {
    /// A registry without any hooks.
    pub fn empty() -> Self {
        Self {
            hooks: HashMap::new(),
        }
    }

    /// Register (or replace) the hook for its shape.
    pub fn with(mut self, hook: impl ValueTransform + 'static) -> Self {
        self.hooks.insert(hook.shape(), Arc::new(hook));
        self
    }

    pub fn to_json(&self, value: &DbValue) -> Value {
        if let Some(hook) = value.shape().and_then(|shape| self.hooks.get(&shape)) {
            return hook.apply(value);
        }
        default_json(value, self)
    }

    pub fn record_to_json(&self, record: &DbRecord) -> Record {
        record
            .iter()
            .map(|(field, value)| (field.clone(), self.to_json(value)))
            .collect()
    }
}

impl Default for Transformers {
    /// Record ids rendered as `#cluster:position`.
    fn default() -> Self {
        Self::empty().with(RecordIdTransform)
    }
}

impl std::fmt::Debug for Transformers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transformers")
            .field("shapes", &self.hooks.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn default_json(value: &DbValue, transformers: &Transformers) -> Value {
    match value {
        DbValue::Scalar(v) => v.clone(),
        DbValue::Link(rid) => json!({"cluster": rid.cluster, "position": rid.position}),
        DbValue::List(items) => Value::Array(items.iter().map(|v| transformers.to_json(v)).collect()),
        DbValue::Embedded(record) => Value::Object(transformers.record_to_json(record)),
    }
}

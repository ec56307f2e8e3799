// src/dag/results.rs

use std::collections::HashMap;

use anyhow::anyhow;

use crate::dag::graph::TaskName;

/// Values produced by completed tasks, keyed by task name.
///
/// A task executor receives one of these holding exactly the values of the
/// tasks it declared as dependencies. A successful graph run returns one
/// holding every task's value.
#[derive(Debug, Clone)]
pub struct TaskResults<T> {
    values: HashMap<TaskName, T>,
}

impl<T> TaskResults<T> {
    pub(crate) fn new(values: HashMap<TaskName, T>) -> Self {
        Self { values }
    }

    pub fn get(&self, task: &str) -> Option<&T> {
        self.values.get(task)
    }

    /// Like [`get`](Self::get), but a missing value is an error.
    pub fn require(&self, task: &str) -> anyhow::Result<&T> {
        self.values
            .get(task)
            .ok_or_else(|| anyhow!("result of task '{task}' is not available"))
    }

    /// Remove and return a value, consuming it from the results.
    pub fn take(&mut self, task: &str) -> Option<T> {
        self.values.remove(task)
    }

    pub fn contains(&self, task: &str) -> bool {
        self.values.contains_key(task)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(|s| s.as_str())
    }

    pub fn into_inner(self) -> HashMap<TaskName, T> {
        self.values
    }
}

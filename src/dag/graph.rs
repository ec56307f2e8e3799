// src/dag/graph.rs

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::pin::Pin;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use tracing::debug;

use crate::dag::executor::execute;
use crate::dag::results::TaskResults;
use crate::errors::{ConfigurationError, TaskGraphError};

/// Public type alias for task names.
pub type TaskName = String;

/// Future returned by a task executor.
pub type TaskFuture<T> = Pin<Box<dyn Future<Output = anyhow::Result<T>> + Send + 'static>>;

pub(crate) type TaskFn<T> = Box<dyn FnOnce(TaskResults<T>) -> TaskFuture<T> + Send>;

struct TaskSpec<T> {
    deps: Vec<TaskName>,
    run: TaskFn<T>,
}

/// A set of named tasks with declared dependencies.
///
/// Built fresh for every invocation and consumed by [`TaskGraph::run`].
/// Nothing is checked while tasks are added; [`TaskGraph::plan`] validates
/// the whole graph before any executor is called.
///
/// ```ignore
/// let results = TaskGraph::new("example")
///     .task("a", &[], |_| async { Ok(1) })
///     .task("b", &["a"], |r| async move { Ok(r.require("a")? + 1) })
///     .run()
///     .await?;
/// ```
pub struct TaskGraph<T> {
    label: String,
    tasks: BTreeMap<TaskName, TaskSpec<T>>,
    /// First name declared twice, reported by `plan`.
    duplicate: Option<TaskName>,
}

impl<T: Clone + Send + 'static> TaskGraph<T> {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            tasks: BTreeMap::new(),
            duplicate: None,
        }
    }

    /// Builder-style [`add_task`](Self::add_task).
    pub fn task<F, Fut>(mut self, name: &str, deps: &[&str], run: F) -> Self
    where
        F: FnOnce(TaskResults<T>) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        self.add_task(name, deps, run);
        self
    }

    /// Declare a task. `run` receives the values of the tasks named in
    /// `deps` once all of them have completed.
    pub fn add_task<F, Fut>(&mut self, name: &str, deps: &[&str], run: F)
    where
        F: FnOnce(TaskResults<T>) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        if self.tasks.contains_key(name) {
            self.duplicate.get_or_insert_with(|| name.to_string());
            return;
        }

        let run: TaskFn<T> = Box::new(move |results| Box::pin(run(results)));
        self.tasks.insert(
            name.to_string(),
            TaskSpec {
                deps: deps.iter().map(|d| d.to_string()).collect(),
                run,
            },
        );
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn task_names(&self) -> impl Iterator<Item = &str> {
        self.tasks.keys().map(|s| s.as_str())
    }

    /// Declared dependencies of a task (empty for unknown names).
    pub fn dependencies_of(&self, name: &str) -> &[TaskName] {
        self.tasks
            .get(name)
            .map(|t| t.deps.as_slice())
            .unwrap_or(&[])
    }

    /// Validate the graph and compute an execution order.
    ///
    /// Fails with a [`ConfigurationError`] when:
    /// - a task name was declared twice
    /// - a dependency names a task that is not in the graph
    /// - a task depends on itself, or the dependencies form a cycle
    pub fn plan(self) -> Result<ExecutionPlan<T>, ConfigurationError> {
        if let Some(name) = self.duplicate {
            return Err(ConfigurationError::DuplicateTask(name));
        }

        for (name, task) in self.tasks.iter() {
            for dep in task.deps.iter() {
                if !self.tasks.contains_key(dep) {
                    return Err(ConfigurationError::MissingDependency {
                        task: name.clone(),
                        dependency: dep.clone(),
                    });
                }
                if dep == name {
                    return Err(ConfigurationError::CycleDetected(name.clone()));
                }
            }
        }

        // Edge direction: dep -> task.
        let order: Vec<TaskName> = {
            let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
            for name in self.tasks.keys() {
                graph.add_node(name.as_str());
            }
            for (name, task) in self.tasks.iter() {
                for dep in task.deps.iter() {
                    graph.add_edge(dep.as_str(), name.as_str(), ());
                }
            }

            match toposort(&graph, None) {
                Ok(order) => order.into_iter().map(str::to_string).collect(),
                Err(cycle) => {
                    return Err(ConfigurationError::CycleDetected(
                        cycle.node_id().to_string(),
                    ));
                }
            }
        };

        let mut nodes: HashMap<TaskName, PlannedTask<T>> = HashMap::new();
        for (name, spec) in self.tasks {
            nodes.insert(
                name,
                PlannedTask {
                    deps: spec.deps,
                    dependents: Vec::new(),
                    run: Some(spec.run),
                },
            );
        }

        // Second pass: populate dependents based on deps.
        for name in order.iter() {
            let deps = nodes
                .get(name)
                .map(|n| n.deps.clone())
                .unwrap_or_default();
            for dep in deps {
                if let Some(dep_node) = nodes.get_mut(&dep) {
                    dep_node.dependents.push(name.clone());
                }
            }
        }

        debug!(graph = %self.label, ?order, "task graph validated");

        Ok(ExecutionPlan {
            label: self.label,
            order,
            nodes,
        })
    }

    /// Validate and execute the graph.
    ///
    /// Returns every task's value, or the first failure. A graph that fails
    /// validation never runs any task.
    pub async fn run(self) -> Result<TaskResults<T>, TaskGraphError> {
        let plan = self.plan()?;
        execute(plan).await
    }
}

impl<T> fmt::Debug for TaskGraph<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let deps: BTreeMap<&str, &[TaskName]> = self
            .tasks
            .iter()
            .map(|(name, t)| (name.as_str(), t.deps.as_slice()))
            .collect();
        f.debug_struct("TaskGraph")
            .field("label", &self.label)
            .field("tasks", &deps)
            .finish()
    }
}

pub(crate) struct PlannedTask<T> {
    pub(crate) deps: Vec<TaskName>,
    pub(crate) dependents: Vec<TaskName>,
    /// Taken when the task is dispatched.
    pub(crate) run: Option<TaskFn<T>>,
}

/// A validated graph, ready to execute.
pub struct ExecutionPlan<T> {
    pub(crate) label: String,
    pub(crate) order: Vec<TaskName>,
    pub(crate) nodes: HashMap<TaskName, PlannedTask<T>>,
}

impl<T> ExecutionPlan<T> {
    pub fn label(&self) -> &str {
        &self.label
    }

    /// One valid topological order of the tasks.
    ///
    /// Execution does not follow it strictly: any task whose dependencies
    /// have completed may start.
    pub fn order(&self) -> &[TaskName] {
        &self.order
    }

    pub fn dependents_of(&self, name: &str) -> &[TaskName] {
        self.nodes
            .get(name)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }
}

// src/dag/executor.rs

use std::collections::HashMap;

use anyhow::anyhow;
use tokio::task::{Id, JoinSet};
use tracing::{debug, info, warn};

use crate::dag::graph::{ExecutionPlan, TaskName};
use crate::dag::results::TaskResults;
use crate::errors::TaskGraphError;

type InFlight<T> = JoinSet<(TaskName, anyhow::Result<T>)>;

/// Run a validated graph to completion or first failure.
///
/// Every task whose dependencies have all completed is spawned right away, so
/// independent tasks are in flight at the same time. Completed values are
/// only ever written here, by the coordinating loop.
///
/// On the first failure no further task is dispatched, but tasks already in
/// flight are awaited rather than aborted. Their failures are discarded; only
/// the first one is returned.
pub async fn execute<T>(mut plan: ExecutionPlan<T>) -> Result<TaskResults<T>, TaskGraphError>
where
    T: Clone + Send + 'static,
{
    let total = plan.nodes.len();
    info!(graph = %plan.label, tasks = total, "starting task graph run");

    let mut unmet: HashMap<TaskName, usize> = plan
        .nodes
        .iter()
        .map(|(name, node)| (name.clone(), node.deps.len()))
        .collect();
    let mut completed: HashMap<TaskName, T> = HashMap::with_capacity(total);
    let mut in_flight: InFlight<T> = JoinSet::new();
    let mut names: HashMap<Id, TaskName> = HashMap::new();
    let mut first_failure: Option<TaskGraphError> = None;

    let roots: Vec<TaskName> = plan
        .order
        .iter()
        .filter(|name| unmet.get(*name).copied() == Some(0))
        .cloned()
        .collect();
    for name in roots {
        dispatch(&mut plan, &name, &completed, &mut in_flight, &mut names);
    }

    while let Some(joined) = in_flight.join_next().await {
        let (name, outcome) = match joined {
            Ok(pair) => pair,
            Err(err) => {
                let name = names
                    .get(&err.id())
                    .cloned()
                    .unwrap_or_else(|| "<unknown>".to_string());
                (name, Err(anyhow!("task did not run to completion: {err}")))
            }
        };

        match outcome {
            Ok(value) => {
                debug!(graph = %plan.label, task = %name, "task completed");
                completed.insert(name.clone(), value);

                if first_failure.is_some() {
                    continue;
                }

                let dependents = plan.dependents_of(&name).to_vec();
                for dependent in dependents {
                    if let Some(count) = unmet.get_mut(&dependent) {
                        *count -= 1;
                        if *count == 0 {
                            dispatch(&mut plan, &dependent, &completed, &mut in_flight, &mut names);
                        }
                    }
                }
            }
            Err(cause) => {
                if first_failure.is_none() {
                    warn!(
                        graph = %plan.label,
                        task = %name,
                        error = %format!("{cause:#}"),
                        "task failed; draining in-flight tasks"
                    );
                    first_failure = Some(TaskGraphError::TaskFailed { name, cause });
                } else {
                    debug!(
                        graph = %plan.label,
                        task = %name,
                        error = %format!("{cause:#}"),
                        "discarding failure after the first"
                    );
                }
            }
        }
    }

    if let Some(err) = first_failure {
        return Err(err);
    }

    debug_assert_eq!(completed.len(), total, "validated graph left tasks unrun");
    info!(graph = %plan.label, tasks = total, "task graph run finished");
    Ok(TaskResults::new(completed))
}

/// Spawn a single task, handing it its dependencies' values.
fn dispatch<T>(
    plan: &mut ExecutionPlan<T>,
    name: &str,
    completed: &HashMap<TaskName, T>,
    in_flight: &mut InFlight<T>,
    names: &mut HashMap<Id, TaskName>,
) where
    T: Clone + Send + 'static,
{
    let Some(node) = plan.nodes.get_mut(name) else {
        warn!(graph = %plan.label, task = %name, "dispatch for unknown task; ignoring");
        return;
    };
    let Some(run) = node.run.take() else {
        return;
    };

    let inputs: HashMap<TaskName, T> = node
        .deps
        .iter()
        .filter_map(|dep| completed.get(dep).map(|v| (dep.clone(), v.clone())))
        .collect();

    debug!(graph = %plan.label, task = %name, "dependencies satisfied; dispatching");

    let task_name = name.to_string();
    let handle = in_flight.spawn(async move {
        let outcome = run(TaskResults::new(inputs)).await;
        (task_name, outcome)
    });
    names.insert(handle.id(), name.to_string());
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use anyhow::bail;
    use tokio::sync::Barrier;

    use crate::dag::TaskGraph;
    use crate::errors::TaskGraphError;

    #[tokio::test]
    async fn dependents_see_their_dependencies_values() {
        let results = TaskGraph::new("sum")
            .task("a", &[], |_| async { Ok(2) })
            .task("b", &[], |_| async { Ok(3) })
            .task("c", &["a", "b"], |r| async move {
                Ok(r.require("a")? + r.require("b")?)
            })
            .run()
            .await
            .expect("graph should succeed");

        assert_eq!(results.len(), 3);
        assert_eq!(results.get("c"), Some(&5));
    }

    #[tokio::test]
    async fn task_only_sees_declared_dependencies() {
        let results = TaskGraph::new("visibility")
            .task("a", &[], |_| async { Ok(1usize) })
            .task("b", &["a"], |_| async { Ok(2usize) })
            .task("c", &["b"], |r| async move {
                // "a" completed long ago but is not a declared dependency.
                Ok(r.len() * 10 + usize::from(r.contains("a")))
            })
            .run()
            .await
            .expect("graph should succeed");

        assert_eq!(results.get("c"), Some(&10));
    }

    #[tokio::test]
    async fn independent_tasks_are_in_flight_together() {
        // Each root waits for the other; this only finishes if both run at once.
        let barrier = Arc::new(Barrier::new(2));
        let (b1, b2) = (barrier.clone(), barrier.clone());

        let run = TaskGraph::new("concurrent")
            .task("left", &[], move |_| async move {
                b1.wait().await;
                Ok("left")
            })
            .task("right", &[], move |_| async move {
                b2.wait().await;
                Ok("right")
            })
            .run();

        let results = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("independent tasks should not wait for each other")
            .expect("graph should succeed");
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn first_failure_stops_dependents_and_drains_in_flight() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (l1, l2) = (log.clone(), log.clone());

        let err = TaskGraph::new("failing")
            .task("boom", &[], |_| async { bail!("exploded") })
            .task("slow", &[], move |_| async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                l1.lock().unwrap().push("slow");
                Ok(())
            })
            .task("after", &["boom"], move |_| async move {
                l2.lock().unwrap().push("after");
                Ok(())
            })
            .run()
            .await
            .err()
            .expect("graph should fail");

        match err {
            TaskGraphError::TaskFailed { name, cause } => {
                assert_eq!(name, "boom");
                assert!(cause.to_string().contains("exploded"));
            }
            other => panic!("expected TaskFailed, got {other:?}"),
        }

        // The in-flight task ran to completion, the dependent never started.
        assert_eq!(*log.lock().unwrap(), vec!["slow"]);
    }

    #[tokio::test]
    async fn only_the_first_failure_is_reported() {
        let err = TaskGraph::<()>::new("two-failures")
            .task("fast", &[], |_| async { bail!("fast failure") })
            .task("late", &[], |_| async {
                tokio::time::sleep(Duration::from_millis(30)).await;
                bail!("late failure")
            })
            .run()
            .await
            .err()
            .expect("graph should fail");

        assert!(matches!(err, TaskGraphError::TaskFailed { ref name, .. } if name == "fast"));
    }

    #[tokio::test]
    async fn panicking_task_is_reported_as_that_task_failing() {
        let err = TaskGraph::<u8>::new("panic")
            .task("bad", &[], |_| async { panic!("bad task") })
            .run()
            .await
            .err()
            .expect("graph should fail");

        assert!(matches!(err, TaskGraphError::TaskFailed { ref name, .. } if name == "bad"));
    }

    #[tokio::test]
    async fn invalid_graph_runs_nothing() {
        let ran = Arc::new(Mutex::new(false));
        let flag = ran.clone();

        let err = TaskGraph::new("invalid")
            .task("ok", &[], move |_| async move {
                *flag.lock().unwrap() = true;
                Ok(())
            })
            .task("broken", &["missing"], |_| async { Ok(()) })
            .run()
            .await
            .err()
            .expect("graph should fail validation");

        assert!(matches!(err, TaskGraphError::Configuration(_)));
        assert!(!*ran.lock().unwrap());
    }

    #[tokio::test]
    async fn empty_graph_resolves_to_empty_results() {
        let results = TaskGraph::<()>::new("empty").run().await.expect("empty graph");
        assert!(results.is_empty());
    }
}

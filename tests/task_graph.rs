mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::bail;
use common::{TestResult, init_tracing, with_timeout};
use vertexsync::dag::TaskGraph;
use vertexsync::errors::{ConfigurationError, TaskGraphError};

fn counting_graph(counter: &Arc<AtomicUsize>, edges: &[(&'static str, &'static [&'static str])]) -> TaskGraph<u32> {
    let mut graph = TaskGraph::new("counting");
    for (name, deps) in edges {
        let counter = counter.clone();
        graph.add_task(name, deps, move |_| async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(1)
        });
    }
    graph
}

#[tokio::test]
async fn diamond_resolves_to_full_mapping() -> TestResult {
    init_tracing();

    let graph = TaskGraph::new("diamond")
        .task("a", &[], |_| async { Ok(2) })
        .task("b", &["a"], |r| async move { Ok(r.require("a")? * 3) })
        .task("c", &["a"], |r| async move { Ok(r.require("a")? + 5) })
        .task("d", &["b", "c"], |r| async move {
            Ok(r.require("b")? + r.require("c")?)
        });

    let results = with_timeout(graph.run()).await?;
    assert_eq!(results.len(), 4);
    assert_eq!(results.get("b"), Some(&6));
    assert_eq!(results.get("c"), Some(&7));
    assert_eq!(results.get("d"), Some(&13));
    Ok(())
}

#[tokio::test]
async fn missing_reference_fails_before_any_task_runs() {
    let ran = Arc::new(AtomicUsize::new(0));
    let graph = counting_graph(&ran, &[("a", &[]), ("b", &["a", "ghost"])]);

    let err = graph.run().await.unwrap_err();
    assert!(matches!(
        err,
        TaskGraphError::Configuration(ConfigurationError::MissingDependency { ref task, ref dependency })
            if task == "b" && dependency == "ghost"
    ));
    assert_eq!(ran.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn two_task_cycle_fails_and_runs_nothing() {
    let ran = Arc::new(AtomicUsize::new(0));
    let graph = counting_graph(&ran, &[("root", &[]), ("a", &["b"]), ("b", &["a"])]);

    let err = graph.run().await.unwrap_err();
    assert!(matches!(
        err,
        TaskGraphError::Configuration(ConfigurationError::CycleDetected(_))
    ));
    assert_eq!(ran.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn self_dependency_is_a_cycle() {
    let ran = Arc::new(AtomicUsize::new(0));
    let graph = counting_graph(&ran, &[("a", &["a"])]);

    let err = graph.run().await.unwrap_err();
    assert!(matches!(
        err,
        TaskGraphError::Configuration(ConfigurationError::CycleDetected(ref t)) if t == "a"
    ));
}

#[tokio::test]
async fn failure_short_circuits_dependents() {
    init_tracing();
    let ran = Arc::new(AtomicUsize::new(0));
    let after = ran.clone();

    let graph = TaskGraph::<u32>::new("short-circuit")
        .task("fetch", &[], |_| async { bail!("backend unavailable") })
        .task("use", &["fetch"], move |_| async move {
            after.fetch_add(1, Ordering::SeqCst);
            Ok(0)
        });

    let err = with_timeout(graph.run()).await.unwrap_err();
    match err {
        TaskGraphError::TaskFailed { name, cause } => {
            assert_eq!(name, "fetch");
            assert!(cause.to_string().contains("backend unavailable"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(ran.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn independent_tasks_run_concurrently() -> TestResult {
    let gate = Arc::new(tokio::sync::Barrier::new(3));

    let mut graph = TaskGraph::new("fan-out");
    for name in ["x", "y", "z"] {
        let gate = gate.clone();
        graph.add_task(name, &[], move |_| async move {
            gate.wait().await;
            Ok(name.len())
        });
    }
    graph.add_task("join", &["x", "y", "z"], |r| async move { Ok(r.len()) });

    let results = with_timeout(graph.run()).await?;
    assert_eq!(results.get("join"), Some(&3));
    Ok(())
}

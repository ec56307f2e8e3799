// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod db;
pub mod engine;
pub mod errors;
pub mod logging;
pub mod types;

use anyhow::Result;
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::engine::schema::{INDEX_TASKS, REGISTRATION_TASKS};
use crate::engine::{ConnectionGate, connect};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and validation
/// - the connection gate over the in-process backend
/// - schema synchronization
/// - printing the resulting collection → class mapping
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_and_validate(&args.config)?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    let gate = ConnectionGate::memory();
    let conn = connect(&gate, cfg.connection.clone(), cfg.collections.clone()).await?;
    info!(
        database = %conn.database().name(),
        classes = conn.classes().len(),
        "synchronization complete"
    );

    println!("database: {}", conn.database().name());
    println!("classes ({}):", conn.classes().len());
    for (key, class) in conn.classes().iter() {
        println!("  - {key} -> {class}");
    }

    Ok(())
}

/// Print connection settings, collections and the task graphs that would run.
fn print_dry_run(cfg: &ConfigFile) {
    let conn = &cfg.connection;

    println!("vertexsync dry-run");
    println!("  server = {}:{}", conn.server.host, conn.server.port);
    println!(
        "  database = {} ({:?}, {:?})",
        conn.database.name, conn.database.kind, conn.database.storage
    );
    println!("  create_custom_index = {}", conn.create_custom_index);
    println!("  id_property = {}", conn.id_property);
    println!();

    println!("collections ({}):", cfg.collections.len());
    for collection in cfg.collections.iter() {
        println!("  - {} -> {}", collection.identity, collection.table_name);
        for (key, value) in collection.options.iter() {
            println!("      {key}: {value}");
        }
    }
    println!();

    if conn.create_custom_index {
        println!("ensureIndex graph:");
        for (task, deps) in INDEX_TASKS {
            print_task(task, deps);
        }
    }
    println!("registerCollections graph:");
    for (task, deps) in REGISTRATION_TASKS {
        print_task(task, deps);
    }

    debug!("dry-run complete (no connection made)");
}

fn print_task(task: &str, deps: &[&str]) {
    if deps.is_empty() {
        println!("  - {task}");
    } else {
        println!("  - {task} (after: {deps:?})");
    }
}

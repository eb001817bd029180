// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod cli;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use cli::{Cli, Commands};
use grove_core::{bootstrap, launcher, probe, queue, runner, TaskContext};
use grove_model::BedrockClient;
use grove_store::{Envelope, StateStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Arc::new(grove_config::load(cli.config.as_deref())?);

    if let Commands::ShowConfig = &cli.command {
        println!("{}", serde_yaml::to_string(&*config).unwrap_or_default());
        return Ok(());
    }

    let store = StateStore::connect(&config.store.effective_url())
        .await
        .context("connecting to the state store")?;
    let client = Arc::new(BedrockClient::from_config(&config.model));

    match cli.command {
        Commands::Run {
            task_id,
            max_iterations,
        } => run_task(store, config, client, &task_id, max_iterations).await,
        Commands::Launch {
            message,
            model,
            max_iterations,
            no_recursion,
        } => {
            launch_root(
                store,
                config,
                client,
                message.join(" "),
                model,
                max_iterations,
                no_recursion,
            )
            .await
        }
        Commands::Send { task_id, message } => {
            send_message(store, config, client, &task_id, message.join(" ")).await
        }
        Commands::Status => print_status(&store).await,
        Commands::Models => print_models(&store).await,
        Commands::ShowConfig => unreachable!("handled above"),
    }
}

fn init_logging(verbose: bool) {
    let default_directive = if verbose { "grove=debug,info" } else { "info" };
    let filter = EnvFilter::try_from_env("GROVE_LOG")
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

// ── Subcommand handlers ───────────────────────────────────────────────────────

async fn run_task(
    store: StateStore,
    config: Arc<grove_config::Config>,
    client: Arc<BedrockClient>,
    task_id: &str,
    max_iterations_override: Option<u32>,
) -> anyhow::Result<()> {
    let record = store
        .task_record(task_id)
        .await?
        .with_context(|| format!("no task record for {task_id}; use `grove launch` first"))?;

    let tools = bootstrap::build_registry(&store, &config, &client, record.enable_recursion);
    let ctx = TaskContext {
        store,
        config,
        client,
        tools: Arc::new(tools),
    };
    let max_iterations = max_iterations_override.unwrap_or(record.max_iterations);
    runner::run_task(&ctx, task_id, max_iterations).await
}

async fn launch_root(
    store: StateStore,
    config: Arc<grove_config::Config>,
    client: Arc<BedrockClient>,
    message: String,
    model: Option<String>,
    max_iterations: Option<u32>,
    no_recursion: bool,
) -> anyhow::Result<()> {
    anyhow::ensure!(!message.trim().is_empty(), "a non-empty message is required");

    let ctx = operator_context(store, config, client);
    let request = launcher::LaunchRequest {
        initial_messages: vec![message],
        enable_recursion: !no_recursion,
        max_iterations: max_iterations.unwrap_or(ctx.config.runtime.max_iterations),
        ..launcher::LaunchRequest::with_model(
            model.unwrap_or_else(|| ctx.config.model.default_model.clone()),
        )
    };
    let outcome = launcher::launch(&ctx, request).await?;
    println!("launched {} (pid {:?})", outcome.task_id, outcome.pid);
    Ok(())
}

async fn send_message(
    store: StateStore,
    config: Arc<grove_config::Config>,
    client: Arc<BedrockClient>,
    task_id: &str,
    message: String,
) -> anyhow::Result<()> {
    anyhow::ensure!(!message.trim().is_empty(), "a non-empty message is required");
    let ctx = operator_context(store, config, client);
    queue::enqueue(
        &ctx,
        task_id,
        Envelope::user(message, None, grove_core::now_epoch()),
        true,
    )
    .await?;
    println!("queued message for {task_id}");
    Ok(())
}

async fn print_status(store: &StateStore) -> anyhow::Result<()> {
    let keys = store.keys_matching("task_data:*").await?;
    if keys.is_empty() {
        println!("no tasks");
        return Ok(());
    }

    println!("{:<34} {:<9} {:>8} {:>9} {:>6}", "TASK", "STATUS", "PID", "CHILDREN", "TURNS");
    let mut ids: Vec<&str> = keys
        .iter()
        .filter_map(|k| k.strip_prefix("task_data:"))
        .collect();
    ids.sort();
    for task_id in ids {
        let activity = probe::check(store, task_id).await;
        let Some(record) = store.task_record(task_id).await? else {
            continue;
        };
        let turns = store
            .conversation(task_id)
            .await?
            .map(|t| t.len())
            .unwrap_or(0);
        println!(
            "{:<34} {:<9} {:>8} {:>9} {:>6}",
            record.task_id,
            if activity.alive { "running" } else { "stopped" },
            activity.pid.map(|p| p.to_string()).unwrap_or_else(|| "-".into()),
            record.children.len(),
            turns,
        );
    }
    Ok(())
}

async fn print_models(store: &StateStore) -> anyhow::Result<()> {
    let catalog = store.model_catalog().await?;
    if catalog.0.is_empty() {
        println!("model catalog is empty; seed {}", grove_store::keys::MODEL_CATALOG);
        return Ok(());
    }
    let mut names: Vec<&String> = catalog.0.keys().collect();
    names.sort();
    for name in names {
        println!("{:<12} {}", name, catalog.0[name].arn);
    }
    Ok(())
}

fn operator_context(
    store: StateStore,
    config: Arc<grove_config::Config>,
    client: Arc<BedrockClient>,
) -> TaskContext {
    // Operator commands never dispatch tools themselves.
    TaskContext {
        store,
        config,
        client,
        tools: Arc::new(grove_tools::ToolRegistry::new()),
    }
}

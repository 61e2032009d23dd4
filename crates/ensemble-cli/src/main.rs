//! `ensemble` command-line entry point.

mod config;

use anyhow::Context;
use clap::{Parser, Subcommand};
use config::EnsembleConfig;
use ensemble_agent::{DefaultAgentFactory, ResilientClient};
use ensemble_core::{PriorityLabel, Task, TaskType};
use ensemble_memory::{InMemoryKnowledgeStore, TaskCache};
use ensemble_orchestrator::{
    CollaborationOrchestrator, TabularLearner, TaskOrderOptimizer, TaskPrioritizer,
};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ensemble", about = "Ensemble: collaborative multi-agent task runner")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "ensemble.toml", global = true)]
    config: PathBuf,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one task through the collaboration loop and print the result
    Run {
        /// Task description
        content: String,
        /// Task type: general, coding, design or research
        #[arg(short = 't', long = "type", default_value = "general")]
        task_type: TaskType,
        /// Priority label: low, medium or high
        #[arg(short, long, default_value = "medium")]
        priority: PriorityLabel,
        /// Override the configured round cap
        #[arg(short, long)]
        rounds: Option<u32>,
    },
    /// Order a JSON array of tasks by priority and dependencies
    Plan {
        /// File holding the task array
        tasks: PathBuf,
        /// Keep the prioritizer's order and skip the optimizer
        #[arg(long)]
        no_optimize: bool,
    },
    /// Print the effective configuration
    Config,
}

fn init_tracing(json_logs: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json_logs {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = EnsembleConfig::load(&cli.config).await?;

    match cli.command {
        Commands::Run {
            content,
            task_type,
            priority,
            rounds,
        } => run_task(config, content, task_type, priority, rounds).await?,
        Commands::Plan { tasks, no_optimize } => plan_tasks(&config, &tasks, !no_optimize).await?,
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

async fn run_task(
    mut config: EnsembleConfig,
    content: String,
    task_type: TaskType,
    priority: PriorityLabel,
    rounds: Option<u32>,
) -> anyhow::Result<()> {
    if let Some(r) = rounds {
        config.orchestrator.max_rounds = r;
    }
    info!(
        provider = ?config.model.provider,
        model = %config.model.model_id,
        max_rounds = config.orchestrator.max_rounds,
        "Starting ensemble"
    );

    let client = Arc::new(ResilientClient::from_config(
        config.model.clone(),
        config.retry.clone(),
    ));
    let factory = Arc::new(DefaultAgentFactory::new(client.clone()));
    let learner = Arc::new(TabularLearner::new(config.learner.clone()).with_generator(client.clone()));
    let orchestrator =
        CollaborationOrchestrator::new(client, factory, config.orchestrator.clone())
            .with_cache(Arc::new(TaskCache::from_config(&config.cache)))
            .with_knowledge(Arc::new(InMemoryKnowledgeStore::new()))
            .with_learner(learner)
            .with_exploration(config.exploration.clone());

    let token = CancellationToken::new();
    let on_signal = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling");
            on_signal.cancel();
        }
    });

    let task = Task::new(content).with_type(task_type).with_label(priority);
    let result = orchestrator.run_cancellable(task, token).await;
    println!("{}", serde_json::to_string_pretty(&result.to_value())?);

    if let Some(err) = &result.error {
        anyhow::bail!("task did not complete cleanly: {err}");
    }
    Ok(())
}

async fn plan_tasks(config: &EnsembleConfig, path: &Path, optimize: bool) -> anyhow::Result<()> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read task file '{}'", path.display()))?;
    let tasks: Vec<Task> = serde_json::from_str(&text)
        .with_context(|| format!("Task file '{}' is not a JSON array of tasks", path.display()))?;

    let batch = TaskPrioritizer::new().prioritize_all(tasks);
    let mut items = batch.items;
    if optimize && !batch.cycle_detected {
        items = optimize_layers(&TaskOrderOptimizer::new(config.orchestrator.optimizer.clone()), items);
    }

    let order: Vec<serde_json::Value> = items
        .iter()
        .map(|t| {
            json!({
                "id": t.id,
                "content": t.content,
                "priority": t.priority,
                "score": t.score,
                "dependencies": t.dependencies,
            })
        })
        .collect();
    let out = json!({
        "cycle_detected": batch.cycle_detected,
        "cyclic_dependencies": batch.cyclic_dependencies,
        "order": order,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

/// Split a dependency-respecting order into layers of mutually
/// independent tasks and let the optimizer reorder each layer.
fn optimize_layers(optimizer: &TaskOrderOptimizer, items: Vec<Task>) -> Vec<Task> {
    let mut out: Vec<Task> = Vec::with_capacity(items.len());
    let mut layer: Vec<Task> = Vec::new();
    for task in items {
        let depends_on_layer = task
            .dependencies
            .iter()
            .any(|d| layer.iter().any(|t| &t.id == d));
        if depends_on_layer {
            out.extend(optimizer.optimize(std::mem::take(&mut layer)));
        }
        layer.push(task);
    }
    out.extend(optimizer.optimize(layer));
    out
}

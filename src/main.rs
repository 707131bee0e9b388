use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use weft_core::config::AppConfig;
use weft_core::event::EventBus;
use weft_core::traits::WorkflowStore;
use weft_core::types::{
    Edge, EngineEvent, Node, NodeResult, Run, RunStatus, UserId, Workflow, WorkflowId,
};
use weft_engine::{Engine, ExecutionContext, RunLogger};
use weft_store::SqliteStore;

#[derive(Parser)]
#[command(name = "weft", version, about = "Run image and text generation workflows")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "weft.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a workflow definition from a JSON file
    Import {
        /// JSON file with `name`, `nodes` and `edges`
        file: PathBuf,
        /// Override the name stored in the file
        #[arg(long)]
        name: Option<String>,
    },
    /// List your workflows and shared templates
    Workflows,
    /// Execute a workflow
    Run {
        workflow_id: String,
        /// Only run this node and the nodes it depends on
        #[arg(long)]
        from: Option<String>,
    },
    /// Re-execute one node from its inputs' cached outputs
    RunNode { workflow_id: String, node_id: String },
    /// Show recent runs of a workflow
    Runs {
        workflow_id: String,
        #[arg(long, default_value = "10")]
        limit: usize,
    },
    /// Show current configuration
    Config,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Workflow definition as written by hand or exported from an editor.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WorkflowFile {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    nodes: Vec<Node>,
    #[serde(default)]
    edges: Vec<Edge>,
    #[serde(default)]
    is_template: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("weft=info,warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Handle completions before config loading
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "weft", &mut std::io::stdout());
        return Ok(());
    }

    let config = load_config(&cli.config)?;
    let user = UserId::from_string(&config.engine.user_id);

    if let Commands::Config = &cli.command {
        println!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    let store = Arc::new(SqliteStore::open(&config.database_path())?);
    let event_bus = Arc::new(EventBus::new(config.engine.event_capacity));
    let engine = Engine::new(
        store.clone(),
        weft_providers::create_image_provider(&config)?,
        weft_providers::create_chat_provider(&config)?,
        event_bus.clone(),
    );

    let cancel = CancellationToken::new();
    let mut ctx = ExecutionContext::new(user.clone()).with_cancel(cancel.clone());
    if let Some(prefs) = config.preferences.clone() {
        ctx = ctx.with_preferences(prefs);
    }

    match cli.command {
        Commands::Import { file, name } => {
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let def: WorkflowFile = serde_json::from_str(&content)
                .with_context(|| format!("parsing {}", file.display()))?;

            let name = name.unwrap_or(def.name);
            let mut workflow = Workflow::new(user, name, def.nodes, def.edges);
            workflow.description = def.description;
            workflow.is_template = def.is_template;
            store.save_workflow(&workflow).await?;

            info!(workflow_id = %workflow.id, nodes = workflow.nodes.len(), "Workflow imported");
            println!("{}", workflow.id);
        }
        Commands::Workflows => {
            let workflows = store.list_workflows(&user).await?;
            if workflows.is_empty() {
                println!("No workflows. Import one with `weft import <file>`.");
            }
            for wf in workflows {
                let marker = if wf.is_template { " [template]" } else { "" };
                println!(
                    "{}  {:<24} {} nodes, {} edges{}",
                    wf.id,
                    wf.name,
                    wf.nodes.len(),
                    wf.edges.len(),
                    marker
                );
            }
        }
        Commands::Run { workflow_id, from } => {
            let workflow_id = WorkflowId::from_string(workflow_id);
            let logger = spawn_run_logger(&config, &event_bus, &cancel);
            let printer = spawn_progress_printer(&event_bus);
            cancel_on_ctrl_c(cancel.clone());

            let run = match &from {
                Some(start) => engine.execute_from(&workflow_id, start, &ctx).await,
                None => engine.execute_full(&workflow_id, &ctx).await,
            };
            let run = reject_or_propagate(run)?;

            cache_outputs(store.as_ref(), &workflow_id, &run.node_results).await?;
            if let Some(handle) = logger {
                handle.await.ok();
            }
            printer.abort();

            print_json(&run)?;
            if run.status != RunStatus::Completed {
                warn!(run_id = %run.id, failed = ?run.failed_nodes(), "Run did not complete");
                std::process::exit(1);
            }
        }
        Commands::RunNode {
            workflow_id,
            node_id,
        } => {
            let workflow_id = WorkflowId::from_string(workflow_id);
            let result = reject_or_propagate(
                engine.execute_single(&workflow_id, &node_id, &ctx).await,
            )?;

            let results = HashMap::from([(node_id, result.clone())]);
            cache_outputs(store.as_ref(), &workflow_id, &results).await?;

            print_json(&result)?;
            if !result.is_completed() {
                std::process::exit(1);
            }
        }
        Commands::Runs { workflow_id, limit } => {
            let workflow_id = WorkflowId::from_string(workflow_id);
            let runs = reject_or_propagate(
                engine.list_runs(&workflow_id, &user, Some(limit)).await,
            )?;
            if runs.is_empty() {
                println!("No runs yet.");
            }
            for run in &runs {
                print_run_summary(run);
            }
        }
        Commands::Config | Commands::Completions { .. } => {}
    }

    Ok(())
}

/// Requests the engine refused exit with status 2 and a one-line message.
/// Anything else propagates.
fn reject_or_propagate<T>(result: weft_core::error::Result<T>) -> anyhow::Result<T> {
    match result {
        Ok(value) => Ok(value),
        Err(e) if e.is_entry_point() => {
            eprintln!("error: {}", e);
            std::process::exit(2);
        }
        Err(e) => Err(e.into()),
    }
}

fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    if path.exists() {
        return Ok(AppConfig::load(path)?);
    }

    let home_config = dirs_home().map(|h| h.join(".weft").join("config.toml"));
    match home_config {
        Some(path) if path.exists() => {
            info!(path = %path.display(), "Loading config from home directory");
            Ok(AppConfig::load(&path)?)
        }
        _ => {
            warn!("No config file found, using defaults");
            Ok(AppConfig::default())
        }
    }
}

/// Start the JSONL run logger when `[log]` is configured and enabled.
fn spawn_run_logger(
    config: &AppConfig,
    event_bus: &Arc<EventBus>,
    cancel: &CancellationToken,
) -> Option<tokio::task::JoinHandle<()>> {
    let log = config.log.as_ref().filter(|l| l.enabled)?;
    let logger = RunLogger::new(config.log_dir(), log.level);
    Some(logger.spawn(event_bus, cancel.child_token()))
}

fn spawn_progress_printer(event_bus: &Arc<EventBus>) -> tokio::task::JoinHandle<()> {
    let mut rx = event_bus.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            match event {
                EngineEvent::LayerStarted {
                    index, node_ids, ..
                } => eprintln!("[layer {}] {}", index, node_ids.join(", ")),
                EngineEvent::NodeCompleted {
                    node_id,
                    generation_time_ms,
                    ..
                } => eprintln!("  {} ok ({} ms)", node_id, generation_time_ms),
                EngineEvent::NodeFailed { node_id, error, .. } => {
                    eprintln!("  {} FAILED: {}", node_id, error)
                }
                EngineEvent::RunCancelled { .. } => eprintln!("Run cancelled"),
                _ => {}
            }
        }
    })
}

/// Cancel between layers on the first Ctrl-C.
fn cancel_on_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Cancelling after the current layer...");
            cancel.cancel();
        }
    });
}

/// Write completed outputs back onto the workflow's node caches.
async fn cache_outputs(
    store: &SqliteStore,
    workflow_id: &WorkflowId,
    results: &HashMap<String, NodeResult>,
) -> anyhow::Result<()> {
    let Some(mut workflow) = store.get_workflow(workflow_id).await? else {
        return Ok(());
    };
    if workflow.absorb_results(results) > 0 {
        store.save_workflow(&workflow).await?;
    }
    Ok(())
}

fn print_run_summary(run: &Run) {
    let failed = run.failed_nodes();
    let suffix = if failed.is_empty() {
        String::new()
    } else {
        format!("  failed: {}", failed.join(", "))
    };
    println!(
        "{}  {:<9} {:<7} {}  {} nodes{}",
        run.id,
        run.status.as_str(),
        run.execution_mode.as_str(),
        run.started_at.format("%Y-%m-%d %H:%M:%S"),
        run.node_results.len(),
        suffix
    );
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    let mut json = serde_json::to_value(value)?;
    abbreviate_payloads(&mut json);
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

/// Shorten inline image data so terminal output stays readable.
fn abbreviate_payloads(value: &mut Value) {
    const KEEP: usize = 48;
    match value {
        Value::String(s) if s.starts_with("data:") && s.len() > KEEP => {
            let mut end = KEEP;
            while !s.is_char_boundary(end) {
                end -= 1;
            }
            *s = format!("{}... ({} bytes)", &s[..end], s.len());
        }
        Value::Array(items) => items.iter_mut().for_each(abbreviate_payloads),
        Value::Object(map) => map.values_mut().for_each(abbreviate_payloads),
        _ => {}
    }
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abbreviate_payloads_nested() {
        let long = format!("data:image/png;base64,{}", "A".repeat(200));
        let mut json = serde_json::json!({
            "image_data": long,
            "text": "short",
            "nested": [{ "image": long }],
        });
        abbreviate_payloads(&mut json);

        let image = json["image_data"].as_str().unwrap();
        assert!(image.ends_with("(222 bytes)"));
        assert!(image.len() < 80);
        assert_eq!(json["text"], "short");
        assert!(json["nested"][0]["image"].as_str().unwrap().contains("..."));
    }

    #[test]
    fn test_workflow_file_parses_editor_export() {
        let def: WorkflowFile = serde_json::from_str(
            r#"{
                "name": "demo",
                "nodes": [
                    { "id": "t", "type": "textInput", "data": { "text": "a cat" } },
                    { "id": "a", "type": "aiAgent", "data": { "model": "m", "userPromptTemplate": "{{input}}" } }
                ],
                "edges": [
                    { "id": "e1", "source": "t", "target": "a", "targetHandle": "input-0" }
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(def.nodes.len(), 2);
        assert_eq!(def.edges.len(), 1);
        assert!(!def.is_template);
    }

    #[test]
    fn test_infrastructure_errors_propagate() {
        assert_eq!(reject_or_propagate(Ok(3)).unwrap(), 3);

        let err = reject_or_propagate::<()>(Err(weft_core::error::WeftError::Database(
            "disk full".into(),
        )))
        .unwrap_err();
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn test_cli_parses_partial_run() {
        let cli = Cli::try_parse_from(["weft", "run", "wf-1", "--from", "g2"]).unwrap();
        match cli.command {
            Commands::Run { workflow_id, from } => {
                assert_eq!(workflow_id, "wf-1");
                assert_eq!(from.as_deref(), Some("g2"));
            }
            _ => panic!("expected run"),
        }
    }
}

//! Taskflow command line tool.
//!
//! Validates definition documents and simulates runs of a definition,
//! completing each pending task as the principal it is assigned to.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use taskflow_engine::{
    config::{DatabaseConfig, EngineConfig, LogFormat, StoreBackend},
    db::create_pool,
    definition::{load_definition_file, DefinitionStatus},
    directory::{Directory, StaticDirectory},
    engine::{InstanceData, InstanceStatus, Task},
    notify::{LogNotifier, NatsNotifier, Notifier},
    store::{InMemoryStore, PgStore, WorkflowStore},
    EngineError, ResultExt, WorkflowEngine,
};

#[derive(Parser)]
#[command(name = "taskflow")]
#[command(version, about = "Taskflow workflow engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse and validate definition files
    Validate {
        /// Definition files (.yaml, .yml or .json)
        #[arg(value_name = "FILE", required = true)]
        files: Vec<PathBuf>,
    },
    /// Run a definition, completing every pending task until the instance ends
    Simulate {
        /// Definition file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Initial instance data as a JSON object
        #[arg(long, value_name = "JSON", default_value = "{}")]
        data: String,

        /// Principal starting the instance
        #[arg(long = "as", value_name = "PRINCIPAL")]
        principal: String,

        /// Role table (YAML); overrides TASKFLOW_DIRECTORY_FILE
        #[arg(long, value_name = "YAML")]
        directory: Option<PathBuf>,

        /// Completion data for a step, can be repeated
        #[arg(long = "complete", value_name = "STEP=JSON")]
        completions: Vec<String>,

        /// Stop after this many task completions
        #[arg(long, default_value_t = 100)]
        max_steps: usize,
    },
}

/// Initialize tracing/logging.
fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,taskflow_engine=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

fn parse_object(json: &str) -> anyhow::Result<InstanceData> {
    match serde_json::from_str::<serde_json::Value>(json)? {
        serde_json::Value::Object(map) => Ok(map),
        other => bail!("expected a JSON object, got {}", other),
    }
}

/// Parse `STEP=JSON` pairs.
fn parse_completions(pairs: &[String]) -> anyhow::Result<Vec<(String, InstanceData)>> {
    pairs
        .iter()
        .map(|pair| {
            let (step, json) = pair
                .split_once('=')
                .with_context(|| format!("'{}' is not STEP=JSON", pair))?;
            Ok((step.to_string(), parse_object(json)?))
        })
        .collect()
}

fn validate_files(files: &[PathBuf]) -> anyhow::Result<()> {
    let mut failed = 0;

    for file in files {
        let definition = match load_definition_file(file) {
            Ok(def) => def,
            Err(e) => {
                println!("{}: {}", file.display(), e);
                failed += 1;
                continue;
            }
        };

        let report = taskflow_engine::definition::validate(&definition);
        for issue in &report.errors {
            println!("{}: error: {}", file.display(), issue);
        }
        for issue in &report.warnings {
            println!("{}: warning: {}", file.display(), issue);
        }
        if report.is_ok() {
            println!(
                "{}: ok ({} {}, {} steps)",
                file.display(),
                definition.name,
                definition.version,
                definition.steps.len()
            );
        } else {
            failed += 1;
        }
    }

    if failed > 0 {
        bail!("{} of {} definitions invalid", failed, files.len());
    }
    Ok(())
}

async fn build_store(config: &EngineConfig) -> anyhow::Result<Arc<dyn WorkflowStore>> {
    match config.store {
        StoreBackend::Memory => Ok(Arc::new(InMemoryStore::new())),
        StoreBackend::Postgres => {
            let db_config = DatabaseConfig::from_env().unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Failed to load database config, using defaults");
                DatabaseConfig::default()
            });
            let store = PgStore::new(create_pool(&db_config).await?);
            store.ensure_schema().await?;
            Ok(Arc::new(store))
        }
    }
}

async fn build_notifier(config: &EngineConfig) -> Arc<dyn Notifier> {
    let Some(url) = config.nats_url.as_deref() else {
        tracing::info!("NATS not configured, logging task assignments");
        return Arc::new(LogNotifier);
    };

    match NatsNotifier::connect(url, Some(&config.nats_subject), Some(&config.nats_stream)).await {
        Ok(notifier) => Arc::new(notifier),
        Err(e) => {
            tracing::warn!(error = %e, url = %url, "Failed to connect to NATS, logging task assignments");
            Arc::new(LogNotifier)
        }
    }
}

fn load_directory(path: Option<&Path>) -> anyhow::Result<StaticDirectory> {
    match path {
        Some(path) => Ok(StaticDirectory::load(path)?),
        None => Ok(StaticDirectory::new()),
    }
}

/// Register the definition, reusing a stored one with the same name and
/// version.
async fn register(
    engine: &WorkflowEngine,
    store: &dyn WorkflowStore,
    file: &Path,
) -> anyhow::Result<Uuid> {
    let definition = load_definition_file(file)?;
    let (name, version) = (definition.name.clone(), definition.version.clone());

    let id = match engine.define_workflow(definition).await {
        Ok(id) => id,
        Err(EngineError::InvalidState(_)) => store
            .find_definition(&name, &version)
            .await?
            .map(|def| def.id)
            .with_context(|| format!("definition '{}' {} disappeared", name, version))?,
        Err(e) => return Err(e.into()),
    };

    if engine.get_definition(id).await?.status == DefinitionStatus::Draft {
        engine.activate_workflow(id).await?;
    }
    Ok(id)
}

/// Principal who completes `task` in a simulation.
async fn completer(task: &Task, directory: &StaticDirectory, fallback: &str) -> anyhow::Result<String> {
    if let Some(assignee) = &task.assignee {
        return Ok(assignee.clone());
    }
    if let Some(role) = &task.assigned_role {
        if let Some(holder) = directory.find_principals_by_role(role).await?.into_iter().next() {
            return Ok(holder);
        }
    }
    Ok(fallback.to_string())
}

#[allow(clippy::too_many_arguments)]
async fn simulate(
    config: &EngineConfig,
    file: &Path,
    data: &str,
    principal: &str,
    directory_file: Option<&Path>,
    completions: &[String],
    max_steps: usize,
) -> anyhow::Result<()> {
    let data = parse_object(data).context("invalid --data")?;
    let completions = parse_completions(completions)?;

    let directory_path = directory_file.or(config.directory_file.as_deref().map(Path::new));
    let directory = Arc::new(load_directory(directory_path)?);
    tracing::debug!(principal = %principal, roles = ?directory.roles_of(principal), "Simulating");
    let store = build_store(config).await?;
    let notifier = build_notifier(config).await;

    let engine = WorkflowEngine::new(
        store.clone(),
        directory.clone() as Arc<dyn Directory>,
        notifier,
        config,
    );

    let definition_id = register(&engine, store.as_ref(), file).await?;
    let instance_id = engine.start_instance(definition_id, data, principal).await?;
    println!("started instance {}", instance_id);

    for step in 0..max_steps {
        let status = engine.get_instance_status(instance_id).await?;
        let Some(task) = status.pending_tasks.first() else {
            break;
        };

        let by = completer(task, &directory, principal).await?;
        let completion_data = completions
            .iter()
            .find(|(step_id, _)| *step_id == task.step_id)
            .map(|(_, data)| data.clone())
            .unwrap_or_default();

        let outcome = engine.complete_task(task.id, completion_data, &by).await?;
        let next: Vec<&str> = outcome
            .created_tasks
            .iter()
            .map(|t| t.step_id.as_str())
            .collect();
        println!(
            "#{} {} completed by {} -> [{}]",
            step + 1,
            task.step_id,
            by,
            next.join(", ")
        );
    }

    let status = engine.get_instance_status(instance_id).await?;
    println!(
        "instance {} is {} with data {}",
        instance_id,
        status.instance.status,
        serde_json::Value::Object(status.instance.data.clone())
    );

    if status.instance.status != InstanceStatus::Completed {
        let pending: Vec<&str> = status.pending_tasks.iter().map(|t| t.step_id.as_str()).collect();
        bail!(
            "stopped after {} steps with pending tasks [{}]",
            max_steps,
            pending.join(", ")
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = EngineConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Failed to load engine config, using defaults: {}", e);
        EngineConfig::default()
    });
    init_tracing(config.log_format);

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { files } => validate_files(&files),
        Commands::Simulate {
            file,
            data,
            principal,
            directory,
            completions,
            max_steps,
        } => {
            tokio::select! {
                result = simulate(
                    &config,
                    &file,
                    &data,
                    &principal,
                    directory.as_deref(),
                    &completions,
                    max_steps,
                ) => result.log("simulation"),
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Received Ctrl+C, stopping simulation");
                    Ok(())
                }
            }
        }
    }
}

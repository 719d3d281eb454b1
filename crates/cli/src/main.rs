//! taskrank CLI - rank tasks by model score and dependency readiness.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use taskrank_core::{AnnotatedTask, EvaluationContext, NewTask, TaskId, TaskPatch, TaskStatus};
use taskrank_prioritization::{
    DependencyResolver, EngineConfig, PrioritizationEngine, Resolution, ScorerState,
};
use taskrank_server::{ServerConfig, TaskServer};
use taskrank_storage::{JsonStorage, Storage};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "taskrank")]
#[command(about = "Rank tasks by priority score and dependency readiness", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Storage path for task records
    #[arg(short, long, default_value = ".taskrank", global = true)]
    storage: PathBuf,

    /// Scorer model artifact (defaults to <storage>/model.json)
    #[arg(short, long, global = true)]
    model: Option<PathBuf>,

    /// Score tasks in parallel
    #[arg(long, global = true)]
    parallel: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a new task
    Add {
        /// Task name
        name: String,
        /// Deadline (YYYY-MM-DD)
        #[arg(long)]
        deadline: String,
        /// Raw urgency
        #[arg(long, allow_negative_numbers = true)]
        urgency: i64,
        /// Normalized urgency
        #[arg(long, allow_negative_numbers = true)]
        normalized_urgency: f64,
        /// Initial status
        #[arg(long)]
        status: Option<String>,
        /// Comma-separated ids this task depends on
        #[arg(long, value_delimiter = ',')]
        deps: Vec<TaskId>,
    },
    /// List tasks
    List,
    /// Show task details
    Show {
        /// Task ID
        id: TaskId,
    },
    /// Update task fields (status is never changed)
    Update {
        /// Task ID
        id: TaskId,
        /// New name
        #[arg(long)]
        name: Option<String>,
        /// New deadline (YYYY-MM-DD)
        #[arg(long)]
        deadline: Option<String>,
        /// New raw urgency
        #[arg(long, allow_negative_numbers = true)]
        urgency: Option<i64>,
        /// New normalized urgency
        #[arg(long, allow_negative_numbers = true)]
        normalized_urgency: Option<f64>,
        /// New comma-separated dependency ids
        #[arg(long, value_delimiter = ',')]
        deps: Option<Vec<TaskId>>,
    },
    /// Delete a task
    Delete {
        /// Task ID
        id: TaskId,
    },
    /// Rank all stored tasks
    Prioritize {
        /// Comma-separated ids of completed tasks
        #[arg(long, value_delimiter = ',')]
        completed: Vec<TaskId>,
        /// Only show ready tasks
        #[arg(long)]
        ready_only: bool,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Serve line-delimited JSON requests on stdin/stdout
    Serve,
}

fn init_logging() {
    // Logs go to stderr so stdout stays clean for JSON output and `serve`.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    let config = ServerConfig {
        model_path: cli.model.clone().unwrap_or_else(|| cli.storage.join("model.json")),
        storage_path: cli.storage.clone(),
        engine: EngineConfig { parallel: cli.parallel },
        ..Default::default()
    };

    let mut storage = JsonStorage::new(&config.storage_path)
        .await
        .with_context(|| format!("opening storage at {}", config.storage_path.display()))?;

    match cli.command {
        Commands::Add { name, deadline, urgency, normalized_urgency, status, deps } => {
            let task = storage
                .create_task(NewTask {
                    name: Some(name),
                    deadline: Some(deadline),
                    urgency_score: Some(urgency),
                    normalized_urgency: Some(normalized_urgency),
                    status: status.map(TaskStatus::from),
                    dependencies: Some(deps),
                })
                .await?;
            println!("Added task: {} - {}", task.id, task.name);
        }
        Commands::List => {
            let tasks = storage.list_tasks().await?;
            println!("Tasks ({})", tasks.len());
            for task in tasks {
                println!(
                    "  {} | {} | {} | {} - {}",
                    task.id,
                    task.status,
                    task.deadline.as_deref().unwrap_or("-"),
                    task.urgency_score,
                    task.name,
                );
            }
        }
        Commands::Show { id } => {
            let Some(task) = storage.load_task(id).await? else {
                println!("Task not found");
                return Ok(());
            };

            println!("Task: {}", task.id);
            println!("  Name: {}", task.name);
            println!("  Deadline: {}", task.deadline.as_deref().unwrap_or("-"));
            println!("  Urgency: {} ({:.2} normalized)", task.urgency_score, task.normalized_urgency);
            println!("  Status: {}", task.status);
            println!("  Depends on: {}", format_ids(&task.dependencies));
        }
        Commands::Update { id, name, deadline, urgency, normalized_urgency, deps } => {
            let patch = TaskPatch {
                name,
                deadline,
                urgency_score: urgency,
                normalized_urgency,
                dependencies: deps,
            };
            if patch.is_empty() {
                println!("Nothing to update");
                return Ok(());
            }
            storage.update_task(id, patch).await?;
            println!("Updated task: {}", id);
        }
        Commands::Delete { id } => {
            storage.delete_task(id).await?;
            println!("Deleted task: {}", id);
        }
        Commands::Prioritize { completed, ready_only, json } => {
            let engine = build_engine(&config);
            engine.ensure_scorer()?;
            let tasks = storage.list_tasks().await?;
            let ctx = EvaluationContext::new(completed);

            let ranked = if ready_only {
                engine.ready_queue(&tasks, &ctx)?
            } else {
                engine.prioritize(&tasks, &ctx)?
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&ranked)?);
            } else {
                print_ranking(&ranked, &ctx);
            }
        }
        Commands::Serve => {
            let engine = build_engine(&config);
            let mut server = TaskServer::new(config, storage, engine);
            server.start().await?;
        }
    }

    Ok(())
}

fn build_engine(config: &ServerConfig) -> PrioritizationEngine {
    let scorer = ScorerState::load(&config.model_path);
    info!("Scorer available: {}", scorer.is_available());
    PrioritizationEngine::new(scorer).with_config(config.engine.clone())
}

fn print_ranking(ranked: &[AnnotatedTask], ctx: &EvaluationContext) {
    println!("Prioritized tasks ({})", ranked.len());
    for line in ranking_lines(ranked, ctx) {
        println!("{}", line);
    }
}

fn ranking_lines(ranked: &[AnnotatedTask], ctx: &EvaluationContext) -> Vec<String> {
    let resolver = DependencyResolver::new();
    ranked
        .iter()
        .enumerate()
        .map(|(rank, entry)| {
            let score = match (&entry.score, &entry.error) {
                (Some(score), _) => format!("{:>9.3}", score),
                (None, Some(_)) => format!("{:>9}", "ERROR"),
                (None, None) => format!("{:>9}", "-"),
            };
            let mut line = format!(
                "  {:>3}. {} | {} | {} - {}",
                rank + 1,
                score,
                entry.task.id,
                entry.task.status,
                entry.task.name
            );
            if let Resolution::Blocked(waiting) = resolver.check(&entry.task, &ctx.completed_ids) {
                line.push_str(&format!(" (waiting on {})", format_ids(&waiting)));
            }
            if let Some(error) = &entry.error {
                line.push_str(&format!(" [{}]", error));
            }
            line
        })
        .collect()
}

fn format_ids(ids: &[TaskId]) -> String {
    if ids.is_empty() {
        return "-".to_string();
    }
    ids.iter().map(TaskId::to_string).collect::<Vec<_>>().join(", ")
}

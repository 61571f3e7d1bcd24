//! `pto`: command-line surface for the Parallel Task Orchestrator.
//!
//! One subcommand per major operation, resolving config, acquiring a
//! connection pool, calling the matching `pto-core`/`pto-db` module
//! function, then closing the pool and propagating the `Result` — this
//! corpus's own `main.rs` dispatch idiom, generalized from a single
//! coding-agent fleet to the PTO's task-list/execution vocabulary.

mod config;
mod db_cmd;
mod execute_cmd;
mod init_cmd;
mod list_cmd;
mod readiness_cmd;
mod resolve_cmd;
mod task_cmd;
mod worker;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use tracing_subscriber::EnvFilter;

use config::PtoConfig;
use pto_db::pool;
use task_cmd::AddTaskArgs;

#[derive(Parser)]
#[command(
    name = "pto",
    about = "Parallel task orchestrator: schedules dependency- and file-footprint-aware task graphs across a pool of worker processes"
)]
struct Cli {
    /// Override the resolved database URL (highest-priority source in the
    /// config resolution chain).
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a starter config file to $XDG_CONFIG_HOME/pto/config.toml.
    Init {
        #[arg(long)]
        force: bool,
    },
    /// Database maintenance commands.
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Task-list commands.
    List {
        #[command(subcommand)]
        command: ListCommands,
    },
    /// Task commands.
    Task {
        #[command(subcommand)]
        command: TaskCommands,
    },
    /// Admit a task list for execution and drive its waves to completion.
    Execute {
        list_id: String,
        /// Proceed even if some eligible tasks fail the readiness gate.
        #[arg(long)]
        allow_incomplete: bool,
        /// Override the configured concurrency cap for this run.
        #[arg(long)]
        concurrency: Option<usize>,
        /// Worker kind to dispatch tasks to.
        #[arg(long, default_value = "shell")]
        worker: String,
    },
    /// Auto-resolve detected file conflicts and rebuild waves.
    ResolveConflicts { list_id: String },
    /// Score every eligible task in a list against the readiness gate.
    Readiness { list_id: String },
    /// Halt further task assignment without touching in-flight tasks.
    Pause { list_id: String },
    /// Resume a paused list.
    Resume { list_id: String },
    /// Cancel a list: mark running tasks cancelled and close the session.
    Cancel { list_id: String },
    /// Print a shell completion script to stdout.
    Completions { shell: Shell },
}

#[derive(Subcommand)]
enum DbCommands {
    /// Create the target database if it does not exist and apply migrations.
    Init,
}

#[derive(Subcommand)]
enum ListCommands {
    /// Create a new, empty task list.
    Create { name: String },
    /// Show one task list and its member tasks.
    Show { list_id: String },
    /// Show one list's status, or every list's progress summary if omitted.
    Status { list_id: Option<String> },
}

#[derive(Subcommand)]
enum TaskCommands {
    /// Register a task plus its footprint, acceptance criteria, test
    /// commands, and `depends_on` edges.
    Add {
        #[arg(long = "list")]
        list_id: String,
        #[arg(long)]
        display_id: String,
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value = "general")]
        category: String,
        #[arg(long, default_value = "p3")]
        priority: String,
        #[arg(long, default_value = "small")]
        effort: String,
        #[arg(long)]
        phase: Option<String>,
        #[arg(long, default_value_t = 0)]
        position: i32,
        /// `path:operation[:confidence]`, repeatable.
        #[arg(long = "impact")]
        impacts: Vec<String>,
        #[arg(long = "criterion")]
        criteria: Vec<String>,
        #[arg(long = "test")]
        test_commands: Vec<String>,
        #[arg(long = "depends-on")]
        depends_on: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    // Completions and config init need no database at all; db init needs
    // to run before any pool is opened, since the target database may not
    // exist yet.
    match &cli.command {
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(*shell, &mut cmd, name, &mut std::io::stdout());
            return Ok(());
        }
        Commands::Init { force } => {
            return init_cmd::run_init(cli.database_url.as_deref(), *force);
        }
        _ => {}
    }

    let config = PtoConfig::resolve(cli.database_url.as_deref())?;

    if let Commands::Db {
        command: DbCommands::Init,
    } = cli.command
    {
        return db_cmd::run_init(&config.db_config).await;
    }

    let pool = pool::create_pool(&config.db_config).await?;
    let result = dispatch(&pool, cli.command, &config).await;
    pool.close().await;
    result
}

async fn dispatch(pool: &sqlx::PgPool, command: Commands, config: &PtoConfig) -> Result<()> {
    match command {
        Commands::Init { .. } | Commands::Completions { .. } | Commands::Db { .. } => {
            unreachable!("handled before the general connection pool was acquired")
        }
        Commands::List { command } => match command {
            ListCommands::Create { name } => list_cmd::run_create(pool, &name).await,
            ListCommands::Show { list_id } => list_cmd::run_show(pool, &list_id).await,
            ListCommands::Status { list_id } => list_cmd::run_status(pool, list_id.as_deref()).await,
        },
        Commands::Task { command } => match command {
            TaskCommands::Add {
                list_id,
                display_id,
                title,
                description,
                category,
                priority,
                effort,
                phase,
                position,
                impacts,
                criteria,
                test_commands,
                depends_on,
            } => {
                task_cmd::run_add(
                    pool,
                    AddTaskArgs {
                        list_id,
                        display_id,
                        title,
                        description,
                        category,
                        priority,
                        effort,
                        phase,
                        position,
                        impacts,
                        criteria,
                        test_commands,
                        depends_on,
                    },
                )
                .await
            }
        },
        Commands::Execute {
            list_id,
            allow_incomplete,
            concurrency,
            worker,
        } => {
            execute_cmd::run_execute(
                pool,
                &list_id,
                allow_incomplete,
                concurrency,
                &worker,
                &config.orchestrator,
            )
            .await
        }
        Commands::ResolveConflicts { list_id } => resolve_cmd::run(pool, &list_id).await,
        Commands::Readiness { list_id } => readiness_cmd::run(pool, &list_id).await,
        Commands::Pause { list_id } => execute_cmd::run_pause(pool, &list_id).await,
        Commands::Resume { list_id } => execute_cmd::run_resume(pool, &list_id).await,
        Commands::Cancel { list_id } => execute_cmd::run_cancel(pool, &list_id).await,
    }
}

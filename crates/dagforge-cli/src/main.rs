//! dagforge CLI tool.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod client;
mod commands;

#[derive(Parser)]
#[command(name = "dagforge")]
#[command(about = "dagforge job orchestration CLI", long_about = None)]
struct Cli {
    /// API server URL
    #[arg(long, env = "DAGFORGE_API_URL", default_value = "http://localhost:9100")]
    api_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a job specification file
    Validate {
        /// Path to the job file
        #[arg(default_value = "job.kdl")]
        path: String,
    },
    /// Print a job's assets with macros rendered
    Render {
        /// Path to the job file
        path: String,
        /// Scheduled time (RFC 3339); defaults to the job's start date
        #[arg(long)]
        at: Option<String>,
    },
    /// Manage registered jobs
    Job {
        #[command(subcommand)]
        command: JobCommands,
    },
    /// Show a project's dependency graph and priority weights
    Graph {
        /// Project name
        project: String,
    },
    /// Deploy compiled jobs to object storage
    Deploy {
        /// Project name
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        project: Option<String>,
        /// Deploy every registered project
        #[arg(long)]
        all: bool,
    },
}

#[derive(Subcommand)]
enum JobCommands {
    /// Register every job in a file with a project
    Register {
        /// Project name
        project: String,
        /// Path to the job file
        path: String,
    },
    /// List a project's jobs
    List {
        /// Project name
        project: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { path } => {
            commands::validate(&path)?;
        }
        Commands::Render { path, at } => {
            commands::render(&path, at.as_deref())?;
        }
        Commands::Job { command } => match command {
            JobCommands::Register { project, path } => {
                commands::jobs::register(&cli.api_url, &project, &path).await?;
            }
            JobCommands::List { project } => {
                commands::jobs::list(&cli.api_url, &project).await?;
            }
        },
        Commands::Graph { project } => {
            commands::graph(&cli.api_url, &project).await?;
        }
        Commands::Deploy { project, all } => match (project, all) {
            (_, true) => commands::deploy::all(&cli.api_url).await?,
            (Some(project), false) => commands::deploy::project(&cli.api_url, &project).await?,
            (None, false) => anyhow::bail!("a project name or --all is required"),
        },
    }

    Ok(())
}

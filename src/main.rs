mod repl;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use maeser_backend::core::config::{AppPaths, ConfigService};
use maeser_backend::core::logging;
use maeser_backend::state::AppState;

/// Maeser: multi-topic retrieval-augmented tutoring backend
#[derive(Parser, Debug)]
#[command(name = "maeser-backend", version, about, long_about = None)]
struct Cli {
    /// Data directory (defaults to MAESER_DATA_DIR or the platform data dir)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Also log to stderr (-v); the log file is always written
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Write the default configuration if none exists
    Init,
    /// Print the effective configuration with secrets redacted
    Config,
    /// List configured branches
    Branches,
    /// Chat interactively with a branch
    Chat {
        #[arg(short, long, default_value = "pipeline")]
        branch: String,
        /// Resume an existing session
        #[arg(short, long)]
        session: Option<String>,
        /// User identifier appended to new session ids
        #[arg(short, long)]
        user: Option<String>,
    },
    /// Ask a single question and print the answer
    Ask {
        question: String,
        #[arg(short, long, default_value = "pipeline")]
        branch: String,
        #[arg(short, long)]
        session: Option<String>,
    },
    /// Add a text file to a topic's knowledge store
    Ingest {
        #[arg(short, long, default_value = "pipeline")]
        branch: String,
        #[arg(short, long)]
        topic: String,
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Show a session's conversation, or list sessions when none is given
    History {
        #[arg(short, long, default_value = "pipeline")]
        branch: String,
        #[arg(short, long)]
        session: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let paths = match cli.data_dir {
        Some(dir) => AppPaths::for_data_dir(dir),
        None => AppPaths::new(),
    };
    let paths = Arc::new(paths);
    logging::init(&paths, cli.verbose > 0);

    match cli.command {
        Commands::Init => {
            let config = ConfigService::new(paths.clone());
            let path = config.ensure_default_config()?;
            println!("Configuration: {}", path.display());
            println!("Data directory: {}", paths.user_data_dir.display());
        }
        Commands::Config => {
            let config = ConfigService::new(paths.clone());
            let merged = config.load_config()?;
            let redacted = config.redact_sensitive_values(&merged);
            print!("{}", serde_yaml::to_string(&redacted)?);
        }
        Commands::Branches => {
            let state = AppState::initialize(paths).await?;
            for branch in state.sessions.branches() {
                let pipeline = state.sessions.pipeline(&branch.name)?;
                let topics: Vec<&str> = pipeline.registry().names().collect();
                println!("{} ({}): {}", branch.name, branch.label, topics.join(", "));
            }
        }
        Commands::Chat {
            branch,
            session,
            user,
        } => {
            let state = AppState::initialize(paths).await?;
            repl::run(&state.sessions, &branch, session, user.as_deref()).await?;
        }
        Commands::Ask {
            question,
            branch,
            session,
        } => {
            let state = AppState::initialize(paths).await?;
            let session = match session {
                Some(id) => id,
                None => state.sessions.new_session_id(&branch, None)?,
            };
            let response = state.sessions.ask(&branch, &session, &question).await?;
            println!("{}", response.answer);
            eprintln!(
                "session {} | topics [{}] | {} tokens | ${:.5}",
                session,
                response.topics.join(", "),
                response.usage.total_tokens,
                response.usage.cost_usd
            );
        }
        Commands::Ingest {
            branch,
            topic,
            file,
        } => {
            let state = AppState::initialize(paths).await?;
            let text = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let source = file
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| file.display().to_string());
            let inserted = state.ingest(&branch, &topic, &text, &source).await?;
            println!("Stored {} chunks from {} under '{}'", inserted, source, topic);
        }
        Commands::History { branch, session } => {
            let state = AppState::initialize(paths).await?;
            match session {
                Some(session) => {
                    let turns = state.sessions.conversation_history(&branch, &session).await?;
                    repl::print_history(&turns);
                }
                None => {
                    for summary in state.sessions.sessions(&branch).await? {
                        println!(
                            "{}  {:>3} turns  {}  {}",
                            summary.session_id,
                            summary.turn_count,
                            summary.updated_at.format("%Y-%m-%d %H:%M"),
                            summary.preview.unwrap_or_default()
                        );
                    }
                }
            }
        }
    }

    Ok(())
}

//! rivet CLI: the main entry point.
//!
//! Commands:
//! - `chat`: Interactive conversation (default)
//! - `ask`: Answer a single message through the tool-calling loop
//! - `pipeline`: Answer a single message through the four-stage graph
//! - `history`: List saved conversations

use clap::{Parser, Subcommand};
use rivet_config::AppConfig;
use std::path::PathBuf;

mod app;
mod commands;
mod logging;

#[derive(Parser)]
#[command(
    name = "rivet",
    about = "rivet: a tool-calling LLM assistant for the terminal",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to a config file (default: configs/config.toml, config.toml, ~/.rivet/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// User id (default: $USER / $USERNAME)
    #[arg(short, long, global = true)]
    user: Option<String>,

    /// Session id; names the log file (default: <user>_<unix-secs>)
    #[arg(short, long, global = true)]
    session: Option<String>,

    /// Model override for this run
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// Persona for this run instead of the stored one
    #[arg(long, global = true)]
    memory: Option<String>,

    /// Enable verbose logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive conversation
    Chat,

    /// Send a single message
    Ask {
        /// The message (words are joined with spaces)
        #[arg(required = true)]
        message: Vec<String>,
    },

    /// Answer a single message with the think / decide / act / summarize graph
    Pipeline {
        #[arg(required = true)]
        message: Vec<String>,
    },

    /// List saved conversations for the current user
    History,
}

#[tokio::main]
async fn main() {
    if let Err(e) = real_main().await {
        eprintln!("  [Error] {e:#}");
        std::process::exit(1);
    }
}

async fn real_main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(model) = cli.model.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
        config.api.model = model.to_string();
    }

    let user_id = app::resolve_user_id(cli.user.as_deref(), |key| std::env::var(key).ok());
    let session_id = cli
        .session
        .clone()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| app::default_session_id(&user_id));

    logging::init_tracing(&config.logging, &session_id, cli.verbose).map_err(anyhow::Error::msg)?;
    tracing::info!(user = %user_id, session = %session_id, model = %config.api.model, "Starting rivet");

    let options = app::Options {
        user_id,
        session_id,
        persona: cli.memory,
    };

    match cli.command.unwrap_or(Commands::Chat) {
        Commands::History => commands::history::run(&config, &options.user_id).await,
        Commands::Chat => commands::chat::run(app::App::build(config, options).await?).await,
        Commands::Ask { message } => {
            commands::ask::run(app::App::build(config, options).await?, &message.join(" "), false).await
        }
        Commands::Pipeline { message } => {
            commands::ask::run(app::App::build(config, options).await?, &message.join(" "), true).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn chat_is_the_default() {
        let cli = Cli::try_parse_from(["rivet", "-u", "ana", "--memory", "be kind"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.user.as_deref(), Some("ana"));
        assert_eq!(cli.memory.as_deref(), Some("be kind"));
    }

    #[test]
    fn ask_joins_words_and_accepts_global_flags() {
        let cli = Cli::try_parse_from(["rivet", "ask", "list", "files", "-m", "gpt-4o", "-v"]).unwrap();
        match cli.command {
            Some(Commands::Ask { message }) => assert_eq!(message.join(" "), "list files"),
            _ => panic!("expected ask"),
        }
        assert_eq!(cli.model.as_deref(), Some("gpt-4o"));
        assert!(cli.verbose);
    }

    #[test]
    fn ask_requires_a_message() {
        assert!(Cli::try_parse_from(["rivet", "ask"]).is_err());
    }
}

use clap::{Parser, Subcommand};

use voicedesk_core::config::Config;
use voicedesk_core::protocol::voice_endpoint;

mod chat;
mod logging;
mod voice;

#[derive(Parser)]
#[command(
    name = "voicedesk",
    about = "Talk to your agents: a live voice session or text chat from the terminal",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a voice session with an agent
    Voice {
        /// Agent id
        #[arg(short, long)]
        agent: u64,
    },

    /// Chat with an agent over the text relay (one-shot or interactive)
    Chat {
        /// Agent id
        #[arg(short, long)]
        agent: u64,

        /// Message to send (omit for interactive mode)
        #[arg(short, long)]
        message: Option<String>,

        /// Continue an existing chat session
        #[arg(short, long)]
        session: Option<String>,
    },

    /// Chat session management
    Sessions {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show configuration status
    Status,
}

#[derive(Subcommand)]
enum SessionAction {
    /// List an agent's chat sessions
    List {
        #[arg(short, long)]
        agent: u64,
    },
    /// Clear a chat session's history
    Clear {
        #[arg(short, long)]
        agent: u64,
        session: String,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Get a specific config value
    Get { key: String },
    /// Print the config file path
    Path,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .map(std::path::PathBuf::from)
        .unwrap_or_else(Config::config_path);
    let config = Config::load(&config_path)?;

    logging::init(&config, cli.verbose)?;

    match cli.command {
        Commands::Voice { agent } => voice::run(&config, agent).await?,
        Commands::Chat {
            agent,
            message,
            session,
        } => chat::run(&config, agent, message, session).await?,
        Commands::Sessions { action } => match action {
            SessionAction::List { agent } => chat::list_sessions(&config, agent).await?,
            SessionAction::Clear { agent, session } => {
                chat::clear_session(&config, agent, &session).await?
            }
        },
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let json = serde_json::to_string_pretty(&config)?;
                println!("{json}");
            }
            ConfigAction::Get { key } => match config.get_path(&key) {
                Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                None => anyhow::bail!("No config value at '{key}'"),
            },
            ConfigAction::Path => println!("{}", config_path.display()),
        },
        Commands::Status => {
            println!("VoiceDesk v{}", env!("CARGO_PKG_VERSION"));
            println!("Config: {}", config_path.display());
            println!("Server: {}", config.base_url());
            match voice_endpoint(&config.base_url(), 1) {
                Some(endpoint) => println!("Voice endpoint (agent 1): {endpoint}"),
                None => println!("Voice endpoint: unavailable"),
            }
            println!("Speaking rate: {} wpm", config.words_per_minute());

            let (warnings, errors) = config.validate();
            for warning in &warnings {
                println!("warning: {warning}");
            }
            for error in &errors {
                println!("error: {error}");
            }
            if errors.is_empty() {
                println!("Config: ok");
            }
        }
    }

    Ok(())
}

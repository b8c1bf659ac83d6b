mod cli;
mod config;
mod gemini_client;
mod inference;

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use dotenv::dotenv;
use eyre::Result;
use tracing::{Level, debug, info};
use tracing_subscriber::FmtSubscriber;

use crate::cli::chat::ChatContext;
use crate::config::{ChatConfig, ConfigOverrides};
use crate::gemini_client::GeminiClient;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    chat: ChatArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a chat session
    Chat,
}

#[derive(Args)]
struct ChatArgs {
    /// Send a single message and exit
    #[arg(short, long, global = true)]
    input: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Gemini model name, e.g. gemini-1.5-flash
    #[arg(long, global = true)]
    model: Option<String>,

    /// Text file holding the persona instruction
    #[arg(long, global = true)]
    persona_file: Option<PathBuf>,

    /// Request timeout for the Gemini API, in seconds
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load environment variables from .env file
    dotenv().ok();

    // Chat is the only mode; its flags are global so they may sit on
    // either side of the subcommand.
    let cli = Cli::parse();
    let args = cli.chat;

    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting Mom Chat CLI");
    if cli.command.is_none() {
        debug!("No subcommand given, defaulting to chat");
    }

    let config = match ChatConfig::load(ConfigOverrides {
        model: args.model,
        persona_file: args.persona_file,
        timeout_secs: args.timeout_secs,
    }) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return Ok(ExitCode::FAILURE);
        }
    };
    debug!("Loaded {:?}", config);

    let client = match GeminiClient::new(&config) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Failed to initialize Gemini client: {}", e);
            return Ok(ExitCode::FAILURE);
        }
    };
    debug!("Using Gemini endpoint {}", client.endpoint());

    let interactive = args.input.is_none();
    let mut chat_context = ChatContext::new(
        Box::new(io::stdout()),
        args.input,
        interactive,
        Arc::new(client),
    );
    chat_context.run().await
}

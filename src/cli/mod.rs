//! Command-line interface parsing and handling
//!
//! This module handles parsing command-line arguments and executing the appropriate commands.

use std::error::Error;
use std::fs::OpenOptions;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Local;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::core::app::{App, AppSetup};
use crate::core::config::Config;
use crate::core::credentials::{ChainedCredentials, CredentialSource, KeyringCredentials};
use crate::core::requestor::StreamRequestor;
use crate::core::store::{ConversationStore, JsonFileStore, MemoryStore};
use crate::core::transport::ReqwestTransport;
use crate::core::turn::RequestSettings;
use crate::ui::event_loop::run_chat;
use crate::utils::url::completions_endpoint;

const LOG_ENV: &str = "PARLEY_LOG";

#[derive(Parser)]
#[command(name = "parley")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "A terminal chat client for OpenAI-compatible APIs")]
#[command(
    long_about = "Parley is a full-screen terminal chat client. Replies stream in as they are \
generated, and several conversations can be waiting on the model at once.\n\n\
Authentication:\n\
  Use 'parley auth' to store an API key in your system keyring.\n\n\
Environment Variables (checked before the keyring):\n\
  PARLEY_API_KEY / OPENAI_API_KEY     API key\n\
  PARLEY_BASE_URL / OPENAI_BASE_URL   API base URL (defaults to https://api.openai.com/v1)\n\
  PARLEY_LOG                          Write logs to this file\n\n\
Controls:\n\
  Enter             Open a chat from the menu, or send the message\n\
  Alt+Enter         Insert a newline\n\
  Esc               Back to the chat list\n\
  Ctrl+X            Cancel the reply being streamed\n\
  Ctrl+R            Retry the last reply\n\
  Ctrl+T            Generate a title for the chat\n\
  F1                Show all key bindings\n\
  Ctrl+C            Quit"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Model for new conversations
    #[arg(short = 'm', long, global = true, value_name = "MODEL")]
    pub model: Option<String>,

    /// API base URL; `chat/completions` is appended
    #[arg(short = 'u', long, global = true, value_name = "URL")]
    pub base_url: Option<String>,

    /// Write logs to this file
    #[arg(short = 'l', long, global = true, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Read configuration from this file instead of the default location
    #[arg(short = 'c', long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Keep conversations in memory only
    #[arg(long, global = true)]
    pub ephemeral: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the chat interface (default)
    Chat,
    /// List saved conversations
    List,
    /// Store an API key in the system keyring
    Auth {
        /// Key to store; prompted for when omitted
        #[arg(long)]
        key: Option<String>,
    },
    /// Print the effective configuration
    Config,
}

pub fn main() -> Result<(), Box<dyn Error>> {
    tokio::runtime::Runtime::new()?.block_on(async_main())
}

async fn async_main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let log_file = args
        .log_file
        .clone()
        .or_else(|| std::env::var_os(LOG_ENV).map(PathBuf::from));
    if let Some(path) = &log_file {
        init_logging(path)?;
    }
    info!(
        version = env!("CARGO_PKG_VERSION"),
        git = option_env!("VERGEN_GIT_SHA").unwrap_or("unknown"),
        "parley starting"
    );

    let config = load_config(&args)?;

    match args.command.unwrap_or(Commands::Chat) {
        Commands::Chat => chat(config, args.base_url, args.ephemeral).await,
        Commands::List => list(&config),
        Commands::Auth { key } => auth(key),
        Commands::Config => {
            config.print_all();
            Ok(())
        }
    }
}

fn init_logging(path: &Path) -> Result<(), Box<dyn Error>> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("parley=info"));
    tracing_subscriber::fmt()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_env_filter(filter)
        .try_init()
        .map_err(|err| err as Box<dyn Error>)?;
    Ok(())
}

fn load_config(args: &Args) -> Result<Config, Box<dyn Error>> {
    let mut config = match &args.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    if let Some(model) = &args.model {
        config.default_model = model.clone();
    }
    Ok(config)
}

async fn chat(
    config: Config,
    base_url_override: Option<String>,
    ephemeral: bool,
) -> Result<(), Box<dyn Error>> {
    let mut credential = ChainedCredentials::standard(config.base_url()).active_credential()?;
    if let Some(base_url) = base_url_override {
        credential.base_url = base_url;
    }
    let endpoint = completions_endpoint(&credential.base_url)?;
    info!(%endpoint, model = %config.default_model, ephemeral, "Starting chat");

    let store: Box<dyn ConversationStore> = if ephemeral {
        Box::new(MemoryStore::new())
    } else {
        Box::new(JsonFileStore::new(config.resolved_data_dir()?))
    };

    let app = App::new(AppSetup {
        settings: RequestSettings {
            endpoint,
            api_key: credential.api_key,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            timeout: config.request_timeout(),
        },
        default_model: config.default_model.clone(),
        system_prompt: config.system_prompt.clone(),
        store,
        auto_title: config.auto_title,
    });
    let requestor = StreamRequestor::new(Arc::new(ReqwestTransport::default()));
    run_chat(app, requestor).await
}

fn list(config: &Config) -> Result<(), Box<dyn Error>> {
    let store = JsonFileStore::new(config.resolved_data_dir()?);
    let conversations = store.list()?;
    if conversations.is_empty() {
        println!("No saved conversations in {}", store.dir().display());
        return Ok(());
    }
    for conversation in conversations {
        println!(
            "{}  {}  {:>3} msgs  {}",
            conversation
                .updated_at
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M"),
            conversation.model,
            conversation.len(),
            conversation.display_title()
        );
    }
    Ok(())
}

fn auth(key: Option<String>) -> Result<(), Box<dyn Error>> {
    let key = match key {
        Some(key) => key,
        None => {
            print!("API key: ");
            io::stdout().flush()?;
            let mut line = String::new();
            io::stdin().lock().read_line(&mut line)?;
            line
        }
    };
    let key = key.trim();
    if key.is_empty() {
        return Err("no API key given".into());
    }
    KeyringCredentials::store(key)?;
    println!("✅ API key stored in the system keyring");
    Ok(())
}

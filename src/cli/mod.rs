use std::env;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;

use crate::app::App;
use crate::config::{AppConfig, ConfigLoader};
use crate::session::Session;
use crate::storage;

pub mod commands;

use self::commands::{AddArgs, EditArgs, IdArgs, ListArgs, ShowArgs};

#[derive(Parser, Debug)]
#[command(
    name = "todotui",
    version,
    about = "Keyboard-first terminal todo application"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Config file or directory to use instead of the XDG default
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Directory for the database and media files
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Act as this user (beats TODOTUI_USER and the config file)
    #[arg(long)]
    pub user: Option<String>,

    /// Log filter written to stderr (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Launch the interactive TUI (default)
    Tui,
    /// Create a new todo from the command line
    Add(AddArgs),
    /// Print one page of the todo list
    List(ListArgs),
    /// Print a single todo in full
    Show(ShowArgs),
    /// Flip a todo between done and pending
    Toggle(IdArgs),
    /// Update a todo's title or content
    Edit(EditArgs),
    /// Delete a todo and its media assets
    Remove(IdArgs),
}

impl Cli {
    /// Path flags are folded into the environment overrides so the discovery
    /// code has a single source to read from.
    fn export_path_overrides(&self) {
        if let Some(path) = &self.config {
            env::set_var("TODOTUI_CONFIG", path);
        }
        if let Some(path) = &self.data_dir {
            env::set_var("TODOTUI_DATA", path);
        }
    }
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    cli.export_path_overrides();
    init_tracing(&cli.log_level)?;

    let loader = ConfigLoader::discover()?;
    let paths = loader.paths().clone();
    let config = loader.load_or_init()?;
    let storage = storage::init(&paths, &config.storage)?;
    let session = resolve_session(cli.user.as_deref(), &config);
    let config = Arc::new(config);

    match cli.command.unwrap_or(Commands::Tui) {
        Commands::Tui => {
            let mut app = App::new(config.clone(), storage.clone(), session, paths.clone())?;
            commands::run_tui(&mut app)
        }
        Commands::Add(args) => commands::add_todo(config, storage, session, paths, args),
        Commands::List(args) => commands::list_todos(config, storage, args),
        Commands::Show(args) => commands::show_todo(storage, args),
        Commands::Toggle(args) => commands::toggle_todo(storage, session, args),
        Commands::Edit(args) => commands::edit_todo(storage, session, paths, args),
        Commands::Remove(args) => commands::remove_todo(storage, session, paths, args),
    }
}

/// The current identity is an explicit value resolved once at startup; the
/// flag wins over the environment, the environment over the config file.
fn resolve_session(cli_user: Option<&str>, config: &AppConfig) -> Session {
    let raw = cli_user
        .map(str::to_string)
        .or_else(|| env::var("TODOTUI_USER").ok())
        .or_else(|| config.session.user.clone());
    Session::from_raw(raw.as_deref())
}

fn init_tracing(level: &str) -> Result<()> {
    static LOGGING: OnceCell<()> = OnceCell::new();
    if LOGGING.set(()).is_err() {
        return Ok(());
    }
    let filter =
        EnvFilter::try_new(level).with_context(|| format!("invalid log level {level:?}"))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
    Ok(())
}

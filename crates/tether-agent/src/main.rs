//! # tether
//!
//! Session server binary: wires settings, logging, the credential store,
//! the token issuer and the HTTP/WebSocket server. Also carries the
//! account administration commands the credential store relies on.

#![deny(unsafe_code)]

mod account;
mod serve;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tether_settings::LoadedSettings;

/// Authenticated session server.
#[derive(Parser, Debug)]
#[command(name = "tether", about = "Authenticated session server", version)]
struct Cli {
    /// Settings file (default `~/.tether/settings.json`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Path to the `SQLite` credential database.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the server (default).
    Serve(ServeArgs),
    /// Manage accounts.
    #[command(subcommand)]
    Account(AccountCommand),
}

#[derive(Args, Debug, Default)]
struct ServeArgs {
    /// Host to bind.
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,
}

#[derive(Subcommand, Debug)]
enum AccountCommand {
    /// Create an account.
    Add {
        /// Account email; the identity tokens are issued for.
        #[arg(long)]
        email: String,
        /// Plaintext password.
        #[arg(long)]
        password: String,
        /// Display name.
        #[arg(long)]
        name: String,
        /// Role label.
        #[arg(long, default_value = "user")]
        role: String,
    },
    /// List accounts (passwords omitted).
    List,
}

/// Load settings from `--config` or the default path, then apply flags.
fn load_settings(cli: &Cli) -> Result<LoadedSettings> {
    let path = cli
        .config
        .clone()
        .unwrap_or_else(tether_settings::settings_path);
    let mut loaded = tether_settings::load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    if let Some(db) = &cli.db {
        loaded.settings.database.path.clone_from(db);
    }
    Ok(loaded)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let loaded = load_settings(&cli)?;

    match cli.command {
        None => serve::run(loaded, &ServeArgs::default()).await,
        Some(Command::Serve(args)) => serve::run(loaded, &args).await,
        Some(Command::Account(cmd)) => {
            // Account commands run without a log subscriber.
            for o in &loaded.ignored {
                eprintln!("warning: ignoring invalid {}={:?}", o.key, o.value);
            }
            let settings = loaded.settings;
            let repo = account::open_repo(&settings.database.path)?;
            let mut out = std::io::stdout().lock();
            match cmd {
                AccountCommand::Add {
                    email,
                    password,
                    name,
                    role,
                } => account::add(&repo, email, password, name, role, &mut out),
                AccountCommand::List => account::list(&repo, &mut out),
            }
        }
    }
}

//! DocVault Admin CLI
//!
//! Administration tool working directly against the server's database.
//!
//! # Usage
//!
//! ```bash
//! docvault-admin register alice123 'Passw0rd!'
//! docvault-admin sweep-sessions
//! ```
//!
//! Reads the same configuration as the server (`DOCVAULT_CONFIG`,
//! `DOCVAULT_DATABASE_PATH`, ...).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use docvault::db::{init_db, SqliteSessionRepository, SqliteUserRepository};
use docvault::{AuthService, Config};

#[derive(Parser)]
#[command(name = "docvault-admin")]
#[command(version)]
#[command(about = "DocVault server administration tool")]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a new user
    Register {
        /// Login (at least 8 letters or digits)
        login: String,
        /// Password
        password: String,
    },
    /// Delete every expired session
    SweepSessions,
}

async fn auth_service(config: &Config) -> Result<AuthService, Box<dyn std::error::Error>> {
    let pool = init_db(&config.database_path).await?;
    Ok(AuthService::new(
        Arc::new(SqliteUserRepository::new(pool.clone())),
        Arc::new(SqliteSessionRepository::new(pool)),
        config.admin_token.clone(),
        config.token_duration(),
    ))
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load(cli.config)?;
    let auth = auth_service(&config).await?;

    match cli.command {
        Commands::Register { login, password } => {
            let user = auth
                .register(&config.admin_token, &login, &password)
                .await?;
            println!("Registered user: {}", user.login);
            println!("  ID: {}", user.id);
        }
        Commands::SweepSessions => {
            let removed = auth.sweep_expired_sessions().await?;
            println!("Removed {} expired session(s)", removed);
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

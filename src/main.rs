use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;

use gather::commands::{self, Command};
use gather::config::{config_path, Config};
use gather::session::Session;
use gather::storage::{Database, DatabaseError};

#[derive(Parser, Debug)]
#[command(
    name = "gather",
    version,
    about = "Feed aggregator: follow RSS feeds and collect their posts"
)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

/// Create the data directory with user-only permissions on Unix.
fn ensure_private_dir(dir: &Path) -> Result<()> {
    if dir.as_os_str().is_empty() || dir.exists() {
        return Ok(());
    }
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory {}", dir.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700)) {
            tracing::warn!(
                path = %dir.display(),
                error = %e,
                "Failed to set directory permissions to 0700"
            );
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("gather=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_path = config_path()?;
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let db_path = config.resolve_database_path(&config_path);
    if let Some(parent) = db_path.parent() {
        ensure_private_dir(parent)?;
    }
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;

    let db = match Database::open(db_path_str).await {
        Ok(db) => db,
        Err(DatabaseError::InstanceLocked) => {
            eprintln!(
                "Error: the database at {} is locked by another gather process. Stop it and try again.",
                db_path.display()
            );
            std::process::exit(1);
        }
        Err(e) => return Err(anyhow::anyhow!("Failed to open database: {}", e)),
    };

    let mut session = Session::new(config, config_path, db);
    let mut stdout = std::io::stdout().lock();
    if let Err(e) = commands::run(&mut session, args.command, &mut stdout).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
    Ok(())
}

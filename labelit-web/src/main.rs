//! labelit-web - Multilingual image labeling service
//!
//! Single binary serving the HTTP API: user accounts, image uploads with
//! EXIF-aware compression, labels in fourteen languages, cached platform
//! statistics, and data exports, all backed by one SQLite database.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use labelit_common::db::init_database;
use labelit_common::Config;
use labelit_web::{build_router, build_state};

#[derive(Debug, Parser)]
#[command(name = "labelit-web", version, about = "Multilingual image labeling service")]
struct Cli {
    /// Data directory (database and image store)
    #[arg(long)]
    data_dir: Option<String>,

    /// HTTP listen port
    #[arg(long)]
    port: Option<u16>,

    /// Explicit config file path (skips the search path)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Starting labelit-web v{}", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();
    let config = Config::load(cli.data_dir.as_deref(), cli.port, cli.config.as_deref())?;
    config.ensure_data_dirs()?;
    info!("Data directory: {}", config.data_dir.display());

    let pool = init_database(&config.database_path()).await?;
    info!("✓ Database ready at {}", config.database_path().display());

    let state = build_state(&config, pool)?;
    let app = build_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("labelit-web listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

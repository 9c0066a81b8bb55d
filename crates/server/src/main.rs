//! Chartvault server binary.

use anyhow::{Context, Result};
use chartvault_core::config::AppConfig;
use chartvault_server::bootstrap::ensure_admin_token;
use chartvault_server::{AppState, create_router};
use chartvault_storage::TempStore;
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Chartvault - A Helm chart repository server
#[derive(Parser, Debug)]
#[command(name = "chartvaultd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "CHARTVAULT_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,
}

/// Load configuration from the optional TOML file overlaid with `CHARTVAULT_` env vars.
fn load_config(path: &str) -> Result<AppConfig> {
    let mut figment = Figment::new();
    if std::path::Path::new(path).exists() {
        tracing::info!(config_path = %path, "Loading configuration from file");
        figment = figment.merge(Toml::file(path));
    } else {
        tracing::info!(config_path = %path, "No config file found, using defaults and environment");
    }

    figment
        .merge(Env::prefixed("CHARTVAULT_").split("__"))
        .extract()
        .context("failed to load configuration")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Chartvault v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args.config)?;

    chartvault_server::metrics::register_metrics();
    tracing::info!("Prometheus metrics registered");

    let storage = chartvault_storage::from_config(&config.storage)
        .await
        .context("failed to initialize storage")?;
    storage
        .health_check()
        .await
        .context("storage health check failed")?;
    tracing::info!(backend = storage.backend_name(), "Storage backend initialized");

    let metadata = chartvault_metadata::from_config(&config.metadata)
        .await
        .context("failed to initialize metadata store")?;
    tracing::info!("Metadata store initialized");

    let admin_token_id = ensure_admin_token(metadata.as_ref(), &config.admin).await?;
    tracing::info!(token_id = %admin_token_id, "Admin token ready");

    let temp_dir = config
        .server
        .temp_dir
        .clone()
        .unwrap_or_else(default_temp_dir);
    let temp_store = TempStore::new(&temp_dir, config.server.max_upload_size)
        .await
        .with_context(|| format!("failed to create temp directory {}", temp_dir.display()))?;
    tracing::info!(
        temp_dir = %temp_dir.display(),
        max_upload_size = ?config.server.max_upload_size,
        "Upload intake ready"
    );

    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;
    let state = AppState::new(config, storage, metadata, temp_store);
    let app = create_router(state);

    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn default_temp_dir() -> PathBuf {
    std::env::temp_dir().join("chartvault")
}

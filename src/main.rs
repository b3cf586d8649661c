use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use dataup::blobstore::{BlobStore, FsBlobStore, MemBlobStore};
use dataup::config::{DataupConfig, StorageBackend};
use dataup::server;
use dataup::VideoRegistry;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

const CONFIG_ENV: &str = "DATAUP_CONFIG";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args_os()
        .nth(1)
        .or_else(|| std::env::var_os(CONFIG_ENV))
        .map(PathBuf::from);
    let config = match &config_path {
        Some(path) => DataupConfig::load_from_file(path)?,
        None => DataupConfig::default(),
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.to_env_filter()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match &config_path {
        Some(path) => tracing::info!(path = %path.display(), "loaded config"),
        None => tracing::info!("no config file given, using defaults"),
    }

    let listener = TcpListener::bind(config.network.server_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.network.server_addr))?;

    match config.storage.backend {
        StorageBackend::Memory => run(listener, MemBlobStore::new(), &config).await,
        StorageBackend::Filesystem => {
            let blobstore = FsBlobStore::open(&config.storage.path)
                .await
                .with_context(|| {
                    format!(
                        "failed to open blob directory `{}`",
                        config.storage.path.display()
                    )
                })?;
            run(listener, blobstore, &config).await
        }
    }
}

async fn run<B: BlobStore>(
    listener: TcpListener,
    blobstore: B,
    config: &DataupConfig,
) -> anyhow::Result<()> {
    tracing::info!(backend = ?config.storage.backend, "starting video registry");
    let registry = Arc::new(VideoRegistry::new(blobstore));

    server::serve(
        listener,
        registry,
        config.network.request_body_limit,
        shutdown_signal(),
    )
    .await?;

    tracing::info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

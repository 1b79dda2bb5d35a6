//! tus-upload
//!
//! Uploads one file to a tus server, resuming an earlier attempt when the
//! resume store still knows it. Ctrl+C aborts and keeps the upload
//! resumable.
//!
//! Usage: `tus-upload <file>` with `TUS_ENDPOINT` set (see `.env`).

use anyhow::Context;
use tokio::signal;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tus_client::{AbortHandle, Client, ClientSettings, TusError, Upload};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "tus_client=info,tus_upload=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();

    let path = std::env::args()
        .nth(1)
        .context("usage: tus-upload <file>")?;

    let settings = ClientSettings::from_env().context("TUS_ENDPOINT must be set")?;
    let config = settings.build_config().await?;
    let store = config.store.clone();

    tracing::info!("tus-upload v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Endpoint: {}", settings.endpoint);
    tracing::info!("Chunk size: {} bytes", config.chunk_size);

    let client = Client::new(&settings.endpoint, config)?;
    let upload = Upload::from_file(&path)
        .await
        .with_context(|| format!("failed to open '{}'", path))?;

    let mut uploader = client.create_upload(upload).await?;

    let (progress_tx, mut progress_rx) = mpsc::channel(16);
    uploader.subscribe(progress_tx);
    let progress_logger = tokio::spawn(async move {
        while let Some(progress) = progress_rx.recv().await {
            tracing::info!(
                offset = progress.offset,
                size = progress.size,
                "Uploaded {}%",
                progress.progress()
            );
        }
    });

    tokio::spawn(abort_on_signal(uploader.abort_handle()));

    let result = uploader.upload().await;
    let url = uploader.url().clone();
    let offset = uploader.offset();

    // Dropping the uploader closes the progress channel once the last
    // event is delivered
    drop(uploader);
    if let Err(e) = progress_logger.await {
        tracing::warn!("Progress logger failed: {}", e);
    }

    if let Some(store) = store {
        if let Err(e) = store.close().await {
            tracing::warn!("Failed to close resume store: {}", e);
        }
    }

    match result {
        Ok(()) => {
            tracing::info!("Upload of '{}' complete: {}", path, url);
            Ok(())
        }
        Err(TusError::Aborted) => {
            tracing::warn!(
                "Upload of '{}' aborted at {} bytes; run again to resume",
                path,
                offset
            );
            Ok(())
        }
        Err(e) => Err(e).with_context(|| format!("upload of '{}' failed", path)),
    }
}

/// Abort the upload on Ctrl+C or SIGTERM
async fn abort_on_signal(handle: AbortHandle) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, aborting upload...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, aborting upload...");
        },
    }

    handle.abort();
}

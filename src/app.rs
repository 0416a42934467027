//! Composition root: wires the runtime, capture, backend and HTTP surface
//! together and owns their teardown.

use crate::audio::CpalCaptureOpener;
use crate::config::Config;
use crate::error::Result;
use crate::runtime::{LifecycleController, Runtime};
use crate::stt::TcpBackend;
use crate::web::{HtmlAssets, WebContext};
use std::sync::Arc;
use tracing::{error, info};

/// Runs the daemon until SIGINT/SIGTERM or a fatal pipeline error.
pub async fn run(config: Config, enable_on_start: bool) -> Result<()> {
    let runtime = Arc::new(Runtime::new(&config));

    let backend = Arc::new(TcpBackend::new(
        config.stt.backend_addr.clone(),
        config.stt.language.clone(),
        config.audio.sample_rate,
    ));
    let controller = LifecycleController::new(
        Arc::clone(&runtime),
        Arc::new(CpalCaptureOpener),
        backend,
    );

    let assets = match config.server.assets_dir {
        Some(ref dir) => HtmlAssets::load(dir)?,
        None => HtmlAssets::empty(),
    };
    if !assets.is_empty() {
        info!(pages = assets.len(), "html assets loaded");
    }

    let ctx = Arc::new(WebContext { controller, assets });

    if enable_on_start {
        let enable_ctx = Arc::clone(&ctx);
        tokio::task::spawn_blocking(move || enable_ctx.controller.enable());
    }

    let addr = format!("0.0.0.0:{}", config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "http server listening");

    let shutdown_runtime = Arc::clone(&runtime);
    let shutdown = async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("received interrupt, shutting down");
            }
            _ = wait_for_sigterm() => {
                info!("received SIGTERM, shutting down");
            }
            _ = tokio::task::spawn_blocking(move || shutdown_runtime.wait_until_stopped()) => {
                error!("pipeline stopped, shutting down");
            }
        }
    };

    let serve_ctx = Arc::clone(&ctx);
    crate::web::serve(listener, serve_ctx, shutdown).await?;

    // Teardown order: stop the pipeline first so no thread publishes into
    // a dying runtime, then release the waiters.
    let disable_ctx = Arc::clone(&ctx);
    let _ = tokio::task::spawn_blocking(move || disable_ctx.controller.disable()).await;
    runtime.shutdown();
    info!("stopped");

    Ok(())
}

#[cfg(unix)]
async fn wait_for_sigterm() {
    use tokio::signal::unix::{SignalKind, signal};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            error!(error = %e, "failed to register SIGTERM handler");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_sigterm() {
    // On non-Unix, just wait forever (Ctrl+C will still work)
    std::future::pending::<()>().await
}

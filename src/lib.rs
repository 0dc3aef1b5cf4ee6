//! # ytdl-relay
//!
//! HTTP server that relays yt-dlp download progress to any number of clients
//! over Server-Sent Events.
//!
//! ## Design Philosophy
//!
//! - **One download per media id** - Concurrent requests for the same media
//!   share a single yt-dlp invocation and observe the same progress stream
//! - **Non-blocking fan-out** - A slow client misses lines, it never stalls
//!   the download or other clients
//! - **Fire and forget** - Downloads run to completion whether or not anyone
//!   is still watching; finished artifacts are served from disk and swept
//!   after a retention window
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use ytdl_relay::{Config, JobRegistry, YtDlp, api::AppState};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Arc::new(Config::default());
//!     let registry = JobRegistry::new();
//!     let source = Arc::new(YtDlp::from_config(&config.download)?);
//!
//!     let state = AppState::new(registry, source, config);
//!     ytdl_relay::api::start_api_server(state, ytdl_relay::wait_for_signal()).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// HTTP API module
pub mod api;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Per-download job state and progress fan-out
pub mod job;
/// In-memory registry of live jobs
pub mod registry;
/// Disk retention sweeping
pub mod retention;
/// Progress sources (yt-dlp subprocess)
pub mod source;

// Re-export commonly used types
pub use config::{Config, DownloadConfig, RetentionConfig, ServerConfig};
pub use error::{ApiError, Error, ErrorDetail, Result, ToHttpStatus};
pub use job::{Job, JobSnapshot, Subscription};
pub use registry::JobRegistry;
pub use retention::RetentionSweeper;
pub use source::{ProgressSource, YtDlp};

/// Wait for a termination signal.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal
///   registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// Pass the returned future to [`api::start_api_server`] as the graceful
/// shutdown trigger.
#[cfg(unix)]
pub async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

/// Wait for a termination signal (Ctrl+C).
#[cfg(not(unix))]
pub async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}

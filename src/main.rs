//! ytdl-relay server binary

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use ytdl_relay::api::AppState;
use ytdl_relay::{
    Config, DownloadConfig, JobRegistry, ProgressSource, RetentionConfig, ServerConfig, YtDlp,
};

#[derive(Parser, Debug)]
#[command(
    name = "ytdl-relay",
    version,
    about = "Relay yt-dlp download progress to any number of clients over SSE"
)]
struct Cli {
    /// Port the HTTP server listens on
    #[arg(long = "http-port", default_value_t = 5000)]
    http_port: u16,

    /// Directory downloads are written to
    #[arg(long = "out-dir", default_value = "/tmp/yt-dlp")]
    out_dir: PathBuf,

    /// Number of media fragments yt-dlp fetches concurrently
    #[arg(long = "download-threads", default_value_t = 2)]
    download_threads: u32,

    /// Age in seconds after which finished downloads are deleted
    #[arg(long = "max-age-secs", default_value_t = 4 * 60 * 60)]
    max_age_secs: u64,

    /// Seconds between retention sweeps
    #[arg(long = "sweep-interval-secs", default_value_t = 10 * 60)]
    sweep_interval_secs: u64,

    /// Explicit path to the yt-dlp binary (searched on PATH when omitted)
    #[arg(long = "ytdlp-path")]
    ytdlp_path: Option<PathBuf>,
}

impl Cli {
    fn into_config(self) -> Config {
        Config {
            server: ServerConfig {
                bind_address: SocketAddr::from(([0, 0, 0, 0], self.http_port)),
            },
            download: DownloadConfig {
                output_dir: self.out_dir,
                concurrent_fragments: self.download_threads,
                ytdlp_path: self.ytdlp_path,
            },
            retention: RetentionConfig {
                max_age_secs: self.max_age_secs,
                sweep_interval_secs: self.sweep_interval_secs,
                ..RetentionConfig::default()
            },
        }
    }
}

#[tokio::main]
async fn main() -> ytdl_relay::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Cli::parse().into_config();
    config.validate()?;
    tokio::fs::create_dir_all(&config.download.output_dir).await?;

    let config = Arc::new(config);
    let registry = JobRegistry::new();
    let source: Arc<dyn ProgressSource> = Arc::new(YtDlp::from_config(&config.download)?);
    let state = AppState::new(registry, source, Arc::clone(&config));

    let shutdown = CancellationToken::new();
    let sweeper = tokio::spawn(state.sweeper.clone().run(
        config.retention.startup_delay(),
        config.retention.sweep_interval(),
        shutdown.clone(),
    ));

    let result = ytdl_relay::api::start_api_server(state, ytdl_relay::wait_for_signal()).await;

    shutdown.cancel();
    let _ = sweeper.await;

    result
}

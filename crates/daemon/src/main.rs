//! `sessiond` entry point: parses configuration, initializes logging,
//! builds `AppState`, and serves the hook-ingest/log-server port and the
//! snapshot-stream port concurrently alongside the log tailer and the
//! periodic stale check.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use sessiond_core::config::{get_daemon_state_dir, get_log_root_dir, DaemonConfig};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod app;
mod audit;
mod backoff;
mod boundaries;
mod error;
mod git_probe;
mod ingest;
mod publisher;
mod registry;
mod session;
mod stale_check;
mod stream;
mod summarizer;
mod tailer;
mod timers;
mod transition_session;

use crate::app::AppState;
use crate::error::DaemonError;

#[derive(Debug, Parser)]
#[command(
    name = "sessiond",
    about = "Local daemon that derives and publishes real-time status of concurrent agentic-coding sessions"
)]
struct Cli {
    #[arg(long)]
    hook_port: Option<u16>,
    #[arg(long)]
    stream_port: Option<u16>,
    #[arg(long)]
    debounce_ms: Option<u64>,
    #[arg(long)]
    permission_delay_ms: Option<u64>,
    #[arg(long)]
    stale_check_interval_ms: Option<u64>,
    #[arg(long)]
    stale_threshold_ms: Option<u64>,
    #[arg(long)]
    idle_display_threshold_ms: Option<u64>,
    /// Directory tree of per-session transcript log files to tail.
    #[arg(long)]
    log_dir: Option<PathBuf>,
    /// Directory the daemon keeps its own state in (audit logs, caches).
    #[arg(long)]
    state_dir: Option<PathBuf>,
}

impl Cli {
    fn into_config(self) -> DaemonConfig {
        let defaults = DaemonConfig::default();
        DaemonConfig {
            hook_port: self.hook_port.unwrap_or(defaults.hook_port),
            stream_port: self.stream_port.unwrap_or(defaults.stream_port),
            debounce_ms: self.debounce_ms.unwrap_or(defaults.debounce_ms),
            permission_delay_ms: self.permission_delay_ms.unwrap_or(defaults.permission_delay_ms),
            stale_check_interval_ms: self
                .stale_check_interval_ms
                .unwrap_or(defaults.stale_check_interval_ms),
            stale_threshold_ms: self.stale_threshold_ms.unwrap_or(defaults.stale_threshold_ms),
            idle_display_threshold_ms: self
                .idle_display_threshold_ms
                .unwrap_or(defaults.idle_display_threshold_ms),
        }
    }
}

fn main() -> Result<(), DaemonError> {
    let cli = Cli::parse();

    let state_dir = match cli.state_dir.clone() {
        Some(dir) => dir,
        None => get_daemon_state_dir().map_err(|_| DaemonError::NoHomeDir)?,
    };
    fs_err::create_dir_all(&state_dir)
        .map_err(|err| DaemonError::StateDirCreate(state_dir.clone(), err))?;

    let _logging_guard = init_logging(&state_dir);

    // Blocks this thread briefly (at most `BACKOFF_MAX_SECS`) before any
    // listener is bound, so a crash-looping daemon doesn't hammer the
    // filesystem or hold a port other processes are waiting to retry.
    backoff::apply_startup_backoff(&state_dir.join("backoff.json"));

    let log_root = match cli.log_dir.clone() {
        Some(dir) => dir,
        None => get_log_root_dir().map_err(|_| DaemonError::NoHomeDir)?,
    };
    let config = cli.into_config();

    info!(?config, state_dir = %state_dir.display(), log_root = %log_root.display(), "Starting sessiond");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to build tokio runtime");

    runtime.block_on(run(config, state_dir, log_root))
}

async fn run(config: DaemonConfig, state_dir: PathBuf, log_root: PathBuf) -> Result<(), DaemonError> {
    let app = Arc::new(AppState::new(config, state_dir));

    fs_err::create_dir_all(&log_root).map_err(|err| DaemonError::StateDirCreate(log_root.clone(), err))?;
    tailer::bootstrap(&app, &log_root).await;
    let _watcher = tailer::spawn(app.clone(), log_root.clone())
        .map_err(|err| DaemonError::WatchSetup(log_root, err))?;

    stale_check::spawn(app.clone());

    let hook_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), config.hook_port);
    let stream_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), config.stream_port);

    let hook_listener = tokio::net::TcpListener::bind(hook_addr)
        .await
        .map_err(|err| DaemonError::HookBind(config.hook_port, err))?;
    let stream_listener = tokio::net::TcpListener::bind(stream_addr)
        .await
        .map_err(|err| DaemonError::StreamBind(config.stream_port, err))?;

    info!(%hook_addr, %stream_addr, "Listening");

    let hook_server = axum::serve(hook_listener, ingest::router(app.clone()));
    let stream_server = axum::serve(stream_listener, stream::router(app.clone()));

    tokio::select! {
        result = hook_server => {
            if let Err(err) = result {
                error!(error = %err, "Hook server exited");
            }
        }
        result = stream_server => {
            if let Err(err) = result {
                error!(error = %err, "Stream server exited");
            }
        }
        _ = signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    Ok(())
}

fn init_logging(state_dir: &std::path::Path) -> tracing_appender::non_blocking::WorkerGuard {
    let file_appender = tracing_appender::rolling::daily(state_dir.join("logs"), "sessiond.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking)
        .init();

    guard
}

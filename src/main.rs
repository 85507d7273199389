#![forbid(unsafe_code)]

//! `afd-webui`: backend of the AFD live web dashboard.
//!
//! Loads configuration, serves the `/ctrl` and `/log` WebSocket endpoints
//! and keeps the live status publisher and heartbeat running until a
//! shutdown signal arrives.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use afd_webui::afd_config::AfdConfig;
use afd_webui::engine::{FsaViewSource, ToolRunner};
use afd_webui::files::write_atomic;
use afd_webui::session::{self, AppState};
use afd_webui::{AppError, GlobalConfig, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "afd-webui", about = "AFD live web dashboard server", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// AFD work directory; overrides `afd_work_dir` from the config file.
    #[arg(long, short = 'w', global = true)]
    work_dir: Option<PathBuf>,

    /// Listener port; overrides `http_port`.
    #[arg(long, short = 'p', global = true)]
    port: Option<u16>,

    /// Log at debug level.
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Clone, Copy, Subcommand)]
enum Command {
    /// Run the server in the foreground (default).
    Start,
    /// Signal a running server to shut down.
    Stop,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format, args.verbose)?;

    let config = load_config(&args)?;
    match args.command.unwrap_or(Command::Start) {
        Command::Stop => stop_server(&config.pid_file_path()),
        Command::Start => tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
            .block_on(run(config)),
    }
}

fn load_config(args: &Cli) -> Result<GlobalConfig> {
    let mut config = match (&args.config, &args.work_dir) {
        (Some(path), _) => GlobalConfig::load_from_path(path)?,
        (None, Some(work_dir)) => GlobalConfig::for_work_dir(work_dir.clone())?,
        (None, None) => {
            let work_dir = std::env::var_os("AFD_WORK_DIR").ok_or_else(|| {
                AppError::Config("no --config, --work-dir or AFD_WORK_DIR given".into())
            })?;
            GlobalConfig::for_work_dir(PathBuf::from(work_dir))?
        }
    };

    if args.config.is_some() {
        if let Some(work_dir) = &args.work_dir {
            config.override_work_dir(work_dir.clone())?;
        }
    }
    if let Some(port) = args.port {
        config.http_port = port;
    }
    Ok(config)
}

async fn run(config: GlobalConfig) -> Result<()> {
    let afd = AfdConfig::load(&config.afd_work_dir)?;
    info!(work_dir = %config.afd_work_dir.display(), "configuration loaded");

    let pid_file = config.pid_file_path();
    write_atomic(&pid_file, format!("{}\n", std::process::id()).as_bytes())?;

    let ct = CancellationToken::new();
    let source = Arc::new(FsaViewSource::new(ToolRunner::from_config(&config)));
    let state = Arc::new(AppState::new(config, afd, source, ct.clone()));

    let serve_ct = ct.clone();
    let serve_state = Arc::clone(&state);
    let server = tokio::spawn(async move { session::serve(serve_state, serve_ct).await });

    tokio::select! {
        () = shutdown_signal() => info!("shutdown signal received"),
        () = ct.cancelled() => {}
    }
    ct.cancel();

    let outcome = match server.await {
        Ok(result) => result,
        Err(err) => Err(AppError::Io(format!("server task failed: {err}"))),
    };
    if let Err(err) = &outcome {
        error!(%err, "server stopped with error");
    }

    if let Err(err) = std::fs::remove_file(&pid_file) {
        warn!(path = %pid_file.display(), %err, "failed to remove pid file");
    }
    info!("afd-webui shut down");
    outcome
}

#[cfg(unix)]
fn stop_server(pid_file: &Path) -> Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let raw = std::fs::read_to_string(pid_file)
        .map_err(|err| AppError::Config(format!("cannot read {}: {err}", pid_file.display())))?;
    let pid: i32 = raw
        .trim()
        .parse()
        .map_err(|err| AppError::Config(format!("invalid pid in {}: {err}", pid_file.display())))?;
    kill(Pid::from_raw(pid), Signal::SIGTERM)
        .map_err(|err| AppError::Io(format!("failed to signal process {pid}: {err}")))?;
    info!(pid, "sent SIGTERM");
    Ok(())
}

#[cfg(not(unix))]
fn stop_server(_pid_file: &Path) -> Result<()> {
    Err(AppError::Config("stop is only supported on unix".into()))
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat, verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}

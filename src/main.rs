use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use signcam::config::{AppConfig, ConfigStore};
use signcam::events::EventBus;
use signcam::recognition::HttpRecognizer;
use signcam::session::CaptureSessionManager;
use signcam::state::AppState;
use signcam::video::V4l2Camera;
use signcam::web;

/// Log level for the application
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Verbose,
    Debug,
    Trace,
}

/// signcam command line arguments
#[derive(Parser, Debug)]
#[command(name = "signcam")]
#[command(version, about = "Live camera sign recognition", long_about = None)]
struct CliArgs {
    /// Listen address (overrides database config)
    #[arg(short = 'a', long, value_name = "ADDRESS")]
    address: Option<String>,

    /// HTTP port (overrides database config)
    #[arg(short = 'p', long, value_name = "PORT")]
    http_port: Option<u16>,

    /// Data directory path (default: /var/lib/signcam)
    #[arg(short = 'd', long, value_name = "DIR", env = "SIGNCAM_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Camera device, e.g. /dev/video0 (overrides database config)
    #[arg(long, value_name = "DEVICE")]
    device: Option<String>,

    /// Recognition service endpoint (overrides database config)
    #[arg(short = 'e', long, value_name = "URL")]
    endpoint: Option<String>,

    /// Do not start the capture session at startup
    #[arg(long)]
    no_auto_start: bool,

    /// Log level (error, warn, info, verbose, debug, trace)
    #[arg(short = 'l', long, value_name = "LEVEL", default_value = "info")]
    log_level: LogLevel,

    /// Increase verbosity (-v for verbose, -vv for debug, -vvv for trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    init_logging(args.log_level, args.verbose);

    tracing::info!("Starting signcam v{}", env!("CARGO_PKG_VERSION"));

    let data_dir = args
        .data_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("/var/lib/signcam"));
    tracing::info!("Data directory: {}", data_dir.display());
    tokio::fs::create_dir_all(&data_dir).await?;

    let config_store = ConfigStore::new(&data_dir.join("signcam.db")).await?;
    let mut config = (*config_store.get()).clone();
    if apply_cli_overrides(&mut config, &args) {
        config_store.set(config.clone()).await?;
    }

    let bind_addr: SocketAddr =
        format!("{}:{}", config.web.bind_address, config.web.http_port).parse()?;

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let events = Arc::new(EventBus::new());

    let recognizer = Arc::new(HttpRecognizer::new(config.recognition.settings())?);
    tracing::info!("Recognition endpoint: {}", recognizer.endpoint());

    let session = CaptureSessionManager::new(
        Arc::new(V4l2Camera::new()),
        recognizer,
        config.session_config(),
        events.clone(),
    );

    let state = AppState::new(
        config_store,
        session.clone(),
        events,
        shutdown_tx.clone(),
    );

    if config.session.auto_start {
        // A missing camera is not fatal; the session can be started later
        if let Err(e) = session.start().await {
            tracing::warn!("Capture session not started: {}", e);
        }
    }

    let app = web::create_router(state.clone());
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("Server listening on http://{}", listener.local_addr()?);

    let shutdown_signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    cleanup(&state).await;
    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Apply command line overrides. Returns true when the config changed.
fn apply_cli_overrides(config: &mut AppConfig, args: &CliArgs) -> bool {
    let before = config.clone();

    if let Some(addr) = &args.address {
        config.web.bind_address = addr.clone();
    }
    if let Some(port) = args.http_port {
        config.web.http_port = port;
    }
    if let Some(device) = &args.device {
        config.camera.device = Some(device.clone());
    }
    if let Some(endpoint) = &args.endpoint {
        config.recognition.endpoint = endpoint.clone();
    }
    if args.no_auto_start {
        config.session.auto_start = false;
    }

    *config != before
}

/// Initialize logging with tracing
fn init_logging(level: LogLevel, verbose_count: u8) {
    // Verbose count overrides log level
    let effective_level = match verbose_count {
        0 => level,
        1 => LogLevel::Verbose,
        2 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };

    let filter = match effective_level {
        LogLevel::Error => "signcam=error,tower_http=error",
        LogLevel::Warn => "signcam=warn,tower_http=warn",
        LogLevel::Info => "signcam=info,tower_http=info",
        LogLevel::Verbose => "signcam=debug,tower_http=info",
        LogLevel::Debug => "signcam=debug,tower_http=debug",
        LogLevel::Trace => "signcam=trace,tower_http=debug",
    };

    // RUST_LOG wins over the CLI
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    if let Err(err) = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
    {
        eprintln!("failed to initialize tracing: {}", err);
    }
}

/// Release the camera before exit
async fn cleanup(state: &Arc<AppState>) {
    if let Err(e) = state.session.stop().await {
        tracing::warn!("Failed to stop capture session: {}", e);
    } else {
        tracing::info!("Capture session stopped");
    }
}

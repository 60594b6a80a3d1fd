// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Bridge: dynamic reverse-proxy gateway
//
//  Management API, health, stats, metrics and the proxy catch-all
//  share one axum listener on a multi-threaded tokio runtime.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use bridge_admin::server::{AppState, build_router};
use bridge_core::config::GatewayConfig;
use bridge_store::persist::StateFile;
use bridge_store::{MemoryRequestLog, MemoryRouteTable, RequestLog, RequestLogFile, RouteTable};
use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "bridge", version, about = "Bridge: dynamic reverse-proxy gateway")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "bridge.yaml")]
    config: PathBuf,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,

    /// Listen address, overrides `server.listen_addr`
    #[arg(long)]
    listen: Option<String>,

    /// Print the effective configuration as YAML and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // ── Tracing ──
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    match cli.log_format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init(),
    }

    // ── Config ──
    // A missing file is not an error: defaults plus BRIDGE_* env overrides.
    if cli.config.exists() {
        info!(path = %cli.config.display(), "Loading config file");
    } else {
        info!(path = %cli.config.display(), "No config file found, using defaults");
    }
    let mut config = GatewayConfig::load(&cli.config)?;
    if let Some(listen) = cli.listen {
        config.server.listen_addr = listen;
    }

    if cli.print_config {
        print!("{}", config.to_yaml()?);
        return Ok(());
    }

    info!(version = env!("CARGO_PKG_VERSION"), "Bridge starting");

    #[cfg(unix)]
    raise_fd_limit();

    // ── Route table ──
    let table: Arc<dyn RouteTable> = match config.store.state_file {
        Some(ref path) => {
            info!(path = %path.display(), "Route table persisted to file");
            Arc::new(MemoryRouteTable::with_state_file(StateFile::new(path))?)
        }
        None => {
            info!("Route table kept in memory only");
            Arc::new(MemoryRouteTable::new())
        }
    };
    if config.store.seed_defaults {
        bridge_store::seed::seed_if_empty(table.as_ref())?;
    }
    info!(services = table.len(), "Route table ready");

    // ── Request log ──
    let mut log = MemoryRequestLog::new(config.accounting.max_records);
    if let Some(ref path) = config.accounting.log_file {
        match RequestLogFile::open(path) {
            Ok(file) => log = log.with_file(file),
            Err(e) => warn!(path = %path.display(), error = %e, "Request log file unavailable, keeping records in memory only"),
        }
    }
    let log: Arc<dyn RequestLog> = Arc::new(log);

    // ── HTTP surface ──
    let addr: SocketAddr = config.server.listen_addr.parse()?;
    let upstream_timeout = config.proxy.upstream_timeout_secs;
    let state = AppState::new(table, log, config)?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, upstream_timeout_secs = upstream_timeout, "Bridge is ready, serving traffic");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Bridge stopped");
    Ok(())
}

/// Resolves on SIGINT (Ctrl+C) or SIGTERM (docker stop).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received, draining in-flight requests");
}

/// Raise RLIMIT_NOFILE to min(hard_limit, 65536). Every in-flight proxied
/// request holds an inbound and an upstream socket.
#[cfg(unix)]
fn raise_fd_limit() {
    // SAFETY: getrlimit/setrlimit only read and write the local struct.
    unsafe {
        let mut rl = libc::rlimit { rlim_cur: 0, rlim_max: 0 };
        if libc::getrlimit(libc::RLIMIT_NOFILE, &mut rl) != 0 {
            warn!("getrlimit(RLIMIT_NOFILE) failed, fd limit unchanged");
            return;
        }
        let hard = rl.rlim_max;
        let target: libc::rlim_t = if hard == libc::RLIM_INFINITY || hard > 65536 {
            65536
        } else {
            hard
        };
        if rl.rlim_cur >= target {
            tracing::debug!(limit = rl.rlim_cur, "fd limit already sufficient");
            return;
        }
        rl.rlim_cur = target;
        if libc::setrlimit(libc::RLIMIT_NOFILE, &rl) != 0 {
            warn!(tried = target, "setrlimit(RLIMIT_NOFILE) failed");
        } else {
            info!(limit = target, "File descriptor limit raised");
        }
    }
}

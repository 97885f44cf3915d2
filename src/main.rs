use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use clap::{Parser, Subcommand};
use http::Request;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

use relay_accel::admin::handlers::RelayStatus;
use relay_accel::admin::serve_status;
use relay_accel::config::loader::load_config;
use relay_accel::config::watcher::ConfigWatcher;
use relay_accel::config::AccelConfig;
use relay_accel::health::CycleOutcome;
use relay_accel::http::response::ensure_success;
use relay_accel::lifecycle::signals::shutdown_on_signal;
use relay_accel::observability::logging::init_logging;
use relay_accel::observability::metrics::init_metrics;
use relay_accel::routing::TrackedRepository;
use relay_accel::{Accelerator, Shutdown};

const DRAIN_DEADLINE: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "relay-accel")]
#[command(about = "Relay-accelerated HTTP fetching for a geo-blocked upstream", long_about = None)]
struct Cli {
    /// TOML configuration file; defaults apply when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Probe the relays, then GET one URL through the accelerator
    Fetch {
        url: String,
        /// Treat the URL as a tracked plugin listing
        #[arg(long)]
        track: bool,
    },
    /// Run one probe cycle and print the latency table
    Probe,
    /// Run the probe ticker and the status endpoint until interrupted
    Serve,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => AccelConfig::default(),
    };
    init_logging(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "relay-accel starting");

    let shutdown = Shutdown::new();
    let accel = Arc::new(Accelerator::with_system_transport(config, shutdown.clone())?);

    match cli.command {
        Commands::Fetch { url, track } => fetch(&accel, &url, track).await?,
        Commands::Probe => probe(&accel).await?,
        Commands::Serve => serve(accel, cli.config.as_deref()).await?,
    }
    Ok(())
}

async fn fetch(accel: &Accelerator, url: &str, track: bool) -> Result<(), Box<dyn std::error::Error>> {
    accel.probe().check_all(true).await;
    if track {
        accel.registry().merge([TrackedRepository::new(url, false)]);
    }

    let request = Request::get(url).body(Body::empty())?;
    let response = accel.send(request, &accel.shutdown().child()).await?;
    let status = response.status();
    eprintln!("{:?} {}", response.version(), status);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    let mut stdout = tokio::io::stdout();
    stdout.write_all(&body).await?;
    stdout.flush().await?;
    ensure_success(status)?;
    Ok(())
}

async fn probe(accel: &Accelerator) -> Result<(), Box<dyn std::error::Error>> {
    match accel.probe().check_all(true).await {
        CycleOutcome::Completed { verified, total } => {
            tracing::info!(verified, total, "Probe cycle finished");
        }
        other => tracing::warn!(outcome = ?other, "Probe cycle did not run"),
    }

    let rows: Vec<RelayStatus> = accel
        .table()
        .snapshot()
        .into_iter()
        .map(|(prefix, latency_ms)| RelayStatus { prefix, latency_ms })
        .collect();
    println!("{}", serde_json::to_string_pretty(&rows)?);
    Ok(())
}

async fn serve(accel: Arc<Accelerator>, config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let observability = accel.config().observability.clone();
    if observability.metrics_enabled {
        let addr: SocketAddr = observability.metrics_address.parse()?;
        init_metrics(addr)?;
    }

    let shutdown = accel.shutdown().clone();
    let mut tasks = vec![accel.spawn_probe()];

    let status_addr: SocketAddr = observability.status_address.parse()?;
    let state = accel.status_state();
    let token = shutdown.child();
    tasks.push(tokio::spawn(async move {
        if let Err(e) = serve_status(status_addr, state, token).await {
            tracing::error!(error = %e, "Status endpoint failed");
        }
    }));

    // The notify watcher stops when dropped, so it lives until shutdown.
    let _watcher = match config_path {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            let watcher = watcher.run()?;
            tasks.push(tokio::spawn(apply_reloads(Arc::clone(&accel), updates)));
            Some(watcher)
        }
        None => None,
    };

    shutdown_on_signal(shutdown.clone()).await;
    shutdown.drain(tasks, DRAIN_DEADLINE).await;
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn apply_reloads(accel: Arc<Accelerator>, mut updates: mpsc::UnboundedReceiver<AccelConfig>) {
    let shutdown = accel.shutdown().clone();
    loop {
        tokio::select! {
            _ = shutdown.triggered() => break,
            update = updates.recv() => match update {
                Some(config) => accel.apply_reload(&config),
                None => break,
            },
        }
    }
}

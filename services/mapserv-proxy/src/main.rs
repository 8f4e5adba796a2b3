//! Mapserv proxy service.
//!
//! HTTP server forwarding WMS/WFS requests to a CGI map renderer.

use anyhow::{Context, Result};
use clap::Parser;
use mapserv_proxy::{build_router, AppState, ProxyConfig};
use std::{env, net::SocketAddr, path::PathBuf, sync::Arc};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "mapserv-proxy")]
#[command(about = "HTTP front-end for a CGI map renderer")]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, env = "MAPSERV_PROXY_CONFIG", default_value = "./config/mapserv-proxy.yaml")]
    config: PathBuf,

    /// Listen address (overrides the config file)
    #[arg(short, long, env = "MAPSERV_PROXY_LISTEN")]
    listen: Option<String>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Number of tokio worker threads (default: number of CPU cores)
    #[arg(long)]
    worker_threads: Option<usize>,
}

fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
    runtime_builder.enable_all();

    if let Some(threads) = args.worker_threads {
        runtime_builder.worker_threads(threads);
    } else if let Some(threads) = env::var("TOKIO_WORKER_THREADS")
        .ok()
        .and_then(|t| t.parse::<usize>().ok())
    {
        runtime_builder.worker_threads(threads);
    }

    let runtime = runtime_builder.build()?;
    runtime.block_on(async_main(args))
}

async fn async_main(args: Args) -> Result<()> {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let prometheus_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;

    let mut config = ProxyConfig::load(&args.config)?;
    if let Some(listen) = args.listen {
        config.listen = listen;
    }

    info!(
        maps = ?config.map_names(),
        mapserv = %config.mapserv.display(),
        "Starting mapserv proxy"
    );

    let addr: SocketAddr = config
        .listen
        .parse()
        .with_context(|| format!("Invalid listen address {}", config.listen))?;

    let state = Arc::new(AppState::with_cgi(config));
    let app = build_router(state, Some(prometheus_handle));

    info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

//! Atmos ingester service.
//!
//! Serves ingestion triggers for NEXRAD Level II radar and GOES ABI imagery
//! and publishes COG artifacts plus frame indices to object storage.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use ingester::{start_server, ServerState};
use ingestion::{Ingester, IngestionConfig};

#[derive(Parser, Debug)]
#[command(name = "ingester")]
#[command(about = "NEXRAD and GOES ingestion service")]
struct Args {
    /// HTTP port
    #[arg(long, env = "INGESTER_PORT", default_value_t = 8000)]
    port: u16,

    /// Log level (overridden by RUST_LOG)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_level.to_lowercase()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let metrics = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;
    info!("Prometheus metrics exporter initialized");

    let config = IngestionConfig::from_env()?;
    info!(
        derived_bucket = %config.derived.bucket,
        nexrad_bucket = %config.radar.bucket,
        goes_bucket = %config.satellite.bucket,
        mrms_bucket = %config.composite.bucket,
        default_site = %config.radar.default_site,
        max_workers = config.max_workers,
        "Loaded configuration"
    );

    let ingester = Ingester::new(config)?;
    let state = Arc::new(ServerState { ingester, metrics });

    start_server(state, args.port).await
}

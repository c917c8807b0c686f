//! Gateway service entry point

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use common::logging::LogConfig;
use gatewaysrv::api::create_api_routes;
use gatewaysrv::core::config::app::normalize_address;
use gatewaysrv::core::config::{AppConfig, DataPointConfig};
use gatewaysrv::service::DataPointStore;

const SERVICE_NAME: &str = "gatewaysrv";

/// Command-line arguments
#[derive(Parser, Debug, Clone)]
#[command(
    name = "gatewaysrv",
    version = env!("CARGO_PKG_VERSION"),
    about = "Industrial IoT gateway service",
    long_about = None
)]
struct Args {
    /// Application config file (YAML or JSON)
    #[arg(
        short = 'c',
        long,
        env = "GATEWAY_CONFIG",
        default_value = "config/gateway.yaml"
    )]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short = 'l', long)]
    log_level: Option<String>,

    /// Bind address for the API server
    #[arg(short = 'b', long)]
    bind_address: Option<String>,

    /// Validation mode - only validate configuration without starting service
    #[arg(long)]
    validate: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = AppConfig::load(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;
    if let Some(address) = &args.bind_address {
        config.server.address = normalize_address(address);
    }

    let level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.log_level().to_string());
    common::logging::init_with_config(LogConfig {
        service_name: SERVICE_NAME.to_string(),
        log_dir: config.log.path.clone(),
        level,
        enable_json: false,
        enable_file: !args.validate,
        ansi: !args.no_color,
    })
    .map_err(|e| anyhow!("Failed to initialize logging: {e}"))?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %args.config.display(),
        "Starting {}", SERVICE_NAME
    );

    let data_points = DataPointConfig::load(&config.data_point_config.path)
        .context("Failed to load data point config")?;
    let store = Arc::new(DataPointStore::from_config(&data_points)?);

    if args.validate {
        print_summary(&config, &data_points, &store)?;
        return Ok(());
    }

    // Bind before sampling so a taken port fails fast
    let listener = tokio::net::TcpListener::bind(&config.server.address)
        .await
        .with_context(|| format!("Failed to bind to {}", config.server.address))?;
    info!("API server listening on http://{}", config.server.address);

    let shutdown_token = CancellationToken::new();
    let samplers = store.start(shutdown_token.clone());

    let app = create_api_routes(Arc::clone(&store));
    let server_token = shutdown_token.clone();
    let mut server_handle = tokio::spawn(async move {
        let shutdown = async move { server_token.cancelled().await };
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
        {
            error!("Server error: {}", e);
        }
    });

    tokio::spawn(common::shutdown::cancel_on_shutdown(shutdown_token.clone()));
    tokio::select! {
        _ = shutdown_token.cancelled() => {},
        _ = &mut server_handle => warn!("API server stopped unexpectedly"),
    }

    store.shutdown();
    for result in futures::future::join_all(samplers).await {
        if let Err(e) = result {
            warn!("Sampler task failed: {}", e);
        }
    }
    if !server_handle.is_finished() {
        let _ = server_handle.await;
    }

    info!("{} stopped", SERVICE_NAME);
    Ok(())
}

/// `--validate` output
fn print_summary(
    app: &AppConfig,
    config: &DataPointConfig,
    store: &DataPointStore,
) -> anyhow::Result<()> {
    println!("Configuration is valid");
    println!("{}", serde_yaml::to_string(app).context("Failed to render config")?);
    println!(
        "  ports: {} configured, {} active",
        config.ports.len(),
        store.points().len()
    );
    for point in store.points() {
        println!(
            "  - {} [{}]: {} devices, {} variables, sample every {}s",
            point.port.port_name,
            point.driver.name(),
            point.devices.len(),
            point.variable_count(),
            point.port.param.sample_interval().as_secs()
        );
    }
    println!("  variables: {}", config.variable_count());
    Ok(())
}

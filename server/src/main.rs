use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::net::TcpListener;

use crate::{config::DeploymentConfig, server::app_start};

pub mod api;
pub mod config;
pub mod deployment;
pub mod server;

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the deployment TOML configuration
    #[arg(short, long)]
    config_path: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();

    let cli = Args::parse();
    let config = DeploymentConfig::from_file_path(&cli.config_path)?;
    let metrics_handle = PrometheusBuilder::new().install_recorder()?;

    let listener =
        TcpListener::bind(format!("{}:{}", config.server.address, config.server.port)).await?;
    app_start(listener, config, metrics_handle).await
}

//! bcstatus-node CLI entry point.

mod cli;

use bcstatus::node::{NodeInterface, TransactionSubmitter};
use bcstatus::{MsgPackDecoder, RpcNodeClient, RpcNodeConfig, StatusFacadeBuilder, StatusServiceBuilder};
use clap::Parser;
use cli::Cli;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    info!("bcstatus-node v{}", env!("CARGO_PKG_VERSION"));

    let config = cli.into_config()?;
    let refresh_interval = config.refresh_interval();

    let rpc = Arc::new(RpcNodeClient::new(
        &RpcNodeConfig {
            daemon_url: config.daemon_url.clone(),
            ..RpcNodeConfig::default()
        },
        Arc::new(MsgPackDecoder),
    )?);
    info!("Using daemon at {}", config.daemon_url);

    // Output scanning needs a crypto backend; without one the facade serves
    // chain and mempool queries only.
    let facade = StatusFacadeBuilder::new(config, Arc::clone(&rpc) as Arc<dyn NodeInterface>)
        .with_submitter(rpc as Arc<dyn TransactionSubmitter>)
        .build()?;

    let mut service = StatusServiceBuilder::new(Arc::new(facade), refresh_interval).build();
    service.run().await?;

    info!("Goodbye!");
    Ok(())
}

//! Multi-chain DEX arbitrage discovery engine — binary entry point.
//!
//! Loads the TOML configuration, starts the coordinator, and logs every
//! discovered opportunity until a shutdown signal arrives.

use anyhow::Result;
use clap::Parser;
use dex_arb_engine::{config, Coordinator};
use std::time::Duration;
use tracing::{error, info, Level};

#[derive(Parser, Debug)]
#[command(name = "dex-arb-engine", about = "Multi-chain DEX arbitrage discovery engine")]
struct Cli {
    /// Path to the TOML root configuration file.
    #[arg(long, env = "DEXARB_CONFIG", default_value = "config.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    info!(config_path = %cli.config, "loading configuration");
    let root_config = config::load_config(&cli.config)?;

    let coordinator = Coordinator::new(root_config)?;
    let mut opportunities = coordinator
        .take_opportunities()
        .await
        .expect("opportunity receiver taken exactly once at startup");

    coordinator.start().await?;
    info!(chains = coordinator.chain_ids().len(), "engine started");

    loop {
        tokio::select! {
            maybe_opp = opportunities.recv() => {
                match maybe_opp {
                    Some(opp) => info!(
                        kind = ?opp.kind,
                        chain_id = ?opp.chain_id,
                        profit_usd_net = opp.profit_usd_net,
                        trade_size_usd = opp.trade_size_usd,
                        "opportunity detected"
                    ),
                    None => {
                        error!("opportunity channel closed unexpectedly");
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    coordinator.shutdown(Duration::from_secs(10)).await;
    Ok(())
}

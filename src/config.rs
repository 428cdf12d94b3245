//! Configuration loading: reads the TOML root configuration described by
//! `types::chain::RootConfig`. The core itself takes no configuration from
//! the process environment; the only environment-sensitive value anywhere
//! in this crate is the config file *path*, resolved by `main.rs`'s CLI
//! parsing.

use crate::types::RootConfig;
use anyhow::{Context, Result};
use std::path::Path;

/// Loads and validates the root configuration from `path`.
///
/// `.env` (if present) is sourced first purely so an operator's shell-level
/// `.env` can set `DEXARB_CONFIG` without exporting it manually; no config
/// value inside the TOML document itself is environment-sourced.
pub fn load_config(path: impl AsRef<Path>) -> Result<RootConfig> {
    dotenv::dotenv().ok();

    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    let config: RootConfig = toml::from_str(&raw)
        .with_context(|| format!("parsing config file {}", path.display()))?;

    for chain in &config.chains {
        chain
            .validate()
            .map_err(|message| anyhow::anyhow!("chain {} ({}) invalid: {message}", chain.chain_id, chain.name))?;
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_toml() -> &'static str {
        r#"
        [[chains]]
        chain_id = 137
        name = "polygon"
        block_time_ms = 2000

        [chains.native_token]
        symbol = "MATIC"
        decimals = 18
        wrapped = "0x0d500B1d8E8eF31E21C99d1Db9A6444d3ADf1270"
        price_usd_fallback = 0.7

        [chains.rpc]
        http = ["https://polygon-rpc.com"]

        [chains.tokens.USDC]
        address = "0x2791Bca1f2de4661ED88A30C99A7a9449Aa84174"
        decimals = 6

        [chains.trading]
        min_profit_pct = 0.3
        max_slippage_pct = 0.5
        gas_price_gwei = 50.0
        estimated_gas_limit = 300000
        min_trade_usd = 100.0
        max_trade_size_usd = 20000.0
        min_liquidity_usd = 5000.0
        "#
    }

    #[test]
    fn loads_and_validates_a_minimal_config() {
        let path = write_temp("config_loads", sample_toml());
        let config = load_config(&path).expect("config should load");
        assert_eq!(config.chains.len(), 1);
        assert_eq!(config.chains[0].chain_id, 137);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn rejects_config_with_invalid_chain() {
        let bad = sample_toml().replace("http = [\"https://polygon-rpc.com\"]", "http = []");
        let path = write_temp("config_rejects", &bad);
        assert!(load_config(&path).is_err());
        std::fs::remove_file(path).ok();
    }

    fn write_temp(label: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("dexarb-{label}-{:?}.toml", std::thread::current().id()));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }
}

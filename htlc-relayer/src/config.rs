use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Per-chain connection details. The factory address is a deployment
/// artifact and must be supplied by the operator; the defaults below carry a
/// zero factory as a placeholder that `validate` rejects.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainSettings {
    pub chain_id: U256,
    pub rpc_url: String,
    pub factory: Address,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelayerConfig {
    /// Chain key -> settings. The key is the name monitors log under and the
    /// value stored in each swap record's `chain_key`.
    pub chains: HashMap<String, ChainSettings>,
    /// Fixed delay between polling cycles.
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Delay before re-probing an unreachable RPC endpoint at startup.
    #[serde(with = "humantime_serde")]
    pub startup_retry: Duration,
    /// Upper bound on any single RPC call. A timeout counts as a cycle
    /// failure and the block range is retried next cycle.
    #[serde(with = "humantime_serde")]
    pub rpc_timeout: Duration,
    /// Largest block span per log query; wider ranges are chunked so a long
    /// outage cannot produce a query the provider rejects.
    pub max_block_range: u64,
    /// Capacity of the settlement work queue fed by claim intake.
    pub settlement_queue_depth: usize,
    /// Hex-encoded signing key for the relayer account, shared across all
    /// chains.
    pub relayer_private_key: String,
}

impl Default for RelayerConfig {
    fn default() -> Self {
        let mut chains = HashMap::new();
        chains.insert(
            "sepolia".to_string(),
            ChainSettings {
                chain_id: U256::from(11155111u64),
                rpc_url: "https://ethereum-sepolia.therpc.io".to_string(),
                factory: Address::zero(),
            },
        );
        chains.insert(
            "baseSepolia".to_string(),
            ChainSettings {
                chain_id: U256::from(84532u64),
                rpc_url: "https://base-sepolia-rpc.publicnode.com".to_string(),
                factory: Address::zero(),
            },
        );

        RelayerConfig {
            chains,
            poll_interval: Duration::from_secs(10),
            startup_retry: Duration::from_secs(10),
            rpc_timeout: Duration::from_secs(30),
            max_block_range: 2_000,
            settlement_queue_depth: 64,
            relayer_private_key: String::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no chains configured")]
    NoChains,
    #[error("chain `{0}` has a zero factory address")]
    MissingFactory(String),
    #[error("chain `{0}` has an empty rpc url")]
    MissingRpcUrl(String),
    #[error("relayer private key missing or malformed")]
    BadPrivateKey,
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

impl RelayerConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chains.is_empty() {
            return Err(ConfigError::NoChains);
        }
        for (key, settings) in &self.chains {
            if settings.factory.is_zero() {
                return Err(ConfigError::MissingFactory(key.clone()));
            }
            if settings.rpc_url.is_empty() {
                return Err(ConfigError::MissingRpcUrl(key.clone()));
            }
        }
        self.normalized_private_key()?;
        Ok(())
    }

    /// Returns the signing key as `0x`-prefixed 32-byte hex, accepting input
    /// with or without the prefix. Anything else is rejected up front so a
    /// misconfigured key fails at startup rather than at first submission.
    pub fn normalized_private_key(&self) -> Result<String, ConfigError> {
        let trimmed = self.relayer_private_key.trim();
        let hex_part = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        match hex::decode(hex_part) {
            Ok(bytes) if bytes.len() == 32 => Ok(format!("0x{}", hex_part)),
            _ => Err(ConfigError::BadPrivateKey),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_reference_values() {
        let config = RelayerConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(10));
        assert_eq!(config.startup_retry, Duration::from_secs(10));
        assert_eq!(config.chains.len(), 2);
        assert_eq!(
            config.chains["sepolia"].chain_id,
            U256::from(11155111u64)
        );
        assert_eq!(
            config.chains["baseSepolia"].chain_id,
            U256::from(84532u64)
        );
    }

    #[test]
    fn private_key_normalization() {
        let mut config = RelayerConfig::default();

        config.relayer_private_key = format!("0x{}", "ab".repeat(32));
        assert_eq!(
            config.normalized_private_key().unwrap(),
            format!("0x{}", "ab".repeat(32))
        );

        // Accepted without the prefix as well.
        config.relayer_private_key = "cd".repeat(32);
        assert_eq!(
            config.normalized_private_key().unwrap(),
            format!("0x{}", "cd".repeat(32))
        );

        config.relayer_private_key = "0x1234".to_string();
        assert!(config.normalized_private_key().is_err());

        config.relayer_private_key = String::new();
        assert!(config.normalized_private_key().is_err());
    }

    #[test]
    fn validate_rejects_placeholder_factory() {
        let mut config = RelayerConfig::default();
        config.relayer_private_key = format!("0x{}", "ab".repeat(32));
        // Defaults ship a zero factory on purpose.
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingFactory(_))
        ));

        for settings in config.chains.values_mut() {
            settings.factory = Address::from_low_u64_be(0xFAC);
        }
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_json_round_trip() {
        let mut config = RelayerConfig::default();
        config.relayer_private_key = format!("0x{}", "ab".repeat(32));
        let json = serde_json::to_string(&config).unwrap();
        let parsed = RelayerConfig::from_json(&json).unwrap();
        assert_eq!(parsed.poll_interval, config.poll_interval);
        assert_eq!(parsed.chains["sepolia"], config.chains["sepolia"]);
    }
}

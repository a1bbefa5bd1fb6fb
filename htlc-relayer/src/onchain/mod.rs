// Re-export the chain boundary types used throughout the crate
pub use interface::{ChainClient, ChainClientError, TxHash};

pub mod abi;
pub mod evm_client;
pub mod interface;

use crate::config::ChainSettings;
use ethers::types::U256;
use std::collections::HashMap;
use std::sync::Arc;

/// A configured chain with its connected client.
#[derive(Clone)]
pub struct ChainHandle {
    pub key: String,
    pub settings: ChainSettings,
    pub client: Arc<dyn ChainClient>,
}

/// The set of chains the relayer watches. Resolvable both by chain key
/// (swap records store one) and by numeric chain id (execution data carries
/// those).
#[derive(Clone, Default)]
pub struct ChainSet {
    chains: HashMap<String, ChainHandle>,
}

impl ChainSet {
    pub fn new() -> Self {
        ChainSet::default()
    }

    pub fn insert(&mut self, key: String, settings: ChainSettings, client: Arc<dyn ChainClient>) {
        self.chains.insert(
            key.clone(),
            ChainHandle {
                key,
                settings,
                client,
            },
        );
    }

    pub fn by_key(&self, key: &str) -> Option<&ChainHandle> {
        self.chains.get(key)
    }

    pub fn by_chain_id(&self, chain_id: U256) -> Option<&ChainHandle> {
        self.chains
            .values()
            .find(|handle| handle.settings.chain_id == chain_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChainHandle> {
        self.chains.values()
    }

    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }
}

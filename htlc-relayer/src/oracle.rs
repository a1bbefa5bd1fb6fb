use crate::data_structures::{ExecutionData, ValidationError};
use crate::onchain::abi::{self, AbiCodecError};
use crate::onchain::{ChainClientError, ChainSet};
use ethers::types::Address;
use futures::future::try_join;
use log::info;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OracleError {
    /// Malformed execution data; raised before any network call.
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("no configured chain with key `{0}`")]
    UnknownChain(String),
    /// Retryable network failure from the chain client.
    #[error(transparent)]
    Chain(#[from] ChainClientError),
    #[error(transparent)]
    Codec(#[from] AbiCodecError),
}

/// Computes the deterministic escrow addresses for a proposed swap by
/// calling the factory's two view functions. The call encoding is the exact
/// tuple the factory hashes at deployment time, so the prediction matches
/// the address the factory will later deploy to.
pub struct AddressOracle {
    chains: Arc<ChainSet>,
}

impl AddressOracle {
    pub fn new(chains: Arc<ChainSet>) -> Self {
        AddressOracle { chains }
    }

    /// Returns `(src_escrow, dst_escrow)`. Deterministic: identical inputs
    /// produce identical outputs.
    pub async fn predict_addresses(
        &self,
        chain_key: &str,
        factory: Address,
        execution_data: &ExecutionData,
    ) -> Result<(Address, Address), OracleError> {
        execution_data.validate()?;
        let chain = self
            .chains
            .by_key(chain_key)
            .ok_or_else(|| OracleError::UnknownChain(chain_key.to_string()))?;

        // Both derivations are independent reads; issue them together.
        let src_call = chain
            .client
            .call(factory, abi::address_of_escrow_src_call(execution_data));
        let dst_call = chain
            .client
            .call(factory, abi::address_of_escrow_dst_call(execution_data));
        let (src_raw, dst_raw) = try_join(src_call, dst_call).await?;

        let src_escrow = abi::decode_address(&src_raw)?;
        let dst_escrow = abi::decode_address(&dst_raw)?;
        info!(
            "[oracle] predicted escrows for hashlock {:#x}: src={:#x} dst={:#x}",
            execution_data.hashlock, src_escrow, dst_escrow
        );
        Ok((src_escrow, dst_escrow))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChainSettings;
    use crate::test_utils::{sample_execution_data, MockChainClient};
    use ethers::types::H256;

    fn oracle_with_chain() -> (AddressOracle, MockChainClient, Address) {
        let client = MockChainClient::new();
        let factory = Address::from_low_u64_be(0xFAC1);
        let mut chains = ChainSet::new();
        chains.insert(
            "sepolia".to_string(),
            ChainSettings {
                chain_id: 11155111u64.into(),
                rpc_url: "http://localhost:8545".to_string(),
                factory,
            },
            Arc::new(client.clone()),
        );
        (AddressOracle::new(Arc::new(chains)), client, factory)
    }

    #[tokio::test]
    async fn prediction_is_deterministic() {
        let (oracle, client, factory) = oracle_with_chain();
        let src = Address::from_low_u64_be(0x5AAA);
        let dst = Address::from_low_u64_be(0xDAAA);
        client.stage_address_predictions(factory, src, dst);

        let data = sample_execution_data(H256::from_low_u64_be(42), Address::from_low_u64_be(0xA1));
        let first = oracle
            .predict_addresses("sepolia", factory, &data)
            .await
            .unwrap();
        let second = oracle
            .predict_addresses("sepolia", factory, &data)
            .await
            .unwrap();
        assert_eq!(first, (src, dst));
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn malformed_data_fails_before_any_network_call() {
        let (oracle, _client, factory) = oracle_with_chain();
        // Nothing staged on the mock: a network attempt would surface as a
        // Chain error, so getting Invalid proves validation ran first.
        let mut data =
            sample_execution_data(H256::from_low_u64_be(42), Address::from_low_u64_be(0xA1));
        data.hashlock = H256::zero();
        let err = oracle
            .predict_addresses("sepolia", factory, &data)
            .await
            .unwrap_err();
        assert!(matches!(err, OracleError::Invalid(_)));
    }

    #[tokio::test]
    async fn unknown_chain_key_is_rejected() {
        let (oracle, _client, factory) = oracle_with_chain();
        let data = sample_execution_data(H256::from_low_u64_be(42), Address::from_low_u64_be(0xA1));
        let err = oracle
            .predict_addresses("polygon", factory, &data)
            .await
            .unwrap_err();
        assert!(matches!(err, OracleError::UnknownChain(key) if key == "polygon"));
    }
}

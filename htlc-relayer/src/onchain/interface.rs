use async_trait::async_trait;
use ethers::types::{Address, Bytes, Log, H256};
use std::time::Duration;
use thiserror::Error;

/// Transaction hash returned by a submission.
pub type TxHash = H256;

#[derive(Debug, Error)]
pub enum ChainClientError {
    /// Network or provider failure. Retryable: the caller skips the cycle
    /// and tries again on the next interval.
    #[error("rpc request failed: {0}")]
    Rpc(String),
    /// The call did not complete within the configured bound. Treated like
    /// any other cycle failure.
    #[error("rpc request timed out after {0:?}")]
    Timeout(Duration),
    /// The node accepted the request but rejected the transaction (revert,
    /// nonce conflict, underpriced). Not retried automatically.
    #[error("transaction rejected: {0}")]
    TxRejected(String),
}

impl ChainClientError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ChainClientError::Rpc(_) | ChainClientError::Timeout(_)
        )
    }
}

/// The five capabilities the relayer needs from a chain. Implemented by
/// `EvmClient` for live chains and by `MockChainClient` in tests.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Current block height.
    async fn block_number(&self) -> Result<u64, ChainClientError>;

    /// All logs emitted by `address` in `from_block..=to_block`, in the
    /// order the node returns them (ascending block/log index is assumed,
    /// not re-sorted).
    async fn get_logs(
        &self,
        address: Address,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<Log>, ChainClientError>;

    /// Executes a read-only call against `to` and returns the raw ABI
    /// output.
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ChainClientError>;

    /// Deployed bytecode at `address`; empty if nothing is deployed there.
    async fn get_code(&self, address: Address) -> Result<Bytes, ChainClientError>;

    /// Signs and submits a state-changing transaction from the relayer
    /// account, returning its hash without waiting for inclusion.
    async fn send_transaction(&self, to: Address, data: Bytes)
        -> Result<TxHash, ChainClientError>;
}

use crate::config::ChainSettings;
use crate::onchain::interface::{ChainClient, ChainClientError, TxHash};
use async_trait::async_trait;
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, Filter, Log, TransactionRequest, U256};
use log::debug;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum EvmClientError {
    #[error("invalid rpc url for chain `{chain}`: {reason}")]
    InvalidRpcUrl { chain: String, reason: String },
    #[error("invalid relayer private key: {0}")]
    InvalidKey(String),
    #[error("chain id {0} does not fit the signer's 64-bit chain id")]
    ChainIdTooLarge(U256),
}

/// Live `ChainClient` over an HTTP JSON-RPC endpoint, signing with the
/// shared relayer account. Every request is bounded by `rpc_timeout`, and
/// transaction submission is serialized: the account is the same on every
/// chain, so two in-flight submissions to one chain would race the nonce.
pub struct EvmClient {
    chain_key: String,
    inner: SignerMiddleware<Provider<Http>, LocalWallet>,
    rpc_timeout: Duration,
    send_lock: Mutex<()>,
}

impl EvmClient {
    pub fn connect(
        chain_key: &str,
        settings: &ChainSettings,
        private_key: &str,
        rpc_timeout: Duration,
    ) -> Result<Self, EvmClientError> {
        if settings.chain_id > U256::from(u64::MAX) {
            return Err(EvmClientError::ChainIdTooLarge(settings.chain_id));
        }
        let provider = Provider::<Http>::try_from(settings.rpc_url.as_str()).map_err(|e| {
            EvmClientError::InvalidRpcUrl {
                chain: chain_key.to_string(),
                reason: e.to_string(),
            }
        })?;
        let wallet: LocalWallet = private_key
            .parse()
            .map_err(|e: ethers::signers::WalletError| EvmClientError::InvalidKey(e.to_string()))?;
        let wallet = wallet.with_chain_id(settings.chain_id.as_u64());
        Ok(EvmClient {
            chain_key: chain_key.to_string(),
            inner: SignerMiddleware::new(provider, wallet),
            rpc_timeout,
            send_lock: Mutex::new(()),
        })
    }

    pub fn relayer_address(&self) -> Address {
        self.inner.signer().address()
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T, ChainClientError>
    where
        F: std::future::Future<Output = Result<T, ChainClientError>>,
    {
        match tokio::time::timeout(self.rpc_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(ChainClientError::Timeout(self.rpc_timeout)),
        }
    }
}

#[async_trait]
impl ChainClient for EvmClient {
    async fn block_number(&self) -> Result<u64, ChainClientError> {
        self.bounded(async {
            let number = self
                .inner
                .get_block_number()
                .await
                .map_err(|e| ChainClientError::Rpc(e.to_string()))?;
            Ok(number.as_u64())
        })
        .await
    }

    async fn get_logs(
        &self,
        address: Address,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<Log>, ChainClientError> {
        let filter = Filter::new()
            .address(address)
            .from_block(from_block)
            .to_block(to_block);
        self.bounded(async {
            self.inner
                .get_logs(&filter)
                .await
                .map_err(|e| ChainClientError::Rpc(e.to_string()))
        })
        .await
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ChainClientError> {
        let tx: TypedTransaction = TransactionRequest::new().to(to).data(data).into();
        self.bounded(async {
            self.inner
                .call(&tx, None)
                .await
                .map_err(|e| ChainClientError::Rpc(e.to_string()))
        })
        .await
    }

    async fn get_code(&self, address: Address) -> Result<Bytes, ChainClientError> {
        self.bounded(async {
            self.inner
                .get_code(address, None)
                .await
                .map_err(|e| ChainClientError::Rpc(e.to_string()))
        })
        .await
    }

    async fn send_transaction(
        &self,
        to: Address,
        data: Bytes,
    ) -> Result<TxHash, ChainClientError> {
        let tx: TypedTransaction = TransactionRequest::new().to(to).data(data).into();
        // One submission at a time per (account, chain): sequential nonces.
        let _guard = self.send_lock.lock().await;
        let hash = self
            .bounded(async {
                let pending = self
                    .inner
                    .send_transaction(tx, None)
                    .await
                    .map_err(|e| ChainClientError::TxRejected(e.to_string()))?;
                Ok(pending.tx_hash())
            })
            .await?;
        debug!("[{}] submitted transaction {:#x}", self.chain_key, hash);
        Ok(hash)
    }
}

use crate::claims::{ClaimError, ClaimIntake};
use crate::data_structures::{ExecutionData, SwapRecord, SwapStatus};
use crate::onchain::ChainSet;
use crate::oracle::{AddressOracle, OracleError};
use crate::registry::SwapRegistry;
use ethers::types::{Address, H256, U256};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// A swap-creation request from the API layer: the caller picks the chain
/// whose monitor will watch the destination escrow and the factory that
/// will deploy both escrows.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSwapRequest {
    pub chain_key: String,
    pub factory: Address,
    pub execution_data: ExecutionData,
}

/// Deployment status for one swap, including the claimability flag the UI
/// polls for.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapStatusReport {
    pub hashlock: H256,
    pub src_escrow: Address,
    pub dst_escrow: Address,
    pub src_deployed: bool,
    pub dst_deployed: bool,
    pub both_deployed: bool,
    pub can_claim: bool,
}

#[derive(Debug, Error)]
pub enum StatusError {
    #[error("no swap recorded for hashlock {0:#x}")]
    SwapNotFound(H256),
}

/// The capability surface the (excluded) HTTP layer consumes: swap
/// creation, listing, status with a self-healing bytecode fallback, and the
/// direct claim path.
pub struct SwapService {
    registry: Arc<SwapRegistry>,
    chains: Arc<ChainSet>,
    oracle: AddressOracle,
    intake: ClaimIntake,
}

impl SwapService {
    pub fn new(
        registry: Arc<SwapRegistry>,
        chains: Arc<ChainSet>,
        oracle: AddressOracle,
        intake: ClaimIntake,
    ) -> Self {
        SwapService {
            registry,
            chains,
            oracle,
            intake,
        }
    }

    /// Registry passthrough for a pre-assembled record.
    pub fn record_swap(&self, record: SwapRecord) {
        self.registry.upsert(record);
    }

    /// Computes both escrow addresses for the request and stores the
    /// resulting record. Returns `(src_escrow, dst_escrow)`.
    pub async fn create_swap(&self, request: NewSwapRequest) -> Result<(Address, Address), OracleError> {
        let (src_escrow, dst_escrow) = self
            .oracle
            .predict_addresses(&request.chain_key, request.factory, &request.execution_data)
            .await?;
        let record = SwapRecord::new(
            request.chain_key,
            request.factory,
            request.execution_data,
            src_escrow,
            dst_escrow,
        );
        self.registry.upsert(record);
        Ok((src_escrow, dst_escrow))
    }

    /// Address prediction without storing anything.
    pub async fn predict_addresses(
        &self,
        chain_key: &str,
        factory: Address,
        execution_data: &ExecutionData,
    ) -> Result<(Address, Address), OracleError> {
        self.oracle
            .predict_addresses(chain_key, factory, execution_data)
            .await
    }

    pub fn list_swaps(&self, status: Option<SwapStatus>) -> Vec<SwapRecord> {
        self.registry.list(status)
    }

    pub fn get_swap(&self, hashlock: H256) -> Option<SwapRecord> {
        self.registry.get(hashlock)
    }

    /// Deployment status for a swap. When a flag is still unset the escrow's
    /// bytecode is checked directly: non-empty code means deployed even if
    /// the creation event was missed, and the flag is updated so future
    /// calls skip the chain round-trip.
    pub async fn swap_status(&self, hashlock: H256) -> Result<SwapStatusReport, StatusError> {
        let record = self
            .registry
            .get(hashlock)
            .ok_or(StatusError::SwapNotFound(hashlock))?;

        let mut src_deployed = record.src_deployed;
        let mut dst_deployed = record.dst_deployed;

        if !src_deployed
            && self
                .bytecode_present(record.execution_data.src_chain_id, record.src_escrow)
                .await
        {
            info!(
                "[status] source escrow {:#x} found via bytecode check",
                record.src_escrow
            );
            self.registry.mark_src_deployed(hashlock);
            src_deployed = true;
        }
        if !dst_deployed
            && self
                .bytecode_present(record.execution_data.dst_chain_id, record.dst_escrow)
                .await
        {
            info!(
                "[status] destination escrow {:#x} found via bytecode check",
                record.dst_escrow
            );
            // The stored address is the one checked, so keep it as-is.
            self.registry.mark_dst_deployed(hashlock, record.dst_escrow);
            dst_deployed = true;
        }

        let both = src_deployed && dst_deployed;
        Ok(SwapStatusReport {
            hashlock,
            src_escrow: record.src_escrow,
            dst_escrow: record.dst_escrow,
            src_deployed,
            dst_deployed,
            both_deployed: both,
            can_claim: both,
        })
    }

    pub fn submit_claim(
        &self,
        secret: H256,
        hashlock: H256,
        user: Address,
    ) -> Result<(), ClaimError> {
        self.intake.submit_claim(secret, hashlock, user)
    }

    /// Fallback deployment probe. Errors are contained: an unreachable
    /// chain just leaves the flag unset for this call.
    async fn bytecode_present(&self, chain_id: U256, escrow: Address) -> bool {
        let Some(chain) = self.chains.by_chain_id(chain_id) else {
            warn!(
                "[status] no configured chain with id {} for bytecode check",
                chain_id
            );
            return false;
        };
        match chain.client.get_code(escrow).await {
            Ok(code) => !code.is_empty(),
            Err(e) => {
                warn!(
                    "[{}] bytecode check for {:#x} failed: {}",
                    chain.key, escrow, e
                );
                false
            }
        }
    }
}

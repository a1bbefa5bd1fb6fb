use crate::claims::PendingClaims;
use crate::data_structures::CompletionReceipts;
use crate::onchain::abi::{self, AbiCodecError};
use crate::onchain::{ChainClient, ChainClientError, ChainSet, TxHash};
use crate::registry::SwapRegistry;
use ethers::types::{Address, H256, U256};
use log::{error, info, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Which path asked for settlement. Both end up in the same place; the
/// trigger only matters for logging.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SettlementTrigger {
    /// Secret observed on-chain by a monitor.
    RevealEvent,
    /// Secret submitted directly by the asker.
    UserClaim,
}

/// A unit of settlement work on the queue between claim intake and the
/// settlement worker.
#[derive(Clone, Copy, Debug)]
pub struct SettlementJob {
    pub hashlock: H256,
    pub secret: H256,
    pub trigger: SettlementTrigger,
}

#[derive(Debug, Error)]
pub enum SettleError {
    #[error("no swap recorded for hashlock {0:#x}")]
    SwapNotFound(H256),
    #[error("no configured chain with id {0}")]
    UnknownChain(U256),
    #[error("{side} withdrawal failed for hashlock {hashlock:#x} (escrow {escrow:#x}): {reason}")]
    Withdrawal {
        side: &'static str,
        hashlock: H256,
        escrow: Address,
        reason: String,
    },
}

#[derive(Debug, Error)]
enum SideError {
    #[error(transparent)]
    Chain(#[from] ChainClientError),
    #[error(transparent)]
    Codec(#[from] AbiCodecError),
}

/// Drives the two withdrawal transactions once a secret is known. Attempts
/// for one hashlock are serialized through an internal lock table so the
/// event path and the claim path cannot interleave; the escrow contracts'
/// own already-withdrawn checks remain the final safety net.
pub struct WithdrawalOrchestrator {
    registry: Arc<SwapRegistry>,
    chains: Arc<ChainSet>,
    pending: Arc<PendingClaims>,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl WithdrawalOrchestrator {
    pub fn new(
        registry: Arc<SwapRegistry>,
        chains: Arc<ChainSet>,
        pending: Arc<PendingClaims>,
    ) -> Self {
        WithdrawalOrchestrator {
            registry,
            chains,
            pending,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, hashlock: H256) -> Arc<tokio::sync::Mutex<()>> {
        let key = crate::data_structures::hashlock_key(hashlock);
        self.locks.lock().entry(key).or_default().clone()
    }

    /// Settles a swap: re-reads the canonical execution data from each
    /// escrow and submits a withdrawal on each chain. Idempotent under
    /// retry; a partially failed attempt leaves the record pre-withdrawal
    /// and a future trigger retries both sides.
    pub async fn settle(
        &self,
        hashlock: H256,
        secret: H256,
    ) -> Result<CompletionReceipts, SettleError> {
        let guard = self.lock_for(hashlock);
        let _held = guard.lock().await;
        let result = self.settle_serialized(hashlock, secret).await;
        // The pending claim is consumed by this attempt either way; a fresh
        // submission creates a fresh one.
        self.pending.remove(hashlock);
        result
    }

    async fn settle_serialized(
        &self,
        hashlock: H256,
        secret: H256,
    ) -> Result<CompletionReceipts, SettleError> {
        let record = self
            .registry
            .get(hashlock)
            .ok_or(SettleError::SwapNotFound(hashlock))?;
        let dst_chain_id = record.execution_data.dst_chain_id;
        let src_chain_id = record.execution_data.src_chain_id;
        let dst = self
            .chains
            .by_chain_id(dst_chain_id)
            .ok_or(SettleError::UnknownChain(dst_chain_id))?;
        let src = self
            .chains
            .by_chain_id(src_chain_id)
            .ok_or(SettleError::UnknownChain(src_chain_id))?;

        // Destination first: pays the asker. Source second: pays the
        // fulfiller. Each side is attempted even if the other fails; the
        // secret is already public at this point and withholding one leg
        // helps nobody.
        let dst_result = self
            .withdraw_side(dst.client.as_ref(), record.dst_escrow, secret)
            .await;
        if let Err(e) = &dst_result {
            error!(
                "[settle] destination withdrawal failed for {:#x} (escrow {:#x} on {}): {}",
                hashlock, record.dst_escrow, dst.key, e
            );
        }
        let src_result = self
            .withdraw_side(src.client.as_ref(), record.src_escrow, secret)
            .await;
        if let Err(e) = &src_result {
            error!(
                "[settle] source withdrawal failed for {:#x} (escrow {:#x} on {}): {}",
                hashlock, record.src_escrow, src.key, e
            );
        }

        match (dst_result, src_result) {
            (Ok(dst_tx), Ok(src_tx)) => {
                let receipts = CompletionReceipts { src_tx, dst_tx };
                self.registry.mark_completed(hashlock, receipts.clone());
                info!(
                    "[settle] swap {:#x} completed: dst tx {:#x}, src tx {:#x}",
                    hashlock, receipts.dst_tx, receipts.src_tx
                );
                Ok(receipts)
            }
            (Err(e), _) => Err(SettleError::Withdrawal {
                side: "destination",
                hashlock,
                escrow: record.dst_escrow,
                reason: e.to_string(),
            }),
            (_, Err(e)) => Err(SettleError::Withdrawal {
                side: "source",
                hashlock,
                escrow: record.src_escrow,
                reason: e.to_string(),
            }),
        }
    }

    /// One leg: re-read `executionData()` from the escrow (the on-chain
    /// record is authoritative, the stored copy may predate deployment),
    /// then submit `withdraw(secret, data)`.
    async fn withdraw_side(
        &self,
        client: &dyn ChainClient,
        escrow: Address,
        secret: H256,
    ) -> Result<TxHash, SideError> {
        let raw = client.call(escrow, abi::execution_data_call()).await?;
        let onchain_data = abi::decode_execution_data(&raw)?;
        let calldata = abi::withdraw_call(secret, &onchain_data);
        Ok(client.send_transaction(escrow, calldata).await?)
    }
}

/// Consumes the settlement queue. The triggering path returns as soon as a
/// job is enqueued; every outcome is logged here and visible through the
/// status interface, never silently dropped.
pub fn spawn_settlement_worker(
    orchestrator: Arc<WithdrawalOrchestrator>,
    mut jobs: mpsc::Receiver<SettlementJob>,
    mut stop: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
                job = jobs.recv() => {
                    let Some(job) = job else { break };
                    info!(
                        "[settle] processing {:?} settlement for hashlock {:#x}",
                        job.trigger, job.hashlock
                    );
                    match orchestrator.settle(job.hashlock, job.secret).await {
                        Ok(receipts) => info!(
                            "[settle] queue job for {:#x} done (dst {:#x}, src {:#x})",
                            job.hashlock, receipts.dst_tx, receipts.src_tx
                        ),
                        // No automatic retry: the record stays claimable and
                        // a later trigger or resubmission picks it up.
                        Err(e) => warn!("[settle] queue job for {:#x} failed: {}", job.hashlock, e),
                    }
                }
            }
        }
    })
}

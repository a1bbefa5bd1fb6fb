use crate::data_structures::{hashlock_key, PendingClaim};
use crate::orchestrator::{SettlementJob, SettlementTrigger};
use crate::registry::SwapRegistry;
use chrono::Utc;
use ethers::types::{Address, H256};
use ethers::utils::keccak256;
use log::{info, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClaimError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("secret does not match hashlock")]
    SecretMismatch,
    #[error("no swap recorded for hashlock")]
    SwapNotFound,
    #[error("only the asker can claim this swap")]
    Forbidden,
    /// The settlement queue is full or gone; the claim was not accepted and
    /// the caller may retry.
    #[error("settlement queue unavailable")]
    QueueUnavailable,
}

/// Secrets awaiting settlement, keyed like the registry. Owned here; the
/// orchestrator removes an entry once the corresponding withdrawal attempt
/// has run, successful or not.
#[derive(Default)]
pub struct PendingClaims {
    inner: Mutex<HashMap<String, PendingClaim>>,
}

impl PendingClaims {
    pub fn new() -> Self {
        PendingClaims::default()
    }

    pub fn insert(&self, claim: PendingClaim) {
        self.inner.lock().insert(hashlock_key(claim.hashlock), claim);
    }

    pub fn get(&self, hashlock: H256) -> Option<PendingClaim> {
        self.inner.lock().get(&hashlock_key(hashlock)).cloned()
    }

    pub fn remove(&self, hashlock: H256) -> Option<PendingClaim> {
        self.inner.lock().remove(&hashlock_key(hashlock))
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

/// Externally triggered claim path: a user who knows the secret submits it
/// directly instead of waiting for the on-chain reveal event to be observed.
pub struct ClaimIntake {
    registry: Arc<SwapRegistry>,
    pending: Arc<PendingClaims>,
    settlement_tx: mpsc::Sender<SettlementJob>,
}

impl ClaimIntake {
    pub fn new(
        registry: Arc<SwapRegistry>,
        pending: Arc<PendingClaims>,
        settlement_tx: mpsc::Sender<SettlementJob>,
    ) -> Self {
        ClaimIntake {
            registry,
            pending,
            settlement_tx,
        }
    }

    /// Validates and enqueues a claim. Success means the claim was verified
    /// and settlement was *initiated*; whether funds actually moved must be
    /// observed through the status interface.
    pub fn submit_claim(
        &self,
        secret: H256,
        hashlock: H256,
        user: Address,
    ) -> Result<(), ClaimError> {
        if secret.is_zero() {
            return Err(ClaimError::MissingField("secret"));
        }
        if hashlock.is_zero() {
            return Err(ClaimError::MissingField("hashlock"));
        }
        if user.is_zero() {
            return Err(ClaimError::MissingField("userAddress"));
        }

        let computed = H256::from(keccak256(secret.as_bytes()));
        if computed != hashlock {
            warn!("[claims] secret verification failed for {:#x}", user);
            return Err(ClaimError::SecretMismatch);
        }

        let record = self.registry.get(hashlock).ok_or(ClaimError::SwapNotFound)?;
        // Address equality; hex case differences were absorbed at parse time.
        if record.execution_data.asker != user {
            warn!(
                "[claims] claim by {:#x} rejected, swap belongs to {:#x}",
                user, record.execution_data.asker
            );
            return Err(ClaimError::Forbidden);
        }

        self.pending.insert(PendingClaim {
            secret,
            hashlock,
            user,
            submitted_at: Utc::now(),
        });

        let job = SettlementJob {
            hashlock,
            secret,
            trigger: SettlementTrigger::UserClaim,
        };
        if self.settlement_tx.try_send(job).is_err() {
            // Keep the store consistent with what the worker will see.
            self.pending.remove(hashlock);
            return Err(ClaimError::QueueUnavailable);
        }

        info!(
            "[claims] claim for hashlock {:#x} verified, settlement enqueued",
            hashlock
        );
        Ok(())
    }
}

use chrono::{DateTime, Utc};
use ethers::types::{Address, Bytes, H256, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Canonical escrow parameters for one swap. Immutable once the swap is
/// created; the same tuple is re-read from each escrow contract before a
/// withdrawal because the on-chain copy is authoritative (the real fulfiller
/// is only known after the destination escrow is deployed).
///
/// Amounts and chain ids are `U256`: they are token base units and chain ids
/// that can exceed the 53-bit range a float or a JSON number can carry.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionData {
    pub order_hash: H256,
    pub hashlock: H256,
    pub asker: Address,
    /// Zero address means "anyone may fulfill".
    pub fulfiller: Address,
    pub src_token: Address,
    pub dst_token: Address,
    pub src_chain_id: U256,
    pub dst_chain_id: U256,
    pub asker_amount: U256,
    pub fulfiller_amount: U256,
    pub platform_fee: U256,
    pub fee_collector: Address,
    /// Packed withdraw/cancel deadlines, enforced on-chain only.
    pub timelocks: U256,
    pub parameters: Bytes,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("execution data field `{0}` must not be zero")]
    ZeroField(&'static str),
}

impl ExecutionData {
    /// Rejects obviously unusable data before any network call is made.
    /// The fulfiller is deliberately not checked: zero is the wildcard.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.hashlock.is_zero() {
            return Err(ValidationError::ZeroField("hashlock"));
        }
        if self.asker.is_zero() {
            return Err(ValidationError::ZeroField("asker"));
        }
        if self.src_token.is_zero() {
            return Err(ValidationError::ZeroField("srcToken"));
        }
        if self.dst_token.is_zero() {
            return Err(ValidationError::ZeroField("dstToken"));
        }
        if self.src_chain_id.is_zero() {
            return Err(ValidationError::ZeroField("srcChainId"));
        }
        if self.dst_chain_id.is_zero() {
            return Err(ValidationError::ZeroField("dstChainId"));
        }
        Ok(())
    }
}

/// Lifecycle tag for a swap record. Records are never deleted; a swap that
/// never finishes deploying simply stays `Created`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwapStatus {
    Created,
    Completed,
}

/// Transaction hashes of the two withdrawal submissions, one per chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionReceipts {
    pub src_tx: H256,
    pub dst_tx: H256,
}

/// One tracked swap. Uniquely addressed by the lower-cased hashlock in the
/// registry; `chain_key` names the chain whose monitor watches the
/// destination escrow for the secret reveal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapRecord {
    pub chain_key: String,
    pub factory: Address,
    pub execution_data: ExecutionData,
    pub src_escrow: Address,
    /// Predicted at creation, then overwritten with the address the factory
    /// actually emitted in its creation event.
    pub dst_escrow: Address,
    pub src_deployed: bool,
    pub dst_deployed: bool,
    pub status: SwapStatus,
    pub completion: Option<CompletionReceipts>,
}

impl SwapRecord {
    pub fn new(
        chain_key: String,
        factory: Address,
        execution_data: ExecutionData,
        src_escrow: Address,
        dst_escrow: Address,
    ) -> Self {
        SwapRecord {
            chain_key,
            factory,
            execution_data,
            src_escrow,
            dst_escrow,
            src_deployed: false,
            dst_deployed: false,
            status: SwapStatus::Created,
            completion: None,
        }
    }

    pub fn hashlock(&self) -> H256 {
        self.execution_data.hashlock
    }
}

/// A user-submitted secret waiting for the settlement worker. Ephemeral:
/// dropped once the corresponding withdrawal attempt has run, whether it
/// succeeded or not.
#[derive(Clone, Debug)]
pub struct PendingClaim {
    pub secret: H256,
    pub hashlock: H256,
    pub user: Address,
    pub submitted_at: DateTime<Utc>,
}

/// Lower-cased hex registry key for a hashlock. The single choke point for
/// case normalization: every lookup and insert goes through this.
pub fn hashlock_key(hashlock: H256) -> String {
    format!("{:#x}", hashlock)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_execution_data() -> ExecutionData {
        ExecutionData {
            order_hash: H256::from_low_u64_be(1),
            hashlock: H256::from_low_u64_be(2),
            asker: Address::from_low_u64_be(0xA5),
            fulfiller: Address::zero(),
            src_token: Address::from_low_u64_be(0x10),
            dst_token: Address::from_low_u64_be(0x20),
            src_chain_id: U256::from(11155111u64),
            dst_chain_id: U256::from(84532u64),
            asker_amount: U256::from(1_000u64),
            fulfiller_amount: U256::from(2_000u64),
            platform_fee: U256::from(10u64),
            fee_collector: Address::from_low_u64_be(0xFE),
            timelocks: U256::from(0u64),
            parameters: Bytes::new(),
        }
    }

    #[test]
    fn validate_accepts_wildcard_fulfiller() {
        let data = sample_execution_data();
        assert!(data.fulfiller.is_zero());
        assert!(data.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_required_fields() {
        let mut data = sample_execution_data();
        data.hashlock = H256::zero();
        assert_eq!(data.validate(), Err(ValidationError::ZeroField("hashlock")));

        let mut data = sample_execution_data();
        data.asker = Address::zero();
        assert_eq!(data.validate(), Err(ValidationError::ZeroField("asker")));

        let mut data = sample_execution_data();
        data.src_chain_id = U256::zero();
        assert_eq!(data.validate(), Err(ValidationError::ZeroField("srcChainId")));
    }

    #[test]
    fn hashlock_key_is_lowercase_and_stable() {
        let h = H256::from_slice(&[0xAB; 32]);
        let key = hashlock_key(h);
        assert_eq!(key, format!("0x{}", "ab".repeat(32)));
        assert_eq!(key, hashlock_key(h));
    }
}

use crate::data_structures::{hashlock_key, CompletionReceipts, SwapRecord, SwapStatus};
use ethers::types::{Address, H256};
use log::{debug, info};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Single source of truth for swap lifecycle state, keyed by lower-cased
/// hashlock. Constructed once and handed to every component behind an `Arc`;
/// all mutation goes through the methods here so the deployment flags stay
/// monotonic and a completed write is immediately visible to readers.
#[derive(Default)]
pub struct SwapRegistry {
    inner: RwLock<HashMap<String, SwapRecord>>,
}

impl SwapRegistry {
    pub fn new() -> Self {
        SwapRegistry::default()
    }

    /// Insert-or-replace by hashlock. The later write wins wholesale.
    pub fn upsert(&self, record: SwapRecord) {
        let key = hashlock_key(record.hashlock());
        let mut map = self.inner.write();
        let is_new = !map.contains_key(&key);
        map.insert(key.clone(), record);
        info!(
            "[registry] {} swap record for hashlock {} ({} total)",
            if is_new { "added" } else { "replaced" },
            key,
            map.len()
        );
    }

    pub fn get(&self, hashlock: H256) -> Option<SwapRecord> {
        self.inner.read().get(&hashlock_key(hashlock)).cloned()
    }

    /// All records, optionally filtered by status. No ordering guarantee.
    pub fn list(&self, status: Option<SwapStatus>) -> Vec<SwapRecord> {
        self.inner
            .read()
            .values()
            .filter(|record| status.map_or(true, |s| record.status == s))
            .cloned()
            .collect()
    }

    /// Flags the source escrow as deployed. Returns false when no record
    /// matches: an event for a swap this process never created is a no-op.
    pub fn mark_src_deployed(&self, hashlock: H256) -> bool {
        let mut map = self.inner.write();
        match map.get_mut(&hashlock_key(hashlock)) {
            Some(record) => {
                record.src_deployed = true;
                true
            }
            None => false,
        }
    }

    /// Flags the destination escrow as deployed and replaces the predicted
    /// escrow address with the one the factory actually emitted.
    pub fn mark_dst_deployed(&self, hashlock: H256, escrow: Address) -> bool {
        let mut map = self.inner.write();
        match map.get_mut(&hashlock_key(hashlock)) {
            Some(record) => {
                record.dst_deployed = true;
                if record.dst_escrow != escrow {
                    debug!(
                        "[registry] dst escrow for {:#x} corrected {:#x} -> {:#x}",
                        hashlock, record.dst_escrow, escrow
                    );
                    record.dst_escrow = escrow;
                }
                true
            }
            None => false,
        }
    }

    /// Terminal transition: records both withdrawal hashes and marks the
    /// swap completed.
    pub fn mark_completed(&self, hashlock: H256, receipts: CompletionReceipts) -> bool {
        let mut map = self.inner.write();
        match map.get_mut(&hashlock_key(hashlock)) {
            Some(record) => {
                record.status = SwapStatus::Completed;
                record.completion = Some(receipts);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

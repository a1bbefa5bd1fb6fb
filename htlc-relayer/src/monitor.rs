use crate::config::RelayerConfig;
use crate::onchain::abi::{EventSignatures, FactoryEvent};
use crate::onchain::{ChainClientError, ChainHandle};
use crate::orchestrator::WithdrawalOrchestrator;
use crate::registry::SwapRegistry;
use log::{debug, error, info, warn};
use std::cmp::min;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Polls one chain's factory for escrow-creation events and every deployed
/// destination escrow on that chain for the secret reveal. Runs for the
/// process lifetime: an RPC failure skips the cycle and the same block range
/// is retried on the next interval (at-least-once delivery; the registry
/// updates are idempotent).
pub struct ChainEventMonitor {
    chain: ChainHandle,
    registry: Arc<SwapRegistry>,
    orchestrator: Arc<WithdrawalOrchestrator>,
    events: EventSignatures,
    poll_interval: Duration,
    startup_retry: Duration,
    max_block_range: u64,
}

impl ChainEventMonitor {
    pub fn new(
        chain: ChainHandle,
        registry: Arc<SwapRegistry>,
        orchestrator: Arc<WithdrawalOrchestrator>,
        config: &RelayerConfig,
    ) -> Self {
        ChainEventMonitor {
            chain,
            registry,
            orchestrator,
            events: EventSignatures::new(),
            poll_interval: config.poll_interval,
            startup_retry: config.startup_retry,
            max_block_range: config.max_block_range.max(1),
        }
    }

    pub fn spawn(self, stop: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(stop))
    }

    async fn run(self, mut stop: watch::Receiver<bool>) {
        // Starting: probe connectivity until the endpoint answers. The
        // cursor begins at the current head; history is not back-filled.
        let mut last_processed = loop {
            if *stop.borrow() {
                return;
            }
            match self.chain.client.block_number().await {
                Ok(head) => {
                    info!(
                        "[{}] factory event polling starting from block {}",
                        self.chain.key, head
                    );
                    break head;
                }
                Err(e) => {
                    warn!(
                        "[{}] rpc connectivity check failed: {}; retrying in {:?}",
                        self.chain.key, e, self.startup_retry
                    );
                    if wait_or_stop(&mut stop, self.startup_retry).await {
                        return;
                    }
                }
            }
        };

        loop {
            if wait_or_stop(&mut stop, self.poll_interval).await {
                info!("[{}] monitor stopping", self.chain.key);
                return;
            }
            match self.cycle(last_processed).await {
                Ok(cursor) => last_processed = cursor,
                // Cursor untouched: the whole range is retried next cycle.
                Err(e) => warn!(
                    "[{}] polling cycle failed, range will be retried: {}",
                    self.chain.key, e
                ),
            }
        }
    }

    /// One polling cycle. Returns the new cursor on success; a hard failure
    /// (log query or head fetch) leaves the caller's cursor unchanged.
    /// Public so tests and embedders can drive cycles directly.
    pub async fn cycle(&self, last_processed: u64) -> Result<u64, ChainClientError> {
        let current = self.chain.client.block_number().await?;
        if current <= last_processed {
            return Ok(last_processed);
        }

        let mut from = last_processed + 1;
        while from <= current {
            let to = min(from + self.max_block_range - 1, current);
            self.process_range(from, to).await?;
            from = to + 1;
        }
        Ok(current)
    }

    async fn process_range(&self, from: u64, to: u64) -> Result<(), ChainClientError> {
        debug!(
            "[{}] checking blocks {}..={} for factory events",
            self.chain.key, from, to
        );
        let logs = self
            .chain
            .client
            .get_logs(self.chain.settings.factory, from, to)
            .await?;

        // Partition by topic0. Logs from unknown events are skipped; a
        // matching topic with an undecodable payload is logged and skipped.
        let mut src_created = Vec::new();
        let mut dst_created = Vec::new();
        for log in &logs {
            match self.events.decode_factory(log) {
                None => {}
                Some(Err(e)) => {
                    warn!("[{}] skipping undecodable factory log: {}", self.chain.key, e)
                }
                Some(Ok(FactoryEvent::SrcEscrowCreated { execution_data })) => {
                    src_created.push(execution_data)
                }
                Some(Ok(FactoryEvent::DstEscrowCreated {
                    escrow, hashlock, ..
                })) => dst_created.push((escrow, hashlock)),
            }
        }
        if !src_created.is_empty() || !dst_created.is_empty() {
            info!(
                "[{}] {} SrcEscrowCreated and {} DstEscrowCreated event(s) in blocks {}..={}",
                self.chain.key,
                src_created.len(),
                dst_created.len(),
                from,
                to
            );
        }

        for execution_data in src_created {
            let hashlock = execution_data.hashlock;
            if self.registry.mark_src_deployed(hashlock) {
                info!(
                    "[{}] source escrow deployed for hashlock {:#x}",
                    self.chain.key, hashlock
                );
            } else {
                debug!(
                    "[{}] SrcEscrowCreated for unknown hashlock {:#x}, ignoring",
                    self.chain.key, hashlock
                );
            }
        }
        for (escrow, hashlock) in dst_created {
            if self.registry.mark_dst_deployed(hashlock, escrow) {
                info!(
                    "[{}] destination escrow {:#x} deployed for hashlock {:#x}",
                    self.chain.key, escrow, hashlock
                );
            } else {
                debug!(
                    "[{}] DstEscrowCreated for unknown hashlock {:#x}, ignoring",
                    self.chain.key, hashlock
                );
            }
        }

        self.scan_secret_reveals(from, to).await;
        Ok(())
    }

    /// Checks every deployed destination escrow this chain hosts for the
    /// reveal event. Failures here are isolated per escrow and never abort
    /// the cycle.
    async fn scan_secret_reveals(&self, from: u64, to: u64) {
        let candidates = self
            .registry
            .list(None)
            .into_iter()
            .filter(|record| record.dst_deployed && record.chain_key == self.chain.key);

        for record in candidates {
            let escrow_logs = match self.chain.client.get_logs(record.dst_escrow, from, to).await {
                Ok(logs) => logs,
                Err(e) => {
                    warn!(
                        "[{}] could not check escrow {:#x} for reveal events: {}",
                        self.chain.key, record.dst_escrow, e
                    );
                    continue;
                }
            };
            for log in &escrow_logs {
                let reveal = match self.events.decode_secret_revealed(log) {
                    None => continue,
                    Some(Err(e)) => {
                        warn!("[{}] skipping undecodable escrow log: {}", self.chain.key, e);
                        continue;
                    }
                    Some(Ok(reveal)) => reveal,
                };
                info!(
                    "[{}] secret revealed for hashlock {:#x}, settling",
                    self.chain.key, reveal.hashlock
                );
                // The chain is trusted here: no re-check of the secret
                // against the stored hashlock. A bogus reveal fails at the
                // contract and the record stays non-completed.
                if let Err(e) = self
                    .orchestrator
                    .settle(reveal.hashlock, reveal.secret)
                    .await
                {
                    error!(
                        "[{}] settlement for hashlock {:#x} failed: {}",
                        self.chain.key, reveal.hashlock, e
                    );
                }
            }
        }
    }
}

/// Sleeps for `duration` unless the stop signal fires first. Returns true
/// when the monitor should shut down.
async fn wait_or_stop(stop: &mut watch::Receiver<bool>, duration: Duration) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        changed = stop.changed() => changed.is_err() || *stop.borrow(),
    }
}

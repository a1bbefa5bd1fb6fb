use crate::claims::{ClaimIntake, PendingClaims};
use crate::config::{ConfigError, RelayerConfig};
use crate::monitor::ChainEventMonitor;
use crate::onchain::evm_client::{EvmClient, EvmClientError};
use crate::onchain::ChainSet;
use crate::oracle::AddressOracle;
use crate::orchestrator::{spawn_settlement_worker, SettlementJob, WithdrawalOrchestrator};
use crate::registry::SwapRegistry;
use crate::service::SwapService;
use log::info;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

#[derive(Debug, Error)]
pub enum RelayerStartError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Client(#[from] EvmClientError),
}

/// The assembled relayer: one monitor task per chain, one settlement
/// worker, and the service facade the API layer talks to. All components
/// share one explicitly constructed registry handle.
pub struct Relayer {
    service: Arc<SwapService>,
    registry: Arc<SwapRegistry>,
    orchestrator: Arc<WithdrawalOrchestrator>,
    tasks: Vec<JoinHandle<()>>,
    stop: watch::Sender<bool>,
}

impl Relayer {
    /// Connects a live client per configured chain and starts all tasks.
    pub fn start(config: RelayerConfig) -> Result<Self, RelayerStartError> {
        config.validate()?;
        let key = config.normalized_private_key()?;
        let mut chains = ChainSet::new();
        for (chain_key, settings) in &config.chains {
            let client = EvmClient::connect(chain_key, settings, &key, config.rpc_timeout)?;
            info!(
                "[relayer] connected to {} (chain id {}) as {:#x}",
                chain_key,
                settings.chain_id,
                client.relayer_address()
            );
            chains.insert(chain_key.clone(), settings.clone(), Arc::new(client));
        }
        Ok(Self::start_with_chains(config, chains))
    }

    /// Wires the components over an existing chain set. Used directly by
    /// tests that substitute mock clients.
    pub fn start_with_chains(config: RelayerConfig, chains: ChainSet) -> Self {
        let chains = Arc::new(chains);
        let registry = Arc::new(SwapRegistry::new());
        let pending = Arc::new(PendingClaims::new());
        let orchestrator = Arc::new(WithdrawalOrchestrator::new(
            registry.clone(),
            chains.clone(),
            pending.clone(),
        ));

        let (stop_tx, stop_rx) = watch::channel(false);
        let (settlement_tx, settlement_rx) = mpsc::channel::<SettlementJob>(
            config.settlement_queue_depth.max(1),
        );

        let mut tasks = Vec::new();
        tasks.push(spawn_settlement_worker(
            orchestrator.clone(),
            settlement_rx,
            stop_rx.clone(),
        ));
        for chain in chains.iter() {
            let monitor = ChainEventMonitor::new(
                chain.clone(),
                registry.clone(),
                orchestrator.clone(),
                &config,
            );
            tasks.push(monitor.spawn(stop_rx.clone()));
        }
        info!(
            "[relayer] started {} chain monitor(s) and the settlement worker",
            chains.len()
        );

        let intake = ClaimIntake::new(registry.clone(), pending, settlement_tx);
        let oracle = AddressOracle::new(chains.clone());
        let service = Arc::new(SwapService::new(
            registry.clone(),
            chains,
            oracle,
            intake,
        ));

        Relayer {
            service,
            registry,
            orchestrator,
            tasks,
            stop: stop_tx,
        }
    }

    pub fn service(&self) -> Arc<SwapService> {
        self.service.clone()
    }

    pub fn registry(&self) -> Arc<SwapRegistry> {
        self.registry.clone()
    }

    pub fn orchestrator(&self) -> Arc<WithdrawalOrchestrator> {
        self.orchestrator.clone()
    }

    /// Graceful shutdown: signal every task and wait for in-flight cycles
    /// to finish.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        for task in self.tasks {
            let _ = task.await;
        }
        info!("[relayer] shut down");
    }
}

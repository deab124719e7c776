//! # Node Runtime
//!
//! Owns every subsystem of a running node and the tasks that drive them.
//!
//! Construction is synchronous and side-effect free apart from logging;
//! nothing runs until [`NodeRuntime::start`]. Subscriptions are taken before
//! the clock task is spawned so no handler misses the first slot.

use crate::adapters::{InsecureDevSigner, LoggedDeposits, LoggingGossipNetwork, TrackedExternalData};
use crate::api::{BeaconNodeApi, ChainHead};
use crate::clock::SlotClock;
use crate::config::NodeConfig;
use crate::genesis::{dev_pubkey, GenesisBuilder, GenesisError};
use crate::wiring::{
    run_handler, ChainEventLog, DepositChainSync, DutyTiming, EventHandler, SubnetExpiry,
};
use qc_04_state_transition::StateTransitionEngine;
use qc_05_attestation_subnets::SubnetSubscriptionTracker;
use qc_15_deposit_chain::{
    DepositLog, ExternalDataTracker, InMemoryDepositChain, ThrottlingDepositChainProvider,
};
use qc_17_block_production::{BlockAssembler, InMemoryAttestationPool, InMemorySlashingPool};
use qc_18_validator_duties::{DutyOrchestrator, DutyReport};
use shared_bus::{EventPublisher, InMemoryEventBus};
use shared_types::ConfigError;
use std::sync::Arc;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Deposit-chain endpoint as seen by the tracker.
pub type DepositChainClient = ThrottlingDepositChainProvider<InMemoryDepositChain>;

/// Duty orchestrator driving the local validators.
pub type NodeOrchestrator = DutyOrchestrator<BeaconNodeApi, InsecureDevSigner>;

/// Node startup errors.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Genesis failed: {0}")]
    Genesis(#[from] GenesisError),
}

pub struct NodeRuntime {
    runtime: Handle,
    clock: SlotClock,
    api: Arc<BeaconNodeApi>,
    bus: Arc<InMemoryEventBus>,
    orchestrator: Arc<NodeOrchestrator>,
    reports: Option<mpsc::UnboundedReceiver<DutyReport>>,
    attestations: Arc<InMemoryAttestationPool>,
    subnets: Arc<SubnetSubscriptionTracker<LoggingGossipNetwork>>,
    network: Arc<LoggingGossipNetwork>,
    deposit_log: Arc<DepositLog>,
    deposit_chain: Arc<InMemoryDepositChain>,
    tracker: Arc<ExternalDataTracker<DepositChainClient>>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl NodeRuntime {
    /// Build every subsystem from `config`.
    ///
    /// Background work is spawned on `runtime`, which must outlive the node.
    pub fn new(config: NodeConfig, runtime: Handle) -> Result<Self, NodeError> {
        config.validate()?;
        let constants = config.constants.clone();
        info!(
            validators = config.validator_count,
            seconds_per_slot = config.seconds_per_slot,
            slots_per_epoch = constants.slots_per_epoch,
            "Building node"
        );

        let engine = Arc::new(StateTransitionEngine::new(constants.clone())?);
        let deposit_log = Arc::new(DepositLog::new());
        let genesis = GenesisBuilder::new(config.genesis_time, config.validator_count, constants.clone())
            .build(&deposit_log)?;

        // The development chain starts far enough back that a block at the
        // follow distance exists from the first slot.
        let follow = config.deposit_chain.follow_distance;
        let chain_start = config
            .genesis_time
            .saturating_sub(follow.saturating_mul(config.deposit_chain_seconds_per_block));
        let deposit_chain = Arc::new(InMemoryDepositChain::new(
            config.deposit_chain.deposit_contract,
            Arc::clone(&deposit_log),
            chain_start,
            config.deposit_chain_seconds_per_block,
        ));
        deposit_chain.mine_blocks(follow);
        let client = Arc::new(ThrottlingDepositChainProvider::new(
            Arc::clone(&deposit_chain),
            config.deposit_chain.max_concurrent_requests,
        ));
        let tracker = Arc::new(ExternalDataTracker::new(client, config.deposit_chain.clone()));

        let attestations = Arc::new(InMemoryAttestationPool::new(constants.clone()));
        let slashings = Arc::new(InMemorySlashingPool::new());
        let network = Arc::new(LoggingGossipNetwork::new());
        let subnets = Arc::new(SubnetSubscriptionTracker::new(
            Arc::clone(&network),
            constants.attestation_subnet_count,
        ));

        let assembler = BlockAssembler::new(
            Arc::clone(&engine),
            attestations.clone(),
            Arc::new(LoggedDeposits::new(Arc::clone(&deposit_log), constants.max_deposits)),
            Arc::new(TrackedExternalData::new(Arc::clone(&tracker))),
            slashings.clone(),
            config.block_production.clone(),
        );
        let bus = Arc::new(InMemoryEventBus::with_capacity(config.bus_capacity));
        let api = Arc::new(BeaconNodeApi::new(
            engine,
            assembler,
            Arc::clone(&attestations),
            slashings,
            subnets.clone(),
            bus.clone(),
            ChainHead {
                state: genesis.state,
                block: genesis.block,
            },
        ));

        let keys = (0..config.validator_count as u64).map(dev_pubkey).collect();
        let signer = Arc::new(InsecureDevSigner::new(keys, constants.slots_per_epoch));
        let (orchestrator, reports) = DutyOrchestrator::new(
            Arc::clone(&api),
            signer,
            &constants,
            config.duties.clone(),
            runtime.clone(),
        )?;

        let (shutdown, _) = watch::channel(false);
        Ok(Self {
            runtime,
            clock: SlotClock::new(
                config.genesis_time,
                config.seconds_per_slot,
                constants.slots_per_epoch,
            ),
            api,
            bus,
            orchestrator: Arc::new(orchestrator),
            reports: Some(reports),
            attestations,
            subnets,
            network,
            deposit_log,
            deposit_chain,
            tracker,
            shutdown,
            tasks: Vec::new(),
        })
    }

    /// Spawn the event handlers, the duty report logger and the slot clock.
    ///
    /// `now` is the current Unix time. Calling `start` twice has no effect.
    pub fn start(&mut self, now: u64) {
        if !self.tasks.is_empty() {
            warn!("Node already started");
            return;
        }

        self.spawn_handler(DutyTiming::new(Arc::clone(&self.orchestrator)));
        self.spawn_handler(SubnetExpiry::new(
            self.subnets.clone(),
            Arc::clone(&self.attestations),
        ));
        self.spawn_handler(DepositChainSync::new(
            Arc::clone(&self.tracker),
            Some(Arc::clone(&self.deposit_chain)),
        ));
        self.spawn_handler(ChainEventLog);

        if let Some(reports) = self.reports.take() {
            let shutdown = self.shutdown.subscribe();
            self.tasks
                .push(self.runtime.spawn(log_reports(reports, shutdown)));
        }

        let clock = self.clock;
        let bus = Arc::clone(&self.bus);
        let shutdown = self.shutdown.subscribe();
        self.tasks.push(
            self.runtime
                .spawn(async move { clock.run(bus.as_ref(), now, shutdown).await }),
        );
        info!(tasks = self.tasks.len(), "Node started");
    }

    fn spawn_handler<H: EventHandler + 'static>(&mut self, handler: H) {
        let subscription = self.bus.subscribe(handler.filter());
        let shutdown = self.shutdown.subscribe();
        debug!(handler = handler.name(), "Spawning event handler");
        self.tasks.push(
            self.runtime
                .spawn(async move { run_handler(&handler, subscription, shutdown).await }),
        );
    }

    /// Signal every task to stop and wait for them.
    ///
    /// Duty executions already in flight are not awaited.
    pub async fn shutdown(self) {
        info!("Shutting down node");
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                error!(error = %e, "Node task failed");
            }
        }
        info!(events = self.bus.events_published(), "Node stopped");
    }

    pub fn api(&self) -> &Arc<BeaconNodeApi> {
        &self.api
    }

    pub fn bus(&self) -> &Arc<InMemoryEventBus> {
        &self.bus
    }

    pub fn orchestrator(&self) -> &Arc<NodeOrchestrator> {
        &self.orchestrator
    }

    pub fn network(&self) -> &Arc<LoggingGossipNetwork> {
        &self.network
    }

    pub fn deposit_log(&self) -> &Arc<DepositLog> {
        &self.deposit_log
    }

    pub fn deposit_chain(&self) -> &Arc<InMemoryDepositChain> {
        &self.deposit_chain
    }

    pub fn clock(&self) -> SlotClock {
        self.clock
    }

    /// Duty report stream, for callers that want it instead of the logger.
    ///
    /// Once taken, [`start`](Self::start) no longer logs reports.
    pub fn take_reports(&mut self) -> Option<mpsc::UnboundedReceiver<DutyReport>> {
        self.reports.take()
    }
}

async fn log_reports(
    mut reports: mpsc::UnboundedReceiver<DutyReport>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            report = reports.recv() => match report {
                Some(DutyReport { slot, validator_index, kind, outcome: Ok(()) }) => {
                    debug!(slot, validator = validator_index, kind = kind.as_str(), "Duty performed");
                }
                Some(DutyReport { slot, validator_index, kind, outcome: Err(e) }) => {
                    warn!(slot, validator = validator_index, kind = kind.as_str(), error = %e, "Duty failed");
                }
                None => return,
            },
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return;
                }
            }
        }
    }
}

impl std::fmt::Debug for NodeRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRuntime")
            .field("clock", &self.clock)
            .field("tasks", &self.tasks.len())
            .finish_non_exhaustive()
    }
}

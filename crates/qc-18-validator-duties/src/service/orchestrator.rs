//! Epoch state machine and slot dispatch.

use super::executor::{DutyExecutor, DutyReport};
use super::fork::ForkProvider;
use super::loader::{RetryingDutyLoader, ValidatorApiDutyLoader};
use crate::config::DutyOrchestratorConfig;
use crate::domain::ScheduledDutySet;
use crate::error::DutyLoadError;
use crate::ports::{DutySigner, ValidatorApi, ValidatorTimingApi};
use parking_lot::Mutex;
use shared_types::{ConfigError, Epoch, ProtocolConstants, Slot};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Load state of one epoch's duties. Epochs without an entry are unloaded.
enum EpochDuties {
    /// Load in progress; slots that started meanwhile wait here with their
    /// start times.
    Loading { pending_slots: Vec<(Slot, Instant)> },
    Loaded(Arc<ScheduledDutySet>),
}

/// Observable load state of an epoch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EpochStatus {
    Unloaded,
    Loading,
    Loaded,
}

#[derive(Default)]
struct Schedule {
    current_epoch: Option<Epoch>,
    epochs: BTreeMap<Epoch, EpochDuties>,
}

struct Inner<A: ValidatorApi, S: DutySigner> {
    slots_per_epoch: u64,
    lookahead_epochs: u64,
    runtime: Handle,
    forks: Arc<ForkProvider<A>>,
    loader: RetryingDutyLoader<ValidatorApiDutyLoader<A, S>>,
    executor: Arc<DutyExecutor<A, S>>,
    schedule: Mutex<Schedule>,
}

/// Drives duty loading and dispatch from slot and epoch signals.
///
/// Per epoch: `Unloaded -> Loading -> Loaded`. An epoch signal starts loads
/// for the epoch and its lookahead; a slot signal dispatches the duties of a
/// loaded epoch, or queues the slot while the epoch is still loading. Loads
/// retry in the background, so a failing load never delays dispatch for an
/// epoch that is already loaded.
pub struct DutyOrchestrator<A: ValidatorApi, S: DutySigner> {
    inner: Arc<Inner<A, S>>,
}

impl<A: ValidatorApi, S: DutySigner> Clone for DutyOrchestrator<A, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A, S> DutyOrchestrator<A, S>
where
    A: ValidatorApi + 'static,
    S: DutySigner + 'static,
{
    /// Create an orchestrator running its work on `runtime`.
    ///
    /// Returns the receiver of per-duty reports alongside it.
    pub fn new(
        api: Arc<A>,
        signer: Arc<S>,
        constants: &ProtocolConstants,
        config: DutyOrchestratorConfig,
        runtime: Handle,
    ) -> Result<(Self, mpsc::UnboundedReceiver<DutyReport>), ConfigError> {
        config.validate()?;
        constants.validate()?;

        let (reports_tx, reports_rx) = mpsc::unbounded_channel();
        let forks = Arc::new(ForkProvider::new(
            Arc::clone(&api),
            constants.slots_per_epoch,
        ));
        let loader = ValidatorApiDutyLoader::new(
            Arc::clone(&api),
            Arc::clone(&signer),
            Arc::clone(&forks),
            constants.slots_per_epoch,
            constants.target_aggregators_per_committee,
        );
        let executor = DutyExecutor::new(
            api,
            signer,
            Arc::clone(&forks),
            constants.slots_per_epoch,
            config.attestation_delay(),
            config.aggregation_delay(),
            reports_tx,
        );

        let inner = Inner {
            slots_per_epoch: constants.slots_per_epoch,
            lookahead_epochs: config.lookahead_epochs,
            runtime,
            forks,
            loader: RetryingDutyLoader::new(
                Arc::new(loader),
                config.max_concurrent_loads,
                config.retry.clone(),
            ),
            executor: Arc::new(executor),
            schedule: Mutex::new(Schedule::default()),
        };
        Ok((
            Self {
                inner: Arc::new(inner),
            },
            reports_rx,
        ))
    }

    pub fn epoch_status(&self, epoch: Epoch) -> EpochStatus {
        match self.inner.schedule.lock().epochs.get(&epoch) {
            None => EpochStatus::Unloaded,
            Some(EpochDuties::Loading { .. }) => EpochStatus::Loading,
            Some(EpochDuties::Loaded(_)) => EpochStatus::Loaded,
        }
    }

    /// Loaded duties of `epoch`, if any.
    pub fn duties(&self, epoch: Epoch) -> Option<Arc<ScheduledDutySet>> {
        match self.inner.schedule.lock().epochs.get(&epoch) {
            Some(EpochDuties::Loaded(set)) => Some(Arc::clone(set)),
            _ => None,
        }
    }

    pub fn current_epoch(&self) -> Option<Epoch> {
        self.inner.schedule.lock().current_epoch
    }
}

impl<A, S> Inner<A, S>
where
    A: ValidatorApi + 'static,
    S: DutySigner + 'static,
{
    /// Epochs whose duties are kept: the previous, the current and the
    /// lookahead.
    fn in_window(current: Option<Epoch>, lookahead: u64, epoch: Epoch) -> bool {
        match current {
            None => true,
            Some(current) => {
                current.saturating_sub(1) <= epoch && epoch <= current.saturating_add(lookahead)
            }
        }
    }

    fn is_wanted(&self, epoch: Epoch) -> bool {
        let current = self.schedule.lock().current_epoch;
        Self::in_window(current, self.lookahead_epochs, epoch)
    }

    fn advance_to(self: &Arc<Self>, epoch: Epoch) {
        let mut to_load = Vec::new();
        {
            let mut schedule = self.schedule.lock();
            if schedule.current_epoch.is_some_and(|current| epoch < current) {
                debug!(epoch, "[qc-18] Ignoring stale epoch signal");
                return;
            }
            schedule.current_epoch = Some(epoch);

            let oldest = epoch.saturating_sub(1);
            schedule.epochs = schedule.epochs.split_off(&oldest);

            for target in epoch..=epoch.saturating_add(self.lookahead_epochs) {
                if !schedule.epochs.contains_key(&target) {
                    schedule.epochs.insert(
                        target,
                        EpochDuties::Loading {
                            pending_slots: Vec::new(),
                        },
                    );
                    to_load.push(target);
                }
            }
        }
        self.forks.prune(epoch.saturating_sub(1));

        for target in to_load {
            self.spawn_load(target);
        }
    }

    fn spawn_load(self: &Arc<Self>, epoch: Epoch) {
        info!(epoch, "[qc-18] Loading duties");
        let inner = Arc::clone(self);
        self.runtime.spawn(async move {
            let wanted = Arc::clone(&inner);
            let result = inner
                .loader
                .load(epoch, move |e| wanted.is_wanted(e))
                .await;
            inner.finish_load(epoch, result);
        });
    }

    fn finish_load(&self, epoch: Epoch, result: Result<ScheduledDutySet, DutyLoadError>) {
        let mut schedule = self.schedule.lock();
        let pending = match schedule.epochs.get(&epoch) {
            Some(EpochDuties::Loading { pending_slots }) => pending_slots.clone(),
            // Pruned while loading.
            _ => Vec::new(),
        };

        match result {
            Ok(set) => {
                if !schedule.epochs.contains_key(&epoch) {
                    debug!(epoch, "[qc-18] Discarding duties of pruned epoch");
                    return;
                }
                let set = Arc::new(set);
                info!(
                    epoch,
                    duties = set.len(),
                    queued_slots = pending.len(),
                    "[qc-18] Duties loaded"
                );
                schedule
                    .epochs
                    .insert(epoch, EpochDuties::Loaded(Arc::clone(&set)));
                drop(schedule);

                for (slot, started) in pending {
                    self.dispatch(&set, slot, started);
                }
            }
            Err(e @ DutyLoadError::NoLongerNeeded { .. }) => {
                debug!(epoch, error = %e, "[qc-18] Duty load dropped");
                if matches!(schedule.epochs.get(&epoch), Some(EpochDuties::Loading { .. })) {
                    schedule.epochs.remove(&epoch);
                }
            }
            Err(e) => {
                error!(
                    epoch,
                    error = %e,
                    missed_slots = pending.len(),
                    "[qc-18] Duty load failed"
                );
                // Back to unloaded; the next epoch or slot signal starts over.
                if matches!(schedule.epochs.get(&epoch), Some(EpochDuties::Loading { .. })) {
                    schedule.epochs.remove(&epoch);
                }
            }
        }
    }

    fn on_slot(self: &Arc<Self>, slot: Slot) {
        let started = Instant::now();
        let epoch = slot / self.slots_per_epoch;
        if self
            .schedule
            .lock()
            .current_epoch
            .map_or(true, |current| epoch > current)
        {
            self.advance_to(epoch);
        }

        let mut schedule = self.schedule.lock();
        let current = schedule.current_epoch;
        let set = match schedule.epochs.get_mut(&epoch) {
            Some(EpochDuties::Loaded(set)) => Arc::clone(set),
            Some(EpochDuties::Loading { pending_slots }) => {
                debug!(slot, epoch, "[qc-18] Duties still loading, slot queued");
                pending_slots.push((slot, started));
                return;
            }
            None => {
                if !Self::in_window(current, self.lookahead_epochs, epoch) {
                    warn!(slot, epoch, "[qc-18] Slot outside duty window");
                    return;
                }
                schedule.epochs.insert(
                    epoch,
                    EpochDuties::Loading {
                        pending_slots: vec![(slot, started)],
                    },
                );
                drop(schedule);
                self.spawn_load(epoch);
                return;
            }
        };
        drop(schedule);
        self.dispatch(&set, slot, started);
    }

    fn dispatch(&self, set: &ScheduledDutySet, slot: Slot, started: Instant) {
        let duties = set.duties_at(slot).to_vec();
        if duties.is_empty() {
            return;
        }
        debug!(slot, count = duties.len(), "[qc-18] Dispatching duties");
        self.executor.dispatch(&self.runtime, duties, started);
    }
}

impl<A, S> ValidatorTimingApi for DutyOrchestrator<A, S>
where
    A: ValidatorApi + 'static,
    S: DutySigner + 'static,
{
    fn on_epoch(&self, epoch: Epoch) {
        self.inner.advance_to(epoch);
    }

    fn on_slot(&self, slot: Slot) {
        self.inner.on_slot(slot);
    }
}

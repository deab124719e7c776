//! Per-epoch fork context cache.

use crate::domain::ForkInfo;
use crate::error::ForkLookupError;
use crate::ports::ValidatorApi;
use parking_lot::Mutex;
use shared_types::{Epoch, Slot};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;

/// Resolves the fork context of an epoch with at most one request in flight
/// per epoch.
///
/// Concurrent callers for the same epoch await the same cell. A failed
/// lookup leaves the cell empty, so the next caller asks again.
pub struct ForkProvider<A: ValidatorApi> {
    api: Arc<A>,
    slots_per_epoch: u64,
    cells: Mutex<BTreeMap<Epoch, Arc<OnceCell<ForkInfo>>>>,
}

impl<A: ValidatorApi> ForkProvider<A> {
    pub fn new(api: Arc<A>, slots_per_epoch: u64) -> Self {
        Self {
            api,
            slots_per_epoch: slots_per_epoch.max(1),
            cells: Mutex::new(BTreeMap::new()),
        }
    }

    /// Fork context for duties targeting `slot`.
    pub async fn fork_for(&self, slot: Slot) -> Result<ForkInfo, ForkLookupError> {
        self.fork_for_epoch(slot / self.slots_per_epoch).await
    }

    pub async fn fork_for_epoch(&self, epoch: Epoch) -> Result<ForkInfo, ForkLookupError> {
        let cell = self.cells.lock().entry(epoch).or_default().clone();
        let info = cell
            .get_or_try_init(|| async {
                debug!(epoch, "[qc-18] Requesting fork context");
                self.api
                    .fork_info(epoch)
                    .await
                    .map_err(|source| ForkLookupError::Api { epoch, source })
            })
            .await?;
        Ok(*info)
    }

    /// Forget epochs before `oldest`.
    pub fn prune(&self, oldest: Epoch) {
        let mut cells = self.cells.lock();
        *cells = cells.split_off(&oldest);
    }

    pub fn cached_epochs(&self) -> usize {
        self.cells.lock().len()
    }
}

//! Inbound ports (driving side - API)

use shared_types::{Epoch, Slot};

/// Primary port: wall-clock timing signals
///
/// Both calls return immediately. Loading and dispatch continue on the
/// runtime and are observed through duty reports.
pub trait ValidatorTimingApi: Send + Sync {
    /// A new epoch started: load duties for it and the lookahead.
    fn on_epoch(&self, epoch: Epoch);

    /// A new slot started: dispatch the duties due at it.
    fn on_slot(&self, slot: Slot);
}

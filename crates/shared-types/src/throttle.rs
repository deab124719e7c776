//! # Throttling Request Gate
//!
//! Bounded concurrent admission for asynchronous work.
//!
//! ## Algorithm
//!
//! - Every `submit` appends a request factory to a FIFO queue.
//! - While fewer than `max_in_flight` requests are running, the head of the
//!   queue is admitted: its factory is invoked and the resulting future is
//!   spawned on the current tokio runtime.
//! - When an admitted request settles (success, failure or cancellation),
//!   its in-flight slot is released and the queue is drained again.
//!
//! ## Guarantees
//!
//! - In-flight count never exceeds `max_in_flight`.
//! - Requests are admitted in submission order.
//! - Every `submit` resolves exactly once. A request that can never be
//!   admitted (no runtime to run it) resolves with `GateError::Abandoned`.

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Gate failures. Errors of the wrapped request are returned untouched
/// inside the request's own output.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    /// The request was discarded before it could be admitted.
    #[error("Request abandoned before admission by gate '{0}'")]
    Abandoned(&'static str),
}

type Job = Box<dyn FnOnce(InFlightGuard) -> BoxFuture<'static, ()> + Send>;

struct GateState {
    in_flight: usize,
    queue: VecDeque<Job>,
}

struct Inner {
    name: &'static str,
    max_in_flight: usize,
    state: Mutex<GateState>,
}

/// Caps the number of concurrently running requests.
///
/// Cloning yields another handle onto the same gate.
#[derive(Clone)]
pub struct ThrottlingRequestGate {
    inner: Arc<Inner>,
}

impl ThrottlingRequestGate {
    /// Create a gate admitting at most `max_in_flight` requests at once.
    ///
    /// A limit of zero is raised to one so submitted work always makes
    /// progress.
    pub fn new(name: &'static str, max_in_flight: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                name,
                max_in_flight: max_in_flight.max(1),
                state: Mutex::new(GateState {
                    in_flight: 0,
                    queue: VecDeque::new(),
                }),
            }),
        }
    }

    /// Enqueue a request.
    ///
    /// `factory` is invoked once, at admission time, to start the request.
    /// A factory that panics releases its slot and its handle resolves with
    /// `GateError::Abandoned`.
    pub fn submit<F, Fut, T>(&self, factory: F) -> GateHandle<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::new(move |guard: InFlightGuard| {
            let request = factory();
            async move {
                let output = request.await;
                // Release the slot before the caller observes completion.
                drop(guard);
                let _ = tx.send(output);
            }
            .boxed()
        });

        self.inner.state.lock().queue.push_back(job);
        Inner::drain(&self.inner);

        GateHandle {
            gate: self.inner.name,
            rx,
        }
    }

    /// Requests currently running.
    pub fn in_flight(&self) -> usize {
        self.inner.state.lock().in_flight
    }

    /// Requests waiting for admission.
    pub fn queued(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    pub fn max_in_flight(&self) -> usize {
        self.inner.max_in_flight
    }

    pub fn name(&self) -> &'static str {
        self.inner.name
    }
}

impl std::fmt::Debug for ThrottlingRequestGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("ThrottlingRequestGate")
            .field("name", &self.inner.name)
            .field("max_in_flight", &self.inner.max_in_flight)
            .field("in_flight", &state.in_flight)
            .field("queued", &state.queue.len())
            .finish()
    }
}

impl Inner {
    /// Admit queued requests while capacity remains.
    fn drain(inner: &Arc<Inner>) {
        let runtime = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                let abandoned: Vec<Job> = inner.state.lock().queue.drain(..).collect();
                if !abandoned.is_empty() {
                    warn!(
                        gate = inner.name,
                        count = abandoned.len(),
                        "[gate] No runtime available, abandoning queued requests"
                    );
                }
                return;
            }
        };

        // Slots are claimed under the lock; factories run after it is released.
        let claimed: Vec<(Job, InFlightGuard)> = {
            let mut state = inner.state.lock();
            let mut claimed = Vec::new();
            while state.in_flight < inner.max_in_flight {
                let Some(job) = state.queue.pop_front() else {
                    break;
                };
                state.in_flight += 1;
                claimed.push((
                    job,
                    InFlightGuard {
                        inner: Arc::clone(inner),
                    },
                ));
            }
            if !claimed.is_empty() {
                debug!(
                    gate = inner.name,
                    admitted = claimed.len(),
                    in_flight = state.in_flight,
                    queued = state.queue.len(),
                    "[gate] Admitted requests"
                );
            }
            claimed
        };

        for (job, guard) in claimed {
            match panic::catch_unwind(AssertUnwindSafe(|| job(guard))) {
                Ok(task) => {
                    runtime.spawn(task);
                }
                Err(_) => warn!(
                    gate = inner.name,
                    "[gate] Request factory panicked, slot released"
                ),
            }
        }
    }
}

/// Holds one in-flight slot; releasing it drains the queue.
struct InFlightGuard {
    inner: Arc<Inner>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        {
            let mut state = self.inner.state.lock();
            state.in_flight = state.in_flight.saturating_sub(1);
        }
        Inner::drain(&self.inner);
    }
}

/// Completion of a submitted request.
#[must_use = "dropping the handle discards the request's result"]
pub struct GateHandle<T> {
    gate: &'static str,
    rx: oneshot::Receiver<T>,
}

impl<T> Future for GateHandle<T> {
    type Output = Result<T, GateError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let gate = self.gate;
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.map_err(|_| GateError::Abandoned(gate)))
    }
}

//! Throttled Deposit Chain Provider
//!
//! Wraps any `DepositChainProvider` so that at most a fixed number of its
//! requests are outstanding at once. Excess requests queue in submission
//! order. Failures of the wrapped provider reach the caller unchanged and
//! still release their slot.

use crate::domain::{CallRequest, DepositChainBlock};
use crate::error::Result;
use crate::metrics;
use crate::ports::DepositChainProvider;
use async_trait::async_trait;
use shared_types::{Hash, ThrottlingRequestGate};
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

const GATE_NAME: &str = "deposit-chain";

/// Deposit-chain provider behind a `ThrottlingRequestGate`.
pub struct ThrottlingDepositChainProvider<P> {
    delegate: Arc<P>,
    gate: ThrottlingRequestGate,
}

impl<P: DepositChainProvider + 'static> ThrottlingDepositChainProvider<P> {
    pub fn new(delegate: Arc<P>, max_concurrent_requests: usize) -> Self {
        Self {
            delegate,
            gate: ThrottlingRequestGate::new(GATE_NAME, max_concurrent_requests),
        }
    }

    pub fn gate(&self) -> &ThrottlingRequestGate {
        &self.gate
    }

    async fn queue_request<T, F, Fut>(&self, method: &'static str, request: F) -> Result<T>
    where
        F: FnOnce(Arc<P>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let delegate = Arc::clone(&self.delegate);
        debug!(
            method,
            in_flight = self.gate.in_flight(),
            queued = self.gate.queued(),
            "[qc-15] Queueing deposit chain request"
        );
        metrics::record_request_submitted(method);

        let outcome = self.gate.submit(move || request(delegate)).await?;
        if let Err(e) = &outcome {
            debug!(method, error = %e, "[qc-15] Deposit chain request failed");
            metrics::record_request_failed(method);
        }
        outcome
    }
}

#[async_trait]
impl<P: DepositChainProvider + 'static> DepositChainProvider for ThrottlingDepositChainProvider<P> {
    async fn block_by_number(&self, number: u64) -> Result<DepositChainBlock> {
        self.queue_request("block_by_number", move |p| async move {
            p.block_by_number(number).await
        })
        .await
    }

    async fn block_by_hash(&self, hash: Hash) -> Result<DepositChainBlock> {
        self.queue_request("block_by_hash", move |p| async move {
            p.block_by_hash(hash).await
        })
        .await
    }

    async fn latest_block(&self) -> Result<DepositChainBlock> {
        self.queue_request("latest_block", |p| async move { p.latest_block().await })
            .await
    }

    async fn call(&self, request: CallRequest) -> Result<Vec<u8>> {
        self.queue_request("call", move |p| async move { p.call(request).await })
            .await
    }
}

//! External-data vote cache.
//!
//! Follows the deposit chain at a fixed distance behind its head and turns
//! each followed block into an `ExternalDataRecord` by querying the deposit
//! contract at that block.

use crate::config::DepositChainConfig;
use crate::domain::{
    decode_deposit_count, decode_deposit_root, CallRequest, DepositChainBlock, DepositContractCall,
};
use crate::error::Result;
use crate::metrics;
use crate::ports::{DepositChainProvider, ExternalDataVoteApi};
use futures::future::try_join_all;
use parking_lot::RwLock;
use shared_types::{ChainState, ExternalDataRecord};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// A followed deposit-chain block and the record it yields.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrackedBlock {
    pub block: DepositChainBlock,
    pub record: ExternalDataRecord,
}

pub struct ExternalDataTracker<P> {
    provider: Arc<P>,
    config: DepositChainConfig,
    blocks: RwLock<BTreeMap<u64, TrackedBlock>>,
}

impl<P: DepositChainProvider> ExternalDataTracker<P> {
    pub fn new(provider: Arc<P>, config: DepositChainConfig) -> Self {
        Self {
            provider,
            config,
            blocks: RwLock::new(BTreeMap::new()),
        }
    }

    /// Fetch every block between the last followed one and
    /// `head - follow_distance`. Returns how many blocks were added.
    ///
    /// Requests are issued concurrently; the provider is expected to throttle
    /// them.
    pub async fn sync(&self) -> Result<usize> {
        let head = self.provider.latest_block().await?;
        let Some(target) = head.number.checked_sub(self.config.follow_distance) else {
            debug!(head = head.number, "[qc-15] Deposit chain shorter than follow distance");
            return Ok(0);
        };

        let window_start = target.saturating_sub(self.config.max_tracked_blocks.saturating_sub(1));
        let start = match self.newest() {
            Some(newest) => (newest.block.number + 1).max(window_start),
            None => window_start,
        };
        if start > target {
            return Ok(0);
        }

        let fetched = try_join_all((start..=target).map(|number| self.fetch(number))).await?;
        let added = fetched.len();

        let mut blocks = self.blocks.write();
        for tracked in fetched {
            blocks.insert(tracked.block.number, tracked);
        }
        while blocks.len() as u64 > self.config.max_tracked_blocks {
            blocks.pop_first();
        }
        metrics::set_tracked_blocks(blocks.len());
        info!(
            head = head.number,
            followed = target,
            added,
            "[qc-15] External data cache synced"
        );
        Ok(added)
    }

    async fn fetch(&self, number: u64) -> Result<TrackedBlock> {
        let (block, root, count) = futures::try_join!(
            self.provider.block_by_number(number),
            self.contract_call(DepositContractCall::DepositRoot, number),
            self.contract_call(DepositContractCall::DepositCount, number),
        )?;
        Ok(TrackedBlock {
            block,
            record: ExternalDataRecord {
                deposit_root: decode_deposit_root(&root)?,
                deposit_count: decode_deposit_count(&count)?,
                block_hash: block.hash,
            },
        })
    }

    async fn contract_call(&self, call: DepositContractCall, block_number: u64) -> Result<Vec<u8>> {
        self.provider
            .call(CallRequest {
                to: self.config.deposit_contract,
                data: call.encode(),
                block_number,
            })
            .await
    }

    /// Add a block directly, bypassing the provider.
    pub fn insert(&self, tracked: TrackedBlock) {
        let mut blocks = self.blocks.write();
        blocks.insert(tracked.block.number, tracked);
        while blocks.len() as u64 > self.config.max_tracked_blocks {
            blocks.pop_first();
        }
    }

    pub fn newest(&self) -> Option<TrackedBlock> {
        self.blocks.read().values().next_back().copied()
    }

    pub fn len(&self) -> usize {
        self.blocks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.read().is_empty()
    }
}

impl<P: DepositChainProvider> ExternalDataVoteApi for ExternalDataTracker<P> {
    /// Vote selection, in order of preference:
    ///
    /// 1. the most voted record among the state's pending votes that this
    ///    cache also knows (earliest first vote breaks ties),
    /// 2. the newest followed record,
    /// 3. the state's current record.
    ///
    /// Records whose deposit count is below the state's are never chosen.
    fn vote_for(&self, state: &ChainState) -> ExternalDataRecord {
        let blocks = self.blocks.read();
        let floor = state.external_data.deposit_count;
        let is_candidate = |record: &ExternalDataRecord| {
            record.deposit_count >= floor && blocks.values().any(|t| t.record == *record)
        };

        // (record, votes), in order of first appearance
        let mut tallies: Vec<(ExternalDataRecord, usize)> = Vec::new();
        for vote in state.external_data_votes.iter().filter(|v| is_candidate(*v)) {
            match tallies.iter_mut().find(|(record, _)| record == vote) {
                Some((_, count)) => *count += 1,
                None => tallies.push((*vote, 1)),
            }
        }
        let best = tallies
            .iter()
            .fold(None::<&(ExternalDataRecord, usize)>, |best, entry| match best {
                Some(b) if b.1 >= entry.1 => Some(b),
                _ => Some(entry),
            });
        if let Some((record, votes)) = best {
            debug!(votes, "[qc-15] Voting with existing majority candidate");
            return *record;
        }

        blocks
            .values()
            .rev()
            .map(|t| t.record)
            .find(|record| record.deposit_count >= floor)
            .unwrap_or(state.external_data)
    }
}

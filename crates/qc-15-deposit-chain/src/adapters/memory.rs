//! In-memory deposit chain.
//!
//! Local development endpoint: blocks are produced on demand and the deposit
//! contract answers from a shared `DepositLog`, snapshotting the deposit count
//! at each block.

use crate::domain::{
    encode_deposit_count, Address, CallRequest, DepositChainBlock, DepositContractCall, DepositLog,
};
use crate::error::{ExternalRequestError, Result};
use crate::ports::DepositChainProvider;
use async_trait::async_trait;
use parking_lot::RwLock;
use shared_types::{Hash, RootHasher, ZERO_HASH};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

struct MinedBlock {
    block: DepositChainBlock,
    deposit_count: u64,
}

pub struct InMemoryDepositChain {
    contract: Address,
    log: Arc<DepositLog>,
    seconds_per_block: u64,
    blocks: RwLock<Vec<MinedBlock>>,
    offline: AtomicBool,
}

impl InMemoryDepositChain {
    /// Chain with a genesis block at `genesis_timestamp`.
    pub fn new(
        contract: Address,
        log: Arc<DepositLog>,
        genesis_timestamp: u64,
        seconds_per_block: u64,
    ) -> Self {
        let genesis = MinedBlock {
            block: DepositChainBlock {
                number: 0,
                hash: block_hash(0, &ZERO_HASH, genesis_timestamp),
                parent_hash: ZERO_HASH,
                timestamp: genesis_timestamp,
            },
            deposit_count: log.len(),
        };
        Self {
            contract,
            log,
            seconds_per_block,
            blocks: RwLock::new(vec![genesis]),
            offline: AtomicBool::new(false),
        }
    }

    /// Append a block over the deposits logged so far.
    pub fn mine_block(&self) -> DepositChainBlock {
        let mut blocks = self.blocks.write();
        let parent = blocks.last().map(|b| b.block).unwrap_or(DepositChainBlock {
            number: 0,
            hash: ZERO_HASH,
            parent_hash: ZERO_HASH,
            timestamp: 0,
        });
        let number = parent.number + 1;
        let timestamp = parent.timestamp + self.seconds_per_block;
        let block = DepositChainBlock {
            number,
            hash: block_hash(number, &parent.hash, timestamp),
            parent_hash: parent.hash,
            timestamp,
        };
        blocks.push(MinedBlock {
            block,
            deposit_count: self.log.len(),
        });
        debug!(number, "[qc-15] Mined in-memory deposit chain block");
        block
    }

    pub fn mine_blocks(&self, count: u64) -> Option<DepositChainBlock> {
        (0..count).map(|_| self.mine_block()).last()
    }

    /// Simulate the endpoint going away (or coming back).
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn ensure_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(ExternalRequestError::Unavailable(
                "in-memory deposit chain offline".into(),
            ));
        }
        Ok(())
    }

    fn deposit_count_at(&self, number: u64) -> Result<u64> {
        self.blocks
            .read()
            .get(number as usize)
            .map(|b| b.deposit_count)
            .ok_or_else(|| ExternalRequestError::BlockNotFound(format!("#{number}")))
    }
}

fn block_hash(number: u64, parent: &Hash, timestamp: u64) -> Hash {
    RootHasher::new(b"deposit-chain-block")
        .u64(number)
        .hash(parent)
        .u64(timestamp)
        .finish()
}

#[async_trait]
impl DepositChainProvider for InMemoryDepositChain {
    async fn block_by_number(&self, number: u64) -> Result<DepositChainBlock> {
        self.ensure_online()?;
        self.blocks
            .read()
            .get(number as usize)
            .map(|b| b.block)
            .ok_or_else(|| ExternalRequestError::BlockNotFound(format!("#{number}")))
    }

    async fn block_by_hash(&self, hash: Hash) -> Result<DepositChainBlock> {
        self.ensure_online()?;
        self.blocks
            .read()
            .iter()
            .find(|b| b.block.hash == hash)
            .map(|b| b.block)
            .ok_or_else(|| ExternalRequestError::BlockNotFound(format!("0x{}", hex::encode(hash))))
    }

    async fn latest_block(&self) -> Result<DepositChainBlock> {
        self.ensure_online()?;
        self.blocks
            .read()
            .last()
            .map(|b| b.block)
            .ok_or_else(|| ExternalRequestError::BlockNotFound("latest".into()))
    }

    async fn call(&self, request: CallRequest) -> Result<Vec<u8>> {
        self.ensure_online()?;
        if request.to != self.contract {
            return Err(ExternalRequestError::CallFailed(format!(
                "no contract at 0x{}",
                hex::encode(request.to)
            )));
        }
        let count = self.deposit_count_at(request.block_number)?;
        match DepositContractCall::decode(&request.data) {
            Some(DepositContractCall::DepositCount) => Ok(encode_deposit_count(count)),
            Some(DepositContractCall::DepositRoot) => self
                .log
                .deposit_root(count)
                .map(|root| root.to_vec())
                .ok_or_else(|| ExternalRequestError::CallFailed("deposit log truncated".into())),
            None => Err(ExternalRequestError::CallFailed(format!(
                "unknown selector 0x{}",
                hex::encode(&request.data)
            ))),
        }
    }
}

//! # Deposit Flow
//!
//! Deposits logged on the deposit chain reach the beacon state:
//!
//! ```text
//! DepositLog ──▶ InMemoryDepositChain ──▶ ThrottlingDepositChainProvider
//!                                                  │
//!                                       ExternalDataTracker (qc-15)
//!                                                  │ vote
//!                                          BlockAssembler (qc-17)
//!                                                  │ block
//!                                       StateTransitionEngine (qc-04)
//! ```
//!
//! A vote is adopted once it holds a majority of the voting period; the
//! block that tips the majority must already carry the new deposits.

#[cfg(test)]
mod tests {
    use node_runtime::adapters::{LoggedDeposits, TrackedExternalData};
    use node_runtime::GenesisBuilder;
    use qc_04_state_transition::StateTransitionEngine;
    use qc_15_deposit_chain::{
        DepositChainConfig, DepositLog, ExternalDataTracker, InMemoryDepositChain,
        ThrottlingDepositChainProvider,
    };
    use qc_17_block_production::{
        BlockAssembler, BlockAssemblyApi, BlockProductionConfig, InMemoryAttestationPool,
        InMemorySlashingPool,
    };
    use shared_types::{
        CandidateBlock, ChainState, DepositData, ProtocolConstants, Slot, EMPTY_SIGNATURE,
    };
    use std::sync::Arc;

    const GENESIS_VALIDATORS: usize = 8;
    const CONTRACT: [u8; 20] = [0xdc; 20];

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    type Client = ThrottlingDepositChainProvider<InMemoryDepositChain>;

    struct Flow {
        engine: Arc<StateTransitionEngine>,
        chain: Arc<InMemoryDepositChain>,
        client: Arc<Client>,
        tracker: Arc<ExternalDataTracker<Client>>,
        assembler: BlockAssembler,
        state: ChainState,
        block: CandidateBlock,
    }

    /// Genesis of eight validators, then `extra` more deposits logged before
    /// the deposit chain is mined.
    fn flow(extra: u8) -> Flow {
        let constants = ProtocolConstants::minimal();
        let engine = Arc::new(StateTransitionEngine::new(constants.clone()).unwrap());
        let log = Arc::new(DepositLog::new());
        let genesis = GenesisBuilder::new(0, GENESIS_VALIDATORS, constants.clone())
            .build(&log)
            .unwrap();
        for seed in 0..extra {
            log.record(DepositData {
                pubkey: [0xa0 + seed; 48],
                withdrawal_credentials: [seed; 32],
                amount: constants.max_effective_balance,
                signature: EMPTY_SIGNATURE,
            });
        }

        let chain = Arc::new(InMemoryDepositChain::new(CONTRACT, Arc::clone(&log), 0, 14));
        chain.mine_blocks(10);
        let client = Arc::new(ThrottlingDepositChainProvider::new(Arc::clone(&chain), 2));
        let tracker = Arc::new(ExternalDataTracker::new(
            Arc::clone(&client),
            DepositChainConfig {
                max_concurrent_requests: 2,
                follow_distance: 2,
                max_tracked_blocks: 64,
                deposit_contract: CONTRACT,
            },
        ));

        let assembler = BlockAssembler::new(
            Arc::clone(&engine),
            Arc::new(InMemoryAttestationPool::new(constants.clone())),
            Arc::new(LoggedDeposits::new(Arc::clone(&log), constants.max_deposits)),
            Arc::new(TrackedExternalData::new(Arc::clone(&tracker))),
            Arc::new(InMemorySlashingPool::new()),
            BlockProductionConfig::default(),
        );

        Flow {
            engine,
            chain,
            client,
            tracker,
            assembler,
            state: genesis.state,
            block: genesis.block,
        }
    }

    impl Flow {
        /// Assemble and import the block at `slot`.
        async fn produce(&mut self, slot: Slot) {
            let block = self
                .assembler
                .create_unsigned_block(&self.state, &self.block, slot, [7; 96])
                .await
                .unwrap();
            self.state = self.engine.import_block(&self.state, &block).unwrap();
            self.block = block;
        }
    }

    // =============================================================================
    // INTEGRATION TESTS: DEPOSIT CHAIN → BLOCK PRODUCTION → STATE
    // =============================================================================

    /// Logged deposits become validators once the vote carrying them wins.
    #[tokio::test]
    async fn test_logged_deposits_join_after_vote_majority() {
        let mut flow = flow(2);
        assert_eq!(flow.tracker.sync().await.unwrap(), 9);
        let followed = flow.tracker.newest().unwrap();
        assert_eq!(followed.block.number, 8);
        assert_eq!(followed.record.deposit_count, 10);

        // Minimal preset: 32-slot voting period, so the 17th vote wins.
        let majority = flow.engine.constants().slots_per_voting_period() / 2 + 1;
        for slot in 1..majority {
            flow.produce(slot).await;
            assert!(flow.block.body.deposits.is_empty());
            assert_eq!(flow.block.body.external_data, followed.record);
        }
        assert_eq!(flow.state.validators.len(), GENESIS_VALIDATORS);
        assert_eq!(flow.state.external_data_votes.len() as u64, majority - 1);

        flow.produce(majority).await;
        assert_eq!(flow.block.body.deposits.len(), 2);
        assert_eq!(flow.state.external_data, followed.record);
        assert_eq!(flow.state.deposit_index, 10);
        assert_eq!(flow.state.validators.len(), GENESIS_VALIDATORS + 2);
        assert_eq!(flow.state.validators[9].pubkey, [0xa1; 48]);
    }

    /// Keeping up with the chain adds only the new blocks.
    #[tokio::test]
    async fn test_sync_is_incremental() {
        let flow = flow(0);
        assert_eq!(flow.tracker.sync().await.unwrap(), 9);
        assert_eq!(flow.tracker.sync().await.unwrap(), 0);

        flow.chain.mine_blocks(3);
        assert_eq!(flow.tracker.sync().await.unwrap(), 3);
        assert_eq!(flow.tracker.newest().unwrap().block.number, 11);
        assert_eq!(flow.client.gate().in_flight(), 0);
    }

    /// An unreachable deposit chain never stops block production.
    #[tokio::test]
    async fn test_offline_deposit_chain_falls_back_to_state_record() {
        let mut flow = flow(2);
        flow.chain.set_offline(true);
        let err = flow.tracker.sync().await.unwrap_err();
        assert!(err.is_recoverable());
        assert!(flow.tracker.is_empty());

        let genesis_record = flow.state.external_data;
        for slot in 1..=3 {
            flow.produce(slot).await;
            assert_eq!(flow.block.body.external_data, genesis_record);
            assert!(flow.block.body.deposits.is_empty());
        }

        // Back online: the next block votes for the followed record.
        flow.chain.set_offline(false);
        flow.tracker.sync().await.unwrap();
        flow.produce(4).await;
        assert_eq!(flow.block.body.external_data.deposit_count, 10);
        assert_eq!(flow.client.gate().queued(), 0);
    }
}

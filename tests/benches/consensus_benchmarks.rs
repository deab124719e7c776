//! # Quantum-Chain Consensus Benchmarks
//!
//! | Subsystem | Operation | Target |
//! |-----------|-----------|--------|
//! | qc-04 State Transition | Epoch boundary, 1024 validators | < 50ms |
//! | qc-04 State Transition | Committee shuffle, 1024 validators | < 10ms |
//! | qc-17 Block Production | Assemble over a 4-slot gap | < 20ms |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use node_runtime::adapters::LoggedDeposits;
use node_runtime::GenesisBuilder;
use qc_04_state_transition::StateTransitionEngine;
use qc_15_deposit_chain::DepositLog;
use qc_17_block_production::{
    BlockAssembler, BlockAssemblyApi, BlockProductionConfig, CurrentExternalData,
    InMemoryAttestationPool, InMemorySlashingPool,
};
use shared_types::{ChainState, ProtocolConstants};
use std::sync::Arc;

fn genesis(validators: usize, constants: &ProtocolConstants, log: &DepositLog) -> ChainState {
    GenesisBuilder::new(0, validators, constants.clone())
        .build(log)
        .unwrap()
        .state
}

// ============================================================================
// QC-04: State Transition
// ============================================================================

fn bench_epoch_boundary(c: &mut Criterion) {
    let mut group = c.benchmark_group("qc-04-state-transition");
    let constants = ProtocolConstants::minimal();
    let engine = StateTransitionEngine::new(constants.clone()).unwrap();

    for validators in [64usize, 256, 1024] {
        let state = genesis(validators, &constants, &DepositLog::new());
        let last_slot = engine
            .advance(&state, constants.slots_per_epoch * 3 - 1)
            .unwrap();
        group.bench_with_input(
            BenchmarkId::new("epoch_boundary", validators),
            &last_slot,
            |b, state| b.iter(|| black_box(engine.advance(state, state.slot + 1).unwrap())),
        );

        group.bench_with_input(
            BenchmarkId::new("committees", validators),
            &state,
            |b, state| b.iter(|| black_box(engine.committees(state, 1).unwrap())),
        );
    }
    group.finish();
}

// ============================================================================
// QC-17: Block Production
// ============================================================================

fn bench_block_assembly(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    let constants = ProtocolConstants::minimal();
    let engine = Arc::new(StateTransitionEngine::new(constants.clone()).unwrap());
    let log = Arc::new(DepositLog::new());
    let genesis = GenesisBuilder::new(0, 256, constants.clone())
        .build(&log)
        .unwrap();
    let assembler = BlockAssembler::new(
        Arc::clone(&engine),
        Arc::new(InMemoryAttestationPool::new(constants.clone())),
        Arc::new(LoggedDeposits::new(log, constants.max_deposits)),
        Arc::new(CurrentExternalData),
        Arc::new(InMemorySlashingPool::new()),
        BlockProductionConfig::default(),
    );

    c.bench_function("qc-17-assemble-skip-4", |b| {
        b.iter(|| {
            runtime.block_on(async {
                black_box(
                    assembler
                        .create_unsigned_block(&genesis.state, &genesis.block, 4, [7; 96])
                        .await
                        .unwrap(),
                )
            })
        })
    });
}

criterion_group!(benches, bench_epoch_boundary, bench_block_assembly);
criterion_main!(benches);

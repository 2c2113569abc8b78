//! End-to-end pipeline test: ingest a scenario into an on-disk journal,
//! replay it with checkpointing, resume after more events arrive, and
//! publish the final projection to a queryable `SQLite` database.

use alloy_primitives::{Address, B256, I256, U256};
use roundhouse_core::{
    BalanceKey, BalanceKind, ChainEvent, CheckpointStore, EventEnvelope, Projector, ReplayConfig,
    Replayer, SqliteJournal, SqliteStore, StateStore, TracingSink,
};

fn user() -> Address {
    Address::repeat_byte(0x11)
}

fn token() -> Address {
    Address::repeat_byte(0xa1)
}

fn envelope(block: u64, event: ChainEvent) -> EventEnvelope {
    EventEnvelope {
        block_number: block,
        block_timestamp: 1_000 + block,
        tx_hash: B256::repeat_byte(block as u8),
        log_index: 0,
        event,
    }
}

fn signed(value: i64) -> I256 {
    I256::try_from(value).unwrap()
}

#[test]
fn journal_replay_resume_and_export() {
    let dir = tempfile::tempdir().unwrap();
    let journal_path = dir.path().join("journal.db");
    let checkpoint_path = dir.path().join("checkpoints.db");
    let state_path = dir.path().join("state.db");

    // Ingest the opening scenario.
    let journal = SqliteJournal::open(&journal_path).unwrap();
    journal
        .append_batch(&[
            envelope(1, ChainEvent::RoundUpdated {
                start: 1_000,
                end: 2_000,
                metadata_uri: "ipfs://bafyroundone".to_string(),
            }),
            envelope(2, ChainEvent::Deposit {
                depositor: user(),
                token: token(),
                amount: U256::from(500u64),
            }),
            envelope(3, ChainEvent::AllocationSet {
                user: user(),
                token: token(),
                new_amount: U256::from(200u64),
            }),
        ])
        .unwrap();
    drop(journal);

    // First replay run, from genesis.
    let journal = SqliteJournal::open(&journal_path).unwrap();
    let checkpoints = CheckpointStore::open(&checkpoint_path).unwrap();
    let config = ReplayConfig {
        checkpoint_interval: 2,
        batch_size: 2,
    };
    let replayer = Replayer::new(
        &journal,
        &checkpoints,
        Projector::new(TracingSink),
        config.clone(),
    );
    let (state, outcome) = replayer.run().unwrap();
    assert_eq!(outcome.events_applied, 3);
    assert_eq!(outcome.resumed_from, None);
    assert_eq!(state.allocation_count(), 1);

    // More events arrive; a second run resumes from the checkpoint.
    journal
        .append_batch(&[
            envelope(4, ChainEvent::Claimed {
                claimant: user(),
                token: token(),
                amount: U256::from(200u64),
            }),
            envelope(5, ChainEvent::Withdraw {
                token: token(),
                amount: U256::from(50u64),
            }),
        ])
        .unwrap();

    let replayer = Replayer::new(
        &journal,
        &checkpoints,
        Projector::new(TracingSink),
        config,
    );
    let (state, outcome) = replayer.run().unwrap();
    assert_eq!(outcome.events_applied, 2);
    assert_eq!(outcome.resumed_from, Some(3));
    assert_eq!(outcome.last_seq_id, 5);

    // Publish and query back through the durable store.
    let mut durable = SqliteStore::open(&state_path).unwrap();
    durable.import(&state).unwrap();

    let held = durable
        .balance(BalanceKey {
            token: token(),
            kind: BalanceKind::Held,
        })
        .unwrap();
    // 500 deposited, 200 claimed, 50 withdrawn.
    assert_eq!(held, signed(250));

    let allocated = durable
        .balance(BalanceKey {
            token: token(),
            kind: BalanceKind::Allocated,
        })
        .unwrap();
    // The only allocation-set event created a fresh record, which nets
    // zero against the ALLOCATED aggregate (preserved upstream
    // behavior; see DESIGN.md). Claims and withdrawals never touch it.
    assert_eq!(allocated, I256::ZERO);

    let claimed = durable
        .balance(BalanceKey {
            token: token(),
            kind: BalanceKind::Claimed,
        })
        .unwrap();
    assert_eq!(claimed, signed(200));

    let current = durable.current_round().unwrap().unwrap();
    let record = durable
        .allocation(roundhouse_core::AllocationKey {
            user: user(),
            token: token(),
            round: current.round,
        })
        .unwrap()
        .unwrap();
    assert_eq!(record.amount, signed(200));
    assert_eq!(record.claimed_amount, signed(200));
    assert_eq!(record.claimed_at, Some(1_004));

    let stats = durable.global_stats().unwrap();
    assert_eq!(stats.times_allocated, 1);
    assert_eq!(stats.times_claimed, 1);

    let round = durable.round(current.round).unwrap().unwrap();
    assert_eq!(round.metadata.as_deref(), Some("bafyroundone"));

    assert!(durable.user(user()).unwrap().is_some());
}

//! Concurrent admission and assembly: no transaction ever lands in two
//! sub-blocks, and nothing admitted goes missing.

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use meridian_mempool::{AssemblerConfig, SubBlockAssembler, TransactionPool, TransactionRecordStore};
use meridian_types::{SystemClock, Timestamp, Transaction, TxId};

const PRODUCERS: usize = 4;
const PER_PRODUCER: usize = 500;
const CUTTERS: usize = 3;

#[test]
fn concurrent_add_and_create_sub_block_partition() {
    let pool = Arc::new(TransactionPool::new(
        Arc::new(TransactionRecordStore::new()),
        PRODUCERS * PER_PRODUCER,
    ));
    let assembler = Arc::new(SubBlockAssembler::new(
        Arc::clone(&pool),
        Arc::new(SystemClock),
        AssemblerConfig {
            max_sub_block_size: 16,
            ..AssemblerConfig::default()
        },
    ));

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let pool = Arc::clone(&pool);
            thread::spawn(move || {
                let mut added = Vec::new();
                for i in 0..PER_PRODUCER {
                    let id = format!("p{p}-{i}");
                    let tx = Transaction::new(id.as_str(), "alice", "bob", 1, i as u64, Timestamp::EPOCH);
                    if pool.add(tx).is_ok() {
                        added.push(TxId::new(id));
                    }
                }
                added
            })
        })
        .collect();

    let cutters: Vec<_> = (0..CUTTERS)
        .map(|_| {
            let assembler = Arc::clone(&assembler);
            thread::spawn(move || {
                let mut cut = Vec::new();
                for _ in 0..200 {
                    if let Ok(sb) = assembler.create_sub_block(7) {
                        cut.push(sb);
                    }
                }
                cut
            })
        })
        .collect();

    let mut added = HashSet::new();
    for h in producers {
        added.extend(h.join().unwrap());
    }
    let mut sub_blocks = Vec::new();
    for h in cutters {
        sub_blocks.extend(h.join().unwrap());
    }

    let mut seen = HashSet::new();
    for sb in &sub_blocks {
        assert!(sb.len() <= 7);
        for id in sb.tx_ids() {
            assert!(seen.insert(id.clone()), "{id} appears in two sub-blocks");
        }
    }
    for id in pool.ids() {
        assert!(seen.insert(id.clone()), "{id} both pooled and batched");
    }
    assert_eq!(seen, added);
    assert_eq!(assembler.pending_len(), sub_blocks.len());
}

#[test]
fn concurrent_duplicate_adds_admit_once() {
    let pool = Arc::new(TransactionPool::new(
        Arc::new(TransactionRecordStore::new()),
        100,
    ));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let pool = Arc::clone(&pool);
            thread::spawn(move || {
                let tx = Transaction::new("same", "alice", "bob", 1, 1, Timestamp::EPOCH);
                pool.add(tx).is_ok()
            })
        })
        .collect();
    let admitted = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|ok| *ok)
        .count();
    assert_eq!(admitted, 1);
    assert_eq!(pool.size(), 1);
}

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use meridian_types::{SubBlockId, Timestamp, TxId};

fn blake2b_256_bench(c: &mut Criterion) {
    let data = [0xABu8; 256];

    c.bench_function("blake2b_256_256B", |b| {
        b.iter(|| meridian_crypto::blake2b_256(black_box(&data)))
    });
}

fn blake2b_multi_bench(c: &mut Criterion) {
    let parts: Vec<&[u8]> = vec![&[1u8; 32], &[2u8; 64], &[3u8; 128]];

    c.bench_function("blake2b_256_multi_3parts", |b| {
        b.iter(|| meridian_crypto::blake2b_256_multi(black_box(&parts)))
    });
}

fn sub_block_id_bench(c: &mut Criterion) {
    let ids: Vec<TxId> = (0..256).map(|i| TxId::new(format!("tx-{i:06}"))).collect();
    let ts = Timestamp::from_millis(1_700_000_000_000);

    c.bench_function("sub_block_id_256_txs", |b| {
        b.iter(|| meridian_crypto::sub_block_id(black_box(42), ts, black_box(&ids)))
    });
}

fn selection_seed_bench(c: &mut Criterion) {
    let id = SubBlockId::new([9u8; 32]);

    c.bench_function("selection_seed", |b| {
        b.iter(|| meridian_crypto::selection_seed(black_box(&id)))
    });
}

criterion_group!(
    benches,
    blake2b_256_bench,
    blake2b_multi_bench,
    sub_block_id_bench,
    selection_seed_bench,
);
criterion_main!(benches);

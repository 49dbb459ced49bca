//! Benchmarks hashing a beacon-like state of 16384 validators from scratch
//! against rehashing it incrementally after a handful of balance updates.

use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use ethereum_types::H256;
use ssz_trie::{
    config::{CacheMode, HasherConfig},
    hash_root::HashRoot,
    schema::SchemaRegistry,
    types::{ContainerDescriptor, TypeDescriptor},
    value::{Uint, Value},
};

const VALIDATORS: u64 = 16_384;

fn state_type() -> TypeDescriptor {
    TypeDescriptor::named("State")
}

fn hasher(mode: CacheMode) -> HashRoot {
    let named = TypeDescriptor::named;
    let registry = SchemaRegistry::builder()
        .with_beacon_overrides()
        .register(
            ContainerDescriptor::new("Validator")
                .field("pubkey", named("BLSPubkey"))
                .field("withdrawal_credentials", named("Hash32"))
                .field("effective_balance", named("Gwei"))
                .field("slashed", TypeDescriptor::boolean()),
        )
        .register(
            ContainerDescriptor::new("State")
                .field("slot", named("Slot"))
                .field("validators", TypeDescriptor::list(named("Validator"), 1 << 40))
                .field("balances", TypeDescriptor::list(named("Gwei"), 1 << 40)),
        )
        .build()
        .unwrap();

    let config = HasherConfig {
        cache_mode: mode,
        ..HasherConfig::default()
    };
    HashRoot::new(&config, Arc::new(registry))
}

fn state() -> Value {
    let validator = |i: u64| {
        Value::composite(vec![
            vec![i as u8; 48].into(),
            Value::from(H256::repeat_byte(0xaa)),
            Value::from(32_000_000_000u64),
            false.into(),
        ])
    };

    Value::composite(vec![
        Value::from(0u64),
        Value::composite((0..VALIDATORS).map(validator).collect()),
        Value::composite((0..VALIDATORS).map(|_| Value::from(32_000_000_000u64)).collect()),
    ])
}

fn criterion_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("State hashing");

    let plain = hasher(CacheMode::Disabled);
    let value = state();
    group.bench_function("From scratch", |b| {
        b.iter(|| plain.hash(&state_type(), &value).unwrap())
    });

    let cached = hasher(CacheMode::Enabled);
    let mut tracked = cached.track(&state_type(), state()).unwrap();
    cached.hash_tracked(&tracked).unwrap();
    let mut slot = 0;
    group.bench_function("Incremental, 16 balance updates", |b| {
        b.iter_batched(
            || {
                slot += 1;
                slot
            },
            |slot| {
                tracked.update_uint(&[0], |_| Uint::U64(slot)).unwrap();
                for i in 0..16 {
                    let index = (slot as usize * 997 + i * 1021) % VALIDATORS as usize;
                    tracked
                        .update_uint(&[2, index], |_| Uint::U64(slot))
                        .unwrap();
                }
                cached.hash_tracked(&tracked).unwrap()
            },
            BatchSize::SmallInput,
        )
    });

    group.finish()
}

criterion_group!(
    name = benches;
    config = Criterion::default().sample_size(10);
    targets = criterion_benchmark);
criterion_main!(benches);

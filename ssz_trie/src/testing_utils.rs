use std::sync::Arc;

use ethereum_types::H256;
use rand::{rngs::StdRng, Rng};

use crate::{
    config::{CacheMode, HasherConfig},
    hash_root::HashRoot,
    schema::SchemaRegistry,
    types::{ContainerDescriptor, TypeDescriptor},
    value::Value,
};

pub(crate) const VALIDATOR_BALANCE: u64 = 32_000_000_000;

pub(crate) const BEACON_STATE: &str = "BeaconState";

/// Field positions inside `BeaconState`.
pub(crate) const VALIDATORS: usize = 4;
pub(crate) const BALANCES: usize = 5;

pub(crate) fn common_setup() {
    // Try init since multiple tests calling `init` will cause an error.
    let _ = pretty_env_logger::try_init();
}

pub(crate) fn random_chunk(rng: &mut StdRng) -> H256 {
    H256(rng.gen::<[u8; 32]>())
}

pub(crate) fn random_chunks(rng: &mut StdRng, count: usize) -> Vec<H256> {
    (0..count).map(|_| random_chunk(rng)).collect()
}

fn named(name: &str) -> TypeDescriptor {
    TypeDescriptor::named(name)
}

/// A registry with the beacon overrides and a cut-down set of beacon
/// containers, small enough for exhaustive tests.
pub(crate) fn beacon_registry() -> SchemaRegistry {
    SchemaRegistry::builder()
        .with_beacon_overrides()
        .register(
            ContainerDescriptor::new("Fork")
                .field("previous_version", named("Bytes4"))
                .field("current_version", named("Bytes4"))
                .field("epoch", named("Epoch")),
        )
        .register(
            ContainerDescriptor::new("Checkpoint")
                .field("epoch", named("Epoch"))
                .field("root", named("Hash32")),
        )
        .register(
            ContainerDescriptor::new("BeaconBlockHeader")
                .field("slot", named("Slot"))
                .field("parent_root", named("Hash32"))
                .field("state_root", named("Hash32"))
                .field("body_root", named("Hash32"))
                .field("signature", named("BLSSignature")),
        )
        .register(
            ContainerDescriptor::new("Validator")
                .field("pubkey", named("BLSPubkey"))
                .field("withdrawal_credentials", named("Hash32"))
                .field("activation_epoch", named("Epoch"))
                .field("effective_balance", named("Gwei"))
                .field("exit_epoch", named("Epoch"))
                .field("slashed", TypeDescriptor::boolean()),
        )
        .register(
            ContainerDescriptor::new("AttestationData")
                .field("slot", named("Slot"))
                .field("beacon_block_root", named("Hash32"))
                .field("source", named("Checkpoint"))
                .field("target", named("Checkpoint"))
                .field("shard", named("Shard")),
        )
        .register(
            ContainerDescriptor::new("PendingAttestation")
                .field("aggregation_bits", TypeDescriptor::bitlist(2048))
                .field("data", named("AttestationData"))
                .field("inclusion_delay", named("Slot"))
                .field("proposer_index", named("ValidatorIndex")),
        )
        .register(
            ContainerDescriptor::new(BEACON_STATE)
                .field("slot", named("Slot"))
                .field("fork", named("Fork"))
                .field("latest_block_header", named("BeaconBlockHeader"))
                .field("block_roots", TypeDescriptor::vector(named("Hash32"), 64))
                .field("validators", TypeDescriptor::list(named("Validator"), 1024))
                .field("balances", TypeDescriptor::list(named("Gwei"), 1024))
                .field(
                    "previous_epoch_attestations",
                    TypeDescriptor::list(named("PendingAttestation"), 128),
                )
                .field(
                    "current_epoch_attestations",
                    TypeDescriptor::list(named("PendingAttestation"), 128),
                )
                .field("justification_bits", TypeDescriptor::bitvector(4))
                .field("finalized_checkpoint", named("Checkpoint")),
        )
        .build()
        .unwrap()
}

pub(crate) fn hasher(mode: CacheMode) -> HashRoot {
    let config = HasherConfig {
        cache_mode: mode,
        ..HasherConfig::default()
    };
    HashRoot::new(&config, Arc::new(beacon_registry()))
}

pub(crate) fn checkpoint(epoch: u64, root_byte: u8) -> Value {
    Value::composite(vec![epoch.into(), H256::repeat_byte(root_byte).into()])
}

pub(crate) fn validator(i: u64) -> Value {
    Value::composite(vec![
        vec![i as u8; 48].into(),
        vec![0xaau8; 32].into(),
        i.into(),
        (VALIDATOR_BALANCE + i).into(),
        u64::MAX.into(),
        false.into(),
    ])
}

pub(crate) fn block_header(slot: u64) -> Value {
    Value::composite(vec![
        slot.into(),
        H256::repeat_byte(1).into(),
        H256::repeat_byte(2).into(),
        H256::repeat_byte(3).into(),
        vec![0x55u8; 96].into(),
    ])
}

pub(crate) fn pending_attestation(i: u64) -> Value {
    let data = Value::composite(vec![
        i.into(),
        H256::repeat_byte(i as u8).into(),
        checkpoint(i, 0x10),
        checkpoint(i + 1, 0x11),
        (i % 4).into(),
    ]);
    Value::composite(vec![
        Value::bits((0..13).map(|b| (b + i) % 3 == 0)),
        data,
        1u64.into(),
        i.into(),
    ])
}

pub(crate) fn beacon_state(validators: u64) -> Value {
    Value::composite(vec![
        100u64.into(),
        Value::composite(vec![
            vec![0u8, 0, 0, 1].into(),
            vec![0u8, 0, 0, 2].into(),
            3u64.into(),
        ]),
        block_header(99),
        Value::composite((0..64u8).map(|i| Value::from(H256::repeat_byte(i))).collect()),
        Value::composite((0..validators).map(validator).collect()),
        Value::composite(
            (0..validators)
                .map(|i| Value::from(VALIDATOR_BALANCE + i))
                .collect(),
        ),
        Value::composite((0..3).map(pending_attestation).collect()),
        Value::composite((3..4).map(pending_attestation).collect()),
        Value::bits([true, true, false, true]),
        checkpoint(2, 0x22),
    ])
}

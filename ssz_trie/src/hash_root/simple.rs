//! Roots computed from scratch.

use ethereum_types::H256;

use super::SszResult;
use crate::{
    codec::{ChunkLayout, Codec},
    merkleize::{MerkleizeError, Merkleizer},
    value::Value,
};

/// The hash-tree-root of `value`.
pub(crate) fn root(merkleizer: &Merkleizer, codec: &Codec, value: &Value) -> SszResult<H256> {
    let layout = codec.chunks(value, |_, child, v| root(merkleizer, child, v))?;
    finish(merkleizer, &layout)
}

/// The root of the first `keep` fields of a container value.
pub(crate) fn truncated_root(
    merkleizer: &Merkleizer,
    codec: &Codec,
    value: &Value,
    keep: usize,
) -> SszResult<H256> {
    let layout = codec.chunks(value, |_, child, v| root(merkleizer, child, v))?;
    Ok(merkleizer.merkleize_truncated(&layout.chunks, keep)?)
}

/// Merkleizes a layout and mixes in its length.
pub(crate) fn finish(merkleizer: &Merkleizer, layout: &ChunkLayout) -> SszResult<H256> {
    let root = merkleizer.merkleize(&layout.chunks, layout.capacity)?;
    Ok(mix_in(merkleizer, root, layout.mix_in))
}

pub(crate) fn mix_in(merkleizer: &Merkleizer, root: H256, len: Option<u64>) -> H256 {
    match len {
        Some(len) => merkleizer.mix_in_length(&root, len),
        None => root,
    }
}

/// The number of leading fields kept when truncating `codec` at `field`.
pub(crate) fn truncation_point(codec: &Codec, field: &str) -> Result<usize, MerkleizeError> {
    if !codec.is_container() {
        return Err(MerkleizeError::NotAContainer(codec.description().to_string()));
    }

    codec
        .field_index(field)
        .ok_or_else(|| MerkleizeError::UnknownField {
            container: codec.description().to_string(),
            field: field.to_string(),
        })
}

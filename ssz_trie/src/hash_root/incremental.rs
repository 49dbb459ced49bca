//! Roots recomputed from the trees retained by a listener.

use std::{collections::BTreeSet, sync::Arc};

use ethereum_types::H256;
use log::trace;

use super::{simple, SszResult};
use crate::{
    codec::{Codec, CodecError, CodecKind},
    incremental::{Listener, ObserverId, TrackerArena},
    merkleize::{ChunkTree, Merkleizer},
    value::Value,
};

/// Hashes the values of one arena on behalf of one observer.
///
/// For every tracked composite it visits, the hasher takes the observer's
/// dirty set and retained tree, recomputes only the dirty chunks, and stores
/// the updated tree back with an empty dirty set. Composites without a
/// retained tree are built in full.
pub(crate) struct IncrementalHasher<'a> {
    merkleizer: &'a Merkleizer,
    observer: ObserverId,
    arena: &'a mut TrackerArena,
}

impl<'a> IncrementalHasher<'a> {
    pub(crate) fn new(
        merkleizer: &'a Merkleizer,
        observer: ObserverId,
        arena: &'a mut TrackerArena,
    ) -> Self {
        Self {
            merkleizer,
            observer,
            arena,
        }
    }

    /// The hash-tree-root of `value`.
    pub(crate) fn root(&mut self, codec: &Codec, value: &Value) -> SszResult<H256> {
        match self.tree(codec, value)? {
            Some(tree) => {
                let root = tree.root(self.merkleizer, codec.merkle_capacity(tree.len()))?;
                Ok(simple::mix_in(self.merkleizer, root, codec.mix_in(value)))
            }
            None => simple::root(self.merkleizer, codec, value),
        }
    }

    /// The root of the first `keep` fields of a tracked container.
    pub(crate) fn truncated_root(
        &mut self,
        codec: &Codec,
        value: &Value,
        keep: usize,
    ) -> SszResult<H256> {
        match self.tree(codec, value)? {
            Some(tree) => Ok(tree.truncated_root(self.merkleizer, keep)?),
            None => simple::truncated_root(self.merkleizer, codec, value, keep),
        }
    }

    /// Brings the retained tree of a tracked composite up to date. Returns
    /// `None` for values that carry no tracker.
    fn tree(&mut self, codec: &Codec, value: &Value) -> SszResult<Option<Arc<ChunkTree>>> {
        let Some(id) = value.as_composite().and_then(|c| c.tracker) else {
            return Ok(None);
        };
        let Some(record) = self.arena.get_mut(id) else {
            return Ok(None);
        };

        let listener = record.get_or_create_listener(self.observer, Listener::default);
        let dirty = listener.take_dirty();
        let retained = listener.take_tree();
        let len = codec.chunk_count(value)?;

        let tree = match retained {
            Some(mut tree) => {
                let chunks: BTreeSet<usize> =
                    dirty.iter().map(|&i| codec.chunk_index_of(i)).collect();
                trace!(
                    "updating {} of {} chunks of {}",
                    chunks.len(),
                    len,
                    codec.description()
                );
                Arc::make_mut(&mut tree).update(self.merkleizer, len, chunks, |i| {
                    self.chunk(codec, value, i)
                })?;
                tree
            }
            None => {
                trace!("building {} chunks of {}", len, codec.description());
                let chunks = (0..len)
                    .map(|i| self.chunk(codec, value, i))
                    .collect::<SszResult<Vec<_>>>()?;
                Arc::new(ChunkTree::build(self.merkleizer, chunks))
            }
        };

        if let Some(listener) = self
            .arena
            .get_mut(id)
            .and_then(|record| record.listener_mut(self.observer))
        {
            listener.store_tree(tree.clone());
        }

        Ok(Some(tree))
    }

    /// Chunk `index` of a tracked composite.
    fn chunk(&mut self, codec: &Codec, value: &Value, index: usize) -> SszResult<H256> {
        if let CodecKind::Packed { .. } = codec.kind() {
            return Ok(codec.packed_chunk(value, index)?);
        }

        let invalid = || CodecError::InvalidPath(vec![index]);
        let child_codec = codec.child(index).ok_or_else(invalid)?;
        let child = value
            .as_composite()
            .and_then(|c| c.get(index))
            .ok_or_else(invalid)?;
        self.root(child_codec, child)
    }
}

//! Merkleization of chunk sequences.
//!
//! Every root in this crate is the root of a complete binary tree whose
//! leaves are 32-byte chunks, right-padded with zero chunks up to a power of
//! two. Padding is never materialised beyond what is needed: subtrees that
//! hold only padding are replaced by precomputed zero hashes.

use std::{collections::BTreeSet, sync::Arc};

use beacon_ssz_common::{HashFn, ZERO_CHUNK};
use ethereum_types::H256;
use log::trace;
use thiserror::Error;

/// Depth of the deepest tree: `2^64` chunks.
pub const MAX_TREE_DEPTH: usize = 64;

/// Trees up to this depth are padded in memory; deeper trees are computed
/// virtually.
const MAX_MATERIALIZED_DEPTH: usize = 16;

/// An alias for `Result<T, MerkleizeError>`.
pub type MerkleizeResult<T> = Result<T, MerkleizeError>;

/// An error raised while computing a root or a branch.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum MerkleizeError {
    /// Truncation requested for a shape that is not a container.
    #[error("{0} is not a container and cannot be truncated")]
    NotAContainer(String),

    /// Truncation requested at a field the container does not have.
    #[error("container {container} has no field {field}")]
    UnknownField {
        /// The container name.
        container: String,
        /// The requested field.
        field: String,
    },

    /// More chunks than the capacity allows.
    #[error("{count} chunks exceed the capacity of {capacity}")]
    CapacityExceeded {
        /// Number of chunks.
        count: u64,
        /// Chunk capacity.
        capacity: u64,
    },

    /// A virtual capacity outside `count..=capacity`.
    #[error("virtual capacity {virtual_capacity} is outside {count}..={capacity}")]
    InvalidVirtualCapacity {
        /// Number of chunks.
        count: u64,
        /// Requested virtual capacity.
        virtual_capacity: u64,
        /// Chunk capacity.
        capacity: u64,
    },

    /// A leaf index beyond the capacity of the tree.
    #[error("leaf {index} is outside a tree of capacity {capacity}")]
    IndexOutOfRange {
        /// Requested leaf.
        index: u64,
        /// Chunk capacity.
        capacity: u64,
    },
}

/// Depth of the tree for `capacity` leaves: `ceil(log2(max(capacity, 1)))`.
pub fn tree_depth(capacity: u64) -> usize {
    match capacity {
        0 | 1 => 0,
        c => (u64::BITS - (c - 1).leading_zeros()) as usize,
    }
}

/// Computes Merkle roots with a fixed hash function.
#[derive(Clone, Debug)]
pub struct Merkleizer {
    hash_fn: Arc<dyn HashFn>,
    zero_hashes: Vec<H256>,
}

impl Merkleizer {
    /// Creates a merkleizer and precomputes its zero hashes.
    pub fn new(hash_fn: Arc<dyn HashFn>) -> Self {
        let mut zero_hashes = Vec::with_capacity(MAX_TREE_DEPTH + 1);
        zero_hashes.push(ZERO_CHUNK);
        for depth in 0..MAX_TREE_DEPTH {
            let below = zero_hashes[depth];
            zero_hashes.push(hash_fn.digest_pair(&below, &below));
        }

        Self {
            hash_fn,
            zero_hashes,
        }
    }

    /// The underlying hash function.
    pub fn hash_fn(&self) -> &Arc<dyn HashFn> {
        &self.hash_fn
    }

    /// Root of a subtree of the given depth holding only zero chunks.
    ///
    /// # Panics
    /// Panics if `depth` exceeds [`MAX_TREE_DEPTH`].
    pub fn zero_hash(&self, depth: usize) -> H256 {
        self.zero_hashes[depth]
    }

    /// `hash(left ‖ right)`.
    pub fn hash_pair(&self, left: &H256, right: &H256) -> H256 {
        self.hash_fn.digest_pair(left, right)
    }

    /// Root of `chunks` padded to `capacity` leaves.
    pub fn merkleize(&self, chunks: &[H256], capacity: u64) -> MerkleizeResult<H256> {
        let count = chunks.len() as u64;
        if count > capacity {
            return Err(MerkleizeError::CapacityExceeded { count, capacity });
        }
        if capacity == 0 {
            return Ok(ZERO_CHUNK);
        }

        let depth = tree_depth(capacity);
        match depth <= MAX_MATERIALIZED_DEPTH {
            true => Ok(self.merkleize_padded(chunks, depth)),
            false => self.merkleize_virtual(chunks, count, capacity),
        }
    }

    /// Root of `chunks` padded to `capacity` leaves, computed from a tree
    /// sized for `virtual_capacity` leaves and extended with zero hashes.
    ///
    /// The result equals [`merkleize`](Self::merkleize) for every virtual
    /// capacity in `chunks.len()..=capacity`.
    pub fn merkleize_virtual(
        &self,
        chunks: &[H256],
        virtual_capacity: u64,
        capacity: u64,
    ) -> MerkleizeResult<H256> {
        let count = chunks.len() as u64;
        if count > virtual_capacity || virtual_capacity > capacity {
            return Err(MerkleizeError::InvalidVirtualCapacity {
                count,
                virtual_capacity,
                capacity,
            });
        }
        if capacity == 0 {
            return Ok(ZERO_CHUNK);
        }

        let virtual_depth = tree_depth(virtual_capacity);
        let depth = tree_depth(capacity);
        let node = self.fold(chunks.to_vec(), virtual_depth);

        Ok(self.climb(node, virtual_depth, depth))
    }

    /// `hash(root ‖ le64(len) ‖ 0^24)`.
    pub fn mix_in_length(&self, root: &H256, len: u64) -> H256 {
        let mut chunk = ZERO_CHUNK;
        chunk.as_bytes_mut()[..8].copy_from_slice(&len.to_le_bytes());
        self.hash_pair(root, &chunk)
    }

    /// Root of the first `keep` chunks, as if the shape had only `keep`
    /// leaves.
    pub fn merkleize_truncated(&self, chunks: &[H256], keep: usize) -> MerkleizeResult<H256> {
        let prefix = chunks
            .get(..keep)
            .ok_or(MerkleizeError::IndexOutOfRange {
                index: keep as u64,
                capacity: chunks.len() as u64,
            })?;
        self.merkleize(prefix, keep as u64)
    }

    /// Full padding in memory. Only used for shallow trees.
    fn merkleize_padded(&self, chunks: &[H256], depth: usize) -> H256 {
        let mut layer = chunks.to_vec();
        layer.resize(1 << depth, ZERO_CHUNK);
        while layer.len() > 1 {
            layer = layer
                .chunks(2)
                .map(|pair| self.hash_pair(&pair[0], &pair[1]))
                .collect();
        }
        layer[0]
    }

    /// Folds a layer up to `depth`, standing in zero hashes for missing
    /// right siblings.
    fn fold(&self, mut layer: Vec<H256>, depth: usize) -> H256 {
        if layer.is_empty() {
            return self.zero_hashes[depth];
        }
        for level in 0..depth {
            layer = self.parent_layer(&layer, level);
        }
        layer[0]
    }

    fn parent_layer(&self, layer: &[H256], level: usize) -> Vec<H256> {
        layer
            .chunks(2)
            .map(|pair| {
                let right = pair.get(1).unwrap_or(&self.zero_hashes[level]);
                self.hash_pair(&pair[0], right)
            })
            .collect()
    }

    /// Hashes `node` with zero subtrees from level `from` up to level `to`.
    fn climb(&self, mut node: H256, from: usize, to: usize) -> H256 {
        for level in from..to {
            node = self.hash_pair(&node, &self.zero_hashes[level]);
        }
        node
    }
}

/// A retained Merkle tree over a chunk sequence.
///
/// Layers are only as wide as the real data. Missing right siblings are
/// zero hashes, and the root is extended to the capacity of the shape on
/// demand, so a single tree serves any capacity at least as large as its
/// length.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChunkTree {
    layers: Vec<Vec<H256>>,
}

impl ChunkTree {
    /// Builds the tree over `chunks`.
    pub fn build(merkleizer: &Merkleizer, chunks: Vec<H256>) -> Self {
        let mut layers = vec![chunks];
        let mut level = 0;
        while layers[level].len() > 1 {
            let parent = merkleizer.parent_layer(&layers[level], level);
            layers.push(parent);
            level += 1;
        }

        Self { layers }
    }

    /// Number of leaves.
    pub fn len(&self) -> usize {
        self.layers[0].len()
    }

    /// Returns `true` if the tree has no leaves.
    pub fn is_empty(&self) -> bool {
        self.layers[0].is_empty()
    }

    /// The leaf at `index`.
    pub fn leaf(&self, index: usize) -> Option<H256> {
        self.layers[0].get(index).copied()
    }

    /// Root of the tree padded to `capacity` leaves.
    pub fn root(&self, merkleizer: &Merkleizer, capacity: u64) -> MerkleizeResult<H256> {
        let count = self.len() as u64;
        if count > capacity {
            return Err(MerkleizeError::CapacityExceeded { count, capacity });
        }

        let depth = tree_depth(capacity);
        Ok(self.climbed_top(merkleizer, depth))
    }

    /// Resizes the tree to `len` leaves, replaces the `dirty` leaves (and
    /// any new ones) with `chunk_at(index)` and rehashes their paths.
    ///
    /// Dirty indices at or beyond `len` are ignored.
    pub fn update<I, E, F>(
        &mut self,
        merkleizer: &Merkleizer,
        len: usize,
        dirty: I,
        mut chunk_at: F,
    ) -> Result<(), E>
    where
        I: IntoIterator<Item = usize>,
        F: FnMut(usize) -> Result<H256, E>,
    {
        let mut indices: BTreeSet<usize> = dirty.into_iter().filter(|&i| i < len).collect();
        resize_layer(&mut self.layers[0], len, &mut indices);
        for &i in &indices {
            self.layers[0][i] = chunk_at(i)?;
        }
        trace!("rehashing {} of {} leaves", indices.len(), len);

        let mut level = 0;
        while self.layers[level].len() > 1 {
            if self.layers.len() == level + 1 {
                self.layers.push(Vec::new());
            }

            let parent_len = self.layers[level].len().div_ceil(2);
            let mut parents: BTreeSet<usize> = indices.iter().map(|i| i / 2).collect();
            resize_layer(&mut self.layers[level + 1], parent_len, &mut parents);

            for &p in &parents {
                let left = self.layers[level][2 * p];
                let right = self.layers[level]
                    .get(2 * p + 1)
                    .copied()
                    .unwrap_or(merkleizer.zero_hashes[level]);
                self.layers[level + 1][p] = merkleizer.hash_pair(&left, &right);
            }

            indices = parents;
            level += 1;
        }
        self.layers.truncate(level + 1);

        Ok(())
    }

    /// Root of the first `keep` leaves, as if the shape had only `keep`
    /// leaves. Retained nodes that lie entirely inside the prefix are reused.
    pub fn truncated_root(&self, merkleizer: &Merkleizer, keep: usize) -> MerkleizeResult<H256> {
        if keep > self.len() {
            return Err(MerkleizeError::IndexOutOfRange {
                index: keep as u64,
                capacity: self.len() as u64,
            });
        }
        if keep == 0 {
            return Ok(ZERO_CHUNK);
        }

        Ok(self.prefix_node(merkleizer, tree_depth(keep as u64), 0, keep))
    }

    fn prefix_node(&self, merkleizer: &Merkleizer, level: usize, index: usize, keep: usize) -> H256 {
        let span = 1usize << level;
        let start = index * span;
        if start >= keep {
            return merkleizer.zero_hashes[level];
        }
        if start + span <= keep {
            return self.layers[level][index];
        }

        let left = self.prefix_node(merkleizer, level - 1, 2 * index, keep);
        let right = self.prefix_node(merkleizer, level - 1, 2 * index + 1, keep);
        merkleizer.hash_pair(&left, &right)
    }

    /// The Merkle branch of leaf `index` in the tree padded to `capacity`
    /// leaves, from the leaf's sibling up to the child of the root.
    pub fn branch(
        &self,
        merkleizer: &Merkleizer,
        index: u64,
        capacity: u64,
    ) -> MerkleizeResult<Vec<H256>> {
        let count = self.len() as u64;
        if count > capacity {
            return Err(MerkleizeError::CapacityExceeded { count, capacity });
        }
        if index >= capacity {
            return Err(MerkleizeError::IndexOutOfRange { index, capacity });
        }

        let depth = tree_depth(capacity);
        Ok((0..depth)
            .map(|level| self.node(merkleizer, level, (index >> level) ^ 1))
            .collect())
    }

    /// Any node of the tree padded to an arbitrary depth.
    fn node(&self, merkleizer: &Merkleizer, level: usize, index: u64) -> H256 {
        match self.layers.get(level) {
            Some(layer) => usize::try_from(index)
                .ok()
                .and_then(|i| layer.get(i).copied())
                .unwrap_or(merkleizer.zero_hashes[level]),
            None if index == 0 => self.climbed_top(merkleizer, level),
            None => merkleizer.zero_hashes[level],
        }
    }

    /// The leftmost node at `level`, at or above the top of the retained
    /// layers.
    fn climbed_top(&self, merkleizer: &Merkleizer, level: usize) -> H256 {
        let top = self.layers.len() - 1;
        match self.layers[top].first() {
            Some(node) => merkleizer.climb(*node, top, level),
            None => merkleizer.zero_hashes[level],
        }
    }
}

/// Resizes a layer, marking new slots and the new last slot as needing a
/// recompute.
fn resize_layer(layer: &mut Vec<H256>, len: usize, indices: &mut BTreeSet<usize>) {
    let old_len = layer.len();
    if old_len == len {
        return;
    }

    layer.resize(len, ZERO_CHUNK);
    indices.extend(old_len.min(len)..len);
    if len < old_len && len > 0 {
        indices.insert(len - 1);
    }
}

/// Checks that `leaf` sits at `index` of a tree of the given `depth` whose
/// root is `root`, using the sibling hashes in `branch`.
pub fn verify_merkle_branch(
    hash_fn: &dyn HashFn,
    leaf: &H256,
    branch: &[H256],
    depth: usize,
    index: u64,
    root: &H256,
) -> bool {
    if branch.len() < depth {
        return false;
    }

    let mut value = *leaf;
    for (level, sibling) in branch.iter().take(depth).enumerate() {
        value = match (index >> level) & 1 {
            1 => hash_fn.digest_pair(sibling, &value),
            _ => hash_fn.digest_pair(&value, sibling),
        };
    }

    value == *root
}

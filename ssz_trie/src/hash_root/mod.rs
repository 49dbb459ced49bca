//! The hash-tree-root facade.
//!
//! [`HashRoot`] ties a [`SchemaRegistry`], a [`Merkleizer`] and a bounded
//! root cache together. Plain [`Value`]s are always hashed from scratch.
//! [`TrackedValue`]s are hashed incrementally and their roots are cached per
//! generation, unless the cache is disabled.

mod incremental;
mod simple;

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use beacon_ssz_common::HashFn;
use ethereum_types::H256;
use log::{debug, trace, warn};
use lru::LruCache;
use parking_lot::Mutex;
use thiserror::Error;

use self::incremental::IncrementalHasher;
use crate::{
    codec::CodecError,
    config::{CacheMode, HasherConfig},
    incremental::{ObserverId, TrackedValue, ValueId},
    merkleize::{ChunkTree, MerkleizeError, Merkleizer},
    schema::{SchemaError, SchemaRegistry},
    types::{ShapeId, TypeDescriptor},
    value::Value,
};

/// An alias for `Result<T, SszError>`.
pub type SszResult<T> = Result<T, SszError>;

/// A cached or incrementally computed root that disagrees with a
/// recomputation from scratch. Only raised in [`CacheMode::Debug`].
#[derive(Clone, Debug, Eq, Error, PartialEq)]
#[error("root {cached:?} of {shape} disagrees with the recomputed root {fresh:?}")]
pub struct CacheConsistencyError {
    /// The shape of the value.
    pub shape: ShapeId,

    /// The root the caches produced.
    pub cached: H256,

    /// The root computed from scratch.
    pub fresh: H256,
}

/// Any error raised by [`HashRoot`].
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum SszError {
    /// The shape could not be resolved.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// The value does not match the shape, or the input is malformed.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The root could not be computed.
    #[error(transparent)]
    Merkleize(#[from] MerkleizeError),

    /// The caches returned a wrong root.
    #[error(transparent)]
    CacheConsistency(#[from] CacheConsistencyError),
}

/// Hit and miss counts of the root cache.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CacheStats {
    /// Lookups answered from the cache.
    pub hits: u64,

    /// Lookups that had to compute the root.
    pub misses: u64,
}

impl CacheStats {
    /// Fraction of lookups answered from the cache, or `0.0` before the first
    /// lookup.
    pub fn ratio(&self) -> f64 {
        match self.hits + self.misses {
            0 => 0.0,
            total => self.hits as f64 / total as f64,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
struct RootKey {
    value: ValueId,
    shape: ShapeId,
    truncate_at: Option<usize>,
}

#[derive(Clone, Copy, Debug)]
struct CachedRoot {
    generation: u64,
    root: H256,
}

/// Computes hash-tree-roots, signing roots and encodings.
///
/// A `HashRoot` is `Send + Sync`; share it through an [`Arc`].
#[derive(Debug)]
pub struct HashRoot {
    registry: Arc<SchemaRegistry>,
    merkleizer: Merkleizer,
    mode: CacheMode,
    observer: ObserverId,
    roots: Option<Mutex<LruCache<RootKey, CachedRoot>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl HashRoot {
    /// Creates a hasher using the configured hash function.
    pub fn new(config: &HasherConfig, registry: Arc<SchemaRegistry>) -> Self {
        Self::with_hash_fn(config, registry, config.hash_function.hasher())
    }

    /// Creates a hasher with an injected hash function. The configured
    /// `hash_function` is ignored.
    pub fn with_hash_fn(
        config: &HasherConfig,
        registry: Arc<SchemaRegistry>,
        hash_fn: Arc<dyn HashFn>,
    ) -> Self {
        let mode = config.cache_mode;
        let roots = mode
            .is_enabled()
            .then(|| Mutex::new(LruCache::new(config.cache_capacity)));
        debug!(
            "created hasher in {:?} mode with {} cached roots",
            mode, config.cache_capacity
        );

        Self {
            registry,
            merkleizer: Merkleizer::new(hash_fn),
            mode,
            observer: ObserverId::next(),
            roots,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// The schema registry.
    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    /// The merkleizer.
    pub fn merkleizer(&self) -> &Merkleizer {
        &self.merkleizer
    }

    /// The cache mode.
    pub fn mode(&self) -> CacheMode {
        self.mode
    }

    /// The observer id under which this hasher listens to tracked values.
    pub fn observer(&self) -> ObserverId {
        self.observer
    }

    /// Hit and miss counts of the root cache.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Serializes `value` as `ty`.
    pub fn serialize(&self, ty: &TypeDescriptor, value: &Value) -> SszResult<Vec<u8>> {
        Ok(self.registry.resolve(ty)?.serialize(value)?)
    }

    /// Deserializes a `ty` from `bytes`.
    pub fn deserialize(&self, ty: &TypeDescriptor, bytes: &[u8]) -> SszResult<Value> {
        Ok(self.registry.resolve(ty)?.decode(bytes)?)
    }

    /// Starts tracking `value` as `ty`.
    pub fn track(&self, ty: &TypeDescriptor, value: Value) -> SszResult<TrackedValue> {
        Ok(TrackedValue::new(self.registry.resolve(ty)?, value)?)
    }

    /// The hash-tree-root of `value` as `ty`.
    pub fn hash(&self, ty: &TypeDescriptor, value: &Value) -> SszResult<H256> {
        let codec = self.registry.resolve(ty)?;
        simple::root(&self.merkleizer, &codec, value)
    }

    /// The root of a container value without the field called `field` and
    /// every field after it. Truncating before the signature field gives the
    /// signing root.
    pub fn hash_truncate(&self, ty: &TypeDescriptor, value: &Value, field: &str) -> SszResult<H256> {
        let codec = self.registry.resolve(ty)?;
        let keep = simple::truncation_point(&codec, field)?;
        simple::truncated_root(&self.merkleizer, &codec, value, keep)
    }

    /// The Merkle branch of chunk `index` of `value`, in the tree below the
    /// length mix-in.
    pub fn branch(&self, ty: &TypeDescriptor, value: &Value, index: u64) -> SszResult<Vec<H256>> {
        let codec = self.registry.resolve(ty)?;
        let layout = codec.chunks(value, |_, child, v| {
            simple::root(&self.merkleizer, child, v)
        })?;
        let tree = ChunkTree::build(&self.merkleizer, layout.chunks);
        Ok(tree.branch(&self.merkleizer, index, layout.capacity)?)
    }

    /// The hash-tree-root of a tracked value.
    pub fn hash_tracked(&self, tracked: &TrackedValue) -> SszResult<H256> {
        self.hash_tracked_inner(tracked, None)
    }

    /// The truncated root of a tracked container.
    pub fn hash_tracked_truncate(&self, tracked: &TrackedValue, field: &str) -> SszResult<H256> {
        let keep = simple::truncation_point(tracked.codec(), field)?;
        self.hash_tracked_inner(tracked, Some(keep))
    }

    fn hash_tracked_inner(&self, tracked: &TrackedValue, keep: Option<usize>) -> SszResult<H256> {
        let codec = tracked.codec();
        let value = tracked.value();
        if !self.mode.is_enabled() {
            return self.fresh_root(tracked, keep);
        }

        let key = RootKey {
            value: tracked.id(),
            shape: codec.shape(),
            truncate_at: keep,
        };
        if let Some(cached) = self.cached(&key, tracked.generation()) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!("root cache hit for {}", codec.description());
            if self.mode == CacheMode::Debug {
                self.check(tracked, keep, cached)?;
            }
            return Ok(cached);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        trace!("root cache miss for {}", codec.description());

        let root = {
            let mut arena = tracked.arena().lock();
            let mut hasher = IncrementalHasher::new(&self.merkleizer, self.observer, &mut arena);
            match keep {
                Some(keep) => hasher.truncated_root(codec, value, keep)?,
                None => hasher.root(codec, value)?,
            }
        };
        if self.mode == CacheMode::Debug {
            self.check(tracked, keep, root)?;
        }

        if let Some(roots) = &self.roots {
            roots.lock().put(
                key,
                CachedRoot {
                    generation: tracked.generation(),
                    root,
                },
            );
        }

        Ok(root)
    }

    /// Releases what this hasher keeps for `tracked`: its listeners with
    /// their retained trees, and its cached roots. Call it before dropping a
    /// tracked value that this hasher will not see again.
    pub fn release(&self, tracked: &TrackedValue) {
        let listeners = tracked.forget(self.observer);
        let mut evicted = 0;
        if let Some(roots) = &self.roots {
            let mut roots = roots.lock();
            let keys: Vec<RootKey> = roots
                .iter()
                .map(|(key, _)| *key)
                .filter(|key| key.value == tracked.id())
                .collect();
            evicted = keys.len();
            for key in keys {
                roots.pop(&key);
            }
        }
        debug!(
            "released {} listeners and {} cached roots of {:?}",
            listeners,
            evicted,
            tracked.id()
        );
    }

    fn cached(&self, key: &RootKey, generation: u64) -> Option<H256> {
        let mut roots = self.roots.as_ref()?.lock();
        match roots.get(key) {
            Some(entry) if entry.generation == generation => Some(entry.root),
            Some(_) => {
                roots.pop(key);
                None
            }
            None => None,
        }
    }

    fn fresh_root(&self, tracked: &TrackedValue, keep: Option<usize>) -> SszResult<H256> {
        let (codec, value) = (tracked.codec(), tracked.value());
        match keep {
            Some(keep) => simple::truncated_root(&self.merkleizer, codec, value, keep),
            None => simple::root(&self.merkleizer, codec, value),
        }
    }

    fn check(&self, tracked: &TrackedValue, keep: Option<usize>, cached: H256) -> SszResult<()> {
        let fresh = self.fresh_root(tracked, keep)?;
        if fresh == cached {
            return Ok(());
        }

        let err = CacheConsistencyError {
            shape: tracked.codec().shape(),
            cached,
            fresh,
        };
        warn!("{}", err);
        Err(err.into())
    }
}

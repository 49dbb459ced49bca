//! Hasher configuration.

use std::num::NonZeroUsize;

use beacon_ssz_common::HashFunction;
use serde::{Deserialize, Serialize};

/// Number of roots cached by default.
pub const DEFAULT_ROOT_CACHE_CAPACITY: usize = 128;

/// How a [`HashRoot`](crate::hash_root::HashRoot) uses its caches.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheMode {
    /// Every root is computed from scratch. No listeners are registered on
    /// tracked values and nothing is cached.
    Disabled,

    /// Roots of tracked values are cached and recomputed incrementally.
    #[default]
    Enabled,

    /// Like [`Enabled`](Self::Enabled), but every cached or incremental root
    /// is checked against a recomputation from scratch.
    Debug,
}

impl CacheMode {
    /// Returns `true` unless the mode is [`Disabled`](Self::Disabled).
    pub fn is_enabled(self) -> bool {
        self != CacheMode::Disabled
    }
}

/// Settings of a [`HashRoot`](crate::hash_root::HashRoot).
///
/// Missing fields take their default values when deserializing.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct HasherConfig {
    /// Maximum number of cached roots.
    pub cache_capacity: NonZeroUsize,

    /// Cache behaviour.
    pub cache_mode: CacheMode,

    /// The node hash.
    pub hash_function: HashFunction,
}

impl Default for HasherConfig {
    fn default() -> Self {
        Self {
            cache_capacity: NonZeroUsize::new(DEFAULT_ROOT_CACHE_CAPACITY)
                .unwrap_or(NonZeroUsize::MIN),
            cache_mode: CacheMode::default(),
            hash_function: HashFunction::default(),
        }
    }
}

//! SSZ serialization and hash-tree-root computation for beacon chain state.
//!
//! Shapes are described with [`TypeDescriptor`][types::TypeDescriptor]s and
//! resolved by a [`SchemaRegistry`][schema::SchemaRegistry] into
//! [`Codec`][codec::Codec]s, which encode, decode and chunk
//! [`Value`][value::Value]s. Resolved codecs are cached per shape, and named
//! shapes such as `Hash32` or `Gwei` can be served by custom codecs.
//!
//! The [`HashRoot`][hash_root::HashRoot] facade computes roots and signing
//! roots. Values wrapped in a
//! [`TrackedValue`][incremental::TrackedValue] record which of their
//! children changed, so that repeated hashing of a large, slowly changing
//! state only rehashes the modified paths:
//!
//! ```
//! use std::sync::Arc;
//!
//! use ssz_trie::{
//!     config::HasherConfig,
//!     hash_root::HashRoot,
//!     schema::SchemaRegistry,
//!     types::TypeDescriptor,
//!     value::{Uint, Value},
//! };
//!
//! let registry = SchemaRegistry::builder().with_beacon_overrides().build().unwrap();
//! let hasher = HashRoot::new(&HasherConfig::default(), Arc::new(registry));
//!
//! let ty = TypeDescriptor::list(TypeDescriptor::named("Gwei"), 1024);
//! let balances = Value::composite((0..100u64).map(Value::from).collect());
//! let mut tracked = hasher.track(&ty, balances).unwrap();
//!
//! let before = hasher.hash_tracked(&tracked).unwrap();
//! tracked.update_uint(&[7], |_| Uint::U64(1)).unwrap();
//! let after = hasher.hash_tracked(&tracked).unwrap();
//!
//! assert_ne!(before, after);
//! assert_eq!(after, hasher.hash(&ty, tracked.value()).unwrap());
//! ```

#![deny(rustdoc::broken_intra_doc_links)]
#![deny(missing_debug_implementations)]
#![deny(missing_docs)]

pub mod codec;
pub mod config;
pub mod hash_root;
pub mod incremental;
pub mod merkleize;
pub mod schema;
pub mod types;
pub mod value;

#[cfg(test)]
pub(crate) mod testing_utils;

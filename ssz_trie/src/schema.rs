//! Resolution of [`TypeDescriptor`]s into shared [`Codec`]s.
//!
//! Containers are registered by name up front with a
//! [`SchemaRegistryBuilder`]; any descriptor can then reference them through
//! [`TypeDescriptor::Named`]. Resolved codecs are kept in a bounded LRU cache
//! keyed by [`ShapeId`], so structurally identical descriptors share one
//! codec.

use std::{
    collections::{HashMap, HashSet},
    num::NonZeroUsize,
    sync::Arc,
};

use beacon_ssz_common::BYTES_PER_CHUNK;
use log::{debug, trace};
use lru::LruCache;
use parking_lot::Mutex;
use thiserror::Error;

use crate::{
    codec::{
        basic::is_supported_uint_width,
        collection::Bound,
        custom::{CustomCodec, FixedBytesCodec, UintAliasCodec},
        Codec, CodecKind, FieldCodec, PackedElement,
    },
    types::{BasicType, CollectionDescriptor, ContainerDescriptor, ShapeId, TypeDescriptor},
};

/// Number of codecs the registry keeps by default.
pub const DEFAULT_SCHEMA_CACHE_CAPACITY: usize = 128;

/// Fixed-size byte strings registered by
/// [`SchemaRegistryBuilder::with_beacon_overrides`].
pub const BEACON_BYTE_TYPES: [(&str, usize); 7] = [
    ("Hash32", 32),
    ("Bytes4", 4),
    ("Bytes32", 32),
    ("Bytes48", 48),
    ("Bytes96", 96),
    ("BLSPubkey", 48),
    ("BLSSignature", 96),
];

/// `uint64` aliases registered by
/// [`SchemaRegistryBuilder::with_beacon_overrides`].
pub const BEACON_UINT64_ALIASES: [&str; 5] = ["Gwei", "Slot", "Epoch", "ValidatorIndex", "Shard"];

/// An alias for `Result<T, SchemaError>`.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// An error raised while building a registry or resolving a descriptor.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum SchemaError {
    /// A container reaches itself through its fields.
    #[error("container {0} is defined in terms of itself")]
    CyclicType(String),

    /// A named reference matches neither a container nor an override.
    #[error("no container or override is registered as {0}")]
    UnresolvedReference(String),

    /// A container without fields.
    #[error("container {0} has no fields")]
    EmptyContainer(String),

    /// Two fields of one container share a name.
    #[error("container {container} declares field {field} twice")]
    DuplicateField {
        /// The container name.
        container: String,
        /// The repeated field name.
        field: String,
    },

    /// A vector with zero elements.
    #[error("vector {0} has length zero")]
    ZeroLengthVector(String),

    /// A `bit` used anywhere other than as a collection element.
    #[error("a bit can only be the element of a collection")]
    BitOutsideCollection,

    /// An integer width other than 8, 16, 32, 64, 128 or 256.
    #[error("unsupported integer width {0}")]
    UnsupportedUintWidth(u16),

    /// Two containers, or two overrides, registered under one name.
    #[error("{0} is registered twice")]
    DuplicateType(String),

    /// A packed override whose size does not divide a chunk.
    #[error("override {name} of {size} bytes cannot be packed into 32-byte chunks")]
    UnpackableOverride {
        /// The override name.
        name: String,
        /// Its encoded size.
        size: usize,
    },

    /// A fixed-size shape whose size does not fit in memory.
    #[error("{0} is too large to encode")]
    TooLarge(String),
}

/// Collects containers and overrides for a [`SchemaRegistry`].
#[derive(Debug, Default)]
pub struct SchemaRegistryBuilder {
    types: Vec<ContainerDescriptor>,
    overrides: Vec<(String, Arc<dyn CustomCodec>)>,
    cache_capacity: Option<NonZeroUsize>,
}

impl SchemaRegistryBuilder {
    /// Registers a container under its name.
    pub fn register(mut self, container: ContainerDescriptor) -> Self {
        self.types.push(container);
        self
    }

    /// Registers a hand-written codec. Named references resolve to overrides
    /// before containers.
    pub fn override_codec<N: Into<String>>(mut self, name: N, codec: Arc<dyn CustomCodec>) -> Self {
        self.overrides.push((name.into(), codec));
        self
    }

    /// Registers the beacon chain's byte-string types and `uint64` aliases.
    pub fn with_beacon_overrides(mut self) -> Self {
        for (name, len) in BEACON_BYTE_TYPES {
            self = self.override_codec(name, Arc::new(FixedBytesCodec::new(name, len)));
        }
        for name in BEACON_UINT64_ALIASES {
            self = self.override_codec(name, Arc::new(UintAliasCodec::new(name, 64)));
        }
        self
    }

    /// Sets how many codecs the registry caches.
    pub fn cache_capacity(mut self, capacity: NonZeroUsize) -> Self {
        self.cache_capacity = Some(capacity);
        self
    }

    /// Checks the registrations and builds the registry.
    pub fn build(self) -> SchemaResult<SchemaRegistry> {
        let mut types = HashMap::with_capacity(self.types.len());
        for container in self.types {
            let name = container.name().to_string();
            if types.insert(name.clone(), container).is_some() {
                return Err(SchemaError::DuplicateType(name));
            }
        }

        let mut overrides = HashMap::with_capacity(self.overrides.len());
        for (name, codec) in self.overrides {
            let size = codec.size();
            if codec.packed() && (size == 0 || BYTES_PER_CHUNK % size != 0) {
                return Err(SchemaError::UnpackableOverride { name, size });
            }
            if overrides.insert(name.clone(), codec).is_some() {
                return Err(SchemaError::DuplicateType(name));
            }
        }

        let capacity = self
            .cache_capacity
            .or(NonZeroUsize::new(DEFAULT_SCHEMA_CACHE_CAPACITY))
            .unwrap_or(NonZeroUsize::MIN);

        debug!(
            "built schema registry with {} containers and {} overrides",
            types.len(),
            overrides.len()
        );

        Ok(SchemaRegistry {
            types,
            overrides,
            cache: Mutex::new(LruCache::new(capacity)),
        })
    }
}

/// Resolves descriptors to codecs, caching the results.
#[derive(Debug)]
pub struct SchemaRegistry {
    types: HashMap<String, ContainerDescriptor>,
    overrides: HashMap<String, Arc<dyn CustomCodec>>,
    cache: Mutex<LruCache<ShapeId, Arc<Codec>>>,
}

impl SchemaRegistry {
    /// Starts an empty registry.
    pub fn builder() -> SchemaRegistryBuilder {
        SchemaRegistryBuilder::default()
    }

    /// The registered container called `name`.
    pub fn container(&self, name: &str) -> Option<&ContainerDescriptor> {
        self.types.get(name)
    }

    /// Number of codecs currently cached.
    pub fn cached_codecs(&self) -> usize {
        self.cache.lock().len()
    }

    /// Returns the codec of `ty`.
    ///
    /// Resolution is deterministic: descriptors with the same [`ShapeId`]
    /// always resolve to equivalent codecs, and while a codec stays cached
    /// they resolve to the same [`Arc`].
    pub fn resolve(&self, ty: &TypeDescriptor) -> SchemaResult<Arc<Codec>> {
        self.resolve_inner(ty, &mut Vec::new())
    }

    fn resolve_inner(
        &self,
        ty: &TypeDescriptor,
        in_progress: &mut Vec<String>,
    ) -> SchemaResult<Arc<Codec>> {
        let shape = ty.shape_id();
        let cached = self.cache.lock().get(&shape).cloned();
        if let Some(codec) = cached {
            trace!("schema cache hit for {}", shape);
            return Ok(codec);
        }

        let codec = self.derive(ty, shape, in_progress)?;
        debug!("resolved {} as {}", shape, codec.description());
        self.cache.lock().put(shape, codec.clone());

        Ok(codec)
    }

    fn derive(
        &self,
        ty: &TypeDescriptor,
        shape: ShapeId,
        in_progress: &mut Vec<String>,
    ) -> SchemaResult<Arc<Codec>> {
        let kind = match ty {
            TypeDescriptor::Basic(BasicType::Bool) => CodecKind::Bool,
            TypeDescriptor::Basic(BasicType::Uint(bits)) => CodecKind::Uint {
                bits: check_width(*bits)?,
            },
            TypeDescriptor::Basic(BasicType::Bit) => return Err(SchemaError::BitOutsideCollection),
            TypeDescriptor::Container(container) => self.derive_container(container, in_progress)?,
            TypeDescriptor::Collection(collection) => {
                self.derive_collection(ty, collection, in_progress)?
            }
            TypeDescriptor::Named(name) => {
                if let Some(custom) = self.overrides.get(name) {
                    CodecKind::Custom(custom.clone())
                } else {
                    return self.derive_named(name, in_progress);
                }
            }
        };

        Codec::new(shape, ty.to_string(), kind)
            .map(Arc::new)
            .ok_or_else(|| SchemaError::TooLarge(ty.to_string()))
    }

    fn derive_named(&self, name: &str, in_progress: &mut Vec<String>) -> SchemaResult<Arc<Codec>> {
        let container = self
            .types
            .get(name)
            .ok_or_else(|| SchemaError::UnresolvedReference(name.to_string()))?;
        if in_progress.iter().any(|n| n == name) {
            return Err(SchemaError::CyclicType(name.to_string()));
        }

        in_progress.push(name.to_string());
        let res = self.resolve_inner(&TypeDescriptor::Container(container.clone()), in_progress);
        in_progress.pop();

        res
    }

    fn derive_container(
        &self,
        container: &ContainerDescriptor,
        in_progress: &mut Vec<String>,
    ) -> SchemaResult<CodecKind> {
        if container.fields().is_empty() {
            return Err(SchemaError::EmptyContainer(container.name().to_string()));
        }

        let mut seen = HashSet::with_capacity(container.fields().len());
        let mut fields = Vec::with_capacity(container.fields().len());
        for field in container.fields() {
            if !seen.insert(field.name.as_str()) {
                return Err(SchemaError::DuplicateField {
                    container: container.name().to_string(),
                    field: field.name.clone(),
                });
            }
            fields.push(FieldCodec {
                name: field.name.clone(),
                codec: self.resolve_inner(&field.ty, in_progress)?,
            });
        }

        Ok(CodecKind::Container {
            name: container.name().to_string(),
            fields,
        })
    }

    fn derive_collection(
        &self,
        ty: &TypeDescriptor,
        collection: &CollectionDescriptor,
        in_progress: &mut Vec<String>,
    ) -> SchemaResult<CodecKind> {
        if !collection.variable && collection.max_len == 0 {
            return Err(SchemaError::ZeroLengthVector(ty.to_string()));
        }

        let bound = Bound {
            len: collection.max_len,
            variable: collection.variable,
        };

        let kind = match collection.element.as_ref() {
            TypeDescriptor::Basic(BasicType::Bit) => CodecKind::Bits(bound),
            TypeDescriptor::Basic(BasicType::Uint(8)) => CodecKind::Bytes(bound),
            TypeDescriptor::Basic(BasicType::Bool) => CodecKind::Packed {
                element: PackedElement::Bool,
                bound,
            },
            TypeDescriptor::Basic(BasicType::Uint(bits)) => CodecKind::Packed {
                element: PackedElement::Uint(check_width(*bits)?),
                bound,
            },
            element => {
                let element = self.resolve_inner(element, in_progress)?;
                match element.kind() {
                    CodecKind::Custom(custom) if custom.packed() => CodecKind::Packed {
                        element: PackedElement::Custom(custom.clone()),
                        bound,
                    },
                    _ => CodecKind::Composite { element, bound },
                }
            }
        };

        Ok(kind)
    }
}

fn check_width(bits: u16) -> SchemaResult<u16> {
    match is_supported_uint_width(bits) {
        true => Ok(bits),
        false => Err(SchemaError::UnsupportedUintWidth(bits)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing_utils::{beacon_registry, common_setup};

    fn cyclic_registry() -> SchemaRegistry {
        SchemaRegistry::builder()
            .register(
                ContainerDescriptor::new("Node")
                    .field("value", TypeDescriptor::uint64())
                    .field("next", TypeDescriptor::named("Link")),
            )
            .register(
                ContainerDescriptor::new("Link")
                    .field("nodes", TypeDescriptor::list(TypeDescriptor::named("Node"), 4)),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn cycles_are_rejected() {
        common_setup();

        let registry = cyclic_registry();
        assert_eq!(
            registry.resolve(&TypeDescriptor::named("Node")).unwrap_err(),
            SchemaError::CyclicType("Node".to_string())
        );
        assert_eq!(
            registry.resolve(&TypeDescriptor::named("Link")).unwrap_err(),
            SchemaError::CyclicType("Link".to_string())
        );
    }

    #[test]
    fn unsupported_patterns_are_rejected() {
        let registry = SchemaRegistry::builder().build().unwrap();

        assert_eq!(
            registry.resolve(&TypeDescriptor::named("Missing")).unwrap_err(),
            SchemaError::UnresolvedReference("Missing".to_string())
        );
        assert_eq!(
            registry
                .resolve(&ContainerDescriptor::new("Empty").into())
                .unwrap_err(),
            SchemaError::EmptyContainer("Empty".to_string())
        );
        assert!(matches!(
            registry.resolve(
                &ContainerDescriptor::new("Twice")
                    .field("a", TypeDescriptor::boolean())
                    .field("a", TypeDescriptor::uint64())
                    .into()
            ),
            Err(SchemaError::DuplicateField { .. })
        ));
        assert!(matches!(
            registry.resolve(&TypeDescriptor::vector(TypeDescriptor::uint64(), 0)),
            Err(SchemaError::ZeroLengthVector(_))
        ));
        assert_eq!(
            registry
                .resolve(&TypeDescriptor::Basic(BasicType::Bit))
                .unwrap_err(),
            SchemaError::BitOutsideCollection
        );
        assert_eq!(
            registry
                .resolve(&TypeDescriptor::list(TypeDescriptor::uint(24), 4))
                .unwrap_err(),
            SchemaError::UnsupportedUintWidth(24)
        );
    }

    #[test]
    fn duplicate_registrations_are_rejected() {
        let res = SchemaRegistry::builder()
            .register(ContainerDescriptor::new("A").field("x", TypeDescriptor::boolean()))
            .register(ContainerDescriptor::new("A").field("y", TypeDescriptor::boolean()))
            .build();
        assert_eq!(res.unwrap_err(), SchemaError::DuplicateType("A".to_string()));

        let res = SchemaRegistry::builder()
            .with_beacon_overrides()
            .override_codec("Slot", Arc::new(UintAliasCodec::new("Slot", 32)))
            .build();
        assert_eq!(res.unwrap_err(), SchemaError::DuplicateType("Slot".to_string()));
    }

    #[test]
    fn unpackable_overrides_are_rejected() {
        let res = SchemaRegistry::builder()
            .override_codec("Odd", Arc::new(OddCodec))
            .build();
        assert!(matches!(res, Err(SchemaError::UnpackableOverride { size: 3, .. })));
    }

    #[test]
    fn structurally_equal_shapes_share_a_codec() {
        let registry = beacon_registry();
        let a = registry
            .resolve(&TypeDescriptor::list(TypeDescriptor::uint64(), 8))
            .unwrap();
        let b = registry
            .resolve(&TypeDescriptor::list(TypeDescriptor::uint64(), 8))
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let by_name = registry.resolve(&TypeDescriptor::named("Checkpoint")).unwrap();
        let inline = registry
            .resolve(&registry.container("Checkpoint").unwrap().clone().into())
            .unwrap();
        assert!(Arc::ptr_eq(&by_name, &inline));
    }

    #[test]
    fn cache_is_bounded() {
        let registry = SchemaRegistry::builder()
            .cache_capacity(NonZeroUsize::new(2).unwrap())
            .build()
            .unwrap();

        for len in 1..=5 {
            registry.resolve(&TypeDescriptor::byte_list(len)).unwrap();
        }
        assert_eq!(registry.cached_codecs(), 2);
    }

    #[test]
    fn overrides_win_over_containers() {
        let registry = SchemaRegistry::builder()
            .register(ContainerDescriptor::new("Slot").field("x", TypeDescriptor::boolean()))
            .with_beacon_overrides()
            .build()
            .unwrap();

        let codec = registry.resolve(&TypeDescriptor::named("Slot")).unwrap();
        assert!(matches!(codec.kind(), CodecKind::Custom(_)));
        assert_eq!(codec.fixed_size(), Some(8));

        let slots = registry
            .resolve(&TypeDescriptor::list(TypeDescriptor::named("Slot"), 4))
            .unwrap();
        assert!(matches!(slots.kind(), CodecKind::Packed { .. }));

        let roots = registry
            .resolve(&TypeDescriptor::vector(TypeDescriptor::named("Hash32"), 4))
            .unwrap();
        assert!(matches!(roots.kind(), CodecKind::Composite { .. }));
    }

    #[derive(Debug)]
    struct OddCodec;

    impl CustomCodec for OddCodec {
        fn name(&self) -> &str {
            "Odd"
        }

        fn size(&self) -> usize {
            3
        }

        fn packed(&self) -> bool {
            true
        }

        fn validate(&self, _: &crate::value::Value) -> crate::codec::CodecResult<()> {
            Ok(())
        }

        fn encode(
            &self,
            _: &crate::value::Value,
            out: &mut Vec<u8>,
        ) -> crate::codec::CodecResult<()> {
            out.extend_from_slice(&[0; 3]);
            Ok(())
        }

        fn decode(&self, _: &[u8]) -> crate::codec::CodecResult<crate::value::Value> {
            Ok(crate::value::Value::Bytes(vec![0; 3]))
        }
    }
}

//! The in-memory value model that codecs read and write.

use std::fmt::{self, Display};

use bitvec::{order::Lsb0, vec::BitVec};
use ethereum_types::{H256, U256};

use crate::incremental::TrackerId;

/// Bits of a bit-vector or bit-list, least significant bit first in each byte.
pub type Bits = BitVec<u8, Lsb0>;

/// An unsigned integer of one of the supported widths.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Uint {
    /// `uint8`.
    U8(u8),
    /// `uint16`.
    U16(u16),
    /// `uint32`.
    U32(u32),
    /// `uint64`.
    U64(u64),
    /// `uint128`.
    U128(u128),
    /// `uint256`.
    U256(U256),
}

impl Uint {
    /// The width of this integer in bits.
    pub const fn bits(&self) -> u16 {
        match self {
            Uint::U8(_) => 8,
            Uint::U16(_) => 16,
            Uint::U32(_) => 32,
            Uint::U64(_) => 64,
            Uint::U128(_) => 128,
            Uint::U256(_) => 256,
        }
    }

    /// The value as a `u64`, if it fits.
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Uint::U8(v) => Some(v.into()),
            Uint::U16(v) => Some(v.into()),
            Uint::U32(v) => Some(v.into()),
            Uint::U64(v) => Some(v),
            Uint::U128(v) => v.try_into().ok(),
            Uint::U256(v) => (v <= U256::from(u64::MAX)).then(|| v.low_u64()),
        }
    }
}

impl Display for Uint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Uint::U8(v) => write!(f, "{}", v),
            Uint::U16(v) => write!(f, "{}", v),
            Uint::U32(v) => write!(f, "{}", v),
            Uint::U64(v) => write!(f, "{}", v),
            Uint::U128(v) => write!(f, "{}", v),
            Uint::U256(v) => write!(f, "{}", v),
        }
    }
}

macro_rules! impl_from_for_uint {
    ($type:ty, $variant:ident) => {
        impl From<$type> for Uint {
            fn from(v: $type) -> Self {
                Uint::$variant(v)
            }
        }

        impl From<$type> for Value {
            fn from(v: $type) -> Self {
                Value::Uint(Uint::$variant(v))
            }
        }
    };
}

impl_from_for_uint!(u8, U8);
impl_from_for_uint!(u16, U16);
impl_from_for_uint!(u32, U32);
impl_from_for_uint!(u64, U64);
impl_from_for_uint!(u128, U128);
impl_from_for_uint!(U256, U256);

/// The ordered children of a container or of a non-byte collection.
///
/// A composite may carry the id of its tracker record when it lives inside a
/// [`TrackedValue`](crate::incremental::TrackedValue). The id is meaningless
/// outside of that value, so cloning a composite drops it.
#[derive(Debug, Default)]
pub struct Composite {
    children: Vec<Value>,
    pub(crate) tracker: Option<TrackerId>,
}

impl Composite {
    /// Creates an untracked composite.
    pub fn new(children: Vec<Value>) -> Self {
        Self {
            children,
            tracker: None,
        }
    }

    /// The children in positional order.
    pub fn children(&self) -> &[Value] {
        &self.children
    }

    /// Number of children.
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// Returns `true` if there are no children.
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// The child at `index`.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.children.get(index)
    }

    /// Consumes the composite, returning its children.
    pub fn into_children(self) -> Vec<Value> {
        self.children
    }

    pub(crate) fn children_mut(&mut self) -> &mut Vec<Value> {
        &mut self.children
    }
}

impl Clone for Composite {
    fn clone(&self) -> Self {
        Self::new(self.children.clone())
    }
}

impl Eq for Composite {}

/// Equality ignores tracking state.
impl PartialEq for Composite {
    fn eq(&self, other: &Self) -> bool {
        self.children == other.children
    }
}

/// A structured SSZ value.
///
/// Which variant is valid for a shape is decided by its codec:
/// - collections of `uint8` (and byte-typed overrides) are [`Value::Bytes`],
/// - collections of bits are [`Value::Bits`],
/// - containers and all other collections are [`Value::Composite`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Value {
    /// A boolean.
    Bool(bool),

    /// An unsigned integer.
    Uint(Uint),

    /// Raw bytes.
    Bytes(Vec<u8>),

    /// Packed bits.
    Bits(Bits),

    /// Children of a container or collection.
    Composite(Composite),
}

impl Value {
    /// A container or collection value built from its children.
    pub fn composite(children: Vec<Value>) -> Self {
        Value::Composite(Composite::new(children))
    }

    /// A bit collection built from booleans.
    pub fn bits<I: IntoIterator<Item = bool>>(bits: I) -> Self {
        Value::Bits(bits.into_iter().collect())
    }

    /// A short name of the variant, used in error messages.
    pub const fn kind(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Uint(_) => "uint",
            Value::Bytes(_) => "bytes",
            Value::Bits(_) => "bits",
            Value::Composite(_) => "composite",
        }
    }

    /// Returns the composite, if this is one.
    pub fn as_composite(&self) -> Option<&Composite> {
        match self {
            Value::Composite(c) => Some(c),
            _ => None,
        }
    }

    pub(crate) fn as_composite_mut(&mut self) -> Option<&mut Composite> {
        match self {
            Value::Composite(c) => Some(c),
            _ => None,
        }
    }

    /// Returns the integer, if this is one.
    pub fn as_uint(&self) -> Option<&Uint> {
        match self {
            Value::Uint(u) => Some(u),
            _ => None,
        }
    }

    /// Returns the bytes, if this is a byte value.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(v.to_vec())
    }
}

impl From<H256> for Value {
    fn from(v: H256) -> Self {
        Value::Bytes(v.as_bytes().to_vec())
    }
}

impl From<Bits> for Value {
    fn from(v: Bits) -> Self {
        Value::Bits(v)
    }
}

//! Length bounds and read-only access to collection values.

use super::{CodecError, CodecResult};
use crate::value::{Bits, Value};

/// The length constraint of a vector or list.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Bound {
    /// Exact length for vectors, maximum length for lists.
    pub len: u64,

    /// `true` for lists.
    pub variable: bool,
}

impl Bound {
    /// A vector of exactly `len` elements.
    pub const fn vector(len: u64) -> Self {
        Self {
            len,
            variable: false,
        }
    }

    /// A list of at most `max_len` elements.
    pub const fn list(max_len: u64) -> Self {
        Self {
            len: max_len,
            variable: true,
        }
    }

    /// Checks an element count against the bound.
    pub fn check(&self, len: usize) -> CodecResult<()> {
        let len = len as u64;
        match self.variable {
            true if len > self.len => Err(CodecError::LengthExceeded { len, max: self.len }),
            false if len != self.len => Err(CodecError::LengthMismatch {
                expected: self.len,
                actual: len,
            }),
            _ => Ok(()),
        }
    }

    /// The length mixed into the root: the element count for lists, nothing
    /// for vectors.
    pub fn mix_in(&self, len: usize) -> Option<u64> {
        self.variable.then_some(len as u64)
    }
}

/// One element of a collection.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Element<'a> {
    /// An element of a byte collection.
    Byte(u8),

    /// An element of a bit collection.
    Bit(bool),

    /// Any other element.
    Value(&'a Value),
}

#[derive(Clone, Copy, Debug)]
enum Items<'a> {
    Bytes(&'a [u8]),
    Bits(&'a Bits),
    Values(&'a [Value]),
}

/// A collection value viewed through its codec.
///
/// Gives uniform element access regardless of whether the elements are
/// stored as bytes, bits or child values.
#[derive(Clone, Copy, Debug)]
pub struct CollectionView<'a> {
    bound: Bound,
    items: Items<'a>,
}

impl<'a> CollectionView<'a> {
    pub(super) fn bytes(bound: Bound, bytes: &'a [u8]) -> Self {
        Self {
            bound,
            items: Items::Bytes(bytes),
        }
    }

    pub(super) fn bits(bound: Bound, bits: &'a Bits) -> Self {
        Self {
            bound,
            items: Items::Bits(bits),
        }
    }

    pub(super) fn values(bound: Bound, values: &'a [Value]) -> Self {
        Self {
            bound,
            items: Items::Values(values),
        }
    }

    /// Current number of elements.
    pub fn len(&self) -> usize {
        match self.items {
            Items::Bytes(b) => b.len(),
            Items::Bits(b) => b.len(),
            Items::Values(v) => v.len(),
        }
    }

    /// Returns `true` if the collection has no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The exact (vector) or maximum (list) length.
    pub fn max_len(&self) -> u64 {
        self.bound.len
    }

    /// Returns `true` for lists.
    pub fn is_list(&self) -> bool {
        self.bound.variable
    }

    /// The element at `index`.
    pub fn get(&self, index: usize) -> Option<Element<'a>> {
        match self.items {
            Items::Bytes(b) => b.get(index).copied().map(Element::Byte),
            Items::Bits(b) => b.get(index).map(|bit| Element::Bit(*bit)),
            Items::Values(v) => v.get(index).map(Element::Value),
        }
    }

    /// Iterates over the elements in order.
    pub fn iter(&self) -> impl Iterator<Item = Element<'a>> + '_ {
        (0..self.len()).filter_map(|i| self.get(i))
    }
}

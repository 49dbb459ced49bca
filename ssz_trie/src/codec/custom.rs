//! Override codecs for named scalar and hash types.
//!
//! An override replaces structural derivation for a [`TypeDescriptor::Named`]
//! reference. The beacon chain uses them for its fixed-width aliases (`Slot`,
//! `Gwei`, ...) and fixed-size byte strings (`Hash32`, `BLSSignature`, ...).
//!
//! [`TypeDescriptor::Named`]: crate::types::TypeDescriptor::Named

use std::fmt::Debug;

use super::{
    basic::{decode_uint, encode_uint},
    CodecError, CodecResult,
};
use crate::value::Value;

/// A hand-written codec for a named type.
///
/// Overrides are fixed-size. A `packed` override behaves like a scalar: it is
/// packed with its neighbours when it is the element of a collection. A
/// non-packed override behaves like a byte vector: its elements contribute
/// their own roots as chunks. In both cases a standalone value hashes to the
/// Merkle root of its packed encoding.
pub trait CustomCodec: Debug + Send + Sync {
    /// The type name, used in descriptions and error messages.
    fn name(&self) -> &str;

    /// Encoded size in bytes.
    fn size(&self) -> usize;

    /// Whether values are packed inside collections.
    fn packed(&self) -> bool;

    /// Checks that `value` has the right variant and size.
    fn validate(&self, value: &Value) -> CodecResult<()>;

    /// Appends the encoding of `value`.
    fn encode(&self, value: &Value, out: &mut Vec<u8>) -> CodecResult<()>;

    /// Decodes exactly [`size`](Self::size) bytes.
    fn decode(&self, bytes: &[u8]) -> CodecResult<Value>;
}

/// A fixed-length byte string, e.g. `Hash32` or `BLSSignature`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FixedBytesCodec {
    name: String,
    len: usize,
}

impl FixedBytesCodec {
    /// Creates a codec for `len`-byte strings.
    pub fn new<N: Into<String>>(name: N, len: usize) -> Self {
        Self {
            name: name.into(),
            len,
        }
    }
}

impl CustomCodec for FixedBytesCodec {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> usize {
        self.len
    }

    fn packed(&self) -> bool {
        false
    }

    fn validate(&self, value: &Value) -> CodecResult<()> {
        match value {
            Value::Bytes(b) if b.len() == self.len => Ok(()),
            Value::Bytes(b) => Err(CodecError::InvalidLength {
                expected: self.len,
                actual: b.len(),
            }),
            _ => Err(CodecError::shape_mismatch(&self.name, value)),
        }
    }

    fn encode(&self, value: &Value, out: &mut Vec<u8>) -> CodecResult<()> {
        self.validate(value)?;
        if let Value::Bytes(b) = value {
            out.extend_from_slice(b);
        }
        Ok(())
    }

    fn decode(&self, bytes: &[u8]) -> CodecResult<Value> {
        match bytes.len() == self.len {
            true => Ok(Value::Bytes(bytes.to_vec())),
            false => Err(CodecError::InvalidLength {
                expected: self.len,
                actual: bytes.len(),
            }),
        }
    }
}

/// A named alias of an unsigned integer, e.g. `Slot` or `Gwei`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UintAliasCodec {
    name: String,
    bits: u16,
}

impl UintAliasCodec {
    /// Creates an alias of `uint{bits}`.
    pub fn new<N: Into<String>>(name: N, bits: u16) -> Self {
        Self {
            name: name.into(),
            bits,
        }
    }
}

impl CustomCodec for UintAliasCodec {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> usize {
        usize::from(self.bits / 8)
    }

    fn packed(&self) -> bool {
        true
    }

    fn validate(&self, value: &Value) -> CodecResult<()> {
        match value {
            Value::Uint(u) if u.bits() == self.bits => Ok(()),
            _ => Err(CodecError::shape_mismatch(&self.name, value)),
        }
    }

    fn encode(&self, value: &Value, out: &mut Vec<u8>) -> CodecResult<()> {
        self.validate(value)?;
        if let Value::Uint(u) = value {
            encode_uint(u, out);
        }
        Ok(())
    }

    fn decode(&self, bytes: &[u8]) -> CodecResult<Value> {
        decode_uint(self.bits, bytes).map(Value::Uint)
    }
}

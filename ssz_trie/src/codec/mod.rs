//! Codecs bound to resolved shapes.
//!
//! A [`Codec`] is produced once per shape by the
//! [`SchemaRegistry`](crate::schema::SchemaRegistry) and shared through an
//! [`Arc`]. It knows how to serialize and deserialize values of its shape and
//! how to turn a value into the chunk sequence that the
//! [`Merkleizer`](crate::merkleize::Merkleizer) consumes.

pub mod basic;
pub mod collection;
pub mod custom;

use std::{iter, sync::Arc};

use beacon_ssz_common::{BYTES_PER_CHUNK, BYTES_PER_LENGTH_OFFSET};
use ethereum_types::H256;
use thiserror::Error;

use self::{
    basic::{
        bits_to_bytes, chunks_for_bytes, decode_bitlist, decode_bitvector, decode_bool,
        decode_uint, encode_bitlist, encode_bitvector, encode_bool, encode_offset, encode_uint,
        pack, read_offset,
    },
    collection::{Bound, CollectionView},
    custom::CustomCodec,
};
use crate::{types::ShapeId, value::Value};

/// An alias for `Result<T, CodecError>`.
pub type CodecResult<T> = Result<T, CodecError>;

/// An error raised while encoding, decoding or validating a value.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum CodecError {
    /// The value variant does not match the shape.
    #[error("expected a value of shape {expected}, found {found}")]
    ShapeMismatch {
        /// The shape the value was checked against.
        expected: String,
        /// The variant that was found.
        found: &'static str,
    },

    /// A list holds more elements than its bound.
    #[error("length {len} exceeds the maximum of {max}")]
    LengthExceeded {
        /// Actual length.
        len: u64,
        /// Maximum length.
        max: u64,
    },

    /// A vector or container does not have its exact number of elements.
    #[error("expected {expected} elements, found {actual}")]
    LengthMismatch {
        /// Required number of elements.
        expected: u64,
        /// Actual number of elements.
        actual: u64,
    },

    /// A fixed-size encoding has the wrong number of bytes.
    #[error("expected {expected} bytes, found {actual}")]
    InvalidLength {
        /// Required byte length.
        expected: usize,
        /// Actual byte length.
        actual: usize,
    },

    /// The input of a fixed-size element collection is not a whole number of
    /// elements.
    #[error("{len} bytes is not a multiple of the element size {element_size}")]
    RaggedLength {
        /// Input length.
        len: usize,
        /// Size of one element.
        element_size: usize,
    },

    /// The input ended early.
    #[error("unexpected end of input: needed {needed} bytes, {available} available")]
    UnexpectedEof {
        /// Bytes needed.
        needed: usize,
        /// Bytes available.
        available: usize,
    },

    /// An offset does not point at the end of the fixed part, goes backwards
    /// or points past the end of the input.
    #[error("invalid offset {0}")]
    InvalidOffset(usize),

    /// Bytes left over after a fixed-size value.
    #[error("{0} trailing bytes")]
    TrailingBytes(usize),

    /// A boolean byte other than `0x00` or `0x01`.
    #[error("invalid boolean byte {0:#04x}")]
    InvalidBool(u8),

    /// A bit-list without its delimiter bit.
    #[error("bit-list is missing its delimiter bit")]
    MissingBitlistDelimiter,

    /// A bit-vector with set padding bits.
    #[error("bit-vector has non-zero padding bits")]
    InvalidBitPadding,

    /// An integer width other than 8, 16, 32, 64, 128 or 256.
    #[error("unsupported integer width {0}")]
    UnsupportedWidth(u16),

    /// A variable-size part starts beyond what a 4-byte offset can address.
    #[error("offset {0} does not fit in 32 bits")]
    OffsetOverflow(usize),

    /// No child exists at the given path of a tracked value.
    #[error("no child at path {0:?}")]
    InvalidPath(Vec<usize>),

    /// A push or pop was attempted on something other than a list.
    #[error("{0} is not a list")]
    NotAList(String),
}

impl CodecError {
    pub(crate) fn shape_mismatch(expected: &str, found: &Value) -> Self {
        Self::ShapeMismatch {
            expected: expected.to_string(),
            found: found.kind(),
        }
    }
}

/// A named field bound to its codec.
#[derive(Debug)]
pub struct FieldCodec {
    /// The field name.
    pub name: String,

    /// The codec of the field shape.
    pub codec: Arc<Codec>,
}

/// A scalar that is packed with its neighbours inside a collection.
#[derive(Clone, Debug)]
pub enum PackedElement {
    /// `bool`.
    Bool,

    /// `uintN`, by bit width.
    Uint(u16),

    /// A packed override, e.g. `Slot`.
    Custom(Arc<dyn CustomCodec>),
}

impl PackedElement {
    /// Encoded size of one element.
    pub fn size(&self) -> usize {
        match self {
            PackedElement::Bool => 1,
            PackedElement::Uint(bits) => usize::from(bits / 8),
            PackedElement::Custom(c) => c.size(),
        }
    }

    fn name(&self) -> String {
        match self {
            PackedElement::Bool => "bool".to_string(),
            PackedElement::Uint(bits) => format!("uint{}", bits),
            PackedElement::Custom(c) => c.name().to_string(),
        }
    }

    fn validate(&self, value: &Value) -> CodecResult<()> {
        match (self, value) {
            (PackedElement::Bool, Value::Bool(_)) => Ok(()),
            (PackedElement::Uint(bits), Value::Uint(u)) if u.bits() == *bits => Ok(()),
            (PackedElement::Custom(c), v) => c.validate(v),
            _ => Err(CodecError::shape_mismatch(&self.name(), value)),
        }
    }

    fn encode(&self, value: &Value, out: &mut Vec<u8>) -> CodecResult<()> {
        match (self, value) {
            (PackedElement::Bool, Value::Bool(b)) => encode_bool(*b, out),
            (PackedElement::Uint(bits), Value::Uint(u)) if u.bits() == *bits => {
                encode_uint(u, out)
            }
            (PackedElement::Custom(c), v) => c.encode(v, out)?,
            _ => return Err(CodecError::shape_mismatch(&self.name(), value)),
        }
        Ok(())
    }

    fn decode(&self, bytes: &[u8]) -> CodecResult<Value> {
        match self {
            PackedElement::Bool => decode_bool(bytes).map(Value::Bool),
            PackedElement::Uint(bits) => decode_uint(*bits, bytes).map(Value::Uint),
            PackedElement::Custom(c) => c.decode(bytes),
        }
    }
}

/// How a shape is encoded and chunked.
#[derive(Debug)]
pub enum CodecKind {
    /// `bool`.
    Bool,

    /// `uintN`.
    Uint {
        /// Bit width.
        bits: u16,
    },

    /// An override codec.
    Custom(Arc<dyn CustomCodec>),

    /// A container. Each field is one chunk: the root of the field.
    Container {
        /// The container name.
        name: String,
        /// The fields in positional order.
        fields: Vec<FieldCodec>,
    },

    /// A byte vector or byte list, stored as [`Value::Bytes`].
    Bytes(Bound),

    /// A bit-vector or bit-list, stored as [`Value::Bits`].
    Bits(Bound),

    /// A collection of packed scalars. Several elements share a chunk.
    Packed {
        /// The element type.
        element: PackedElement,
        /// The length bound.
        bound: Bound,
    },

    /// A collection of composite or non-packed elements. Each element is one
    /// chunk: the root of the element.
    Composite {
        /// The element codec.
        element: Arc<Codec>,
        /// The length bound.
        bound: Bound,
    },
}

/// The chunks of a value, ready to be merkleized.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChunkLayout {
    /// The real chunks. Padding up to `capacity` is left to the merkleizer.
    pub chunks: Vec<H256>,

    /// The leaf count the chunks are padded to: the declared capacity for
    /// containers and vectors, the real chunk count for lists.
    pub capacity: u64,

    /// The length to mix into the root, for lists.
    pub mix_in: Option<u64>,
}

/// The codec of one resolved shape.
#[derive(Debug)]
pub struct Codec {
    shape: ShapeId,
    description: String,
    kind: CodecKind,
    fixed_size: Option<usize>,
}

impl Codec {
    /// Returns `None` if the fixed size of the shape does not fit in a
    /// `usize`.
    pub(crate) fn new(shape: ShapeId, description: String, kind: CodecKind) -> Option<Self> {
        let fixed_size = match &kind {
            CodecKind::Bool => Some(1),
            CodecKind::Uint { bits } => Some(usize::from(bits / 8)),
            CodecKind::Custom(c) => Some(c.size()),
            CodecKind::Container { fields, .. } => {
                let mut total = Some(0usize);
                for field in fields {
                    total = match (total, field.codec.fixed_size) {
                        (Some(t), Some(s)) => Some(t.checked_add(s)?),
                        _ => None,
                    };
                }
                total
            }
            CodecKind::Bytes(bound) => fixed_len(bound, 1)?,
            CodecKind::Bits(bound) => match bound.variable {
                true => None,
                false => Some(usize::try_from(bound.len.div_ceil(8)).ok()?),
            },
            CodecKind::Packed { element, bound } => fixed_len(bound, element.size())?,
            CodecKind::Composite { element, bound } => match element.fixed_size {
                Some(size) => fixed_len(bound, size)?,
                None => None,
            },
        };

        Some(Self {
            shape,
            description,
            kind,
            fixed_size,
        })
    }

    /// The structural id of the shape.
    pub fn shape(&self) -> ShapeId {
        self.shape
    }

    /// The canonical text of the shape.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// How the shape is encoded.
    pub fn kind(&self) -> &CodecKind {
        &self.kind
    }

    /// The encoded size, if every value of the shape has the same size.
    pub fn fixed_size(&self) -> Option<usize> {
        self.fixed_size
    }

    /// The length bound, for collections.
    pub fn bound(&self) -> Option<Bound> {
        match &self.kind {
            CodecKind::Bytes(b) | CodecKind::Bits(b) => Some(*b),
            CodecKind::Packed { bound, .. } | CodecKind::Composite { bound, .. } => Some(*bound),
            _ => None,
        }
    }

    /// Returns `true` for containers.
    pub fn is_container(&self) -> bool {
        matches!(self.kind, CodecKind::Container { .. })
    }

    /// Returns `true` for shapes whose values are [`Value::Composite`] and
    /// therefore carry an update tracker when tracked.
    pub fn is_composite(&self) -> bool {
        matches!(
            self.kind,
            CodecKind::Container { .. } | CodecKind::Packed { .. } | CodecKind::Composite { .. }
        )
    }

    /// The position of the container field called `name`.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        match &self.kind {
            CodecKind::Container { fields, .. } => fields.iter().position(|f| f.name == name),
            _ => None,
        }
    }

    /// The codec of child `index`, if that child has one.
    ///
    /// Packed elements have no codec of their own and give `None`.
    pub fn child(&self, index: usize) -> Option<&Arc<Codec>> {
        match &self.kind {
            CodecKind::Container { fields, .. } => fields.get(index).map(|f| &f.codec),
            CodecKind::Composite { element, .. } => Some(element),
            _ => None,
        }
    }

    /// Checks that `value` may be stored as child `index` of a value of this
    /// shape.
    pub fn validate_child(&self, index: usize, value: &Value) -> CodecResult<()> {
        match &self.kind {
            CodecKind::Container { fields, .. } => fields
                .get(index)
                .ok_or_else(|| CodecError::InvalidPath(vec![index]))?
                .codec
                .validate(value),
            CodecKind::Composite { element, .. } => element.validate(value),
            CodecKind::Packed { element, .. } => element.validate(value),
            _ => Err(CodecError::InvalidPath(vec![index])),
        }
    }

    /// Views a collection value.
    pub fn collection<'a>(&self, value: &'a Value) -> CodecResult<CollectionView<'a>> {
        match (&self.kind, value) {
            (CodecKind::Bytes(bound), Value::Bytes(b)) => Ok(CollectionView::bytes(*bound, b)),
            (CodecKind::Bits(bound), Value::Bits(b)) => Ok(CollectionView::bits(*bound, b)),
            (
                CodecKind::Packed { bound, .. } | CodecKind::Composite { bound, .. },
                Value::Composite(c),
            ) => Ok(CollectionView::values(*bound, c.children())),
            _ => Err(CodecError::shape_mismatch(&self.description, value)),
        }
    }

    /// Checks `value` against the shape, recursively.
    pub fn validate(&self, value: &Value) -> CodecResult<()> {
        match (&self.kind, value) {
            (CodecKind::Bool, Value::Bool(_)) => Ok(()),
            (CodecKind::Uint { bits }, Value::Uint(u)) if u.bits() == *bits => Ok(()),
            (CodecKind::Custom(c), v) => c.validate(v),
            (CodecKind::Container { fields, .. }, Value::Composite(c)) => {
                expect_fields(fields.len(), c.len())?;
                fields
                    .iter()
                    .zip(c.children())
                    .try_for_each(|(f, v)| f.codec.validate(v))
            }
            (CodecKind::Bytes(bound), Value::Bytes(b)) => bound.check(b.len()),
            (CodecKind::Bits(bound), Value::Bits(b)) => bound.check(b.len()),
            (CodecKind::Packed { element, bound }, Value::Composite(c)) => {
                bound.check(c.len())?;
                c.children().iter().try_for_each(|v| element.validate(v))
            }
            (CodecKind::Composite { element, bound }, Value::Composite(c)) => {
                bound.check(c.len())?;
                c.children().iter().try_for_each(|v| element.validate(v))
            }
            _ => Err(CodecError::shape_mismatch(&self.description, value)),
        }
    }

    /// Serializes `value`.
    pub fn serialize(&self, value: &Value) -> CodecResult<Vec<u8>> {
        let mut out = Vec::with_capacity(self.fixed_size.unwrap_or_default());
        self.encode(value, &mut out)?;
        Ok(out)
    }

    /// Appends the serialization of `value` to `out`, checking the value
    /// against the shape along the way.
    pub fn encode(&self, value: &Value, out: &mut Vec<u8>) -> CodecResult<()> {
        match (&self.kind, value) {
            (CodecKind::Bool, Value::Bool(b)) => encode_bool(*b, out),
            (CodecKind::Uint { bits }, Value::Uint(u)) if u.bits() == *bits => {
                encode_uint(u, out)
            }
            (CodecKind::Custom(c), v) => c.encode(v, out)?,
            (CodecKind::Container { fields, .. }, Value::Composite(c)) => {
                expect_fields(fields.len(), c.len())?;
                encode_parts(
                    fields.iter().map(|f| f.codec.as_ref()).zip(c.children()),
                    out,
                )?;
            }
            (CodecKind::Bytes(bound), Value::Bytes(b)) => {
                bound.check(b.len())?;
                out.extend_from_slice(b);
            }
            (CodecKind::Bits(bound), Value::Bits(bits)) => {
                bound.check(bits.len())?;
                match bound.variable {
                    true => encode_bitlist(bits, out),
                    false => encode_bitvector(bits, out),
                }
            }
            (CodecKind::Packed { element, bound }, Value::Composite(c)) => {
                bound.check(c.len())?;
                for v in c.children() {
                    element.encode(v, out)?;
                }
            }
            (CodecKind::Composite { element, bound }, Value::Composite(c)) => {
                bound.check(c.len())?;
                encode_parts(iter::repeat(element.as_ref()).zip(c.children()), out)?;
            }
            _ => return Err(CodecError::shape_mismatch(&self.description, value)),
        }
        Ok(())
    }

    /// Deserializes a value that spans all of `bytes`.
    pub fn decode(&self, bytes: &[u8]) -> CodecResult<Value> {
        let value = match &self.kind {
            CodecKind::Bool => Value::Bool(decode_bool(bytes)?),
            CodecKind::Uint { bits } => Value::Uint(decode_uint(*bits, bytes)?),
            CodecKind::Custom(c) => c.decode(bytes)?,
            CodecKind::Container { fields, .. } => {
                let codecs: Vec<&Codec> = fields.iter().map(|f| f.codec.as_ref()).collect();
                Value::composite(decode_parts(&codecs, bytes)?)
            }
            CodecKind::Bytes(bound) => {
                bound.check(bytes.len())?;
                Value::Bytes(bytes.to_vec())
            }
            CodecKind::Bits(bound) => match bound.variable {
                true => Value::Bits(decode_bitlist(bytes, bound.len)?),
                false => Value::Bits(decode_bitvector(bytes, bound.len)?),
            },
            CodecKind::Packed { element, bound } => {
                let size = element.size();
                let count = element_count(bytes.len(), size)?;
                bound.check(count)?;
                Value::composite(
                    bytes
                        .chunks(size)
                        .map(|b| element.decode(b))
                        .collect::<CodecResult<_>>()?,
                )
            }
            CodecKind::Composite { element, bound } => {
                let children = match element.fixed_size {
                    Some(size) => {
                        bound.check(element_count(bytes.len(), size)?)?;
                        bytes
                            .chunks(size)
                            .map(|b| element.decode(b))
                            .collect::<CodecResult<_>>()?
                    }
                    None if bytes.is_empty() => {
                        bound.check(0)?;
                        Vec::new()
                    }
                    None => {
                        let first = read_offset(bytes, 0)?;
                        // The first offset fixes the element count, so it
                        // must lie inside the input before anything is sized
                        // from it.
                        if first == 0
                            || first % BYTES_PER_LENGTH_OFFSET != 0
                            || first > bytes.len()
                        {
                            return Err(CodecError::InvalidOffset(first));
                        }
                        let count = first / BYTES_PER_LENGTH_OFFSET;
                        bound.check(count)?;
                        decode_parts(&vec![element.as_ref(); count], bytes)?
                    }
                };
                Value::composite(children)
            }
        };

        Ok(value)
    }

    /// The chunk capacity of the shape: the number of leaves its bound
    /// allows before padding to a power of two.
    pub fn chunk_capacity(&self) -> u64 {
        match &self.kind {
            CodecKind::Bool | CodecKind::Uint { .. } => 1,
            CodecKind::Custom(c) => chunks_for_bytes(c.size() as u64),
            CodecKind::Container { fields, .. } => fields.len() as u64,
            CodecKind::Bytes(bound) => chunks_for_bytes(bound.len),
            CodecKind::Bits(bound) => bound.len.div_ceil(8 * BYTES_PER_CHUNK as u64),
            CodecKind::Packed { element, bound } => {
                let bytes = u128::from(bound.len) * element.size() as u128;
                u64::try_from(bytes.div_ceil(BYTES_PER_CHUNK as u128)).unwrap_or(u64::MAX)
            }
            CodecKind::Composite { bound, .. } => bound.len,
        }
    }

    /// The leaf count a value with `chunk_count` real chunks is padded to.
    ///
    /// Lists are padded to their real chunk count, so the unused part of the
    /// bound never changes the root. Every other shape uses its
    /// [`chunk_capacity`](Self::chunk_capacity).
    pub fn merkle_capacity(&self, chunk_count: usize) -> u64 {
        match self.bound() {
            Some(bound) if bound.variable => chunk_count as u64,
            _ => self.chunk_capacity(),
        }
    }

    /// The length mixed into the root of `value`, for lists.
    pub fn mix_in(&self, value: &Value) -> Option<u64> {
        match (&self.kind, value) {
            (CodecKind::Bytes(bound), Value::Bytes(b)) => bound.mix_in(b.len()),
            (CodecKind::Bits(bound), Value::Bits(b)) => bound.mix_in(b.len()),
            (
                CodecKind::Packed { bound, .. } | CodecKind::Composite { bound, .. },
                Value::Composite(c),
            ) => bound.mix_in(c.len()),
            _ => None,
        }
    }

    /// Produces the chunks of `value`.
    ///
    /// Containers and composite collections contribute one chunk per child,
    /// obtained from `child_root(index, child codec, child value)`. Every
    /// other shape is chunked from its packed serialization.
    pub fn chunks<E, F>(&self, value: &Value, mut child_root: F) -> Result<ChunkLayout, E>
    where
        E: From<CodecError>,
        F: FnMut(usize, &Codec, &Value) -> Result<H256, E>,
    {
        let chunks: Vec<H256> = match (&self.kind, value) {
            (CodecKind::Container { fields, .. }, Value::Composite(c)) => {
                expect_fields(fields.len(), c.len())?;
                fields
                    .iter()
                    .zip(c.children())
                    .enumerate()
                    .map(|(i, (f, v))| child_root(i, f.codec.as_ref(), v))
                    .collect::<Result<_, E>>()?
            }
            (CodecKind::Composite { element, bound }, Value::Composite(c)) => {
                bound.check(c.len())?;
                c.children()
                    .iter()
                    .enumerate()
                    .map(|(i, v)| child_root(i, element.as_ref(), v))
                    .collect::<Result<_, E>>()?
            }
            (CodecKind::Bits(bound), Value::Bits(bits)) => {
                bound.check(bits.len())?;
                pack(&bits_to_bytes(bits, bits.len().div_ceil(8)))
            }
            _ => pack(&self.serialize(value)?),
        };

        Ok(ChunkLayout {
            capacity: self.merkle_capacity(chunks.len()),
            chunks,
            mix_in: self.mix_in(value),
        })
    }

    /// Number of real chunks of a composite value.
    pub fn chunk_count(&self, value: &Value) -> CodecResult<usize> {
        match (&self.kind, value) {
            (CodecKind::Container { fields, .. }, Value::Composite(_)) => Ok(fields.len()),
            (CodecKind::Composite { .. }, Value::Composite(c)) => Ok(c.len()),
            (CodecKind::Packed { element, .. }, Value::Composite(c)) => {
                Ok((c.len() * element.size()).div_ceil(BYTES_PER_CHUNK))
            }
            _ => Err(CodecError::shape_mismatch(&self.description, value)),
        }
    }

    /// The chunk that holds child `index` of a composite value.
    pub fn chunk_index_of(&self, index: usize) -> usize {
        match &self.kind {
            CodecKind::Packed { element, .. } => index * element.size() / BYTES_PER_CHUNK,
            _ => index,
        }
    }

    /// Chunk `index` of a packed collection, re-packed from the elements that
    /// share it.
    pub fn packed_chunk(&self, value: &Value, index: usize) -> CodecResult<H256> {
        let (CodecKind::Packed { element, .. }, Value::Composite(c)) = (&self.kind, value) else {
            return Err(CodecError::shape_mismatch(&self.description, value));
        };

        let per_chunk = BYTES_PER_CHUNK / element.size();
        let start = index * per_chunk;
        let end = (start + per_chunk).min(c.len());
        let mut bytes = Vec::with_capacity(BYTES_PER_CHUNK);
        for v in c.children().get(start..end).unwrap_or_default() {
            element.encode(v, &mut bytes)?;
        }

        Ok(basic::pad_chunk(&bytes))
    }
}

fn fixed_len(bound: &Bound, element_size: usize) -> Option<Option<usize>> {
    match bound.variable {
        true => Some(None),
        false => usize::try_from(bound.len)
            .ok()?
            .checked_mul(element_size)
            .map(Some),
    }
}

fn expect_fields(expected: usize, actual: usize) -> CodecResult<()> {
    match expected == actual {
        true => Ok(()),
        false => Err(CodecError::LengthMismatch {
            expected: expected as u64,
            actual: actual as u64,
        }),
    }
}

fn element_count(len: usize, element_size: usize) -> CodecResult<usize> {
    match element_size != 0 && len % element_size == 0 {
        true => Ok(len / element_size),
        false => Err(CodecError::RaggedLength { len, element_size }),
    }
}

/// Writes the fixed parts in order, with offsets standing in for the
/// variable parts, then the variable parts themselves.
fn encode_parts<'a, I>(parts: I, out: &mut Vec<u8>) -> CodecResult<()>
where
    I: Iterator<Item = (&'a Codec, &'a Value)> + Clone,
{
    let fixed_len: usize = parts
        .clone()
        .map(|(c, _)| c.fixed_size.unwrap_or(BYTES_PER_LENGTH_OFFSET))
        .sum();

    let mut variable = Vec::new();
    for (codec, value) in parts {
        match codec.fixed_size {
            Some(_) => codec.encode(value, out)?,
            None => {
                encode_offset(fixed_len + variable.len(), out)?;
                codec.encode(value, &mut variable)?;
            }
        }
    }

    out.extend_from_slice(&variable);
    Ok(())
}

fn decode_parts(codecs: &[&Codec], bytes: &[u8]) -> CodecResult<Vec<Value>> {
    let fixed_len: usize = codecs
        .iter()
        .map(|c| c.fixed_size.unwrap_or(BYTES_PER_LENGTH_OFFSET))
        .sum();
    if bytes.len() < fixed_len {
        return Err(CodecError::UnexpectedEof {
            needed: fixed_len,
            available: bytes.len(),
        });
    }

    let mut values = Vec::with_capacity(codecs.len());
    let mut offsets: Vec<(usize, usize)> = Vec::new();
    let mut pos = 0;
    for codec in codecs {
        match codec.fixed_size {
            Some(size) => {
                values.push(Some(codec.decode(&bytes[pos..pos + size])?));
                pos += size;
            }
            None => {
                let offset = read_offset(bytes, pos)?;
                let floor = offsets.last().map_or(fixed_len, |&(_, prev)| prev);
                let first_misplaced = offsets.is_empty() && offset != fixed_len;
                if first_misplaced || offset < floor || offset > bytes.len() {
                    return Err(CodecError::InvalidOffset(offset));
                }
                offsets.push((values.len(), offset));
                values.push(None);
                pos += BYTES_PER_LENGTH_OFFSET;
            }
        }
    }

    if offsets.is_empty() && bytes.len() > fixed_len {
        return Err(CodecError::TrailingBytes(bytes.len() - fixed_len));
    }

    for (n, &(slot, start)) in offsets.iter().enumerate() {
        let end = offsets.get(n + 1).map_or(bytes.len(), |&(_, next)| next);
        values[slot] = Some(codecs[slot].decode(&bytes[start..end])?);
    }

    Ok(values.into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;

    use super::*;
    use crate::{
        schema::SchemaRegistry,
        types::{ContainerDescriptor, TypeDescriptor},
    };

    fn resolve(ty: &TypeDescriptor) -> Arc<Codec> {
        SchemaRegistry::builder()
            .with_beacon_overrides()
            .build()
            .unwrap()
            .resolve(ty)
            .unwrap()
    }

    fn mixed() -> TypeDescriptor {
        ContainerDescriptor::new("Mixed")
            .field("a", TypeDescriptor::uint(16))
            .field("b", TypeDescriptor::byte_list(10))
            .field("c", TypeDescriptor::uint8())
            .into()
    }

    fn mixed_value() -> Value {
        Value::composite(vec![
            0x0102u16.into(),
            vec![7u8, 8, 9].into(),
            5u8.into(),
        ])
    }

    #[test]
    fn variable_fields_are_placed_after_offsets() {
        let codec = resolve(&mixed());
        assert_eq!(codec.fixed_size(), None);

        let bytes = codec.serialize(&mixed_value()).unwrap();
        assert_eq!(bytes, hex!("0201 07000000 05 070809"));
        assert_eq!(codec.decode(&bytes).unwrap(), mixed_value());
    }

    #[test]
    fn fixed_containers_have_a_fixed_size() {
        let codec = resolve(
            &ContainerDescriptor::new("Pair")
                .field("epoch", TypeDescriptor::named("Epoch"))
                .field("root", TypeDescriptor::named("Hash32"))
                .into(),
        );
        assert_eq!(codec.fixed_size(), Some(40));
        assert_eq!(resolve(&TypeDescriptor::bitvector(10)).fixed_size(), Some(2));
    }

    #[test]
    fn list_of_variable_elements_round_trips() {
        let codec = resolve(&TypeDescriptor::list(TypeDescriptor::byte_list(4), 3));
        let value = Value::composite(vec![
            vec![1u8].into(),
            Vec::<u8>::new().into(),
            vec![2u8, 3].into(),
        ]);

        let bytes = codec.serialize(&value).unwrap();
        assert_eq!(bytes, hex!("0c000000 0d000000 0d000000 01 0203"));
        assert_eq!(codec.decode(&bytes).unwrap(), value);
        assert_eq!(codec.decode(&[]).unwrap(), Value::composite(vec![]));
    }

    #[test]
    fn decoding_rejects_malformed_offsets() {
        let codec = resolve(&mixed());

        let mut bad_first = hex!("0201 08000000 05 070809").to_vec();
        assert!(matches!(
            codec.decode(&bad_first),
            Err(CodecError::InvalidOffset(8))
        ));

        bad_first.truncate(5);
        assert!(matches!(
            codec.decode(&bad_first),
            Err(CodecError::UnexpectedEof { .. })
        ));

        let nested = resolve(&TypeDescriptor::list(TypeDescriptor::byte_list(4), 3));
        assert!(matches!(
            nested.decode(&hex!("08000000 07000000")),
            Err(CodecError::InvalidOffset(7))
        ));
        assert!(matches!(
            nested.decode(&hex!("03000000")),
            Err(CodecError::InvalidOffset(3))
        ));
    }

    #[test]
    fn element_count_offset_beyond_the_input_is_rejected() {
        let huge = resolve(&TypeDescriptor::list(TypeDescriptor::byte_list(4), 1 << 40));
        assert!(matches!(
            huge.decode(&hex!("fcffffff")),
            Err(CodecError::InvalidOffset(0xffff_fffc))
        ));
        assert!(matches!(
            huge.decode(&hex!("0c000000 0c000000")),
            Err(CodecError::InvalidOffset(12))
        ));
        assert_eq!(
            huge.decode(&hex!("08000000 08000000")).unwrap(),
            Value::composite(vec![Vec::<u8>::new().into(), Vec::<u8>::new().into()])
        );
    }

    #[test]
    fn decoding_rejects_trailing_bytes_and_bad_lengths() {
        let pair = resolve(
            &ContainerDescriptor::new("Flags")
                .field("a", TypeDescriptor::boolean())
                .field("b", TypeDescriptor::boolean())
                .into(),
        );
        assert!(matches!(
            pair.decode(&[1, 0, 0]),
            Err(CodecError::TrailingBytes(1))
        ));

        let list = resolve(&TypeDescriptor::list(TypeDescriptor::uint64(), 2));
        assert!(matches!(
            list.decode(&[0; 12]),
            Err(CodecError::RaggedLength { .. })
        ));
        assert!(matches!(
            list.decode(&[0; 24]),
            Err(CodecError::LengthExceeded { len: 3, max: 2 })
        ));
    }

    #[test]
    fn encoding_checks_bounds_and_shapes() {
        let list = resolve(&TypeDescriptor::list(TypeDescriptor::uint64(), 2));
        let three = Value::composite(vec![1u64.into(), 2u64.into(), 3u64.into()]);
        assert!(matches!(
            list.serialize(&three),
            Err(CodecError::LengthExceeded { len: 3, max: 2 })
        ));
        assert!(matches!(
            list.serialize(&Value::composite(vec![1u32.into()])),
            Err(CodecError::ShapeMismatch { .. })
        ));

        let vector = resolve(&TypeDescriptor::bytes_vector(4));
        assert!(matches!(
            vector.serialize(&vec![1u8, 2].into()),
            Err(CodecError::LengthMismatch {
                expected: 4,
                actual: 2
            })
        ));
    }

    #[test]
    fn chunk_capacities_follow_the_shape() {
        assert_eq!(resolve(&TypeDescriptor::uint256()).chunk_capacity(), 1);
        assert_eq!(resolve(&TypeDescriptor::byte_list(33)).chunk_capacity(), 2);
        assert_eq!(resolve(&TypeDescriptor::bitlist(2048)).chunk_capacity(), 8);
        assert_eq!(
            resolve(&TypeDescriptor::list(TypeDescriptor::uint64(), 10)).chunk_capacity(),
            3
        );
        assert_eq!(
            resolve(&TypeDescriptor::vector(TypeDescriptor::named("Hash32"), 64)).chunk_capacity(),
            64
        );
        assert_eq!(resolve(&TypeDescriptor::named("BLSSignature")).chunk_capacity(), 3);
        assert_eq!(resolve(&mixed()).chunk_capacity(), 3);
    }

    #[test]
    fn lists_pad_to_their_real_chunk_count() {
        let short = resolve(&TypeDescriptor::list(TypeDescriptor::uint64(), 4));
        let long = resolve(&TypeDescriptor::list(TypeDescriptor::uint64(), 64));
        let value = Value::composite((1..=4u64).map(Value::from).collect());

        let layout = long
            .chunks::<CodecError, _>(&value, |_, _, _| unreachable!())
            .unwrap();
        assert_eq!(layout.capacity, 1);
        assert_eq!(long.merkle_capacity(5), 5);
        assert_eq!(short.merkle_capacity(1), 1);

        let vector = resolve(&TypeDescriptor::vector(TypeDescriptor::named("Hash32"), 64));
        assert_eq!(vector.merkle_capacity(64), 64);
        assert_eq!(resolve(&mixed()).merkle_capacity(3), 3);
    }

    #[test]
    fn packed_chunks_hold_neighbouring_elements() {
        let codec = resolve(&TypeDescriptor::list(TypeDescriptor::uint64(), 16));
        let value = Value::composite((0..6u64).map(Value::from).collect());

        assert_eq!(codec.chunk_count(&value).unwrap(), 2);
        assert_eq!(codec.chunk_index_of(3), 0);
        assert_eq!(codec.chunk_index_of(4), 1);

        let mut expected = [0u8; 32];
        expected[..8].copy_from_slice(&4u64.to_le_bytes());
        expected[8..16].copy_from_slice(&5u64.to_le_bytes());
        assert_eq!(codec.packed_chunk(&value, 1).unwrap(), H256(expected));

        let layout = codec
            .chunks::<CodecError, _>(&value, |_, _, _| unreachable!())
            .unwrap();
        assert_eq!(layout.chunks[1], H256(expected));
        assert_eq!(layout.mix_in, Some(6));
    }

    #[test]
    fn bit_collections_chunk_without_delimiter() {
        let codec = resolve(&TypeDescriptor::bitlist(16));
        let value = Value::bits([true, false, true]);

        assert_eq!(codec.serialize(&value).unwrap(), vec![0b0000_1101]);
        let layout = codec
            .chunks::<CodecError, _>(&value, |_, _, _| unreachable!())
            .unwrap();
        assert_eq!(layout.chunks, vec![basic::pad_chunk(&[0b0000_0101])]);
        assert_eq!(layout.mix_in, Some(3));
    }

    #[test]
    fn collection_view_exposes_bounds() {
        let codec = resolve(&TypeDescriptor::byte_list(10));
        let value = Value::from(vec![4u8, 5]);
        let view = codec.collection(&value).unwrap();

        assert_eq!(view.len(), 2);
        assert_eq!(view.max_len(), 10);
        assert!(view.is_list());
        assert!(codec.collection(&Value::Bool(true)).is_err());
    }
}

//! Shape descriptors for SSZ values.
//!
//! A [`TypeDescriptor`] says nothing about how a shape is encoded; it only
//! describes the structure. The [`SchemaRegistry`](crate::schema::SchemaRegistry)
//! turns descriptors into [`Codec`](crate::codec::Codec)s.

use std::fmt::{self, Display};

use ethereum_types::H256;
use keccak_hash::keccak;

/// The scalar shapes.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum BasicType {
    /// A single-byte boolean.
    Bool,

    /// An unsigned little-endian integer with the given bit width.
    Uint(u16),

    /// A single bit. Only valid as the element of a collection, which then
    /// becomes a bit-vector or bit-list.
    Bit,
}

impl Display for BasicType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BasicType::Bool => write!(f, "bool"),
            BasicType::Uint(bits) => write!(f, "uint{}", bits),
            BasicType::Bit => write!(f, "bit"),
        }
    }
}

/// A named field of a container.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct FieldDescriptor {
    /// The field name.
    pub name: String,

    /// The field shape.
    pub ty: TypeDescriptor,
}

/// An ordered list of named fields.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct ContainerDescriptor {
    name: String,
    fields: Vec<FieldDescriptor>,
}

impl ContainerDescriptor {
    /// Starts a container with no fields.
    pub fn new<N: Into<String>>(name: N) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Appends a field. Fields are positional: the order of calls is the
    /// order of the fields in both the byte layout and the Merkle tree.
    pub fn field<N: Into<String>>(mut self, name: N, ty: TypeDescriptor) -> Self {
        self.fields.push(FieldDescriptor {
            name: name.into(),
            ty,
        });
        self
    }

    /// The container name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The fields in declaration order.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }
}

/// A homogeneous collection.
///
/// `max_len` is the exact length for vectors and the upper bound for lists.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct CollectionDescriptor {
    /// The element shape.
    pub element: Box<TypeDescriptor>,

    /// Exact length (vectors) or maximum length (lists).
    pub max_len: u64,

    /// `true` for lists, `false` for vectors.
    pub variable: bool,
}

/// The structural description of an SSZ shape.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum TypeDescriptor {
    /// A scalar.
    Basic(BasicType),

    /// A container declared inline.
    Container(ContainerDescriptor),

    /// A vector or list.
    Collection(CollectionDescriptor),

    /// A reference to a registered container or to an override codec.
    Named(String),
}

impl TypeDescriptor {
    /// `bool`.
    pub const fn boolean() -> Self {
        Self::Basic(BasicType::Bool)
    }

    /// `uintN`.
    pub const fn uint(bits: u16) -> Self {
        Self::Basic(BasicType::Uint(bits))
    }

    /// `uint8`.
    pub const fn uint8() -> Self {
        Self::uint(8)
    }

    /// `uint64`.
    pub const fn uint64() -> Self {
        Self::uint(64)
    }

    /// `uint256`.
    pub const fn uint256() -> Self {
        Self::uint(256)
    }

    /// `Vector[element, len]`.
    pub fn vector(element: TypeDescriptor, len: u64) -> Self {
        Self::Collection(CollectionDescriptor {
            element: Box::new(element),
            max_len: len,
            variable: false,
        })
    }

    /// `List[element, max_len]`.
    pub fn list(element: TypeDescriptor, max_len: u64) -> Self {
        Self::Collection(CollectionDescriptor {
            element: Box::new(element),
            max_len,
            variable: true,
        })
    }

    /// `Vector[uint8, len]`.
    pub fn bytes_vector(len: u64) -> Self {
        Self::vector(Self::uint8(), len)
    }

    /// `List[uint8, max_len]`.
    pub fn byte_list(max_len: u64) -> Self {
        Self::list(Self::uint8(), max_len)
    }

    /// `Bitvector[len]`.
    pub fn bitvector(len: u64) -> Self {
        Self::vector(Self::Basic(BasicType::Bit), len)
    }

    /// `Bitlist[max_len]`.
    pub fn bitlist(max_len: u64) -> Self {
        Self::list(Self::Basic(BasicType::Bit), max_len)
    }

    /// A reference to a registered type.
    pub fn named<N: Into<String>>(name: N) -> Self {
        Self::Named(name.into())
    }

    /// The stable structural identifier of this shape.
    pub fn shape_id(&self) -> ShapeId {
        let mut text = String::new();
        self.write_canonical(&mut text);
        ShapeId(keccak(text.as_bytes()))
    }

    /// Like the [`Display`] form, but every name is length-prefixed, so no
    /// choice of names can make two different shapes collide.
    fn write_canonical(&self, out: &mut String) {
        match self {
            TypeDescriptor::Basic(b) => out.push_str(&b.to_string()),
            TypeDescriptor::Container(c) => {
                out.push_str("container ");
                write_name(&c.name, out);
                out.push('(');
                for field in &c.fields {
                    write_name(&field.name, out);
                    field.ty.write_canonical(out);
                }
                out.push(')');
            }
            TypeDescriptor::Collection(c) => {
                out.push_str(if c.variable { "list<" } else { "vector<" });
                c.element.write_canonical(out);
                out.push_str(&format!(",{}>", c.max_len));
            }
            TypeDescriptor::Named(name) => {
                out.push_str("ref ");
                write_name(name, out);
            }
        }
    }
}

fn write_name(name: &str, out: &mut String) {
    out.push_str(&format!("{}#{}", name.len(), name));
}

impl From<ContainerDescriptor> for TypeDescriptor {
    fn from(v: ContainerDescriptor) -> Self {
        Self::Container(v)
    }
}

/// A readable textual form, used in error messages.
impl Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDescriptor::Basic(b) => write!(f, "{}", b),
            TypeDescriptor::Container(c) => {
                write!(f, "container {}(", c.name)?;
                for (i, field) in c.fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}:{}", field.name, field.ty)?;
                }
                write!(f, ")")
            }
            TypeDescriptor::Collection(c) => match c.variable {
                true => write!(f, "list<{},{}>", c.element, c.max_len),
                false => write!(f, "vector<{},{}>", c.element, c.max_len),
            },
            TypeDescriptor::Named(name) => write!(f, "ref {}", name),
        }
    }
}

/// Stable identifier of a shape: the Keccak-256 of its canonical text, in
/// which every name is length-prefixed.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ShapeId(pub H256);

impl Display for ShapeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(&self.0.as_bytes()[..8]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkpoint() -> ContainerDescriptor {
        ContainerDescriptor::new("Checkpoint")
            .field("epoch", TypeDescriptor::uint64())
            .field("root", TypeDescriptor::bytes_vector(32))
    }

    #[test]
    fn canonical_text_is_structural() {
        assert_eq!(
            TypeDescriptor::from(checkpoint()).to_string(),
            "container Checkpoint(epoch:uint64,root:vector<uint8,32>)"
        );
        assert_eq!(TypeDescriptor::bitlist(2048).to_string(), "list<bit,2048>");
    }

    #[test]
    fn shape_id_is_stable_across_instances() {
        let a = TypeDescriptor::from(checkpoint());
        let b = TypeDescriptor::from(checkpoint());
        assert_eq!(a.shape_id(), b.shape_id());
    }

    #[test]
    fn shape_id_distinguishes_bounds_and_kinds() {
        let list = TypeDescriptor::list(TypeDescriptor::uint64(), 16);
        let longer = TypeDescriptor::list(TypeDescriptor::uint64(), 32);
        let vector = TypeDescriptor::vector(TypeDescriptor::uint64(), 16);

        assert_ne!(list.shape_id(), longer.shape_id());
        assert_ne!(list.shape_id(), vector.shape_id());
    }

    #[test]
    fn punctuation_in_names_cannot_forge_a_shape() {
        let two_fields: TypeDescriptor = ContainerDescriptor::new("A")
            .field("a", TypeDescriptor::uint8())
            .field("b", TypeDescriptor::uint8())
            .into();
        let one_field: TypeDescriptor = ContainerDescriptor::new("A")
            .field("a:uint8,b", TypeDescriptor::uint8())
            .into();

        assert_eq!(two_fields.to_string(), one_field.to_string());
        assert_ne!(two_fields.shape_id(), one_field.shape_id());

        let named = TypeDescriptor::named("x");
        let container: TypeDescriptor = ContainerDescriptor::new("x")
            .field("a", TypeDescriptor::boolean())
            .into();
        assert_ne!(named.shape_id(), container.shape_id());
    }
}

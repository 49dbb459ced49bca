//! Little-endian encodings of scalars, plus chunk packing.

use beacon_ssz_common::{BYTES_PER_CHUNK, BYTES_PER_LENGTH_OFFSET};
use ethereum_types::{H256, U256};

use super::{CodecError, CodecResult};
use crate::value::{Bits, Uint};

/// Bit widths accepted for `uintN`.
pub const SUPPORTED_UINT_WIDTHS: [u16; 6] = [8, 16, 32, 64, 128, 256];

/// Returns `true` if `bits` is a supported integer width.
pub fn is_supported_uint_width(bits: u16) -> bool {
    SUPPORTED_UINT_WIDTHS.contains(&bits)
}

/// Appends the encoding of a boolean.
pub fn encode_bool(v: bool, out: &mut Vec<u8>) {
    out.push(v as u8);
}

/// Decodes a boolean. Only `0x00` and `0x01` are valid.
pub fn decode_bool(bytes: &[u8]) -> CodecResult<bool> {
    match bytes {
        [0] => Ok(false),
        [1] => Ok(true),
        [b] => Err(CodecError::InvalidBool(*b)),
        _ => Err(CodecError::InvalidLength {
            expected: 1,
            actual: bytes.len(),
        }),
    }
}

/// Appends the little-endian encoding of an integer.
pub fn encode_uint(v: &Uint, out: &mut Vec<u8>) {
    match v {
        Uint::U8(v) => out.push(*v),
        Uint::U16(v) => out.extend_from_slice(&v.to_le_bytes()),
        Uint::U32(v) => out.extend_from_slice(&v.to_le_bytes()),
        Uint::U64(v) => out.extend_from_slice(&v.to_le_bytes()),
        Uint::U128(v) => out.extend_from_slice(&v.to_le_bytes()),
        Uint::U256(v) => {
            let mut buf = [0; 32];
            v.to_little_endian(&mut buf);
            out.extend_from_slice(&buf);
        }
    }
}

/// Decodes a little-endian integer of the given width. `bytes` must be
/// exactly `bits / 8` long.
pub fn decode_uint(bits: u16, bytes: &[u8]) -> CodecResult<Uint> {
    let expected = usize::from(bits / 8);
    if bytes.len() != expected {
        return Err(CodecError::InvalidLength {
            expected,
            actual: bytes.len(),
        });
    }

    let res = match bits {
        8 => Uint::U8(bytes[0]),
        16 => Uint::U16(u16::from_le_bytes(to_array(bytes))),
        32 => Uint::U32(u32::from_le_bytes(to_array(bytes))),
        64 => Uint::U64(u64::from_le_bytes(to_array(bytes))),
        128 => Uint::U128(u128::from_le_bytes(to_array(bytes))),
        256 => Uint::U256(U256::from_little_endian(bytes)),
        _ => return Err(CodecError::UnsupportedWidth(bits)),
    };

    Ok(res)
}

fn to_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut buf = [0; N];
    buf.copy_from_slice(bytes);
    buf
}

/// Appends a 4-byte little-endian offset.
pub(crate) fn encode_offset(offset: usize, out: &mut Vec<u8>) -> CodecResult<()> {
    let offset = u32::try_from(offset).map_err(|_| CodecError::OffsetOverflow(offset))?;
    out.extend_from_slice(&offset.to_le_bytes());
    Ok(())
}

/// Reads the offset stored at `pos`.
pub(crate) fn read_offset(bytes: &[u8], pos: usize) -> CodecResult<usize> {
    let end = pos + BYTES_PER_LENGTH_OFFSET;
    let raw = bytes.get(pos..end).ok_or(CodecError::UnexpectedEof {
        needed: end,
        available: bytes.len(),
    })?;

    Ok(u32::from_le_bytes(to_array(raw)) as usize)
}

/// Splits serialized bytes into 32-byte chunks, right-padding the last one
/// with zeros. An empty input gives no chunks.
pub fn pack(bytes: &[u8]) -> Vec<H256> {
    bytes.chunks(BYTES_PER_CHUNK).map(pad_chunk).collect()
}

/// Right-pads up to 32 bytes into a chunk.
pub fn pad_chunk(bytes: &[u8]) -> H256 {
    let mut chunk = H256::zero();
    chunk.as_bytes_mut()[..bytes.len()].copy_from_slice(bytes);
    chunk
}

/// Number of chunks needed to hold `bytes` bytes.
pub const fn chunks_for_bytes(bytes: u64) -> u64 {
    bytes.div_ceil(BYTES_PER_CHUNK as u64)
}

/// Packs bits into `byte_len` bytes, least significant bit first.
pub fn bits_to_bytes(bits: &Bits, byte_len: usize) -> Vec<u8> {
    let mut out = vec![0; byte_len];
    for (i, bit) in bits.iter().by_vals().enumerate() {
        if bit {
            out[i / 8] |= 1 << (i % 8);
        }
    }
    out
}

/// Encodes a bit-list: the bits followed by a single delimiter bit.
pub fn encode_bitlist(bits: &Bits, out: &mut Vec<u8>) {
    let len = bits.len();
    let mut bytes = bits_to_bytes(bits, len / 8 + 1);
    bytes[len / 8] |= 1 << (len % 8);
    out.extend_from_slice(&bytes);
}

/// Decodes a bit-list. The highest set bit of the last byte is the delimiter.
pub fn decode_bitlist(bytes: &[u8], max_len: u64) -> CodecResult<Bits> {
    let last = *bytes.last().ok_or(CodecError::MissingBitlistDelimiter)?;
    if last == 0 {
        return Err(CodecError::MissingBitlistDelimiter);
    }

    let len = (bytes.len() - 1) * 8 + (7 - last.leading_zeros() as usize);
    if len as u64 > max_len {
        return Err(CodecError::LengthExceeded {
            len: len as u64,
            max: max_len,
        });
    }

    Ok(read_bits(bytes, len))
}

/// Encodes a bit-vector of exactly `len` bits.
pub fn encode_bitvector(bits: &Bits, out: &mut Vec<u8>) {
    out.extend_from_slice(&bits_to_bytes(bits, bits.len().div_ceil(8)));
}

/// Decodes a bit-vector of exactly `len` bits. Padding bits must be zero.
pub fn decode_bitvector(bytes: &[u8], len: u64) -> CodecResult<Bits> {
    let len = len as usize;
    let expected = len.div_ceil(8);
    if bytes.len() != expected {
        return Err(CodecError::InvalidLength {
            expected,
            actual: bytes.len(),
        });
    }

    if len % 8 != 0 && bytes[expected - 1] >> (len % 8) != 0 {
        return Err(CodecError::InvalidBitPadding);
    }

    Ok(read_bits(bytes, len))
}

fn read_bits(bytes: &[u8], len: usize) -> Bits {
    (0..len).map(|i| (bytes[i / 8] >> (i % 8)) & 1 == 1).collect()
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;

    use super::*;

    #[test]
    fn uints_are_little_endian() {
        let mut out = Vec::new();
        encode_uint(&Uint::U16(0x0102), &mut out);
        encode_uint(&Uint::U64(5), &mut out);
        assert_eq!(out, hex!("0201 0500000000000000"));
    }

    #[test]
    fn uint256_round_trips() {
        let v = Uint::U256(U256::from(0x1234_5678u64) << 200);
        let mut out = Vec::new();
        encode_uint(&v, &mut out);
        assert_eq!(out.len(), 32);
        assert_eq!(decode_uint(256, &out).unwrap(), v);
    }

    #[test]
    fn decoding_rejects_wrong_lengths_and_bools() {
        assert!(matches!(
            decode_uint(32, &[1, 2, 3]),
            Err(CodecError::InvalidLength {
                expected: 4,
                actual: 3
            })
        ));
        assert!(matches!(decode_bool(&[2]), Err(CodecError::InvalidBool(2))));
        assert!(decode_bool(&[1]).unwrap());
    }

    #[test]
    fn packing_pads_the_last_chunk() {
        let chunks = pack(&[0xff; 40]);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], H256::repeat_byte(0xff));
        assert_eq!(&chunks[1].as_bytes()[..8], &[0xff; 8]);
        assert_eq!(&chunks[1].as_bytes()[8..], &[0; 24]);
        assert!(pack(&[]).is_empty());
    }

    #[test]
    fn bitlist_carries_delimiter() {
        let bits: Bits = [true, true, false, true, false, false, false, false]
            .into_iter()
            .collect();
        let mut out = Vec::new();
        encode_bitlist(&bits, &mut out);
        assert_eq!(out, vec![0b0000_1011, 0b0000_0001]);
        assert_eq!(decode_bitlist(&out, 8).unwrap(), bits);

        let mut empty = Vec::new();
        encode_bitlist(&Bits::new(), &mut empty);
        assert_eq!(empty, vec![1]);
        assert!(decode_bitlist(&empty, 0).unwrap().is_empty());
    }

    #[test]
    fn bitlist_decoding_rejects_bad_input() {
        assert!(matches!(
            decode_bitlist(&[], 8),
            Err(CodecError::MissingBitlistDelimiter)
        ));
        assert!(matches!(
            decode_bitlist(&[0b1, 0], 8),
            Err(CodecError::MissingBitlistDelimiter)
        ));
        assert!(matches!(
            decode_bitlist(&[0xff, 0b10], 4),
            Err(CodecError::LengthExceeded { len: 9, max: 4 })
        ));
    }

    #[test]
    fn bitvector_padding_must_be_zero() {
        assert!(decode_bitvector(&[0b0000_0101], 3).is_ok());
        assert!(matches!(
            decode_bitvector(&[0b0000_1101], 3),
            Err(CodecError::InvalidBitPadding)
        ));
    }
}

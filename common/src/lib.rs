//! Hash primitives and constants shared by the SSZ crates.
//!
//! The Merkle hashing engine never hard-codes its node hash. Everything that
//! combines two chunks goes through a [`HashFn`], so production code can use
//! [`Sha256`] while tests are free to plug in something simpler.

use std::{fmt::Debug, sync::Arc};

use ethereum_types::H256;
use serde::{Deserialize, Serialize};
use sha2::Digest;

/// Number of bytes in a Merkle chunk.
pub const BYTES_PER_CHUNK: usize = 32;

/// Number of bytes used to encode an offset to a variable-size part.
pub const BYTES_PER_LENGTH_OFFSET: usize = 4;

/// The all-zero chunk used to pad Merkle trees.
pub const ZERO_CHUNK: H256 = H256([0; BYTES_PER_CHUNK]);

/// A 32-byte hash function applied at every node of a Merkle tree.
pub trait HashFn: Debug + Send + Sync {
    /// Hashes an arbitrary byte string.
    fn digest(&self, data: &[u8]) -> H256;

    /// Hashes the concatenation `left ‖ right` of two chunks.
    fn digest_pair(&self, left: &H256, right: &H256) -> H256 {
        let mut buf = [0; 2 * BYTES_PER_CHUNK];
        buf[..BYTES_PER_CHUNK].copy_from_slice(left.as_bytes());
        buf[BYTES_PER_CHUNK..].copy_from_slice(right.as_bytes());
        self.digest(&buf)
    }
}

/// SHA-256, the node hash of the beacon chain.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Sha256;

impl HashFn for Sha256 {
    fn digest(&self, data: &[u8]) -> H256 {
        H256::from_slice(&sha2::Sha256::digest(data))
    }
}

/// Keccak-256, kept for compatibility with early test vectors.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Keccak256;

impl HashFn for Keccak256 {
    fn digest(&self, data: &[u8]) -> H256 {
        keccak_hash::keccak(data)
    }
}

/// Configurable selection of a built-in [`HashFn`].
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HashFunction {
    /// [`Sha256`].
    #[default]
    Sha256,

    /// [`Keccak256`].
    Keccak256,
}

impl HashFunction {
    /// Instantiates the selected hash function.
    pub fn hasher(self) -> Arc<dyn HashFn> {
        match self {
            HashFunction::Sha256 => Arc::new(Sha256),
            HashFunction::Keccak256 => Arc::new(Keccak256),
        }
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;

    use super::*;

    #[test]
    fn sha256_of_empty_input() {
        assert_eq!(
            Sha256.digest(&[]),
            H256(hex!(
                "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
            ))
        );
    }

    #[test]
    fn keccak256_of_empty_input() {
        assert_eq!(
            Keccak256.digest(&[]),
            H256(hex!(
                "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
            ))
        );
    }

    #[test]
    fn pair_digest_hashes_the_concatenation() {
        let left = H256::repeat_byte(0xaa);
        let right = H256::repeat_byte(0xbb);

        let mut concat = left.as_bytes().to_vec();
        concat.extend_from_slice(right.as_bytes());

        assert_eq!(Sha256.digest_pair(&left, &right), Sha256.digest(&concat));
        assert_ne!(
            Sha256.digest_pair(&left, &right),
            Sha256.digest_pair(&right, &left)
        );
    }

    #[test]
    fn zero_chunk_pair_matches_known_value() {
        assert_eq!(
            Sha256.digest_pair(&ZERO_CHUNK, &ZERO_CHUNK),
            H256(hex!(
                "f5a5fd42d16a20302798ef6ed309979b43003d2320d9f0e8ea9831a92759fb4b"
            ))
        );
    }

    #[test]
    fn hash_function_selection_from_config() {
        let f: HashFunction = serde_json::from_str("\"keccak256\"").unwrap();
        assert_eq!(f, HashFunction::Keccak256);
        assert_eq!(f.hasher().digest(b"abc"), Keccak256.digest(b"abc"));
        assert_eq!(HashFunction::default(), HashFunction::Sha256);
    }
}

//! Wrapper around the [sodiumoxide] `SHA256` primitive.
//!
//! See the [crypto module] documentation since this is a private module anyways.
//!
//! [sodiumoxide]: https://docs.rs/sodiumoxide/
//! [crypto module]: crate::crypto

use derive_more::{AsMut, AsRef, From};
use serde::{Deserialize, Serialize};
use sodiumoxide::crypto::hash::sha256;

use super::ByteObject;

#[derive(
    AsRef,
    AsMut,
    From,
    Serialize,
    Deserialize,
    Hash,
    Eq,
    Ord,
    PartialEq,
    Copy,
    Clone,
    PartialOrd,
    Debug,
)]
/// A digest of the `SHA256` hash function.
///
/// Used to bind the per-subject key salt to the subject identity and to fingerprint
/// datasets for the client registry.
pub struct Sha256(sha256::Digest);

impl ByteObject for Sha256 {
    const LENGTH: usize = sha256::DIGESTBYTES;

    fn zeroed() -> Self {
        Self(sha256::Digest([0_u8; sha256::DIGESTBYTES]))
    }

    fn as_slice(&self) -> &[u8] {
        self.0.as_ref()
    }

    fn from_slice(bytes: &[u8]) -> Option<Self> {
        sha256::Digest::from_slice(bytes).map(Self)
    }
}

impl Sha256 {
    /// Computes the digest of the message `m`.
    pub fn hash(m: &[u8]) -> Self {
        Self(sha256::hash(m))
    }

    /// Renders the digest as lowercase hex, the form stored in data fingerprints.
    pub fn to_hex(&self) -> String {
        hex::encode(self.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_deterministic() {
        assert_eq!(Sha256::hash(b"cohort-a"), Sha256::hash(b"cohort-a"));
        assert_ne!(Sha256::hash(b"cohort-a"), Sha256::hash(b"cohort-b"));
    }

    #[test]
    fn test_hex_rendering() {
        let digest = Sha256::zeroed();
        assert_eq!(digest.to_hex(), "0".repeat(2 * Sha256::LENGTH));
    }
}

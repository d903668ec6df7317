//! Wrappers around the [sodiumoxide] primitives this crate builds on.
//!
//! The wrappers provide methods defined on structs instead of the bare sodiumoxide
//! functions: a [`MasterKey`] for deployment-wide key material, a [`Sha256`] digest
//! used for subject salts and data fingerprints, and the sealing construction in
//! [`seal`] that turns the master key into per-subject encryption keys.
//!
//! # Examples
//! ## Sealing a payload for a subject
//! ```
//! # use fedmed_core::crypto::{MasterKey, ByteObject, seal::SubjectSealer};
//! let sealer = SubjectSealer::new(MasterKey::generate());
//! let package = sealer.encrypt(b"lab result", "patient-719").unwrap();
//! let plaintext = sealer.decrypt(&package, "patient-719").unwrap();
//! assert_eq!(plaintext, b"lab result");
//! ```
//!
//! [sodiumoxide]: https://docs.rs/sodiumoxide/

pub(crate) mod hash;
pub mod seal;

use sodiumoxide::{crypto::kdf, randombytes::randombytes};

pub use self::{
    hash::Sha256,
    seal::{CryptoError, EncryptedPackage, SubjectSealer},
};

/// An interface for slicing into cryptographic byte objects.
pub trait ByteObject: Sized {
    /// Length in bytes of this object.
    const LENGTH: usize;

    /// Creates a new object with all the bytes initialized to `0`.
    fn zeroed() -> Self;

    /// Gets the object byte representation.
    fn as_slice(&self) -> &[u8];

    /// Creates an object from the given buffer.
    ///
    /// # Errors
    /// Returns `None` if the length of the byte-slice isn't equal to the length of the object.
    fn from_slice(bytes: &[u8]) -> Option<Self>;

    /// Creates an object from the given buffer.
    ///
    /// # Panics
    /// Panics if the length of the byte-slice isn't equal to the length of the object.
    fn from_slice_unchecked(bytes: &[u8]) -> Self {
        Self::from_slice(bytes).unwrap()
    }

    /// Generates an object with random bytes.
    fn generate() -> Self {
        // safe unwrap: length of slice is guaranteed by constants
        Self::from_slice_unchecked(randombytes(Self::LENGTH).as_slice())
    }

    /// A helper for instantiating an object filled with the given value.
    fn fill_with(value: u8) -> Self {
        Self::from_slice_unchecked(&vec![value; Self::LENGTH])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// The deployment-wide master key.
///
/// Everything key-like in this crate is derived from it: the per-subject sealing keys
/// (via `pwhash` with a subject-bound salt, see [`seal`]) and the pseudonymization
/// subkey (via the libsodium KDF, see [`crate::anonymize`]). The master key itself is
/// never used to encrypt anything directly.
pub struct MasterKey(kdf::Key);

impl ByteObject for MasterKey {
    const LENGTH: usize = kdf::KEYBYTES;

    fn zeroed() -> Self {
        Self(kdf::Key([0_u8; kdf::KEYBYTES]))
    }

    fn as_slice(&self) -> &[u8] {
        self.0.as_ref()
    }

    fn from_slice(bytes: &[u8]) -> Option<Self> {
        kdf::Key::from_slice(bytes).map(Self)
    }
}

impl MasterKey {
    /// Derives a dedicated 32 byte subkey for the given key id and context.
    ///
    /// # Errors
    /// Fails if the underlying KDF rejects the derivation parameters.
    pub fn derive_subkey(
        &self,
        key_id: u64,
        context: [u8; kdf::CONTEXTBYTES],
    ) -> Result<[u8; 32], CryptoError> {
        let mut subkey = [0_u8; 32];
        kdf::derive_from_key(&mut subkey, key_id, context, &self.0)
            .or(Err(CryptoError::KeyDerivation))?;
        Ok(subkey)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_master_key_slicing() {
        let key = MasterKey::fill_with(0x5a);
        assert_eq!(key.as_slice(), &[0x5a; MasterKey::LENGTH][..]);
        assert_eq!(MasterKey::from_slice(key.as_slice()), Some(key));
        assert!(MasterKey::from_slice(&[0_u8; 31]).is_none());
    }

    #[test]
    fn test_subkeys_are_distinct_per_id() {
        let key = MasterKey::fill_with(0x11);
        let first = key.derive_subkey(1, *b"fedmedid").unwrap();
        let second = key.derive_subkey(2, *b"fedmedid").unwrap();
        assert_ne!(first, second);
        // same id and context must reproduce the same subkey
        assert_eq!(first, key.derive_subkey(1, *b"fedmedid").unwrap());
    }
}

//! Per-subject authenticated encryption.
//!
//! Payloads are sealed under a key derived from the [`MasterKey`] and the subject
//! identity: the salt is the `SHA256` digest of the subject id and the derivation runs
//! through libsodium's `pwhash` (scrypt). The same derived secret keys an `XSalsa20`
//! stream cipher and an `HMAC-SHA512/256` tag over the ciphertext, so a package can
//! only be opened by re-deriving the key from the same master key and subject identity.
//!
//! Decryption verifies the integrity tag in constant time before touching the
//! ciphertext. A package that fails verification is rejected as a whole; there is no
//! partial or unauthenticated plaintext.

use chrono::{DateTime, Utc};
use derive_more::{AsMut, AsRef, From};
use serde::{Deserialize, Serialize};
use sodiumoxide::crypto::{auth, pwhash, stream};
use thiserror::Error;

use super::{ByteObject, MasterKey, Sha256};

/// Identifier of the sealing construction, recorded in every package.
pub const SEAL_ALGORITHM: &str = "xsalsa20-hmacsha512256";

/// Errors related to sealing and opening packages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("integrity verification failed: the package was altered or the subject identity is wrong")]
    IntegrityFailure,
    #[error("key derivation failed")]
    KeyDerivation,
}

#[derive(AsRef, AsMut, From, Serialize, Deserialize, Eq, PartialEq, Copy, Clone, Debug)]
/// The random nonce a package was sealed with. Fresh for every package.
pub struct PackageNonce(stream::Nonce);

impl ByteObject for PackageNonce {
    const LENGTH: usize = stream::NONCEBYTES;

    fn zeroed() -> Self {
        Self(stream::Nonce([0_u8; stream::NONCEBYTES]))
    }

    fn as_slice(&self) -> &[u8] {
        self.0.as_ref()
    }

    fn from_slice(bytes: &[u8]) -> Option<Self> {
        stream::Nonce::from_slice(bytes).map(Self)
    }
}

#[derive(AsRef, AsMut, From, Serialize, Deserialize, Eq, PartialEq, Copy, Clone, Debug)]
/// The authentication tag over a package's ciphertext.
pub struct IntegrityTag(auth::Tag);

impl ByteObject for IntegrityTag {
    const LENGTH: usize = auth::TAGBYTES;

    fn zeroed() -> Self {
        Self(auth::Tag([0_u8; auth::TAGBYTES]))
    }

    fn as_slice(&self) -> &[u8] {
        self.0.as_ref()
    }

    fn from_slice(bytes: &[u8]) -> Option<Self> {
        auth::Tag::from_slice(bytes).map(Self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// A sealed payload together with everything needed to open and audit it.
///
/// The package carries no key material: opening it requires the master key the sealer
/// was built with and the subject identity it was sealed for.
pub struct EncryptedPackage {
    /// The encrypted payload.
    pub ciphertext: Vec<u8>,
    /// The per-package initialization vector of the stream cipher.
    pub nonce: PackageNonce,
    /// The `HMAC-SHA512/256` tag over the ciphertext.
    pub integrity_tag: IntegrityTag,
    /// Identifier of the sealing construction, see [`SEAL_ALGORITHM`].
    pub algorithm: String,
    /// The subject identity the sealing key was derived for.
    pub subject_id: String,
    /// When the package was sealed.
    pub created_at: DateTime<Utc>,
}

/// Seals and opens payloads with per-subject derived keys.
pub struct SubjectSealer {
    master: MasterKey,
}

/// The derived secret of one subject. The cipher key and the tag key hold the same
/// 32 bytes; the construction is encrypt-then-MAC under a single derived secret.
struct SubjectKey {
    cipher: stream::Key,
    mac: auth::Key,
}

impl SubjectSealer {
    pub fn new(master: MasterKey) -> Self {
        Self { master }
    }

    /// Seals `plaintext` for the given subject.
    ///
    /// Every call draws a fresh random nonce, so sealing the same payload twice yields
    /// two distinct packages.
    ///
    /// # Errors
    /// Fails if the per-subject key cannot be derived.
    pub fn encrypt(
        &self,
        plaintext: &[u8],
        subject_id: &str,
    ) -> Result<EncryptedPackage, CryptoError> {
        let key = self.derive_subject_key(subject_id)?;
        let nonce = stream::gen_nonce();
        let ciphertext = stream::stream_xor(plaintext, &nonce, &key.cipher);
        let integrity_tag = auth::authenticate(&ciphertext, &key.mac);
        Ok(EncryptedPackage {
            ciphertext,
            nonce: PackageNonce(nonce),
            integrity_tag: IntegrityTag(integrity_tag),
            algorithm: SEAL_ALGORITHM.to_string(),
            subject_id: subject_id.to_string(),
            created_at: Utc::now(),
        })
    }

    /// Opens a package that was sealed for the given subject.
    ///
    /// The integrity tag is recomputed over the ciphertext and compared in constant
    /// time before decryption. A mismatch (altered ciphertext, altered tag, or a wrong
    /// subject identity) fails with [`CryptoError::IntegrityFailure`].
    pub fn decrypt(
        &self,
        package: &EncryptedPackage,
        subject_id: &str,
    ) -> Result<Vec<u8>, CryptoError> {
        let key = self.derive_subject_key(subject_id)?;
        if !auth::verify(&package.integrity_tag.0, &package.ciphertext, &key.mac) {
            return Err(CryptoError::IntegrityFailure);
        }
        Ok(stream::stream_xor(
            &package.ciphertext,
            &package.nonce.0,
            &key.cipher,
        ))
    }

    /// Derives the sealing key of one subject.
    ///
    /// The salt is the `SHA256` digest of the subject id; the derivation is scrypt at
    /// interactive limits, keyed with the master key.
    fn derive_subject_key(&self, subject_id: &str) -> Result<SubjectKey, CryptoError> {
        let digest = Sha256::hash(subject_id.as_bytes());
        let salt = pwhash::Salt::from_slice(digest.as_slice()).ok_or(CryptoError::KeyDerivation)?;
        let mut bytes = [0_u8; stream::KEYBYTES];
        pwhash::derive_key(
            &mut bytes,
            self.master.as_slice(),
            &salt,
            pwhash::OPSLIMIT_INTERACTIVE,
            pwhash::MEMLIMIT_INTERACTIVE,
        )
        .or(Err(CryptoError::KeyDerivation))?;
        let cipher = stream::Key::from_slice(&bytes).ok_or(CryptoError::KeyDerivation)?;
        let mac = auth::Key::from_slice(&bytes).ok_or(CryptoError::KeyDerivation)?;
        Ok(SubjectKey { cipher, mac })
    }
}

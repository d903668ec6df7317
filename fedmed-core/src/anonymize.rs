//! Record de-identification.
//!
//! De-identification replaces the source identity with a stable pseudonym, drops the
//! direct identifiers, generalizes the quasi-identifiers (exact age to an [`AgeBand`],
//! postal code to a [`RegionCode`] mask) and scrubs identifier keys out of the clinical
//! attribute map.
//!
//! Pseudonyms are keyed hashes: an `HMAC-SHA512/256` under a subkey derived from the
//! master key. The same source identity maps to the same pseudonym across instances and
//! restarts that share a master key, while identities stay unlinkable without it.

use sodiumoxide::crypto::{auth, kdf};
use thiserror::Error;

use crate::{
    crypto::{CryptoError, MasterKey},
    record::{AgeBand, AnonymizedRecord, AnonymousId, PatientRecord, RegionCode},
};

/// Field names that directly identify a person and never survive de-identification.
pub const DIRECT_IDENTIFIERS: [&str; 6] =
    ["patient_id", "name", "ssn", "phone", "email", "address"];

/// Attribute keys that duplicate quasi-identifier fields and are scrubbed with them.
const RAW_QUASI_IDENTIFIERS: [&str; 2] = ["age", "zip_code"];

/// Key id of the pseudonym subkey under the master key.
const PSEUDONYM_KEY_ID: u64 = 1;

/// KDF context separating pseudonym keys from other keys derived from the same master.
const PSEUDONYM_CONTEXT: [u8; kdf::CONTEXTBYTES] = *b"fedmedid";

/// Number of tag bytes kept for a pseudonym (sixteen hex characters).
const PSEUDONYM_BYTES: usize = 8;

/// Errors related to validating records for de-identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("the record carries no source identity: `patient_id` is absent or blank")]
    MissingSourceIdentity,
}

/// Derives stable pseudonyms for source identities.
pub struct Pseudonymizer {
    key: auth::Key,
}

impl Pseudonymizer {
    /// Derives the dedicated pseudonym key from the master key.
    ///
    /// # Errors
    /// Fails if the subkey cannot be derived.
    pub fn from_master(master: &MasterKey) -> Result<Self, CryptoError> {
        let bytes = master.derive_subkey(PSEUDONYM_KEY_ID, PSEUDONYM_CONTEXT)?;
        let key = auth::Key::from_slice(&bytes).ok_or(CryptoError::KeyDerivation)?;
        Ok(Self { key })
    }

    /// Computes the pseudonym of one source identity.
    ///
    /// The pseudonym is the hex form of the leading eight bytes of a keyed hash over
    /// the identity: sixteen hex characters, reproducible across instances built from
    /// the same master key.
    pub fn pseudonym(&self, identity: &str) -> AnonymousId {
        let tag = auth::authenticate(identity.as_bytes(), &self.key);
        hex::encode(&tag.as_ref()[..PSEUDONYM_BYTES]).into()
    }
}

/// Extracts the trimmed source identity of a record.
///
/// # Errors
/// Fails if `patient_id` is absent or blank after trimming.
pub fn source_identity(record: &PatientRecord) -> Result<&str, ValidationError> {
    match record.patient_id.as_deref().map(str::trim) {
        Some(identity) if !identity.is_empty() => Ok(identity),
        _ => Err(ValidationError::MissingSourceIdentity),
    }
}

/// Strips, generalizes and scrubs one record, substituting the given pseudonym.
///
/// The output never carries any of the [`DIRECT_IDENTIFIERS`], neither as a field nor
/// as an attribute key. Raw `age` and `zip_code` attribute keys are scrubbed as well
/// since their generalized forms already cover them.
pub fn anonymize(record: &PatientRecord, anonymous_id: AnonymousId) -> AnonymizedRecord {
    let attributes = record
        .attributes
        .iter()
        .filter(|(key, _)| !is_scrubbed_key(key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    AnonymizedRecord {
        anonymous_id,
        age_group: record.age.map(AgeBand::from_age),
        region: record.zip_code.as_deref().map(RegionCode::from_postal_code),
        gender: record.gender.clone(),
        attributes,
    }
}

fn is_scrubbed_key(key: &str) -> bool {
    DIRECT_IDENTIFIERS.contains(&key) || RAW_QUASI_IDENTIFIERS.contains(&key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{crypto::ByteObject, testutils};

    #[test]
    fn test_pseudonyms_are_deterministic() {
        let pseudonymizer = Pseudonymizer::from_master(&testutils::master_key()).unwrap();
        assert_eq!(
            pseudonymizer.pseudonym("patient-719"),
            pseudonymizer.pseudonym("patient-719"),
        );
        assert_ne!(
            pseudonymizer.pseudonym("patient-719"),
            pseudonymizer.pseudonym("patient-720"),
        );
    }

    #[test]
    fn test_pseudonyms_agree_across_instances() {
        let first = Pseudonymizer::from_master(&testutils::master_key()).unwrap();
        let second = Pseudonymizer::from_master(&testutils::master_key()).unwrap();
        assert_eq!(
            first.pseudonym("patient-719"),
            second.pseudonym("patient-719"),
        );
    }

    #[test]
    fn test_pseudonyms_differ_across_master_keys() {
        let first = Pseudonymizer::from_master(&testutils::master_key()).unwrap();
        let second = Pseudonymizer::from_master(&MasterKey::fill_with(0x17)).unwrap();
        assert_ne!(
            first.pseudonym("patient-719"),
            second.pseudonym("patient-719"),
        );
    }

    #[test]
    fn test_pseudonyms_are_sixteen_hex_characters() {
        let pseudonymizer = Pseudonymizer::from_master(&testutils::master_key()).unwrap();
        let id = pseudonymizer.pseudonym("patient-719");
        assert_eq!(id.as_str().len(), 16);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_source_identity_is_trimmed() {
        let record = PatientRecord {
            patient_id: Some("  patient-719  ".to_string()),
            ..PatientRecord::default()
        };
        assert_eq!(source_identity(&record), Ok("patient-719"));
    }

    #[test]
    fn test_missing_or_blank_identity_is_rejected() {
        let absent = PatientRecord::default();
        assert_eq!(
            source_identity(&absent),
            Err(ValidationError::MissingSourceIdentity)
        );
        let blank = PatientRecord {
            patient_id: Some("   ".to_string()),
            ..PatientRecord::default()
        };
        assert_eq!(
            source_identity(&blank),
            Err(ValidationError::MissingSourceIdentity)
        );
    }

    #[test]
    fn test_direct_identifiers_never_survive() {
        let mut record = testutils::patient_record();
        for key in &DIRECT_IDENTIFIERS {
            record
                .attributes
                .insert(key.to_string(), "leaked".into());
        }
        let anonymized = anonymize(&record, "0011223344556677".to_string().into());
        for key in &DIRECT_IDENTIFIERS {
            assert!(!anonymized.attributes.contains_key(*key), "{} leaked", key);
        }
    }

    #[test]
    fn test_raw_quasi_identifier_keys_are_scrubbed() {
        let mut record = testutils::patient_record();
        record.attributes.insert("age".to_string(), 34.0.into());
        record
            .attributes
            .insert("zip_code".to_string(), "94110".into());
        let anonymized = anonymize(&record, "0011223344556677".to_string().into());
        assert!(!anonymized.attributes.contains_key("age"));
        assert!(!anonymized.attributes.contains_key("zip_code"));
    }

    #[test]
    fn test_quasi_identifiers_are_generalized() {
        let record = testutils::patient_record();
        let anonymized = anonymize(&record, "0011223344556677".to_string().into());
        assert_eq!(anonymized.age_group, Some(AgeBand::From30To49));
        assert_eq!(
            anonymized.region,
            Some(RegionCode::from_postal_code("94110"))
        );
        assert_eq!(anonymized.gender, record.gender);
    }

    #[test]
    fn test_clinical_attributes_pass_through() {
        let record = testutils::patient_record();
        let anonymized = anonymize(&record, "0011223344556677".to_string().into());
        assert_eq!(
            anonymized.attributes.get("diagnosis"),
            record.attributes.get("diagnosis")
        );
        assert_eq!(
            anonymized.attributes.get("bmi"),
            record.attributes.get("bmi")
        );
    }
}

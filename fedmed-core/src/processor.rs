//! The secure data processor: de-identification and sealing behind one handle.

use std::{collections::HashMap, sync::Mutex};

use crate::{
    anonymize::{self, Pseudonymizer, ValidationError},
    crypto::{CryptoError, EncryptedPackage, MasterKey, SubjectSealer},
    record::{AnonymizedRecord, AnonymousId, PatientRecord},
};

/// De-identifies records and seals payloads under one master key.
///
/// The processor is `Sync`: the pseudonym cache is the only interior mutability and
/// sits behind a mutex, so a shared reference can serve concurrent callers.
pub struct SecureProcessor {
    sealer: SubjectSealer,
    pseudonymizer: Pseudonymizer,
    pseudonyms: Mutex<HashMap<String, AnonymousId>>,
}

impl SecureProcessor {
    /// Creates a processor, deriving the dedicated pseudonym key from the master key.
    ///
    /// # Errors
    /// Fails if the pseudonym key cannot be derived.
    pub fn new(master_key: MasterKey) -> Result<Self, CryptoError> {
        let pseudonymizer = Pseudonymizer::from_master(&master_key)?;
        Ok(Self {
            sealer: SubjectSealer::new(master_key),
            pseudonymizer,
            pseudonyms: Mutex::new(HashMap::new()),
        })
    }

    /// De-identifies one record.
    ///
    /// Pseudonym derivations are memoized per source identity; cached or not, the same
    /// identity always maps to the same pseudonym.
    ///
    /// # Errors
    /// Fails if the record carries no source identity.
    pub fn anonymize(&self, record: &PatientRecord) -> Result<AnonymizedRecord, ValidationError> {
        let identity = anonymize::source_identity(record)?;
        let anonymous_id = self.pseudonym(identity);
        Ok(anonymize::anonymize(record, anonymous_id))
    }

    /// Seals a payload for a subject, see [`SubjectSealer::encrypt`].
    pub fn encrypt(
        &self,
        plaintext: &[u8],
        subject_id: &str,
    ) -> Result<EncryptedPackage, CryptoError> {
        self.sealer.encrypt(plaintext, subject_id)
    }

    /// Opens a sealed payload, see [`SubjectSealer::decrypt`].
    pub fn decrypt(
        &self,
        package: &EncryptedPackage,
        subject_id: &str,
    ) -> Result<Vec<u8>, CryptoError> {
        self.sealer.decrypt(package, subject_id)
    }

    fn pseudonym(&self, identity: &str) -> AnonymousId {
        let mut cache = self
            .pseudonyms
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        cache
            .entry(identity.to_string())
            .or_insert_with(|| self.pseudonymizer.pseudonym(identity))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils;

    fn processor() -> SecureProcessor {
        SecureProcessor::new(testutils::master_key()).unwrap()
    }

    #[test]
    fn test_anonymize_is_stable_across_calls() {
        let processor = processor();
        let record = testutils::patient_record();
        let first = processor.anonymize(&record).unwrap();
        let second = processor.anonymize(&record).unwrap();
        assert_eq!(first.anonymous_id, second.anonymous_id);
    }

    #[test]
    fn test_anonymize_agrees_across_processors() {
        let record = testutils::patient_record();
        let first = processor().anonymize(&record).unwrap();
        let second = processor().anonymize(&record).unwrap();
        assert_eq!(first.anonymous_id, second.anonymous_id);
    }

    #[test]
    fn test_cached_pseudonym_matches_derivation() {
        let processor = processor();
        let record = testutils::patient_record();
        let anonymized = processor.anonymize(&record).unwrap();
        let pseudonymizer = Pseudonymizer::from_master(&testutils::master_key()).unwrap();
        assert_eq!(
            anonymized.anonymous_id,
            pseudonymizer.pseudonym("p-0001"),
        );
    }

    #[test]
    fn test_record_without_identity_is_rejected() {
        let record = PatientRecord::default();
        assert_eq!(
            processor().anonymize(&record),
            Err(ValidationError::MissingSourceIdentity)
        );
    }

    #[test]
    fn test_sealing_round_trip() {
        let processor = processor();
        let package = processor.encrypt(b"lab result", "patient-719").unwrap();
        assert_eq!(
            processor.decrypt(&package, "patient-719").unwrap(),
            b"lab result"
        );
        assert_eq!(
            processor.decrypt(&package, "patient-720"),
            Err(CryptoError::IntegrityFailure)
        );
    }
}

//! Fixtures shared by the crate's tests and by dependent test suites.

use std::collections::HashMap;

use ndarray::arr1;

use crate::{
    crypto::{ByteObject, MasterKey},
    model::{LocalMetrics, ModelUpdate, ParameterSet},
    record::PatientRecord,
};

/// A fixed master key. Every fixture that needs key material shares it.
pub fn master_key() -> MasterKey {
    MasterKey::fill_with(0x42)
}

/// A fully populated record for patient `p-0001`.
pub fn patient_record() -> PatientRecord {
    let mut attributes = HashMap::new();
    attributes.insert("diagnosis".to_string(), "E11.9".into());
    attributes.insert("bmi".to_string(), 27.4.into());
    attributes.insert("smoker".to_string(), false.into());
    PatientRecord {
        patient_id: Some("p-0001".to_string()),
        name: Some("Jane Doe".to_string()),
        ssn: Some("078-05-1120".to_string()),
        phone: Some("+1 415 555 0193".to_string()),
        email: Some("jane.doe@example.org".to_string()),
        address: Some("1 Main St, San Francisco".to_string()),
        age: Some(34),
        zip_code: Some("94110".to_string()),
        gender: Some("F".to_string()),
        attributes,
    }
}

/// A parameter set holding a single rank one tensor built from `values`.
pub fn parameter_set(values: &[f64]) -> ParameterSet {
    ParameterSet::from(vec![arr1(values).into_dyn()])
}

/// An update carrying a single rank one tensor built from `values`.
pub fn model_update(client_id: &str, sample_count: u64, values: &[f64]) -> ModelUpdate {
    ModelUpdate {
        client_id: client_id.to_string(),
        parameters: parameter_set(values),
        sample_count,
        local_metrics: LocalMetrics {
            accuracy: 0.8,
            loss: 0.3,
        },
    }
}

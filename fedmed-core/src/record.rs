//! Typed patient records and their de-identified form.

use std::{collections::HashMap, fmt};

use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};

/// A single clinical attribute value.
#[derive(Debug, Clone, PartialEq, From, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Text(String),
    Number(f64),
    Flag(bool),
}

impl From<&str> for AttributeValue {
    fn from(text: &str) -> Self {
        AttributeValue::Text(text.to_string())
    }
}

/// A structured input record as delivered by a participating site.
///
/// Every field is optional and defaults to absent (the attribute map to empty).
/// De-identification handles the fields as follows:
///
/// | field        | handling                                                  |
/// |--------------|-----------------------------------------------------------|
/// | `patient_id` | trimmed; required; replaced by the derived pseudonym      |
/// | `name`       | removed                                                   |
/// | `ssn`        | removed                                                   |
/// | `phone`      | removed                                                   |
/// | `email`      | removed                                                   |
/// | `address`    | removed                                                   |
/// | `age`        | generalized to one of the five [`AgeBand`]s               |
/// | `zip_code`   | generalized to a [`RegionCode`]                           |
/// | `gender`     | passed through unchanged                                  |
/// | `attributes` | passed through minus identifier and raw quasi-identifier keys |
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatientRecord {
    pub patient_id: Option<String>,
    pub name: Option<String>,
    pub ssn: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub age: Option<u16>,
    pub zip_code: Option<String>,
    pub gender: Option<String>,
    #[serde(default)]
    pub attributes: HashMap<String, AttributeValue>,
}

/// A stable pseudonym that stands in for a record's source identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, From, Into, Serialize, Deserialize)]
pub struct AnonymousId(String);

impl AnonymousId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Generalized age, one of five fixed bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgeBand {
    #[serde(rename = "<18")]
    Under18,
    #[serde(rename = "18-29")]
    From18To29,
    #[serde(rename = "30-49")]
    From30To49,
    #[serde(rename = "50-69")]
    From50To69,
    #[serde(rename = "70+")]
    Over70,
}

impl AgeBand {
    /// Generalizes an exact age into its band.
    pub fn from_age(age: u16) -> Self {
        match age {
            0..=17 => AgeBand::Under18,
            18..=29 => AgeBand::From18To29,
            30..=49 => AgeBand::From30To49,
            50..=69 => AgeBand::From50To69,
            _ => AgeBand::Over70,
        }
    }
}

impl fmt::Display for AgeBand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let label = match self {
            AgeBand::Under18 => "<18",
            AgeBand::From18To29 => "18-29",
            AgeBand::From30To49 => "30-49",
            AgeBand::From50To69 => "50-69",
            AgeBand::Over70 => "70+",
        };
        write!(f, "{}", label)
    }
}

/// A coarse region derived from a postal code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegionCode(String);

impl RegionCode {
    /// Masks a postal code down to its leading three characters plus `"XX"`.
    ///
    /// Codes shorter than three characters keep what they have; the mask is always
    /// appended.
    pub fn from_postal_code(zip_code: &str) -> Self {
        let prefix: String = zip_code.chars().take(3).collect();
        Self(format!("{}XX", prefix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RegionCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The de-identified form of a [`PatientRecord`].
///
/// Carries no direct identifiers: the source identity is replaced by a stable
/// pseudonym, age and postal code are generalized, and the clinical attribute map is
/// scrubbed of identifier keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnonymizedRecord {
    pub anonymous_id: AnonymousId,
    pub age_group: Option<AgeBand>,
    pub region: Option<RegionCode>,
    pub gender: Option<String>,
    pub attributes: HashMap<String, AttributeValue>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_age_band_boundaries() {
        assert_eq!(AgeBand::from_age(0), AgeBand::Under18);
        assert_eq!(AgeBand::from_age(17), AgeBand::Under18);
        assert_eq!(AgeBand::from_age(18), AgeBand::From18To29);
        assert_eq!(AgeBand::from_age(29), AgeBand::From18To29);
        assert_eq!(AgeBand::from_age(30), AgeBand::From30To49);
        assert_eq!(AgeBand::from_age(49), AgeBand::From30To49);
        assert_eq!(AgeBand::from_age(50), AgeBand::From50To69);
        assert_eq!(AgeBand::from_age(69), AgeBand::From50To69);
        assert_eq!(AgeBand::from_age(70), AgeBand::Over70);
        assert_eq!(AgeBand::from_age(104), AgeBand::Over70);
    }

    #[test]
    fn test_age_band_labels() {
        assert_eq!(AgeBand::Under18.to_string(), "<18");
        assert_eq!(AgeBand::From18To29.to_string(), "18-29");
        assert_eq!(AgeBand::From30To49.to_string(), "30-49");
        assert_eq!(AgeBand::From50To69.to_string(), "50-69");
        assert_eq!(AgeBand::Over70.to_string(), "70+");
    }

    #[test]
    fn test_postal_code_masking() {
        assert_eq!(RegionCode::from_postal_code("94110").as_str(), "941XX");
        assert_eq!(RegionCode::from_postal_code("10115-22").as_str(), "101XX");
    }

    #[test]
    fn test_short_postal_codes_keep_what_they_have() {
        assert_eq!(RegionCode::from_postal_code("94").as_str(), "94XX");
        assert_eq!(RegionCode::from_postal_code("").as_str(), "XX");
    }
}

//! Loading and validation of the coordinator settings.

use std::{
    fmt,
    path::{Path, PathBuf},
};

use config::{Config, ConfigError, Environment, File};
use serde::de::{self, Deserializer, Visitor};
use thiserror::Error;
use tracing_subscriber::filter::EnvFilter;
use validator::{Validate, ValidationError, ValidationErrors};

#[derive(Debug, Error)]
/// An error related to loading and validation of settings.
pub enum SettingsError {
    #[error("configuration loading failed: {0}")]
    Loading(#[from] ConfigError),
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationErrors),
}

#[derive(Debug, Validate, Deserialize)]
/// The combined settings.
///
/// Each section of the configuration file maps to the identically named substructure.
pub struct Settings {
    pub log: LoggingSettings,
    #[validate]
    pub round: RoundSettings,
    #[serde(default)]
    #[validate]
    pub simulation: SimulationSettings,
}

impl Settings {
    /// Loads and validates the coordinator settings via a configuration file.
    ///
    /// Every setting can be overridden by an environment variable with the `FEDMED`
    /// prefix and `__` as the section separator.
    ///
    /// # Errors
    /// Fails when the loading of the configuration file or its validation failed.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let settings: Settings = Self::load(path)?;
        settings.validate()?;
        Ok(settings)
    }

    fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut config = Config::new();
        config.merge(File::from(path.as_ref()))?;
        config.merge(Environment::with_prefix("fedmed").separator("__"))?;
        config.try_into()
    }
}

#[derive(Debug, Validate, Deserialize, Clone, Copy)]
/// Round settings.
pub struct RoundSettings {
    /// The number of seconds a site may take to deliver its local update before it is
    /// excluded from the running round. The value must be greater or equal to 1.
    ///
    /// # Examples
    ///
    /// **TOML**
    /// ```text
    /// [round]
    /// fetch_timeout = 10
    /// ```
    ///
    /// **Environment variable**
    /// ```text
    /// FEDMED_ROUND__FETCH_TIMEOUT=10
    /// ```
    #[validate(range(min = 1))]
    pub fetch_timeout: u64,

    /// The number of seconds the push of a published global model to a single site may
    /// take before that push is abandoned. The value must be greater or equal to 1.
    ///
    /// # Examples
    ///
    /// **TOML**
    /// ```text
    /// [round]
    /// push_timeout = 10
    /// ```
    ///
    /// **Environment variable**
    /// ```text
    /// FEDMED_ROUND__PUSH_TIMEOUT=10
    /// ```
    #[validate(range(min = 1))]
    pub push_timeout: u64,
}

#[derive(Debug, Validate, Deserialize, Clone)]
#[validate(schema(function = "validate_simulation"))]
/// Simulated cohort settings, used by the `coordinator` binary.
pub struct SimulationSettings {
    /// The number of simulated sites to register and poll. The value must be greater
    /// or equal to 1.
    ///
    /// # Examples
    ///
    /// **TOML**
    /// ```text
    /// [simulation]
    /// clients = 3
    /// ```
    ///
    /// **Environment variable**
    /// ```text
    /// FEDMED_SIMULATION__CLIENTS=3
    /// ```
    #[serde(default = "default_clients")]
    #[validate(range(min = 1))]
    pub clients: u32,

    /// The number of rounds the binary drives before it exits. The value must be
    /// greater or equal to 1.
    ///
    /// # Examples
    ///
    /// **TOML**
    /// ```text
    /// [simulation]
    /// rounds = 5
    /// ```
    ///
    /// **Environment variable**
    /// ```text
    /// FEDMED_SIMULATION__ROUNDS=5
    /// ```
    #[serde(default = "default_rounds")]
    #[validate(range(min = 1))]
    pub rounds: u64,

    /// Seed of the cohort's randomness. Runs with the same seed report the same sample
    /// counts and local metrics. If omitted, the cohort seeds itself from entropy.
    ///
    /// # Examples
    ///
    /// **TOML**
    /// ```text
    /// [simulation]
    /// seed = 42
    /// ```
    ///
    /// **Environment variable**
    /// ```text
    /// FEDMED_SIMULATION__SEED=42
    /// ```
    #[serde(default)]
    pub seed: Option<u64>,

    /// Shapes of the template parameter tensors the cohort trains on. Every shape must
    /// name at least one dimension and every dimension must be greater than zero.
    ///
    /// # Examples
    ///
    /// **TOML**
    /// ```text
    /// [simulation]
    /// shapes = [[8], [4, 2]]
    /// ```
    #[serde(default = "default_shapes")]
    pub shapes: Vec<Vec<usize>>,

    /// Where to write the final checkpoint after the last round. If omitted, no
    /// checkpoint is written.
    ///
    /// # Examples
    ///
    /// **TOML**
    /// ```text
    /// [simulation]
    /// checkpoint_path = "coordinator.checkpoint"
    /// ```
    ///
    /// **Environment variable**
    /// ```text
    /// FEDMED_SIMULATION__CHECKPOINT_PATH=coordinator.checkpoint
    /// ```
    #[serde(default)]
    pub checkpoint_path: Option<PathBuf>,
}

impl SimulationSettings {
    fn validate_shapes(&self) -> Result<(), ValidationError> {
        if self.shapes.is_empty()
            || self.shapes.iter().any(Vec::is_empty)
            || self.shapes.iter().flatten().any(|dim| *dim == 0)
        {
            return Err(ValidationError::new("invalid tensor shapes"));
        }
        Ok(())
    }
}

/// Checks simulation settings.
fn validate_simulation(settings: &SimulationSettings) -> Result<(), ValidationError> {
    settings.validate_shapes()
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            clients: default_clients(),
            rounds: default_rounds(),
            seed: None,
            shapes: default_shapes(),
            checkpoint_path: None,
        }
    }
}

fn default_clients() -> u32 {
    3
}

fn default_rounds() -> u64 {
    5
}

fn default_shapes() -> Vec<Vec<usize>> {
    vec![vec![8], vec![4, 2]]
}

#[derive(Debug, Deserialize)]
/// Logging settings.
pub struct LoggingSettings {
    /// A tracing filter which filters spans and events based on a set of filter
    /// directives.
    ///
    /// # Examples
    ///
    /// **TOML**
    /// ```text
    /// [log]
    /// filter = "info"
    /// ```
    ///
    /// **Environment variable**
    /// ```text
    /// FEDMED_LOG__FILTER=info
    /// ```
    #[serde(deserialize_with = "deserialize_env_filter")]
    pub filter: EnvFilter,
}

fn deserialize_env_filter<'de, D>(deserializer: D) -> Result<EnvFilter, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_str(EnvFilterVisitor)
}

struct EnvFilterVisitor;

impl<'de> Visitor<'de> for EnvFilterVisitor {
    type Value = EnvFilter;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a valid tracing filter directive: https://docs.rs/tracing-subscriber/0.2.15/tracing_subscriber/filter/struct.EnvFilter.html#directives")
    }

    fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        EnvFilter::try_new(value)
            .map_err(|_| de::Error::invalid_value(serde::de::Unexpected::Str(value), &self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    impl Default for RoundSettings {
        fn default() -> Self {
            Self {
                fetch_timeout: 10,
                push_timeout: 10,
            }
        }
    }

    #[test]
    fn test_settings_new() {
        assert!(Settings::new("../configs/config.toml").is_ok());
        assert!(Settings::new("").is_err());
    }

    #[test]
    fn test_validate_round() {
        assert!(RoundSettings::default().validate().is_ok());
        assert!(RoundSettings {
            fetch_timeout: 0,
            ..RoundSettings::default()
        }
        .validate()
        .is_err());
        assert!(RoundSettings {
            push_timeout: 0,
            ..RoundSettings::default()
        }
        .validate()
        .is_err());
    }

    #[test]
    fn test_validate_simulation() {
        assert!(SimulationSettings::default().validate().is_ok());
        assert!(SimulationSettings {
            clients: 0,
            ..SimulationSettings::default()
        }
        .validate()
        .is_err());
        assert!(SimulationSettings {
            shapes: vec![],
            ..SimulationSettings::default()
        }
        .validate()
        .is_err());
        assert!(SimulationSettings {
            shapes: vec![vec![4, 0]],
            ..SimulationSettings::default()
        }
        .validate()
        .is_err());
    }
}

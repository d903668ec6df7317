//! The coordinator state threaded through all phases.

use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

use fedmed_core::model::{ParameterSet, PerformanceSnapshot};

use crate::settings::RoundSettings;

/// Parameters bounding every round, fixed at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundParameters {
    /// How long one site may take to deliver its local update.
    pub fetch_timeout: Duration,
    /// How long the push of a published model to one site may take.
    pub push_timeout: Duration,
}

impl From<RoundSettings> for RoundParameters {
    fn from(settings: RoundSettings) -> Self {
        Self {
            fetch_timeout: Duration::from_secs(settings.fetch_timeout),
            push_timeout: Duration::from_secs(settings.push_timeout),
        }
    }
}

/// The global model. Exclusively owned and mutated by the state machine task.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalModelState {
    /// Number of committed rounds. Starts at zero.
    pub round_number: u64,
    /// The latest aggregated parameters. `None` until the first round commits.
    pub parameters: Option<ParameterSet>,
    /// When the state last changed.
    pub updated_at: DateTime<Utc>,
}

impl GlobalModelState {
    fn new() -> Self {
        Self {
            round_number: 0,
            parameters: None,
            updated_at: Utc::now(),
        }
    }
}

/// The coordinator state.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorState {
    /// Parameters bounding every round.
    pub round: RoundParameters,
    /// The global model.
    pub global: GlobalModelState,
    /// Snapshots of all committed rounds, in order, append-only.
    pub history: Vec<PerformanceSnapshot>,
}

impl CoordinatorState {
    /// Creates the initial coordinator state: no model, no history, round zero.
    pub fn new(settings: RoundSettings) -> Self {
        Self {
            round: settings.into(),
            global: GlobalModelState::new(),
            history: Vec::new(),
        }
    }

    /// Rebuilds a coordinator state from a previously exported checkpoint.
    pub fn restore(settings: RoundSettings, checkpoint: Checkpoint) -> Self {
        Self {
            round: settings.into(),
            global: GlobalModelState {
                round_number: checkpoint.round_number,
                parameters: checkpoint.parameters,
                updated_at: Utc::now(),
            },
            history: checkpoint.history,
        }
    }

    /// Exports the durable parts of the state.
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            round_number: self.global.round_number,
            parameters: self.global.parameters.clone(),
            history: self.history.clone(),
        }
    }
}

/// An error related to encoding and decoding checkpoints.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint encoding failed")]
    Encode(#[source] bincode::Error),
    #[error("checkpoint decoding failed")]
    Decode(#[source] bincode::Error),
}

/// The durable snapshot of a coordinator, exported on request and written to disk by
/// the `coordinator` binary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Number of committed rounds.
    pub round_number: u64,
    /// The latest aggregated parameters.
    pub parameters: Option<ParameterSet>,
    /// Snapshots of all committed rounds, in order.
    pub history: Vec<PerformanceSnapshot>,
}

impl Checkpoint {
    /// Serializes the checkpoint.
    ///
    /// # Errors
    /// Fails if any contained value cannot be encoded.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CheckpointError> {
        bincode::serialize(self).map_err(CheckpointError::Encode)
    }

    /// Deserializes a checkpoint from the output of [`to_bytes`].
    ///
    /// # Errors
    /// Fails if the bytes do not describe a checkpoint.
    ///
    /// [`to_bytes`]: Checkpoint::to_bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CheckpointError> {
        bincode::deserialize(bytes).map_err(CheckpointError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use fedmed_core::{aggregation, testutils};

    use super::*;

    fn committed_state() -> CoordinatorState {
        let mut state = CoordinatorState::new(RoundSettings::default());
        let updates = [
            testutils::model_update("site-a", 300, &[1.0]),
            testutils::model_update("site-b", 700, &[0.0]),
        ];
        state.global.parameters = Some(aggregation::aggregate(&updates).unwrap());
        state.global.round_number = 1;
        state.history.push(aggregation::evaluate(&updates, 1));
        state
    }

    #[test]
    fn test_round_parameters_from_settings() {
        let parameters = RoundParameters::from(RoundSettings {
            fetch_timeout: 7,
            push_timeout: 13,
        });
        assert_eq!(parameters.fetch_timeout, Duration::from_secs(7));
        assert_eq!(parameters.push_timeout, Duration::from_secs(13));
    }

    #[test]
    fn test_initial_state() {
        let state = CoordinatorState::new(RoundSettings::default());
        assert_eq!(state.global.round_number, 0);
        assert_eq!(state.global.parameters, None);
        assert!(state.history.is_empty());
    }

    #[test]
    fn test_checkpoint_byte_round_trip() {
        let checkpoint = committed_state().checkpoint();
        let bytes = checkpoint.to_bytes().unwrap();
        assert_eq!(Checkpoint::from_bytes(&bytes).unwrap(), checkpoint);
    }

    #[test]
    fn test_from_bytes_rejects_garbage() {
        assert!(Checkpoint::from_bytes(&[0xde, 0xad, 0xbe, 0xef]).is_err());
    }

    #[test]
    fn test_restore_rebuilds_the_exported_state() {
        let state = committed_state();
        let restored = CoordinatorState::restore(RoundSettings::default(), state.checkpoint());
        assert_eq!(restored.global.round_number, state.global.round_number);
        assert_eq!(restored.global.parameters, state.global.parameters);
        assert_eq!(restored.history, state.history);
    }
}

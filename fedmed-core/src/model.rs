//! Model parameters and the per-round artifacts derived from them.

use chrono::{DateTime, Utc};
use derive_more::{From, Index, IndexMut, Into};
use ndarray::ArrayD;
use serde::{Deserialize, Serialize};

/// A set of model parameter tensors.
///
/// The tensors are dynamically shaped. A well-formed cohort submits sets that agree on
/// tensor count and per-tensor shapes; aggregation enforces the agreement.
#[derive(
    Debug, Clone, Default, PartialEq, From, Index, IndexMut, Into, Serialize, Deserialize,
)]
pub struct ParameterSet(Vec<ArrayD<f64>>);

impl ParameterSet {
    /// The number of tensors in the set.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<ArrayD<f64>> {
        self.0.iter()
    }

    /// Whether every element of every tensor is a finite number.
    pub fn is_finite(&self) -> bool {
        self.0
            .iter()
            .all(|tensor| tensor.iter().all(|value| value.is_finite()))
    }
}

/// Metrics a client reports alongside its update, from its local evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocalMetrics {
    pub accuracy: f64,
    pub loss: f64,
}

/// One client's contribution to a round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelUpdate {
    /// Id of the contributing client.
    pub client_id: String,
    /// The locally trained parameters.
    pub parameters: ParameterSet,
    /// Number of local samples behind the parameters. Weights the update.
    pub sample_count: u64,
    /// The client's local evaluation.
    pub local_metrics: LocalMetrics,
}

/// The sample-weighted evaluation of one committed round. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSnapshot {
    pub round_number: u64,
    pub weighted_accuracy: f64,
    pub weighted_loss: f64,
    pub participant_count: usize,
    pub total_samples: u64,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use ndarray::arr1;

    use super::*;

    #[test]
    fn test_finite_parameter_sets() {
        let finite = ParameterSet::from(vec![arr1(&[0.25, -1.5]).into_dyn()]);
        assert!(finite.is_finite());

        let with_nan = ParameterSet::from(vec![arr1(&[0.25, f64::NAN]).into_dyn()]);
        assert!(!with_nan.is_finite());

        let with_infinity = ParameterSet::from(vec![arr1(&[f64::INFINITY]).into_dyn()]);
        assert!(!with_infinity.is_finite());
    }

    #[test]
    fn test_empty_parameter_set() {
        let empty = ParameterSet::default();
        assert!(empty.is_empty());
        assert_eq!(empty.len(), 0);
        assert!(empty.is_finite());
    }
}

//! Sample-weighted aggregation of client updates.

use chrono::Utc;
use ndarray::ArrayD;
use thiserror::Error;

use crate::model::{ModelUpdate, ParameterSet, PerformanceSnapshot};

/// Errors related to aggregating client updates.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregationError {
    #[error("no updates to aggregate")]
    NoUpdates,
    #[error("update of client {client} carries {actual} tensors, expected {expected}")]
    TensorCountMismatch {
        client: String,
        expected: usize,
        actual: usize,
    },
    #[error("tensor {index} of client {client} has shape {actual:?}, expected {expected:?}")]
    ShapeMismatch {
        client: String,
        index: usize,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
}

/// Computes the sample-weighted elementwise mean of the given updates.
///
/// Every update contributes proportionally to its `sample_count`. All updates must
/// agree on tensor count and per-tensor shapes; the first disagreement aborts the whole
/// aggregation, there is no partial result.
///
/// # Errors
/// Fails if `updates` is empty or the updates disagree on dimensions.
pub fn aggregate(updates: &[ModelUpdate]) -> Result<ParameterSet, AggregationError> {
    let first = updates.first().ok_or(AggregationError::NoUpdates)?;
    let mut accumulator: Vec<ArrayD<f64>> = first
        .parameters
        .iter()
        .map(|tensor| ArrayD::zeros(tensor.raw_dim()))
        .collect();
    let mut total_samples = 0_u64;
    for update in updates {
        check_dimensions(&first.parameters, update)?;
        for (sum, tensor) in accumulator.iter_mut().zip(update.parameters.iter()) {
            sum.scaled_add(update.sample_count as f64, tensor);
        }
        total_samples += update.sample_count;
    }
    for sum in accumulator.iter_mut() {
        *sum /= total_samples as f64;
    }
    Ok(accumulator.into())
}

/// Folds per-client metrics into the sample-weighted snapshot of one round.
///
/// Uses the same weights as [`aggregate`] and stamps the snapshot with the participant
/// count, the total sample count and the current UTC time.
pub fn evaluate(updates: &[ModelUpdate], round_number: u64) -> PerformanceSnapshot {
    let total_samples: u64 = updates.iter().map(|update| update.sample_count).sum();
    let mut weighted_accuracy = 0.0;
    let mut weighted_loss = 0.0;
    if total_samples > 0 {
        for update in updates {
            let weight = update.sample_count as f64 / total_samples as f64;
            weighted_accuracy += weight * update.local_metrics.accuracy;
            weighted_loss += weight * update.local_metrics.loss;
        }
    }
    PerformanceSnapshot {
        round_number,
        weighted_accuracy,
        weighted_loss,
        participant_count: updates.len(),
        total_samples,
        timestamp: Utc::now(),
    }
}

fn check_dimensions(
    reference: &ParameterSet,
    update: &ModelUpdate,
) -> Result<(), AggregationError> {
    if update.parameters.len() != reference.len() {
        return Err(AggregationError::TensorCountMismatch {
            client: update.client_id.clone(),
            expected: reference.len(),
            actual: update.parameters.len(),
        });
    }
    for (index, (expected, actual)) in reference.iter().zip(update.parameters.iter()).enumerate()
    {
        if expected.shape() != actual.shape() {
            return Err(AggregationError::ShapeMismatch {
                client: update.client_id.clone(),
                index,
                expected: expected.shape().to_vec(),
                actual: actual.shape().to_vec(),
            });
        }
    }
    Ok(())
}

//! An in-process cohort for demos and reproducible runs.

use std::sync::{Arc, Mutex, MutexGuard};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

use fedmed_core::model::{LocalMetrics, ModelUpdate, ParameterSet};

use super::{ClientTransport, TransportError};
use crate::registry::ClientId;

/// A cohort of simulated sites.
///
/// Every site "trains" by echoing the most recently pushed global parameters with a
/// random sample count in `100..1000` and random local metrics (accuracy in `0.7..0.9`,
/// loss in `0.1..0.5`). Construction seeds the echo with a template parameter set, so
/// the first round works against a coordinator that holds no global model yet.
///
/// Clones share state: a model pushed through one clone is fetched through any other.
#[derive(Clone)]
pub struct SimulatedCohort {
    shared: Arc<Shared>,
}

struct Shared {
    parameters: Mutex<ParameterSet>,
    rng: Mutex<ChaCha20Rng>,
}

impl SimulatedCohort {
    /// Creates a cohort echoing `template`, drawing its randomness from entropy.
    pub fn new(template: ParameterSet) -> Self {
        Self::with_rng(template, ChaCha20Rng::from_entropy())
    }

    /// Creates a cohort with reproducible randomness.
    pub fn seeded(template: ParameterSet, seed: u64) -> Self {
        Self::with_rng(template, ChaCha20Rng::seed_from_u64(seed))
    }

    fn with_rng(template: ParameterSet, rng: ChaCha20Rng) -> Self {
        Self {
            shared: Arc::new(Shared {
                parameters: Mutex::new(template),
                rng: Mutex::new(rng),
            }),
        }
    }

    fn draw(&self) -> (u64, LocalMetrics) {
        let mut rng = self
            .shared
            .rng
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let sample_count = rng.gen_range(100..1000);
        let local_metrics = LocalMetrics {
            accuracy: rng.gen_range(0.7..0.9),
            loss: rng.gen_range(0.1..0.5),
        };
        (sample_count, local_metrics)
    }

    fn parameters(&self) -> MutexGuard<ParameterSet> {
        self.shared
            .parameters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ClientTransport for SimulatedCohort {
    async fn fetch_update(&self, id: &ClientId) -> Result<ModelUpdate, TransportError> {
        let parameters = self.parameters().clone();
        let (sample_count, local_metrics) = self.draw();
        Ok(ModelUpdate {
            client_id: id.as_str().to_string(),
            parameters,
            sample_count,
            local_metrics,
        })
    }

    async fn push_model(
        &self,
        _id: &ClientId,
        model: Arc<ParameterSet>,
    ) -> Result<(), TransportError> {
        *self.parameters() = (*model).clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use fedmed_core::testutils;

    use super::*;

    #[tokio::test]
    async fn test_updates_echo_the_template_before_any_push() {
        let template = testutils::parameter_set(&[1.0, 2.0]);
        let cohort = SimulatedCohort::seeded(template.clone(), 42);
        let update = cohort.fetch_update(&"site-a".into()).await.unwrap();
        assert_eq!(update.client_id, "site-a");
        assert_eq!(update.parameters, template);
    }

    #[tokio::test]
    async fn test_updates_echo_the_last_pushed_model() {
        let cohort = SimulatedCohort::seeded(testutils::parameter_set(&[0.0]), 42);
        let published = Arc::new(testutils::parameter_set(&[0.5]));
        cohort
            .push_model(&"site-a".into(), published.clone())
            .await
            .unwrap();
        // through a clone: all handles share the cohort state
        let update = cohort.clone().fetch_update(&"site-b".into()).await.unwrap();
        assert_eq!(update.parameters, *published);
    }

    #[tokio::test]
    async fn test_draws_stay_in_their_ranges() {
        let cohort = SimulatedCohort::seeded(testutils::parameter_set(&[0.0]), 42);
        for _ in 0..100 {
            let update = cohort.fetch_update(&"site-a".into()).await.unwrap();
            assert!((100..1000).contains(&update.sample_count));
            assert!((0.7..0.9).contains(&update.local_metrics.accuracy));
            assert!((0.1..0.5).contains(&update.local_metrics.loss));
        }
    }

    #[tokio::test]
    async fn test_seeded_cohorts_are_reproducible() {
        let first = SimulatedCohort::seeded(testutils::parameter_set(&[0.0]), 42);
        let second = SimulatedCohort::seeded(testutils::parameter_set(&[0.0]), 42);
        for _ in 0..10 {
            let a = first.fetch_update(&"site-a".into()).await.unwrap();
            let b = second.fetch_update(&"site-a".into()).await.unwrap();
            assert_eq!(a.sample_count, b.sample_count);
            assert_eq!(a.local_metrics.accuracy, b.local_metrics.accuracy);
            assert_eq!(a.local_metrics.loss, b.local_metrics.loss);
        }
    }
}

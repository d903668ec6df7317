//! Communication with participating sites.

use std::sync::Arc;

use thiserror::Error;

use fedmed_core::model::{ModelUpdate, ParameterSet};

use crate::registry::ClientId;

mod simulated;
pub use self::simulated::SimulatedCohort;

/// An error related to exchanging models with one site.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The site cannot be reached.
    #[error("client is unreachable: {0}")]
    Unreachable(String),
    /// The site is reachable but holds no update for the running round.
    #[error("client has no update available")]
    NoUpdate,
    /// Any other transport failure.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Exchanges models with participating sites.
///
/// The coordinator holds one transport for the whole cohort and calls it from
/// concurrent per-site tasks, hence the bounds. Implementations multiplex on the
/// client id.
#[async_trait]
pub trait ClientTransport: Clone + Send + Sync + 'static {
    /// Fetches the local update of one site for the running round.
    async fn fetch_update(&self, id: &ClientId) -> Result<ModelUpdate, TransportError>;

    /// Pushes a published global model to one site.
    async fn push_model(
        &self,
        id: &ClientId,
        model: Arc<ParameterSet>,
    ) -> Result<(), TransportError>;
}

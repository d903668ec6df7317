use async_trait::async_trait;
use futures::{future, StreamExt};
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use fedmed_core::model::ModelUpdate;

use crate::{
    registry::ClientId,
    state_machine::{
        phases::{Aggregate, Phase, PhaseName, PhaseState, Shared},
        requests::{RoundError, RoundTrigger, StateMachineRequest},
        StateMachine,
    },
    transport::{ClientTransport, TransportError},
};

/// Reason a site is excluded from the running round.
#[derive(Debug, Error)]
pub enum ClientUnavailable {
    #[error("the fetch task did not run to completion")]
    TaskFailed,
    #[error("the update fetch timed out")]
    TimedOut,
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("the update is malformed: {0}")]
    Malformed(&'static str),
}

/// Collect state
#[derive(Debug)]
pub struct Collect {
    /// The trigger that started this round.
    trigger: Option<RoundTrigger>,

    /// The updates delivered by the cohort so far.
    updates: Vec<ModelUpdate>,
}

#[async_trait]
impl<T> Phase<T> for PhaseState<Collect, T>
where
    T: ClientTransport,
{
    const NAME: PhaseName = PhaseName::Collect;

    /// Fetches a local update from every active site.
    ///
    /// Each fetch runs as its own task under the configured timeout. A site that
    /// errors, stalls or delivers a malformed update is excluded from this round and
    /// nothing else. The phase fails with [`RoundError::NoUpdates`] when no site
    /// delivers, and with [`RoundError::Canceled`] when a cancellation request
    /// arrives while the fetches are in flight.
    async fn run(&mut self) -> Result<(), RoundError> {
        let ids = self.shared.registry.active_ids();
        info!("collecting updates from {} active sites", ids.len());

        let fetch_timeout = self.shared.state.round.fetch_timeout;
        let fetches = ids
            .into_iter()
            .map(|id| {
                let transport = self.shared.transport.clone();
                let fetch_id = id.clone();
                let task = tokio::spawn(async move {
                    timeout(fetch_timeout, transport.fetch_update(&fetch_id)).await
                });
                async move { (id, task.await) }
            })
            .collect::<Vec<_>>();

        let gather = future::join_all(fetches);
        tokio::pin!(gather);

        let results = loop {
            tokio::select! {
                results = &mut gather => break results,
                next = self.shared.request_rx.next() => match next {
                    Some((request, span)) => {
                        let _span_guard = span.enter();
                        match request {
                            StateMachineRequest::CancelRound(responder) => {
                                warn!("round canceled while collecting updates");
                                responder.send(Ok(()));
                                return Err(RoundError::Canceled);
                            }
                            StateMachineRequest::RunRound(responder) => {
                                debug!("a round is already in progress");
                                responder.send(Err(RoundError::RoundInProgress));
                            }
                            StateMachineRequest::Checkpoint(responder) => {
                                debug!("checkpoints are not taken mid-round");
                                responder.send(Err(RoundError::RoundInProgress));
                            }
                        }
                    }
                    None => {
                        error!("request channel broken: all senders have been dropped");
                        return Err(RoundError::Shutdown);
                    }
                },
            }
        };

        for (id, outcome) in results {
            let outcome = match outcome {
                Err(_) => Err(ClientUnavailable::TaskFailed),
                Ok(Err(_)) => Err(ClientUnavailable::TimedOut),
                Ok(Ok(Err(err))) => Err(ClientUnavailable::from(err)),
                Ok(Ok(Ok(update))) => validate_update(&id, update),
            };
            match outcome {
                Ok(update) => {
                    debug!("received an update from {}", id);
                    self.private.updates.push(update);
                }
                Err(cause) => warn!("excluding {} from this round: {}", id, cause),
            }
        }

        if self.private.updates.is_empty() {
            return Err(RoundError::NoUpdates);
        }
        info!("collected {} updates", self.private.updates.len());
        Ok(())
    }

    fn next(self) -> Option<StateMachine<T>> {
        let PhaseState {
            private: Collect { trigger, updates },
            shared,
        } = self;

        // Safe unwrap: the trigger is only taken out when the phase fails.
        let trigger = trigger.unwrap();
        Some(PhaseState::<Aggregate, T>::new(shared, trigger, updates).into())
    }

    fn take_trigger(&mut self) -> Option<RoundTrigger> {
        self.private.trigger.take()
    }
}

impl<T> PhaseState<Collect, T> {
    /// Creates a new collect state.
    pub fn new(shared: Shared<T>, trigger: RoundTrigger) -> Self {
        Self {
            private: Collect {
                trigger: Some(trigger),
                updates: Vec::new(),
            },
            shared,
        }
    }
}

/// Checks an update for the defects that disqualify it from aggregation.
fn validate_update(id: &ClientId, update: ModelUpdate) -> Result<ModelUpdate, ClientUnavailable> {
    if update.client_id != id.as_str() {
        return Err(ClientUnavailable::Malformed("client id mismatch"));
    }
    if update.sample_count == 0 {
        return Err(ClientUnavailable::Malformed("zero sample count"));
    }
    if update.parameters.is_empty() {
        return Err(ClientUnavailable::Malformed("empty parameter set"));
    }
    if !update.parameters.is_finite() {
        return Err(ClientUnavailable::Malformed("non-finite parameter values"));
    }
    Ok(update)
}

#[cfg(test)]
mod tests {
    use fedmed_core::testutils;

    use super::*;

    fn id() -> ClientId {
        ClientId::from("site-1")
    }

    #[test]
    fn test_valid_update_passes() {
        let update = testutils::model_update("site-1", 10, &[1.0, 2.0]);
        assert!(validate_update(&id(), update).is_ok());
    }

    #[test]
    fn test_client_id_mismatch_is_malformed() {
        let update = testutils::model_update("site-2", 10, &[1.0]);
        let err = validate_update(&id(), update).unwrap_err();
        assert!(matches!(err, ClientUnavailable::Malformed("client id mismatch")));
    }

    #[test]
    fn test_zero_sample_count_is_malformed() {
        let update = testutils::model_update("site-1", 0, &[1.0]);
        let err = validate_update(&id(), update).unwrap_err();
        assert!(matches!(err, ClientUnavailable::Malformed("zero sample count")));
    }

    #[test]
    fn test_empty_parameter_set_is_malformed() {
        let mut update = testutils::model_update("site-1", 10, &[1.0]);
        update.parameters = Default::default();
        let err = validate_update(&id(), update).unwrap_err();
        assert!(matches!(err, ClientUnavailable::Malformed("empty parameter set")));
    }

    #[test]
    fn test_non_finite_values_are_malformed() {
        let update = testutils::model_update("site-1", 10, &[1.0, f64::NAN]);
        let err = validate_update(&id(), update).unwrap_err();
        assert!(matches!(
            err,
            ClientUnavailable::Malformed("non-finite parameter values")
        ));
    }
}

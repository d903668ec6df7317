use std::sync::Arc;

use async_trait::async_trait;
use futures::future;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use fedmed_core::model::{ParameterSet, PerformanceSnapshot};

use crate::{
    state_machine::{
        events::ModelEvent,
        phases::{Idle, Phase, PhaseName, PhaseState, Shared},
        requests::{RoundError, RoundOutcome, RoundTrigger},
        StateMachine,
    },
    transport::ClientTransport,
};

/// Publish state
#[derive(Debug)]
pub struct Publish {
    /// The trigger that started this round.
    trigger: Option<RoundTrigger>,

    /// The committed global model.
    model: Arc<ParameterSet>,

    /// The performance snapshot of the committed round.
    snapshot: PerformanceSnapshot,
}

#[async_trait]
impl<T> Phase<T> for PhaseState<Publish, T>
where
    T: ClientTransport,
{
    const NAME: PhaseName = PhaseName::Publish;

    /// Publishes the committed round.
    ///
    /// The new model and snapshot go out on the event channels, the caller that
    /// triggered the round receives its outcome, and every active site gets the
    /// model pushed back. The round is already committed: a failed push costs the
    /// site its copy of this model, not the cohort its round.
    async fn run(&mut self) -> Result<(), RoundError> {
        info!("broadcasting the new global model");
        self.shared
            .events
            .broadcast_model(ModelEvent::New(self.private.model.clone()));
        self.shared
            .events
            .broadcast_snapshot(Some(self.private.snapshot.clone()));

        if let Some(trigger) = self.private.trigger.take() {
            trigger.send(Ok(RoundOutcome {
                round_number: self.shared.round_number(),
                snapshot: self.private.snapshot.clone(),
            }));
        }

        self.distribute().await;
        Ok(())
    }

    fn next(self) -> Option<StateMachine<T>> {
        info!("going back to idle phase");
        Some(PhaseState::<Idle, T>::new(self.shared).into())
    }

    fn take_trigger(&mut self) -> Option<RoundTrigger> {
        self.private.trigger.take()
    }
}

impl<T> PhaseState<Publish, T>
where
    T: ClientTransport,
{
    /// Pushes the global model to every active site, best effort.
    async fn distribute(&mut self) {
        let ids = self.shared.registry.active_ids();
        info!("pushing the global model to {} active sites", ids.len());

        let push_timeout = self.shared.state.round.push_timeout;
        let pushes = ids
            .into_iter()
            .map(|id| {
                let transport = self.shared.transport.clone();
                let model = self.private.model.clone();
                let push_id = id.clone();
                let task = tokio::spawn(async move {
                    timeout(push_timeout, transport.push_model(&push_id, model)).await
                });
                async move { (id, task.await) }
            })
            .collect::<Vec<_>>();

        for (id, outcome) in future::join_all(pushes).await {
            match outcome {
                Ok(Ok(Ok(()))) => debug!("pushed the global model to {}", id),
                Ok(Ok(Err(err))) => warn!("failed to push the global model to {}: {}", id, err),
                Ok(Err(_)) => warn!("pushing the global model to {} timed out", id),
                Err(_) => warn!("the push task for {} did not run to completion", id),
            }
        }
    }
}

impl<T> PhaseState<Publish, T> {
    /// Creates a new publish state.
    pub fn new(
        shared: Shared<T>,
        trigger: RoundTrigger,
        model: Arc<ParameterSet>,
        snapshot: PerformanceSnapshot,
    ) -> Self {
        Self {
            private: Publish {
                trigger: Some(trigger),
                model,
                snapshot,
            },
            shared,
        }
    }
}

use std::{mem, sync::Arc};

use async_trait::async_trait;
use tracing::info;

use fedmed_core::{
    aggregation,
    model::{ModelUpdate, ParameterSet, PerformanceSnapshot},
};

use crate::{
    registry::ClientId,
    state_machine::{
        phases::{Phase, PhaseName, PhaseState, Publish, Shared},
        requests::{RoundError, RoundTrigger},
        StateMachine,
    },
    transport::ClientTransport,
};

/// Evaluate state
#[derive(Debug)]
pub struct Evaluate {
    /// The trigger that started this round.
    trigger: Option<RoundTrigger>,

    /// The updates that contributed to the aggregate.
    updates: Vec<ModelUpdate>,

    /// The sample-weighted average produced by the aggregate phase.
    aggregate: ParameterSet,

    /// The committed model and its snapshot, set when the phase completes.
    committed: Option<(Arc<ParameterSet>, PerformanceSnapshot)>,
}

#[async_trait]
impl<T> Phase<T> for PhaseState<Evaluate, T>
where
    T: ClientTransport,
{
    const NAME: PhaseName = PhaseName::Evaluate;

    /// Computes the cohort-wide metrics and commits the round.
    ///
    /// The commit covers the new global parameters, the bumped round number, one new
    /// history entry and the participation marks of every contributing site. It all
    /// lands here, before the publish phase broadcasts anything.
    async fn run(&mut self) -> Result<(), RoundError> {
        let round_number = self.shared.round_number() + 1;
        let snapshot = aggregation::evaluate(&self.private.updates, round_number);
        info!(
            "round {} evaluated: weighted accuracy {:.4}, weighted loss {:.4}",
            round_number, snapshot.weighted_accuracy, snapshot.weighted_loss
        );

        let parameters = mem::take(&mut self.private.aggregate);
        let model = Arc::new(parameters.clone());

        self.shared.state.global.parameters = Some(parameters);
        self.shared.state.global.updated_at = snapshot.timestamp;
        self.shared.state.history.push(snapshot.clone());
        self.shared.set_round_number(round_number);

        let contributors = self
            .private
            .updates
            .iter()
            .map(|update| ClientId::from(update.client_id.as_str()))
            .collect::<Vec<_>>();
        self.shared
            .registry
            .record_participation(&contributors, round_number);

        self.private.committed = Some((model, snapshot));
        Ok(())
    }

    fn next(self) -> Option<StateMachine<T>> {
        let PhaseState {
            private:
                Evaluate {
                    trigger, committed, ..
                },
            shared,
        } = self;

        // Safe unwrap: `run` commits the round before the transition, and the
        // trigger is only taken out when the phase fails.
        let trigger = trigger.unwrap();
        let (model, snapshot) = committed.unwrap();
        Some(PhaseState::<Publish, T>::new(shared, trigger, model, snapshot).into())
    }

    fn take_trigger(&mut self) -> Option<RoundTrigger> {
        self.private.trigger.take()
    }
}

impl<T> PhaseState<Evaluate, T> {
    /// Creates a new evaluate state.
    pub fn new(
        shared: Shared<T>,
        trigger: RoundTrigger,
        updates: Vec<ModelUpdate>,
        aggregate: ParameterSet,
    ) -> Self {
        Self {
            private: Evaluate {
                trigger: Some(trigger),
                updates,
                aggregate,
                committed: None,
            },
            shared,
        }
    }
}

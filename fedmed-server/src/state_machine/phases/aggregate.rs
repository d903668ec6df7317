use async_trait::async_trait;
use tracing::info;

use fedmed_core::{
    aggregation,
    model::{ModelUpdate, ParameterSet},
};

use crate::{
    state_machine::{
        phases::{Evaluate, Phase, PhaseName, PhaseState, Shared},
        requests::{RoundError, RoundTrigger},
        StateMachine,
    },
    transport::ClientTransport,
};

/// Aggregate state
#[derive(Debug)]
pub struct Aggregate {
    /// The trigger that started this round.
    trigger: Option<RoundTrigger>,

    /// The updates accepted during the collect phase.
    updates: Vec<ModelUpdate>,

    /// The sample-weighted average, set when the phase completes.
    aggregate: Option<ParameterSet>,
}

#[cfg(test)]
impl Aggregate {
    pub fn updates(&self) -> &[ModelUpdate] {
        &self.updates
    }
}

#[async_trait]
impl<T> Phase<T> for PhaseState<Aggregate, T>
where
    T: ClientTransport,
{
    const NAME: PhaseName = PhaseName::Aggregate;

    /// Folds the accepted updates into their sample-weighted average.
    ///
    /// A tensor-count or shape mismatch between any update and the first one fails
    /// the whole round: averaging incompatible parameter sets element-wise is not
    /// meaningful.
    async fn run(&mut self) -> Result<(), RoundError> {
        info!("aggregating {} updates", self.private.updates.len());
        let aggregate = aggregation::aggregate(&self.private.updates)?;
        self.private.aggregate = Some(aggregate);
        Ok(())
    }

    fn next(self) -> Option<StateMachine<T>> {
        let PhaseState {
            private:
                Aggregate {
                    trigger,
                    updates,
                    aggregate,
                },
            shared,
        } = self;

        // Safe unwrap: `run` populates the aggregate before the transition, and the
        // trigger is only taken out when the phase fails.
        let trigger = trigger.unwrap();
        let aggregate = aggregate.unwrap();
        Some(PhaseState::<Evaluate, T>::new(shared, trigger, updates, aggregate).into())
    }

    fn take_trigger(&mut self) -> Option<RoundTrigger> {
        self.private.trigger.take()
    }
}

impl<T> PhaseState<Aggregate, T> {
    /// Creates a new aggregate state.
    pub fn new(shared: Shared<T>, trigger: RoundTrigger, updates: Vec<ModelUpdate>) -> Self {
        Self {
            private: Aggregate {
                trigger: Some(trigger),
                updates,
                aggregate: None,
            },
            shared,
        }
    }
}

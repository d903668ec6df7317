use async_trait::async_trait;
use tracing::error;

use crate::{
    state_machine::{
        phases::{Idle, Phase, PhaseName, PhaseState, Shared, Shutdown},
        requests::{RoundError, RoundTrigger},
        StateMachine,
    },
    transport::ClientTransport,
};

/// The failure state.
#[derive(Debug)]
pub struct Failure {
    /// The error that brought the machine here.
    error: RoundError,

    /// The trigger of the failed round, if one was pending.
    trigger: Option<RoundTrigger>,
}

#[async_trait]
impl<T> Phase<T> for PhaseState<Failure, T>
where
    T: ClientTransport,
{
    const NAME: PhaseName = PhaseName::Failure;

    /// Answers the pending round trigger with the error that failed the round.
    ///
    /// The failed round left no trace in the coordinator state, so apart from the
    /// answer there is nothing to roll back.
    async fn run(&mut self) -> Result<(), RoundError> {
        error!("state machine failed: {}", self.private.error);

        if let Some(trigger) = self.private.trigger.take() {
            trigger.send(Err(self.private.error.clone()));
        }
        Ok(())
    }

    fn next(self) -> Option<StateMachine<T>> {
        Some(match self.private.error {
            RoundError::Shutdown => PhaseState::<Shutdown, T>::new(self.shared).into(),
            _ => PhaseState::<Idle, T>::new(self.shared).into(),
        })
    }
}

impl<T> PhaseState<Failure, T> {
    /// Creates a new failure state.
    pub fn new(shared: Shared<T>, error: RoundError, trigger: Option<RoundTrigger>) -> Self {
        Self {
            private: Failure { error, trigger },
            shared,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::{requests::response_channel, tests::builder::StateMachineBuilder};

    #[tokio::test]
    async fn integration_shutdown_error_moves_to_shutdown() {
        let (state_machine, _request_tx, events) = StateMachineBuilder::new()
            .with_phase(Failure {
                error: RoundError::Shutdown,
                trigger: None,
            })
            .build();
        assert!(state_machine.is_failure());

        let state_machine = state_machine.next().await.unwrap();
        assert!(state_machine.is_shutdown());
        assert_eq!(
            events.phase_listener().get_latest().event,
            PhaseName::Failure,
        );
    }

    #[tokio::test]
    async fn integration_round_error_goes_back_to_idle() {
        let (state_machine, _request_tx, _events) = StateMachineBuilder::new()
            .with_phase(Failure {
                error: RoundError::NoUpdates,
                trigger: None,
            })
            .build();

        let state_machine = state_machine.next().await.unwrap();
        assert!(state_machine.is_idle());
    }

    #[tokio::test]
    async fn integration_pending_trigger_receives_the_error() {
        let (trigger, outcome) = response_channel();
        let (state_machine, _request_tx, _events) = StateMachineBuilder::new()
            .with_phase(Failure {
                error: RoundError::Canceled,
                trigger: Some(trigger),
            })
            .build();

        let _state_machine = state_machine.next().await.unwrap();
        assert_eq!(outcome.await.unwrap_err(), RoundError::Canceled);
    }
}

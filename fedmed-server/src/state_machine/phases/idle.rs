use async_trait::async_trait;
use tracing::{debug, info};

use crate::{
    state_machine::{
        phases::{Collect, Phase, PhaseName, PhaseState, Shared},
        requests::{RoundError, RoundTrigger, StateMachineRequest},
        StateMachine,
    },
    transport::ClientTransport,
};

/// Idle state
#[derive(Debug, Default)]
pub struct Idle {
    /// The accepted trigger for the next round.
    trigger: Option<RoundTrigger>,
}

#[async_trait]
impl<T> Phase<T> for PhaseState<Idle, T>
where
    T: ClientTransport,
{
    const NAME: PhaseName = PhaseName::Idle;

    /// Waits for a round trigger.
    ///
    /// Cancellation and checkpoint requests are answered in place: there is no round
    /// to cancel, and the coordinator state is stable enough to export.
    async fn run(&mut self) -> Result<(), RoundError> {
        loop {
            let (request, span) = self.next_request().await?;
            let _span_guard = span.enter();
            match request {
                StateMachineRequest::RunRound(trigger) => {
                    info!("round trigger accepted");
                    self.private.trigger = Some(trigger);
                    return Ok(());
                }
                StateMachineRequest::CancelRound(responder) => {
                    debug!("no round in progress, nothing to cancel");
                    responder.send(Err(RoundError::NoActiveRound));
                }
                StateMachineRequest::Checkpoint(responder) => {
                    debug!("exporting a checkpoint");
                    responder.send(Ok(self.shared.state.checkpoint()));
                }
            }
        }
    }

    fn next(self) -> Option<StateMachine<T>> {
        let PhaseState {
            private: Idle { trigger },
            shared,
        } = self;

        // Safe unwrap: `run` only completes successfully once a trigger has been
        // accepted.
        let trigger = trigger.unwrap();
        Some(PhaseState::<Collect, T>::new(shared, trigger).into())
    }

    fn take_trigger(&mut self) -> Option<RoundTrigger> {
        self.private.trigger.take()
    }
}

impl<T> PhaseState<Idle, T> {
    /// Creates a new idle state.
    pub fn new(shared: Shared<T>) -> Self {
        Self {
            private: Idle { trigger: None },
            shared,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::tests::{builder::StateMachineBuilder, utils};

    #[tokio::test]
    async fn integration_trigger_moves_to_collect() {
        let (state_machine, request_tx, events) = StateMachineBuilder::new().build();
        assert!(state_machine.is_idle());
        assert_eq!(events.phase_listener().get_latest().event, PhaseName::Idle);

        let _outcome = utils::enqueue_round(&request_tx);
        let state_machine = state_machine.next().await.unwrap();
        assert!(state_machine.is_collect());
    }

    #[tokio::test]
    async fn integration_cancel_while_idle_is_rejected() {
        let (state_machine, request_tx, _events) = StateMachineBuilder::new().build();

        let cancel = utils::enqueue_cancel(&request_tx);
        let _outcome = utils::enqueue_round(&request_tx);

        let state_machine = state_machine.next().await.unwrap();
        assert!(state_machine.is_collect());
        assert_eq!(cancel.await.unwrap_err(), RoundError::NoActiveRound);
    }

    #[tokio::test]
    async fn integration_checkpoint_answered_in_place() {
        let (state_machine, request_tx, _events) = StateMachineBuilder::new().build();

        let checkpoint = utils::enqueue_checkpoint(&request_tx);
        let outcome = utils::enqueue_round(&request_tx);

        let state_machine = state_machine.next().await.unwrap();
        assert!(state_machine.is_collect());

        let checkpoint = checkpoint.await.unwrap();
        assert_eq!(checkpoint.round_number, 0);
        assert!(checkpoint.parameters.is_none());
        assert!(checkpoint.history.is_empty());

        // Dropping the machine drops the stashed trigger along with it.
        drop(state_machine);
        assert_eq!(outcome.await.unwrap_err(), RoundError::Shutdown);
    }
}

use async_trait::async_trait;
use tracing::{debug, info};

use crate::{
    state_machine::{
        phases::{Phase, PhaseName, PhaseState, Shared},
        requests::{RoundError, StateMachineRequest},
        StateMachine,
    },
    transport::ClientTransport,
};

/// Shutdown state
#[derive(Debug)]
pub struct Shutdown;

#[async_trait]
impl<T> Phase<T> for PhaseState<Shutdown, T>
where
    T: ClientTransport,
{
    const NAME: PhaseName = PhaseName::Shutdown;

    /// Shuts the state machine down.
    ///
    /// The request channel is closed and every request still queued in it receives
    /// [`RoundError::Shutdown`], so no caller is left waiting on a machine that is
    /// gone.
    async fn run(&mut self) -> Result<(), RoundError> {
        info!("clearing the request channel");
        self.shared.request_rx.close();

        while let Some((request, _span)) = self.shared.request_rx.recv().await {
            debug!("answering a queued request with the shutdown error");
            match request {
                StateMachineRequest::RunRound(responder) => {
                    responder.send(Err(RoundError::Shutdown));
                }
                StateMachineRequest::CancelRound(responder) => {
                    responder.send(Err(RoundError::Shutdown));
                }
                StateMachineRequest::Checkpoint(responder) => {
                    responder.send(Err(RoundError::Shutdown));
                }
            }
        }
        Ok(())
    }

    fn next(self) -> Option<StateMachine<T>> {
        None
    }
}

impl<T> PhaseState<Shutdown, T> {
    /// Creates a new shutdown state.
    pub fn new(shared: Shared<T>) -> Self {
        Self {
            private: Shutdown,
            shared,
        }
    }
}

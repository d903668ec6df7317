//! The phases of the state machine.
//!
//! A round moves through `Idle`, `Collect`, `Aggregate`, `Evaluate` and `Publish`.
//! Any phase failure routes through `Failure`, which answers the pending round
//! trigger and decides whether the machine returns to `Idle` or shuts down.

mod aggregate;
mod collect;
mod evaluate;
mod failure;
mod idle;
mod publish;
mod shutdown;

use std::fmt;

use async_trait::async_trait;
use futures::StreamExt;
use tracing::{debug, error, error_span, info, warn, Span};
use tracing_futures::Instrument;

pub use self::{
    aggregate::Aggregate,
    collect::{ClientUnavailable, Collect},
    evaluate::Evaluate,
    failure::Failure,
    idle::Idle,
    publish::Publish,
    shutdown::Shutdown,
};
use crate::{
    registry::Registry,
    state_machine::{
        coordinator::CoordinatorState,
        events::EventPublisher,
        requests::{RequestReceiver, RoundError, RoundTrigger, StateMachineRequest},
        StateMachine,
    },
    transport::ClientTransport,
};

/// Name of the current phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseName {
    Idle,
    Collect,
    Aggregate,
    Evaluate,
    Publish,
    Failure,
    Shutdown,
}

/// A trait that must be implemented by a state in order to move to a next state.
#[async_trait]
pub trait Phase<T> {
    /// Name of the current phase.
    const NAME: PhaseName;

    /// Runs this phase to completion.
    async fn run(&mut self) -> Result<(), RoundError>;

    /// Moves from this state to the next state.
    fn next(self) -> Option<StateMachine<T>>;

    /// Releases the round trigger of this phase, if it carries one.
    ///
    /// Called when the phase fails, so that the failure state can still answer the
    /// caller that triggered the round.
    fn take_trigger(&mut self) -> Option<RoundTrigger> {
        None
    }
}

/// The state and I/O interfaces that are shared across all phases.
pub struct Shared<T> {
    /// The coordinator state.
    pub(in crate::state_machine) state: CoordinatorState,
    /// The receiving half of the request channel.
    pub(in crate::state_machine) request_rx: RequestReceiver,
    /// The publisher half of the event channels.
    pub(in crate::state_machine) events: EventPublisher,
    /// The registry of participating sites.
    pub(in crate::state_machine) registry: Registry,
    /// The transport to the sites.
    pub(in crate::state_machine) transport: T,
}

impl<T> fmt::Debug for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Shared").field("state", &self.state).finish()
    }
}

impl<T> Shared<T> {
    /// Creates a new shared state.
    pub fn new(
        state: CoordinatorState,
        request_rx: RequestReceiver,
        events: EventPublisher,
        registry: Registry,
        transport: T,
    ) -> Self {
        Self {
            state,
            request_rx,
            events,
            registry,
            transport,
        }
    }

    /// Sets the round number and stamps subsequent events with it.
    pub fn set_round_number(&mut self, round_number: u64) {
        self.state.global.round_number = round_number;
        self.events.set_round_number(round_number);
    }

    /// The number of the latest committed round.
    pub fn round_number(&self) -> u64 {
        self.state.global.round_number
    }
}

/// The state corresponding to one phase.
///
/// Holds the phase-dependent `private` state and the state-independent `shared` state
/// which crosses phase transitions.
pub struct PhaseState<S, T> {
    /// The private state.
    pub(in crate::state_machine) private: S,
    /// The shared state and I/O interfaces.
    pub(in crate::state_machine) shared: Shared<T>,
}

impl<S, T> PhaseState<S, T>
where
    Self: Phase<T>,
    T: ClientTransport,
{
    /// Runs the current phase to completion, then transitions to the next phase and
    /// returns it.
    ///
    /// If the phase fails, its round trigger is carried over to the failure state so
    /// the caller that triggered the round still receives an answer.
    pub async fn run_phase(mut self) -> Option<StateMachine<T>> {
        let phase = Self::NAME;
        let span = error_span!("run_phase", phase = ?phase);

        async move {
            info!("starting phase");
            self.shared.events.broadcast_phase(phase);

            if let Err(err) = self.run().await {
                warn!("failed to perform the phase tasks");
                let trigger = self.take_trigger();
                return Some(self.into_failure_state(err, trigger));
            }
            info!("phase ran successfully");

            info!("transitioning to the next phase");
            self.next()
        }
        .instrument(span)
        .await
    }

    /// Converts the current phase state to the failure state.
    fn into_failure_state(
        self,
        err: RoundError,
        trigger: Option<RoundTrigger>,
    ) -> StateMachine<T> {
        PhaseState::<Failure, T>::new(self.shared, err, trigger).into()
    }
}

// Functions that are available to all phases.
impl<S, T> PhaseState<S, T> {
    /// Receives the next request.
    ///
    /// # Errors
    /// Fails with [`RoundError::Shutdown`] when all request senders have been dropped.
    pub(in crate::state_machine) async fn next_request(
        &mut self,
    ) -> Result<(StateMachineRequest, Span), RoundError> {
        debug!("waiting for the next incoming request");
        self.shared.request_rx.next().await.ok_or_else(|| {
            error!("request channel broken: all senders have been dropped");
            RoundError::Shutdown
        })
    }
}

//! The state machine that drives training rounds through their phases.
//!
//! # Overview
//!
//! A round is a straight line through five phases, with a failure phase catching
//! everything that goes wrong along the way:
//!
//! `Idle -> Collect -> Aggregate -> Evaluate -> Publish -> Idle`
//!
//! # Phase states
//!
//! **Idle**
//!
//! Publishes [`PhaseName::Idle`] and waits for a round trigger. Cancellations are
//! rejected with [`RoundError::NoActiveRound`] and checkpoint requests are answered
//! in place.
//!
//! **Collect**
//!
//! Publishes [`PhaseName::Collect`] and fetches a local update from every active
//! site, each fetch on its own task under the configured timeout. Sites that fail,
//! stall or deliver malformed updates are excluded from the round they failed in;
//! the phase fails if no site delivers. A cancellation request interrupts the round
//! here.
//!
//! **Aggregate**
//!
//! Publishes [`PhaseName::Aggregate`] and folds the accepted updates into their
//! sample-weighted average. Incompatible parameter shapes fail the round.
//!
//! **Evaluate**
//!
//! Publishes [`PhaseName::Evaluate`], computes the cohort-wide weighted metrics and
//! commits the round: the new global parameters, the bumped round number, one new
//! history entry and the participation marks all land here.
//!
//! **Publish**
//!
//! Publishes [`PhaseName::Publish`], broadcasts the committed model and snapshot on
//! the event channels, answers the round trigger and pushes the model back to every
//! active site, best effort.
//!
//! **Failure**
//!
//! Publishes [`PhaseName::Failure`] and answers the pending round trigger with the
//! error that failed the round. The machine returns to `Idle`, or moves to
//! `Shutdown` when the request channel is gone.
//!
//! **Shutdown**
//!
//! Publishes [`PhaseName::Shutdown`], closes the request channel and answers
//! everything still queued in it with [`RoundError::Shutdown`].
//!
//! # Requests
//!
//! By initiating a new [`StateMachine`] via [`StateMachineInitializer::init()`], a
//! new request channel is created. The sender half ([`RequestSender`]) is returned
//! to the caller; triggering a round, cancelling it and exporting a checkpoint all
//! go through it. Every request is answered, either with its result or with the
//! error that ended it.
//!
//! # Events
//!
//! During operation the [`StateMachine`] publishes the phase it is in, the latest
//! global model and the latest performance snapshot on watch channels. The
//! [`EventSubscriber`] returned by [`StateMachineInitializer::init()`] hands out
//! the corresponding listeners.
//!
//! [`PhaseName::Idle`]: crate::state_machine::phases::PhaseName::Idle
//! [`PhaseName::Collect`]: crate::state_machine::phases::PhaseName::Collect
//! [`PhaseName::Aggregate`]: crate::state_machine::phases::PhaseName::Aggregate
//! [`PhaseName::Evaluate`]: crate::state_machine::phases::PhaseName::Evaluate
//! [`PhaseName::Publish`]: crate::state_machine::phases::PhaseName::Publish
//! [`PhaseName::Failure`]: crate::state_machine::phases::PhaseName::Failure
//! [`PhaseName::Shutdown`]: crate::state_machine::phases::PhaseName::Shutdown
//! [`RoundError::NoActiveRound`]: crate::state_machine::requests::RoundError::NoActiveRound
//! [`RoundError::Shutdown`]: crate::state_machine::requests::RoundError::Shutdown

pub mod coordinator;
pub mod events;
pub mod phases;
pub mod requests;

use derive_more::From;

use self::{
    coordinator::{Checkpoint, CoordinatorState},
    events::{EventPublisher, EventSubscriber},
    phases::{
        Aggregate,
        Collect,
        Evaluate,
        Failure,
        Idle,
        PhaseName,
        PhaseState,
        Publish,
        Shared,
        Shutdown,
    },
    requests::{RequestReceiver, RequestSender},
};
use crate::{registry::Registry, settings::RoundSettings, transport::ClientTransport};

/// The state machine with all its states.
#[derive(From)]
pub enum StateMachine<T> {
    Idle(PhaseState<Idle, T>),
    Collect(PhaseState<Collect, T>),
    Aggregate(PhaseState<Aggregate, T>),
    Evaluate(PhaseState<Evaluate, T>),
    Publish(PhaseState<Publish, T>),
    Failure(PhaseState<Failure, T>),
    Shutdown(PhaseState<Shutdown, T>),
}

impl<T> StateMachine<T>
where
    T: ClientTransport,
{
    /// Moves the [`StateMachine`] to the next state and consumes the current one.
    /// Returns the next state or `None` if the [`StateMachine`] reached the state
    /// [`Shutdown`].
    pub async fn next(self) -> Option<Self> {
        match self {
            StateMachine::Idle(state) => state.run_phase().await,
            StateMachine::Collect(state) => state.run_phase().await,
            StateMachine::Aggregate(state) => state.run_phase().await,
            StateMachine::Evaluate(state) => state.run_phase().await,
            StateMachine::Publish(state) => state.run_phase().await,
            StateMachine::Failure(state) => state.run_phase().await,
            StateMachine::Shutdown(state) => state.run_phase().await,
        }
    }

    /// Runs the state machine until it shuts down.
    /// The [`StateMachine`] shuts down once all [`RequestSender`] have been dropped.
    pub async fn run(mut self) -> Option<()> {
        loop {
            self = self.next().await?;
        }
    }
}

/// The initializer that assembles a new [`StateMachine`].
pub struct StateMachineInitializer<T> {
    round_settings: RoundSettings,
    registry: Registry,
    transport: T,
    checkpoint: Option<Checkpoint>,
}

impl<T> StateMachineInitializer<T>
where
    T: ClientTransport,
{
    /// Creates a new [`StateMachineInitializer`].
    pub fn new(round_settings: RoundSettings, registry: Registry, transport: T) -> Self {
        Self {
            round_settings,
            registry,
            transport,
            checkpoint: None,
        }
    }

    /// Resumes the coordinator state from a checkpoint instead of starting fresh.
    pub fn restore(mut self, checkpoint: Checkpoint) -> Self {
        self.checkpoint = Some(checkpoint);
        self
    }

    /// Initializes a new [`StateMachine`] with its request and event channels.
    pub fn init(self) -> (StateMachine<T>, RequestSender, EventSubscriber) {
        let Self {
            round_settings,
            registry,
            transport,
            checkpoint,
        } = self;

        let state = match checkpoint {
            Some(checkpoint) => {
                info!(
                    "restoring the coordinator state from a round {} checkpoint",
                    checkpoint.round_number
                );
                CoordinatorState::restore(round_settings, checkpoint)
            }
            None => CoordinatorState::new(round_settings),
        };

        let (event_publisher, event_subscriber) =
            EventPublisher::init(state.global.round_number, PhaseName::Idle);
        let (request_rx, request_tx) = RequestReceiver::new();
        let shared = Shared::new(state, request_rx, event_publisher, registry, transport);

        let state_machine = StateMachine::from(PhaseState::<Idle, T>::new(shared));
        (state_machine, request_tx, event_subscriber)
    }
}

#[cfg(test)]
pub(crate) mod tests;

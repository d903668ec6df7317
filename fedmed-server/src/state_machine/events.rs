//! The event channels of the state machine.
//!
//! The machine broadcasts its observable state over watch channels: the phase it is
//! in, the latest published global model and the latest performance snapshot. Each
//! channel keeps only the most recent event; a new subscriber immediately observes
//! the current state.

use std::{
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use futures::Stream;
use tokio::sync::watch;

use fedmed_core::model::{ParameterSet, PerformanceSnapshot};

use crate::state_machine::phases::PhaseName;

/// An event emitted by the state machine, stamped with the round it belongs to.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Event<E> {
    /// Number of the latest committed round at emission time.
    pub round_number: u64,
    /// The event itself.
    pub event: E,
}

/// Global model event.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelEvent {
    /// No global model has been published yet.
    Pending,
    /// A new global model was published.
    New(Arc<ParameterSet>),
}

/// The publisher half of the event channels, owned by the state machine.
pub struct EventPublisher {
    round_number: u64,
    phase_tx: EventBroadcaster<PhaseName>,
    model_tx: EventBroadcaster<ModelEvent>,
    snapshot_tx: EventBroadcaster<Option<PerformanceSnapshot>>,
}

/// The subscriber half of the event channels.
#[derive(Debug, Clone)]
pub struct EventSubscriber {
    phase_rx: EventListener<PhaseName>,
    model_rx: EventListener<ModelEvent>,
    snapshot_rx: EventListener<Option<PerformanceSnapshot>>,
}

impl EventPublisher {
    /// Initializes the event channels and returns both halves.
    pub fn init(round_number: u64, phase: PhaseName) -> (Self, EventSubscriber) {
        let (phase_tx, phase_rx) = watch::channel::<Event<PhaseName>>(Event {
            round_number,
            event: phase,
        });
        let (model_tx, model_rx) = watch::channel::<Event<ModelEvent>>(Event {
            round_number,
            event: ModelEvent::Pending,
        });
        let (snapshot_tx, snapshot_rx) =
            watch::channel::<Event<Option<PerformanceSnapshot>>>(Event {
                round_number,
                event: None,
            });

        let publisher = EventPublisher {
            round_number,
            phase_tx: phase_tx.into(),
            model_tx: model_tx.into(),
            snapshot_tx: snapshot_tx.into(),
        };
        let subscriber = EventSubscriber {
            phase_rx: phase_rx.into(),
            model_rx: model_rx.into(),
            snapshot_rx: snapshot_rx.into(),
        };
        (publisher, subscriber)
    }

    /// Stamps subsequent events with the given round number.
    pub fn set_round_number(&mut self, round_number: u64) {
        self.round_number = round_number;
    }

    /// Emits a phase event.
    pub fn broadcast_phase(&mut self, phase: PhaseName) {
        self.phase_tx.broadcast(Event {
            round_number: self.round_number,
            event: phase,
        });
    }

    /// Emits a global model event.
    pub fn broadcast_model(&mut self, model: ModelEvent) {
        self.model_tx.broadcast(Event {
            round_number: self.round_number,
            event: model,
        });
    }

    /// Emits a performance snapshot event.
    pub fn broadcast_snapshot(&mut self, snapshot: Option<PerformanceSnapshot>) {
        self.snapshot_tx.broadcast(Event {
            round_number: self.round_number,
            event: snapshot,
        });
    }
}

impl EventSubscriber {
    /// A listener for phase events.
    pub fn phase_listener(&self) -> EventListener<PhaseName> {
        self.phase_rx.clone()
    }

    /// A listener for global model events.
    pub fn model_listener(&self) -> EventListener<ModelEvent> {
        self.model_rx.clone()
    }

    /// A listener for performance snapshot events.
    pub fn snapshot_listener(&self) -> EventListener<Option<PerformanceSnapshot>> {
        self.snapshot_rx.clone()
    }
}

/// The sending half of one event channel.
struct EventBroadcaster<E>(watch::Sender<Event<E>>);

impl<E> EventBroadcaster<E> {
    fn broadcast(&self, event: Event<E>) {
        // We don't care whether there's a listener or not
        let _ = self.0.broadcast(event);
    }
}

impl<E> From<watch::Sender<Event<E>>> for EventBroadcaster<E> {
    fn from(sender: watch::Sender<Event<E>>) -> Self {
        Self(sender)
    }
}

/// The receiving half of one event channel.
#[derive(Debug, Clone)]
pub struct EventListener<E>(watch::Receiver<Event<E>>);

impl<E> From<watch::Receiver<Event<E>>> for EventListener<E> {
    fn from(receiver: watch::Receiver<Event<E>>) -> Self {
        Self(receiver)
    }
}

impl<E> EventListener<E>
where
    E: Clone,
{
    /// The latest event emitted on this channel.
    pub fn get_latest(&self) -> Event<E> {
        self.0.borrow().clone()
    }
}

impl<E> Stream for EventListener<E>
where
    E: Clone,
{
    type Item = Event<E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().0).poll_next(cx)
    }
}

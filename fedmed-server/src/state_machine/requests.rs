//! The request channel of the state machine.
//!
//! Requests travel over an unbounded channel together with the span they were issued
//! in. Every request carries its own response channel; the state machine answers each
//! request exactly once, in whichever phase it handles it.

use std::{
    fmt,
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use derive_more::From;
use displaydoc::Display;
use futures::Stream;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{trace, Span};

use fedmed_core::{aggregation::AggregationError, model::PerformanceSnapshot};

use crate::state_machine::coordinator::Checkpoint;

/// Error that may occur when a round is driven through the state machine.
#[derive(Debug, Clone, PartialEq, Display, Error)]
pub enum RoundError {
    /// no site delivered an update.
    NoUpdates,
    /// aggregation failed: {0}.
    Aggregation(#[from] AggregationError),
    /// the round was canceled.
    Canceled,
    /// a round is already in progress.
    RoundInProgress,
    /// no round is in progress.
    NoActiveRound,
    /// the state machine is shutting down.
    Shutdown,
}

impl RoundError {
    /// The stable, machine readable reason code of this failure.
    pub fn reason(&self) -> &'static str {
        match self {
            RoundError::NoUpdates | RoundError::Aggregation(AggregationError::NoUpdates) => {
                "no_updates"
            }
            RoundError::Aggregation(_) => "shape_mismatch",
            RoundError::Canceled => "canceled",
            RoundError::RoundInProgress => "round_in_progress",
            RoundError::NoActiveRound => "no_active_round",
            RoundError::Shutdown => "shutdown",
        }
    }
}

/// The successful outcome of one driven round.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundOutcome {
    /// The committed round number.
    pub round_number: u64,
    /// The cohort-wide evaluation of the committed round.
    pub snapshot: PerformanceSnapshot,
}

/// A handle for the state machine to answer one request.
pub struct ResponseSender<R>(oneshot::Sender<Result<R, RoundError>>);

impl<R> ResponseSender<R> {
    /// Answers the request.
    pub fn send(self, response: Result<R, RoundError>) {
        // We don't care whether the requester is still waiting for its answer.
        let _ = self.0.send(response);
    }
}

impl<R> fmt::Debug for ResponseSender<R> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("ResponseSender")
    }
}

/// A future that resolves to the state machine's answer to one request.
///
/// Resolves to [`RoundError::Shutdown`] if the machine dropped the request unanswered.
pub struct ResponseReceiver<R>(oneshot::Receiver<Result<R, RoundError>>);

impl<R> Future for ResponseReceiver<R> {
    type Output = Result<R, RoundError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().0)
            .poll(cx)
            .map(|response| response.unwrap_or(Err(RoundError::Shutdown)))
    }
}

pub(in crate::state_machine) fn response_channel<R>() -> (ResponseSender<R>, ResponseReceiver<R>) {
    let (tx, rx) = oneshot::channel();
    (ResponseSender(tx), ResponseReceiver(rx))
}

/// The responder of a round trigger, threaded through the round-carrying phases.
pub type RoundTrigger = ResponseSender<RoundOutcome>;

/// A request the state machine can process.
#[derive(Debug)]
pub enum StateMachineRequest {
    /// Drive one full training round.
    RunRound(ResponseSender<RoundOutcome>),
    /// Cancel the round in progress.
    CancelRound(ResponseSender<()>),
    /// Export the coordinator state.
    Checkpoint(ResponseSender<Checkpoint>),
}

/// A handle to send requests to the state machine.
#[derive(Clone, From, Debug)]
pub struct RequestSender(mpsc::UnboundedSender<(StateMachineRequest, Span)>);

impl RequestSender {
    /// Drives one full training round and waits for its outcome.
    ///
    /// # Errors
    /// Fails with the round's [`RoundError`]; a rejection (another round in progress)
    /// and a shutdown of the machine are reported the same way.
    pub async fn run_round(&self) -> Result<RoundOutcome, RoundError> {
        let (tx, rx) = response_channel();
        self.send(StateMachineRequest::RunRound(tx))?;
        rx.await
    }

    /// Cancels the round in progress.
    ///
    /// # Errors
    /// Fails with [`RoundError::NoActiveRound`] if no round is running.
    pub async fn cancel_round(&self) -> Result<(), RoundError> {
        let (tx, rx) = response_channel();
        self.send(StateMachineRequest::CancelRound(tx))?;
        rx.await
    }

    /// Exports a checkpoint of the coordinator state.
    ///
    /// # Errors
    /// Fails with [`RoundError::RoundInProgress`] while a round is running.
    pub async fn checkpoint(&self) -> Result<Checkpoint, RoundError> {
        let (tx, rx) = response_channel();
        self.send(StateMachineRequest::Checkpoint(tx))?;
        rx.await
    }

    pub(in crate::state_machine) fn send(
        &self,
        request: StateMachineRequest,
    ) -> Result<(), RoundError> {
        self.0
            .send((request, Span::current()))
            .map_err(|_| RoundError::Shutdown)
    }
}

/// The receiving half of the request channel.
#[derive(From, Debug)]
pub struct RequestReceiver(mpsc::UnboundedReceiver<(StateMachineRequest, Span)>);

impl Stream for RequestReceiver {
    type Item = (StateMachineRequest, Span);

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Option<Self::Item>> {
        trace!("polling RequestReceiver");
        self.get_mut().0.poll_recv(cx)
    }
}

impl RequestReceiver {
    /// Creates a new request channel and returns the receiving and sending halves.
    pub fn new() -> (Self, RequestSender) {
        let (tx, rx) = mpsc::unbounded_channel::<(StateMachineRequest, Span)>();
        let receiver = RequestReceiver::from(rx);
        let handle = RequestSender::from(tx);
        (receiver, handle)
    }

    /// Closes the channel: already queued requests can still be received, new ones
    /// are rejected.
    pub fn close(&mut self) {
        self.0.close()
    }

    /// Receives the next request.
    pub async fn recv(&mut self) -> Option<(StateMachineRequest, Span)> {
        self.0.recv().await
    }
}

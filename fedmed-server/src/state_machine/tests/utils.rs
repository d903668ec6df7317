//! Test utilities: a scripted cohort and request helpers.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;

use fedmed_core::model::{ModelUpdate, ParameterSet};

use crate::{
    registry::{ClientId, Credentials, Registry},
    state_machine::{
        coordinator::Checkpoint,
        requests::{
            response_channel,
            RequestSender,
            ResponseReceiver,
            RoundOutcome,
            StateMachineRequest,
        },
    },
    transport::{ClientTransport, TransportError},
};

/// What a scripted site does when its update is fetched.
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Deliver this update.
    Update(ModelUpdate),
    /// Fail the fetch.
    Fail,
    /// Never answer.
    Hang,
}

/// A scripted transport for driving the state machine in tests.
///
/// Sites without a scripted behavior fail their fetches.
#[derive(Clone, Default)]
pub struct TestCohort {
    behaviors: Arc<Mutex<HashMap<ClientId, Behavior>>>,
    pushed: Arc<Mutex<Vec<(ClientId, ParameterSet)>>>,
}

impl TestCohort {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts `id` to deliver the given update.
    pub fn deliver(&self, id: &str, update: ModelUpdate) {
        self.set(id, Behavior::Update(update));
    }

    /// Scripts `id` to fail its fetch.
    pub fn fail(&self, id: &str) {
        self.set(id, Behavior::Fail);
    }

    /// Scripts `id` to never answer its fetch.
    pub fn hang(&self, id: &str) {
        self.set(id, Behavior::Hang);
    }

    /// The models pushed back so far, in push order.
    pub fn pushed(&self) -> Vec<(ClientId, ParameterSet)> {
        self.pushed.lock().unwrap().clone()
    }

    fn set(&self, id: &str, behavior: Behavior) {
        self.behaviors
            .lock()
            .unwrap()
            .insert(ClientId::from(id), behavior);
    }
}

#[async_trait]
impl ClientTransport for TestCohort {
    async fn fetch_update(&self, id: &ClientId) -> Result<ModelUpdate, TransportError> {
        let behavior = self.behaviors.lock().unwrap().get(id).cloned();
        match behavior {
            Some(Behavior::Update(update)) => Ok(update),
            Some(Behavior::Hang) => futures::future::pending().await,
            Some(Behavior::Fail) | None => Err(TransportError::Unreachable(id.to_string())),
        }
    }

    async fn push_model(
        &self,
        id: &ClientId,
        model: Arc<ParameterSet>,
    ) -> Result<(), TransportError> {
        self.pushed
            .lock()
            .unwrap()
            .push((id.clone(), (*model).clone()));
        Ok(())
    }
}

/// A registry with `count` enrolled sites named `site-0`, `site-1`, ...
pub fn registry(count: usize) -> Registry {
    let registry = Registry::new();
    for index in 0..count {
        registry
            .register_client(
                ClientId::from(format!("site-{}", index)),
                &format!("Site {}", index),
                Credentials::from("secret"),
            )
            .unwrap();
    }
    registry
}

/// Enqueues a round trigger without waiting for the outcome.
pub fn enqueue_round(handle: &RequestSender) -> ResponseReceiver<RoundOutcome> {
    let (tx, rx) = response_channel();
    handle
        .send(StateMachineRequest::RunRound(tx))
        .expect("request channel closed");
    rx
}

/// Enqueues a cancellation without waiting for the answer.
pub fn enqueue_cancel(handle: &RequestSender) -> ResponseReceiver<()> {
    let (tx, rx) = response_channel();
    handle
        .send(StateMachineRequest::CancelRound(tx))
        .expect("request channel closed");
    rx
}

/// Enqueues a checkpoint request without waiting for the answer.
pub fn enqueue_checkpoint(handle: &RequestSender) -> ResponseReceiver<Checkpoint> {
    let (tx, rx) = response_channel();
    handle
        .send(StateMachineRequest::Checkpoint(tx))
        .expect("request channel closed");
    rx
}

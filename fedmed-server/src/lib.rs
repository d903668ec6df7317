#![cfg_attr(docsrs, feature(doc_cfg))]
//! # Fedmed: round-based federated learning for healthcare consortia
//!
//! Hospitals and research sites want to train shared clinical models without moving
//! patient data. Fedmed coordinates exactly that: every site trains locally, submits
//! only model parameters, and receives the sample-weighted average of the whole cohort
//! back. Protected health information never leaves a site; the artifacts that do leave
//! are de-identified or sealed with the tools in `fedmed_core`.
//!
//! ## What the server does
//!
//! This crate ships the coordination side of the system:
//!
//! - a [`registry`] of participating sites and their enrollment state,
//! - a pluggable [`transport`] for fetching local updates and pushing global models,
//! - a [`state_machine`] that drives training rounds through their phases: collecting
//!   updates from every active site, aggregating them into a new global model,
//!   evaluating cohort-wide metrics, and publishing the result.
//!
//! A round either commits atomically (new parameters, bumped round number, one new
//! performance snapshot) or fails without leaving a trace in the global state. Sites
//! that error, stall or submit malformed updates are excluded from the round they
//! failed in and nothing else; the round proceeds with whoever delivered.
//!
//! ## Operating it
//!
//! The `coordinator` binary wires the pieces together from a TOML settings file and
//! drives a configurable number of rounds over a simulated cohort, which makes the
//! full fetch/aggregate/publish/push loop observable without a fleet of real sites.
//! Embedders instead construct a [`state_machine::StateMachineInitializer`] with their
//! own [`transport::ClientTransport`] implementation, spawn the returned machine, and
//! drive rounds through the request handle.

#[macro_use]
extern crate async_trait;
#[macro_use]
extern crate serde;
#[macro_use]
extern crate tracing;

pub mod registry;
pub mod settings;
pub mod state_machine;
pub mod transport;

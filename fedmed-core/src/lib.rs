//! # Fedmed core: privacy-preserving primitives for federated healthcare training
//!
//! Hospitals and research institutions that want to train a shared predictive model
//! cannot pool their records: the records are personal health data. Fedmed keeps the
//! records where they are and moves only model parameters. This crate holds the
//! primitives both sides of that arrangement rely on:
//!
//! - **Record de-identification** ([`processor::SecureProcessor::anonymize`]): direct
//!   identifiers are stripped, quasi-identifiers are generalized (exact age becomes an
//!   age band, a postal code becomes a coarse prefix), and the patient identity is
//!   replaced with a stable keyed pseudonym so longitudinal records remain linkable
//!   without being re-identifiable.
//! - **Per-subject authenticated encryption** ([`processor::SecureProcessor::encrypt`]
//!   and [`processor::SecureProcessor::decrypt`]): payloads are sealed under a key
//!   derived from a master key and the subject identity, with an integrity tag that is
//!   verified before a single byte is decrypted.
//! - **Sample-weighted aggregation** ([`aggregation::aggregate`] and
//!   [`aggregation::evaluate`]): local model updates are folded into one global
//!   parameter set, each participant weighted by the number of samples it trained on.
//!
//! The aggregation functions are pure and hold no state; the processor owns nothing
//! but key material and a pseudonym cache. Everything here is runtime-agnostic, which
//! keeps the crate usable from the coordination server as well as from
//! institution-side tooling.

#[macro_use]
extern crate serde;

pub mod aggregation;
pub mod anonymize;
pub mod crypto;
pub mod model;
pub mod processor;
pub mod record;

#[cfg(any(test, feature = "testutils"))]
pub mod testutils;

//! State machine test utilities.

pub mod impls;
pub mod utils;

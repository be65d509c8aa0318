//! Shared helpers.
//!
//! Tracing setup for binaries and standard backoff configurations.

pub mod bootstrap;
pub mod retry;

//! rep-rpc - request/response client for auction reps
//!
//! Turns a topic-addressed message bus into synchronous calls with
//! per-call timeouts, an explicit remote failure signal, and concurrent
//! fan-out to many reps with one result per rep.

pub mod client;
pub mod config;
pub mod rpc;
pub mod transport;
pub mod types;
pub mod utils;

pub use client::RepClient;
pub use config::ClientConfig;
pub use rpc::{FanOutResults, RpcError, Subject, TargetId};

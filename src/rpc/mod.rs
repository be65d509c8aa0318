//! Request/response RPC over the message bus.
//!
//! This module contains:
//! - `RpcError`: the closed set of ways a single call can fail
//! - `Subject` and `TargetId`: addressing for one remote operation on one rep
//! - `Requester`: one correlated call (serialize, send, classify, decode)
//! - `fan_out`: the same request to many reps, one result per rep
//! - `dispatch_and_wait` / `dispatch_and_collect`: side-effect-only broadcast

use std::fmt;

use serde::{Deserialize, Serialize};

mod barrier;
mod fanout;
mod requester;
pub mod wire;

pub use barrier::{dispatch_and_collect, dispatch_and_wait, TargetFailure};
pub use fanout::{fan_out, FanOutResults, TargetResult};
pub use requester::{RequestOptions, Requester};
pub use wire::{ReplyBody, WireFormat, FAILURE_SENTINEL};

/// Result type for RPC operations.
pub type Result<T> = std::result::Result<T, RpcError>;

/// Errors that can occur during one call.
///
/// Exactly one kind is reported per failed call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RpcError {
    /// No reply arrived before the deadline. The rep is unresponsive for this
    /// call, not necessarily gone.
    #[error("Request '{subject}' to '{target}' timed out")]
    Timeout { target: TargetId, subject: Subject },

    /// The rep replied with a declared failure.
    #[error("Request '{subject}' to '{target}' failed remotely: {reason}")]
    RequestFailed {
        target: TargetId,
        subject: Subject,
        reason: String,
    },

    /// Local encode/decode failure (schema mismatch or corrupt payload).
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Any other failure reported by the transport.
    #[error("Transport error: {0}")]
    Transport(String),
}

impl RpcError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub fn is_request_failed(&self) -> bool {
        matches!(self, Self::RequestFailed { .. })
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Opaque identifier of one rep on the bus.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetId(String);

impl TargetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TargetId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for TargetId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl AsRef<str> for TargetId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Remote operation selector.
///
/// The wire names are fixed; reps dispatch on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subject {
    /// Snapshot of a rep's total resources.
    TotalResources,
    /// The LRP instances a rep currently holds.
    LrpAuctionInfos,
    /// Clear a rep's state.
    Reset,
    /// Replace the LRP instances a rep holds.
    SetLrpAuctionInfos,
    /// Score an LRP instance against a rep.
    Score,
    /// Score, and tentatively reserve capacity if possible.
    ScoreThenTentativelyReserve,
    /// Release a tentative reservation.
    ReleaseReservation,
    /// Start an LRP instance on a rep.
    Run,
}

impl Subject {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TotalResources => "total_resources",
            Self::LrpAuctionInfos => "lrp_auction_infos",
            Self::Reset => "reset",
            Self::SetLrpAuctionInfos => "set_lrp_auction_infos",
            Self::Score => "score",
            Self::ScoreThenTentativelyReserve => "score_then_tentatively_reserve",
            Self::ReleaseReservation => "release-reservation",
            Self::Run => "run",
        }
    }

    /// Parse a wire name back into a subject.
    pub fn from_wire(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|s| s.as_str() == name)
    }

    pub const ALL: [Subject; 8] = [
        Self::TotalResources,
        Self::LrpAuctionInfos,
        Self::Reset,
        Self::SetLrpAuctionInfos,
        Self::Score,
        Self::ScoreThenTentativelyReserve,
        Self::ReleaseReservation,
        Self::Run,
    ];
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//! Auction payloads exchanged with reps.
//!
//! These are carried opaquely: the client serializes and deserializes them
//! but applies no logic of its own.

use serde::{Deserialize, Serialize};

use crate::rpc::FanOutResults;

/// Capacity of a rep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resources {
    pub memory_mb: i32,
    pub disk_mb: i32,
    pub containers: i32,
}

/// One LRP instance as seen by the auction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LrpAuctionInfo {
    pub lrp_guid: String,
    pub instance_guid: String,
    pub index: i32,
    pub memory_mb: i32,
    pub disk_mb: i32,
}

/// Request to start an LRP instance on the winning rep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LrpStartAuction {
    pub process_guid: String,
    pub instance_guid: String,
    pub index: i32,
    pub memory_mb: i32,
    pub disk_mb: i32,
    #[serde(default)]
    pub stack: String,
}

/// A rep's score for one LRP instance. Lower is better.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub rep_guid: String,
    pub score: f64,
    /// Failure reported by the rep inside an otherwise valid reply.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

/// Scores from a fan-out, one entry per asked rep.
pub type ScoreResults = FanOutResults<ScoreResult>;

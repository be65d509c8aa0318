//! Payload encoding and reply classification.
//!
//! Requests are JSON, or zero bytes when there is no request value. Replies
//! come in one of two formats:
//! - `Sentinel`: the reply bytes `error` mean the rep declared a failure;
//!   anything else is the JSON response (or empty for void replies).
//! - `Tagged`: the reply is `{"ok": <value>}` or `{"error": "<reason>"}`,
//!   which cannot collide with a legitimate response.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{Result, RpcError};

/// Reply bytes that signal a declared remote failure in the sentinel format.
pub const FAILURE_SENTINEL: &[u8] = b"error";

/// Reply format spoken by the reps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    /// Bare `error` reply signals failure. Compatible with existing reps.
    #[default]
    Sentinel,
    /// Explicit ok/error envelope.
    Tagged,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Envelope {
    Ok(serde_json::Value),
    Error(String),
}

/// A reply after the failure signal has been checked.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyBody {
    /// Nothing came back (void reply).
    Empty,
    /// Raw JSON bytes of the response value.
    Bytes(Vec<u8>),
    /// Response value already unwrapped from an envelope.
    Json(serde_json::Value),
    /// The rep declared a failure.
    Failed(String),
}

impl ReplyBody {
    /// Decode the response value.
    ///
    /// An empty reply decodes as JSON `null`, so `()` and `Option<T>` accept
    /// it while structured types report a serialization error.
    pub fn decode<T: DeserializeOwned>(self) -> Result<T> {
        match self {
            Self::Empty => Ok(serde_json::from_value(serde_json::Value::Null)?),
            Self::Bytes(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Self::Json(value) => Ok(serde_json::from_value(value)?),
            Self::Failed(reason) => Err(RpcError::Serialization(format!(
                "cannot decode a failed reply: {}",
                reason
            ))),
        }
    }
}

/// Encode an optional request value.
pub fn encode_request<T>(value: Option<&T>) -> Result<Vec<u8>>
where
    T: Serialize + ?Sized,
{
    match value {
        Some(v) => Ok(serde_json::to_vec(v)?),
        None => Ok(Vec::new()),
    }
}

/// Decode a request payload. Empty payloads decode as JSON `null`.
pub fn decode_request<T: DeserializeOwned>(payload: &[u8]) -> Result<T> {
    if payload.is_empty() {
        return ReplyBody::Empty.decode();
    }
    Ok(serde_json::from_slice(payload)?)
}

impl WireFormat {
    /// Classify raw reply bytes.
    ///
    /// The failure signal is checked before any decoding, so a sentinel reply
    /// is a failure even if it would also parse as a response value.
    pub fn open(self, reply: Vec<u8>) -> Result<ReplyBody> {
        if reply.is_empty() {
            return Ok(ReplyBody::Empty);
        }
        match self {
            Self::Sentinel => {
                if reply == FAILURE_SENTINEL {
                    Ok(ReplyBody::Failed(
                        String::from_utf8_lossy(FAILURE_SENTINEL).into_owned(),
                    ))
                } else {
                    Ok(ReplyBody::Bytes(reply))
                }
            }
            Self::Tagged => match serde_json::from_slice::<Envelope>(&reply)? {
                Envelope::Ok(serde_json::Value::Null) => Ok(ReplyBody::Empty),
                Envelope::Ok(value) => Ok(ReplyBody::Json(value)),
                Envelope::Error(reason) => Ok(ReplyBody::Failed(reason)),
            },
        }
    }

    /// Encode a successful reply (responder side).
    pub fn encode_reply<T>(self, value: &T) -> Result<Vec<u8>>
    where
        T: Serialize + ?Sized,
    {
        match self {
            Self::Sentinel => Ok(serde_json::to_vec(value)?),
            Self::Tagged => Ok(serde_json::to_vec(&Envelope::Ok(serde_json::to_value(
                value,
            )?))?),
        }
    }

    /// Encode a successful void reply (responder side).
    pub fn encode_empty_reply(self) -> Vec<u8> {
        Vec::new()
    }

    /// Encode a declared failure (responder side).
    pub fn encode_failure(self, reason: &str) -> Vec<u8> {
        match self {
            Self::Sentinel => FAILURE_SENTINEL.to_vec(),
            Self::Tagged => serde_json::to_vec(&Envelope::Error(reason.to_string()))
                .unwrap_or_else(|_| FAILURE_SENTINEL.to_vec()),
        }
    }
}

//! Concurrent fan-out with one result per target.

use futures::stream::{self, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use super::{Requester, RpcError, Subject, TargetId};

/// Outcome of one call in a fan-out.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetResult<T> {
    pub target: TargetId,
    pub outcome: Result<T, RpcError>,
}

impl<T> TargetResult<T> {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Results of a fan-out, one per requested target.
///
/// Order is arrival order and carries no meaning. Duplicate targets in the
/// request produce one entry each.
#[derive(Debug, Clone, PartialEq)]
pub struct FanOutResults<T> {
    results: Vec<TargetResult<T>>,
}

impl<T> FanOutResults<T> {
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TargetResult<T>> {
        self.results.iter()
    }

    /// Successful results with their target.
    pub fn successes(&self) -> impl Iterator<Item = (&TargetId, &T)> {
        self.results
            .iter()
            .filter_map(|r| r.outcome.as_ref().ok().map(|v| (&r.target, v)))
    }

    /// Failed results with their target.
    pub fn failures(&self) -> impl Iterator<Item = (&TargetId, &RpcError)> {
        self.results
            .iter()
            .filter_map(|r| r.outcome.as_ref().err().map(|e| (&r.target, e)))
    }

    /// All results for one target (more than one if it was requested twice).
    pub fn for_target<'a>(&'a self, target: &'a str) -> impl Iterator<Item = &'a TargetResult<T>> {
        self.results
            .iter()
            .filter(move |r| r.target.as_str() == target)
    }

    pub fn into_vec(self) -> Vec<TargetResult<T>> {
        self.results
    }
}

impl<T> IntoIterator for FanOutResults<T> {
    type Item = TargetResult<T>;
    type IntoIter = std::vec::IntoIter<TargetResult<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.into_iter()
    }
}

/// Send the same request to every target concurrently.
///
/// Returns once every call has succeeded or failed, with exactly one result
/// per entry in `targets`. A failing target never affects its siblings.
/// Completion is bounded by the per-call timeout.
pub async fn fan_out<Req, Resp>(
    requester: &Requester,
    subject: Subject,
    targets: &[TargetId],
    request: &Req,
) -> FanOutResults<Resp>
where
    Req: Serialize + Sync + ?Sized,
    Resp: DeserializeOwned + Send,
{
    let limit = requester.options().concurrency_for(targets.len());

    let results: Vec<TargetResult<Resp>> = stream::iter(targets.iter().cloned())
        .map(|target| async move {
            // Single exit: each call yields one result, success or failure.
            let outcome = requester.call(&target, subject, Some(request)).await;
            if let Err(e) = &outcome {
                warn!(target = %target, subject = %subject, error = %e, "Fan-out call failed");
            }
            TargetResult { target, outcome }
        })
        .buffer_unordered(limit)
        .collect()
        .await;
    let results = FanOutResults { results };

    debug!(
        subject = %subject,
        targets = targets.len(),
        failed = results.failures().count(),
        "Fan-out complete"
    );

    results
}

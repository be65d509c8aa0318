//! Side-effect-only broadcast that waits for every target.

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, warn};

use super::{Requester, RpcError, Subject, TargetId};

/// A target whose call failed during a dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetFailure {
    pub target: TargetId,
    pub error: RpcError,
}

/// Send the request to every target and wait until each call has finished.
///
/// Best effort: per-target failures are logged and discarded, never returned.
/// Use [`dispatch_and_collect`] to observe them.
pub async fn dispatch_and_wait<Req>(
    requester: &Requester,
    subject: Subject,
    targets: &[TargetId],
    request: &Req,
) where
    Req: Serialize + Sync + ?Sized,
{
    let failures = dispatch_and_collect(requester, subject, targets, request).await;
    for failure in &failures {
        warn!(
            target = %failure.target,
            subject = %subject,
            error = %failure.error,
            "Best-effort dispatch failed, discarding"
        );
    }
}

/// Send the request to every target, wait for all of them, and return the
/// failures.
///
/// Returns only after every call has succeeded or failed.
pub async fn dispatch_and_collect<Req>(
    requester: &Requester,
    subject: Subject,
    targets: &[TargetId],
    request: &Req,
) -> Vec<TargetFailure>
where
    Req: Serialize + Sync + ?Sized,
{
    let limit = requester.options().concurrency_for(targets.len());

    let failures: Vec<TargetFailure> = stream::iter(targets.iter().cloned())
        .map(|target| async move {
            requester
                .send(&target, subject, Some(request))
                .await
                .err()
                .map(|error| TargetFailure { target, error })
        })
        .buffer_unordered(limit)
        .filter_map(|failure| async move { failure })
        .collect()
        .await;

    debug!(
        subject = %subject,
        targets = targets.len(),
        failed = failures.len(),
        "Dispatch complete"
    );

    failures
}

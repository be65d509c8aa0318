//! Rep client: the auctioneer's view of its reps.
//!
//! Single-rep operations return a typed failure instead of succeeding; they
//! never abort the process. Multi-rep operations always return one result per
//! rep asked.

use std::sync::Arc;

use tracing::{error, info};

use crate::config::ClientConfig;
use crate::rpc::{
    dispatch_and_collect, dispatch_and_wait, fan_out, RequestOptions, Requester, Result, Subject,
    TargetFailure, TargetId,
};
use crate::transport::{init_transport, Transport};
use crate::types::{LrpAuctionInfo, LrpStartAuction, Resources, ScoreResults};

/// Client for querying and commanding reps over the bus.
///
/// Cheap to clone; clones share one transport connection.
#[derive(Clone)]
pub struct RepClient {
    requester: Requester,
}

impl RepClient {
    /// Connect the configured transport.
    pub async fn connect(
        config: &ClientConfig,
    ) -> std::result::Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let options = config.request_options()?;
        let transport = init_transport(&config.transport).await?;
        info!(
            timeout_ms = config.timeout_ms,
            wire_format = ?config.wire_format,
            max_concurrency = ?config.max_concurrency,
            "Rep client ready"
        );
        Ok(Self::with_transport(transport, options))
    }

    /// Build a client over an existing transport.
    pub fn with_transport(transport: Arc<dyn Transport>, options: RequestOptions) -> Self {
        Self {
            requester: Requester::new(transport, options),
        }
    }

    /// The underlying requester, for subjects without a dedicated method.
    pub fn requester(&self) -> &Requester {
        &self.requester
    }

    // ========================================================================
    // Single rep
    // ========================================================================

    /// Snapshot of a rep's total resources.
    pub async fn total_resources(&self, rep: &TargetId) -> Result<Resources> {
        self.requester.query(rep, Subject::TotalResources).await
    }

    /// The LRP instances a rep currently holds.
    pub async fn lrp_auction_infos(&self, rep: &TargetId) -> Result<Vec<LrpAuctionInfo>> {
        self.requester.query(rep, Subject::LrpAuctionInfos).await
    }

    /// Clear a rep's state.
    pub async fn reset(&self, rep: &TargetId) -> Result<()> {
        self.requester.send::<()>(rep, Subject::Reset, None).await
    }

    /// Replace the LRP instances a rep holds.
    pub async fn set_lrp_auction_infos(
        &self,
        rep: &TargetId,
        instances: &[LrpAuctionInfo],
    ) -> Result<()> {
        self.requester
            .send(rep, Subject::SetLrpAuctionInfos, Some(instances))
            .await
    }

    /// Start an LRP instance on a rep.
    ///
    /// Failures are logged here and also returned.
    pub async fn run(&self, rep: &TargetId, start: &LrpStartAuction) -> Result<()> {
        let result = self.requester.send(rep, Subject::Run, Some(start)).await;
        if let Err(e) = &result {
            error!(
                rep = %rep,
                process_guid = %start.process_guid,
                error = %e,
                "Failed to run"
            );
        }
        result
    }

    // ========================================================================
    // Many reps
    // ========================================================================

    /// Ask every rep to score an instance.
    pub async fn score(&self, reps: &[TargetId], instance: &LrpAuctionInfo) -> ScoreResults {
        fan_out(&self.requester, Subject::Score, reps, instance).await
    }

    /// Ask every rep to score an instance and tentatively reserve room for it.
    pub async fn score_then_tentatively_reserve(
        &self,
        reps: &[TargetId],
        instance: &LrpAuctionInfo,
    ) -> ScoreResults {
        fan_out(
            &self.requester,
            Subject::ScoreThenTentativelyReserve,
            reps,
            instance,
        )
        .await
    }

    /// Release tentative reservations on every rep, best effort.
    ///
    /// Returns once every rep has answered or failed. Failures are logged and
    /// not returned; see [`Self::release_reservation_collecting`].
    pub async fn release_reservation(&self, reps: &[TargetId], instance: &LrpAuctionInfo) {
        dispatch_and_wait(&self.requester, Subject::ReleaseReservation, reps, instance).await
    }

    /// Release tentative reservations on every rep and report which failed.
    pub async fn release_reservation_collecting(
        &self,
        reps: &[TargetId],
        instance: &LrpAuctionInfo,
    ) -> Vec<TargetFailure> {
        dispatch_and_collect(&self.requester, Subject::ReleaseReservation, reps, instance).await
    }
}

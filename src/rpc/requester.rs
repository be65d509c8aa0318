//! One correlated call: serialize, send, classify the reply, decode.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::wire::{self, ReplyBody, WireFormat};
use super::{Result, RpcError, Subject, TargetId};
use crate::transport::{Transport, TransportError};

/// Per-client request settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestOptions {
    /// Deadline for every call made through one client.
    pub timeout: Duration,
    /// Reply format spoken by the reps.
    pub wire_format: WireFormat,
    /// Cap on in-flight calls per fan-out or dispatch. `None` runs one call
    /// per target at once.
    pub max_concurrency: Option<usize>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(1),
            wire_format: WireFormat::default(),
            max_concurrency: None,
        }
    }
}

impl RequestOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_wire_format(mut self, wire_format: WireFormat) -> Self {
        self.wire_format = wire_format;
        self
    }

    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = Some(limit);
        self
    }

    /// Number of calls to run at once for a batch of `targets` calls.
    pub(crate) fn concurrency_for(&self, targets: usize) -> usize {
        let all = targets.max(1);
        self.max_concurrency.map_or(all, |limit| limit.clamp(1, all))
    }
}

/// Performs single remote calls over a shared transport.
///
/// Cheap to clone; clones share the transport. No retries are made here.
#[derive(Clone)]
pub struct Requester {
    transport: Arc<dyn Transport>,
    options: RequestOptions,
}

impl Requester {
    pub fn new(transport: Arc<dyn Transport>, options: RequestOptions) -> Self {
        Self { transport, options }
    }

    pub fn options(&self) -> &RequestOptions {
        &self.options
    }

    /// Call `subject` on `target` and decode the response value.
    pub async fn call<Req, Resp>(
        &self,
        target: &TargetId,
        subject: Subject,
        request: Option<&Req>,
    ) -> Result<Resp>
    where
        Req: Serialize + Sync + ?Sized,
        Resp: DeserializeOwned,
    {
        self.exchange(target, subject, request).await?.decode()
    }

    /// Call `subject` on `target` without a request body.
    pub async fn query<Resp>(&self, target: &TargetId, subject: Subject) -> Result<Resp>
    where
        Resp: DeserializeOwned,
    {
        self.call::<(), Resp>(target, subject, None).await
    }

    /// Call `subject` on `target` expecting no response value.
    ///
    /// Reply contents are ignored except for the failure signal.
    pub async fn send<Req>(
        &self,
        target: &TargetId,
        subject: Subject,
        request: Option<&Req>,
    ) -> Result<()>
    where
        Req: Serialize + Sync + ?Sized,
    {
        self.exchange(target, subject, request).await.map(|_| ())
    }

    #[tracing::instrument(name = "rpc.call", skip_all, fields(target = %target, subject = %subject))]
    async fn exchange<Req>(
        &self,
        target: &TargetId,
        subject: Subject,
        request: Option<&Req>,
    ) -> Result<ReplyBody>
    where
        Req: Serialize + Sync + ?Sized,
    {
        let payload = wire::encode_request(request)?;

        let reply = self
            .transport
            .request(
                target.as_str(),
                subject.as_str(),
                payload,
                self.options.timeout,
            )
            .await
            .map_err(|e| match e {
                TransportError::Timeout => RpcError::Timeout {
                    target: target.clone(),
                    subject,
                },
                other => RpcError::Transport(other.to_string()),
            })?;

        match self.options.wire_format.open(reply)? {
            ReplyBody::Failed(reason) => Err(RpcError::RequestFailed {
                target: target.clone(),
                subject,
                reason,
            }),
            body => {
                debug!("Reply received");
                Ok(body)
            }
        }
    }
}

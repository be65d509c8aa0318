//! In-memory channel-based transport for standalone mode.
//!
//! Each registered target gets a request queue served by its own task.
//! Ideal for local development and testing without a broker.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{debug, info};

use super::{Transport, TransportError};

/// Queue capacity per target.
const CHANNEL_CAPACITY: usize = 1024;

/// Handler answering requests addressed to one target.
pub trait RequestHandler: Send + Sync {
    /// Produce the reply bytes for one request.
    fn handle(&self, subject: String, payload: Vec<u8>) -> BoxFuture<'static, Vec<u8>>;
}

/// A request waiting in a target's queue.
struct Envelope {
    subject: String,
    payload: Vec<u8>,
    reply: oneshot::Sender<Vec<u8>>,
}

/// In-memory transport using tokio channels.
///
/// Requests to a target are queued and served concurrently by that target's
/// task. A caller that gives up at its deadline leaves the handler running;
/// the late reply is discarded, as it would be on a real bus.
#[derive(Default)]
pub struct ChannelTransport {
    routes: Arc<RwLock<HashMap<String, mpsc::Sender<Envelope>>>>,
}

impl ChannelTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a target, replacing any previous one.
    pub async fn register(&self, target: impl Into<String>, handler: Arc<dyn RequestHandler>) {
        let target = target.into();
        let (tx, mut rx) = mpsc::channel::<Envelope>(CHANNEL_CAPACITY);

        let name = target.clone();
        tokio::spawn(async move {
            while let Some(envelope) = rx.recv().await {
                let reply = handler.handle(envelope.subject, envelope.payload);
                tokio::spawn(async move {
                    // Receiver is gone when the caller already timed out.
                    let _ = envelope.reply.send(reply.await);
                });
            }
            debug!(target = %name, "Channel handler stopped");
        });

        info!(target = %target, "Channel handler registered");
        self.routes.write().await.insert(target, tx);
    }

    /// Remove a target. Later requests to it fail with `NoRoute`.
    pub async fn deregister(&self, target: &str) -> bool {
        self.routes.write().await.remove(target).is_some()
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn request(
        &self,
        target: &str,
        subject: &str,
        payload: Vec<u8>,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        let sender = self
            .routes
            .read()
            .await
            .get(target)
            .cloned()
            .ok_or_else(|| TransportError::NoRoute(target.to_string()))?;

        let (reply_tx, reply_rx) = oneshot::channel();
        let envelope = Envelope {
            subject: subject.to_string(),
            payload,
            reply: reply_tx,
        };

        let exchange = async {
            sender
                .send(envelope)
                .await
                .map_err(|_| TransportError::NoRoute(target.to_string()))?;
            reply_rx.await.map_err(|_| {
                TransportError::Connection(format!(
                    "Handler for '{}' dropped the request",
                    target
                ))
            })
        };

        match tokio::time::timeout(timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout),
        }
    }
}

#[cfg(test)]
mod tests;

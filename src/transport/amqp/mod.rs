//! AMQP (RabbitMQ) request/response transport.
//!
//! Requests go to a topic exchange with routing key `{target}.{subject}`;
//! reps bind their queue with `{rep_guid}.*`. Replies come back on RabbitMQ's
//! direct reply-to pseudo-queue and are matched to callers by correlation id.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use backon::Retryable;
use deadpool_lapin::{Manager, Object, Pool, PoolError};
use futures::StreamExt;
use lapin::{
    options::{BasicConsumeOptions, BasicPublishOptions, ExchangeDeclareOptions},
    types::FieldTable,
    BasicProperties, Channel, Consumer, ExchangeKind,
};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{Transport, TransportError, DEFAULT_REQUESTS_EXCHANGE};
use crate::utils::retry::connection_backoff;

/// RabbitMQ direct reply-to pseudo-queue.
pub const DIRECT_REPLY_TO: &str = "amq.rabbitmq.reply-to";

/// Configuration for AMQP connection.
#[derive(Clone, Debug)]
pub struct AmqpConfig {
    /// AMQP connection URL (e.g., amqp://localhost:5672).
    pub url: String,
    /// Exchange name for publishing requests.
    pub exchange: String,
}

impl AmqpConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            exchange: DEFAULT_REQUESTS_EXCHANGE.to_string(),
        }
    }

    pub fn with_exchange(mut self, exchange: impl Into<String>) -> Self {
        self.exchange = exchange.into();
        self
    }
}

/// Build the routing key a request is published with.
pub fn routing_key(target: &str, subject: &str) -> String {
    format!("{}.{}", target, subject)
}

type Waiters = HashMap<String, oneshot::Sender<Vec<u8>>>;

/// Callers waiting for replies, keyed by correlation id.
#[derive(Clone, Default)]
struct PendingReplies {
    waiters: Arc<Mutex<Waiters>>,
    closed: Arc<AtomicBool>,
}

impl PendingReplies {
    fn waiters(&self) -> MutexGuard<'_, Waiters> {
        self.waiters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reserve a slot for one reply.
    ///
    /// Fails once the reply consumer has stopped, since no reply could ever
    /// be routed.
    fn register(&self, correlation_id: String) -> Result<PendingSlot, TransportError> {
        let (tx, rx) = oneshot::channel();
        self.waiters().insert(correlation_id.clone(), tx);
        let slot = PendingSlot {
            replies: self.clone(),
            correlation_id,
            reply: rx,
        };
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Connection(
                "Reply consumer stopped".to_string(),
            ));
        }
        Ok(slot)
    }

    /// Hand a reply to its waiter. Returns false if nobody is waiting.
    fn deliver(&self, correlation_id: &str, data: Vec<u8>) -> bool {
        match self.waiters().remove(correlation_id) {
            Some(tx) => {
                // Receiver is gone if the caller gave up meanwhile.
                let _ = tx.send(data);
                true
            }
            None => false,
        }
    }

    /// Fail every current and future waiter.
    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.waiters().clear();
    }
}

/// One in-flight request's claim on a reply.
///
/// Dropping the slot releases its entry, whether the call completed, timed
/// out, or was cancelled by the caller.
struct PendingSlot {
    replies: PendingReplies,
    correlation_id: String,
    reply: oneshot::Receiver<Vec<u8>>,
}

impl PendingSlot {
    async fn wait(mut self, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        match tokio::time::timeout(timeout, &mut self.reply).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(TransportError::Connection(
                "Reply consumer stopped".to_string(),
            )),
            Err(_) => Err(TransportError::Timeout),
        }
    }
}

impl Drop for PendingSlot {
    fn drop(&mut self) {
        self.replies.waiters().remove(&self.correlation_id);
    }
}

/// AMQP transport using RabbitMQ direct reply-to.
///
/// One channel carries both the published requests and the reply consumer,
/// as direct reply-to requires. Calls share it concurrently.
pub struct AmqpTransport {
    _pool: Pool,
    _connection: Object,
    channel: Channel,
    config: AmqpConfig,
    identity: String,
    pending: PendingReplies,
}

impl AmqpTransport {
    /// Connect, declare the request exchange, and start the reply consumer.
    ///
    /// The initial connection is retried with exponential backoff.
    pub async fn connect(config: AmqpConfig) -> Result<Self, TransportError> {
        let manager = Manager::new(config.url.clone(), Default::default());
        let pool = Pool::builder(manager)
            .max_size(1)
            .build()
            .map_err(|e| TransportError::Connection(format!("Failed to create pool: {}", e)))?;

        let connection = (|| async { pool.get().await })
            .retry(connection_backoff())
            .notify(|e: &PoolError, delay: Duration| {
                warn!(
                    error = %e,
                    backoff_ms = %delay.as_millis(),
                    url = %config.url,
                    "Failed to connect to AMQP, retrying after backoff"
                );
            })
            .await
            .map_err(|e| TransportError::Connection(format!("Failed to connect: {}", e)))?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| TransportError::Connection(format!("Failed to create channel: {}", e)))?;

        channel
            .exchange_declare(
                &config.exchange,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                TransportError::Connection(format!("Failed to declare exchange: {}", e))
            })?;

        let identity = Uuid::new_v4().to_string();
        let consumer = channel
            .basic_consume(
                DIRECT_REPLY_TO,
                &identity,
                BasicConsumeOptions {
                    no_ack: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                TransportError::Connection(format!("Failed to consume replies: {}", e))
            })?;

        let pending = PendingReplies::default();
        tokio::spawn(Self::route_replies(consumer, pending.clone()));

        info!(
            exchange = %config.exchange,
            url = %config.url,
            identity = %identity,
            "Connected to AMQP"
        );

        Ok(Self {
            _pool: pool,
            _connection: connection,
            channel,
            config,
            identity,
            pending,
        })
    }

    /// This client's identity on the bus.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Hand each reply to the caller waiting on its correlation id.
    async fn route_replies(mut consumer: Consumer, pending: PendingReplies) {
        while let Some(delivery) = consumer.next().await {
            match delivery {
                Ok(delivery) => {
                    let Some(id) = delivery
                        .properties
                        .correlation_id()
                        .as_ref()
                        .map(|id| id.as_str().to_string())
                    else {
                        debug!("Dropping reply without correlation id");
                        continue;
                    };

                    if !pending.deliver(&id, delivery.data) {
                        debug!(correlation_id = %id, "Dropping late or unknown reply");
                    }
                }
                Err(e) => {
                    error!(error = %e, "Reply consumer error");
                    break;
                }
            }
        }

        // Fails every waiting caller and every later request.
        pending.close();
        warn!("Reply consumer stopped");
    }
}

#[async_trait]
impl Transport for AmqpTransport {
    #[tracing::instrument(name = "amqp.request", skip_all, fields(target = %target, subject = %subject))]
    async fn request(
        &self,
        target: &str,
        subject: &str,
        payload: Vec<u8>,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        let correlation_id = Uuid::new_v4().to_string();
        let slot = self.pending.register(correlation_id.clone())?;

        let routing_key = routing_key(target, subject);
        let properties = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_reply_to(DIRECT_REPLY_TO.into())
            .with_correlation_id(correlation_id.as_str().into())
            .with_expiration(timeout.as_millis().to_string().into());

        let published = self
            .channel
            .basic_publish(
                &self.config.exchange,
                &routing_key,
                BasicPublishOptions::default(),
                &payload,
                properties,
            )
            .await;

        if let Err(e) = published {
            return Err(TransportError::Publish(format!("Failed to publish: {}", e)));
        }

        debug!(
            exchange = %self.config.exchange,
            routing_key = %routing_key,
            correlation_id = %correlation_id,
            "Published request"
        );

        slot.wait(timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routing_key_generation() {
        assert_eq!(routing_key("rep-1", "score"), "rep-1.score");
        assert_eq!(
            routing_key("rep-1", "release-reservation"),
            "rep-1.release-reservation"
        );
    }

    #[test]
    fn test_config_defaults_to_requests_exchange() {
        let config = AmqpConfig::new("amqp://localhost:5672");
        assert_eq!(config.exchange, "rep.requests");
    }

    #[test]
    fn test_config_with_exchange() {
        let config = AmqpConfig::new("amqp://localhost:5672").with_exchange("auction.reps");
        assert_eq!(config.exchange, "auction.reps");
    }

    #[test]
    fn test_pending_map_survives_poison() {
        let pending = PendingReplies::default();
        let poisoner = pending.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.waiters.lock().unwrap();
            panic!("poison the lock");
        })
        .join();

        let _slot = pending.register("id".to_string()).unwrap();
        assert_eq!(pending.waiters().len(), 1);
    }

    #[tokio::test]
    async fn test_delivered_reply_reaches_waiter() {
        let pending = PendingReplies::default();
        let slot = pending.register("id".to_string()).unwrap();

        assert!(pending.deliver("id", b"{}".to_vec()));
        assert_eq!(slot.wait(Duration::from_secs(1)).await.unwrap(), b"{}");
        assert!(pending.waiters().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_reply_is_not_delivered() {
        let pending = PendingReplies::default();
        assert!(!pending.deliver("nobody", b"{}".to_vec()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_past_deadline_times_out_and_releases_slot() {
        let pending = PendingReplies::default();
        let slot = pending.register("id".to_string()).unwrap();

        let result = slot.wait(Duration::from_millis(100)).await;

        assert_eq!(result, Err(TransportError::Timeout));
        assert!(pending.waiters().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_wait_releases_slot() {
        let pending = PendingReplies::default();
        let slot = pending.register("id".to_string()).unwrap();
        assert_eq!(pending.waiters().len(), 1);

        // The caller gives up long before the request's own deadline.
        let cancelled =
            tokio::time::timeout(Duration::from_millis(10), slot.wait(Duration::from_secs(60)))
                .await;

        assert!(cancelled.is_err());
        assert!(pending.waiters().is_empty());
    }

    #[tokio::test]
    async fn test_close_fails_waiting_callers() {
        let pending = PendingReplies::default();
        let slot = pending.register("id".to_string()).unwrap();

        pending.close();

        assert!(matches!(
            slot.wait(Duration::from_secs(1)).await,
            Err(TransportError::Connection(_))
        ));
    }

    #[test]
    fn test_register_after_close_is_connection_error() {
        let pending = PendingReplies::default();
        pending.close();

        let result = pending.register("id".to_string());

        assert!(matches!(result, Err(TransportError::Connection(_))));
        assert!(pending.waiters().is_empty());
    }
}

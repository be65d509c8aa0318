//! Message bus transport.
//!
//! This module contains:
//! - `Transport` trait: one request, one reply (or none within the timeout)
//! - Transport configuration types
//! - Implementations: AMQP (RabbitMQ), in-process channel, Mock

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

// Implementation modules
#[cfg(feature = "amqp")]
pub mod amqp;
pub mod channel;
pub mod mock;

// Re-exports
#[cfg(feature = "amqp")]
pub use amqp::{AmqpConfig, AmqpTransport};
pub use channel::{ChannelTransport, RequestHandler};
pub use mock::{MockBehavior, MockTransport};

/// Errors reported by a transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("No reply within timeout")]
    Timeout,

    #[error("No route to target '{0}'")]
    NoRoute(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Publish failed: {0}")]
    Publish(String),
}

/// Request/response capability of the bus.
///
/// Contract: send once; return the reply if the target answers within
/// `timeout`, otherwise `TransportError::Timeout`. Retries, if any, happen
/// below this interface.
///
/// Implementations:
/// - `AmqpTransport`: RabbitMQ with direct reply-to
/// - `ChannelTransport`: in-process handlers
/// - `MockTransport`: scripted outcomes for testing
#[async_trait]
pub trait Transport: Send + Sync {
    async fn request(
        &self,
        target: &str,
        subject: &str,
        payload: Vec<u8>,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError>;
}

// ============================================================================
// Configuration
// ============================================================================

/// Transport configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// AMQP-specific configuration.
    pub amqp: AmqpTransportConfig,
}

/// AMQP-specific configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AmqpTransportConfig {
    /// AMQP connection URL.
    pub url: String,
    /// Topic exchange requests are published to.
    pub exchange: String,
}

impl Default for AmqpTransportConfig {
    fn default() -> Self {
        Self {
            url: "amqp://localhost:5672".to_string(),
            exchange: DEFAULT_REQUESTS_EXCHANGE.to_string(),
        }
    }
}

/// Default exchange reps bind their request queues to.
pub const DEFAULT_REQUESTS_EXCHANGE: &str = "rep.requests";

// ============================================================================
// Factory
// ============================================================================

/// Initialize the bus transport from configuration.
///
/// Requires the `amqp` feature (included in default).
pub async fn init_transport(
    config: &TransportConfig,
) -> std::result::Result<Arc<dyn Transport>, Box<dyn std::error::Error + Send + Sync>> {
    #[cfg(feature = "amqp")]
    {
        let amqp_config =
            AmqpConfig::new(&config.amqp.url).with_exchange(&config.amqp.exchange);
        let transport = AmqpTransport::connect(amqp_config).await?;
        info!(transport = "amqp", "Transport initialized");
        Ok(Arc::new(transport))
    }

    #[cfg(not(feature = "amqp"))]
    {
        let _ = config;
        info!(transport = "none", "No bus transport compiled in");
        Err("AMQP support requires the 'amqp' feature. Rebuild with --features amqp".into())
    }
}

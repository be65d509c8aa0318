//! Mock transport implementation for testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

use super::{Transport, TransportError};

/// Scripted outcome for requests to one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockBehavior {
    /// Reply immediately with these bytes.
    Reply(Vec<u8>),
    /// Reply with these bytes after a delay; a delay at or past the timeout
    /// produces `Timeout` instead.
    Delay(Duration, Vec<u8>),
    /// Never reply; fails with `Timeout` once the deadline passes.
    Timeout,
    /// Fail with a connection error.
    Fail(String),
    /// Fail with `NoRoute`.
    NoRoute,
}

/// One request seen by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub target: String,
    pub subject: String,
    pub payload: Vec<u8>,
}

/// Mock transport for testing.
pub struct MockTransport {
    behaviors: RwLock<HashMap<String, MockBehavior>>,
    default_behavior: RwLock<MockBehavior>,
    calls: RwLock<Vec<RecordedCall>>,
    completions: RwLock<Vec<(String, Instant)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self {
            behaviors: RwLock::new(HashMap::new()),
            default_behavior: RwLock::new(MockBehavior::Reply(Vec::new())),
            calls: RwLock::new(Vec::new()),
            completions: RwLock::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the outcome for one target.
    pub async fn set_behavior(&self, target: &str, behavior: MockBehavior) {
        self.behaviors
            .write()
            .await
            .insert(target.to_string(), behavior);
    }

    /// Script the outcome for targets without their own behavior.
    pub async fn set_default_behavior(&self, behavior: MockBehavior) {
        *self.default_behavior.write().await = behavior;
    }

    pub async fn call_count(&self) -> usize {
        self.calls.read().await.len()
    }

    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.calls.read().await.clone()
    }

    /// When each request finished, in completion order.
    pub async fn completions(&self) -> Vec<(String, Instant)> {
        self.completions.read().await.clone()
    }

    /// Highest number of requests that were in flight at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn behavior_for(&self, target: &str) -> MockBehavior {
        match self.behaviors.read().await.get(target) {
            Some(b) => b.clone(),
            None => self.default_behavior.read().await.clone(),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn request(
        &self,
        target: &str,
        subject: &str,
        payload: Vec<u8>,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        self.calls.write().await.push(RecordedCall {
            target: target.to_string(),
            subject: subject.to_string(),
            payload,
        });

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        let result = match self.behavior_for(target).await {
            MockBehavior::Reply(bytes) => {
                // Yield so concurrent callers overlap.
                tokio::task::yield_now().await;
                Ok(bytes)
            }
            MockBehavior::Delay(delay, _) if delay >= timeout => {
                tokio::time::sleep(timeout).await;
                Err(TransportError::Timeout)
            }
            MockBehavior::Delay(delay, bytes) => {
                tokio::time::sleep(delay).await;
                Ok(bytes)
            }
            MockBehavior::Timeout => {
                tokio::time::sleep(timeout).await;
                Err(TransportError::Timeout)
            }
            MockBehavior::Fail(message) => Err(TransportError::Connection(message)),
            MockBehavior::NoRoute => Err(TransportError::NoRoute(target.to_string())),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.completions
            .write()
            .await
            .push((target.to_string(), Instant::now()));
        result
    }
}

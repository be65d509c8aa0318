use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Echoes the subject back, prefixed onto the payload.
struct EchoHandler {
    count: Arc<AtomicUsize>,
}

impl RequestHandler for EchoHandler {
    fn handle(&self, subject: String, payload: Vec<u8>) -> BoxFuture<'static, Vec<u8>> {
        self.count.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            let mut reply = subject.into_bytes();
            reply.push(b':');
            reply.extend(payload);
            reply
        })
    }
}

/// Replies only after a fixed delay.
struct SlowHandler(Duration);

impl RequestHandler for SlowHandler {
    fn handle(&self, _subject: String, _payload: Vec<u8>) -> BoxFuture<'static, Vec<u8>> {
        let delay = self.0;
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            b"late".to_vec()
        })
    }
}

#[tokio::test]
async fn test_channel_request_reaches_registered_handler() {
    let transport = ChannelTransport::new();
    let count = Arc::new(AtomicUsize::new(0));
    transport
        .register(
            "rep-1",
            Arc::new(EchoHandler {
                count: count.clone(),
            }),
        )
        .await;

    let reply = transport
        .request("rep-1", "score", b"42".to_vec(), Duration::from_secs(1))
        .await
        .unwrap();

    assert_eq!(reply, b"score:42".to_vec());
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_channel_unknown_target_has_no_route() {
    let transport = ChannelTransport::new();

    let result = transport
        .request("missing", "reset", vec![], Duration::from_secs(1))
        .await;

    assert_eq!(result, Err(TransportError::NoRoute("missing".to_string())));
}

#[tokio::test(start_paused = true)]
async fn test_channel_slow_handler_times_out() {
    let transport = ChannelTransport::new();
    transport
        .register("slow", Arc::new(SlowHandler(Duration::from_secs(5))))
        .await;

    let result = transport
        .request("slow", "score", vec![], Duration::from_millis(100))
        .await;

    assert_eq!(result, Err(TransportError::Timeout));
}

#[tokio::test]
async fn test_channel_deregister() {
    let transport = ChannelTransport::new();
    let count = Arc::new(AtomicUsize::new(0));
    transport
        .register("rep-1", Arc::new(EchoHandler { count }))
        .await;

    assert!(transport.deregister("rep-1").await);
    assert!(!transport.deregister("rep-1").await);

    let result = transport
        .request("rep-1", "reset", vec![], Duration::from_secs(1))
        .await;
    assert_eq!(result, Err(TransportError::NoRoute("rep-1".to_string())));
}

#[tokio::test]
async fn test_channel_concurrent_requests_to_one_target() {
    let transport = Arc::new(ChannelTransport::new());
    let count = Arc::new(AtomicUsize::new(0));
    transport
        .register(
            "rep-1",
            Arc::new(EchoHandler {
                count: count.clone(),
            }),
        )
        .await;

    let calls = (0..10).map(|i| {
        let transport = transport.clone();
        async move {
            transport
                .request(
                    "rep-1",
                    "score",
                    i.to_string().into_bytes(),
                    Duration::from_secs(1),
                )
                .await
        }
    });
    let replies = futures::future::join_all(calls).await;

    assert_eq!(replies.len(), 10);
    assert!(replies.iter().all(|r| r.is_ok()));
    assert_eq!(count.load(Ordering::SeqCst), 10);
}

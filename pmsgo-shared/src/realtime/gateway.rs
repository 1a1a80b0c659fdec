/// Cross-instance socket fan-out
///
/// Every server instance holds one [`RealtimeGateway`]. Sockets on the
/// instance subscribe to its local broadcast channel. `emit` delivers an
/// event locally and, when Redis is configured, publishes it on a shared
/// pub/sub channel. A background subscriber on each instance picks up
/// envelopes from the other instances and delivers them locally. Envelopes
/// carrying the instance's own id are dropped, so nothing is delivered
/// twice.
///
/// ```text
///  instance A                      Redis                      instance B
///  emit ──▶ local sockets
///       └─▶ PUBLISH pmsgo:realtime ──────▶ subscriber ──▶ local sockets
/// ```

use redis::aio::{ConnectionManager, PubSub};
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::event::{Envelope, RealtimeEvent};
use crate::redis::{RedisClient, RedisClientError};

/// Default pub/sub channel
pub const DEFAULT_CHANNEL: &str = "pmsgo:realtime";

const LOCAL_CAPACITY: usize = 1024;

#[derive(Debug, thiserror::Error)]
pub enum RealtimeError {
    #[error(transparent)]
    Redis(#[from] RedisClientError),

    #[error("Malformed envelope: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<redis::RedisError> for RealtimeError {
    fn from(err: redis::RedisError) -> Self {
        RealtimeError::Redis(err.into())
    }
}

/// Exponential reconnect delay, 1 s doubling up to 30 s
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(30))
    }
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Delay to wait now; doubles the next one
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

struct Inner {
    instance_id: Uuid,
    local: broadcast::Sender<Envelope>,
    publisher: Option<ConnectionManager>,
    channel: String,
    shutdown: CancellationToken,
}

/// Handle to this instance's real-time fan-out; cheap to clone
#[derive(Clone)]
pub struct RealtimeGateway {
    inner: Arc<Inner>,
}

impl RealtimeGateway {
    fn build(publisher: Option<ConnectionManager>, channel: String) -> Self {
        let (local, _) = broadcast::channel(LOCAL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                instance_id: Uuid::new_v4(),
                local,
                publisher,
                channel,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Gateway that only reaches sockets on this instance
    pub fn local() -> Self {
        Self::build(None, DEFAULT_CHANNEL.to_string())
    }

    /// Gateway mirrored through Redis pub/sub
    ///
    /// Subscribes once before returning, so an unreachable Redis fails
    /// startup instead of degrading silently. Later disconnects are retried
    /// in the background with [`Backoff`].
    pub async fn connect(
        client: &RedisClient,
        channel: impl Into<String>,
    ) -> Result<Self, RealtimeError> {
        let channel = channel.into();
        let pubsub = subscribe(client, &channel).await?;
        let gateway = Self::build(Some(client.connection()), channel.clone());

        tracing::info!(
            instance_id = %gateway.inner.instance_id,
            channel = %channel,
            "Real-time gateway subscribed"
        );

        tokio::spawn(subscriber_loop(gateway.clone(), client.clone(), pubsub));

        Ok(gateway)
    }

    pub fn instance_id(&self) -> Uuid {
        self.inner.instance_id
    }

    pub fn is_distributed(&self) -> bool {
        self.inner.publisher.is_some()
    }

    pub fn channel(&self) -> &str {
        &self.inner.channel
    }

    /// Receiver for every envelope delivered on this instance
    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.inner.local.subscribe()
    }

    /// Delivers locally, then publishes to the other instances
    ///
    /// Publish failures are logged; the local delivery has already happened.
    pub async fn emit(&self, audience: Uuid, event: RealtimeEvent) {
        let envelope = Envelope {
            origin: self.inner.instance_id,
            audience,
            event,
        };

        self.deliver(envelope.clone());

        if let Err(e) = self.publish(&envelope).await {
            tracing::warn!(
                error = %e,
                event = envelope.event.name(),
                "Failed to publish real-time event"
            );
        }
    }

    async fn publish(&self, envelope: &Envelope) -> Result<(), RealtimeError> {
        let Some(publisher) = &self.inner.publisher else {
            return Ok(());
        };

        let payload = serde_json::to_string(envelope)?;
        let mut conn = publisher.clone();
        let _: i64 = conn.publish(&self.inner.channel, payload).await?;

        Ok(())
    }

    fn deliver(&self, envelope: Envelope) {
        // Err only means no socket is listening right now
        let _ = self.inner.local.send(envelope);
    }

    /// Handles a payload received from the pub/sub channel
    ///
    /// Returns whether it was delivered; envelopes from this instance are not.
    pub fn accept_remote(&self, payload: &str) -> Result<bool, RealtimeError> {
        let envelope: Envelope = serde_json::from_str(payload)?;

        if envelope.origin == self.inner.instance_id {
            return Ok(false);
        }

        self.deliver(envelope);
        Ok(true)
    }

    /// Stops the background subscriber
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }
}

async fn subscribe(client: &RedisClient, channel: &str) -> Result<PubSub, RealtimeError> {
    let mut pubsub = client.pubsub().await?;
    pubsub.subscribe(channel).await?;
    Ok(pubsub)
}

async fn subscriber_loop(gateway: RealtimeGateway, client: RedisClient, first: PubSub) {
    let shutdown = gateway.inner.shutdown.clone();
    let channel = gateway.inner.channel.clone();
    let mut backoff = Backoff::default();
    let mut connection = Some(first);

    loop {
        let pubsub = match connection.take() {
            Some(pubsub) => pubsub,
            None => {
                let delay = backoff.next_delay();
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }

                match subscribe(&client, &channel).await {
                    Ok(pubsub) => {
                        tracing::info!(channel = %channel, "Real-time subscriber reconnected");
                        backoff.reset();
                        pubsub
                    }
                    Err(e) => {
                        tracing::warn!(
                            error = %e,
                            retry_in_secs = delay.as_secs(),
                            "Real-time subscriber reconnect failed"
                        );
                        continue;
                    }
                }
            }
        };

        if pump(&gateway, pubsub, &shutdown).await {
            break;
        }

        tracing::warn!(channel = %channel, "Real-time subscription lost");
    }

    tracing::info!("Real-time subscriber stopped");
}

/// Forwards messages until the stream ends or shutdown; true on shutdown
async fn pump(gateway: &RealtimeGateway, mut pubsub: PubSub, shutdown: &CancellationToken) -> bool {
    let mut stream = pubsub.on_message();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return true,
            msg = stream.next() => {
                let Some(msg) = msg else {
                    return false;
                };

                let payload: String = match msg.get_payload() {
                    Ok(payload) => payload,
                    Err(e) => {
                        tracing::warn!(error = %e, "Unreadable real-time payload");
                        continue;
                    }
                };

                if let Err(e) = gateway.accept_remote(&payload) {
                    tracing::warn!(error = %e, "Dropping real-time message");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::redis::RedisConfig;

    fn deleted() -> RealtimeEvent {
        RealtimeEvent::TaskDeleted { id: Uuid::new_v4() }
    }

    #[tokio::test]
    async fn test_local_emit_reaches_subscribers() {
        let gateway = RealtimeGateway::local();
        let mut rx = gateway.subscribe();
        let audience = Uuid::new_v4();
        let event = deleted();

        gateway.emit(audience, event.clone()).await;

        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.audience, audience);
        assert_eq!(envelope.origin, gateway.instance_id());
        assert_eq!(envelope.event, event);
        assert!(!gateway.is_distributed());
    }

    #[tokio::test]
    async fn test_emit_without_subscribers_is_fine() {
        RealtimeGateway::local().emit(Uuid::new_v4(), deleted()).await;
    }

    #[tokio::test]
    async fn test_accept_remote_drops_own_origin() {
        let gateway = RealtimeGateway::local();
        let mut rx = gateway.subscribe();

        let own = Envelope {
            origin: gateway.instance_id(),
            audience: Uuid::new_v4(),
            event: deleted(),
        };
        let payload = serde_json::to_string(&own).unwrap();
        assert!(!gateway.accept_remote(&payload).unwrap());
        assert!(rx.try_recv().is_err());

        let foreign = Envelope {
            origin: Uuid::new_v4(),
            ..own
        };
        let payload = serde_json::to_string(&foreign).unwrap();
        assert!(gateway.accept_remote(&payload).unwrap());
        assert_eq!(rx.try_recv().unwrap(), foreign);
    }

    #[test]
    fn test_accept_remote_rejects_garbage() {
        let gateway = RealtimeGateway::local();
        assert!(matches!(
            gateway.accept_remote("{not json"),
            Err(RealtimeError::Serialization(_))
        ));
    }

    #[test]
    fn test_backoff_doubles_to_cap_and_resets() {
        let mut backoff = Backoff::default();
        let delays: Vec<u64> = (0..7).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 30, 30]);

        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }

    #[tokio::test]
    #[ignore] // Requires running Redis instance
    async fn test_two_instances_share_events() {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".into());
        let client = RedisClient::new(RedisConfig::new(url)).await.unwrap();
        let channel = format!("pmsgo:test:{}", Uuid::new_v4());

        let a = RealtimeGateway::connect(&client, channel.clone()).await.unwrap();
        let b = RealtimeGateway::connect(&client, channel).await.unwrap();
        let mut rx_a = a.subscribe();
        let mut rx_b = b.subscribe();

        let event = deleted();
        a.emit(Uuid::new_v4(), event.clone()).await;

        let on_b = tokio::time::timeout(Duration::from_secs(5), rx_b.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(on_b.event, event);

        // Delivered once locally, own publish dropped
        assert_eq!(rx_a.recv().await.unwrap().event, event);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(rx_a.try_recv().is_err());

        a.shutdown();
        b.shutdown();
    }
}

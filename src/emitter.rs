use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::model::Ms;

const CHANNEL_CAPACITY: usize = 256;

/// The closed set of published event kinds. Assignment changes and sweep
/// transitions are not on the bus; they are visible via the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventKind {
    #[serde(rename = "booking.created")]
    Created,
    #[serde(rename = "booking.updated")]
    Updated,
    #[serde(rename = "booking.cancelled")]
    Cancelled,
    #[serde(rename = "booking.approved")]
    Approved,
    #[serde(rename = "booking.denied")]
    Denied,
    #[serde(rename = "booking.transferred")]
    Transferred,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Created => "booking.created",
            EventKind::Updated => "booking.updated",
            EventKind::Cancelled => "booking.cancelled",
            EventKind::Approved => "booking.approved",
            EventKind::Denied => "booking.denied",
            EventKind::Transferred => "booking.transferred",
        }
    }
}

/// A booking lifecycle change, published after the owning transaction
/// commits. `room_name` is best-effort display enrichment and may be empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookingEvent {
    pub kind: EventKind,
    pub booking_id: Uuid,
    pub user_id: Uuid,
    pub room_id: Uuid,
    pub room_name: String,
    pub status: String,
    pub start: Ms,
    pub end: Ms,
    #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub occurred_at: Ms,
}

#[derive(Debug)]
pub struct PublishError(pub String);

impl std::fmt::Display for PublishError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "publish failed: {}", self.0)
    }
}

impl std::error::Error for PublishError {}

/// Downstream event delivery. Injected at engine construction so tests and
/// embedding services choose their own transport; the engine only ever calls
/// this best-effort, after commit.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: BookingEvent) -> Result<(), PublishError>;
}

/// In-process pub/sub over a tokio broadcast channel. Sending with no
/// subscribers is a no-op, not a failure.
pub struct BroadcastPublisher {
    tx: broadcast::Sender<BookingEvent>,
}

impl Default for BroadcastPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadcastPublisher {
    pub fn new() -> Self {
        Self {
            tx: broadcast::channel(CHANNEL_CAPACITY).0,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BookingEvent> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl EventPublisher for BroadcastPublisher {
    async fn publish(&self, event: BookingEvent) -> Result<(), PublishError> {
        // Err here only means nobody is listening.
        let _ = self.tx.send(event);
        Ok(())
    }
}

/// Swallows everything. For embedders that poll state instead of listening.
pub struct NullPublisher;

#[async_trait]
impl EventPublisher for NullPublisher {
    async fn publish(&self, _event: BookingEvent) -> Result<(), PublishError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: EventKind) -> BookingEvent {
        BookingEvent {
            kind,
            booking_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            room_id: Uuid::new_v4(),
            room_name: "A-101".into(),
            status: "pending".into(),
            start: 1_700_000_000_000,
            end: 1_700_000_060_000,
            metadata: serde_json::Map::new(),
            occurred_at: 1_699_999_999_000,
        }
    }

    #[tokio::test]
    async fn subscribe_and_receive() {
        let hub = BroadcastPublisher::new();
        let mut rx = hub.subscribe();

        let e = event(EventKind::Created);
        hub.publish(e.clone()).await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), e);
    }

    #[test]
    fn publish_without_subscribers_is_noop() {
        let hub = BroadcastPublisher::new();
        tokio_test::block_on(async {
            hub.publish(event(EventKind::Cancelled)).await.unwrap();
        });
    }

    #[test]
    fn kinds_serialize_as_wire_names() {
        let json = serde_json::to_value(event(EventKind::Approved)).unwrap();
        assert_eq!(json["kind"], "booking.approved");
        assert_eq!(json["status"], "pending");
        // Empty metadata is omitted entirely.
        assert!(json.get("metadata").is_none());
    }

    #[test]
    fn metadata_carries_free_form_values() {
        let mut e = event(EventKind::Denied);
        e.metadata
            .insert("reason".into(), serde_json::json!("room closed"));
        let json = serde_json::to_value(e).unwrap();
        assert_eq!(json["metadata"]["reason"], "room closed");
    }
}

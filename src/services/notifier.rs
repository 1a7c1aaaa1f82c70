//! Outbound announcements for the chat bridge.

use std::time::{Duration, SystemTime};

use thiserror::Error;
use uuid::Uuid;

use crate::{
    dto::sse::{NotificationEvent, ServerEvent},
    state::{
        SseHub,
        game::{ChannelId, CommunityId, PlayerId},
        tally::Tally,
    },
};

/// SSE event name carrying [`NotificationEvent`] payloads.
pub const EVENT_NOTIFICATION: &str = "notification";

/// What happened to the countdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationKind {
    /// The countdown expired; `eliminated` is `None` when nobody had votes.
    HammerResolved {
        /// Player removed from the game.
        eliminated: Option<PlayerId>,
    },
    /// Periodic reminder while the countdown runs.
    HammerProgress {
        /// Time left on the countdown.
        remaining: Duration,
    },
}

/// A rendered message addressed to one community's destination channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Unique id, lets the bridge drop duplicates.
    pub id: Uuid,
    /// Community the game belongs to.
    pub community: CommunityId,
    /// Structured event.
    pub kind: NotificationKind,
    /// Tally at the time of the event (before any elimination).
    pub tally: Tally,
    /// Chat-ready text.
    pub message: String,
    /// When the scheduler produced it.
    pub emitted_at: SystemTime,
}

impl Notification {
    /// Build a notification with a fresh id.
    pub fn new(
        community: CommunityId,
        kind: NotificationKind,
        tally: Tally,
        message: String,
        emitted_at: SystemTime,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            community,
            kind,
            tally,
            message,
            emitted_at,
        }
    }
}

/// Delivery failure. Callers log it; nothing is retried.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// Nobody is listening for notifications.
    #[error("no notification subscriber connected")]
    NoSubscribers,
    /// The payload could not be encoded.
    #[error("failed to encode notification")]
    Encode(#[from] serde_json::Error),
}

/// Sink for messages posted to a chat destination.
pub trait Notifier: Send + Sync {
    /// Deliver `notification` to `destination`.
    fn post(&self, destination: ChannelId, notification: &Notification) -> Result<(), NotifyError>;
}

/// Publishes notifications on the SSE hub consumed by the chat bridge.
#[derive(Clone)]
pub struct SseNotifier {
    hub: SseHub,
}

impl SseNotifier {
    /// Notifier broadcasting on `hub`.
    pub fn new(hub: SseHub) -> Self {
        Self { hub }
    }
}

impl Notifier for SseNotifier {
    fn post(&self, destination: ChannelId, notification: &Notification) -> Result<(), NotifyError> {
        let payload = NotificationEvent::from_notification(destination, notification);
        let event = ServerEvent::json(Some(EVENT_NOTIFICATION.to_string()), &payload)?;
        self.hub
            .try_broadcast(event)
            .map(|_| ())
            .map_err(|_| NotifyError::NoSubscribers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notification() -> Notification {
        Notification::new(
            CommunityId(1),
            NotificationKind::HammerProgress {
                remaining: Duration::from_secs(90),
            },
            Tally::new(),
            "update".into(),
            SystemTime::UNIX_EPOCH,
        )
    }

    #[test]
    fn posting_without_subscribers_fails() {
        let notifier = SseNotifier::new(SseHub::new(4));
        assert!(matches!(
            notifier.post(ChannelId(3), &notification()),
            Err(NotifyError::NoSubscribers)
        ));
    }

    #[tokio::test]
    async fn subscribers_receive_named_json_event() {
        let hub = SseHub::new(4);
        let mut receiver = hub.subscribe();
        let notifier = SseNotifier::new(hub);

        notifier.post(ChannelId(3), &notification()).unwrap();

        let event = receiver.recv().await.unwrap();
        assert_eq!(event.event.as_deref(), Some(EVENT_NOTIFICATION));
        let body: serde_json::Value = serde_json::from_str(&event.data).unwrap();
        assert_eq!(body["destination_id"], 3);
        assert_eq!(body["kind"], "hammer_progress");
        assert_eq!(body["remaining_secs"], 90);
        assert_eq!(body["message"], "update");
    }
}

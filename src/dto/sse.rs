use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dto::{
        format_system_time,
        game::{TallyEntry, tally_entries},
    },
    services::notifier::{Notification, NotificationKind},
    state::game::{ChannelId, CommunityId, PlayerId},
};

#[derive(Clone, Debug)]
/// Dispatched payload carried across SSE channels.
pub struct ServerEvent {
    /// SSE `event:` name.
    pub event: Option<String>,
    /// SSE `data:` body.
    pub data: String,
}

impl ServerEvent {
    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Initial metadata sent to an SSE client when it connects.
pub struct Handshake {
    /// Identifier of the SSE stream.
    pub stream: String,
    /// Human-readable message confirming the subscription.
    pub message: String,
    /// Whether the backend is running without a storage backend connection.
    pub degraded: bool,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when the backend enters or leaves degraded mode.
pub struct SystemStatus {
    /// `true` while no storage backend is connected.
    pub degraded: bool,
}

#[derive(Debug, Clone, Copy, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
/// Discriminates [`NotificationEvent`] payloads.
pub enum NotificationKindDto {
    /// Countdown expired and was resolved.
    HammerResolved,
    /// Countdown still running.
    HammerProgress,
}

#[derive(Debug, Serialize, ToSchema)]
/// Countdown announcement to be posted by the chat bridge.
pub struct NotificationEvent {
    /// Unique id for de-duplication.
    pub id: Uuid,
    /// Community the game belongs to.
    #[schema(value_type = u64)]
    pub community_id: CommunityId,
    /// Channel the message must be posted to.
    #[schema(value_type = u64)]
    pub destination_id: ChannelId,
    /// Event type.
    pub kind: NotificationKindDto,
    /// Eliminated player, for resolved countdowns that had votes.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<u64>)]
    pub eliminated_id: Option<PlayerId>,
    /// Seconds left, for progress updates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_secs: Option<u64>,
    /// Tally at the time of the event.
    pub tally: Vec<TallyEntry>,
    /// Chat-ready text.
    pub message: String,
    /// Emission time (RFC 3339).
    pub emitted_at: String,
}

impl NotificationEvent {
    /// Project a notification addressed to `destination`.
    pub fn from_notification(destination: ChannelId, notification: &Notification) -> Self {
        let (kind, eliminated_id, remaining_secs) = match &notification.kind {
            NotificationKind::HammerResolved { eliminated } => {
                (NotificationKindDto::HammerResolved, *eliminated, None)
            }
            NotificationKind::HammerProgress { remaining } => (
                NotificationKindDto::HammerProgress,
                None,
                Some(remaining.as_secs()),
            ),
        };
        Self {
            id: notification.id,
            community_id: notification.community,
            destination_id: destination,
            kind,
            eliminated_id,
            remaining_secs,
            tally: tally_entries(&notification.tally),
            message: notification.message.clone(),
            emitted_at: format_system_time(notification.emitted_at),
        }
    }
}

use std::convert::Infallible;

use axum::{
    Router,
    extract::State,
    response::sse::{Event, Sse},
    routing::get,
};
use futures::Stream;
use tracing::info;

use crate::{services::sse_service, state::SharedState};

#[utoipa::path(
    get,
    path = "/sse/notifications",
    tag = "sse",
    responses((status = 200, description = "Hammer notifications for the chat bridge", content_type = "text/event-stream", body = String))
)]
/// Stream countdown notifications, degraded mode changes and a connection handshake.
pub async fn notification_stream(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (receiver, handshake) = sse_service::subscribe_notifications(&state).await;
    info!(
        subscribers = state.notifications().subscriber_count(),
        "new notification SSE connection"
    );
    sse_service::to_sse_stream(receiver, handshake)
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/sse/notifications", get(notification_stream))
}

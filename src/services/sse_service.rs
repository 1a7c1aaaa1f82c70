use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::{
    broadcast::{self, error::RecvError},
    mpsc, watch,
};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info};

use crate::{
    dto::sse::{Handshake, ServerEvent, SystemStatus},
    state::{SharedState, SseHub},
};

/// SSE event name of the per-client handshake.
pub const EVENT_HANDSHAKE: &str = "handshake";
/// SSE event name announcing degraded mode changes.
pub const EVENT_SYSTEM_STATUS: &str = "system_status";

/// Subscribe to the notification stream and prepare the handshake for the new client.
pub async fn subscribe_notifications(
    state: &SharedState,
) -> (broadcast::Receiver<ServerEvent>, Option<ServerEvent>) {
    let receiver = state.notifications().subscribe();
    let handshake = ServerEvent::json(
        Some(EVENT_HANDSHAKE.to_string()),
        &Handshake {
            stream: "notifications".into(),
            message: "notification stream connected".into(),
            degraded: state.is_degraded().await,
        },
    )
    .ok();
    (receiver, handshake)
}

/// Convert a broadcast receiver into an SSE response, forwarding events until
/// the client disconnects. `first` is delivered to this client only.
pub fn to_sse_stream(
    mut receiver: broadcast::Receiver<ServerEvent>,
    first: Option<ServerEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    tokio::spawn(async move {
        if let Some(payload) = first {
            if tx.send(Ok(to_event(payload))).await.is_err() {
                return;
            }
        }

        loop {
            tokio::select! {
                _ = tx.closed() => break,
                recv_result = receiver.recv() => {
                    match recv_result {
                        Ok(payload) => {
                            if tx.send(Ok(to_event(payload))).await.is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Closed) => break,
                        Err(RecvError::Lagged(skipped)) => {
                            debug!(skipped, "notification subscriber lagged");
                            continue;
                        }
                    }
                }
            }
        }

        info!("notification SSE stream disconnected");
    });

    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

fn to_event(payload: ServerEvent) -> Event {
    let mut event = Event::default().data(payload.data);
    if let Some(name) = payload.event {
        event = event.event(name);
    }
    event
}

/// Relay degraded mode changes onto the notification stream until shutdown.
pub async fn run_status_broadcaster(state: SharedState, mut shutdown: watch::Receiver<bool>) {
    let mut degraded = state.degraded_watcher();
    loop {
        tokio::select! {
            changed = degraded.changed() => {
                if changed.is_err() {
                    break;
                }
                let value = *degraded.borrow_and_update();
                broadcast_system_status(state.notifications(), value);
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

/// Broadcast the degraded flag to every connected client.
pub fn broadcast_system_status(hub: &SseHub, degraded: bool) {
    if let Ok(event) = ServerEvent::json(
        Some(EVENT_SYSTEM_STATUS.to_string()),
        &SystemStatus { degraded },
    ) {
        hub.broadcast(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::AppConfig, state::AppState};

    #[tokio::test]
    async fn handshake_reports_degraded_mode() {
        let state = AppState::new(AppConfig::default());
        let (_receiver, handshake) = subscribe_notifications(&state).await;

        let handshake = handshake.unwrap();
        assert_eq!(handshake.event.as_deref(), Some(EVENT_HANDSHAKE));
        let body: serde_json::Value = serde_json::from_str(&handshake.data).unwrap();
        assert_eq!(body["degraded"], true);
        assert_eq!(body["stream"], "notifications");
    }

    #[tokio::test]
    async fn degraded_changes_are_broadcast() {
        let state = AppState::new(AppConfig::default());
        let mut receiver = state.notifications().subscribe();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run_status_broadcaster(state.clone(), shutdown_rx));
        tokio::task::yield_now().await;

        state.update_degraded(false).await;
        let event = tokio::time::timeout(Duration::from_secs(5), receiver.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.event.as_deref(), Some(EVENT_SYSTEM_STATUS));
        assert_eq!(event.data, r#"{"degraded":false}"#);

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }
}

use serde::Serialize;
use utoipa::ToSchema;

/// Health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: String,
    /// Communities currently held in memory.
    pub communities: usize,
    /// Connected notification subscribers.
    pub subscribers: usize,
}

impl HealthResponse {
    /// Build a response; `degraded` is set while no storage backend is connected.
    pub fn new(degraded: bool, communities: usize, subscribers: usize) -> Self {
        Self {
            status: if degraded { "degraded" } else { "ok" }.to_string(),
            communities,
            subscribers,
        }
    }
}

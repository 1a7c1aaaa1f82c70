/// Hammer countdown scheduler.
pub mod countdown;
/// OpenAPI documentation generation.
pub mod documentation;
/// Vote, hammer and elimination commands.
pub mod game_service;
/// Health check service.
pub mod health_service;
/// Outbound notification sink.
pub mod notifier;
/// Ordered write queue and store reconciliation.
pub mod persistence;
/// Chat-ready text rendering.
pub mod render;
/// Roster updates pushed by the chat bridge.
pub mod roster_service;
/// Server-Sent Events broadcasting service.
pub mod sse_service;
/// Storage connection supervisor with backoff and reconciliation.
pub mod storage_supervisor;

//! Library crate for mafiadon-back, exposing modules for binaries and integration tests.

pub mod clock;
pub mod config;
/// Persistence layer: row models, storage errors and game store backends.
pub mod dao;
/// Request and response payloads.
pub mod dto;
/// Service and HTTP error types.
pub mod error;
/// HTTP route trees.
pub mod routes;
/// Game commands, countdown scheduler and background tasks.
pub mod services;
/// Shared in-memory state.
pub mod state;

/// Durable game stores and their backends.
pub mod game_store;
/// Row types shared by every backend.
pub mod models;
/// Storage abstraction layer for database operations.
pub mod storage;

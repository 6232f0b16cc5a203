/// Persisted record shapes.
pub mod models;
/// Session persistence backends.
pub mod session_store;
/// Storage error types shared by backends.
pub mod storage;

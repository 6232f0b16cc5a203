/// Single-elimination bracket layouts.
pub mod bracket_generator;
/// Periodic eviction of expired sessions.
pub mod cleanup_supervisor;
/// Single-flight writes and keyed debouncing.
pub mod coalescer;
/// Health check service.
pub mod health_service;
/// Player names and captain flags.
pub mod identity;
/// Winner bookkeeping and phase tracking.
pub mod progression;
/// Close-out point awards.
pub mod scoring;
/// Session lifecycle operations.
pub mod session_service;
/// Balanced team drafting.
pub mod shuffler;
/// Server-Sent Events message generation.
pub mod sse_events;
/// Server-Sent Events broadcasting service.
pub mod sse_service;
/// Close-out summaries.
pub mod summary;

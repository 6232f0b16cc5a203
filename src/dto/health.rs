use serde::Serialize;

/// Simple health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Health status, always `ok` while the process serves requests.
    pub status: String,
    /// Number of live sessions.
    pub sessions: usize,
    /// Number of connected public SSE clients.
    pub subscribers: usize,
}

impl HealthResponse {
    /// Create a health response indicating the system is operational.
    pub fn ok(sessions: usize, subscribers: usize) -> Self {
        Self {
            status: "ok".to_string(),
            sessions,
            subscribers,
        }
    }
}

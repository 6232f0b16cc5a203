use crate::{dto::health::HealthResponse, state::SharedState};

/// Report liveness along with basic load figures.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    HealthResponse::ok(
        state.sessions().len(),
        state.public_sse().subscriber_count(),
    )
}

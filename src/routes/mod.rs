use axum::Router;

use crate::state::SharedState;

pub mod health;
pub mod sessions;
pub mod sse;

/// Compose all route trees, wiring in shared state.
pub fn router(state: SharedState) -> Router<()> {
    health::router()
        .merge(sse::router())
        .merge(sessions::router())
        .with_state(state)
}

use serde::Serialize;
use tracing::warn;

use crate::{
    dto::{
        session::SessionView,
        sse::{ServerEvent, SessionUpdatedEvent},
    },
    state::SharedState,
};

/// SSE event name carrying debounced session snapshots.
pub const EVENT_SESSION_UPDATED: &str = "session.updated";

/// Broadcast the settled state of a session to public subscribers.
pub fn broadcast_session_updated(state: &SharedState, view: SessionView) {
    send_public_event(state, EVENT_SESSION_UPDATED, &SessionUpdatedEvent(view));
}

fn send_public_event(state: &SharedState, event: &str, payload: &impl Serialize) {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(event) => state.public_sse().broadcast(event),
        Err(err) => warn!(event, error = %err, "failed to serialize public SSE payload"),
    }
}

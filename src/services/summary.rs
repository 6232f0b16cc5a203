//! Close-out summary rendering and delivery.

use std::collections::HashMap;

use futures::future::BoxFuture;
use serde::Serialize;
use thiserror::Error;

use crate::{
    config::ScoringRules,
    dto::sse::ServerEvent,
    services::identity::placeholder_name,
    state::{
        SseHub,
        session::{PlayerId, TrainingSession},
    },
};

/// SSE event name carrying close-out summaries.
pub const EVENT_SESSION_SUMMARY: &str = "session.summary";

/// Failure reported by a summary sink.
#[derive(Debug, Error)]
pub enum SummaryError {
    /// The payload could not be serialized.
    #[error("failed to encode summary: {0}")]
    Encode(#[from] serde_json::Error),
    /// The channel is closed or unreachable.
    #[error("summary channel unavailable: {0}")]
    Unavailable(String),
}

/// Destination for rendered close-out summaries.
pub trait SummarySink: Send + Sync {
    /// Publish one rendered summary.
    fn post_summary(&self, text: String) -> BoxFuture<'static, Result<(), SummaryError>>;
}

#[derive(Debug, Serialize)]
struct SummaryPayload {
    text: String,
}

/// Sink publishing summaries on the public SSE stream.
#[derive(Clone)]
pub struct SseSummarySink {
    hub: SseHub,
}

impl SseSummarySink {
    /// Publish summaries as events on `hub`.
    pub fn new(hub: SseHub) -> Self {
        Self { hub }
    }
}

impl SummarySink for SseSummarySink {
    fn post_summary(&self, text: String) -> BoxFuture<'static, Result<(), SummaryError>> {
        let event = ServerEvent::json(
            Some(EVENT_SESSION_SUMMARY.to_string()),
            &SummaryPayload { text },
        );
        let result = event.map(|event| self.hub.broadcast(event)).map_err(Into::into);
        Box::pin(async move { result })
    }
}

fn name_of(names: &HashMap<PlayerId, String>, player: PlayerId) -> String {
    names
        .get(&player)
        .cloned()
        .unwrap_or_else(|| placeholder_name(player))
}

/// Render the plain-text results of a finalized session.
pub fn render_summary(
    session: &TrainingSession,
    names: &HashMap<PlayerId, String>,
    rules: &ScoringRules,
) -> String {
    let mut lines = vec![format!("Training results ({})", session.category)];

    if let Some(team) = session.champion.and_then(|id| session.team(id)) {
        let members: Vec<String> = team
            .players
            .iter()
            .map(|&player| name_of(names, player))
            .collect();
        lines.push(format!(
            "Champion: {} ({}) +{} each",
            team.name,
            members.join(", "),
            rules.win
        ));
    }

    if let Some(mvp) = session.mvp {
        lines.push(format!("MVP: {} +{}", name_of(names, mvp), rules.mvp));
    }

    if !session.highlights.is_empty() {
        let highlights: Vec<String> = session
            .highlights
            .iter()
            .map(|&player| name_of(names, player))
            .collect();
        lines.push(format!(
            "Highlights: {} +{} each",
            highlights.join(", "),
            rules.highlight
        ));
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::session::Team;

    #[test]
    fn summary_lists_champion_mvp_and_highlights() {
        let mut session = TrainingSession::new("ranked");
        session.participants.extend([1, 2, 3, 4]);
        session.teams = vec![Team::numbered(1, vec![1, 2]), Team::numbered(2, vec![3, 4])];
        session.champion = Some(2);
        session.mvp = Some(3);
        session.highlights.extend([1, 4]);

        let names = HashMap::from([(1, "Ana".to_string()), (3, "Cy".to_string())]);
        let text = render_summary(&session, &names, &ScoringRules::default());

        assert_eq!(
            text,
            "Training results (ranked)\n\
             Champion: Team 2 (Cy, Player 4) +3 each\n\
             MVP: Cy +2\n\
             Highlights: Ana, Player 4 +1 each"
        );
    }

    #[tokio::test]
    async fn sse_sink_broadcasts_a_summary_event() {
        let hub = SseHub::new(4);
        let mut receiver = hub.subscribe();
        let sink = SseSummarySink::new(hub);

        sink.post_summary("done".into()).await.unwrap();
        let event = receiver.recv().await.unwrap();
        assert_eq!(event.event.as_deref(), Some(EVENT_SESSION_SUMMARY));
        assert_eq!(event.data, r#"{"text":"done"}"#);
    }
}

//! Session lifecycle operations exposed to the transport layer.
//!
//! Every mutation runs atomically under the session's registry lock, then persists through the
//! single-flight writer and schedules a debounced `session.updated` broadcast. Lifecycle guard
//! failures are reported as `Ok(false)`; only unknown sessions or brackets are errors.

use std::{collections::HashSet, fmt::Display, sync::Arc};

use tracing::{debug, info, warn};

use crate::{
    dto::session::{SessionListItem, SessionView},
    error::ServiceError,
    services::{
        bracket_generator,
        progression::{self, ProgressionError},
        scoring::LedgerError,
        shuffler::{self, ShuffleError},
        sse_events,
        summary::render_summary,
    },
    state::{
        SharedState,
        session::{
            CaptainMode, Draft, PlayerId, SessionError, SessionId, TeamId, TrainingSession,
        },
        state_machine::SessionEvent,
    },
};

/// Why a mutation closure refused to apply.
enum Rejection {
    /// Referenced bracket does not exist.
    Missing(String),
    /// Lifecycle or input guard refused the operation.
    Guard(String),
}

impl From<SessionError> for Rejection {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::UnknownBracket(index) => {
                Rejection::Missing(format!("bracket {index} does not exist"))
            }
            other => Rejection::Guard(other.to_string()),
        }
    }
}

impl From<ProgressionError> for Rejection {
    fn from(err: ProgressionError) -> Self {
        match err {
            ProgressionError::Session(inner) => inner.into(),
            other => Rejection::Guard(other.to_string()),
        }
    }
}

impl From<ShuffleError> for Rejection {
    fn from(err: ShuffleError) -> Self {
        Rejection::Guard(err.to_string())
    }
}

fn session_not_found(id: SessionId) -> ServiceError {
    ServiceError::NotFound(format!("session {id} does not exist"))
}

fn reject(id: SessionId, operation: &'static str, reason: impl Display) -> bool {
    debug!(session_id = %id, operation, %reason, "operation rejected");
    false
}

/// Apply `mutation` to session `id`, committing on success.
///
/// Returns `Ok(None)` when a guard refused the mutation.
async fn apply<T, E>(
    state: &SharedState,
    id: SessionId,
    operation: &'static str,
    mutation: impl FnOnce(&mut TrainingSession) -> Result<T, E>,
) -> Result<Option<T>, ServiceError>
where
    E: Into<Rejection>,
{
    let outcome = state
        .sessions()
        .mutate(id, mutation)
        .ok_or_else(|| session_not_found(id))?;

    let outcome: Result<T, Rejection> = outcome.map_err(Into::into);
    match outcome {
        Ok(value) => {
            commit(state, id).await;
            Ok(Some(value))
        }
        Err(Rejection::Missing(message)) => Err(ServiceError::NotFound(message)),
        Err(Rejection::Guard(reason)) => {
            reject(id, operation, reason);
            Ok(None)
        }
    }
}

/// Schedule a refresh of session `id` and persist every session.
async fn commit(state: &SharedState, id: SessionId) {
    schedule_refresh(state, id);
    state.sessions().persist().await;
}

/// Debounce a `session.updated` broadcast for session `id`.
pub fn schedule_refresh(state: &SharedState, id: SessionId) {
    let weak = Arc::downgrade(state);
    state.refresh().schedule(id, move || async move {
        let Some(state) = weak.upgrade() else {
            return;
        };
        match state.sessions().snapshot(id) {
            Some(session) => {
                let view = render_view(&state, &session).await;
                sse_events::broadcast_session_updated(&state, view);
            }
            None => debug!(session_id = %id, "session vanished before refresh"),
        }
    });
}

/// Project `session` with resolved display names.
async fn render_view(state: &SharedState, session: &TrainingSession) -> SessionView {
    let names = state
        .identity()
        .display_names(session.participants.iter().copied())
        .await;
    SessionView::build(session, &names)
}

/// Open a new session in registration.
pub async fn create_session(state: &SharedState, category: &str) -> Result<SessionId, ServiceError> {
    let category = category.trim();
    if category.is_empty() {
        return Err(ServiceError::InvalidInput("category must not be blank".into()));
    }

    let session = TrainingSession::new(category);
    let id = session.id;
    state.sessions().insert(session);
    commit(state, id).await;

    info!(session_id = %id, category, "session created");
    Ok(id)
}

/// Compact listing of every live session, oldest first.
pub async fn list_sessions(state: &SharedState) -> Vec<SessionListItem> {
    state
        .sessions()
        .list()
        .iter()
        .map(SessionListItem::from)
        .collect()
}

/// Current projection of session `id`.
///
/// With `fresh`, any pending refresh is flushed first so subscribers and the caller agree.
pub async fn session_snapshot(
    state: &SharedState,
    id: SessionId,
    fresh: bool,
) -> Result<SessionView, ServiceError> {
    if fresh && state.refresh().flush(&id).await {
        debug!(session_id = %id, "flushed pending refresh");
    }
    let session = state
        .sessions()
        .snapshot(id)
        .ok_or_else(|| session_not_found(id))?;
    Ok(render_view(state, &session).await)
}

/// Register `player` while registration is open.
pub async fn add_participant(
    state: &SharedState,
    id: SessionId,
    player: PlayerId,
) -> Result<bool, ServiceError> {
    let added = apply(state, id, "add_participant", |session| {
        session.add_participant(player)
    })
    .await?;
    if added.is_some() {
        debug!(session_id = %id, player_id = player, "participant added");
    }
    Ok(added.is_some())
}

/// Withdraw `player` while registration is open.
pub async fn remove_participant(
    state: &SharedState,
    id: SessionId,
    player: PlayerId,
) -> Result<bool, ServiceError> {
    let removed = apply(state, id, "remove_participant", |session| {
        session.remove_participant(player)
    })
    .await?;
    if removed.is_some() {
        debug!(session_id = %id, player_id = player, "participant removed");
    }
    Ok(removed.is_some())
}

/// Resolve which captains take part in a shuffle.
///
/// `captains` are the participants holding the captain role. A per-team cap absorbs at most
/// `team_count * cap` of them; when more signed up, `selected` must name exactly that many.
pub fn captain_preflight(
    mode: CaptainMode,
    team_count: usize,
    captains: &[PlayerId],
    selected: Option<&[PlayerId]>,
) -> Result<Vec<PlayerId>, ShuffleError> {
    let required = match mode {
        CaptainMode::None => return Ok(Vec::new()),
        CaptainMode::Unlimited => return Ok(captains.to_vec()),
        CaptainMode::PerTeamCap(_) => mode.required_captains(team_count),
    };

    if captains.len() <= required {
        return Ok(captains.to_vec());
    }

    let Some(selected) = selected else {
        return Err(ShuffleError::CaptainSelectionRequired {
            required,
            available: captains.len(),
        });
    };
    if selected.len() != required {
        return Err(ShuffleError::InvalidCaptainSelection(format!(
            "expected {required} captains, got {}",
            selected.len()
        )));
    }

    let mut seen = HashSet::with_capacity(selected.len());
    for &player in selected {
        if !seen.insert(player) {
            return Err(ShuffleError::InvalidCaptainSelection(format!(
                "player {player} is selected twice"
            )));
        }
        if !captains.contains(&player) {
            return Err(ShuffleError::InvalidCaptainSelection(format!(
                "player {player} is not a participating captain"
            )));
        }
    }
    Ok(selected.to_vec())
}

fn check_team_count(participants: usize, team_count: usize) -> Result<usize, ShuffleError> {
    if !bracket_generator::supports(team_count) {
        return Err(ShuffleError::UnsupportedTeamCount(team_count));
    }
    shuffler::team_size(participants, team_count)
}

fn build_draft(
    participants: &[PlayerId],
    team_count: usize,
    mode: CaptainMode,
    captains: Vec<PlayerId>,
) -> Result<Draft, ShuffleError> {
    let mut rng = rand::rng();
    let teams = shuffler::shuffle_teams(&mut rng, participants, team_count, mode, &captains)?;
    let team_ids: Vec<TeamId> = teams.iter().map(|team| team.id).collect();
    let brackets = bracket_generator::generate(&mut rng, &team_ids)
        .ok_or(ShuffleError::UnsupportedTeamCount(team_count))?;

    Ok(Draft {
        teams,
        brackets,
        captain_mode: mode,
        selected_captains: captains,
    })
}

/// Draft `team_count` teams and their brackets, replacing any previous draft.
pub async fn request_shuffle(
    state: &SharedState,
    id: SessionId,
    team_count: usize,
    mode: CaptainMode,
    selected_captains: Option<Vec<PlayerId>>,
) -> Result<bool, ServiceError> {
    const OPERATION: &str = "shuffle";

    let session = state
        .sessions()
        .snapshot(id)
        .ok_or_else(|| session_not_found(id))?;
    if let Err(err) = session.ensure(SessionEvent::Shuffled) {
        return Ok(reject(id, OPERATION, err));
    }
    let participants: Vec<PlayerId> = session.participants.iter().copied().collect();
    if let Err(err) = check_team_count(participants.len(), team_count) {
        return Ok(reject(id, OPERATION, err));
    }

    let captains = match mode {
        CaptainMode::None => Vec::new(),
        CaptainMode::PerTeamCap(_) | CaptainMode::Unlimited => {
            state.identity().captains_among(&participants).await
        }
    };
    let selected = match captain_preflight(mode, team_count, &captains, selected_captains.as_deref())
    {
        Ok(selected) => selected,
        Err(err) => return Ok(reject(id, OPERATION, err)),
    };
    let draft = match build_draft(&participants, team_count, mode, selected) {
        Ok(draft) => draft,
        Err(err) => return Ok(reject(id, OPERATION, err)),
    };

    let drafted = apply(state, id, OPERATION, |session| {
        // Captain flags were resolved against this roster.
        if !session.participants.iter().eq(participants.iter()) {
            return Err(Rejection::Guard("participants changed during the shuffle".into()));
        }
        session.install_draft(draft).map_err(Rejection::from)
    })
    .await?;

    if drafted.is_some() {
        info!(session_id = %id, teams = team_count, captain_mode = ?mode, "teams drafted");
    }
    Ok(drafted.is_some())
}

/// Lock the draft and start playing.
pub async fn confirm_teams(state: &SharedState, id: SessionId) -> Result<bool, ServiceError> {
    let confirmed = apply(state, id, "confirm_teams", progression::confirm).await?;
    if confirmed.is_some() {
        info!(session_id = %id, "teams confirmed");
    }
    Ok(confirmed.is_some())
}

/// Record the winner of bracket `index`.
pub async fn set_winner(
    state: &SharedState,
    id: SessionId,
    index: usize,
    team: TeamId,
) -> Result<bool, ServiceError> {
    let outcome = apply(state, id, "set_winner", |session| {
        progression::set_winner(session, index, team)
    })
    .await?;

    match outcome {
        Some(true) => {
            info!(session_id = %id, index, champion = team, "session finalized");
            Ok(true)
        }
        Some(false) => {
            debug!(session_id = %id, index, team, "winner recorded");
            Ok(true)
        }
        None => Ok(false),
    }
}

/// Withdraw the winner of bracket `index`.
pub async fn clear_winner(
    state: &SharedState,
    id: SessionId,
    index: usize,
) -> Result<bool, ServiceError> {
    let cascaded = apply(state, id, "clear_winner", |session| {
        progression::clear_winner(session, index)
    })
    .await?;
    if let Some(cascaded) = &cascaded {
        debug!(session_id = %id, index, ?cascaded, "winner cleared");
    }
    Ok(cascaded.is_some())
}

/// Annotate bracket `index` with a room code; blank clears it.
pub async fn set_room_code(
    state: &SharedState,
    id: SessionId,
    index: usize,
    code: Option<String>,
) -> Result<bool, ServiceError> {
    let updated = apply(state, id, "set_room_code", |session| {
        progression::set_room_code(session, index, code.as_deref())
    })
    .await?;
    Ok(updated.is_some())
}

/// Flag `player` as a highlight.
pub async fn add_highlight(
    state: &SharedState,
    id: SessionId,
    player: PlayerId,
) -> Result<bool, ServiceError> {
    let added = apply(state, id, "add_highlight", |session| {
        session.add_highlight(player)
    })
    .await?;
    Ok(added.is_some())
}

/// Remove the highlight flag of `player`.
pub async fn remove_highlight(
    state: &SharedState,
    id: SessionId,
    player: PlayerId,
) -> Result<bool, ServiceError> {
    let removed = apply(state, id, "remove_highlight", |session| {
        session.remove_highlight(player)
    })
    .await?;
    Ok(removed.is_some())
}

/// Set or clear the MVP.
pub async fn set_mvp(
    state: &SharedState,
    id: SessionId,
    player: Option<PlayerId>,
) -> Result<bool, ServiceError> {
    let updated = apply(state, id, "set_mvp", |session| session.set_mvp(player)).await?;
    Ok(updated.is_some())
}

/// Wipe results and return to the draft.
pub async fn revert_to_draft(state: &SharedState, id: SessionId) -> Result<bool, ServiceError> {
    let reverted = apply(state, id, "revert_to_draft", progression::revert_to_draft).await?;
    if reverted.is_some() {
        info!(session_id = %id, "session reverted to draft");
    }
    Ok(reverted.is_some())
}

async fn award_points(state: &SharedState, session: &TrainingSession) -> Result<(), LedgerError> {
    let ledger = state.ledger();
    let category = session.category.as_str();

    if let Some(team) = session.champion.and_then(|id| session.team(id)) {
        ledger.award_win(category, &team.players).await?;
    }
    for &player in &session.highlights {
        ledger.award_highlight(category, player).await?;
    }
    if let Some(mvp) = session.mvp {
        ledger.award_mvp(category, mvp).await?;
    }
    Ok(())
}

/// Award points for a finalized session, post its summary and delete it.
///
/// A ledger failure puts the session back untouched so the close-out can be retried.
pub async fn close_out(state: &SharedState, id: SessionId) -> Result<bool, ServiceError> {
    let closable = |session: &TrainingSession| {
        session.ensure(SessionEvent::ClosedOut).is_ok() && session.champion.is_some()
    };
    let Some(session) = state.sessions().remove_if(id, closable) else {
        if state.sessions().contains(id) {
            return Ok(reject(id, "close_out", "session has no champion"));
        }
        return Err(session_not_found(id));
    };

    if let Err(err) = award_points(state, &session).await {
        warn!(session_id = %id, error = %err, "failed to award points; session kept for retry");
        state.sessions().insert(session);
        return Err(err.into());
    }
    state.refresh().cancel(&id);

    let names = state
        .identity()
        .display_names(session.participants.iter().copied())
        .await;
    let text = render_summary(&session, &names, state.scoring_rules());
    if let Err(err) = state.summary().post_summary(text).await {
        warn!(session_id = %id, error = %err, "failed to post session summary");
    }

    state.sessions().persist().await;
    info!(
        session_id = %id,
        category = %session.category,
        champion = ?session.champion,
        "session closed out"
    );
    Ok(true)
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use futures::future::BoxFuture;
    use tokio::sync::broadcast::error::TryRecvError;

    use super::*;
    use crate::{
        config::{AppConfig, PlayerEntry},
        dao::session_store::MemoryStore,
        services::{
            identity::StaticDirectory,
            scoring::{MemoryLedger, ScoringLedger},
            summary::{SummaryError, SummarySink},
        },
        state::{AppState, Collaborators, state_machine::SessionStatus},
    };

    #[derive(Default)]
    struct RecordingSink {
        texts: Mutex<Vec<String>>,
    }

    impl SummarySink for RecordingSink {
        fn post_summary(&self, text: String) -> BoxFuture<'static, Result<(), SummaryError>> {
            self.texts.lock().unwrap().push(text);
            Box::pin(async { Ok(()) })
        }
    }

    struct FailingLedger;

    impl ScoringLedger for FailingLedger {
        fn award_win(
            &self,
            _category: &str,
            _players: &[PlayerId],
        ) -> BoxFuture<'static, Result<(), LedgerError>> {
            Box::pin(async { Err(LedgerError::Unavailable("ledger offline".into())) })
        }

        fn award_highlight(
            &self,
            _category: &str,
            _player: PlayerId,
        ) -> BoxFuture<'static, Result<(), LedgerError>> {
            Box::pin(async { Ok(()) })
        }

        fn award_mvp(
            &self,
            _category: &str,
            _player: PlayerId,
        ) -> BoxFuture<'static, Result<(), LedgerError>> {
            Box::pin(async { Ok(()) })
        }
    }

    struct Harness {
        state: SharedState,
        store: Arc<MemoryStore>,
        ledger: MemoryLedger,
        sink: Arc<RecordingSink>,
    }

    async fn harness_with(players: Vec<PlayerEntry>, ledger: Option<Arc<dyn ScoringLedger>>) -> Harness {
        let config = AppConfig {
            players,
            ..AppConfig::default()
        };
        let store = Arc::new(MemoryStore::new());
        let memory_ledger = MemoryLedger::new(config.scoring);
        let sink = Arc::new(RecordingSink::default());
        let ledger: Arc<dyn ScoringLedger> = match ledger {
            Some(ledger) => ledger,
            None => Arc::new(memory_ledger.clone()),
        };
        let collaborators = Collaborators {
            identity: Arc::new(StaticDirectory::from_entries(&config.players)),
            ledger,
            summary: Some(sink.clone()),
        };
        let state = AppState::new(config, store.clone(), collaborators)
            .await
            .unwrap();
        Harness {
            state,
            store,
            ledger: memory_ledger,
            sink,
        }
    }

    async fn harness() -> Harness {
        harness_with(Vec::new(), None).await
    }

    fn player(id: PlayerId, captain: bool) -> PlayerEntry {
        PlayerEntry {
            id,
            name: format!("P{id}"),
            captain,
        }
    }

    async fn registered(state: &SharedState, players: impl IntoIterator<Item = PlayerId>) -> SessionId {
        let id = create_session(state, "ranked").await.unwrap();
        for player in players {
            assert!(add_participant(state, id, player).await.unwrap());
        }
        id
    }

    async fn play_out(state: &SharedState, id: SessionId) {
        loop {
            let session = state.sessions().snapshot(id).unwrap();
            if session.status == SessionStatus::Finalized {
                break;
            }
            let index = progression::playable_brackets(&session.brackets)[0];
            let (a, _) =
                progression::contenders(&session.brackets, &session.brackets[index]).unwrap();
            assert!(set_winner(state, id, index, a).await.unwrap());
        }
    }

    #[tokio::test]
    async fn full_lifecycle_awards_points_and_deletes_the_session() {
        let Harness {
            state,
            store,
            ledger,
            sink,
        } = harness().await;
        let id = registered(&state, 1..=8).await;

        assert!(request_shuffle(&state, id, 4, CaptainMode::None, None).await.unwrap());
        assert!(confirm_teams(&state, id).await.unwrap());
        assert!(set_room_code(&state, id, 0, Some("LOBBY-1".into())).await.unwrap());
        play_out(&state, id).await;

        let session = state.sessions().snapshot(id).unwrap();
        let champion = session.team(session.champion.unwrap()).unwrap().clone();
        let outsider = (1..=8).find(|p| !champion.players.contains(p)).unwrap();
        assert!(set_mvp(&state, id, Some(champion.players[0])).await.unwrap());
        assert!(add_highlight(&state, id, outsider).await.unwrap());

        assert!(close_out(&state, id).await.unwrap());
        assert_eq!(ledger.points("ranked", champion.players[0]), 3 + 2);
        assert_eq!(ledger.points("ranked", champion.players[1]), 3);
        assert_eq!(ledger.points("ranked", outsider), 1);
        assert_eq!(sink.texts.lock().unwrap().len(), 1);

        assert!(matches!(
            session_snapshot(&state, id, false).await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(store.saved().is_empty());
    }

    #[tokio::test]
    async fn two_team_final_crowns_its_winner() {
        let Harness {
            state, ledger, sink, ..
        } = harness().await;
        let id = registered(&state, 1..=4).await;

        assert!(request_shuffle(&state, id, 2, CaptainMode::None, None).await.unwrap());
        assert!(confirm_teams(&state, id).await.unwrap());

        let session = state.sessions().snapshot(id).unwrap();
        assert_eq!(session.brackets.len(), 1);
        let (winner, loser) =
            progression::contenders(&session.brackets, &session.brackets[0]).unwrap();
        assert!(set_winner(&state, id, 0, winner).await.unwrap());

        let session = state.sessions().snapshot(id).unwrap();
        assert_eq!(session.champion, Some(winner));
        assert_eq!(session.status, SessionStatus::Finalized);
        let winners = session.team(winner).unwrap().players.clone();
        let losers = session.team(loser).unwrap().players.clone();
        assert_eq!(winners.len(), 2);

        assert!(close_out(&state, id).await.unwrap());
        let bonus = u64::from(state.scoring_rules().win);
        for player in winners {
            assert_eq!(ledger.points("ranked", player), bonus);
        }
        for player in losers {
            assert_eq!(ledger.points("ranked", player), 0);
        }
        assert_eq!(sink.texts.lock().unwrap().len(), 1);
        assert!(matches!(
            session_snapshot(&state, id, false).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn guards_reject_without_erroring() {
        let Harness { state, .. } = harness().await;
        let id = registered(&state, 1..=3).await;

        assert!(!add_participant(&state, id, 2).await.unwrap());
        assert!(!request_shuffle(&state, id, 2, CaptainMode::None, None).await.unwrap());
        assert!(!confirm_teams(&state, id).await.unwrap());
        assert!(!set_winner(&state, id, 0, 1).await.unwrap());
        assert!(!set_mvp(&state, id, Some(1)).await.unwrap());
        assert!(!close_out(&state, id).await.unwrap());
        assert!(!revert_to_draft(&state, id).await.unwrap());

        assert!(add_participant(&state, id, 4).await.unwrap());
        assert!(!request_shuffle(&state, id, 3, CaptainMode::None, None).await.unwrap());
        assert!(!request_shuffle(&state, id, 1, CaptainMode::None, None).await.unwrap());
        assert!(request_shuffle(&state, id, 2, CaptainMode::None, None).await.unwrap());
        assert!(!add_participant(&state, id, 5).await.unwrap());
        assert!(!set_winner(&state, id, 0, 1).await.unwrap());
        assert!(request_shuffle(&state, id, 2, CaptainMode::None, None).await.unwrap());

        assert!(confirm_teams(&state, id).await.unwrap());
        assert!(!confirm_teams(&state, id).await.unwrap());
        assert!(!request_shuffle(&state, id, 2, CaptainMode::None, None).await.unwrap());
        assert!(!clear_winner(&state, id, 0).await.unwrap());
        assert!(!close_out(&state, id).await.unwrap());
    }

    #[tokio::test]
    async fn unknown_sessions_and_brackets_are_not_found() {
        let Harness { state, .. } = harness().await;
        let missing = SessionId::new_v4();
        assert!(matches!(
            add_participant(&state, missing, 1).await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            close_out(&state, missing).await,
            Err(ServiceError::NotFound(_))
        ));

        let id = registered(&state, 1..=4).await;
        assert!(request_shuffle(&state, id, 2, CaptainMode::None, None).await.unwrap());
        assert!(matches!(
            set_room_code(&state, id, 7, Some("X".into())).await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(confirm_teams(&state, id).await.unwrap());
        assert!(matches!(
            set_winner(&state, id, 1, 1).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn blank_categories_are_invalid() {
        let Harness { state, .. } = harness().await;
        assert!(matches!(
            create_session(&state, "  ").await,
            Err(ServiceError::InvalidInput(_))
        ));
    }

    #[test]
    fn preflight_uses_every_captain_that_fits() {
        assert_eq!(
            captain_preflight(CaptainMode::None, 2, &[1, 2, 3], None),
            Ok(vec![])
        );
        assert_eq!(
            captain_preflight(CaptainMode::Unlimited, 2, &[1, 2, 3], None),
            Ok(vec![1, 2, 3])
        );
        assert_eq!(
            captain_preflight(CaptainMode::PerTeamCap(1), 4, &[1, 2, 3], Some(&[9])),
            Ok(vec![1, 2, 3])
        );
    }

    #[test]
    fn preflight_requires_an_exact_valid_selection_when_oversubscribed() {
        let captains = [1, 2, 3, 4, 5];
        let mode = CaptainMode::PerTeamCap(1);

        assert_eq!(
            captain_preflight(mode, 2, &captains, None),
            Err(ShuffleError::CaptainSelectionRequired {
                required: 2,
                available: 5
            })
        );
        assert!(captain_preflight(mode, 2, &captains, Some(&[1])).is_err());
        assert!(captain_preflight(mode, 2, &captains, Some(&[1, 1])).is_err());
        assert!(captain_preflight(mode, 2, &captains, Some(&[1, 9])).is_err());
        assert_eq!(
            captain_preflight(mode, 2, &captains, Some(&[4, 2])),
            Ok(vec![4, 2])
        );
    }

    #[tokio::test]
    async fn oversubscribed_captains_need_a_selection() {
        let players = (1..=8).map(|id| player(id, id <= 6)).collect();
        let Harness { state, .. } = harness_with(players, None).await;
        let id = registered(&state, 1..=8).await;
        let mode = CaptainMode::PerTeamCap(1);

        assert!(!request_shuffle(&state, id, 2, mode, None).await.unwrap());
        assert!(request_shuffle(&state, id, 2, mode, Some(vec![5, 2])).await.unwrap());

        let session = state.sessions().snapshot(id).unwrap();
        assert_eq!(session.selected_captains, vec![5, 2]);
        for team in &session.teams {
            let held = team.players.iter().filter(|p| [5, 2].contains(*p)).count();
            assert_eq!(held, 1);
        }
    }

    #[tokio::test]
    async fn ledger_failure_keeps_the_session_for_retry() {
        let Harness { state, sink, .. } = harness_with(Vec::new(), Some(Arc::new(FailingLedger))).await;
        let id = registered(&state, 1..=4).await;
        assert!(request_shuffle(&state, id, 2, CaptainMode::None, None).await.unwrap());
        assert!(confirm_teams(&state, id).await.unwrap());
        play_out(&state, id).await;

        assert!(matches!(
            close_out(&state, id).await,
            Err(ServiceError::Unavailable(_))
        ));
        let session = state.sessions().snapshot(id).unwrap();
        assert_eq!(session.status, SessionStatus::Finalized);
        assert!(session.champion.is_some());
        assert!(sink.texts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn revert_and_clear_reopen_play() {
        let Harness { state, .. } = harness().await;
        let id = registered(&state, 1..=8).await;
        assert!(request_shuffle(&state, id, 4, CaptainMode::None, None).await.unwrap());
        assert!(confirm_teams(&state, id).await.unwrap());
        play_out(&state, id).await;

        assert!(clear_winner(&state, id, 2).await.unwrap());
        let session = state.sessions().snapshot(id).unwrap();
        assert_eq!(session.status, SessionStatus::InProgress);
        assert_eq!(session.current_phase.as_deref(), Some("Final"));

        let teams = session.teams.clone();
        assert!(revert_to_draft(&state, id).await.unwrap());
        let session = state.sessions().snapshot(id).unwrap();
        assert_eq!(session.status, SessionStatus::Drafted);
        assert_eq!(session.teams, teams);
        assert!(session.brackets.iter().all(|b| b.winner.is_none()));
    }

    #[tokio::test]
    async fn fresh_snapshot_flushes_the_pending_refresh() {
        let Harness { state, .. } = harness().await;
        let mut events = state.public_sse().subscribe();
        let id = registered(&state, [1, 2]).await;

        let view = session_snapshot(&state, id, true).await.unwrap();
        assert_eq!(view.participants.len(), 2);

        let event = events.try_recv().unwrap();
        assert_eq!(event.event.as_deref(), Some(sse_events::EVENT_SESSION_UPDATED));
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
        assert!(!state.refresh().is_pending(&id));
    }

    #[tokio::test(start_paused = true)]
    async fn bursts_collapse_into_one_refresh() {
        let Harness { state, store, .. } = harness().await;
        let mut events = state.public_sse().subscribe();
        let id = registered(&state, 1..=6).await;
        assert!(store.save_count() >= 7);

        tokio::time::sleep(Duration::from_millis(400)).await;
        let event = events.try_recv().unwrap();
        let view: serde_json::Value = serde_json::from_str(&event.data).unwrap();
        assert_eq!(view["id"], id.to_string());
        assert_eq!(view["participants"].as_array().unwrap().len(), 6);
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
    }
}

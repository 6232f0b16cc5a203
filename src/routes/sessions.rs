use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post, put},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::session::{
        CreateSessionRequest, CreateSessionResponse, MvpRequest, ParticipantRequest,
        RoomCodeRequest, SessionListItem, SessionView, ShuffleRequest, SnapshotQuery,
        WinnerRequest,
    },
    error::AppError,
    services::session_service,
    state::{SharedState, session::PlayerId},
};

/// Session lifecycle endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/sessions", get(list_sessions).post(create_session))
        .route("/sessions/{id}", get(get_session))
        .route("/sessions/{id}/participants", post(add_participant))
        .route(
            "/sessions/{id}/participants/{player}",
            delete(remove_participant),
        )
        .route("/sessions/{id}/shuffle", post(shuffle))
        .route("/sessions/{id}/confirm", post(confirm))
        .route(
            "/sessions/{id}/brackets/{index}/winner",
            put(set_winner).delete(clear_winner),
        )
        .route("/sessions/{id}/brackets/{index}/room", put(set_room_code))
        .route(
            "/sessions/{id}/highlights/{player}",
            post(add_highlight).delete(remove_highlight),
        )
        .route("/sessions/{id}/mvp", put(set_mvp))
        .route("/sessions/{id}/close", post(close_out))
        .route("/sessions/{id}/revert", post(revert))
}

/// Turn an accepted/rejected outcome into the refreshed session or a conflict.
async fn respond(
    state: &SharedState,
    id: Uuid,
    operation: &str,
    accepted: bool,
) -> Result<Json<SessionView>, AppError> {
    if !accepted {
        return Err(AppError::rejected(operation));
    }
    Ok(Json(session_service::session_snapshot(state, id, false).await?))
}

/// Open a new session in registration.
pub async fn create_session(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<CreateSessionRequest>>,
) -> Result<(StatusCode, Json<CreateSessionResponse>), AppError> {
    let id = session_service::create_session(&state, &payload.category).await?;
    Ok((StatusCode::CREATED, Json(CreateSessionResponse { id })))
}

/// List live sessions.
pub async fn list_sessions(State(state): State<SharedState>) -> Json<Vec<SessionListItem>> {
    Json(session_service::list_sessions(&state).await)
}

/// Read one session, optionally flushing its pending refresh first.
pub async fn get_session(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Query(query): Query<SnapshotQuery>,
) -> Result<Json<SessionView>, AppError> {
    Ok(Json(
        session_service::session_snapshot(&state, id, query.fresh).await?,
    ))
}

/// Register a player.
pub async fn add_participant(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<ParticipantRequest>>,
) -> Result<Json<SessionView>, AppError> {
    let accepted = session_service::add_participant(&state, id, payload.player_id).await?;
    respond(&state, id, "adding a participant", accepted).await
}

/// Withdraw a player.
pub async fn remove_participant(
    State(state): State<SharedState>,
    Path((id, player)): Path<(Uuid, PlayerId)>,
) -> Result<Json<SessionView>, AppError> {
    let accepted = session_service::remove_participant(&state, id, player).await?;
    respond(&state, id, "removing a participant", accepted).await
}

/// Draft teams and brackets.
pub async fn shuffle(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<ShuffleRequest>>,
) -> Result<Json<SessionView>, AppError> {
    let accepted = session_service::request_shuffle(
        &state,
        id,
        payload.team_count,
        payload.captain_mode,
        payload.selected_captains,
    )
    .await?;
    respond(&state, id, "shuffling", accepted).await
}

/// Lock the drafted teams.
pub async fn confirm(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, AppError> {
    let accepted = session_service::confirm_teams(&state, id).await?;
    respond(&state, id, "confirming teams", accepted).await
}

/// Record the winner of a bracket.
pub async fn set_winner(
    State(state): State<SharedState>,
    Path((id, index)): Path<(Uuid, usize)>,
    Valid(Json(payload)): Valid<Json<WinnerRequest>>,
) -> Result<Json<SessionView>, AppError> {
    let accepted = session_service::set_winner(&state, id, index, payload.team_id).await?;
    respond(&state, id, "recording this winner", accepted).await
}

/// Withdraw the winner of a bracket.
pub async fn clear_winner(
    State(state): State<SharedState>,
    Path((id, index)): Path<(Uuid, usize)>,
) -> Result<Json<SessionView>, AppError> {
    let accepted = session_service::clear_winner(&state, id, index).await?;
    respond(&state, id, "clearing this winner", accepted).await
}

/// Set or clear the room code of a bracket.
pub async fn set_room_code(
    State(state): State<SharedState>,
    Path((id, index)): Path<(Uuid, usize)>,
    Valid(Json(payload)): Valid<Json<RoomCodeRequest>>,
) -> Result<Json<SessionView>, AppError> {
    let accepted = session_service::set_room_code(&state, id, index, payload.code).await?;
    respond(&state, id, "setting a room code", accepted).await
}

/// Flag a player as a highlight.
pub async fn add_highlight(
    State(state): State<SharedState>,
    Path((id, player)): Path<(Uuid, PlayerId)>,
) -> Result<Json<SessionView>, AppError> {
    let accepted = session_service::add_highlight(&state, id, player).await?;
    respond(&state, id, "highlighting this player", accepted).await
}

/// Remove a highlight flag.
pub async fn remove_highlight(
    State(state): State<SharedState>,
    Path((id, player)): Path<(Uuid, PlayerId)>,
) -> Result<Json<SessionView>, AppError> {
    let accepted = session_service::remove_highlight(&state, id, player).await?;
    respond(&state, id, "removing this highlight", accepted).await
}

/// Set or clear the MVP.
pub async fn set_mvp(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<MvpRequest>>,
) -> Result<Json<SessionView>, AppError> {
    let accepted = session_service::set_mvp(&state, id, payload.player_id).await?;
    respond(&state, id, "setting the MVP", accepted).await
}

/// Award points, post the summary and delete the session.
pub async fn close_out(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if !session_service::close_out(&state, id).await? {
        return Err(AppError::rejected("closing out"));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Wipe results and return to the draft.
pub async fn revert(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, AppError> {
    let accepted = session_service::revert_to_draft(&state, id).await?;
    respond(&state, id, "reverting to the draft", accepted).await
}

//! Request and response payloads of the session REST API.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::{
        format_system_time,
        validation::{validate_captain_mode, validate_not_blank},
    },
    services::{identity::placeholder_name, progression},
    state::{
        session::{CaptainMode, PlayerId, Slot, TeamId, TrainingSession},
        state_machine::SessionStatus,
    },
};

/// Payload opening a new session.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateSessionRequest {
    /// Scoring pool the session reports to.
    #[validate(length(min = 1, max = 64), custom(function = "validate_not_blank"))]
    pub category: String,
}

/// Identifier of a freshly created session.
#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub id: Uuid,
}

/// Player joining a session.
#[derive(Debug, Deserialize, Validate)]
pub struct ParticipantRequest {
    pub player_id: PlayerId,
}

/// Team formation parameters.
#[derive(Debug, Deserialize, Validate)]
pub struct ShuffleRequest {
    #[validate(range(min = 2, max = 10))]
    pub team_count: usize,
    #[serde(default)]
    #[validate(custom(function = "validate_captain_mode"))]
    pub captain_mode: CaptainMode,
    /// Explicit captain pick, required when more captains signed up than the cap allows.
    #[serde(default)]
    pub selected_captains: Option<Vec<PlayerId>>,
}

/// Winner of a bracket.
#[derive(Debug, Deserialize, Validate)]
pub struct WinnerRequest {
    pub team_id: TeamId,
}

/// Room code annotation; blank or missing clears it.
#[derive(Debug, Deserialize, Validate)]
pub struct RoomCodeRequest {
    #[serde(default)]
    #[validate(length(max = 32))]
    pub code: Option<String>,
}

/// MVP selection; `null` clears it.
#[derive(Debug, Deserialize, Validate)]
pub struct MvpRequest {
    #[serde(default)]
    pub player_id: Option<PlayerId>,
}

/// Query of the snapshot endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct SnapshotQuery {
    /// Flush any pending refresh before reading.
    #[serde(default)]
    pub fresh: bool,
}

/// Player with its resolved display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayerView {
    pub id: PlayerId,
    pub name: String,
}

/// Drafted team.
#[derive(Debug, Clone, Serialize)]
pub struct TeamView {
    pub id: TeamId,
    pub name: String,
    pub players: Vec<PlayerView>,
}

/// One side of a bracket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SlotView {
    /// Team placed directly by the draft.
    Seed {
        /// Seeded team.
        team: TeamId,
    },
    /// Winner of an earlier bracket.
    WinnerOf {
        /// Feeding bracket index.
        bracket: usize,
        /// Team that advanced, once known.
        team: Option<TeamId>,
    },
}

/// One match of the elimination tree.
#[derive(Debug, Clone, Serialize)]
pub struct BracketView {
    pub index: usize,
    pub phase: String,
    pub slot_a: SlotView,
    pub slot_b: SlotView,
    pub winner: Option<TeamId>,
    pub room_code: Option<String>,
    /// Whether a winner can be recorded right now.
    pub playable: bool,
}

/// Full projection of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub id: Uuid,
    pub category: String,
    pub status: SessionStatus,
    pub created_at: String,
    pub participants: Vec<PlayerView>,
    pub teams: Vec<TeamView>,
    pub brackets: Vec<BracketView>,
    pub current_phase: Option<String>,
    pub champion: Option<TeamId>,
    pub mvp: Option<PlayerView>,
    pub highlights: Vec<PlayerView>,
    pub captain_mode: CaptainMode,
    pub selected_captains: Vec<PlayerId>,
}

impl SessionView {
    /// Project `session`, naming players from `names`.
    pub fn build(session: &TrainingSession, names: &HashMap<PlayerId, String>) -> Self {
        let player = |id: PlayerId| PlayerView {
            id,
            name: names
                .get(&id)
                .cloned()
                .unwrap_or_else(|| placeholder_name(id)),
        };
        let slot = |slot: Slot| match slot {
            Slot::Seed(team) => SlotView::Seed { team },
            Slot::WinnerOf(bracket) => SlotView::WinnerOf {
                bracket,
                team: progression::slot_team(&session.brackets, slot),
            },
        };
        let playable = progression::playable_brackets(&session.brackets);
        let accepting_winners = session.status == SessionStatus::InProgress;

        Self {
            id: session.id,
            category: session.category.clone(),
            status: session.status,
            created_at: format_system_time(session.created_at),
            participants: session.participants.iter().map(|&id| player(id)).collect(),
            teams: session
                .teams
                .iter()
                .map(|team| TeamView {
                    id: team.id,
                    name: team.name.clone(),
                    players: team.players.iter().map(|&id| player(id)).collect(),
                })
                .collect(),
            brackets: session
                .brackets
                .iter()
                .enumerate()
                .map(|(index, bracket)| BracketView {
                    index,
                    phase: bracket.phase.clone(),
                    slot_a: slot(bracket.slot_a),
                    slot_b: slot(bracket.slot_b),
                    winner: bracket.winner,
                    room_code: bracket.room_code.clone(),
                    playable: accepting_winners && playable.contains(&index),
                })
                .collect(),
            current_phase: session.current_phase.clone(),
            champion: session.champion,
            mvp: session.mvp.map(player),
            highlights: session.highlights.iter().map(|&id| player(id)).collect(),
            captain_mode: session.captain_mode,
            selected_captains: session.selected_captains.clone(),
        }
    }
}

/// Compact listing entry.
#[derive(Debug, Clone, Serialize)]
pub struct SessionListItem {
    pub id: Uuid,
    pub category: String,
    pub status: SessionStatus,
    pub participant_count: usize,
    pub current_phase: Option<String>,
    pub created_at: String,
}

impl From<&TrainingSession> for SessionListItem {
    fn from(session: &TrainingSession) -> Self {
        Self {
            id: session.id,
            category: session.category.clone(),
            status: session.status,
            participant_count: session.participants.len(),
            current_phase: session.current_phase.clone(),
            created_at: format_system_time(session.created_at),
        }
    }
}

use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

/// Lifecycle status as persisted by the storage layer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatusEntity {
    /// Accepting participants.
    Registration,
    /// Teams drawn, awaiting confirmation.
    Drafted,
    /// Matches being played.
    InProgress,
    /// Champion decided.
    Finalized,
}

/// Captain distribution settings chosen for the last shuffle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CaptainModeEntity {
    /// Captains were not considered.
    #[default]
    None,
    /// At most `limit` captains per team.
    PerTeamCap {
        /// Captains allowed per team.
        limit: u32,
    },
    /// Captains spread without a cap.
    Unlimited,
}

/// Representation of a drafted team stored in persistence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TeamEntity {
    /// Team number, starting at 1.
    pub id: u32,
    /// Display name of the team.
    pub name: String,
    /// Player ids in draft order.
    pub players: Vec<u64>,
}

/// Representation of a bracket stored in persistence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BracketEntity {
    /// Positive team id, or `-(i + 1)` for the winner of bracket `i`.
    pub slot_a: i64,
    /// Same encoding as `slot_a`.
    pub slot_b: i64,
    #[serde(default)]
    pub winner: Option<u32>,
    pub phase: String,
    #[serde(default)]
    pub room_code: Option<String>,
}

/// Aggregate session record persisted by the storage layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionEntity {
    /// Primary key of the session.
    pub id: Uuid,
    /// Scoring pool / channel tag.
    pub category: String,
    /// Creation timestamp, used for garbage collection.
    pub created_at: SystemTime,
    pub status: SessionStatusEntity,
    /// Registered players in join order.
    pub participants: Vec<u64>,
    #[serde(default)]
    pub teams: Vec<TeamEntity>,
    #[serde(default)]
    pub brackets: Vec<BracketEntity>,
    #[serde(default)]
    pub champion: Option<u32>,
    #[serde(default)]
    pub mvp: Option<u64>,
    #[serde(default)]
    pub highlights: Vec<u64>,
    #[serde(default)]
    pub captain_mode: CaptainModeEntity,
    #[serde(default)]
    pub selected_captains: Vec<u64>,
}

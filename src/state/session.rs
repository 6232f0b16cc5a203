use std::time::{Duration, SystemTime};

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::{
    dao::models::{
        BracketEntity, CaptainModeEntity, SessionEntity, SessionStatusEntity, TeamEntity,
    },
    state::state_machine::{InvalidTransition, SessionEvent, SessionStatus},
};

/// Opaque identifier of a training session.
pub type SessionId = Uuid;
/// Identifier of a registered player, as handed out by the chat platform.
pub type PlayerId = u64;
/// Identifier of a drafted team, `1..=k` within a session.
pub type TeamId = u32;

/// How captains are distributed while shuffling teams.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "limit", rename_all = "snake_case")]
pub enum CaptainMode {
    /// Captains are not treated specially.
    #[default]
    None,
    /// No team may receive more than the given number of captains.
    PerTeamCap(u32),
    /// Every participating captain is spread round-robin without a cap.
    Unlimited,
}

impl CaptainMode {
    /// Number of captains a draft with `team_count` teams can absorb (0 when uncapped).
    pub fn required_captains(self, team_count: usize) -> usize {
        match self {
            CaptainMode::PerTeamCap(limit) => team_count * limit as usize,
            CaptainMode::None | CaptainMode::Unlimited => 0,
        }
    }
}

/// One side of a bracket: either a seeded team or the winner of an earlier bracket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// Concrete team placed at generation time.
    Seed(TeamId),
    /// Winner of the bracket at the given index.
    WinnerOf(usize),
}

impl Slot {
    /// Encode the slot the way it is persisted: positive team id or `-(index + 1)`.
    pub fn encode(self) -> i64 {
        match self {
            Slot::Seed(team) => i64::from(team),
            Slot::WinnerOf(index) => -(index as i64 + 1),
        }
    }

    /// Decode a persisted slot value, rejecting `0` and out-of-range team ids.
    pub fn decode(raw: i64) -> Option<Self> {
        match raw {
            0 => None,
            raw if raw > 0 => TeamId::try_from(raw).ok().map(Slot::Seed),
            raw => raw
                .checked_neg()
                .and_then(|index| usize::try_from(index - 1).ok())
                .map(Slot::WinnerOf),
        }
    }
}

/// A single match of the elimination tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchBracket {
    /// First contender.
    pub slot_a: Slot,
    /// Second contender.
    pub slot_b: Slot,
    /// Team that won this match, once recorded.
    pub winner: Option<TeamId>,
    /// Round label, e.g. `Quarterfinal 2`.
    pub phase: String,
    /// Free-form lobby/room code players use to meet in game.
    pub room_code: Option<String>,
}

impl MatchBracket {
    /// Build an undecided bracket.
    pub fn new(slot_a: Slot, slot_b: Slot, phase: impl Into<String>) -> Self {
        Self {
            slot_a,
            slot_b,
            winner: None,
            phase: phase.into(),
            room_code: None,
        }
    }

    /// Whether either slot points at the winner of bracket `index`.
    pub fn depends_on(&self, index: usize) -> bool {
        [self.slot_a, self.slot_b]
            .iter()
            .any(|slot| *slot == Slot::WinnerOf(index))
    }
}

/// A drafted team.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Team {
    /// Team number, starting at 1.
    pub id: TeamId,
    /// Display name.
    pub name: String,
    /// Members in draft order.
    pub players: Vec<PlayerId>,
}

impl Team {
    /// Build a team with the default `Team N` name.
    pub fn numbered(id: TeamId, players: Vec<PlayerId>) -> Self {
        Self {
            id,
            name: format!("Team {id}"),
            players,
        }
    }
}

/// Result of a shuffle, installed atomically into a session.
#[derive(Debug, Clone)]
pub struct Draft {
    /// Teams in draft order.
    pub teams: Vec<Team>,
    /// Opening brackets for the team count.
    pub brackets: Vec<MatchBracket>,
    /// How captains were picked for this draft.
    pub captain_mode: CaptainMode,
    /// Captains that seeded the teams, if any.
    pub selected_captains: Vec<PlayerId>,
}

/// Guard failures raised by session-level mutations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The operation is not allowed in the current status.
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
    /// The bracket index does not exist.
    #[error("bracket {0} does not exist")]
    UnknownBracket(usize),
    /// The player is already part of the collection.
    #[error("player {0} is already listed")]
    AlreadyListed(PlayerId),
    /// The player is not part of the collection.
    #[error("player {0} is not listed")]
    NotListed(PlayerId),
}

/// Aggregate root for one tournament instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainingSession {
    /// Unique identifier.
    pub id: SessionId,
    /// Scoring pool / channel this session reports to.
    pub category: String,
    /// Creation time, used by the cleanup sweep.
    pub created_at: SystemTime,
    /// Lifecycle status.
    pub status: SessionStatus,
    /// Registered players in join order.
    pub participants: IndexSet<PlayerId>,
    /// Teams of the confirmed or pending draft.
    pub teams: Vec<Team>,
    /// Bracket table for the team count.
    pub brackets: Vec<MatchBracket>,
    /// Base name of the round currently being played.
    pub current_phase: Option<String>,
    /// Winner of the final, once decided.
    pub champion: Option<TeamId>,
    /// Most valuable player, if one was picked.
    pub mvp: Option<PlayerId>,
    /// Players credited with a highlight.
    pub highlights: IndexSet<PlayerId>,
    /// How captains were picked for the current draft.
    pub captain_mode: CaptainMode,
    /// Captains that seeded the current draft.
    pub selected_captains: Vec<PlayerId>,
}

impl TrainingSession {
    /// Create an empty session in registration.
    pub fn new(category: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            category: category.into(),
            created_at: SystemTime::now(),
            status: SessionStatus::Registration,
            participants: IndexSet::new(),
            teams: Vec::new(),
            brackets: Vec::new(),
            current_phase: None,
            champion: None,
            mvp: None,
            highlights: IndexSet::new(),
            captain_mode: CaptainMode::None,
            selected_captains: Vec::new(),
        }
    }

    /// Apply a lifecycle event, updating the status when the transition is valid.
    pub fn advance(&mut self, event: SessionEvent) -> Result<SessionStatus, InvalidTransition> {
        let next = self.status.next(event)?;
        self.status = next;
        Ok(next)
    }

    /// Check that `event` is allowed without changing anything.
    pub fn ensure(&self, event: SessionEvent) -> Result<SessionStatus, InvalidTransition> {
        self.status.next(event)
    }

    /// Register a participant while registration is open.
    pub fn add_participant(&mut self, player: PlayerId) -> Result<(), SessionError> {
        self.ensure(SessionEvent::RosterChanged)?;
        if !self.participants.insert(player) {
            return Err(SessionError::AlreadyListed(player));
        }
        Ok(())
    }

    /// Withdraw a participant while registration is open.
    pub fn remove_participant(&mut self, player: PlayerId) -> Result<(), SessionError> {
        self.ensure(SessionEvent::RosterChanged)?;
        if !self.participants.shift_remove(&player) {
            return Err(SessionError::NotListed(player));
        }
        Ok(())
    }

    /// Replace teams and brackets with a fresh draft.
    ///
    /// Results of any previous draft (champion, MVP, highlights) are discarded.
    pub fn install_draft(&mut self, draft: Draft) -> Result<(), SessionError> {
        let next = self.ensure(SessionEvent::Shuffled)?;
        self.teams = draft.teams;
        self.brackets = draft.brackets;
        self.current_phase =
            crate::services::progression::active_phase(&self.brackets).map(str::to_owned);
        self.captain_mode = draft.captain_mode;
        self.selected_captains = draft.selected_captains;
        self.champion = None;
        self.mvp = None;
        self.highlights.clear();
        self.status = next;
        Ok(())
    }

    /// Flag a participant as a highlight of the tournament.
    pub fn add_highlight(&mut self, player: PlayerId) -> Result<(), SessionError> {
        self.ensure(SessionEvent::Awarded)?;
        if !self.participants.contains(&player) {
            return Err(SessionError::NotListed(player));
        }
        if !self.highlights.insert(player) {
            return Err(SessionError::AlreadyListed(player));
        }
        Ok(())
    }

    /// Remove a highlight flag.
    pub fn remove_highlight(&mut self, player: PlayerId) -> Result<(), SessionError> {
        self.ensure(SessionEvent::Awarded)?;
        if !self.highlights.shift_remove(&player) {
            return Err(SessionError::NotListed(player));
        }
        Ok(())
    }

    /// Set or clear the MVP.
    pub fn set_mvp(&mut self, player: Option<PlayerId>) -> Result<(), SessionError> {
        self.ensure(SessionEvent::Awarded)?;
        if let Some(player) = player {
            if !self.participants.contains(&player) {
                return Err(SessionError::NotListed(player));
            }
        }
        self.mvp = player;
        Ok(())
    }

    /// Borrow a bracket by index.
    pub fn bracket(&self, index: usize) -> Result<&MatchBracket, SessionError> {
        self.brackets
            .get(index)
            .ok_or(SessionError::UnknownBracket(index))
    }

    /// Mutably borrow a bracket by index.
    pub fn bracket_mut(&mut self, index: usize) -> Result<&mut MatchBracket, SessionError> {
        self.brackets
            .get_mut(index)
            .ok_or(SessionError::UnknownBracket(index))
    }

    /// Look up a team by id.
    pub fn team(&self, id: TeamId) -> Option<&Team> {
        self.teams.iter().find(|team| team.id == id)
    }

    /// Time elapsed since creation; zero when the clock went backwards.
    pub fn age(&self, now: SystemTime) -> Duration {
        now.duration_since(self.created_at).unwrap_or_default()
    }
}

/// Error raised when a persisted record cannot be turned back into a session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RestoreError {
    /// A slot value is neither a team nor a bracket reference.
    #[error("bracket {index} holds an invalid slot value {raw}")]
    InvalidSlot {
        /// Offending bracket.
        index: usize,
        /// Stored slot value.
        raw: i64,
    },
    /// A slot points at a bracket that is not earlier in the table.
    #[error("bracket {index} references bracket {target} which does not precede it")]
    ForwardReference {
        /// Offending bracket.
        index: usize,
        /// Referenced bracket.
        target: usize,
    },
}

impl From<SessionStatusEntity> for SessionStatus {
    fn from(value: SessionStatusEntity) -> Self {
        match value {
            SessionStatusEntity::Registration => SessionStatus::Registration,
            SessionStatusEntity::Drafted => SessionStatus::Drafted,
            SessionStatusEntity::InProgress => SessionStatus::InProgress,
            SessionStatusEntity::Finalized => SessionStatus::Finalized,
        }
    }
}

impl From<SessionStatus> for SessionStatusEntity {
    fn from(value: SessionStatus) -> Self {
        match value {
            SessionStatus::Registration => SessionStatusEntity::Registration,
            SessionStatus::Drafted => SessionStatusEntity::Drafted,
            SessionStatus::InProgress => SessionStatusEntity::InProgress,
            SessionStatus::Finalized => SessionStatusEntity::Finalized,
        }
    }
}

impl From<CaptainModeEntity> for CaptainMode {
    fn from(value: CaptainModeEntity) -> Self {
        match value {
            CaptainModeEntity::None => CaptainMode::None,
            CaptainModeEntity::PerTeamCap { limit } => CaptainMode::PerTeamCap(limit),
            CaptainModeEntity::Unlimited => CaptainMode::Unlimited,
        }
    }
}

impl From<CaptainMode> for CaptainModeEntity {
    fn from(value: CaptainMode) -> Self {
        match value {
            CaptainMode::None => CaptainModeEntity::None,
            CaptainMode::PerTeamCap(limit) => CaptainModeEntity::PerTeamCap { limit },
            CaptainMode::Unlimited => CaptainModeEntity::Unlimited,
        }
    }
}

impl From<TeamEntity> for Team {
    fn from(value: TeamEntity) -> Self {
        Self {
            id: value.id,
            name: value.name,
            players: value.players,
        }
    }
}

impl From<Team> for TeamEntity {
    fn from(value: Team) -> Self {
        Self {
            id: value.id,
            name: value.name,
            players: value.players,
        }
    }
}

impl From<MatchBracket> for BracketEntity {
    fn from(value: MatchBracket) -> Self {
        Self {
            slot_a: value.slot_a.encode(),
            slot_b: value.slot_b.encode(),
            winner: value.winner,
            phase: value.phase,
            room_code: value.room_code,
        }
    }
}

fn restore_slot(index: usize, raw: i64) -> Result<Slot, RestoreError> {
    match Slot::decode(raw) {
        Some(Slot::WinnerOf(target)) if target >= index => {
            Err(RestoreError::ForwardReference { index, target })
        }
        Some(slot) => Ok(slot),
        None => Err(RestoreError::InvalidSlot { index, raw }),
    }
}

impl TryFrom<SessionEntity> for TrainingSession {
    type Error = RestoreError;

    fn try_from(value: SessionEntity) -> Result<Self, Self::Error> {
        let brackets = value
            .brackets
            .into_iter()
            .enumerate()
            .map(|(index, bracket)| {
                Ok(MatchBracket {
                    slot_a: restore_slot(index, bracket.slot_a)?,
                    slot_b: restore_slot(index, bracket.slot_b)?,
                    winner: bracket.winner,
                    phase: bracket.phase,
                    room_code: bracket.room_code,
                })
            })
            .collect::<Result<Vec<_>, RestoreError>>()?;

        let mut session = Self {
            id: value.id,
            category: value.category,
            created_at: value.created_at,
            status: value.status.into(),
            participants: value.participants.into_iter().collect(),
            teams: value.teams.into_iter().map(Into::into).collect(),
            brackets,
            current_phase: None,
            champion: value.champion,
            mvp: value.mvp,
            highlights: value.highlights.into_iter().collect(),
            captain_mode: value.captain_mode.into(),
            selected_captains: value.selected_captains,
        };
        session.current_phase =
            crate::services::progression::active_phase(&session.brackets).map(str::to_owned);
        Ok(session)
    }
}

impl From<TrainingSession> for SessionEntity {
    fn from(value: TrainingSession) -> Self {
        Self {
            id: value.id,
            category: value.category,
            created_at: value.created_at,
            status: value.status.into(),
            participants: value.participants.into_iter().collect(),
            teams: value.teams.into_iter().map(Into::into).collect(),
            brackets: value.brackets.into_iter().map(Into::into).collect(),
            champion: value.champion,
            mvp: value.mvp,
            highlights: value.highlights.into_iter().collect(),
            captain_mode: value.captain_mode.into(),
            selected_captains: value.selected_captains,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_encoding_uses_negative_back_references() {
        assert_eq!(Slot::Seed(3).encode(), 3);
        assert_eq!(Slot::WinnerOf(0).encode(), -1);
        assert_eq!(Slot::WinnerOf(4).encode(), -5);
        assert_eq!(Slot::decode(-1), Some(Slot::WinnerOf(0)));
        assert_eq!(Slot::decode(7), Some(Slot::Seed(7)));
        assert_eq!(Slot::decode(0), None);
    }

    #[test]
    fn participants_stay_unique() {
        let mut session = TrainingSession::new("ranked");
        for player in [1, 2, 2, 3, 1] {
            let _ = session.add_participant(player);
        }
        assert_eq!(session.participants.len(), 3);
        assert_eq!(
            session.add_participant(2),
            Err(SessionError::AlreadyListed(2))
        );

        session.remove_participant(2).unwrap();
        assert_eq!(session.remove_participant(2), Err(SessionError::NotListed(2)));
        assert_eq!(session.participants.iter().copied().collect::<Vec<_>>(), [1, 3]);
    }

    #[test]
    fn roster_is_locked_outside_registration() {
        let mut session = TrainingSession::new("ranked");
        session.add_participant(1).unwrap();
        session.status = SessionStatus::Drafted;
        assert!(matches!(
            session.add_participant(2),
            Err(SessionError::InvalidTransition(_))
        ));
        assert!(matches!(
            session.remove_participant(1),
            Err(SessionError::InvalidTransition(_))
        ));
    }

    #[test]
    fn mvp_must_be_a_participant() {
        let mut session = TrainingSession::new("ranked");
        session.add_participant(10).unwrap();
        session.status = SessionStatus::InProgress;

        assert_eq!(session.set_mvp(Some(11)), Err(SessionError::NotListed(11)));
        session.set_mvp(Some(10)).unwrap();
        assert_eq!(session.mvp, Some(10));
        session.set_mvp(None).unwrap();
        assert_eq!(session.mvp, None);
    }

    #[test]
    fn entity_conversion_restores_back_references() {
        let mut session = TrainingSession::new("casual");
        session.participants.extend([1, 2, 3, 4]);
        session.status = SessionStatus::InProgress;
        session.teams = vec![Team::numbered(1, vec![1, 2]), Team::numbered(2, vec![3, 4])];
        session.brackets = vec![
            MatchBracket::new(Slot::Seed(1), Slot::Seed(2), "Semifinal"),
            MatchBracket::new(Slot::WinnerOf(0), Slot::Seed(2), "Final"),
        ];
        session.brackets[0].winner = Some(1);
        session.current_phase = Some("Final".into());

        let entity: SessionEntity = session.clone().into();
        assert_eq!(entity.brackets[1].slot_a, -1);

        let restored = TrainingSession::try_from(entity).unwrap();
        assert_eq!(restored, session);
    }

    #[test]
    fn forward_references_are_rejected_on_restore() {
        let mut entity: SessionEntity = TrainingSession::new("casual").into();
        entity.brackets.push(BracketEntity {
            slot_a: -1,
            slot_b: 2,
            winner: None,
            phase: "Final".into(),
            room_code: None,
        });
        assert_eq!(
            TrainingSession::try_from(entity),
            Err(RestoreError::ForwardReference {
                index: 0,
                target: 0
            })
        );
    }
}

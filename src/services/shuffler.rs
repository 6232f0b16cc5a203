//! Balanced team shuffling.
//!
//! Participants are split into `k` teams of identical size. Captains are spread first so they do
//! not cluster on one team; everybody else fills the remaining seats round-robin.

use std::collections::HashSet;

use rand::{Rng, seq::SliceRandom};
use thiserror::Error;

use crate::state::session::{CaptainMode, PlayerId, Team, TeamId};

/// Smallest pool that can be drafted.
pub const MIN_PARTICIPANTS: usize = 4;
/// Smallest allowed team.
pub const MIN_TEAM_SIZE: usize = 2;

/// Reasons a shuffle request is refused before anything is drafted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShuffleError {
    /// Not enough players registered to draft.
    #[error("at least {MIN_PARTICIPANTS} participants are required (got {0})")]
    TooFewParticipants(usize),
    /// The players do not divide evenly into the requested teams.
    #[error("{participants} participants cannot be split evenly into {teams} teams")]
    UnevenSplit {
        /// Registered player count.
        participants: usize,
        /// Requested team count.
        teams: usize,
    },
    /// The requested teams would be below the minimum size.
    #[error("{teams} teams of {participants} participants would leave fewer than {MIN_TEAM_SIZE} players per team")]
    TeamsTooSmall {
        /// Registered player count.
        participants: usize,
        /// Requested team count.
        teams: usize,
    },
    /// No bracket table exists for this team count.
    #[error("brackets exist for 2 to 10 teams (requested {0})")]
    UnsupportedTeamCount(usize),
    /// More captains signed up than teams; an explicit pick is needed.
    #[error("{available} captains signed up but only {required} fit; select exactly {required}")]
    CaptainSelectionRequired {
        /// Number of captains to select.
        required: usize,
        /// Captains among the participants.
        available: usize,
    },
    /// The explicit captain pick is malformed.
    #[error("invalid captain selection: {0}")]
    InvalidCaptainSelection(String),
}

/// Validate that `participants` can be split into `team_count` teams and return the team size.
pub fn team_size(participants: usize, team_count: usize) -> Result<usize, ShuffleError> {
    if participants < MIN_PARTICIPANTS {
        return Err(ShuffleError::TooFewParticipants(participants));
    }
    if team_count == 0 || participants % team_count != 0 {
        return Err(ShuffleError::UnevenSplit {
            participants,
            teams: team_count,
        });
    }
    if team_count * MIN_TEAM_SIZE > participants {
        return Err(ShuffleError::TeamsTooSmall {
            participants,
            teams: team_count,
        });
    }
    Ok(participants / team_count)
}

/// Split `participants` into `team_count` teams honouring the captain mode.
///
/// `captains` is the already validated captain selection; ids that are not participants are
/// ignored. Teams are numbered from 1 in the returned order.
pub fn shuffle_teams<R>(
    rng: &mut R,
    participants: &[PlayerId],
    team_count: usize,
    mode: CaptainMode,
    captains: &[PlayerId],
) -> Result<Vec<Team>, ShuffleError>
where
    R: Rng + ?Sized,
{
    let size = team_size(participants.len(), team_count)?;
    let mut rosters: Vec<Vec<PlayerId>> = vec![Vec::with_capacity(size); team_count];

    match mode {
        CaptainMode::None => {
            let mut pool = participants.to_vec();
            pool.shuffle(rng);
            fill_round_robin(&mut rosters, pool, size);
        }
        CaptainMode::Unlimited => {
            let (mut leads, mut rest) = partition(participants, captains);
            leads.shuffle(rng);
            rest.shuffle(rng);
            for (index, captain) in leads.into_iter().enumerate() {
                rosters[index % team_count].push(captain);
            }
            fill_round_robin(&mut rosters, rest, size);
        }
        CaptainMode::PerTeamCap(limit) => {
            let (mut leads, mut rest) = partition(participants, captains);
            leads.shuffle(rng);
            rest.shuffle(rng);
            place_capped(&mut rosters, leads, limit as usize);
            fill_round_robin(&mut rosters, rest, size);
        }
    }

    Ok(rosters
        .into_iter()
        .enumerate()
        .map(|(index, players)| Team::numbered(index as TeamId + 1, players))
        .collect())
}

/// Split participants into (captains, others), keeping participant order.
fn partition(participants: &[PlayerId], captains: &[PlayerId]) -> (Vec<PlayerId>, Vec<PlayerId>) {
    let captains: HashSet<PlayerId> = captains.iter().copied().collect();
    participants
        .iter()
        .copied()
        .partition(|player| captains.contains(player))
}

/// Walk captains round-robin, probing forward when the pointed team is at its cap.
fn place_capped(rosters: &mut [Vec<PlayerId>], captains: Vec<PlayerId>, limit: usize) {
    let team_count = rosters.len();
    let mut placed = vec![0usize; team_count];
    let mut pointer = 0;

    for captain in captains {
        let target = (0..team_count)
            .map(|offset| (pointer + offset) % team_count)
            .find(|&team| placed[team] < limit)
            .unwrap_or(pointer);
        rosters[target].push(captain);
        placed[target] += 1;
        pointer = (pointer + 1) % team_count;
    }
}

/// Deal `pool` round-robin, skipping teams that already reached `size`.
fn fill_round_robin(rosters: &mut [Vec<PlayerId>], pool: Vec<PlayerId>, size: usize) {
    let team_count = rosters.len();
    let mut pointer = 0;

    for player in pool {
        let Some(target) = (0..team_count)
            .map(|offset| (pointer + offset) % team_count)
            .find(|&team| rosters[team].len() < size)
        else {
            // Capacity always matches the pool; nothing left to fill.
            break;
        };
        rosters[target].push(player);
        pointer = (target + 1) % team_count;
    }
}

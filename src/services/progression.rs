//! Winner bookkeeping for the elimination tree.
//!
//! Brackets are never reshaped after generation; only winners and room codes change here. The
//! active phase is always derived from the bracket list, never stored independently.

use thiserror::Error;

use crate::state::{
    session::{MatchBracket, SessionError, Slot, TeamId, TrainingSession},
    state_machine::SessionEvent,
};

/// Reasons a bracket mutation is refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProgressionError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("bracket {0} is waiting on an earlier result")]
    Unresolved(usize),
    #[error("team {team} does not play in bracket {index}")]
    NotContender { index: usize, team: TeamId },
    #[error("bracket {0} already has a winner")]
    AlreadyDecided(usize),
    #[error("bracket {0} has no winner to clear")]
    Undecided(usize),
}

/// Strip a trailing round number: `Quarterfinal 2` becomes `Quarterfinal`.
pub fn base_phase(phase: &str) -> &str {
    match phase.rsplit_once(' ') {
        Some((base, number))
            if !number.is_empty() && number.chars().all(|c| c.is_ascii_digit()) =>
        {
            base
        }
        _ => phase,
    }
}

/// Base phase of the first bracket without a winner, if any.
pub fn active_phase(brackets: &[MatchBracket]) -> Option<&str> {
    brackets
        .iter()
        .find(|bracket| bracket.winner.is_none())
        .map(|bracket| base_phase(&bracket.phase))
}

/// Team occupying `slot`, if it is known yet.
pub fn slot_team(brackets: &[MatchBracket], slot: Slot) -> Option<TeamId> {
    match slot {
        Slot::Seed(team) => Some(team),
        Slot::WinnerOf(index) => brackets.get(index).and_then(|bracket| bracket.winner),
    }
}

/// Both contenders of `bracket`, once each slot resolves.
pub fn contenders(brackets: &[MatchBracket], bracket: &MatchBracket) -> Option<(TeamId, TeamId)> {
    Some((
        slot_team(brackets, bracket.slot_a)?,
        slot_team(brackets, bracket.slot_b)?,
    ))
}

/// Indices of the brackets of the active phase whose contenders are both known.
pub fn playable_brackets(brackets: &[MatchBracket]) -> Vec<usize> {
    let Some(phase) = active_phase(brackets) else {
        return Vec::new();
    };

    brackets
        .iter()
        .enumerate()
        .filter(|(_, bracket)| bracket.winner.is_none() && base_phase(&bracket.phase) == phase)
        .filter(|(_, bracket)| contenders(brackets, bracket).is_some())
        .map(|(index, _)| index)
        .collect()
}

fn refresh_phase(session: &mut TrainingSession) {
    session.current_phase = active_phase(&session.brackets).map(str::to_owned);
}

/// Record `team` as the winner of bracket `index`.
///
/// Finalizes the session, crowning the winner of the last bracket, once every bracket is decided.
/// Returns whether the session was finalized.
pub fn set_winner(
    session: &mut TrainingSession,
    index: usize,
    team: TeamId,
) -> Result<bool, ProgressionError> {
    session
        .ensure(SessionEvent::WinnerRecorded)
        .map_err(SessionError::from)?;

    let bracket = session.bracket(index)?;
    if bracket.winner.is_some() {
        return Err(ProgressionError::AlreadyDecided(index));
    }
    let (a, b) =
        contenders(&session.brackets, bracket).ok_or(ProgressionError::Unresolved(index))?;
    if team != a && team != b {
        return Err(ProgressionError::NotContender { index, team });
    }

    session.bracket_mut(index)?.winner = Some(team);
    refresh_phase(session);

    if session.brackets.iter().all(|bracket| bracket.winner.is_some()) {
        session.champion = session.brackets.last().and_then(|bracket| bracket.winner);
        session
            .advance(SessionEvent::AllResolved)
            .map_err(SessionError::from)?;
        return Ok(true);
    }
    Ok(false)
}

/// Withdraw the winner of bracket `index`.
///
/// Brackets that directly consume this result lose their winner too; deeper rounds are left
/// untouched. Returns the indices whose winners were cascaded away.
pub fn clear_winner(
    session: &mut TrainingSession,
    index: usize,
) -> Result<Vec<usize>, ProgressionError> {
    session
        .ensure(SessionEvent::WinnerCleared)
        .map_err(SessionError::from)?;

    let bracket = session.bracket_mut(index)?;
    if bracket.winner.take().is_none() {
        return Err(ProgressionError::Undecided(index));
    }

    let mut cascaded = Vec::new();
    for (position, dependent) in session.brackets.iter_mut().enumerate() {
        if dependent.depends_on(index) && dependent.winner.take().is_some() {
            cascaded.push(position);
        }
    }

    session.champion = None;
    session
        .advance(SessionEvent::WinnerCleared)
        .map_err(SessionError::from)?;
    refresh_phase(session);
    Ok(cascaded)
}

/// Set the room code of bracket `index`; a blank code clears it.
pub fn set_room_code(
    session: &mut TrainingSession,
    index: usize,
    code: Option<&str>,
) -> Result<(), ProgressionError> {
    session
        .ensure(SessionEvent::Annotated)
        .map_err(SessionError::from)?;

    let code = code
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .map(str::to_owned);
    session.bracket_mut(index)?.room_code = code;
    Ok(())
}

/// Wipe every result and return to the draft, keeping teams and bracket shape.
pub fn revert_to_draft(session: &mut TrainingSession) -> Result<(), ProgressionError> {
    session
        .advance(SessionEvent::Reverted)
        .map_err(SessionError::from)?;

    for bracket in &mut session.brackets {
        bracket.winner = None;
        bracket.room_code = None;
    }
    session.champion = None;
    refresh_phase(session);
    Ok(())
}

/// Lock the drafted teams and open the first round.
pub fn confirm(session: &mut TrainingSession) -> Result<(), ProgressionError> {
    session
        .advance(SessionEvent::Confirmed)
        .map_err(SessionError::from)?;
    refresh_phase(session);
    Ok(())
}

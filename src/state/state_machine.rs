use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle states of a training session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Players join and leave; nothing is drafted yet.
    Registration,
    /// Teams and brackets exist and may be re-shuffled.
    Drafted,
    /// Teams are locked and match winners are being recorded.
    InProgress,
    /// Every bracket has a winner; waiting for close-out.
    Finalized,
}

/// Events that can be applied to a session status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// A participant joined or left.
    RosterChanged,
    /// Teams and brackets were (re)generated.
    Shuffled,
    /// Teams were locked in.
    Confirmed,
    /// A bracket winner was recorded while some brackets remain open.
    WinnerRecorded,
    /// The last open bracket received its winner.
    AllResolved,
    /// A recorded winner was withdrawn.
    WinnerCleared,
    /// A bracket annotation (room code) changed.
    Annotated,
    /// MVP or highlights changed.
    Awarded,
    /// Results were wiped and the session returned to the draft.
    Reverted,
    /// Points were awarded and the session is about to be deleted.
    ClosedOut,
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while {from:?}")]
pub struct InvalidTransition {
    /// The status the session was in when the event was received.
    pub from: SessionStatus,
    /// The event that cannot be applied from this status.
    pub event: SessionEvent,
}

impl SessionStatus {
    /// Compute the status reached by applying `event`, if the transition is valid.
    pub fn next(self, event: SessionEvent) -> Result<SessionStatus, InvalidTransition> {
        use SessionEvent as E;
        use SessionStatus as S;

        let next = match (self, event) {
            (S::Registration, E::RosterChanged) => S::Registration,
            (S::Registration | S::Drafted, E::Shuffled) => S::Drafted,
            (S::Drafted, E::Confirmed) => S::InProgress,
            (S::InProgress, E::WinnerRecorded) => S::InProgress,
            (S::InProgress, E::AllResolved) => S::Finalized,
            (S::InProgress | S::Finalized, E::WinnerCleared) => S::InProgress,
            (status @ (S::Drafted | S::InProgress | S::Finalized), E::Annotated) => status,
            (status @ (S::InProgress | S::Finalized), E::Awarded) => status,
            (S::InProgress | S::Finalized, E::Reverted) => S::Drafted,
            (S::Finalized, E::ClosedOut) => S::Finalized,
            (from, event) => return Err(InvalidTransition { from, event }),
        };

        Ok(next)
    }

    /// Whether teams and brackets exist in this status.
    pub fn is_drafted(self) -> bool {
        !matches!(self, SessionStatus::Registration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(status: SessionStatus, event: SessionEvent) -> SessionStatus {
        status.next(event).unwrap()
    }

    #[test]
    fn full_happy_path_through_session() {
        let mut status = SessionStatus::Registration;
        status = apply(status, SessionEvent::RosterChanged);
        assert_eq!(status, SessionStatus::Registration);
        status = apply(status, SessionEvent::Shuffled);
        assert_eq!(status, SessionStatus::Drafted);
        status = apply(status, SessionEvent::Shuffled);
        assert_eq!(status, SessionStatus::Drafted);
        status = apply(status, SessionEvent::Confirmed);
        assert_eq!(status, SessionStatus::InProgress);
        status = apply(status, SessionEvent::WinnerRecorded);
        status = apply(status, SessionEvent::AllResolved);
        assert_eq!(status, SessionStatus::Finalized);
        assert_eq!(
            apply(status, SessionEvent::ClosedOut),
            SessionStatus::Finalized
        );
    }

    #[test]
    fn clearing_a_winner_reopens_a_finalized_session() {
        assert_eq!(
            apply(SessionStatus::Finalized, SessionEvent::WinnerCleared),
            SessionStatus::InProgress
        );
    }

    #[test]
    fn revert_returns_to_draft() {
        assert_eq!(
            apply(SessionStatus::InProgress, SessionEvent::Reverted),
            SessionStatus::Drafted
        );
        assert_eq!(
            apply(SessionStatus::Finalized, SessionEvent::Reverted),
            SessionStatus::Drafted
        );
        assert!(SessionStatus::Drafted.next(SessionEvent::Reverted).is_err());
    }

    #[test]
    fn invalid_transition_returns_error() {
        let err = SessionStatus::Registration
            .next(SessionEvent::Confirmed)
            .unwrap_err();
        assert_eq!(err.from, SessionStatus::Registration);
        assert_eq!(err.event, SessionEvent::Confirmed);

        assert!(SessionStatus::InProgress.next(SessionEvent::Shuffled).is_err());
        assert!(SessionStatus::Drafted.next(SessionEvent::WinnerRecorded).is_err());
        assert!(SessionStatus::Drafted.next(SessionEvent::RosterChanged).is_err());
        assert!(SessionStatus::InProgress.next(SessionEvent::ClosedOut).is_err());
        assert!(SessionStatus::Drafted.next(SessionEvent::Awarded).is_err());
    }
}

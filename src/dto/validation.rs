//! Validation helpers for DTOs.

use validator::ValidationError;

use crate::state::session::CaptainMode;

/// Largest per-team captain cap accepted from clients.
const MAX_CAPTAINS_PER_TEAM: u32 = 5;

/// Rejects strings made only of whitespace.
pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("Value must contain at least one visible character".into());
        return Err(err);
    }
    Ok(())
}

/// Rejects per-team captain caps of zero or above [`MAX_CAPTAINS_PER_TEAM`].
pub fn validate_captain_mode(mode: &CaptainMode) -> Result<(), ValidationError> {
    match mode {
        CaptainMode::PerTeamCap(limit) if *limit == 0 || *limit > MAX_CAPTAINS_PER_TEAM => {
            let mut err = ValidationError::new("captain_cap");
            err.message = Some(
                format!("Captain cap must be between 1 and {MAX_CAPTAINS_PER_TEAM} (got {limit})")
                    .into(),
            );
            Err(err)
        }
        _ => Ok(()),
    }
}

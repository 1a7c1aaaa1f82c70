//! Validation helpers for DTOs.

use std::collections::HashSet;

use validator::ValidationError;

use crate::dto::game::RosterMemberInput;

/// Rejects rosters listing the same member id twice.
pub fn validate_unique_members(members: &[RosterMemberInput]) -> Result<(), ValidationError> {
    let mut seen = HashSet::with_capacity(members.len());
    if let Some(duplicate) = members.iter().find(|member| !seen.insert(member.id)) {
        let mut err = ValidationError::new("duplicate_member");
        err.message = Some(format!("Member {} is listed more than once", duplicate.id).into());
        return Err(err);
    }
    Ok(())
}

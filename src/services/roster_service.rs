use tracing::info;

use crate::{
    dto::game::{RosterRequest, RosterResponse},
    error::ServiceError,
    state::{SharedState, game::CommunityId, roster::RosterMember},
};

/// Replace the roster reported by the chat bridge for `community`.
///
/// Running games see the new membership on their next command or tick.
pub fn replace_roster(
    state: &SharedState,
    community: CommunityId,
    request: RosterRequest,
) -> RosterResponse {
    let RosterRequest { role_name, members } = request;
    let roster = state.rosters().replace(
        community,
        role_name,
        members.into_iter().map(RosterMember::from),
    );
    let response = RosterResponse::from_roster(community, &roster);
    info!(
        %community,
        members = roster.members.len(),
        eligible = response.eligible_count,
        "roster replaced"
    );
    response
}

/// Roster currently known for `community`.
pub fn get_roster(
    state: &SharedState,
    community: CommunityId,
) -> Result<RosterResponse, ServiceError> {
    state
        .rosters()
        .get(community)
        .map(|roster| RosterResponse::from_roster(community, &roster))
        .ok_or_else(|| ServiceError::NotFound(format!("no roster for community `{community}`")))
}

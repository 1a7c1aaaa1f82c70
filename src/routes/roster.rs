use axum::{
    Json, Router,
    extract::{Path, State},
    routing::put,
};
use validator::Validate;

use crate::{
    dto::game::{RosterRequest, RosterResponse},
    error::AppError,
    services::roster_service,
    state::{SharedState, game::CommunityId},
};

/// Roster synchronisation for the chat bridge.
pub fn router() -> Router<SharedState> {
    Router::new().route(
        "/communities/{id}/roster",
        put(replace_roster).get(get_roster),
    )
}

/// Replace the members holding the player role.
#[utoipa::path(
    put,
    path = "/communities/{id}/roster",
    tag = "roster",
    params(("id" = u64, Path, description = "Community identifier")),
    request_body = RosterRequest,
    responses(
        (status = 200, description = "Roster stored", body = RosterResponse),
        (status = 400, description = "Invalid roster")
    )
)]
pub async fn replace_roster(
    State(state): State<SharedState>,
    Path(id): Path<u64>,
    Json(payload): Json<RosterRequest>,
) -> Result<Json<RosterResponse>, AppError> {
    payload.validate()?;
    Ok(Json(roster_service::replace_roster(
        &state,
        CommunityId(id),
        payload,
    )))
}

/// Roster currently known for a community.
#[utoipa::path(
    get,
    path = "/communities/{id}/roster",
    tag = "roster",
    params(("id" = u64, Path, description = "Community identifier")),
    responses(
        (status = 200, description = "Roster", body = RosterResponse),
        (status = 404, description = "No roster reported yet")
    )
)]
pub async fn get_roster(
    State(state): State<SharedState>,
    Path(id): Path<u64>,
) -> Result<Json<RosterResponse>, AppError> {
    Ok(Json(roster_service::get_roster(&state, CommunityId(id))?))
}

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
};

use crate::{
    dto::game::{
        CastVoteRequest, EliminateRequest, EliminationResponse, HammerResponse, PlayersResponse,
        ResetResponse, StartGameRequest, StartGameResponse, StartHammerRequest, StatusResponse,
        TallyResponse, UnvoteResponse, VoteResponse,
    },
    error::AppError,
    services::game_service,
    state::{
        SharedState,
        game::{CommunityId, PlayerId},
    },
};

/// Per-community game commands and queries.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/communities/{id}/game", delete(delete_game))
        .route("/communities/{id}/game/start", post(start_game))
        .route("/communities/{id}/votes", post(cast_vote))
        .route("/communities/{id}/votes/{voter_id}", delete(remove_vote))
        .route("/communities/{id}/hammer", post(start_hammer))
        .route("/communities/{id}/tally", get(tally))
        .route("/communities/{id}/players", get(players))
        .route("/communities/{id}/status", get(status))
        .route("/communities/{id}/eliminations", post(eliminate))
        .route("/communities/{id}/reset", post(reset_game))
        .route("/communities/{id}/reset/votes", post(reset_votes))
}

/// Start a game with the current role holders.
#[utoipa::path(
    post,
    path = "/communities/{id}/game/start",
    tag = "game",
    params(("id" = u64, Path, description = "Community identifier")),
    request_body = StartGameRequest,
    responses(
        (status = 200, description = "Game started", body = StartGameResponse),
        (status = 422, description = "Fewer than three eligible players")
    )
)]
pub async fn start_game(
    State(state): State<SharedState>,
    Path(id): Path<u64>,
    Json(payload): Json<StartGameRequest>,
) -> Result<Json<StartGameResponse>, AppError> {
    Ok(Json(
        game_service::start_game(&state, CommunityId(id), payload).await?,
    ))
}

/// Forget the community's game and its stored rows.
#[utoipa::path(
    delete,
    path = "/communities/{id}/game",
    tag = "game",
    params(("id" = u64, Path, description = "Community identifier")),
    responses(
        (status = 204, description = "Game deleted"),
        (status = 404, description = "No game for this community")
    )
)]
pub async fn delete_game(
    State(state): State<SharedState>,
    Path(id): Path<u64>,
) -> Result<StatusCode, AppError> {
    game_service::delete_game(&state, CommunityId(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Cast or change a vote; a new majority starts the hammer.
#[utoipa::path(
    post,
    path = "/communities/{id}/votes",
    tag = "votes",
    params(("id" = u64, Path, description = "Community identifier")),
    request_body = CastVoteRequest,
    responses(
        (status = 200, description = "Vote recorded", body = VoteResponse),
        (status = 400, description = "Self vote"),
        (status = 403, description = "Voter or target cannot take part"),
        (status = 409, description = "No game in progress")
    )
)]
pub async fn cast_vote(
    State(state): State<SharedState>,
    Path(id): Path<u64>,
    Json(payload): Json<CastVoteRequest>,
) -> Result<Json<VoteResponse>, AppError> {
    Ok(Json(
        game_service::cast_vote(&state, CommunityId(id), payload).await?,
    ))
}

/// Withdraw a vote.
#[utoipa::path(
    delete,
    path = "/communities/{id}/votes/{voter_id}",
    tag = "votes",
    params(
        ("id" = u64, Path, description = "Community identifier"),
        ("voter_id" = u64, Path, description = "Player withdrawing their vote")
    ),
    responses((status = 200, description = "Vote state after removal", body = UnvoteResponse))
)]
pub async fn remove_vote(
    State(state): State<SharedState>,
    Path((id, voter_id)): Path<(u64, u64)>,
) -> Result<Json<UnvoteResponse>, AppError> {
    Ok(Json(
        game_service::remove_vote(&state, CommunityId(id), PlayerId(voter_id)).await?,
    ))
}

/// Start the hammer countdown manually.
#[utoipa::path(
    post,
    path = "/communities/{id}/hammer",
    tag = "votes",
    params(("id" = u64, Path, description = "Community identifier")),
    request_body = StartHammerRequest,
    responses(
        (status = 200, description = "Countdown started", body = HammerResponse),
        (status = 409, description = "Countdown already running or no game")
    )
)]
pub async fn start_hammer(
    State(state): State<SharedState>,
    Path(id): Path<u64>,
    payload: Option<Json<StartHammerRequest>>,
) -> Result<Json<HammerResponse>, AppError> {
    let payload = payload.map(|Json(body)| body).unwrap_or_default();
    Ok(Json(
        game_service::start_hammer(&state, CommunityId(id), payload).await?,
    ))
}

/// Current vote tally.
#[utoipa::path(
    get,
    path = "/communities/{id}/tally",
    tag = "votes",
    params(("id" = u64, Path, description = "Community identifier")),
    responses((status = 200, description = "Tally", body = TallyResponse))
)]
pub async fn tally(
    State(state): State<SharedState>,
    Path(id): Path<u64>,
) -> Result<Json<TallyResponse>, AppError> {
    Ok(Json(game_service::tally(&state, CommunityId(id)).await?))
}

/// Active and eliminated players.
#[utoipa::path(
    get,
    path = "/communities/{id}/players",
    tag = "game",
    params(("id" = u64, Path, description = "Community identifier")),
    responses((status = 200, description = "Players", body = PlayersResponse))
)]
pub async fn players(
    State(state): State<SharedState>,
    Path(id): Path<u64>,
) -> Result<Json<PlayersResponse>, AppError> {
    Ok(Json(game_service::players(&state, CommunityId(id)).await?))
}

/// Roster and game overview.
#[utoipa::path(
    get,
    path = "/communities/{id}/status",
    tag = "game",
    params(("id" = u64, Path, description = "Community identifier")),
    responses((status = 200, description = "Status", body = StatusResponse))
)]
pub async fn status(
    State(state): State<SharedState>,
    Path(id): Path<u64>,
) -> Result<Json<StatusResponse>, AppError> {
    Ok(Json(game_service::status(&state, CommunityId(id)).await?))
}

/// Eliminate a player on moderator request.
#[utoipa::path(
    post,
    path = "/communities/{id}/eliminations",
    tag = "game",
    params(("id" = u64, Path, description = "Community identifier")),
    request_body = EliminateRequest,
    responses(
        (status = 200, description = "Player eliminated", body = EliminationResponse),
        (status = 409, description = "Already eliminated or no game")
    )
)]
pub async fn eliminate(
    State(state): State<SharedState>,
    Path(id): Path<u64>,
    Json(payload): Json<EliminateRequest>,
) -> Result<Json<EliminationResponse>, AppError> {
    Ok(Json(
        game_service::eliminate(&state, CommunityId(id), payload).await?,
    ))
}

/// Reset the whole game.
#[utoipa::path(
    post,
    path = "/communities/{id}/reset",
    tag = "game",
    params(("id" = u64, Path, description = "Community identifier")),
    responses((status = 200, description = "Game reset", body = ResetResponse))
)]
pub async fn reset_game(
    State(state): State<SharedState>,
    Path(id): Path<u64>,
) -> Result<Json<ResetResponse>, AppError> {
    Ok(Json(game_service::reset_game(&state, CommunityId(id)).await?))
}

/// Clear votes and the countdown, keeping eliminations.
#[utoipa::path(
    post,
    path = "/communities/{id}/reset/votes",
    tag = "game",
    params(("id" = u64, Path, description = "Community identifier")),
    responses((status = 200, description = "Votes reset", body = ResetResponse))
)]
pub async fn reset_votes(
    State(state): State<SharedState>,
    Path(id): Path<u64>,
) -> Result<Json<ResetResponse>, AppError> {
    Ok(Json(
        game_service::reset_votes(&state, CommunityId(id)).await?,
    ))
}

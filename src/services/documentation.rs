use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the Mafiadon backend.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sse::notification_stream,
        crate::routes::roster::replace_roster,
        crate::routes::roster::get_roster,
        crate::routes::game::start_game,
        crate::routes::game::delete_game,
        crate::routes::game::cast_vote,
        crate::routes::game::remove_vote,
        crate::routes::game::start_hammer,
        crate::routes::game::tally,
        crate::routes::game::players,
        crate::routes::game::status,
        crate::routes::game::eliminate,
        crate::routes::game::reset_game,
        crate::routes::game::reset_votes,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::sse::Handshake,
            crate::dto::sse::SystemStatus,
            crate::dto::sse::NotificationEvent,
            crate::dto::sse::NotificationKindDto,
            crate::dto::game::RosterRequest,
            crate::dto::game::RosterMemberInput,
            crate::dto::game::RosterResponse,
            crate::dto::game::StartGameRequest,
            crate::dto::game::StartGameResponse,
            crate::dto::game::CastVoteRequest,
            crate::dto::game::VoteResponse,
            crate::dto::game::UnvoteResponse,
            crate::dto::game::StartHammerRequest,
            crate::dto::game::HammerResponse,
            crate::dto::game::HammerSummary,
            crate::dto::game::TallyResponse,
            crate::dto::game::TallyEntry,
            crate::dto::game::PlayerSummary,
            crate::dto::game::PlayersResponse,
            crate::dto::game::StatusResponse,
            crate::dto::game::EliminateRequest,
            crate::dto::game::EliminationResponse,
            crate::dto::game::ResetResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sse", description = "Server-sent events streams"),
        (name = "roster", description = "Role membership pushed by the chat bridge"),
        (name = "game", description = "Game lifecycle and moderation"),
        (name = "votes", description = "Votes, tally and hammer countdown"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_community_route_is_documented() {
        let doc = ApiDoc::openapi();
        for path in [
            "/communities/{id}/votes",
            "/communities/{id}/votes/{voter_id}",
            "/communities/{id}/hammer",
            "/communities/{id}/roster",
            "/sse/notifications",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}

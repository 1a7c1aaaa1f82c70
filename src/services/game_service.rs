use std::{collections::BTreeSet, time::SystemTime};

use tracing::info;

use crate::{
    dao::models::VoteRow,
    dto::game::{
        CastVoteRequest, EliminateRequest, EliminationResponse, HammerResponse, HammerSummary,
        PlayerSummary, PlayersResponse, ResetResponse, StartGameRequest, StartGameResponse,
        StartHammerRequest, StatusResponse, TallyResponse, UnvoteResponse, VoteResponse,
        tally_entries,
    },
    error::ServiceError,
    services::{persistence::PersistOp, render::Names},
    state::{
        SharedState,
        game::{CommunityId, GameError, GameState, PlayerId},
        registry::GameHandle,
        roster::RoleMembership,
        tally::majority_threshold,
    },
};

/// Start a game with the community's current role holders.
///
/// Any previous votes, eliminations and countdown are discarded.
pub async fn start_game(
    state: &SharedState,
    community: CommunityId,
    request: StartGameRequest,
) -> Result<StartGameResponse, ServiceError> {
    let eligible = state.rosters().eligible_players(community);
    let handle = state.games().get_or_create(community);

    {
        let mut game = handle.lock().await;
        game.activate(&eligible, request.destination_id)?;
        state.persistence().extend([
            PersistOp::ClearGame(community),
            PersistOp::SaveGameMeta(game.meta_row(community)),
        ]);
    }

    info!(%community, players = eligible.len(), "game started");

    let membership = state.membership();
    let names = Names::new(membership.as_ref(), community);
    Ok(StartGameResponse {
        community_id: community,
        destination_id: request.destination_id,
        players: summaries(&names, eligible.iter().copied()),
        threshold: majority_threshold(eligible.len()),
    })
}

/// Record a vote, starting the hammer when it creates a majority and no
/// countdown is running.
pub async fn cast_vote(
    state: &SharedState,
    community: CommunityId,
    request: CastVoteRequest,
) -> Result<VoteResponse, ServiceError> {
    let CastVoteRequest {
        voter_id,
        target_id,
        destination_id,
    } = request;
    let eligible = state.rosters().eligible_players(community);
    let handle = existing_game(state, community)?;

    let mut game = handle.lock().await;
    ensure_can_vote(&game, &eligible, voter_id, target_id)?;

    let previous_target_id = game.cast_vote(voter_id, target_id);
    state
        .persistence()
        .push(PersistOp::SaveVote(VoteRow {
            community_id: community,
            voter_id,
            target_id,
        }));

    let active = game.active_players(&eligible);
    let now = state.clock().now();
    let majority = if game.hammer().is_none() {
        game.check_majority(active.len())
            .zip(destination_id.or(game.destination()))
    } else {
        None
    };
    let hammered_id = majority.map(|(target, destination)| {
        game.start_hammer(destination, now, state.config().hammer_duration);
        state
            .persistence()
            .push(PersistOp::SaveGameMeta(game.meta_row(community)));
        info!(%community, %target, %destination, "majority reached; hammer started");
        target
    });

    Ok(VoteResponse {
        voter_id,
        target_id,
        previous_target_id,
        hammered_id,
        tally: tally_response(&game, &active),
        hammer: hammer_summary(&game, now),
    })
}

/// Withdraw the voter's vote. `removed` is `false` when there was none.
pub async fn remove_vote(
    state: &SharedState,
    community: CommunityId,
    voter: PlayerId,
) -> Result<UnvoteResponse, ServiceError> {
    let eligible = state.rosters().eligible_players(community);
    let handle = existing_game(state, community)?;

    let mut game = handle.lock().await;
    game.ensure_active()?;
    let removed = game.remove_vote(voter);
    if removed {
        state
            .persistence()
            .push(PersistOp::RemoveVote { community, voter });
    }

    let active = game.active_players(&eligible);
    Ok(UnvoteResponse {
        removed,
        tally: tally_response(&game, &active),
        hammer: hammer_summary(&game, state.clock().now()),
    })
}

/// Start the hammer manually. Refused while a countdown runs.
pub async fn start_hammer(
    state: &SharedState,
    community: CommunityId,
    request: StartHammerRequest,
) -> Result<HammerResponse, ServiceError> {
    let handle = existing_game(state, community)?;
    let now = state.clock().now();

    let mut game = handle.lock().await;
    game.ensure_active()?;
    if let Some(remaining) = game.time_remaining(now) {
        return Err(GameError::HammerAlreadyActive { remaining }.into());
    }
    let Some(destination) = request.destination_id.or(game.destination()) else {
        return Err(ServiceError::InvalidInput(
            "no destination channel known for this game".into(),
        ));
    };

    let timer = game.start_hammer(destination, now, state.config().hammer_duration);
    state
        .persistence()
        .push(PersistOp::SaveGameMeta(game.meta_row(community)));
    info!(%community, %destination, "hammer started manually");

    Ok(HammerResponse {
        hammer: HammerSummary::at(&timer, now),
    })
}

/// Current tally of a running game.
pub async fn tally(
    state: &SharedState,
    community: CommunityId,
) -> Result<TallyResponse, ServiceError> {
    let eligible = state.rosters().eligible_players(community);
    let handle = existing_game(state, community)?;

    let game = handle.lock().await;
    game.ensure_active()?;
    Ok(tally_response(&game, &game.active_players(&eligible)))
}

/// Active and eliminated players. Works with or without a running game.
pub async fn players(
    state: &SharedState,
    community: CommunityId,
) -> Result<PlayersResponse, ServiceError> {
    let eligible = state.rosters().eligible_players(community);
    let membership = state.membership();
    let names = Names::new(membership.as_ref(), community);

    let Some(handle) = state.games().get(community) else {
        return Ok(PlayersResponse {
            game_active: false,
            active: summaries(&names, eligible.iter().copied()),
            eliminated: Vec::new(),
            threshold: None,
        });
    };

    let game = handle.lock().await;
    let active = game.active_players(&eligible);
    Ok(PlayersResponse {
        game_active: game.is_active(),
        threshold: game
            .is_active()
            .then(|| game.majority_threshold(active.len())),
        active: summaries(&names, active.into_iter()),
        eliminated: summaries(&names, game.eliminated().iter().copied()),
    })
}

/// Roster and game overview for a community.
pub async fn status(
    state: &SharedState,
    community: CommunityId,
) -> Result<StatusResponse, ServiceError> {
    let roster = state.rosters().get(community);
    let role_name = roster.as_ref().map(|roster| roster.role_name.clone());
    let member_count = roster.map(|roster| roster.eligible().len()).unwrap_or(0);

    let mut response = StatusResponse {
        community_id: community,
        role_name,
        member_count,
        game_active: false,
        destination_id: None,
        votes_cast: 0,
        eliminated_count: 0,
        hammer: None,
    };

    if let Some(handle) = state.games().get(community) {
        let game = handle.lock().await;
        response.game_active = game.is_active();
        response.destination_id = game.destination();
        response.votes_cast = game.votes().len();
        response.eliminated_count = game.eliminated().len();
        response.hammer = hammer_summary(&game, state.clock().now());
    }

    Ok(response)
}

/// Moderator elimination. Purges votes cast by and against the player.
pub async fn eliminate(
    state: &SharedState,
    community: CommunityId,
    request: EliminateRequest,
) -> Result<EliminationResponse, ServiceError> {
    let eligible = state.rosters().eligible_players(community);
    let handle = existing_game(state, community)?;
    let player = request.player_id;

    let mut game = handle.lock().await;
    game.ensure_active()?;
    if !eligible.contains(&player) {
        return Err(GameError::NotAPlayer(player).into());
    }
    let purged_voter_ids = game.eliminate(player)?;
    state
        .persistence()
        .push(PersistOp::SaveElimination { community, player });

    info!(%community, %player, purged = purged_voter_ids.len(), "player eliminated");

    let membership = state.membership();
    let names = Names::new(membership.as_ref(), community);
    Ok(EliminationResponse {
        player: PlayerSummary {
            id: player,
            display_name: names.of(player),
        },
        purged_voter_ids,
        tally: tally_response(&game, &game.active_players(&eligible)),
    })
}

/// Wipe the whole game: votes, eliminations, countdown and the active flag.
pub async fn reset_game(
    state: &SharedState,
    community: CommunityId,
) -> Result<ResetResponse, ServiceError> {
    let handle = existing_game(state, community)?;

    {
        let mut game = handle.lock().await;
        game.reset_full();
        state.persistence().extend([
            PersistOp::ClearGame(community),
            PersistOp::SaveGameMeta(game.meta_row(community)),
        ]);
    }

    info!(%community, "game reset");
    Ok(ResetResponse {
        community_id: community,
        votes_only: false,
    })
}

/// Clear votes and the countdown, keeping eliminations and the active game.
pub async fn reset_votes(
    state: &SharedState,
    community: CommunityId,
) -> Result<ResetResponse, ServiceError> {
    let handle = existing_game(state, community)?;

    {
        let mut game = handle.lock().await;
        let voters: Vec<PlayerId> = game.votes().keys().copied().collect();
        game.reset_votes_only();
        state.persistence().extend(
            voters
                .into_iter()
                .map(|voter| PersistOp::RemoveVote { community, voter }),
        );
        state
            .persistence()
            .push(PersistOp::SaveGameMeta(game.meta_row(community)));
    }

    info!(%community, "votes reset");
    Ok(ResetResponse {
        community_id: community,
        votes_only: true,
    })
}

/// Forget the community's game and delete its stored rows.
pub async fn delete_game(state: &SharedState, community: CommunityId) -> Result<(), ServiceError> {
    let Some(handle) = state.games().remove(community) else {
        return Err(ServiceError::NotFound(format!(
            "no game for community `{community}`"
        )));
    };

    let mut game = handle.lock().await;
    game.reset_full();
    state.persistence().push(PersistOp::ClearGame(community));
    info!(%community, "game deleted");
    Ok(())
}

fn existing_game(state: &SharedState, community: CommunityId) -> Result<GameHandle, ServiceError> {
    state
        .games()
        .get(community)
        .ok_or(ServiceError::Game(GameError::GameNotActive))
}

fn ensure_can_vote(
    game: &GameState,
    eligible: &BTreeSet<PlayerId>,
    voter: PlayerId,
    target: PlayerId,
) -> Result<(), GameError> {
    game.ensure_active()?;
    for player in [voter, target] {
        if !eligible.contains(&player) {
            return Err(GameError::NotAPlayer(player));
        }
        if game.is_eliminated(player) {
            return Err(GameError::PlayerEliminated(player));
        }
    }
    if voter == target {
        return Err(GameError::SelfVote);
    }
    Ok(())
}

fn tally_response(game: &GameState, active: &[PlayerId]) -> TallyResponse {
    let tally = game.tally();
    TallyResponse {
        threshold: game.majority_threshold(active.len()),
        active_count: active.len(),
        unvoted: active
            .iter()
            .filter(|player| !tally.contains_key(*player))
            .copied()
            .collect(),
        entries: tally_entries(&tally),
    }
}

fn hammer_summary(game: &GameState, now: SystemTime) -> Option<HammerSummary> {
    game.hammer().map(|hammer| HammerSummary::at(hammer, now))
}

fn summaries(names: &Names<'_>, players: impl Iterator<Item = PlayerId>) -> Vec<PlayerSummary> {
    players
        .map(|id| PlayerSummary {
            id,
            display_name: names.of(id),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use super::*;
    use crate::{
        clock::ManualClock,
        config::AppConfig,
        services::countdown::advance,
        state::{AppState, game::ChannelId, roster::RosterMember},
    };

    fn p(id: u64) -> PlayerId {
        PlayerId(id)
    }

    const COMMUNITY: CommunityId = CommunityId(7);

    fn fixture(players: u64) -> (SharedState, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000),
        ));
        let state = AppState::with_clock(AppConfig::default(), clock.clone());
        let mut members: Vec<RosterMember> = (1..=players)
            .map(|id| RosterMember {
                id: p(id),
                display_name: format!("P{id}"),
                bot: false,
            })
            .collect();
        members.push(RosterMember {
            id: p(99),
            display_name: "Bot".into(),
            bot: true,
        });
        state
            .rosters()
            .replace(COMMUNITY, "i play mafia".into(), members);
        (state, clock)
    }

    async fn started(players: u64) -> (SharedState, Arc<ManualClock>) {
        let (state, clock) = fixture(players);
        start_game(
            &state,
            COMMUNITY,
            StartGameRequest {
                destination_id: ChannelId(500),
            },
        )
        .await
        .unwrap();
        (state, clock)
    }

    fn vote(voter: u64, target: u64) -> CastVoteRequest {
        CastVoteRequest {
            voter_id: p(voter),
            target_id: p(target),
            destination_id: None,
        }
    }

    fn game_error(err: ServiceError) -> GameError {
        match err {
            ServiceError::Game(game) => game,
            other => panic!("expected a game error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn start_requires_three_players() {
        let (state, _) = fixture(2);
        let err = start_game(
            &state,
            COMMUNITY,
            StartGameRequest {
                destination_id: ChannelId(1),
            },
        )
        .await
        .unwrap_err();
        assert_eq!(
            game_error(err),
            GameError::InsufficientPlayers {
                found: 2,
                required: 3
            }
        );
    }

    #[tokio::test]
    async fn start_lists_players_without_bots() {
        let (state, _) = fixture(5);
        let response = start_game(
            &state,
            COMMUNITY,
            StartGameRequest {
                destination_id: ChannelId(1),
            },
        )
        .await
        .unwrap();
        assert_eq!(response.players.len(), 5);
        assert_eq!(response.threshold, 3);
        assert_eq!(response.players[0].display_name, "P1");
    }

    #[tokio::test]
    async fn voting_needs_a_game() {
        let (state, _) = fixture(5);
        let err = cast_vote(&state, COMMUNITY, vote(1, 2)).await.unwrap_err();
        assert_eq!(game_error(err), GameError::GameNotActive);
    }

    #[tokio::test]
    async fn vote_preconditions() {
        let (state, _) = started(5).await;

        let err = cast_vote(&state, COMMUNITY, vote(1, 1)).await.unwrap_err();
        assert_eq!(game_error(err), GameError::SelfVote);

        let err = cast_vote(&state, COMMUNITY, vote(42, 1)).await.unwrap_err();
        assert_eq!(game_error(err), GameError::NotAPlayer(p(42)));

        let err = cast_vote(&state, COMMUNITY, vote(1, 99)).await.unwrap_err();
        assert_eq!(game_error(err), GameError::NotAPlayer(p(99)));

        eliminate(&state, COMMUNITY, EliminateRequest { player_id: p(3) })
            .await
            .unwrap();
        let err = cast_vote(&state, COMMUNITY, vote(3, 1)).await.unwrap_err();
        assert_eq!(game_error(err), GameError::PlayerEliminated(p(3)));
        let err = cast_vote(&state, COMMUNITY, vote(1, 3)).await.unwrap_err();
        assert_eq!(game_error(err), GameError::PlayerEliminated(p(3)));
    }

    #[tokio::test]
    async fn revote_replaces_previous_target() {
        let (state, _) = started(5).await;
        cast_vote(&state, COMMUNITY, vote(1, 2)).await.unwrap();
        let response = cast_vote(&state, COMMUNITY, vote(1, 3)).await.unwrap();

        assert_eq!(response.previous_target_id, Some(p(2)));
        assert_eq!(response.tally.entries.len(), 1);
        assert_eq!(response.tally.entries[0].target_id, p(3));
        assert_eq!(response.tally.unvoted, vec![p(1), p(2), p(4), p(5)]);
    }

    #[tokio::test]
    async fn majority_starts_hammer_once() {
        let (state, clock) = started(5).await;
        cast_vote(&state, COMMUNITY, vote(1, 4)).await.unwrap();
        let second = cast_vote(&state, COMMUNITY, vote(2, 4)).await.unwrap();
        assert_eq!(second.hammered_id, None);
        assert!(second.hammer.is_none());

        let third = cast_vote(&state, COMMUNITY, vote(3, 4)).await.unwrap();
        assert_eq!(third.hammered_id, Some(p(4)));
        let hammer = third.hammer.unwrap();
        assert_eq!(hammer.remaining_secs, 24 * 3_600);

        clock.advance(Duration::from_secs(3_600));
        let fourth = cast_vote(&state, COMMUNITY, vote(5, 4)).await.unwrap();
        assert_eq!(fourth.hammered_id, None);
        assert_eq!(fourth.hammer.unwrap().remaining_secs, 23 * 3_600);
    }

    #[tokio::test]
    async fn manual_hammer_refuses_double_start() {
        let (state, clock) = started(3).await;
        let response = start_hammer(&state, COMMUNITY, StartHammerRequest::default())
            .await
            .unwrap();
        assert_eq!(response.hammer.remaining_secs, 24 * 3_600);

        clock.advance(Duration::from_secs(600));
        let err = start_hammer(&state, COMMUNITY, StartHammerRequest::default())
            .await
            .unwrap_err();
        assert_eq!(
            game_error(err),
            GameError::HammerAlreadyActive {
                remaining: Duration::from_secs(24 * 3_600 - 600)
            }
        );
    }

    #[tokio::test]
    async fn unvote_reports_missing_vote() {
        let (state, _) = started(3).await;
        cast_vote(&state, COMMUNITY, vote(1, 2)).await.unwrap();

        assert!(remove_vote(&state, COMMUNITY, p(1)).await.unwrap().removed);
        assert!(!remove_vote(&state, COMMUNITY, p(1)).await.unwrap().removed);
    }

    #[tokio::test]
    async fn elimination_purges_votes_and_rejects_repeat() {
        let (state, _) = started(5).await;
        cast_vote(&state, COMMUNITY, vote(1, 2)).await.unwrap();
        cast_vote(&state, COMMUNITY, vote(2, 3)).await.unwrap();
        cast_vote(&state, COMMUNITY, vote(4, 5)).await.unwrap();

        let response = eliminate(&state, COMMUNITY, EliminateRequest { player_id: p(2) })
            .await
            .unwrap();
        assert_eq!(response.player.display_name, "P2");
        assert_eq!(response.purged_voter_ids, vec![p(1), p(2)]);
        assert_eq!(response.tally.active_count, 4);
        assert_eq!(response.tally.threshold, 3);

        let err = eliminate(&state, COMMUNITY, EliminateRequest { player_id: p(2) })
            .await
            .unwrap_err();
        assert_eq!(game_error(err), GameError::AlreadyEliminated(p(2)));

        let players = players(&state, COMMUNITY).await.unwrap();
        assert_eq!(players.eliminated.len(), 1);
        assert_eq!(players.active.len(), 4);
        assert_eq!(players.threshold, Some(3));
    }

    #[tokio::test]
    async fn reset_votes_keeps_eliminations() {
        let (state, _) = started(5).await;
        for voter in 1..=3 {
            cast_vote(&state, COMMUNITY, vote(voter, 5)).await.unwrap();
        }
        eliminate(&state, COMMUNITY, EliminateRequest { player_id: p(4) })
            .await
            .unwrap();

        reset_votes(&state, COMMUNITY).await.unwrap();

        let status = status(&state, COMMUNITY).await.unwrap();
        assert!(status.game_active);
        assert_eq!(status.votes_cast, 0);
        assert_eq!(status.eliminated_count, 1);
        assert!(status.hammer.is_none());
    }

    #[tokio::test]
    async fn full_reset_deactivates() {
        let (state, _) = started(3).await;
        reset_game(&state, COMMUNITY).await.unwrap();

        let status = status(&state, COMMUNITY).await.unwrap();
        assert!(!status.game_active);
        assert_eq!(status.member_count, 3);
        assert_eq!(status.role_name.as_deref(), Some("i play mafia"));
        let err = tally(&state, COMMUNITY).await.unwrap_err();
        assert_eq!(game_error(err), GameError::GameNotActive);
    }

    #[tokio::test]
    async fn delete_forgets_the_game() {
        let (state, _) = started(3).await;
        delete_game(&state, COMMUNITY).await.unwrap();
        assert!(state.games().get(COMMUNITY).is_none());
        assert!(matches!(
            delete_game(&state, COMMUNITY).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn deleted_game_stays_deleted_for_stale_handles() {
        let (state, clock) = started(3).await;
        cast_vote(&state, COMMUNITY, vote(1, 2)).await.unwrap();
        cast_vote(&state, COMMUNITY, vote(3, 2)).await.unwrap();
        let stale = state.games().get(COMMUNITY).unwrap();
        let mut receiver = state.take_persistence_receiver().unwrap();
        while receiver.try_recv().is_ok() {}

        delete_game(&state, COMMUNITY).await.unwrap();
        clock.advance(Duration::from_secs(2 * 24 * 3_600));

        let mut game = stale.lock().await;
        let eligible = state.rosters().eligible_players(COMMUNITY);
        let now = state.clock().now();
        assert_eq!(
            advance(&mut game, &eligible, now, state.config().update_interval),
            None
        );
        assert!(!game.is_active());
        assert!(game.votes().is_empty());
        assert_eq!(
            receiver.try_recv().unwrap(),
            PersistOp::ClearGame(COMMUNITY)
        );
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn elimination_requires_a_roster_member() {
        let (state, _) = started(3).await;
        let err = eliminate(&state, COMMUNITY, EliminateRequest { player_id: p(42) })
            .await
            .unwrap_err();
        assert_eq!(game_error(err), GameError::NotAPlayer(p(42)));

        let players = players(&state, COMMUNITY).await.unwrap();
        assert!(players.eliminated.is_empty());
        assert_eq!(players.active.len(), 3);
    }

    #[tokio::test]
    async fn commands_queue_writes_in_order() {
        let (state, _) = fixture(3);
        let mut receiver = state.take_persistence_receiver().unwrap();
        start_game(
            &state,
            COMMUNITY,
            StartGameRequest {
                destination_id: ChannelId(9),
            },
        )
        .await
        .unwrap();
        cast_vote(&state, COMMUNITY, vote(1, 2)).await.unwrap();
        cast_vote(&state, COMMUNITY, vote(3, 2)).await.unwrap();

        let mut ops = Vec::new();
        while let Ok(op) = receiver.try_recv() {
            ops.push(op);
        }
        assert!(matches!(ops[0], PersistOp::ClearGame(COMMUNITY)));
        assert!(matches!(ops[1], PersistOp::SaveGameMeta(ref row) if row.active));
        assert!(matches!(ops[2], PersistOp::SaveVote(ref row) if row.voter_id == p(1)));
        assert!(matches!(ops[3], PersistOp::SaveVote(ref row) if row.voter_id == p(3)));
        assert!(matches!(ops[4], PersistOp::SaveGameMeta(ref row) if row.hammer_active));
        assert_eq!(ops.len(), 5);
    }
}

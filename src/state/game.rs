use std::{
    collections::BTreeSet,
    fmt,
    time::{Duration, SystemTime},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::{
    clock::{from_unix_millis, to_unix_millis},
    dao::models::{EliminationRow, GameRow, VoteRow},
    state::tally::{self, Tally, VoteMap},
};

/// Minimum number of eligible players needed to start a game.
pub const MIN_PLAYERS: usize = 3;

/// Stable identifier of a community member.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(transparent)]
pub struct PlayerId(pub u64);

/// Identifier of a community (guild); each one runs an independent game.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(transparent)]
pub struct CommunityId(pub u64);

/// Chat destination where automated messages for a game are posted.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(transparent)]
pub struct ChannelId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Display for CommunityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Rule violations reported back to the command caller. None of them change state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameError {
    /// Activation attempted with too few eligible players.
    #[error("not enough players: found {found}, need at least {required}")]
    InsufficientPlayers {
        /// Eligible players found.
        found: usize,
        /// Minimum required.
        required: usize,
    },
    /// Operation requires a started game.
    #[error("no game in progress")]
    GameNotActive,
    /// The player is already part of the elimination set.
    #[error("player {0} is already eliminated")]
    AlreadyEliminated(PlayerId),
    /// A hammer countdown is already running.
    #[error("hammer is already active")]
    HammerAlreadyActive {
        /// Time left on the running countdown.
        remaining: Duration,
    },
    /// The player does not hold the player role.
    #[error("player {0} does not hold the player role")]
    NotAPlayer(PlayerId),
    /// The player was eliminated and can no longer vote or be voted for.
    #[error("player {0} has been eliminated")]
    PlayerEliminated(PlayerId),
    /// Voter and target are the same player.
    #[error("players cannot vote for themselves")]
    SelfVote,
}

/// Running hammer countdown. Remaining time is always derived from `ends_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HammerTimer {
    /// Instant at which the countdown expires.
    pub ends_at: SystemTime,
    /// Last time progress was announced (or the countdown started).
    pub last_announced_at: SystemTime,
}

impl HammerTimer {
    /// Time left before expiry, zero once `now` reaches `ends_at`.
    pub fn remaining(&self, now: SystemTime) -> Duration {
        self.ends_at.duration_since(now).unwrap_or(Duration::ZERO)
    }
}

/// Per-community game state: votes, eliminations, hammer countdown and destination.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GameState {
    votes: VoteMap,
    eliminated: BTreeSet<PlayerId>,
    hammer: Option<HammerTimer>,
    active: bool,
    destination: Option<ChannelId>,
}

impl GameState {
    /// Fresh, inactive state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a game with the supplied eligible players, wiping prior votes and eliminations.
    pub fn activate(
        &mut self,
        players: &BTreeSet<PlayerId>,
        destination: ChannelId,
    ) -> Result<(), GameError> {
        if players.len() < MIN_PLAYERS {
            return Err(GameError::InsufficientPlayers {
                found: players.len(),
                required: MIN_PLAYERS,
            });
        }

        *self = Self {
            active: true,
            destination: Some(destination),
            ..Self::default()
        };
        Ok(())
    }

    /// Fail with [`GameError::GameNotActive`] unless a game is running.
    pub fn ensure_active(&self) -> Result<(), GameError> {
        if self.active {
            Ok(())
        } else {
            Err(GameError::GameNotActive)
        }
    }

    /// Record a vote, replacing any earlier vote by the same voter.
    ///
    /// Eligibility, self-votes and eliminations are the caller's preconditions;
    /// only map consistency is guaranteed here. Returns the replaced target.
    pub fn cast_vote(&mut self, voter: PlayerId, target: PlayerId) -> Option<PlayerId> {
        self.votes.insert(voter, target)
    }

    /// Drop the voter's vote. `false` when there was none.
    pub fn remove_vote(&mut self, voter: PlayerId) -> bool {
        self.votes.remove(&voter).is_some()
    }

    /// Eliminate `player` and purge every vote cast by or against them.
    ///
    /// Returns the voters whose votes were purged.
    pub fn eliminate(&mut self, player: PlayerId) -> Result<Vec<PlayerId>, GameError> {
        if !self.eliminated.insert(player) {
            return Err(GameError::AlreadyEliminated(player));
        }

        let purged: Vec<PlayerId> = self
            .votes
            .iter()
            .filter(|(voter, target)| **voter == player || **target == player)
            .map(|(voter, _)| *voter)
            .collect();
        for voter in &purged {
            self.votes.remove(voter);
        }

        Ok(purged)
    }

    /// Votes grouped by target in tally order.
    pub fn tally(&self) -> Tally {
        tally::tally(&self.votes)
    }

    /// Votes needed for a majority among `active_count` players.
    pub fn majority_threshold(&self, active_count: usize) -> usize {
        tally::majority_threshold(active_count)
    }

    /// Target currently holding a majority, if any.
    pub fn check_majority(&self, active_count: usize) -> Option<PlayerId> {
        tally::check_majority(&self.tally(), active_count)
    }

    /// Start (or restart) the hammer countdown, returning the new timer.
    pub fn start_hammer(
        &mut self,
        destination: ChannelId,
        now: SystemTime,
        duration: Duration,
    ) -> HammerTimer {
        let timer = HammerTimer {
            ends_at: now + duration,
            last_announced_at: now,
        };
        self.hammer = Some(timer);
        self.destination = Some(destination);
        timer
    }

    /// Time left on the hammer, `None` when no countdown runs.
    pub fn time_remaining(&self, now: SystemTime) -> Option<Duration> {
        self.hammer.map(|hammer| hammer.remaining(now))
    }

    /// Whether a running countdown has reached zero and awaits resolution.
    pub fn is_expired(&self, now: SystemTime) -> bool {
        self.time_remaining(now) == Some(Duration::ZERO)
    }

    /// Stop the countdown, returning the timer that was running.
    pub fn clear_hammer(&mut self) -> Option<HammerTimer> {
        self.hammer.take()
    }

    /// Move the "last announced" marker without touching the expiry.
    pub fn mark_announced(&mut self, now: SystemTime) {
        if let Some(hammer) = self.hammer.as_mut() {
            hammer.last_announced_at = now;
        }
    }

    /// Clear votes and the countdown; eliminations and the active flag stay.
    pub fn reset_votes_only(&mut self) {
        self.votes.clear();
        self.hammer = None;
    }

    /// Replace everything with a fresh inactive state.
    pub fn reset_full(&mut self) {
        *self = Self::new();
    }

    /// Roster members that have not been eliminated.
    pub fn active_players(&self, roster: &BTreeSet<PlayerId>) -> Vec<PlayerId> {
        roster
            .iter()
            .filter(|player| !self.eliminated.contains(player))
            .copied()
            .collect()
    }

    /// Whether `player` has been eliminated.
    pub fn is_eliminated(&self, player: PlayerId) -> bool {
        self.eliminated.contains(&player)
    }

    /// Current votes keyed by voter.
    pub fn votes(&self) -> &VoteMap {
        &self.votes
    }

    /// Eliminated players.
    pub fn eliminated(&self) -> &BTreeSet<PlayerId> {
        &self.eliminated
    }

    /// Running countdown, if any.
    pub fn hammer(&self) -> Option<&HammerTimer> {
        self.hammer.as_ref()
    }

    /// Whether a game has been started.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Where automated messages are posted.
    pub fn destination(&self) -> Option<ChannelId> {
        self.destination
    }

    /// Metadata row mirroring this state.
    pub fn meta_row(&self, community: CommunityId) -> GameRow {
        GameRow {
            community_id: community,
            destination_id: self.destination,
            active: self.active,
            hammer_active: self.hammer.is_some(),
            hammer_end_ms: self.hammer.map(|hammer| to_unix_millis(hammer.ends_at)),
            last_update_ms: self
                .hammer
                .map(|hammer| to_unix_millis(hammer.last_announced_at)),
        }
    }

    /// Full set of rows mirroring this state.
    pub fn to_rows(&self, community: CommunityId) -> (GameRow, Vec<VoteRow>, Vec<EliminationRow>) {
        let votes = self
            .votes
            .iter()
            .map(|(voter, target)| VoteRow {
                community_id: community,
                voter_id: *voter,
                target_id: *target,
            })
            .collect();
        let eliminated = self
            .eliminated
            .iter()
            .map(|player| EliminationRow {
                community_id: community,
                player_id: *player,
            })
            .collect();
        (self.meta_row(community), votes, eliminated)
    }

    /// Rebuild a state from persisted rows.
    ///
    /// Stored data is not trusted: a hammer flagged active without an end time is
    /// dropped, and votes involving eliminated players are discarded. A missing
    /// last-update marker makes the next scheduler pass announce progress.
    pub fn restore(
        row: &GameRow,
        votes: impl IntoIterator<Item = VoteRow>,
        eliminated: impl IntoIterator<Item = EliminationRow>,
    ) -> Self {
        let eliminated: BTreeSet<PlayerId> =
            eliminated.into_iter().map(|row| row.player_id).collect();
        let votes: VoteMap = votes
            .into_iter()
            .filter(|vote| {
                !eliminated.contains(&vote.voter_id) && !eliminated.contains(&vote.target_id)
            })
            .map(|vote| (vote.voter_id, vote.target_id))
            .collect();
        let hammer = match (row.hammer_active, row.hammer_end_ms) {
            (true, Some(end)) => Some(HammerTimer {
                ends_at: from_unix_millis(end),
                last_announced_at: row
                    .last_update_ms
                    .map(from_unix_millis)
                    .unwrap_or(SystemTime::UNIX_EPOCH),
            }),
            _ => None,
        };

        Self {
            votes,
            eliminated,
            hammer,
            active: row.active,
            destination: row.destination_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3_600);

    fn p(id: u64) -> PlayerId {
        PlayerId(id)
    }

    fn roster(ids: &[u64]) -> BTreeSet<PlayerId> {
        ids.iter().copied().map(PlayerId).collect()
    }

    fn started(ids: &[u64]) -> GameState {
        let mut game = GameState::new();
        game.activate(&roster(ids), ChannelId(77)).unwrap();
        game
    }

    fn t0() -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000)
    }

    #[test]
    fn activation_requires_three_players() {
        let mut game = GameState::new();
        let err = game.activate(&roster(&[1, 2]), ChannelId(1)).unwrap_err();
        assert_eq!(
            err,
            GameError::InsufficientPlayers {
                found: 2,
                required: 3
            }
        );
        assert!(!game.is_active());
        assert_eq!(game.destination(), None);
    }

    #[test]
    fn activation_clears_previous_game() {
        let mut game = started(&[1, 2, 3, 4]);
        game.cast_vote(p(1), p(2));
        game.eliminate(p(4)).unwrap();
        game.start_hammer(ChannelId(5), t0(), HOUR);

        game.activate(&roster(&[1, 2, 3]), ChannelId(9)).unwrap();
        assert!(game.is_active());
        assert!(game.votes().is_empty());
        assert!(game.eliminated().is_empty());
        assert!(game.hammer().is_none());
        assert_eq!(game.destination(), Some(ChannelId(9)));
    }

    #[test]
    fn latest_vote_wins() {
        let mut game = started(&[1, 2, 3]);
        assert_eq!(game.cast_vote(p(1), p(2)), None);
        assert_eq!(game.cast_vote(p(1), p(3)), Some(p(2)));
        game.cast_vote(p(2), p(3));
        assert!(game.remove_vote(p(2)));
        assert!(!game.remove_vote(p(2)));

        assert_eq!(game.votes().len(), 1);
        assert_eq!(game.votes().get(&p(1)), Some(&p(3)));
    }

    #[test]
    fn elimination_purges_votes_in_both_directions() {
        let mut game = started(&[1, 2, 3]);
        game.cast_vote(p(1), p(2));
        game.cast_vote(p(2), p(3));

        let purged = game.eliminate(p(2)).unwrap();
        assert_eq!(purged, vec![p(1), p(2)]);
        assert!(game.votes().is_empty());
        assert_eq!(game.eliminated(), &roster(&[2]));
    }

    #[test]
    fn elimination_is_idempotent() {
        let mut game = started(&[1, 2, 3, 4]);
        game.cast_vote(p(1), p(2));
        game.cast_vote(p(3), p(4));
        game.eliminate(p(2)).unwrap();
        let after_first = game.clone();

        assert_eq!(game.eliminate(p(2)), Err(GameError::AlreadyEliminated(p(2))));
        assert_eq!(game, after_first);
    }

    #[test]
    fn majority_scenario_keeps_target_alive_until_resolution() {
        let mut game = started(&[1, 2, 3]);
        game.cast_vote(p(1), p(2));
        game.cast_vote(p(3), p(2));

        assert_eq!(game.majority_threshold(3), 2);
        assert_eq!(game.check_majority(3), Some(p(2)));

        game.start_hammer(ChannelId(77), t0(), 24 * HOUR);
        assert!(!game.is_eliminated(p(2)));
        assert!(!game.is_expired(t0()));
    }

    #[test]
    fn hammer_expiry_is_inclusive_of_end() {
        let mut game = started(&[1, 2, 3]);
        assert_eq!(game.time_remaining(t0()), None);
        assert!(!game.is_expired(t0()));

        game.start_hammer(ChannelId(1), t0(), HOUR);
        assert_eq!(game.time_remaining(t0()), Some(HOUR));
        assert!(!game.is_expired(t0() + HOUR - Duration::from_secs(1)));
        assert!(game.is_expired(t0() + HOUR));
        assert_eq!(game.time_remaining(t0() + 2 * HOUR), Some(Duration::ZERO));
        assert!(game.hammer().is_some(), "expiry alone does not resolve the hammer");
    }

    #[test]
    fn restarting_hammer_resets_window() {
        let mut game = started(&[1, 2, 3]);
        game.start_hammer(ChannelId(1), t0(), HOUR);
        game.start_hammer(ChannelId(2), t0() + HOUR / 2, HOUR);

        let hammer = game.hammer().copied().unwrap();
        assert_eq!(hammer.ends_at, t0() + HOUR + HOUR / 2);
        assert_eq!(hammer.last_announced_at, t0() + HOUR / 2);
        assert_eq!(game.destination(), Some(ChannelId(2)));
    }

    #[test]
    fn reset_votes_only_keeps_eliminations_and_activity() {
        let mut game = started(&[1, 2, 3, 4]);
        game.eliminate(p(4)).unwrap();
        game.cast_vote(p(1), p(2));
        game.start_hammer(ChannelId(1), t0(), HOUR);

        game.reset_votes_only();
        assert!(game.hammer().is_none());
        assert!(game.tally().is_empty());
        assert_eq!(game.eliminated(), &roster(&[4]));
        assert!(game.is_active());
    }

    #[test]
    fn reset_full_returns_to_inactive() {
        let mut game = started(&[1, 2, 3]);
        game.eliminate(p(3)).unwrap();
        game.reset_full();
        assert_eq!(game, GameState::new());
        assert_eq!(game.ensure_active(), Err(GameError::GameNotActive));
    }

    #[test]
    fn active_players_exclude_eliminated() {
        let mut game = started(&[1, 2, 3, 4]);
        game.eliminate(p(3)).unwrap();
        assert_eq!(game.active_players(&roster(&[1, 2, 3, 4])), vec![p(1), p(2), p(4)]);
    }

    #[test]
    fn rows_round_trip_through_restore() {
        let community = CommunityId(42);
        let mut game = started(&[1, 2, 3, 4]);
        game.cast_vote(p(1), p(2));
        game.eliminate(p(4)).unwrap();
        game.start_hammer(ChannelId(77), t0(), HOUR);

        let (row, votes, eliminated) = game.to_rows(community);
        assert_eq!(GameState::restore(&row, votes, eliminated), game);
    }

    #[test]
    fn restore_tolerates_inconsistent_rows() {
        let community = CommunityId(1);
        let row = GameRow {
            community_id: community,
            destination_id: None,
            active: true,
            hammer_active: true,
            hammer_end_ms: None,
            last_update_ms: None,
        };
        let votes = vec![
            VoteRow {
                community_id: community,
                voter_id: p(1),
                target_id: p(2),
            },
            VoteRow {
                community_id: community,
                voter_id: p(3),
                target_id: p(1),
            },
        ];
        let eliminated = vec![EliminationRow {
            community_id: community,
            player_id: p(2),
        }];

        let game = GameState::restore(&row, votes, eliminated);
        assert!(game.hammer().is_none());
        assert_eq!(game.votes().len(), 1);
        assert_eq!(game.votes().get(&p(3)), Some(&p(1)));
    }
}

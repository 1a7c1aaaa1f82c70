use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::state::game::{ChannelId, CommunityId, GameState, PlayerId};

/// Row of the `games` relation: per-community metadata and hammer timer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameRow {
    /// Primary key.
    pub community_id: CommunityId,
    /// Where automated messages are posted.
    pub destination_id: Option<ChannelId>,
    /// Whether a game has been started.
    pub active: bool,
    /// Whether a hammer countdown is running.
    pub hammer_active: bool,
    /// Countdown end (Unix milliseconds).
    pub hammer_end_ms: Option<i64>,
    /// Last progress announcement (Unix milliseconds).
    pub last_update_ms: Option<i64>,
}

/// Row of the `votes` relation, keyed by (community, voter).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VoteRow {
    /// Owning community.
    pub community_id: CommunityId,
    /// Player casting the vote.
    pub voter_id: PlayerId,
    /// Player voted against.
    pub target_id: PlayerId,
}

/// Row of the `eliminated` relation, keyed by (community, player).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EliminationRow {
    /// Owning community.
    pub community_id: CommunityId,
    /// Eliminated player.
    pub player_id: PlayerId,
}

/// Everything a store holds, as returned by a recovery load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredGames {
    /// `games` relation.
    pub games: Vec<GameRow>,
    /// `votes` relation.
    pub votes: Vec<VoteRow>,
    /// `eliminated` relation.
    pub eliminated: Vec<EliminationRow>,
}

impl StoredGames {
    /// Rebuild one [`GameState`] per stored game. Orphan vote or elimination
    /// rows (no matching game row) are ignored.
    pub fn into_states(self) -> Vec<(CommunityId, GameState)> {
        let mut votes: HashMap<CommunityId, Vec<VoteRow>> = HashMap::new();
        for vote in self.votes {
            votes.entry(vote.community_id).or_default().push(vote);
        }
        let mut eliminated: HashMap<CommunityId, Vec<EliminationRow>> = HashMap::new();
        for row in self.eliminated {
            eliminated.entry(row.community_id).or_default().push(row);
        }

        self.games
            .into_iter()
            .map(|game| {
                let community = game.community_id;
                let state = GameState::restore(
                    &game,
                    votes.remove(&community).unwrap_or_default(),
                    eliminated.remove(&community).unwrap_or_default(),
                );
                (community, state)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orphan_rows_are_ignored() {
        let stored = StoredGames {
            games: vec![GameRow {
                community_id: CommunityId(1),
                destination_id: Some(ChannelId(3)),
                active: true,
                hammer_active: false,
                hammer_end_ms: None,
                last_update_ms: None,
            }],
            votes: vec![
                VoteRow {
                    community_id: CommunityId(1),
                    voter_id: PlayerId(10),
                    target_id: PlayerId(11),
                },
                VoteRow {
                    community_id: CommunityId(2),
                    voter_id: PlayerId(20),
                    target_id: PlayerId(21),
                },
            ],
            eliminated: vec![EliminationRow {
                community_id: CommunityId(2),
                player_id: PlayerId(22),
            }],
        };

        let states = stored.into_states();
        assert_eq!(states.len(), 1);
        let (community, game) = &states[0];
        assert_eq!(*community, CommunityId(1));
        assert!(game.is_active());
        assert_eq!(game.votes().len(), 1);
        assert!(game.eliminated().is_empty());
    }
}

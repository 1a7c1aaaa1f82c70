use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{Arc, Mutex},
};

use futures::future::BoxFuture;

use crate::{
    dao::{
        game_store::GameStore,
        models::{EliminationRow, GameRow, StoredGames, VoteRow},
        storage::StorageResult,
    },
    state::game::{CommunityId, PlayerId},
};

#[derive(Debug, Default)]
struct Tables {
    games: BTreeMap<CommunityId, GameRow>,
    votes: BTreeMap<(CommunityId, PlayerId), PlayerId>,
    eliminated: BTreeSet<(CommunityId, PlayerId)>,
}

/// Process-local store. Survives nothing, but keeps the persistence path
/// exercised when no database is configured.
#[derive(Debug, Clone, Default)]
pub struct MemoryGameStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryGameStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn with_tables<T>(&self, op: impl FnOnce(&mut Tables) -> T) -> T {
        let mut guard = self
            .tables
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        op(&mut guard)
    }
}

impl GameStore for MemoryGameStore {
    fn save_vote(&self, vote: VoteRow) -> BoxFuture<'static, StorageResult<()>> {
        self.with_tables(|tables| {
            tables
                .votes
                .insert((vote.community_id, vote.voter_id), vote.target_id);
        });
        Box::pin(async { Ok(()) })
    }

    fn remove_vote(
        &self,
        community: CommunityId,
        voter: PlayerId,
    ) -> BoxFuture<'static, StorageResult<()>> {
        self.with_tables(|tables| {
            tables.votes.remove(&(community, voter));
        });
        Box::pin(async { Ok(()) })
    }

    fn save_elimination(
        &self,
        community: CommunityId,
        player: PlayerId,
    ) -> BoxFuture<'static, StorageResult<()>> {
        self.with_tables(|tables| {
            tables.eliminated.insert((community, player));
            tables.votes.retain(|(c, voter), target| {
                *c != community || (*voter != player && *target != player)
            });
        });
        Box::pin(async { Ok(()) })
    }

    fn save_game_meta(&self, game: GameRow) -> BoxFuture<'static, StorageResult<()>> {
        self.with_tables(|tables| {
            tables.games.insert(game.community_id, game);
        });
        Box::pin(async { Ok(()) })
    }

    fn clear_game(&self, community: CommunityId) -> BoxFuture<'static, StorageResult<()>> {
        self.with_tables(|tables| {
            tables.games.remove(&community);
            tables.votes.retain(|(c, _), _| *c != community);
            tables.eliminated.retain(|(c, _)| *c != community);
        });
        Box::pin(async { Ok(()) })
    }

    fn load_all(&self) -> BoxFuture<'static, StorageResult<StoredGames>> {
        let stored = self.with_tables(|tables| StoredGames {
            games: tables.games.values().cloned().collect(),
            votes: tables
                .votes
                .iter()
                .map(|((community_id, voter_id), target_id)| VoteRow {
                    community_id: *community_id,
                    voter_id: *voter_id,
                    target_id: *target_id,
                })
                .collect(),
            eliminated: tables
                .eliminated
                .iter()
                .map(|(community_id, player_id)| EliminationRow {
                    community_id: *community_id,
                    player_id: *player_id,
                })
                .collect(),
        });
        Box::pin(async move { Ok(stored) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn elimination_cascade_matches_in_memory_rules() {
        let store = MemoryGameStore::new();
        let community = CommunityId(1);
        for (voter, target) in [(1, 2), (2, 3), (3, 2), (4, 1)] {
            store
                .save_vote(VoteRow {
                    community_id: community,
                    voter_id: PlayerId(voter),
                    target_id: PlayerId(target),
                })
                .await
                .unwrap();
        }

        store.save_elimination(community, PlayerId(2)).await.unwrap();

        let stored = store.load_all().await.unwrap();
        let voters: Vec<u64> = stored.votes.iter().map(|v| v.voter_id.0).collect();
        assert_eq!(voters, vec![4]);
        assert_eq!(stored.eliminated.len(), 1);
    }

    #[tokio::test]
    async fn clear_game_drops_every_relation() {
        let store = MemoryGameStore::new();
        let community = CommunityId(3);
        store
            .save_game_meta(GameRow {
                community_id: community,
                destination_id: None,
                active: true,
                hammer_active: false,
                hammer_end_ms: None,
                last_update_ms: None,
            })
            .await
            .unwrap();
        store.save_elimination(community, PlayerId(5)).await.unwrap();

        store.clear_game(community).await.unwrap();
        assert_eq!(store.load_all().await.unwrap(), StoredGames::default());
    }
}

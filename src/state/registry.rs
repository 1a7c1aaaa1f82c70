use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::state::game::{CommunityId, GameState};

/// Shared handle to one community's game. Every mutation goes through its lock.
pub type GameHandle = Arc<Mutex<GameState>>;

/// Owner of the community → game mapping.
///
/// Handles are shared, so a mutation made by a command is visible to the
/// scheduler without re-fetching. Locks are per game: two communities never
/// contend with each other.
#[derive(Clone, Default)]
pub struct GameRegistry {
    games: Arc<DashMap<CommunityId, GameHandle>>,
}

impl GameRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for `community`, creating an inactive game on first access.
    pub fn get_or_create(&self, community: CommunityId) -> GameHandle {
        self.games
            .entry(community)
            .or_insert_with(|| Arc::new(Mutex::new(GameState::new())))
            .clone()
    }

    /// Handle for `community` when a game was already referenced.
    pub fn get(&self, community: CommunityId) -> Option<GameHandle> {
        self.games.get(&community).map(|entry| entry.value().clone())
    }

    /// Swap the community's state in place so existing handles observe it.
    pub async fn replace(&self, community: CommunityId, state: GameState) {
        let handle = self.get_or_create(community);
        let mut guard = handle.lock().await;
        *guard = state;
    }

    /// Install a recovered state, replacing any handle for the community.
    pub fn insert(&self, community: CommunityId, state: GameState) {
        self.games.insert(community, Arc::new(Mutex::new(state)));
    }

    /// Forget a community entirely.
    pub fn remove(&self, community: CommunityId) -> Option<GameHandle> {
        self.games.remove(&community).map(|(_, handle)| handle)
    }

    /// Snapshot of every handle ordered by community id.
    ///
    /// The map shards are released before returning, so callers can lock each
    /// game in turn while commands keep running.
    pub fn all(&self) -> Vec<(CommunityId, GameHandle)> {
        let mut games: Vec<(CommunityId, GameHandle)> = self
            .games
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        games.sort_by_key(|(community, _)| *community);
        games
    }

    /// Number of known communities.
    pub fn len(&self) -> usize {
        self.games.len()
    }

    /// Whether no community has been referenced yet.
    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::state::game::{ChannelId, PlayerId};

    fn players() -> BTreeSet<PlayerId> {
        [1, 2, 3].into_iter().map(PlayerId).collect()
    }

    #[tokio::test]
    async fn handles_share_state() {
        let registry = GameRegistry::new();
        let first = registry.get_or_create(CommunityId(1));
        first
            .lock()
            .await
            .activate(&players(), ChannelId(10))
            .unwrap();

        let second = registry.get_or_create(CommunityId(1));
        assert!(second.lock().await.is_active());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn replace_is_visible_through_existing_handles() {
        let registry = GameRegistry::new();
        let handle = registry.get_or_create(CommunityId(5));
        handle
            .lock()
            .await
            .activate(&players(), ChannelId(10))
            .unwrap();

        registry.replace(CommunityId(5), GameState::new()).await;
        assert!(!handle.lock().await.is_active());
    }

    #[tokio::test]
    async fn all_is_ordered_and_independent_of_later_inserts() {
        let registry = GameRegistry::new();
        for id in [30, 10, 20] {
            registry.get_or_create(CommunityId(id));
        }

        let snapshot = registry.all();
        registry.get_or_create(CommunityId(40));

        let ids: Vec<u64> = snapshot.iter().map(|(community, _)| community.0).collect();
        assert_eq!(ids, vec![10, 20, 30]);
        assert_eq!(registry.len(), 4);
    }

    #[tokio::test]
    async fn different_communities_lock_independently() {
        let registry = GameRegistry::new();
        let first = registry.get_or_create(CommunityId(1));
        let second = registry.get_or_create(CommunityId(2));

        let _held = first.lock().await;
        assert!(second.try_lock().is_ok());
        assert!(registry.get_or_create(CommunityId(1)).try_lock().is_err());
    }

    #[test]
    fn remove_forgets_community() {
        let registry = GameRegistry::new();
        registry.get_or_create(CommunityId(1));
        assert!(registry.remove(CommunityId(1)).is_some());
        assert!(registry.get(CommunityId(1)).is_none());
        assert!(registry.is_empty());
    }
}

//! Ordered write-behind between the in-memory games and the durable store.
//!
//! Mutations push [`PersistOp`]s while still holding the game's lock, so the
//! queue order matches the mutation order of every community. A single writer
//! task drains the queue and performs the I/O.

use std::{collections::HashSet, sync::Arc};

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::{
    dao::{
        game_store::GameStore,
        models::{GameRow, VoteRow},
        storage::StorageResult,
    },
    state::{
        SharedState,
        game::{CommunityId, GameState, PlayerId},
    },
};

/// One durable write mirroring an in-memory transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistOp {
    /// Upsert a vote.
    SaveVote(VoteRow),
    /// Delete a vote.
    RemoveVote {
        /// Owning community.
        community: CommunityId,
        /// Voter whose vote is removed.
        voter: PlayerId,
    },
    /// Record an elimination (the store purges related votes).
    SaveElimination {
        /// Owning community.
        community: CommunityId,
        /// Eliminated player.
        player: PlayerId,
    },
    /// Upsert the game metadata row.
    SaveGameMeta(GameRow),
    /// Delete every row of the community.
    ClearGame(CommunityId),
}

impl PersistOp {
    /// Community the write belongs to.
    pub fn community(&self) -> CommunityId {
        match self {
            PersistOp::SaveVote(vote) => vote.community_id,
            PersistOp::RemoveVote { community, .. }
            | PersistOp::SaveElimination { community, .. }
            | PersistOp::ClearGame(community) => *community,
            PersistOp::SaveGameMeta(game) => game.community_id,
        }
    }

    /// Operations rewriting the stored copy of `game` from scratch.
    pub fn snapshot(community: CommunityId, game: &GameState) -> Vec<PersistOp> {
        let (meta, votes, eliminated) = game.to_rows(community);
        let mut ops = Vec::with_capacity(2 + votes.len() + eliminated.len());
        ops.push(PersistOp::ClearGame(community));
        ops.push(PersistOp::SaveGameMeta(meta));
        ops.extend(eliminated.into_iter().map(|row| PersistOp::SaveElimination {
            community,
            player: row.player_id,
        }));
        ops.extend(votes.into_iter().map(PersistOp::SaveVote));
        ops
    }

    /// Perform the write against `store`.
    pub async fn apply(self, store: &dyn GameStore) -> StorageResult<()> {
        match self {
            PersistOp::SaveVote(vote) => store.save_vote(vote).await,
            PersistOp::RemoveVote { community, voter } => {
                store.remove_vote(community, voter).await
            }
            PersistOp::SaveElimination { community, player } => {
                store.save_elimination(community, player).await
            }
            PersistOp::SaveGameMeta(game) => store.save_game_meta(game).await,
            PersistOp::ClearGame(community) => store.clear_game(community).await,
        }
    }
}

/// Sending half of the write queue. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct PersistenceQueue {
    sender: mpsc::UnboundedSender<PersistOp>,
}

impl PersistenceQueue {
    /// New queue and the receiver the writer task drains.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PersistOp>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Enqueue a write. Never blocks, so it is safe under a game lock.
    pub fn push(&self, op: PersistOp) {
        if let Err(err) = self.sender.send(op) {
            warn!(
                community = %err.0.community(),
                "persistence writer stopped; dropping write"
            );
        }
    }

    /// Enqueue several writes in order.
    pub fn extend(&self, ops: impl IntoIterator<Item = PersistOp>) {
        for op in ops {
            self.push(op);
        }
    }
}

/// Drain the queue into whichever store is installed until shutdown.
///
/// Writes arriving while no store is connected are dropped; the reconcile pass
/// run on (re)connection rewrites the full snapshot.
pub async fn run_writer(
    state: SharedState,
    mut receiver: mpsc::UnboundedReceiver<PersistOp>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            maybe_op = receiver.recv() => {
                let Some(op) = maybe_op else { break };
                write(&state, op).await;
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    receiver.close();
    while let Ok(op) = receiver.try_recv() {
        write(&state, op).await;
    }
    info!("persistence writer stopped");
}

async fn write(state: &SharedState, op: PersistOp) {
    let Some(store) = state.game_store().await else {
        debug!(community = %op.community(), "no storage connected; write skipped");
        return;
    };
    let community = op.community();
    if let Err(err) = op.apply(store.as_ref()).await {
        warn!(%community, error = %err, "failed to persist game change");
    }
}

/// What [`reconcile`] did with a freshly connected store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Stored games loaded into the registry.
    pub restored: usize,
    /// In-memory games queued for rewrite into the store.
    pub resynced: usize,
}

/// Align a newly connected store with the in-memory registry.
///
/// The first successful call loads every stored game whose in-memory entry is
/// missing or was never touched, even if commands already created entries for
/// other communities. From then on memory is authoritative: every game not
/// just restored is re-queued as a full snapshot, ordered with concurrent
/// mutations through the game locks.
pub async fn reconcile(
    state: &SharedState,
    store: &Arc<dyn GameStore>,
) -> StorageResult<ReconcileOutcome> {
    let registry = state.games();
    let mut outcome = ReconcileOutcome::default();
    let mut restored = HashSet::new();

    if !state.is_hydrated() {
        let stored = store.load_all().await?;
        for (community, recovered) in stored.into_states() {
            let handle = registry.get_or_create(community);
            let mut game = handle.lock().await;
            if *game == GameState::new() {
                *game = recovered;
                restored.insert(community);
            } else {
                debug!(%community, "game changed before storage connected; keeping memory");
            }
        }
        state.mark_hydrated();
        outcome.restored = restored.len();
    }

    for (community, handle) in registry.all() {
        if restored.contains(&community) {
            continue;
        }
        let game = handle.lock().await;
        state.persistence().extend(PersistOp::snapshot(community, &game));
        outcome.resynced += 1;
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::game_store::memory::MemoryGameStore,
        state::{
            AppState,
            game::{ChannelId, PlayerId},
        },
    };

    fn started_game() -> GameState {
        let roster: BTreeSet<PlayerId> = [1, 2, 3].into_iter().map(PlayerId).collect();
        let mut game = GameState::new();
        game.activate(&roster, ChannelId(8)).unwrap();
        game.eliminate(PlayerId(3)).unwrap();
        game.cast_vote(PlayerId(1), PlayerId(2));
        game
    }

    #[test]
    fn snapshot_clears_before_rewriting() {
        let ops = PersistOp::snapshot(CommunityId(5), &started_game());
        assert_eq!(ops[0], PersistOp::ClearGame(CommunityId(5)));
        assert!(matches!(ops[1], PersistOp::SaveGameMeta(_)));
        assert_eq!(
            ops[2],
            PersistOp::SaveElimination {
                community: CommunityId(5),
                player: PlayerId(3)
            }
        );
        assert!(matches!(ops[3], PersistOp::SaveVote(_)));
        assert_eq!(ops.len(), 4);
    }

    #[tokio::test]
    async fn queue_preserves_push_order() {
        let (queue, mut receiver) = PersistenceQueue::new();
        queue.push(PersistOp::ClearGame(CommunityId(1)));
        queue.push(PersistOp::RemoveVote {
            community: CommunityId(1),
            voter: PlayerId(4),
        });

        assert_eq!(
            receiver.recv().await,
            Some(PersistOp::ClearGame(CommunityId(1)))
        );
        assert!(matches!(
            receiver.recv().await,
            Some(PersistOp::RemoveVote { .. })
        ));
    }

    async fn seeded_store(community: CommunityId) -> Arc<dyn GameStore> {
        let store = MemoryGameStore::new();
        for op in PersistOp::snapshot(community, &started_game()) {
            op.apply(&store).await.unwrap();
        }
        Arc::new(store)
    }

    #[tokio::test]
    async fn empty_registry_is_hydrated_from_store() {
        let store = seeded_store(CommunityId(9)).await;
        let state = AppState::new(AppConfig::default());
        let outcome = reconcile(&state, &store).await.unwrap();

        assert_eq!(
            outcome,
            ReconcileOutcome {
                restored: 1,
                resynced: 0
            }
        );
        assert!(state.is_hydrated());
        let handle = state.games().get(CommunityId(9)).unwrap();
        assert_eq!(*handle.lock().await, started_game());
    }

    #[tokio::test]
    async fn early_commands_do_not_block_recovery() {
        let store = seeded_store(CommunityId(9)).await;
        let state = AppState::new(AppConfig::default());
        let untouched = state.games().get_or_create(CommunityId(9));
        state.games().get_or_create(CommunityId(1));
        let mut receiver = state.take_persistence_receiver().unwrap();

        let outcome = reconcile(&state, &store).await.unwrap();

        assert_eq!(
            outcome,
            ReconcileOutcome {
                restored: 1,
                resynced: 1
            }
        );
        assert_eq!(*untouched.lock().await, started_game());
        let mut communities = BTreeSet::new();
        while let Ok(op) = receiver.try_recv() {
            communities.insert(op.community());
        }
        assert_eq!(communities, BTreeSet::from([CommunityId(1)]));
    }

    #[tokio::test]
    async fn memory_wins_once_hydrated() {
        let store = seeded_store(CommunityId(9)).await;
        let state = AppState::new(AppConfig::default());
        reconcile(&state, &store).await.unwrap();

        state.games().remove(CommunityId(9));
        state.games().insert(CommunityId(2), started_game());
        let outcome = reconcile(&state, &store).await.unwrap();

        assert_eq!(
            outcome,
            ReconcileOutcome {
                restored: 0,
                resynced: 1
            }
        );
        assert!(state.games().get(CommunityId(9)).is_none());
    }

    #[tokio::test]
    async fn populated_registry_is_written_back() {
        let state = AppState::new(AppConfig::default());
        state.mark_hydrated();
        state.games().insert(CommunityId(2), started_game());
        let mut receiver = state.take_persistence_receiver().unwrap();

        let store: Arc<dyn GameStore> = Arc::new(MemoryGameStore::new());
        let outcome = reconcile(&state, &store).await.unwrap();
        assert_eq!(outcome.resynced, 1);

        let memory = MemoryGameStore::new();
        while let Ok(op) = receiver.try_recv() {
            op.apply(&memory).await.unwrap();
        }
        let restored = memory.load_all().await.unwrap().into_states();
        assert_eq!(restored, vec![(CommunityId(2), started_game())]);
    }
}

#[cfg(feature = "couch-store")]
pub mod couchdb;
pub mod memory;
#[cfg(feature = "sqlite-store")]
pub mod sqlite;

use std::sync::Arc;

use futures::future::BoxFuture;

use crate::config::{AppConfig, StoreKind};
use crate::dao::{
    models::{GameRow, StoredGames, VoteRow},
    storage::StorageResult,
};
use crate::state::game::{CommunityId, PlayerId};

/// Durable mirror of the in-memory games, used for crash recovery.
///
/// Writes are best effort: the running process treats its in-memory state as
/// authoritative and only reads the store back at startup or reconnection.
pub trait GameStore: Send + Sync {
    /// Upsert the vote of `vote.voter_id`.
    fn save_vote(&self, vote: VoteRow) -> BoxFuture<'static, StorageResult<()>>;
    /// Delete the vote of `voter`, if any.
    fn remove_vote(
        &self,
        community: CommunityId,
        voter: PlayerId,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Record an elimination and delete every vote cast by or against the player.
    fn save_elimination(
        &self,
        community: CommunityId,
        player: PlayerId,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Upsert the metadata row of a game.
    fn save_game_meta(&self, game: GameRow) -> BoxFuture<'static, StorageResult<()>>;
    /// Delete the game row together with its votes and eliminations.
    fn clear_game(&self, community: CommunityId) -> BoxFuture<'static, StorageResult<()>>;
    /// Read back every stored relation.
    fn load_all(&self) -> BoxFuture<'static, StorageResult<StoredGames>>;
    /// Cheap liveness probe.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Re-establish the backend connection after a failed health check.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}

/// Open the backend selected by `config.store`.
pub async fn connect(config: &AppConfig) -> StorageResult<Arc<dyn GameStore>> {
    match config.store {
        StoreKind::Memory => Ok(Arc::new(memory::MemoryGameStore::new())),
        #[cfg(feature = "sqlite-store")]
        StoreKind::Sqlite => {
            let store = sqlite::SqliteGameStore::open(&config.sqlite_path).await?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "sqlite-store"))]
        StoreKind::Sqlite => Err(crate::dao::storage::StorageError::Disabled("sqlite")),
        #[cfg(feature = "couch-store")]
        StoreKind::Couchdb => {
            let couch_config = couchdb::CouchConfig::from_env()?;
            let store = couchdb::CouchGameStore::connect(couch_config).await?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "couch-store"))]
        StoreKind::Couchdb => Err(crate::dao::storage::StorageError::Disabled("couchdb")),
    }
}

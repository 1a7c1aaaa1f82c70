use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use futures::future::BoxFuture;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::info;

use crate::{
    dao::{
        game_store::GameStore,
        models::{EliminationRow, GameRow, StoredGames, VoteRow},
        storage::StorageResult,
    },
    state::game::{ChannelId, CommunityId, PlayerId},
};

use super::{
    error::{SqliteDaoError, SqliteResult},
    migrations::run_migrations,
};

/// SQLite backend with one table per relation (`games`, `votes`, `eliminated`).
///
/// Statements run on the blocking pool; the connection is shared behind a
/// mutex since `rusqlite::Connection` is not `Sync`.
#[derive(Clone)]
pub struct SqliteGameStore {
    conn: Arc<Mutex<Connection>>,
    path: Option<Arc<PathBuf>>,
}

impl SqliteGameStore {
    /// Open (or create) the database file and bring its schema up to date.
    pub async fn open(path: impl AsRef<Path>) -> SqliteResult<Self> {
        let path = path.as_ref().to_path_buf();
        let opened = path.clone();
        let conn = tokio::task::spawn_blocking(move || open_connection(&opened)).await??;
        info!(path = %path.display(), "SQLite store opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: Some(Arc::new(path)),
        })
    }

    /// Private in-memory database, mainly for tests.
    pub fn open_in_memory() -> SqliteResult<Self> {
        let conn = Connection::open_in_memory()?;
        run_migrations(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: None,
        })
    }

    async fn with_conn<T, F>(&self, op: F) -> SqliteResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> SqliteResult<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| SqliteDaoError::Poisoned)?;
            op(&mut guard)
        })
        .await?
    }
}

fn open_connection(path: &Path) -> SqliteResult<Connection> {
    let conn = Connection::open(path).map_err(|source| SqliteDaoError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    run_migrations(&conn)?;
    Ok(conn)
}

// Snowflake-style ids are stored bit-for-bit in SQLite's signed INTEGER.
fn to_sql(id: u64) -> i64 {
    id as i64
}

fn from_sql(value: i64) -> u64 {
    value as u64
}

fn upsert_game(conn: &Connection, game: &GameRow) -> SqliteResult<()> {
    conn.execute(
        "INSERT INTO games (community_id, destination_id, active, hammer_active, hammer_end_ms, last_update_ms)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(community_id) DO UPDATE SET
            destination_id = excluded.destination_id,
            active = excluded.active,
            hammer_active = excluded.hammer_active,
            hammer_end_ms = excluded.hammer_end_ms,
            last_update_ms = excluded.last_update_ms",
        params![
            to_sql(game.community_id.0),
            game.destination_id.map(|d| to_sql(d.0)),
            game.active,
            game.hammer_active,
            game.hammer_end_ms,
            game.last_update_ms,
        ],
    )?;
    Ok(())
}

fn load_rows(conn: &Connection) -> SqliteResult<StoredGames> {
    let mut stored = StoredGames::default();

    let mut stmt = conn.prepare(
        "SELECT community_id, destination_id, active, hammer_active, hammer_end_ms, last_update_ms
         FROM games ORDER BY community_id",
    )?;
    let games = stmt.query_map([], |row| {
        Ok(GameRow {
            community_id: CommunityId(from_sql(row.get(0)?)),
            destination_id: row.get::<_, Option<i64>>(1)?.map(|d| ChannelId(from_sql(d))),
            active: row.get(2)?,
            hammer_active: row.get(3)?,
            hammer_end_ms: row.get(4)?,
            last_update_ms: row.get(5)?,
        })
    })?;
    for game in games {
        stored.games.push(game?);
    }

    let mut stmt = conn.prepare(
        "SELECT community_id, voter_id, target_id FROM votes ORDER BY community_id, voter_id",
    )?;
    let votes = stmt.query_map([], |row| {
        Ok(VoteRow {
            community_id: CommunityId(from_sql(row.get(0)?)),
            voter_id: PlayerId(from_sql(row.get(1)?)),
            target_id: PlayerId(from_sql(row.get(2)?)),
        })
    })?;
    for vote in votes {
        stored.votes.push(vote?);
    }

    let mut stmt = conn.prepare(
        "SELECT community_id, player_id FROM eliminated ORDER BY community_id, player_id",
    )?;
    let eliminated = stmt.query_map([], |row| {
        Ok(EliminationRow {
            community_id: CommunityId(from_sql(row.get(0)?)),
            player_id: PlayerId(from_sql(row.get(1)?)),
        })
    })?;
    for row in eliminated {
        stored.eliminated.push(row?);
    }

    Ok(stored)
}

impl GameStore for SqliteGameStore {
    fn save_vote(&self, vote: VoteRow) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .with_conn(move |conn| {
                    conn.execute(
                        "INSERT OR REPLACE INTO votes (community_id, voter_id, target_id)
                         VALUES (?1, ?2, ?3)",
                        params![
                            to_sql(vote.community_id.0),
                            to_sql(vote.voter_id.0),
                            to_sql(vote.target_id.0)
                        ],
                    )?;
                    Ok(())
                })
                .await
                .map_err(Into::into)
        })
    }

    fn remove_vote(
        &self,
        community: CommunityId,
        voter: PlayerId,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .with_conn(move |conn| {
                    conn.execute(
                        "DELETE FROM votes WHERE community_id = ?1 AND voter_id = ?2",
                        params![to_sql(community.0), to_sql(voter.0)],
                    )?;
                    Ok(())
                })
                .await
                .map_err(Into::into)
        })
    }

    fn save_elimination(
        &self,
        community: CommunityId,
        player: PlayerId,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .with_conn(move |conn| {
                    let tx = conn.transaction()?;
                    tx.execute(
                        "INSERT OR IGNORE INTO eliminated (community_id, player_id) VALUES (?1, ?2)",
                        params![to_sql(community.0), to_sql(player.0)],
                    )?;
                    tx.execute(
                        "DELETE FROM votes
                         WHERE community_id = ?1 AND (voter_id = ?2 OR target_id = ?2)",
                        params![to_sql(community.0), to_sql(player.0)],
                    )?;
                    tx.commit()?;
                    Ok(())
                })
                .await
                .map_err(Into::into)
        })
    }

    fn save_game_meta(&self, game: GameRow) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .with_conn(move |conn| upsert_game(conn, &game))
                .await
                .map_err(Into::into)
        })
    }

    fn clear_game(&self, community: CommunityId) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .with_conn(move |conn| {
                    let tx = conn.transaction()?;
                    let id = to_sql(community.0);
                    tx.execute("DELETE FROM votes WHERE community_id = ?1", params![id])?;
                    tx.execute("DELETE FROM eliminated WHERE community_id = ?1", params![id])?;
                    tx.execute("DELETE FROM games WHERE community_id = ?1", params![id])?;
                    tx.commit()?;
                    Ok(())
                })
                .await
                .map_err(Into::into)
        })
    }

    fn load_all(&self) -> BoxFuture<'static, StorageResult<StoredGames>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .with_conn(|conn| load_rows(conn))
                .await
                .map_err(Into::into)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .with_conn(|conn| {
                    conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                        .optional()?;
                    Ok(())
                })
                .await
                .map_err(Into::into)
        })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let Some(path) = store.path.clone() else {
                return store
                    .with_conn(|conn| run_migrations(conn))
                    .await
                    .map_err(Into::into);
            };
            let fresh = tokio::task::spawn_blocking(move || open_connection(&path))
                .await
                .map_err(SqliteDaoError::from)??;
            let mut guard = store.conn.lock().map_err(|_| SqliteDaoError::Poisoned)?;
            *guard = fresh;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn game_row(community: u64) -> GameRow {
        GameRow {
            community_id: CommunityId(community),
            destination_id: Some(ChannelId(900)),
            active: true,
            hammer_active: true,
            hammer_end_ms: Some(1_700_000_000_000),
            last_update_ms: Some(1_699_999_000_000),
        }
    }

    fn vote(community: u64, voter: u64, target: u64) -> VoteRow {
        VoteRow {
            community_id: CommunityId(community),
            voter_id: PlayerId(voter),
            target_id: PlayerId(target),
        }
    }

    #[tokio::test]
    async fn meta_and_votes_round_trip() {
        let store = SqliteGameStore::open_in_memory().unwrap();
        store.save_game_meta(game_row(1)).await.unwrap();
        store.save_vote(vote(1, 10, 11)).await.unwrap();
        store.save_vote(vote(1, 12, 11)).await.unwrap();
        store.save_vote(vote(1, 10, 12)).await.unwrap();

        let stored = store.load_all().await.unwrap();
        assert_eq!(stored.games, vec![game_row(1)]);
        assert_eq!(stored.votes, vec![vote(1, 10, 12), vote(1, 12, 11)]);
        assert!(stored.eliminated.is_empty());
    }

    #[tokio::test]
    async fn elimination_purges_votes_by_and_against_player() {
        let store = SqliteGameStore::open_in_memory().unwrap();
        store.save_game_meta(game_row(1)).await.unwrap();
        store.save_vote(vote(1, 10, 11)).await.unwrap();
        store.save_vote(vote(1, 11, 12)).await.unwrap();
        store.save_vote(vote(1, 12, 10)).await.unwrap();
        store.save_vote(vote(2, 20, 11)).await.unwrap();

        store
            .save_elimination(CommunityId(1), PlayerId(11))
            .await
            .unwrap();

        let stored = store.load_all().await.unwrap();
        assert_eq!(stored.votes, vec![vote(1, 12, 10), vote(2, 20, 11)]);
        assert_eq!(stored.eliminated.len(), 1);
        assert_eq!(stored.eliminated[0].player_id, PlayerId(11));
    }

    #[tokio::test]
    async fn clear_game_only_touches_one_community() {
        let store = SqliteGameStore::open_in_memory().unwrap();
        for community in [1, 2] {
            store.save_game_meta(game_row(community)).await.unwrap();
            store.save_vote(vote(community, 1, 2)).await.unwrap();
            store
                .save_elimination(CommunityId(community), PlayerId(3))
                .await
                .unwrap();
        }

        store.clear_game(CommunityId(1)).await.unwrap();
        store.remove_vote(CommunityId(2), PlayerId(1)).await.unwrap();

        let stored = store.load_all().await.unwrap();
        assert_eq!(stored.games, vec![game_row(2)]);
        assert!(stored.votes.is_empty());
        assert_eq!(stored.eliminated.len(), 1);
        assert_eq!(stored.eliminated[0].community_id, CommunityId(2));
    }

    #[tokio::test]
    async fn large_ids_survive_storage() {
        let store = SqliteGameStore::open_in_memory().unwrap();
        let big = u64::MAX - 7;
        store.save_game_meta(game_row(big)).await.unwrap();
        store.save_vote(vote(big, big - 1, big - 2)).await.unwrap();

        let stored = store.load_all().await.unwrap();
        assert_eq!(stored.games[0].community_id, CommunityId(big));
        assert_eq!(stored.votes[0].target_id, PlayerId(big - 2));
    }

    #[tokio::test]
    async fn health_check_and_reconnect_in_memory() {
        let store = SqliteGameStore::open_in_memory().unwrap();
        store.health_check().await.unwrap();
        store.try_reconnect().await.unwrap();
        store.health_check().await.unwrap();
    }
}

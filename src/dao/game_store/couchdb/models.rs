use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    dao::{
        game_store::couchdb::error::CouchDaoError,
        models::{EliminationRow, GameRow, VoteRow},
    },
    state::game::{ChannelId, CommunityId, PlayerId},
};

pub const GAME_PREFIX: &str = "game::";
pub const END_SUFFIX: &str = "\u{ffff}";

#[derive(Debug, Deserialize)]
pub struct AllDocsResponse {
    pub rows: Vec<AllDocsRow>,
}

#[derive(Debug, Deserialize)]
pub struct AllDocsRow {
    #[allow(dead_code)]
    pub id: String,
    #[serde(default)]
    pub doc: Option<Value>,
}

/// One document per community, holding the three relations of its game.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchGameDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    /// Absent until the game metadata has been written at least once.
    #[serde(default)]
    pub meta: Option<MetaBody>,
    #[serde(default)]
    pub votes: Vec<VoteBody>,
    #[serde(default)]
    pub eliminated: Vec<PlayerId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaBody {
    pub destination_id: Option<ChannelId>,
    pub active: bool,
    pub hammer_active: bool,
    pub hammer_end_ms: Option<i64>,
    pub last_update_ms: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteBody {
    pub voter_id: PlayerId,
    pub target_id: PlayerId,
}

impl From<GameRow> for MetaBody {
    fn from(row: GameRow) -> Self {
        Self {
            destination_id: row.destination_id,
            active: row.active,
            hammer_active: row.hammer_active,
            hammer_end_ms: row.hammer_end_ms,
            last_update_ms: row.last_update_ms,
        }
    }
}

impl CouchGameDocument {
    pub fn empty(community: CommunityId) -> Self {
        Self {
            id: game_doc_id(community),
            rev: None,
            meta: None,
            votes: Vec::new(),
            eliminated: Vec::new(),
        }
    }

    pub fn upsert_vote(&mut self, voter: PlayerId, target: PlayerId) {
        self.remove_vote(voter);
        self.votes.push(VoteBody {
            voter_id: voter,
            target_id: target,
        });
    }

    pub fn remove_vote(&mut self, voter: PlayerId) {
        self.votes.retain(|vote| vote.voter_id != voter);
    }

    pub fn eliminate(&mut self, player: PlayerId) {
        if !self.eliminated.contains(&player) {
            self.eliminated.push(player);
        }
        self.votes
            .retain(|vote| vote.voter_id != player && vote.target_id != player);
    }

    /// Split the document back into relational rows.
    pub fn into_rows(
        self,
    ) -> Result<(Option<GameRow>, Vec<VoteRow>, Vec<EliminationRow>), CouchDaoError> {
        let community_id = extract_community(&self.id)?;
        let game = self.meta.map(|meta| GameRow {
            community_id,
            destination_id: meta.destination_id,
            active: meta.active,
            hammer_active: meta.hammer_active,
            hammer_end_ms: meta.hammer_end_ms,
            last_update_ms: meta.last_update_ms,
        });
        let votes = self
            .votes
            .into_iter()
            .map(|vote| VoteRow {
                community_id,
                voter_id: vote.voter_id,
                target_id: vote.target_id,
            })
            .collect();
        let eliminated = self
            .eliminated
            .into_iter()
            .map(|player_id| EliminationRow {
                community_id,
                player_id,
            })
            .collect();
        Ok((game, votes, eliminated))
    }
}

pub fn game_doc_id(community: CommunityId) -> String {
    format!("{}{}", GAME_PREFIX, community)
}

pub fn extract_community(doc_id: &str) -> Result<CommunityId, CouchDaoError> {
    let (_, id) = doc_id
        .split_once("::")
        .ok_or_else(|| CouchDaoError::InvalidDocId {
            doc_id: doc_id.to_string(),
            kind: "missing separator",
        })?;

    id.parse::<u64>()
        .map(CommunityId)
        .map_err(|_| CouchDaoError::InvalidDocId {
            doc_id: doc_id.to_string(),
            kind: "invalid community id",
        })
}

//! Role membership lookup, injected into the game services and the scheduler.

use std::collections::{BTreeMap, BTreeSet};

use dashmap::DashMap;

use crate::state::game::{CommunityId, PlayerId};

/// Answers "who holds the player role" for a community.
pub trait RoleMembership: Send + Sync {
    /// Non-bot members currently holding the player role.
    fn eligible_players(&self, community: CommunityId) -> BTreeSet<PlayerId>;

    /// Display name for a member, when known.
    fn display_name(&self, community: CommunityId, player: PlayerId) -> Option<String>;
}

/// A community member as reported by the chat bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterMember {
    /// Member identifier.
    pub id: PlayerId,
    /// Name shown in rendered messages.
    pub display_name: String,
    /// Bot accounts never count as players.
    pub bot: bool,
}

/// Snapshot of the player role for one community.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Roster {
    /// Name of the role identifying players.
    pub role_name: String,
    /// Members holding the role, keyed by id.
    pub members: BTreeMap<PlayerId, RosterMember>,
}

impl Roster {
    /// Members eligible to play (bots excluded).
    pub fn eligible(&self) -> BTreeSet<PlayerId> {
        self.members
            .values()
            .filter(|member| !member.bot)
            .map(|member| member.id)
            .collect()
    }
}

/// In-process roster store fed by the chat bridge.
#[derive(Debug, Default)]
pub struct RosterDirectory {
    rosters: DashMap<CommunityId, Roster>,
}

impl RosterDirectory {
    /// Empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the roster of `community`, returning it.
    pub fn replace(
        &self,
        community: CommunityId,
        role_name: String,
        members: impl IntoIterator<Item = RosterMember>,
    ) -> Roster {
        let roster = Roster {
            role_name,
            members: members
                .into_iter()
                .map(|member| (member.id, member))
                .collect(),
        };
        self.rosters.insert(community, roster.clone());
        roster
    }

    /// Roster of `community`, if the bridge reported one.
    pub fn get(&self, community: CommunityId) -> Option<Roster> {
        self.rosters.get(&community).map(|entry| entry.value().clone())
    }

    /// Drop the roster of `community`.
    pub fn remove(&self, community: CommunityId) {
        self.rosters.remove(&community);
    }
}

impl RoleMembership for RosterDirectory {
    fn eligible_players(&self, community: CommunityId) -> BTreeSet<PlayerId> {
        self.rosters
            .get(&community)
            .map(|roster| roster.eligible())
            .unwrap_or_default()
    }

    fn display_name(&self, community: CommunityId, player: PlayerId) -> Option<String> {
        self.rosters
            .get(&community)
            .and_then(|roster| roster.members.get(&player).map(|m| m.display_name.clone()))
    }
}

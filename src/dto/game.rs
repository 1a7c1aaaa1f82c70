use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    dto::{format_system_time, validation::validate_unique_members},
    state::{
        game::{ChannelId, CommunityId, HammerTimer, PlayerId},
        roster::{Roster, RosterMember},
        tally::Tally,
    },
};

/// Payload starting a game in a community.
#[derive(Debug, Deserialize, ToSchema)]
pub struct StartGameRequest {
    /// Channel where countdown announcements are posted.
    #[schema(value_type = u64)]
    pub destination_id: ChannelId,
}

/// Payload casting (or changing) a vote.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CastVoteRequest {
    /// Player casting the vote.
    #[schema(value_type = u64)]
    pub voter_id: PlayerId,
    /// Player voted against.
    #[schema(value_type = u64)]
    pub target_id: PlayerId,
    /// Channel used if this vote starts the hammer. Defaults to the game's destination.
    #[serde(default)]
    #[schema(value_type = Option<u64>)]
    pub destination_id: Option<ChannelId>,
}

/// Payload starting the hammer manually.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct StartHammerRequest {
    /// Channel for announcements. Defaults to the game's destination.
    #[serde(default)]
    #[schema(value_type = Option<u64>)]
    pub destination_id: Option<ChannelId>,
}

/// Payload eliminating a player.
#[derive(Debug, Deserialize, ToSchema)]
pub struct EliminateRequest {
    /// Player to remove from the game.
    #[schema(value_type = u64)]
    pub player_id: PlayerId,
}

/// Roster pushed by the chat bridge.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct RosterRequest {
    /// Name of the role identifying players.
    #[validate(length(min = 1, max = 100))]
    pub role_name: String,
    /// Members currently holding the role.
    #[validate(nested, custom(function = "validate_unique_members"))]
    pub members: Vec<RosterMemberInput>,
}

/// One member entry of a [`RosterRequest`].
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
pub struct RosterMemberInput {
    /// Member identifier.
    #[schema(value_type = u64)]
    pub id: PlayerId,
    /// Name used in rendered messages.
    #[validate(length(min = 1, max = 100))]
    pub display_name: String,
    /// Bot accounts never count as players.
    #[serde(default)]
    pub bot: bool,
}

impl From<RosterMemberInput> for RosterMember {
    fn from(value: RosterMemberInput) -> Self {
        Self {
            id: value.id,
            display_name: value.display_name,
            bot: value.bot,
        }
    }
}

/// Roster as currently known for a community.
#[derive(Debug, Serialize, ToSchema)]
pub struct RosterResponse {
    /// Community the roster belongs to.
    #[schema(value_type = u64)]
    pub community_id: CommunityId,
    /// Name of the role identifying players.
    pub role_name: String,
    /// Members holding the role.
    pub members: Vec<PlayerSummary>,
    /// Members eligible to play (bots excluded).
    pub eligible_count: usize,
}

impl RosterResponse {
    /// Project a roster for the API.
    pub fn from_roster(community_id: CommunityId, roster: &Roster) -> Self {
        Self {
            community_id,
            role_name: roster.role_name.clone(),
            members: roster
                .members
                .values()
                .map(|member| PlayerSummary {
                    id: member.id,
                    display_name: member.display_name.clone(),
                })
                .collect(),
            eligible_count: roster.eligible().len(),
        }
    }
}

/// A player with the name shown in chat.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PlayerSummary {
    /// Player id.
    #[schema(value_type = u64)]
    pub id: PlayerId,
    /// Display name, `Unknown (<id>)` when the roster lacks it.
    pub display_name: String,
}

/// Votes gathered by one target.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TallyEntry {
    /// Player voted against.
    #[schema(value_type = u64)]
    pub target_id: PlayerId,
    /// Number of votes.
    pub count: usize,
    /// Voters, ascending by id.
    #[schema(value_type = Vec<u64>)]
    pub voter_ids: Vec<PlayerId>,
}

/// Convert a tally into its ordered API entries.
pub fn tally_entries(tally: &Tally) -> Vec<TallyEntry> {
    tally
        .iter()
        .map(|(target, voters)| TallyEntry {
            target_id: *target,
            count: voters.len(),
            voter_ids: voters.clone(),
        })
        .collect()
}

/// Current tally with the majority context.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TallyResponse {
    /// Votes needed to start the hammer.
    pub threshold: usize,
    /// Players still in the game.
    pub active_count: usize,
    /// Targets by descending votes, ties by ascending id.
    pub entries: Vec<TallyEntry>,
    /// Active players nobody voted for.
    #[schema(value_type = Vec<u64>)]
    pub unvoted: Vec<PlayerId>,
}

/// Running countdown.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HammerSummary {
    /// Expiry timestamp (RFC 3339).
    pub ends_at: String,
    /// Whole seconds left.
    pub remaining_secs: u64,
    /// Last progress announcement (RFC 3339).
    pub last_announced_at: String,
}

impl HammerSummary {
    /// Describe `hammer` as seen at `now`.
    pub fn at(hammer: &HammerTimer, now: SystemTime) -> Self {
        Self {
            ends_at: format_system_time(hammer.ends_at),
            remaining_secs: hammer.remaining(now).as_secs(),
            last_announced_at: format_system_time(hammer.last_announced_at),
        }
    }
}

/// Result of starting a game.
#[derive(Debug, Serialize, ToSchema)]
pub struct StartGameResponse {
    /// Community the game runs in.
    #[schema(value_type = u64)]
    pub community_id: CommunityId,
    /// Announcement channel.
    #[schema(value_type = u64)]
    pub destination_id: ChannelId,
    /// Eligible players at start.
    pub players: Vec<PlayerSummary>,
    /// Votes needed to start the hammer.
    pub threshold: usize,
}

/// Result of a vote.
#[derive(Debug, Serialize, ToSchema)]
pub struct VoteResponse {
    /// Voter.
    #[schema(value_type = u64)]
    pub voter_id: PlayerId,
    /// New target.
    #[schema(value_type = u64)]
    pub target_id: PlayerId,
    /// Target of the replaced vote, if any.
    #[schema(value_type = Option<u64>)]
    pub previous_target_id: Option<PlayerId>,
    /// Player whose majority started the hammer with this vote.
    #[schema(value_type = Option<u64>)]
    pub hammered_id: Option<PlayerId>,
    /// Tally after the vote.
    pub tally: TallyResponse,
    /// Countdown state after the vote.
    pub hammer: Option<HammerSummary>,
}

/// Result of removing a vote.
#[derive(Debug, Serialize, ToSchema)]
pub struct UnvoteResponse {
    /// Whether a vote existed.
    pub removed: bool,
    /// Tally after the removal.
    pub tally: TallyResponse,
    /// Countdown state.
    pub hammer: Option<HammerSummary>,
}

/// Result of a manual hammer start.
#[derive(Debug, Serialize, ToSchema)]
pub struct HammerResponse {
    /// The countdown just started.
    pub hammer: HammerSummary,
}

/// Result of an elimination.
#[derive(Debug, Serialize, ToSchema)]
pub struct EliminationResponse {
    /// Eliminated player.
    pub player: PlayerSummary,
    /// Voters whose vote was removed with the elimination.
    #[schema(value_type = Vec<u64>)]
    pub purged_voter_ids: Vec<PlayerId>,
    /// Tally after the elimination.
    pub tally: TallyResponse,
}

/// Active and eliminated players.
#[derive(Debug, Serialize, ToSchema)]
pub struct PlayersResponse {
    /// Whether a game is running.
    pub game_active: bool,
    /// Role holders not eliminated.
    pub active: Vec<PlayerSummary>,
    /// Eliminated players.
    pub eliminated: Vec<PlayerSummary>,
    /// Majority threshold, only while a game runs.
    pub threshold: Option<usize>,
}

/// Community overview.
#[derive(Debug, Serialize, ToSchema)]
pub struct StatusResponse {
    /// Community id.
    #[schema(value_type = u64)]
    pub community_id: CommunityId,
    /// Role identifying players, when a roster was pushed.
    pub role_name: Option<String>,
    /// Eligible role holders.
    pub member_count: usize,
    /// Whether a game is running.
    pub game_active: bool,
    /// Announcement channel.
    #[schema(value_type = Option<u64>)]
    pub destination_id: Option<ChannelId>,
    /// Votes currently standing.
    pub votes_cast: usize,
    /// Players eliminated so far.
    pub eliminated_count: usize,
    /// Running countdown.
    pub hammer: Option<HammerSummary>,
}

/// Result of a reset.
#[derive(Debug, Serialize, ToSchema)]
pub struct ResetResponse {
    /// Community id.
    #[schema(value_type = u64)]
    pub community_id: CommunityId,
    /// `true` when only votes and the countdown were cleared.
    pub votes_only: bool,
}

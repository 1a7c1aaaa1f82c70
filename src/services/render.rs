//! Chat-ready text for tallies, countdowns and hammer announcements.

use std::time::Duration;

use crate::state::{
    game::{CommunityId, PlayerId},
    roster::RoleMembership,
    tally::{self, Tally},
};

/// Resolves player ids into the names shown in rendered text.
pub struct Names<'a> {
    membership: &'a dyn RoleMembership,
    community: CommunityId,
}

impl<'a> Names<'a> {
    /// Names of `community` members as reported by `membership`.
    pub fn new(membership: &'a dyn RoleMembership, community: CommunityId) -> Self {
        Self {
            membership,
            community,
        }
    }

    /// Display name, or `Unknown (<id>)` for members the roster does not know.
    pub fn of(&self, player: PlayerId) -> String {
        self.membership
            .display_name(self.community, player)
            .unwrap_or_else(|| format!("Unknown ({player})"))
    }

    fn join(&self, players: &[PlayerId]) -> String {
        players
            .iter()
            .map(|player| self.of(*player))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// `Hh Mm` above an hour, `Mm Ss` above a minute, `Ss` otherwise.
pub fn format_time_remaining(remaining: Duration) -> String {
    let total = remaining.as_secs();
    let (hours, rest) = (total / 3_600, total % 3_600);
    let (minutes, seconds) = (rest / 60, rest % 60);

    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

/// Tally block: threshold line, one line per target in tally order, then the
/// active players nobody voted for.
pub fn format_tally(tally: &Tally, active_players: &[PlayerId], names: &Names<'_>) -> String {
    if tally.is_empty() {
        return "**Vote Tally**\n\nNo votes cast yet.".to_string();
    }

    let threshold = tally::majority_threshold(active_players.len());
    let mut lines = vec![
        "**Vote Tally**".to_string(),
        format!(
            "*Majority to hammer: {threshold} votes (of {} players)*",
            active_players.len()
        ),
        String::new(),
    ];

    for (target, voters) in tally {
        lines.push(format!(
            "**{}** ({}): {}",
            names.of(*target),
            voters.len(),
            names.join(voters)
        ));
    }

    let unvoted: Vec<PlayerId> = active_players
        .iter()
        .filter(|player| !tally.contains_key(*player))
        .copied()
        .collect();
    if !unvoted.is_empty() {
        lines.push(String::new());
        lines.push(format!("*No votes: {}*", names.join(&unvoted)));
    }

    lines.join("\n")
}

/// Message posted when a countdown expires.
pub fn hammer_resolved(eliminated: Option<&str>, tally_text: &str) -> String {
    let who = eliminated.unwrap_or("No one (no votes)");
    format!("⏰ **TIME'S UP!**\n\n🔨 **{who}** has been eliminated!\n\n**Final Tally:**\n{tally_text}")
}

/// Message posted at each progress interval of a running countdown.
pub fn hammer_progress(remaining: Duration, tally_text: &str) -> String {
    format!(
        "⏰ **Hammer Update**\n\nTime remaining: **{}**\n\n{tally_text}",
        format_time_remaining(remaining)
    )
}

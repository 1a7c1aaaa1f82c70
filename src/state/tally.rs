//! Pure vote aggregation helpers shared by the game state, the countdown
//! scheduler and the renderers.
//!
//! Enumeration order is fixed: targets by descending vote count, ties broken by
//! ascending target id; voters within a target ascend by id. Every consumer
//! (majority detection, hammer resolution, rendering) relies on that order.

use std::collections::BTreeMap;

use indexmap::IndexMap;

use crate::state::game::PlayerId;

/// Current votes keyed by voter.
pub type VoteMap = BTreeMap<PlayerId, PlayerId>;

/// Votes grouped by target, in tally order.
pub type Tally = IndexMap<PlayerId, Vec<PlayerId>>;

/// Group `votes` by target.
pub fn tally(votes: &VoteMap) -> Tally {
    let mut grouped: BTreeMap<PlayerId, Vec<PlayerId>> = BTreeMap::new();
    for (voter, target) in votes {
        grouped.entry(*target).or_default().push(*voter);
    }

    let mut entries: Vec<(PlayerId, Vec<PlayerId>)> = grouped.into_iter().collect();
    entries.sort_by(|(left_target, left_voters), (right_target, right_voters)| {
        right_voters
            .len()
            .cmp(&left_voters.len())
            .then_with(|| left_target.cmp(right_target))
    });

    entries.into_iter().collect()
}

/// Votes needed on a single target for a majority among `active_count` players.
pub fn majority_threshold(active_count: usize) -> usize {
    active_count / 2 + 1
}

/// First target in tally order whose vote count reaches the majority threshold.
pub fn check_majority(tally: &Tally, active_count: usize) -> Option<PlayerId> {
    let threshold = majority_threshold(active_count);
    tally
        .iter()
        .find(|(_, voters)| voters.len() >= threshold)
        .map(|(target, _)| *target)
}

/// Target with the most votes, `None` when nobody voted.
pub fn leading_target(tally: &Tally) -> Option<PlayerId> {
    tally.keys().next().copied()
}

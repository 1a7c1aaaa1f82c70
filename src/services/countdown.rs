//! Periodic hammer countdown processing.
//!
//! Every tick scans the registry, locking one game at a time. For a game with
//! a running countdown and a destination, expiry is checked first (resolve and
//! eliminate), then the progress interval (announce remaining time). Rendering,
//! notification and logging happen after the game lock is released.

use std::{
    collections::BTreeSet,
    sync::Arc,
    time::{Duration, SystemTime},
};

use tokio::{
    sync::watch,
    time::{MissedTickBehavior, interval},
};
use tracing::{debug, info, warn};

use crate::{
    clock::Clock,
    services::{
        notifier::{Notification, NotificationKind, Notifier},
        persistence::{PersistOp, PersistenceQueue},
        render::{self, Names},
    },
    state::{
        SharedState,
        game::{ChannelId, CommunityId, GameState, PlayerId},
        registry::GameRegistry,
        roster::RoleMembership,
        tally::{self, Tally},
    },
};

/// Outcome of one scheduler pass over a single game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CountdownEvent {
    /// The countdown expired. `tally` is the final tally, taken before the
    /// elimination purged any vote.
    HammerResolved {
        /// Leading target that got eliminated, `None` with no votes.
        eliminated: Option<PlayerId>,
        /// Final tally.
        tally: Tally,
    },
    /// The update interval elapsed while the countdown runs.
    HammerProgress {
        /// Time left.
        remaining: Duration,
        /// Current tally.
        tally: Tally,
    },
}

/// Advance one game's countdown to `now`.
///
/// Games without a destination or without a running countdown are untouched.
/// At expiry the leader is only eliminated while still in `eligible`.
pub fn advance(
    game: &mut GameState,
    eligible: &BTreeSet<PlayerId>,
    now: SystemTime,
    update_interval: Duration,
) -> Option<(ChannelId, CountdownEvent)> {
    let destination = game.destination()?;
    let hammer = *game.hammer()?;

    if game.is_expired(now) {
        let tally = game.tally();
        game.clear_hammer();
        let eliminated = tally::leading_target(&tally)
            .filter(|target| eligible.contains(target))
            .filter(|target| game.eliminate(*target).is_ok());
        return Some((destination, CountdownEvent::HammerResolved { eliminated, tally }));
    }

    let since_last = now
        .duration_since(hammer.last_announced_at)
        .unwrap_or(Duration::ZERO);
    if since_last >= update_interval {
        game.mark_announced(now);
        return Some((
            destination,
            CountdownEvent::HammerProgress {
                remaining: hammer.remaining(now),
                tally: game.tally(),
            },
        ));
    }

    None
}

/// An event ready to be rendered and posted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announcement {
    /// Community of the game.
    pub community: CommunityId,
    /// Where to post.
    pub destination: ChannelId,
    /// Players still in the game before the event applied.
    pub active_players: Vec<PlayerId>,
    /// What happened.
    pub event: CountdownEvent,
    /// Scheduler time of the pass.
    pub at: SystemTime,
}

/// Time-driven engine resolving and announcing hammer countdowns.
pub struct CountdownScheduler {
    games: GameRegistry,
    membership: Arc<dyn RoleMembership>,
    notifier: Arc<dyn Notifier>,
    persistence: PersistenceQueue,
    clock: Arc<dyn Clock>,
    tick_interval: Duration,
    update_interval: Duration,
}

impl CountdownScheduler {
    /// Scheduler wired to the shared application state.
    pub fn from_state(state: &SharedState) -> Self {
        Self {
            games: state.games().clone(),
            membership: state.membership(),
            notifier: state.notifier(),
            persistence: state.persistence().clone(),
            clock: state.clock(),
            tick_interval: state.config().tick_interval,
            update_interval: state.config().update_interval,
        }
    }

    /// Replace the notification sink.
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Tick until `shutdown` flips to `true`. A tick in progress always completes.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            tick_secs = self.tick_interval.as_secs(),
            update_secs = self.update_interval.as_secs(),
            "countdown scheduler started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("countdown scheduler stopped");
    }

    /// Process every known game once and post resulting announcements.
    pub async fn tick(&self) -> Vec<Announcement> {
        let mut announcements = Vec::new();

        for (community, handle) in self.games.all() {
            let eligible = self.membership.eligible_players(community);
            let announcement = {
                let mut game = handle.lock().await;
                let now = self.clock.now();
                let active_players = game.active_players(&eligible);
                let Some((destination, event)) =
                    advance(&mut game, &eligible, now, self.update_interval)
                else {
                    continue;
                };

                self.persistence
                    .push(PersistOp::SaveGameMeta(game.meta_row(community)));
                if let CountdownEvent::HammerResolved {
                    eliminated: Some(player),
                    ..
                } = &event
                {
                    self.persistence.push(PersistOp::SaveElimination {
                        community,
                        player: *player,
                    });
                }

                Announcement {
                    community,
                    destination,
                    active_players,
                    event,
                    at: now,
                }
            };

            self.announce(&announcement);
            announcements.push(announcement);
        }

        announcements
    }

    fn announce(&self, announcement: &Announcement) {
        let community = announcement.community;
        let names = Names::new(self.membership.as_ref(), community);

        let (kind, tally, message) = match &announcement.event {
            CountdownEvent::HammerResolved { eliminated, tally } => {
                let tally_text = render::format_tally(tally, &announcement.active_players, &names);
                let eliminated_name = eliminated.map(|player| names.of(player));
                info!(
                    %community,
                    eliminated = ?eliminated,
                    "hammer countdown resolved"
                );
                (
                    NotificationKind::HammerResolved {
                        eliminated: *eliminated,
                    },
                    tally.clone(),
                    render::hammer_resolved(eliminated_name.as_deref(), &tally_text),
                )
            }
            CountdownEvent::HammerProgress { remaining, tally } => {
                let tally_text = render::format_tally(tally, &announcement.active_players, &names);
                debug!(
                    %community,
                    remaining_secs = remaining.as_secs(),
                    "hammer countdown progress"
                );
                (
                    NotificationKind::HammerProgress {
                        remaining: *remaining,
                    },
                    tally.clone(),
                    render::hammer_progress(*remaining, &tally_text),
                )
            }
        };

        let notification = Notification::new(community, kind, tally, message, announcement.at);
        if let Err(err) = self
            .notifier
            .post(announcement.destination, &notification)
        {
            warn!(
                %community,
                destination = %announcement.destination,
                error = %err,
                "failed to post countdown notification"
            );
        }
    }
}

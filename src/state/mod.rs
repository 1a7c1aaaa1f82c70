pub mod game;
pub mod registry;
pub mod roster;
mod sse;
pub mod tally;

use std::sync::{
    Arc, Mutex as StdMutex,
    atomic::{AtomicBool, Ordering},
};

use tokio::sync::{RwLock, mpsc, watch};

use crate::{
    clock::{Clock, SystemClock},
    config::AppConfig,
    dao::game_store::GameStore,
    services::{
        notifier::{Notifier, SseNotifier},
        persistence::{PersistOp, PersistenceQueue},
    },
};

pub use self::sse::SseHub;
use self::{
    registry::GameRegistry,
    roster::{RoleMembership, RosterDirectory},
};

/// Shared handle passed to every route and background task.
pub type SharedState = Arc<AppState>;

/// Central application state: games, rosters, storage handle and notification hub.
pub struct AppState {
    config: AppConfig,
    clock: Arc<dyn Clock>,
    games: GameRegistry,
    rosters: Arc<RosterDirectory>,
    game_store: RwLock<Option<Arc<dyn GameStore>>>,
    hydrated: AtomicBool,
    persistence: PersistenceQueue,
    persistence_rx: StdMutex<Option<mpsc::UnboundedReceiver<PersistOp>>>,
    notifications: SseHub,
    notifier: Arc<dyn Notifier>,
    degraded: watch::Sender<bool>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig) -> SharedState {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Same as [`AppState::new`] with an explicit time source.
    pub fn with_clock(config: AppConfig, clock: Arc<dyn Clock>) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        let (persistence, persistence_rx) = PersistenceQueue::new();
        let notifications = SseHub::new(config.notification_capacity);
        let notifier: Arc<dyn Notifier> = Arc::new(SseNotifier::new(notifications.clone()));
        Arc::new(Self {
            config,
            clock,
            games: GameRegistry::new(),
            rosters: Arc::new(RosterDirectory::new()),
            game_store: RwLock::new(None),
            hydrated: AtomicBool::new(false),
            persistence,
            persistence_rx: StdMutex::new(Some(persistence_rx)),
            notifications,
            notifier,
            degraded: degraded_tx,
        })
    }

    /// Runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Time source shared by commands and the scheduler.
    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    /// Community → game registry.
    pub fn games(&self) -> &GameRegistry {
        &self.games
    }

    /// Roster directory fed by the chat bridge.
    pub fn rosters(&self) -> &RosterDirectory {
        &self.rosters
    }

    /// Role membership capability backed by [`AppState::rosters`].
    pub fn membership(&self) -> Arc<dyn RoleMembership> {
        self.rosters.clone()
    }

    /// Write queue feeding the persistence writer.
    pub fn persistence(&self) -> &PersistenceQueue {
        &self.persistence
    }

    /// Hand the queue receiver to the writer task. Only the first call gets it.
    pub fn take_persistence_receiver(&self) -> Option<mpsc::UnboundedReceiver<PersistOp>> {
        self.persistence_rx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }

    /// Broadcast hub behind the notification SSE stream.
    pub fn notifications(&self) -> &SseHub {
        &self.notifications
    }

    /// Sink for countdown announcements.
    pub fn notifier(&self) -> Arc<dyn Notifier> {
        self.notifier.clone()
    }

    /// Obtain a handle to the current game store, if one is installed.
    pub async fn game_store(&self) -> Option<Arc<dyn GameStore>> {
        let guard = self.game_store.read().await;
        guard.as_ref().cloned()
    }

    /// Install a new game store implementation and leave degraded mode.
    pub async fn set_game_store(&self, store: Arc<dyn GameStore>) {
        {
            let mut guard = self.game_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false).await;
    }

    /// Remove the current game store and enter degraded mode.
    pub async fn clear_game_store(&self) {
        {
            let mut guard = self.game_store.write().await;
            guard.take();
        }
        self.update_degraded(true).await;
    }

    /// Whether stored games were already loaded into the registry.
    pub fn is_hydrated(&self) -> bool {
        self.hydrated.load(Ordering::Acquire)
    }

    /// Record that the first load from storage completed.
    pub fn mark_hydrated(&self) {
        self.hydrated.store(true, Ordering::Release);
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub async fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        });
    }
}

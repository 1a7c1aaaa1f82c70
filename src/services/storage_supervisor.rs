use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::{game_store::GameStore, storage::StorageError},
    services::persistence::{self, ReconcileOutcome},
    state::SharedState,
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Reconnect to the storage backend and keep the shared state in degraded mode when it is unavailable.
///
/// Every (re)connection is followed by a reconcile pass aligning the store with memory.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn GameStore>, StorageError>> + Send,
{
    let mut delay = INITIAL_DELAY;

    loop {
        match connect().await {
            Ok(store) => {
                state.set_game_store(store.clone()).await;
                info!("storage connection established; leaving degraded mode");
                sync_with_store(&state, &store).await;
                delay = INITIAL_DELAY;

                loop {
                    match store.health_check().await {
                        Ok(()) => {
                            if state.is_degraded().await {
                                info!("storage healthy again; leaving degraded mode");
                                state.update_degraded(false).await;
                                sync_with_store(&state, &store).await;
                            }
                            sleep(HEALTH_POLL_INTERVAL).await;
                        }
                        Err(_) => {
                            let mut attempt = 0;
                            let mut reconnect_delay = INITIAL_DELAY;
                            let mut reconnected = false;

                            while attempt < MAX_RECONNECT_ATTEMPTS {
                                match store.try_reconnect().await {
                                    Ok(()) => {
                                        info!(
                                            "storage reconnection succeeded after health check failure"
                                        );
                                        reconnected = true;
                                        break;
                                    }
                                    Err(reconnect_err) => {
                                        if attempt == 0 {
                                            warn!(
                                                attempt, error = %reconnect_err,
                                                "storage reconnect first attempt failed; entering in degraded mode"
                                            );
                                            state.update_degraded(true).await;
                                        } else {
                                            warn!(attempt, error = %reconnect_err, "storage reconnect attempt failed");
                                        };
                                        attempt += 1;
                                        sleep(reconnect_delay).await;
                                        reconnect_delay = (reconnect_delay * 2).min(MAX_DELAY);
                                    }
                                }
                            }

                            if reconnected {
                                state.update_degraded(false).await;
                                sync_with_store(&state, &store).await;
                                sleep(HEALTH_POLL_INTERVAL).await;
                                continue;
                            } else {
                                warn!(
                                    "exhausted storage reconnect attempts; staying in degraded mode"
                                );
                                state.clear_game_store().await;
                                break;
                            }
                        }
                    }
                }

                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
            Err(err) => {
                warn!(error = %err, "storage connection attempt failed");
                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
        }
    }
}

async fn sync_with_store(state: &SharedState, store: &Arc<dyn GameStore>) {
    match persistence::reconcile(state, store).await {
        Ok(ReconcileOutcome { restored, resynced }) => {
            info!(restored, resynced, "storage reconciled with memory")
        }
        Err(err) => warn!(error = %err, "failed to reconcile storage with memory"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        dao::game_store::memory::MemoryGameStore,
        services::persistence::PersistOp,
        state::{
            AppState,
            game::{ChannelId, CommunityId, GameState, PlayerId},
        },
    };

    #[tokio::test]
    async fn connection_installs_store_and_hydrates() {
        let seeded = MemoryGameStore::new();
        let mut game = GameState::new();
        let roster = [1, 2, 3].into_iter().map(PlayerId).collect();
        game.activate(&roster, ChannelId(4)).unwrap();
        for op in PersistOp::snapshot(CommunityId(3), &game) {
            op.apply(&seeded).await.unwrap();
        }

        let state = AppState::new(AppConfig::default());
        let supervisor = tokio::spawn(run(state.clone(), move || {
            let store: Arc<dyn GameStore> = Arc::new(seeded.clone());
            async move { Ok(store) }
        }));

        tokio::time::timeout(Duration::from_secs(5), async {
            while state.games().get(CommunityId(3)).is_none() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        assert!(!state.is_degraded().await);
        assert!(state.game_store().await.is_some());
        supervisor.abort();
    }
}

use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::{range_store::RangeStore, storage::StorageError},
    services::{overview_events, overview_service},
    state::SharedState,
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Connect to the storage backend and keep the shared state in degraded
/// mode whenever it is unavailable.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn RangeStore>, StorageError>> + Send,
{
    let mut delay = INITIAL_DELAY;

    loop {
        match connect().await {
            Ok(store) => {
                install(&state, store.clone()).await;
                delay = INITIAL_DELAY;

                loop {
                    match store.health_check().await {
                        Ok(()) => sleep(HEALTH_POLL_INTERVAL).await,
                        Err(err) => {
                            warn!(error = %err, "storage health check failed; attempting reconnect");
                            if reconnect_with_backoff(&store).await {
                                info!("storage reconnection succeeded after health check failure");
                                continue;
                            }

                            warn!("exhausted storage reconnect attempts; entering degraded mode");
                            state.clear_range_store().await;
                            overview_events::broadcast_system_status(&state, true);
                            break;
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

/// Install a connected backend: seed the fixed bay pool, publish the flag
/// flip, and prime the overview cache from fresh storage reads.
pub async fn install(state: &SharedState, store: Arc<dyn RangeStore>) {
    match store.seed_bays(state.config().bay_count).await {
        Ok(created) if created > 0 => info!(created, "seeded missing bays into the fixed pool"),
        Ok(_) => {}
        Err(err) => warn!(error = %err, "failed to seed the bay pool"),
    }

    state.install_range_store(store.clone()).await;

    match overview_service::build_bay_views(&store, state.now()).await {
        Ok(views) => state.replace_overview_cache(views).await,
        Err(err) => warn!(error = %err, "failed to prime the overview cache"),
    }

    overview_events::broadcast_system_status(state, false);
    info!("storage connection established; leaving degraded mode");
}

async fn reconnect_with_backoff(store: &Arc<dyn RangeStore>) -> bool {
    let mut attempt = 0;
    let mut delay = INITIAL_DELAY;

    while attempt < MAX_RECONNECT_ATTEMPTS {
        match store.try_reconnect().await {
            Ok(()) => return true,
            Err(err) => {
                warn!(attempt, error = %err, "storage reconnect attempt failed");
                attempt += 1;
                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
        }
    }

    false
}

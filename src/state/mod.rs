mod sse;
pub mod state_machine;

use std::{sync::Arc, time::SystemTime};

use indexmap::IndexMap;
use tokio::sync::{RwLock, watch};
use uuid::Uuid;

use crate::{
    clock::{Clock, SystemClock},
    config::AppConfig,
    dao::range_store::RangeStore,
    dto::overview::BayView,
    error::ServiceError,
};

pub use self::sse::SseHub;

/// Shared handle to the central application state.
pub type SharedState = Arc<AppState>;

/// Central application state holding the store slot, the overview broadcast
/// hub, and the last published view of every bay.
pub struct AppState {
    range_store: RwLock<Option<Arc<dyn RangeStore>>>,
    overview: SseHub,
    /// Last published row per bay, seeded in bay order at startup and
    /// written only through the publish path. Serves reconnecting observers
    /// a stale-but-consistent view while storage is down.
    overview_cache: RwLock<IndexMap<Uuid, BayView>>,
    degraded: watch::Sender<bool>,
    clock: Arc<dyn Clock>,
    config: AppConfig,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig) -> SharedState {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Construct the state with an explicit clock, used by tests to drive
    /// simulated time through the lifecycle rules.
    pub fn with_clock(config: AppConfig, clock: Arc<dyn Clock>) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            range_store: RwLock::new(None),
            overview: SseHub::new(config.sse_capacity),
            overview_cache: RwLock::new(IndexMap::new()),
            degraded: degraded_tx,
            clock,
            config,
        })
    }

    /// Obtain a handle to the current range store, if one is installed.
    pub async fn range_store(&self) -> Option<Arc<dyn RangeStore>> {
        let guard = self.range_store.read().await;
        guard.as_ref().cloned()
    }

    /// Obtain the range store or fail with the degraded-mode error.
    pub async fn require_range_store(&self) -> Result<Arc<dyn RangeStore>, ServiceError> {
        self.range_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a storage backend and leave degraded mode.
    pub async fn install_range_store(&self, store: Arc<dyn RangeStore>) {
        {
            let mut guard = self.range_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false).await;
    }

    /// Remove the current storage backend and enter degraded mode.
    pub async fn clear_range_store(&self) {
        {
            let mut guard = self.range_store.write().await;
            guard.take();
        }
        self.update_degraded(true).await;
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        let guard = self.range_store.read().await;
        guard.is_none()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Broadcast hub for the shared overview stream.
    pub fn overview_sse(&self) -> &SseHub {
        &self.overview
    }

    /// Current wall-clock instant from the injected clock.
    pub fn now(&self) -> SystemTime {
        self.clock.now()
    }

    /// Immutable runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Replace the whole overview cache, typically right after a fresh
    /// snapshot was derived from storage. Rows keep the given order.
    pub async fn replace_overview_cache(&self, views: Vec<BayView>) {
        let mut guard = self.overview_cache.write().await;
        guard.clear();
        for view in views {
            guard.insert(view.bay_id, view);
        }
    }

    /// Update a single bay's cached row. The pool is fixed, so replacing an
    /// existing key preserves the seeded bay order.
    pub async fn cache_bay_view(&self, view: BayView) {
        let mut guard = self.overview_cache.write().await;
        guard.insert(view.bay_id, view);
    }

    /// Clone the cached rows in bay order.
    pub async fn cached_overview(&self) -> Vec<BayView> {
        let guard = self.overview_cache.read().await;
        guard.values().cloned().collect()
    }

    /// Update and broadcast the degraded flag when the value changes.
    async fn update_degraded(&self, value: bool) {
        if *self.degraded.borrow() == value {
            return;
        }

        let _ = self.degraded.send(value);
    }
}

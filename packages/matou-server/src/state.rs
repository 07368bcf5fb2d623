//! Server state.
//!
//! One [`AppState`] value owns every core service; handlers close over a
//! clone. Space operations borrow the live [`Services`] under a
//! read-write lock: ordinary requests take read, an identity swap takes
//! write, so a swap excludes all new space operations while it runs.

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use matou_core::events::EventBus;
use matou_core::spaces::manager::Deadlines;
use matou_core::trust::ScoreWeights;
use matou_core::{
    Database, Error, IdentityStore, IdentitySwapper, KeyVault, Result, SpaceManager, SpaceStore,
    SyncRuntime, TrustService,
};

/// Server configuration resolved from CLI flags and environment
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,
    /// Root of all persisted state
    pub data_dir: PathBuf,
    /// Deadline for coordinator operations (seconds)
    pub coordinator_timeout_secs: u64,
    /// Deadline for tree operations (seconds)
    pub tree_timeout_secs: u64,
    /// Per-subscriber event channel capacity
    pub event_capacity: usize,
    /// Trust graph cache TTL (milliseconds, capped at 5 s by the core)
    pub trust_cache_ttl_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8420,
            data_dir: PathBuf::from("./data"),
            coordinator_timeout_secs: 60,
            tree_timeout_secs: 30,
            event_capacity: 64,
            trust_cache_ttl_ms: 2_000,
        }
    }
}

/// The services bound to the current identity's runtime
pub struct Services {
    /// Sync runtime bound to the current peer key
    pub runtime: Arc<dyn SyncRuntime>,
    /// Orchestration over that runtime
    pub manager: Arc<SpaceManager>,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<Inner>,
}

struct Inner {
    config: ServerConfig,
    db: Database,
    identity: Arc<IdentityStore>,
    vault: Arc<KeyVault>,
    trust: Arc<TrustService>,
    events: Arc<EventBus>,
    swapper: IdentitySwapper,
    services: tokio::sync::RwLock<Option<Services>>,
    /// Strict-busy gate: a second identity swap is rejected, not queued
    swap_gate: AtomicBool,
}

impl AppState {
    /// Open all stores and, when an identity is already configured,
    /// rebind the runtime from the persisted peer key.
    pub fn open(config: ServerConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)
            .map_err(|e| Error::StorageWrite(format!("{}: {}", config.data_dir.display(), e)))?;

        let db = Database::open(Some(&config.data_dir.join("cache.db")))?;
        let identity = Arc::new(IdentityStore::open(&config.data_dir)?);
        let vault = Arc::new(KeyVault::open(&config.data_dir)?);
        let trust = Arc::new(TrustService::new(
            db.clone(),
            ScoreWeights::default(),
            Duration::from_millis(config.trust_cache_ttl_ms),
        ));
        let events = Arc::new(EventBus::with_capacity(config.event_capacity));
        let swapper = IdentitySwapper::new(
            config.data_dir.clone(),
            Arc::clone(&vault),
            Arc::clone(&identity),
            db.clone(),
        );

        // Re-attach the peer key persisted by the last identity set
        let initial = match identity.get() {
            Some(record) => match vault.load_user_peer_key(&record.aid) {
                Ok(peer_key) => {
                    let runtime: Arc<dyn SyncRuntime> =
                        Arc::new(matou_core::EmbeddedRuntime::new(&config.data_dir, peer_key)?);
                    tracing::info!(aid = record.aid.as_str(), "Runtime rebound to persisted identity");
                    Some(wire_services(
                        runtime, &db, &identity, &vault, &trust, &events, &config,
                    ))
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Peer key not loadable; runtime stays down until identity set");
                    None
                }
            },
            None => None,
        };

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                db,
                identity,
                vault,
                trust,
                events,
                swapper,
                services: tokio::sync::RwLock::new(initial),
                swap_gate: AtomicBool::new(false),
            }),
        })
    }

    /// Wire a [`SpaceManager`] over a freshly bound runtime.
    pub fn build_services(&self, runtime: Arc<dyn SyncRuntime>) -> Services {
        wire_services(
            runtime,
            &self.inner.db,
            &self.inner.identity,
            &self.inner.vault,
            &self.inner.trust,
            &self.inner.events,
            &self.inner.config,
        )
    }

    /// Borrow the space manager for one request (read side of the lock).
    ///
    /// Errors with `RuntimeUnavailable` when no runtime is bound.
    pub async fn manager(&self) -> Result<Arc<SpaceManager>> {
        let guard = self.inner.services.read().await;
        guard
            .as_ref()
            .map(|s| Arc::clone(&s.manager))
            .ok_or(Error::RuntimeUnavailable)
    }

    /// The services lock (write side is the identity swap path).
    pub fn services(&self) -> &tokio::sync::RwLock<Option<Services>> {
        &self.inner.services
    }

    /// The strict-busy gate for identity swaps
    pub fn swap_gate(&self) -> &AtomicBool {
        &self.inner.swap_gate
    }

    /// Embedded database handle
    pub fn db(&self) -> &Database {
        &self.inner.db
    }

    /// Identity store
    pub fn identity(&self) -> &Arc<IdentityStore> {
        &self.inner.identity
    }

    /// Trust service
    pub fn trust(&self) -> &Arc<TrustService> {
        &self.inner.trust
    }

    /// Event bus
    pub fn events(&self) -> &Arc<EventBus> {
        &self.inner.events
    }

    /// Identity swapper
    pub fn swapper(&self) -> &IdentitySwapper {
        &self.inner.swapper
    }

    /// Path of the persisted org configuration
    pub fn org_config_path(&self) -> PathBuf {
        self.inner.config.data_dir.join("org-config.yaml")
    }

    /// The org identifier the trust graph anchors on
    pub fn org_id(&self) -> Result<String> {
        self.inner
            .identity
            .get()
            .and_then(|rec| rec.org_aid)
            .ok_or(Error::OrgNotConfigured)
    }
}

fn wire_services(
    runtime: Arc<dyn SyncRuntime>,
    db: &Database,
    identity: &Arc<IdentityStore>,
    vault: &Arc<KeyVault>,
    trust: &Arc<TrustService>,
    events: &Arc<EventBus>,
    config: &ServerConfig,
) -> Services {
    let manager = SpaceManager::new(
        Arc::clone(&runtime),
        Arc::clone(vault),
        SpaceStore::new(db.clone()),
        db.clone(),
        Arc::clone(identity),
        Arc::clone(trust),
        Arc::clone(events),
        Deadlines {
            coordinator: Duration::from_secs(config.coordinator_timeout_secs),
            tree: Duration::from_secs(config.tree_timeout_secs),
        },
    );
    Services {
        runtime,
        manager: Arc::new(manager),
    }
}

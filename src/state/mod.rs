pub mod clock;

use std::sync::{
    Arc, Mutex as StdMutex,
    atomic::{AtomicBool, Ordering},
};

use tokio::{
    sync::{RwLock, watch},
    task::JoinHandle,
};
use tracing::{info, warn};

use crate::{
    config::{AppConfig, RealtimeMode},
    dao::{
        cache::{Cache, CacheBackend, memory::MemoryCache},
        document_store::{DocumentStore, Documents, memory::MemoryDocumentStore},
        media::{MediaStore, memory::MemoryMediaStore},
    },
    error::ServiceError,
    realtime::{
        LocalRelay, PooledRelay, Relay, RoomManager,
        pool::{ConnectionPool, PoolError, PoolMetricsSnapshot, WsConnector},
    },
    services::auth::JwtKeys,
};

use self::clock::{SharedClock, SystemClock};

pub type SharedState = Arc<AppState>;

/// Relay implementation selected for this process.
#[derive(Clone)]
pub enum RealtimeBackend {
    Local(LocalRelay),
    Pooled(PooledRelay),
}

impl RealtimeBackend {
    fn relay(&self) -> Arc<dyn Relay> {
        match self {
            RealtimeBackend::Local(relay) => Arc::new(relay.clone()),
            RealtimeBackend::Pooled(relay) => Arc::new(relay.clone()),
        }
    }
}

/// Collaborators injected into [`AppState`].
pub struct Backends {
    pub clock: SharedClock,
    /// Document store available at startup; `None` starts in degraded mode until the
    /// storage supervisor installs one.
    pub documents: Option<Arc<dyn DocumentStore>>,
    pub cache: Arc<dyn CacheBackend>,
    pub media: Arc<dyn MediaStore>,
    pub realtime: RealtimeBackend,
}

impl Backends {
    /// Fully in-memory collaborators driven by `clock`.
    pub fn in_memory(clock: SharedClock) -> Self {
        Self {
            documents: Some(Arc::new(MemoryDocumentStore::new())),
            cache: Arc::new(MemoryCache::new(clock.clone())),
            media: Arc::new(MemoryMediaStore::new()),
            realtime: RealtimeBackend::Local(LocalRelay::new()),
            clock,
        }
    }
}

/// Central application state shared by every handler and background task.
pub struct AppState {
    config: AppConfig,
    clock: SharedClock,
    documents: RwLock<Option<Documents>>,
    degraded: watch::Sender<bool>,
    cache: Cache,
    rooms: RoomManager,
    realtime: RealtimeBackend,
    relay: Arc<dyn Relay>,
    media: Arc<dyn MediaStore>,
    jwt: JwtKeys,
    tasks: StdMutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    pub fn new(config: AppConfig, backends: Backends) -> SharedState {
        let degraded = backends.documents.is_none();
        let (degraded_tx, _rx) = watch::channel(degraded);
        let relay = backends.realtime.relay();
        Arc::new(Self {
            jwt: JwtKeys::from_secret(&config.jwt_secret),
            config,
            rooms: RoomManager::new(backends.clock.clone()),
            clock: backends.clock,
            documents: RwLock::new(backends.documents.map(Documents::new)),
            degraded: degraded_tx,
            cache: Cache::new(backends.cache),
            realtime: backends.realtime,
            relay,
            media: backends.media,
            tasks: StdMutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }

    /// State backed entirely by in-memory collaborators.
    pub fn in_memory(config: AppConfig, clock: SharedClock) -> SharedState {
        Self::new(config, Backends::in_memory(clock))
    }

    /// Build the production collaborators described by `config`.
    ///
    /// Redis falls back to the in-memory cache when unreachable. When CouchDB is configured
    /// the state starts degraded and waits for the storage supervisor.
    pub async fn init(config: AppConfig) -> Result<SharedState, PoolError> {
        let clock: SharedClock = Arc::new(SystemClock);
        let cache = connect_cache(&config, &clock).await;
        let media = media_store(&config);
        let realtime = match config.realtime_mode() {
            RealtimeMode::Local => {
                info!("using the in-process relay");
                RealtimeBackend::Local(LocalRelay::new())
            }
            RealtimeMode::Pooled { endpoints } => {
                let connector = match &config.relay.app_key {
                    Some(key) => WsConnector::with_query(format!("key={key}&protocol=7")),
                    None => WsConnector::new(),
                };
                let pool = ConnectionPool::new(config.relay.pool.clone(), endpoints, Arc::new(connector))?;
                let relay = PooledRelay::new(pool);
                relay.start();
                info!("using the pooled hosted relay");
                RealtimeBackend::Pooled(relay)
            }
        };
        let documents: Option<Arc<dyn DocumentStore>> = if config.couch.is_some() {
            None
        } else {
            info!("no CouchDB configured; using the in-memory document store");
            Some(Arc::new(MemoryDocumentStore::new()))
        };

        Ok(Self::new(
            config,
            Backends {
                clock,
                documents,
                cache,
                media,
                realtime,
            },
        ))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn rooms(&self) -> &RoomManager {
        &self.rooms
    }

    pub fn relay(&self) -> &Arc<dyn Relay> {
        &self.relay
    }

    /// In-process relay, present only in [`RealtimeMode::Local`].
    pub fn local_relay(&self) -> Option<&LocalRelay> {
        match &self.realtime {
            RealtimeBackend::Local(relay) => Some(relay),
            RealtimeBackend::Pooled(_) => None,
        }
    }

    /// Latest connection pool snapshot, if the hosted relay is in use.
    pub fn pool_metrics(&self) -> Option<PoolMetricsSnapshot> {
        match &self.realtime {
            RealtimeBackend::Pooled(relay) => Some(relay.pool().metrics()),
            RealtimeBackend::Local(_) => None,
        }
    }

    pub fn media(&self) -> &Arc<dyn MediaStore> {
        &self.media
    }

    pub fn jwt(&self) -> &JwtKeys {
        &self.jwt
    }

    /// Obtain the document repository, failing while in degraded mode.
    pub async fn require_documents(&self) -> Result<Documents, ServiceError> {
        let guard = self.documents.read().await;
        guard.clone().ok_or(ServiceError::Degraded)
    }

    /// Install a document store and leave degraded mode.
    pub async fn set_document_store(&self, store: Arc<dyn DocumentStore>) {
        {
            let mut guard = self.documents.write().await;
            *guard = Some(Documents::new(store));
        }
        self.update_degraded(false).await;
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

    /// Keep a background task alive until [`AppState::close`].
    pub fn track_task(&self, task: JoinHandle<()>) {
        if self.closed.load(Ordering::SeqCst) {
            task.abort();
            return;
        }
        self.tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(task);
    }

    /// Stop background tasks and close the relay. Safe to call more than once.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let tasks = std::mem::take(
            &mut *self
                .tasks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        );
        for task in tasks {
            task.abort();
        }
        self.relay.close().await;
        info!("application state closed");
    }
}

async fn connect_cache(config: &AppConfig, clock: &SharedClock) -> Arc<dyn CacheBackend> {
    #[cfg(feature = "redis-cache")]
    if let Some(url) = &config.redis_url {
        match crate::dao::cache::redis_backend::RedisCache::connect(url).await {
            Ok(cache) => {
                info!("connected to Redis cache");
                return Arc::new(cache);
            }
            Err(err) => warn!(error = %err, "Redis unavailable; falling back to the in-memory cache"),
        }
    }
    #[cfg(not(feature = "redis-cache"))]
    if config.redis_url.is_some() {
        warn!("REDIS_URL is set but the redis-cache feature is disabled");
    }
    Arc::new(MemoryCache::new(clock.clone()))
}

fn media_store(config: &AppConfig) -> Arc<dyn MediaStore> {
    #[cfg(feature = "cloudinary-media")]
    if let Some(settings) = &config.cloudinary {
        use crate::dao::media::cloudinary::{CloudinaryConfig, CloudinaryMediaStore};

        info!(cloud = %settings.cloud_name, "uploading media to Cloudinary");
        return Arc::new(CloudinaryMediaStore::new(
            reqwest::Client::new(),
            CloudinaryConfig {
                cloud_name: settings.cloud_name.clone(),
                api_key: settings.api_key.clone(),
                api_secret: settings.api_secret.clone(),
            },
        ));
    }
    #[cfg(not(feature = "cloudinary-media"))]
    if config.cloudinary.is_some() {
        warn!("Cloudinary is configured but the cloudinary-media feature is disabled");
    }
    info!("keeping uploaded media in memory");
    Arc::new(MemoryMediaStore::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::clock::ManualClock;

    #[tokio::test]
    async fn degraded_until_a_store_is_installed() {
        let mut backends = Backends::in_memory(Arc::new(ManualClock::default()));
        backends.documents = None;
        let state = AppState::new(AppConfig::default(), backends);
        let mut watcher = state.degraded_watcher();

        assert!(state.is_degraded().await);
        assert!(matches!(
            state.require_documents().await,
            Err(ServiceError::Degraded)
        ));

        state
            .set_document_store(Arc::new(MemoryDocumentStore::new()))
            .await;
        assert!(watcher.has_changed().unwrap());
        assert!(!*watcher.borrow_and_update());
        assert!(state.require_documents().await.is_ok());
    }

    #[tokio::test]
    async fn close_is_idempotent_and_stops_tasks() {
        let state = AppState::in_memory(AppConfig::default(), Arc::new(ManualClock::default()));
        let task = tokio::spawn(std::future::pending::<()>());
        state.track_task(task);

        state.close().await;
        state.close().await;

        assert!(!state.relay().is_connected());
        assert!(state.tasks.lock().unwrap().is_empty());
    }
}

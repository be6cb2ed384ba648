//! App Core for SmartMarks.
//!
//! Central struct wiring the bookmark tree, state store, settings, cache,
//! resolver, move coordinator, session manager and organize runner.

use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::database::Database;
use crate::managers::bookmark_tree::{BookmarkTree, SqliteBookmarkTree};
use crate::managers::move_coordinator::MoveCoordinator;
use crate::managers::organize_runner::OrganizeRunner;
use crate::managers::session_manager::SessionManager;
use crate::services::ai_provider::{HttpProviderFactory, ProviderFactory};
use crate::services::classification_cache::ClassificationCache;
use crate::services::classification_resolver::ClassificationResolver;
use crate::services::crypto_service::CryptoService;
use crate::services::event_sink::EventSink;
use crate::services::metadata_enrichment::MetadataEnricher;
use crate::services::settings_engine::SettingsEngine;
use crate::services::state_store::{SqliteStateStore, StateStore};

/// Collaborators an [`App`] is built from. Tests swap in fakes here.
pub struct AppComponents {
    pub tree: Arc<dyn BookmarkTree>,
    pub store: Arc<dyn StateStore>,
    pub providers: Arc<dyn ProviderFactory>,
    pub enricher: MetadataEnricher,
    pub events: Arc<dyn EventSink>,
    pub crypto: CryptoService,
}

/// Central application struct holding all managers and services.
pub struct App {
    pub db: Option<Arc<Database>>,
    pub tree: Arc<dyn BookmarkTree>,
    pub store: Arc<dyn StateStore>,
    pub events: Arc<dyn EventSink>,
    pub settings: Arc<SettingsEngine>,
    pub cache: Arc<ClassificationCache>,
    pub resolver: Arc<ClassificationResolver>,
    pub coordinator: Arc<MoveCoordinator>,
    pub sessions: Arc<SessionManager>,
    pub runner: Arc<OrganizeRunner>,
}

impl App {
    /// Opens the database at `db_path` and wires the HTTP-backed providers.
    pub fn new(db_path: &str, events: Arc<dyn EventSink>) -> Result<Self, Box<dyn std::error::Error>> {
        let db = Arc::new(Database::open(db_path)?);

        let tree = SqliteBookmarkTree::new(db.clone());
        tree.ensure_default_roots()?;
        let store: Arc<dyn StateStore> = Arc::new(SqliteStateStore::new(db.clone()));
        let crypto = CryptoService::new().map_err(|e| format!("CryptoService init failed: {}", e))?;

        let mut app = Self::with_components(AppComponents {
            tree: Arc::new(tree),
            store: store.clone(),
            providers: Arc::new(HttpProviderFactory),
            enricher: MetadataEnricher::with_http_sources(store),
            events,
            crypto,
        })?;
        app.db = Some(db);
        Ok(app)
    }

    pub fn with_components(components: AppComponents) -> Result<Self, Box<dyn std::error::Error>> {
        let AppComponents {
            tree,
            store,
            providers,
            enricher,
            events,
            crypto,
        } = components;

        let settings = Arc::new(SettingsEngine::new(store.clone(), crypto));
        let cache = Arc::new(
            ClassificationCache::new(store.clone())
                .map_err(|e| format!("ClassificationCache init failed: {}", e))?,
        );
        let resolver = Arc::new(ClassificationResolver::new(
            cache.clone(),
            Arc::new(enricher),
            providers,
            tree.clone(),
            settings.clone(),
        ));
        let coordinator = Arc::new(
            MoveCoordinator::new(tree.clone(), store.clone(), settings.clone(), events.clone())
                .map_err(|e| format!("MoveCoordinator init failed: {}", e))?,
        );
        let sessions = Arc::new(
            SessionManager::new(
                store.clone(),
                tree.clone(),
                coordinator.clone(),
                settings.clone(),
                events.clone(),
            )
            .map_err(|e| format!("SessionManager init failed: {}", e))?,
        );
        let runner = Arc::new(OrganizeRunner::new(
            tree.clone(),
            resolver.clone(),
            coordinator.clone(),
            sessions.clone(),
            settings.clone(),
            events.clone(),
        ));

        Ok(Self {
            db: None,
            tree,
            store,
            events,
            settings,
            cache,
            resolver,
            coordinator,
            sessions,
            runner,
        })
    }

    /// Startup sequence: drop expired classifications.
    pub fn startup(&self) {
        let evicted = self.cache.evict_expired();
        let stats = self.cache.stats();
        info!(records = stats.total, locked = stats.locked, evicted, "engine ready");
    }

    /// Winds down a server loop: a running batch is asked to pause, every
    /// request still in `requests` is awaited, then [`shutdown`](Self::shutdown)
    /// runs. A batch cut off this way resumes on the next start.
    pub async fn shutdown_after(&self, mut requests: JoinSet<()>) {
        if self.runner.request_pause() {
            info!("pausing the running batch before exit");
        }
        while let Some(done) = requests.join_next().await {
            if let Err(e) = done {
                warn!(error = %e, "request task failed during shutdown");
            }
        }
        self.shutdown();
    }

    /// Shutdown sequence: flush the classification cache.
    pub fn shutdown(&self) {
        if let Err(e) = self.cache.flush() {
            warn!(error = %e, "final cache flush failed");
        }
    }
}

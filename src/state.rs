//! Application state management

use std::sync::Arc;

use axum::http::header::InvalidHeaderName;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db::{MetadataStore, SqliteMetadataStore};
use crate::events::LibraryEvents;
use crate::session::SessionResolver;
use crate::storage::BlobStore;
use crate::upload::UploadOrchestrator;

/// Error type for state initialization
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("Invalid principal header name: {0}")]
    PrincipalHeader(#[from] InvalidHeaderName),
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    pub config: Config,
    pub db: SqlitePool,
    pub blob_store: Arc<dyn BlobStore>,
    pub events: LibraryEvents,
    pub sessions: SessionResolver,
    pub orchestrator: UploadOrchestrator,
}

impl AppState {
    /// Create a new application state
    ///
    /// Song rows go to `db`; objects go to `blob_store`.
    pub fn new(config: Config, blob_store: Arc<dyn BlobStore>, db: SqlitePool) -> Result<Self, StateError> {
        let sessions = SessionResolver::new(&config.auth.principal_header)?;
        let events = LibraryEvents::default();
        let metadata: Arc<dyn MetadataStore> = Arc::new(SqliteMetadataStore::new(db.clone()));
        let orchestrator = UploadOrchestrator::from_config(
            &config.upload,
            blob_store.clone(),
            metadata,
            events.clone(),
        );

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                db,
                blob_store,
                events,
                sessions,
                orchestrator,
            }),
        })
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the database pool
    pub fn db(&self) -> &SqlitePool {
        &self.inner.db
    }

    /// Get the blob store
    pub fn blob_store(&self) -> &Arc<dyn BlobStore> {
        &self.inner.blob_store
    }

    /// Get the library event fan-out
    pub fn events(&self) -> &LibraryEvents {
        &self.inner.events
    }

    /// Get the principal resolver
    pub fn sessions(&self) -> &SessionResolver {
        &self.inner.sessions
    }

    /// Get the upload orchestrator
    pub fn orchestrator(&self) -> &UploadOrchestrator {
        &self.inner.orchestrator
    }
}

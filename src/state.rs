//! Store handles and application state.
//!
//! Stores are built once in the entry point and passed down explicitly;
//! nothing reaches for a global connection.

use std::sync::Arc;

use crate::config::Settings;
use crate::db::establish_async_connection_pool;
use crate::error::{AppError, AppResult};
use crate::external::{HttpSource, SourceFetcher, build_http_client};
use crate::jobs::{JobStore, MemoryJobStore, PgJobStore, TaskResources};
use crate::repositories::{MemberStore, MemoryMemberRepository, PgMemberRepository};
use crate::services::{PipelineService, Services};

/// The job store and canonical store selected by `database.url`.
#[derive(Clone)]
pub struct Stores {
    pub jobs: Arc<dyn JobStore>,
    pub members: Arc<dyn MemberStore>,
}

impl Stores {
    /// PostgreSQL stores sharing one pool, or in-process stores for
    /// `memory:` URLs.
    pub async fn connect(settings: &Settings) -> AppResult<Self> {
        if settings.database.is_memory() {
            tracing::warn!("Using in-memory stores; nothing will persist past this process");
            return Ok(Self::in_memory(settings));
        }

        if settings.database.auto_migrate {
            let applied = crate::db::run_pending_migrations(&settings.database.url).await?;
            if !applied.is_empty() {
                tracing::info!(applied = ?applied, "Applied pending migrations");
            }
        }

        let pool = establish_async_connection_pool(&settings.database).await?;
        Ok(Self {
            jobs: Arc::new(PgJobStore::new(pool.clone(), settings.jobs.allowed_skew())),
            members: Arc::new(PgMemberRepository::new(pool)),
        })
    }

    pub fn in_memory(settings: &Settings) -> Self {
        Self {
            jobs: Arc::new(MemoryJobStore::new(settings.jobs.allowed_skew())),
            members: Arc::new(MemoryMemberRepository::new()),
        }
    }

    /// Handles for task bodies, with an HTTP source built from the scraper
    /// settings.
    pub fn task_resources(&self, settings: &Settings) -> AppResult<Arc<TaskResources>> {
        let client = build_http_client(&settings.scraper).map_err(|e| AppError::Configuration {
            key: "scraper".to_string(),
            source: anyhow::Error::from(e),
        })?;
        let source: Arc<dyn SourceFetcher> = Arc::new(HttpSource::new(client));

        let resources = TaskResources::new(
            Arc::clone(&self.jobs),
            Arc::clone(&self.members),
            source,
            settings.scraper.clone(),
            settings.jobs.clone(),
        )?;
        Ok(Arc::new(resources))
    }
}

/// Application state for the status API.
///
/// Cloning is cheap since every handle is an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub services: Services,
    pub version: String,
}

impl AppState {
    pub fn new(stores: &Stores, settings: &Settings) -> Self {
        let pipeline = PipelineService::new(Arc::clone(&stores.jobs), settings.jobs.clone());
        Self {
            services: Services::new(pipeline),
            version: settings.application.version.clone(),
        }
    }
}

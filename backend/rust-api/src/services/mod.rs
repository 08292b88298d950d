use anyhow::Context;
use mongodb::Client as MongoClient;
use std::sync::Arc;

use crate::config::{Config, StoreBackend};
use crate::store::{MemoryStore, MongoStore, SchoolStore};

pub mod attempt_service;
pub mod exam_service;
pub mod grading;
pub mod keyed_lock;
pub mod notification_service;
pub mod ranking;
pub mod result_sync;
pub mod score_service;

use keyed_lock::{AttemptLocks, CohortLocks};
use notification_service::{Notifier, StoreNotifier};

pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn SchoolStore>,
    pub notifier: Arc<dyn Notifier>,
    pub cohort_locks: CohortLocks,
    pub attempt_locks: AttemptLocks,
}

impl AppState {
    /// State over an existing store, notifications persisted in the same store
    pub fn new(config: Config, store: Arc<dyn SchoolStore>) -> Self {
        let notifier = Arc::new(StoreNotifier::new(store.clone()));
        Self::with_notifier(config, store, notifier)
    }

    pub fn with_notifier(
        config: Config,
        store: Arc<dyn SchoolStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            store,
            notifier,
            cohort_locks: CohortLocks::new(),
            attempt_locks: AttemptLocks::new(),
        }
    }

    /// Opens the configured backend
    pub async fn connect(config: Config) -> anyhow::Result<Self> {
        let store: Arc<dyn SchoolStore> = match config.store_backend {
            StoreBackend::Mongo => {
                let client = MongoClient::with_uri_str(&config.mongo_uri)
                    .await
                    .context("Failed to connect to MongoDB")?;
                let store = MongoStore::new(client.database(&config.mongo_database));
                store.ensure_indexes().await?;
                tracing::info!("MongoDB connected ({})", config.mongo_database);
                Arc::new(store)
            }
            StoreBackend::Memory => {
                tracing::warn!("Using in-memory store, data is lost on restart");
                Arc::new(MemoryStore::new())
            }
        };

        Ok(Self::new(config, store))
    }
}

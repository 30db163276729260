//! Ties the job store, the REST API and the push channel together.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, watch};

use crate::api::{CrawlApi, HttpCrawlApi};
use crate::config::SyncConfig;
use crate::error::{FetchError, SyncError};
use crate::record::JobId;
use crate::store::{AggregateSummary, JobSnapshot, JobStore, ReplaceReport, StoreChange};
use crate::stream::{ConnectionState, Connector, ReconnectPolicy, StreamManager, WsConnector};

/// Outcome of the most recent bulk fetch.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FetchStatus {
    pub loading: bool,
    pub last_error: Option<String>,
    pub last_refreshed: Option<DateTime<Utc>>,
}

pub struct SyncEngine {
    store: Arc<JobStore>,
    api: Arc<dyn CrawlApi>,
    stream: StreamManager,
    fetch_status: RwLock<FetchStatus>,
}

impl SyncEngine {
    pub fn new(
        store: Arc<JobStore>,
        api: Arc<dyn CrawlApi>,
        connector: Arc<dyn Connector>,
        policy: ReconnectPolicy,
    ) -> Self {
        let stream = StreamManager::new(connector, store.clone(), policy);
        Self {
            store,
            api,
            stream,
            fetch_status: RwLock::new(FetchStatus::default()),
        }
    }

    /// Builds an engine talking HTTP and WebSocket to the configured service.
    pub fn from_config(config: &SyncConfig) -> Result<Self, SyncError> {
        let api = HttpCrawlApi::new(
            &config.api_base_url,
            config.request_timeout(),
            &config.headers,
        )?;
        let connector = WsConnector::new(config.stream_url.clone())
            .with_headers(config.headers.clone())
            .with_handshake_timeout(config.connect_timeout());
        let store = JobStore::with_options(config.conflict_policy, config.change_buffer);

        Ok(Self::new(
            Arc::new(store),
            Arc::new(api),
            Arc::new(connector),
            config.reconnect.policy(),
        ))
    }

    // ─── Bulk load ───

    /// Replaces the table with a fresh bulk fetch.
    ///
    /// On failure the previous snapshot is kept and the error is both
    /// recorded in [`FetchStatus`] and returned.
    pub async fn refresh(&self) -> Result<ReplaceReport, FetchError> {
        self.update_status(|status| {
            status.loading = true;
            status.last_error = None;
        });

        match self.api.fetch_all().await {
            Ok(jobs) => {
                let report = self.store.replace_all(&jobs);
                log::debug!("Refresh applied at revision {}", self.store.revision());
                self.update_status(|status| {
                    status.loading = false;
                    status.last_refreshed = Some(Utc::now());
                });
                Ok(report)
            }
            Err(e) => {
                log::error!("Failed to fetch jobs: {}", e);
                let message = e.to_string();
                self.update_status(|status| {
                    status.loading = false;
                    status.last_error = Some(message);
                });
                Err(e)
            }
        }
    }

    pub fn fetch_status(&self) -> FetchStatus {
        match self.fetch_status.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => {
                log::warn!("Fetch status lock was poisoned, recovering");
                poisoned.into_inner().clone()
            }
        }
    }

    fn update_status(&self, f: impl FnOnce(&mut FetchStatus)) {
        match self.fetch_status.write() {
            Ok(mut guard) => f(&mut *guard),
            Err(poisoned) => {
                log::warn!("Fetch status lock was poisoned, recovering");
                f(&mut *poisoned.into_inner())
            }
        }
    }

    // ─── Stream ───

    pub fn start(&self) {
        self.stream.start();
    }

    pub async fn stop(&self) {
        self.stream.stop().await;
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.stream.state()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.stream.subscribe_state()
    }

    pub fn stream(&self) -> &StreamManager {
        &self.stream
    }

    // ─── Job control ───

    /// Submits a URL. The created job reaches the table through the stream.
    pub async fn submit(&self, url: &str) -> Result<Value, FetchError> {
        self.api.submit(url).await
    }

    pub async fn rerun(&self, id: JobId) -> Result<(), FetchError> {
        self.api.rerun(id).await
    }

    /// Deletes jobs on the server, then drops them locally. Returns how many
    /// records left the table.
    pub async fn delete(&self, ids: &[JobId]) -> Result<usize, FetchError> {
        match ids {
            [] => return Ok(0),
            [id] => self.api.delete(*id).await?,
            _ => self.api.delete_bulk(ids).await?,
        }
        Ok(self.store.remove(ids.iter().copied()))
    }

    // ─── Read side ───

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    pub fn snapshot(&self) -> JobSnapshot {
        self.store.snapshot()
    }

    pub fn summary(&self) -> AggregateSummary {
        self.store.summary()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.store.subscribe()
    }
}

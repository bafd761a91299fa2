use std::sync::Arc;

use lifeflow_core::row::TableName;

use crate::chat::ChatLog;
use crate::config::ClientConfig;
use crate::error::ClientResult;
use crate::live::{LiveQuery, LiveQueryParams};
use crate::panel::PanelCoordinator;
use crate::presence::PresenceTracker;
use crate::remote::RemoteService;
use crate::service::DataService;

/// Front door of the client: configuration, the service connection, and
/// the shared panel coordinator. Wrapped in `Arc` so cloning is cheap and
/// every screen shares one connection.
#[derive(Clone)]
pub struct LifeFlow {
    inner: Arc<Inner>,
}

struct Inner {
    config: ClientConfig,
    service: Arc<dyn DataService>,
    panels: PanelCoordinator,
}

impl LifeFlow {
    /// Connect to the hosted service described by `config`.
    pub fn connect(config: ClientConfig) -> ClientResult<Self> {
        let service = Arc::new(RemoteService::new(&config)?);
        Ok(Self::with_service(config, service))
    }

    /// Connect using environment configuration.
    pub fn from_env() -> anyhow::Result<Self> {
        let config = ClientConfig::from_env()?;
        tracing::info!(app = %config.app_name, url = %config.service_url, "starting client");
        Ok(Self::connect(config)?)
    }

    /// Build over any service implementation; tests and local fixtures
    /// pass a [`crate::memory::MemoryService`] here.
    pub fn with_service(config: ClientConfig, service: Arc<dyn DataService>) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                service,
                panels: PanelCoordinator::new(),
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn service(&self) -> Arc<dyn DataService> {
        self.inner.service.clone()
    }

    /// The single owner of floating-panel state, shared by all clones.
    pub fn panels(&self) -> &PanelCoordinator {
        &self.inner.panels
    }

    /// Start a live query against the shared connection.
    pub fn live_query(&self, params: LiveQueryParams) -> LiveQuery {
        LiveQuery::spawn(self.service(), params)
    }

    pub fn presence(&self, table: impl Into<TableName>) -> PresenceTracker {
        PresenceTracker::spawn(self.service(), table)
    }

    pub fn chat(
        &self,
        table: impl Into<TableName>,
        room_column: impl Into<String>,
        room_id: impl Into<String>,
    ) -> ChatLog {
        ChatLog::spawn(
            self.service(),
            table,
            room_column,
            room_id,
            self.inner.config.snapshot_limit,
        )
    }

    pub fn storage_url(&self, bucket: &str, path: &str) -> String {
        self.inner.service.public_url(bucket, path)
    }
}

use crate::application::ports::{OfflineStore, RemoteStore};
use crate::application::services::{
    ConnectivityMonitor, SaleService, SyncService, TaskHandle, ValidationService,
};
use crate::domain::value_objects::ticketing::UserId;
use crate::infrastructure::database::ConnectionPool;
use crate::infrastructure::offline::SqliteOfflineStore;
use crate::infrastructure::remote::{InMemoryRemoteStore, RestRemoteStore};
use crate::shared::config::{AppConfig, RemoteConfig};
use crate::shared::error::AppError;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// 保持期間の上限（約100年）
const MAX_RETENTION_HOURS: u64 = 876_000;

/// 端末全体の状態。サービス間で同じストアと接続状態を共有する。
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub pool: ConnectionPool,
    pub store: Arc<dyn OfflineStore>,
    pub remote: Arc<dyn RemoteStore>,
    pub connectivity: Arc<ConnectivityMonitor>,
    pub sale_service: Arc<SaleService>,
    pub validation_service: Arc<ValidationService>,
    pub sync_service: Arc<SyncService>,
}

impl AppState {
    pub async fn new(config: AppConfig) -> Result<Self, AppError> {
        config.validate().map_err(AppError::ConfigurationError)?;
        let remote = build_remote(&config.remote)?;
        Self::with_remote(config, remote).await
    }

    pub async fn with_remote(
        config: AppConfig,
        remote: Arc<dyn RemoteStore>,
    ) -> Result<Self, AppError> {
        if let Some(path) = database_path(&config.database.url) {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|err| {
                    AppError::Storage(format!(
                        "Failed to create data directory {}: {err}",
                        parent.display()
                    ))
                })?;
            }
        }

        let pool = ConnectionPool::with_options(
            &config.database.url,
            config.database.max_connections,
            Duration::from_secs(config.database.connection_timeout),
        )
        .await?;
        pool.migrate().await?;

        let store: Arc<dyn OfflineStore> =
            Arc::new(SqliteOfflineStore::new(pool.get_pool().clone()));
        let connectivity = Arc::new(ConnectivityMonitor::new(store.clone(), false));

        let operator = config
            .terminal
            .seller_id
            .as_deref()
            .map(UserId::parse)
            .transpose()
            .map_err(AppError::ConfigurationError)?;

        let sale_service = Arc::new(SaleService::new(
            store.clone(),
            remote.clone(),
            connectivity.clone(),
            config.terminal.offline_first,
        ));
        let validation_service = Arc::new(ValidationService::new(store.clone(), operator));

        let mut sync_service = SyncService::new(store.clone(), remote.clone(), connectivity.clone());
        if config.sync.purge_synced {
            let hours = config.sync.purge_retention_hours.min(MAX_RETENTION_HOURS) as i64;
            sync_service = sync_service.with_purge_retention(chrono::Duration::hours(hours));
        }

        connectivity.refresh_pending_count().await?;

        tracing::info!(
            database = %config.database.url,
            offline_first = config.terminal.offline_first,
            "terminal state initialized"
        );

        Ok(Self {
            config: Arc::new(config),
            pool,
            store,
            remote,
            connectivity,
            sale_service,
            validation_service,
            sync_service: Arc::new(sync_service),
        })
    }

    /// リモートへ一度 ping して接続状態を確定させる。
    pub async fn probe_once(&self) -> bool {
        let online = self.remote.ping().await.is_ok();
        self.connectivity.set_online(online);
        online
    }

    /// 接続確認・未同期件数ポーリング・自動同期を起動する。
    pub fn start_background(&self) -> BackgroundTasks {
        let sync = &self.config.sync;
        let mut handles = vec![
            self.connectivity.start_probe(
                self.remote.clone(),
                Duration::from_secs(sync.probe_interval),
            ),
            self.connectivity
                .start_pending_poll(Duration::from_secs(sync.pending_poll_interval)),
        ];
        if sync.auto_sync {
            handles.push(
                self.sync_service
                    .start_auto_sync(Duration::from_secs(sync.sync_interval)),
            );
        }
        BackgroundTasks { handles }
    }

    pub async fn shutdown(&self) {
        self.pool.close().await;
    }
}

/// バックグラウンドタスクの集合。
pub struct BackgroundTasks {
    handles: Vec<TaskHandle>,
}

impl BackgroundTasks {
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub async fn stop(self) {
        // 同期を先に止めてから監視系を止める
        for handle in self.handles.into_iter().rev() {
            handle.stop().await;
        }
    }
}

fn build_remote(config: &RemoteConfig) -> Result<Arc<dyn RemoteStore>, AppError> {
    match &config.base_url {
        Some(base_url) => Ok(Arc::new(RestRemoteStore::new(
            base_url.clone(),
            config.api_key.clone(),
            Duration::from_secs(config.request_timeout),
        )?)),
        None => {
            tracing::warn!("no remote configured, running standalone");
            let remote = InMemoryRemoteStore::new();
            remote.set_available(false);
            Ok(Arc::new(remote))
        }
    }
}

fn database_path(url: &str) -> Option<PathBuf> {
    let rest = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))?;
    let path = rest.split('?').next().unwrap_or_default();
    if path.is_empty() || path.contains(":memory:") {
        return None;
    }
    Some(PathBuf::from(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_path_ignores_memory_urls() {
        assert_eq!(database_path("sqlite::memory:"), None);
        assert_eq!(
            database_path("sqlite:///var/lib/gate/offline.db?mode=rwc"),
            Some(PathBuf::from("/var/lib/gate/offline.db"))
        );
    }

    #[tokio::test]
    async fn standalone_state_starts_offline() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.database.url = format!("sqlite://{}", dir.path().join("nested/gate.db").display());
        config.terminal.seller_id = Some("cashier-1".into());

        let state = AppState::new(config).await.unwrap();
        assert!(!state.probe_once().await);
        assert_eq!(state.connectivity.state().pending_count, 0);

        let tasks = state.start_background();
        assert_eq!(tasks.len(), 3);
        tasks.stop().await;
        state.shutdown().await;
    }
}

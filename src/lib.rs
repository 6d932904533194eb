pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod shared;
pub mod state;

pub use application::ports::{OfflineStore, RemoteError, RemoteStore};
pub use application::services::{
    AutoSyncHandle, ConnectivityMonitor, SaleService, SyncService, TaskHandle, ValidationService,
};
pub use shared::{AppConfig, AppError, Result};
pub use state::AppState;

/// ログ設定を初期化する。`RUST_LOG` が無ければ `museum_gate=debug,info`。
pub fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "museum_gate=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

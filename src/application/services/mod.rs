pub mod connectivity_monitor;
pub mod sale_service;
pub mod sync_service;
pub mod task_handle;
pub mod validation_service;

pub use connectivity_monitor::{ConnectivityMonitor, DEFAULT_PENDING_POLL_INTERVAL};
pub use sale_service::SaleService;
pub use sync_service::{AutoSyncHandle, SyncService, DEFAULT_SYNC_INTERVAL};
pub use task_handle::TaskHandle;
pub use validation_service::ValidationService;

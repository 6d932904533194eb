use crate::application::ports::offline_store::OfflineStore;
use crate::application::ports::remote_store::RemoteStore;
use crate::application::services::task_handle::TaskHandle;
use crate::domain::entities::ticketing::ConnectivityState;
use crate::shared::error::AppError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::time::MissedTickBehavior;

pub const DEFAULT_PENDING_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// オンライン状態と未同期件数の唯一の情報源。
///
/// 接続状態はイベントで即時に、未同期件数はポーリングで更新する。
pub struct ConnectivityMonitor {
    store: Arc<dyn OfflineStore>,
    state_tx: watch::Sender<ConnectivityState>,
}

impl ConnectivityMonitor {
    pub fn new(store: Arc<dyn OfflineStore>, initially_online: bool) -> Self {
        let (state_tx, _) = watch::channel(ConnectivityState {
            is_online: initially_online,
            pending_count: 0,
        });
        Self { store, state_tx }
    }

    pub fn state(&self) -> ConnectivityState {
        *self.state_tx.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.state_tx.borrow().is_online
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectivityState> {
        self.state_tx.subscribe()
    }

    /// 状態が変わった場合だけ通知する。変化があれば true。
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.state_tx.send_if_modified(|state| {
            if state.is_online == online {
                return false;
            }
            state.is_online = online;
            true
        });
        if changed {
            tracing::info!(
                target: "offline::connectivity",
                online,
                "connectivity changed"
            );
        }
        changed
    }

    pub async fn refresh_pending_count(&self) -> Result<u64, AppError> {
        let count = self.store.pending_count().await?.total();
        self.state_tx.send_if_modified(|state| {
            if state.pending_count == count {
                return false;
            }
            state.pending_count = count;
            true
        });
        Ok(count)
    }

    pub fn start_pending_poll(self: &Arc<Self>, interval: Duration) -> TaskHandle {
        let monitor = Arc::clone(self);
        let (stop_tx, mut stop_rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        if let Err(err) = monitor.refresh_pending_count().await {
                            tracing::warn!(
                                target: "offline::connectivity",
                                error = %err,
                                "failed to poll pending count"
                            );
                        }
                    }
                }
            }
        });

        TaskHandle::new("pending-poll", stop_tx, task)
    }

    /// ネイティブ端末向け。リモートへの ping の成否をオンライン状態とみなす。
    pub fn start_probe(
        self: &Arc<Self>,
        remote: Arc<dyn RemoteStore>,
        interval: Duration,
    ) -> TaskHandle {
        let monitor = Arc::clone(self);
        let (stop_tx, mut stop_rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        let reachable = match remote.ping().await {
                            Ok(()) => true,
                            Err(err) => {
                                tracing::debug!(
                                    target: "offline::connectivity",
                                    error = %err,
                                    "remote probe failed"
                                );
                                false
                            }
                        };
                        monitor.set_online(reachable);
                    }
                }
            }
        });

        TaskHandle::new("connectivity-probe", stop_tx, task)
    }
}

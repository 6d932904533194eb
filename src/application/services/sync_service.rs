use crate::application::ports::offline_store::OfflineStore;
use crate::application::ports::remote_store::{RemoteError, RemoteStore};
use crate::application::services::connectivity_monitor::ConnectivityMonitor;
use crate::application::services::task_handle::TaskHandle;
use crate::domain::entities::ticketing::{
    PendingUsage, ReferenceKind, ReferenceSnapshot, SyncReport, SyncSkipReason,
};
use crate::domain::value_objects::ticketing::TicketId;
use crate::infrastructure::offline::metrics::{SyncMetrics, SyncMetricsSnapshot};
use crate::shared::error::AppError;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, Mutex};
use tokio::time::MissedTickBehavior;

pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(30);
pub const LAST_SYNC_AT_KEY: &str = "last_sync_at";
pub const LAST_CACHE_REFRESH_AT_KEY: &str = "last_cache_refresh_at";

/// 自動同期のハンドル。drop すると同期タスクを中断する。
pub type AutoSyncHandle = TaskHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Drained {
    Completed,
    Interrupted,
}

/// 未同期レコードをリモートへ反映し、参照キャッシュを更新する。
pub struct SyncService {
    store: Arc<dyn OfflineStore>,
    remote: Arc<dyn RemoteStore>,
    connectivity: Arc<ConnectivityMonitor>,
    gate: Mutex<()>,
    metrics: SyncMetrics,
    purge_retention: Option<chrono::Duration>,
}

impl SyncService {
    pub fn new(
        store: Arc<dyn OfflineStore>,
        remote: Arc<dyn RemoteStore>,
        connectivity: Arc<ConnectivityMonitor>,
    ) -> Self {
        Self {
            store,
            remote,
            connectivity,
            gate: Mutex::new(()),
            metrics: SyncMetrics::new(),
            purge_retention: None,
        }
    }

    /// 同期済みレコードを `retention` 経過後に削除する。
    pub fn with_purge_retention(mut self, retention: chrono::Duration) -> Self {
        self.purge_retention = Some(retention);
        self
    }

    pub fn metrics(&self) -> SyncMetricsSnapshot {
        self.metrics.snapshot()
    }

    pub async fn last_sync_at(&self) -> Result<Option<DateTime<Utc>>, AppError> {
        let value = self.store.get_metadata(LAST_SYNC_AT_KEY).await?;
        Ok(value
            .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
            .map(|at| at.with_timezone(&Utc)))
    }

    /// 手動同期。
    pub async fn run_sync_cycle(&self) -> Result<SyncReport, AppError> {
        self.run_cycle("manual").await
    }

    async fn run_cycle(&self, trigger: &str) -> Result<SyncReport, AppError> {
        let started = Instant::now();

        // 実行中のサイクルがあればキューせずに捨てる
        let Ok(_guard) = self.gate.try_lock() else {
            tracing::debug!(target: "offline::sync", trigger, "sync already in progress");
            let report = SyncReport::skipped(SyncSkipReason::InProgress);
            self.metrics.record_report(trigger, &report, 0);
            return Ok(report);
        };

        if !self.connectivity.is_online() {
            tracing::debug!(target: "offline::sync", trigger, "offline, sync skipped");
            let report = SyncReport::skipped(SyncSkipReason::Offline);
            self.metrics.record_report(trigger, &report, 0);
            return Ok(report);
        }

        match self.drain_and_refresh().await {
            Ok(report) => {
                let elapsed = elapsed_ms(started);
                self.metrics.record_report(trigger, &report, elapsed);
                tracing::info!(
                    target: "offline::sync",
                    trigger,
                    tickets_ok = report.tickets.success,
                    tickets_failed = report.tickets.failed,
                    usage_ok = report.usage.success,
                    usage_failed = report.usage.failed,
                    refreshed = report.refreshed.len(),
                    interrupted = report.interrupted,
                    duration_ms = elapsed,
                    "sync cycle finished"
                );
                Ok(report)
            }
            Err(err) => {
                self.metrics
                    .record_failure(trigger, &err.to_string(), elapsed_ms(started));
                tracing::error!(
                    target: "offline::sync",
                    trigger,
                    error = %err,
                    "sync cycle failed"
                );
                Err(err)
            }
        }
    }

    async fn drain_and_refresh(&self) -> Result<SyncReport, AppError> {
        let mut report = SyncReport::default();

        if self.drain_tickets(&mut report).await? == Drained::Interrupted
            || self.drain_usage(&mut report).await? == Drained::Interrupted
        {
            report.interrupted = true;
            return Ok(report);
        }

        if self.refresh_cache(&mut report).await? == Drained::Interrupted {
            report.interrupted = true;
            return Ok(report);
        }

        let now = Utc::now();
        self.store
            .set_metadata(LAST_SYNC_AT_KEY, &now.to_rfc3339())
            .await?;
        if !report.refreshed.is_empty() {
            self.store
                .set_metadata(LAST_CACHE_REFRESH_AT_KEY, &now.to_rfc3339())
                .await?;
        }

        if let Some(retention) = self.purge_retention {
            let purged = self.store.purge_synced(now - retention).await?;
            if purged > 0 {
                tracing::debug!(target: "offline::sync", purged, "purged synced records");
            }
        }

        Ok(report)
    }

    async fn drain_tickets(&self, report: &mut SyncReport) -> Result<Drained, AppError> {
        let tickets = self.store.list_unsynced_tickets().await?;

        for ticket in tickets {
            if !self.connectivity.is_online() {
                return Ok(Drained::Interrupted);
            }

            let accepted = match self.remote.insert_ticket(&ticket).await {
                Ok(()) => true,
                Err(RemoteError::DuplicateKey(_)) => {
                    tracing::debug!(
                        target: "offline::sync",
                        ticket_id = %ticket.id,
                        "ticket already applied remotely"
                    );
                    true
                }
                Err(err) => {
                    tracing::warn!(
                        target: "offline::sync",
                        ticket_id = %ticket.id,
                        error = %err,
                        "ticket sync failed"
                    );
                    false
                }
            };

            let synced = accepted && self.mark_synced_ticket(&ticket.id).await;
            report.tickets.record(synced);
        }

        Ok(Drained::Completed)
    }

    async fn drain_usage(&self, report: &mut SyncReport) -> Result<Drained, AppError> {
        let events = self.store.list_unsynced_usage().await?;

        for usage in events {
            if !self.connectivity.is_online() {
                return Ok(Drained::Interrupted);
            }

            let accepted = match self.remote.insert_usage_event(&usage).await {
                Ok(()) => true,
                Err(RemoteError::DuplicateKey(_)) => true,
                Err(err) => {
                    tracing::warn!(
                        target: "offline::sync",
                        usage_id = %usage.id,
                        ticket_id = %usage.ticket_id,
                        error = %err,
                        "usage sync failed"
                    );
                    false
                }
            };

            if !accepted {
                report.usage.record(false);
                continue;
            }

            let synced = self.mark_synced_usage(&usage).await;
            report.usage.record(synced);
            self.push_remaining_credits(&usage).await;
        }

        Ok(Drained::Completed)
    }

    async fn mark_synced_ticket(&self, id: &TicketId) -> bool {
        match self.store.mark_ticket_synced(id).await {
            Ok(()) => true,
            Err(err) => {
                // 次のサイクルで重複キーとして解決される
                tracing::warn!(
                    target: "offline::sync",
                    ticket_id = %id,
                    error = %err,
                    "failed to mark ticket synced"
                );
                false
            }
        }
    }

    async fn mark_synced_usage(&self, usage: &PendingUsage) -> bool {
        match self.store.mark_usage_synced(&usage.id).await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(
                    target: "offline::sync",
                    usage_id = %usage.id,
                    error = %err,
                    "failed to mark usage synced"
                );
                false
            }
        }
    }

    /// サーバー側の残数を再計算して書き戻す。失敗しても利用イベントの同期済み状態は戻さない。
    async fn push_remaining_credits(&self, usage: &PendingUsage) {
        let ticket_id = &usage.ticket_id;
        let remaining = match self.authoritative_remaining(usage).await {
            Ok(remaining) => remaining,
            Err(err) => {
                tracing::warn!(
                    target: "offline::sync",
                    ticket_id = %ticket_id,
                    error = %err,
                    "failed to recompute remaining credits"
                );
                return;
            }
        };

        let is_used = remaining == 0;
        let used_at = is_used.then_some(usage.used_at);
        if let Err(err) = self
            .remote
            .update_ticket_remaining_credits(ticket_id, remaining, is_used, used_at)
            .await
        {
            tracing::warn!(
                target: "offline::sync",
                ticket_id = %ticket_id,
                error = %err,
                "failed to update remote remaining credits"
            );
        }

        if let Err(err) = self
            .store
            .reconcile_local_credits(ticket_id, remaining)
            .await
        {
            tracing::warn!(
                target: "offline::sync",
                ticket_id = %ticket_id,
                error = %err,
                "failed to reconcile local credits"
            );
        }
    }

    async fn authoritative_remaining(&self, usage: &PendingUsage) -> Result<u32, RemoteError> {
        let initial = self.remote.ticket_initial_credits(&usage.ticket_id).await?;
        let used = self.remote.sum_usage_credits(&usage.ticket_id).await?;
        Ok(initial.saturating_sub(used))
    }

    async fn refresh_cache(&self, report: &mut SyncReport) -> Result<Drained, AppError> {
        let today = Utc::now().date_naive();

        for kind in ReferenceKind::ALL {
            if !self.connectivity.is_online() {
                return Ok(Drained::Interrupted);
            }

            let fetched = match kind {
                ReferenceKind::Museums => self
                    .remote
                    .fetch_active_museums()
                    .await
                    .map(ReferenceSnapshot::Museums),
                ReferenceKind::TicketTypes => self
                    .remote
                    .fetch_active_ticket_types()
                    .await
                    .map(ReferenceSnapshot::TicketTypes),
                ReferenceKind::MuseumPrices => self
                    .remote
                    .fetch_active_museum_prices()
                    .await
                    .map(ReferenceSnapshot::MuseumPrices),
                ReferenceKind::Sessions => self
                    .remote
                    .fetch_todays_active_sessions(today)
                    .await
                    .map(ReferenceSnapshot::Sessions),
            };

            match fetched {
                Ok(snapshot) => {
                    self.store.replace_cached_reference(snapshot).await?;
                    report.refreshed.push(kind);
                }
                Err(err) => {
                    // 取得に失敗したコレクションは前回のスナップショットを使い続ける
                    tracing::warn!(
                        target: "offline::sync",
                        collection = %kind,
                        error = %err,
                        "cache refresh failed"
                    );
                }
            }
        }

        Ok(Drained::Completed)
    }

    async fn run_triggered(&self, trigger: &str) {
        // エラーは run_cycle 内で記録済み
        let _ = self.run_cycle(trigger).await;
        if let Err(err) = self.connectivity.refresh_pending_count().await {
            tracing::warn!(
                target: "offline::sync",
                error = %err,
                "failed to refresh pending count"
            );
        }
    }

    /// 起動時（オンラインなら）、オフライン→オンライン遷移時、未同期がある状態での定期実行で同期する。
    pub fn start_auto_sync(self: &Arc<Self>, interval: Duration) -> AutoSyncHandle {
        let service = Arc::clone(self);
        let mut state_rx = self.connectivity.subscribe();
        let (stop_tx, mut stop_rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            let mut was_online = state_rx.borrow_and_update().is_online;
            if was_online {
                service.run_triggered("startup").await;
            }

            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // interval の初回 tick は即時なので読み捨てる
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    changed = state_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let online = state_rx.borrow_and_update().is_online;
                        if online && !was_online {
                            service.run_triggered("online").await;
                        }
                        was_online = online;
                    }
                    _ = ticker.tick() => {
                        match service.store.pending_count().await {
                            Ok(count) if count.total() > 0 => {
                                service.run_triggered("interval").await;
                            }
                            Ok(_) => {}
                            Err(err) => {
                                tracing::warn!(
                                    target: "offline::sync",
                                    error = %err,
                                    "failed to read pending count"
                                );
                            }
                        }
                    }
                }
            }

            tracing::debug!(target: "offline::sync", "auto sync stopped");
        });

        tracing::info!(
            target: "offline::sync",
            interval_secs = interval.as_secs(),
            "auto sync started"
        );
        TaskHandle::new("auto-sync", stop_tx, task)
    }

    pub async fn stop_auto_sync(&self, handle: AutoSyncHandle) {
        handle.stop().await;
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

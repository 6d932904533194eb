use crate::domain::entities::ticketing::SyncReport;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SyncCycleStatus {
    Completed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SyncMetricsSnapshot {
    pub cycles_completed: u64,
    pub cycles_failed: u64,
    pub cycles_skipped: u64,
    pub records_synced: u64,
    pub records_failed: u64,
    pub failing_streak: u64,
    pub last_completed_at_ms: Option<u64>,
    pub last_failed_at_ms: Option<u64>,
    pub last_status: Option<SyncCycleStatus>,
    pub last_trigger: Option<String>,
    pub last_duration_ms: Option<u64>,
    pub last_synced_records: Option<u32>,
    pub last_failed_records: Option<u32>,
    pub last_error: Option<String>,
}

#[derive(Default, Clone)]
struct LastCycleMetadata {
    status: Option<SyncCycleStatus>,
    trigger: Option<String>,
    duration_ms: Option<u64>,
    synced_records: Option<u32>,
    failed_records: Option<u32>,
    error: Option<String>,
}

/// 同期サイクルの集計。`SyncService` ごとに1つ持つ。
pub struct SyncMetrics {
    completed: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
    records_synced: AtomicU64,
    records_failed: AtomicU64,
    failing_streak: AtomicU64,
    last_completed_at_ms: AtomicU64,
    last_failed_at_ms: AtomicU64,
    metadata: Mutex<LastCycleMetadata>,
}

impl Default for SyncMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self {
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            records_synced: AtomicU64::new(0),
            records_failed: AtomicU64::new(0),
            failing_streak: AtomicU64::new(0),
            last_completed_at_ms: AtomicU64::new(0),
            last_failed_at_ms: AtomicU64::new(0),
            metadata: Mutex::new(LastCycleMetadata::default()),
        }
    }

    pub fn record_report(&self, trigger: &str, report: &SyncReport, duration_ms: u64) {
        if report.skipped.is_some() {
            self.skipped.fetch_add(1, Ordering::Relaxed);
            self.update_metadata(SyncCycleStatus::Skipped, trigger, None, None, None);
            return;
        }

        let success = report.total_success();
        let failed = report.total_failed();
        self.completed.fetch_add(1, Ordering::Relaxed);
        self.records_synced
            .fetch_add(u64::from(success), Ordering::Relaxed);
        self.records_failed
            .fetch_add(u64::from(failed), Ordering::Relaxed);

        // 全件失敗したサイクルだけを連続失敗として数える
        if failed > 0 && success == 0 {
            self.failing_streak.fetch_add(1, Ordering::Relaxed);
            self.last_failed_at_ms
                .store(now_ms(), Ordering::Relaxed);
        } else {
            self.failing_streak.store(0, Ordering::Relaxed);
            self.last_completed_at_ms
                .store(now_ms(), Ordering::Relaxed);
        }

        self.update_metadata(
            SyncCycleStatus::Completed,
            trigger,
            Some(duration_ms),
            Some((success, failed)),
            None,
        );
    }

    pub fn record_failure(&self, trigger: &str, error: &str, duration_ms: u64) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.failing_streak.fetch_add(1, Ordering::Relaxed);
        self.last_failed_at_ms
            .store(now_ms(), Ordering::Relaxed);
        self.update_metadata(
            SyncCycleStatus::Failed,
            trigger,
            Some(duration_ms),
            None,
            Some(error.to_string()),
        );
    }

    fn update_metadata(
        &self,
        status: SyncCycleStatus,
        trigger: &str,
        duration_ms: Option<u64>,
        counts: Option<(u32, u32)>,
        error: Option<String>,
    ) {
        if let Ok(mut guard) = self.metadata.lock() {
            guard.status = Some(status);
            guard.trigger = Some(trigger.to_string());
            guard.duration_ms = duration_ms;
            guard.synced_records = counts.map(|(success, _)| success);
            guard.failed_records = counts.map(|(_, failed)| failed);
            guard.error = error;
        }
    }

    pub fn snapshot(&self) -> SyncMetricsSnapshot {
        let metadata = self
            .metadata
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default();

        SyncMetricsSnapshot {
            cycles_completed: self.completed.load(Ordering::Relaxed),
            cycles_failed: self.failed.load(Ordering::Relaxed),
            cycles_skipped: self.skipped.load(Ordering::Relaxed),
            records_synced: self.records_synced.load(Ordering::Relaxed),
            records_failed: self.records_failed.load(Ordering::Relaxed),
            failing_streak: self.failing_streak.load(Ordering::Relaxed),
            last_completed_at_ms: nonzero(self.last_completed_at_ms.load(Ordering::Relaxed)),
            last_failed_at_ms: nonzero(self.last_failed_at_ms.load(Ordering::Relaxed)),
            last_status: metadata.status,
            last_trigger: metadata.trigger,
            last_duration_ms: metadata.duration_ms,
            last_synced_records: metadata.synced_records,
            last_failed_records: metadata.failed_records,
            last_error: metadata.error,
        }
    }
}

fn nonzero(value: u64) -> Option<u64> {
    (value != 0).then_some(value)
}

fn now_ms() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default()
}

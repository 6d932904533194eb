use crate::domain::entities::ticketing::reference::ReferenceKind;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncTally {
    pub success: u32,
    pub failed: u32,
}

impl SyncTally {
    pub fn record(&mut self, ok: bool) {
        if ok {
            self.success += 1;
        } else {
            self.failed += 1;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncSkipReason {
    Offline,
    InProgress,
}

/// 1サイクル分の結果。部分失敗はサイクル失敗ではない。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub tickets: SyncTally,
    pub usage: SyncTally,
    pub refreshed: Vec<ReferenceKind>,
    pub skipped: Option<SyncSkipReason>,
    pub interrupted: bool,
}

impl SyncReport {
    pub fn skipped(reason: SyncSkipReason) -> Self {
        Self {
            skipped: Some(reason),
            ..Self::default()
        }
    }

    pub fn total_success(&self) -> u32 {
        self.tickets.success + self.usage.success
    }

    pub fn total_failed(&self) -> u32 {
        self.tickets.failed + self.usage.failed
    }
}

/// 画面やバッジが参照する接続状態。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectivityState {
    pub is_online: bool,
    pub pending_count: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingCount {
    pub tickets: u64,
    pub usage: u64,
}

impl PendingCount {
    pub fn total(&self) -> u64 {
        self.tickets + self.usage
    }
}

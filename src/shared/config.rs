use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub remote: RemoteConfig,
    pub sync: SyncConfig,
    pub terminal: TerminalConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connection_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub request_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub auto_sync: bool,
    /// 定期同期の間隔（秒）
    pub sync_interval: u64,
    /// 未同期件数のポーリング間隔（秒）
    pub pending_poll_interval: u64,
    /// 接続確認の間隔（秒）
    pub probe_interval: u64,
    pub purge_synced: bool,
    pub purge_retention_hours: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminalConfig {
    pub seller_id: Option<String>,
    pub museum_id: Option<String>,
    pub offline_first: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: default_database_url(),
                max_connections: 5,
                connection_timeout: 30,
            },
            remote: RemoteConfig {
                base_url: None,
                api_key: None,
                request_timeout: 10,
            },
            sync: SyncConfig {
                auto_sync: true,
                sync_interval: 30,
                pending_poll_interval: 5,
                probe_interval: 10,
                purge_synced: false,
                purge_retention_hours: 24,
            },
            terminal: TerminalConfig {
                seller_id: None,
                museum_id: None,
                offline_first: true,
            },
        }
    }
}

fn default_database_url() -> String {
    let dir = dirs::data_local_dir()
        .map(|dir| dir.join("museum-gate"))
        .unwrap_or_else(|| PathBuf::from("./data"));
    format!("sqlite://{}?mode=rwc", dir.join("offline.db").display())
}

impl AppConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("MUSEUM_GATE_DATABASE_URL") {
            if !v.trim().is_empty() {
                cfg.database.url = v.trim().to_string();
            }
        }
        if let Some(value) = env_u64("MUSEUM_GATE_DATABASE_MAX_CONNECTIONS") {
            cfg.database.max_connections = value.clamp(1, u64::from(u32::MAX)) as u32;
        }

        cfg.remote.base_url = env_string("MUSEUM_GATE_REMOTE_URL");
        cfg.remote.api_key = env_string("MUSEUM_GATE_REMOTE_API_KEY");
        if let Some(value) = env_u64("MUSEUM_GATE_REMOTE_TIMEOUT_SECS") {
            cfg.remote.request_timeout = value.max(1);
        }

        if let Ok(v) = std::env::var("MUSEUM_GATE_AUTO_SYNC") {
            cfg.sync.auto_sync = parse_bool(&v, cfg.sync.auto_sync);
        }
        if let Some(value) = env_u64("MUSEUM_GATE_SYNC_INTERVAL_SECS") {
            cfg.sync.sync_interval = value.max(1);
        }
        if let Some(value) = env_u64("MUSEUM_GATE_PENDING_POLL_SECS") {
            cfg.sync.pending_poll_interval = value.max(1);
        }
        if let Some(value) = env_u64("MUSEUM_GATE_PROBE_INTERVAL_SECS") {
            cfg.sync.probe_interval = value.max(1);
        }
        if let Ok(v) = std::env::var("MUSEUM_GATE_PURGE_SYNCED") {
            cfg.sync.purge_synced = parse_bool(&v, cfg.sync.purge_synced);
        }
        if let Some(value) = env_u64("MUSEUM_GATE_PURGE_RETENTION_HOURS") {
            cfg.sync.purge_retention_hours = value;
        }

        cfg.terminal.seller_id = env_string("MUSEUM_GATE_SELLER_ID");
        cfg.terminal.museum_id = env_string("MUSEUM_GATE_MUSEUM_ID");
        if let Ok(v) = std::env::var("MUSEUM_GATE_OFFLINE_FIRST") {
            cfg.terminal.offline_first = parse_bool(&v, cfg.terminal.offline_first);
        }

        cfg
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.database.url.trim().is_empty() {
            return Err("Database url must not be empty".to_string());
        }
        if self.database.max_connections == 0 {
            return Err("Database max_connections must be greater than 0".to_string());
        }
        if self.sync.sync_interval == 0 {
            return Err("Sync interval must be greater than 0".to_string());
        }
        if self.sync.pending_poll_interval == 0 {
            return Err("Pending poll interval must be greater than 0".to_string());
        }
        if self.sync.probe_interval == 0 {
            return Err("Probe interval must be greater than 0".to_string());
        }
        if let Some(url) = &self.remote.base_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(format!("Remote base_url must be an http(s) URL: {url}"));
            }
        }
        Ok(())
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| parse_u64(&v))
}

fn parse_bool(s: &str, default: bool) -> bool {
    match s.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

fn parse_u64(value: &str) -> Option<u64> {
    value.trim().parse::<u64>().ok()
}

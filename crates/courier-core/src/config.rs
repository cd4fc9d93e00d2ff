use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Delay inserted between consecutive sends within one task execution, in
/// seconds. The remote platform rate-limits bursts; two seconds per
/// destination keeps well under the flood threshold.
pub const DEFAULT_SEND_DELAY_SECS: u64 = 2;
/// How often each identity's destination list is re-fetched and reconciled.
pub const DEFAULT_RECONCILE_PERIOD_SECS: u64 = 300;
/// Upper bound on a single bridge request (connect + batch send + disconnect).
pub const DEFAULT_BRIDGE_TIMEOUT_SECS: u64 = 120;
/// Capacity of each bridge worker's request queue.
pub const DEFAULT_BRIDGE_QUEUE: usize = 32;
/// Capacity of the scheduler → executor fired-job channel.
pub const FIRED_QUEUE_CAPACITY: usize = 256;

/// Top-level config (courier.toml + COURIER_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CourierConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub reconciler: ReconcilerConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
    #[serde(default)]
    pub uploads: UploadsConfig,
    #[serde(default)]
    pub platform: PlatformConfig,
}

/// Which remote-platform adapter this deployment links in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Adapter name. This tree ships `"dry-run"` (logs sends instead of
    /// performing them); production builds register their client adapter
    /// under its own name.
    #[serde(default = "default_platform_adapter")]
    pub adapter: String,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            adapter: default_platform_adapter(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Per-request timeout in seconds. A send batch that outlives this is
    /// reported as failed to the caller; the worker itself is respawned on
    /// next use if it wedged.
    #[serde(default = "default_bridge_timeout")]
    pub request_timeout_secs: u64,
    /// Bounded queue depth per identity worker.
    #[serde(default = "default_bridge_queue")]
    pub queue_capacity: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: DEFAULT_BRIDGE_TIMEOUT_SECS,
            queue_capacity: DEFAULT_BRIDGE_QUEUE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    #[serde(default = "default_reconcile_period")]
    pub period_secs: u64,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            period_secs: DEFAULT_RECONCILE_PERIOD_SECS,
        }
    }
}

/// Settings for the post-execution notification bot.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NotifierConfig {
    /// Bot token for the notification channel. When absent, notifications
    /// are silently disabled process-wide.
    pub bot_token: Option<String>,
}

/// Where task attachment files live on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadsConfig {
    #[serde(default = "default_uploads_dir")]
    pub dir: String,
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            dir: default_uploads_dir(),
        }
    }
}

impl CourierConfig {
    /// Load config from a TOML file with COURIER_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. COURIER_CONFIG env var
    ///   3. ~/.courier/courier.toml
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .or_else(|| std::env::var("COURIER_CONFIG").ok())
            .unwrap_or_else(default_config_path);

        let config: CourierConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("COURIER_").split("_"))
            .extract()
            .map_err(|e| crate::error::CoreError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.courier/courier.db", home)
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.courier/courier.toml", home)
}

fn default_uploads_dir() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.courier/uploads", home)
}

fn default_platform_adapter() -> String {
    "dry-run".to_string()
}

fn default_bridge_timeout() -> u64 {
    DEFAULT_BRIDGE_TIMEOUT_SECS
}
fn default_bridge_queue() -> usize {
    DEFAULT_BRIDGE_QUEUE
}
fn default_reconcile_period() -> u64 {
    DEFAULT_RECONCILE_PERIOD_SECS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_limits() {
        let cfg = CourierConfig::default();
        assert_eq!(cfg.bridge.request_timeout_secs, DEFAULT_BRIDGE_TIMEOUT_SECS);
        assert_eq!(cfg.reconciler.period_secs, DEFAULT_RECONCILE_PERIOD_SECS);
        assert!(cfg.notifier.bot_token.is_none());
    }
}

//! Bridge configuration.
//!
//! Every field has a default so a host can pass an empty or partial TOML
//! document to `wallet_bridge_initialize`.

use crate::rpc::ReconnectionPolicy;
use crate::WalletError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub store: StoreConfig,
    pub sync: SyncConfig,
    pub logging: LogConfig,
}

impl BridgeConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, WalletError> {
        toml::from_str(text)
            .map_err(|e| WalletError::InvalidArgument(format!("bad configuration: {}", e)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// File created inside the storage directory.
    pub file_name: String,
    /// Parameters for newly written stores. Existing stores carry their own.
    pub kdf: KdfParams,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            file_name: String::from("wallet.db"),
            kdf: KdfParams::default(),
        }
    }
}

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KdfParams {
    pub m_cost: u32,
    pub t_cost: u32,
    pub p_cost: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            m_cost: 65536,
            t_cost: 3,
            p_cost: 4,
        }
    }
}

impl KdfParams {
    /// Cheap parameters for test suites. Never use for real wallets.
    pub fn insecure_for_tests() -> Self {
        Self {
            m_cost: 64,
            t_cost: 1,
            p_cost: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Delay between tip polls once caught up.
    pub poll_interval_ms: u64,
    pub connect_timeout_ms: u64,
    pub reconnect_attempts: u32,
    pub reconnect_initial_delay_ms: u64,
    pub reconnect_max_delay_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5_000,
            connect_timeout_ms: 30_000,
            reconnect_attempts: 5,
            reconnect_initial_delay_ms: 1_000,
            reconnect_max_delay_ms: 16_000,
        }
    }
}

impl SyncConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn reconnection_policy(&self) -> ReconnectionPolicy {
        ReconnectionPolicy {
            max_attempts: self.reconnect_attempts,
            initial_delay: Duration::from_millis(self.reconnect_initial_delay_ms),
            max_delay: Duration::from_millis(self.reconnect_max_delay_ms),
            ..ReconnectionPolicy::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directive; `RUST_LOG` wins when set.
    pub filter: String,
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: String::from("info"),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = BridgeConfig::from_toml_str(
            r#"
            [store]
            file_name = "keys.db"

            [sync]
            poll_interval_ms = 250
            "#,
        )
        .unwrap();

        assert_eq!(config.store.file_name, "keys.db");
        assert_eq!(config.store.kdf, KdfParams::default());
        assert_eq!(config.sync.poll_interval(), Duration::from_millis(250));
        assert_eq!(config.sync.reconnect_attempts, 5);
        assert_eq!(config.logging, LogConfig::default());
    }

    #[test]
    fn test_empty_toml_is_default() {
        assert_eq!(BridgeConfig::from_toml_str("").unwrap(), BridgeConfig::default());
    }

    #[test]
    fn test_bad_toml_is_invalid_argument() {
        let err = BridgeConfig::from_toml_str("store = 3").unwrap_err();
        assert!(matches!(err, WalletError::InvalidArgument(_)));
    }
}

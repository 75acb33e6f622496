//! Node endpoint configuration.

use crate::config::SyncConfig;
use crate::WalletError;
use std::fmt;
use std::time::Duration;

/// A single TCP endpoint given as `"<host>:<port>"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeAddress {
    host: String,
    port: u16,
}

impl NodeAddress {
    pub fn parse(text: &str) -> Result<Self, WalletError> {
        let text = text.trim();
        let (host, port) = text
            .rsplit_once(':')
            .ok_or_else(|| WalletError::InvalidArgument(format!("node address '{}' has no port", text)))?;

        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(WalletError::InvalidArgument(format!(
                "node address '{}' has no host",
                text
            )));
        }

        let port: u16 = port
            .parse()
            .map_err(|_| WalletError::InvalidArgument(format!("invalid port in '{}'", text)))?;
        if port == 0 {
            return Err(WalletError::InvalidArgument(format!("invalid port in '{}'", text)));
        }

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Node connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub address: NodeAddress,
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub reconnection_policy: ReconnectionPolicy,
}

impl ConnectionConfig {
    pub fn from_sync_config(address: NodeAddress, sync: &SyncConfig) -> Self {
        Self {
            address,
            timeout: sync.connect_timeout(),
            poll_interval: sync.poll_interval(),
            reconnection_policy: sync.reconnection_policy(),
        }
    }
}

/// Reconnection policy with exponential backoff.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectionPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl ReconnectionPolicy {
    /// Never more than `max_delay`, however large `attempt` grows.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let delay_secs = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        Duration::try_from_secs_f64(delay_secs).map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

impl Default for ReconnectionPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(16),
            backoff_multiplier: 2.0,
        }
    }
}

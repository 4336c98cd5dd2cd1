//! Settings types.
//!
//! Field names are camelCase on disk to match the JSON wire conventions of
//! the protocol itself.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Smallest outbound/inbound queue capacity the send loop can operate with.
pub const MIN_QUEUE_CAPACITY: usize = 4;

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SockioSettings {
    /// Per-session queue and dispatch settings.
    pub session: SessionSettings,
    /// Transport timeouts and heartbeat defaults.
    pub transport: TransportSettings,
    /// Log output settings.
    pub logging: LoggingSettings,
}

impl SockioSettings {
    /// Reject combinations the session engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.session.queue_capacity < MIN_QUEUE_CAPACITY {
            return Err(SettingsError::InvalidValue(format!(
                "session.queueCapacity must be at least {MIN_QUEUE_CAPACITY}, got {}",
                self.session.queue_capacity
            )));
        }
        if self.session.max_concurrent_dispatch == Some(0) {
            return Err(SettingsError::InvalidValue(
                "session.maxConcurrentDispatch must be positive".into(),
            ));
        }
        if self.transport.ping_interval_ms == 0 {
            return Err(SettingsError::InvalidValue(
                "transport.pingIntervalMs must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// How inbound application messages are handed to handlers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// One task per inbound message; no ordering between handlers.
    #[default]
    Concurrent,
    /// A single worker runs handlers strictly in arrival order.
    Serialized,
}

/// Session engine settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    /// Capacity of both the inbound and outbound queues.
    pub queue_capacity: usize,
    /// Inbound dispatch mode.
    pub dispatch_mode: DispatchMode,
    /// Upper bound on concurrently running handler tasks (concurrent mode).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_concurrent_dispatch: Option<usize>,
    /// Default deadline for acknowledged requests, in milliseconds.
    pub ack_timeout_ms: u64,
}

impl SessionSettings {
    /// Default acknowledgment deadline.
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            queue_capacity: 500,
            dispatch_mode: DispatchMode::Concurrent,
            max_concurrent_dispatch: None,
            ack_timeout_ms: 30_000,
        }
    }
}

/// Transport settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransportSettings {
    /// Heartbeat interval used until the handshake negotiates one.
    pub ping_interval_ms: u64,
    /// Heartbeat timeout used until the handshake negotiates one.
    pub ping_timeout_ms: u64,
    /// Maximum wait for a single inbound frame.
    pub receive_timeout_ms: u64,
    /// Maximum wait for a single outbound write.
    pub send_timeout_ms: u64,
    /// Maximum accepted WebSocket message size in bytes.
    pub max_message_size: usize,
}

impl TransportSettings {
    /// Default ping interval.
    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    /// Default ping timeout.
    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }

    /// Per-frame receive timeout.
    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }

    /// Per-frame send timeout.
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            ping_interval_ms: 30_000,
            ping_timeout_ms: 60_000,
            receive_timeout_ms: 60_000,
            send_timeout_ms: 60_000,
            max_message_size: 32 * 1024,
        }
    }
}

/// Logging settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default `tracing` filter when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

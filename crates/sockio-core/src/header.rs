//! Handshake header carried by the Open packet.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::HeaderError;

/// Connection metadata negotiated during the handshake.
///
/// Intervals are carried on the wire as integer milliseconds.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Header {
    /// Server-assigned session id.
    pub sid: String,
    /// Transport upgrades the server offers, in preference order.
    #[serde(default)]
    pub upgrades: Vec<String>,
    /// How often the client should ping.
    #[serde(default, with = "millis")]
    pub ping_interval: Duration,
    /// How long the server waits for a ping before dropping the client.
    #[serde(default, with = "millis")]
    pub ping_timeout: Duration,
}

impl Header {
    /// Parse the raw handshake JSON that follows the Open type digit.
    pub fn from_handshake(payload: &str) -> Result<Self, HeaderError> {
        if payload.trim().is_empty() {
            return Err(HeaderError::Missing);
        }
        Ok(serde_json::from_str(payload)?)
    }

    /// Negotiated ping interval, if the server sent a non-zero one.
    pub fn negotiated_ping_interval(&self) -> Option<Duration> {
        (!self.ping_interval.is_zero()).then_some(self.ping_interval)
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

//! Runtime session configuration.

use std::time::Duration;

use sockio_settings::{DispatchMode, MIN_QUEUE_CAPACITY, SessionSettings};

/// Queue, dispatch and acknowledgment parameters for one session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// Capacity of the inbound and outbound queues.
    pub queue_capacity: usize,
    /// How inbound application messages reach handlers.
    pub dispatch_mode: DispatchMode,
    /// Cap on concurrently running handler tasks in concurrent mode.
    pub max_concurrent_dispatch: Option<usize>,
    /// Deadline used by [`Session::request`](crate::Session::request).
    pub ack_timeout: Duration,
}

impl SessionConfig {
    /// Same configuration with a different dispatch mode.
    #[must_use]
    pub fn with_dispatch_mode(mut self, mode: DispatchMode) -> Self {
        self.dispatch_mode = mode;
        self
    }

    /// Same configuration with a different queue capacity, clamped to the
    /// smallest capacity the send loop can operate with.
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(MIN_QUEUE_CAPACITY);
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from(&SessionSettings::default())
    }
}

impl From<&SessionSettings> for SessionConfig {
    fn from(settings: &SessionSettings) -> Self {
        Self {
            queue_capacity: settings.queue_capacity.max(MIN_QUEUE_CAPACITY),
            dispatch_mode: settings.dispatch_mode,
            max_concurrent_dispatch: settings.max_concurrent_dispatch,
            ack_timeout: settings.ack_timeout(),
        }
    }
}

//! # sockio-settings
//!
//! Configuration for sockio sessions and transports.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults** — [`SockioSettings::default()`]
//! 2. **User file** — `~/.sockio/settings.json` (deep-merged over defaults)
//! 3. **Environment variables** — `SOCKIO_*` overrides (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use sockio_settings::get_settings;
//!
//! let settings = get_settings();
//! println!("queue capacity: {}", settings.session.queue_capacity);
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;

use std::sync::OnceLock;

static SETTINGS: OnceLock<SockioSettings> = OnceLock::new();

/// Get the global settings instance.
///
/// On first call, loads settings from `~/.sockio/settings.json` with env var
/// overrides. If loading fails, falls back to compiled defaults.
pub fn get_settings() -> &'static SockioSettings {
    SETTINGS.get_or_init(|| {
        load_settings().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to load settings, using defaults");
            SockioSettings::default()
        })
    })
}

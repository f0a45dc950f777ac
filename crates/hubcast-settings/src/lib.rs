//! # hubcast-settings
//!
//! Layered configuration for the hub count relay.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`HubcastSettings::default()`]
//! 2. **Settings file**: `~/.hubcast/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `HUBCAST_*`, `REDIS_*`, and the opacity
//!    variables `MAX_VALUE`, `MIN_ALPHA`, `MAX_ALPHA` (highest priority)
//!
//! Command-line flags are applied on top by the binary.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides_from, deep_merge, load_settings, load_settings_from_path,
    settings_path,
};
pub use types::*;

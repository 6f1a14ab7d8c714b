//! # tether-settings
//!
//! Configuration for the tether session service.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`TetherSettings::default()`]
//! 2. **Settings file**: `~/.tether/settings.json` or an explicit path (deep-merged over defaults)
//! 3. **Environment variables**: `TETHER_*` overrides (highest priority)
//!
//! The loaded value is passed explicitly to the components that need it.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    IgnoredOverride, LoadedSettings, apply_env_overrides, apply_overrides_from, deep_merge,
    load_settings, load_settings_from_path, settings_path, tether_home,
};
pub use types::*;

//! # pcforge-settings
//!
//! Layered configuration for the pcforge client.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`PcforgeSettings::default()`]
//! 2. **User file**: `~/.pcforge/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `PCFORGE_*` overrides (highest priority)
//!
//! ```no_run
//! let settings = pcforge_settings::load_settings()?;
//! println!("endpoint: {}", settings.client.url);
//! # Ok::<(), pcforge_settings::SettingsError>(())
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, load_with_env, settings_path};
pub use types::*;

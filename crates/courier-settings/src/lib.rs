//! # courier-settings
//!
//! Layered configuration for the Courier relay server.
//!
//! Loading flow: compiled defaults → optional JSON settings file
//! (deep-merged) → `COURIER_*` environment variable overrides.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{load_settings, load_settings_from_path, settings_path};
pub use types::{CourierSettings, ProviderSettings, RelaySettings, ServerSettings};

//! Configuration module.
//!
//! Provides `AppConfig` (top-level settings), the live-session and audio
//! sub-configs, `AppPaths` for the cross-platform config directory, and TOML
//! persistence via `AppConfig::load` / `AppConfig::save`.

pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{AppConfig, AudioConfig, LiveConfig};

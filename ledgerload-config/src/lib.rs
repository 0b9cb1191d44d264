//! Configuration for ledgerload import runs: file/env loading, CLI
//! overrides, and guard rails.
#![allow(missing_docs)]

pub mod duration;
pub mod loader;
pub mod models;
pub mod validation;

pub use loader::{
    CONFIG_JSON_ENV, CONFIG_PATH_ENV, ConfigLoad, ConfigLoadError, ConfigLoader,
    ConfigLoaderOptions, ConfigSource, EnvConfig,
};
pub use models::{ApplySettings, ConfigOverrides, ImportConfig, NotifySettings, SchedulerSettings};
pub use validation::{ConfigGuardRailError, ConfigWarning, ConfigWarnings, apply_guard_rails};

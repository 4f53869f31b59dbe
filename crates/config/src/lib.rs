//! Configuration loading and hot-reloading for the mailbridge proxy.
//!
//! Uses figment for YAML + environment configuration over serialized
//! defaults, and notify + arc-swap for live file watching.

pub mod schema;
pub mod watcher;

pub use schema::{
    AuthConfig, BackendConfig, CalendarConfig, CalendarTokenSource, Config, GoogleConfig,
    LogConfig, LogFormat, ServicesConfig,
};
pub use watcher::ConfigWatcher;

//! Configuration and bootstrap for the shellgate executors.

pub mod bootstrap;
pub mod config;

pub use bootstrap::{AppBuilder, resolve_config_path};
pub use config::Config;

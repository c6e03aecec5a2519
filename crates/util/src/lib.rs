//! Process-level helpers shared by the spending goals binaries.

pub mod config;

use std::path::PathBuf;

pub use config::{AppConfig, ConfigError, Environment, ShopifyConfig, DEFAULT_BIND_ADDR};

/// Loads `.env` from the working directory or its parents, if one exists.
///
/// Returns the path that was loaded. Variables already present in the
/// process environment win over the file.
pub fn load_env_file() -> Option<PathBuf> {
    dotenvy::dotenv().ok()
}

#[cfg(test)]
pub(crate) static ENV_GUARD: std::sync::LazyLock<std::sync::Mutex<()>> =
    std::sync::LazyLock::new(|| std::sync::Mutex::new(()));

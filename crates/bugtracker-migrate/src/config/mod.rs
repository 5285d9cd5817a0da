//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::{MigrateError, Result};
use std::path::Path;

/// SQLite file used when `SQLITE_PATH` is unset.
pub const DEFAULT_SQLITE_PATH: &str = "bug_tracker.db";

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Build configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    ///
    /// Source: `SQLITE_PATH`. Target: `DATABASE_URL` or `SUPABASE_DB_URL`,
    /// otherwise `SUPABASE_HOST` with `SUPABASE_PORT`, `SUPABASE_DB`,
    /// `SUPABASE_USER`, `SUPABASE_PASSWORD`. A `SUPABASE_URL` is only used as a
    /// last resort; an HTTP project URL there fails at connect time with an
    /// explanation rather than here.
    pub fn from_env_with<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let source =
            StoreConfig::sqlite(get("SQLITE_PATH").unwrap_or_else(|| DEFAULT_SQLITE_PATH.into()));

        let mut target = if let Some(url) = get("DATABASE_URL").or_else(|| get("SUPABASE_DB_URL")) {
            StoreConfig::postgres_url(url)
        } else if let Some(host) = get("SUPABASE_HOST") {
            let mut target = StoreConfig::postgres_host(host);
            if let Some(port) = get("SUPABASE_PORT") {
                target.port = port.trim().parse().map_err(|_| {
                    MigrateError::Config(format!("SUPABASE_PORT is not a valid port: {}", port))
                })?;
            }
            if let Some(db) = get("SUPABASE_DB") {
                target.database = db;
            }
            target.user = get("SUPABASE_USER");
            target.password = get("SUPABASE_PASSWORD");
            target
        } else if let Some(url) = get("SUPABASE_URL") {
            StoreConfig::postgres_url(url)
        } else {
            return Err(MigrateError::Config(
                "no target configured: set DATABASE_URL or SUPABASE_HOST, or pass --config".into(),
            ));
        };

        if let Some(mode) = get("SUPABASE_SSL_MODE") {
            target.ssl_mode = mode;
        }

        let config = Config {
            source,
            target,
            migration: MigrationConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }
}

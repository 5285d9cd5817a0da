//! Configuration validation.

use super::{Config, StoreConfig};
use crate::drivers::{BackendKind, SslMode};
use crate::error::{MigrateError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    validate_store("source", &config.source)?;
    validate_store("target", &config.target)?;

    // Cannot migrate a file onto itself
    if let (Some(src), Some(dst)) = (&config.source.path, &config.target.path) {
        if src == dst {
            return Err(MigrateError::Config(
                "source and target cannot be the same database".into(),
            ));
        }
    }
    if config.source.url.is_some() && config.source.url == config.target.url {
        return Err(MigrateError::Config(
            "source and target cannot be the same database".into(),
        ));
    }

    Ok(())
}

fn validate_store(role: &str, store: &StoreConfig) -> Result<()> {
    match BackendKind::from_db_type(&store.r#type) {
        Ok(BackendKind::Sqlite) => {
            let empty = store
                .path
                .as_ref()
                .map(|p| p.as_os_str().is_empty())
                .unwrap_or(true);
            if empty {
                return Err(MigrateError::Config(format!(
                    "{}.path is required for sqlite",
                    role
                )));
            }
        }
        Ok(BackendKind::Postgres) => {
            let has_url = store.url.as_deref().map(|u| !u.is_empty()).unwrap_or(false);
            let has_host = store.host.as_deref().map(|h| !h.is_empty()).unwrap_or(false);
            if !has_url && !has_host {
                return Err(MigrateError::Config(format!(
                    "{}.url or {}.host is required for postgres",
                    role, role
                )));
            }
            if has_host && !has_url && store.user.as_deref().unwrap_or("").is_empty() {
                return Err(MigrateError::Config(format!("{}.user is required", role)));
            }
            SslMode::parse(&store.ssl_mode)
                .map_err(|e| MigrateError::Config(format!("{}.ssl_mode: {}", role, e)))?;
        }
        Err(e) => {
            return Err(MigrateError::Config(format!("{}.type: {}", role, e)));
        }
    }
    Ok(())
}

//! Persistence of the accepted rate limit configuration.

use std::io::ErrorKind;
use std::path::PathBuf;

use tracing::{debug, info};

use crate::error::{Result, TurnstileError};
use crate::ratelimit::LimitConfig;

/// A JSON file holding the last accepted [`LimitConfig`].
#[derive(Debug, Clone)]
pub struct ConfigFile {
    path: PathBuf,
}

impl ConfigFile {
    /// Create a handle for the file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Read the persisted configuration.
    ///
    /// Returns `Ok(None)` if the file does not exist. A file that exists but
    /// does not hold a valid configuration is an error.
    pub async fn load(&self) -> Result<Option<LimitConfig>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No persisted configuration");
                return Ok(None);
            }
            Err(e) => return Err(self.error("read", e)),
        };

        let config: LimitConfig =
            serde_json::from_str(&contents).map_err(|e| self.error("parse", e))?;
        config.validate().map_err(|e| self.error("validate", e))?;

        info!(
            path = %self.path.display(),
            interval = config.interval,
            limit = config.limit,
            "Loaded persisted configuration"
        );
        Ok(Some(config))
    }

    /// Write `config`, replacing any previous file atomically.
    pub async fn save(&self, config: &LimitConfig) -> Result<()> {
        let json = serde_json::to_vec_pretty(config).map_err(|e| self.error("serialize", e))?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| self.error("write", e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| self.error("rename", e))?;

        debug!(path = %self.path.display(), "Persisted configuration");
        Ok(())
    }

    fn error(&self, action: &str, e: impl std::fmt::Display) -> TurnstileError {
        TurnstileError::Persistence(format!(
            "failed to {} {}: {}",
            action,
            self.path.display(),
            e
        ))
    }
}

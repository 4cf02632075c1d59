//! Configuration for the licensing core.

use crate::error::{LicenseError, LicenseResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// File name of the license database inside the data directory.
pub const DATABASE_FILE: &str = "license.db";

/// Configuration for the license manager and its collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LicenseConfig {
    /// Base URL of the activation authority (e.g. `https://license.checkwright.app/api`).
    pub authority_url: String,
    /// Product identifier sent with every activation request.
    pub product: String,
    /// Timeout for a single authority request.
    pub request_timeout_secs: u64,
    /// Length of the free trial.
    pub trial_duration_days: i64,
    /// Interval for the periodic entitlement re-check.
    pub recheck_interval_secs: u64,
    /// Directory holding the license database. Defaults to the platform
    /// data directory.
    pub data_dir: Option<PathBuf>,
    /// Bind keys locally without contacting the authority.
    pub offline_mode: bool,
}

impl Default for LicenseConfig {
    fn default() -> Self {
        Self {
            authority_url: "https://license.checkwright.app/api".to_string(),
            product: "checkwright".to_string(),
            request_timeout_secs: 15,
            trial_duration_days: 14,
            recheck_interval_secs: 300,
            data_dir: None,
            offline_mode: false,
        }
    }
}

impl LicenseConfig {
    /// Checks values that would make the core misbehave.
    pub fn validate(&self) -> LicenseResult<()> {
        if self.product.trim().is_empty() {
            return Err(LicenseError::Config("product must not be empty".to_string()));
        }
        if self.request_timeout_secs == 0 {
            return Err(LicenseError::Config(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.trial_duration_days <= 0 {
            return Err(LicenseError::Config(
                "trial_duration_days must be greater than zero".to_string(),
            ));
        }
        if self.recheck_interval_secs == 0 {
            return Err(LicenseError::Config(
                "recheck_interval_secs must be greater than zero".to_string(),
            ));
        }
        if !self.offline_mode && self.authority_url.trim().is_empty() {
            return Err(LicenseError::Config(
                "authority_url is required unless offline_mode is set".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the trial length.
    #[must_use]
    pub fn trial_duration(&self) -> chrono::Duration {
        chrono::Duration::days(self.trial_duration_days)
    }

    /// Returns the request timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Returns the entitlement re-check interval.
    #[must_use]
    pub fn recheck_interval(&self) -> Duration {
        Duration::from_secs(self.recheck_interval_secs)
    }

    /// Resolves the license database path.
    ///
    /// Uses `data_dir` when set, otherwise `<platform data dir>/Checkwright`.
    pub fn database_path(&self) -> LicenseResult<PathBuf> {
        let dir = match &self.data_dir {
            Some(dir) => dir.clone(),
            None => dirs::data_dir()
                .map(|d| d.join("Checkwright"))
                .ok_or_else(|| {
                    LicenseError::Config("no platform data directory available".to_string())
                })?,
        };
        Ok(dir.join(DATABASE_FILE))
    }
}

//! Typed configuration.
//!
//! Process settings come from environment variables, loaded once at
//! startup and failing fast if required vars are missing. Dispatch tuning
//! comes from an optional TOML file whose defaults are the production
//! schedule.

use std::path::{Path, PathBuf};
use std::time::Duration as StdDuration;

use chrono::Duration;
use secrecy::SecretString;
use serde::Deserialize;

use crate::error::{Error, Result};

#[derive(Debug)]
pub struct Config {
    pub database_url: SecretString,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
    /// Path to a dispatch TOML file, if any.
    pub dispatch_config: Option<PathBuf>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: SecretString::from(required_var("DATABASE_URL")?),
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            dispatch_config: std::env::var("DISPATCH_CONFIG").ok().map(PathBuf::from),
        })
    }

    /// The dispatch tuning named by `DISPATCH_CONFIG`, or defaults.
    pub fn dispatch(&self) -> Result<DispatchConfig> {
        match &self.dispatch_config {
            Some(path) => DispatchConfig::load(path),
            None => Ok(DispatchConfig::default()),
        }
    }
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::Config(format!("required environment variable {name} is not set")))
}

// ---------------------------------------------------------------------------
// Dispatch tuning
// ---------------------------------------------------------------------------

/// Acceptance windows, exhaustion threshold and sweep cadence.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatchConfig {
    /// Minutes a master has to respond, indexed by attempt number - 1.
    /// Attempts past the end reuse the last entry.
    pub acceptance_windows_minutes: Vec<u32>,
    /// When a cascade finds no candidate left and the order's latest
    /// attempt has reached this number, the order is cancelled. Below it
    /// the order stays `new`. Remaining candidates are always offered.
    pub max_attempts: u32,
    /// Seconds between reconciliation sweeps.
    pub sweep_interval_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            acceptance_windows_minutes: vec![5, 7, 10, 15],
            max_attempts: 5,
            sweep_interval_secs: 60,
        }
    }
}

impl DispatchConfig {
    /// Read and validate a TOML file. Missing keys take defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read dispatch config {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
            .map_err(|e| Error::Config(format!("bad dispatch config {}: {e}", path.display())))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: DispatchConfig =
            toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.acceptance_windows_minutes.is_empty() {
            return Err(Error::Config("acceptance_windows_minutes is empty".to_string()));
        }
        if self.acceptance_windows_minutes.contains(&0) {
            return Err(Error::Config(
                "acceptance windows must be at least one minute".to_string(),
            ));
        }
        if self
            .acceptance_windows_minutes
            .windows(2)
            .any(|w| w[1] < w[0])
        {
            return Err(Error::Config(
                "acceptance windows must not shrink with later attempts".to_string(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(Error::Config("max_attempts must be at least 1".to_string()));
        }
        if self.sweep_interval_secs == 0 {
            return Err(Error::Config("sweep_interval_secs must be positive".to_string()));
        }
        Ok(())
    }

    /// How long attempt `attempt_number` stays open. Attempt 0 is treated as 1.
    pub fn acceptance_window(&self, attempt_number: u32) -> Duration {
        let windows = &self.acceptance_windows_minutes;
        let idx = (attempt_number.max(1) as usize - 1).min(windows.len().saturating_sub(1));
        let minutes = windows.get(idx).copied().unwrap_or(15);
        Duration::minutes(i64::from(minutes))
    }

    pub fn sweep_interval(&self) -> StdDuration {
        StdDuration::from_secs(self.sweep_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schedule() {
        let c = DispatchConfig::default();
        assert_eq!(c.acceptance_window(1), Duration::minutes(5));
        assert_eq!(c.acceptance_window(2), Duration::minutes(7));
        assert_eq!(c.acceptance_window(3), Duration::minutes(10));
        assert_eq!(c.acceptance_window(4), Duration::minutes(15));
        assert_eq!(c.acceptance_window(9), Duration::minutes(15));
        assert_eq!(c.acceptance_window(0), Duration::minutes(5));
    }

    #[test]
    fn windows_never_shrink() {
        let c = DispatchConfig::default();
        for n in 1..20 {
            assert!(c.acceptance_window(n) <= c.acceptance_window(n + 1));
        }
    }
}

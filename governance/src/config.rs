//! Governance configuration
//!
//! Loaded from TOML. Every field has a default, so an empty file (or no file)
//! yields the standard 0.5 / 0.7 / 0.9 ladder with the built-in risk table.
//!
//! ```toml
//! [maturity]
//! intern = 0.5
//! supervised = 0.7
//! autonomous = 0.9
//!
//! [scoring]
//! rating_scale = 40.0
//! intervention_penalty = 0.01
//! success_rating = 3
//!
//! [risk]
//! default_ceiling = "APPROVAL"
//!
//! [risk.actions.export_customer_list]
//! ceiling = "APPROVAL"
//! approval_path = false
//!
//! [supervision]
//! lock_timeout_ms = 5000
//! signal_capacity = 256
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::maturity::MaturityThresholds;
use crate::risk::RiskPolicyConfig;
use crate::types::Route;

/// Path to the TOML config file
pub const ENV_CONFIG_PATH: &str = "GOVERNANCE_CONFIG";
/// Override for `supervision.lock_timeout_ms`
pub const ENV_LOCK_TIMEOUT_MS: &str = "GOVERNANCE_LOCK_TIMEOUT_MS";
/// Override for `risk.default_ceiling`
pub const ENV_DEFAULT_CEILING: &str = "GOVERNANCE_DEFAULT_CEILING";

/// Errors raised while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {message}")]
    Invalid { message: String },
}

impl ConfigError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}

/// Confidence recalibration constants
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Divisor applied to `(rating - 1)`
    pub rating_scale: f64,
    /// Boost subtracted per recorded intervention
    pub intervention_penalty: f64,
    /// Lowest rating that counts as a successful session
    pub success_rating: u8,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            rating_scale: 40.0,
            intervention_penalty: 0.01,
            success_rating: 3,
        }
    }
}

/// Session manager tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisionConfig {
    /// Upper bound on waiting for a session's exclusive lock
    pub lock_timeout_ms: u64,
    /// Broadcast buffer for intervention signals
    pub signal_capacity: usize,
}

impl Default for SupervisionConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 5000,
            signal_capacity: 256,
        }
    }
}

impl SupervisionConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

/// Top-level governance configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernanceConfig {
    pub maturity: MaturityThresholds,
    pub scoring: ScoringConfig,
    pub risk: RiskPolicyConfig,
    pub supervision: SupervisionConfig,
}

impl GovernanceConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&raw)?;
        info!(path = %path.display(), "Loaded governance config");
        Ok(config)
    }

    /// Build from the environment.
    ///
    /// Reads the file named by `GOVERNANCE_CONFIG` when set (defaults
    /// otherwise), then applies the single-value env overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = match std::env::var(ENV_CONFIG_PATH) {
            Ok(path) if !path.trim().is_empty() => Self::load(Path::new(path.trim()))?,
            _ => {
                debug!("{} not set, using default governance config", ENV_CONFIG_PATH);
                Self::default()
            }
        };

        if let Ok(raw) = std::env::var(ENV_LOCK_TIMEOUT_MS) {
            config.supervision.lock_timeout_ms = raw.trim().parse().map_err(|_| {
                ConfigError::invalid(format!("{} must be an integer, got '{}'", ENV_LOCK_TIMEOUT_MS, raw))
            })?;
        }
        if let Ok(raw) = std::env::var(ENV_DEFAULT_CEILING) {
            config.risk.default_ceiling = raw.parse::<Route>().map_err(|e| {
                ConfigError::invalid(format!("{}: {}", ENV_DEFAULT_CEILING, e))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would break the scoring or tier contracts
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.maturity.validate()?;

        let scoring = &self.scoring;
        if !(scoring.rating_scale.is_finite() && scoring.rating_scale > 0.0) {
            return Err(ConfigError::invalid(format!(
                "scoring.rating_scale must be positive, got {}",
                scoring.rating_scale
            )));
        }
        if !(scoring.intervention_penalty.is_finite() && scoring.intervention_penalty >= 0.0) {
            return Err(ConfigError::invalid(format!(
                "scoring.intervention_penalty must be non-negative, got {}",
                scoring.intervention_penalty
            )));
        }
        if !(1..=5).contains(&scoring.success_rating) {
            return Err(ConfigError::invalid(format!(
                "scoring.success_rating must lie in [1, 5], got {}",
                scoring.success_rating
            )));
        }
        // Unknown actions must never run looser than APPROVAL
        if self.risk.default_ceiling > Route::Approval {
            return Err(ConfigError::invalid(format!(
                "risk.default_ceiling must be APPROVAL or stricter, got {}",
                self.risk.default_ceiling
            )));
        }
        if self.supervision.signal_capacity == 0 {
            return Err(ConfigError::invalid(
                "supervision.signal_capacity must be at least 1",
            ));
        }
        Ok(())
    }
}

//! Maturity model: confidence → tier, tier → capability ceiling.
//!
//! Pure functions only. The ladder is
//!
//! ```text
//! confidence  0.0 ─────── 0.5 ─────── 0.7 ─────── 0.9 ─────── 1.0
//! tier        STUDENT     │ INTERN    │ SUPERVISED │ AUTONOMOUS
//! ceiling     APPROVAL*   │ APPROVAL  │ SUPERVISED │ DIRECT
//! ```
//!
//! Each threshold is an inclusive lower bound of the higher tier.
//! (*) A STUDENT acting on an automated trigger is narrowed to BLOCKED.

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::types::{MaturityTier, Route, RoutingCeiling, TriggerSource};

/// Bound a value to [0, 1]. NaN maps to 0.
pub fn clamp(x: f64) -> f64 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(0.0, 1.0)
    }
}

/// Inclusive lower confidence bounds for each tier above STUDENT
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaturityThresholds {
    pub intern: f64,
    pub supervised: f64,
    pub autonomous: f64,
}

impl Default for MaturityThresholds {
    fn default() -> Self {
        Self {
            intern: 0.5,
            supervised: 0.7,
            autonomous: 0.9,
        }
    }
}

impl MaturityThresholds {
    /// Thresholds must sit strictly inside (0, 1] and strictly ascend
    pub fn validate(&self) -> Result<(), ConfigError> {
        let bounds = [self.intern, self.supervised, self.autonomous];
        if bounds.iter().any(|b| !(*b > 0.0 && *b <= 1.0)) {
            return Err(ConfigError::invalid(format!(
                "maturity thresholds must lie in (0, 1], got {:?}",
                bounds
            )));
        }
        if !(self.intern < self.supervised && self.supervised < self.autonomous) {
            return Err(ConfigError::invalid(format!(
                "maturity thresholds must be strictly ascending, got intern={} supervised={} autonomous={}",
                self.intern, self.supervised, self.autonomous
            )));
        }
        Ok(())
    }
}

/// Maps confidence to tiers and tiers to routing ceilings
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MaturityModel {
    thresholds: MaturityThresholds,
}

impl MaturityModel {
    pub fn new(thresholds: MaturityThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &MaturityThresholds {
        &self.thresholds
    }

    /// Tier for a confidence score. Monotonically non-decreasing.
    pub fn tier_for(&self, confidence: f64) -> MaturityTier {
        let c = clamp(confidence);
        if c >= self.thresholds.autonomous {
            MaturityTier::Autonomous
        } else if c >= self.thresholds.supervised {
            MaturityTier::Supervised
        } else if c >= self.thresholds.intern {
            MaturityTier::Intern
        } else {
            MaturityTier::Student
        }
    }

    /// Inclusive lower confidence bound of a tier
    pub fn lower_bound(&self, tier: MaturityTier) -> f64 {
        match tier {
            MaturityTier::Student => 0.0,
            MaturityTier::Intern => self.thresholds.intern,
            MaturityTier::Supervised => self.thresholds.supervised,
            MaturityTier::Autonomous => self.thresholds.autonomous,
        }
    }

    /// Most permissive route a tier may ever receive
    pub fn capability_ceiling(tier: MaturityTier) -> RoutingCeiling {
        match tier {
            MaturityTier::Student => Route::Approval,
            MaturityTier::Intern => Route::Approval,
            MaturityTier::Supervised => Route::Supervised,
            MaturityTier::Autonomous => Route::Direct,
        }
    }

    /// Capability ceiling narrowed by where the trigger came from.
    ///
    /// STUDENT agents have no approval path for automated triggers.
    pub fn source_ceiling(tier: MaturityTier, source: TriggerSource) -> RoutingCeiling {
        match tier {
            MaturityTier::Student if source.is_automated() => Route::Blocked,
            _ => Self::capability_ceiling(tier),
        }
    }
}

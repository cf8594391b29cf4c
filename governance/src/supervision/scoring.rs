//! Confidence recalibration from supervisor ratings

use crate::config::ScoringConfig;
use crate::error::{GovernanceError, GovernanceResult};
use crate::maturity::{clamp, MaturityModel};
use crate::types::MaturityTier;

pub const MIN_RATING: i64 = 1;
pub const MAX_RATING: i64 = 5;

/// Result of recalibrating one agent after one graded session
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Recalibration {
    pub success: bool,
    pub boost: f64,
    pub confidence_before: f64,
    pub confidence_after: f64,
    pub tier_before: MaturityTier,
    pub tier_after: MaturityTier,
    pub promoted: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConfidenceScorer {
    config: ScoringConfig,
    model: MaturityModel,
}

impl ConfidenceScorer {
    pub fn new(config: ScoringConfig, model: MaturityModel) -> Self {
        Self { config, model }
    }

    pub fn model(&self) -> &MaturityModel {
        &self.model
    }

    /// Reject ratings outside [1, 5] before anything is touched
    pub fn validate_rating(rating: i64) -> GovernanceResult<u8> {
        if !(MIN_RATING..=MAX_RATING).contains(&rating) {
            return Err(GovernanceError::validation(format!(
                "supervisor rating must be between {} and {}, got {}",
                MIN_RATING, MAX_RATING, rating
            )));
        }
        Ok(rating as u8)
    }

    /// `max(0, (rating - 1) / scale - penalty * interventions)`
    pub fn boost(&self, rating: u8, intervention_count: u32) -> f64 {
        let raw = (f64::from(rating) - 1.0) / self.config.rating_scale
            - self.config.intervention_penalty * f64::from(intervention_count);
        raw.max(0.0)
    }

    pub fn is_success(&self, rating: u8) -> bool {
        rating >= self.config.success_rating
    }

    /// Apply a graded session to an agent's trust state.
    ///
    /// A graded session never lowers the tier. A failed session keeps it as is,
    /// and a successful one moves it up to whatever the new confidence earns.
    pub fn recalibrate(
        &self,
        tier: MaturityTier,
        confidence: f64,
        rating: u8,
        intervention_count: u32,
    ) -> Recalibration {
        let success = self.is_success(rating);
        let boost = self.boost(rating, intervention_count);
        let confidence_before = clamp(confidence);
        let confidence_after = clamp(confidence_before + boost);

        let tier_after = if success {
            tier.max(self.model.tier_for(confidence_after))
        } else {
            tier
        };

        Recalibration {
            success,
            boost,
            confidence_before,
            confidence_after,
            tier_before: tier,
            tier_after,
            promoted: tier_after > tier,
        }
    }
}

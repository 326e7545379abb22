//! # Score Model
//!
//! Pure mapping from a document's vote aggregate, age and editorial flags to
//! its ranking score. Both the vote path and the batch sweep call into this
//! module, so the two always agree on a given snapshot.
//!
//! The vote part is the classic "hot" ranking: the base score is divided by
//! `(age_hours + bias)^decay`. Negative base scores are multiplied by the
//! decay instead, so that a downvoted document keeps sinking with age rather
//! than drifting back to 0. Editorial bonuses are added after the decay and
//! never fade, so a frontpage or curated document stays ahead of an
//! otherwise identical one at any age.

use chrono::{DateTime, Utc};
use domains::{DomainError, DomainResult, VotableDocument};
use serde::{Deserialize, Serialize};

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

/// Tunable constants of the ranking curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreParams {
    /// Exponent applied to the age term
    pub time_decay_factor: f64,
    /// Offset added to the age in hours so brand-new documents stay finite
    pub bias_hours: f64,
    /// Added to the decayed score of frontpage documents
    pub frontpage_bonus: f64,
    /// Added on top of the frontpage bonus for curated documents
    pub curated_bonus: f64,
}

impl Default for ScoreParams {
    fn default() -> Self {
        Self {
            time_decay_factor: 1.15,
            bias_hours: 2.0,
            frontpage_bonus: 10.0,
            curated_bonus: 10.0,
        }
    }
}

impl ScoreParams {
    pub fn validate(&self) -> DomainResult<()> {
        if !(self.time_decay_factor.is_finite() && self.time_decay_factor > 0.0) {
            return Err(DomainError::Validation(
                "time_decay_factor must be a positive number".into(),
            ));
        }
        if !(self.bias_hours.is_finite() && self.bias_hours > 0.0) {
            return Err(DomainError::Validation(
                "bias_hours must be a positive number".into(),
            ));
        }
        if !(self.frontpage_bonus.is_finite() && self.frontpage_bonus >= 0.0)
            || !(self.curated_bonus.is_finite() && self.curated_bonus >= 0.0)
        {
            return Err(DomainError::Validation(
                "editorial bonuses must be non-negative".into(),
            ));
        }
        Ok(())
    }
}

/// The scoring-relevant projection of a document at a given instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreInput {
    pub base_score: i64,
    pub age_hours: f64,
    pub is_frontpage: bool,
    pub is_curated: bool,
}

impl ScoreInput {
    /// Fails with a validation error if the document was never posted.
    /// Timestamps in the future count as age zero.
    pub fn from_document(document: &VotableDocument, now: DateTime<Utc>) -> DomainResult<Self> {
        let posted_at = document.posted_at.ok_or_else(|| {
            DomainError::Validation(format!("document {} has no posted_at", document.id))
        })?;
        let age_ms = (now - posted_at).num_milliseconds().max(0);

        Ok(Self {
            base_score: document.base_score,
            age_hours: age_ms as f64 / MILLIS_PER_HOUR,
            is_frontpage: document.is_frontpage(),
            is_curated: document.is_curated(),
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreModel {
    params: ScoreParams,
}

impl ScoreModel {
    pub fn new(params: ScoreParams) -> DomainResult<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn compute(&self, input: &ScoreInput) -> f64 {
        let p = &self.params;

        let base = input.base_score as f64;
        let decay = (input.age_hours.max(0.0) + p.bias_hours).powf(p.time_decay_factor);
        let mut score = if base >= 0.0 {
            base / decay
        } else {
            // Mirrors the positive branch at age zero, then grows with age
            let origin = p.bias_hours.powf(p.time_decay_factor);
            base * decay / (origin * origin)
        };

        if input.is_frontpage {
            score += p.frontpage_bonus;
        }
        if input.is_curated {
            score += p.curated_bonus;
        }
        score
    }

    /// Score of `document` as of `now`. Never mutates the document.
    pub fn recalculate(&self, document: &VotableDocument, now: DateTime<Utc>) -> DomainResult<f64> {
        let input = ScoreInput::from_document(document, now)?;
        Ok(self.compute(&input))
    }
}

/// [`ScoreModel::recalculate`] with the default curve.
pub fn recalculate_score(document: &VotableDocument, now: DateTime<Utc>) -> DomainResult<f64> {
    ScoreModel::default().recalculate(document, now)
}

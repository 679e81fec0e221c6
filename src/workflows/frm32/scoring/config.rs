use serde::{Deserialize, Serialize};

use crate::workflows::frm32::catalog::DEFAULT_WEIGHT_EPSILON;

/// Three-tier risk label derived from the weighted final score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskClassification {
    Low,
    Medium,
    High,
}

impl RiskClassification {
    pub const fn label(self) -> &'static str {
        match self {
            RiskClassification::Low => "low",
            RiskClassification::Medium => "medium",
            RiskClassification::High => "high",
        }
    }

    /// Traffic-light alias used by the legacy frontend.
    pub const fn color(self) -> &'static str {
        match self {
            RiskClassification::Low => "green",
            RiskClassification::Medium => "yellow",
            RiskClassification::High => "red",
        }
    }
}

/// Final-score cutoffs for risk classification, defined once and reused
/// everywhere a final score is classified.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskThresholds {
    pub low_at: f64,
    pub medium_at: f64,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            low_at: 85.0,
            medium_at: 70.0,
        }
    }
}

impl RiskThresholds {
    pub fn classify(&self, final_score: f64) -> RiskClassification {
        if final_score >= self.low_at {
            RiskClassification::Low
        } else if final_score >= self.medium_at {
            RiskClassification::Medium
        } else {
            RiskClassification::High
        }
    }
}

/// Tuning knobs for the scoring engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub risk: RiskThresholds,
    pub weight_epsilon: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            risk: RiskThresholds::default(),
            weight_epsilon: DEFAULT_WEIGHT_EPSILON,
        }
    }
}

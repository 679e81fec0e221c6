mod config;

pub use config::{RiskClassification, RiskThresholds, ScoringConfig};

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::catalog::{CatalogError, MetricCatalog};
use super::domain::{MetricCode, ScoreRecord, ScoreValue, SubmissionId, SubmissionStatus};
use super::repository::Submission;

/// Derived fields written back onto the submission after every ledger change.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DerivedScore {
    pub final_score: Option<f64>,
    pub risk_classification: Option<RiskClassification>,
}

impl DerivedScore {
    pub const UNSCORED: DerivedScore = DerivedScore {
        final_score: None,
        risk_classification: None,
    };
}

/// Pure scoring core: weights ledger rows by the catalog and classifies risk.
///
/// The engine owns no storage; callers read the ledger, compute, and write
/// the result back in one atomic store operation.
pub struct ScoringEngine {
    catalog: Arc<MetricCatalog>,
    config: ScoringConfig,
}

impl ScoringEngine {
    pub fn new(catalog: Arc<MetricCatalog>, config: ScoringConfig) -> Self {
        Self { catalog, config }
    }

    pub fn catalog(&self) -> &MetricCatalog {
        &self.catalog
    }

    pub fn thresholds(&self) -> RiskThresholds {
        self.config.risk
    }

    /// Weighted final score on the 0-100 scale.
    ///
    /// Scores run 0-10 and weights are percentages of 100, so each row
    /// contributes `weight * score / 10`: a 10 contributes the full weight, a
    /// 0 contributes nothing. An empty ledger yields `None`, never zero —
    /// "not yet evaluated" must stay distinguishable from "scored zero".
    pub fn weighted_final_score(
        &self,
        rows: &BTreeMap<MetricCode, ScoreRecord>,
    ) -> Result<Option<f64>, CatalogError> {
        if rows.is_empty() {
            return Ok(None);
        }

        let mut total = 0.0;
        for (code, record) in rows {
            let metric = self.catalog.lookup(code)?;
            total += metric.weight_percentage * f64::from(record.score.points()) / 10.0;
        }

        Ok(Some(round2(total)))
    }

    pub fn classify(&self, final_score: f64) -> RiskClassification {
        self.config.risk.classify(final_score)
    }

    /// Final score and risk classification in one pass.
    pub fn derive(
        &self,
        rows: &BTreeMap<MetricCode, ScoreRecord>,
    ) -> Result<DerivedScore, CatalogError> {
        let final_score = self.weighted_final_score(rows)?;
        Ok(DerivedScore {
            final_score,
            risk_classification: final_score.map(|score| self.classify(score)),
        })
    }

    /// Read-side merge of the authoritative ledger with the advisory AI
    /// overlay, keyed by metric code and presented in catalog order.
    ///
    /// The ledger always wins for the current score; a suggestion only ever
    /// surfaces in its own fields alongside it.
    pub fn merged_view(
        &self,
        submission: &Submission,
        rows: &BTreeMap<MetricCode, ScoreRecord>,
    ) -> SubmissionScoresView {
        let suggestions: BTreeMap<&MetricCode, _> = submission
            .ai_suggestions
            .iter()
            .map(|suggestion| (&suggestion.metric_code, suggestion))
            .collect();

        let metrics = self
            .catalog
            .iter()
            .map(|metric| {
                let row = rows.get(&metric.code);
                let suggestion = suggestions.get(&metric.code);
                MetricScoreView {
                    metric_code: metric.code.clone(),
                    scope_en: metric.scope_en.clone(),
                    weight_percentage: metric.weight_percentage,
                    score: row.map(|record| record.score),
                    comment_en: row.map(|record| record.comment_en.clone()),
                    comment_tr: row.and_then(|record| record.comment_tr.clone()),
                    recorded_at: row.map(|record| record.recorded_at),
                    ai_suggested_score: suggestion.map(|s| s.suggested_score),
                    ai_reasoning: suggestion.map(|s| s.reasoning.clone()),
                }
            })
            .collect();

        SubmissionScoresView {
            submission_id: submission.id.clone(),
            status: submission.status,
            final_score: submission.final_score,
            risk_classification: submission.risk_classification,
            metrics,
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// One catalog criterion with its current score and any AI suggestion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricScoreView {
    pub metric_code: MetricCode,
    pub scope_en: String,
    pub weight_percentage: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<ScoreValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment_en: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment_tr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recorded_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_suggested_score: Option<ScoreValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_reasoning: Option<String>,
}

/// Merged scores response for one submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmissionScoresView {
    pub submission_id: SubmissionId,
    pub status: SubmissionStatus,
    pub final_score: Option<f64>,
    pub risk_classification: Option<RiskClassification>,
    pub metrics: Vec<MetricScoreView>,
}

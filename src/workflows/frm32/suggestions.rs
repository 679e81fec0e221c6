use std::collections::BTreeMap;
use std::future::Future;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::catalog::{K2Metric, MetricCatalog};
use super::domain::{AiSuggestion, MetricCode, ScoreValue};

/// Reasoning text is capped the way the legacy ingest capped it.
pub const MAX_REASONING_CHARS: usize = 500;

/// Everything the external generator needs to evaluate one submission.
#[derive(Debug, Clone)]
pub struct SuggestionRequest {
    pub metrics: Vec<K2Metric>,
    pub answers: BTreeMap<String, String>,
    pub contractor_name: String,
}

/// Unvalidated suggestion as returned by the model boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSuggestion {
    pub metric_code: String,
    pub suggested_score: i64,
    pub reasoning: String,
}

/// Outcome contract of the outbound generator call. Any `success: false` (or
/// a panicked/failed task) is treated as "no suggestions available".
#[derive(Debug, Clone, Default)]
pub struct SuggestionOutcome {
    pub success: bool,
    pub suggestions: Vec<RawSuggestion>,
    pub error: Option<String>,
}

impl SuggestionOutcome {
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            suggestions: Vec::new(),
            error: Some(error.into()),
        }
    }
}

/// Seam for the third-party LLM call. The round-trip can take seconds, so it
/// is only ever invoked from a background task, never on the request path.
pub trait SuggestionGenerator: Send + Sync + 'static {
    fn generate(
        &self,
        request: SuggestionRequest,
    ) -> impl Future<Output = SuggestionOutcome> + Send;
}

/// Stand-in generator used when no model backend is configured.
#[derive(Debug, Default, Clone)]
pub struct DisabledSuggestionGenerator;

impl SuggestionGenerator for DisabledSuggestionGenerator {
    fn generate(
        &self,
        _request: SuggestionRequest,
    ) -> impl Future<Output = SuggestionOutcome> + Send {
        std::future::ready(SuggestionOutcome::failure("suggestion generator not configured"))
    }
}

/// Lenient validation for the advisory path: invalid entries are dropped with
/// a log line instead of failing the batch, reasoning is truncated, and codes
/// unknown to the catalog are skipped.
pub fn sanitize_suggestions(catalog: &MetricCatalog, raw: Vec<RawSuggestion>) -> Vec<AiSuggestion> {
    let mut sanitized = Vec::with_capacity(raw.len());

    for item in raw {
        let code = MetricCode(item.metric_code);
        if catalog.lookup(&code).is_err() {
            warn!(metric = code.as_str(), "dropping suggestion for unknown metric");
            continue;
        }

        let score = match ScoreValue::try_from(item.suggested_score) {
            Ok(score) => score,
            Err(err) => {
                warn!(metric = code.as_str(), %err, "dropping suggestion with invalid score");
                continue;
            }
        };

        let reasoning = if item.reasoning.chars().count() > MAX_REASONING_CHARS {
            item.reasoning.chars().take(MAX_REASONING_CHARS).collect()
        } else {
            item.reasoning
        };

        sanitized.push(AiSuggestion {
            metric_code: code,
            suggested_score: score,
            reasoning,
        });
    }

    sanitized
}

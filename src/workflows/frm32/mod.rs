//! FRM32 K2 weighted-scoring workflow.
//!
//! Three layers, leaf first: the immutable [`catalog::MetricCatalog`] of
//! weighted K2 criteria, the per-submission score ledger behind
//! [`repository::SubmissionStore`], and the [`scoring::ScoringEngine`] that
//! derives the weighted final score and risk classification. AI suggestions
//! are an advisory overlay on the submission, never part of the ledger.

pub mod catalog;
pub mod domain;
pub mod notify;
pub mod repository;
pub mod router;
pub mod scoring;
pub mod service;
pub mod suggestions;

#[cfg(test)]
mod tests;

pub use catalog::{CatalogError, K2Metric, MetricCatalog};
pub use domain::{
    AiSuggestion, CallerIdentity, CallerRole, ContractorId, MetricCode, NewSubmission, ScoreEntry,
    ScoreRecord, ScoreValue, SubmissionId, SubmissionStatus, TenantId,
};
pub use notify::{LogNotificationSender, NotificationKind, NotificationSender, NotifyError, ReviewNotification};
pub use repository::{
    InMemorySubmissionStore, ReviewTransition, StoreError, Submission, SubmissionFilter,
    SubmissionStore,
};
pub use router::frm32_router;
pub use scoring::{
    DerivedScore, MetricScoreView, RiskClassification, RiskThresholds, ScoringConfig,
    ScoringEngine, SubmissionScoresView,
};
pub use service::{Frm32Service, ScoringError};
pub use suggestions::{
    DisabledSuggestionGenerator, RawSuggestion, SuggestionGenerator, SuggestionOutcome,
    SuggestionRequest,
};

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    AiSuggestion, ContractorId, MetricCode, ScoreRecord, SubmissionId, SubmissionStatus, TenantId,
};
use super::scoring::{DerivedScore, RiskClassification};

/// Stored evaluation unit that ledger rows and derived results attach to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub id: SubmissionId,
    pub tenant_id: TenantId,
    pub contractor_id: ContractorId,
    pub contractor_name: String,
    /// e.g. "2025-Q3" or "2025-09".
    pub evaluation_period: String,
    pub status: SubmissionStatus,
    pub answers: BTreeMap<String, String>,
    pub notes: Option<String>,
    pub final_score: Option<f64>,
    pub risk_classification: Option<RiskClassification>,
    /// Advisory overlay, deliberately denormalized onto the submission and
    /// kept apart from the authoritative score ledger.
    pub ai_suggestions: Vec<AiSuggestion>,
    pub created_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<String>,
    /// Optimistic-concurrency token bumped on every ledger commit.
    #[serde(default)]
    pub revision: u64,
}

/// Filters for tenant-scoped submission listings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SubmissionFilter {
    pub status: Option<SubmissionStatus>,
    pub contractor_id: Option<ContractorId>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// Status stamp applied when a review is finalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewTransition {
    pub reviewed_by: String,
    pub reviewed_at: DateTime<Utc>,
}

/// Error enumeration for store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("submission changed concurrently (expected revision {expected}, found {actual})")]
    RevisionConflict { expected: u64, actual: u64 },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Storage abstraction injected into the scoring service so the engine can be
/// exercised against test doubles and so no ambient datastore handle exists.
pub trait SubmissionStore: Send + Sync {
    fn insert(&self, submission: Submission) -> Result<Submission, StoreError>;

    /// Tenant-scoped fetch; a submission owned by another tenant reads as
    /// absent rather than forbidden.
    fn fetch(
        &self,
        tenant_id: &TenantId,
        id: &SubmissionId,
    ) -> Result<Option<Submission>, StoreError>;

    fn list(
        &self,
        tenant_id: &TenantId,
        filter: &SubmissionFilter,
    ) -> Result<Vec<Submission>, StoreError>;

    /// Draft → submitted transition, checked and applied under the store
    /// lock; a submission that already left `draft` fails with `Conflict`.
    fn mark_submitted(
        &self,
        id: &SubmissionId,
        submitted_at: DateTime<Utc>,
    ) -> Result<Submission, StoreError>;

    /// Replace only the advisory suggestion overlay. The ledger, derived
    /// score fields, and status are never written by this operation, so a
    /// concurrently committed review cannot be overwritten from this path.
    fn replace_suggestions(
        &self,
        id: &SubmissionId,
        suggestions: Vec<AiSuggestion>,
    ) -> Result<(), StoreError>;

    fn scores(&self, id: &SubmissionId) -> Result<BTreeMap<MetricCode, ScoreRecord>, StoreError>;

    /// Atomically upsert ledger rows, write the derived score fields, and
    /// optionally finalize the review, all under one revision check. Either
    /// the whole batch lands or nothing does.
    fn commit_review(
        &self,
        id: &SubmissionId,
        expected_revision: u64,
        rows: Vec<ScoreRecord>,
        derived: DerivedScore,
        transition: Option<ReviewTransition>,
    ) -> Result<Submission, StoreError>;
}

#[derive(Default)]
struct StoreInner {
    submissions: HashMap<SubmissionId, Submission>,
    ledgers: HashMap<SubmissionId, BTreeMap<MetricCode, ScoreRecord>>,
}

/// Mutex-guarded in-memory store backing the binary and the test suites.
#[derive(Default, Clone)]
pub struct InMemorySubmissionStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl SubmissionStore for InMemorySubmissionStore {
    fn insert(&self, submission: Submission) -> Result<Submission, StoreError> {
        let mut guard = self.inner.lock().expect("store mutex poisoned");
        if guard.submissions.contains_key(&submission.id) {
            return Err(StoreError::Conflict);
        }
        guard
            .submissions
            .insert(submission.id.clone(), submission.clone());
        Ok(submission)
    }

    fn fetch(
        &self,
        tenant_id: &TenantId,
        id: &SubmissionId,
    ) -> Result<Option<Submission>, StoreError> {
        let guard = self.inner.lock().expect("store mutex poisoned");
        Ok(guard
            .submissions
            .get(id)
            .filter(|submission| &submission.tenant_id == tenant_id)
            .cloned())
    }

    fn list(
        &self,
        tenant_id: &TenantId,
        filter: &SubmissionFilter,
    ) -> Result<Vec<Submission>, StoreError> {
        let guard = self.inner.lock().expect("store mutex poisoned");
        let mut matches: Vec<Submission> = guard
            .submissions
            .values()
            .filter(|submission| &submission.tenant_id == tenant_id)
            .filter(|submission| {
                filter
                    .status
                    .map_or(true, |status| submission.status == status)
            })
            .filter(|submission| {
                filter
                    .contractor_id
                    .as_ref()
                    .map_or(true, |contractor| &submission.contractor_id == contractor)
            })
            .cloned()
            .collect();

        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let offset = filter.offset.unwrap_or(0);
        let limit = filter.limit.unwrap_or(50);
        Ok(matches.into_iter().skip(offset).take(limit).collect())
    }

    fn mark_submitted(
        &self,
        id: &SubmissionId,
        submitted_at: DateTime<Utc>,
    ) -> Result<Submission, StoreError> {
        let mut guard = self.inner.lock().expect("store mutex poisoned");
        let submission = guard.submissions.get_mut(id).ok_or(StoreError::NotFound)?;
        if submission.status != SubmissionStatus::Draft {
            return Err(StoreError::Conflict);
        }
        submission.status = SubmissionStatus::Submitted;
        submission.submitted_at = Some(submitted_at);
        submission.revision += 1;
        Ok(submission.clone())
    }

    fn replace_suggestions(
        &self,
        id: &SubmissionId,
        suggestions: Vec<AiSuggestion>,
    ) -> Result<(), StoreError> {
        let mut guard = self.inner.lock().expect("store mutex poisoned");
        let submission = guard.submissions.get_mut(id).ok_or(StoreError::NotFound)?;
        submission.ai_suggestions = suggestions;
        submission.revision += 1;
        Ok(())
    }

    fn scores(&self, id: &SubmissionId) -> Result<BTreeMap<MetricCode, ScoreRecord>, StoreError> {
        let guard = self.inner.lock().expect("store mutex poisoned");
        Ok(guard.ledgers.get(id).cloned().unwrap_or_default())
    }

    fn commit_review(
        &self,
        id: &SubmissionId,
        expected_revision: u64,
        rows: Vec<ScoreRecord>,
        derived: DerivedScore,
        transition: Option<ReviewTransition>,
    ) -> Result<Submission, StoreError> {
        let mut guard = self.inner.lock().expect("store mutex poisoned");
        let StoreInner {
            submissions,
            ledgers,
        } = &mut *guard;

        let submission = submissions.get_mut(id).ok_or(StoreError::NotFound)?;
        if submission.revision != expected_revision {
            return Err(StoreError::RevisionConflict {
                expected: expected_revision,
                actual: submission.revision,
            });
        }

        let ledger = ledgers.entry(id.clone()).or_default();
        for row in rows {
            ledger.insert(row.metric_code.clone(), row);
        }

        submission.final_score = derived.final_score;
        submission.risk_classification = derived.risk_classification;
        if let Some(transition) = transition {
            submission.status = SubmissionStatus::Reviewed;
            submission.reviewed_at = Some(transition.reviewed_at);
            submission.reviewed_by = Some(transition.reviewed_by);
        }
        submission.revision += 1;

        Ok(submission.clone())
    }
}

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use super::catalog::{CatalogError, K2Metric};
use super::domain::{
    CallerIdentity, NewSubmission, ScoreEntry, ScoreRecord, ScoreValue, SubmissionId,
    SubmissionStatus, TenantId,
};
use super::notify::{NotificationKind, NotificationSender, ReviewNotification};
use super::repository::{ReviewTransition, StoreError, Submission, SubmissionFilter, SubmissionStore};
use super::scoring::{ScoringEngine, SubmissionScoresView};
use super::suggestions::{
    sanitize_suggestions, RawSuggestion, SuggestionGenerator, SuggestionRequest,
};

/// Bounded retries when an optimistic ledger commit loses a race.
const MAX_COMMIT_ATTEMPTS: usize = 3;

static SUBMISSION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_submission_id() -> SubmissionId {
    let id = SUBMISSION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    SubmissionId(format!("frm32-{id:06}"))
}

/// Error raised by the FRM32 scoring workflow.
#[derive(Debug, thiserror::Error)]
pub enum ScoringError {
    #[error("submission {} not found", .0.0)]
    SubmissionNotFound(SubmissionId),
    #[error("metric {}: score must be one of 0, 3, 6 or 10 (got {value})", metric.as_str())]
    InvalidScoreValue {
        metric: super::domain::MetricCode,
        value: i64,
    },
    #[error("caller is not permitted to score submissions")]
    Forbidden,
    #[error("submission {} has not been submitted yet (status {})", .id.0, status.label())]
    SubmissionNotSubmitted {
        id: SubmissionId,
        status: SubmissionStatus,
    },
    #[error("submission {} was already submitted", .0.0)]
    AlreadySubmitted(SubmissionId),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Service composing the metric catalog, score ledger, scoring engine, and
/// the advisory suggestion/notification side channels.
pub struct Frm32Service<S, G, N> {
    store: Arc<S>,
    engine: Arc<ScoringEngine>,
    suggestions: Arc<G>,
    notifications: Arc<N>,
}

impl<S, G, N> Frm32Service<S, G, N>
where
    S: SubmissionStore + 'static,
    G: SuggestionGenerator + 'static,
    N: NotificationSender + 'static,
{
    pub fn new(
        store: Arc<S>,
        engine: Arc<ScoringEngine>,
        suggestions: Arc<G>,
        notifications: Arc<N>,
    ) -> Self {
        Self {
            store,
            engine,
            suggestions,
            notifications,
        }
    }

    pub fn engine(&self) -> &ScoringEngine {
        &self.engine
    }

    /// Full catalog for the read-only metrics endpoint.
    pub fn catalog_metrics(&self) -> Vec<K2Metric> {
        self.engine.catalog().iter().cloned().collect()
    }

    /// Create a draft submission scoped to the caller's tenant.
    pub fn create_submission(
        &self,
        identity: &CallerIdentity,
        payload: NewSubmission,
    ) -> Result<Submission, ScoringError> {
        let submission = Submission {
            id: next_submission_id(),
            tenant_id: identity.tenant_id.clone(),
            contractor_id: payload.contractor_id,
            contractor_name: payload.contractor_name,
            evaluation_period: payload.evaluation_period,
            status: SubmissionStatus::Draft,
            answers: payload.answers,
            notes: payload.notes,
            final_score: None,
            risk_classification: None,
            ai_suggestions: Vec::new(),
            created_at: Utc::now(),
            submitted_at: None,
            reviewed_at: None,
            reviewed_by: None,
            revision: 0,
        };

        Ok(self.store.insert(submission)?)
    }

    pub fn get_submission(
        &self,
        identity: &CallerIdentity,
        id: &SubmissionId,
    ) -> Result<Submission, ScoringError> {
        self.store
            .fetch(&identity.tenant_id, id)?
            .ok_or_else(|| ScoringError::SubmissionNotFound(id.clone()))
    }

    pub fn list_submissions(
        &self,
        identity: &CallerIdentity,
        filter: &SubmissionFilter,
    ) -> Result<Vec<Submission>, ScoringError> {
        Ok(self.store.list(&identity.tenant_id, filter)?)
    }

    /// Move a draft to `submitted` and raise the reviewer notification.
    ///
    /// The notification is best-effort: a transport failure is logged and the
    /// submission still succeeds.
    pub fn submit_submission(
        &self,
        identity: &CallerIdentity,
        id: &SubmissionId,
    ) -> Result<Submission, ScoringError> {
        let current = self.get_submission(identity, id)?;
        if current.status != SubmissionStatus::Draft {
            return Err(ScoringError::AlreadySubmitted(id.clone()));
        }

        // The store re-checks the status under its own lock.
        let submission = match self.store.mark_submitted(id, Utc::now()) {
            Ok(submission) => submission,
            Err(StoreError::Conflict) => return Err(ScoringError::AlreadySubmitted(id.clone())),
            Err(err) => return Err(err.into()),
        };

        if let Err(err) = self.notifications.send(ReviewNotification {
            kind: NotificationKind::SubmissionReceived,
            submission_id: submission.id.clone(),
            contractor_name: submission.contractor_name.clone(),
            evaluation_period: submission.evaluation_period.clone(),
        }) {
            warn!(submission = %submission.id.0, %err, "reviewer notification failed");
        }

        Ok(submission)
    }

    /// Merged ledger + AI-suggestion view for one submission.
    pub fn get_scores(
        &self,
        identity: &CallerIdentity,
        id: &SubmissionId,
    ) -> Result<SubmissionScoresView, ScoringError> {
        let submission = self.get_submission(identity, id)?;
        let ledger = self.store.scores(id)?;
        Ok(self.engine.merged_view(&submission, &ledger))
    }

    /// Reviewer/admin score upsert followed by a synchronous recompute.
    ///
    /// The returned view reflects the committed ledger, so callers can rely
    /// on `final_score` being current the moment this returns.
    pub fn upsert_scores(
        &self,
        identity: &CallerIdentity,
        id: &SubmissionId,
        entries: &[ScoreEntry],
    ) -> Result<SubmissionScoresView, ScoringError> {
        if !identity.can_review() {
            return Err(ScoringError::Forbidden);
        }
        self.score_submission(identity, id, entries, false)
    }

    /// Scoring entry point for the automated callback: same scoring path as
    /// [`Self::upsert_scores`] plus the submitted → reviewed transition.
    /// Ownership is enforced by the tenant-scoped fetch instead of a role
    /// gate so both entry paths cannot diverge.
    pub fn apply_scores_and_finalize(
        &self,
        identity: &CallerIdentity,
        id: &SubmissionId,
        entries: &[ScoreEntry],
    ) -> Result<SubmissionScoresView, ScoringError> {
        self.score_submission(identity, id, entries, true)
    }

    /// Wholesale-replace the advisory overlay. Invalid entries are dropped.
    /// The write goes through a store operation scoped to the suggestion
    /// field, so a review committed after our read is never overwritten —
    /// the ledger, `final_score`, and status stay untouched from this path.
    pub fn store_ai_suggestions(
        &self,
        tenant_id: &TenantId,
        id: &SubmissionId,
        raw: Vec<RawSuggestion>,
    ) -> Result<usize, ScoringError> {
        self.store
            .fetch(tenant_id, id)?
            .ok_or_else(|| ScoringError::SubmissionNotFound(id.clone()))?;

        let sanitized = sanitize_suggestions(self.engine.catalog(), raw);
        let stored = sanitized.len();
        self.store.replace_suggestions(id, sanitized)?;

        Ok(stored)
    }

    /// Body of the background suggestion task: call the generator, sanitize,
    /// store. Generator failures are logged and swallowed — this path is
    /// advisory and must never affect the submission itself.
    pub async fn generate_and_store_suggestions(
        &self,
        tenant_id: &TenantId,
        id: &SubmissionId,
    ) -> Result<usize, ScoringError> {
        let submission = self
            .store
            .fetch(tenant_id, id)?
            .ok_or_else(|| ScoringError::SubmissionNotFound(id.clone()))?;

        let request = SuggestionRequest {
            metrics: self.catalog_metrics(),
            answers: submission.answers.clone(),
            contractor_name: submission.contractor_name.clone(),
        };

        let outcome = self.suggestions.generate(request).await;
        if !outcome.success {
            warn!(
                submission = %id.0,
                error = outcome.error.as_deref().unwrap_or("unknown"),
                "suggestion generation unavailable"
            );
            return Ok(0);
        }

        let stored = self.store_ai_suggestions(tenant_id, id, outcome.suggestions)?;
        info!(submission = %id.0, count = stored, "stored AI score suggestions");
        Ok(stored)
    }

    fn score_submission(
        &self,
        identity: &CallerIdentity,
        id: &SubmissionId,
        entries: &[ScoreEntry],
        finalize: bool,
    ) -> Result<SubmissionScoresView, ScoringError> {
        let rows = self.validate_entries(entries)?;

        let mut attempt = 0;
        loop {
            let submission = self.get_submission(identity, id)?;
            if submission.status == SubmissionStatus::Draft {
                return Err(ScoringError::SubmissionNotSubmitted {
                    id: id.clone(),
                    status: submission.status,
                });
            }

            let mut merged = self.store.scores(id)?;
            for row in &rows {
                merged.insert(row.metric_code.clone(), row.clone());
            }
            let derived = self.engine.derive(&merged)?;

            let transition = finalize.then(|| ReviewTransition {
                reviewed_by: identity.user_id.clone(),
                reviewed_at: Utc::now(),
            });

            match self
                .store
                .commit_review(id, submission.revision, rows.clone(), derived, transition)
            {
                Ok(updated) => {
                    if finalize {
                        if let Err(err) = self.notifications.send(ReviewNotification {
                            kind: NotificationKind::ReviewCompleted,
                            submission_id: updated.id.clone(),
                            contractor_name: updated.contractor_name.clone(),
                            evaluation_period: updated.evaluation_period.clone(),
                        }) {
                            warn!(submission = %updated.id.0, %err, "review notification failed");
                        }
                    }
                    let ledger = self.store.scores(id)?;
                    return Ok(self.engine.merged_view(&updated, &ledger));
                }
                Err(StoreError::RevisionConflict { .. }) if attempt + 1 < MAX_COMMIT_ATTEMPTS => {
                    warn!(submission = %id.0, attempt, "ledger commit raced, retrying");
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Reject-before-write validation: the whole batch must be well-formed
    /// before a single row is persisted.
    fn validate_entries(&self, entries: &[ScoreEntry]) -> Result<Vec<ScoreRecord>, ScoringError> {
        let now = Utc::now();
        let mut rows = Vec::with_capacity(entries.len());

        for entry in entries {
            let score = ScoreValue::try_from(entry.score).map_err(|_| {
                ScoringError::InvalidScoreValue {
                    metric: entry.metric_code.clone(),
                    value: entry.score,
                }
            })?;
            let metric = self.engine.catalog().lookup(&entry.metric_code)?;
            let comment = metric.comments.for_score(score);

            rows.push(ScoreRecord {
                metric_code: metric.code.clone(),
                score,
                comment_en: comment.en.clone(),
                comment_tr: comment.tr.clone(),
                recorded_at: now,
            });
        }

        Ok(rows)
    }
}

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::Utc;
use serde_json::Value;

use crate::workflows::frm32::catalog::{
    CannedComment, K2Metric, MetricCatalog, ScoreComments, DEFAULT_WEIGHT_EPSILON,
};
use crate::workflows::frm32::domain::{
    AiSuggestion, CallerIdentity, CallerRole, ContractorId, MetricCode, NewSubmission, ScoreRecord,
    ScoreValue, SubmissionId, TenantId,
};
use crate::workflows::frm32::notify::{NotificationSender, NotifyError, ReviewNotification};
use crate::workflows::frm32::repository::{
    InMemorySubmissionStore, ReviewTransition, StoreError, Submission, SubmissionFilter,
    SubmissionStore,
};
use crate::workflows::frm32::scoring::{DerivedScore, ScoringConfig, ScoringEngine};
use crate::workflows::frm32::suggestions::{
    SuggestionGenerator, SuggestionOutcome, SuggestionRequest,
};
use crate::workflows::frm32::{frm32_router, Frm32Service};

pub(super) type MemoryService =
    Frm32Service<InMemorySubmissionStore, ScriptedSuggestions, MemoryNotifications>;

pub(super) fn test_metric(code: &str, weight_percentage: f64) -> K2Metric {
    let comment = |grade: &str| CannedComment {
        en: format!("{grade} evidence for {code}"),
        tr: None,
    };
    K2Metric {
        code: MetricCode(code.to_string()),
        scope_en: format!("Scope of {code}"),
        scope_tr: None,
        weight_percentage,
        comments: ScoreComments {
            at_zero: comment("No"),
            at_three: comment("Weak"),
            at_six: comment("Partial"),
            at_ten: comment("Full"),
        },
    }
}

pub(super) fn two_metric_catalog() -> MetricCatalog {
    MetricCatalog::new(
        vec![test_metric("K2.1", 60.0), test_metric("K2.2", 40.0)],
        DEFAULT_WEIGHT_EPSILON,
    )
    .expect("valid two-metric catalog")
}

pub(super) fn three_metric_catalog() -> MetricCatalog {
    MetricCatalog::new(
        vec![
            test_metric("K2.1", 50.0),
            test_metric("K2.2", 30.0),
            test_metric("K2.3", 20.0),
        ],
        DEFAULT_WEIGHT_EPSILON,
    )
    .expect("valid three-metric catalog")
}

pub(super) fn engine_for(catalog: MetricCatalog) -> ScoringEngine {
    ScoringEngine::new(Arc::new(catalog), ScoringConfig::default())
}

pub(super) fn ledger(entries: &[(&str, i64)]) -> BTreeMap<MetricCode, ScoreRecord> {
    entries
        .iter()
        .map(|(code, score)| {
            let code = MetricCode(code.to_string());
            let record = ScoreRecord {
                metric_code: code.clone(),
                score: ScoreValue::try_from(*score).expect("fixture score is allowed"),
                comment_en: format!("comment for {}", code.as_str()),
                comment_tr: None,
                recorded_at: Utc::now(),
            };
            (code, record)
        })
        .collect()
}

pub(super) fn reviewer() -> CallerIdentity {
    CallerIdentity {
        user_id: "reviewer-1".to_string(),
        role: CallerRole::Reviewer,
        tenant_id: TenantId("tenant-1".to_string()),
    }
}

pub(super) fn contractor() -> CallerIdentity {
    CallerIdentity {
        user_id: "contractor-1".to_string(),
        role: CallerRole::Contractor,
        tenant_id: TenantId("tenant-1".to_string()),
    }
}

pub(super) fn service_caller() -> CallerIdentity {
    CallerIdentity {
        user_id: "callback".to_string(),
        role: CallerRole::Service,
        tenant_id: TenantId("tenant-1".to_string()),
    }
}

pub(super) fn foreign_reviewer() -> CallerIdentity {
    CallerIdentity {
        user_id: "reviewer-2".to_string(),
        role: CallerRole::Reviewer,
        tenant_id: TenantId("tenant-2".to_string()),
    }
}

pub(super) fn new_submission() -> NewSubmission {
    let mut answers = BTreeMap::new();
    answers.insert(
        "q1".to_string(),
        "Signed HSE policy attached, reviewed annually.".to_string(),
    );
    answers.insert(
        "q2".to_string(),
        "Risk assessments cover lifting and confined spaces.".to_string(),
    );
    NewSubmission {
        contractor_id: ContractorId("contractor-77".to_string()),
        contractor_name: "Northline Mechanical".to_string(),
        evaluation_period: "2026-Q2".to_string(),
        answers,
        notes: Some("First evaluation this year.".to_string()),
    }
}

pub(super) fn build_service() -> (
    MemoryService,
    Arc<InMemorySubmissionStore>,
    Arc<ScriptedSuggestions>,
    Arc<MemoryNotifications>,
) {
    let store = Arc::new(InMemorySubmissionStore::default());
    let suggestions = Arc::new(ScriptedSuggestions::default());
    let notifications = Arc::new(MemoryNotifications::default());
    let service = Frm32Service::new(
        store.clone(),
        Arc::new(engine_for(two_metric_catalog())),
        suggestions.clone(),
        notifications.clone(),
    );
    (service, store, suggestions, notifications)
}

/// Create a draft and move it to `submitted` so scoring paths can run.
pub(super) fn submitted_submission(service: &MemoryService) -> Submission {
    let draft = service
        .create_submission(&reviewer(), new_submission())
        .expect("draft created");
    service
        .submit_submission(&reviewer(), &draft.id)
        .expect("draft submitted")
}

pub(super) fn router_with_service(service: MemoryService) -> axum::Router {
    frm32_router(Arc::new(service))
}

#[derive(Default)]
pub(super) struct MemoryNotifications {
    events: Mutex<Vec<ReviewNotification>>,
}

impl MemoryNotifications {
    pub(super) fn events(&self) -> Vec<ReviewNotification> {
        self.events.lock().expect("notification mutex poisoned").clone()
    }
}

impl NotificationSender for MemoryNotifications {
    fn send(&self, notification: ReviewNotification) -> Result<(), NotifyError> {
        self.events
            .lock()
            .expect("notification mutex poisoned")
            .push(notification);
        Ok(())
    }
}

/// Generator double that replays whatever outcome the test scripted.
#[derive(Default)]
pub(super) struct ScriptedSuggestions {
    outcome: Mutex<Option<SuggestionOutcome>>,
}

impl ScriptedSuggestions {
    pub(super) fn script(&self, outcome: SuggestionOutcome) {
        *self.outcome.lock().expect("suggestion mutex poisoned") = Some(outcome);
    }
}

impl SuggestionGenerator for ScriptedSuggestions {
    fn generate(
        &self,
        _request: SuggestionRequest,
    ) -> impl std::future::Future<Output = SuggestionOutcome> + Send {
        let outcome = self
            .outcome
            .lock()
            .expect("suggestion mutex poisoned")
            .clone()
            .unwrap_or_else(|| SuggestionOutcome::failure("no scripted outcome"));
        std::future::ready(outcome)
    }
}

pub(super) struct UnavailableStore;

impl SubmissionStore for UnavailableStore {
    fn insert(&self, _submission: Submission) -> Result<Submission, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn fetch(
        &self,
        _tenant_id: &TenantId,
        _id: &SubmissionId,
    ) -> Result<Option<Submission>, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn list(
        &self,
        _tenant_id: &TenantId,
        _filter: &SubmissionFilter,
    ) -> Result<Vec<Submission>, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn mark_submitted(
        &self,
        _id: &SubmissionId,
        _submitted_at: chrono::DateTime<Utc>,
    ) -> Result<Submission, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn replace_suggestions(
        &self,
        _id: &SubmissionId,
        _suggestions: Vec<AiSuggestion>,
    ) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn scores(&self, _id: &SubmissionId) -> Result<BTreeMap<MetricCode, ScoreRecord>, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn commit_review(
        &self,
        _id: &SubmissionId,
        _expected_revision: u64,
        _rows: Vec<ScoreRecord>,
        _derived: DerivedScore,
        _transition: Option<ReviewTransition>,
    ) -> Result<Submission, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }
}

/// Store wrapper that fails the next N ledger commits with a revision
/// conflict, then behaves normally.
pub(super) struct FlakyCommitStore {
    inner: InMemorySubmissionStore,
    conflicts_remaining: AtomicUsize,
}

impl FlakyCommitStore {
    pub(super) fn failing(conflicts: usize) -> Self {
        Self {
            inner: InMemorySubmissionStore::default(),
            conflicts_remaining: AtomicUsize::new(conflicts),
        }
    }

    fn take_conflict(&self) -> bool {
        self.conflicts_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl SubmissionStore for FlakyCommitStore {
    fn insert(&self, submission: Submission) -> Result<Submission, StoreError> {
        self.inner.insert(submission)
    }

    fn fetch(
        &self,
        tenant_id: &TenantId,
        id: &SubmissionId,
    ) -> Result<Option<Submission>, StoreError> {
        self.inner.fetch(tenant_id, id)
    }

    fn list(
        &self,
        tenant_id: &TenantId,
        filter: &SubmissionFilter,
    ) -> Result<Vec<Submission>, StoreError> {
        self.inner.list(tenant_id, filter)
    }

    fn mark_submitted(
        &self,
        id: &SubmissionId,
        submitted_at: chrono::DateTime<Utc>,
    ) -> Result<Submission, StoreError> {
        self.inner.mark_submitted(id, submitted_at)
    }

    fn replace_suggestions(
        &self,
        id: &SubmissionId,
        suggestions: Vec<AiSuggestion>,
    ) -> Result<(), StoreError> {
        self.inner.replace_suggestions(id, suggestions)
    }

    fn scores(&self, id: &SubmissionId) -> Result<BTreeMap<MetricCode, ScoreRecord>, StoreError> {
        self.inner.scores(id)
    }

    fn commit_review(
        &self,
        id: &SubmissionId,
        expected_revision: u64,
        rows: Vec<ScoreRecord>,
        derived: DerivedScore,
        transition: Option<ReviewTransition>,
    ) -> Result<Submission, StoreError> {
        if self.take_conflict() {
            return Err(StoreError::RevisionConflict {
                expected: expected_revision,
                actual: expected_revision + 1,
            });
        }
        self.inner
            .commit_review(id, expected_revision, rows, derived, transition)
    }
}

/// Review commit a test wants to land between the suggestion path's read
/// and its overlay write.
pub(super) struct PendingReview {
    pub(super) id: SubmissionId,
    pub(super) expected_revision: u64,
    pub(super) row: ScoreRecord,
    pub(super) derived: DerivedScore,
    pub(super) transition: ReviewTransition,
}

/// Store wrapper that finalizes an armed review right before the next
/// suggestion-overlay write goes through.
#[derive(Default)]
pub(super) struct ReviewRacingStore {
    inner: InMemorySubmissionStore,
    pending_review: Mutex<Option<PendingReview>>,
}

impl ReviewRacingStore {
    pub(super) fn arm(&self, review: PendingReview) {
        *self.pending_review.lock().expect("race mutex poisoned") = Some(review);
    }
}

impl SubmissionStore for ReviewRacingStore {
    fn insert(&self, submission: Submission) -> Result<Submission, StoreError> {
        self.inner.insert(submission)
    }

    fn fetch(
        &self,
        tenant_id: &TenantId,
        id: &SubmissionId,
    ) -> Result<Option<Submission>, StoreError> {
        self.inner.fetch(tenant_id, id)
    }

    fn list(
        &self,
        tenant_id: &TenantId,
        filter: &SubmissionFilter,
    ) -> Result<Vec<Submission>, StoreError> {
        self.inner.list(tenant_id, filter)
    }

    fn mark_submitted(
        &self,
        id: &SubmissionId,
        submitted_at: chrono::DateTime<Utc>,
    ) -> Result<Submission, StoreError> {
        self.inner.mark_submitted(id, submitted_at)
    }

    fn replace_suggestions(
        &self,
        id: &SubmissionId,
        suggestions: Vec<AiSuggestion>,
    ) -> Result<(), StoreError> {
        let armed = self.pending_review.lock().expect("race mutex poisoned").take();
        if let Some(review) = armed {
            self.inner.commit_review(
                &review.id,
                review.expected_revision,
                vec![review.row],
                review.derived,
                Some(review.transition),
            )?;
        }
        self.inner.replace_suggestions(id, suggestions)
    }

    fn scores(&self, id: &SubmissionId) -> Result<BTreeMap<MetricCode, ScoreRecord>, StoreError> {
        self.inner.scores(id)
    }

    fn commit_review(
        &self,
        id: &SubmissionId,
        expected_revision: u64,
        rows: Vec<ScoreRecord>,
        derived: DerivedScore,
        transition: Option<ReviewTransition>,
    ) -> Result<Submission, StoreError> {
        self.inner
            .commit_review(id, expected_revision, rows, derived, transition)
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use super::catalog::CatalogError;
use super::domain::{CallerIdentity, CallerRole, NewSubmission, ScoreEntry, SubmissionId, TenantId};
use super::notify::NotificationSender;
use super::repository::{StoreError, SubmissionFilter, SubmissionStore};
use super::service::{Frm32Service, ScoringError};
use super::suggestions::SuggestionGenerator;

/// Router builder exposing the FRM32 evaluation endpoints.
pub fn frm32_router<S, G, N>(service: Arc<Frm32Service<S, G, N>>) -> Router
where
    S: SubmissionStore + 'static,
    G: SuggestionGenerator + 'static,
    N: NotificationSender + 'static,
{
    Router::new()
        .route("/api/v1/frm32/metrics", get(metrics_handler::<S, G, N>))
        .route(
            "/api/v1/frm32/submissions",
            post(create_submission_handler::<S, G, N>).get(list_submissions_handler::<S, G, N>),
        )
        .route(
            "/api/v1/frm32/submissions/:submission_id",
            get(get_submission_handler::<S, G, N>),
        )
        .route(
            "/api/v1/frm32/submissions/:submission_id/submit",
            post(submit_handler::<S, G, N>),
        )
        .route(
            "/api/v1/frm32/submissions/:submission_id/scores",
            get(get_scores_handler::<S, G, N>).put(put_scores_handler::<S, G, N>),
        )
        .route(
            "/api/v1/frm32/submissions/:submission_id/apply-scores",
            post(apply_scores_handler::<S, G, N>),
        )
        .route(
            "/api/v1/frm32/submissions/:submission_id/ai-suggestions/regenerate",
            post(regenerate_suggestions_handler::<S, G, N>),
        )
        .with_state(service)
}

/// Identity headers stamped by the upstream auth proxy. The core trusts them;
/// token verification happened before the request got here.
#[async_trait]
impl<St> FromRequestParts<St> for CallerIdentity
where
    St: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &St) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        };

        let user_id = header("x-user-id")
            .ok_or_else(|| json_error(StatusCode::UNAUTHORIZED, "x-user-id header required"))?;
        let tenant_id = header("x-tenant-id")
            .ok_or_else(|| json_error(StatusCode::UNAUTHORIZED, "x-tenant-id header required"))?;
        let role = header("x-role")
            .and_then(|raw| CallerRole::parse(&raw))
            .ok_or_else(|| json_error(StatusCode::UNAUTHORIZED, "x-role header required"))?;

        Ok(CallerIdentity {
            user_id,
            role,
            tenant_id: TenantId(tenant_id),
        })
    }
}

/// Body for score upserts from either entry path.
#[derive(Debug, Deserialize)]
pub(crate) struct ScoreUpsertRequest {
    pub(crate) scores: Vec<ScoreEntry>,
}

pub(crate) async fn metrics_handler<S, G, N>(
    State(service): State<Arc<Frm32Service<S, G, N>>>,
    _identity: CallerIdentity,
) -> Response
where
    S: SubmissionStore + 'static,
    G: SuggestionGenerator + 'static,
    N: NotificationSender + 'static,
{
    (StatusCode::OK, axum::Json(service.catalog_metrics())).into_response()
}

pub(crate) async fn create_submission_handler<S, G, N>(
    State(service): State<Arc<Frm32Service<S, G, N>>>,
    identity: CallerIdentity,
    axum::Json(payload): axum::Json<NewSubmission>,
) -> Response
where
    S: SubmissionStore + 'static,
    G: SuggestionGenerator + 'static,
    N: NotificationSender + 'static,
{
    match service.create_submission(&identity, payload) {
        Ok(submission) => (StatusCode::CREATED, axum::Json(submission)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn list_submissions_handler<S, G, N>(
    State(service): State<Arc<Frm32Service<S, G, N>>>,
    identity: CallerIdentity,
    Query(filter): Query<SubmissionFilter>,
) -> Response
where
    S: SubmissionStore + 'static,
    G: SuggestionGenerator + 'static,
    N: NotificationSender + 'static,
{
    match service.list_submissions(&identity, &filter) {
        Ok(submissions) => (StatusCode::OK, axum::Json(submissions)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn get_submission_handler<S, G, N>(
    State(service): State<Arc<Frm32Service<S, G, N>>>,
    identity: CallerIdentity,
    Path(submission_id): Path<String>,
) -> Response
where
    S: SubmissionStore + 'static,
    G: SuggestionGenerator + 'static,
    N: NotificationSender + 'static,
{
    match service.get_submission(&identity, &SubmissionId(submission_id)) {
        Ok(submission) => (StatusCode::OK, axum::Json(submission)).into_response(),
        Err(err) => error_response(err),
    }
}

/// Drafts become `submitted` here; AI suggestion generation is dispatched as
/// a detached task so the response never waits on the model round-trip.
pub(crate) async fn submit_handler<S, G, N>(
    State(service): State<Arc<Frm32Service<S, G, N>>>,
    identity: CallerIdentity,
    Path(submission_id): Path<String>,
) -> Response
where
    S: SubmissionStore + 'static,
    G: SuggestionGenerator + 'static,
    N: NotificationSender + 'static,
{
    let id = SubmissionId(submission_id);
    match service.submit_submission(&identity, &id) {
        Ok(submission) => {
            spawn_suggestion_task(service, identity.tenant_id.clone(), id);
            (StatusCode::OK, axum::Json(submission)).into_response()
        }
        Err(err) => error_response(err),
    }
}

pub(crate) async fn get_scores_handler<S, G, N>(
    State(service): State<Arc<Frm32Service<S, G, N>>>,
    identity: CallerIdentity,
    Path(submission_id): Path<String>,
) -> Response
where
    S: SubmissionStore + 'static,
    G: SuggestionGenerator + 'static,
    N: NotificationSender + 'static,
{
    match service.get_scores(&identity, &SubmissionId(submission_id)) {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn put_scores_handler<S, G, N>(
    State(service): State<Arc<Frm32Service<S, G, N>>>,
    identity: CallerIdentity,
    Path(submission_id): Path<String>,
    axum::Json(payload): axum::Json<ScoreUpsertRequest>,
) -> Response
where
    S: SubmissionStore + 'static,
    G: SuggestionGenerator + 'static,
    N: NotificationSender + 'static,
{
    match service.upsert_scores(&identity, &SubmissionId(submission_id), &payload.scores) {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn apply_scores_handler<S, G, N>(
    State(service): State<Arc<Frm32Service<S, G, N>>>,
    identity: CallerIdentity,
    Path(submission_id): Path<String>,
    axum::Json(payload): axum::Json<ScoreUpsertRequest>,
) -> Response
where
    S: SubmissionStore + 'static,
    G: SuggestionGenerator + 'static,
    N: NotificationSender + 'static,
{
    match service.apply_scores_and_finalize(&identity, &SubmissionId(submission_id), &payload.scores)
    {
        Ok(view) => (StatusCode::OK, axum::Json(view)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn regenerate_suggestions_handler<S, G, N>(
    State(service): State<Arc<Frm32Service<S, G, N>>>,
    identity: CallerIdentity,
    Path(submission_id): Path<String>,
) -> Response
where
    S: SubmissionStore + 'static,
    G: SuggestionGenerator + 'static,
    N: NotificationSender + 'static,
{
    if !identity.can_review() {
        return error_response(ScoringError::Forbidden);
    }

    let id = SubmissionId(submission_id);
    match service.get_submission(&identity, &id) {
        Ok(_) => {
            spawn_suggestion_task(service, identity.tenant_id, id);
            (
                StatusCode::ACCEPTED,
                axum::Json(json!({ "status": "suggestion generation queued" })),
            )
                .into_response()
        }
        Err(err) => error_response(err),
    }
}

/// Fire-and-forget dispatch; at most one attempt, failures only logged.
fn spawn_suggestion_task<S, G, N>(
    service: Arc<Frm32Service<S, G, N>>,
    tenant_id: TenantId,
    id: SubmissionId,
) where
    S: SubmissionStore + 'static,
    G: SuggestionGenerator + 'static,
    N: NotificationSender + 'static,
{
    tokio::spawn(async move {
        if let Err(err) = service.generate_and_store_suggestions(&tenant_id, &id).await {
            error!(submission = %id.0, %err, "background suggestion task failed");
        }
    });
}

fn error_response(err: ScoringError) -> Response {
    let status = match &err {
        ScoringError::SubmissionNotFound(_)
        | ScoringError::Catalog(CatalogError::UnknownMetric(_))
        | ScoringError::Store(StoreError::NotFound) => StatusCode::NOT_FOUND,
        ScoringError::InvalidScoreValue { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        ScoringError::Forbidden => StatusCode::FORBIDDEN,
        ScoringError::SubmissionNotSubmitted { .. } | ScoringError::AlreadySubmitted(_) => {
            StatusCode::CONFLICT
        }
        ScoringError::Store(StoreError::Conflict)
        | ScoringError::Store(StoreError::RevisionConflict { .. }) => StatusCode::CONFLICT,
        ScoringError::Catalog(_) | ScoringError::Store(StoreError::Unavailable(_)) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    let payload = json!({ "error": err.to_string() });
    (status, axum::Json(payload)).into_response()
}

fn json_error(status: StatusCode, message: &str) -> Response {
    (status, axum::Json(json!({ "error": message }))).into_response()
}

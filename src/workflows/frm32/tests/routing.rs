use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use super::common::*;

fn authed(builder: axum::http::request::Builder, role: &str) -> axum::http::request::Builder {
    builder
        .header("x-user-id", "user-1")
        .header("x-tenant-id", "tenant-1")
        .header("x-role", role)
}

fn json_body(value: &Value) -> Body {
    Body::from(serde_json::to_vec(value).expect("serializable payload"))
}

async fn create_submitted(router: &axum::Router) -> String {
    let response = router
        .clone()
        .oneshot(
            authed(Request::post("/api/v1/frm32/submissions"), "reviewer")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    serde_json::to_vec(&new_submission()).expect("payload"),
                ))
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = read_json_body(response).await;
    let id = body["id"].as_str().expect("submission id").to_string();

    let response = router
        .clone()
        .oneshot(
            authed(
                Request::post(format!("/api/v1/frm32/submissions/{id}/submit")),
                "contractor",
            )
            .body(Body::empty())
            .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    id
}

#[tokio::test]
async fn requests_without_identity_headers_are_unauthorized() {
    let (service, _, _, _) = build_service();
    let router = router_with_service(service);

    let response = router
        .oneshot(
            Request::get("/api/v1/frm32/metrics")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unknown_role_header_is_unauthorized() {
    let (service, _, _, _) = build_service();
    let router = router_with_service(service);

    let response = router
        .oneshot(
            Request::get("/api/v1/frm32/metrics")
                .header("x-user-id", "user-1")
                .header("x-tenant-id", "tenant-1")
                .header("x-role", "superuser")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn metrics_route_lists_the_catalog() {
    let (service, _, _, _) = build_service();
    let router = router_with_service(service);

    let response = router
        .oneshot(
            authed(Request::get("/api/v1/frm32/metrics"), "contractor")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = read_json_body(response).await;
    let metrics = body.as_array().expect("array of metrics");
    assert_eq!(metrics.len(), 2);
    assert_eq!(metrics[0]["code"], "K2.1");
    assert_eq!(metrics[0]["weight_percentage"], 60.0);
}

#[tokio::test]
async fn scores_route_round_trips_the_review() {
    let (service, _, _, _) = build_service();
    let router = router_with_service(service);
    let id = create_submitted(&router).await;

    let payload = json!({
        "scores": [
            { "metric_code": "K2.1", "score": 10 },
            { "metric_code": "K2.2", "score": 0 }
        ]
    });
    let response = router
        .clone()
        .oneshot(
            authed(
                Request::put(format!("/api/v1/frm32/submissions/{id}/scores")),
                "reviewer",
            )
            .header(header::CONTENT_TYPE, "application/json")
            .body(json_body(&payload))
            .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = read_json_body(response).await;
    assert_eq!(body["final_score"], 60.0);
    assert_eq!(body["risk_classification"], "high");
    assert_eq!(body["status"], "submitted");

    let response = router
        .oneshot(
            authed(
                Request::get(format!("/api/v1/frm32/submissions/{id}/scores")),
                "contractor",
            )
            .body(Body::empty())
            .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["metrics"].as_array().expect("metrics").len(), 2);
    assert_eq!(body["metrics"][0]["score"], 10);
}

#[tokio::test]
async fn contractors_cannot_put_scores() {
    let (service, _, _, _) = build_service();
    let router = router_with_service(service);
    let id = create_submitted(&router).await;

    let payload = json!({ "scores": [{ "metric_code": "K2.1", "score": 10 }] });
    let response = router
        .oneshot(
            authed(
                Request::put(format!("/api/v1/frm32/submissions/{id}/scores")),
                "contractor",
            )
            .header(header::CONTENT_TYPE, "application/json")
            .body(json_body(&payload))
            .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn disallowed_score_values_are_unprocessable() {
    let (service, _, _, _) = build_service();
    let router = router_with_service(service);
    let id = create_submitted(&router).await;

    let payload = json!({ "scores": [{ "metric_code": "K2.1", "score": 7 }] });
    let response = router
        .oneshot(
            authed(
                Request::put(format!("/api/v1/frm32/submissions/{id}/scores")),
                "reviewer",
            )
            .header(header::CONTENT_TYPE, "application/json")
            .body(json_body(&payload))
            .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body = read_json_body(response).await;
    assert!(body["error"].as_str().expect("message").contains("K2.1"));
}

#[tokio::test]
async fn unknown_submission_is_not_found() {
    let (service, _, _, _) = build_service();
    let router = router_with_service(service);

    let response = router
        .oneshot(
            authed(
                Request::get("/api/v1/frm32/submissions/frm32-nope"),
                "reviewer",
            )
            .body(Body::empty())
            .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn apply_scores_route_finalizes_the_review() {
    let (service, _, _, _) = build_service();
    let router = router_with_service(service);
    let id = create_submitted(&router).await;

    let payload = json!({
        "scores": [
            { "metric_code": "K2.1", "score": 10 },
            { "metric_code": "K2.2", "score": 10 }
        ]
    });
    let response = router
        .oneshot(
            authed(
                Request::post(format!("/api/v1/frm32/submissions/{id}/apply-scores")),
                "service",
            )
            .header(header::CONTENT_TYPE, "application/json")
            .body(json_body(&payload))
            .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = read_json_body(response).await;
    assert_eq!(body["status"], "reviewed");
    assert_eq!(body["final_score"], 100.0);
    assert_eq!(body["risk_classification"], "low");
}

#[tokio::test]
async fn submitting_a_reviewed_submission_conflicts() {
    let (service, _, _, _) = build_service();
    let router = router_with_service(service);
    let id = create_submitted(&router).await;

    let response = router
        .oneshot(
            authed(
                Request::post(format!("/api/v1/frm32/submissions/{id}/submit")),
                "contractor",
            )
            .body(Body::empty())
            .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn regenerate_route_is_reviewer_only() {
    let (service, _, _, _) = build_service();
    let router = router_with_service(service);
    let id = create_submitted(&router).await;

    let forbidden = router
        .clone()
        .oneshot(
            authed(
                Request::post(format!(
                    "/api/v1/frm32/submissions/{id}/ai-suggestions/regenerate"
                )),
                "contractor",
            )
            .body(Body::empty())
            .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

    let accepted = router
        .oneshot(
            authed(
                Request::post(format!(
                    "/api/v1/frm32/submissions/{id}/ai-suggestions/regenerate"
                )),
                "reviewer",
            )
            .body(Body::empty())
            .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(accepted.status(), StatusCode::ACCEPTED);
}

#[tokio::test]
async fn listing_route_accepts_status_filters() {
    let (service, _, _, _) = build_service();
    let router = router_with_service(service);
    let id = create_submitted(&router).await;

    let response = router
        .oneshot(
            authed(
                Request::get("/api/v1/frm32/submissions?status=submitted&limit=10"),
                "reviewer",
            )
            .body(Body::empty())
            .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = read_json_body(response).await;
    let listed = body.as_array().expect("array of submissions");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["id"], id.as_str());
}

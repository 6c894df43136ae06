use super::common::*;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, Request, StatusCode};
use serde_json::json;
use std::sync::Arc;
use tower::ServiceExt;

use crate::workflows::application::OracleError;
use crate::workflows::cases::repository::RepositoryError;
use crate::workflows::cases::router::{case_handler, case_router, status_for, ACTOR_ID_HEADER};
use crate::workflows::cases::service::CaseServiceError;
use crate::workflows::cases::uploads::UploadRejection;

#[tokio::test]
async fn create_route_returns_created_case() {
    let fixture = fixture();
    let router = case_router(Arc::clone(&fixture.service));

    let response = router
        .oneshot(request(
            "POST",
            "/api/v1/cases",
            &claimant(),
            Some(json!({ "benefit_id": "housing", "note": "first visit" })),
        ))
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::CREATED);
    let payload = read_json_body(response).await;
    assert_eq!(payload["status"], "draft");
    assert_eq!(payload["owner"], "user-1");
    assert_eq!(payload["benefit_id"], "housing");
}

#[tokio::test]
async fn missing_identity_is_unauthorized() {
    let fixture = fixture();
    let router = case_router(Arc::clone(&fixture.service));

    let response = router
        .oneshot(
            Request::get("/api/v1/cases")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unknown_role_is_rejected() {
    let fixture = fixture();
    let router = case_router(Arc::clone(&fixture.service));

    let response = router
        .oneshot(
            Request::get("/api/v1/cases")
                .header(ACTOR_ID_HEADER, "user-1")
                .header("x-actor-role", "superuser")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn case_handler_hides_foreign_cases() {
    let fixture = fixture();
    let case = open_case(&fixture);

    let response = case_handler(
        State(Arc::clone(&fixture.service)),
        stranger(),
        Path(case.id.0.clone()),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = case_handler(
        State(Arc::clone(&fixture.service)),
        claimant(),
        Path("case-missing".to_string()),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let payload = read_json_body(response).await;
    assert_eq!(payload["error"], "case not found");
}

#[tokio::test]
async fn document_route_updates_status_and_progress() {
    let fixture = fixture();
    let case = open_case(&fixture);
    let documents = fixture
        .service
        .documents(&claimant(), &case.id)
        .expect("documents listed");
    let router = case_router(Arc::clone(&fixture.service));

    let response = router
        .clone()
        .oneshot(request(
            "PATCH",
            &format!("/api/v1/cases/{}/documents/{}", case.id, documents[0].id),
            &admin(),
            Some(json!({ "status": "approved" })),
        ))
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["status"], "approved");
    assert_eq!(payload["comment"], "");

    let response = router
        .oneshot(request(
            "GET",
            &format!("/api/v1/cases/{}/progress", case.id),
            &claimant(),
            None,
        ))
        .await
        .expect("router responds");
    let payload = read_json_body(response).await;
    assert_eq!(payload["total"], 2);
    assert_eq!(payload["approved"], 1);
    assert_eq!(payload["percent"], 50);
    assert_eq!(payload["is_ready_to_submit"], false);
}

#[tokio::test]
async fn invalid_document_status_is_bad_request() {
    let fixture = fixture();
    let case = open_case(&fixture);
    let documents = fixture
        .service
        .documents(&claimant(), &case.id)
        .expect("documents listed");
    let router = case_router(Arc::clone(&fixture.service));

    let response = router
        .oneshot(request(
            "PATCH",
            &format!("/api/v1/cases/{}/documents/{}", case.id, documents[0].id),
            &claimant(),
            Some(json!({ "status": "done" })),
        ))
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let payload = read_json_body(response).await;
    assert_eq!(payload["error"], "invalid status: done");
}

#[tokio::test]
async fn upload_route_streams_into_the_store() {
    let fixture = fixture();
    let case = open_case(&fixture);
    let documents = fixture
        .service
        .documents(&claimant(), &case.id)
        .expect("documents listed");
    let router = case_router(Arc::clone(&fixture.service));

    let response = router
        .oneshot(
            Request::put(format!(
                "/api/v1/cases/{}/documents/{}/file?file_name=passport.pdf",
                case.id, documents[0].id
            ))
            .header(ACTOR_ID_HEADER, "user-1")
            .header(header::CONTENT_TYPE, "application/pdf")
            .body(Body::from(PDF_BYTES))
            .expect("request"),
        )
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["status"], "uploaded");
    assert_eq!(payload["file_name"], "passport.pdf");
    assert_eq!(fixture.store.keys().len(), 1);
}

#[tokio::test]
async fn mutating_routes_keep_storage_and_commits_off_the_async_thread() {
    let fixture = fixture();
    let case = open_case(&fixture);
    let documents = fixture
        .service
        .documents(&claimant(), &case.id)
        .expect("documents listed");
    let router = case_router(Arc::clone(&fixture.service));
    let commits_before = fixture.repository.commit_threads().len();

    let upload = Request::put(format!(
        "/api/v1/cases/{}/documents/{}/file?file_name=passport.pdf",
        case.id, documents[0].id
    ))
    .header(ACTOR_ID_HEADER, "user-1")
    .header(header::CONTENT_TYPE, "application/pdf")
    .body(Body::from(PDF_BYTES))
    .expect("request");
    let review = request(
        "PATCH",
        &format!("/api/v1/cases/{}/documents/{}", case.id, documents[1].id),
        &admin(),
        Some(json!({ "status": "rejected" })),
    );
    let edit = request(
        "PATCH",
        &format!("/api/v1/cases/{}", case.id),
        &claimant(),
        Some(json!({ "note": "second visit" })),
    );
    let status = request(
        "PATCH",
        &format!("/api/v1/admin/cases/{}", case.id),
        &admin(),
        Some(json!({ "status": "approved" })),
    );

    for request in [upload, review, edit, status] {
        let response = router
            .clone()
            .oneshot(request)
            .await
            .expect("router responds");
        assert_eq!(response.status(), StatusCode::OK);
    }

    // The test runtime is single threaded, so handlers are polled on this thread.
    let here = std::thread::current().id();
    let commits = fixture.repository.commit_threads();
    assert_eq!(commits.len() - commits_before, 4);
    assert!(commits[commits_before..].iter().all(|thread| *thread != here));
    let storage = fixture.store.io_threads();
    assert!(!storage.is_empty());
    assert!(storage.iter().all(|thread| *thread != here));
}

#[tokio::test]
async fn upload_route_maps_rejections() {
    let fixture = fixture();
    let case = open_case(&fixture);
    let documents = fixture
        .service
        .documents(&claimant(), &case.id)
        .expect("documents listed");
    let uri = format!(
        "/api/v1/cases/{}/documents/{}/file?file_name=scan.png",
        case.id, documents[0].id
    );
    let router = case_router(Arc::clone(&fixture.service));

    let response = router
        .clone()
        .oneshot(
            Request::put(uri.as_str())
                .header(ACTOR_ID_HEADER, "user-1")
                .header(header::CONTENT_TYPE, "application/pdf")
                .body(Body::from(PNG_BYTES))
                .expect("request"),
        )
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

    let response = router
        .clone()
        .oneshot(
            Request::put(uri.as_str())
                .header(ACTOR_ID_HEADER, "user-1")
                .header(header::CONTENT_TYPE, "image/png")
                .body(Body::from(PDF_BYTES))
                .expect("request"),
        )
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let mut oversized = PNG_BYTES.to_vec();
    oversized.resize(PNG_BYTES.len() + UPLOAD_LIMIT as usize, 0);
    let response = router
        .oneshot(
            Request::put(uri.as_str())
                .header(ACTOR_ID_HEADER, "user-1")
                .header(header::CONTENT_TYPE, "image/png")
                .body(Body::from(oversized))
                .expect("request"),
        )
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

    assert!(fixture.store.keys().is_empty());
}

#[tokio::test]
async fn case_pdf_route_returns_attachment() {
    let fixture = fixture();
    let case = open_case(&fixture);
    let router = case_router(Arc::clone(&fixture.service));

    let response = router
        .oneshot(request(
            "POST",
            &format!("/api/v1/cases/{}/application/pdf", case.id),
            &claimant(),
            None,
        ))
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/pdf"
    );
    let disposition = response.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .expect("ascii header")
        .to_string();
    assert!(disposition.starts_with(&format!(
        "attachment; filename=\"application_case_{}_",
        case.id
    )));

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    assert!(bytes.starts_with(b"%PDF-"));
}

#[tokio::test]
async fn unconfigured_oracle_is_service_unavailable() {
    let fixture = fixture_with_oracle(ScriptedOracle::failing(OracleError::NotConfigured));
    let router = case_router(Arc::clone(&fixture.service));

    let response = router
        .oneshot(request(
            "POST",
            "/api/v1/benefits/ask",
            &claimant(),
            Some(json!({ "question": "What can I get?" })),
        ))
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn ask_route_returns_answer() {
    let fixture = fixture();
    let case = open_case(&fixture);
    fixture.oracle.queue(Ok("Bring your passport.".to_string()));
    let router = case_router(Arc::clone(&fixture.service));

    let response = router
        .oneshot(request(
            "POST",
            &format!("/api/v1/cases/{}/ask", case.id),
            &claimant(),
            Some(json!({ "question": "What next?" })),
        ))
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["answer"], "Bring your passport.");
}

#[tokio::test]
async fn admin_routes_require_admin_role() {
    let fixture = fixture();
    let case = open_case(&fixture);
    let router = case_router(Arc::clone(&fixture.service));
    let uri = format!("/api/v1/admin/cases/{}", case.id);

    let response = router
        .clone()
        .oneshot(request(
            "PATCH",
            &uri,
            &claimant(),
            Some(json!({ "status": "approved" })),
        ))
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = router
        .clone()
        .oneshot(request(
            "PATCH",
            &uri,
            &admin(),
            Some(json!({ "status": "approved", "comment": "Granted" })),
        ))
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["status"], "approved");

    let response = router
        .oneshot(request(
            "GET",
            &format!("/api/v1/cases/{}/history", case.id),
            &claimant(),
            None,
        ))
        .await
        .expect("router responds");
    let payload = read_json_body(response).await;
    assert_eq!(payload[0]["comment"], "[ADMIN] Granted");
    assert_eq!(payload[0]["origin"], "administrative");
}

#[test]
fn error_statuses_follow_the_taxonomy() {
    let cases = [
        (CaseServiceError::DocumentNotFound, StatusCode::NOT_FOUND),
        (CaseServiceError::AdminOnly, StatusCode::FORBIDDEN),
        (
            CaseServiceError::EmptyInput("question"),
            StatusCode::UNPROCESSABLE_ENTITY,
        ),
        (
            CaseServiceError::Upload(UploadRejection::TooLarge { limit: 1 }),
            StatusCode::PAYLOAD_TOO_LARGE,
        ),
        (
            CaseServiceError::Upload(UploadRejection::Empty),
            StatusCode::UNPROCESSABLE_ENTITY,
        ),
        (
            CaseServiceError::Oracle(OracleError::Status(502)),
            StatusCode::INTERNAL_SERVER_ERROR,
        ),
        (
            CaseServiceError::Repository(RepositoryError::Conflict),
            StatusCode::CONFLICT,
        ),
    ];

    for (error, expected) in cases {
        assert_eq!(status_for(&error), expected, "{error}");
    }
}

use std::sync::Arc;

use axum::{
    async_trait,
    body::{Body, Bytes},
    extract::{FromRequestParts, Path, Query, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post, put},
    Json, Router,
};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;

use crate::workflows::application::{OracleError, TextOracle};

use super::checklist::DocumentUpdate;
use super::domain::{Actor, CaseId, DocumentId, DocumentView, Role, UserId};
use super::repository::{CaseRepository, RepositoryError};
use super::service::{
    AdminStatusChange, ApplicationRequest, CaseEdit, CaseService, CaseServiceError, GeneratedPdf,
    NewCase,
};
use super::uploads::{DocumentStore, UploadRejection, UploadSession};

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

type SharedService<R, S, O> = Arc<CaseService<R, S, O>>;

/// Router builder exposing the case, application and admin endpoints.
pub fn case_router<R, S, O>(service: SharedService<R, S, O>) -> Router
where
    R: CaseRepository + 'static,
    S: DocumentStore + 'static,
    O: TextOracle + 'static,
{
    Router::new()
        .route(
            "/api/v1/cases",
            post(create_handler::<R, S, O>).get(list_handler::<R, S, O>),
        )
        .route(
            "/api/v1/cases/:case_id",
            get(case_handler::<R, S, O>).patch(edit_handler::<R, S, O>),
        )
        .route(
            "/api/v1/cases/:case_id/documents",
            get(documents_handler::<R, S, O>),
        )
        .route(
            "/api/v1/cases/:case_id/documents/:document_id",
            patch(document_handler::<R, S, O>),
        )
        .route(
            "/api/v1/cases/:case_id/documents/:document_id/file",
            put(upload_handler::<R, S, O>),
        )
        .route(
            "/api/v1/cases/:case_id/progress",
            get(progress_handler::<R, S, O>),
        )
        .route(
            "/api/v1/cases/:case_id/history",
            get(history_handler::<R, S, O>),
        )
        .route(
            "/api/v1/cases/:case_id/artifacts",
            get(artifacts_handler::<R, S, O>),
        )
        .route(
            "/api/v1/cases/:case_id/ask",
            post(case_question_handler::<R, S, O>),
        )
        .route(
            "/api/v1/cases/:case_id/application/text",
            post(case_text_handler::<R, S, O>),
        )
        .route(
            "/api/v1/cases/:case_id/application/pdf",
            post(case_pdf_handler::<R, S, O>),
        )
        .route(
            "/api/v1/applications/text",
            post(application_text_handler::<R, S, O>),
        )
        .route(
            "/api/v1/applications/pdf",
            post(application_pdf_handler::<R, S, O>),
        )
        .route("/api/v1/benefits", get(benefits_handler::<R, S, O>))
        .route(
            "/api/v1/benefits/ask",
            post(catalog_question_handler::<R, S, O>),
        )
        .route("/api/v1/admin/cases", get(admin_list_handler::<R, S, O>))
        .route(
            "/api/v1/admin/cases/:case_id",
            patch(admin_status_handler::<R, S, O>),
        )
        .with_state(service)
}

/// Identity asserted by the upstream gateway.
#[async_trait]
impl<St> FromRequestParts<St> for Actor
where
    St: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &St) -> Result<Self, Self::Rejection> {
        let id = header_text(&parts.headers, ACTOR_ID_HEADER)
            .ok_or_else(|| error_body(StatusCode::UNAUTHORIZED, "missing actor identity"))?;

        let role = match header_text(&parts.headers, ACTOR_ROLE_HEADER) {
            None | Some("claimant") => Role::Claimant,
            Some("admin") => Role::Admin,
            Some(other) => {
                return Err(error_body(
                    StatusCode::BAD_REQUEST,
                    format!("unknown actor role '{other}'"),
                ))
            }
        };

        Ok(Actor {
            id: UserId(id.to_string()),
            role,
        })
    }
}

fn header_text<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

#[derive(Debug, Deserialize)]
pub(crate) struct QuestionBody {
    question: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UploadParams {
    file_name: String,
}

pub(crate) async fn create_handler<R, S, O>(
    State(service): State<SharedService<R, S, O>>,
    actor: Actor,
    Json(request): Json<NewCase>,
) -> Response
where
    R: CaseRepository + 'static,
    S: DocumentStore + 'static,
    O: TextOracle + 'static,
{
    match blocking(move || service.create_case(&actor, request)).await {
        Ok(case) => (StatusCode::CREATED, Json(case)).into_response(),
        Err(error) => error,
    }
}

pub(crate) async fn list_handler<R, S, O>(
    State(service): State<SharedService<R, S, O>>,
    actor: Actor,
) -> Response
where
    R: CaseRepository + 'static,
    S: DocumentStore + 'static,
    O: TextOracle + 'static,
{
    match service.list_cases(&actor) {
        Ok(cases) => Json(cases).into_response(),
        Err(error) => service_error(error),
    }
}

pub(crate) async fn case_handler<R, S, O>(
    State(service): State<SharedService<R, S, O>>,
    actor: Actor,
    Path(case_id): Path<String>,
) -> Response
where
    R: CaseRepository + 'static,
    S: DocumentStore + 'static,
    O: TextOracle + 'static,
{
    match service.case(&actor, &CaseId(case_id)) {
        Ok(case) => Json(case).into_response(),
        Err(error) => service_error(error),
    }
}

pub(crate) async fn edit_handler<R, S, O>(
    State(service): State<SharedService<R, S, O>>,
    actor: Actor,
    Path(case_id): Path<String>,
    Json(edit): Json<CaseEdit>,
) -> Response
where
    R: CaseRepository + 'static,
    S: DocumentStore + 'static,
    O: TextOracle + 'static,
{
    match blocking(move || service.update_case(&actor, &CaseId(case_id), edit)).await {
        Ok(case) => Json(case).into_response(),
        Err(error) => error,
    }
}

pub(crate) async fn documents_handler<R, S, O>(
    State(service): State<SharedService<R, S, O>>,
    actor: Actor,
    Path(case_id): Path<String>,
) -> Response
where
    R: CaseRepository + 'static,
    S: DocumentStore + 'static,
    O: TextOracle + 'static,
{
    match service.documents(&actor, &CaseId(case_id)) {
        Ok(documents) => {
            let views: Vec<DocumentView> = documents.iter().map(|document| document.view()).collect();
            Json(views).into_response()
        }
        Err(error) => service_error(error),
    }
}

pub(crate) async fn document_handler<R, S, O>(
    State(service): State<SharedService<R, S, O>>,
    actor: Actor,
    Path((case_id, document_id)): Path<(String, String)>,
    Json(update): Json<DocumentUpdate>,
) -> Response
where
    R: CaseRepository + 'static,
    S: DocumentStore + 'static,
    O: TextOracle + 'static,
{
    let updated = blocking(move || {
        service.update_document(&actor, &CaseId(case_id), &DocumentId(document_id), update)
    })
    .await;
    match updated {
        Ok(document) => Json(document.view()).into_response(),
        Err(error) => error,
    }
}

/// Streams the request body into the store. The declared `content-type` header and the
/// `file_name` query parameter are both checked against the allow-list. Every storage call
/// runs on the blocking pool.
pub(crate) async fn upload_handler<R, S, O>(
    State(service): State<SharedService<R, S, O>>,
    actor: Actor,
    Path((case_id, document_id)): Path<(String, String)>,
    Query(params): Query<UploadParams>,
    headers: HeaderMap,
    body: Body,
) -> Response
where
    R: CaseRepository + 'static,
    S: DocumentStore + 'static,
    O: TextOracle + 'static,
{
    let case_id = CaseId(case_id);
    let document_id = DocumentId(document_id);
    let content_type = header_text(&headers, header::CONTENT_TYPE.as_str())
        .unwrap_or_default()
        .to_string();

    let opened = {
        let service = Arc::clone(&service);
        let actor = actor.clone();
        let case_id = case_id.clone();
        let document_id = document_id.clone();
        blocking(move || {
            service.begin_upload(
                &actor,
                &case_id,
                &document_id,
                &params.file_name,
                &content_type,
            )
        })
        .await
    };
    let mut session = match opened {
        Ok(session) => session,
        Err(error) => return error,
    };

    let mut stream = body.into_data_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(error) => {
                tracing::warn!(case_id = %case_id, %error, "upload stream interrupted");
                tokio::task::spawn_blocking(move || drop(session));
                return error_body(StatusCode::BAD_REQUEST, "upload stream interrupted");
            }
        };
        session = match push_chunk(session, chunk).await {
            Ok(session) => session,
            Err(error) => return error,
        };
    }

    let completed =
        blocking(move || service.complete_upload(&actor, &case_id, &document_id, session)).await;
    match completed {
        Ok(document) => Json(document.view()).into_response(),
        Err(error) => error,
    }
}

/// Writes one chunk on the blocking pool and hands the session back.
async fn push_chunk<S>(
    mut session: UploadSession<S>,
    chunk: Bytes,
) -> Result<UploadSession<S>, Response>
where
    S: DocumentStore + 'static,
{
    let pushed = tokio::task::spawn_blocking(move || session.push(&chunk).map(|()| session)).await;
    match pushed {
        Ok(Ok(session)) => Ok(session),
        Ok(Err(rejection)) => Err(service_error(rejection.into())),
        Err(error) => Err(join_failure(error)),
    }
}

pub(crate) async fn progress_handler<R, S, O>(
    State(service): State<SharedService<R, S, O>>,
    actor: Actor,
    Path(case_id): Path<String>,
) -> Response
where
    R: CaseRepository + 'static,
    S: DocumentStore + 'static,
    O: TextOracle + 'static,
{
    match service.progress(&actor, &CaseId(case_id)) {
        Ok(progress) => Json(progress).into_response(),
        Err(error) => service_error(error),
    }
}

pub(crate) async fn history_handler<R, S, O>(
    State(service): State<SharedService<R, S, O>>,
    actor: Actor,
    Path(case_id): Path<String>,
) -> Response
where
    R: CaseRepository + 'static,
    S: DocumentStore + 'static,
    O: TextOracle + 'static,
{
    match service.history(&actor, &CaseId(case_id)) {
        Ok(history) => Json(history).into_response(),
        Err(error) => service_error(error),
    }
}

pub(crate) async fn artifacts_handler<R, S, O>(
    State(service): State<SharedService<R, S, O>>,
    actor: Actor,
    Path(case_id): Path<String>,
) -> Response
where
    R: CaseRepository + 'static,
    S: DocumentStore + 'static,
    O: TextOracle + 'static,
{
    match service.artifacts(&actor, &CaseId(case_id)) {
        Ok(artifacts) => Json(artifacts).into_response(),
        Err(error) => service_error(error),
    }
}

pub(crate) async fn case_question_handler<R, S, O>(
    State(service): State<SharedService<R, S, O>>,
    actor: Actor,
    Path(case_id): Path<String>,
    Json(body): Json<QuestionBody>,
) -> Response
where
    R: CaseRepository + 'static,
    S: DocumentStore + 'static,
    O: TextOracle + 'static,
{
    let case_id = CaseId(case_id);
    let answer = blocking(move || service.ask_about_case(&actor, &case_id, &body.question)).await;
    match answer {
        Ok(answer) => Json(json!({ "answer": answer })).into_response(),
        Err(error) => error,
    }
}

pub(crate) async fn case_text_handler<R, S, O>(
    State(service): State<SharedService<R, S, O>>,
    actor: Actor,
    Path(case_id): Path<String>,
) -> Response
where
    R: CaseRepository + 'static,
    S: DocumentStore + 'static,
    O: TextOracle + 'static,
{
    let case_id = CaseId(case_id);
    match blocking(move || service.case_application_text(&actor, &case_id)).await {
        Ok(artifact) => (StatusCode::CREATED, Json(artifact)).into_response(),
        Err(error) => error,
    }
}

pub(crate) async fn case_pdf_handler<R, S, O>(
    State(service): State<SharedService<R, S, O>>,
    actor: Actor,
    Path(case_id): Path<String>,
) -> Response
where
    R: CaseRepository + 'static,
    S: DocumentStore + 'static,
    O: TextOracle + 'static,
{
    let case_id = CaseId(case_id);
    match blocking(move || service.case_application_pdf(&actor, &case_id)).await {
        Ok(pdf) => pdf_response(pdf),
        Err(error) => error,
    }
}

pub(crate) async fn application_text_handler<R, S, O>(
    State(service): State<SharedService<R, S, O>>,
    actor: Actor,
    Json(request): Json<ApplicationRequest>,
) -> Response
where
    R: CaseRepository + 'static,
    S: DocumentStore + 'static,
    O: TextOracle + 'static,
{
    match blocking(move || service.draft_application(&actor, &request)).await {
        Ok(drafted) => Json(drafted).into_response(),
        Err(error) => error,
    }
}

pub(crate) async fn application_pdf_handler<R, S, O>(
    State(service): State<SharedService<R, S, O>>,
    actor: Actor,
    Json(request): Json<ApplicationRequest>,
) -> Response
where
    R: CaseRepository + 'static,
    S: DocumentStore + 'static,
    O: TextOracle + 'static,
{
    match blocking(move || service.draft_application_pdf(&actor, &request)).await {
        Ok(pdf) => pdf_response(pdf),
        Err(error) => error,
    }
}

pub(crate) async fn benefits_handler<R, S, O>(
    State(service): State<SharedService<R, S, O>>,
) -> Response
where
    R: CaseRepository + 'static,
    S: DocumentStore + 'static,
    O: TextOracle + 'static,
{
    match service.benefits() {
        Ok(benefits) => Json(benefits).into_response(),
        Err(error) => service_error(error),
    }
}

pub(crate) async fn catalog_question_handler<R, S, O>(
    State(service): State<SharedService<R, S, O>>,
    actor: Actor,
    Json(body): Json<QuestionBody>,
) -> Response
where
    R: CaseRepository + 'static,
    S: DocumentStore + 'static,
    O: TextOracle + 'static,
{
    match blocking(move || service.ask_catalog(&actor, &body.question)).await {
        Ok(answer) => Json(json!({ "answer": answer })).into_response(),
        Err(error) => error,
    }
}

pub(crate) async fn admin_list_handler<R, S, O>(
    State(service): State<SharedService<R, S, O>>,
    actor: Actor,
) -> Response
where
    R: CaseRepository + 'static,
    S: DocumentStore + 'static,
    O: TextOracle + 'static,
{
    match service.admin_cases(&actor) {
        Ok(cases) => Json(cases).into_response(),
        Err(error) => service_error(error),
    }
}

pub(crate) async fn admin_status_handler<R, S, O>(
    State(service): State<SharedService<R, S, O>>,
    actor: Actor,
    Path(case_id): Path<String>,
    Json(change): Json<AdminStatusChange>,
) -> Response
where
    R: CaseRepository + 'static,
    S: DocumentStore + 'static,
    O: TextOracle + 'static,
{
    match blocking(move || service.admin_set_status(&actor, &CaseId(case_id), change)).await {
        Ok(case) => Json(case).into_response(),
        Err(error) => error,
    }
}

/// Runs service calls that take a case lock, touch storage, call the oracle or render on
/// the blocking pool.
async fn blocking<T, F>(work: F) -> Result<T, Response>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, CaseServiceError> + Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(result) => result.map_err(service_error),
        Err(error) => Err(join_failure(error)),
    }
}

fn join_failure(error: tokio::task::JoinError) -> Response {
    tracing::error!(%error, "blocking task failed");
    error_body(StatusCode::INTERNAL_SERVER_ERROR, "internal task failure")
}

fn pdf_response(pdf: GeneratedPdf) -> Response {
    let disposition = format!("attachment; filename=\"{}\"", pdf.file_name);
    let mut response = (
        [(header::CONTENT_TYPE, HeaderValue::from_static("application/pdf"))],
        pdf.document.bytes,
    )
        .into_response();
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        response
            .headers_mut()
            .insert(header::CONTENT_DISPOSITION, value);
    }
    response
}

pub(crate) fn status_for(error: &CaseServiceError) -> StatusCode {
    match error {
        CaseServiceError::CaseNotFound
        | CaseServiceError::DocumentNotFound
        | CaseServiceError::BenefitNotFound
        | CaseServiceError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
        CaseServiceError::Forbidden | CaseServiceError::AdminOnly => StatusCode::FORBIDDEN,
        CaseServiceError::InvalidStatus(_) => StatusCode::BAD_REQUEST,
        CaseServiceError::EmptyInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
        CaseServiceError::Upload(rejection) => match rejection {
            UploadRejection::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            UploadRejection::UnsupportedExtension { .. }
            | UploadRejection::UnsupportedContentType { .. }
            | UploadRejection::MismatchedType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            UploadRejection::SignatureMismatch { .. } | UploadRejection::Empty => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            UploadRejection::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        },
        CaseServiceError::Oracle(OracleError::NotConfigured) => StatusCode::SERVICE_UNAVAILABLE,
        CaseServiceError::Repository(RepositoryError::Conflict) => StatusCode::CONFLICT,
        CaseServiceError::Oracle(_) | CaseServiceError::Repository(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn service_error(error: CaseServiceError) -> Response {
    let status = status_for(&error);
    if status.is_server_error() {
        tracing::error!(%error, "case request failed");
    }
    error_body(status, error.to_string())
}

fn error_body(status: StatusCode, message: impl Into<String>) -> Response {
    let payload = json!({
        "error": message.into(),
    });
    (status, Json(payload)).into_response()
}

use axum::{
    Router,
    extract::{Path, State},
    http::{HeaderValue, Request, StatusCode},
    middleware::{Next, from_fn},
    response::Json,
    routing::{get, post, put},
};
use endorsement_form::{
    FormCatalog, FormError, FormSession, FormState, InMemorySessionStorage, Policy, RecordSink,
    RequiredField, SessionStorage, SinkError, StorageError, SubmissionReceipt, SubmissionRunner,
    SubmitError,
};
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Instrument, error, info, warn};
use uuid::Uuid;

use crate::models::{
    AnswerRequest, CatalogResponse, CreateFormResponse, EndorsementsRequest, FieldsRequest,
    FormResponse, PoliciesRequest, PolicyCatalog,
};

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<Value>)>;
type ApiError = (StatusCode, Json<Value>);

fn api_error(status: StatusCode, kind: &str, message: &str, details: &str) -> ApiError {
    (
        status,
        Json(json!({
            "error": message,
            "kind": kind,
            "details": details
        })),
    )
}

fn not_found_error(session_id: &str) -> ApiError {
    api_error(
        StatusCode::NOT_FOUND,
        "session_not_found",
        "Session not found",
        session_id,
    )
}

fn already_submitted_error(session_id: &str) -> ApiError {
    api_error(
        StatusCode::CONFLICT,
        "already_submitted",
        "Form has already been submitted",
        session_id,
    )
}

fn storage_error(e: &StorageError) -> ApiError {
    api_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "storage",
        "Failed to access session storage",
        &e.to_string(),
    )
}

fn form_error(e: &FormError) -> ApiError {
    api_error(
        StatusCode::UNPROCESSABLE_ENTITY,
        e.kind(),
        "Invalid form edit",
        &e.to_string(),
    )
}

fn submit_error(e: &SubmitError) -> ApiError {
    match e {
        SubmitError::Validation(v) => api_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            v.kind(),
            "Form is not ready to submit",
            &v.to_string(),
        ),
        SubmitError::Sink(sink) => {
            let status = match sink {
                SinkError::AuthenticationFailed(_) => StatusCode::UNAUTHORIZED,
                SinkError::ConnectionFailed(_) | SinkError::WriteFailed(_) => {
                    StatusCode::BAD_GATEWAY
                }
            };
            api_error(status, sink.kind(), "An error occurred", &sink.to_string())
        }
        SubmitError::Edit(e) => form_error(e),
        SubmitError::SessionNotFound(id) => not_found_error(id),
        SubmitError::AlreadySubmitted(id) => already_submitted_error(id),
        SubmitError::InProgress(id) => api_error(
            StatusCode::CONFLICT,
            "submission_in_progress",
            "Form is being submitted",
            id,
        ),
        SubmitError::Storage(s) => storage_error(s),
    }
}

#[derive(Clone)]
pub struct AppState {
    pub session_storage: Arc<dyn SessionStorage>,
    pub runner: SubmissionRunner,
    pub catalog: Arc<FormCatalog>,
}

impl AppState {
    pub fn new(catalog: Arc<FormCatalog>, sink: Arc<dyn RecordSink>) -> Self {
        let session_storage: Arc<dyn SessionStorage> = Arc::new(InMemorySessionStorage::new());
        let runner = SubmissionRunner::new(session_storage.clone(), sink);
        Self {
            session_storage,
            runner,
            catalog,
        }
    }
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/catalog", get(get_catalog))
        .route("/forms", post(create_form))
        .route("/forms/{session_id}", get(get_form))
        .route("/forms/{session_id}/fields", put(update_fields))
        .route("/forms/{session_id}/policies", put(update_policies))
        .route("/forms/{session_id}/endorsements", put(update_endorsements))
        .route("/forms/{session_id}/answers", put(update_answers))
        .route("/forms/{session_id}/submit", post(submit_form))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(from_fn(correlation_id_middleware))
        .with_state(app_state)
}

/// Tags every request with an `x-correlation-id` header and a matching span.
async fn correlation_id_middleware(
    mut request: Request<axum::body::Body>,
    next: Next,
) -> axum::response::Response {
    let correlation_id = Uuid::new_v4().to_string();
    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        request.headers_mut().insert("x-correlation-id", value);
    }

    let span = tracing::info_span!("http_request", correlation_id = %correlation_id);
    next.run(request).instrument(span).await
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": "Policy Endorsement Form",
        "version": "1.0.0",
        "description": "Collects endorsement review answers and appends them to the configured sink",
        "endpoints": {
            "GET /catalog": "Policies, endorsements and explanation options",
            "POST /forms": "Start a new form",
            "GET /forms/{session_id}": "Current form state and record preview",
            "PUT /forms/{session_id}/fields": "Set account, company, project and ICS link",
            "PUT /forms/{session_id}/policies": "Select policies",
            "PUT /forms/{session_id}/endorsements": "Select endorsements for one policy",
            "PUT /forms/{session_id}/answers": "Answer the questions for one endorsement",
            "POST /forms/{session_id}/submit": "Validate and persist the form",
            "GET /health": "Health check"
        }
    }))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn get_catalog(State(state): State<AppState>) -> Json<CatalogResponse> {
    let catalog = &state.catalog;
    Json(CatalogResponse {
        policies: Policy::ALL
            .into_iter()
            .map(|policy| PolicyCatalog {
                policy,
                endorsements: catalog.endorsements.endorsements_for(policy),
            })
            .collect(),
        explanation_options: catalog.explanation_options.clone(),
        explanation_required: catalog.explanation_required,
        endorsement_selection_mode: catalog.endorsement_selection_mode,
    })
}

async fn create_form(State(state): State<AppState>) -> ApiResult<CreateFormResponse> {
    let session = FormSession::new(state.catalog.clone());
    let session_id = session.id.clone();
    save_session(&state, session).await?;

    info!(session_id = %session_id, "Created form session");
    Ok(Json(CreateFormResponse { session_id }))
}

async fn get_form(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<FormResponse> {
    let session = load_session(&state, &session_id).await?;
    Ok(Json(form_response(&session)))
}

async fn update_fields(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<FieldsRequest>,
) -> ApiResult<FormResponse> {
    edit_form(&state, &session_id, move |form| {
        for (field, value) in [
            (RequiredField::AccountName, request.account_name),
            (RequiredField::CompanyName, request.company_name),
            (RequiredField::ProjectName, request.project_name),
            (RequiredField::IcsLink, request.ics_link),
        ] {
            if let Some(value) = value {
                form.set_field(field, value);
            }
        }
        Ok(())
    })
    .await
}

async fn update_policies(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<PoliciesRequest>,
) -> ApiResult<FormResponse> {
    edit_form(&state, &session_id, move |form| {
        form.select_policies(request.policies);
        Ok(())
    })
    .await
}

async fn update_endorsements(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<EndorsementsRequest>,
) -> ApiResult<FormResponse> {
    edit_form(&state, &session_id, move |form| {
        form.select_endorsements(request.policy, request.endorsements)
    })
    .await
}

async fn update_answers(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<AnswerRequest>,
) -> ApiResult<FormResponse> {
    edit_form(&state, &session_id, move |form| {
        for slot in request.clear {
            form.clear_answer(request.policy, &request.endorsement, slot)?;
        }
        form.answer(request.policy, &request.endorsement, request.update)
    })
    .await
}

async fn submit_form(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<SubmissionReceipt> {
    info!(session_id = %session_id, "Submitting form");

    state.runner.submit(&session_id).await.map(Json).map_err(|e| {
        match &e {
            SubmitError::Sink(_) | SubmitError::Storage(_) => {
                error!(session_id = %session_id, error = %e, "Submission failed")
            }
            _ => warn!(session_id = %session_id, error = %e, "Submission rejected"),
        }
        submit_error(&e)
    })
}

async fn edit_form<F>(state: &AppState, session_id: &str, edit: F) -> ApiResult<FormResponse>
where
    F: FnOnce(&mut FormState) -> Result<(), FormError>,
{
    let session = state.runner.edit(session_id, edit).await.map_err(|e| {
        match &e {
            SubmitError::Storage(_) => {
                error!(session_id = %session_id, error = %e, "Failed to edit form")
            }
            _ => warn!(session_id = %session_id, error = %e, "Rejected form edit"),
        }
        submit_error(&e)
    })?;
    Ok(Json(form_response(&session)))
}

fn form_response(session: &FormSession) -> FormResponse {
    FormResponse {
        session_id: session.id.clone(),
        submitted: session.submitted,
        status_message: session.status_message.clone(),
        form: session.state.view(),
        preview: session.state.expand(),
    }
}

async fn load_session(state: &AppState, session_id: &str) -> Result<FormSession, ApiError> {
    match state.session_storage.get(session_id).await {
        Ok(Some(session)) => Ok(session),
        Ok(None) => Err(not_found_error(session_id)),
        Err(e) => {
            error!("Failed to load session {}: {}", session_id, e);
            Err(storage_error(&e))
        }
    }
}

async fn save_session(state: &AppState, session: FormSession) -> Result<(), ApiError> {
    state.session_storage.save(session).await.map_err(|e| {
        error!("Failed to save session: {}", e);
        storage_error(&e)
    })
}

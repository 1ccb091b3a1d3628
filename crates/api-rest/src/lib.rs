//! # API REST
//!
//! REST API for the clinic vitals data layer.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI/Swagger documentation
//! - REST-specific concerns (JSON serialization, CORS, mapping core errors to status codes)
//!
//! All openEHR work is delegated to [`VitalsService`].

#![warn(rust_2018_idioms)]

use axum::{
    extract::{Path as AxumPath, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use clinic_core::history::{sort_chronologically, sort_newest_first};
use clinic_core::{VitalsError, VitalsRecord, VitalsService};
use clinic_types::{CompositionUid, EhrId, IdError, TemplateId};
use openehr::OpenEhrError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::cors::CorsLayer;
use utoipa::{IntoParams, OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

/// Application state shared by every handler.
#[derive(Clone)]
struct AppState {
    service: VitalsService,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SavedRes {
    /// Uid of the stored version, `{id}::{system}::{version}`.
    pub uid: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TemplateRes {
    pub template_id: String,
    pub name: String,
    #[schema(value_type = Object)]
    pub web_template: Value,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRes {
    pub error: String,
    /// Logged next to the failure so operators can find it.
    pub error_id: String,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query, rename_all = "camelCase")]
pub struct ListParams {
    /// Template to read; the configured vitals template when absent.
    pub template_id: Option<String>,
    /// `desc` (default, newest first) or `asc`.
    pub order: Option<String>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TemplateParams {
    /// Case-insensitive filter on the template name or id.
    pub q: Option<String>,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        create_ehr,
        get_ehr,
        list_vitals,
        create_vitals,
        vitals_chart,
        get_vitals,
        update_vitals,
        delete_vitals,
        get_vitals_flat,
        list_templates,
        get_template,
    ),
    components(schemas(HealthRes, SavedRes, TemplateRes, ErrorRes))
)]
pub struct ApiDoc;

/// A core error on its way out as an HTTP response.
#[derive(Debug)]
pub struct ApiError(VitalsError);

impl From<VitalsError> for ApiError {
    fn from(err: VitalsError) -> Self {
        Self(err)
    }
}

impl From<IdError> for ApiError {
    fn from(err: IdError) -> Self {
        Self(VitalsError::InvalidId(err))
    }
}

/// HTTP status for a core error.
///
/// Repository 404, 409 and 412 pass through, so a client can tell a missing recording or a
/// stale version from an outage. Any other repository failure is a bad gateway.
pub fn status_for(err: &VitalsError) -> StatusCode {
    match err {
        VitalsError::InvalidInput(_)
        | VitalsError::InvalidId(_)
        | VitalsError::OpenEhr(OpenEhrError::InvalidInput(_)) => StatusCode::BAD_REQUEST,
        VitalsError::Transport { status: 404, .. } => StatusCode::NOT_FOUND,
        VitalsError::Transport { status: 409, .. } => StatusCode::CONFLICT,
        VitalsError::Transport { status: 412, .. } => StatusCode::PRECONDITION_FAILED,
        VitalsError::Transport { .. }
        | VitalsError::Network { .. }
        | VitalsError::MalformedResponse { .. } => StatusCode::BAD_GATEWAY,
        VitalsError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        let error_id = uuid::Uuid::new_v4().to_string();
        if status.is_server_error() {
            tracing::error!(%error_id, error = ?self.0, "request failed");
        } else {
            tracing::warn!(%error_id, error = %self.0, "request rejected");
        }
        let body = ErrorRes {
            error: self.0.to_string(),
            error_id,
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Build the REST router around `service`.
///
/// Swagger UI is served at `/swagger-ui` and the OpenAPI document at `/api-docs/openapi.json`.
pub fn router(service: VitalsService) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ehr", post(create_ehr))
        .route("/ehr/:ehr_id", get(get_ehr))
        .route("/ehr/:ehr_id/vitals", get(list_vitals).post(create_vitals))
        .route("/ehr/:ehr_id/vitals/chart", get(vitals_chart))
        .route(
            "/ehr/:ehr_id/vitals/:uid",
            get(get_vitals).put(update_vitals).delete(delete_vitals),
        )
        .route("/ehr/:ehr_id/vitals/:uid/flat", get(get_vitals_flat))
        .route("/templates", get(list_templates))
        .route("/templates/:template_id", get(get_template))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .with_state(AppState { service })
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for monitoring and load balancers.
///
/// Does not contact the repository.
async fn health() -> Json<HealthRes> {
    Json(HealthRes {
        ok: true,
        message: "Clinic REST API is alive".into(),
    })
}

#[utoipa::path(
    post,
    path = "/ehr",
    responses(
        (status = 201, description = "EHR created", body = Object),
        (status = 502, description = "Repository failure", body = ErrorRes)
    )
)]
/// Register a new EHR for a patient.
#[axum::debug_handler]
async fn create_ehr(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let summary = state.service.create_ehr().await?;
    Ok((StatusCode::CREATED, Json(summary)))
}

#[utoipa::path(
    get,
    path = "/ehr/{ehr_id}",
    params(("ehr_id" = String, Path, description = "EHR id")),
    responses(
        (status = 200, description = "EHR summary", body = Object),
        (status = 404, description = "Unknown EHR", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn get_ehr(
    State(state): State<AppState>,
    AxumPath(ehr_id): AxumPath<String>,
) -> ApiResult<impl IntoResponse> {
    let ehr_id = EhrId::new(ehr_id)?;
    Ok(Json(state.service.get_ehr(&ehr_id).await?))
}

#[utoipa::path(
    get,
    path = "/ehr/{ehr_id}/vitals",
    params(("ehr_id" = String, Path, description = "EHR id"), ListParams),
    responses(
        (status = 200, description = "Vitals history", body = [Object]),
        (status = 400, description = "Bad request", body = ErrorRes),
        (status = 502, description = "Repository failure", body = ErrorRes)
    )
)]
/// Vitals history of one patient.
///
/// # Arguments
/// * `ehr_id` - EHR of the patient
/// * `templateId` - optional template, the configured vitals template otherwise
/// * `order` - `desc` (newest first, the default) or `asc`
///
/// # Errors
/// Returns `400 Bad Request` for an invalid id or order, and the mapped status of any
/// repository failure.
#[axum::debug_handler]
async fn list_vitals(
    State(state): State<AppState>,
    AxumPath(ehr_id): AxumPath<String>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Vec<VitalsRecord>>> {
    let ehr_id = EhrId::new(ehr_id)?;
    let mut records = match params.template_id {
        Some(template_id) => {
            let template_id = TemplateId::new(template_id)?;
            state.service.list_for_template(&ehr_id, &template_id).await?
        }
        None => state.service.list(&ehr_id).await?,
    };
    match params.order.as_deref().unwrap_or("desc") {
        "desc" => sort_newest_first(&mut records),
        "asc" => sort_chronologically(&mut records),
        other => {
            return Err(VitalsError::InvalidInput(format!(
                "order must be asc or desc, got {other:?}"
            ))
            .into())
        }
    }
    Ok(Json(records))
}

#[utoipa::path(
    post,
    path = "/ehr/{ehr_id}/vitals",
    params(("ehr_id" = String, Path, description = "EHR id")),
    request_body(content = Object, description = "Vitals record without a uid"),
    responses(
        (status = 201, description = "Recording saved", body = SavedRes),
        (status = 400, description = "Bad request", body = ErrorRes),
        (status = 502, description = "Repository failure", body = ErrorRes)
    )
)]
/// Save a new vitals recording.
#[axum::debug_handler]
async fn create_vitals(
    State(state): State<AppState>,
    AxumPath(ehr_id): AxumPath<String>,
    Json(record): Json<VitalsRecord>,
) -> ApiResult<impl IntoResponse> {
    let ehr_id = EhrId::new(ehr_id)?;
    let uid = state.service.create(&ehr_id, &record).await?;
    Ok((
        StatusCode::CREATED,
        Json(SavedRes {
            uid: uid.to_string(),
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/ehr/{ehr_id}/vitals/chart",
    params(("ehr_id" = String, Path, description = "EHR id")),
    responses(
        (status = 200, description = "Dashboard series, oldest first", body = [Object]),
        (status = 502, description = "Repository failure", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn vitals_chart(
    State(state): State<AppState>,
    AxumPath(ehr_id): AxumPath<String>,
) -> ApiResult<impl IntoResponse> {
    let ehr_id = EhrId::new(ehr_id)?;
    Ok(Json(state.service.chart(&ehr_id).await?))
}

#[utoipa::path(
    get,
    path = "/ehr/{ehr_id}/vitals/{uid}",
    params(
        ("ehr_id" = String, Path, description = "EHR id"),
        ("uid" = String, Path, description = "Composition uid")
    ),
    responses(
        (status = 200, description = "One recording", body = Object),
        (status = 404, description = "Unknown recording", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn get_vitals(
    State(state): State<AppState>,
    AxumPath((ehr_id, uid)): AxumPath<(String, String)>,
) -> ApiResult<Json<VitalsRecord>> {
    let ehr_id = EhrId::new(ehr_id)?;
    let uid = CompositionUid::new(uid)?;
    Ok(Json(state.service.get_record(&ehr_id, &uid).await?))
}

#[utoipa::path(
    put,
    path = "/ehr/{ehr_id}/vitals/{uid}",
    params(
        ("ehr_id" = String, Path, description = "EHR id"),
        ("uid" = String, Path, description = "Uid of the version being replaced")
    ),
    request_body(content = Object, description = "Replacement vitals record"),
    responses(
        (status = 200, description = "Recording updated", body = SavedRes),
        (status = 400, description = "Bad request", body = ErrorRes),
        (status = 404, description = "Unknown recording", body = ErrorRes),
        (status = 409, description = "Conflicting change in the repository", body = ErrorRes),
        (status = 412, description = "Uid is not the latest version", body = ErrorRes)
    )
)]
/// Replace a stored recording. The body's `uid`, if any, must match the path.
#[axum::debug_handler]
async fn update_vitals(
    State(state): State<AppState>,
    AxumPath((ehr_id, uid)): AxumPath<(String, String)>,
    Json(record): Json<VitalsRecord>,
) -> ApiResult<Json<SavedRes>> {
    let ehr_id = EhrId::new(ehr_id)?;
    let uid = CompositionUid::new(uid)?;
    if let Some(body_uid) = &record.uid {
        if body_uid != &uid {
            return Err(VitalsError::InvalidInput(format!(
                "body uid {body_uid} does not match path uid {uid}"
            ))
            .into());
        }
    }
    let new_uid = state.service.update(&ehr_id, &uid, &record).await?;
    Ok(Json(SavedRes {
        uid: new_uid.to_string(),
    }))
}

#[utoipa::path(
    delete,
    path = "/ehr/{ehr_id}/vitals/{uid}",
    params(
        ("ehr_id" = String, Path, description = "EHR id"),
        ("uid" = String, Path, description = "Composition uid")
    ),
    responses(
        (status = 204, description = "Recording deleted"),
        (status = 404, description = "Unknown or already deleted recording", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn delete_vitals(
    State(state): State<AppState>,
    AxumPath((ehr_id, uid)): AxumPath<(String, String)>,
) -> ApiResult<StatusCode> {
    let ehr_id = EhrId::new(ehr_id)?;
    let uid = CompositionUid::new(uid)?;
    state.service.delete(&ehr_id, &uid).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/ehr/{ehr_id}/vitals/{uid}/flat",
    params(
        ("ehr_id" = String, Path, description = "EHR id"),
        ("uid" = String, Path, description = "Composition uid")
    ),
    responses(
        (status = 200, description = "Flat composition", body = Object),
        (status = 404, description = "Unknown recording", body = ErrorRes)
    )
)]
/// The stored composition in flat format, as the edit form loads it.
#[axum::debug_handler]
async fn get_vitals_flat(
    State(state): State<AppState>,
    AxumPath((ehr_id, uid)): AxumPath<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    let ehr_id = EhrId::new(ehr_id)?;
    let uid = CompositionUid::new(uid)?;
    Ok(Json(state.service.get_flat(&ehr_id, &uid).await?))
}

#[utoipa::path(
    get,
    path = "/templates",
    params(TemplateParams),
    responses(
        (status = 200, description = "Local and repository templates, default first", body = [Object])
    )
)]
/// Template listing. A repository failure still returns the local templates.
#[axum::debug_handler]
async fn list_templates(
    State(state): State<AppState>,
    Query(params): Query<TemplateParams>,
) -> impl IntoResponse {
    let term = params.q.unwrap_or_default();
    let templates: Vec<_> = state
        .service
        .list_templates()
        .await
        .into_iter()
        .filter(|t| t.matches(&term))
        .collect();
    Json(templates)
}

#[utoipa::path(
    get,
    path = "/templates/{template_id}",
    params(("template_id" = String, Path, description = "Template id")),
    responses(
        (status = 200, description = "Web template and display name", body = TemplateRes),
        (status = 404, description = "Unknown template", body = ErrorRes)
    )
)]
#[axum::debug_handler]
async fn get_template(
    State(state): State<AppState>,
    AxumPath(template_id): AxumPath<String>,
) -> ApiResult<Json<TemplateRes>> {
    let template_id = TemplateId::new(template_id)?;
    let web_template = state.service.web_template(&template_id).await?;
    let name = clinic_core::templates::friendly_name(template_id.as_str(), &web_template);
    Ok(Json(TemplateRes {
        template_id: template_id.to_string(),
        name,
        web_template,
    }))
}

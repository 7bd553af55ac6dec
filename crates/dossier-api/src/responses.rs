//! Handlers for `/applications/{app}/responses` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/applications/{app}/responses` | Optional `?context=` (default `candidate_web`) |
//! | `GET`  | `/applications/{app}/responses/{key}` | 404 if nothing was saved yet |
//! | `PUT`  | `/applications/{app}/responses/{key}` | Body: [`SaveBody`]; 422 on validation errors |
//! | `POST` | `/applications/{app}/responses/{key}/form` | Body: flat form map |
//! | `POST` | `/applications/{app}/responses/{key}/documents` | Raw body; `?filename=`, `Content-Type` header |
//! | `GET`  | `/applications/{app}/missing` | Mandatory attributes without data |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::{HeaderMap, StatusCode, header},
  response::IntoResponse,
};
use bytes::Bytes;
use dossier_core::{
  attribute::AttributeDefinition,
  document::Upload,
  form::FormFields,
  response::AttributeResponse,
  service::DossierService,
  store::ResponseStore,
  visibility::{ResponseView, ViewerContext},
};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct ViewParams {
  #[serde(default)]
  pub context: ViewerContext,
}

// ─── Read ────────────────────────────────────────────────────────────────────

/// `GET /applications/{app}/responses[?context=<context>]`
pub async fn list<S>(
  State(service): State<DossierService<S>>,
  Path(app): Path<Uuid>,
  Query(params): Query<ViewParams>,
) -> Result<Json<Vec<ResponseView>>, ApiError>
where
  S: ResponseStore + 'static,
{
  Ok(Json(service.view(app, params.context).await?))
}

/// `GET /applications/{app}/responses/{key}[?context=<context>]`
pub async fn get_one<S>(
  State(service): State<DossierService<S>>,
  Path((app, key)): Path<(Uuid, String)>,
  Query(params): Query<ViewParams>,
) -> Result<Json<ResponseView>, ApiError>
where
  S: ResponseStore + 'static,
{
  let view = service
    .view_one(app, &key, params.context)
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("no response to {key} for application {app}")))?;
  Ok(Json(view))
}

/// `GET /applications/{app}/missing`
pub async fn missing<S>(
  State(service): State<DossierService<S>>,
  Path(app): Path<Uuid>,
) -> Result<Json<Vec<AttributeDefinition>>, ApiError>
where
  S: ResponseStore + 'static,
{
  Ok(Json(service.missing(app).await?))
}

// ─── Write ───────────────────────────────────────────────────────────────────

/// JSON body accepted by `PUT /applications/{app}/responses/{key}`.
#[derive(Debug, Deserialize)]
pub struct SaveBody {
  pub value:     Value,
  /// General documents uploaded with the value, as
  /// `{"filename", "content_type", "data"}` with base64 `data`.
  #[serde(default)]
  pub documents: Vec<Upload>,
}

/// `PUT /applications/{app}/responses/{key}`
pub async fn save<S>(
  State(service): State<DossierService<S>>,
  Path((app, key)): Path<(Uuid, String)>,
  Json(body): Json<SaveBody>,
) -> Result<Json<AttributeResponse>, ApiError>
where
  S: ResponseStore + 'static,
{
  Ok(Json(service.save_value(app, &key, body.value, body.documents).await?))
}

/// `POST /applications/{app}/responses/{key}/form`
pub async fn submit_form<S>(
  State(service): State<DossierService<S>>,
  Path((app, key)): Path<(Uuid, String)>,
  Json(fields): Json<FormFields>,
) -> Result<Json<AttributeResponse>, ApiError>
where
  S: ResponseStore + 'static,
{
  tracing::debug!(application = %app, attribute = %key, keys = fields.len(), "form received");
  Ok(Json(service.submit_form(app, &key, fields).await?))
}

#[derive(Debug, Deserialize)]
pub struct UploadParams {
  pub filename: String,
}

/// `POST /applications/{app}/responses/{key}/documents?filename=<name>`;
/// the body is the raw file.
pub async fn upload<S>(
  State(service): State<DossierService<S>>,
  Path((app, key)): Path<(Uuid, String)>,
  Query(params): Query<UploadParams>,
  headers: HeaderMap,
  body: Bytes,
) -> Result<impl IntoResponse, ApiError>
where
  S: ResponseStore + 'static,
{
  let content_type = headers
    .get(header::CONTENT_TYPE)
    .and_then(|v| v.to_str().ok())
    .ok_or_else(|| ApiError::BadRequest("missing Content-Type header".to_owned()))?;
  let upload = Upload::new(params.filename, content_type, body.to_vec());
  let document = service.attach_document(app, &key, upload).await?;
  Ok((StatusCode::CREATED, Json(document)))
}

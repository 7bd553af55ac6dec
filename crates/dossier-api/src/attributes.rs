//! Handlers for `/attributes` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/attributes` | Optional `?include_deleted=true` |
//! | `POST`   | `/attributes` | Body: [`NewDefinition`]; 409 if the key is taken |
//! | `GET`    | `/attributes/{key}` | 404 if not found |
//! | `DELETE` | `/attributes/{key}` | Soft delete; 409 if already deleted |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use dossier_core::{
  attribute::{AttributeDefinition, NewDefinition},
  service::DossierService,
  store::ResponseStore,
};
use serde::Deserialize;

use crate::error::ApiError;

// ─── List ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  #[serde(default)]
  pub include_deleted: bool,
}

/// `GET /attributes[?include_deleted=true]`
pub async fn list<S>(
  State(service): State<DossierService<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<AttributeDefinition>>, ApiError>
where
  S: ResponseStore + 'static,
{
  Ok(Json(service.definitions(params.include_deleted).await?))
}

// ─── Create ──────────────────────────────────────────────────────────────────

/// `POST /attributes`
pub async fn create<S>(
  State(service): State<DossierService<S>>,
  Json(body): Json<NewDefinition>,
) -> Result<impl IntoResponse, ApiError>
where
  S: ResponseStore + 'static,
{
  let definition = service.create_definition(body).await?;
  Ok((StatusCode::CREATED, Json(definition)))
}

// ─── Get one ─────────────────────────────────────────────────────────────────

/// `GET /attributes/{key}`
pub async fn get_one<S>(
  State(service): State<DossierService<S>>,
  Path(key): Path<String>,
) -> Result<Json<AttributeDefinition>, ApiError>
where
  S: ResponseStore + 'static,
{
  Ok(Json(service.definition(&key).await?))
}

// ─── Delete ──────────────────────────────────────────────────────────────────

/// `DELETE /attributes/{key}`; returns the definition with its new status.
pub async fn delete_one<S>(
  State(service): State<DossierService<S>>,
  Path(key): Path<String>,
) -> Result<Json<AttributeDefinition>, ApiError>
where
  S: ResponseStore + 'static,
{
  Ok(Json(service.delete_definition(&key).await?))
}

//! Handler for `GET /documents/{id}`: streams a document's bytes back with
//! its stored content type.

use axum::{
  extract::{Path, State},
  http::header,
  response::IntoResponse,
};
use dossier_core::{service::DossierService, store::ResponseStore};
use uuid::Uuid;

use crate::error::ApiError;

/// `GET /documents/{id}`
pub async fn download<S>(
  State(service): State<DossierService<S>>,
  Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError>
where
  S: ResponseStore + 'static,
{
  let (document, bytes) = service
    .document_content(id)
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("document {id} not found")))?;
  let disposition = format!("attachment; filename=\"{}\"", document.filename.replace('"', ""));
  Ok((
    [(header::CONTENT_TYPE, document.content_type), (header::CONTENT_DISPOSITION, disposition)],
    bytes,
  ))
}

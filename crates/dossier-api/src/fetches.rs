//! Handlers for the external-fetch protocol.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/applications/{app}/fetches` | Map of source name to status record |
//! | `POST` | `/applications/{app}/fetches/{source}` | Body: [`FetchOutcome`] |

use std::collections::BTreeMap;

use axum::{
  Json,
  extract::{Path, State},
};
use dossier_core::{
  provenance::{FetchOutcome, FetchRecord},
  service::DossierService,
  store::ResponseStore,
};
use uuid::Uuid;

use crate::error::ApiError;

/// `GET /applications/{app}/fetches`
pub async fn list<S>(
  State(service): State<DossierService<S>>,
  Path(app): Path<Uuid>,
) -> Result<Json<BTreeMap<String, FetchRecord>>, ApiError>
where
  S: ResponseStore + 'static,
{
  let records = service.fetch_statuses(app).await?;
  Ok(Json(records.into_iter().map(|r| (r.source.clone(), r)).collect()))
}

/// `POST /applications/{app}/fetches/{source}`, e.g.
/// `{"status":"completed","fields":{"siret":"..."}}`.
pub async fn record<S>(
  State(service): State<DossierService<S>>,
  Path((app, source)): Path<(Uuid, String)>,
  Json(outcome): Json<FetchOutcome>,
) -> Result<Json<FetchRecord>, ApiError>
where
  S: ResponseStore + 'static,
{
  Ok(Json(service.record_fetch(app, &source, outcome).await?))
}

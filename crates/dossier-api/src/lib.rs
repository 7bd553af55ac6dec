//! JSON REST API for Dossier.
//!
//! Exposes an axum [`Router`] backed by a [`DossierService`] over any
//! [`dossier_core::store::ResponseStore`]. Auth, TLS, and transport concerns
//! are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", dossier_api::api_router(service.clone()))
//! ```

pub mod attributes;
pub mod documents;
pub mod error;
pub mod fetches;
pub mod responses;

use axum::{
  Router,
  routing::{get, post},
};
use dossier_core::{service::DossierService, store::ResponseStore};

pub use error::ApiError;

/// Build a fully-materialised API router for `service`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(service: DossierService<S>) -> Router<()>
where
  S: ResponseStore + 'static,
{
  Router::new()
    // Attribute definitions
    .route("/attributes", get(attributes::list::<S>).post(attributes::create::<S>))
    .route(
      "/attributes/{key}",
      get(attributes::get_one::<S>).delete(attributes::delete_one::<S>),
    )
    // Responses
    .route("/applications/{app}/responses", get(responses::list::<S>))
    .route(
      "/applications/{app}/responses/{key}",
      get(responses::get_one::<S>).put(responses::save::<S>),
    )
    .route("/applications/{app}/responses/{key}/form", post(responses::submit_form::<S>))
    .route("/applications/{app}/responses/{key}/documents", post(responses::upload::<S>))
    .route("/applications/{app}/missing", get(responses::missing::<S>))
    // Documents
    .route("/documents/{id}", get(documents::download::<S>))
    // External fetch
    .route("/applications/{app}/fetches", get(fetches::list::<S>))
    .route("/applications/{app}/fetches/{source}", post(fetches::record::<S>))
    .with_state(service)
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use axum::{
    body::Body,
    http::{Request, StatusCode, header},
  };
  use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
  use dossier_core::document::DocumentPolicy;
  use dossier_store_sqlite::SqliteStore;
  use serde_json::{Value, json};
  use tower::ServiceExt as _;
  use uuid::Uuid;

  use super::*;

  async fn make_service() -> DossierService<SqliteStore> {
    let store = SqliteStore::open_in_memory().await.unwrap();
    DossierService::new(Arc::new(store), DocumentPolicy::default())
  }

  async fn send(
    service: &DossierService<SqliteStore>,
    method:  &str,
    uri:     &str,
    body:    Option<Value>,
  ) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
      Some(v) => {
        builder = builder.header(header::CONTENT_TYPE, "application/json");
        Body::from(v.to_string())
      }
      None => Body::empty(),
    };
    let resp = api_router(service.clone()).oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, json)
  }

  async fn define(service: &DossierService<SqliteStore>, body: Value) {
    let (status, _) = send(service, "POST", "/attributes", Some(body)).await;
    assert_eq!(status, StatusCode::CREATED);
  }

  // ── Attributes ─────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn create_list_and_delete_attributes() {
    let svc = make_service().await;
    define(&svc, json!({ "key": "ca", "kind": "annual_turnover", "category_key": "capacites" }))
      .await;

    let (status, _) = send(
      &svc,
      "POST",
      "/attributes",
      Some(json!({ "key": "ca", "kind": "text_input", "category_key": "x" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = send(&svc, "GET", "/attributes/ca", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["kind"], "annual_turnover");

    let (status, body) = send(&svc, "DELETE", "/attributes/ca", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"]["status"], "deleted");

    let (_, body) = send(&svc, "GET", "/attributes", None).await;
    assert_eq!(body, json!([]));
    let (_, body) = send(&svc, "GET", "/attributes?include_deleted=true", None).await;
    assert_eq!(body.as_array().map(Vec::len), Some(1));
  }

  #[tokio::test]
  async fn unknown_attribute_returns_404() {
    let svc = make_service().await;
    let (status, body) = send(&svc, "GET", "/attributes/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("nope"));
  }

  // ── Responses ──────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn validation_errors_render_as_422() {
    let svc = make_service().await;
    define(&svc, json!({ "key": "ca", "kind": "annual_turnover", "category_key": "capacites" }))
      .await;
    let app = Uuid::new_v4();
    let uri = format!("/applications/{app}/responses/ca");

    let (status, _) = send(&svc, "PUT", &uri, Some(json!({ "value": {} }))).await;
    assert_eq!(status, StatusCode::OK);

    let slot = json!({ "turnover": 120000, "market_percentage": 150, "fiscal_year_end": "2023-02-30" });
    let value = json!({ "year_1": slot, "year_2": slot });
    let (status, body) = send(&svc, "PUT", &uri, Some(json!({ "value": value }))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let messages: Vec<&str> =
      body["errors"]["value"].as_array().unwrap().iter().filter_map(Value::as_str).collect();
    assert!(messages.contains(&"year_1.market_percentage must be between 0 and 100"));
    assert!(messages.contains(&"year_1.fiscal_year_end is not a valid date"));
    assert!(messages.contains(&"year_3 is required"));
  }

  #[tokio::test]
  async fn radio_justification_travels_with_the_value() {
    let svc = make_service().await;
    define(
      &svc,
      json!({
        "key": "sous_traitance",
        "kind": "radio_with_justification_required",
        "category_key": "capacites",
      }),
    )
    .await;
    let app = Uuid::new_v4();
    let uri = format!("/applications/{app}/responses/sous_traitance");
    let justification = json!({
      "filename": "justif.pdf",
      "content_type": "application/pdf",
      "data": B64.encode(b"%PDF-1.7"),
    });

    let (status, body) = send(
      &svc,
      "PUT",
      &uri,
      Some(json!({ "value": { "radio_choice": "no" }, "documents": [justification] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["documents"].as_array().map(Vec::len), Some(1));

    let (status, body) =
      send(&svc, "PUT", &uri, Some(json!({ "value": { "radio_choice": "yes" } }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["documents"], json!([]));

    let (status, body) =
      send(&svc, "PUT", &uri, Some(json!({ "value": { "radio_choice": "no" } }))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
      body["errors"]["documents"][0],
      "a justification document is required when radio_choice is no"
    );
  }

  #[tokio::test]
  async fn raw_upload_and_download() {
    let svc = make_service().await;
    define(&svc, json!({ "key": "kbis", "kind": "file_upload", "category_key": "identite" }))
      .await;
    let app = Uuid::new_v4();

    let req = Request::builder()
      .method("POST")
      .uri(format!("/applications/{app}/responses/kbis/documents?filename=kbis.pdf"))
      .header(header::CONTENT_TYPE, "application/pdf")
      .body(Body::from(&b"%PDF-1.7 kbis"[..]))
      .unwrap();
    let resp = api_router(svc.clone()).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let document: Value = serde_json::from_slice(&bytes).unwrap();

    let id = document["document_id"].as_str().unwrap();
    let req = Request::builder().uri(format!("/documents/{id}")).body(Body::empty()).unwrap();
    let resp = api_router(svc.clone()).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/pdf");
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"%PDF-1.7 kbis");
  }

  #[tokio::test]
  async fn form_posts_items() {
    let svc = make_service().await;
    define(&svc, json!({ "key": "equipe", "kind": "team_presentation", "category_key": "moyens" }))
      .await;
    let app = Uuid::new_v4();

    let (status, body) = send(
      &svc,
      "POST",
      &format!("/applications/{app}/responses/equipe/form"),
      Some(json!({
        "person_1_nom": "Durand",
        "person_1_prenoms": "Alice",
        "person_1_cv": {
          "filename": "cv.pdf",
          "content_type": "application/pdf",
          "data": B64.encode(b"%PDF-1.7 cv"),
        },
        "autre_champ": "ignored",
      })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["value"]["items"]["1"]["nom"], "Durand");
    assert_eq!(body["documents"][0]["scope"]["kind"], "specialized");

    let (status, _) = send(
      &svc,
      "POST",
      &format!("/applications/{app}/responses/equipe/form"),
      Some(json!({ "person_1_age": "40" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
  }

  // ── Fetch protocol and visibility ──────────────────────────────────────────

  #[tokio::test]
  async fn fetched_values_are_hidden_from_candidates() {
    let svc = make_service().await;
    define(
      &svc,
      json!({
        "key": "siret",
        "kind": "siret_input",
        "category_key": "identite",
        "mandatory": true,
        "fallback_on_failure": true,
        "external_source": { "source_name": "insee", "field": "siret" },
      }),
    )
    .await;
    let app = Uuid::new_v4();

    let (status, body) = send(
      &svc,
      "POST",
      &format!("/applications/{app}/fetches/insee"),
      Some(json!({ "status": "completed", "fields": { "siret": "73282932000074" } })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["fields_filled"], 1);

    let (_, body) = send(&svc, "GET", &format!("/applications/{app}/fetches"), None).await;
    assert_eq!(body["insee"]["status"], "completed");

    let (_, body) = send(&svc, "GET", &format!("/applications/{app}/responses"), None).await;
    assert_eq!(body[0]["retrieved_automatically"], true);
    assert_eq!(body[0]["value"], Value::Null);

    let (_, body) =
      send(&svc, "GET", &format!("/applications/{app}/responses/siret?context=buyer"), None)
        .await;
    assert_eq!(body["value"]["siret"], "73282932000074");

    let (_, body) = send(&svc, "GET", &format!("/applications/{app}/missing"), None).await;
    assert_eq!(body, json!([]));
  }
}

//! The `ResponseStore` trait.
//!
//! The trait is implemented by storage backends (e.g. `dossier-store-sqlite`).
//! Higher layers (`dossier-api`, the service in [`crate::service`]) depend on
//! this abstraction, not on any concrete backend.

use std::future::Future;

use uuid::Uuid;

use crate::{
  attribute::{AttributeDefinition, NewDefinition},
  document::{Document, DocumentScope, DocumentSelector, Upload},
  provenance::FetchRecord,
  response::AttributeResponse,
};

/// Abstraction over a Dossier store backend.
///
/// The pair `(application_id, attribute_id)` identifies at most one response;
/// the backend enforces that with a unique key, which is the only guard
/// against duplicate rows when a human edit races a fetch.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait ResponseStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Definitions ───────────────────────────────────────────────────────

  /// Persist a new definition. Fails if the key is already taken, even by a
  /// deleted definition.
  fn create_definition(
    &self,
    input: NewDefinition,
  ) -> impl Future<Output = Result<AttributeDefinition, Self::Error>> + Send + '_;

  /// Look a definition up by key, whatever its status.
  fn get_definition(
    &self,
    key: String,
  ) -> impl Future<Output = Result<Option<AttributeDefinition>, Self::Error>> + Send + '_;

  /// Definitions ordered by `position`; deleted ones only when asked.
  fn list_definitions(
    &self,
    include_deleted: bool,
  ) -> impl Future<Output = Result<Vec<AttributeDefinition>, Self::Error>> + Send + '_;

  /// Mark a definition deleted. Fails if it is missing or already deleted.
  fn soft_delete_definition(
    &self,
    key: String,
  ) -> impl Future<Output = Result<AttributeDefinition, Self::Error>> + Send + '_;

  // ── Responses ─────────────────────────────────────────────────────────

  /// The response for one pair, with its documents.
  fn get_response(
    &self,
    application_id: Uuid,
    attribute_id: Uuid,
  ) -> impl Future<Output = Result<Option<AttributeResponse>, Self::Error>> + Send + '_;

  /// All responses of an application, with their documents.
  fn list_responses(
    &self,
    application_id: Uuid,
  ) -> impl Future<Output = Result<Vec<AttributeResponse>, Self::Error>> + Send + '_;

  /// Insert or update the response for its pair and return the stored row.
  ///
  /// When a row already exists for the pair its `response_id` and
  /// `created_at` win over the caller's. `saved_at` is set by the store.
  fn save_response(
    &self,
    response: AttributeResponse,
  ) -> impl Future<Output = Result<AttributeResponse, Self::Error>> + Send + '_;

  // ── Documents ─────────────────────────────────────────────────────────

  /// Attach a file to a response.
  fn attach_document(
    &self,
    response_id: Uuid,
    upload: Upload,
    scope: DocumentScope,
  ) -> impl Future<Output = Result<Document, Self::Error>> + Send + '_;

  /// Remove the selected documents; returns how many were removed.
  fn detach_documents(
    &self,
    response_id: Uuid,
    selector: DocumentSelector,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  fn count_documents(
    &self,
    response_id: Uuid,
    selector: DocumentSelector,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  /// A document's metadata and bytes.
  fn document_content(
    &self,
    document_id: Uuid,
  ) -> impl Future<Output = Result<Option<(Document, Vec<u8>)>, Self::Error>> + Send + '_;

  // ── Fetch status ──────────────────────────────────────────────────────

  /// Insert or replace the status record for `(application_id, record.source)`.
  fn record_fetch_status(
    &self,
    application_id: Uuid,
    record: FetchRecord,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn list_fetch_statuses(
    &self,
    application_id: Uuid,
  ) -> impl Future<Output = Result<Vec<FetchRecord>, Self::Error>> + Send + '_;
}

//! Error type for `dossier-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] dossier_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("unknown {what}: {value:?}")]
  UnknownEnum { what: &'static str, value: String },

  #[error("attribute definition not found: {0}")]
  DefinitionNotFound(String),

  #[error("attribute definition {0} is already deleted")]
  AlreadyDeleted(String),

  #[error("duplicate attribute key: {0}")]
  DuplicateKey(String),

  /// A document was attached to a response that was never saved.
  #[error("response not found: {0}")]
  ResponseNotFound(uuid::Uuid),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

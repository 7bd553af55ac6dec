//! Error types for `dossier-core`.

use thiserror::Error;
use uuid::Uuid;

use crate::variant::VariantKind;

#[derive(Debug, Error)]
pub enum Error {
  #[error("attribute not found: {0}")]
  AttributeNotFound(String),

  #[error("attribute {0} is deleted")]
  AttributeDeleted(String),

  #[error("attribute definition {0} is already deleted")]
  AlreadyDeleted(Uuid),

  #[error("duplicate attribute key: {0}")]
  DuplicateKey(String),

  #[error("unknown variant kind: {0:?}")]
  UnknownKind(String),

  #[error("{0} has no repeatable items")]
  NotRepeatable(VariantKind),

  #[error("{0} does not accept documents")]
  DocumentsNotAccepted(VariantKind),

  #[error("malformed form key: {0:?}")]
  MalformedFormKey(String),

  #[error("unknown field {field:?} for items prefixed {prefix:?}")]
  UnknownItemField { prefix: String, field: String },

  #[error("field {field:?} for items prefixed {prefix:?} does not accept files")]
  NotADocumentField { prefix: String, field: String },

  #[error("invalid file payload: {0}")]
  InvalidPayload(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

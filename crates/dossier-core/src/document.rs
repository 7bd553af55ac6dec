//! Documents attached to responses.
//!
//! A document belongs to exactly one response and is either *general* (about
//! the whole response) or *specialized* (about one field of one repeatable
//! item). No binary data lives on [`Document`] itself; the bytes travel in an
//! [`Upload`] and the store keeps them keyed by content hash.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{
  Error, Result,
  schema::ItemsSpec,
  validate::{DOCUMENTS, FieldError},
};

// ─── Scope ───────────────────────────────────────────────────────────────────

/// What part of a response a document is attached to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DocumentScope {
  General,
  Specialized { token: String, field: String },
}

/// Selects a subset of a response's documents for counting or purging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentSelector {
  All,
  General,
  Item { token: String },
  ItemField { token: String, field: String },
}

impl DocumentSelector {
  pub fn matches(&self, scope: &DocumentScope) -> bool {
    match (self, scope) {
      (Self::All, _) => true,
      (Self::General, DocumentScope::General) => true,
      (Self::Item { token }, DocumentScope::Specialized { token: t, .. }) => token == t,
      (
        Self::ItemField { token, field },
        DocumentScope::Specialized { token: t, field: f },
      ) => token == t && field == f,
      _ => false,
    }
  }
}

// ─── Document ────────────────────────────────────────────────────────────────

/// Metadata for one attached file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
  pub document_id:  Uuid,
  pub response_id:  Uuid,
  pub filename:     String,
  pub content_type: String,
  pub byte_size:    u64,
  /// SHA-256 hex digest; identical uploads share stored bytes.
  pub content_hash: String,
  pub scope:        DocumentScope,
  pub attached_at:  DateTime<Utc>,
}

// ─── Upload ──────────────────────────────────────────────────────────────────

/// An incoming file, before it is attached.
///
/// In JSON it travels as `{"filename", "content_type", "data"}` with `data`
/// base64-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "UploadPayload")]
pub struct Upload {
  pub filename:     String,
  pub content_type: String,
  pub bytes:        Vec<u8>,
}

#[derive(Deserialize)]
struct UploadPayload {
  filename:     String,
  content_type: String,
  data:         String,
}

impl TryFrom<UploadPayload> for Upload {
  type Error = Error;

  fn try_from(p: UploadPayload) -> Result<Self> {
    let bytes = B64
      .decode(p.data.trim())
      .map_err(|e| Error::InvalidPayload(format!("{}: {e}", p.filename)))?;
    Ok(Self { filename: p.filename, content_type: p.content_type, bytes })
  }
}

impl Upload {
  pub fn new(
    filename: impl Into<String>,
    content_type: impl Into<String>,
    bytes: impl Into<Vec<u8>>,
  ) -> Self {
    Self {
      filename:     filename.into(),
      content_type: content_type.into(),
      bytes:        bytes.into(),
    }
  }

  pub fn content_hash(&self) -> String { hex::encode(Sha256::digest(&self.bytes)) }

  pub fn byte_size(&self) -> u64 { self.bytes.len() as u64 }

  /// The metadata this upload gets once attached to `response_id` under
  /// `scope`.
  pub fn describe(&self, response_id: Uuid, scope: DocumentScope) -> Document {
    Document {
      document_id: Uuid::new_v4(),
      response_id,
      filename: self.filename.clone(),
      content_type: self.content_type.clone(),
      byte_size: self.byte_size(),
      content_hash: self.content_hash(),
      scope,
      attached_at: Utc::now(),
    }
  }
}

// ─── Policy ──────────────────────────────────────────────────────────────────

/// Limits every upload is checked against before it is attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentPolicy {
  pub allowed_content_types: Vec<String>,
  pub max_bytes:             u64,
  pub max_filename_length:   usize,
}

impl Default for DocumentPolicy {
  fn default() -> Self {
    Self {
      allowed_content_types: [
        "application/pdf",
        "application/msword",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "application/vnd.ms-excel",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "application/vnd.oasis.opendocument.text",
        "application/vnd.oasis.opendocument.spreadsheet",
        "application/zip",
        "image/jpeg",
        "image/png",
        "text/plain",
      ]
      .map(str::to_owned)
      .to_vec(),
      max_bytes:             100 * 1024 * 1024,
      max_filename_length:   255,
    }
  }
}

impl DocumentPolicy {
  fn problems(&self, upload: &Upload) -> Vec<String> {
    let name = if upload.filename.trim().is_empty() { "(unnamed)" } else { upload.filename.as_str() };
    let mut out = Vec::new();
    if upload.filename.trim().is_empty() {
      out.push("filename is empty".to_owned());
    }
    if upload.filename.chars().count() > self.max_filename_length {
      out.push(format!("{name}: filename longer than {} characters", self.max_filename_length));
    }
    if upload.bytes.is_empty() {
      out.push(format!("{name}: file is empty"));
    }
    if upload.byte_size() > self.max_bytes {
      out.push(format!("{name}: file exceeds {} bytes", self.max_bytes));
    }
    let content_type = upload.content_type.split(';').next().unwrap_or_default().trim();
    if !self.allowed_content_types.iter().any(|t| t == content_type) {
      out.push(format!("{name}: content type {content_type:?} is not allowed"));
    }
    out
  }

  /// Check a batch of uploads; every failure is folded into one error on the
  /// `documents` field.
  pub fn check<'a>(
    &self,
    uploads: impl IntoIterator<Item = &'a Upload>,
  ) -> Result<(), FieldError> {
    let problems: Vec<String> = uploads.into_iter().flat_map(|u| self.problems(u)).collect();
    if problems.is_empty() {
      Ok(())
    } else {
      Err(FieldError::new(
        DOCUMENTS,
        format!("documents are invalid: {}", problems.join("; ")),
      ))
    }
  }
}

// ─── Attachment planning ─────────────────────────────────────────────────────

/// What must happen in the store to attach one specialized document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentPlan {
  /// Documents to purge first when the slot only holds one file.
  pub purge: Option<DocumentSelector>,
  pub scope: DocumentScope,
}

/// Decide how to attach a file to `field` of item `token`, following the
/// variant's replace-or-accumulate policy.
pub fn plan_specialized(spec: &ItemsSpec, token: &str, field: &str) -> Result<AttachmentPlan> {
  if !spec.is_document_field(field) {
    return Err(Error::NotADocumentField {
      prefix: spec.prefix.to_owned(),
      field:  field.to_owned(),
    });
  }
  let purge = spec.cleanup_old_specialized_documents.then(|| DocumentSelector::ItemField {
    token: token.to_owned(),
    field: field.to_owned(),
  });
  Ok(AttachmentPlan {
    purge,
    scope: DocumentScope::Specialized { token: token.to_owned(), field: field.to_owned() },
  })
}

/// Read accessors over a response's documents.
pub trait DocumentsExt {
  fn general_documents(&self) -> Vec<&Document>;
  fn documents_for_item(&self, token: &str) -> Vec<&Document>;
  fn documents_for(&self, token: &str, field: &str) -> Vec<&Document>;
}

impl DocumentsExt for [Document] {
  fn general_documents(&self) -> Vec<&Document> {
    self.iter().filter(|d| DocumentSelector::General.matches(&d.scope)).collect()
  }

  fn documents_for_item(&self, token: &str) -> Vec<&Document> {
    let sel = DocumentSelector::Item { token: token.to_owned() };
    self.iter().filter(|d| sel.matches(&d.scope)).collect()
  }

  fn documents_for(&self, token: &str, field: &str) -> Vec<&Document> {
    let sel = DocumentSelector::ItemField { token: token.to_owned(), field: field.to_owned() };
    self.iter().filter(|d| sel.matches(&d.scope)).collect()
  }
}

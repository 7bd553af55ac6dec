//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings. Response values and
//! external bindings are stored as compact JSON. UUIDs are stored as
//! hyphenated lowercase strings. Enums are stored as their snake_case names.

use chrono::{DateTime, Utc};
use dossier_core::{
  attribute::{AttributeDefinition, DefinitionStatus, ExternalBinding},
  document::{Document, DocumentScope},
  provenance::{FetchRecord, FetchStatus, Provenance},
  response::AttributeResponse,
  variant::VariantKind,
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Enums ───────────────────────────────────────────────────────────────────

pub fn decode_kind(s: &str) -> Result<VariantKind> { Ok(VariantKind::parse(s)?) }

pub fn decode_provenance(s: &str) -> Result<Provenance> {
  s.parse()
    .map_err(|_| Error::UnknownEnum { what: "provenance", value: s.to_owned() })
}

pub fn decode_fetch_status(s: &str) -> Result<FetchStatus> {
  s.parse()
    .map_err(|_| Error::UnknownEnum { what: "fetch status", value: s.to_owned() })
}

// ─── ExternalBinding ─────────────────────────────────────────────────────────

pub fn encode_binding(b: &ExternalBinding) -> Result<String> { Ok(serde_json::to_string(b)?) }

pub fn decode_binding(s: &str) -> Result<ExternalBinding> { Ok(serde_json::from_str(s)?) }

// ─── DocumentScope ───────────────────────────────────────────────────────────

pub const SCOPE_GENERAL: &str = "general";
pub const SCOPE_SPECIALIZED: &str = "specialized";

/// `(scope, item_token, item_field)` columns.
pub fn encode_scope(scope: &DocumentScope) -> (&'static str, Option<String>, Option<String>) {
  match scope {
    DocumentScope::General => (SCOPE_GENERAL, None, None),
    DocumentScope::Specialized { token, field } => {
      (SCOPE_SPECIALIZED, Some(token.clone()), Some(field.clone()))
    }
  }
}

pub fn decode_scope(
  scope: &str,
  item_token: Option<String>,
  item_field: Option<String>,
) -> Result<DocumentScope> {
  match (scope, item_token, item_field) {
    (SCOPE_GENERAL, _, _) => Ok(DocumentScope::General),
    (SCOPE_SPECIALIZED, Some(token), Some(field)) => {
      Ok(DocumentScope::Specialized { token, field })
    }
    (other, ..) => Err(Error::UnknownEnum { what: "document scope", value: other.to_owned() }),
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

pub const DEFINITION_COLUMNS: &str = "definition_id, key, kind, category_key, subcategory_key,
  mandatory, external_source, position, fallback_on_failure, always_show_when_auto,
  created_at, deleted_at";

/// Raw values read directly from an `attribute_definitions` row.
pub struct RawDefinition {
  pub definition_id:         String,
  pub key:                   String,
  pub kind:                  String,
  pub category_key:          String,
  pub subcategory_key:       String,
  pub mandatory:             bool,
  pub external_source:       Option<String>,
  pub position:              i64,
  pub fallback_on_failure:   bool,
  pub always_show_when_auto: bool,
  pub created_at:            String,
  pub deleted_at:            Option<String>,
}

impl RawDefinition {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      definition_id:         row.get(0)?,
      key:                   row.get(1)?,
      kind:                  row.get(2)?,
      category_key:          row.get(3)?,
      subcategory_key:       row.get(4)?,
      mandatory:             row.get(5)?,
      external_source:       row.get(6)?,
      position:              row.get(7)?,
      fallback_on_failure:   row.get(8)?,
      always_show_when_auto: row.get(9)?,
      created_at:            row.get(10)?,
      deleted_at:            row.get(11)?,
    })
  }

  pub fn into_definition(self) -> Result<AttributeDefinition> {
    let status = match self.deleted_at {
      Some(at) => DefinitionStatus::Deleted { at: decode_dt(&at)? },
      None => DefinitionStatus::Active,
    };
    Ok(AttributeDefinition {
      definition_id: decode_uuid(&self.definition_id)?,
      key: self.key,
      kind: decode_kind(&self.kind)?,
      category_key: self.category_key,
      subcategory_key: self.subcategory_key,
      mandatory: self.mandatory,
      external_source: self.external_source.as_deref().map(decode_binding).transpose()?,
      position: self.position,
      fallback_on_failure: self.fallback_on_failure,
      always_show_when_auto: self.always_show_when_auto,
      status,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

pub const RESPONSE_COLUMNS: &str = "response_id, application_id, attribute_id, kind, value_json,
  provenance, created_at, updated_at, saved_at";

/// Raw strings read directly from a `responses` row.
pub struct RawResponse {
  pub response_id:    String,
  pub application_id: String,
  pub attribute_id:   String,
  pub kind:           String,
  pub value_json:     String,
  pub provenance:     String,
  pub created_at:     String,
  pub updated_at:     String,
  pub saved_at:       String,
}

impl RawResponse {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      response_id:    row.get(0)?,
      application_id: row.get(1)?,
      attribute_id:   row.get(2)?,
      kind:           row.get(3)?,
      value_json:     row.get(4)?,
      provenance:     row.get(5)?,
      created_at:     row.get(6)?,
      updated_at:     row.get(7)?,
      saved_at:       row.get(8)?,
    })
  }

  /// Decode the row; documents are attached by the caller.
  pub fn into_response(self, documents: Vec<Document>) -> Result<AttributeResponse> {
    Ok(AttributeResponse {
      response_id: decode_uuid(&self.response_id)?,
      application_id: decode_uuid(&self.application_id)?,
      attribute_id: decode_uuid(&self.attribute_id)?,
      kind: decode_kind(&self.kind)?,
      value: serde_json::from_str(&self.value_json)?,
      provenance: decode_provenance(&self.provenance)?,
      documents,
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
      saved_at: Some(decode_dt(&self.saved_at)?),
    })
  }
}

pub const DOCUMENT_COLUMNS: &str = "document_id, response_id, filename, content_type, byte_size,
  content_hash, scope, item_token, item_field, attached_at";

/// Raw values read directly from a `documents` row.
pub struct RawDocument {
  pub document_id:  String,
  pub response_id:  String,
  pub filename:     String,
  pub content_type: String,
  pub byte_size:    i64,
  pub content_hash: String,
  pub scope:        String,
  pub item_token:   Option<String>,
  pub item_field:   Option<String>,
  pub attached_at:  String,
}

impl RawDocument {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      document_id:  row.get(0)?,
      response_id:  row.get(1)?,
      filename:     row.get(2)?,
      content_type: row.get(3)?,
      byte_size:    row.get(4)?,
      content_hash: row.get(5)?,
      scope:        row.get(6)?,
      item_token:   row.get(7)?,
      item_field:   row.get(8)?,
      attached_at:  row.get(9)?,
    })
  }

  pub fn into_document(self) -> Result<Document> {
    Ok(Document {
      document_id: decode_uuid(&self.document_id)?,
      response_id: decode_uuid(&self.response_id)?,
      filename: self.filename,
      content_type: self.content_type,
      byte_size: u64::try_from(self.byte_size).unwrap_or_default(),
      content_hash: self.content_hash,
      scope: decode_scope(&self.scope, self.item_token, self.item_field)?,
      attached_at: decode_dt(&self.attached_at)?,
    })
  }
}

/// Raw values read directly from a `fetch_statuses` row.
pub struct RawFetchRecord {
  pub source:        String,
  pub status:        String,
  pub fields_filled: i64,
  pub updated_at:    String,
}

impl RawFetchRecord {
  pub fn into_record(self) -> Result<FetchRecord> {
    Ok(FetchRecord {
      source:        self.source,
      status:        decode_fetch_status(&self.status)?,
      fields_filled: u32::try_from(self.fields_filled).unwrap_or_default(),
      updated_at:    decode_dt(&self.updated_at)?,
    })
  }
}

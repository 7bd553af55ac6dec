//! [`SqliteStore`]: the SQLite implementation of [`ResponseStore`].

use std::path::Path;

use chrono::Utc;
use rusqlite::OptionalExtension as _;
use tracing::debug;
use uuid::Uuid;

use dossier_core::{
  attribute::{AttributeDefinition, DefinitionStatus, NewDefinition},
  document::{Document, DocumentScope, DocumentSelector, Upload},
  provenance::FetchRecord,
  response::AttributeResponse,
  store::ResponseStore,
};

use crate::{
  Error, Result,
  encode::{
    DEFINITION_COLUMNS, DOCUMENT_COLUMNS, RESPONSE_COLUMNS, RawDefinition, RawDocument,
    RawFetchRecord, RawResponse, encode_binding, encode_dt, encode_scope, encode_uuid,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Dossier response store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Documents of the given responses, oldest first.
  async fn documents_of(&self, response_ids: Vec<Uuid>) -> Result<Vec<Document>> {
    let ids: Vec<String> = response_ids.into_iter().map(encode_uuid).collect();

    let raws: Vec<RawDocument> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {DOCUMENT_COLUMNS} FROM documents
           WHERE response_id = ?1
           ORDER BY attached_at, rowid"
        ))?;
        let mut out = Vec::new();
        for id in &ids {
          let rows = stmt
            .query_map(rusqlite::params![id], RawDocument::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
          out.extend(rows);
        }
        Ok(out)
      })
      .await?;

    raws.into_iter().map(RawDocument::into_document).collect()
  }

  /// Decode response rows and attach their documents.
  async fn hydrate(&self, raws: Vec<RawResponse>) -> Result<Vec<AttributeResponse>> {
    let mut responses = Vec::with_capacity(raws.len());
    for raw in raws {
      responses.push(raw.into_response(Vec::new())?);
    }
    let documents = self.documents_of(responses.iter().map(|r| r.response_id).collect()).await?;
    for response in &mut responses {
      response.documents =
        documents.iter().filter(|d| d.response_id == response.response_id).cloned().collect();
    }
    Ok(responses)
  }

  async fn response_exists(&self, response_id: Uuid) -> Result<bool> {
    let id_str = encode_uuid(response_id);
    let exists = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT 1 FROM responses WHERE response_id = ?1",
              rusqlite::params![id_str],
              |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false),
        )
      })
      .await?;
    Ok(exists)
  }
}

// ─── ResponseStore impl ──────────────────────────────────────────────────────

impl ResponseStore for SqliteStore {
  type Error = Error;

  // ── Definitions ───────────────────────────────────────────────────────────

  async fn create_definition(&self, input: NewDefinition) -> Result<AttributeDefinition> {
    if self.get_definition(input.key.clone()).await?.is_some() {
      return Err(Error::DuplicateKey(input.key));
    }

    let definition = AttributeDefinition {
      definition_id:         Uuid::new_v4(),
      key:                   input.key,
      kind:                  input.kind,
      category_key:          input.category_key,
      subcategory_key:       input.subcategory_key,
      mandatory:             input.mandatory,
      external_source:       input.external_source,
      position:              input.position,
      fallback_on_failure:   input.fallback_on_failure,
      always_show_when_auto: input.always_show_when_auto,
      status:                DefinitionStatus::Active,
      created_at:            Utc::now(),
    };

    let id_str      = encode_uuid(definition.definition_id);
    let key         = definition.key.clone();
    let kind        = definition.kind.discriminant();
    let category    = definition.category_key.clone();
    let subcategory = definition.subcategory_key.clone();
    let mandatory   = definition.mandatory;
    let binding     = definition.external_source.as_ref().map(encode_binding).transpose()?;
    let position    = definition.position;
    let fallback    = definition.fallback_on_failure;
    let always_show = definition.always_show_when_auto;
    let at_str      = encode_dt(definition.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO attribute_definitions (
             definition_id, key, kind, category_key, subcategory_key, mandatory,
             external_source, position, fallback_on_failure, always_show_when_auto,
             created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
          rusqlite::params![
            id_str,
            key,
            kind,
            category,
            subcategory,
            mandatory,
            binding,
            position,
            fallback,
            always_show,
            at_str,
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(definition)
  }

  async fn get_definition(&self, key: String) -> Result<Option<AttributeDefinition>> {
    let raw: Option<RawDefinition> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {DEFINITION_COLUMNS} FROM attribute_definitions WHERE key = ?1"),
              rusqlite::params![key],
              RawDefinition::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawDefinition::into_definition).transpose()
  }

  async fn list_definitions(&self, include_deleted: bool) -> Result<Vec<AttributeDefinition>> {
    let raws: Vec<RawDefinition> = self
      .conn
      .call(move |conn| {
        let filter = if include_deleted { "" } else { "WHERE deleted_at IS NULL" };
        let mut stmt = conn.prepare(&format!(
          "SELECT {DEFINITION_COLUMNS} FROM attribute_definitions {filter}
           ORDER BY position, key"
        ))?;
        let rows = stmt
          .query_map([], RawDefinition::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawDefinition::into_definition).collect()
  }

  async fn soft_delete_definition(&self, key: String) -> Result<AttributeDefinition> {
    let mut definition = self
      .get_definition(key.clone())
      .await?
      .ok_or_else(|| Error::DefinitionNotFound(key.clone()))?;
    if !definition.is_active() {
      return Err(Error::AlreadyDeleted(key));
    }

    let at = Utc::now();
    let at_str = encode_dt(at);
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE attribute_definitions SET deleted_at = ?2
           WHERE key = ?1 AND deleted_at IS NULL",
          rusqlite::params![key, at_str],
        )?;
        Ok(())
      })
      .await?;

    definition.status = DefinitionStatus::Deleted { at };
    Ok(definition)
  }

  // ── Responses ─────────────────────────────────────────────────────────────

  async fn get_response(
    &self,
    application_id: Uuid,
    attribute_id: Uuid,
  ) -> Result<Option<AttributeResponse>> {
    let app_str  = encode_uuid(application_id);
    let attr_str = encode_uuid(attribute_id);

    let raw: Option<RawResponse> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {RESPONSE_COLUMNS} FROM responses
                 WHERE application_id = ?1 AND attribute_id = ?2"
              ),
              rusqlite::params![app_str, attr_str],
              RawResponse::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    let Some(raw) = raw else { return Ok(None) };
    Ok(self.hydrate(vec![raw]).await?.pop())
  }

  async fn list_responses(&self, application_id: Uuid) -> Result<Vec<AttributeResponse>> {
    let app_str = encode_uuid(application_id);

    let raws: Vec<RawResponse> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {RESPONSE_COLUMNS} FROM responses WHERE application_id = ?1
           ORDER BY created_at"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![app_str], RawResponse::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    self.hydrate(raws).await
  }

  async fn save_response(&self, response: AttributeResponse) -> Result<AttributeResponse> {
    let application_id = response.application_id;
    let attribute_id   = response.attribute_id;

    let id_str      = encode_uuid(response.response_id);
    let app_str     = encode_uuid(application_id);
    let attr_str    = encode_uuid(attribute_id);
    let kind        = response.kind.discriminant();
    let value_json  = serde_json::to_string(&response.value)?;
    let provenance: &'static str = response.provenance.into();
    let created_str = encode_dt(response.created_at);
    let updated_str = encode_dt(response.updated_at);
    let saved_str   = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO responses (
             response_id, application_id, attribute_id, kind, value_json,
             provenance, created_at, updated_at, saved_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
           ON CONFLICT (application_id, attribute_id) DO UPDATE SET
             kind       = excluded.kind,
             value_json = excluded.value_json,
             provenance = excluded.provenance,
             updated_at = excluded.updated_at,
             saved_at   = excluded.saved_at",
          rusqlite::params![
            id_str,
            app_str,
            attr_str,
            kind,
            value_json,
            provenance,
            created_str,
            updated_str,
            saved_str,
          ],
        )?;
        Ok(())
      })
      .await?;

    debug!(application = %application_id, attribute = %attribute_id, "response row upserted");
    self
      .get_response(application_id, attribute_id)
      .await?
      .ok_or(Error::ResponseNotFound(response.response_id))
  }

  // ── Documents ─────────────────────────────────────────────────────────────

  async fn attach_document(
    &self,
    response_id: Uuid,
    upload: Upload,
    scope: DocumentScope,
  ) -> Result<Document> {
    if !self.response_exists(response_id).await? {
      return Err(Error::ResponseNotFound(response_id));
    }

    let document = upload.describe(response_id, scope);
    let (scope_str, token, field) = encode_scope(&document.scope);

    let doc_id_str   = encode_uuid(document.document_id);
    let resp_id_str  = encode_uuid(response_id);
    let filename     = document.filename.clone();
    let content_type = document.content_type.clone();
    let byte_size    = i64::try_from(document.byte_size).unwrap_or(i64::MAX);
    let hash         = document.content_hash.clone();
    let at_str       = encode_dt(document.attached_at);
    let bytes        = upload.bytes;

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO blobs (content_hash, bytes) VALUES (?1, ?2)
           ON CONFLICT (content_hash) DO NOTHING",
          rusqlite::params![hash, bytes],
        )?;
        tx.execute(
          "INSERT INTO documents (
             document_id, response_id, filename, content_type, byte_size,
             content_hash, scope, item_token, item_field, attached_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
          rusqlite::params![
            doc_id_str,
            resp_id_str,
            filename,
            content_type,
            byte_size,
            hash,
            scope_str,
            token,
            field,
            at_str,
          ],
        )?;
        tx.commit()?;
        Ok(())
      })
      .await?;

    Ok(document)
  }

  async fn detach_documents(&self, response_id: Uuid, selector: DocumentSelector) -> Result<usize> {
    let doomed: Vec<String> = self
      .documents_of(vec![response_id])
      .await?
      .into_iter()
      .filter(|d| selector.matches(&d.scope))
      .map(|d| encode_uuid(d.document_id))
      .collect();
    if doomed.is_empty() {
      return Ok(0);
    }

    let removed = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut removed = 0;
        for id in &doomed {
          removed += tx.execute(
            "DELETE FROM documents WHERE document_id = ?1",
            rusqlite::params![id],
          )?;
        }
        // Bytes no document points at any more.
        tx.execute(
          "DELETE FROM blobs
           WHERE content_hash NOT IN (SELECT content_hash FROM documents)",
          [],
        )?;
        tx.commit()?;
        Ok(removed)
      })
      .await?;

    debug!(response = %response_id, removed, "documents detached");
    Ok(removed)
  }

  async fn count_documents(&self, response_id: Uuid, selector: DocumentSelector) -> Result<usize> {
    Ok(
      self
        .documents_of(vec![response_id])
        .await?
        .iter()
        .filter(|d| selector.matches(&d.scope))
        .count(),
    )
  }

  async fn document_content(&self, document_id: Uuid) -> Result<Option<(Document, Vec<u8>)>> {
    let id_str = encode_uuid(document_id);

    let row: Option<(RawDocument, Vec<u8>)> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT d.document_id, d.response_id, d.filename, d.content_type,
                      d.byte_size, d.content_hash, d.scope, d.item_token,
                      d.item_field, d.attached_at, b.bytes
               FROM documents d
               JOIN blobs b ON b.content_hash = d.content_hash
               WHERE d.document_id = ?1",
              rusqlite::params![id_str],
              |row| Ok((RawDocument::from_row(row)?, row.get(10)?)),
            )
            .optional()?,
        )
      })
      .await?;

    match row {
      Some((raw, bytes)) => Ok(Some((raw.into_document()?, bytes))),
      None => Ok(None),
    }
  }

  // ── Fetch status ──────────────────────────────────────────────────────────

  async fn record_fetch_status(&self, application_id: Uuid, record: FetchRecord) -> Result<()> {
    let app_str = encode_uuid(application_id);
    let status: &'static str = record.status.into();
    let filled = i64::from(record.fields_filled);
    let at_str = encode_dt(record.updated_at);
    let source = record.source;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO fetch_statuses (application_id, source, status, fields_filled, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?5)
           ON CONFLICT (application_id, source) DO UPDATE SET
             status        = excluded.status,
             fields_filled = excluded.fields_filled,
             updated_at    = excluded.updated_at",
          rusqlite::params![app_str, source, status, filled, at_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn list_fetch_statuses(&self, application_id: Uuid) -> Result<Vec<FetchRecord>> {
    let app_str = encode_uuid(application_id);

    let raws: Vec<RawFetchRecord> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT source, status, fields_filled, updated_at FROM fetch_statuses
           WHERE application_id = ?1 ORDER BY source",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![app_str], |row| {
            Ok(RawFetchRecord {
              source:        row.get(0)?,
              status:        row.get(1)?,
              fields_filled: row.get(2)?,
              updated_at:    row.get(3)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawFetchRecord::into_record).collect()
  }
}

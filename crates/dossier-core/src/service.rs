//! Store-generic workflows.
//!
//! [`DossierService`] ties the pure pieces (variants, transitions, item
//! store, attachment planning, provenance) to a [`ResponseStore`]. Every
//! write path goes through here so the API and tests share one behaviour.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
  Error,
  attribute::{AttributeDefinition, NewDefinition},
  document::{Document, DocumentPolicy, DocumentScope, DocumentSelector, Upload, plan_specialized},
  form::{FormFields, FormValue},
  provenance::{FetchOutcome, FetchRecord},
  response::{AttributeResponse, missing_mandatory},
  schema::Shape,
  store::ResponseStore,
  validate::{ValidationErrors, is_blank},
  variant::VariantRegistry,
  visibility::{ResponseView, ViewerContext},
};

/// Failure of a workflow, generic over the store's error type.
#[derive(Debug, Error)]
pub enum ServiceError<E>
where
  E: std::error::Error + Send + Sync + 'static,
{
  #[error(transparent)]
  Store(E),

  #[error(transparent)]
  Core(#[from] Error),

  #[error("validation failed: {0}")]
  Invalid(ValidationErrors),
}

impl<E> ServiceError<E>
where
  E: std::error::Error + Send + Sync + 'static,
{
  fn invalid_documents(error: crate::validate::FieldError) -> Self {
    let mut errors = ValidationErrors::default();
    errors.add(error.path, error.message);
    Self::Invalid(errors)
  }
}

pub type ServiceResult<T, E> = std::result::Result<T, ServiceError<E>>;

/// Workflows over a [`ResponseStore`].
#[derive(Debug)]
pub struct DossierService<S> {
  store:    Arc<S>,
  variants: Arc<VariantRegistry>,
  policy:   Arc<DocumentPolicy>,
}

impl<S> Clone for DossierService<S> {
  fn clone(&self) -> Self {
    Self {
      store:    self.store.clone(),
      variants: self.variants.clone(),
      policy:   self.policy.clone(),
    }
  }
}

impl<S: ResponseStore> DossierService<S> {
  pub fn new(store: Arc<S>, policy: DocumentPolicy) -> Self {
    Self {
      store,
      variants: Arc::new(VariantRegistry::new()),
      policy: Arc::new(policy),
    }
  }

  pub fn store(&self) -> &S { &self.store }

  pub fn variants(&self) -> &VariantRegistry { &self.variants }

  pub fn policy(&self) -> &DocumentPolicy { &self.policy }

  // ─── Definitions ─────────────────────────────────────────────────────────

  /// The definition for `key`, whatever its status.
  pub async fn definition(&self, key: &str) -> ServiceResult<AttributeDefinition, S::Error> {
    let definition = self
      .store
      .get_definition(key.to_owned())
      .await
      .map_err(ServiceError::Store)?
      .ok_or_else(|| Error::AttributeNotFound(key.to_owned()))?;
    Ok(definition)
  }

  pub async fn definitions(
    &self,
    include_deleted: bool,
  ) -> ServiceResult<Vec<AttributeDefinition>, S::Error> {
    self.store.list_definitions(include_deleted).await.map_err(ServiceError::Store)
  }

  /// Define a new attribute. Keys stay reserved after a soft delete.
  pub async fn create_definition(
    &self,
    input: NewDefinition,
  ) -> ServiceResult<AttributeDefinition, S::Error> {
    let taken =
      self.store.get_definition(input.key.clone()).await.map_err(ServiceError::Store)?;
    if taken.is_some() {
      return Err(Error::DuplicateKey(input.key).into());
    }
    let definition = self.store.create_definition(input).await.map_err(ServiceError::Store)?;
    info!(key = %definition.key, kind = %definition.kind, "attribute defined");
    Ok(definition)
  }

  /// Soft-delete an attribute; its responses stay readable.
  pub async fn delete_definition(&self, key: &str) -> ServiceResult<AttributeDefinition, S::Error> {
    let definition = self.definition(key).await?;
    if !definition.is_active() {
      return Err(Error::AlreadyDeleted(definition.definition_id).into());
    }
    let deleted =
      self.store.soft_delete_definition(key.to_owned()).await.map_err(ServiceError::Store)?;
    info!(key, "attribute deleted");
    Ok(deleted)
  }

  /// The definition for `key`; deleted definitions accept no new writes.
  pub async fn active_definition(&self, key: &str) -> ServiceResult<AttributeDefinition, S::Error> {
    let definition = self.definition(key).await?;
    if !definition.is_active() {
      return Err(Error::AttributeDeleted(key.to_owned()).into());
    }
    Ok(definition)
  }

  async fn load_or_new(
    &self,
    application_id: Uuid,
    definition: &AttributeDefinition,
  ) -> ServiceResult<AttributeResponse, S::Error> {
    let existing = self
      .store
      .get_response(application_id, definition.definition_id)
      .await
      .map_err(ServiceError::Store)?;
    Ok(existing.unwrap_or_else(|| AttributeResponse::new(application_id, definition)))
  }

  /// Re-read a response after its documents changed behind `saved`'s back.
  async fn reload(&self, saved: AttributeResponse) -> ServiceResult<AttributeResponse, S::Error> {
    let fresh = self
      .store
      .get_response(saved.application_id, saved.attribute_id)
      .await
      .map_err(ServiceError::Store)?;
    Ok(fresh.unwrap_or(saved))
  }

  // ─── Manual writes ───────────────────────────────────────────────────────

  /// Save a value typed by a human, optionally with general documents
  /// uploaded alongside it.
  ///
  /// The value transition runs first, so documents invalidated by a changed
  /// answer are purged before the new uploads are attached, and the new
  /// uploads count towards validation.
  pub async fn save_value(
    &self,
    application_id: Uuid,
    key: &str,
    value: Value,
    uploads: Vec<Upload>,
  ) -> ServiceResult<AttributeResponse, S::Error> {
    let definition = self.active_definition(key).await?;
    if !uploads.is_empty() {
      if !definition.kind.accepts_general_documents() {
        return Err(Error::DocumentsNotAccepted(definition.kind).into());
      }
      self.policy.check(&uploads).map_err(ServiceError::invalid_documents)?;
    }

    let mut response = self.load_or_new(application_id, &definition).await?;
    let purge = response.apply_manual_write(value);

    let mut documents = response.documents.clone();
    documents.extend(
      uploads.iter().map(|u| u.describe(response.response_id, DocumentScope::General)),
    );
    let errors = self.variants.get(response.kind).validate(
      &response.value,
      &documents,
      response.is_persisted(),
    );
    if !errors.is_empty() {
      debug!(attribute = key, %errors, "manual value rejected");
      return Err(ServiceError::Invalid(errors));
    }

    let saved = self.store.save_response(response).await.map_err(ServiceError::Store)?;
    if let Some(selector) = purge {
      let purged = self
        .store
        .detach_documents(saved.response_id, selector)
        .await
        .map_err(ServiceError::Store)?;
      if purged > 0 {
        warn!(attribute = key, purged, "justification documents purged after answer change");
      }
    }
    for upload in uploads {
      self
        .store
        .attach_document(saved.response_id, upload, DocumentScope::General)
        .await
        .map_err(ServiceError::Store)?;
    }

    info!(
      application = %application_id,
      attribute = key,
      provenance = %saved.provenance,
      "response saved"
    );
    self.reload(saved).await
  }

  /// Apply a flat form submission to a repeatable-items response.
  ///
  /// Destroyed items and items whose presence field was cleared lose their
  /// specialized documents. Uploaded files become specialized documents
  /// following the variant's replace-or-accumulate policy. The purges and attachments run after the value is saved and are
  /// not atomic with it.
  pub async fn submit_form(
    &self,
    application_id: Uuid,
    key: &str,
    fields: FormFields,
  ) -> ServiceResult<AttributeResponse, S::Error> {
    let definition = self.active_definition(key).await?;
    let spec = self
      .variants
      .descriptor(definition.kind)
      .items()
      .ok_or(Error::NotRepeatable(definition.kind))?;

    let files = fields.values().filter_map(|v| match v {
      FormValue::File(upload) => Some(upload),
      FormValue::Text(_) => None,
    });
    self.policy.check(files).map_err(ServiceError::invalid_documents)?;

    let mut response = self.load_or_new(application_id, &definition).await?;
    let mut items = response.items();
    let assignment = items.assign_from_form_fields(spec, &fields)?;
    response.set_items(items);
    response.provenance = response.provenance.after_manual_write();
    let orphaned: Vec<String> =
      assignment.destroyed.iter().chain(&assignment.emptied).cloned().collect();
    for token in &orphaned {
      let selector = DocumentSelector::Item { token: token.clone() };
      response.documents.retain(|d| !selector.matches(&d.scope));
    }

    let errors = response.validate(&self.variants);
    if !errors.is_empty() {
      debug!(attribute = key, %errors, "form submission rejected");
      return Err(ServiceError::Invalid(errors));
    }

    let saved = self.store.save_response(response).await.map_err(ServiceError::Store)?;

    for token in orphaned {
      let purged = self
        .store
        .detach_documents(saved.response_id, DocumentSelector::Item { token: token.clone() })
        .await
        .map_err(ServiceError::Store)?;
      if purged > 0 {
        warn!(attribute = key, token = %token, purged, "item documents purged");
      }
    }

    for item_upload in assignment.uploads {
      let plan = plan_specialized(spec, &item_upload.token, &item_upload.field)?;
      if let Some(selector) = plan.purge {
        self
          .store
          .detach_documents(saved.response_id, selector)
          .await
          .map_err(ServiceError::Store)?;
      }
      self
        .store
        .attach_document(saved.response_id, item_upload.upload, plan.scope)
        .await
        .map_err(ServiceError::Store)?;
    }

    info!(application = %application_id, attribute = key, "form submitted");
    self.reload(saved).await
  }

  /// Attach one general document, creating the response if there is none
  /// yet.
  ///
  /// The response must stay valid with the new document counted, so a radio
  /// answered on its non-justified side refuses justification files.
  pub async fn attach_document(
    &self,
    application_id: Uuid,
    key: &str,
    upload: Upload,
  ) -> ServiceResult<Document, S::Error> {
    let definition = self.active_definition(key).await?;
    if !definition.kind.accepts_general_documents() {
      return Err(Error::DocumentsNotAccepted(definition.kind).into());
    }
    self.policy.check([&upload]).map_err(ServiceError::invalid_documents)?;

    let current = self.load_or_new(application_id, &definition).await?;
    let mut documents = current.documents.clone();
    documents.push(upload.describe(current.response_id, DocumentScope::General));
    let errors = self.variants.get(current.kind).validate(
      &current.value,
      &documents,
      current.is_persisted(),
    );
    if !errors.is_empty() {
      debug!(attribute = key, %errors, "document refused");
      return Err(ServiceError::Invalid(errors));
    }

    let response = if current.is_persisted() {
      current
    } else {
      self.store.save_response(current).await.map_err(ServiceError::Store)?
    };

    let document = self
      .store
      .attach_document(response.response_id, upload, DocumentScope::General)
      .await
      .map_err(ServiceError::Store)?;
    info!(
      application = %application_id,
      attribute = key,
      filename = %document.filename,
      "document attached"
    );
    Ok(document)
  }

  pub async fn document_content(
    &self,
    document_id: Uuid,
  ) -> ServiceResult<Option<(Document, Vec<u8>)>, S::Error> {
    self.store.document_content(document_id).await.map_err(ServiceError::Store)
  }

  // ─── External fetch ──────────────────────────────────────────────────────

  /// Record what the fetch orchestrator reported for `source`.
  ///
  /// A completed fetch writes `auto` values for every active definition
  /// bound to `source`; values that are missing or fail validation fall
  /// back as if the fetch had failed for that attribute.
  pub async fn record_fetch(
    &self,
    application_id: Uuid,
    source: &str,
    outcome: FetchOutcome,
  ) -> ServiceResult<FetchRecord, S::Error> {
    let bound: Vec<AttributeDefinition> = self
      .store
      .list_definitions(false)
      .await
      .map_err(ServiceError::Store)?
      .into_iter()
      .filter(|d| d.is_bound_to(source))
      .collect();

    let mut fields_filled = 0u32;
    match &outcome {
      FetchOutcome::Pending => {}
      FetchOutcome::Completed { fields } => {
        for definition in &bound {
          let fetched = definition
            .external_source
            .as_ref()
            .and_then(|b| fields.get(&b.field))
            .filter(|v| !is_blank(Some(v)));
          let written = match fetched {
            Some(raw) => self.write_auto(application_id, definition, raw.clone()).await?,
            None => false,
          };
          if written {
            fields_filled += 1;
          } else {
            self.fall_back(application_id, definition).await?;
          }
        }
      }
      FetchOutcome::Failed { reason } => {
        warn!(
          application = %application_id,
          source,
          reason = reason.as_deref().unwrap_or("unknown"),
          "external fetch failed"
        );
        for definition in &bound {
          self.fall_back(application_id, definition).await?;
        }
      }
    }

    let record = FetchRecord {
      source: source.to_owned(),
      status: outcome.status(),
      fields_filled,
      updated_at: Utc::now(),
    };
    self
      .store
      .record_fetch_status(application_id, record.clone())
      .await
      .map_err(ServiceError::Store)?;
    info!(
      application = %application_id,
      source,
      status = %record.status,
      fields_filled,
      "fetch status recorded"
    );
    Ok(record)
  }

  /// Shape a fetched value for `definition`'s kind. A bare scalar is wrapped
  /// under the property of single-property flat kinds.
  fn shape_fetched(&self, definition: &AttributeDefinition, raw: Value) -> Value {
    let descriptor = self.variants.descriptor(definition.kind);
    match (&descriptor.shape, descriptor.properties.as_slice()) {
      (Shape::Flat, [property]) if !raw.is_object() => {
        let mut wrapped = Map::new();
        wrapped.insert((*property).to_owned(), raw);
        Value::Object(wrapped)
      }
      _ => raw,
    }
  }

  /// Write one fetched value; returns `false` when it was rejected.
  async fn write_auto(
    &self,
    application_id: Uuid,
    definition: &AttributeDefinition,
    raw: Value,
  ) -> ServiceResult<bool, S::Error> {
    let value = self.shape_fetched(definition, raw);
    let mut response = self.load_or_new(application_id, definition).await?;
    let errors = self.variants.get(definition.kind).validate(&value, &response.documents, true);
    if !errors.is_empty() {
      warn!(attribute = %definition.key, %errors, "fetched value rejected");
      return Ok(false);
    }
    response.value = value;
    response.provenance = response.provenance.after_fetch_success();
    response.updated_at = Utc::now();
    self.store.save_response(response).await.map_err(ServiceError::Store)?;
    Ok(true)
  }

  /// Hand a fallback-eligible attribute back to the candidate.
  async fn fall_back(
    &self,
    application_id: Uuid,
    definition: &AttributeDefinition,
  ) -> ServiceResult<(), S::Error> {
    if !definition.fallback_on_failure {
      return Ok(());
    }
    let mut response = self.load_or_new(application_id, definition).await?;
    response.provenance = response.provenance.after_fetch_failure();
    response.updated_at = Utc::now();
    self.store.save_response(response).await.map_err(ServiceError::Store)?;
    debug!(attribute = %definition.key, "attribute handed back after fetch failure");
    Ok(())
  }

  pub async fn fetch_statuses(
    &self,
    application_id: Uuid,
  ) -> ServiceResult<Vec<FetchRecord>, S::Error> {
    self.store.list_fetch_statuses(application_id).await.map_err(ServiceError::Store)
  }

  // ─── Reads ───────────────────────────────────────────────────────────────

  /// Every response of an application as seen from `context`, in definition
  /// order.
  pub async fn view(
    &self,
    application_id: Uuid,
    context: ViewerContext,
  ) -> ServiceResult<Vec<ResponseView>, S::Error> {
    let definitions =
      self.store.list_definitions(true).await.map_err(ServiceError::Store)?;
    let responses =
      self.store.list_responses(application_id).await.map_err(ServiceError::Store)?;
    Ok(
      definitions
        .iter()
        .filter_map(|d| {
          let response = responses.iter().find(|r| r.attribute_id == d.definition_id)?;
          Some(ResponseView::build(d, response, context, &self.variants))
        })
        .collect(),
    )
  }

  /// One response as seen from `context`.
  pub async fn view_one(
    &self,
    application_id: Uuid,
    key: &str,
    context: ViewerContext,
  ) -> ServiceResult<Option<ResponseView>, S::Error> {
    let definition = self.definition(key).await?;
    let response = self
      .store
      .get_response(application_id, definition.definition_id)
      .await
      .map_err(ServiceError::Store)?;
    Ok(response.map(|r| ResponseView::build(&definition, &r, context, &self.variants)))
  }

  /// Active mandatory definitions the application has not filled in.
  pub async fn missing(
    &self,
    application_id: Uuid,
  ) -> ServiceResult<Vec<AttributeDefinition>, S::Error> {
    let definitions =
      self.store.list_definitions(false).await.map_err(ServiceError::Store)?;
    let responses =
      self.store.list_responses(application_id).await.map_err(ServiceError::Store)?;
    Ok(
      missing_mandatory(&definitions, &responses, &self.variants)
        .into_iter()
        .cloned()
        .collect(),
    )
  }
}

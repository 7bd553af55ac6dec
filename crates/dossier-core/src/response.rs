//! Attribute responses, one per (application, attribute) pair.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{
  attribute::AttributeDefinition,
  document::{Document, DocumentSelector},
  items::Items,
  provenance::Provenance,
  transition::{Transition, apply_transition},
  validate::ValidationErrors,
  variant::{VariantKind, VariantRegistry},
};

/// The value an application supplied (or had filled in) for one attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeResponse {
  pub response_id:    Uuid,
  pub application_id: Uuid,
  pub attribute_id:   Uuid,
  pub kind:           VariantKind,
  /// Semi-structured value; its shape is governed by `kind`.
  pub value:          Value,
  pub provenance:     Provenance,
  pub documents:      Vec<Document>,
  pub created_at:     DateTime<Utc>,
  pub updated_at:     DateTime<Utc>,
  /// Set by the store on every save; `None` until the first one.
  pub saved_at:       Option<DateTime<Utc>>,
}

impl AttributeResponse {
  /// A fresh, never-persisted response with an empty value.
  pub fn new(application_id: Uuid, definition: &AttributeDefinition) -> Self {
    let now = Utc::now();
    Self {
      response_id: Uuid::new_v4(),
      application_id,
      attribute_id: definition.definition_id,
      kind: definition.kind,
      value: Value::Object(Map::new()),
      provenance: Provenance::default(),
      documents: Vec::new(),
      created_at: now,
      updated_at: now,
      saved_at: None,
    }
  }

  pub fn is_persisted(&self) -> bool { self.saved_at.is_some() }

  /// Accept a value typed by a human.
  ///
  /// Applies the kind's value transition, updates provenance, and drops from
  /// `documents` anything the transition invalidated. The returned selector,
  /// if any, names the documents the store must purge.
  pub fn apply_manual_write(&mut self, value: Value) -> Option<DocumentSelector> {
    let Transition { value, purge_general_documents } =
      apply_transition(self.kind, &self.value, value);
    self.value = value;
    self.provenance = self.provenance.after_manual_write();
    self.updated_at = Utc::now();
    purge_general_documents.then(|| {
      let selector = DocumentSelector::General;
      self.documents.retain(|d| !selector.matches(&d.scope));
      selector
    })
  }

  /// Validate against the kind's variant; skipped until first persisted.
  pub fn validate(&self, variants: &VariantRegistry) -> ValidationErrors {
    variants.get(self.kind).validate(&self.value, &self.documents, self.is_persisted())
  }

  pub fn has_data(&self, variants: &VariantRegistry) -> bool {
    variants.get(self.kind).has_data(&self.value, &self.documents)
  }

  /// The repeatable items held in the value.
  pub fn items(&self) -> Items { Items::from_value(&self.value) }

  pub fn set_items(&mut self, items: Items) {
    items.write_into(&mut self.value);
    self.updated_at = Utc::now();
  }
}

/// Active mandatory definitions whose response is missing or holds no data.
pub fn missing_mandatory<'a>(
  definitions: &'a [AttributeDefinition],
  responses: &[AttributeResponse],
  variants: &VariantRegistry,
) -> Vec<&'a AttributeDefinition> {
  definitions
    .iter()
    .filter(|d| d.is_active() && d.mandatory)
    .filter(|d| {
      !responses
        .iter()
        .any(|r| r.attribute_id == d.definition_id && r.has_data(variants))
    })
    .collect()
}

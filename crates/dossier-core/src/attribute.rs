//! Attribute definitions, the static description of one requirement.
//!
//! Definitions are never hard-deleted once created: historical responses must
//! stay interpretable, so deletion is a status change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::variant::VariantKind;

/// Binding of a definition to one field of an external registry lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalBinding {
  /// Name of the external source, e.g. `"insee"`.
  pub source_name: String,
  /// Field of the fetch result that fills this attribute.
  pub field:       String,
}

/// Soft-deletion status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DefinitionStatus {
  Active,
  Deleted { at: DateTime<Utc> },
}

impl DefinitionStatus {
  pub fn is_active(&self) -> bool { matches!(self, Self::Active) }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDefinition {
  pub definition_id:         Uuid,
  /// Stable, unique identifier used by callers.
  pub key:                   String,
  pub kind:                  VariantKind,
  pub category_key:          String,
  pub subcategory_key:       String,
  pub mandatory:             bool,
  pub external_source:       Option<ExternalBinding>,
  pub position:              i64,
  /// A failed fetch hands the attribute back to the candidate.
  pub fallback_on_failure:   bool,
  /// Show auto-filled values even in candidate-facing contexts.
  pub always_show_when_auto: bool,
  pub status:                DefinitionStatus,
  pub created_at:            DateTime<Utc>,
}

impl AttributeDefinition {
  pub fn is_active(&self) -> bool { self.status.is_active() }

  /// Whether this attribute is filled by `source`.
  pub fn is_bound_to(&self, source: &str) -> bool {
    self.external_source.as_ref().is_some_and(|b| b.source_name == source)
  }
}

/// Input to [`crate::store::ResponseStore::create_definition`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDefinition {
  pub key:                   String,
  pub kind:                  VariantKind,
  pub category_key:          String,
  #[serde(default)]
  pub subcategory_key:       String,
  #[serde(default)]
  pub mandatory:             bool,
  #[serde(default)]
  pub external_source:       Option<ExternalBinding>,
  #[serde(default)]
  pub position:              i64,
  #[serde(default)]
  pub fallback_on_failure:   bool,
  #[serde(default)]
  pub always_show_when_auto: bool,
}

impl NewDefinition {
  /// Convenience constructor with all optional fields set to their defaults.
  pub fn new(key: impl Into<String>, kind: VariantKind, category_key: impl Into<String>) -> Self {
    Self {
      key: key.into(),
      kind,
      category_key: category_key.into(),
      subcategory_key: String::new(),
      mandatory: false,
      external_source: None,
      position: 0,
      fallback_on_failure: false,
      always_show_when_auto: false,
    }
  }

  pub fn bound_to(mut self, source_name: impl Into<String>, field: impl Into<String>) -> Self {
    self.external_source =
      Some(ExternalBinding { source_name: source_name.into(), field: field.into() });
    self
  }
}

//! Display visibility of response values.
//!
//! Candidates never see auto-filled values in their own web view or in the
//! documents they export; they only see that the value was retrieved
//! automatically. Buyers, reviewers and raw machine-readable consumers see
//! everything.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
  attribute::AttributeDefinition,
  document::Document,
  provenance::Provenance,
  response::AttributeResponse,
  variant::{DisplayField, VariantKind, VariantRegistry},
};

/// Who is looking at a response.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ViewerContext {
  #[default]
  CandidateWeb,
  DocumentExport,
  Buyer,
  Reviewer,
  Raw,
}

/// Whether a value with `provenance` is shown in `context`.
/// `always_show_when_auto` is the per-attribute override.
pub fn show_value(
  provenance: Provenance,
  context: ViewerContext,
  always_show_when_auto: bool,
) -> bool {
  match provenance {
    Provenance::Manual | Provenance::ManualAfterApiFailure => true,
    Provenance::Auto => {
      always_show_when_auto
        || matches!(context, ViewerContext::Buyer | ViewerContext::Reviewer | ViewerContext::Raw)
    }
  }
}

/// The read model of one response for one viewer; never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseView {
  pub attribute_key:             String,
  pub kind:                      VariantKind,
  pub provenance:                Provenance,
  /// The value was auto-filled and is hidden from this viewer.
  pub retrieved_automatically:   bool,
  pub value:                     Option<Value>,
  pub fields:                    Vec<DisplayField>,
  pub documents:                 Vec<Document>,
}

impl ResponseView {
  pub fn build(
    definition: &AttributeDefinition,
    response: &AttributeResponse,
    context: ViewerContext,
    variants: &VariantRegistry,
  ) -> Self {
    let shown = show_value(response.provenance, context, definition.always_show_when_auto);
    let (value, fields, documents) = if shown {
      (
        Some(response.value.clone()),
        variants.get(response.kind).display_fields(&response.value),
        response.documents.clone(),
      )
    } else {
      (None, Vec::new(), Vec::new())
    };
    Self {
      attribute_key: definition.key.clone(),
      kind: response.kind,
      provenance: response.provenance,
      retrieved_automatically: !shown,
      value,
      fields,
      documents,
    }
  }
}

#[cfg(test)]
mod tests {
  use chrono::Utc;
  use serde_json::json;
  use uuid::Uuid;

  use super::*;
  use crate::attribute::DefinitionStatus;

  const ALL: [ViewerContext; 5] = [
    ViewerContext::CandidateWeb,
    ViewerContext::DocumentExport,
    ViewerContext::Buyer,
    ViewerContext::Reviewer,
    ViewerContext::Raw,
  ];

  #[test]
  fn manual_values_always_show() {
    for ctx in ALL {
      assert!(show_value(Provenance::Manual, ctx, false));
      assert!(show_value(Provenance::ManualAfterApiFailure, ctx, false));
    }
  }

  #[test]
  fn auto_values_hidden_from_candidate_facing_contexts() {
    assert!(!show_value(Provenance::Auto, ViewerContext::CandidateWeb, false));
    assert!(!show_value(Provenance::Auto, ViewerContext::DocumentExport, false));
    assert!(show_value(Provenance::Auto, ViewerContext::Buyer, false));
    assert!(show_value(Provenance::Auto, ViewerContext::Reviewer, false));
    assert!(show_value(Provenance::Auto, ViewerContext::Raw, false));
  }

  #[test]
  fn per_attribute_override_shows_auto_everywhere() {
    for ctx in ALL {
      assert!(show_value(Provenance::Auto, ctx, true));
    }
  }

  #[test]
  fn hidden_view_only_carries_badge() {
    let definition = AttributeDefinition {
      definition_id:         Uuid::new_v4(),
      key:                   "siret".into(),
      kind:                  VariantKind::SiretInput,
      category_key:          "identite".into(),
      subcategory_key:       String::new(),
      mandatory:             true,
      external_source:       None,
      position:              1,
      fallback_on_failure:   true,
      always_show_when_auto: false,
      status:                DefinitionStatus::Active,
      created_at:            Utc::now(),
    };
    let mut response = AttributeResponse::new(Uuid::new_v4(), &definition);
    response.value = json!({ "siret": "73282932000074" });
    response.provenance = Provenance::Auto;

    let variants = VariantRegistry::new();
    let view = ResponseView::build(&definition, &response, ViewerContext::CandidateWeb, &variants);
    assert!(view.retrieved_automatically);
    assert_eq!(view.value, None);
    assert!(view.fields.is_empty());

    let view = ResponseView::build(&definition, &response, ViewerContext::Buyer, &variants);
    assert!(!view.retrieved_automatically);
    assert_eq!(view.fields[0].value, "73282932000074");
  }

  #[test]
  fn contexts_parse_from_query_strings() {
    assert_eq!("document_export".parse::<ViewerContext>().unwrap(), ViewerContext::DocumentExport);
  }
}

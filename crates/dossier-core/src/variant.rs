//! Response variants.
//!
//! A response's `kind` selects one [`ResponseVariant`]: its descriptor, its
//! variant-specific consistency checks, what counts as "has data", and how
//! its value is flattened for display. Implementations are grouped in a few
//! families; [`VariantRegistry`] builds one per kind at startup.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::IntoEnumIterator;

use crate::{
  Error, Result,
  document::{Document, DocumentsExt as _},
  items::Items,
  schema::{Descriptor, FieldRule, NO, Shape, YES, YES_NO},
  validate::{self, DOCUMENTS, FieldError, ValidationErrors, is_blank},
};

// ─── Kind ────────────────────────────────────────────────────────────────────

/// The discriminant stored with every definition and response.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::EnumIter,
  strum::IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum VariantKind {
  // ── Scalars ─────────────────────────────────────────────────────────────
  TextInput,
  Textarea,
  EmailInput,
  PhoneInput,
  UrlInput,
  DateInput,
  SiretInput,
  Checkbox,

  // ── Document-bearing ────────────────────────────────────────────────────
  CheckboxWithDocument,
  FileUpload,
  InlineFileUpload,
  FileOrTextarea,
  InlineUrlInput,
  RadioWithJustificationRequired,
  RadioWithFileAndText,

  // ── Multi-year ──────────────────────────────────────────────────────────
  AnnualTurnover,
  AnnualStaffing,

  // ── Repeatable items ────────────────────────────────────────────────────
  Realisations,
  TeamPresentation,
  Samples,
}

impl VariantKind {
  /// The string stored in `kind` columns.
  pub fn discriminant(self) -> &'static str { self.into() }

  pub fn parse(s: &str) -> Result<Self> {
    s.parse().map_err(|_| Error::UnknownKind(s.to_owned()))
  }

  pub fn is_radio(self) -> bool {
    matches!(self, Self::RadioWithJustificationRequired | Self::RadioWithFileAndText)
  }

  /// Whether whole-response ("general") documents may be attached.
  pub fn accepts_general_documents(self) -> bool {
    matches!(
      self,
      Self::CheckboxWithDocument
        | Self::FileUpload
        | Self::InlineFileUpload
        | Self::FileOrTextarea
        | Self::InlineUrlInput
        | Self::RadioWithJustificationRequired
        | Self::RadioWithFileAndText
    )
  }
}

// ─── Display ─────────────────────────────────────────────────────────────────

/// One labelled line of a flattened value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayField {
  /// Dotted path of the field, e.g. `year_1.turnover`.
  pub label: String,
  pub value: String,
}

fn scalar_text(value: &Value) -> String {
  match value {
    Value::String(s) => s.clone(),
    other => other.to_string(),
  }
}

fn display_rules(
  fields: Option<&serde_json::Map<String, Value>>,
  rules: &[FieldRule],
  prefix: &str,
  skip: &[&str],
  out: &mut Vec<DisplayField>,
) {
  let Some(fields) = fields else { return };
  for rule in rules {
    if skip.contains(&rule.name) {
      continue;
    }
    let v = fields.get(rule.name);
    if let Some(v) = v.filter(|v| !is_blank(Some(v))) {
      let label =
        if prefix.is_empty() { rule.name.to_owned() } else { format!("{prefix}.{}", rule.name) };
      out.push(DisplayField { label, value: scalar_text(v) });
    }
  }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Behaviour of one variant.
pub trait ResponseVariant: Send + Sync + fmt::Debug {
  fn descriptor(&self) -> &Descriptor;

  fn kind(&self) -> VariantKind { self.descriptor().kind }

  /// Variant-specific consistency checks run after structural validation.
  fn check(&self, _value: &Value, _documents: &[Document]) -> Vec<FieldError> { Vec::new() }

  /// Full validation, grouped by the descriptor's error target.
  fn validate(&self, value: &Value, documents: &[Document], persisted: bool) -> ValidationErrors {
    let mut errors = ValidationErrors::default();
    if !persisted {
      return errors;
    }
    let d = self.descriptor();
    errors.extend(d.error_target, validate::validate(value, d, persisted));
    errors.extend(d.error_target, self.check(value, documents));
    errors
  }

  /// Whether the response carries anything worth showing or counting.
  fn has_data(&self, value: &Value, documents: &[Document]) -> bool {
    !is_blank(Some(value)) || !documents.is_empty()
  }

  fn display_fields(&self, value: &Value) -> Vec<DisplayField> {
    let mut out = Vec::new();
    display_rules(value.as_object(), &self.descriptor().fields, "", &[], &mut out);
    out
  }
}

// ─── Families ────────────────────────────────────────────────────────────────

/// Plain scalar inputs; the descriptor says everything.
#[derive(Debug)]
pub struct Scalar {
  descriptor: Descriptor,
}

impl ResponseVariant for Scalar {
  fn descriptor(&self) -> &Descriptor { &self.descriptor }
}

/// When a general document is required.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentRule {
  Always,
  /// Only when `checked` is true.
  WhenChecked,
  /// Unless the named text field is filled in.
  UnlessFilled(&'static str),
}

/// Variants that hold general documents next to (or instead of) a value.
#[derive(Debug)]
pub struct WithDocuments {
  descriptor: Descriptor,
  rule:       DocumentRule,
}

impl ResponseVariant for WithDocuments {
  fn descriptor(&self) -> &Descriptor { &self.descriptor }

  fn check(&self, value: &Value, documents: &[Document]) -> Vec<FieldError> {
    let has_documents = !documents.general_documents().is_empty();
    match self.rule {
      DocumentRule::Always if !has_documents => {
        vec![FieldError::new(DOCUMENTS, "at least one document is required")]
      }
      DocumentRule::WhenChecked
        if !has_documents
          && value.get("checked").and_then(validate::as_bool) == Some(true) =>
      {
        vec![FieldError::new(DOCUMENTS, "a document is required when checked")]
      }
      DocumentRule::UnlessFilled(field) if !has_documents && is_blank(value.get(field)) => {
        vec![FieldError::new(field, format!("{field} or at least one document is required"))]
      }
      _ => Vec::new(),
    }
  }
}

/// Yes/no radios where one answer may (or must) be justified by text and
/// documents, and the other answer must carry neither.
#[derive(Debug)]
pub struct Radio {
  descriptor:             Descriptor,
  justified_choice:       &'static str,
  justification_required: bool,
}

impl Radio {
  pub const CHOICE: &'static str = "radio_choice";
  pub const TEXT: &'static str = "text";
}

impl ResponseVariant for Radio {
  fn descriptor(&self) -> &Descriptor { &self.descriptor }

  fn check(&self, value: &Value, documents: &[Document]) -> Vec<FieldError> {
    let Some(choice) = value.get(Self::CHOICE).and_then(Value::as_str) else {
      return Vec::new();
    };
    if !YES_NO.contains(&choice) {
      return Vec::new();
    }
    let has_documents = !documents.general_documents().is_empty();
    let mut errors = Vec::new();
    if choice == self.justified_choice {
      if self.justification_required && !has_documents {
        errors.push(FieldError::new(
          DOCUMENTS,
          format!("a justification document is required when {} is {choice}", Self::CHOICE),
        ));
      }
    } else {
      if !is_blank(value.get(Self::TEXT)) {
        errors.push(FieldError::new(
          Self::TEXT,
          format!("{} must be empty when {} is {choice}", Self::TEXT, Self::CHOICE),
        ));
      }
      if has_documents {
        errors.push(FieldError::new(
          DOCUMENTS,
          format!("documents must be empty when {} is {choice}", Self::CHOICE),
        ));
      }
    }
    errors
  }
}

/// Three year slots sharing one set of nested rules.
#[derive(Debug)]
pub struct YearSlots {
  descriptor: Descriptor,
}

impl ResponseVariant for YearSlots {
  fn descriptor(&self) -> &Descriptor { &self.descriptor }

  fn display_fields(&self, value: &Value) -> Vec<DisplayField> {
    let mut out = Vec::new();
    if let Shape::YearSlots(rules) = &self.descriptor.shape {
      for slot in &self.descriptor.properties {
        display_rules(value.get(*slot).and_then(Value::as_object), rules, slot, &[], &mut out);
      }
    }
    out
  }
}

/// Token-keyed repeatable items.
#[derive(Debug)]
pub struct ItemList {
  descriptor: Descriptor,
}

impl ResponseVariant for ItemList {
  fn descriptor(&self) -> &Descriptor { &self.descriptor }

  fn has_data(&self, value: &Value, _documents: &[Document]) -> bool {
    let Some(spec) = self.descriptor.items() else { return false };
    Items::from_value(value).items_with_data(spec.presence_field).next().is_some()
  }

  fn display_fields(&self, value: &Value) -> Vec<DisplayField> {
    let mut out = Vec::new();
    let Some(spec) = self.descriptor.items() else { return out };
    let items = Items::from_value(value);
    for (token, item) in items.items_with_data(spec.presence_field) {
      let prefix = format!("{}.{token}", crate::schema::ITEMS);
      display_rules(Some(item), &spec.fields, &prefix, &spec.document_fields, &mut out);
    }
    out
  }
}

// ─── Registry ────────────────────────────────────────────────────────────────

fn build(kind: VariantKind) -> Box<dyn ResponseVariant> {
  use VariantKind as K;

  let descriptor = Descriptor::for_kind(kind);
  let documents = |rule: DocumentRule| Box::new(WithDocuments { descriptor: descriptor.clone(), rule });
  match kind {
    K::CheckboxWithDocument => documents(DocumentRule::WhenChecked),
    K::FileUpload | K::InlineFileUpload => documents(DocumentRule::Always),
    K::FileOrTextarea => documents(DocumentRule::UnlessFilled("text")),
    K::InlineUrlInput => documents(DocumentRule::UnlessFilled("url")),
    K::RadioWithJustificationRequired => Box::new(Radio {
      descriptor,
      justified_choice: NO,
      justification_required: true,
    }),
    K::RadioWithFileAndText => Box::new(Radio {
      descriptor,
      justified_choice: YES,
      justification_required: false,
    }),
    K::AnnualTurnover | K::AnnualStaffing => Box::new(YearSlots { descriptor }),
    K::Realisations | K::TeamPresentation | K::Samples => Box::new(ItemList { descriptor }),
    K::TextInput
    | K::Textarea
    | K::EmailInput
    | K::PhoneInput
    | K::UrlInput
    | K::DateInput
    | K::SiretInput
    | K::Checkbox => Box::new(Scalar { descriptor }),
  }
}

/// One immutable [`ResponseVariant`] per [`VariantKind`], built once and
/// shared.
#[derive(Debug)]
pub struct VariantRegistry {
  // Indexed by `VariantKind as usize`; `new` builds them in declaration order.
  variants: Vec<Box<dyn ResponseVariant>>,
}

impl VariantRegistry {
  pub fn new() -> Self { Self { variants: VariantKind::iter().map(build).collect() } }

  pub fn get(&self, kind: VariantKind) -> &dyn ResponseVariant {
    self.variants[kind as usize].as_ref()
  }

  pub fn descriptor(&self, kind: VariantKind) -> &Descriptor { self.get(kind).descriptor() }
}

impl Default for VariantRegistry {
  fn default() -> Self { Self::new() }
}

#[cfg(test)]
mod tests {
  use chrono::Utc;
  use serde_json::json;
  use uuid::Uuid;

  use super::*;
  use crate::document::DocumentScope;

  fn general_doc() -> Document {
    Document {
      document_id:  Uuid::new_v4(),
      response_id:  Uuid::nil(),
      filename:     "justif.pdf".into(),
      content_type: "application/pdf".into(),
      byte_size:    3,
      content_hash: String::new(),
      scope:        DocumentScope::General,
      attached_at:  Utc::now(),
    }
  }

  #[test]
  fn discriminants_round_trip() {
    for kind in VariantKind::iter() {
      assert_eq!(VariantKind::parse(kind.discriminant()).unwrap(), kind);
      assert_eq!(serde_json::to_value(kind).unwrap(), json!(kind.discriminant()));
    }
    assert!(matches!(VariantKind::parse("slider"), Err(Error::UnknownKind(_))));
  }

  #[test]
  fn registry_returns_matching_variant() {
    let registry = VariantRegistry::new();
    for kind in VariantKind::iter() {
      assert_eq!(registry.get(kind).kind(), kind);
    }
  }

  #[test]
  fn file_upload_needs_a_document_once_persisted() {
    let registry = VariantRegistry::new();
    let v = registry.get(VariantKind::FileUpload);
    assert!(v.validate(&json!({}), &[], false).is_empty());
    let errors = v.validate(&json!({}), &[], true);
    assert_eq!(errors.get(DOCUMENTS), ["at least one document is required"]);
    assert!(v.validate(&json!({}), &[general_doc()], true).is_empty());
  }

  #[test]
  fn checkbox_with_document_only_requires_when_checked() {
    let registry = VariantRegistry::new();
    let v = registry.get(VariantKind::CheckboxWithDocument);
    assert!(v.validate(&json!({ "checked": false }), &[], true).is_empty());
    assert!(!v.validate(&json!({ "checked": true }), &[], true).is_empty());
    assert!(v.validate(&json!({ "checked": true }), &[general_doc()], true).is_empty());
  }

  #[test]
  fn file_or_textarea_accepts_either() {
    let registry = VariantRegistry::new();
    let v = registry.get(VariantKind::FileOrTextarea);
    assert_eq!(
      v.validate(&json!({}), &[], true).get("value"),
      ["text or at least one document is required"]
    );
    assert!(v.validate(&json!({ "text": "see annex" }), &[], true).is_empty());
    assert!(v.validate(&json!({}), &[general_doc()], true).is_empty());
  }

  #[test]
  fn radio_no_requires_justification_document() {
    let registry = VariantRegistry::new();
    let v = registry.get(VariantKind::RadioWithJustificationRequired);
    let errors = v.validate(&json!({ "radio_choice": "no" }), &[], true);
    assert_eq!(
      errors.get(DOCUMENTS),
      ["a justification document is required when radio_choice is no"]
    );
    assert!(v.validate(&json!({ "radio_choice": "no" }), &[general_doc()], true).is_empty());
  }

  #[test]
  fn radio_yes_must_not_carry_justification() {
    let registry = VariantRegistry::new();
    let v = registry.get(VariantKind::RadioWithJustificationRequired);
    let errors =
      v.validate(&json!({ "radio_choice": "yes", "text": "stale" }), &[general_doc()], true);
    assert_eq!(errors.get("value"), ["text must be empty when radio_choice is yes"]);
    assert_eq!(errors.get(DOCUMENTS), ["documents must be empty when radio_choice is yes"]);
  }

  #[test]
  fn radio_with_file_and_text_justifies_yes_optionally() {
    let registry = VariantRegistry::new();
    let v = registry.get(VariantKind::RadioWithFileAndText);
    assert!(v.validate(&json!({ "radio_choice": "yes" }), &[], true).is_empty());
    assert!(v.validate(&json!({ "radio_choice": "yes", "text": "t" }), &[], true).is_empty());
    assert!(!v.validate(&json!({ "radio_choice": "no", "text": "t" }), &[], true).is_empty());
  }

  #[test]
  fn items_have_data_only_with_presence_field() {
    let registry = VariantRegistry::new();
    let v = registry.get(VariantKind::Samples);
    assert!(!v.has_data(&json!({ "items": { "1": { "quantite": "3" } } }), &[]));
    assert!(v.has_data(&json!({ "items": { "1": { "description": "Tuile" } } }), &[]));
  }

  #[test]
  fn display_flattens_nested_values() {
    let registry = VariantRegistry::new();
    let v = registry.get(VariantKind::AnnualStaffing);
    let fields = v.display_fields(&json!({
      "year_1": { "average_staff": 12, "period_end": "2023-12-31" },
    }));
    assert_eq!(
      fields,
      vec![
        DisplayField { label: "year_1.average_staff".into(), value: "12".into() },
        DisplayField { label: "year_1.period_end".into(), value: "2023-12-31".into() },
      ]
    );

    let v = registry.get(VariantKind::TeamPresentation);
    let fields = v.display_fields(&json!({
      "items": { "9": { "nom": "Durand", "cv": "attached" }, "10": { "titres": "x" } },
    }));
    assert_eq!(fields.len(), 1);
    assert_eq!(fields[0].label, "items.9.nom");
  }
}

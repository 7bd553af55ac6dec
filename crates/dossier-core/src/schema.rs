//! Value schema descriptors.
//!
//! Every [`VariantKind`] has exactly one immutable [`Descriptor`] declaring
//! the top-level properties of its value blob, which of them are required,
//! and a rule per leaf field. Descriptors are built once by
//! [`crate::variant::VariantRegistry`] and handed to the validator; nothing
//! looks them up through global state.

use crate::variant::VariantKind;

// ─── Field rules ─────────────────────────────────────────────────────────────

/// The scalar type a leaf field must hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
  String,
  /// A non-negative integer unless a [`FieldRule::range`] says otherwise.
  /// Numeric strings are accepted because form posts are text.
  Integer,
  /// A calendar date encoded as `YYYY-MM-DD`.
  Date,
  Boolean,
}

/// Additional textual constraints on a string field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
  Email,
  /// Absolute `http` or `https` URL.
  Url,
  Phone,
  /// 14-digit French establishment number with a Luhn checksum.
  Siret,
  Choice(&'static [&'static str]),
}

/// Validation rule for one leaf field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRule {
  pub name:     &'static str,
  pub ty:       FieldType,
  /// Inclusive bounds for integer fields.
  pub range:    Option<(i64, i64)>,
  pub format:   Option<Format>,
  pub required: bool,
}

impl FieldRule {
  const fn new(name: &'static str, ty: FieldType) -> Self {
    Self { name, ty, range: None, format: None, required: false }
  }

  pub const fn string(name: &'static str) -> Self {
    Self::new(name, FieldType::String)
  }

  pub const fn integer(name: &'static str) -> Self {
    Self::new(name, FieldType::Integer)
  }

  pub const fn date(name: &'static str) -> Self {
    Self::new(name, FieldType::Date)
  }

  pub const fn boolean(name: &'static str) -> Self {
    Self::new(name, FieldType::Boolean)
  }

  pub const fn required(mut self) -> Self {
    self.required = true;
    self
  }

  pub const fn within(mut self, low: i64, high: i64) -> Self {
    self.range = Some((low, high));
    self
  }

  pub const fn format(mut self, format: Format) -> Self {
    self.format = Some(format);
    self
  }
}

/// `end` must be a date on or after `start` when both are present and valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrossFieldRule {
  pub start: &'static str,
  pub end:   &'static str,
}

/// Where validation messages are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorTarget {
  /// Every message lands on one aggregate field.
  Aggregate(&'static str),
  /// Messages are keyed by the top-level property they concern.
  PerField,
}

/// Settings for variants whose value is a token-keyed map of items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemsSpec {
  /// Fixed form-key prefix, e.g. `realisation` in `realisation_<token>_<field>`.
  pub prefix:                            &'static str,
  /// An item whose presence field is blank counts as "no item".
  pub presence_field:                    &'static str,
  pub fields:                            Vec<FieldRule>,
  /// Fields that carry specialized documents instead of text.
  pub document_fields:                   Vec<&'static str>,
  /// `true`: a new upload replaces the slot; `false`: uploads accumulate.
  pub cleanup_old_specialized_documents: bool,
}

impl ItemsSpec {
  pub fn rule(&self, field: &str) -> Option<&FieldRule> {
    self.fields.iter().find(|r| r.name == field)
  }

  pub fn is_document_field(&self, field: &str) -> bool {
    self.document_fields.contains(&field)
  }
}

/// Structural layout of a value blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shape {
  /// Top-level scalar properties, one rule each.
  Flat,
  /// Each property is a year slot sharing the same nested rules.
  YearSlots(Vec<FieldRule>),
  /// A single `items` property holding repeatable items.
  Items(ItemsSpec),
}

// ─── Descriptor ──────────────────────────────────────────────────────────────

/// The immutable schema of one variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
  pub kind:         VariantKind,
  pub properties:   Vec<&'static str>,
  pub required:     Vec<&'static str>,
  /// Top-level rules; only populated for [`Shape::Flat`].
  pub fields:       Vec<FieldRule>,
  pub shape:        Shape,
  pub cross_field:  Option<CrossFieldRule>,
  pub error_target: ErrorTarget,
}

pub const YES: &str = "yes";
pub const NO: &str = "no";
pub const YES_NO: &[&str] = &[YES, NO];

pub const YEAR_SLOTS: [&str; 3] = ["year_1", "year_2", "year_3"];

/// Property name holding repeatable items.
pub const ITEMS: &str = "items";

/// Aggregate error field used by most variants.
pub const VALUE: &str = "value";

impl Descriptor {
  fn flat(kind: VariantKind, fields: Vec<FieldRule>, target: ErrorTarget) -> Self {
    Self {
      kind,
      properties: fields.iter().map(|r| r.name).collect(),
      required: fields.iter().filter(|r| r.required).map(|r| r.name).collect(),
      fields,
      shape: Shape::Flat,
      cross_field: None,
      error_target: target,
    }
  }

  fn year_slots(kind: VariantKind, slot: Vec<FieldRule>, cross: CrossFieldRule) -> Self {
    Self {
      kind,
      properties: YEAR_SLOTS.to_vec(),
      required: YEAR_SLOTS.to_vec(),
      fields: Vec::new(),
      shape: Shape::YearSlots(slot),
      cross_field: Some(cross),
      error_target: ErrorTarget::Aggregate(VALUE),
    }
  }

  fn item_list(kind: VariantKind, spec: ItemsSpec, cross: Option<CrossFieldRule>) -> Self {
    Self {
      kind,
      properties: vec![ITEMS],
      required: vec![ITEMS],
      fields: Vec::new(),
      shape: Shape::Items(spec),
      cross_field: cross,
      error_target: ErrorTarget::Aggregate(VALUE),
    }
  }

  /// Build the descriptor for `kind`.
  pub fn for_kind(kind: VariantKind) -> Self {
    use ErrorTarget::{Aggregate, PerField};
    use VariantKind as K;

    match kind {
      K::TextInput | K::Textarea => {
        Self::flat(kind, vec![FieldRule::string("text").required()], PerField)
      }
      K::EmailInput => Self::flat(
        kind,
        vec![FieldRule::string("email").required().format(Format::Email)],
        PerField,
      ),
      K::PhoneInput => Self::flat(
        kind,
        vec![FieldRule::string("phone").required().format(Format::Phone)],
        PerField,
      ),
      K::UrlInput => Self::flat(
        kind,
        vec![FieldRule::string("url").required().format(Format::Url)],
        PerField,
      ),
      K::DateInput => {
        Self::flat(kind, vec![FieldRule::date("date").required()], PerField)
      }
      K::SiretInput => Self::flat(
        kind,
        vec![FieldRule::string("siret").required().format(Format::Siret)],
        PerField,
      ),
      K::Checkbox => {
        Self::flat(kind, vec![FieldRule::boolean("checked").required()], PerField)
      }
      K::CheckboxWithDocument => Self::flat(
        kind,
        vec![FieldRule::boolean("checked").required()],
        Aggregate(VALUE),
      ),
      K::FileUpload | K::InlineFileUpload => {
        Self::flat(kind, Vec::new(), Aggregate(VALUE))
      }
      K::FileOrTextarea => {
        Self::flat(kind, vec![FieldRule::string("text")], Aggregate(VALUE))
      }
      K::InlineUrlInput => Self::flat(
        kind,
        vec![FieldRule::string("url").format(Format::Url)],
        Aggregate(VALUE),
      ),
      K::RadioWithJustificationRequired | K::RadioWithFileAndText => Self::flat(
        kind,
        vec![
          FieldRule::string("radio_choice")
            .required()
            .format(Format::Choice(YES_NO)),
          FieldRule::string("text"),
        ],
        Aggregate(VALUE),
      ),
      K::AnnualTurnover => Self::year_slots(
        kind,
        vec![
          FieldRule::integer("turnover").required(),
          FieldRule::integer("market_percentage").required().within(0, 100),
          FieldRule::date("fiscal_year_start"),
          FieldRule::date("fiscal_year_end").required(),
        ],
        CrossFieldRule { start: "fiscal_year_start", end: "fiscal_year_end" },
      ),
      K::AnnualStaffing => Self::year_slots(
        kind,
        vec![
          FieldRule::integer("average_staff").required(),
          FieldRule::integer("management_staff"),
          FieldRule::date("period_start"),
          FieldRule::date("period_end").required(),
        ],
        CrossFieldRule { start: "period_start", end: "period_end" },
      ),
      K::Realisations => Self::item_list(
        kind,
        ItemsSpec {
          prefix:                            "realisation",
          presence_field:                    "intitule",
          fields:                            vec![
            FieldRule::string("intitule").required(),
            FieldRule::string("client").required(),
            FieldRule::date("date_debut").required(),
            FieldRule::date("date_fin").required(),
            FieldRule::integer("montant").required(),
            FieldRule::string("description"),
            FieldRule::string("attestation"),
          ],
          document_fields:                   vec!["attestation"],
          cleanup_old_specialized_documents: true,
        },
        Some(CrossFieldRule { start: "date_debut", end: "date_fin" }),
      ),
      K::TeamPresentation => Self::item_list(
        kind,
        ItemsSpec {
          prefix:                            "person",
          presence_field:                    "nom",
          fields:                            vec![
            FieldRule::string("nom").required(),
            FieldRule::string("prenoms").required(),
            FieldRule::string("titres"),
            FieldRule::string("cv"),
          ],
          document_fields:                   vec!["cv"],
          cleanup_old_specialized_documents: true,
        },
        None,
      ),
      K::Samples => Self::item_list(
        kind,
        ItemsSpec {
          prefix:                            "echantillon",
          presence_field:                    "description",
          fields:                            vec![
            FieldRule::string("description").required(),
            FieldRule::integer("quantite"),
            FieldRule::string("fichiers"),
          ],
          document_fields:                   vec!["fichiers"],
          cleanup_old_specialized_documents: false,
        },
        None,
      ),
    }
  }

  pub fn rule(&self, name: &str) -> Option<&FieldRule> {
    self.fields.iter().find(|r| r.name == name)
  }

  pub fn items(&self) -> Option<&ItemsSpec> {
    match &self.shape {
      Shape::Items(spec) => Some(spec),
      _ => None,
    }
  }

  pub fn is_required(&self, property: &str) -> bool {
    self.required.contains(&property)
  }
}

//! Value transitions applied when a human writes a new value.
//!
//! Changing a radio's answer invalidates whatever justified the previous
//! answer. The clearing happens here, once, when the new value is accepted,
//! so stale text or files never resurface if the answer is flipped back.

use serde_json::Value;

use crate::variant::{Radio, VariantKind};

/// Outcome of [`apply_transition`].
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
  pub value:                   Value,
  /// General (justification) documents must be purged.
  pub purge_general_documents: bool,
}

impl Transition {
  fn keep(value: Value) -> Self { Self { value, purge_general_documents: false } }
}

/// Compute the value to store when `new` replaces `old` for a `kind` response.
///
/// For radio variants a changed `radio_choice` drops the justification text
/// carried over from `old` and asks for the general documents to be purged.
/// Text that differs from the old text was typed alongside the new answer and
/// is kept.
pub fn apply_transition(kind: VariantKind, old: &Value, mut new: Value) -> Transition {
  if !kind.is_radio() {
    return Transition::keep(new);
  }

  let old_choice = old.get(Radio::CHOICE).and_then(Value::as_str);
  let new_choice = new.get(Radio::CHOICE).and_then(Value::as_str);
  let changed = match (old_choice, new_choice) {
    (Some(o), Some(n)) => o != n,
    (Some(_), None) => true,
    (None, _) => false,
  };
  if !changed {
    return Transition::keep(new);
  }

  let stale = matches!(
    (old.get(Radio::TEXT), new.get(Radio::TEXT)),
    (Some(o), Some(n)) if o == n
  );
  if stale && let Some(obj) = new.as_object_mut() {
    obj.remove(Radio::TEXT);
  }

  Transition { value: new, purge_general_documents: true }
}

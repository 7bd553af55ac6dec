//! The repeatable item store.
//!
//! List-like variants keep their entries under `value.items` as a map of
//! opaque token → flat field map. Tokens are creation timestamps in practice
//! but carry no ordering meaning; they are never reused.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::{
  Error, Result,
  document::Upload,
  form::{FormFields, FormKey, FormValue},
  schema::{ITEMS, ItemsSpec},
  validate::is_blank,
};

/// Marker stored in a document-bearing item field once a file is attached.
pub const ATTACHED: &str = "attached";

/// Generate a fresh item token.
pub fn new_item_token() -> String { Utc::now().timestamp_micros().to_string() }

// ─── Items ───────────────────────────────────────────────────────────────────

/// Token-keyed repeatable items of one response value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Items(BTreeMap<String, Map<String, Value>>);

/// A file that arrived through a form submission, destined for one item
/// field as a specialized document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemUpload {
  pub token:  String,
  pub field:  String,
  pub upload: Upload,
}

/// Side effects of [`Items::assign_from_form_fields`] that the caller must
/// carry out on the document store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormAssignment {
  pub uploads:   Vec<ItemUpload>,
  /// Items removed by a destroy signal; their specialized documents go too.
  pub destroyed: Vec<String>,
  /// Items whose presence field was cleared. They stay, but lose their
  /// document markers and specialized documents.
  pub emptied:   Vec<String>,
}

impl Items {
  /// Read the items out of a response value. Malformed entries are skipped.
  pub fn from_value(value: &Value) -> Self {
    let map = value
      .get(ITEMS)
      .and_then(Value::as_object)
      .map(|items| {
        items
          .iter()
          .filter_map(|(token, item)| Some((token.clone(), item.as_object()?.clone())))
          .collect()
      })
      .unwrap_or_default();
    Self(map)
  }

  /// Write the items back into `value`, replacing whatever was there.
  pub fn write_into(self, value: &mut Value) {
    if !value.is_object() {
      *value = Value::Object(Map::new());
    }
    let items: Map<String, Value> =
      self.0.into_iter().map(|(token, item)| (token, Value::Object(item))).collect();
    if let Some(obj) = value.as_object_mut() {
      obj.insert(ITEMS.to_owned(), Value::Object(items));
    }
  }

  pub fn len(&self) -> usize { self.0.len() }

  pub fn is_empty(&self) -> bool { self.0.is_empty() }

  pub fn tokens(&self) -> impl Iterator<Item = &str> { self.0.keys().map(String::as_str) }

  pub fn get(&self, token: &str) -> Option<&Map<String, Value>> { self.0.get(token) }

  /// Blank values read as absent.
  pub fn get_item_field(&self, token: &str, field: &str) -> Option<&Value> {
    self.0.get(token)?.get(field).filter(|v| !is_blank(Some(v)))
  }

  /// Write one field, creating the item if needed. `null` or an empty string
  /// clears the field but keeps the item.
  pub fn set_item_field(&mut self, token: &str, field: &str, value: Value) {
    let item = self.0.entry(token.to_owned()).or_default();
    if is_blank(Some(&value)) {
      item.remove(field);
    } else {
      item.insert(field.to_owned(), value);
    }
  }

  pub fn remove_item(&mut self, token: &str) -> bool { self.0.remove(token).is_some() }

  /// Items whose presence field is filled in.
  pub fn items_with_data<'a>(
    &'a self,
    presence_field: &'a str,
  ) -> impl Iterator<Item = (&'a str, &'a Map<String, Value>)> + 'a {
    self
      .0
      .iter()
      .filter(move |(_, item)| !is_blank(item.get(presence_field)))
      .map(|(token, item)| (token.as_str(), item))
  }

  /// Apply a flat form submission.
  ///
  /// Keys may arrive in any order; a destroy signal for a token wins over
  /// field writes for the same token in the same submission. Keys for other
  /// prefixes are ignored.
  pub fn assign_from_form_fields(
    &mut self,
    spec: &ItemsSpec,
    fields: &FormFields,
  ) -> Result<FormAssignment> {
    let had_data: Vec<String> =
      self.items_with_data(spec.presence_field).map(|(token, _)| token.to_owned()).collect();

    let mut keys = Vec::new();
    for (raw, value) in fields {
      if let Some(key) = FormKey::parse(raw, spec.prefix)? {
        keys.push((key, value));
      }
    }

    let mut destroyed: Vec<String> = keys
      .iter()
      .filter(|(k, v)| k.destroy && matches!(v, FormValue::Text(s) if s == "1"))
      .map(|(k, _)| k.token.to_owned())
      .collect();
    destroyed.sort();
    destroyed.dedup();

    let mut uploads = Vec::new();
    for (key, value) in keys {
      if key.destroy || destroyed.iter().any(|t| t == key.token) {
        continue;
      }
      if spec.rule(key.field).is_none() {
        return Err(Error::UnknownItemField {
          prefix: spec.prefix.to_owned(),
          field:  key.field.to_owned(),
        });
      }
      match value {
        FormValue::File(upload) => {
          if !spec.is_document_field(key.field) {
            return Err(Error::NotADocumentField {
              prefix: spec.prefix.to_owned(),
              field:  key.field.to_owned(),
            });
          }
          self.set_item_field(key.token, key.field, Value::String(ATTACHED.to_owned()));
          uploads.push(ItemUpload {
            token:  key.token.to_owned(),
            field:  key.field.to_owned(),
            upload: upload.clone(),
          });
        }
        // Document fields only change through uploads and purges.
        FormValue::Text(_) if spec.is_document_field(key.field) => {}
        FormValue::Text(text) => {
          self.set_item_field(key.token, key.field, Value::String(text.trim().to_owned()))
        }
      }
    }

    for token in &destroyed {
      if self.remove_item(token) {
        debug!(prefix = spec.prefix, token = %token, "item destroyed");
      }
    }

    let mut emptied = Vec::new();
    for token in had_data {
      if destroyed.contains(&token) {
        continue;
      }
      let Some(item) = self.0.get_mut(&token) else { continue };
      if !is_blank(item.get(spec.presence_field)) {
        continue;
      }
      for field in &spec.document_fields {
        item.remove(*field);
      }
      emptied.push(token);
    }
    uploads.retain(|u| !emptied.contains(&u.token));

    Ok(FormAssignment { uploads, destroyed, emptied })
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;
  use crate::{schema::Descriptor, variant::VariantKind};

  fn spec(kind: VariantKind) -> ItemsSpec {
    Descriptor::for_kind(kind).items().cloned().expect("items variant")
  }

  fn text(s: &str) -> FormValue { FormValue::Text(s.to_owned()) }

  #[test]
  fn set_then_get_round_trips() {
    let mut items = Items::default();
    items.set_item_field("t1", "description", json!("x"));
    assert_eq!(items.get_item_field("t1", "description"), Some(&json!("x")));
  }

  #[test]
  fn clearing_keeps_item_but_drops_it_from_data() {
    let mut items = Items::default();
    items.set_item_field("t1", "description", json!("x"));
    items.set_item_field("t1", "description", json!(""));
    assert_eq!(items.get_item_field("t1", "description"), None);
    assert_eq!(items.len(), 1);
    assert_eq!(items.items_with_data("description").count(), 0);

    items.set_item_field("t1", "description", Value::Null);
    assert_eq!(items.len(), 1);
  }

  #[test]
  fn clearing_presence_field_drops_document_markers() {
    let spec = spec(VariantKind::TeamPresentation);
    let mut items = Items::default();
    items.set_item_field("1", "nom", json!("Durand"));
    items.set_item_field("1", "cv", json!(ATTACHED));
    items.set_item_field("2", "prenoms", json!("Bob"));

    let cv = Upload::new("cv.pdf", "application/pdf", b"%PDF".to_vec());
    let fields = FormFields::from([
      ("person_1_nom".to_owned(), text("")),
      ("person_1_cv".to_owned(), FormValue::File(cv)),
      ("person_2_prenoms".to_owned(), text("Robert")),
    ]);
    let out = items.assign_from_form_fields(&spec, &fields).unwrap();

    assert_eq!(out.emptied, ["1"]);
    assert!(out.uploads.is_empty());
    assert_eq!(items.len(), 2);
    assert_eq!(items.get_item_field("1", "cv"), None);
    assert_eq!(items.items_with_data("nom").count(), 0);
  }

  #[test]
  fn write_into_drops_malformed_entries() {
    let mut value = json!({ "items": { "1": { "nom": "A" }, "bad": 3 } });
    let mut items = Items::from_value(&value);
    assert_eq!(items.len(), 1);
    items.set_item_field("2", "nom", json!("B"));
    items.write_into(&mut value);
    assert_eq!(value["items"]["2"]["nom"], "B");
    assert!(value["items"].get("bad").is_none());
  }

  #[test]
  fn tokens_are_unique_and_numeric() {
    let a = new_item_token();
    std::thread::sleep(std::time::Duration::from_millis(1));
    let b = new_item_token();
    assert_ne!(a, b);
    assert!(a.bytes().all(|c| c.is_ascii_digit()));
  }

  #[test]
  fn form_fields_create_items_in_any_order() {
    let spec = spec(VariantKind::Realisations);
    let mut items = Items::default();
    let mut fields = FormFields::new();
    fields.insert("realisation_900_client".into(), text("Ville"));
    fields.insert("realisation_100_intitule".into(), text(" École "));
    fields.insert("realisation_900_intitule".into(), text("Pont"));
    fields.insert("unrelated".into(), text("ignored"));

    let out = items.assign_from_form_fields(&spec, &fields).unwrap();
    assert!(out.uploads.is_empty());
    assert_eq!(items.get_item_field("100", "intitule"), Some(&json!("École")));
    assert_eq!(items.get_item_field("900", "client"), Some(&json!("Ville")));
    assert_eq!(items.items_with_data("intitule").count(), 2);
  }

  #[test]
  fn destroy_signal_removes_item_and_wins() {
    let spec = spec(VariantKind::TeamPresentation);
    let mut items = Items::default();
    items.set_item_field("5", "nom", json!("Durand"));
    items.set_item_field("6", "nom", json!("Martin"));

    let mut fields = FormFields::new();
    fields.insert("person_5__destroy".into(), text("1"));
    fields.insert("person_5_prenoms".into(), text("Jean"));
    fields.insert("person_6__destroy".into(), text("0"));

    let out = items.assign_from_form_fields(&spec, &fields).unwrap();
    assert_eq!(out.destroyed, ["5"]);
    assert!(items.get("5").is_none());
    assert!(items.get("6").is_some());
  }

  #[test]
  fn file_payloads_become_uploads_with_marker() {
    let spec = spec(VariantKind::TeamPresentation);
    let mut items = Items::default();
    let mut fields = FormFields::new();
    fields.insert("person_7_nom".into(), text("Durand"));
    fields.insert(
      "person_7_cv".into(),
      FormValue::File(Upload::new("cv.pdf", "application/pdf", b"pdf".to_vec())),
    );

    let out = items.assign_from_form_fields(&spec, &fields).unwrap();
    assert_eq!(out.uploads.len(), 1);
    assert_eq!(out.uploads[0].token, "7");
    assert_eq!(out.uploads[0].field, "cv");
    assert_eq!(items.get_item_field("7", "cv"), Some(&json!(ATTACHED)));
  }

  #[test]
  fn unknown_fields_and_misplaced_files_are_rejected() {
    let spec = spec(VariantKind::Samples);
    let mut items = Items::default();

    let mut fields = FormFields::new();
    fields.insert("echantillon_1_colour".into(), text("red"));
    assert!(matches!(
      items.assign_from_form_fields(&spec, &fields),
      Err(Error::UnknownItemField { .. })
    ));

    let mut fields = FormFields::new();
    fields.insert(
      "echantillon_1_description".into(),
      FormValue::File(Upload::new("a.pdf", "application/pdf", b"x".to_vec())),
    );
    assert!(matches!(
      items.assign_from_form_fields(&spec, &fields),
      Err(Error::NotADocumentField { .. })
    ));
  }
}

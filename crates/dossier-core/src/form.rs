//! Decoding of flat form submissions for repeatable items.
//!
//! List-like variants receive bulk input as a flat key→value map whose keys
//! follow `<prefix>_<token>_<field>`; `<prefix>_<token>__destroy = "1"`
//! removes an item. The wire format is kept as-is, but every key is parsed
//! into a [`FormKey`] before anything touches the item store.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::{Error, Result, document::Upload};

/// Field name that marks an item for removal (`<prefix>_<token>__destroy`).
const DESTROY: &str = "_destroy";

/// One form value: plain text, or a file payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum FormValue {
  Text(String),
  File(Upload),
}

/// A whole form submission.
pub type FormFields = BTreeMap<String, FormValue>;

/// A decoded form key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormKey<'a> {
  pub prefix:  &'a str,
  pub token:   &'a str,
  /// Empty when `destroy` is set.
  pub field:   &'a str,
  pub destroy: bool,
}

impl<'a> FormKey<'a> {
  /// Decode `key` for items prefixed `prefix`.
  ///
  /// Returns `Ok(None)` when the key belongs to some other prefix, and an
  /// error when it carries the prefix but not a token and field.
  pub fn parse(key: &'a str, prefix: &'a str) -> Result<Option<Self>> {
    let Some(rest) = key.strip_prefix(prefix).and_then(|r| r.strip_prefix('_')) else {
      return Ok(None);
    };
    let malformed = || Error::MalformedFormKey(key.to_owned());
    let (token, field) = rest.split_once('_').ok_or_else(malformed)?;
    if token.is_empty() || field.is_empty() {
      return Err(malformed());
    }
    if field == DESTROY {
      return Ok(Some(Self { prefix, token, field: "", destroy: true }));
    }
    if field.starts_with('_') {
      return Err(malformed());
    }
    Ok(Some(Self { prefix, token, field, destroy: false }))
  }
}

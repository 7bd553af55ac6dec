//! Structural validation of value blobs against a [`Descriptor`].
//!
//! Validation is pure: it reads a value and returns addressable
//! [`FieldError`]s, it never mutates or rejects by panicking. Nested fields
//! are addressed with dotted paths (`year_1.turnover`,
//! `items.<token>.date_fin`).

use std::{collections::BTreeMap, fmt, sync::LazyLock};

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

use crate::schema::{
  CrossFieldRule, Descriptor, ErrorTarget, FieldRule, FieldType, Format, ITEMS,
  ItemsSpec, Shape,
};

/// Error field used for attachment problems, whatever the variant's target.
pub const DOCUMENTS: &str = "documents";

// ─── Errors ──────────────────────────────────────────────────────────────────

/// One validation failure, addressed by a dotted path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
  pub path:    String,
  /// Human-readable message; already includes the path.
  pub message: String,
}

impl FieldError {
  pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
    Self { path: path.into(), message: message.into() }
  }
}

/// Validation failures grouped by the field they are reported on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
  pub fn is_empty(&self) -> bool { self.0.is_empty() }

  pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
    self.0.entry(field.into()).or_default().push(message.into());
  }

  /// Route `error` to the field dictated by `target`.
  pub fn push(&mut self, target: ErrorTarget, error: FieldError) {
    let top = error.path.split('.').next().unwrap_or_default();
    let field = if top == DOCUMENTS {
      DOCUMENTS
    } else {
      match target {
        ErrorTarget::Aggregate(name) => name,
        ErrorTarget::PerField => top,
      }
    };
    self.add(field, error.message);
  }

  pub fn extend(&mut self, target: ErrorTarget, errors: impl IntoIterator<Item = FieldError>) {
    for e in errors {
      self.push(target, e);
    }
  }

  pub fn get(&self, field: &str) -> &[String] {
    self.0.get(field).map(Vec::as_slice).unwrap_or_default()
  }

  pub fn fields(&self) -> impl Iterator<Item = &str> { self.0.keys().map(String::as_str) }

  pub fn messages(&self) -> impl Iterator<Item = &str> {
    self.0.values().flatten().map(String::as_str)
  }
}

impl fmt::Display for ValidationErrors {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let all: Vec<&str> = self.messages().collect();
    f.write_str(&all.join("; "))
  }
}

impl std::error::Error for ValidationErrors {}

// ─── Blank detection ─────────────────────────────────────────────────────────

/// `null`, absent, whitespace-only strings and empty objects are blank.
pub fn is_blank(value: Option<&Value>) -> bool {
  match value {
    None | Some(Value::Null) => true,
    Some(Value::String(s)) => s.trim().is_empty(),
    Some(Value::Object(m)) => m.values().all(|v| is_blank(Some(v))),
    Some(_) => false,
  }
}

// ─── Entry point ─────────────────────────────────────────────────────────────

/// Check `value` against `descriptor`.
///
/// A response that has never been persisted is not checked at all, so an
/// empty response can be created before anyone fills it in. From the first
/// save onward the same empty value is rejected.
pub fn validate(value: &Value, descriptor: &Descriptor, persisted: bool) -> Vec<FieldError> {
  if !persisted {
    return Vec::new();
  }

  let empty = Map::new();
  let obj = match value {
    Value::Object(m) => m,
    Value::Null => &empty,
    _ => return vec![FieldError::new("value", "value must be an object")],
  };

  let mut errors = Vec::new();
  reject_unknown(obj, &descriptor.properties, "", &mut errors);

  match &descriptor.shape {
    Shape::Flat => {
      for rule in &descriptor.fields {
        check_field(obj.get(rule.name), rule, rule.name, &mut errors);
      }
    }
    Shape::YearSlots(slot_rules) => {
      for slot in &descriptor.properties {
        match obj.get(*slot) {
          Some(Value::Object(fields)) => check_nested(
            fields,
            slot_rules,
            descriptor.cross_field,
            slot,
            &mut errors,
          ),
          Some(v) if !is_blank(Some(v)) => {
            errors.push(FieldError::new(*slot, format!("{slot} must be an object")))
          }
          _ => {
            if descriptor.is_required(slot) {
              errors.push(FieldError::new(*slot, format!("{slot} is required")));
            }
          }
        }
      }
    }
    Shape::Items(spec) => match obj.get(ITEMS) {
      Some(Value::Object(items)) => {
        check_items(items, spec, descriptor.cross_field, &mut errors)
      }
      None | Some(Value::Null) => {
        if descriptor.is_required(ITEMS) {
          errors.push(FieldError::new(ITEMS, format!("{ITEMS} is required")));
        }
      }
      Some(_) => errors.push(FieldError::new(ITEMS, format!("{ITEMS} must be an object"))),
    },
  }

  errors
}

fn join(prefix: &str, name: &str) -> String {
  if prefix.is_empty() { name.to_owned() } else { format!("{prefix}.{name}") }
}

fn reject_unknown(
  obj: &Map<String, Value>,
  allowed: &[&str],
  prefix: &str,
  errors: &mut Vec<FieldError>,
) {
  for key in obj.keys() {
    if !allowed.contains(&key.as_str()) {
      let path = join(prefix, key);
      errors.push(FieldError::new(
        path.clone(),
        format!("{path}: additional properties not allowed"),
      ));
    }
  }
}

fn check_nested(
  fields: &Map<String, Value>,
  rules: &[FieldRule],
  cross: Option<CrossFieldRule>,
  prefix: &str,
  errors: &mut Vec<FieldError>,
) {
  let allowed: Vec<&str> = rules.iter().map(|r| r.name).collect();
  reject_unknown(fields, &allowed, prefix, errors);
  for rule in rules {
    check_field(fields.get(rule.name), rule, &join(prefix, rule.name), errors);
  }
  if let Some(cross) = cross {
    check_cross_field(fields, cross, prefix, errors);
  }
}

fn check_items(
  items: &Map<String, Value>,
  spec: &ItemsSpec,
  cross: Option<CrossFieldRule>,
  errors: &mut Vec<FieldError>,
) {
  for (token, item) in items {
    let prefix = format!("{ITEMS}.{token}");
    let Value::Object(fields) = item else {
      errors.push(FieldError::new(prefix.clone(), format!("{prefix} must be an object")));
      continue;
    };
    // Items without their presence field are placeholders; only stray keys
    // are worth reporting on them.
    if is_blank(fields.get(spec.presence_field)) {
      let allowed: Vec<&str> = spec.fields.iter().map(|r| r.name).collect();
      reject_unknown(fields, &allowed, &prefix, errors);
      continue;
    }
    check_nested(fields, &spec.fields, cross, &prefix, errors);
  }
}

// ─── Leaf checks ─────────────────────────────────────────────────────────────

fn check_field(value: Option<&Value>, rule: &FieldRule, path: &str, errors: &mut Vec<FieldError>) {
  if is_blank(value) {
    if rule.required {
      errors.push(FieldError::new(path, format!("{path} is required")));
    }
    return;
  }
  let Some(value) = value else { return };

  let message = match rule.ty {
    FieldType::String => match value.as_str() {
      Some(s) => rule.format.and_then(|f| check_format(s, f, path)),
      None => Some(format!("{path} must be a string")),
    },
    FieldType::Integer => check_integer(value, rule.range, path),
    FieldType::Date => check_date(value, path).err(),
    FieldType::Boolean => match as_bool(value) {
      Some(_) => None,
      None => Some(format!("{path} must be a boolean")),
    },
  };

  if let Some(message) = message {
    errors.push(FieldError::new(path, message));
  }
}

/// Read an integer from a JSON number or a numeric string.
pub fn as_integer(value: &Value) -> Option<i64> {
  match value {
    Value::Number(n) => n.as_i64(),
    Value::String(s) => s.trim().parse().ok(),
    _ => None,
  }
}

/// Read a boolean from a JSON boolean or a form-style string.
pub fn as_bool(value: &Value) -> Option<bool> {
  match value {
    Value::Bool(b) => Some(*b),
    Value::String(s) => match s.trim() {
      "1" | "true" => Some(true),
      "0" | "false" => Some(false),
      _ => None,
    },
    _ => None,
  }
}

fn check_integer(value: &Value, range: Option<(i64, i64)>, path: &str) -> Option<String> {
  let parsed = as_integer(value);
  match range {
    Some((low, high)) => match parsed {
      Some(n) if (low..=high).contains(&n) => None,
      _ => Some(format!("{path} must be between {low} and {high}")),
    },
    None => match parsed {
      Some(n) if n >= 0 => None,
      _ => Some(format!("{path} must be a positive integer")),
    },
  }
}

fn has_date_shape(s: &str) -> bool {
  let b = s.as_bytes();
  b.len() == 10
    && b.iter().enumerate().all(|(i, c)| match i {
      4 | 7 => *c == b'-',
      _ => c.is_ascii_digit(),
    })
}

/// Parse a `YYYY-MM-DD` date, distinguishing bad shape from impossible dates.
pub fn check_date(value: &Value, path: &str) -> Result<NaiveDate, String> {
  let s = value.as_str().unwrap_or_default();
  if !has_date_shape(s) {
    return Err(format!("{path} must be in YYYY-MM-DD format"));
  }
  NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| format!("{path} is not a valid date"))
}

fn check_cross_field(
  fields: &Map<String, Value>,
  cross: CrossFieldRule,
  prefix: &str,
  errors: &mut Vec<FieldError>,
) {
  let (Some(start), Some(end)) = (fields.get(cross.start), fields.get(cross.end)) else {
    return;
  };
  let (Ok(start), Ok(end)) = (check_date(start, ""), check_date(end, "")) else {
    return;
  };
  if end < start {
    let end_path = join(prefix, cross.end);
    let start_path = join(prefix, cross.start);
    errors.push(FieldError::new(
      end_path.clone(),
      format!("{end_path} must be after or equal to {start_path}"),
    ));
  }
}

fn check_format(s: &str, format: Format, path: &str) -> Option<String> {
  let ok = match format {
    Format::Email => is_email(s),
    Format::Url => is_url(s),
    Format::Phone => is_phone(s),
    Format::Siret => is_siret(s),
    Format::Choice(choices) => choices.contains(&s),
  };
  if ok {
    return None;
  }
  Some(match format {
    Format::Email => format!("{path} must be a valid email address"),
    Format::Url => format!("{path} must be a valid URL"),
    Format::Phone => format!("{path} must be a valid phone number"),
    Format::Siret => format!("{path} must be a valid 14-digit SIRET number"),
    Format::Choice(choices) => format!("{path} must be one of: {}", choices.join(", ")),
  })
}

// Dot-separated domain labels, so `a@b..c` and trailing dots fail.
static EMAIL: LazyLock<Option<Regex>> =
  LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s.]+(\.[^@\s.]+)+$").ok());

fn is_email(s: &str) -> bool { EMAIL.as_ref().is_some_and(|re| re.is_match(s)) }

fn is_url(s: &str) -> bool {
  Url::parse(s).is_ok_and(|u| matches!(u.scheme(), "http" | "https") && u.host().is_some())
}

fn is_phone(s: &str) -> bool {
  let trimmed = s.trim().strip_prefix('+').unwrap_or(s.trim());
  let mut digits = 0;
  for c in trimmed.chars() {
    match c {
      '0'..='9' => digits += 1,
      ' ' | '.' | '-' | '(' | ')' => {}
      _ => return false,
    }
  }
  (8..=15).contains(&digits)
}

fn is_siret(s: &str) -> bool {
  if s.len() != 14 || !s.bytes().all(|b| b.is_ascii_digit()) {
    return false;
  }
  let sum: u32 = s
    .bytes()
    .rev()
    .enumerate()
    .map(|(i, b)| {
      let d = u32::from(b - b'0');
      if i % 2 == 1 {
        let doubled = d * 2;
        if doubled > 9 { doubled - 9 } else { doubled }
      } else {
        d
      }
    })
    .sum();
  sum % 10 == 0
}

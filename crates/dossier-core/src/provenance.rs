//! Provenance: who or what last supplied a response's value.
//!
//! ```text
//!            fetch ok                 fetch failed (fallback attribute)
//!  manual ───────────▶ auto    any ─────────────────────────────────▶ manual_after_api_failure
//!    ▲                  │
//!    └── human write ───┘
//! ```
//!
//! Provenance does not gate writes; it drives display visibility and records
//! whether a human is completing what the registry could not.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

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
  strum::IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Provenance {
  /// Typed in by the candidate.
  #[default]
  Manual,
  /// Written by the external-fetch workflow.
  Auto,
  /// Typed in by the candidate after the fetch failed for this attribute.
  ManualAfterApiFailure,
}

impl Provenance {
  /// State after a human writes the value.
  ///
  /// Overwriting an auto-filled value is allowed and makes it manual; a
  /// value completed after a failure keeps that marker.
  pub fn after_manual_write(self) -> Self {
    match self {
      Self::Auto => Self::Manual,
      other => other,
    }
  }

  /// State after a successful fetch.
  pub fn after_fetch_success(self) -> Self { Self::Auto }

  /// State after a failed fetch for a fallback-eligible attribute.
  pub fn after_fetch_failure(self) -> Self { Self::ManualAfterApiFailure }

  pub fn is_manual(self) -> bool { !matches!(self, Self::Auto) }
}

// ─── Fetch protocol ──────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FetchStatus {
  Pending,
  Completed,
  Failed,
}

impl FetchStatus {
  /// Pollers stop once the status is terminal.
  pub fn is_terminal(self) -> bool { !matches!(self, Self::Pending) }
}

/// Status of one external source's fetch for one application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRecord {
  pub source:        String,
  pub status:        FetchStatus,
  pub fields_filled: u32,
  pub updated_at:    DateTime<Utc>,
}

/// What the fetch orchestrator reports for one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FetchOutcome {
  Pending,
  /// Values keyed by the registry's field names.
  Completed {
    #[serde(default)]
    fields: Map<String, Value>,
  },
  Failed {
    #[serde(default)]
    reason: Option<String>,
  },
}

impl FetchOutcome {
  pub fn status(&self) -> FetchStatus {
    match self {
      Self::Pending => FetchStatus::Pending,
      Self::Completed { .. } => FetchStatus::Completed,
      Self::Failed { .. } => FetchStatus::Failed,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn human_write_only_changes_auto() {
    assert_eq!(Provenance::Auto.after_manual_write(), Provenance::Manual);
    assert_eq!(Provenance::Manual.after_manual_write(), Provenance::Manual);
    assert_eq!(
      Provenance::ManualAfterApiFailure.after_manual_write(),
      Provenance::ManualAfterApiFailure
    );
  }

  #[test]
  fn fetch_transitions() {
    for p in [Provenance::Manual, Provenance::Auto, Provenance::ManualAfterApiFailure] {
      assert_eq!(p.after_fetch_success(), Provenance::Auto);
      assert_eq!(p.after_fetch_failure(), Provenance::ManualAfterApiFailure);
    }
  }

  #[test]
  fn only_pending_is_not_terminal() {
    assert!(!FetchStatus::Pending.is_terminal());
    assert!(FetchStatus::Completed.is_terminal());
    assert!(FetchStatus::Failed.is_terminal());
  }

  #[test]
  fn outcome_wire_format() {
    let o: FetchOutcome = serde_json::from_value(serde_json::json!({
      "status": "completed",
      "fields": { "siret": "73282932000074" },
    }))
    .unwrap();
    assert_eq!(o.status(), FetchStatus::Completed);

    let o: FetchOutcome =
      serde_json::from_value(serde_json::json!({ "status": "failed" })).unwrap();
    assert_eq!(o, FetchOutcome::Failed { reason: None });
    assert_eq!(Provenance::ManualAfterApiFailure.to_string(), "manual_after_api_failure");
  }
}

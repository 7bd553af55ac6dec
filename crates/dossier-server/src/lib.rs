//! HTTP server assembly for Dossier.
//!
//! Holds the runtime configuration and mounts the JSON API under `/api`
//! with request tracing.

use std::path::{Path, PathBuf};

use axum::{Router, routing::get};
use dossier_core::{document::DocumentPolicy, service::DossierService, store::ResponseStore};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

// ─── Configuration ───────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `DOSSIER_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:       String,
  #[serde(default = "default_port")]
  pub port:       u16,
  pub store_path: PathBuf,
  /// Upload limits; every field has a default.
  #[serde(default)]
  pub documents:  DocumentPolicy,
}

fn default_host() -> String { "127.0.0.1".to_owned() }

fn default_port() -> u16 { 8080 }

impl ServerConfig {
  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// The full application: `/health` plus the API under `/api`.
pub fn app<S>(service: DossierService<S>) -> Router
where
  S: ResponseStore + 'static,
{
  Router::new()
    .route("/health", get(|| async { "ok" }))
    .nest("/api", dossier_api::api_router(service))
    .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use axum::{
    body::Body,
    http::{Request, StatusCode},
  };
  use dossier_store_sqlite::SqliteStore;
  use tower::ServiceExt as _;

  use super::*;

  #[test]
  fn config_defaults_fill_in_missing_fields() {
    let settings = config::Config::builder()
      .set_override("store_path", "~/dossier.db")
      .unwrap()
      .build()
      .unwrap();
    let cfg: ServerConfig = settings.try_deserialize().unwrap();
    assert_eq!(cfg.address(), "127.0.0.1:8080");
    assert_eq!(cfg.documents, DocumentPolicy::default());
  }

  #[test]
  fn tilde_expands_to_home() {
    // SAFETY: no other test in this crate reads or writes HOME.
    unsafe { std::env::set_var("HOME", "/home/tester") };
    assert_eq!(expand_tilde(Path::new("~/d.db")), PathBuf::from("/home/tester/d.db"));
    assert_eq!(expand_tilde(Path::new("/abs/d.db")), PathBuf::from("/abs/d.db"));
  }

  #[tokio::test]
  async fn api_is_nested_under_prefix() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let service = DossierService::new(Arc::new(store), DocumentPolicy::default());

    let resp = app(service.clone())
      .oneshot(Request::builder().uri("/api/attributes").body(Body::empty()).unwrap())
      .await
      .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app(service)
      .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
      .await
      .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
  }
}

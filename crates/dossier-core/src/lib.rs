//! Core types and trait definitions for the Dossier attribute-response store.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! All other crates depend on it; it depends on nothing proprietary.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod attribute;
pub mod document;
pub mod error;
pub mod form;
pub mod items;
pub mod provenance;
pub mod response;
pub mod schema;
pub mod service;
pub mod store;
pub mod transition;
pub mod validate;
pub mod variant;
pub mod visibility;

pub use error::{Error, Result};

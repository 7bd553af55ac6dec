//! SQL schema for the Dossier SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Definitions are never deleted; deleted_at marks a soft delete.
CREATE TABLE IF NOT EXISTS attribute_definitions (
    definition_id         TEXT PRIMARY KEY,
    key                   TEXT NOT NULL UNIQUE,
    kind                  TEXT NOT NULL,   -- VariantKind discriminant
    category_key          TEXT NOT NULL,
    subcategory_key       TEXT NOT NULL DEFAULT '',
    mandatory             INTEGER NOT NULL DEFAULT 0,
    external_source       TEXT,            -- JSON ExternalBinding or NULL
    position              INTEGER NOT NULL DEFAULT 0,
    fallback_on_failure   INTEGER NOT NULL DEFAULT 0,
    always_show_when_auto INTEGER NOT NULL DEFAULT 0,
    created_at            TEXT NOT NULL,
    deleted_at            TEXT
);

CREATE TABLE IF NOT EXISTS responses (
    response_id    TEXT PRIMARY KEY,
    application_id TEXT NOT NULL,
    attribute_id   TEXT NOT NULL REFERENCES attribute_definitions(definition_id),
    kind           TEXT NOT NULL,
    value_json     TEXT NOT NULL,
    provenance     TEXT NOT NULL DEFAULT 'manual',
    created_at     TEXT NOT NULL,
    updated_at     TEXT NOT NULL,
    saved_at       TEXT NOT NULL,
    UNIQUE (application_id, attribute_id)
);

-- Document bytes, shared by every document with the same content.
CREATE TABLE IF NOT EXISTS blobs (
    content_hash TEXT PRIMARY KEY,
    bytes        BLOB NOT NULL
);

CREATE TABLE IF NOT EXISTS documents (
    document_id  TEXT PRIMARY KEY,
    response_id  TEXT NOT NULL REFERENCES responses(response_id) ON DELETE CASCADE,
    filename     TEXT NOT NULL,
    content_type TEXT NOT NULL,
    byte_size    INTEGER NOT NULL,
    content_hash TEXT NOT NULL REFERENCES blobs(content_hash),
    scope        TEXT NOT NULL,   -- 'general' | 'specialized'
    item_token   TEXT,
    item_field   TEXT,
    attached_at  TEXT NOT NULL,
    CHECK (scope = 'general' OR (item_token IS NOT NULL AND item_field IS NOT NULL))
);

CREATE TABLE IF NOT EXISTS fetch_statuses (
    application_id TEXT NOT NULL,
    source         TEXT NOT NULL,
    status         TEXT NOT NULL,   -- 'pending' | 'completed' | 'failed'
    fields_filled  INTEGER NOT NULL DEFAULT 0,
    updated_at     TEXT NOT NULL,
    PRIMARY KEY (application_id, source)
);

CREATE INDEX IF NOT EXISTS responses_application_idx ON responses(application_id);
CREATE INDEX IF NOT EXISTS documents_response_idx    ON documents(response_id);

PRAGMA user_version = 1;
";

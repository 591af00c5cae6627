//! SQL migration definitions for the revision database.
//!
//! Migrations are applied in order on database open; each one records its
//! version in `schema_migrations`.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: lookups, revisions, audit log",
            sql: r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Get-or-create lookup tables
CREATE TABLE IF NOT EXISTS authors (
    id         TEXT PRIMARY KEY,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS languages (
    id TEXT PRIMARY KEY
);

CREATE TABLE IF NOT EXISTS tags (
    id TEXT PRIMARY KEY
);

CREATE TABLE IF NOT EXISTS categories (
    id    TEXT PRIMARY KEY,
    title TEXT
);

-- One row per document, mutated in place on edit
CREATE TABLE IF NOT EXISTS revisions (
    id               TEXT PRIMARY KEY,
    content_id       TEXT NOT NULL,
    title            TEXT NOT NULL,
    content          TEXT NOT NULL,
    summary          TEXT,
    language_id      TEXT NOT NULL REFERENCES languages(id),
    author_id        TEXT NOT NULL REFERENCES authors(id),
    images_json      TEXT NOT NULL,
    metadata_json    TEXT NOT NULL,
    source_block     INTEGER NOT NULL,
    transaction_hash TEXT NOT NULL,
    hidden           INTEGER NOT NULL DEFAULT 0,
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_revisions_updated_at ON revisions(updated_at);

CREATE TABLE IF NOT EXISTS revision_tags (
    revision_id TEXT NOT NULL REFERENCES revisions(id) ON DELETE CASCADE,
    tag_id      TEXT NOT NULL REFERENCES tags(id),
    position    INTEGER NOT NULL,
    PRIMARY KEY (revision_id, tag_id)
);

CREATE TABLE IF NOT EXISTS revision_categories (
    revision_id TEXT NOT NULL REFERENCES revisions(id) ON DELETE CASCADE,
    category_id TEXT NOT NULL REFERENCES categories(id),
    position    INTEGER NOT NULL,
    PRIMARY KEY (revision_id, category_id)
);

-- Append-only; one record per accepted content id
CREATE TABLE IF NOT EXISTS audit_log (
    id            TEXT PRIMARY KEY,
    revision_id   TEXT NOT NULL,
    content_id    TEXT NOT NULL UNIQUE,
    kind          TEXT NOT NULL,
    snapshot_json TEXT NOT NULL,
    created_at    TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_audit_revision ON audit_log(revision_id);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Subscriptions and pending edit notifications",
            sql: r#"
CREATE TABLE IF NOT EXISTS subscriptions (
    id          TEXT PRIMARY KEY,
    revision_id TEXT NOT NULL,
    subscriber  TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    UNIQUE(revision_id, subscriber)
);

CREATE TABLE IF NOT EXISTS pending_notifications (
    id          TEXT PRIMARY KEY,
    revision_id TEXT NOT NULL,
    content_id  TEXT NOT NULL,
    created_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_pending_revision ON pending_notifications(revision_id);

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}

//! libSQL storage for persisted revisions.
//!
//! The [`Storage`] struct wraps a local libSQL database holding revisions,
//! their lookup tables, the append-only audit log, subscriptions and pending
//! edit notifications.
//!
//! **Idempotency:** `audit_log.content_id` is unique. [`Storage::upsert_revision`]
//! writes the audit record last, inside the same transaction as the revision
//! mutation; a conflicting content id rolls everything back and yields
//! [`UpsertOutcome::AlreadyIndexed`].

mod migrations;

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database, Row, params};
use serde::Serialize;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use revindex_shared::{
    AuditKind, AuditRecord, DocumentPayload, IndexerError, PersistedRevision, Result,
    RevisionEvent, TimestampSource,
};

/// Result of [`Storage::upsert_revision`].
#[derive(Debug, Clone, PartialEq)]
pub enum UpsertOutcome {
    Created(PersistedRevision),
    Updated(PersistedRevision),
    /// The content id already has an audit record; nothing was written.
    AlreadyIndexed,
}

impl UpsertOutcome {
    pub fn revision(&self) -> Option<&PersistedRevision> {
        match self {
            Self::Created(rev) | Self::Updated(rev) => Some(rev),
            Self::AlreadyIndexed => None,
        }
    }
}

/// A queued "document you follow was edited" notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingNotification {
    pub id: String,
    pub revision_id: String,
    pub content_id: String,
    pub created_at: DateTime<Utc>,
}

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

fn storage_err(e: impl std::fmt::Display) -> IndexerError {
    IndexerError::Storage(e.to_string())
}

/// Fixed-width UTC timestamps so string order matches time order.
fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| storage_err(format!("invalid timestamp '{s}': {e}")))
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| IndexerError::io(parent, e))?;
            }
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` for inspection only.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(storage_err(format!(
                "database not found: {}",
                path.display()
            )));
        }
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;
        let conn = db.connect().map_err(storage_err)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        storage_err(format!("migration v{} failed: {e}", migration.version))
                    })?;
            }
        }
        Ok(())
    }

    /// Current schema version, or 0 before the first migration.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => match rows.next().await {
                Ok(Some(row)) => row.get::<u32>(0).unwrap_or(0),
                _ => 0,
            },
            Err(_) => 0,
        }
    }

    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(storage_err("database is opened in read-only mode"));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Revisions
    // -----------------------------------------------------------------------

    /// Whether an accepted revision already carries this content id.
    pub async fn is_already_indexed(&self, content_id: &str) -> Result<bool> {
        let mut rows = self
            .conn
            .query(
                "SELECT 1 FROM audit_log WHERE content_id = ?1 LIMIT 1",
                params![content_id],
            )
            .await
            .map_err(storage_err)?;
        Ok(rows.next().await.map_err(storage_err)?.is_some())
    }

    pub async fn get_revision(&self, id: &str) -> Result<Option<PersistedRevision>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, content_id, title, content, summary, language_id, author_id,
                        images_json, metadata_json, source_block, transaction_hash, hidden,
                        created_at, updated_at
                 FROM revisions WHERE id = ?1",
                params![id],
            )
            .await
            .map_err(storage_err)?;

        let Some(row) = rows.next().await.map_err(storage_err)? else {
            return Ok(None);
        };
        let mut revision = row_to_revision(&row)?;
        revision.tags = linked_ids(&self.conn, "revision_tags", "tag_id", id).await?;
        revision.categories =
            linked_ids(&self.conn, "revision_categories", "category_id", id).await?;
        Ok(Some(revision))
    }

    /// Most recent `updated_at` across all revisions.
    pub async fn latest_update(&self) -> Result<Option<DateTime<Utc>>> {
        let mut rows = self
            .conn
            .query("SELECT MAX(updated_at) FROM revisions", params![])
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => match row.get::<Option<String>>(0).map_err(storage_err)? {
                Some(ts) => Ok(Some(parse_ts(&ts)?)),
                None => Ok(None),
            },
            None => Ok(None),
        }
    }

    /// Insert or update the revision for `payload`, append its audit record
    /// and, for an edited body with subscribers, queue a notification.
    #[instrument(skip_all, fields(id = %payload.id, content_id = %event.content_id))]
    pub async fn upsert_revision(
        &self,
        payload: &DocumentPayload,
        event: &RevisionEvent,
        timestamps: TimestampSource,
    ) -> Result<UpsertOutcome> {
        self.check_writable()?;

        let now = match timestamps {
            TimestampSource::Event => event.source_timestamp,
            TimestampSource::Store => Utc::now(),
        };
        let author = payload.author.id.to_lowercase();
        let tag_ids = payload.tag_ids();
        let category_ids = payload.category_ids();

        let tx = self.conn.transaction().await.map_err(storage_err)?;

        ensure_lookups(&tx, payload, &author, &now).await?;

        let existing = existing_row(&tx, &payload.id).await?;
        let kind = if existing.is_some() {
            AuditKind::Updated
        } else {
            AuditKind::Created
        };
        let created_at = existing.as_ref().map_or(now, |e| e.created_at);

        let images_json = serde_json::to_string(&payload.images).map_err(storage_err)?;
        let metadata_json = serde_json::to_string(&payload.metadata).map_err(storage_err)?;
        let block = i64::try_from(event.source_block).map_err(storage_err)?;

        match &existing {
            Some(prev) => {
                if prev.content != payload.content && has_subscribers(&tx, &payload.id).await? {
                    tx.execute(
                        "INSERT INTO pending_notifications (id, revision_id, content_id, created_at)
                         VALUES (?1, ?2, ?3, ?4)",
                        params![
                            Uuid::now_v7().to_string(),
                            payload.id.as_str(),
                            event.content_id.as_str(),
                            format_ts(now)
                        ],
                    )
                    .await
                    .map_err(storage_err)?;
                    debug!("queued edit notification");
                }

                tx.execute(
                    "UPDATE revisions SET
                       content_id = ?2, title = ?3, content = ?4, summary = ?5,
                       language_id = ?6, author_id = ?7, images_json = ?8, metadata_json = ?9,
                       source_block = ?10, transaction_hash = ?11, updated_at = ?12
                     WHERE id = ?1",
                    params![
                        payload.id.as_str(),
                        event.content_id.as_str(),
                        payload.title.as_str(),
                        payload.content.as_str(),
                        payload.summary.as_deref(),
                        payload.language.as_str(),
                        author.as_str(),
                        images_json.as_str(),
                        metadata_json.as_str(),
                        block,
                        event.transaction_hash.as_str(),
                        format_ts(now)
                    ],
                )
                .await
                .map_err(storage_err)?;
            }
            None => {
                tx.execute(
                    "INSERT INTO revisions (id, content_id, title, content, summary, language_id,
                        author_id, images_json, metadata_json, source_block, transaction_hash,
                        hidden, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 0, ?12, ?12)",
                    params![
                        payload.id.as_str(),
                        event.content_id.as_str(),
                        payload.title.as_str(),
                        payload.content.as_str(),
                        payload.summary.as_deref(),
                        payload.language.as_str(),
                        author.as_str(),
                        images_json.as_str(),
                        metadata_json.as_str(),
                        block,
                        event.transaction_hash.as_str(),
                        format_ts(now)
                    ],
                )
                .await
                .map_err(storage_err)?;
            }
        }

        replace_links(&tx, "revision_tags", "tag_id", &payload.id, &tag_ids).await?;
        replace_links(
            &tx,
            "revision_categories",
            "category_id",
            &payload.id,
            &category_ids,
        )
        .await?;

        let revision = PersistedRevision {
            id: payload.id.clone(),
            content_id: event.content_id.clone(),
            title: payload.title.clone(),
            content: payload.content.clone(),
            summary: payload.summary.clone(),
            language: payload.language.clone(),
            author,
            tags: tag_ids,
            categories: category_ids,
            images: payload.images.clone(),
            metadata: payload.metadata.clone(),
            source_block: event.source_block,
            transaction_hash: event.transaction_hash.clone(),
            hidden: existing.as_ref().is_some_and(|e| e.hidden),
            created_at,
            updated_at: now,
        };

        let snapshot = serde_json::to_string(&revision).map_err(storage_err)?;
        let inserted = tx
            .execute(
                "INSERT INTO audit_log (id, revision_id, content_id, kind, snapshot_json, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(content_id) DO NOTHING",
                params![
                    Uuid::now_v7().to_string(),
                    payload.id.as_str(),
                    event.content_id.as_str(),
                    kind.as_str(),
                    snapshot,
                    format_ts(now)
                ],
            )
            .await
            .map_err(storage_err)?;

        if inserted == 0 {
            tx.rollback().await.map_err(storage_err)?;
            info!("content id already indexed; upsert rolled back");
            return Ok(UpsertOutcome::AlreadyIndexed);
        }

        tx.commit().await.map_err(storage_err)?;
        info!(kind = kind.as_str(), "revision stored");

        Ok(match kind {
            AuditKind::Created => UpsertOutcome::Created(revision),
            AuditKind::Updated => UpsertOutcome::Updated(revision),
        })
    }

    /// Set the visibility flag. Returns `false` when the revision is unknown.
    pub async fn hide_revision(&self, id: &str, hidden: bool) -> Result<bool> {
        self.check_writable()?;
        let changed = self
            .conn
            .execute(
                "UPDATE revisions SET hidden = ?2 WHERE id = ?1",
                params![id, i64::from(hidden)],
            )
            .await
            .map_err(storage_err)?;
        Ok(changed > 0)
    }

    // -----------------------------------------------------------------------
    // Audit log
    // -----------------------------------------------------------------------

    /// Audit trail for a revision, oldest first.
    pub async fn audit_records(&self, revision_id: &str) -> Result<Vec<AuditRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, revision_id, content_id, kind, snapshot_json, created_at
                 FROM audit_log WHERE revision_id = ?1 ORDER BY created_at, id",
                params![revision_id],
            )
            .await
            .map_err(storage_err)?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            let kind: String = row.get(3).map_err(storage_err)?;
            let snapshot: String = row.get(4).map_err(storage_err)?;
            records.push(AuditRecord {
                id: row.get(0).map_err(storage_err)?,
                revision_id: row.get(1).map_err(storage_err)?,
                content_id: row.get(2).map_err(storage_err)?,
                kind: kind.parse().map_err(storage_err)?,
                snapshot: serde_json::from_str(&snapshot).map_err(storage_err)?,
                created_at: parse_ts(&row.get::<String>(5).map_err(storage_err)?)?,
            });
        }
        Ok(records)
    }

    // -----------------------------------------------------------------------
    // Subscriptions and notifications
    // -----------------------------------------------------------------------

    /// Follow edits of a revision. Subscribing twice is a no-op.
    pub async fn add_subscription(&self, revision_id: &str, subscriber: &str) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "INSERT INTO subscriptions (id, revision_id, subscriber, created_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(revision_id, subscriber) DO NOTHING",
                params![
                    Uuid::now_v7().to_string(),
                    revision_id,
                    subscriber,
                    format_ts(Utc::now())
                ],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    pub async fn pending_notifications(&self) -> Result<Vec<PendingNotification>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, revision_id, content_id, created_at
                 FROM pending_notifications ORDER BY created_at, id",
                params![],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(PendingNotification {
                id: row.get(0).map_err(storage_err)?,
                revision_id: row.get(1).map_err(storage_err)?,
                content_id: row.get(2).map_err(storage_err)?,
                created_at: parse_ts(&row.get::<String>(3).map_err(storage_err)?)?,
            });
        }
        Ok(results)
    }
}

// ---------------------------------------------------------------------------
// Transaction helpers
// ---------------------------------------------------------------------------

/// Fields of an existing row the upsert needs to preserve or compare.
struct ExistingRow {
    content: String,
    hidden: bool,
    created_at: DateTime<Utc>,
}

async fn existing_row(conn: &Connection, id: &str) -> Result<Option<ExistingRow>> {
    let mut rows = conn
        .query(
            "SELECT content, hidden, created_at FROM revisions WHERE id = ?1",
            params![id],
        )
        .await
        .map_err(storage_err)?;

    match rows.next().await.map_err(storage_err)? {
        Some(row) => Ok(Some(ExistingRow {
            content: row.get(0).map_err(storage_err)?,
            hidden: row.get::<i64>(1).map_err(storage_err)? != 0,
            created_at: parse_ts(&row.get::<String>(2).map_err(storage_err)?)?,
        })),
        None => Ok(None),
    }
}

/// Get-or-create the author, language, tag and category rows.
async fn ensure_lookups(
    conn: &Connection,
    payload: &DocumentPayload,
    author: &str,
    now: &DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO authors (id, created_at) VALUES (?1, ?2) ON CONFLICT(id) DO NOTHING",
        params![author, format_ts(*now)],
    )
    .await
    .map_err(storage_err)?;

    conn.execute(
        "INSERT INTO languages (id) VALUES (?1) ON CONFLICT(id) DO NOTHING",
        params![payload.language.as_str()],
    )
    .await
    .map_err(storage_err)?;

    for tag in &payload.tags {
        conn.execute(
            "INSERT INTO tags (id) VALUES (?1) ON CONFLICT(id) DO NOTHING",
            params![tag.id.as_str()],
        )
        .await
        .map_err(storage_err)?;
    }

    for category in &payload.categories {
        conn.execute(
            "INSERT INTO categories (id, title) VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE SET title = COALESCE(excluded.title, categories.title)",
            params![category.id.as_str(), category.title.as_deref()],
        )
        .await
        .map_err(storage_err)?;
    }
    Ok(())
}

async fn has_subscribers(conn: &Connection, revision_id: &str) -> Result<bool> {
    let mut rows = conn
        .query(
            "SELECT 1 FROM subscriptions WHERE revision_id = ?1 LIMIT 1",
            params![revision_id],
        )
        .await
        .map_err(storage_err)?;
    Ok(rows.next().await.map_err(storage_err)?.is_some())
}

/// Replace a revision's rows in a join table, keeping payload order.
async fn replace_links(
    conn: &Connection,
    table: &str,
    column: &str,
    revision_id: &str,
    ids: &[String],
) -> Result<()> {
    conn.execute(
        &format!("DELETE FROM {table} WHERE revision_id = ?1"),
        params![revision_id],
    )
    .await
    .map_err(storage_err)?;

    let insert = format!(
        "INSERT INTO {table} (revision_id, {column}, position) VALUES (?1, ?2, ?3)
         ON CONFLICT DO NOTHING"
    );
    for (position, id) in ids.iter().enumerate() {
        conn.execute(&insert, params![revision_id, id.as_str(), position as i64])
            .await
            .map_err(storage_err)?;
    }
    Ok(())
}

async fn linked_ids(
    conn: &Connection,
    table: &str,
    column: &str,
    revision_id: &str,
) -> Result<Vec<String>> {
    let mut rows = conn
        .query(
            &format!("SELECT {column} FROM {table} WHERE revision_id = ?1 ORDER BY position"),
            params![revision_id],
        )
        .await
        .map_err(storage_err)?;

    let mut ids = Vec::new();
    while let Some(row) = rows.next().await.map_err(storage_err)? {
        ids.push(row.get::<String>(0).map_err(storage_err)?);
    }
    Ok(ids)
}

/// Map a `revisions` row; tags and categories are filled in by the caller.
fn row_to_revision(row: &Row) -> Result<PersistedRevision> {
    let images_json: String = row.get(7).map_err(storage_err)?;
    let metadata_json: String = row.get(8).map_err(storage_err)?;
    let block: i64 = row.get(9).map_err(storage_err)?;

    Ok(PersistedRevision {
        id: row.get(0).map_err(storage_err)?,
        content_id: row.get(1).map_err(storage_err)?,
        title: row.get(2).map_err(storage_err)?,
        content: row.get(3).map_err(storage_err)?,
        summary: row.get(4).map_err(storage_err)?,
        language: row.get(5).map_err(storage_err)?,
        author: row.get(6).map_err(storage_err)?,
        tags: Vec::new(),
        categories: Vec::new(),
        images: serde_json::from_str(&images_json).map_err(storage_err)?,
        metadata: serde_json::from_str(&metadata_json).map_err(storage_err)?,
        source_block: u64::try_from(block).map_err(storage_err)?,
        transaction_hash: row.get(10).map_err(storage_err)?,
        hidden: row.get::<i64>(11).map_err(storage_err)? != 0,
        created_at: parse_ts(&row.get::<String>(12).map_err(storage_err)?)?,
        updated_at: parse_ts(&row.get::<String>(13).map_err(storage_err)?)?,
    })
}

//! Core domain types for the revision ingestion pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Well-known metadata keys written or read by the pipeline.
pub mod meta_keys {
    /// Words inserted plus words deleted relative to the stored revision.
    pub const WORDS_CHANGED: &str = "words-changed";
    /// Character-level change ratio, two decimals.
    pub const PERCENT_CHANGED: &str = "percent-changed";
    /// Comma-separated names of the top-level fields that differ.
    pub const BLOCKS_CHANGED: &str = "blocks-changed";
    /// Derived 0-100 completeness score.
    pub const QUALITY_SCORE: &str = "quality-score";
    /// Serialized citation list; exempt from the value length limit.
    pub const REFERENCES: &str = "references";
}

// ---------------------------------------------------------------------------
// RevisionEvent
// ---------------------------------------------------------------------------

/// A normalized "document edited" event produced by an event source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionEvent {
    /// Content-address of the payload in the storage gateway.
    pub content_id: String,
    /// Block height the edit was recorded in.
    pub source_block: u64,
    /// Timestamp of that block.
    pub source_timestamp: DateTime<Utc>,
    /// Hash of the transaction carrying the edit.
    pub transaction_hash: String,
    /// Address that signed the transaction.
    pub author_address: String,
}

// ---------------------------------------------------------------------------
// DocumentPayload
// ---------------------------------------------------------------------------

/// A reference carrying only an identifier (`{ "id": "..." }`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdRef {
    pub id: String,
}

/// A category reference; the title is optional in payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRef {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// An image attached to a document, addressed by content id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub id: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// One metadata key/value pair. Order is preserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaEntry {
    pub id: String,
    pub value: String,
}

/// The document fetched from the content gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPayload {
    /// Stable slug; identifies the revision across edits.
    pub id: String,
    pub title: String,
    /// Markdown body text.
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default)]
    pub tags: Vec<IdRef>,
    #[serde(default)]
    pub categories: Vec<CategoryRef>,
    #[serde(default)]
    pub metadata: Vec<MetaEntry>,
    #[serde(default)]
    pub images: Vec<ImageRef>,
    /// Language code, e.g. `en`.
    pub language: String,
    /// Address of the declared author.
    #[serde(alias = "user")]
    pub author: IdRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<DateTime<Utc>>,
}

impl DocumentPayload {
    /// Value of a metadata entry, if present.
    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata
            .iter()
            .find(|m| m.id == key)
            .map(|m| m.value.as_str())
    }

    /// Insert or replace a metadata entry.
    pub fn set_meta(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.metadata.iter_mut().find(|m| m.id == key) {
            Some(entry) => entry.value = value,
            None => self.metadata.push(MetaEntry {
                id: key.to_string(),
                value,
            }),
        }
    }

    pub fn tag_ids(&self) -> Vec<String> {
        self.tags.iter().map(|t| t.id.clone()).collect()
    }

    pub fn category_ids(&self) -> Vec<String> {
        self.categories.iter().map(|c| c.id.clone()).collect()
    }

    /// The first image, used as the document's cover.
    pub fn primary_image(&self) -> Option<&str> {
        self.images.first().map(|i| i.id.as_str())
    }
}

// ---------------------------------------------------------------------------
// ChangeMetrics
// ---------------------------------------------------------------------------

/// Diff and quality metrics computed for an incoming payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeMetrics {
    pub words_changed: u64,
    /// Rounded to two decimals.
    pub percent_changed: f64,
    /// Names of the top-level fields whose value differs.
    pub blocks_changed: Vec<String>,
    /// 0 to 100 inclusive.
    pub quality_score: u8,
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Outcome code of the validator rule chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidatorCode {
    Valid,
    Id,
    Language,
    Words,
    Category,
    User,
    Image,
    Summary,
    Url,
    Metadata,
}

impl ValidatorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Valid => "VALID",
            Self::Id => "ID",
            Self::Language => "LANGUAGE",
            Self::Words => "WORDS",
            Self::Category => "CATEGORY",
            Self::User => "USER",
            Self::Image => "IMAGE",
            Self::Summary => "SUMMARY",
            Self::Url => "URL",
            Self::Metadata => "METADATA",
        }
    }
}

impl std::fmt::Display for ValidatorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of running the validator over a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationVerdict {
    pub status: bool,
    pub code: ValidatorCode,
}

impl ValidationVerdict {
    pub fn valid() -> Self {
        Self {
            status: true,
            code: ValidatorCode::Valid,
        }
    }

    pub fn rejected(code: ValidatorCode) -> Self {
        Self {
            status: false,
            code,
        }
    }
}

/// Where a payload entered the system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    /// Emitted on chain; the signer must match the declared author.
    Chain { signer: String },
    /// Direct write by an already-authenticated caller.
    Authenticated,
}

/// Which clock stamps `created_at`/`updated_at` on persisted revisions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimestampSource {
    /// Block time of the originating event.
    Event,
    /// Wall clock at persistence time.
    #[default]
    Store,
}

// ---------------------------------------------------------------------------
// PersistedRevision / AuditRecord
// ---------------------------------------------------------------------------

/// The durable record of a document, mutated in place on edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedRevision {
    pub id: String,
    /// Content id of the most recently accepted payload.
    pub content_id: String,
    pub title: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub language: String,
    pub author: String,
    pub tags: Vec<String>,
    pub categories: Vec<String>,
    pub images: Vec<ImageRef>,
    pub metadata: Vec<MetaEntry>,
    pub source_block: u64,
    pub transaction_hash: String,
    pub hidden: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PersistedRevision {
    pub fn primary_image(&self) -> Option<&str> {
        self.images.first().map(|i| i.id.as_str())
    }
}

/// Kind of change captured by an audit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditKind {
    Created,
    Updated,
}

impl AuditKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Updated => "UPDATED",
        }
    }
}

impl std::str::FromStr for AuditKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "CREATED" => Ok(Self::Created),
            "UPDATED" => Ok(Self::Updated),
            other => Err(format!("unknown audit kind '{other}'")),
        }
    }
}

/// Append-only snapshot of a revision at the moment an edit was accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: String,
    pub revision_id: String,
    pub content_id: String,
    pub kind: AuditKind,
    pub snapshot: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAYLOAD_JSON: &str = r#"{
        "id": "ethereum",
        "title": "Ethereum",
        "content": "Ethereum is a decentralized platform.",
        "summary": "A smart contract platform",
        "tags": [{ "id": "Blockchains" }],
        "categories": [{ "id": "cryptocurrencies", "title": "Cryptocurrencies" }],
        "metadata": [{ "id": "twitter_profile", "value": "https://twitter.com/ethereum" }],
        "images": [{ "id": "QmImage", "type": "image/png" }],
        "language": "en",
        "user": { "id": "0xAbC" }
    }"#;

    #[test]
    fn payload_deserializes_gateway_shape() {
        let payload: DocumentPayload = serde_json::from_str(PAYLOAD_JSON).expect("parse");
        assert_eq!(payload.id, "ethereum");
        assert_eq!(payload.author.id, "0xAbC");
        assert_eq!(payload.tag_ids(), vec!["Blockchains".to_string()]);
        assert_eq!(payload.category_ids(), vec!["cryptocurrencies".to_string()]);
        assert_eq!(payload.primary_image(), Some("QmImage"));
        assert!(payload.created.is_none());
    }

    #[test]
    fn set_meta_replaces_existing_entry() {
        let mut payload: DocumentPayload = serde_json::from_str(PAYLOAD_JSON).expect("parse");
        payload.set_meta(meta_keys::WORDS_CHANGED, "12");
        payload.set_meta(meta_keys::WORDS_CHANGED, "15");
        assert_eq!(payload.meta(meta_keys::WORDS_CHANGED), Some("15"));
        assert_eq!(
            payload
                .metadata
                .iter()
                .filter(|m| m.id == meta_keys::WORDS_CHANGED)
                .count(),
            1
        );
    }

    #[test]
    fn validator_code_serializes_upper() {
        let json = serde_json::to_string(&ValidatorCode::Metadata).expect("serialize");
        assert_eq!(json, "\"METADATA\"");
        assert_eq!(ValidatorCode::Id.to_string(), "ID");
    }

    #[test]
    fn audit_kind_parses() {
        assert_eq!("CREATED".parse::<AuditKind>(), Ok(AuditKind::Created));
        assert!("DELETED".parse::<AuditKind>().is_err());
    }
}

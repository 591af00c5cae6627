//! Change analysis for incoming document payloads.
//!
//! This crate provides:
//! - [`diff`]: character-level diff and change statistics
//! - [`markdown`]: link and embed extraction from markdown bodies
//! - [`score`]: the 0-100 quality score
//! - [`ChangeAnalyzer`]: metrics against the stored revision, attached as metadata

pub mod changes;
pub mod diff;
pub mod markdown;
pub mod score;

pub use changes::ChangeAnalyzer;
pub use diff::{ChangeKind, DiffSpan, DiffStats, diff_chars, diff_stats};
pub use markdown::{MarkdownLink, extract_links};
pub use score::{ScoreSignals, quality_score};

/// Count whitespace-delimited words.
pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

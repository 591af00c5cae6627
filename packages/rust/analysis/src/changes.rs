use tracing::debug;

use revindex_shared::{ChangeMetrics, DocumentPayload, PersistedRevision, ScoringConfig, meta_keys};

use crate::diff::diff_stats;
use crate::score::quality_score;

/// Computes [`ChangeMetrics`] for an incoming payload and attaches them as
/// metadata.
#[derive(Debug, Clone, Default)]
pub struct ChangeAnalyzer {
    scoring: ScoringConfig,
}

impl ChangeAnalyzer {
    pub fn new(scoring: ScoringConfig) -> Self {
        Self { scoring }
    }

    /// Metrics against the stored revision; zeroed change counts when there
    /// is none.
    pub fn analyze(
        &self,
        payload: &DocumentPayload,
        previous: Option<&PersistedRevision>,
    ) -> ChangeMetrics {
        let quality_score = quality_score(payload, &self.scoring);

        let Some(previous) = previous else {
            return ChangeMetrics {
                quality_score,
                ..ChangeMetrics::default()
            };
        };

        let stats = diff_stats(&previous.content, &payload.content);
        let metrics = ChangeMetrics {
            words_changed: stats.words_changed(),
            percent_changed: stats.percent_changed(),
            blocks_changed: blocks_changed(payload, previous),
            quality_score,
        };

        debug!(
            id = %payload.id,
            words_changed = metrics.words_changed,
            percent_changed = metrics.percent_changed,
            blocks = ?metrics.blocks_changed,
            "analyzed changes"
        );
        metrics
    }

    /// Write the metrics into the payload's metadata, replacing stale entries.
    pub fn annotate(&self, payload: &mut DocumentPayload, metrics: &ChangeMetrics) {
        payload.set_meta(meta_keys::WORDS_CHANGED, metrics.words_changed.to_string());
        payload.set_meta(
            meta_keys::PERCENT_CHANGED,
            format!("{:.2}", metrics.percent_changed),
        );
        payload.set_meta(meta_keys::BLOCKS_CHANGED, metrics.blocks_changed.join(","));
        payload.set_meta(meta_keys::QUALITY_SCORE, metrics.quality_score.to_string());
    }

    /// [`analyze`](Self::analyze) then [`annotate`](Self::annotate).
    pub fn process(
        &self,
        mut payload: DocumentPayload,
        previous: Option<&PersistedRevision>,
    ) -> (DocumentPayload, ChangeMetrics) {
        let metrics = self.analyze(&payload, previous);
        self.annotate(&mut payload, &metrics);
        (payload, metrics)
    }
}

/// Names of the top-level fields that differ from the stored revision.
fn blocks_changed(payload: &DocumentPayload, previous: &PersistedRevision) -> Vec<String> {
    let sorted = |mut ids: Vec<String>| {
        ids.sort();
        ids
    };

    let checks = [
        ("content", payload.content != previous.content),
        ("title", payload.title != previous.title),
        (
            "categories",
            sorted(payload.category_ids()) != sorted(previous.categories.clone()),
        ),
        (
            "tags",
            sorted(payload.tag_ids()) != sorted(previous.tags.clone()),
        ),
        ("summary", payload.summary != previous.summary),
        ("image", payload.primary_image() != previous.primary_image()),
    ];

    checks
        .into_iter()
        .filter(|(_, changed)| *changed)
        .map(|(name, _)| name.to_string())
        .collect()
}

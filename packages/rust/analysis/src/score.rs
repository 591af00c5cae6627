//! Quality score: a weighted average of seven closeness-to-ideal sub-scores.

use revindex_shared::{DocumentPayload, ScoringConfig};

use crate::count_words;
use crate::markdown::extract_links;

const WORDS_WEIGHT: f64 = 0.8;
const INTERNAL_LINKS_WEIGHT: f64 = 0.5;
const CITATIONS_WEIGHT: f64 = 0.5;
const MEDIA_WEIGHT: f64 = 0.3;
const TAGS_WEIGHT: f64 = 0.3;
const SUMMARY_WEIGHT: f64 = 0.5;
const SOCIALS_WEIGHT: f64 = 0.5;

/// Raw counts the score is computed from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScoreSignals {
    pub words: usize,
    pub internal_links: usize,
    pub citations: usize,
    /// Attached images plus image embeds in the body.
    pub media: usize,
    pub tags: usize,
    pub summary_chars: usize,
    /// Social-profile metadata entries with a non-empty value.
    pub socials: usize,
}

impl ScoreSignals {
    pub fn from_payload(payload: &DocumentPayload, config: &ScoringConfig) -> Self {
        let links = extract_links(&payload.content);

        let internal_links = links
            .iter()
            .filter(|l| !l.is_image && l.target.starts_with(&config.internal_link_prefix))
            .count();
        let citations = links.iter().filter(|l| l.is_citation()).count();
        let embeds = links.iter().filter(|l| l.is_image).count();

        let socials = payload
            .metadata
            .iter()
            .filter(|m| !m.value.trim().is_empty() && config.social_keys.iter().any(|k| *k == m.id))
            .count();

        Self {
            words: count_words(&payload.content),
            internal_links,
            citations,
            media: payload.images.len() + embeds,
            tags: payload.tags.len(),
            summary_chars: payload
                .summary
                .as_deref()
                .map_or(0, |s| s.trim().chars().count()),
            socials,
        }
    }

    /// Score in `0..=100`.
    pub fn score(&self, config: &ScoringConfig) -> u8 {
        let parts = [
            (closeness(self.words, config.ideal_words), WORDS_WEIGHT),
            (
                closeness(self.internal_links, config.ideal_internal_links),
                INTERNAL_LINKS_WEIGHT,
            ),
            (closeness(self.citations, config.ideal_citations), CITATIONS_WEIGHT),
            (closeness(self.media, config.ideal_media), MEDIA_WEIGHT),
            (closeness(self.tags, config.ideal_tags), TAGS_WEIGHT),
            (
                closeness(self.summary_chars, config.ideal_summary_chars),
                SUMMARY_WEIGHT,
            ),
            (closeness(self.socials, config.ideal_socials), SOCIALS_WEIGHT),
        ];

        let total_weight: f64 = parts.iter().map(|(_, w)| w).sum();
        let weighted: f64 = parts.iter().map(|(s, w)| s * w).sum();
        let average = weighted / total_weight;

        (average * 100.0).floor().clamp(0.0, 100.0) as u8
    }
}

/// `min(count / ideal, 1.0)`; a zero ideal is always met.
fn closeness(count: usize, ideal: usize) -> f64 {
    if ideal == 0 {
        return 1.0;
    }
    (count as f64 / ideal as f64).min(1.0)
}

/// Compute the quality score for a payload.
pub fn quality_score(payload: &DocumentPayload, config: &ScoringConfig) -> u8 {
    ScoreSignals::from_payload(payload, config).score(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use revindex_shared::{IdRef, ImageRef, MetaEntry};

    fn payload(content: String) -> DocumentPayload {
        serde_json::from_value(serde_json::json!({
            "id": "bitcoin",
            "title": "Bitcoin",
            "content": content,
            "language": "en",
            "author": { "id": "0xabc" }
        }))
        .unwrap()
    }

    #[test]
    fn empty_payload_scores_zero() {
        let config = ScoringConfig::default();
        assert_eq!(quality_score(&payload(String::new()), &config), 0);
    }

    #[test]
    fn saturated_payload_scores_hundred() {
        let config = ScoringConfig::default();
        let mut body = "word ".repeat(900);
        for i in 0..10 {
            body.push_str(&format!(" [Page {i}](https://iq.wiki/wiki/page-{i})"));
            body.push_str(&format!(" [[{i}]](#cite-id-{i})"));
        }
        let mut p = payload(body);
        p.images = (0..5)
            .map(|i| ImageRef {
                id: format!("img{i}"),
                mime_type: None,
            })
            .collect();
        p.tags = ["a", "b", "c"].iter().map(|t| IdRef { id: t.to_string() }).collect();
        p.summary = Some("s".repeat(120));
        p.metadata = config
            .social_keys
            .iter()
            .take(4)
            .map(|k| MetaEntry {
                id: k.clone(),
                value: "https://example.com/me".into(),
            })
            .collect();

        assert_eq!(quality_score(&p, &config), 100);
    }

    #[test]
    fn partial_signals_land_in_between() {
        let config = ScoringConfig::default();
        // Only words at half the ideal: 0.5 * 0.8 / 3.4 = 0.1176...
        let p = payload("word ".repeat(400));
        assert_eq!(quality_score(&p, &config), 11);
    }

    #[test]
    fn counts_signals() {
        let config = ScoringConfig::default();
        let mut p = payload(
            "Intro [BTC](https://iq.wiki/wiki/bitcoin) [ext](https://example.com) \
             ![chart](https://x.io/c.png)[[1]](#cite-id-a)"
                .into(),
        );
        p.metadata = vec![
            MetaEntry {
                id: config.social_keys[0].clone(),
                value: "https://twitter.com/x".into(),
            },
            MetaEntry {
                id: "references".into(),
                value: "[]".into(),
            },
        ];

        let signals = ScoreSignals::from_payload(&p, &config);
        assert_eq!(signals.internal_links, 1);
        assert_eq!(signals.citations, 1);
        assert_eq!(signals.media, 1);
        assert_eq!(signals.socials, 1);
    }

    #[test]
    fn zero_ideal_counts_as_met() {
        assert_eq!(closeness(0, 0), 1.0);
        assert_eq!(closeness(30, 10), 1.0);
        assert_eq!(closeness(5, 10), 0.5);
    }
}

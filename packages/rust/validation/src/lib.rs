//! Payload validation.
//!
//! [`ContentValidator`] runs an ordered rule chain over an annotated payload;
//! the first failing rule decides the [`ValidatorCode`].

pub mod slug;

use tracing::debug;
use url::Url;

use revindex_analysis::diff::{diff_stats, round2};
use revindex_analysis::{count_words, extract_links};
use revindex_shared::{
    DocumentPayload, Origin, PersistedRevision, ValidationConfig, ValidationVerdict,
    ValidatorCode, meta_keys,
};

pub use slug::{is_normalized_slug, normalize_slug};

/// Ordered rule chain over incoming payloads.
#[derive(Debug, Clone, Default)]
pub struct ContentValidator {
    config: ValidationConfig,
}

impl ContentValidator {
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// Validate `payload`; `previous` is the currently stored revision, if any.
    pub fn validate(
        &self,
        payload: &DocumentPayload,
        origin: &Origin,
        previous: Option<&PersistedRevision>,
    ) -> ValidationVerdict {
        match self.first_failure(payload, origin, previous) {
            None => ValidationVerdict::valid(),
            Some(code) => {
                debug!(id = %payload.id, code = %code, "payload rejected");
                ValidationVerdict::rejected(code)
            }
        }
    }

    fn first_failure(
        &self,
        payload: &DocumentPayload,
        origin: &Origin,
        previous: Option<&PersistedRevision>,
    ) -> Option<ValidatorCode> {
        let cfg = &self.config;

        if !is_normalized_slug(&payload.id) {
            return Some(ValidatorCode::Id);
        }
        if !cfg.languages.iter().any(|l| *l == payload.language) {
            return Some(ValidatorCode::Language);
        }
        if count_words(&payload.content) < cfg.min_words {
            return Some(ValidatorCode::Words);
        }
        if payload.categories.len() != 1 {
            return Some(ValidatorCode::Category);
        }
        if !check_user(payload, origin) {
            return Some(ValidatorCode::User);
        }
        if !(cfg.min_images..=cfg.max_images).contains(&payload.images.len()) {
            return Some(ValidatorCode::Image);
        }
        if !self.check_summary(payload) {
            return Some(ValidatorCode::Summary);
        }
        if !self.check_links(payload) {
            return Some(ValidatorCode::Url);
        }
        if !self.check_metadata(payload, previous) {
            return Some(ValidatorCode::Metadata);
        }
        None
    }

    fn check_summary(&self, payload: &DocumentPayload) -> bool {
        payload
            .summary
            .as_deref()
            .is_none_or(|s| s.chars().count() <= self.config.max_summary_chars)
    }

    /// Every link target is an in-page anchor or on an allowed host.
    fn check_links(&self, payload: &DocumentPayload) -> bool {
        extract_links(&payload.content)
            .iter()
            .all(|link| link.target.starts_with('#') || self.is_allowed_url(&link.target))
    }

    fn is_allowed_url(&self, target: &str) -> bool {
        let Ok(url) = Url::parse(target) else {
            return false;
        };
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();
        self.config.allowed_domains.iter().any(|domain| {
            host == *domain
                || host
                    .strip_suffix(domain.as_str())
                    .is_some_and(|rest| rest.ends_with('.'))
        })
    }

    fn check_metadata(&self, payload: &DocumentPayload, previous: Option<&PersistedRevision>) -> bool {
        let lengths_ok = payload
            .metadata
            .iter()
            .filter(|m| m.id != meta_keys::REFERENCES)
            .all(|m| m.value.chars().count() < self.config.max_metadata_len);
        if !lengths_ok {
            return false;
        }

        match previous {
            Some(prev) if prev.content != payload.content => declared_changes_match(payload, prev),
            _ => true,
        }
    }
}

fn check_user(payload: &DocumentPayload, origin: &Origin) -> bool {
    match origin {
        Origin::Chain { signer } => payload.author.id.eq_ignore_ascii_case(signer),
        Origin::Authenticated => true,
    }
}

/// Declared `words-changed`/`percent-changed` equal a fresh diff.
fn declared_changes_match(payload: &DocumentPayload, previous: &PersistedRevision) -> bool {
    let stats = diff_stats(&previous.content, &payload.content);

    let words_ok = payload
        .meta(meta_keys::WORDS_CHANGED)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .is_some_and(|declared| declared == stats.words_changed());

    let percent_ok = payload
        .meta(meta_keys::PERCENT_CHANGED)
        .and_then(|v| v.trim().parse::<f64>().ok())
        .is_some_and(|declared| round2(declared) == stats.percent_changed());

    words_ok && percent_ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use revindex_analysis::ChangeAnalyzer;
    use revindex_shared::{CategoryRef, IdRef, ImageRef, MetaEntry};

    const SIGNER: &str = "0x9fead8b19c044c2f404dac38b925ea16adaa2954";

    fn good_payload() -> DocumentPayload {
        DocumentPayload {
            id: "bitcoin".into(),
            title: "Bitcoin".into(),
            content: "word ".repeat(200),
            summary: Some("s".repeat(50)),
            tags: vec![IdRef { id: "Crypto".into() }],
            categories: vec![CategoryRef {
                id: "cryptocurrencies".into(),
                title: None,
            }],
            metadata: vec![],
            images: vec![
                ImageRef {
                    id: "QmA".into(),
                    mime_type: None,
                },
                ImageRef {
                    id: "QmB".into(),
                    mime_type: None,
                },
            ],
            language: "en".into(),
            author: IdRef {
                id: "0x9FEAD8B19C044C2F404DAC38B925EA16ADAA2954".into(),
            },
            created: None,
            updated: None,
        }
    }

    fn chain() -> Origin {
        Origin::Chain {
            signer: SIGNER.into(),
        }
    }

    fn code(payload: &DocumentPayload) -> ValidatorCode {
        ContentValidator::default().validate(payload, &chain(), None).code
    }

    fn stored(from: &DocumentPayload) -> PersistedRevision {
        PersistedRevision {
            id: from.id.clone(),
            content_id: "QmOld".into(),
            title: from.title.clone(),
            content: from.content.clone(),
            summary: from.summary.clone(),
            language: from.language.clone(),
            author: from.author.id.to_lowercase(),
            tags: from.tag_ids(),
            categories: from.category_ids(),
            images: from.images.clone(),
            metadata: vec![],
            source_block: 1,
            transaction_hash: "0x01".into(),
            hidden: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn accepts_well_formed_payload() {
        let verdict = ContentValidator::default().validate(&good_payload(), &chain(), None);
        assert!(verdict.status);
        assert_eq!(verdict.code, ValidatorCode::Valid);
    }

    #[test]
    fn short_body_is_rejected_for_words() {
        let mut p = good_payload();
        p.content = "word ".repeat(50);
        let verdict = ContentValidator::default().validate(&p, &chain(), None);
        assert!(!verdict.status);
        assert_eq!(verdict.code, ValidatorCode::Words);
    }

    #[test]
    fn link_hosts_must_be_allowed() {
        let mut p = good_payload();
        p.content.push_str(" [scam](https://evil.example.com/x)");
        assert_eq!(code(&p), ValidatorCode::Url);

        let mut p = good_payload();
        p.content.push_str(
            " [wiki](https://iq.wiki/wiki/ethereum) [en](https://en.wikipedia.org/wiki/Bitcoin) \
             [[1]](#cite-id-abc) [top](#history)",
        );
        assert_eq!(code(&p), ValidatorCode::Valid);
    }

    #[test]
    fn every_link_form_is_checked() {
        let suffixes = [
            " [[[scam]]](https://evil.com)",
            " [scam][1]\n\n[1]: https://evil.com",
            " <https://evil.com>",
            " ![pic](https://evil.com/a.png)",
        ];
        for suffix in suffixes {
            let mut p = good_payload();
            p.content.push_str(suffix);
            assert_eq!(code(&p), ValidatorCode::Url, "accepted {suffix:?}");
        }

        let mut p = good_payload();
        p.content
            .push_str(" [wiki][w] <https://iq.wiki/wiki/bitcoin>\n\n[w]: https://iq.wiki/wiki/ethereum");
        assert_eq!(code(&p), ValidatorCode::Valid);
    }

    #[test]
    fn lookalike_domain_is_rejected() {
        let mut p = good_payload();
        p.content.push_str(" [x](https://notiq.wiki/wiki/a)");
        assert_eq!(code(&p), ValidatorCode::Url);
    }

    #[test]
    fn invalid_id_short_circuits_everything() {
        // Fails every rule; only the first is reported.
        let mut p = good_payload();
        p.id = "Not A Slug".into();
        p.language = "xx".into();
        p.content = "short [x](https://evil.com)".into();
        p.categories.clear();
        p.images.clear();
        p.summary = Some("s".repeat(500));
        assert_eq!(code(&p), ValidatorCode::Id);
    }

    #[test]
    fn rules_apply_in_order() {
        let mut p = good_payload();
        p.language = "fr".into();
        p.categories.clear();
        assert_eq!(code(&p), ValidatorCode::Language);

        let mut p = good_payload();
        p.categories.push(CategoryRef {
            id: "defi".into(),
            title: None,
        });
        assert_eq!(code(&p), ValidatorCode::Category);

        let mut p = good_payload();
        p.images.clear();
        assert_eq!(code(&p), ValidatorCode::Image);

        let mut p = good_payload();
        p.summary = Some("s".repeat(129));
        assert_eq!(code(&p), ValidatorCode::Summary);
    }

    #[test]
    fn signer_must_match_author_unless_authenticated() {
        let p = good_payload();
        let other = Origin::Chain {
            signer: "0x0000000000000000000000000000000000000001".into(),
        };
        let validator = ContentValidator::default();

        assert_eq!(validator.validate(&p, &other, None).code, ValidatorCode::User);
        assert!(validator.validate(&p, &Origin::Authenticated, None).status);
    }

    #[test]
    fn metadata_length_exempts_references() {
        let mut p = good_payload();
        p.metadata.push(MetaEntry {
            id: meta_keys::REFERENCES.into(),
            value: "r".repeat(5_000),
        });
        assert_eq!(code(&p), ValidatorCode::Valid);

        p.metadata.push(MetaEntry {
            id: "website".into(),
            value: "w".repeat(255),
        });
        assert_eq!(code(&p), ValidatorCode::Metadata);
    }

    #[test]
    fn declared_changes_must_match_recomputed_diff() {
        let old = good_payload();
        let previous = stored(&old);

        let mut edited = old.clone();
        edited.content = format!("{}{}", old.content, "more ".repeat(20));

        let validator = ContentValidator::default();
        let analyzer = ChangeAnalyzer::default();
        let (annotated, _) = analyzer.process(edited.clone(), Some(&previous));
        assert!(validator.validate(&annotated, &chain(), Some(&previous)).status);

        let mut forged = annotated.clone();
        forged.set_meta(meta_keys::WORDS_CHANGED, "1");
        assert_eq!(
            validator.validate(&forged, &chain(), Some(&previous)).code,
            ValidatorCode::Metadata
        );

        // Unannotated edit: nothing declared.
        assert_eq!(
            validator.validate(&edited, &chain(), Some(&previous)).code,
            ValidatorCode::Metadata
        );
    }
}

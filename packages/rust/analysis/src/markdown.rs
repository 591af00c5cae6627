//! Markdown link extraction.
//!
//! Links come from a CommonMark parse, so reference-style links, autolinks
//! and arbitrarily nested link text resolve to the same targets a renderer
//! would produce.

use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};

/// Anchor prefix used by in-document citation links.
pub const CITATION_ANCHOR: &str = "#cite-id-";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkdownLink {
    pub text: String,
    pub target: String,
    pub is_image: bool,
}

impl MarkdownLink {
    pub fn is_citation(&self) -> bool {
        self.target.starts_with(CITATION_ANCHOR)
    }
}

/// Extract every link and image embed, in document order.
pub fn extract_links(body: &str) -> Vec<MarkdownLink> {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let mut links: Vec<MarkdownLink> = Vec::new();
    // Indices into `links` for the links whose text is still being read.
    let mut open: Vec<usize> = Vec::new();

    for event in Parser::new_ext(body, options) {
        match event {
            Event::Start(Tag::Link { dest_url, .. }) => {
                open.push(links.len());
                links.push(MarkdownLink {
                    text: String::new(),
                    target: dest_url.to_string(),
                    is_image: false,
                });
            }
            Event::Start(Tag::Image { dest_url, .. }) => {
                open.push(links.len());
                links.push(MarkdownLink {
                    text: String::new(),
                    target: dest_url.to_string(),
                    is_image: true,
                });
            }
            Event::End(TagEnd::Link | TagEnd::Image) => {
                open.pop();
            }
            Event::Text(text) | Event::Code(text) => {
                if let Some(&idx) = open.last() {
                    links[idx].text.push_str(&text);
                }
            }
            _ => {}
        }
    }

    links
}

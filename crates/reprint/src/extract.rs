// ABOUTME: Content extractor locating the primary article region of a fetched document.
// ABOUTME: Cascading container selectors, title resolution, and destructive non-content cleanup.

use dom_query::Document;
use tracing::debug;

use crate::fragment::Fragment;

/// Title used when no heading or document title is present, and for the
/// extraction-failure sentinel.
pub const UNTITLED: &str = "Untitled Post";

/// Candidate content containers, highest priority first. The semantic marker
/// class used by the supported source sites wins over generic structure.
const CONTENT_SELECTORS: &[&str] = &[".wysiwyg__content", "article", "main", "body"];

/// Structural non-content elements removed from the matched container.
const STRIP_SELECTOR: &str = "header, footer, nav, aside, script, style, form, iframe";

/// Elements whose presence qualifies a container as holding real content.
const BLOCK_CONTENT_SELECTOR: &str = "p, div, img, h1, h2, h3, h4, h5, h6";

/// Result of content extraction.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub title: String,
    pub fragment: Fragment,
}

impl Extraction {
    fn sentinel() -> Self {
        Self {
            title: UNTITLED.to_string(),
            fragment: Fragment::sentinel(),
        }
    }
}

fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Extract the primary content region and its title from a full document.
///
/// Container selectors are tried in fixed priority order; the first match
/// containing block-level content wins. When none match the sentinel
/// extraction is returned — a reportable soft outcome, not an error.
///
/// Cleanup is destructive and runs before any image or text processing so
/// that migration counts reflect only content actually published.
pub fn extract(html: &str) -> Extraction {
    let doc = Document::from(html);

    for (tier, css) in CONTENT_SELECTORS.iter().enumerate() {
        let container = doc.select(css);
        if !container.exists() {
            continue;
        }
        if !container.select(BLOCK_CONTENT_SELECTOR).exists() {
            continue;
        }
        if tier > 0 {
            debug!(selector = %css, "content marker class not found, using fallback selector");
        }

        let title = resolve_title(&doc, &container);

        // Destructive, in place: the denylist must be gone before images are
        // counted or text blocks are collected.
        container.select(STRIP_SELECTOR).remove();

        // The body tier would otherwise wrap the fragment in a <body> tag.
        let fragment = if *css == "body" {
            Fragment::from_html(container.inner_html().to_string())
        } else {
            Fragment::from_html(container.html().to_string())
        };

        return Extraction { title, fragment };
    }

    debug!("no content container matched, returning sentinel");
    Extraction::sentinel()
}

/// Resolve a title for the matched container.
///
/// Preference order: first heading inside the container, then the document's
/// global title element, then the untitled placeholder.
fn resolve_title(doc: &Document, container: &dom_query::Selection) -> String {
    let heading = container.select("h1");
    if heading.exists() {
        let text = normalize_whitespace(&heading.text());
        if !text.is_empty() {
            return text;
        }
    }

    let doc_title = doc.select("title");
    if doc_title.exists() {
        let text = normalize_whitespace(&doc_title.text());
        if !text.is_empty() {
            return text;
        }
    }

    UNTITLED.to_string()
}

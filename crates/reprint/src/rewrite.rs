// ABOUTME: Section splitter/merger running block text through the rewriter capability.
// ABOUTME: Blocks are stamped with a transient node tag so merging is a lookup, not index alignment.

use dom_query::Document;
use tracing::warn;

use crate::adapters::{RewriteMode, Rewriter};
use crate::fragment::Fragment;

/// Transient attribute pairing a block-bearing node with its rewrite unit.
///
/// Stamped at split time, carried through the rewrite round trip, and
/// stripped again during merge. Looking units up by tag makes a mismatch
/// between structure and rewritten blocks impossible.
const SEG_ATTR: &str = "data-seg";

/// Leaf block elements: paragraphs and divs that contain no nested block
/// content of their own.
const BLOCK_SELECTOR: &str = "p, div";
const NESTED_BLOCK_SELECTOR: &str = "p, div, img";

/// Outcome of one text-rewrite pass over a fragment.
#[derive(Debug, Default, Clone, Copy)]
pub struct RewriteOutcome {
    /// Block-bearing elements found in the fragment.
    pub blocks: usize,
    /// Blocks whose text was actually replaced.
    pub rewritten: usize,
}

/// Rewrites a fragment's block text in place, preserving structure.
pub struct SectionRewriter<'a> {
    rewriter: &'a dyn Rewriter,
}

impl<'a> SectionRewriter<'a> {
    pub fn new(rewriter: &'a dyn Rewriter) -> Self {
        Self { rewriter }
    }

    /// Split the fragment into rewrite units, rewrite each, and merge back.
    ///
    /// One unit per block-bearing element, in document order. A unit whose
    /// rewrite fails keeps its original text; the rest of the document is
    /// unaffected.
    pub async fn rewrite_body(&self, fragment: &mut Fragment) -> RewriteOutcome {
        let doc = fragment.parse();
        let units = split(&doc);
        if units.is_empty() {
            return RewriteOutcome::default();
        }
        fragment.store(&doc);
        drop(doc);

        let mut rewritten: Vec<(usize, String)> = Vec::new();
        for (seg, text) in &units {
            match self.rewriter.rewrite(text, RewriteMode::Body).await {
                Ok(new_text) if !new_text.trim().is_empty() => {
                    rewritten.push((*seg, new_text));
                }
                Ok(_) => {
                    warn!(seg = *seg, "rewriter returned empty block, keeping original text");
                }
                Err(e) => {
                    warn!(seg = *seg, error = %e, "block rewrite failed, keeping original text");
                }
            }
        }

        let doc = fragment.parse();
        merge(&doc, &rewritten);
        fragment.store(&doc);

        RewriteOutcome {
            blocks: units.len(),
            rewritten: rewritten.len(),
        }
    }
}

/// Collect rewrite units and stamp their nodes, in document order.
///
/// A block-bearing element is a `p` or `div` with non-empty text and no
/// nested block content: wrapper divs are skipped in favor of their leaves,
/// and elements holding only an image (or emptied by image removal)
/// contribute nothing.
fn split(doc: &Document) -> Vec<(usize, String)> {
    let mut units = Vec::new();
    let mut seg = 0usize;

    for node in doc.select(BLOCK_SELECTOR).iter() {
        if node.select(NESTED_BLOCK_SELECTOR).exists() {
            continue;
        }
        let text = node.text().trim().to_string();
        if text.is_empty() {
            continue;
        }
        node.set_attr(SEG_ATTR, &seg.to_string());
        units.push((seg, text));
        seg += 1;
    }

    units
}

/// Replace each rewritten unit's node text by tag lookup, then strip tags.
fn merge(doc: &Document, rewritten: &[(usize, String)]) {
    for (seg, text) in rewritten {
        let node = doc.select(&format!(r#"[{}="{}"]"#, SEG_ATTR, seg));
        if node.exists() {
            node.set_html(escape_text(text));
        }
    }
    doc.select(&format!("[{}]", SEG_ATTR)).remove_attr(SEG_ATTR);
}

/// Escape rewritten plain text for use as element content.
fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::RewriteMode;
    use crate::error::PipelineError;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Rewriter fake that uppercases every block.
    struct UpperRewriter;

    #[async_trait]
    impl Rewriter for UpperRewriter {
        async fn rewrite(&self, text: &str, _mode: RewriteMode) -> Result<String, PipelineError> {
            Ok(text.to_uppercase())
        }
    }

    /// Rewriter fake that fails on one specific call.
    struct FlakyRewriter {
        fail_index: usize,
        calls: AtomicUsize,
    }

    impl FlakyRewriter {
        fn failing_on(fail_index: usize) -> Self {
            Self {
                fail_index,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Rewriter for FlakyRewriter {
        async fn rewrite(&self, text: &str, _mode: RewriteMode) -> Result<String, PipelineError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call == self.fail_index {
                return Err(PipelineError::rewrite(
                    "fake",
                    "Rewrite",
                    Some(anyhow::anyhow!("service unavailable")),
                ));
            }
            Ok(text.to_uppercase())
        }
    }

    #[tokio::test]
    async fn rewrites_blocks_in_document_order() {
        let mut fragment =
            Fragment::from_html("<div><p>first block</p><p>second block</p></div>");
        let rewriter = UpperRewriter;
        let outcome = SectionRewriter::new(&rewriter)
            .rewrite_body(&mut fragment)
            .await;

        assert_eq!(outcome.blocks, 2);
        assert_eq!(outcome.rewritten, 2);

        let html = fragment.html();
        let first = html.find("FIRST BLOCK").expect("first block rewritten");
        let second = html.find("SECOND BLOCK").expect("second block rewritten");
        assert!(first < second, "block order must be preserved, got: {}", html);
        assert!(!html.contains(SEG_ATTR), "tags must be stripped, got: {}", html);
    }

    #[tokio::test]
    async fn wrapper_divs_are_skipped_for_their_leaves() {
        let mut fragment = Fragment::from_html(
            "<div><div><p>inner paragraph</p></div><p>outer paragraph</p></div>",
        );
        let rewriter = UpperRewriter;
        let outcome = SectionRewriter::new(&rewriter)
            .rewrite_body(&mut fragment)
            .await;

        assert_eq!(outcome.blocks, 2);
        let html = fragment.html();
        assert!(html.contains("INNER PARAGRAPH"));
        assert!(html.contains("OUTER PARAGRAPH"));
    }

    #[tokio::test]
    async fn image_only_and_empty_blocks_contribute_nothing() {
        let mut fragment = Fragment::from_html(
            r#"<div><p><img src="https://wp.test/a.jpg"></p><p>  </p><p>real text</p></div>"#,
        );
        let rewriter = UpperRewriter;
        let outcome = SectionRewriter::new(&rewriter)
            .rewrite_body(&mut fragment)
            .await;

        assert_eq!(outcome.blocks, 1);
        let html = fragment.html();
        assert!(html.contains("REAL TEXT"));
        assert!(html.contains("https://wp.test/a.jpg"), "image untouched, got: {}", html);
    }

    #[tokio::test]
    async fn failed_block_keeps_original_text() {
        let mut fragment = Fragment::from_html(
            "<div><p>alpha text</p><p>beta text</p><p>gamma text</p></div>",
        );
        let rewriter = FlakyRewriter::failing_on(1);
        let outcome = SectionRewriter::new(&rewriter)
            .rewrite_body(&mut fragment)
            .await;

        assert_eq!(outcome.blocks, 3);
        assert_eq!(outcome.rewritten, 2);

        let html = fragment.html();
        assert!(html.contains("ALPHA TEXT"));
        assert!(html.contains("<p>beta text</p>"), "failed block untouched, got: {}", html);
        assert!(html.contains("GAMMA TEXT"));
        assert!(!html.contains(SEG_ATTR));
    }

    #[tokio::test]
    async fn inline_markup_is_replaced_by_rewritten_text() {
        let mut fragment =
            Fragment::from_html("<div><p>some <em>emphasized</em> words</p></div>");
        let rewriter = UpperRewriter;
        SectionRewriter::new(&rewriter)
            .rewrite_body(&mut fragment)
            .await;

        let html = fragment.html();
        assert!(html.contains("SOME EMPHASIZED WORDS"), "got: {}", html);
        assert!(!html.contains("<em>"), "inline markup is consumed, got: {}", html);
    }

    #[tokio::test]
    async fn rewritten_markup_is_escaped() {
        struct HostileRewriter;

        #[async_trait]
        impl Rewriter for HostileRewriter {
            async fn rewrite(
                &self,
                _text: &str,
                _mode: RewriteMode,
            ) -> Result<String, PipelineError> {
                Ok("a <script>alert(1)</script> & more".to_string())
            }
        }

        let mut fragment = Fragment::from_html("<div><p>plain</p></div>");
        let rewriter = HostileRewriter;
        SectionRewriter::new(&rewriter)
            .rewrite_body(&mut fragment)
            .await;

        let html = fragment.html();
        assert!(!html.contains("<script>"), "got: {}", html);
        assert!(html.contains("&lt;script&gt;"), "got: {}", html);
        assert!(html.contains("&amp; more"), "got: {}", html);
    }

    #[tokio::test]
    async fn sentinel_fragment_yields_no_blocks() {
        let mut fragment = Fragment::sentinel();
        let rewriter = UpperRewriter;
        let outcome = SectionRewriter::new(&rewriter)
            .rewrite_body(&mut fragment)
            .await;

        assert_eq!(outcome.blocks, 0);
        assert_eq!(outcome.rewritten, 0);
        assert!(fragment.is_sentinel());
    }

    #[test]
    fn escape_text_covers_html_specials() {
        assert_eq!(escape_text("a < b > c & d"), "a &lt; b &gt; c &amp; d");
        assert_eq!(escape_text("plain"), "plain");
    }
}

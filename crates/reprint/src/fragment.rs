// ABOUTME: The Fragment type, an owned HTML subtree mutated in place by pipeline stages.
// ABOUTME: Each mutation pass parses with dom_query, edits the tree, and re-serializes.

use dom_query::Document;

/// Body text of the sentinel fragment produced when extraction fails.
pub const SENTINEL_TEXT: &str = "No content found.";

/// An owned HTML subtree being progressively transformed.
///
/// Stages parse the fragment into a `dom_query::Document`, mutate the tree in
/// place, and store it back. Serializing from a parsed tree after every pass
/// keeps the fragment parseable HTML by construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    html: String,
}

impl Fragment {
    /// Wrap an HTML subtree.
    pub fn from_html(html: impl Into<String>) -> Self {
        Self { html: html.into() }
    }

    /// The sentinel fragment signalling that no content container matched.
    pub fn sentinel() -> Self {
        Self {
            html: SENTINEL_TEXT.to_string(),
        }
    }

    /// Returns true if this is the extraction-failure sentinel.
    pub fn is_sentinel(&self) -> bool {
        self.html == SENTINEL_TEXT
    }

    /// The current serialized HTML.
    pub fn html(&self) -> &str {
        &self.html
    }

    /// Consume the fragment, yielding its serialized HTML.
    pub fn into_html(self) -> String {
        self.html
    }

    /// Serialized length in bytes.
    pub fn len(&self) -> usize {
        self.html.len()
    }

    /// Returns true if the fragment holds no HTML at all.
    pub fn is_empty(&self) -> bool {
        self.html.is_empty()
    }

    /// Parse the fragment for a mutation pass.
    pub(crate) fn parse(&self) -> Document {
        Document::from(self.html.as_str())
    }

    /// Store a mutated tree back into the fragment.
    ///
    /// The parser wraps fragments in a full document shell, so serialization
    /// takes the body's inner HTML.
    pub(crate) fn store(&mut self, doc: &Document) {
        self.html = doc.select("body").inner_html().to_string();
    }
}

// ABOUTME: Error types for the reprint pipeline including ErrorCode enum and PipelineError struct.
// ABOUTME: Distinguishes fatal stage errors from soft per-element errors absorbed at component boundaries.

use std::fmt;

/// Error codes representing the categories of pipeline failures.
///
/// `Fetch`, `Parse`, `Publish` and `InvalidUrl` are fatal for a run.
/// `Extract`, `Image` and `Rewrite` are soft: they are absorbed at the
/// component boundary and surface only as counts and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidUrl,
    Fetch,
    Parse,
    Extract,
    Image,
    Rewrite,
    Publish,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::InvalidUrl => "invalid URL",
            ErrorCode::Fetch => "fetch error",
            ErrorCode::Parse => "parse error",
            ErrorCode::Extract => "extraction failure",
            ErrorCode::Image => "image error",
            ErrorCode::Rewrite => "rewrite error",
            ErrorCode::Publish => "publish error",
        };
        write!(f, "{}", s)
    }
}

/// The main error type for pipeline operations.
#[derive(Debug, thiserror::Error)]
pub struct PipelineError {
    pub code: ErrorCode,
    pub url: String,
    pub op: String,
    #[source]
    pub source: Option<anyhow::Error>,
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "reprint: {} {}: {}", self.op, self.url, self.code)?;
        if let Some(ref src) = self.source {
            write!(f, ": {}", src)?;
        }
        Ok(())
    }
}

impl PipelineError {
    fn new(
        code: ErrorCode,
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self {
            code,
            url: url.into(),
            op: op.into(),
            source,
        }
    }

    /// Create an InvalidUrl error.
    pub fn invalid_url(
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::new(ErrorCode::InvalidUrl, url, op, source)
    }

    /// Create a Fetch error.
    pub fn fetch(
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::new(ErrorCode::Fetch, url, op, source)
    }

    /// Create a Parse error.
    pub fn parse(
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::new(ErrorCode::Parse, url, op, source)
    }

    /// Create an Extract error.
    pub fn extract(
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::new(ErrorCode::Extract, url, op, source)
    }

    /// Create an Image error.
    pub fn image(
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::new(ErrorCode::Image, url, op, source)
    }

    /// Create a Rewrite error.
    pub fn rewrite(
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::new(ErrorCode::Rewrite, url, op, source)
    }

    /// Create a Publish error.
    pub fn publish(
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::new(ErrorCode::Publish, url, op, source)
    }

    /// Returns true if this is a Fetch error.
    pub fn is_fetch(&self) -> bool {
        self.code == ErrorCode::Fetch
    }

    /// Returns true if this is a Parse error.
    pub fn is_parse(&self) -> bool {
        self.code == ErrorCode::Parse
    }

    /// Returns true if this is an Image error.
    pub fn is_image(&self) -> bool {
        self.code == ErrorCode::Image
    }

    /// Returns true if this is a Rewrite error.
    pub fn is_rewrite(&self) -> bool {
        self.code == ErrorCode::Rewrite
    }

    /// Returns true if this is a Publish error.
    pub fn is_publish(&self) -> bool {
        self.code == ErrorCode::Publish
    }

    /// Returns true if this is an InvalidUrl error.
    pub fn is_invalid_url(&self) -> bool {
        self.code == ErrorCode::InvalidUrl
    }

    /// Returns true if this error category aborts a run.
    ///
    /// Soft categories (Extract, Image, Rewrite) degrade output but never
    /// abort; they are handled inside their owning stage.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::InvalidUrl | ErrorCode::Fetch | ErrorCode::Parse | ErrorCode::Publish
        )
    }
}

// ABOUTME: Main library entry point for the reprint article-republishing pipeline.
// ABOUTME: Re-exports the public API: Pipeline, PipelineBuilder, PipelineReport, errors, and adapters.

//! Reprint - fetch an article, rewrite it, migrate its images, republish it.
//!
//! This crate fetches a web article, extracts its primary content region,
//! rewrites title and body text through a pluggable rewriting service,
//! migrates embedded images into the destination media library, and creates
//! the final post — preserving the document structure throughout.
//!
//! # Example
//!
//! ```no_run
//! use reprint::{ChatRewriter, Pipeline, PipelineError, WordPressPublisher};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), PipelineError> {
//!     let rewriter = ChatRewriter::with_api_key("sk-...");
//!     let publisher = WordPressPublisher::new("https://blog.example.com", "admin", "secret")?;
//!     let pipeline = Pipeline::builder().build(rewriter, publisher);
//!     let report = pipeline.run("https://example.com/article").await?;
//!     println!("published post {:?}", report.post_id);
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod error;
pub mod extract;
pub mod fragment;
pub mod images;
pub mod options;
pub mod pipeline;
pub mod resource;
pub mod rewrite;
pub mod sanitize;

pub use crate::adapters::{
    ChatRewriter, MediaItem, MediaUpload, NewPost, Publisher, RewriteMode, Rewriter,
    WordPressPublisher,
};
pub use crate::error::{ErrorCode, PipelineError};
pub use crate::fragment::Fragment;
pub use crate::options::{Options, PipelineBuilder};
pub use crate::pipeline::{Pipeline, PipelineReport, Stage};

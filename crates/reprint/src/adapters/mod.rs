// ABOUTME: Capability adapters for the external collaborators of the pipeline.
// ABOUTME: Re-exports the Rewriter and Publisher traits and their HTTP implementations.

//! External collaborator adapters.
//!
//! The pipeline never talks to the rewriting service or the publishing system
//! directly; it holds capability objects implementing [`Rewriter`] and
//! [`Publisher`]. Components receive these at construction time, so every
//! component is testable against in-memory fakes without a live network.

pub mod publisher;
pub mod rewriter;

pub use publisher::{MediaItem, MediaUpload, NewPost, Publisher, WordPressPublisher};
pub use rewriter::{ChatRewriter, RewriteMode, Rewriter};

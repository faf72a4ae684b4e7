// ABOUTME: Pipeline orchestrator sequencing fetch, extract, rewrite, image migration, and publish.
// ABOUTME: Strictly linear stages; soft failures are absorbed per stage, fatal ones abort with no partial publish.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};
use url::Url;

use crate::adapters::{NewPost, Publisher, RewriteMode, Rewriter};
use crate::error::PipelineError;
use crate::extract;
use crate::images::ImageMigrator;
use crate::options::{Options, PipelineBuilder};
use crate::resource::{self, FetchOptions};
use crate::rewrite::SectionRewriter;
use crate::sanitize::sanitize_html;

/// The stages of one pipeline run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetching,
    Extracting,
    TitleRewriting,
    ImageMigrating,
    TextRewriting,
    Publishing,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Fetching => "fetching",
            Stage::Extracting => "extracting",
            Stage::TitleRewriting => "title-rewriting",
            Stage::ImageMigrating => "image-migrating",
            Stage::TextRewriting => "text-rewriting",
            Stage::Publishing => "publishing",
        };
        write!(f, "{}", s)
    }
}

/// The externally observable outcome of one run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub success: bool,
    pub post_id: Option<u64>,
    pub images_migrated: usize,
    pub final_content_length: usize,
}

impl PipelineReport {
    /// The report for a run that aborted before publishing.
    pub fn failure() -> Self {
        Self {
            success: false,
            post_id: None,
            images_migrated: 0,
            final_content_length: 0,
        }
    }
}

/// Sequences one article through fetch → extract → rewrite title → migrate
/// images → rewrite text → publish.
///
/// The rewriter and publisher are capability objects injected at
/// construction; the pipeline owns no ambient client state.
pub struct Pipeline {
    opts: Options,
    http: reqwest::Client,
    rewriter: Arc<dyn Rewriter>,
    publisher: Arc<dyn Publisher>,
}

impl Pipeline {
    /// Create a new PipelineBuilder for configuring a pipeline.
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    pub(crate) fn new(
        opts: Options,
        rewriter: Arc<dyn Rewriter>,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        let http = resource::build_http_client(&opts);
        Self {
            opts,
            http,
            rewriter,
            publisher,
        }
    }

    /// Process one article end to end.
    ///
    /// Returns the report of a published run, or the fatal error that aborted
    /// it. Soft failures (extraction sentinel, single images, single blocks)
    /// degrade the output but never abort; the destination receives either
    /// the complete final post or nothing.
    pub async fn run(&self, url: &str) -> Result<PipelineReport, PipelineError> {
        info!(stage = %Stage::Fetching, url, "starting run");
        if url.is_empty() {
            return Err(PipelineError::invalid_url(url, "Run", None));
        }
        if Url::parse(url).is_err() {
            return Err(PipelineError::invalid_url(
                url,
                "Run",
                Some(anyhow::anyhow!("malformed URL")),
            ));
        }

        let fetch_opts = FetchOptions::from_options(&self.opts);
        let fetched = resource::fetch(&self.http, url, &fetch_opts).await?;
        let html = fetched.text_utf8();
        if html.trim().is_empty() {
            return Err(PipelineError::parse(
                url,
                "Run",
                Some(anyhow::anyhow!("document body is empty")),
            ));
        }
        let base = Url::parse(&fetched.final_url).map_err(|e| {
            PipelineError::invalid_url(&fetched.final_url, "Run", Some(anyhow::anyhow!(e)))
        })?;

        info!(stage = %Stage::Extracting, "locating content container");
        let extraction = extract::extract(&html);
        let mut fragment = extraction.fragment;
        if fragment.is_sentinel() {
            warn!("no content container matched, continuing with sentinel content");
        }

        info!(stage = %Stage::TitleRewriting, title = %extraction.title, "rewriting title");
        let rewritten_title = self
            .rewriter
            .rewrite(&extraction.title, RewriteMode::Title)
            .await;
        let title = match rewritten_title {
            Ok(new_title) if !new_title.trim().is_empty() => new_title.trim().to_string(),
            Ok(_) => extraction.title,
            Err(e) => {
                warn!(error = %e, "title rewrite failed, keeping original title");
                extraction.title
            }
        };

        info!(stage = %Stage::ImageMigrating, "migrating images");
        let migrator = ImageMigrator::new(&self.http, self.publisher.as_ref(), &self.opts);
        let migration = migrator.migrate(&mut fragment, &base).await;
        info!(
            migrated = migration.migrated(),
            removed = migration.removed,
            "image migration done"
        );

        info!(stage = %Stage::TextRewriting, "rewriting body text");
        let outcome = SectionRewriter::new(self.rewriter.as_ref())
            .rewrite_body(&mut fragment)
            .await;
        info!(
            blocks = outcome.blocks,
            rewritten = outcome.rewritten,
            "text rewrite done"
        );

        let final_html = sanitize_html(fragment.html());
        let final_content_length = final_html.len();

        info!(stage = %Stage::Publishing, title = %title, "creating post");
        let post_id = self
            .publisher
            .create_post(NewPost::publish(title, final_html))
            .await?;
        info!(post_id, "run complete");

        Ok(PipelineReport {
            success: true,
            post_id: Some(post_id),
            images_migrated: migration.migrated(),
            final_content_length,
        })
    }
}

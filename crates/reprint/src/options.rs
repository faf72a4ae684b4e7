// ABOUTME: Configuration options for the reprint pipeline and the PipelineBuilder fluent API.
// ABOUTME: Covers timeouts, request headers, certificate policy, and image upload concurrency.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::adapters::{Publisher, Rewriter};
use crate::pipeline::Pipeline;

/// Browser-like User-Agent sent with every source-site request.
///
/// Many legacy article hosts reject obvious bot agents outright.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36";

/// Browser-like Accept header paired with the User-Agent above.
pub const DEFAULT_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";

/// Configuration options for the reprint pipeline.
#[derive(Debug, Clone)]
pub struct Options {
    pub timeout: Duration,
    pub user_agent: String,
    /// Extra headers sent with source-site requests (page and image fetches).
    pub headers: HashMap<String, String>,
    /// Skip TLS certificate validation on source-site requests. Enabled by
    /// default: a large share of legacy source sites present invalid
    /// certificates, and the fetched content is treated as untrusted anyway.
    pub accept_invalid_certs: bool,
    pub allow_private_networks: bool,
    /// Upper bound on concurrent in-flight image fetch+upload operations.
    pub image_concurrency: usize,
    pub http_client: Option<reqwest::Client>,
}

impl Default for Options {
    fn default() -> Self {
        let mut headers = HashMap::new();
        headers.insert("Accept".to_string(), DEFAULT_ACCEPT.to_string());
        Self {
            timeout: Duration::from_secs(20),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            headers,
            accept_invalid_certs: true,
            allow_private_networks: false,
            image_concurrency: 4,
            http_client: None,
        }
    }
}

/// Builder for constructing Pipeline instances with custom configuration.
#[derive(Debug, Clone, Default)]
pub struct PipelineBuilder {
    opts: Options,
}

impl PipelineBuilder {
    /// Create a new PipelineBuilder with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.opts.timeout = timeout;
        self
    }

    /// Set the User-Agent header.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.opts.user_agent = user_agent.into();
        self
    }

    /// Add a custom header to all source-site requests.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.opts.headers.insert(key.into(), value.into());
        self
    }

    /// Enable or disable TLS certificate validation for source sites.
    pub fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.opts.accept_invalid_certs = accept;
        self
    }

    /// Allow or disallow requests to private networks.
    pub fn allow_private_networks(mut self, allow: bool) -> Self {
        self.opts.allow_private_networks = allow;
        self
    }

    /// Bound the number of concurrent image fetch+upload operations.
    pub fn image_concurrency(mut self, limit: usize) -> Self {
        self.opts.image_concurrency = limit.max(1);
        self
    }

    /// Use a custom HTTP client for source-site requests.
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.opts.http_client = Some(client);
        self
    }

    /// Build the Pipeline with the configured options and capability objects.
    pub fn build<R, P>(self, rewriter: R, publisher: P) -> Pipeline
    where
        R: Rewriter + 'static,
        P: Publisher + 'static,
    {
        Pipeline::new(self.opts, Arc::new(rewriter), Arc::new(publisher))
    }
}

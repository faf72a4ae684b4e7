// ABOUTME: The Publisher capability trait and its WordPress REST implementation.
// ABOUTME: Uploads media into the destination library and creates the final post.

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use url::Url;

use crate::error::PipelineError;

/// One asset to be uploaded into the destination media library.
#[derive(Debug, Clone)]
pub struct MediaUpload {
    pub filename: String,
    pub content_type: String,
    pub bytes: Bytes,
    /// Request no-overwrite semantics: an existing asset with the same name
    /// must not be replaced.
    pub overwrite: bool,
}

/// The destination's record of an uploaded asset.
///
/// Publishing backends answer in one of two shapes: the REST shape
/// (`id`/`source_url`) or the legacy mapping shape (`ID`/`url`). The aliases
/// absorb that difference here so no other component sees it.
#[derive(Debug, Clone, Deserialize)]
pub struct MediaItem {
    #[serde(alias = "ID")]
    pub id: u64,
    #[serde(alias = "source_url")]
    pub url: String,
}

/// A post to be created on the destination.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    pub status: String,
}

impl NewPost {
    /// A post created directly in the published state.
    pub fn publish(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            status: "publish".to_string(),
        }
    }
}

/// A black-box publishing capability: asset upload plus post creation.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn upload_media(&self, upload: MediaUpload) -> Result<MediaItem, PipelineError>;

    async fn create_post(&self, post: NewPost) -> Result<u64, PipelineError>;

    /// Host of the destination asset store, used to recognize images that
    /// were already migrated on a previous run.
    fn asset_host(&self) -> Option<&str> {
        None
    }
}

#[derive(Debug, Deserialize)]
struct PostCreated {
    id: u64,
}

/// Publisher backed by the WordPress REST API with application-password auth.
pub struct WordPressPublisher {
    http: reqwest::Client,
    base_url: Url,
    asset_host: Option<String>,
    username: String,
    password: String,
}

impl WordPressPublisher {
    /// Create a publisher for the WordPress site at `base_url`.
    pub fn new(
        base_url: &str,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self, PipelineError> {
        let base_url = Url::parse(base_url).map_err(|e| {
            PipelineError::invalid_url(base_url, "Publisher", Some(anyhow::anyhow!(e)))
        })?;
        let asset_host = base_url.host_str().map(|h| h.to_string());
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("failed to build HTTP client");
        Ok(Self {
            http,
            base_url,
            asset_host,
            username: username.into(),
            password: password.into(),
        })
    }

    fn endpoint(&self, route: &str) -> String {
        format!(
            "{}/wp-json/wp/v2/{}",
            self.base_url.as_str().trim_end_matches('/'),
            route
        )
    }
}

#[async_trait]
impl Publisher for WordPressPublisher {
    async fn upload_media(&self, upload: MediaUpload) -> Result<MediaItem, PipelineError> {
        let url = self.endpoint("media");

        // The REST media endpoint never replaces an existing asset; duplicate
        // names are deduplicated server-side, which is exactly the
        // no-overwrite contract. An overwrite request has no REST equivalent.
        if upload.overwrite {
            tracing::debug!("overwrite requested but not supported by the media endpoint");
        }

        let response = self
            .http
            .post(&url)
            .basic_auth(&self.username, Some(&self.password))
            .header("Content-Type", &upload.content_type)
            .header(
                "Content-Disposition",
                format!("attachment; filename=\"{}\"", upload.filename),
            )
            .body(upload.bytes.clone())
            .send()
            .await
            .map_err(|e| PipelineError::image(&url, "MediaUpload", Some(anyhow::anyhow!(e))))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::image(
                &url,
                "MediaUpload",
                Some(anyhow::anyhow!("HTTP status {}", status.as_u16())),
            ));
        }

        let item: MediaItem = response
            .json()
            .await
            .map_err(|e| PipelineError::image(&url, "MediaUpload", Some(anyhow::anyhow!(e))))?;

        if item.url.is_empty() {
            return Err(PipelineError::image(
                &url,
                "MediaUpload",
                Some(anyhow::anyhow!("upload response carried no asset URL")),
            ));
        }

        Ok(item)
    }

    async fn create_post(&self, post: NewPost) -> Result<u64, PipelineError> {
        let url = self.endpoint("posts");

        let response = self
            .http
            .post(&url)
            .basic_auth(&self.username, Some(&self.password))
            .json(&json!({
                "title": post.title,
                "content": post.content,
                "status": post.status,
            }))
            .send()
            .await
            .map_err(|e| PipelineError::publish(&url, "CreatePost", Some(anyhow::anyhow!(e))))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::publish(
                &url,
                "CreatePost",
                Some(anyhow::anyhow!("HTTP status {}", status.as_u16())),
            ));
        }

        let created: PostCreated = response
            .json()
            .await
            .map_err(|e| PipelineError::publish(&url, "CreatePost", Some(anyhow::anyhow!(e))))?;

        Ok(created.id)
    }

    fn asset_host(&self) -> Option<&str> {
        self.asset_host.as_deref()
    }
}

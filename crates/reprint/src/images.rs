// ABOUTME: Image migrator moving embedded images into the destination media library.
// ABOUTME: Scans the fragment, fetches and uploads concurrently, then rewrites nodes in document order.

use std::collections::HashMap;

use dom_query::Document;
use futures::stream::{self, StreamExt};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use url::Url;

use crate::adapters::{MediaUpload, Publisher};
use crate::fragment::Fragment;
use crate::options::Options;
use crate::resource::{self, FetchOptions};

/// Raster formats accepted for migration, by URL extension.
const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];

/// Hosts serving avatars/placeholders that are never worth migrating.
const SKIP_HOSTS: &[&str] = &["gravatar.com"];

/// Outcome of one image-migration pass over a fragment.
#[derive(Debug, Default)]
pub struct ImageMigration {
    /// Resolved original URL → uploaded asset URL.
    pub map: HashMap<String, String>,
    /// Image nodes removed from the fragment.
    pub removed: usize,
}

impl ImageMigration {
    /// Number of images successfully migrated.
    pub fn migrated(&self) -> usize {
        self.map.len()
    }
}

/// Per-image decision from the scan phase, evaluated in order, first match wins.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Plan {
    /// Remove the node without any network traffic.
    Remove(&'static str),
    /// Leave the node untouched: its source already points at the
    /// destination asset host.
    Keep,
    /// Fetch the resolved URL and upload it.
    Upload(Url),
}

/// What the apply phase does to one image node.
#[derive(Debug)]
enum Action {
    Rewrite {
        resolved: String,
        id: u64,
        url: String,
    },
    Remove,
    Keep,
}

/// Migrates a fragment's images into the destination asset store.
///
/// Fetch and upload are independent per image and run with bounded
/// concurrency; DOM mutation happens afterwards, serialized, in document
/// order, touching each node exactly once.
pub struct ImageMigrator<'a> {
    http: &'a reqwest::Client,
    publisher: &'a dyn Publisher,
    fetch_opts: FetchOptions,
    concurrency: usize,
}

impl<'a> ImageMigrator<'a> {
    pub fn new(http: &'a reqwest::Client, publisher: &'a dyn Publisher, opts: &Options) -> Self {
        Self {
            http,
            publisher,
            fetch_opts: FetchOptions::from_options(opts),
            concurrency: opts.image_concurrency.max(1),
        }
    }

    /// Migrate every image in the fragment, mutating it in place.
    ///
    /// A broken image never fails the run: each failure removes that image
    /// node and is surfaced through the returned counts and the log.
    pub async fn migrate(&self, fragment: &mut Fragment, base: &Url) -> ImageMigration {
        let plans = scan(fragment.html(), base, self.publisher.asset_host());
        if plans.is_empty() {
            return ImageMigration::default();
        }

        let mut actions: HashMap<usize, Action> = HashMap::new();
        let mut jobs = Vec::new();
        for (index, plan) in plans.into_iter().enumerate() {
            match plan {
                Plan::Remove(reason) => {
                    debug!(index, reason, "dropping image without fetch");
                    actions.insert(index, Action::Remove);
                }
                Plan::Keep => {
                    debug!(index, "image already on destination host, leaving untouched");
                    actions.insert(index, Action::Keep);
                }
                Plan::Upload(resolved) => jobs.push((index, resolved)),
            }
        }

        let uploaded = stream::iter(jobs)
            .map(|(index, resolved)| async move {
                (index, self.fetch_and_upload(resolved).await)
            })
            .buffer_unordered(self.concurrency)
            .collect::<Vec<_>>()
            .await;
        for (index, action) in uploaded {
            actions.insert(index, action);
        }

        apply(fragment, &actions)
    }

    /// Fetch one image and push it into the media library.
    async fn fetch_and_upload(&self, resolved: Url) -> Action {
        let fetched = match resource::fetch(self.http, resolved.as_str(), &self.fetch_opts).await {
            Ok(fetched) => fetched,
            Err(e) => {
                warn!(url = %resolved, error = %e, "image fetch failed, removing node");
                return Action::Remove;
            }
        };

        let content_type = fetched
            .content_type
            .as_deref()
            .unwrap_or("")
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_string();
        if !content_type.starts_with("image/") || content_type.contains("svg") {
            warn!(url = %resolved, content_type = %content_type, "not a raster image, removing node");
            return Action::Remove;
        }

        let filename = derive_filename(&resolved, &content_type);
        let upload = MediaUpload {
            filename,
            content_type,
            bytes: fetched.body,
            overwrite: false,
        };

        match self.publisher.upload_media(upload).await {
            Ok(item) => {
                debug!(url = %resolved, asset = %item.url, "image uploaded");
                Action::Rewrite {
                    resolved: resolved.to_string(),
                    id: item.id,
                    url: item.url,
                }
            }
            Err(e) => {
                warn!(url = %resolved, error = %e, "image upload failed, removing node");
                Action::Remove
            }
        }
    }
}

/// Decide a plan for every image node, in document order.
fn scan(html: &str, base: &Url, asset_host: Option<&str>) -> Vec<Plan> {
    let doc = Document::from(html);
    doc.select("img")
        .iter()
        .map(|img| {
            let src = img
                .attr("src")
                .or_else(|| img.attr("data-src"))
                .map(|v| v.trim().to_string())
                .unwrap_or_default();
            decide(&src, base, asset_host)
        })
        .collect()
}

/// The per-image policy ladder.
fn decide(src: &str, base: &Url, asset_host: Option<&str>) -> Plan {
    if src.is_empty() {
        return Plan::Remove("no source");
    }
    if is_svg_like(src) {
        return Plan::Remove("svg");
    }
    if src.starts_with("data:") {
        return Plan::Remove("data URI");
    }
    let path = src.split(['?', '#']).next().unwrap_or(src);
    let extension_allowed = path
        .rsplit('.')
        .next()
        .filter(|ext| !ext.contains('/'))
        .map(|ext| ALLOWED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false);
    if !extension_allowed {
        return Plan::Remove("extension not allowed");
    }

    let resolved = match base.join(src) {
        Ok(resolved) => resolved,
        Err(_) => return Plan::Remove("unresolvable URL"),
    };

    if let Some(host) = resolved.host_str() {
        if SKIP_HOSTS
            .iter()
            .any(|skip| host == *skip || host.ends_with(&format!(".{}", skip)))
        {
            return Plan::Remove("avatar host");
        }
        if let Some(asset_host) = asset_host {
            if host.eq_ignore_ascii_case(asset_host) {
                return Plan::Keep;
            }
        }
    }

    Plan::Upload(resolved)
}

/// Recognize SVG sources by extension or data-URI sniff.
fn is_svg_like(src: &str) -> bool {
    let lower = src.to_ascii_lowercase();
    if lower.starts_with("data:image/svg") {
        return true;
    }
    if lower.starts_with("data:image/") && lower.contains("xml") {
        return true;
    }
    let path = lower.split(['?', '#']).next().unwrap_or(&lower);
    path.ends_with(".svg")
}

/// Derive an upload filename from the URL's path.
///
/// An empty or extension-less path gets a name synthesized from a digest of
/// the URL plus the detected content subtype.
fn derive_filename(url: &Url, content_type: &str) -> String {
    let name = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or("");
    if !name.is_empty() && name.contains('.') {
        return name.to_string();
    }

    let subtype = content_type.split('/').nth(1).unwrap_or("bin");
    let digest = Sha256::digest(url.as_str().as_bytes());
    let short: String = digest[..8].iter().map(|b| format!("{:02x}", b)).collect();
    format!("image-{}.{}", short, subtype)
}

/// Mutate every image node exactly once, in document order.
fn apply(fragment: &mut Fragment, actions: &HashMap<usize, Action>) -> ImageMigration {
    let doc = fragment.parse();
    let mut migration = ImageMigration::default();

    for (index, img) in doc.select("img").iter().enumerate() {
        match actions.get(&index) {
            Some(Action::Rewrite { resolved, id, url }) => {
                img.set_attr("src", url);
                img.set_attr("class", &format!("wp-image-{}", id));
                // The original srcset would still reference the source site.
                img.remove_attr("srcset");
                migration.map.insert(resolved.clone(), url.clone());
            }
            Some(Action::Keep) => {}
            // Any image without an uploaded URL must not survive.
            Some(Action::Remove) | None => {
                img.remove();
                migration.removed += 1;
            }
        }
    }

    fragment.store(&doc);
    migration
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{MediaItem, NewPost};
    use crate::error::PipelineError;
    use async_trait::async_trait;
    use httpmock::prelude::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    /// Publisher fake recording uploads and minting sequential asset URLs.
    struct FakePublisher {
        next_id: AtomicU64,
        uploads: Mutex<Vec<MediaUpload>>,
        fail_uploads: bool,
    }

    impl FakePublisher {
        fn new() -> Self {
            Self {
                next_id: AtomicU64::new(1),
                uploads: Mutex::new(Vec::new()),
                fail_uploads: false,
            }
        }

        fn failing() -> Self {
            Self {
                fail_uploads: true,
                ..Self::new()
            }
        }

        fn upload_count(&self) -> usize {
            self.uploads.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Publisher for FakePublisher {
        async fn upload_media(&self, upload: MediaUpload) -> Result<MediaItem, PipelineError> {
            if self.fail_uploads {
                return Err(PipelineError::image(
                    "fake",
                    "MediaUpload",
                    Some(anyhow::anyhow!("rejected")),
                ));
            }
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            let url = format!("https://wp.test/uploads/{}", upload.filename);
            self.uploads.lock().unwrap().push(upload);
            Ok(MediaItem { id, url })
        }

        async fn create_post(&self, _post: NewPost) -> Result<u64, PipelineError> {
            unreachable!("image tests never publish")
        }

        fn asset_host(&self) -> Option<&str> {
            Some("wp.test")
        }
    }

    fn base() -> Url {
        Url::parse("https://source.example.com/posts/1").unwrap()
    }

    fn open_client() -> reqwest::Client {
        reqwest::Client::new()
    }

    fn migrator<'a>(
        http: &'a reqwest::Client,
        publisher: &'a FakePublisher,
        opts: &'a Options,
    ) -> ImageMigrator<'a> {
        ImageMigrator::new(http, publisher, opts)
    }

    fn open_opts() -> Options {
        Options {
            allow_private_networks: true,
            ..Default::default()
        }
    }

    #[test]
    fn decide_drops_svg_and_data_uris_and_avatars() {
        let base = base();
        assert_eq!(decide("logo.svg", &base, None), Plan::Remove("svg"));
        assert_eq!(decide("logo.SVG?v=2", &base, None), Plan::Remove("svg"));
        assert_eq!(
            decide("data:image/svg+xml;base64,AAAA", &base, None),
            Plan::Remove("svg")
        );
        assert_eq!(
            decide("data:image/png;base64,AAAA", &base, None),
            Plan::Remove("data URI")
        );
        assert_eq!(
            decide("https://secure.gravatar.com/avatar/abc.jpg", &base, None),
            Plan::Remove("avatar host")
        );
        assert_eq!(decide("", &base, None), Plan::Remove("no source"));
    }

    #[test]
    fn decide_enforces_raster_extension_allowlist() {
        let base = base();
        assert_eq!(
            decide("doc.pdf", &base, None),
            Plan::Remove("extension not allowed")
        );
        assert_eq!(
            decide("https://x.test/image", &base, None),
            Plan::Remove("extension not allowed")
        );
        assert!(matches!(decide("pic.JPG", &base, None), Plan::Upload(_)));
        assert!(matches!(
            decide("photo.webp?w=800", &base, None),
            Plan::Upload(_)
        ));
    }

    #[test]
    fn decide_resolves_relative_sources() {
        let plan = decide("/img/a.png", &base(), None);
        match plan {
            Plan::Upload(url) => {
                assert_eq!(url.as_str(), "https://source.example.com/img/a.png")
            }
            other => panic!("expected upload plan, got {:?}", other),
        }
    }

    #[test]
    fn decide_keeps_destination_host_images() {
        let plan = decide(
            "https://wp.test/uploads/old.jpg",
            &base(),
            Some("wp.test"),
        );
        assert_eq!(plan, Plan::Keep);
    }

    #[test]
    fn filename_from_path_or_synthesized() {
        let url = Url::parse("https://x.test/img/photo.jpeg?w=1").unwrap();
        assert_eq!(derive_filename(&url, "image/jpeg"), "photo.jpeg");

        let url = Url::parse("https://x.test/img/raw").unwrap();
        let name = derive_filename(&url, "image/png");
        assert!(
            name.starts_with("image-") && name.ends_with(".png"),
            "got: {}",
            name
        );

        // Same URL, same synthesized name.
        assert_eq!(name, derive_filename(&url, "image/png"));
    }

    #[tokio::test]
    async fn migrate_rewrites_uploaded_image() {
        let server = MockServer::start();
        let image_mock = server.mock(|when, then| {
            when.method(GET).path("/img/a.png");
            then.status(200)
                .header("content-type", "image/png")
                .body("png-bytes");
        });

        let http = open_client();
        let publisher = FakePublisher::new();
        let opts = open_opts();
        let base = Url::parse(&server.url("/posts/1")).unwrap();

        let mut fragment = Fragment::from_html(
            r#"<div><p>text</p><img src="/img/a.png" srcset="/img/a-2x.png 2x"></div>"#,
        );
        let migration = migrator(&http, &publisher, &opts)
            .migrate(&mut fragment, &base)
            .await;

        image_mock.assert();
        assert_eq!(migration.migrated(), 1);
        assert_eq!(migration.removed, 0);
        assert_eq!(publisher.upload_count(), 1);

        let html = fragment.html();
        assert!(html.contains(r#"src="https://wp.test/uploads/a.png""#), "got: {}", html);
        assert!(html.contains(r#"class="wp-image-1""#), "got: {}", html);
        assert!(!html.contains("srcset"), "srcset should be cleared, got: {}", html);
    }

    #[tokio::test]
    async fn migrate_removes_image_on_http_404() {
        let server = MockServer::start();
        let image_mock = server.mock(|when, then| {
            when.method(GET).path("/img/pic.JPG");
            then.status(404).body("gone");
        });

        let http = open_client();
        let publisher = FakePublisher::new();
        let opts = open_opts();
        let base = Url::parse(&server.url("/posts/1")).unwrap();

        let mut fragment =
            Fragment::from_html(r#"<div><p>text</p><img src="/img/pic.JPG"></div>"#);
        let migration = migrator(&http, &publisher, &opts)
            .migrate(&mut fragment, &base)
            .await;

        image_mock.assert();
        assert!(migration.map.is_empty());
        assert_eq!(migration.removed, 1);
        assert_eq!(publisher.upload_count(), 0);
        assert!(!fragment.html().contains("<img"));
        assert!(fragment.html().contains("text"));
    }

    #[tokio::test]
    async fn migrate_never_fetches_svg() {
        let server = MockServer::start();
        let any_mock = server.mock(|when, then| {
            when.method(GET);
            then.status(200);
        });

        let http = open_client();
        let publisher = FakePublisher::new();
        let opts = open_opts();
        let base = Url::parse(&server.url("/posts/1")).unwrap();

        let mut fragment = Fragment::from_html(r#"<div><img src="a.svg"><p>kept</p></div>"#);
        let migration = migrator(&http, &publisher, &opts)
            .migrate(&mut fragment, &base)
            .await;

        any_mock.assert_hits(0);
        assert!(migration.map.is_empty());
        assert_eq!(migration.removed, 1);
        assert!(!fragment.html().contains("<img"));
    }

    #[tokio::test]
    async fn migrate_removes_image_with_wrong_content_type() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/a.jpg");
            then.status(200)
                .header("content-type", "text/html")
                .body("<html>not an image</html>");
        });

        let http = open_client();
        let publisher = FakePublisher::new();
        let opts = open_opts();
        let base = Url::parse(&server.url("/")).unwrap();

        let mut fragment = Fragment::from_html(r#"<div><img src="/a.jpg"></div>"#);
        let migration = migrator(&http, &publisher, &opts)
            .migrate(&mut fragment, &base)
            .await;

        assert!(migration.map.is_empty());
        assert_eq!(publisher.upload_count(), 0);
        assert!(!fragment.html().contains("<img"));
    }

    #[tokio::test]
    async fn migrate_skips_images_already_on_destination() {
        let http = open_client();
        let publisher = FakePublisher::new();
        let opts = open_opts();

        let mut fragment = Fragment::from_html(
            r#"<div><img src="https://wp.test/uploads/done.jpg" class="wp-image-9"></div>"#,
        );
        let migration = migrator(&http, &publisher, &opts)
            .migrate(&mut fragment, &base())
            .await;

        assert!(migration.map.is_empty());
        assert_eq!(migration.removed, 0);
        assert_eq!(publisher.upload_count(), 0);
        assert!(fragment.html().contains("https://wp.test/uploads/done.jpg"));
    }

    #[tokio::test]
    async fn migrate_removes_image_when_upload_fails() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/a.jpg");
            then.status(200)
                .header("content-type", "image/jpeg")
                .body("jpeg-bytes");
        });

        let http = open_client();
        let publisher = FakePublisher::failing();
        let opts = open_opts();
        let base = Url::parse(&server.url("/")).unwrap();

        let mut fragment = Fragment::from_html(r#"<div><img src="/a.jpg"><p>still here</p></div>"#);
        let migration = migrator(&http, &publisher, &opts)
            .migrate(&mut fragment, &base)
            .await;

        assert!(migration.map.is_empty());
        assert_eq!(migration.removed, 1);
        assert!(!fragment.html().contains("<img"));
        assert!(fragment.html().contains("still here"));
    }

    #[tokio::test]
    async fn migrate_without_images_leaves_fragment_unchanged() {
        let http = open_client();
        let publisher = FakePublisher::new();
        let opts = open_opts();

        let mut fragment = Fragment::from_html("<div><p>no images here</p></div>");
        let before = fragment.html().to_string();
        let migration = migrator(&http, &publisher, &opts)
            .migrate(&mut fragment, &base())
            .await;

        assert!(migration.map.is_empty());
        assert_eq!(fragment.html(), before);
    }

    #[tokio::test]
    async fn migrate_uses_data_src_fallback() {
        let server = MockServer::start();
        let image_mock = server.mock(|when, then| {
            when.method(GET).path("/lazy.png");
            then.status(200)
                .header("content-type", "image/png")
                .body("png-bytes");
        });

        let http = open_client();
        let publisher = FakePublisher::new();
        let opts = open_opts();
        let base = Url::parse(&server.url("/")).unwrap();

        let mut fragment = Fragment::from_html(r#"<div><img data-src="/lazy.png"></div>"#);
        let migration = migrator(&http, &publisher, &opts)
            .migrate(&mut fragment, &base)
            .await;

        image_mock.assert();
        assert_eq!(migration.migrated(), 1);
        assert!(fragment.html().contains("https://wp.test/uploads/lazy.png"));
    }
}

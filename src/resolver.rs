//! Decides where the template for a release comes from: the cache, a fresh
//! download, or, when the latest release can not be looked up, the most
//! recently published release already on disk.

use anyhow::{anyhow, ensure};
use std::path::PathBuf;

use crate::cache::{ReleaseCache, ReleaseRecord};
use crate::config::{CONFIG_FILE, RECORD_FILE};
use crate::error::KilnError;
use crate::fetcher::ArchiveFetcher;
use crate::releases::ReleaseClient;
use crate::{info, trace, warn};

pub struct Resolver<'a> {
    client: &'a ReleaseClient,
    cache: &'a mut ReleaseCache,
    name_fragment: &'a str,
}

impl<'a> Resolver<'a> {
    #[must_use]
    pub fn new(client: &'a ReleaseClient, cache: &'a mut ReleaseCache, name_fragment: &'a str) -> Self {
        Self {
            client,
            cache,
            name_fragment,
        }
    }

    /// Returns the directory holding the template for `version`, or for the
    /// latest release when `version` is [`None`].
    ///
    /// A pinned version already in the cache is served without touching the
    /// network. The latest release is always looked up remotely.
    ///
    /// # Errors
    ///
    /// Fails if a pinned version can not be fetched, if the latest release
    /// can not be fetched and nothing is cached, or if the download or its
    /// extraction fails. The cache is only written after a successful
    /// extraction.
    pub async fn resolve(&mut self, version: Option<&str>) -> anyhow::Result<PathBuf> {
        if let Some(tag) = version {
            if let Some(record) = self.cache.lookup(tag) {
                let path = self.cache.path_of(record);

                if path.is_dir() {
                    info!("Using cached template {tag}");
                    return Ok(path);
                }

                warn!(
                    "Cached template {tag} is missing from {}, downloading it again",
                    path.display()
                );
            }
        }

        let release = match self.client.release(version).await {
            Ok(release) => release,
            Err(err) if version.is_none() && is_lookup_failure(&err) => {
                return self.fallback(err);
            }
            Err(err) => return Err(err),
        };

        let tag = release.tag_name.as_str();
        ensure!(
            is_plain_name(tag),
            anyhow!("Release tag {tag:?} can not be used as a directory name")
        );

        let destination = self.cache.root().join(tag);
        if destination.is_dir() {
            info!("Template {tag} is already downloaded");
            return Ok(destination);
        }

        info!("Downloading template {tag}");
        trace!("Archive {} -> {}", release.zipball_url, destination.display());

        let root = self.cache.root().to_owned();
        ArchiveFetcher::new(self.client, &root, self.name_fragment)
            .fetch(&release.zipball_url, &destination)
            .await?;

        self.cache
            .commit(tag, ReleaseRecord::new(tag, release.published_at))?;

        Ok(destination)
    }

    fn fallback(&self, err: anyhow::Error) -> anyhow::Result<PathBuf> {
        let Some(record) = self.cache.most_recent_on_disk() else {
            return Err(err.context(KilnError::ReleaseNotFound { version: None }));
        };

        warn!(
            "Could not look up the latest release ({err}), using cached template {}",
            record.tag
        );

        Ok(self.cache.path_of(record))
    }
}

fn is_lookup_failure(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<KilnError>(),
        Some(KilnError::Status { .. } | KilnError::Network { .. })
    )
}

/// Tags become directory names next to the record and settings files, so
/// separators, hidden names and those two file names are refused.
fn is_plain_name(tag: &str) -> bool {
    !tag.is_empty()
        && !tag.starts_with('.')
        && !tag.contains(['/', '\\'])
        && tag != RECORD_FILE
        && tag != CONFIG_FILE
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::test_util::{at, mock_archive, release_json, settings, template_zipball};
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Fixture {
        server: MockServer,
        client: ReleaseClient,
        tmp: TempDir,
    }

    impl Fixture {
        async fn new() -> Self {
            let server = MockServer::start().await;
            let client = ReleaseClient::new(&settings(&server)).unwrap();
            Self {
                server,
                client,
                tmp: TempDir::new().unwrap(),
            }
        }

        /// Points the client at a port nobody listens on.
        async fn offline() -> Self {
            let mut fx = Self::new().await;
            let settings = Settings::builder()
                .api_url("http://127.0.0.1:9")
                .repository("acme/starter")
                .timeout_secs(5_u64)
                .build()
                .unwrap();
            fx.client = ReleaseClient::new(&settings).unwrap();
            fx
        }

        fn cache(&self) -> ReleaseCache {
            ReleaseCache::load(self.tmp.path(), &self.tmp.path().join("releases.json"))
        }

        async fn resolve(&self, version: Option<&str>) -> anyhow::Result<PathBuf> {
            let mut cache = self.cache();
            Resolver::new(&self.client, &mut cache, "starter")
                .resolve(version)
                .await
        }

        async fn mock_release(&self, endpoint: &str, status: u16, body: serde_json::Value) {
            Mock::given(method("GET"))
                .and(path(format!("/repos/acme/starter/releases/{endpoint}")))
                .respond_with(ResponseTemplate::new(status).set_body_json(body))
                .mount(&self.server)
                .await;
        }

        fn seed(&self, tag: &str, published_at: &str) {
            std::fs::create_dir_all(self.tmp.path().join(tag)).unwrap();
            self.cache()
                .commit(tag, ReleaseRecord::new(tag, at(published_at)))
                .unwrap();
        }
    }

    #[tokio::test]
    async fn cached_tag_skips_network() {
        let fx = Fixture::new().await;
        fx.seed("1.0.0", "2019-01-01T00:00:00Z");
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&fx.server)
            .await;

        let first = fx.resolve(Some("1.0.0")).await.unwrap();
        let second = fx.resolve(Some("1.0.0")).await.unwrap();

        assert_eq!(first, fx.tmp.path().join("1.0.0"));
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn missing_cache_file_fetches_pinned_release() {
        let fx = Fixture::new().await;
        let release = release_json(&fx.server, "2.0.0", "2021-01-01T00:00:00Z");
        fx.mock_release("tags/2.0.0", 200, release).await;
        mock_archive(&fx.server, "2.0.0", template_zipball(), 1).await;

        let resolved = fx.resolve(Some("2.0.0")).await.unwrap();

        assert_eq!(resolved, fx.tmp.path().join("2.0.0"));
        assert!(resolved.join("src/main.rs").is_file());
        assert_eq!(
            fx.cache().lookup("2.0.0"),
            Some(&ReleaseRecord::new("2.0.0", at("2021-01-01T00:00:00Z")))
        );
    }

    #[tokio::test]
    async fn latest_is_downloaded_and_committed() {
        let fx = Fixture::new().await;
        let release = release_json(&fx.server, "1.3.0", "2020-01-01T00:00:00Z");
        fx.mock_release("latest", 200, release).await;
        mock_archive(&fx.server, "1.3.0", template_zipball(), 1).await;

        let resolved = fx.resolve(None).await.unwrap();

        assert_eq!(resolved, fx.tmp.path().join("1.3.0"));
        assert!(resolved.join("README.md").is_file());

        let cache = fx.cache();
        assert_eq!(cache.len(), 1);
        let record = cache.lookup("1.3.0").unwrap();
        assert_eq!(record.tag, "1.3.0");
        assert_eq!(record.path, "1.3.0");
        assert_eq!(record.published_at, at("2020-01-01T00:00:00Z"));
    }

    #[tokio::test]
    async fn second_resolve_of_fetched_tag_does_not_download() {
        let fx = Fixture::new().await;
        let release = release_json(&fx.server, "2.0.0", "2021-01-01T00:00:00Z");
        Mock::given(method("GET"))
            .and(path("/repos/acme/starter/releases/tags/2.0.0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(release))
            .expect(1)
            .mount(&fx.server)
            .await;
        mock_archive(&fx.server, "2.0.0", template_zipball(), 1).await;

        fx.resolve(Some("2.0.0")).await.unwrap();
        let before = std::fs::read_to_string(fx.tmp.path().join("releases.json")).unwrap();
        fx.resolve(Some("2.0.0")).await.unwrap();
        let after = std::fs::read_to_string(fx.tmp.path().join("releases.json")).unwrap();

        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn existing_directory_is_not_downloaded_again() {
        let fx = Fixture::new().await;
        std::fs::create_dir(fx.tmp.path().join("1.3.0")).unwrap();
        let release = release_json(&fx.server, "1.3.0", "2020-01-01T00:00:00Z");
        fx.mock_release("latest", 200, release).await;
        mock_archive(&fx.server, "1.3.0", template_zipball(), 0).await;

        let resolved = fx.resolve(None).await.unwrap();

        assert_eq!(resolved, fx.tmp.path().join("1.3.0"));
        assert!(fx.cache().is_empty());
        assert!(!fx.tmp.path().join("releases.json").exists());
    }

    #[tokio::test]
    async fn latest_falls_back_to_most_recent_cached() {
        let fx = Fixture::new().await;
        fx.seed("1.0.0", "2019-01-01T00:00:00Z");
        fx.seed("1.2.0", "2020-06-01T00:00:00Z");
        fx.seed("1.1.0", "2020-01-01T00:00:00Z");
        fx.mock_release("latest", 502, serde_json::json!({})).await;

        let resolved = fx.resolve(None).await.unwrap();

        assert_eq!(resolved, fx.tmp.path().join("1.2.0"));
    }

    #[tokio::test]
    async fn unreachable_api_falls_back_for_latest() {
        let fx = Fixture::offline().await;
        fx.seed("1.0.0", "2019-01-01T00:00:00Z");
        fx.seed("1.1.0", "2020-01-01T00:00:00Z");

        let resolved = fx.resolve(None).await.unwrap();

        assert_eq!(resolved, fx.tmp.path().join("1.1.0"));
    }

    #[tokio::test]
    async fn unreachable_api_is_fatal_for_pinned_version() {
        let fx = Fixture::offline().await;
        fx.seed("1.0.0", "2019-01-01T00:00:00Z");

        let err = fx.resolve(Some("2.0.0")).await.unwrap_err();

        assert!(matches!(
            err.downcast_ref::<KilnError>(),
            Some(KilnError::Network { .. })
        ));
        assert!(!fx.tmp.path().join("2.0.0").exists());
    }

    #[tokio::test]
    async fn latest_with_empty_cache_is_fatal() {
        let fx = Fixture::new().await;
        fx.mock_release("latest", 502, serde_json::json!({})).await;

        let err = fx.resolve(None).await.unwrap_err();

        assert!(matches!(
            err.downcast_ref::<KilnError>(),
            Some(KilnError::ReleaseNotFound { version: None })
        ));
    }

    #[tokio::test]
    async fn pinned_version_never_falls_back() {
        let fx = Fixture::new().await;
        fx.seed("1.0.0", "2019-01-01T00:00:00Z");
        fx.mock_release("tags/3.0.0", 404, serde_json::json!({})).await;

        let err = fx.resolve(Some("3.0.0")).await.unwrap_err();

        assert!(matches!(
            err.downcast_ref::<KilnError>(),
            Some(KilnError::ReleaseNotFound { version: Some(v) }) if v == "3.0.0"
        ));
    }

    #[tokio::test]
    async fn failed_download_commits_nothing() {
        let fx = Fixture::new().await;
        let release = release_json(&fx.server, "1.3.0", "2020-01-01T00:00:00Z");
        fx.mock_release("latest", 200, release).await;
        Mock::given(method("GET"))
            .and(path("/archive/1.3.0.zip"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&fx.server)
            .await;

        assert!(fx.resolve(None).await.is_err());
        assert!(fx.cache().is_empty());
        assert!(!fx.tmp.path().join("1.3.0").exists());
    }

    #[tokio::test]
    async fn stale_record_is_fetched_again() {
        let fx = Fixture::new().await;
        fx.seed("1.0.0", "2019-01-01T00:00:00Z");
        std::fs::remove_dir(fx.tmp.path().join("1.0.0")).unwrap();
        let release = release_json(&fx.server, "1.0.0", "2019-01-01T00:00:00Z");
        fx.mock_release("tags/1.0.0", 200, release).await;
        mock_archive(&fx.server, "1.0.0", template_zipball(), 1).await;

        let resolved = fx.resolve(Some("1.0.0")).await.unwrap();

        assert!(resolved.join("README.md").is_file());
    }

    #[tokio::test]
    async fn tag_named_like_record_file_is_refused() {
        let fx = Fixture::new().await;
        let release = release_json(&fx.server, RECORD_FILE, "2020-01-01T00:00:00Z");
        fx.mock_release("latest", 200, release).await;
        mock_archive(&fx.server, RECORD_FILE, template_zipball(), 0).await;

        assert!(fx.resolve(None).await.is_err());
        assert!(!fx.tmp.path().join(RECORD_FILE).exists());
    }

    #[tokio::test]
    async fn tags_with_separators_are_refused() {
        let fx = Fixture::new().await;
        let release = release_json(&fx.server, "../escape", "2020-01-01T00:00:00Z");
        fx.mock_release("latest", 200, release).await;

        assert!(fx.resolve(None).await.is_err());
        assert!(fx.cache().is_empty());
    }

    #[test]
    fn plain_names() {
        assert!(is_plain_name("1.3.0"));
        assert!(is_plain_name("v2.0.0-rc.1"));
        assert!(!is_plain_name(""));
        assert!(!is_plain_name(".."));
        assert!(!is_plain_name("a/b"));
        assert!(!is_plain_name(".staging-abc"));
        assert!(!is_plain_name(RECORD_FILE));
        assert!(!is_plain_name(CONFIG_FILE));
    }
}

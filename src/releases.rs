//! Release-listing API client.

use anyhow::Context;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::StatusCode;
use serde::Deserialize;

use crate::config::Settings;
use crate::error::KilnError;
use crate::trace;

/// The parts of a published release kiln needs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Release {
    /// Release tag (e.g. "1.3.0")
    pub tag_name: String,

    pub published_at: DateTime<Utc>,

    /// Source archive of the tagged tree
    pub zipball_url: String,
}

#[derive(Deserialize)]
struct Tag {
    tag_name: String,
}

/// HTTP access to the release API of the template repository.
pub struct ReleaseClient {
    client: reqwest::Client,
    api_url: String,
    repository: String,
}

impl ReleaseClient {
    pub fn new(settings: &Settings) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );

        if let Some(token) = &settings.token {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .context("Release API token is not a valid header value")?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .timeout(settings.timeout())
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_url: settings.api_url.trim_end_matches('/').to_string(),
            repository: settings.repository.clone(),
        })
    }

    fn releases_url(&self) -> String {
        format!("{}/repos/{}/releases", self.api_url, self.repository)
    }

    /// Sends a GET request, failing on transport errors and non-200 replies.
    pub(crate) async fn get(&self, url: &str) -> anyhow::Result<reqwest::Response> {
        trace!("GET {url}");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| KilnError::network(url, &e))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(KilnError::Status {
                url: url.to_string(),
                status,
            }
            .into());
        }

        Ok(response)
    }

    /// Fetches the release tagged `tag`, or the latest release when `tag` is
    /// [`None`].
    pub async fn release(&self, tag: Option<&str>) -> anyhow::Result<Release> {
        let url = match tag {
            Some(tag) => format!("{}/tags/{tag}", self.releases_url()),
            None => format!("{}/latest", self.releases_url()),
        };

        let response = self.get(&url).await.map_err(|e| match e.downcast_ref::<KilnError>() {
            Some(KilnError::Status { status, .. })
                if *status == StatusCode::NOT_FOUND && tag.is_some() =>
            {
                KilnError::ReleaseNotFound {
                    version: tag.map(str::to_string),
                }
                .into()
            }
            _ => e,
        })?;

        response
            .json()
            .await
            .map_err(|e| KilnError::network(&url, &e).into())
    }

    /// Tags of the first page of releases, in the order the API returns them.
    pub async fn tags(&self) -> anyhow::Result<Vec<String>> {
        let url = self.releases_url();
        let response = self.get(&url).await?;

        let tags: Vec<Tag> = response
            .json()
            .await
            .map_err(|e| KilnError::network(&url, &e))?;

        Ok(tags.into_iter().map(|t| t.tag_name).collect())
    }
}

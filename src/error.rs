use std::path::PathBuf;

use thiserror::Error;

/// Fatal conditions raised while resolving a release or creating a project.
///
/// These travel inside [`anyhow::Error`]; use `downcast_ref::<KilnError>()`
/// to recover the category.
#[derive(Error, Debug)]
pub enum KilnError {
    #[error("Path {} already exists", .path.display())]
    DestinationExists { path: PathBuf },

    #[error("Request to {url} failed: {reason}")]
    Network { url: String, reason: String },

    #[error("Request to {url} returned {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("{}", release_not_found(.version))]
    ReleaseNotFound { version: Option<String> },

    #[error("Failed to extract template archive: {reason}")]
    Extraction { reason: String },
}

fn release_not_found(version: &Option<String>) -> String {
    match version {
        Some(version) => format!("Release {version} was not found"),
        None => "No release could be fetched and none is cached".to_string(),
    }
}

impl KilnError {
    pub(crate) fn network(url: &str, err: &reqwest::Error) -> Self {
        Self::Network {
            url: url.to_string(),
            reason: err.to_string(),
        }
    }

    pub(crate) fn extraction(reason: impl Into<String>) -> Self {
        Self::Extraction {
            reason: reason.into(),
        }
    }
}

//! Download and extraction of release archives.
//!
//! Archives are streamed to a temporary file and extracted into a private
//! staging directory under the cache root, so the extracted root folder can
//! be found without guessing among unrelated cache entries. Nothing reaches
//! the destination until extraction has fully finished.

use anyhow::Context;
use fs_extra::dir::CopyOptions;
use futures_util::StreamExt;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::error::KilnError;
use crate::releases::ReleaseClient;
use crate::trace;

pub struct ArchiveFetcher<'a> {
    client: &'a ReleaseClient,
    cache_root: &'a Path,
    name_fragment: &'a str,
}

impl<'a> ArchiveFetcher<'a> {
    /// `name_fragment` picks the template folder when an archive holds more
    /// than one top-level directory.
    #[must_use]
    pub fn new(client: &'a ReleaseClient, cache_root: &'a Path, name_fragment: &'a str) -> Self {
        Self {
            client,
            cache_root,
            name_fragment,
        }
    }

    /// Downloads the zip archive at `url` and leaves its template folder at
    /// `destination`, which must not exist yet.
    pub async fn fetch(&self, url: &str, destination: &Path) -> anyhow::Result<()> {
        let response = self.client.get(url).await?;

        let mut archive = tempfile::Builder::new()
            .prefix(".download-")
            .suffix(".zip")
            .tempfile_in(self.cache_root)
            .context("Failed to create download file")?;

        let mut stream = response.bytes_stream();
        let mut size = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| KilnError::network(url, &e))?;
            archive
                .write_all(&chunk)
                .context("Failed to write download file")?;
            size += chunk.len();
        }
        archive.flush()?;

        trace!("Downloaded {size} bytes from {url}");

        let staging = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(self.cache_root)
            .context("Failed to create staging directory")?;

        let file = archive.reopen()?;
        let name_fragment = self.name_fragment.to_owned();
        let destination = destination.to_owned();
        tokio::task::spawn_blocking(move || unpack(file, staging, &name_fragment, &destination))
            .await
            .context("Extraction task failed")?
    }
}

/// Extracts `file` into `staging` and moves the template folder to
/// `destination`. The staging directory is gone once this returns.
fn unpack(
    file: File,
    staging: TempDir,
    name_fragment: &str,
    destination: &Path,
) -> anyhow::Result<()> {
    extract(file, staging.path())?;

    let root = extracted_root(staging.path(), name_fragment)?;
    trace!("Extracted root {}", root.display());

    move_dir(&root, destination)
}

fn extract(file: File, target: &Path) -> anyhow::Result<()> {
    let mut zip = zip::ZipArchive::new(file).map_err(|e| KilnError::extraction(e.to_string()))?;
    zip.extract(target)
        .map_err(|e| KilnError::extraction(e.to_string()))?;

    Ok(())
}

/// Finds the folder holding the template among the freshly extracted
/// entries of `staging`.
fn extracted_root(staging: &Path, name_fragment: &str) -> anyhow::Result<PathBuf> {
    let mut dirs = Vec::new();
    let mut has_files = false;

    for entry in staging.read_dir()? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push(entry.path());
        } else {
            has_files = true;
        }
    }

    if has_files {
        return Ok(staging.to_owned());
    }

    match dirs.as_slice() {
        [] => Err(KilnError::extraction("the archive is empty").into()),
        [root] => Ok(root.clone()),
        _ => {
            let matching: Vec<_> = dirs
                .iter()
                .filter(|d| {
                    d.file_name()
                        .is_some_and(|n| n.to_string_lossy().contains(name_fragment))
                })
                .collect();

            match matching.as_slice() {
                [root] => Ok((*root).clone()),
                _ => Err(KilnError::extraction(format!(
                    "expected one folder named after {name_fragment}, found {}",
                    dirs.iter()
                        .filter_map(|d| d.file_name())
                        .map(|n| n.to_string_lossy().into_owned())
                        .collect::<Vec<_>>()
                        .join(", ")
                ))
                .into()),
            }
        }
    }
}

/// Renames `from` to `to`, copying across filesystems when a rename is not
/// possible.
fn move_dir(from: &Path, to: &Path) -> anyhow::Result<()> {
    if std::fs::rename(from, to).is_ok() {
        return Ok(());
    }

    trace!("Rename failed, moving {} by copy", from.display());

    let mut options = CopyOptions::new();
    options.content_only = true;

    fs_extra::dir::create_all(to, false)?;
    fs_extra::dir::move_dir(from, to, &options)
        .with_context(|| format!("Failed to move {} to {}", from.display(), to.display()))?;

    Ok(())
}

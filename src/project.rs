use anyhow::Context;
use fs_extra::dir::CopyOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::cache::ReleaseCache;
use crate::config::{KilnDirs, Settings, CONFIG_FILE};
use crate::error::KilnError;
use crate::releases::ReleaseClient;
use crate::resolver::Resolver;
use crate::{info, trace};

/// Runs the user-facing commands against one cache root.
pub struct ProjectInitializer {
    dirs: KilnDirs,
    settings: Settings,
}

impl ProjectInitializer {
    #[must_use]
    pub fn new(dirs: KilnDirs, settings: Settings) -> Self {
        Self { dirs, settings }
    }

    /// Creates `destination` from the template of `version`, or of the latest
    /// release when `version` is [`None`].
    ///
    /// # Errors
    ///
    /// Fails with [`KilnError::DestinationExists`] before any network access
    /// if `destination` is already taken, and otherwise whenever the template
    /// can not be resolved or copied.
    pub async fn init_project(
        &self,
        destination: &Path,
        version: Option<&str>,
    ) -> anyhow::Result<PathBuf> {
        if destination.symlink_metadata().is_ok() {
            return Err(KilnError::DestinationExists {
                path: destination.to_owned(),
            }
            .into());
        }

        self.dirs.create_cache_root()?;
        trace!("Cache at {}", self.dirs.display_path(&self.dirs.record_file()));

        let mut cache = ReleaseCache::load(self.dirs.cache_root(), &self.dirs.record_file());
        let client = ReleaseClient::new(&self.settings)?;
        let template = Resolver::new(&client, &mut cache, self.settings.name_fragment())
            .resolve(version)
            .await?;

        copy_template(&template, destination)?;
        info!("Created {}", destination.display());

        Ok(template)
    }

    /// Writes every release tag the API lists, one per line.
    pub async fn list_releases(&self, out: &mut impl Write) -> anyhow::Result<()> {
        let client = ReleaseClient::new(&self.settings)?;

        for tag in client.tags().await? {
            writeln!(out, "{tag}")?;
        }

        Ok(())
    }

    /// Writes the cached releases, most recently published first.
    pub fn list_cached(&self, out: &mut impl Write) -> anyhow::Result<()> {
        let cache = ReleaseCache::load(self.dirs.cache_root(), &self.dirs.record_file());

        for record in cache.by_recency() {
            writeln!(
                out,
                "{}\t{}",
                record.tag,
                record.published_at.format("%Y-%m-%d")
            )?;
        }

        Ok(())
    }

    /// Deletes the release records and every cached template. The settings
    /// file is kept; the cache root itself goes only when nothing else is
    /// left in it.
    pub fn clean(&self) -> anyhow::Result<()> {
        let root = self.dirs.cache_root();

        if root.symlink_metadata().is_err() {
            info!("Nothing to clean at {}", self.dirs.display_path(root));
            return Ok(());
        }

        let mut kept = false;
        for entry in root
            .read_dir()
            .with_context(|| format!("Failed to read {}", root.display()))?
        {
            let path = entry?.path();
            if path.file_name().is_some_and(|n| n == CONFIG_FILE) {
                kept = true;
                continue;
            }

            KilnDirs::remove_path(&path)
                .with_context(|| format!("Failed to remove {}", path.display()))?;
            trace!("Removed {}", path.display());
        }

        if kept {
            info!("Cleared {}", self.dirs.display_path(root));
        } else {
            std::fs::remove_dir(root)
                .with_context(|| format!("Failed to remove {}", root.display()))?;
            info!("Removed {}", self.dirs.display_path(root));
        }

        Ok(())
    }
}

/// Copies the contents of `template` into a new `destination` directory,
/// removing it again if the copy fails halfway.
fn copy_template(template: &Path, destination: &Path) -> anyhow::Result<()> {
    let mut options = CopyOptions::new();
    options.content_only = true;

    fs_extra::dir::create_all(destination, false)
        .with_context(|| format!("Failed to create {}", destination.display()))?;

    if let Err(e) = fs_extra::dir::copy(template, destination, &options) {
        if let Err(cleanup) = fs_extra::dir::remove(destination) {
            trace!("Failed to remove {}: {cleanup}", destination.display());
        }
        return Err(e).with_context(|| {
            format!(
                "Failed to copy {} to {}",
                template.display(),
                destination.display()
            )
        });
    }

    Ok(())
}

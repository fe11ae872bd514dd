use anyhow::{anyhow, ensure, Context};
use derive_builder::Builder;
use directories::UserDirs;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::trace;

pub const RECORD_FILE: &str = "releases.json";
pub const CONFIG_FILE: &str = "config.json";

/// Filesystem locations used by kiln.
#[derive(Builder, Debug, Clone)]
#[builder(setter(into))]
pub struct KilnDirs {
    user_home: PathBuf,
    cache_root: PathBuf,
}

impl KilnDirs {
    /// Create a new [`KilnDirs`] builder
    #[must_use]
    pub fn builder() -> KilnDirsBuilder {
        KilnDirsBuilder::create_empty()
    }

    /// Attempt to create a new [`KilnDirs`] instance with the default cache
    /// location.
    ///
    /// The cache root is `$KILN_HOME` when set, `~/.kiln` otherwise.
    ///
    /// # Errors
    ///
    /// Returns an [`Err`] if the user's home directory can not be found.
    pub fn default_paths() -> anyhow::Result<Self> {
        let home = Self::get_user_home()?;
        let cache_root = std::env::var_os("KILN_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| home.join(".kiln"));

        Ok(Self {
            user_home: home,
            cache_root,
        })
    }

    /// Returns the path for the user home `~/`
    ///
    /// # Errors
    ///
    /// Returns an [`Err`] if a path for the users home can not
    /// be found
    pub fn get_user_home() -> anyhow::Result<PathBuf> {
        Ok(UserDirs::new()
            .context("Failed to get user's home directory")?
            .home_dir()
            .to_owned())
    }

    /// Creates the cache root if it is missing.
    ///
    /// # Errors
    ///
    /// Returns an [`Err`] if the path exists but is not a directory, or on
    /// any IO error.
    pub fn create_cache_root(&self) -> anyhow::Result<()> {
        let root = self.cache_root();

        if root.exists() {
            ensure!(
                root.is_dir(),
                anyhow!("Cache root {} is not a directory", root.display())
            );
            return Ok(());
        }

        trace!("Creating cache root {}", root.display());
        std::fs::create_dir_all(root)
            .with_context(|| format!("Failed to create cache root {}", root.display()))
    }

    /// Removes `path`, whatever kind of entry it is.
    pub fn remove_path(path: &Path) -> anyhow::Result<()> {
        let file_type = path.symlink_metadata()?.file_type();

        if file_type.is_dir() {
            std::fs::remove_dir_all(path)?;
        } else {
            std::fs::remove_file(path)?;
        }

        Ok(())
    }

    /// Returns a reference to the user home of this [`KilnDirs`].
    #[must_use]
    pub fn user_home(&self) -> &Path {
        self.user_home.as_path()
    }

    /// Returns a reference to the cache root of this [`KilnDirs`].
    #[must_use]
    pub fn cache_root(&self) -> &Path {
        self.cache_root.as_path()
    }

    /// Path of the persisted release records.
    #[must_use]
    pub fn record_file(&self) -> PathBuf {
        self.cache_root.join(RECORD_FILE)
    }

    /// Path of the optional settings file.
    #[must_use]
    pub fn config_file(&self) -> PathBuf {
        self.cache_root.join(CONFIG_FILE)
    }

    /// Replaces the home prefix of `path` with `~` for display.
    #[must_use]
    pub fn display_path(&self, path: &Path) -> String {
        match path.strip_prefix(self.user_home()) {
            Ok(rest) => Path::new("~").join(rest).display().to_string(),
            Err(_) => path.display().to_string(),
        }
    }
}

/// Where releases come from and how long to wait for them.
#[derive(Builder, Debug, Clone, PartialEq, Eq, Deserialize)]
#[builder(setter(into), default)]
#[serde(default)]
pub struct Settings {
    /// Base URL of the release API
    pub api_url: String,

    /// Template repository as `owner/name`
    pub repository: String,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    /// Bearer token sent to the release API
    #[builder(setter(into, strip_option))]
    pub token: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com".to_string(),
            repository: "kiln-rs/kiln-template".to_string(),
            timeout_secs: 300,
            token: None,
        }
    }
}

impl Settings {
    /// Create a new [`Settings`] builder, pre-filled with the defaults
    #[must_use]
    pub fn builder() -> SettingsBuilder {
        SettingsBuilder::default()
    }

    /// Loads the settings: defaults, then `config.json` in the cache root,
    /// then environment variables.
    ///
    /// # Errors
    ///
    /// Returns an [`Err`] if the settings file exists but can not be read or
    /// parsed, or if an environment override is malformed.
    pub fn load(dirs: &KilnDirs) -> anyhow::Result<Self> {
        Self::from_file(&dirs.config_file())?.with_env()
    }

    /// Reads settings from `path`, falling back to the defaults when the file
    /// does not exist.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        trace!("Reading settings from {}", path.display());

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        serde_json::from_str(&contents)
            .with_context(|| format!("Invalid settings file {}", path.display()))
    }

    /// Applies `KILN_API_URL`, `KILN_REPOSITORY`, `KILN_TIMEOUT` and
    /// `GITHUB_TOKEN` on top of `self`.
    pub fn with_env(mut self) -> anyhow::Result<Self> {
        if let Ok(url) = std::env::var("KILN_API_URL") {
            self.api_url = url;
        }

        if let Ok(repository) = std::env::var("KILN_REPOSITORY") {
            self.repository = repository;
        }

        if let Ok(timeout) = std::env::var("KILN_TIMEOUT") {
            self.timeout_secs = timeout
                .trim()
                .parse()
                .with_context(|| format!("KILN_TIMEOUT must be a number of seconds, got {timeout:?}"))?;
        }

        if let Ok(token) = std::env::var("GITHUB_TOKEN") {
            if !token.is_empty() {
                self.token = Some(token);
            }
        }

        ensure!(
            self.repository.split_once('/').is_some_and(|(owner, name)| {
                !owner.is_empty() && !name.is_empty() && !name.contains('/')
            }),
            anyhow!(
                "Repository must look like owner/name, got {:?}",
                self.repository
            )
        );

        Ok(self)
    }

    /// The repository name, which appears in the root folder of every
    /// release archive.
    #[must_use]
    pub fn name_fragment(&self) -> &str {
        self.repository
            .rsplit_once('/')
            .map_or(self.repository.as_str(), |(_, name)| name)
    }

    #[must_use]
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs)
    }
}

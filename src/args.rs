pub use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[clap(version, about, disable_version_flag = true)]
pub struct Args {
    #[clap(subcommand)]
    pub command: Commands,

    /// Print version
    #[allow(dead_code)]
    #[clap(short = 'v', long, action = clap::ArgAction::Version)]
    version: Option<bool>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a new project from a template release
    Create {
        /// Name of the directory to create
        name: String,

        /// Release to use [default: latest]
        version: Option<String>,
    },
    /// List available template releases
    List {
        /// Show releases already downloaded instead of asking the server
        #[clap(long, short)]
        cached: bool,
    },
    /// Remove every downloaded release and the release records
    Clean,
}

impl Commands {
    /// The requested version, with an empty argument meaning latest.
    #[must_use]
    pub fn version(&self) -> Option<&str> {
        match self {
            Commands::Create { version, .. } => version.as_deref().filter(|v| !v.is_empty()),
            _ => None,
        }
    }
}

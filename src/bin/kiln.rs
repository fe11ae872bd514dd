use anyhow::Result;
use clap::Parser;
use std::{path::Path, process::ExitCode};
use kiln::{
    args::{Args, Commands},
    config::{KilnDirs, Settings},
    error,
    project::ProjectInitializer,
    trace,
};

async fn app(args: &Args) -> Result<()> {
    let dirs = KilnDirs::default_paths()?;
    let settings = Settings::load(&dirs)?;

    trace!("Cache root: {}", dirs.cache_root().display());
    trace!("Repository: {} at {}", settings.repository, settings.api_url);

    let kiln = ProjectInitializer::new(dirs, settings);

    match args.command {
        Commands::Create { ref name, .. } => kiln
            .init_project(Path::new(name), args.command.version())
            .await
            .map(|_| ()),
        Commands::List { cached: false } => kiln.list_releases(&mut std::io::stdout()).await,
        Commands::List { cached: true } => kiln.list_cached(&mut std::io::stdout()),
        Commands::Clean => kiln.clean(),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    match app(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

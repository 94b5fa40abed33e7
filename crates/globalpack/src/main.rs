use std::{
    fs::File,
    io::{self, BufReader, Read},
    path::PathBuf,
};

use anyhow::{Context, Result};
use clap::Parser;
use globalpack::{
    BundlePipeline, GlobalPackError, ModuleRecord, config::FileConfig, install,
};
use log::{debug, info};

/// Write every module of a bundle to its own file
#[derive(Debug, Parser)]
#[command(name = "globalpack", version, about)]
struct Cli {
    /// Newline-delimited JSON module records; reads stdin when omitted or `-`
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Directory receiving prelude.js, postlude.js and one file per module
    #[arg(short = 'o', long)]
    write_to_dir: Option<PathBuf>,

    /// Global object modules are registered on (default: window.modules)
    #[arg(long)]
    scope: Option<String>,

    /// Print `<source> -> <target>` for every written module
    #[arg(short, long)]
    verbose: bool,

    /// Create missing parent directories of output files
    #[arg(long)]
    create_dirs: bool,

    /// Configuration file (default: ./globalpack.toml if present)
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Cli {
    fn overrides(&self) -> FileConfig {
        FileConfig {
            write_to_dir: self.write_to_dir.clone(),
            scope: self.scope.clone(),
            verbose: self.verbose.then_some(true),
            create_dirs: self.create_dirs.then_some(true),
        }
    }

    fn open_input(&self) -> Result<Box<dyn Read>> {
        match &self.input {
            Some(path) if path.as_os_str() != "-" => {
                let file = File::open(path)
                    .with_context(|| format!("Failed to open input {}", path.display()))?;
                Ok(Box::new(BufReader::new(file)))
            }
            _ => Ok(Box::new(io::stdin().lock())),
        }
    }
}

/// Decode records lazily so the bundler output is never read ahead
fn read_records(
    reader: impl Read,
) -> impl Iterator<Item = globalpack::Result<ModuleRecord>> {
    serde_json::Deserializer::from_reader(reader)
        .into_iter::<ModuleRecord>()
        .map(|record| record.map_err(GlobalPackError::upstream))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    debug!("{cli:?}");

    let project_dir = std::env::current_dir().context("Failed to resolve working directory")?;
    let mut file_config = FileConfig::load(cli.config.as_deref(), &project_dir)
        .context("Failed to load configuration")?;
    file_config.merge(cli.overrides());

    let mut pipeline = BundlePipeline::new();
    install(&mut pipeline, file_config.into_config())?;

    let records = read_records(cli.open_input()?);
    let summary = pipeline.bundle(records).context("Bundle failed")?;
    info!(
        "Wrote {} files for {} modules",
        summary.files.len(),
        summary.modules
    );
    Ok(())
}

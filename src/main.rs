use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;

use depwatch::config::Config;
use depwatch::dependency::{DependencyFactory, batch};
use depwatch::logging::{self, LogOptions};

#[derive(Parser)]
#[command(name = "depwatch")]
#[command(version, about = "Resolves upstream releases of build dependencies")]
struct Cli {
    /// JSON config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log to depwatch.log in the data directory instead of stderr
    #[arg(long, global = true)]
    log_file: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List released versions, newest first
    Versions {
        /// Ecosystem name
        #[arg(long)]
        name: String,
    },
    /// Resolve one version to its verified artifact metadata
    Resolve {
        /// Ecosystem name
        #[arg(long)]
        name: String,
        #[arg(long)]
        version: String,
    },
    /// Print the release date of one version
    ReleaseDate {
        /// Ecosystem name
        #[arg(long)]
        name: String,
        #[arg(long)]
        version: String,
    },
    /// List released versions missing from the known ones
    NewVersions {
        /// Ecosystem name
        #[arg(long)]
        name: String,
        /// Version already known; repeatable
        #[arg(long)]
        known: Vec<String>,
    },
    /// Exit successfully when the ecosystem is supported
    Supports {
        /// Ecosystem name
        #[arg(long)]
        name: String,
    },
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let _guard = logging::init(LogOptions {
        file: cli.log_file,
        json: cli.log_json,
    })?;

    let config = Config::load(cli.config.as_deref())?;
    let factory = DependencyFactory::from_config(&config).context("Failed to load quirks")?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run(cli.command, &factory))
}

async fn run(command: Command, factory: &DependencyFactory) -> anyhow::Result<ExitCode> {
    match command {
        Command::Versions { name } => {
            let source = factory.create(&name)?;
            print_json(&source.list_versions().await?)?;
        }
        Command::Resolve { name, version } => {
            let source = factory.create(&name)?;
            print_json(&source.resolve(&version).await?)?;
        }
        Command::ReleaseDate { name, version } => {
            let source = factory.create(&name)?;
            print_json(&source.release_date(&version).await?)?;
        }
        Command::NewVersions { name, known } => {
            let source = factory.create(&name)?;
            print_json(&batch::new_versions(source.as_ref(), &known).await?)?;
        }
        Command::Supports { name } => {
            if !factory.supports(&name) {
                return Ok(ExitCode::FAILURE);
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

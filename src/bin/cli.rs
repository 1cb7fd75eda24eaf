//! regwatch CLI
//!
//! Local execution entry point: runs one site plugin through the
//! crawl-and-ingest pipeline against a storage directory.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use regwatch::{
    convert::ConverterRegistry,
    error::Result,
    models::Config,
    pipeline::{PipelineDeps, PluginRunner, RunOptions},
    plugins::PluginRegistry,
    storage::{ContentStore, LocalIndex},
    utils::http::Fetcher,
};

/// regwatch - Regulatory Publication Crawler
#[derive(Parser, Debug)]
#[command(
    name = "regwatch",
    version,
    about = "Crawls regulatory publication sources and ingests new documents"
)]
struct Cli {
    /// Path to storage directory containing config and crawl state
    #[arg(short, long, default_value = "storage")]
    storage_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one plugin through the full pipeline
    Run {
        /// Plugin name (see `plugins`)
        plugin: String,

        /// Maximum number of new documents to ingest
        #[arg(long)]
        limit: Option<usize>,

        /// Initial import: never stop discovery at known documents
        #[arg(long)]
        initial: bool,
    },

    /// List available plugins
    Plugins,

    /// Validate configuration files
    Validate,

    /// Show storage and index info
    Info,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config_path = cli.storage_dir.join("config.toml");
    let config = Config::load_or_default(&config_path);
    let registry = PluginRegistry::with_builtins();

    match cli.command {
        Command::Run {
            plugin,
            limit,
            initial,
        } => {
            config.validate()?;
            let plugin = registry.create(&plugin)?;

            let index = Arc::new(
                LocalIndex::open(cli.storage_dir.join(&config.storage.index_file)).await?,
            );
            let content_store =
                ContentStore::open(cli.storage_dir.join(&config.storage.content_dir)).await?;
            let deps = PipelineDeps {
                fetcher: Fetcher::new(&config.crawler)?,
                converters: ConverterRegistry::from_config(&config.convert),
                content_store,
                index,
            };

            let runner = PluginRunner::new(plugin, deps, &config.pipeline);
            let summary = runner.run(RunOptions { limit, initial }).await?;

            log::info!(
                "Run finished: {} discovered, {} stored, {} skipped, {} failed",
                summary.discovered,
                summary.stored,
                summary.skipped,
                summary.failed
            );
        }

        Command::Plugins => {
            for name in registry.names() {
                println!("{}", name);
            }
        }

        Command::Validate => {
            log::info!("Validating configuration...");
            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            log::info!("All validations passed!");
        }

        Command::Info => {
            log::info!("Storage directory: {}", cli.storage_dir.display());

            let index_path = cli.storage_dir.join(&config.storage.index_file);
            if index_path.exists() {
                let index = LocalIndex::open(&index_path).await?;
                log::info!("Index: {} documents", index.len().await);
            } else {
                log::info!("Index: not found");
            }

            let content_dir = cli.storage_dir.join(&config.storage.content_dir);
            match std::fs::read_dir(&content_dir) {
                Ok(entries) => log::info!("Content store: {} files", entries.count()),
                Err(_) => log::info!("Content store: not found"),
            }
        }
    }

    Ok(())
}

//! BGG Ingest - BoardGameGeek catalog harvester

use anyhow::{Context, Result};
use bgg_common::logging::{init_logging, LogConfig, LogFormat, LogLevel};
use bgg_ingest::config::{IngestConfig, IngestConfigBuilder, PagePolicy, RetryPolicy};
use bgg_ingest::pipeline::Pipeline;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "bgg-ingest")]
#[command(author, version, about = "Harvest BoardGameGeek games and families into CSV tables")]
struct Cli {
    /// Parent directory of the run output folder
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Game listing pages to walk (exclusive upper bound, 0 = read from page 1)
    #[arg(long)]
    game_pages: Option<u32>,

    /// Family listing pages to walk (exclusive upper bound, 0 = read from page 1)
    #[arg(long)]
    family_pages: Option<u32>,

    /// Identifiers per API request (1-400)
    #[arg(short, long)]
    batch_size: Option<usize>,

    /// Attempts per request before giving up (0 = retry forever)
    #[arg(long)]
    max_retries: Option<u32>,

    /// Skip the game pass
    #[arg(long)]
    skip_games: bool,

    /// Skip the family pass
    #[arg(long)]
    skip_families: bool,

    /// Write directly into the output directory instead of a timestamped subfolder
    #[arg(long)]
    no_timestamp: bool,

    /// Hide the progress bar
    #[arg(long)]
    quiet: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Log format (text or json)
    #[arg(long)]
    log_format: Option<LogFormat>,
}

impl Cli {
    /// Apply command line overrides on top of env/default configuration
    fn apply(&self, config: IngestConfig) -> IngestConfig {
        let mut builder = IngestConfigBuilder::from_config(config);

        if let Some(dir) = &self.output_dir {
            builder = builder.output_dir(dir);
        }
        if let Some(pages) = self.game_pages {
            builder = builder.game_pages(pages);
        }
        if let Some(pages) = self.family_pages {
            builder = builder.family_pages(pages);
        }
        if let Some(size) = self.batch_size {
            builder = builder.batch_size(size);
        }
        if self.skip_games {
            builder = builder.run_games(false);
        }
        if self.skip_families {
            builder = builder.run_families(false);
        }
        if self.no_timestamp {
            builder = builder.timestamped_output(false);
        }
        if self.quiet {
            builder = builder.show_progress(false);
        }

        let mut config = builder.build();
        if let Some(attempts) = self.max_retries {
            config.retry.limit = RetryPolicy::from_attempts(attempts).limit;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Initialize logging based on verbose flag
    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let mut log_builder = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("bgg-ingest");
    if let Some(format) = cli.log_format {
        log_builder = log_builder.format(format);
    }

    // Environment variables take precedence
    let log_config = log_builder.build().merge_env()?;
    let _guard = init_logging(&log_config)?;

    let config = cli.apply(IngestConfig::from_env().context("Invalid BGG_* environment")?);
    info!(
        "Games: {}, families: {}, batch size {}",
        describe(config.run_games, config.games.pages),
        describe(config.run_families, config.families.pages),
        config.batch_size
    );

    let pipeline = Pipeline::new(config).context("Invalid configuration")?;
    let summary = pipeline.run().await?;

    info!("Ingestion complete: {}", summary.root.display());
    Ok(())
}

fn describe(enabled: bool, pages: PagePolicy) -> String {
    match (enabled, pages) {
        (false, _) => "skipped".to_string(),
        (true, PagePolicy::Fixed(last)) => format!("pages 1..{}", last),
        (true, PagePolicy::DiscoverLast) => "all pages".to_string(),
    }
}

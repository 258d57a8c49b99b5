//! Run orchestration
//!
//! A run discovers identifiers, fetches them in batches, decomposes each
//! batch into rows and appends those rows to CSV tables under the run root.
//! Games and families are two independent passes over the same stages.

use bgg_common::types::{EntityKind, Identifier, Row, TableRef};
use chrono::{DateTime, Local};
use futures::StreamExt;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::IngestConfig;
use crate::decompose::{decompose_families, decompose_games};
use crate::discover::Discoverer;
use crate::fetch::{Batch, BatchFetcher};
use crate::http::HttpClient;
use crate::progress::create_batch_progress;
use crate::sink::CsvSink;
use crate::{IngestError, Phase, Result};

pub const GAME_TABLE: &str = "game_data";
pub const LINKS_FOLDER: &str = "links";
pub const RANKS_FOLDER: &str = "ranks";
pub const FAMILY_FOLDER: &str = "family";
pub const FAMILY_TABLE: &str = "families";

// ============================================================================
// Run context
// ============================================================================

/// Output location of one run
#[derive(Debug, Clone)]
pub struct RunContext {
    root: PathBuf,
    started_at: DateTime<Local>,
}

impl RunContext {
    /// Resolve and create the run root.
    ///
    /// With `timestamped_output` the root is a fresh `output_YYYYMMDD_HHMMSS`
    /// directory below `output_dir`; if that name is taken (two runs in the
    /// same second) a `_1`, `_2`, ... suffix is added. Without it the root is
    /// `output_dir` itself and existing tables are appended to.
    pub fn create(config: &IngestConfig) -> Result<Self> {
        let started_at = Local::now();
        if !config.timestamped_output {
            return Self::at(&config.output_dir);
        }

        fs::create_dir_all(&config.output_dir)?;
        let root = create_fresh_dir(&config.output_dir, &run_root_name(&started_at))?;
        Ok(Self { root, started_at })
    }

    /// Run rooted at an explicit directory.
    ///
    /// The directory may already exist; tables in it are appended to.
    pub fn at(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            started_at: Local::now(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    pub fn sink(&self) -> CsvSink {
        CsvSink::new(&self.root)
    }
}

pub fn run_root_name(started_at: &DateTime<Local>) -> String {
    format!("output_{}", started_at.format("%Y%m%d_%H%M%S"))
}

const MAX_ROOT_SUFFIX: u32 = 1000;

/// Create `parent/name`, or the first free `parent/name_N`
fn create_fresh_dir(parent: &Path, name: &str) -> Result<PathBuf> {
    for suffix in 0..=MAX_ROOT_SUFFIX {
        let candidate = if suffix == 0 {
            parent.join(name)
        } else {
            parent.join(format!("{}_{}", name, suffix))
        };
        match fs::create_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                debug!("Run root {} already exists", candidate.display());
            },
            Err(e) => return Err(e.into()),
        }
    }
    Err(IngestError::Config(format!(
        "no free run root named {} under {}",
        name,
        parent.display()
    )))
}

// ============================================================================
// Summaries
// ============================================================================

/// Counts for one entity pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntitySummary {
    pub identifiers: usize,
    pub batches: usize,
    pub items: usize,
    /// Rows written per table, keyed by `folder/name`
    pub tables: BTreeMap<String, usize>,
}

impl EntitySummary {
    pub fn rows(&self) -> usize {
        self.tables.values().sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub root: PathBuf,
    pub games: Option<EntitySummary>,
    pub families: Option<EntitySummary>,
}

impl RunSummary {
    /// Rows written per table across both passes
    pub fn tables(&self) -> BTreeMap<String, usize> {
        let mut tables = BTreeMap::new();
        for summary in [&self.games, &self.families].into_iter().flatten() {
            for (table, rows) in &summary.tables {
                *tables.entry(table.clone()).or_insert(0) += rows;
            }
        }
        tables
    }
}

// ============================================================================
// Pipeline
// ============================================================================

pub struct Pipeline {
    config: IngestConfig,
    discoverer: Discoverer,
    fetcher: BatchFetcher,
}

impl Pipeline {
    pub fn new(config: IngestConfig) -> Result<Self> {
        config.validate()?;
        let http = HttpClient::new(&config)?;
        let fetcher = BatchFetcher::from_config(http.clone(), &config)?;

        Ok(Self {
            discoverer: Discoverer::new(http),
            fetcher,
            config,
        })
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Run every enabled pass into a fresh run root
    pub async fn run(&self) -> Result<RunSummary> {
        let ctx = RunContext::create(&self.config)?;
        self.run_in(&ctx).await
    }

    pub async fn run_in(&self, ctx: &RunContext) -> Result<RunSummary> {
        info!("Starting run in {}", ctx.root().display());

        let games = if self.config.run_games {
            Some(self.run_games(ctx).await?)
        } else {
            info!("Game pass disabled");
            None
        };

        let families = if self.config.run_families {
            Some(self.run_families(ctx).await?)
        } else {
            info!("Family pass disabled");
            None
        };

        let summary = RunSummary {
            root: ctx.root().to_path_buf(),
            games,
            families,
        };
        for (table, rows) in summary.tables() {
            info!(table = %table, rows, "Table written");
        }
        info!(
            "Run complete in {}s: {} tables under {}",
            (Local::now() - ctx.started_at()).num_seconds(),
            summary.tables().len(),
            summary.root.display()
        );
        Ok(summary)
    }

    /// Games: primary rows to `game_data`, links to `links/<type>`, ranks to
    /// `ranks/<scheme>`
    pub async fn run_games(&self, ctx: &RunContext) -> Result<EntitySummary> {
        let ids = self.discoverer.discover_listing(&self.config.games).await?;
        info!("Discovered {} games", ids.len());

        let options = self.config.decompose;
        self.fetch_and_sink(ctx, EntityKind::Game, &ids, |batch| {
            let games = decompose_games(&batch.document, &options)?;
            let mut tables: BTreeMap<TableRef, Vec<Row>> = BTreeMap::new();

            for game in games {
                debug!(id = %game.id, name = %game.name, rows = game.row_count(), "Processed game");
                tables.entry(TableRef::root(GAME_TABLE)?).or_default().push(game.primary);
                for (link_type, rows) in game.links {
                    tables
                        .entry(TableRef::in_folder(LINKS_FOLDER, link_type.as_str())?)
                        .or_default()
                        .extend(rows);
                }
                for (scheme, row) in game.ranks {
                    tables
                        .entry(TableRef::from_upstream(RANKS_FOLDER, &scheme)?)
                        .or_default()
                        .push(row);
                }
            }
            Ok(tables)
        })
        .await
    }

    /// Families: one row per linked game to `family/families`
    pub async fn run_families(&self, ctx: &RunContext) -> Result<EntitySummary> {
        let ids = self.discoverer.discover_listing(&self.config.families).await?;
        info!("Discovered {} families", ids.len());

        let options = self.config.decompose;
        self.fetch_and_sink(ctx, EntityKind::Family, &ids, |batch| {
            for item in &batch.document.items {
                debug!(id = %item.id, name = item.primary_name().unwrap_or_default(), "Processed family");
            }
            let rows = decompose_families(&batch.document, &options)?;
            let mut tables = BTreeMap::new();
            if !rows.is_empty() {
                tables.insert(TableRef::in_folder(FAMILY_FOLDER, FAMILY_TABLE)?, rows);
            }
            Ok(tables)
        })
        .await
    }

    /// Fetch batches lazily, decompose each into per-table rows and append
    /// them before requesting the next batch.
    async fn fetch_and_sink<F>(
        &self,
        ctx: &RunContext,
        kind: EntityKind,
        ids: &[Identifier],
        mut decompose: F,
    ) -> Result<EntitySummary>
    where
        F: FnMut(&Batch) -> Result<BTreeMap<TableRef, Vec<Row>>>,
    {
        let mut sink = ctx.sink();
        let mut summary = EntitySummary {
            identifiers: ids.len(),
            ..EntitySummary::default()
        };

        let progress = create_batch_progress(
            self.fetcher.batch_count(ids.len()) as u64,
            &format!("Fetching {} batches", kind),
            self.config.show_progress,
        );

        let batches = self.fetcher.fetch_batches(kind, ids);
        let mut batches = std::pin::pin!(batches);

        while let Some(batch) = batches.next().await {
            let batch = batch?;
            let location = batch.location();

            let tables = decompose(&batch).map_err(|e| e.in_phase(Phase::Decompose, &location))?;
            for (table, rows) in &tables {
                if rows.is_empty() {
                    continue;
                }
                sink.append(table, rows)
                    .map_err(|e| e.in_phase(Phase::Sink, format!("{} table {}", location, table)))?;
            }

            summary.batches += 1;
            summary.items += batch.document.len();
            progress.inc(1);
        }
        progress.finish_and_clear();

        summary.tables = sink
            .rows_written()
            .iter()
            .map(|(table, rows)| (table.to_string(), *rows))
            .collect();
        info!(
            kind = %kind,
            identifiers = summary.identifiers,
            batches = summary.batches,
            items = summary.items,
            rows = summary.rows(),
            "Finished {} pass",
            kind
        );
        Ok(summary)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn test_run_root_name() {
        let ts = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(run_root_name(&ts), "output_20240309_070501");
    }

    #[test]
    fn test_context_creates_timestamped_root() {
        let dir = TempDir::new().unwrap();
        let config = IngestConfig::builder().output_dir(dir.path()).build();

        let ctx = RunContext::create(&config).unwrap();
        assert!(ctx.root().is_dir());
        assert!(ctx.root().starts_with(dir.path()));
        let name = ctx.root().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("output_"));
        assert_eq!(name.len(), "output_YYYYMMDD_HHMMSS".len());
    }

    #[test]
    fn test_runs_in_the_same_second_get_separate_roots() {
        let dir = TempDir::new().unwrap();
        let config = IngestConfig::builder().output_dir(dir.path()).build();
        let table = TableRef::root(GAME_TABLE).unwrap();

        let first = RunContext::create(&config).unwrap();
        let second = RunContext::create(&config).unwrap();
        assert_ne!(first.root(), second.root());

        let mut sink = first.sink();
        sink.append(&table, &[Row::new().with("id", "1")]).unwrap();
        let mut sink = second.sink();
        sink.append(&table, &[Row::new().with("id", "2")]).unwrap();
        assert_eq!(fs::read_to_string(first.root().join("game_data.csv")).unwrap(), "id\n1\n");
        assert_eq!(fs::read_to_string(second.root().join("game_data.csv")).unwrap(), "id\n2\n");
    }

    #[test]
    fn test_taken_root_name_gets_suffix() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("output_20240309_070501")).unwrap();
        fs::create_dir(dir.path().join("output_20240309_070501_1")).unwrap();

        let root = create_fresh_dir(dir.path(), "output_20240309_070501").unwrap();
        assert_eq!(root, dir.path().join("output_20240309_070501_2"));
        assert!(root.is_dir());
    }

    #[test]
    fn test_context_without_timestamp_uses_output_dir() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("plain");
        let config = IngestConfig::builder()
            .output_dir(&root)
            .timestamped_output(false)
            .build();

        let ctx = RunContext::create(&config).unwrap();
        assert_eq!(ctx.root(), root.as_path());
    }

    #[test]
    fn test_summary_merges_tables() {
        let games = EntitySummary {
            tables: BTreeMap::from([("game_data".to_string(), 3), ("ranks/boardgame".to_string(), 2)]),
            ..EntitySummary::default()
        };
        let families = EntitySummary {
            tables: BTreeMap::from([("family/families".to_string(), 4)]),
            ..EntitySummary::default()
        };
        let summary = RunSummary {
            root: PathBuf::from("out"),
            games: Some(games),
            families: Some(families),
        };

        assert_eq!(summary.tables().len(), 3);
        assert_eq!(summary.games.as_ref().unwrap().rows(), 5);
    }

    #[test]
    fn test_pipeline_rejects_invalid_config() {
        let config = IngestConfig::builder().batch_size(0).build();
        assert!(Pipeline::new(config).is_err());
    }
}

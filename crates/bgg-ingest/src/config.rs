//! Ingestion configuration
//!
//! Defaults reproduce a full catalog run: the top 200 browse pages of games,
//! every browse page of families, batches of 400 ids against the public XML
//! API. Values can be overridden from `BGG_*` environment variables, the
//! builder, or the command line.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::{IngestError, Result};

/// Upper bound on identifiers per API request, imposed by the upstream endpoint
pub const MAX_BATCH_SIZE: usize = 400;

pub const DEFAULT_API_BASE: &str = "https://api.geekdo.com/xmlapi2";
pub const DEFAULT_GAME_LISTING_URL: &str = "https://boardgamegeek.com/browse/boardgame/page/";
pub const DEFAULT_GAME_SELECTOR: &str = ".collection_objectname a";
pub const DEFAULT_FAMILY_LISTING_URL: &str =
    "https://boardgamegeek.com/browse/boardgamefamily/page/";
pub const DEFAULT_FAMILY_SELECTOR: &str = ".forum_table a";
pub const DEFAULT_GAME_PAGES: u32 = 200;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// How many listing pages to walk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", content = "pages", rename_all = "snake_case")]
pub enum PagePolicy {
    /// Walk pages `1..n` (the count is an exclusive upper bound)
    Fixed(u32),
    /// Read the last page number from page 1's pagination control, then walk up to it
    DiscoverLast,
}

impl PagePolicy {
    /// `0` selects [`PagePolicy::DiscoverLast`]
    pub fn from_count(pages: u32) -> Self {
        if pages == 0 {
            PagePolicy::DiscoverLast
        } else {
            PagePolicy::Fixed(pages)
        }
    }
}

/// Attempt limit for transient failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "limit", content = "attempts", rename_all = "snake_case")]
pub enum RetryLimit {
    /// Give up after this many attempts in total
    Bounded(u32),
    Unbounded,
}

/// Delay between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backoff", content = "millis", rename_all = "snake_case")]
pub enum Backoff {
    None,
    Fixed(u64),
}

/// Retry policy shared by listing page and batch requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub limit: RetryLimit,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            limit: RetryLimit::Bounded(DEFAULT_MAX_ATTEMPTS),
            backoff: Backoff::None,
        }
    }
}

impl RetryPolicy {
    /// Whether another attempt may follow attempt number `attempt` (1-based)
    pub fn allows_retry(&self, attempt: u32) -> bool {
        match self.limit {
            RetryLimit::Bounded(max) => attempt < max,
            RetryLimit::Unbounded => true,
        }
    }

    pub fn delay(&self) -> Option<Duration> {
        match self.backoff {
            Backoff::None | Backoff::Fixed(0) => None,
            Backoff::Fixed(millis) => Some(Duration::from_millis(millis)),
        }
    }

    /// `0` attempts means unbounded
    pub fn from_attempts(attempts: u32) -> Self {
        let limit = if attempts == 0 {
            RetryLimit::Unbounded
        } else {
            RetryLimit::Bounded(attempts)
        };
        Self {
            limit,
            ..Self::default()
        }
    }
}

/// What to do when an item lacks a scalar attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MissingAttributePolicy {
    /// Emit the column with a null cell
    #[default]
    NullFill,
    /// Fail the whole run
    Fail,
}

impl std::str::FromStr for MissingAttributePolicy {
    type Err = IngestError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "null" | "null_fill" | "null-fill" => Ok(MissingAttributePolicy::NullFill),
            "fail" | "strict" => Ok(MissingAttributePolicy::Fail),
            _ => Err(IngestError::Config(format!(
                "Invalid missing attribute policy: {}",
                s
            ))),
        }
    }
}

/// Options for turning items into rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecomposeOptions {
    pub missing_attributes: MissingAttributePolicy,
    /// Add a 1-based `order` column to link rows
    pub link_order: bool,
}

impl Default for DecomposeOptions {
    fn default() -> Self {
        Self {
            missing_attributes: MissingAttributePolicy::NullFill,
            link_order: true,
        }
    }
}

/// Where and how to discover identifiers for one entity kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingConfig {
    /// Listing URL; the page number is appended
    pub url: String,
    /// CSS selector matching the anchors that carry identifiers
    pub selector: String,
    pub pages: PagePolicy,
}

/// Main ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Parent directory of run roots
    pub output_dir: PathBuf,
    /// Create `output_YYYYMMDD_HHMMSS` below `output_dir` instead of writing into it directly
    pub timestamped_output: bool,
    /// XML API base URL; `thing` and `family` are resolved below it
    pub api_base: String,
    pub games: ListingConfig,
    pub families: ListingConfig,
    pub run_games: bool,
    pub run_families: bool,
    pub batch_size: usize,
    pub retry: RetryPolicy,
    /// Per-request timeout
    pub timeout_secs: u64,
    pub user_agent: String,
    pub decompose: DecomposeOptions,
    pub show_progress: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            timestamped_output: true,
            api_base: DEFAULT_API_BASE.to_string(),
            games: ListingConfig {
                url: DEFAULT_GAME_LISTING_URL.to_string(),
                selector: DEFAULT_GAME_SELECTOR.to_string(),
                pages: PagePolicy::Fixed(DEFAULT_GAME_PAGES),
            },
            families: ListingConfig {
                url: DEFAULT_FAMILY_LISTING_URL.to_string(),
                selector: DEFAULT_FAMILY_SELECTOR.to_string(),
                pages: PagePolicy::DiscoverLast,
            },
            run_games: true,
            run_families: true,
            batch_size: MAX_BATCH_SIZE,
            retry: RetryPolicy::default(),
            timeout_secs: 60,
            user_agent: concat!("bgg-ingest/", env!("CARGO_PKG_VERSION")).to_string(),
            decompose: DecomposeOptions::default(),
            show_progress: true,
        }
    }
}

impl IngestConfig {
    pub fn builder() -> IngestConfigBuilder {
        IngestConfigBuilder::default()
    }

    /// Load configuration from environment variables on top of the defaults
    pub fn from_env() -> Result<Self> {
        Self::default().merge_env()
    }

    /// Overlay `BGG_*` environment variables onto `self`.
    ///
    /// Environment variables:
    /// - `BGG_OUTPUT_DIR`, `BGG_TIMESTAMPED_OUTPUT`
    /// - `BGG_API_BASE`
    /// - `BGG_GAME_LISTING_URL`, `BGG_GAME_SELECTOR`, `BGG_GAME_PAGES` (`0` = discover)
    /// - `BGG_FAMILY_LISTING_URL`, `BGG_FAMILY_SELECTOR`, `BGG_FAMILY_PAGES` (`0` = discover)
    /// - `BGG_BATCH_SIZE`
    /// - `BGG_MAX_RETRIES` (attempts, `0` = unbounded), `BGG_RETRY_BACKOFF_MS`
    /// - `BGG_TIMEOUT_SECS`
    /// - `BGG_MISSING_ATTRIBUTES` (`null` or `fail`), `BGG_LINK_ORDER`
    pub fn merge_env(mut self) -> Result<Self> {
        if let Some(dir) = env_var("BGG_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        if let Some(flag) = env_parse::<bool>("BGG_TIMESTAMPED_OUTPUT")? {
            self.timestamped_output = flag;
        }
        if let Some(url) = env_var("BGG_API_BASE") {
            self.api_base = url;
        }
        if let Some(url) = env_var("BGG_GAME_LISTING_URL") {
            self.games.url = url;
        }
        if let Some(selector) = env_var("BGG_GAME_SELECTOR") {
            self.games.selector = selector;
        }
        if let Some(pages) = env_parse::<u32>("BGG_GAME_PAGES")? {
            self.games.pages = PagePolicy::from_count(pages);
        }
        if let Some(url) = env_var("BGG_FAMILY_LISTING_URL") {
            self.families.url = url;
        }
        if let Some(selector) = env_var("BGG_FAMILY_SELECTOR") {
            self.families.selector = selector;
        }
        if let Some(pages) = env_parse::<u32>("BGG_FAMILY_PAGES")? {
            self.families.pages = PagePolicy::from_count(pages);
        }
        if let Some(size) = env_parse::<usize>("BGG_BATCH_SIZE")? {
            self.batch_size = size;
        }
        if let Some(attempts) = env_parse::<u32>("BGG_MAX_RETRIES")? {
            self.retry.limit = RetryPolicy::from_attempts(attempts).limit;
        }
        if let Some(millis) = env_parse::<u64>("BGG_RETRY_BACKOFF_MS")? {
            self.retry.backoff = Backoff::Fixed(millis);
        }
        if let Some(secs) = env_parse::<u64>("BGG_TIMEOUT_SECS")? {
            self.timeout_secs = secs;
        }
        if let Some(policy) = env_parse::<MissingAttributePolicy>("BGG_MISSING_ATTRIBUTES")? {
            self.decompose.missing_attributes = policy;
        }
        if let Some(flag) = env_parse::<bool>("BGG_LINK_ORDER")? {
            self.decompose.link_order = flag;
        }
        Ok(self)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            return Err(IngestError::Config(format!(
                "batch size must be between 1 and {}, got {}",
                MAX_BATCH_SIZE, self.batch_size
            )));
        }
        if self.retry.limit == RetryLimit::Bounded(0) {
            return Err(IngestError::Config(
                "bounded retry limit must allow at least one attempt".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(IngestError::Config("timeout must be greater than 0".to_string()));
        }
        if self.api_base.is_empty() {
            return Err(IngestError::Config("API base URL cannot be empty".to_string()));
        }
        for (kind, listing) in [("game", &self.games), ("family", &self.families)] {
            if listing.url.is_empty() {
                return Err(IngestError::Config(format!("{} listing URL cannot be empty", kind)));
            }
            if listing.selector.trim().is_empty() {
                return Err(IngestError::Config(format!("{} selector cannot be empty", kind)));
            }
        }
        if !self.run_games && !self.run_families {
            return Err(IngestError::Config(
                "nothing to do: both games and families are disabled".to_string(),
            ));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    env_var(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| IngestError::Config(format!("{}={}: {}", key, raw, e)))
        })
        .transpose()
}

/// Builder for IngestConfig
#[derive(Debug, Default)]
pub struct IngestConfigBuilder {
    config: IngestConfig,
}

impl IngestConfigBuilder {
    /// Start from an existing configuration (e.g. one loaded from the environment)
    pub fn from_config(config: IngestConfig) -> Self {
        Self { config }
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn timestamped_output(mut self, enabled: bool) -> Self {
        self.config.timestamped_output = enabled;
        self
    }

    pub fn api_base(mut self, url: impl Into<String>) -> Self {
        self.config.api_base = url.into();
        self
    }

    pub fn game_listing(mut self, url: impl Into<String>, selector: impl Into<String>) -> Self {
        self.config.games.url = url.into();
        self.config.games.selector = selector.into();
        self
    }

    pub fn family_listing(mut self, url: impl Into<String>, selector: impl Into<String>) -> Self {
        self.config.families.url = url.into();
        self.config.families.selector = selector.into();
        self
    }

    /// `0` discovers the last page from the pagination control
    pub fn game_pages(mut self, pages: u32) -> Self {
        self.config.games.pages = PagePolicy::from_count(pages);
        self
    }

    /// `0` discovers the last page from the pagination control
    pub fn family_pages(mut self, pages: u32) -> Self {
        self.config.families.pages = PagePolicy::from_count(pages);
        self
    }

    pub fn run_games(mut self, enabled: bool) -> Self {
        self.config.run_games = enabled;
        self
    }

    pub fn run_families(mut self, enabled: bool) -> Self {
        self.config.run_families = enabled;
        self
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.batch_size = size;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.config.retry = retry;
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeout_secs = secs;
        self
    }

    pub fn missing_attributes(mut self, policy: MissingAttributePolicy) -> Self {
        self.config.decompose.missing_attributes = policy;
        self
    }

    pub fn link_order(mut self, enabled: bool) -> Self {
        self.config.decompose.link_order = enabled;
        self
    }

    pub fn show_progress(mut self, enabled: bool) -> Self {
        self.config.show_progress = enabled;
        self
    }

    pub fn build(self) -> IngestConfig {
        self.config
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = IngestConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.batch_size, MAX_BATCH_SIZE);
        assert_eq!(config.games.pages, PagePolicy::Fixed(200));
        assert_eq!(config.families.pages, PagePolicy::DiscoverLast);
        assert_eq!(config.retry.limit, RetryLimit::Bounded(10));
        assert_eq!(config.retry.backoff, Backoff::None);
    }

    #[test]
    fn test_batch_size_cannot_exceed_upstream_limit() {
        let config = IngestConfig::builder().batch_size(401).build();
        assert!(matches!(config.validate(), Err(IngestError::Config(_))));

        let config = IngestConfig::builder().batch_size(0).build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_retry_policy_bounds() {
        let bounded = RetryPolicy::from_attempts(3);
        assert!(bounded.allows_retry(1));
        assert!(bounded.allows_retry(2));
        assert!(!bounded.allows_retry(3));
        assert_eq!(bounded.delay(), None);

        let unbounded = RetryPolicy::from_attempts(0);
        assert_eq!(unbounded.limit, RetryLimit::Unbounded);
        assert!(unbounded.allows_retry(u32::MAX - 1));

        let with_backoff = RetryPolicy {
            backoff: Backoff::Fixed(250),
            ..bounded
        };
        assert_eq!(with_backoff.delay(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_zero_attempts_is_rejected_when_bounded() {
        let config = IngestConfig::builder()
            .retry(RetryPolicy {
                limit: RetryLimit::Bounded(0),
                backoff: Backoff::None,
            })
            .build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_page_policy_from_count() {
        assert_eq!(PagePolicy::from_count(0), PagePolicy::DiscoverLast);
        assert_eq!(PagePolicy::from_count(5), PagePolicy::Fixed(5));
    }

    #[test]
    fn test_missing_attribute_policy_from_str() {
        assert_eq!(
            "null".parse::<MissingAttributePolicy>().unwrap(),
            MissingAttributePolicy::NullFill
        );
        assert_eq!(
            "FAIL".parse::<MissingAttributePolicy>().unwrap(),
            MissingAttributePolicy::Fail
        );
        assert!("zero".parse::<MissingAttributePolicy>().is_err());
    }

    #[test]
    fn test_disabling_everything_is_rejected() {
        let config = IngestConfig::builder()
            .run_games(false)
            .run_families(false)
            .build();
        assert!(config.validate().is_err());
    }
}

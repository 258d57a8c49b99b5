//! BGG Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Harvests the BoardGameGeek catalog into flat CSV tables.
//!
//! # Stages
//!
//! - **Discovery** ([`discover`]): walks the rendered browse pages and collects
//!   catalog identifiers in rank order
//! - **Fetch** ([`fetch`]): requests the XML API in batches of at most 400 ids
//! - **Decompose** ([`decompose`]): splits every item into a primary row, link
//!   rows per link type and rank rows per rank type
//! - **Sink** ([`sink`]): appends rows to per-run CSV tables
//!
//! [`pipeline::Pipeline`] sequences the stages for games and families.
//!
//! # Example
//!
//! ```no_run
//! use bgg_ingest::{config::IngestConfig, pipeline::Pipeline};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = IngestConfig::builder().game_pages(3).run_families(false).build();
//!     let summary = Pipeline::new(config)?.run().await?;
//!     println!("Tables written to {}", summary.root.display());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod decompose;
pub mod discover;
pub mod fetch;
pub mod http;
pub mod models;
pub mod pipeline;
pub mod progress;
pub mod sink;

use bgg_common::BggError;

/// Result type for ingest operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Pipeline stage an error was raised in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Discovery,
    Fetch,
    Decompose,
    Sink,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Discovery => "discovery",
            Phase::Fetch => "fetch",
            Phase::Decompose => "decompose",
            Phase::Sink => "sink",
        };
        f.write_str(name)
    }
}

/// Error types for BGG ingestion
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    Status {
        status: reqwest::StatusCode,
        url: String,
    },

    #[error("Request to {url} was queued upstream (202 Accepted)")]
    Queued { url: String },

    #[error("Malformed document: {0}")]
    MalformedDocument(String),

    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<IngestError>,
    },

    #[error("Item {item_id} is missing required attribute '{attribute}'")]
    MissingAttribute {
        item_id: String,
        attribute: &'static str,
    },

    #[error("Could not determine the last listing page: {0}")]
    Pagination(String),

    #[error("Invalid CSS selector '{0}'")]
    Selector(String),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Refusing to append zero rows to table '{table}'")]
    EmptyRows { table: String },

    #[error("Failed to write table '{table}': {source}")]
    SinkWrite {
        table: String,
        #[source]
        source: csv::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Common(#[from] BggError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{phase} failed at {location}: {source}")]
    Phase {
        phase: Phase,
        location: String,
        #[source]
        source: Box<IngestError>,
    },
}

impl IngestError {
    /// Whether a retry of the same request may succeed.
    ///
    /// Transport failures, non-2xx responses, queued (202) responses and
    /// unparseable documents are transient. Everything else is fatal.
    pub fn is_transient(&self) -> bool {
        match self {
            IngestError::Http(err) => !err.is_builder(),
            IngestError::Status { .. }
            | IngestError::Queued { .. }
            | IngestError::MalformedDocument(_) => true,
            IngestError::Phase { source, .. } => source.is_transient(),
            _ => false,
        }
    }

    /// Attach the pipeline phase and location (page, batch, table) to an error
    pub fn in_phase(self, phase: Phase, location: impl Into<String>) -> Self {
        IngestError::Phase {
            phase,
            location: location.into(),
            source: Box::new(self),
        }
    }

    /// The phase this error was tagged with, if any
    pub fn phase(&self) -> Option<Phase> {
        match self {
            IngestError::Phase { phase, .. } => Some(*phase),
            _ => None,
        }
    }
}

impl From<quick_xml::DeError> for IngestError {
    fn from(err: quick_xml::DeError) -> Self {
        IngestError::MalformedDocument(err.to_string())
    }
}

impl From<quick_xml::Error> for IngestError {
    fn from(err: quick_xml::Error) -> Self {
        IngestError::MalformedDocument(err.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(IngestError::MalformedDocument("eof".into()).is_transient());
        assert!(IngestError::Queued { url: "u".into() }.is_transient());
        assert!(!IngestError::Config("bad".into()).is_transient());
        assert!(!IngestError::MissingAttribute {
            item_id: "1".into(),
            attribute: "name"
        }
        .is_transient());

        let exhausted = IngestError::RetriesExhausted {
            attempts: 10,
            last: Box::new(IngestError::MalformedDocument("eof".into())),
        };
        assert!(!exhausted.is_transient());
    }

    #[test]
    fn test_phase_wrapping_names_location() {
        let err = IngestError::Pagination("no control".into()).in_phase(Phase::Discovery, "page 1");
        assert_eq!(err.phase(), Some(Phase::Discovery));
        assert_eq!(
            err.to_string(),
            "discovery failed at page 1: Could not determine the last listing page: no control"
        );
    }
}

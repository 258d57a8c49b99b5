//! Batched retrieval from the XML API
//!
//! Identifiers are split into contiguous batches of at most
//! [`MAX_BATCH_SIZE`](crate::config::MAX_BATCH_SIZE) and each batch becomes one
//! `GET {api_base}/{thing|family}?type=..&id=a,b,c` request.
//!
//! [`BatchFetcher::fetch_batches`] is a lazy stream: a batch is only requested
//! once the consumer polls for it, so at most one document is in flight.

use bgg_common::types::{EntityKind, Identifier};
use futures::stream::{self, Stream, StreamExt};
use tracing::debug;
use url::Url;

use crate::config::{IngestConfig, MAX_BATCH_SIZE};
use crate::http::HttpClient;
use crate::models::ItemsDocument;
use crate::{IngestError, Phase, Result};

/// Validated batch size in `1..=400`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSize(usize);

impl BatchSize {
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 || size > MAX_BATCH_SIZE {
            return Err(IngestError::Config(format!(
                "batch size must be between 1 and {}, got {}",
                MAX_BATCH_SIZE, size
            )));
        }
        Ok(Self(size))
    }

    pub fn get(self) -> usize {
        self.0
    }
}

impl Default for BatchSize {
    fn default() -> Self {
        Self(MAX_BATCH_SIZE)
    }
}

/// Split identifiers into contiguous, order-preserving batches
pub fn partition(identifiers: &[Identifier], size: BatchSize) -> Vec<&[Identifier]> {
    identifiers.chunks(size.get()).collect()
}

/// One fetched batch
#[derive(Debug)]
pub struct Batch {
    /// Zero-based position in the batch sequence
    pub index: usize,
    pub ids: Vec<Identifier>,
    pub document: ItemsDocument,
}

impl Batch {
    /// Human readable location used in error contexts
    pub fn location(&self) -> String {
        batch_location(self.index, &self.ids)
    }
}

fn batch_location(index: usize, ids: &[Identifier]) -> String {
    match (ids.first(), ids.last()) {
        (Some(first), Some(last)) => format!("batch {} (ids {}..{})", index, first, last),
        _ => format!("batch {}", index),
    }
}

#[derive(Debug, Clone)]
pub struct BatchFetcher {
    http: HttpClient,
    api_base: Url,
    batch_size: BatchSize,
}

impl BatchFetcher {
    pub fn new(http: HttpClient, api_base: &str, batch_size: BatchSize) -> Result<Self> {
        let mut api_base = Url::parse(api_base)?;
        if !api_base.path().ends_with('/') {
            let path = format!("{}/", api_base.path());
            api_base.set_path(&path);
        }
        Ok(Self {
            http,
            api_base,
            batch_size,
        })
    }

    pub fn from_config(http: HttpClient, config: &IngestConfig) -> Result<Self> {
        Self::new(http, &config.api_base, BatchSize::new(config.batch_size)?)
    }

    pub fn batch_size(&self) -> BatchSize {
        self.batch_size
    }

    /// Number of requests needed for `count` identifiers
    pub fn batch_count(&self, count: usize) -> usize {
        count.div_ceil(self.batch_size.get())
    }

    /// Request URL for one batch
    pub fn batch_url(&self, kind: EntityKind, ids: &[Identifier]) -> Result<Url> {
        let mut url = self.api_base.join(kind.api_path())?;
        let joined = ids.iter().map(Identifier::as_str).collect::<Vec<_>>().join(",");
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("type", kind.api_type());
            if kind.wants_stats() {
                query.append_pair("stats", "1");
            }
            query.append_pair("id", &joined);
        }
        Ok(url)
    }

    /// Fetch and parse one batch.
    ///
    /// Parsing happens inside the retry loop, so a truncated body is retried
    /// like a failed request.
    pub async fn fetch_batch(&self, kind: EntityKind, ids: &[Identifier]) -> Result<ItemsDocument> {
        let url = self.batch_url(kind, ids)?;
        self.http
            .retry(url.as_str(), || async {
                let body = self.http.get_text(&url).await?;
                ItemsDocument::parse(&body)
            })
            .await
    }

    /// Lazily fetch every batch in order.
    ///
    /// Errors are tagged with [`Phase::Fetch`] and the batch location.
    pub fn fetch_batches<'a>(
        &'a self,
        kind: EntityKind,
        identifiers: &'a [Identifier],
    ) -> impl Stream<Item = Result<Batch>> + 'a {
        stream::iter(partition(identifiers, self.batch_size).into_iter().enumerate()).then(
            move |(index, ids)| async move {
                debug!(batch = index, size = ids.len(), "Fetching {} batch", kind);
                match self.fetch_batch(kind, ids).await {
                    Ok(document) => Ok(Batch {
                        index,
                        ids: ids.to_vec(),
                        document,
                    }),
                    Err(e) => Err(e.in_phase(Phase::Fetch, batch_location(index, ids))),
                }
            },
        )
    }
}

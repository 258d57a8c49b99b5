//! Append-only CSV tables under a run root
//!
//! Every [`TableRef`] maps to one file, `<root>/<folder>/<name>.csv`. The first
//! append to a file writes the header taken from the first row's column order;
//! later appends write rows only.

use bgg_common::types::{Row, TableRef};
use csv::WriterBuilder;
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::{IngestError, Result};

pub const TABLE_EXTENSION: &str = "csv";

#[derive(Debug)]
pub struct CsvSink {
    root: PathBuf,
    written: BTreeMap<TableRef, usize>,
}

impl CsvSink {
    /// Sink writing below `root`; the directory is created on first append
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            written: BTreeMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, table: &TableRef) -> PathBuf {
        self.root.join(table.relative_path(TABLE_EXTENSION))
    }

    /// Append rows to a table, returning the number of rows written.
    ///
    /// All rows must share the first row's columns.
    pub fn append(&mut self, table: &TableRef, rows: &[Row]) -> Result<usize> {
        let Some(first) = rows.first() else {
            return Err(IngestError::EmptyRows {
                table: table.to_string(),
            });
        };

        let path = self.path_for(table);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let is_new = file.metadata()?.len() == 0;

        let sink_error = |source: csv::Error| IngestError::SinkWrite {
            table: table.to_string(),
            source,
        };

        let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);
        if is_new {
            writer.write_record(first.columns()).map_err(sink_error)?;
        }
        for row in rows {
            writer
                .write_record(row.cells().map(|cell| cell.unwrap_or("")))
                .map_err(sink_error)?;
        }
        writer.flush().map_err(|e| sink_error(e.into()))?;

        debug!(table = %table, rows = rows.len(), new_file = is_new, "Appended rows");
        *self.written.entry(table.clone()).or_insert(0) += rows.len();
        Ok(rows.len())
    }

    /// Rows written per table by this sink
    pub fn rows_written(&self) -> &BTreeMap<TableRef, usize> {
        &self.written
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn row(id: &str, value: Option<&str>) -> Row {
        Row::new().with("gameid", id).with("value", value)
    }

    #[test]
    fn test_header_written_once_across_appends() {
        let dir = TempDir::new().unwrap();
        let mut sink = CsvSink::new(dir.path());
        let table = TableRef::in_folder("ranks", "boardgame").unwrap();

        assert_eq!(sink.append(&table, &[row("1", Some("10")), row("2", Some("20"))]).unwrap(), 2);
        assert_eq!(sink.append(&table, &[row("3", None)]).unwrap(), 1);

        let content = fs::read_to_string(dir.path().join("ranks/boardgame.csv")).unwrap();
        assert_eq!(content, "gameid,value\n1,10\n2,20\n3,\n");
        assert_eq!(sink.rows_written().get(&table), Some(&3));
    }

    #[test]
    fn test_existing_file_gets_no_second_header() {
        let dir = TempDir::new().unwrap();
        let table = TableRef::root("game_data").unwrap();

        CsvSink::new(dir.path()).append(&table, &[row("1", Some("a"))]).unwrap();
        CsvSink::new(dir.path()).append(&table, &[row("2", Some("b"))]).unwrap();

        let content = fs::read_to_string(dir.path().join("game_data.csv")).unwrap();
        assert_eq!(content.lines().count(), 3);
        assert_eq!(content.matches("gameid").count(), 1);
    }

    #[test]
    fn test_empty_rows_touch_nothing() {
        let dir = TempDir::new().unwrap();
        let mut sink = CsvSink::new(dir.path().join("run"));
        let table = TableRef::in_folder("links", "boardgamedesigner").unwrap();

        let err = sink.append(&table, &[]).unwrap_err();
        assert!(matches!(err, IngestError::EmptyRows { .. }));
        assert!(!dir.path().join("run").exists());
        assert!(sink.rows_written().is_empty());
    }

    #[test]
    fn test_values_are_quoted_when_needed() {
        let dir = TempDir::new().unwrap();
        let mut sink = CsvSink::new(dir.path());
        let table = TableRef::in_folder("links", "boardgamepublisher").unwrap();
        let rows = [Row::new().with("id", "7").with("value", "Hans im Glück, \"HiG\"")];

        sink.append(&table, &rows).unwrap();

        let content = fs::read_to_string(sink.path_for(&table)).unwrap();
        assert_eq!(content, "id,value\n7,\"Hans im Glück, \"\"HiG\"\"\"\n");
    }
}

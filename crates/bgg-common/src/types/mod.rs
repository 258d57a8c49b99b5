//! Common types used across the BGG harvest
//!
//! These are the values that flow between the pipeline stages: identifiers
//! produced by discovery, the entity kind that selects an API endpoint, and
//! the flat rows and table references consumed by the CSV sink.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::path::PathBuf;

use crate::error::{BggError, Result};

// ============================================================================
// Identifiers
// ============================================================================

/// Opaque key naming one catalog entity (a game or a family).
///
/// Identifiers are joined with commas into a single batch request parameter,
/// so they may not contain commas or whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identifier(String);

impl Identifier {
    pub fn new(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        if raw.is_empty() || raw.chars().any(|c| c == ',' || c.is_whitespace()) {
            return Err(BggError::InvalidIdentifier(raw));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Identifier {
    type Err = BggError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Identifier {
    type Error = BggError;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Identifier> for String {
    fn from(id: Identifier) -> Self {
        id.0
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// Entity kinds
// ============================================================================

/// The two catalog entity classes harvested by a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// Board games, fetched from the `thing` endpoint with statistics
    Game,
    /// Board game families, fetched from the `family` endpoint
    Family,
}

impl EntityKind {
    /// Path segment of the batch endpoint below the API base
    pub fn api_path(self) -> &'static str {
        match self {
            EntityKind::Game => "thing",
            EntityKind::Family => "family",
        }
    }

    /// Value of the `type` query parameter
    pub fn api_type(self) -> &'static str {
        match self {
            EntityKind::Game => "boardgame",
            EntityKind::Family => "boardgamefamily",
        }
    }

    /// Whether the request asks for rating statistics (`stats=1`)
    pub fn wants_stats(self) -> bool {
        matches!(self, EntityKind::Game)
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Game => write!(f, "game"),
            EntityKind::Family => write!(f, "family"),
        }
    }
}

impl std::str::FromStr for EntityKind {
    type Err = BggError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "game" | "games" | "boardgame" => Ok(EntityKind::Game),
            "family" | "families" | "boardgamefamily" => Ok(EntityKind::Family),
            _ => Err(BggError::UnknownEntityKind(s.to_string())),
        }
    }
}

// ============================================================================
// Output rows
// ============================================================================

/// A single cell. `None` means the value is unknown, which is distinct from zero.
pub type Cell = Option<String>;

/// One flat output row: an ordered mapping of column name to cell.
///
/// Column order is significant: the first row written to a table fixes its
/// header in this order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    cells: Vec<(&'static str, Cell)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            cells: Vec::with_capacity(capacity),
        }
    }

    /// Append a column, builder style
    pub fn with<V: IntoCell>(mut self, column: &'static str, value: V) -> Self {
        self.push(column, value);
        self
    }

    /// Append a column
    pub fn push<V: IntoCell>(&mut self, column: &'static str, value: V) {
        self.cells.push((column, value.into_cell()));
    }

    pub fn columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.cells.iter().map(|(column, _)| *column)
    }

    pub fn cells(&self) -> impl Iterator<Item = Option<&str>> + '_ {
        self.cells.iter().map(|(_, cell)| cell.as_deref())
    }

    /// Look up a cell by column name.
    ///
    /// Returns `None` when the column does not exist and `Some(None)` when it
    /// exists but holds a null.
    pub fn get(&self, column: &str) -> Option<Option<&str>> {
        self.cells
            .iter()
            .find(|(name, _)| *name == column)
            .map(|(_, cell)| cell.as_deref())
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Conversion into a [`Cell`]
pub trait IntoCell {
    fn into_cell(self) -> Cell;
}

impl IntoCell for Cell {
    fn into_cell(self) -> Cell {
        self
    }
}

impl IntoCell for Option<&str> {
    fn into_cell(self) -> Cell {
        self.map(str::to_string)
    }
}

impl IntoCell for String {
    fn into_cell(self) -> Cell {
        Some(self)
    }
}

impl IntoCell for &str {
    fn into_cell(self) -> Cell {
        Some(self.to_string())
    }
}

impl IntoCell for &String {
    fn into_cell(self) -> Cell {
        Some(self.clone())
    }
}

impl IntoCell for usize {
    fn into_cell(self) -> Cell {
        Some(self.to_string())
    }
}

// ============================================================================
// Output tables
// ============================================================================

/// A named output table below the run root.
///
/// Resolves to `<root>/<folder>/<name>.<ext>`, or `<root>/<name>.<ext>` when
/// no folder is set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableRef {
    folder: Option<String>,
    name: String,
}

impl TableRef {
    /// A table directly under the run root
    pub fn root(name: &str) -> Result<Self> {
        Ok(Self {
            folder: None,
            name: validate_component(name)?,
        })
    }

    /// A table inside a subfolder of the run root
    pub fn in_folder(folder: &str, name: &str) -> Result<Self> {
        Ok(Self {
            folder: Some(validate_component(folder)?),
            name: validate_component(name)?,
        })
    }

    /// A table whose name comes from upstream data (e.g. a rank type).
    ///
    /// Surrounding whitespace is trimmed and characters outside
    /// `[A-Za-z0-9_-]` are replaced with `_`, so distinct upstream names can
    /// land in the same table. A rewritten name is logged at warn level.
    pub fn from_upstream(folder: &str, raw_name: &str) -> Result<Self> {
        let sanitized = sanitize_upstream(raw_name);
        if sanitized.trim_matches('_').is_empty() {
            return Err(BggError::InvalidTableName(raw_name.to_string()));
        }
        if let Cow::Owned(name) = &sanitized {
            tracing::warn!(raw = raw_name, table = %name, folder, "Upstream table name rewritten");
        }
        Self::in_folder(folder, &sanitized)
    }

    pub fn folder(&self) -> Option<&str> {
        self.folder.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path of the table file relative to the run root
    pub fn relative_path(&self, extension: &str) -> PathBuf {
        let file = format!("{}.{}", self.name, extension);
        match &self.folder {
            Some(folder) => PathBuf::from(folder).join(file),
            None => PathBuf::from(file),
        }
    }
}

impl std::fmt::Display for TableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.folder {
            Some(folder) => write!(f, "{}/{}", folder, self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Borrowed when `raw` is already a valid table name
fn sanitize_upstream(raw: &str) -> Cow<'_, str> {
    let keep = |c: char| c.is_ascii_alphanumeric() || c == '_' || c == '-';
    if raw.chars().all(keep) {
        return Cow::Borrowed(raw);
    }
    Cow::Owned(
        raw.trim()
            .chars()
            .map(|c| if keep(c) { c } else { '_' })
            .collect(),
    )
}

fn validate_component(raw: &str) -> Result<String> {
    let valid = !raw.is_empty()
        && raw != "."
        && raw != ".."
        && raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.');
    if valid {
        Ok(raw.to_string())
    } else {
        Err(BggError::InvalidTableName(raw.to_string()))
    }
}

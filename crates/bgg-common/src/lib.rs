//! BGG Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, logging, and error handling for the BGG harvest workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`BggError`] and the [`Result`] alias
//! - **Types**: catalog identifiers, entity kinds, flat output rows and table references
//! - **Logging**: `tracing` subscriber setup shared by every binary
//!
//! # Example
//!
//! ```
//! use bgg_common::types::{Identifier, Row, TableRef};
//!
//! let id = Identifier::new("174430")?;
//! let row = Row::new().with("id", id.as_str()).with("name", "Gloomhaven");
//! let table = TableRef::root("game_data")?;
//!
//! assert_eq!(row.columns().collect::<Vec<_>>(), vec!["id", "name"]);
//! assert_eq!(table.to_string(), "game_data");
//! # Ok::<(), bgg_common::BggError>(())
//! ```

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{BggError, Result};

//! Document decomposition
//!
//! Turns nested API items into flat rows. A game item yields:
//!
//! - one primary row (`id`, `name`, fixed scalar columns, `image`)
//! - zero or more link rows per [`LinkType`], each carrying the game id
//! - one rank row per ranking scheme the game appears in
//!
//! A family item yields one row per linked game.
//!
//! This module never touches the filesystem; choosing destination tables is
//! the pipeline's job.

use bgg_common::types::Row;
use tracing::warn;

use crate::config::{DecomposeOptions, MissingAttributePolicy};
use crate::models::{Item, ItemsDocument, Ratings, ValueAttr};
use crate::{IngestError, Result};

/// Relationship categories that get their own output table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LinkType {
    Category,
    Mechanic,
    Family,
    Implementation,
    Designer,
    Artist,
    Publisher,
}

impl LinkType {
    /// Every link type, in output order
    pub const ALL: [LinkType; 7] = [
        LinkType::Category,
        LinkType::Mechanic,
        LinkType::Family,
        LinkType::Implementation,
        LinkType::Designer,
        LinkType::Artist,
        LinkType::Publisher,
    ];

    /// The `type` attribute value used by the API, also the table name
    pub fn as_str(self) -> &'static str {
        match self {
            LinkType::Category => "boardgamecategory",
            LinkType::Mechanic => "boardgamemechanic",
            LinkType::Family => "boardgamefamily",
            LinkType::Implementation => "boardgameimplementation",
            LinkType::Designer => "boardgamedesigner",
            LinkType::Artist => "boardgameartist",
            LinkType::Publisher => "boardgamepublisher",
        }
    }
}

impl std::fmt::Display for LinkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Primary row columns that stay nullable under [`MissingAttributePolicy::Fail`]
const NULLABLE_COLUMNS: [&str; 1] = ["image"];

/// Scalar columns of the primary row, in header order after `id` and `name`
pub const SCALAR_COLUMNS: [&str; 20] = [
    "minplayers",
    "maxplayers",
    "playingtime",
    "minplaytime",
    "maxplaytime",
    "minage",
    "usersrated",
    "average",
    "bayesaverage",
    "stddev",
    "median",
    "owned",
    "trading",
    "wanting",
    "wishing",
    "numcomments",
    "numweights",
    "averageweight",
    "yearpublished",
    "image",
];

/// Rows produced from one game item
#[derive(Debug, Clone, PartialEq)]
pub struct GameRows {
    pub id: String,
    pub name: String,
    pub primary: Row,
    /// Only link types with at least one link appear here
    pub links: Vec<(LinkType, Vec<Row>)>,
    /// Keyed by rank scheme name
    pub ranks: Vec<(String, Row)>,
}

impl GameRows {
    pub fn row_count(&self) -> usize {
        1 + self.links.iter().map(|(_, rows)| rows.len()).sum::<usize>() + self.ranks.len()
    }
}

/// Decompose every game item of a document, in document order
pub fn decompose_games(document: &ItemsDocument, options: &DecomposeOptions) -> Result<Vec<GameRows>> {
    document
        .items
        .iter()
        .map(|item| decompose_game(item, options))
        .collect()
}

/// Decompose every family item of a document into family link rows
pub fn decompose_families(document: &ItemsDocument, options: &DecomposeOptions) -> Result<Vec<Row>> {
    let mut rows = Vec::new();
    for item in &document.items {
        rows.extend(decompose_family(item, options)?);
    }
    Ok(rows)
}

pub fn decompose_game(item: &Item, options: &DecomposeOptions) -> Result<GameRows> {
    let name = primary_name(item)?;

    Ok(GameRows {
        id: item.id.clone(),
        name: name.to_string(),
        primary: primary_row(item, name, options)?,
        links: link_rows(item, options)?,
        ranks: rank_rows(item, options)?,
    })
}

/// One `{family_id, family_name, game_id, name}` row per link of a family item
pub fn decompose_family(item: &Item, options: &DecomposeOptions) -> Result<Vec<Row>> {
    let family_name = primary_name(item)?;

    item.links
        .iter()
        .map(|link| -> Result<Row> {
            Ok(Row::with_capacity(4)
                .with("family_id", &item.id)
                .with("family_name", family_name)
                .with("game_id", &link.id)
                .with("name", link_value(item, link.value.as_deref(), options)?))
        })
        .collect()
}

fn primary_name(item: &Item) -> Result<&str> {
    item.primary_name().ok_or_else(|| IngestError::MissingAttribute {
        item_id: item.id.clone(),
        attribute: "name",
    })
}

/// Link `value` attribute, required under [`MissingAttributePolicy::Fail`]
fn link_value<'a>(item: &Item, value: Option<&'a str>, options: &DecomposeOptions) -> Result<Option<&'a str>> {
    if value.is_none() && options.missing_attributes == MissingAttributePolicy::Fail {
        return Err(IngestError::MissingAttribute {
            item_id: item.id.clone(),
            attribute: "link value",
        });
    }
    Ok(value)
}

fn rating<'a>(
    ratings: Option<&'a Ratings>,
    pick: fn(&'a Ratings) -> &'a Option<ValueAttr>,
) -> Option<&'a str> {
    ratings.and_then(|r| ValueAttr::of(pick(r)))
}

fn scalar_values(item: &Item) -> [Option<&str>; 20] {
    let ratings = item.ratings();

    [
        ValueAttr::of(&item.minplayers),
        ValueAttr::of(&item.maxplayers),
        ValueAttr::of(&item.playingtime),
        ValueAttr::of(&item.minplaytime),
        ValueAttr::of(&item.maxplaytime),
        ValueAttr::of(&item.minage),
        rating(ratings, |r| &r.usersrated),
        rating(ratings, |r| &r.average),
        rating(ratings, |r| &r.bayesaverage),
        rating(ratings, |r| &r.stddev),
        rating(ratings, |r| &r.median),
        rating(ratings, |r| &r.owned),
        rating(ratings, |r| &r.trading),
        rating(ratings, |r| &r.wanting),
        rating(ratings, |r| &r.wishing),
        rating(ratings, |r| &r.numcomments),
        rating(ratings, |r| &r.numweights),
        rating(ratings, |r| &r.averageweight),
        ValueAttr::of(&item.yearpublished),
        item.image.as_deref().map(str::trim),
    ]
}

fn primary_row(item: &Item, name: &str, options: &DecomposeOptions) -> Result<Row> {
    let mut row = Row::with_capacity(2 + SCALAR_COLUMNS.len())
        .with("id", &item.id)
        .with("name", name);

    for (column, value) in SCALAR_COLUMNS.into_iter().zip(scalar_values(item)) {
        if value.is_none()
            && options.missing_attributes == MissingAttributePolicy::Fail
            && !NULLABLE_COLUMNS.contains(&column)
        {
            return Err(IngestError::MissingAttribute {
                item_id: item.id.clone(),
                attribute: column,
            });
        }
        row.push(column, value);
    }

    Ok(row)
}

fn link_rows(item: &Item, options: &DecomposeOptions) -> Result<Vec<(LinkType, Vec<Row>)>> {
    let mut grouped = Vec::new();

    for link_type in LinkType::ALL {
        let mut rows = Vec::new();
        for (index, link) in item.links_of(link_type.as_str()).enumerate() {
            let mut row = Row::with_capacity(4);
            if options.link_order {
                row.push("order", index + 1);
            }
            rows.push(
                row.with("gameId", &item.id)
                    .with("id", &link.id)
                    .with("value", link_value(item, link.value.as_deref(), options)?),
            );
        }
        if !rows.is_empty() {
            grouped.push((link_type, rows));
        }
    }

    Ok(grouped)
}

fn rank_rows(item: &Item, options: &DecomposeOptions) -> Result<Vec<(String, Row)>> {
    let strict = options.missing_attributes == MissingAttributePolicy::Fail;
    let mut rows = Vec::with_capacity(item.ranks().len());

    for rank in item.ranks() {
        let Some(name) = rank.name.as_deref().filter(|n| !n.trim().is_empty()) else {
            if strict {
                return Err(IngestError::MissingAttribute {
                    item_id: item.id.clone(),
                    attribute: "rank name",
                });
            }
            warn!(item_id = %item.id, "Skipping rank without a scheme name");
            continue;
        };

        if strict {
            for (attribute, value) in [("value", &rank.value), ("bayesaverage", &rank.bayesaverage)] {
                if value.is_none() {
                    return Err(IngestError::MissingAttribute {
                        item_id: item.id.clone(),
                        attribute,
                    });
                }
            }
        }

        let row = Row::with_capacity(3)
            .with("gameid", &item.id)
            .with("value", rank.value.as_deref())
            .with("bayesaverage", rank.bayesaverage.as_deref());
        rows.push((name.to_string(), row));
    }

    Ok(rows)
}

//! XML API document model
//!
//! The batch endpoint answers with
//!
//! ```xml
//! <items termsofuse="...">
//!   <item type="boardgame" id="174430">
//!     <image>https://...</image>
//!     <name type="primary" sortindex="1" value="Gloomhaven"/>
//!     <yearpublished value="2017"/>
//!     <link type="boardgamedesigner" id="69802" value="Isaac Childres"/>
//!     <statistics page="1">
//!       <ratings>
//!         <average value="8.7"/>
//!         <ranks>
//!           <rank type="subtype" id="1" name="boardgame" value="3" bayesaverage="8.4"/>
//!         </ranks>
//!       </ratings>
//!     </statistics>
//!   </item>
//! </items>
//! ```
//!
//! Only the fields the decomposer reads are modelled; everything else
//! (descriptions, polls, thumbnails) is skipped during deserialization.

use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Deserialize;

use crate::{IngestError, Result};

/// Root of a batch response
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ItemsDocument {
    #[serde(rename = "item", default)]
    pub items: Vec<Item>,
}

impl ItemsDocument {
    /// Parse a batch response body.
    ///
    /// The root element must be `<items>`. The API reports failures with an
    /// `<error>`/`<errors>` root, which is surfaced as a malformed document
    /// carrying the upstream message instead of an empty item list.
    pub fn parse(xml: &str) -> Result<Self> {
        let root = root_element(xml)?;
        if root != "items" {
            let message = first_message(xml).unwrap_or_default();
            return Err(IngestError::MalformedDocument(format!(
                "expected <items> root, found <{}> {}",
                root, message
            )));
        }
        Ok(quick_xml::de::from_str(xml)?)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

fn root_element(xml: &str) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) => {
                return Ok(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
            },
            Event::Eof => {
                return Err(IngestError::MalformedDocument(
                    "document has no root element".to_string(),
                ))
            },
            _ => {},
        }
    }
}

/// Text of the first `<message>` element, used to report API errors
fn first_message(xml: &str) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    let mut inside = false;
    loop {
        match reader.read_event().ok()? {
            Event::Start(e) if e.local_name().as_ref() == b"message" => inside = true,
            Event::Text(text) if inside => {
                return text.unescape().ok().map(|t| t.trim().to_string());
            },
            Event::Eof => return None,
            _ => {},
        }
    }
}

/// One catalog entity
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Item {
    #[serde(rename = "@id")]
    pub id: String,

    #[serde(rename = "@type", default)]
    pub item_type: Option<String>,

    #[serde(rename = "name", default)]
    pub names: Vec<Name>,

    #[serde(default)]
    pub image: Option<String>,

    #[serde(default)]
    pub minplayers: Option<ValueAttr>,
    #[serde(default)]
    pub maxplayers: Option<ValueAttr>,
    #[serde(default)]
    pub playingtime: Option<ValueAttr>,
    #[serde(default)]
    pub minplaytime: Option<ValueAttr>,
    #[serde(default)]
    pub maxplaytime: Option<ValueAttr>,
    #[serde(default)]
    pub minage: Option<ValueAttr>,
    #[serde(default)]
    pub yearpublished: Option<ValueAttr>,

    #[serde(rename = "link", default)]
    pub links: Vec<Link>,

    #[serde(default)]
    pub statistics: Option<Statistics>,
}

impl Item {
    /// The name marked `type="primary"`
    pub fn primary_name(&self) -> Option<&str> {
        self.names
            .iter()
            .find(|name| name.kind.as_deref() == Some("primary"))
            .map(|name| name.value.as_str())
    }

    pub fn ratings(&self) -> Option<&Ratings> {
        self.statistics.as_ref().and_then(|s| s.ratings.as_ref())
    }

    /// Rank entries, empty when the item carries no statistics
    pub fn ranks(&self) -> &[Rank] {
        self.ratings()
            .and_then(|r| r.ranks.as_ref())
            .map(|r| r.ranks.as_slice())
            .unwrap_or_default()
    }

    /// Links of one type in declaration order
    pub fn links_of<'a>(&'a self, link_type: &'a str) -> impl Iterator<Item = &'a Link> + 'a {
        self.links
            .iter()
            .filter(move |link| link.link_type.as_deref() == Some(link_type))
    }
}

/// `<element value="..."/>`
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ValueAttr {
    #[serde(rename = "@value", default)]
    pub value: Option<String>,
}

impl ValueAttr {
    /// The `value` attribute of an optional element
    pub fn of(attr: &Option<ValueAttr>) -> Option<&str> {
        attr.as_ref().and_then(|a| a.value.as_deref())
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Name {
    #[serde(rename = "@type", default)]
    pub kind: Option<String>,
    #[serde(rename = "@value", default)]
    pub value: String,
}

/// A one-to-many relationship (`<link type="boardgamedesigner" id=".." value=".."/>`)
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Link {
    #[serde(rename = "@type", default)]
    pub link_type: Option<String>,
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(rename = "@value", default)]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Statistics {
    #[serde(default)]
    pub ratings: Option<Ratings>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Ratings {
    #[serde(default)]
    pub usersrated: Option<ValueAttr>,
    #[serde(default)]
    pub average: Option<ValueAttr>,
    #[serde(default)]
    pub bayesaverage: Option<ValueAttr>,
    #[serde(default)]
    pub ranks: Option<Ranks>,
    #[serde(default)]
    pub stddev: Option<ValueAttr>,
    #[serde(default)]
    pub median: Option<ValueAttr>,
    #[serde(default)]
    pub owned: Option<ValueAttr>,
    #[serde(default)]
    pub trading: Option<ValueAttr>,
    #[serde(default)]
    pub wanting: Option<ValueAttr>,
    #[serde(default)]
    pub wishing: Option<ValueAttr>,
    #[serde(default)]
    pub numcomments: Option<ValueAttr>,
    #[serde(default)]
    pub numweights: Option<ValueAttr>,
    #[serde(default)]
    pub averageweight: Option<ValueAttr>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Ranks {
    #[serde(rename = "rank", default)]
    pub ranks: Vec<Rank>,
}

/// Position of an item under one ranking scheme
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Rank {
    #[serde(rename = "@type", default)]
    pub rank_type: Option<String>,
    /// Scheme name, e.g. `boardgame` or `strategygames`
    #[serde(rename = "@name", default)]
    pub name: Option<String>,
    #[serde(rename = "@value", default)]
    pub value: Option<String>,
    #[serde(rename = "@bayesaverage", default)]
    pub bayesaverage: Option<String>,
}

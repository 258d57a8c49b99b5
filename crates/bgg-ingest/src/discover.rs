//! Identifier discovery from the rendered browse pages
//!
//! The catalog browse pages list entries in rank order, 100 per page. Each
//! entry links to `/{kind}/{id}/{slug}`, so the identifier is the second path
//! segment of the anchor's `href`.

use bgg_common::types::Identifier;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, info};
use url::Url;

use crate::config::{ListingConfig, PagePolicy};
use crate::http::HttpClient;
use crate::{IngestError, Phase, Result};

const LAST_PAGE_SELECTOR: &str = r#"[title="last page"]"#;

/// Walks listing pages and collects identifiers in page order
#[derive(Debug, Clone)]
pub struct Discoverer {
    http: HttpClient,
}

impl Discoverer {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    pub async fn discover_listing(&self, listing: &ListingConfig) -> Result<Vec<Identifier>> {
        self.discover(&listing.url, &listing.selector, listing.pages).await
    }

    /// Collect identifiers from pages `1..last`, where `last` is either fixed
    /// or read from the pagination control of page 1.
    pub async fn discover(
        &self,
        listing_url: &str,
        selector: &str,
        pages: PagePolicy,
    ) -> Result<Vec<Identifier>> {
        let base = listing_base(listing_url)?;
        let selector = parse_selector(selector)?;

        // With DiscoverLast page 1 is needed up front, and is reused below
        let (last, mut first_page) = match pages {
            PagePolicy::Fixed(last) => (last, None),
            PagePolicy::DiscoverLast => {
                let html = self.fetch_page(&base, 1).await?;
                let last = parse_last_page(&html)
                    .map_err(|e| e.in_phase(Phase::Discovery, "page 1"))?;
                info!("Listing {} reports {} pages", base, last);
                (last, Some(html))
            },
        };

        let mut identifiers = Vec::new();
        for page in 1..last {
            let html = match first_page.take() {
                Some(html) => html,
                None => self.fetch_page(&base, page).await?,
            };
            let page_url = page_url(&base, page)?;
            let found = extract_identifiers(&html, &selector, &page_url);
            debug!("Page {} yielded {} identifiers", page, found.len());
            identifiers.extend(found);
        }

        info!(
            "Discovered {} identifiers from {} pages of {}",
            identifiers.len(),
            last.saturating_sub(1),
            base
        );
        Ok(identifiers)
    }

    async fn fetch_page(&self, base: &Url, page: u32) -> Result<String> {
        let location = format!("page {}", page);
        let url = page_url(base, page).map_err(|e| e.in_phase(Phase::Discovery, &location))?;
        self.http
            .get_text_with_retry(&url)
            .await
            .map_err(|e| e.in_phase(Phase::Discovery, location))
    }
}

/// Parse the listing URL and make sure it ends in `/` so page numbers append
/// as a new path segment.
pub fn listing_base(listing_url: &str) -> Result<Url> {
    let mut url = Url::parse(listing_url)?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

pub fn page_url(base: &Url, page: u32) -> Result<Url> {
    Ok(base.join(&page.to_string())?)
}

pub fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|_| IngestError::Selector(selector.to_string()))
}

/// Identifiers of every anchor matching `selector`, in document order
pub fn extract_identifiers(html: &str, selector: &Selector, page_url: &Url) -> Vec<Identifier> {
    let document = Html::parse_document(html);

    document
        .select(selector)
        .filter_map(|element| {
            let Some(href) = element.value().attr("href") else {
                debug!("Skipping anchor without href on {}", page_url);
                return None;
            };
            let id = page_url
                .join(href)
                .ok()
                .and_then(|url| url.path_segments()?.nth(1).map(str::to_string))
                .and_then(|segment| Identifier::new(segment).ok());
            if id.is_none() {
                debug!("Skipping anchor with no identifier segment: {}", href);
            }
            id
        })
        .collect()
}

/// Last page number from the pagination control, e.g. `<a title="last page">[1234]</a>`
pub fn parse_last_page(html: &str) -> Result<u32> {
    let document = Html::parse_document(html);
    let selector = parse_selector(LAST_PAGE_SELECTOR)?;
    let pattern = Regex::new(r"\[(\d+)\]").map_err(|e| IngestError::Pagination(e.to_string()))?;

    document
        .select(&selector)
        .filter_map(|element| {
            let text = element.text().collect::<String>();
            pattern
                .captures(&text)
                .and_then(|caps| caps.get(1))
                .and_then(|m| m.as_str().parse::<u32>().ok())
        })
        .last()
        .ok_or_else(|| IngestError::Pagination("no 'last page' link with a [N] label".to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const LISTING: &str = r#"<html><body>
      <table>
        <tr><td class="collection_objectname"><a href="/boardgame/174430/gloomhaven">Gloomhaven</a></td></tr>
        <tr><td class="collection_objectname"><a>No link</a></td></tr>
        <tr><td class="collection_objectname"><a href="/boardgame/161936/pandemic-legacy-season-1">Pandemic Legacy</a></td></tr>
        <tr><td class="collection_objectname"><a href="/browse">Browse</a></td></tr>
        <tr><td class="other"><a href="/boardgame/1/die-macher">Not matched</a></td></tr>
      </table>
      <div class="pages">
        <a href="/browse/boardgame/page/2" title="page 2">2</a>
        <a href="/browse/boardgame/page/1509" title="last page">[1509]</a>
      </div>
    </body></html>"#;

    #[test]
    fn test_extract_identifiers_in_document_order() {
        let selector = parse_selector(".collection_objectname a").unwrap();
        let page = Url::parse("https://boardgamegeek.com/browse/boardgame/page/1").unwrap();

        let ids: Vec<String> = extract_identifiers(LISTING, &selector, &page)
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(ids, vec!["174430", "161936"]);
    }

    #[test]
    fn test_absolute_hrefs_resolve_too() {
        let html = r#"<div class="x"><a href="https://boardgamegeek.com/boardgamefamily/3/animals-cats">Cats</a></div>"#;
        let selector = parse_selector(".x a").unwrap();
        let page = Url::parse("https://boardgamegeek.com/browse/boardgamefamily/page/1").unwrap();

        let ids = extract_identifiers(html, &selector, &page);
        assert_eq!(ids.len(), 1);
        assert_eq!(ids[0].as_str(), "3");
    }

    #[test]
    fn test_parse_last_page() {
        assert_eq!(parse_last_page(LISTING).unwrap(), 1509);
        assert!(matches!(
            parse_last_page("<html><a title=\"last page\">last</a></html>"),
            Err(IngestError::Pagination(_))
        ));
    }

    #[test]
    fn test_listing_base_gets_trailing_slash() {
        let base = listing_base("https://example.com/browse/boardgame/page").unwrap();
        assert_eq!(base.as_str(), "https://example.com/browse/boardgame/page/");
        assert_eq!(
            page_url(&base, 7).unwrap().as_str(),
            "https://example.com/browse/boardgame/page/7"
        );
    }

    #[test]
    fn test_invalid_selector() {
        assert!(matches!(parse_selector("a[[["), Err(IngestError::Selector(_))));
    }
}

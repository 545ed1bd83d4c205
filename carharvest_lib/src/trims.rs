//! Trim enumeration for one model, across its model-year pages.

use std::sync::LazyLock;

use regex::Regex;

use crate::catalog::{scan_links, CatalogLayout, Link};
use crate::error::FetchError;
use crate::fetcher::Fetch;
use crate::record::TrimIdentity;

static YEAR_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(19[5-9]\d|20\d\d)\b").expect("valid year regex"));

/// A trim detail page to visit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrimListing {
    pub identity: TrimIdentity,
    pub url: String,
}

/// Result of enumerating one model.
///
/// Year-variant pages that failed are reported alongside the listings found
/// on the pages that did load.
#[derive(Debug, Default)]
pub struct TrimScan {
    pub listings: Vec<TrimListing>,
    pub failed_pages: Vec<FetchError>,
}

pub struct TrimEnumerator<'a, F: Fetch + ?Sized> {
    fetcher: &'a F,
    layout: &'a CatalogLayout,
}

impl<'a, F: Fetch + ?Sized> TrimEnumerator<'a, F> {
    pub fn new(fetcher: &'a F, layout: &'a CatalogLayout) -> Self {
        Self { fetcher, layout }
    }

    /// Lists every trim/year entry of a model. Does not deduplicate.
    ///
    /// A failure on the model page itself is returned as an error; failures
    /// on linked year pages are collected in `TrimScan::failed_pages`.
    pub async fn list_trims(&self, brand: &str, model: &str) -> Result<TrimScan, FetchError> {
        let model_url = self.layout.model_url(brand, model);
        let doc = self.fetcher.fetch(&model_url).await?;

        let mut scan = TrimScan {
            listings: parse_trims(self.layout, brand, model, &doc.body, None),
            failed_pages: Vec::new(),
        };

        for (year, url) in parse_year_pages(self.layout, brand, model, &doc.body) {
            match self.fetcher.fetch(&url).await {
                Ok(page) => scan.listings.extend(parse_trims(
                    self.layout,
                    brand,
                    model,
                    &page.body,
                    Some(year),
                )),
                Err(err) => {
                    tracing::warn!("Skipping {} {} year {}: {}", brand, model, year, err);
                    scan.failed_pages.push(err);
                }
            }
        }

        tracing::info!(
            "Found {} trims for {} {}",
            scan.listings.len(),
            brand,
            model
        );
        Ok(scan)
    }
}

/// Trim anchors (`{catalog}/{brand}/{model}/{id}`) on a model or year page.
///
/// The year comes from the page when known, otherwise from a row cell that
/// holds only a year, otherwise from a year token in the anchor text.
pub fn parse_trims(
    layout: &CatalogLayout,
    brand: &str,
    model: &str,
    html: &str,
    page_year: Option<u16>,
) -> Vec<TrimListing> {
    scan_links(html)
        .into_iter()
        .filter(|link| is_trim_link(layout, brand, model, link))
        .filter(|link| !link.text.is_empty())
        .map(|link| {
            let model_year = page_year.or_else(|| row_year(&link)).or_else(|| {
                YEAR_TOKEN
                    .captures(&link.text)
                    .and_then(|c| c[1].parse().ok())
            });
            TrimListing {
                identity: TrimIdentity::new(brand, model, link.text.clone(), model_year),
                url: link.href(),
            }
        })
        .collect()
}

/// Year-variant pages linked from a model page, as `(year, url)` pairs.
///
/// Both `{model}?year=YYYY` and `{model}/YYYY` links are recognized; the
/// path form only when the anchor text is the year itself.
pub fn parse_year_pages(
    layout: &CatalogLayout,
    brand: &str,
    model: &str,
    html: &str,
) -> Vec<(u16, String)> {
    let mut pages: Vec<(u16, String)> = Vec::new();
    for link in scan_links(html) {
        let year = match layout.segments(&link.path).as_deref() {
            Some([b, m]) if b.eq_ignore_ascii_case(brand) && m.eq_ignore_ascii_case(model) => {
                link.query_param("year").and_then(parse_year)
            }
            _ => year_path(layout, brand, model, &link),
        };
        let Some(year) = year else {
            continue;
        };
        if !pages.iter().any(|(y, _)| *y == year) {
            pages.push((year, link.href()));
        }
    }
    pages
}

fn is_trim_link(layout: &CatalogLayout, brand: &str, model: &str, link: &Link) -> bool {
    if year_path(layout, brand, model, link).is_some() {
        return false;
    }
    match layout.segments(&link.path).as_deref() {
        Some([b, m, id]) => {
            b.eq_ignore_ascii_case(brand)
                && m.eq_ignore_ascii_case(model)
                && id.chars().all(|c| c.is_ascii_digit())
        }
        _ => false,
    }
}

/// `{catalog}/{brand}/{model}/YYYY` with the year as anchor text.
fn year_path(layout: &CatalogLayout, brand: &str, model: &str, link: &Link) -> Option<u16> {
    match layout.segments(&link.path).as_deref() {
        Some([b, m, last]) if b.eq_ignore_ascii_case(brand) && m.eq_ignore_ascii_case(model) => {
            let year = parse_year(last)?;
            (link.text.trim() == *last).then_some(year)
        }
        _ => None,
    }
}

fn row_year(link: &Link) -> Option<u16> {
    link.row_cells.iter().find_map(|cell| parse_year(cell))
}

fn parse_year(text: &str) -> Option<u16> {
    let text = text.trim();
    if text.len() != 4 || !YEAR_TOKEN.is_match(text) {
        return None;
    }
    text.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODEL_PAGE: &str = r#"<html><body>
        <ul class="years">
          <li><a href="/en/new-car/hyundai/Accent-RB?year=2024">2024</a></li>
          <li><a href="/en/new-car/hyundai/Accent-RB?year=2023">2023</a></li>
          <li><a href="/en/new-car/hyundai/Accent-RB?year=2023">2023 again</a></li>
        </ul>
        <table>
          <tr><td><a href="/en/new-car/hyundai/Accent-RB/5101">Smart</a></td><td>2025</td><td>1,020,000 EGP</td></tr>
          <tr><td><a href="/en/new-car/hyundai/Accent-RB/5102"><img src="x.png"></a></td><td></td></tr>
          <tr><td><a href="/en/new-car/hyundai/Accent-RB/5103">Smart Plus</a></td><td>n/a</td></tr>
        </table>
        <a href="/en/new-car/hyundai/Accent-RB/5104">Premium 2022</a>
        <a href="/en/new-car/hyundai/Accent-RB/gallery">Gallery</a>
        <a href="/en/new-car/hyundai/Elantra/6000">Other model</a>
        </body></html>"#;

    #[test]
    fn trims_take_year_from_row_or_anchor() {
        let trims = parse_trims(
            &CatalogLayout::default(),
            "hyundai",
            "Accent-RB",
            MODEL_PAGE,
            None,
        );
        let got: Vec<_> = trims
            .iter()
            .map(|t| (t.identity.trim_label.as_str(), t.identity.model_year, t.url.as_str()))
            .collect();
        assert_eq!(
            got,
            vec![
                ("Smart", Some(2025), "/en/new-car/hyundai/Accent-RB/5101"),
                ("Smart Plus", None, "/en/new-car/hyundai/Accent-RB/5103"),
                ("Premium 2022", Some(2022), "/en/new-car/hyundai/Accent-RB/5104"),
            ]
        );
    }

    #[test]
    fn page_year_wins() {
        let trims = parse_trims(
            &CatalogLayout::default(),
            "hyundai",
            "Accent-RB",
            MODEL_PAGE,
            Some(2023),
        );
        assert!(trims.iter().all(|t| t.identity.model_year == Some(2023)));
    }

    #[test]
    fn year_pages_are_unique() {
        let pages = parse_year_pages(&CatalogLayout::default(), "hyundai", "Accent-RB", MODEL_PAGE);
        assert_eq!(
            pages,
            vec![
                (2024, "/en/new-car/hyundai/Accent-RB?year=2024".to_string()),
                (2023, "/en/new-car/hyundai/Accent-RB?year=2023".to_string()),
            ]
        );
    }

    const PATH_YEAR_PAGE: &str = r#"<html><body>
        <a href="/en/new-car/kia/rio/2024">2024</a>
        <a href="/en/new-car/kia/rio?year=2023">2023</a>
        <a href="/en/new-car/kia/rio/5101">LX</a>
        <a href="/en/new-car/kia/rio/2025">Launch edition</a>
        </body></html>"#;

    #[test]
    fn year_pages_in_query_and_path_form() {
        let pages = parse_year_pages(&CatalogLayout::default(), "kia", "rio", PATH_YEAR_PAGE);
        assert_eq!(
            pages,
            vec![
                (2024, "/en/new-car/kia/rio/2024".to_string()),
                (2023, "/en/new-car/kia/rio?year=2023".to_string()),
            ]
        );
    }

    #[test]
    fn path_year_links_are_not_trims() {
        let trims = parse_trims(&CatalogLayout::default(), "kia", "rio", PATH_YEAR_PAGE, None);
        let labels: Vec<_> = trims.iter().map(|t| t.identity.trim_label.as_str()).collect();
        assert_eq!(labels, vec!["LX", "Launch edition"]);
    }
}

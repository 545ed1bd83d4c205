//! URL layout of the catalog and anchor scanning shared by discovery and enumeration.

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use url::Url;

/// Path under which the catalog lives on the site.
pub const DEFAULT_CATALOG_PATH: &str = "/en/new-car";

static ANCHOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("valid anchor selector"));
static CELL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("td, th").expect("valid cell selector"));
static LINK_BASE: LazyLock<Url> =
    LazyLock::new(|| Url::parse("http://catalog.invalid/").expect("valid link base"));

/// Where brand, model and trim pages live relative to the site root.
///
/// - brands: `{catalog}/{brand}`
/// - models: `{catalog}/{brand}/{model}` (year variants add `?year=YYYY`)
/// - trims: `{catalog}/{brand}/{model}/{numeric id}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogLayout {
    catalog_path: String,
}

impl Default for CatalogLayout {
    fn default() -> Self {
        Self::new(DEFAULT_CATALOG_PATH)
    }
}

impl CatalogLayout {
    pub fn new(catalog_path: &str) -> Self {
        let trimmed = catalog_path.trim().trim_matches('/');
        Self {
            catalog_path: format!("/{}", trimmed),
        }
    }

    pub fn catalog_path(&self) -> &str {
        &self.catalog_path
    }

    pub fn root_url(&self) -> String {
        self.catalog_path.clone()
    }

    pub fn brand_url(&self, brand: &str) -> String {
        format!("{}/{}", self.catalog_path, brand)
    }

    pub fn model_url(&self, brand: &str, model: &str) -> String {
        format!("{}/{}/{}", self.catalog_path, brand, model)
    }

    /// Path segments below the catalog root, or `None` for paths outside it.
    pub(crate) fn segments<'p>(&self, path: &'p str) -> Option<Vec<&'p str>> {
        let rest = path.strip_prefix(self.catalog_path.as_str())?;
        if !rest.is_empty() && !rest.starts_with('/') {
            return None;
        }
        Some(rest.split('/').filter(|s| !s.is_empty()).collect())
    }
}

/// One anchor found on a page, with the text of its enclosing table row cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Link {
    pub path: String,
    pub query: Option<String>,
    pub text: String,
    pub row_cells: Vec<String>,
}

impl Link {
    /// Value of a query parameter, if present.
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query.as_deref()?.split('&').find_map(|pair| {
            let (k, v) = pair.split_once('=')?;
            (k == key).then_some(v)
        })
    }

    /// The link as a site-relative URL.
    pub fn href(&self) -> String {
        match &self.query {
            Some(q) => format!("{}?{}", self.path, q),
            None => self.path.clone(),
        }
    }
}

/// Collects every anchor of a document in document order.
pub(crate) fn scan_links(html: &str) -> Vec<Link> {
    let doc = Html::parse_document(html);
    doc.select(&ANCHOR)
        .filter_map(|a| {
            let href = a.value().attr("href")?;
            let url = LINK_BASE.join(href.trim()).ok()?;
            let path = url.path().trim_end_matches('/').to_string();
            Some(Link {
                path,
                query: url.query().map(str::to_string),
                text: collapse_whitespace(&a.text().collect::<String>()),
                row_cells: enclosing_row_cells(a),
            })
        })
        .collect()
}

fn enclosing_row_cells(anchor: ElementRef<'_>) -> Vec<String> {
    anchor
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "tr")
        .map(|row| {
            row.select(&CELL)
                .map(|cell| collapse_whitespace(&cell.text().collect::<String>()))
                .collect()
        })
        .unwrap_or_default()
}

pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Pushes `value` unless an equal element is already present, keeping first-seen order.
pub(crate) fn push_unique(items: &mut Vec<String>, value: &str) {
    if !items.iter().any(|v| v == value) {
        items.push(value.to_string());
    }
}

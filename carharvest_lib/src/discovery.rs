//! Brand and model listing.

use crate::catalog::{push_unique, scan_links, CatalogLayout};
use crate::error::FetchError;
use crate::fetcher::Fetch;
use crate::record::{BrandId, ModelId};

/// Anchor texts that mark a model as not currently offered.
const UNAVAILABLE_MARKERS: &[&str] = &["not available", "_error_"];

/// Enumerates the first two levels of the catalog.
pub struct CatalogDiscovery<'a, F: Fetch + ?Sized> {
    fetcher: &'a F,
    layout: &'a CatalogLayout,
}

impl<'a, F: Fetch + ?Sized> CatalogDiscovery<'a, F> {
    pub fn new(fetcher: &'a F, layout: &'a CatalogLayout) -> Self {
        Self { fetcher, layout }
    }

    /// Brands linked from the catalog root, in page order.
    pub async fn list_brands(&self) -> Result<Vec<BrandId>, FetchError> {
        let doc = self.fetcher.fetch(&self.layout.root_url()).await?;
        let brands = parse_brands(self.layout, &doc.body);
        tracing::info!("Found {} brands", brands.len());
        Ok(brands)
    }

    /// Available models linked from a brand page, in page order.
    pub async fn list_models(&self, brand: &str) -> Result<Vec<ModelId>, FetchError> {
        let doc = self.fetcher.fetch(&self.layout.brand_url(brand)).await?;
        let models = parse_models(self.layout, brand, &doc.body);
        tracing::info!("Found {} available models for {}", models.len(), brand);
        Ok(models)
    }
}

pub fn parse_brands(layout: &CatalogLayout, html: &str) -> Vec<BrandId> {
    let mut brands = Vec::new();
    for link in scan_links(html) {
        if let Some([brand]) = layout.segments(&link.path).as_deref() {
            push_unique(&mut brands, brand);
        }
    }
    brands
}

pub fn parse_models(layout: &CatalogLayout, brand: &str, html: &str) -> Vec<ModelId> {
    let mut models = Vec::new();
    for link in scan_links(html) {
        let Some(segments) = layout.segments(&link.path) else {
            continue;
        };
        let [b, model] = segments.as_slice() else {
            continue;
        };
        if !b.eq_ignore_ascii_case(brand) || link.query_param("year").is_some() {
            continue;
        }
        let text = link.text.to_lowercase();
        if UNAVAILABLE_MARKERS.iter().any(|m| text.contains(m)) {
            tracing::debug!("Skipping unavailable model {}/{}", brand, model);
            continue;
        }
        push_unique(&mut models, model);
    }
    models
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROOT: &str = r#"<html><body>
        <nav><a href="/en/new-car">New cars</a><a href="/en/used-car/kia">Used</a></nav>
        <div class="brands">
          <a href="/en/new-car/hyundai"><img src="h.png"></a>
          <a href="/en/new-car/hyundai">Hyundai</a>
          <a href="https://eg.hatla2ee.com/en/new-car/kia/">Kia</a>
          <a href="/en/new-car/kia/rio">Rio</a>
        </div></body></html>"#;

    const BRAND: &str = r#"<html><body>
        <a href="/en/new-car/hyundai/Accent-RB">Accent RB</a>
        <a href="/en/new-car/hyundai/Elantra-CN7">Elantra</a>
        <a href="/en/new-car/hyundai/Elantra-CN7">Elantra (2)</a>
        <a href="/en/new-car/hyundai/Getz">Getz - Not Available</a>
        <a href="/en/new-car/hyundai/Old">_error_</a>
        <a href="/en/new-car/kia/Rio">Kia Rio</a>
        <a href="/en/new-car/hyundai/Tucson/4411">Tucson trim</a>
        </body></html>"#;

    #[test]
    fn brands_are_unique_and_ordered() {
        let brands = parse_brands(&CatalogLayout::default(), ROOT);
        assert_eq!(brands, vec!["hyundai", "kia"]);
    }

    #[test]
    fn models_skip_unavailable_and_foreign_links() {
        let models = parse_models(&CatalogLayout::default(), "hyundai", BRAND);
        assert_eq!(models, vec!["Accent-RB", "Elantra-CN7"]);
    }

    #[test]
    fn empty_page_has_no_brands() {
        assert!(parse_brands(&CatalogLayout::default(), "<html></html>").is_empty());
    }
}

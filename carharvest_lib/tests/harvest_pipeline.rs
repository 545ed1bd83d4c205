use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use carharvest_lib::rate::RateController;
use carharvest_lib::{
    write_dataset, DataType, Document, ErrorClass, Fetch, FetchError, FieldMapping, FieldRule,
    FieldValue, HarvestError, HarvestOptions, HarvestOrchestrator, RatePolicy, RetryPolicy, Scope,
    UnitState, IDENTITY_COLUMNS,
};
use tokio::time::Instant;

/// In-memory catalog: unknown URLs answer with a permanent 404.
#[derive(Default)]
struct SyntheticCatalog {
    pages: HashMap<String, String>,
    failing: HashMap<String, FetchError>,
    requests: Mutex<Vec<(String, Instant)>>,
    brand_entries: AtomicUsize,
}

impl SyntheticCatalog {
    fn page(mut self, url: &str, body: impl Into<String>) -> Self {
        self.pages.insert(url.to_string(), body.into());
        self
    }

    fn fail(mut self, url: &str, err: FetchError) -> Self {
        self.failing.insert(url.to_string(), err);
        self
    }

    fn requested(&self) -> Vec<(String, Instant)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetch for SyntheticCatalog {
    async fn fetch(&self, url: &str) -> Result<Document, FetchError> {
        self.requests
            .lock()
            .unwrap()
            .push((url.to_string(), Instant::now()));
        if let Some(err) = self.failing.get(url) {
            return Err(err.clone());
        }
        match self.pages.get(url) {
            Some(body) => Ok(Document::new(url, body.clone())),
            None => Err(FetchError::Permanent {
                url: url.to_string(),
                reason: "HTTP 404".to_string(),
                attempts: 1,
            }),
        }
    }

    fn enter_brand(&self) {
        self.brand_entries.fetch_add(1, Ordering::SeqCst);
    }
}

fn links(hrefs: &[(&str, &str)]) -> String {
    let anchors: String = hrefs
        .iter()
        .map(|(href, text)| format!("<a href=\"{}\">{}</a>\n", href, text))
        .collect();
    format!("<html><body>{}</body></html>", anchors)
}

fn trim_page(transmission: &str, price: u32) -> String {
    format!(
        "<html><body><ul>\
         <li>transmission type{}</li>\
         <li>official price{} EGP</li>\
         <li>ABS✓</li>\
         </ul></body></html>",
        transmission, price
    )
}

fn mapping() -> FieldMapping {
    FieldMapping::new(vec![
        FieldRule::new("Transmission", "transmission type", DataType::String),
        FieldRule::new("Official_Price_EGP", "official price", DataType::Int),
        FieldRule::new("ABS", "ABS", DataType::Bool),
        FieldRule::new("Sunroof", "sunroof", DataType::Bool),
    ])
    .unwrap()
}

/// One brand, one model, `trims` trim pages numbered from 1.
fn single_model_catalog(trims: usize) -> SyntheticCatalog {
    let trim_links: Vec<(String, String)> = (1..=trims)
        .map(|i| (format!("/en/new-car/kia/rio/{}", i), format!("Trim {}", i)))
        .collect();
    let refs: Vec<(&str, &str)> = trim_links
        .iter()
        .map(|(h, t)| (h.as_str(), t.as_str()))
        .collect();

    let mut catalog = SyntheticCatalog::default()
        .page("/en/new-car", links(&[("/en/new-car/kia", "Kia")]))
        .page("/en/new-car/kia", links(&[("/en/new-car/kia/rio", "Rio")]))
        .page("/en/new-car/kia/rio", links(&refs));
    for i in 1..=trims {
        catalog = catalog.page(
            &format!("/en/new-car/kia/rio/{}", i),
            trim_page("automatic", 800_000 + i as u32),
        );
    }
    catalog
}

// ============================================================================
// Partial failure and deduplication
// ============================================================================

#[tokio::test]
async fn one_failing_trim_is_skipped() {
    let catalog = single_model_catalog(10).fail(
        "/en/new-car/kia/rio/7",
        FetchError::Permanent {
            url: "/en/new-car/kia/rio/7".into(),
            reason: "HTTP 503 after retries".into(),
            attempts: 3,
        },
    );
    let mapping = mapping();

    let run = HarvestOrchestrator::new(&catalog, &mapping, HarvestOptions::default())
        .run()
        .await
        .unwrap();

    assert_eq!(run.records.len(), 9);
    assert_eq!(run.errors.len(), 1);
    let entry = &run.errors.entries()[0];
    assert_eq!(entry.scope, Scope::Trim);
    assert_eq!(entry.class, ErrorClass::Permanent);
    assert_eq!(entry.identity, "kia/rio/Trim 7");
    assert!(run
        .records
        .iter()
        .all(|r| r.identity.trim_label != "Trim 7"));
    assert_eq!(run.summary.trims_attempted, 10);
    assert_eq!(run.summary.trims_admitted, 9);
    assert_eq!(run.summary.permanent_skips, 1);
    assert!(run.finished_at.is_some());
}

#[tokio::test]
async fn repeated_identity_is_admitted_once() {
    let catalog = SyntheticCatalog::default()
        .page("/en/new-car", links(&[("/en/new-car/kia", "Kia")]))
        .page("/en/new-car/kia", links(&[("/en/new-car/kia/rio", "Rio")]))
        .page(
            "/en/new-car/kia/rio",
            links(&[
                ("/en/new-car/kia/rio/1", "LX 2024"),
                ("/en/new-car/kia/rio/2", "LX 2024"),
            ]),
        )
        .page("/en/new-car/kia/rio/1", trim_page("automatic", 850_000))
        .page("/en/new-car/kia/rio/2", trim_page("manual", 790_000));
    let mapping = mapping();

    let run = HarvestOrchestrator::new(&catalog, &mapping, HarvestOptions::default())
        .run()
        .await
        .unwrap();

    assert_eq!(run.records.len(), 1);
    assert_eq!(
        run.records[0].get("Transmission"),
        Some(&FieldValue::Text("automatic".into()))
    );
    assert_eq!(run.errors.count(ErrorClass::Duplicate), 1);
    assert_eq!(run.summary.duplicates_skipped, 1);
    assert_eq!(run.dedup.len(), 1);
}

#[tokio::test]
async fn year_pages_are_followed() {
    let catalog = SyntheticCatalog::default()
        .page("/en/new-car", links(&[("/en/new-car/kia", "Kia")]))
        .page("/en/new-car/kia", links(&[("/en/new-car/kia/rio", "Rio")]))
        .page(
            "/en/new-car/kia/rio",
            links(&[
                ("/en/new-car/kia/rio?year=2023", "2023"),
                ("/en/new-car/kia/rio?year=2022", "2022"),
                ("/en/new-car/kia/rio/1", "LX"),
            ]),
        )
        .page(
            "/en/new-car/kia/rio?year=2023",
            links(&[("/en/new-car/kia/rio/11", "LX")]),
        )
        .page("/en/new-car/kia/rio/1", trim_page("automatic", 850_000))
        .page("/en/new-car/kia/rio/11", trim_page("automatic", 700_000));
    let mapping = mapping();

    let run = HarvestOrchestrator::new(&catalog, &mapping, HarvestOptions::default())
        .run()
        .await
        .unwrap();

    let years: Vec<Option<u16>> = run.records.iter().map(|r| r.identity.model_year).collect();
    assert_eq!(years, vec![None, Some(2023)]);
    // The 2022 page is missing and logged against the model.
    let model_errors: Vec<_> = run.errors.in_scope(Scope::Model).collect();
    assert_eq!(model_errors.len(), 1);
    assert_eq!(model_errors[0].identity, "kia/rio");
}

// ============================================================================
// Schema completeness and dataset output
// ============================================================================

#[tokio::test]
async fn every_record_carries_the_full_schema() {
    let catalog = single_model_catalog(3);
    let mapping = FieldMapping::builtin().unwrap();

    let run = HarvestOrchestrator::new(&catalog, &mapping, HarvestOptions::default())
        .run()
        .await
        .unwrap();

    assert_eq!(run.records.len(), 3);
    for record in &run.records {
        assert_eq!(record.columns(), mapping.columns());
        assert_eq!(record.values().len(), mapping.len());
        assert_eq!(record.get("ABS"), Some(&FieldValue::Bool(true)));
        assert_eq!(record.get("Sunroof"), Some(&FieldValue::Bool(false)));
    }

    let mut buf = Vec::new();
    write_dataset(&mut buf, mapping.columns(), &run.records).unwrap();
    let mut rdr = csv::Reader::from_reader(buf.as_slice());
    let header_len = rdr.headers().unwrap().len();
    assert_eq!(header_len, IDENTITY_COLUMNS.len() + mapping.len());
    for row in rdr.records() {
        assert_eq!(row.unwrap().len(), header_len);
    }
}

// ============================================================================
// Brand selection and fatal conditions
// ============================================================================

fn two_brand_catalog() -> SyntheticCatalog {
    SyntheticCatalog::default()
        .page(
            "/en/new-car",
            links(&[("/en/new-car/kia", "Kia"), ("/en/new-car/bmw", "BMW")]),
        )
        .page("/en/new-car/kia", links(&[("/en/new-car/kia/rio", "Rio")]))
        .page(
            "/en/new-car/kia/rio",
            links(&[("/en/new-car/kia/rio/1", "LX")]),
        )
        .page("/en/new-car/kia/rio/1", trim_page("automatic", 850_000))
        .page("/en/new-car/bmw", links(&[("/en/new-car/bmw/x5", "X5")]))
        .page("/en/new-car/bmw/x5", links(&[("/en/new-car/bmw/x5/9", "M")]))
        .page("/en/new-car/bmw/x5/9", trim_page("automatic", 6_500_000))
}

#[tokio::test]
async fn allow_and_deny_lists_select_brands() {
    let catalog = two_brand_catalog();
    let mapping = mapping();

    let options = HarvestOptions {
        allow_brands: vec!["KIA".into()],
        ..Default::default()
    };
    let run = HarvestOrchestrator::new(&catalog, &mapping, options)
        .run()
        .await
        .unwrap();
    assert_eq!(run.summary.brands, 1);
    assert!(run.records.iter().all(|r| r.identity.brand == "kia"));
    assert_eq!(catalog.brand_entries.load(Ordering::SeqCst), 1);

    let options = HarvestOptions {
        deny_brands: vec!["kia".into()],
        ..Default::default()
    };
    let run = HarvestOrchestrator::new(&catalog, &mapping, options)
        .run()
        .await
        .unwrap();
    assert_eq!(run.records.len(), 1);
    assert_eq!(run.records[0].identity.brand, "bmw");
}

#[tokio::test]
async fn filters_leaving_no_brand_are_fatal() {
    let catalog = two_brand_catalog();
    let mapping = mapping();
    let options = HarvestOptions {
        allow_brands: vec!["tesla".into()],
        ..Default::default()
    };
    let err = HarvestOrchestrator::new(&catalog, &mapping, options)
        .run()
        .await
        .unwrap_err();
    assert!(matches!(err, HarvestError::AllBrandsFiltered { discovered: 2 }));
}

#[tokio::test]
async fn empty_catalog_is_fatal() {
    let catalog = SyntheticCatalog::default().page("/en/new-car", "<html><body></body></html>");
    let mapping = mapping();
    let err = HarvestOrchestrator::new(&catalog, &mapping, HarvestOptions::default())
        .run()
        .await
        .unwrap_err();
    assert!(matches!(err, HarvestError::NoBrands(_)));
}

#[tokio::test]
async fn unreachable_root_is_fatal() {
    let catalog = SyntheticCatalog::default();
    let mapping = mapping();
    let err = HarvestOrchestrator::new(&catalog, &mapping, HarvestOptions::default())
        .run()
        .await
        .unwrap_err();
    assert!(matches!(err, HarvestError::CatalogUnreachable(_)));
}

#[tokio::test]
async fn failing_brand_does_not_stop_the_run() {
    let catalog = two_brand_catalog().fail(
        "/en/new-car/kia",
        FetchError::Permanent {
            url: "/en/new-car/kia".into(),
            reason: "HTTP 500".into(),
            attempts: 3,
        },
    );
    let mapping = mapping();
    let events = Mutex::new(Vec::new());

    let run = HarvestOrchestrator::new(&catalog, &mapping, HarvestOptions::default())
        .with_observer(|e| events.lock().unwrap().push((e.scope, e.label.clone(), e.state)))
        .run()
        .await
        .unwrap();

    assert_eq!(run.records.len(), 1);
    assert_eq!(run.errors.in_scope(Scope::Brand).count(), 1);
    let events = events.into_inner().unwrap();
    assert!(events.contains(&(Scope::Brand, "kia".to_string(), UnitState::SkippedPermanent)));
    assert!(events.contains(&(Scope::Brand, "bmw".to_string(), UnitState::Succeeded)));
}

// ============================================================================
// Politeness spacing through the shared rate controller
// ============================================================================

/// Synthetic catalog behind a real `RateController`.
struct PacedCatalog {
    inner: SyntheticCatalog,
    rate: RateController,
}

#[async_trait]
impl Fetch for PacedCatalog {
    async fn fetch(&self, url: &str) -> Result<Document, FetchError> {
        self.rate.run(url, || self.inner.fetch(url)).await
    }

    fn enter_brand(&self) {
        self.rate.enter_brand();
    }
}

#[tokio::test(start_paused = true)]
async fn requests_are_spaced_within_and_across_brands() {
    let policy = RatePolicy {
        min_delay: Duration::from_millis(1000),
        max_delay: Duration::from_millis(1000),
        jitter: Duration::ZERO,
        brand_delay: Duration::from_secs(5),
        retry: RetryPolicy::default(),
    };
    let catalog = PacedCatalog {
        inner: two_brand_catalog(),
        rate: RateController::new(policy),
    };
    let mapping = mapping();

    HarvestOrchestrator::new(&catalog, &mapping, HarvestOptions::default())
        .run()
        .await
        .unwrap();

    let requests = catalog.inner.requested();
    let urls: Vec<&str> = requests.iter().map(|(u, _)| u.as_str()).collect();
    assert_eq!(
        urls,
        vec![
            "/en/new-car",
            "/en/new-car/kia",
            "/en/new-car/kia/rio",
            "/en/new-car/kia/rio/1",
            "/en/new-car/bmw",
            "/en/new-car/bmw/x5",
            "/en/new-car/bmw/x5/9",
        ]
    );

    let tolerance = Duration::from_millis(5);
    for pair in requests.windows(2) {
        let gap = pair[1].1 - pair[0].1;
        let brand_page = pair[1].0.matches('/').count() == 3;
        let want = if brand_page {
            policy.brand_delay
        } else {
            policy.min_delay
        };
        assert!(
            gap >= want && gap < want + tolerance,
            "gap before {} was {:?}",
            pair[1].0,
            gap
        );
    }
}

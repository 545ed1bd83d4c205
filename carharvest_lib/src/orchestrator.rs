//! Brand → model → trim traversal.

use crate::catalog::CatalogLayout;
use crate::discovery::CatalogDiscovery;
use crate::error::HarvestError;
use crate::extract::FieldExtractor;
use crate::fetcher::Fetch;
use crate::field_mapping::FieldMapping;
use crate::record::BrandId;
use crate::run::{ErrorClass, ErrorEntry, HarvestRun, ProgressEvent, Scope, UnitState};
use crate::trims::{TrimEnumerator, TrimListing};

/// Brand selection and catalog layout for a run.
#[derive(Debug, Clone, Default)]
pub struct HarvestOptions {
    /// When non-empty, only these brands are harvested.
    pub allow_brands: Vec<String>,
    pub deny_brands: Vec<String>,
    pub layout: CatalogLayout,
}

impl HarvestOptions {
    /// Applies the allow and deny lists, case-insensitively, keeping discovery order.
    pub fn select_brands(&self, discovered: &[BrandId]) -> Vec<BrandId> {
        let listed = |list: &[String], brand: &str| list.iter().any(|b| b.eq_ignore_ascii_case(brand));
        discovered
            .iter()
            .filter(|b| self.allow_brands.is_empty() || listed(&self.allow_brands, b))
            .filter(|b| !listed(&self.deny_brands, b))
            .cloned()
            .collect()
    }
}

type Observer<'a> = Box<dyn Fn(&ProgressEvent) + Send + Sync + 'a>;

pub struct HarvestOrchestrator<'a, F: Fetch + ?Sized> {
    fetcher: &'a F,
    mapping: &'a FieldMapping,
    options: HarvestOptions,
    observer: Option<Observer<'a>>,
}

impl<'a, F: Fetch + ?Sized> HarvestOrchestrator<'a, F> {
    pub fn new(fetcher: &'a F, mapping: &'a FieldMapping, options: HarvestOptions) -> Self {
        Self {
            fetcher,
            mapping,
            options,
            observer: None,
        }
    }

    /// Registers a callback invoked on every unit state change.
    pub fn with_observer(mut self, observer: impl Fn(&ProgressEvent) + Send + Sync + 'a) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Harvests every selected brand.
    ///
    /// Only catalog-level problems are returned as errors. Failures below the
    /// catalog root are recorded in the run's error log and the traversal
    /// moves on to the next sibling.
    pub async fn run(&self) -> Result<HarvestRun, HarvestError> {
        let mut run = HarvestRun::new();
        let layout = &self.options.layout;
        let discovery = CatalogDiscovery::new(self.fetcher, layout);

        let discovered = discovery
            .list_brands()
            .await
            .map_err(HarvestError::CatalogUnreachable)?;
        if discovered.is_empty() {
            return Err(HarvestError::NoBrands(layout.root_url()));
        }
        let brands = self.options.select_brands(&discovered);
        if brands.is_empty() {
            return Err(HarvestError::AllBrandsFiltered {
                discovered: discovered.len(),
            });
        }
        tracing::info!(
            "Harvesting {} of {} brands",
            brands.len(),
            discovered.len()
        );

        let extractor = FieldExtractor::new(self.mapping);
        let enumerator = TrimEnumerator::new(self.fetcher, layout);

        for (i, brand) in brands.iter().enumerate() {
            tracing::info!("Brand {}/{}: {}", i + 1, brands.len(), brand);
            self.fetcher.enter_brand();
            run.summary.brands += 1;
            self.emit(&run, Scope::Brand, brand, UnitState::InFlight);

            let models = match discovery.list_models(brand).await {
                Ok(models) => models,
                Err(err) => {
                    tracing::warn!("Skipping brand {}: {}", brand, err);
                    run.record_skip(Scope::Brand, brand.as_str(), &err);
                    self.emit(&run, Scope::Brand, brand, UnitState::after_failure(&err));
                    continue;
                }
            };
            if models.is_empty() {
                run.errors.push(ErrorEntry::new(
                    Scope::Brand,
                    brand.as_str(),
                    ErrorClass::Parse,
                    "no available models listed",
                ));
            }

            for model in &models {
                run.summary.models += 1;
                let model_key = format!("{}/{}", brand, model);
                self.emit(&run, Scope::Model, &model_key, UnitState::InFlight);

                let scan = match enumerator.list_trims(brand, model).await {
                    Ok(scan) => scan,
                    Err(err) => {
                        tracing::warn!("Skipping model {}: {}", model_key, err);
                        run.record_skip(Scope::Model, model_key.as_str(), &err);
                        self.emit(&run, Scope::Model, &model_key, UnitState::after_failure(&err));
                        continue;
                    }
                };
                for err in &scan.failed_pages {
                    run.record_skip(Scope::Model, model_key.as_str(), err);
                }
                if scan.listings.is_empty() && scan.failed_pages.is_empty() {
                    run.errors.push(ErrorEntry::new(
                        Scope::Model,
                        model_key.as_str(),
                        ErrorClass::Parse,
                        "no trim links found",
                    ));
                }

                for listing in scan.listings {
                    self.harvest_trim(&mut run, &extractor, listing).await;
                }
                self.emit(&run, Scope::Model, &model_key, UnitState::Succeeded);
            }
            self.emit(&run, Scope::Brand, brand, UnitState::Succeeded);
        }

        run.finish(self.fetcher.request_summary());
        tracing::info!(
            "Harvest finished: {} records, {} duplicates, {} skipped",
            run.summary.trims_admitted,
            run.summary.duplicates_skipped,
            run.summary.permanent_skips
        );
        Ok(run)
    }

    async fn harvest_trim(
        &self,
        run: &mut HarvestRun,
        extractor: &FieldExtractor<'_>,
        listing: TrimListing,
    ) {
        let key = listing.identity.to_string();
        run.summary.trims_attempted += 1;
        self.emit(run, Scope::Trim, &key, UnitState::InFlight);

        let doc = match self.fetcher.fetch(&listing.url).await {
            Ok(doc) => doc,
            Err(err) => {
                tracing::warn!("Skipping trim {}: {}", key, err);
                run.record_skip(Scope::Trim, key.as_str(), &err);
                self.emit(run, Scope::Trim, &key, UnitState::after_failure(&err));
                return;
            }
        };

        let extraction = extractor.extract(&doc, listing.identity);
        run.record_warnings(&extraction.record.identity, &extraction.warnings);
        if run.offer(extraction.record) {
            tracing::debug!("Admitted {}", key);
        } else {
            tracing::info!("Duplicate trim {} discarded", key);
        }
        self.emit(run, Scope::Trim, &key, UnitState::Succeeded);
    }

    fn emit(&self, run: &HarvestRun, scope: Scope, label: &str, state: UnitState) {
        if let Some(observer) = &self.observer {
            observer(&ProgressEvent {
                scope,
                label: label.to_string(),
                state,
                admitted: run.records.len(),
            });
        }
    }
}

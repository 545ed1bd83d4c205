//! Harvesting pipeline for a new-car catalog: brand, model and trim discovery,
//! schema-driven field extraction and deduplicated dataset assembly.
//!
//! Wraps the `catalog_client` document client with a shared politeness and
//! retry gate, and persists results as CSV plus an append-only error log.

pub mod blocks;
pub mod catalog;
pub mod clean;
pub mod dataset;
pub mod dedup;
pub mod discovery;
pub mod error;
pub mod extract;
pub mod fetcher;
pub mod field_mapping;
pub mod orchestrator;
pub mod rate;
pub mod record;
pub mod run;
pub mod trims;

pub use catalog_client;
pub use catalog_client::Document;

pub use catalog::{CatalogLayout, DEFAULT_CATALOG_PATH};
pub use clean::{clean_dataset, clean_file, CleanError, CleanOptions, CleanReport};
pub use dataset::{append_error_log, write_dataset, write_dataset_file};
pub use dedup::DedupIndex;
pub use discovery::CatalogDiscovery;
pub use error::{FetchError, HarvestError};
pub use extract::{Extraction, FieldExtractor, FieldWarning, WarningKind};
pub use fetcher::{DocumentFetcher, Fetch};
pub use field_mapping::{DataType, FieldMapping, FieldRule, MappingError};
pub use orchestrator::{HarvestOptions, HarvestOrchestrator};
pub use rate::{RatePolicy, RetryPolicy, TrackerSummary};
pub use record::{FieldValue, TrimIdentity, TypedRecord, IDENTITY_COLUMNS};
pub use run::{ErrorClass, ErrorEntry, HarvestRun, HarvestSummary, ProgressEvent, Scope, UnitState};
pub use trims::{TrimEnumerator, TrimListing, TrimScan};

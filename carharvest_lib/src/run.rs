//! State of one harvest: the error ledger, progress events and the run summary.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::dedup::DedupIndex;
use crate::error::{FetchError, HarvestError};
use crate::extract::{FieldWarning, WarningKind};
use crate::rate::TrackerSummary;
use crate::record::{TrimIdentity, TypedRecord};

/// Traversal level an error entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Catalog,
    Brand,
    Model,
    Trim,
    Field,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Scope::Catalog => "catalog",
            Scope::Brand => "brand",
            Scope::Model => "model",
            Scope::Trim => "trim",
            Scope::Field => "field",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Transient,
    Permanent,
    /// A page loaded but held nothing recognizable.
    Parse,
    /// A value was found but could not be converted to its column type.
    Coercion,
    MissingValue,
    Duplicate,
}

impl ErrorClass {
    pub fn level(self) -> &'static str {
        match self {
            ErrorClass::Permanent | ErrorClass::Parse => "ERROR",
            ErrorClass::Transient | ErrorClass::Coercion | ErrorClass::MissingValue => "WARNING",
            ErrorClass::Duplicate => "INFO",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorClass::Transient => "transient",
            ErrorClass::Permanent => "permanent",
            ErrorClass::Parse => "parse",
            ErrorClass::Coercion => "coercion",
            ErrorClass::MissingValue => "missing value",
            ErrorClass::Duplicate => "duplicate",
        };
        f.write_str(s)
    }
}

impl From<&FetchError> for ErrorClass {
    fn from(err: &FetchError) -> Self {
        if err.is_transient() {
            ErrorClass::Transient
        } else {
            ErrorClass::Permanent
        }
    }
}

impl From<WarningKind> for ErrorClass {
    fn from(kind: WarningKind) -> Self {
        match kind {
            WarningKind::EmptyValue => ErrorClass::MissingValue,
            WarningKind::NoNumeral | WarningKind::OutOfRange => ErrorClass::Coercion,
        }
    }
}

/// One line of the error log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorEntry {
    pub scope: Scope,
    /// `brand`, `brand/model` or the trim identity, depending on scope.
    pub identity: String,
    pub class: ErrorClass,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl ErrorEntry {
    pub fn new(
        scope: Scope,
        identity: impl Into<String>,
        class: ErrorClass,
        message: impl Into<String>,
    ) -> Self {
        Self {
            scope,
            identity: identity.into(),
            class,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    /// Entry recorded when the whole run aborts.
    pub fn fatal(err: &HarvestError) -> Self {
        Self::new(Scope::Catalog, "catalog", ErrorClass::Permanent, err.to_string())
    }

    /// `YYYY-MM-DD HH:MM:SS - LEVEL [scope] identity (class): message`
    pub fn to_line(&self) -> String {
        format!(
            "{} - {} [{}] {} ({}): {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.class.level(),
            self.scope,
            self.identity,
            self.class,
            self.message
        )
    }
}

/// Append-only list of error entries.
#[derive(Debug, Default, Clone)]
pub struct ErrorLog {
    entries: Vec<ErrorEntry>,
}

impl ErrorLog {
    pub fn push(&mut self, entry: ErrorEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[ErrorEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn count(&self, class: ErrorClass) -> usize {
        self.entries.iter().filter(|e| e.class == class).count()
    }

    pub fn in_scope(&self, scope: Scope) -> impl Iterator<Item = &ErrorEntry> {
        self.entries.iter().filter(move |e| e.scope == scope)
    }
}

/// Lifecycle of one brand, model or trim unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitState {
    Pending,
    InFlight,
    Succeeded,
    SkippedTransient,
    SkippedPermanent,
}

impl UnitState {
    pub fn after_failure(err: &FetchError) -> Self {
        if err.is_transient() {
            UnitState::SkippedTransient
        } else {
            UnitState::SkippedPermanent
        }
    }
}

/// Emitted by the orchestrator as units change state.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub scope: Scope,
    pub label: String,
    pub state: UnitState,
    /// Records admitted so far in the run.
    pub admitted: usize,
}

/// Counters reported once the run completes.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HarvestSummary {
    pub brands: usize,
    pub models: usize,
    pub trims_attempted: usize,
    pub trims_admitted: usize,
    pub duplicates_skipped: usize,
    pub field_warnings: usize,
    pub permanent_skips: usize,
    pub elapsed_secs: f64,
    pub requests: Option<TrackerSummary>,
}

/// Everything a harvest produced, owned by the orchestrator while it runs.
#[derive(Debug)]
pub struct HarvestRun {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub dedup: DedupIndex,
    pub errors: ErrorLog,
    pub records: Vec<TypedRecord>,
    pub summary: HarvestSummary,
}

impl Default for HarvestRun {
    fn default() -> Self {
        Self::new()
    }
}

impl HarvestRun {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            dedup: DedupIndex::new(),
            errors: ErrorLog::default(),
            records: Vec::new(),
            summary: HarvestSummary::default(),
        }
    }

    /// Logs a unit that was skipped after a fetch failure.
    pub fn record_skip(&mut self, scope: Scope, identity: impl Into<String>, err: &FetchError) {
        if !err.is_transient() {
            self.summary.permanent_skips += 1;
        }
        self.errors
            .push(ErrorEntry::new(scope, identity, ErrorClass::from(err), err.to_string()));
    }

    pub fn record_warnings(&mut self, identity: &TrimIdentity, warnings: &[FieldWarning]) {
        for warning in warnings {
            self.summary.field_warnings += 1;
            self.errors.push(ErrorEntry::new(
                Scope::Field,
                format!("{} {}", identity, warning.column),
                ErrorClass::from(warning.kind),
                warning.to_string(),
            ));
        }
    }

    /// Admits a record unless its identity was already seen.
    pub fn offer(&mut self, record: TypedRecord) -> bool {
        if self.dedup.admit(&record.identity) {
            self.records.push(record);
            self.summary.trims_admitted += 1;
            true
        } else {
            self.summary.duplicates_skipped += 1;
            self.errors.push(ErrorEntry::new(
                Scope::Trim,
                record.identity.to_string(),
                ErrorClass::Duplicate,
                "identity already harvested, keeping the first record",
            ));
            false
        }
    }

    pub fn finish(&mut self, requests: Option<TrackerSummary>) {
        let now = Utc::now();
        self.summary.elapsed_secs = (now - self.started_at).num_milliseconds() as f64 / 1000.0;
        self.summary.requests = requests;
        self.finished_at = Some(now);
    }
}

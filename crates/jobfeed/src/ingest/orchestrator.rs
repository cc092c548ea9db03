use std::collections::BTreeMap;
use std::fmt;
use std::io::Cursor;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::IngestConfig;

use super::domain::ParsedBatch;
use super::error::{IngestError, RowParseError};
use super::parser::{self, ParseOptions, TableRow, TypedRows};
use super::schema::TablePart;
use super::store::{CommitSummary, VacancyStore};
use super::validator::{validate_batch, ValidationRules};

/// Lifecycle of one batch. `Succeeded` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStage {
    Receiving,
    Parsing,
    Validating,
    Committing,
    Succeeded,
    Failed,
}

impl fmt::Display for IngestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IngestStage::Receiving => "receiving",
            IngestStage::Parsing => "parsing",
            IngestStage::Validating => "validating",
            IngestStage::Committing => "committing",
            IngestStage::Succeeded => "succeeded",
            IngestStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Coarse progress signals emitted while a batch moves through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    PartReceived { part: TablePart, bytes: usize },
    StageChanged { stage: IngestStage },
    PartParsed { part: TablePart, rows: usize },
}

/// Outbound progress hook, for upload feedback or operational logging.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn emit(&self, _event: ProgressEvent) {}
}

/// Sink that forwards progress to the tracing pipeline.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn emit(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::PartReceived { part, bytes } => {
                debug!(%part, bytes, "part received");
            }
            ProgressEvent::StageChanged { stage } => {
                debug!(%stage, "stage changed");
            }
            ProgressEvent::PartParsed { part, rows } => {
                debug!(%part, rows, "part parsed");
            }
        }
    }
}

/// Accumulates uploaded parts, order-independent, keyed by part name. The
/// protocol requires exactly the four known parts; anything else is recorded
/// and turns the batch into `IncompleteUpload`.
#[derive(Debug, Default)]
pub struct RawBatch {
    parts: BTreeMap<TablePart, Vec<u8>>,
    unexpected: Vec<String>,
}

impl RawBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a named part. A repeated part name keeps the last payload, like a
    /// form re-submission. Unknown names are remembered for the error report.
    pub fn insert(&mut self, part_name: &str, bytes: Vec<u8>) {
        match TablePart::from_part_name(part_name) {
            Some(part) => {
                self.parts.insert(part, bytes);
            }
            None => self.unexpected.push(part_name.to_string()),
        }
    }

    pub fn insert_part(&mut self, part: TablePart, bytes: Vec<u8>) {
        self.parts.insert(part, bytes);
    }

    pub fn received(&self) -> impl Iterator<Item = (TablePart, usize)> + '_ {
        self.parts.iter().map(|(part, bytes)| (*part, bytes.len()))
    }

    fn into_parts(self) -> Result<BTreeMap<TablePart, Vec<u8>>, IngestError> {
        let missing: Vec<&'static str> = TablePart::ALL
            .into_iter()
            .filter(|part| !self.parts.contains_key(part))
            .map(|part| part.part_name())
            .collect();

        if missing.is_empty() && self.unexpected.is_empty() {
            Ok(self.parts)
        } else {
            Err(IngestError::IncompleteUpload {
                missing,
                unexpected: self.unexpected,
            })
        }
    }
}

/// Wall-clock budget for one batch, checked at every stage transition.
#[derive(Debug, Clone, Copy)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    pub fn none() -> Self {
        Self(None)
    }

    pub fn after(budget: Duration) -> Self {
        Self(Some(Instant::now() + budget))
    }

    fn expired(&self) -> bool {
        self.0.is_some_and(|at| Instant::now() >= at)
    }
}

/// Drives one batch through `Receiving → Parsing → Validating → Committing`.
/// Parsing and validation touch nothing outside the batch; the store's
/// `apply` is the single mutation point, so an aborted batch can never leave
/// a partial commit behind.
pub struct IngestionOrchestrator<S, P = NoopProgress> {
    store: Arc<S>,
    progress: Arc<P>,
    config: IngestConfig,
}

impl<S> IngestionOrchestrator<S>
where
    S: VacancyStore,
{
    pub fn new(store: Arc<S>, config: IngestConfig) -> Self {
        Self {
            store,
            progress: Arc::new(NoopProgress),
            config,
        }
    }
}

impl<S, P> IngestionOrchestrator<S, P>
where
    S: VacancyStore,
    P: ProgressSink,
{
    pub fn with_progress(store: Arc<S>, progress: Arc<P>, config: IngestConfig) -> Self {
        Self {
            store,
            progress,
            config,
        }
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// The deadline one batch run should honor, from the configured budget.
    pub fn deadline(&self) -> Deadline {
        match self.config.timeout() {
            Some(budget) => Deadline::after(budget),
            None => Deadline::none(),
        }
    }

    /// Runs one batch to a terminal state.
    pub fn run(&self, raw: RawBatch, deadline: Deadline) -> Result<CommitSummary, IngestError> {
        let result = self.execute(raw, deadline);

        match &result {
            Ok(summary) => {
                self.emit_stage(IngestStage::Succeeded);
                info!(rows = summary.total_rows(), "batch committed");
            }
            Err(err) => {
                self.emit_stage(IngestStage::Failed);
                warn!(stage = %err.stage(), kind = err.kind(), "batch failed: {err}");
            }
        }

        result
    }

    fn execute(&self, raw: RawBatch, deadline: Deadline) -> Result<CommitSummary, IngestError> {
        self.emit_stage(IngestStage::Receiving);
        for (part, bytes) in raw.received() {
            self.progress.emit(ProgressEvent::PartReceived { part, bytes });
        }
        let parts = raw.into_parts()?;

        self.enter_stage(IngestStage::Parsing, &deadline)?;
        let now = Utc::now().naive_utc();
        let options = self.config.parse_options(now);
        let batch = self.parse(parts, &options, &deadline)?;

        self.enter_stage(IngestStage::Validating, &deadline)?;
        let existing = self.store.reference_index()?;
        let rules = ValidationRules {
            reject_future_publish_dates: self.config.reject_future_publish_dates,
            now,
        };
        let violations = validate_batch(&batch, &existing, &rules);
        if !violations.is_empty() {
            return Err(IngestError::Referential { violations });
        }

        self.enter_stage(IngestStage::Committing, &deadline)?;
        let summary = self.store.apply(&batch)?;
        Ok(summary)
    }

    /// The four files parse independently; a schema mismatch aborts the batch
    /// at once, row-level errors accumulate according to the configured
    /// policy and fail the batch after the sweep.
    fn parse(
        &self,
        parts: BTreeMap<TablePart, Vec<u8>>,
        options: &ParseOptions,
        deadline: &Deadline,
    ) -> Result<ParsedBatch, IngestError> {
        let mut batch = ParsedBatch::default();
        let mut errors: Vec<RowParseError> = Vec::new();

        for (part, bytes) in parts {
            if deadline.expired() {
                return Err(IngestError::Timeout {
                    stage: IngestStage::Parsing,
                });
            }

            let text = String::from_utf8_lossy(&bytes).into_owned();
            let reader = Cursor::new(text.into_bytes());
            let rows = match part {
                TablePart::Area => {
                    batch.areas = collect_rows(parser::area_rows(reader, options)?, options, &mut errors);
                    batch.areas.len()
                }
                TablePart::JobCategory => {
                    batch.job_categories =
                        collect_rows(parser::job_category_rows(reader, options)?, options, &mut errors);
                    batch.job_categories.len()
                }
                TablePart::Employees => {
                    batch.employers =
                        collect_rows(parser::employer_rows(reader, options)?, options, &mut errors);
                    batch.employers.len()
                }
                TablePart::Vacancy => {
                    batch.vacancies =
                        collect_rows(parser::vacancy_rows(reader, options)?, options, &mut errors);
                    batch.vacancies.len()
                }
            };
            self.progress.emit(ProgressEvent::PartParsed { part, rows });

            if options.stop_on_first_error && !errors.is_empty() {
                break;
            }
        }

        if errors.is_empty() {
            Ok(batch)
        } else {
            Err(IngestError::RowParse { errors })
        }
    }

    fn enter_stage(&self, stage: IngestStage, deadline: &Deadline) -> Result<(), IngestError> {
        if deadline.expired() {
            return Err(IngestError::Timeout { stage });
        }
        self.emit_stage(stage);
        Ok(())
    }

    fn emit_stage(&self, stage: IngestStage) {
        self.progress.emit(ProgressEvent::StageChanged { stage });
    }
}

fn collect_rows<R, T>(
    rows: TypedRows<R, T>,
    options: &ParseOptions,
    errors: &mut Vec<RowParseError>,
) -> Vec<T>
where
    R: std::io::Read,
    T: TableRow,
{
    let mut parsed = Vec::new();
    for item in rows {
        match item {
            Ok(row) => parsed.push(row),
            Err(err) => {
                errors.push(err);
                if options.stop_on_first_error {
                    break;
                }
            }
        }
    }
    parsed
}

//! The ingestion pipeline: four related CSV uploads become one atomically
//! committed dataset, or a full report of everything wrong with them.

pub mod domain;
pub mod error;
pub mod orchestrator;
pub mod parser;
pub mod router;
pub mod schema;
pub mod store;
pub mod validator;

#[cfg(test)]
mod tests;

pub use domain::{AreaRecord, EmployerRecord, JobCategoryRecord, ParsedBatch, VacancyRecord};
pub use error::{IngestError, RowParseError};
pub use orchestrator::{
    Deadline, IngestStage, IngestionOrchestrator, NoopProgress, ProgressEvent, ProgressSink,
    RawBatch, TracingProgress,
};
pub use parser::ParseOptions;
pub use router::ingest_router;
pub use schema::TablePart;
pub use store::{CommitSummary, StoreError, TableSummary, VacancyStore};
pub use validator::{validate_batch, ReferenceIndex, ValidationRules, Violation, ViolationKind};

use crate::infra::InMemoryVacancyStore;
use clap::Args;
use jobfeed::config::AppConfig;
use jobfeed::error::AppError;
use jobfeed::ingest::{IngestionOrchestrator, RawBatch, TablePart};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct ImportArgs {
    /// CSV file with area rows
    #[arg(long)]
    pub(crate) area: PathBuf,
    /// CSV file with job category rows
    #[arg(long)]
    pub(crate) job_category: PathBuf,
    /// CSV file with the employer directory
    #[arg(long)]
    pub(crate) employees: PathBuf,
    /// CSV file with vacancy rows
    #[arg(long)]
    pub(crate) vacancy: PathBuf,
}

/// One-shot ingestion into a fresh in-memory store. Prints the same JSON the
/// HTTP endpoint would return, so operators can vet a dataset before
/// uploading it.
pub(crate) fn run_import(args: ImportArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let store = Arc::new(InMemoryVacancyStore::default());
    let orchestrator = IngestionOrchestrator::new(store, config.ingest);

    let mut raw = RawBatch::new();
    for (part, path) in [
        (TablePart::Area, &args.area),
        (TablePart::JobCategory, &args.job_category),
        (TablePart::Employees, &args.employees),
        (TablePart::Vacancy, &args.vacancy),
    ] {
        let bytes = std::fs::read(path)?;
        raw.insert_part(part, bytes);
    }

    let deadline = orchestrator.deadline();
    match orchestrator.run(raw, deadline) {
        Ok(summary) => {
            println!("{:#}", json!({ "status": "OK", "summary": summary }));
            Ok(())
        }
        Err(err) => {
            eprintln!(
                "{:#}",
                json!({
                    "stage": err.stage(),
                    "errorKind": err.kind(),
                    "details": err.details(),
                })
            );
            Err(AppError::Ingest(err))
        }
    }
}

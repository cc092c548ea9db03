use serde::Serialize;

use super::domain::{ParsedBatch, VacancyRecord};
use super::validator::ReferenceIndex;

/// Persistence seam for committed batches.
///
/// `apply` must be atomic: either every row of the batch lands or the store is
/// left exactly as it was. Rows are upserted by primary key; rows already in
/// the store but absent from the batch stay untouched, so a corrected re-upload
/// of one file does not require re-uploading the other three.
pub trait VacancyStore: Send + Sync {
    /// Ids currently committed, for merge-mode reference checks.
    fn reference_index(&self) -> Result<ReferenceIndex, StoreError>;

    /// Upsert the whole batch as one atomic unit.
    fn apply(&self, batch: &ParsedBatch) -> Result<CommitSummary, StoreError>;

    /// Every committed vacancy row, for the read endpoint.
    fn vacancies(&self) -> Result<Vec<VacancyRecord>, StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store rejected batch: {0}")]
    Rejected(String),
}

/// Per-table upsert counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TableSummary {
    pub inserted: u64,
    pub updated: u64,
}

impl TableSummary {
    pub fn record(&mut self, existed: bool) {
        if existed {
            self.updated += 1;
        } else {
            self.inserted += 1;
        }
    }
}

/// What one committed batch did to the store, keyed by upload part name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CommitSummary {
    pub area: TableSummary,
    pub job_category: TableSummary,
    pub employees: TableSummary,
    pub vacancy: TableSummary,
}

impl CommitSummary {
    pub fn total_rows(&self) -> u64 {
        [self.area, self.job_category, self.employees, self.vacancy]
            .iter()
            .map(|table| table.inserted + table.updated)
            .sum()
    }
}

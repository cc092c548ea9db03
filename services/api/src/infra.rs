use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use jobfeed::ingest::{
    AreaRecord, CommitSummary, EmployerRecord, JobCategoryRecord, ParsedBatch, ReferenceIndex,
    StoreError, VacancyRecord, VacancyStore,
};
use metrics_exporter_prometheus::PrometheusHandle;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Process-local store: one mutex over the four tables. `apply` upserts into
/// a staged copy and swaps it in only once every row landed, so a failing
/// batch is invisible and concurrent batches serialize on the lock.
#[derive(Default)]
pub(crate) struct InMemoryVacancyStore {
    tables: Mutex<Tables>,
}

#[derive(Default, Clone)]
struct Tables {
    areas: BTreeMap<String, AreaRecord>,
    job_categories: BTreeMap<String, JobCategoryRecord>,
    employers: BTreeMap<String, EmployerRecord>,
    vacancies: BTreeMap<String, VacancyRecord>,
}

impl VacancyStore for InMemoryVacancyStore {
    fn reference_index(&self) -> Result<ReferenceIndex, StoreError> {
        let guard = self.lock()?;
        Ok(ReferenceIndex {
            areas: guard.areas.keys().cloned().collect(),
            job_categories: guard.job_categories.keys().cloned().collect(),
            employers: guard.employers.keys().cloned().collect(),
        })
    }

    fn apply(&self, batch: &ParsedBatch) -> Result<CommitSummary, StoreError> {
        let mut guard = self.lock()?;
        let mut staged = guard.clone();
        let mut summary = CommitSummary::default();

        for row in &batch.areas {
            summary
                .area
                .record(staged.areas.insert(row.id.clone(), row.clone()).is_some());
        }
        for row in &batch.job_categories {
            summary.job_category.record(
                staged
                    .job_categories
                    .insert(row.id.clone(), row.clone())
                    .is_some(),
            );
        }
        for row in &batch.employers {
            summary.employees.record(
                staged
                    .employers
                    .insert(row.id.clone(), row.clone())
                    .is_some(),
            );
        }
        for row in &batch.vacancies {
            summary.vacancy.record(
                staged
                    .vacancies
                    .insert(row.id.clone(), row.clone())
                    .is_some(),
            );
        }

        *guard = staged;
        Ok(summary)
    }

    fn vacancies(&self) -> Result<Vec<VacancyRecord>, StoreError> {
        let guard = self.lock()?;
        Ok(guard.vacancies.values().cloned().collect())
    }
}

impl InMemoryVacancyStore {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Tables>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Unavailable("store mutex poisoned".to_string()))
    }
}

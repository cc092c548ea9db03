use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value;

use crate::config::IngestConfig;
use crate::ingest::domain::{
    AreaRecord, EmployerRecord, JobCategoryRecord, ParsedBatch, VacancyRecord,
};
use crate::ingest::orchestrator::{
    IngestionOrchestrator, ProgressEvent, ProgressSink, RawBatch,
};
use crate::ingest::parser::ParseOptions;
use crate::ingest::router::ingest_router;
use crate::ingest::schema::TablePart;
use crate::ingest::store::{CommitSummary, StoreError, VacancyStore};
use crate::ingest::validator::{ReferenceIndex, ValidationRules};

pub(super) const AREA_CSV: &str = "area_id,area_nm\n1,Moscow\n2,Kazan\n";

pub(super) const JOB_CATEGORY_CSV: &str =
    "job_category_id,job_category_nm\n10,Engineering\n11,Analytics\n";

pub(super) const EMPLOYEES_CSV: &str =
    "employer_id,employer_nm,industry\n100,Acme Robotics,manufacturing\n101,Globex,software\n";

pub(super) const VACANCY_CSV: &str = "\
vacancy_id,job_title_nm,job_category_id,area_id,employer_id,lower_bound_salary_amt,upper_bound_salary_amt,salary_currency_code,employment_type_name,experience_type_name,vacancy_publish_dttm,vacancy_archive_flg\n\
v1,Backend Engineer,10,1,100,90000,140000,RUB,full_time,1_to_3_years,2024-04-10,false\n\
v2,Data Analyst,11,2,101,,120000,,,,2024-04-12 09:30:00,true\n\
v3,QA Engineer,10,1,101,80000,,RUB,,,,\n";

pub(super) fn fixed_now() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 6, 1)
        .expect("valid date")
        .and_hms_opt(12, 0, 0)
        .expect("valid time")
}

pub(super) fn options() -> ParseOptions {
    ParseOptions::new(fixed_now())
}

pub(super) fn rules() -> ValidationRules {
    ValidationRules {
        reject_future_publish_dates: true,
        now: fixed_now(),
    }
}

pub(super) fn area(id: &str, name: &str) -> AreaRecord {
    AreaRecord {
        id: id.to_string(),
        name: name.to_string(),
    }
}

pub(super) fn job_category(id: &str, name: &str) -> JobCategoryRecord {
    JobCategoryRecord {
        id: id.to_string(),
        name: name.to_string(),
    }
}

pub(super) fn employer(id: &str, name: &str) -> EmployerRecord {
    EmployerRecord {
        id: id.to_string(),
        name: name.to_string(),
        attributes: BTreeMap::new(),
    }
}

pub(super) fn vacancy(id: &str, category: &str, area: &str, employer: &str) -> VacancyRecord {
    VacancyRecord {
        id: id.to_string(),
        job_title: "Backend Engineer".to_string(),
        job_category: category.to_string(),
        area: area.to_string(),
        lower_bound_salary: Some(90_000.0),
        upper_bound_salary: Some(140_000.0),
        salary_currency: "RUB".to_string(),
        employer: employer.to_string(),
        employment_type: "full_time".to_string(),
        experience_type: "1_to_3_years".to_string(),
        publish_date: NaiveDate::from_ymd_opt(2024, 4, 10)
            .expect("valid date")
            .and_hms_opt(0, 0, 0)
            .expect("valid time"),
        archived: false,
    }
}

/// Batch whose vacancies all resolve inside the batch itself.
pub(super) fn consistent_batch() -> ParsedBatch {
    ParsedBatch {
        areas: vec![area("1", "Moscow"), area("2", "Kazan")],
        job_categories: vec![
            job_category("10", "Engineering"),
            job_category("11", "Analytics"),
        ],
        employers: vec![employer("100", "Acme Robotics"), employer("101", "Globex")],
        vacancies: vec![vacancy("v1", "10", "1", "100"), vacancy("v2", "11", "2", "101")],
    }
}

pub(super) fn raw_batch(parts: &[(TablePart, &str)]) -> RawBatch {
    let mut raw = RawBatch::new();
    for (part, content) in parts {
        raw.insert_part(*part, content.as_bytes().to_vec());
    }
    raw
}

pub(super) fn full_raw_batch() -> RawBatch {
    raw_batch(&[
        (TablePart::Area, AREA_CSV),
        (TablePart::JobCategory, JOB_CATEGORY_CSV),
        (TablePart::Employees, EMPLOYEES_CSV),
        (TablePart::Vacancy, VACANCY_CSV),
    ])
}

/// In-memory store double: one mutex over the four tables, staged clone that
/// swaps in only after the last upsert, plus a switch that rejects the
/// vacancy table mid-apply to exercise rollback.
#[derive(Default)]
pub(super) struct MemoryStore {
    tables: Mutex<Tables>,
    reject_vacancies: AtomicBool,
}

#[derive(Default, Clone)]
pub(super) struct Tables {
    pub(super) areas: BTreeMap<String, AreaRecord>,
    pub(super) job_categories: BTreeMap<String, JobCategoryRecord>,
    pub(super) employers: BTreeMap<String, EmployerRecord>,
    pub(super) vacancies: BTreeMap<String, VacancyRecord>,
}

impl MemoryStore {
    pub(super) fn reject_vacancy_table(&self) {
        self.reject_vacancies.store(true, Ordering::SeqCst);
    }

    pub(super) fn snapshot(&self) -> Tables {
        self.tables.lock().expect("store mutex poisoned").clone()
    }
}

impl VacancyStore for MemoryStore {
    fn reference_index(&self) -> Result<ReferenceIndex, StoreError> {
        let guard = self.tables.lock().expect("store mutex poisoned");
        Ok(ReferenceIndex {
            areas: guard.areas.keys().cloned().collect(),
            job_categories: guard.job_categories.keys().cloned().collect(),
            employers: guard.employers.keys().cloned().collect(),
        })
    }

    fn apply(&self, batch: &ParsedBatch) -> Result<CommitSummary, StoreError> {
        let mut guard = self.tables.lock().expect("store mutex poisoned");
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

        if self.reject_vacancies.load(Ordering::SeqCst) && !batch.vacancies.is_empty() {
            return Err(StoreError::Rejected("vacancy table offline".to_string()));
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
        let guard = self.tables.lock().expect("store mutex poisoned");
        Ok(guard.vacancies.values().cloned().collect())
    }
}

/// Progress sink that remembers every event for assertions.
#[derive(Default)]
pub(super) struct RecordingProgress {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingProgress {
    pub(super) fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().expect("progress mutex poisoned").clone()
    }
}

impl ProgressSink for RecordingProgress {
    fn emit(&self, event: ProgressEvent) {
        self.events
            .lock()
            .expect("progress mutex poisoned")
            .push(event);
    }
}

pub(super) fn orchestrator(store: Arc<MemoryStore>) -> IngestionOrchestrator<MemoryStore> {
    IngestionOrchestrator::new(store, IngestConfig::default())
}

pub(super) fn test_router() -> (axum::Router, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::default());
    let router = ingest_router(Arc::new(orchestrator(store.clone())));
    (router, store)
}

pub(super) const BOUNDARY: &str = "batch-test-boundary";

pub(super) fn multipart_request(parts: &[(&str, &str)]) -> axum::http::Request<axum::body::Body> {
    let mut body = String::new();
    for (name, content) in parts {
        body.push_str(&format!("--{BOUNDARY}\r\n"));
        body.push_str(&format!(
            "Content-Disposition: form-data; name=\"{name}\"; filename=\"{name}.csv\"\r\n"
        ));
        body.push_str("Content-Type: text/csv\r\n\r\n");
        body.push_str(content);
        body.push_str("\r\n");
    }
    body.push_str(&format!("--{BOUNDARY}--\r\n"));

    axum::http::Request::post("/api/take-data/")
        .header(
            axum::http::header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(axum::body::Body::from(body))
        .expect("request builds")
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

use super::common::*;
use std::sync::Arc;
use std::time::Duration;

use crate::config::IngestConfig;
use crate::ingest::error::IngestError;
use crate::ingest::orchestrator::{
    Deadline, IngestStage, IngestionOrchestrator, ProgressEvent,
};
use crate::ingest::schema::TablePart;
use crate::ingest::store::VacancyStore;

#[test]
fn valid_batch_runs_to_succeeded() {
    let store = Arc::new(MemoryStore::default());
    let orchestrator = orchestrator(store.clone());

    let summary = orchestrator
        .run(full_raw_batch(), Deadline::none())
        .expect("batch commits");

    assert_eq!(summary.area.inserted, 2);
    assert_eq!(summary.job_category.inserted, 2);
    assert_eq!(summary.employees.inserted, 2);
    assert_eq!(summary.vacancy.inserted, 3);

    let committed = store.vacancies().expect("read back");
    assert_eq!(committed.len(), 3);
}

#[test]
fn progress_reports_each_stage_in_order() {
    let store = Arc::new(MemoryStore::default());
    let progress = Arc::new(RecordingProgress::default());
    let orchestrator = IngestionOrchestrator::with_progress(
        store,
        progress.clone(),
        IngestConfig::default(),
    );

    orchestrator
        .run(full_raw_batch(), Deadline::none())
        .expect("batch commits");

    let stages: Vec<IngestStage> = progress
        .events()
        .into_iter()
        .filter_map(|event| match event {
            ProgressEvent::StageChanged { stage } => Some(stage),
            _ => None,
        })
        .collect();
    assert_eq!(
        stages,
        vec![
            IngestStage::Receiving,
            IngestStage::Parsing,
            IngestStage::Validating,
            IngestStage::Committing,
            IngestStage::Succeeded,
        ]
    );

    let received = progress
        .events()
        .iter()
        .filter(|event| matches!(event, ProgressEvent::PartReceived { .. }))
        .count();
    assert_eq!(received, 4);
}

#[test]
fn missing_part_is_an_incomplete_upload() {
    let store = Arc::new(MemoryStore::default());
    let orchestrator = orchestrator(store.clone());

    let raw = raw_batch(&[
        (TablePart::Area, AREA_CSV),
        (TablePart::JobCategory, JOB_CATEGORY_CSV),
        (TablePart::Vacancy, VACANCY_CSV),
    ]);
    let error = orchestrator
        .run(raw, Deadline::none())
        .expect_err("batch must fail");

    match &error {
        IngestError::IncompleteUpload {
            missing,
            unexpected,
        } => {
            assert_eq!(missing, &vec!["employees"]);
            assert!(unexpected.is_empty());
        }
        other => panic!("expected incomplete upload, got {other:?}"),
    }
    assert_eq!(error.stage(), IngestStage::Receiving);
    assert!(store.vacancies().expect("read back").is_empty());
}

#[test]
fn unexpected_part_is_an_incomplete_upload_even_when_four_are_present() {
    let store = Arc::new(MemoryStore::default());
    let orchestrator = orchestrator(store);

    let mut raw = full_raw_batch();
    raw.insert("salary", b"salary_id\n1\n".to_vec());
    let error = orchestrator
        .run(raw, Deadline::none())
        .expect_err("batch must fail");

    match error {
        IngestError::IncompleteUpload { unexpected, .. } => {
            assert_eq!(unexpected, vec!["salary".to_string()]);
        }
        other => panic!("expected incomplete upload, got {other:?}"),
    }
}

#[test]
fn schema_mismatch_aborts_the_whole_batch() {
    let store = Arc::new(MemoryStore::default());
    let orchestrator = orchestrator(store.clone());

    let raw = raw_batch(&[
        (TablePart::Area, "region,area_nm\n1,Moscow\n"),
        (TablePart::JobCategory, JOB_CATEGORY_CSV),
        (TablePart::Employees, EMPLOYEES_CSV),
        (TablePart::Vacancy, VACANCY_CSV),
    ]);
    let error = orchestrator
        .run(raw, Deadline::none())
        .expect_err("batch must fail");

    assert!(matches!(error, IngestError::SchemaMismatch { table: TablePart::Area, .. }));
    assert!(store.vacancies().expect("read back").is_empty());
}

#[test]
fn row_errors_are_collected_across_files() {
    let store = Arc::new(MemoryStore::default());
    let orchestrator = orchestrator(store);

    let raw = raw_batch(&[
        (TablePart::Area, "area_id,area_nm\n,Moscow\n"),
        (TablePart::JobCategory, JOB_CATEGORY_CSV),
        (TablePart::Employees, EMPLOYEES_CSV),
        (
            TablePart::Vacancy,
            "vacancy_id,job_title_nm,job_category_id,area_id,employer_id,lower_bound_salary_amt\n\
v1,Backend Engineer,10,1,100,ninety\n",
        ),
    ]);
    let error = orchestrator
        .run(raw, Deadline::none())
        .expect_err("batch must fail");

    match &error {
        IngestError::RowParse { errors } => {
            assert_eq!(errors.len(), 2);
            let tables: Vec<TablePart> = errors.iter().map(|err| err.table).collect();
            assert!(tables.contains(&TablePart::Area));
            assert!(tables.contains(&TablePart::Vacancy));
        }
        other => panic!("expected row parse errors, got {other:?}"),
    }
    assert_eq!(error.stage(), IngestStage::Parsing);
}

#[test]
fn stop_on_first_error_reports_only_the_first() {
    let store = Arc::new(MemoryStore::default());
    let config = IngestConfig {
        stop_on_first_error: true,
        ..IngestConfig::default()
    };
    let orchestrator = IngestionOrchestrator::new(store, config);

    let raw = raw_batch(&[
        (TablePart::Area, "area_id,area_nm\n,Moscow\n,Kazan\n"),
        (TablePart::JobCategory, JOB_CATEGORY_CSV),
        (TablePart::Employees, EMPLOYEES_CSV),
        (TablePart::Vacancy, VACANCY_CSV),
    ]);
    let error = orchestrator
        .run(raw, Deadline::none())
        .expect_err("batch must fail");

    match error {
        IngestError::RowParse { errors } => assert_eq!(errors.len(), 1),
        other => panic!("expected row parse errors, got {other:?}"),
    }
}

#[test]
fn dangling_reference_fails_validation_and_commits_nothing() {
    let store = Arc::new(MemoryStore::default());
    let orchestrator = orchestrator(store.clone());

    let vacancy_csv = "vacancy_id,job_title_nm,job_category_id,area_id,employer_id\n\
v1,Backend Engineer,10,1,100\n\
v2,Ghost Role,99,1,100\n";
    let raw = raw_batch(&[
        (TablePart::Area, AREA_CSV),
        (TablePart::JobCategory, JOB_CATEGORY_CSV),
        (TablePart::Employees, EMPLOYEES_CSV),
        (TablePart::Vacancy, vacancy_csv),
    ]);
    let error = orchestrator
        .run(raw, Deadline::none())
        .expect_err("batch must fail");

    match &error {
        IngestError::Referential { violations } => {
            assert_eq!(violations.len(), 1);
            assert_eq!(violations[0].row_id, "v2");
        }
        other => panic!("expected referential violations, got {other:?}"),
    }
    assert_eq!(error.stage(), IngestStage::Validating);

    // Atomicity: the valid sibling tables must not have been committed.
    let index = store.reference_index().expect("index reads");
    assert!(index.areas.is_empty());
    assert!(index.employers.is_empty());
    assert!(store.vacancies().expect("read back").is_empty());
}

#[test]
fn merge_mode_resolves_references_from_prior_batches() {
    let store = Arc::new(MemoryStore::default());
    let orchestrator = orchestrator(store.clone());
    orchestrator
        .run(full_raw_batch(), Deadline::none())
        .expect("seed batch commits");

    // Re-upload only a corrected vacancy file; its FKs resolve against the
    // previously committed dictionaries.
    let patch_csv = "vacancy_id,job_title_nm,job_category_id,area_id,employer_id\n\
v1,Principal Backend Engineer,10,1,100\n";
    let raw = raw_batch(&[
        (TablePart::Area, "area_id,area_nm\n"),
        (TablePart::JobCategory, "job_category_id,job_category_nm\n"),
        (TablePart::Employees, "employer_id,employer_nm\n"),
        (TablePart::Vacancy, patch_csv),
    ]);
    let summary = orchestrator
        .run(raw, Deadline::none())
        .expect("patch commits");

    assert_eq!(summary.vacancy.updated, 1);
    assert_eq!(summary.area.inserted + summary.area.updated, 0);

    let committed = store.vacancies().expect("read back");
    assert_eq!(committed.len(), 3, "untouched rows survive the patch");
    let v1 = committed
        .iter()
        .find(|row| row.id == "v1")
        .expect("v1 present");
    assert_eq!(v1.job_title, "Principal Backend Engineer");
}

#[test]
fn commit_failure_surfaces_and_rolls_back() {
    let store = Arc::new(MemoryStore::default());
    store.reject_vacancy_table();
    let orchestrator = orchestrator(store.clone());

    let error = orchestrator
        .run(full_raw_batch(), Deadline::none())
        .expect_err("batch must fail");

    assert!(matches!(error, IngestError::Commit(_)));
    assert_eq!(error.stage(), IngestStage::Committing);
    let index = store.reference_index().expect("index reads");
    assert!(index.areas.is_empty(), "rollback leaves no partial tables");
}

#[test]
fn expired_deadline_fails_with_timeout() {
    let store = Arc::new(MemoryStore::default());
    let orchestrator = orchestrator(store);

    let error = orchestrator
        .run(full_raw_batch(), Deadline::after(Duration::ZERO))
        .expect_err("batch must time out");

    match error {
        IngestError::Timeout { stage } => assert_eq!(stage, IngestStage::Parsing),
        other => panic!("expected timeout, got {other:?}"),
    }
}

#[test]
fn configured_deadline_comes_from_the_timeout_setting() {
    let store = Arc::new(MemoryStore::default());
    let config = IngestConfig {
        timeout_secs: 0,
        ..IngestConfig::default()
    };
    let orchestrator = IngestionOrchestrator::new(store, config);

    // A zero setting disables the deadline entirely.
    orchestrator
        .run(full_raw_batch(), orchestrator.deadline())
        .expect("batch commits without a deadline");
}

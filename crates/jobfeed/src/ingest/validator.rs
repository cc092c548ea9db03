use std::collections::HashSet;
use std::fmt;

use chrono::NaiveDateTime;
use serde::Serialize;

use super::domain::ParsedBatch;
use super::schema::{columns, TablePart};

/// Snapshot of the ids already committed to the store. Batches merge into
/// prior data, so a vacancy may reference a row uploaded in an earlier batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceIndex {
    pub areas: HashSet<String>,
    pub job_categories: HashSet<String>,
    pub employers: HashSet<String>,
}

/// Constraint switches for one validation run. The clock is injected so the
/// future-date rule stays deterministic under test.
#[derive(Debug, Clone)]
pub struct ValidationRules {
    pub reject_future_publish_dates: bool,
    pub now: NaiveDateTime,
}

/// One constraint breach, tagged with the table and row it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
    pub table: TablePart,
    pub row_id: String,
    #[serde(flatten)]
    pub kind: ViolationKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ViolationKind {
    DuplicateId,
    DanglingReference { column: String, missing_id: String },
    SalaryBoundsOutOfOrder { lower: f64, upper: f64 },
    NegativeSalary { column: String, amount: f64 },
    PublishDateInFuture { published: NaiveDateTime },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} row '{}': ", self.table, self.row_id)?;
        match &self.kind {
            ViolationKind::DuplicateId => write!(f, "duplicate id"),
            ViolationKind::DanglingReference { column, missing_id } => {
                write!(f, "{} references missing id '{}'", column, missing_id)
            }
            ViolationKind::SalaryBoundsOutOfOrder { lower, upper } => {
                write!(f, "lower salary bound {} exceeds upper bound {}", lower, upper)
            }
            ViolationKind::NegativeSalary { column, amount } => {
                write!(f, "{} is negative ({})", column, amount)
            }
            ViolationKind::PublishDateInFuture { published } => {
                write!(f, "publish date {} is in the future", published)
            }
        }
    }
}

/// Checks the whole batch and reports every violation found. Pure: no order
/// dependence between checks, no writes, safe to rerun.
pub fn validate_batch(
    batch: &ParsedBatch,
    existing: &ReferenceIndex,
    rules: &ValidationRules,
) -> Vec<Violation> {
    let mut violations = Vec::new();

    let areas = unique_ids(
        batch.areas.iter().map(|row| row.id.as_str()),
        TablePart::Area,
        &mut violations,
    );
    let job_categories = unique_ids(
        batch.job_categories.iter().map(|row| row.id.as_str()),
        TablePart::JobCategory,
        &mut violations,
    );
    let employers = unique_ids(
        batch.employers.iter().map(|row| row.id.as_str()),
        TablePart::Employees,
        &mut violations,
    );
    unique_ids(
        batch.vacancies.iter().map(|row| row.id.as_str()),
        TablePart::Vacancy,
        &mut violations,
    );

    for vacancy in &batch.vacancies {
        let mut dangling = |column: &str, id: &str, batch_ids: &HashSet<&str>, known: &HashSet<String>| {
            if !batch_ids.contains(id) && !known.contains(id) {
                violations.push(Violation {
                    table: TablePart::Vacancy,
                    row_id: vacancy.id.clone(),
                    kind: ViolationKind::DanglingReference {
                        column: column.to_string(),
                        missing_id: id.to_string(),
                    },
                });
            }
        };

        dangling(columns::AREA_ID, &vacancy.area, &areas, &existing.areas);
        dangling(
            columns::JOB_CATEGORY_ID,
            &vacancy.job_category,
            &job_categories,
            &existing.job_categories,
        );
        dangling(
            columns::EMPLOYER_ID,
            &vacancy.employer,
            &employers,
            &existing.employers,
        );

        for (column, amount) in [
            (columns::LOWER_SALARY, vacancy.lower_bound_salary),
            (columns::UPPER_SALARY, vacancy.upper_bound_salary),
        ] {
            if let Some(amount) = amount {
                if amount < 0.0 {
                    violations.push(Violation {
                        table: TablePart::Vacancy,
                        row_id: vacancy.id.clone(),
                        kind: ViolationKind::NegativeSalary {
                            column: column.to_string(),
                            amount,
                        },
                    });
                }
            }
        }

        if let (Some(lower), Some(upper)) =
            (vacancy.lower_bound_salary, vacancy.upper_bound_salary)
        {
            if lower > upper {
                violations.push(Violation {
                    table: TablePart::Vacancy,
                    row_id: vacancy.id.clone(),
                    kind: ViolationKind::SalaryBoundsOutOfOrder { lower, upper },
                });
            }
        }

        if rules.reject_future_publish_dates && vacancy.publish_date > rules.now {
            violations.push(Violation {
                table: TablePart::Vacancy,
                row_id: vacancy.id.clone(),
                kind: ViolationKind::PublishDateInFuture {
                    published: vacancy.publish_date,
                },
            });
        }
    }

    violations
}

fn unique_ids<'a>(
    ids: impl Iterator<Item = &'a str>,
    table: TablePart,
    violations: &mut Vec<Violation>,
) -> HashSet<&'a str> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            violations.push(Violation {
                table,
                row_id: id.to_string(),
                kind: ViolationKind::DuplicateId,
            });
        }
    }
    seen
}

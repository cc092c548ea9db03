use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Region row from the `area` part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaRecord {
    pub id: String,
    pub name: String,
}

/// Occupation group row from the `job_category` part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobCategoryRecord {
    pub id: String,
    pub name: String,
}

/// Employer directory row from the `employees` part. Columns other than the
/// id/name pair ride along untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmployerRecord {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

/// One vacancy posting. The `job_category`, `area`, and `employer` fields are
/// foreign keys into the other three tables; `employment_type`,
/// `experience_type`, and `salary_currency` are opaque classifier ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VacancyRecord {
    pub id: String,
    pub job_title: String,
    pub job_category: String,
    pub area: String,
    pub lower_bound_salary: Option<f64>,
    pub upper_bound_salary: Option<f64>,
    pub salary_currency: String,
    pub employer: String,
    pub employment_type: String,
    pub experience_type: String,
    pub publish_date: NaiveDateTime,
    pub archived: bool,
}

/// Typed output of the parsing stage, one field per uploaded part.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedBatch {
    pub areas: Vec<AreaRecord>,
    pub job_categories: Vec<JobCategoryRecord>,
    pub employers: Vec<EmployerRecord>,
    pub vacancies: Vec<VacancyRecord>,
}

impl ParsedBatch {
    pub fn row_count(&self) -> usize {
        self.areas.len() + self.job_categories.len() + self.employers.len() + self.vacancies.len()
    }
}

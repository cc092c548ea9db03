use serde::Serialize;
use std::fmt;

/// The closed set of multipart part names the upload protocol accepts. The
/// `employees` part carries the employer directory; its name is fixed by the
/// upload client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TablePart {
    Area,
    JobCategory,
    Employees,
    Vacancy,
}

impl TablePart {
    pub const ALL: [TablePart; 4] = [
        TablePart::Area,
        TablePart::JobCategory,
        TablePart::Employees,
        TablePart::Vacancy,
    ];

    pub fn part_name(&self) -> &'static str {
        match self {
            TablePart::Area => "area",
            TablePart::JobCategory => "job_category",
            TablePart::Employees => "employees",
            TablePart::Vacancy => "vacancy",
        }
    }

    pub fn from_part_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|part| part.part_name() == name)
    }
}

impl fmt::Display for TablePart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.part_name())
    }
}

/// CSV column names, as produced by the upstream dataset export.
pub(crate) mod columns {
    pub const AREA_ID: &str = "area_id";
    pub const AREA_NAME: &str = "area_nm";

    pub const JOB_CATEGORY_ID: &str = "job_category_id";
    pub const JOB_CATEGORY_NAME: &str = "job_category_nm";

    // The employer export is seen in the wild with both header conventions.
    pub const EMPLOYER_ID: &str = "employer_id";
    pub const EMPLOYER_ID_SHORT: &str = "id";
    pub const EMPLOYER_NAME: &str = "employer_nm";
    pub const EMPLOYER_NAME_SHORT: &str = "name";

    pub const VACANCY_ID: &str = "vacancy_id";
    pub const JOB_TITLE: &str = "job_title_nm";
    pub const LOWER_SALARY: &str = "lower_bound_salary_amt";
    pub const UPPER_SALARY: &str = "upper_bound_salary_amt";
    pub const SALARY_CURRENCY: &str = "salary_currency_code";
    pub const EMPLOYMENT_TYPE: &str = "employment_type_name";
    pub const EXPERIENCE_TYPE: &str = "experience_type_name";
    pub const PUBLISH_DATE: &str = "vacancy_publish_dttm";
    pub const ARCHIVE_FLAG: &str = "vacancy_archive_flg";
}

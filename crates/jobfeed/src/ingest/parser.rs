use std::collections::HashMap;
use std::io::Read;
use std::marker::PhantomData;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use csv::StringRecord;

use super::domain::{AreaRecord, EmployerRecord, JobCategoryRecord, VacancyRecord};
use super::error::{IngestError, RowParseError};
use super::schema::{columns, TablePart};

const DEFAULT_TRUTHY_TOKENS: [&str; 5] = ["true", "1", "yes", "y", "t"];
const DEFAULT_FALSY_TOKENS: [&str; 5] = ["false", "0", "no", "n", "f"];

/// Tunables for cell coercion. Anchored to the ingestion clock so that rows
/// without an explicit publish date all land on the same timestamp.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    pub stop_on_first_error: bool,
    pub truthy_tokens: Vec<String>,
    pub falsy_tokens: Vec<String>,
    pub default_currency: String,
    pub default_employment_type: String,
    pub default_experience_type: String,
    pub default_publish_date: NaiveDateTime,
}

impl ParseOptions {
    pub fn new(now: NaiveDateTime) -> Self {
        Self {
            stop_on_first_error: false,
            truthy_tokens: DEFAULT_TRUTHY_TOKENS.map(str::to_string).to_vec(),
            falsy_tokens: DEFAULT_FALSY_TOKENS.map(str::to_string).to_vec(),
            default_currency: "RUB".to_string(),
            default_employment_type: "full_time".to_string(),
            default_experience_type: "1_to_3_years".to_string(),
            default_publish_date: now,
        }
    }
}

/// Header lookup built once per file. Cells are fetched by column name so the
/// column order in the export does not matter; repeated headers keep the
/// first occurrence.
#[derive(Debug, Clone)]
pub struct Columns {
    index: HashMap<String, usize>,
}

impl Columns {
    fn from_headers(headers: &StringRecord) -> Self {
        let mut index = HashMap::new();
        for (position, name) in headers.iter().enumerate() {
            let name = name.trim_start_matches('\u{feff}').trim();
            index.entry(name.to_string()).or_insert(position);
        }
        Self { index }
    }

    fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    fn get<'r>(&self, record: &'r StringRecord, name: &str) -> Option<&'r str> {
        self.index
            .get(name)
            .and_then(|position| record.get(*position))
            .map(str::trim)
    }

    fn names(&self) -> impl Iterator<Item = &str> {
        self.index.keys().map(String::as_str)
    }
}

/// Decodes one CSV record into a typed table row.
pub trait TableRow: Sized {
    const TABLE: TablePart;

    /// Required column names absent from the header, empty when the file is
    /// usable.
    fn missing_columns(columns: &Columns) -> Vec<String>;

    fn from_row(
        columns: &Columns,
        record: &StringRecord,
        row: u64,
        options: &ParseOptions,
    ) -> Result<Self, RowParseError>;
}

/// Finite, non-restartable iterator of typed rows over one CSV stream. Row
/// numbers are 1-based and exclude the header.
pub struct TypedRows<R: Read, T> {
    records: csv::StringRecordsIntoIter<R>,
    columns: Columns,
    options: ParseOptions,
    row: u64,
    _marker: PhantomData<T>,
}

impl<R: Read, T> std::fmt::Debug for TypedRows<R, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypedRows")
            .field("columns", &self.columns)
            .field("options", &self.options)
            .field("row", &self.row)
            .finish_non_exhaustive()
    }
}

impl<R: Read, T: TableRow> Iterator for TypedRows<R, T> {
    type Item = Result<T, RowParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = self.records.next()?;
        self.row += 1;

        match record {
            Ok(record) => Some(T::from_row(&self.columns, &record, self.row, &self.options)),
            Err(err) => Some(Err(RowParseError::record(
                T::TABLE,
                self.row,
                format!("malformed CSV record: {err}"),
            ))),
        }
    }
}

/// Opens one table stream: reads the header, verifies the schema, and hands
/// back the lazy row iterator. A missing required column fails the whole file
/// here, before any row is parsed.
pub fn typed_rows<R: Read, T: TableRow>(
    reader: R,
    options: &ParseOptions,
) -> Result<TypedRows<R, T>, IngestError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = match csv_reader.headers() {
        Ok(headers) => headers.clone(),
        // A stream without a readable header row is missing every column.
        Err(_) => {
            return Err(IngestError::SchemaMismatch {
                table: T::TABLE,
                missing_columns: T::missing_columns(&Columns {
                    index: HashMap::new(),
                }),
            })
        }
    };

    let columns = Columns::from_headers(&headers);
    let missing = T::missing_columns(&columns);
    if !missing.is_empty() {
        return Err(IngestError::SchemaMismatch {
            table: T::TABLE,
            missing_columns: missing,
        });
    }

    Ok(TypedRows {
        records: csv_reader.into_records(),
        columns,
        options: options.clone(),
        row: 0,
        _marker: PhantomData,
    })
}

pub fn area_rows<R: Read>(
    reader: R,
    options: &ParseOptions,
) -> Result<TypedRows<R, AreaRecord>, IngestError> {
    typed_rows(reader, options)
}

pub fn job_category_rows<R: Read>(
    reader: R,
    options: &ParseOptions,
) -> Result<TypedRows<R, JobCategoryRecord>, IngestError> {
    typed_rows(reader, options)
}

pub fn employer_rows<R: Read>(
    reader: R,
    options: &ParseOptions,
) -> Result<TypedRows<R, EmployerRecord>, IngestError> {
    typed_rows(reader, options)
}

pub fn vacancy_rows<R: Read>(
    reader: R,
    options: &ParseOptions,
) -> Result<TypedRows<R, VacancyRecord>, IngestError> {
    typed_rows(reader, options)
}

impl TableRow for AreaRecord {
    const TABLE: TablePart = TablePart::Area;

    fn missing_columns(columns: &Columns) -> Vec<String> {
        missing_of(columns, &[columns::AREA_ID, columns::AREA_NAME])
    }

    fn from_row(
        columns: &Columns,
        record: &StringRecord,
        row: u64,
        _options: &ParseOptions,
    ) -> Result<Self, RowParseError> {
        Ok(Self {
            id: required_cell(Self::TABLE, columns, record, row, columns::AREA_ID)?,
            name: required_cell(Self::TABLE, columns, record, row, columns::AREA_NAME)?,
        })
    }
}

impl TableRow for JobCategoryRecord {
    const TABLE: TablePart = TablePart::JobCategory;

    fn missing_columns(columns: &Columns) -> Vec<String> {
        missing_of(
            columns,
            &[columns::JOB_CATEGORY_ID, columns::JOB_CATEGORY_NAME],
        )
    }

    fn from_row(
        columns: &Columns,
        record: &StringRecord,
        row: u64,
        _options: &ParseOptions,
    ) -> Result<Self, RowParseError> {
        Ok(Self {
            id: required_cell(Self::TABLE, columns, record, row, columns::JOB_CATEGORY_ID)?,
            name: required_cell(Self::TABLE, columns, record, row, columns::JOB_CATEGORY_NAME)?,
        })
    }
}

impl TableRow for EmployerRecord {
    const TABLE: TablePart = TablePart::Employees;

    fn missing_columns(columns: &Columns) -> Vec<String> {
        let mut missing = Vec::new();
        if !columns.contains(columns::EMPLOYER_ID) && !columns.contains(columns::EMPLOYER_ID_SHORT)
        {
            missing.push(columns::EMPLOYER_ID.to_string());
        }
        if !columns.contains(columns::EMPLOYER_NAME)
            && !columns.contains(columns::EMPLOYER_NAME_SHORT)
        {
            missing.push(columns::EMPLOYER_NAME.to_string());
        }
        missing
    }

    fn from_row(
        columns: &Columns,
        record: &StringRecord,
        row: u64,
        _options: &ParseOptions,
    ) -> Result<Self, RowParseError> {
        let (id_column, id) = required_cell_either(
            Self::TABLE,
            columns,
            record,
            row,
            columns::EMPLOYER_ID,
            columns::EMPLOYER_ID_SHORT,
        )?;
        let (name_column, name) = required_cell_either(
            Self::TABLE,
            columns,
            record,
            row,
            columns::EMPLOYER_NAME,
            columns::EMPLOYER_NAME_SHORT,
        )?;

        let mut attributes = std::collections::BTreeMap::new();
        for column in columns.names() {
            if column == id_column || column == name_column {
                continue;
            }
            if let Some(value) = columns.get(record, column).filter(|value| !value.is_empty()) {
                attributes.insert(column.to_string(), value.to_string());
            }
        }

        Ok(Self {
            id,
            name,
            attributes,
        })
    }
}

impl TableRow for VacancyRecord {
    const TABLE: TablePart = TablePart::Vacancy;

    fn missing_columns(columns: &Columns) -> Vec<String> {
        missing_of(
            columns,
            &[
                columns::VACANCY_ID,
                columns::JOB_TITLE,
                columns::JOB_CATEGORY_ID,
                columns::AREA_ID,
                columns::EMPLOYER_ID,
            ],
        )
    }

    fn from_row(
        columns: &Columns,
        record: &StringRecord,
        row: u64,
        options: &ParseOptions,
    ) -> Result<Self, RowParseError> {
        let table = Self::TABLE;

        Ok(Self {
            id: required_cell(table, columns, record, row, columns::VACANCY_ID)?,
            job_title: required_cell(table, columns, record, row, columns::JOB_TITLE)?,
            job_category: required_cell(table, columns, record, row, columns::JOB_CATEGORY_ID)?,
            area: required_cell(table, columns, record, row, columns::AREA_ID)?,
            lower_bound_salary: optional_salary(table, columns, record, row, columns::LOWER_SALARY)?,
            upper_bound_salary: optional_salary(table, columns, record, row, columns::UPPER_SALARY)?,
            salary_currency: optional_cell(columns, record, columns::SALARY_CURRENCY)
                .unwrap_or_else(|| options.default_currency.clone()),
            employer: required_cell(table, columns, record, row, columns::EMPLOYER_ID)?,
            employment_type: optional_cell(columns, record, columns::EMPLOYMENT_TYPE)
                .unwrap_or_else(|| options.default_employment_type.clone()),
            experience_type: optional_cell(columns, record, columns::EXPERIENCE_TYPE)
                .unwrap_or_else(|| options.default_experience_type.clone()),
            publish_date: publish_date(table, columns, record, row, options)?,
            archived: archive_flag(table, columns, record, row, options)?,
        })
    }
}

fn missing_of(columns: &Columns, required: &[&str]) -> Vec<String> {
    required
        .iter()
        .copied()
        .filter(|name| !columns.contains(name))
        .map(str::to_string)
        .collect()
}

fn required_cell(
    table: TablePart,
    columns: &Columns,
    record: &StringRecord,
    row: u64,
    name: &str,
) -> Result<String, RowParseError> {
    match columns.get(record, name) {
        Some(value) if !value.is_empty() => Ok(value.to_string()),
        _ => Err(RowParseError::cell(
            table,
            row,
            name,
            "",
            "required cell is empty",
        )),
    }
}

fn required_cell_either(
    table: TablePart,
    columns: &Columns,
    record: &StringRecord,
    row: u64,
    preferred: &'static str,
    fallback: &'static str,
) -> Result<(&'static str, String), RowParseError> {
    for name in [preferred, fallback] {
        if let Some(value) = columns.get(record, name).filter(|value| !value.is_empty()) {
            return Ok((name, value.to_string()));
        }
    }
    Err(RowParseError::cell(
        table,
        row,
        preferred,
        "",
        "required cell is empty",
    ))
}

fn optional_cell(columns: &Columns, record: &StringRecord, name: &str) -> Option<String> {
    columns
        .get(record, name)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Empty cells mean "no salary bound", not zero. Negative amounts parse here
/// and are rejected by the validator.
fn optional_salary(
    table: TablePart,
    columns: &Columns,
    record: &StringRecord,
    row: u64,
    name: &str,
) -> Result<Option<f64>, RowParseError> {
    let Some(value) = optional_cell(columns, record, name) else {
        return Ok(None);
    };

    match value.parse::<f64>() {
        Ok(amount) if amount.is_finite() => Ok(Some(amount)),
        _ => Err(RowParseError::cell(
            table,
            row,
            name,
            &value,
            "expected a decimal amount",
        )),
    }
}

fn publish_date(
    table: TablePart,
    columns: &Columns,
    record: &StringRecord,
    row: u64,
    options: &ParseOptions,
) -> Result<NaiveDateTime, RowParseError> {
    let Some(value) = optional_cell(columns, record, columns::PUBLISH_DATE) else {
        return Ok(options.default_publish_date);
    };

    parse_datetime(&value).ok_or_else(|| {
        RowParseError::cell(
            table,
            row,
            columns::PUBLISH_DATE,
            &value,
            "expected an RFC 3339 timestamp or YYYY-MM-DD date",
        )
    })
}

fn archive_flag(
    table: TablePart,
    columns: &Columns,
    record: &StringRecord,
    row: u64,
    options: &ParseOptions,
) -> Result<bool, RowParseError> {
    let Some(value) = optional_cell(columns, record, columns::ARCHIVE_FLAG) else {
        return Ok(false);
    };

    let token = value.to_ascii_lowercase();
    if options.truthy_tokens.iter().any(|t| *t == token) {
        return Ok(true);
    }
    if options.falsy_tokens.iter().any(|t| *t == token) {
        return Ok(false);
    }
    Err(RowParseError::cell(
        table,
        row,
        columns::ARCHIVE_FLAG,
        &value,
        "unrecognized boolean token",
    ))
}

fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.naive_utc());
    }

    if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S") {
        return Some(dt);
    }

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0);
    }

    None
}

#[cfg(test)]
pub(crate) fn parse_datetime_for_tests(value: &str) -> Option<NaiveDateTime> {
    parse_datetime(value)
}

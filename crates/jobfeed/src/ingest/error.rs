use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};

use super::orchestrator::IngestStage;
use super::schema::TablePart;
use super::store::StoreError;
use super::validator::Violation;

/// One cell or record the parser could not coerce. Row numbers are 1-based
/// data rows, excluding the header.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowParseError {
    pub table: TablePart,
    pub row: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub reason: String,
}

impl RowParseError {
    pub(crate) fn cell(
        table: TablePart,
        row: u64,
        column: &str,
        value: &str,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            table,
            row,
            column: Some(column.to_string()),
            value: (!value.is_empty()).then(|| value.to_string()),
            reason: reason.into(),
        }
    }

    pub(crate) fn record(table: TablePart, row: u64, reason: impl Into<String>) -> Self {
        Self {
            table,
            row,
            column: None,
            value: None,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for RowParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} row {}", self.table, self.row)?;
        if let Some(column) = &self.column {
            write!(f, ", column '{}'", column)?;
        }
        if let Some(value) = &self.value {
            write!(f, " (value '{}')", value)?;
        }
        write!(f, ": {}", self.reason)
    }
}

/// Why a batch ended in the `Failed` state. Every variant knows its terminal
/// stage, a machine-readable kind, and the full list of collected problems.
#[derive(Debug)]
pub enum IngestError {
    IncompleteUpload {
        missing: Vec<&'static str>,
        unexpected: Vec<String>,
    },
    SchemaMismatch {
        table: TablePart,
        missing_columns: Vec<String>,
    },
    RowParse {
        errors: Vec<RowParseError>,
    },
    Referential {
        violations: Vec<Violation>,
    },
    Commit(StoreError),
    Timeout {
        stage: IngestStage,
    },
}

impl IngestError {
    pub fn stage(&self) -> IngestStage {
        match self {
            IngestError::IncompleteUpload { .. } => IngestStage::Receiving,
            IngestError::SchemaMismatch { .. } | IngestError::RowParse { .. } => {
                IngestStage::Parsing
            }
            IngestError::Referential { .. } => IngestStage::Validating,
            IngestError::Commit(_) => IngestStage::Committing,
            IngestError::Timeout { stage } => *stage,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::IncompleteUpload { .. } => "incomplete_upload",
            IngestError::SchemaMismatch { .. } => "schema_mismatch",
            IngestError::RowParse { .. } => "row_parse_error",
            IngestError::Referential { .. } => "referential_violation",
            IngestError::Commit(_) => "commit_error",
            IngestError::Timeout { .. } => "timeout",
        }
    }

    /// Every collected problem as one JSON object per entry. Never truncated:
    /// the operator fixes the whole upload in one round trip.
    pub fn details(&self) -> Vec<Value> {
        match self {
            IngestError::IncompleteUpload {
                missing,
                unexpected,
            } => missing
                .iter()
                .map(|part| json!({ "missing_part": part }))
                .chain(
                    unexpected
                        .iter()
                        .map(|part| json!({ "unexpected_part": part })),
                )
                .collect(),
            IngestError::SchemaMismatch {
                table,
                missing_columns,
            } => missing_columns
                .iter()
                .map(|column| json!({ "table": table, "missing_column": column }))
                .collect(),
            IngestError::RowParse { errors } => errors
                .iter()
                .map(|error| serde_json::to_value(error).unwrap_or_else(|_| Value::Null))
                .collect(),
            IngestError::Referential { violations } => violations
                .iter()
                .map(|violation| serde_json::to_value(violation).unwrap_or_else(|_| Value::Null))
                .collect(),
            IngestError::Commit(err) => vec![json!({ "error": err.to_string() })],
            IngestError::Timeout { stage } => vec![json!({ "stage": stage })],
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            IngestError::IncompleteUpload { .. } => StatusCode::BAD_REQUEST,
            IngestError::SchemaMismatch { .. }
            | IngestError::RowParse { .. }
            | IngestError::Referential { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            IngestError::Commit(_) => StatusCode::INTERNAL_SERVER_ERROR,
            IngestError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestError::IncompleteUpload {
                missing,
                unexpected,
            } => {
                write!(
                    f,
                    "upload must contain exactly the four named CSV parts (missing: {:?}, unexpected: {:?})",
                    missing, unexpected
                )
            }
            IngestError::SchemaMismatch {
                table,
                missing_columns,
            } => {
                write!(
                    f,
                    "{} file is missing required columns {:?}",
                    table, missing_columns
                )
            }
            IngestError::RowParse { errors } => {
                write!(f, "{} row(s) failed to parse", errors.len())
            }
            IngestError::Referential { violations } => {
                write!(f, "{} referential violation(s)", violations.len())
            }
            IngestError::Commit(err) => write!(f, "commit failed: {}", err),
            IngestError::Timeout { stage } => {
                write!(f, "batch exceeded its deadline during {}", stage)
            }
        }
    }
}

impl std::error::Error for IngestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IngestError::Commit(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for IngestError {
    fn from(value: StoreError) -> Self {
        Self::Commit(value)
    }
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "stage": self.stage(),
            "errorKind": self.kind(),
            "details": self.details(),
        }));
        (self.status_code(), body).into_response()
    }
}

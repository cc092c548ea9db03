//! Ingestion core for the vacancy dataset service: CSV row parsing,
//! cross-table reference validation, transactional loading, and the HTTP
//! surface the upload client talks to.

pub mod config;
pub mod error;
pub mod ingest;
pub mod telemetry;

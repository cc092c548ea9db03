use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;

use super::orchestrator::{IngestionOrchestrator, ProgressSink, RawBatch};
use super::store::VacancyStore;

/// Router builder exposing the upload endpoint the CSV client posts to and
/// the vacancy read endpoint.
pub fn ingest_router<S, P>(orchestrator: Arc<IngestionOrchestrator<S, P>>) -> Router
where
    S: VacancyStore + 'static,
    P: ProgressSink + 'static,
{
    let body_limit = orchestrator.config().max_upload_bytes;

    Router::new()
        .route("/api/take-data/", post(take_data_handler::<S, P>))
        .route("/api/vacancies", get(vacancy_list_handler::<S, P>))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(orchestrator)
}

pub(crate) async fn take_data_handler<S, P>(
    State(orchestrator): State<Arc<IngestionOrchestrator<S, P>>>,
    mut multipart: Multipart,
) -> Response
where
    S: VacancyStore + 'static,
    P: ProgressSink + 'static,
{
    let mut raw = RawBatch::new();

    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                let name = field.name().unwrap_or_default().to_string();
                match field.bytes().await {
                    Ok(bytes) => raw.insert(&name, bytes.to_vec()),
                    Err(err) => return multipart_error(err),
                }
            }
            Ok(None) => break,
            Err(err) => return multipart_error(err),
        }
    }

    let deadline = orchestrator.deadline();
    let worker = orchestrator.clone();
    let outcome = match tokio::task::spawn_blocking(move || worker.run(raw, deadline)).await {
        Ok(outcome) => outcome,
        Err(err) => {
            tracing::error!("ingestion worker aborted: {err}");
            let body = Json(json!({ "error": "ingestion worker aborted" }));
            return (StatusCode::INTERNAL_SERVER_ERROR, body).into_response();
        }
    };

    match outcome {
        Ok(summary) => {
            let body = Json(json!({ "status": "OK", "summary": summary }));
            (StatusCode::OK, body).into_response()
        }
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn vacancy_list_handler<S, P>(
    State(orchestrator): State<Arc<IngestionOrchestrator<S, P>>>,
) -> Response
where
    S: VacancyStore + 'static,
    P: ProgressSink + 'static,
{
    match orchestrator.store().vacancies() {
        Ok(rows) => (StatusCode::OK, Json(rows)).into_response(),
        Err(err) => {
            tracing::error!("vacancy read failed: {err}");
            let body = Json(json!({ "error": err.to_string() }));
            (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
        }
    }
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> Response {
    let body = Json(json!({ "error": format!("malformed multipart body: {err}") }));
    (StatusCode::BAD_REQUEST, body).into_response()
}

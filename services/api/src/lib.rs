mod cli;
mod import;
mod infra;
mod routes;
mod server;

use jobfeed::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}

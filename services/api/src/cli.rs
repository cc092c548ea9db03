use crate::import::{run_import, ImportArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use jobfeed::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Vacancy Dataset Loader",
    about = "Serve the bulk CSV ingestion API or run a one-shot import",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Ingest four CSV files from disk and print the commit summary
    Import(ImportArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Import(args) => run_import(args),
    }
}

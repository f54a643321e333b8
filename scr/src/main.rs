use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use scr::args::parse_args;
use scr::events::LoggingEventSink;
use scr::fetch::{load_cookie_file, DocumentFetcher};
use scr::observability::init_tracing;
use scr::traversal::Crawler;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "scr",
    version,
    about = "Extract content from documents with chains of matchers",
    after_help = "Arguments have the form name[chain-spec][=value], e.g. url=https://example.org cx=//h1/text() dx=//a/@href"
)]
struct Cli {
    /// Write logs as JSON lines
    #[arg(long, env = "SCR_LOG_JSON", default_value_t = false)]
    log_json: bool,

    /// Documents, chain options and global settings
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
    args: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("[ERROR]: {e:#}");
            ExitCode::from(1)
        }
    }
}

async fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = parse_args(&cli.args)?;
    init_tracing(config.run.verbosity, cli.log_json);

    let query = config.run.query_language.engine();
    let (chains, documents) = config.build(&*query, false)?;
    if documents.is_empty() {
        warn!("no documents given, nothing to do");
        return Ok(ExitCode::SUCCESS);
    }

    let mut fetch_config = config.run.fetch_config();
    if let Some(ref path) = config.run.cookie_file {
        fetch_config = fetch_config.with_cookies(load_cookie_file(path).await?);
    }
    #[cfg(feature = "http")]
    let fetcher = DocumentFetcher::from_config(&fetch_config)
        .context("failed to set up the http client")?;
    #[cfg(not(feature = "http"))]
    let fetcher = {
        let _ = fetch_config;
        DocumentFetcher::default()
    };

    let crawler = Crawler::new(chains, config.run.clone())
        .with_query_engine(query)
        .with_fetcher(Arc::new(fetcher))
        .with_events(Arc::new(LoggingEventSink::debug()));
    #[cfg(feature = "terminal")]
    let crawler = crawler.with_interaction(Arc::new(scr::engine::TerminalInteraction::new()));

    let token = crawler.cancellation();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel("interrupted");
        }
    });

    let summary = crawler.run(documents).await?;
    info!(
        fetched = summary.documents_fetched,
        finalized = summary.contents_finalized,
        failures = summary.fetch_failures + summary.format_failures + summary.output_failures,
        "done"
    );
    Ok(ExitCode::from(u8::try_from(summary.exit_code()).unwrap_or(1)))
}

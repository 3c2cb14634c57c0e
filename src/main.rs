use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

use bookcatalog::cli::{Cli, Command};

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    bookcatalog::logging::init().context("init logging")?;

    let cli = Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        Command::Scrape(args) => {
            bookcatalog::pipeline::scrape(args).await.context("scrape")?;
        }
        Command::Ingest(args) => {
            bookcatalog::pipeline::ingest_command(args)
                .await
                .context("ingest")?;
        }
        Command::Search(args) => {
            bookcatalog::catalog::search(args).await.context("search")?;
        }
        Command::Lookup(args) => {
            bookcatalog::catalog::lookup(args).await.context("lookup")?;
        }
        Command::Count(args) => {
            bookcatalog::catalog::count(args).await.context("count")?;
        }
        Command::Export(args) => {
            bookcatalog::export::run(args).await.context("export")?;
        }
        Command::Stats(args) => {
            bookcatalog::stats::run(args).await.context("stats")?;
        }
        Command::Schedule(args) => {
            bookcatalog::schedule::run(args).await.context("schedule")?;
        }
    }

    Ok(())
}

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;

use bookcatalog::store::{CatalogStore, SqliteCatalogStore};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct AppArgs {
    #[arg(long, default_value = "127.0.0.1:8080")]
    addr: SocketAddr,

    /// SQLite database file written by `bookcatalog`.
    #[arg(long, env = "BOOKCATALOG_DB", default_value = "catalog.db")]
    db: PathBuf,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return std::process::ExitCode::FAILURE;
    }
    std::process::ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    bookcatalog::logging::init()?;

    let args = AppArgs::parse();
    tracing::info!(?args, "starting bookcatalog-app");

    let store: Arc<dyn CatalogStore> = Arc::new(
        SqliteCatalogStore::open(&args.db)
            .await
            .with_context(|| format!("open catalog: {}", args.db.display()))?,
    );
    let app = bookcatalog::app::router(store);

    let listener = tokio::net::TcpListener::bind(args.addr)
        .await
        .map_err(|err| anyhow::anyhow!("bind {}: {err}", args.addr))?;
    tracing::info!(addr = %args.addr, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}

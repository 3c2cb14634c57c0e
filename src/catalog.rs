use std::io::Write as _;

use anyhow::Context as _;

use crate::cli::{LookupArgs, SearchArgs, StoreArgs};
use crate::store::{CatalogStore as _, SqliteCatalogStore};

pub(crate) async fn open_store(args: &StoreArgs) -> anyhow::Result<SqliteCatalogStore> {
    SqliteCatalogStore::open(&args.db)
        .await
        .with_context(|| format!("open catalog: {}", args.db.display()))
}

pub async fn search(args: SearchArgs) -> anyhow::Result<()> {
    let store = open_store(&args.store).await?;
    let query = args
        .query
        .as_deref()
        .map(str::trim)
        .filter(|query| !query.is_empty());
    let records = store.search(query, args.limit).await.context("search")?;
    tracing::info!(count = records.len(), "search finished");

    let mut stdout = std::io::stdout().lock();
    for record in &records {
        serde_json::to_writer(&mut stdout, record).context("serialize record")?;
        writeln!(stdout).context("write stdout")?;
    }
    Ok(())
}

pub async fn lookup(args: LookupArgs) -> anyhow::Result<()> {
    let store = open_store(&args.store).await?;
    let url = args.url.trim();
    let record = store
        .find_by_url(url)
        .await
        .context("lookup")?
        .ok_or_else(|| anyhow::anyhow!("no record for url: {url}"))?;
    let json = serde_json::to_string_pretty(&record).context("serialize record")?;
    println!("{json}");
    Ok(())
}

pub async fn count(args: StoreArgs) -> anyhow::Result<()> {
    let store = open_store(&args).await?;
    let total = store.count_all().await.context("count")?;
    println!("{total}");
    Ok(())
}

use std::path::Path;

use anyhow::Context as _;
use serde::Serialize;

use crate::catalog::open_store;
use crate::cli::{ExportArgs, ExportFormat};
use crate::formats::{BookRecord, display_price};
use crate::store::CatalogStore as _;

const LIST_SEPARATOR: &str = " | ";

pub async fn run(args: ExportArgs) -> anyhow::Result<()> {
    let store = open_store(&args.store).await?;
    let records = store.search(None, None).await.context("load catalog")?;

    let data = match args.format {
        ExportFormat::Csv => to_csv(&records)?,
        ExportFormat::Json => to_json(&records)?,
    };
    write_atomic(&args.out, &data).await?;

    tracing::info!(
        format = ?args.format,
        count = records.len(),
        out = %args.out.display(),
        "exported catalog"
    );
    Ok(())
}

#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    url: &'a str,
    title: &'a str,
    author: &'a str,
    original_price: String,
    discounted_price: String,
    rating: Option<f64>,
    num_ratings: u32,
    pages: Option<u32>,
    edition: &'a str,
    publication_date: &'a str,
    key_benefits: String,
    description: &'a str,
    what_you_will_learn: String,
}

impl<'a> From<&'a BookRecord> for CsvRow<'a> {
    fn from(record: &'a BookRecord) -> Self {
        Self {
            url: &record.url,
            title: &record.title,
            author: &record.author,
            original_price: display_price(record.original_price.as_ref()),
            discounted_price: display_price(record.discounted_price.as_ref()),
            rating: record.rating,
            num_ratings: record.num_ratings,
            pages: record.pages,
            edition: &record.edition,
            publication_date: &record.publication_date,
            key_benefits: record.key_benefits.join(LIST_SEPARATOR),
            description: &record.description,
            what_you_will_learn: record.what_you_will_learn.join(LIST_SEPARATOR),
        }
    }
}

/// Header row always present, one row per record.
pub fn to_csv(records: &[BookRecord]) -> anyhow::Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer
        .write_record([
            "url",
            "title",
            "author",
            "original_price",
            "discounted_price",
            "rating",
            "num_ratings",
            "pages",
            "edition",
            "publication_date",
            "key_benefits",
            "description",
            "what_you_will_learn",
        ])
        .context("write csv header")?;
    for record in records {
        writer
            .serialize(CsvRow::from(record))
            .with_context(|| format!("write csv row: {}", record.url))?;
    }
    writer
        .into_inner()
        .map_err(|err| anyhow::anyhow!("flush csv: {}", err.error()))
}

pub fn to_json(records: &[BookRecord]) -> anyhow::Result<Vec<u8>> {
    let mut data = serde_json::to_vec_pretty(records).context("serialize json")?;
    data.push(b'\n');
    Ok(data)
}

/// Writes a temporary sibling, then renames it over `path`.
async fn write_atomic(path: &Path, data: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("create export output dir: {}", parent.display()))?;
    }

    let tmp_path = path.with_extension(format!("tmp.{}", uuid::Uuid::new_v4().simple()));
    tokio::fs::write(&tmp_path, data)
        .await
        .with_context(|| format!("write tmp: {}", tmp_path.display()))?;
    if let Err(err) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(err).with_context(|| format!("rename tmp to final: {}", path.display()));
    }
    Ok(())
}

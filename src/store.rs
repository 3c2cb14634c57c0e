use std::path::Path;
use std::str::FromStr as _;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row as _, SqlitePool};

use crate::formats::{BookRecord, Price};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database: {0}")]
    Database(#[from] sqlx::Error),
    #[error("encode list column {column}: {source}")]
    Encode {
        column: &'static str,
        source: serde_json::Error,
    },
    #[error("decode list column {column} for {url}: {source}")]
    Decode {
        column: &'static str,
        url: String,
        source: serde_json::Error,
    },
    #[error("column {column} for {url} is out of range: {value}")]
    OutOfRange {
        column: &'static str,
        url: String,
        value: i64,
    },
}

/// Persistence for normalized records, keyed by source URL.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn find_by_url(&self, url: &str) -> Result<Option<BookRecord>, StoreError>;

    /// Inserts, or replaces every column of the row with the same URL.
    async fn upsert(&self, record: &BookRecord) -> Result<(), StoreError>;

    /// Case-insensitive substring match over title, author and description.
    /// `None` returns every record.
    async fn search(
        &self,
        query: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<BookRecord>, StoreError>;

    async fn count_all(&self) -> Result<u64, StoreError>;

    async fn list_urls(&self) -> Result<Vec<String>, StoreError>;
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS books (
    url TEXT PRIMARY KEY NOT NULL,
    title TEXT NOT NULL,
    author TEXT NOT NULL,
    original_price TEXT,
    discounted_price TEXT,
    rating REAL,
    num_ratings INTEGER NOT NULL DEFAULT 0,
    pages INTEGER,
    edition TEXT NOT NULL,
    publication_date TEXT NOT NULL,
    key_benefits TEXT NOT NULL,
    description TEXT NOT NULL,
    what_you_will_learn TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    title_folded TEXT NOT NULL DEFAULT '',
    author_folded TEXT NOT NULL DEFAULT '',
    description_folded TEXT NOT NULL DEFAULT ''
)
"#;

/// Lowercased copies of the searchable columns. SQLite's `LIKE` only
/// folds ASCII, so matching runs against these instead.
const FOLDED_COLUMNS: [&str; 3] = ["title_folded", "author_folded", "description_folded"];

const COLUMNS: &str = "url, title, author, original_price, discounted_price, rating, \
    num_ratings, pages, edition, publication_date, key_benefits, description, \
    what_you_will_learn";

const UPSERT: &str = r#"
INSERT INTO books (
    url, title, author, original_price, discounted_price, rating, num_ratings,
    pages, edition, publication_date, key_benefits, description,
    what_you_will_learn, updated_at, title_folded, author_folded,
    description_folded
) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
ON CONFLICT(url) DO UPDATE SET
    title = excluded.title,
    author = excluded.author,
    original_price = excluded.original_price,
    discounted_price = excluded.discounted_price,
    rating = excluded.rating,
    num_ratings = excluded.num_ratings,
    pages = excluded.pages,
    edition = excluded.edition,
    publication_date = excluded.publication_date,
    key_benefits = excluded.key_benefits,
    description = excluded.description,
    what_you_will_learn = excluded.what_you_will_learn,
    updated_at = excluded.updated_at,
    title_folded = excluded.title_folded,
    author_folded = excluded.author_folded,
    description_folded = excluded.description_folded
"#;

#[derive(Debug, Clone)]
pub struct SqliteCatalogStore {
    pool: SqlitePool,
}

impl SqliteCatalogStore {
    /// Opens (creating if needed) the database file at `path`.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        Self::with_pool(pool).await
    }

    /// A private database that lives as long as the store.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        // Every connection would otherwise see its own empty database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        sqlx::query(SCHEMA).execute(&pool).await?;
        add_folded_columns(&pool).await?;
        tracing::debug!("catalog schema ready");
        Ok(Self { pool })
    }
}

/// Brings a catalog created before the folded columns existed up to date.
async fn add_folded_columns(pool: &SqlitePool) -> Result<(), StoreError> {
    let existing: Vec<String> = sqlx::query_scalar("SELECT name FROM pragma_table_info('books')")
        .fetch_all(pool)
        .await?;
    let missing: Vec<&str> = FOLDED_COLUMNS
        .into_iter()
        .filter(|column| !existing.iter().any(|name| name == column))
        .collect();
    if missing.is_empty() {
        return Ok(());
    }

    for column in &missing {
        sqlx::query(&format!(
            "ALTER TABLE books ADD COLUMN {column} TEXT NOT NULL DEFAULT ''"
        ))
        .execute(pool)
        .await?;
    }

    let rows = sqlx::query("SELECT url, title, author, description FROM books")
        .fetch_all(pool)
        .await?;
    for row in &rows {
        let url: String = row.try_get("url")?;
        let title: String = row.try_get("title")?;
        let author: String = row.try_get("author")?;
        let description: String = row.try_get("description")?;
        sqlx::query(
            "UPDATE books SET title_folded = ?, author_folded = ?, description_folded = ? \
             WHERE url = ?",
        )
        .bind(fold_case(&title))
        .bind(fold_case(&author))
        .bind(fold_case(&description))
        .bind(&url)
        .execute(pool)
        .await?;
    }
    tracing::info!(columns = ?missing, rows = rows.len(), "added case-folded search columns");
    Ok(())
}

fn fold_case(text: &str) -> String {
    text.to_lowercase()
}

#[async_trait]
impl CatalogStore for SqliteCatalogStore {
    async fn find_by_url(&self, url: &str) -> Result<Option<BookRecord>, StoreError> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM books WHERE url = ?"))
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(record_from_row).transpose()
    }

    async fn upsert(&self, record: &BookRecord) -> Result<(), StoreError> {
        let key_benefits = encode_list("key_benefits", &record.key_benefits)?;
        let what_you_will_learn =
            encode_list("what_you_will_learn", &record.what_you_will_learn)?;

        sqlx::query(UPSERT)
            .bind(&record.url)
            .bind(&record.title)
            .bind(&record.author)
            .bind(record.original_price.as_ref().map(ToString::to_string))
            .bind(record.discounted_price.as_ref().map(ToString::to_string))
            .bind(record.rating)
            .bind(i64::from(record.num_ratings))
            .bind(record.pages.map(i64::from))
            .bind(&record.edition)
            .bind(&record.publication_date)
            .bind(key_benefits)
            .bind(&record.description)
            .bind(what_you_will_learn)
            .bind(Utc::now().to_rfc3339())
            .bind(fold_case(&record.title))
            .bind(fold_case(&record.author))
            .bind(fold_case(&record.description))
            .execute(&self.pool)
            .await?;

        tracing::debug!(url = %record.url, "book upserted");
        Ok(())
    }

    async fn search(
        &self,
        query: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<BookRecord>, StoreError> {
        let pattern = query
            .map(str::trim)
            .filter(|query| !query.is_empty())
            .map(|query| like_pattern(&fold_case(query)));
        let filter = if pattern.is_some() {
            r"WHERE title_folded LIKE ? ESCAPE '\' OR author_folded LIKE ? ESCAPE '\' OR description_folded LIKE ? ESCAPE '\'"
        } else {
            ""
        };
        let sql = format!("SELECT {COLUMNS} FROM books {filter} ORDER BY title, url LIMIT ?");
        // SQLite treats a negative limit as "no limit".
        let limit = limit
            .map(|limit| i64::try_from(limit).unwrap_or(i64::MAX))
            .unwrap_or(-1);

        let mut statement = sqlx::query(&sql);
        if let Some(pattern) = pattern {
            statement = statement
                .bind(pattern.clone())
                .bind(pattern.clone())
                .bind(pattern);
        }
        let rows = statement.bind(limit).fetch_all(&self.pool).await?;
        rows.iter().map(record_from_row).collect()
    }

    async fn count_all(&self) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM books")
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn list_urls(&self) -> Result<Vec<String>, StoreError> {
        let urls: Vec<String> = sqlx::query_scalar("SELECT url FROM books ORDER BY url")
            .fetch_all(&self.pool)
            .await?;
        Ok(urls)
    }
}

fn like_pattern(query: &str) -> String {
    let mut pattern = String::with_capacity(query.len() + 2);
    pattern.push('%');
    for ch in query.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

fn encode_list(column: &'static str, items: &[String]) -> Result<String, StoreError> {
    serde_json::to_string(items).map_err(|source| StoreError::Encode { column, source })
}

fn decode_list(column: &'static str, url: &str, json: &str) -> Result<Vec<String>, StoreError> {
    serde_json::from_str(json).map_err(|source| StoreError::Decode {
        column,
        url: url.to_owned(),
        source,
    })
}

fn to_u32(column: &'static str, url: &str, value: i64) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| StoreError::OutOfRange {
        column,
        url: url.to_owned(),
        value,
    })
}

fn record_from_row(row: &SqliteRow) -> Result<BookRecord, StoreError> {
    let url: String = row.try_get("url")?;
    let original_price: Option<String> = row.try_get("original_price")?;
    let discounted_price: Option<String> = row.try_get("discounted_price")?;
    let num_ratings: i64 = row.try_get("num_ratings")?;
    let pages: Option<i64> = row.try_get("pages")?;
    let key_benefits: String = row.try_get("key_benefits")?;
    let what_you_will_learn: String = row.try_get("what_you_will_learn")?;

    Ok(BookRecord {
        title: row.try_get("title")?,
        author: row.try_get("author")?,
        original_price: original_price.as_deref().and_then(Price::parse),
        discounted_price: discounted_price.as_deref().and_then(Price::parse),
        rating: row.try_get("rating")?,
        num_ratings: to_u32("num_ratings", &url, num_ratings)?,
        pages: pages
            .map(|pages| to_u32("pages", &url, pages))
            .transpose()?,
        edition: row.try_get("edition")?,
        publication_date: row.try_get("publication_date")?,
        key_benefits: decode_list("key_benefits", &url, &key_benefits)?,
        description: row.try_get("description")?,
        what_you_will_learn: decode_list("what_you_will_learn", &url, &what_you_will_learn)?,
        url,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book(url: &str, title: &str, author: &str) -> BookRecord {
        BookRecord {
            url: url.to_owned(),
            title: title.to_owned(),
            author: author.to_owned(),
            original_price: Price::parse("39.99"),
            discounted_price: None,
            rating: Some(4.5),
            num_ratings: 12,
            pages: Some(342),
            edition: "1st Edition".to_owned(),
            publication_date: "May 2024".to_owned(),
            key_benefits: vec!["One".to_owned(), "Two".to_owned()],
            description: format!("All about {title}."),
            what_you_will_learn: vec!["Things".to_owned()],
        }
    }

    #[tokio::test]
    async fn upsert_overwrites_by_url() -> anyhow::Result<()> {
        let store = SqliteCatalogStore::open_in_memory().await?;
        let url = "https://www.packtpub.com/product/a";

        store.upsert(&book(url, "First", "Ann")).await?;
        let mut second = book(url, "Second", "Bo");
        second.pages = None;
        second.rating = None;
        store.upsert(&second).await?;

        assert_eq!(store.count_all().await?, 1);
        assert_eq!(store.find_by_url(url).await?, Some(second));
        Ok(())
    }

    #[tokio::test]
    async fn search_is_case_insensitive_substring() -> anyhow::Result<()> {
        let store = SqliteCatalogStore::open_in_memory().await?;
        store
            .upsert(&book("https://www.packtpub.com/p/1", "Mastering Tableau", "Ann Lee"))
            .await?;
        store
            .upsert(&book("https://www.packtpub.com/p/2", "Practical MongoDB", "Bo Li"))
            .await?;
        store
            .upsert(&book("https://www.packtpub.com/p/3", "100% Rust", "Cy Young"))
            .await?;

        let titles = |records: Vec<BookRecord>| -> Vec<String> {
            records.into_iter().map(|record| record.title).collect()
        };

        assert_eq!(titles(store.search(Some("tableau"), None).await?), vec!["Mastering Tableau"]);
        assert_eq!(titles(store.search(Some("BO LI"), None).await?), vec!["Practical MongoDB"]);
        assert_eq!(titles(store.search(Some("all about practical"), None).await?), vec!["Practical MongoDB"]);
        assert_eq!(titles(store.search(Some("0%"), None).await?), vec!["100% Rust"]);
        assert_eq!(store.search(None, None).await?.len(), 3);
        assert_eq!(store.search(Some("  "), Some(2)).await?.len(), 2);
        assert!(store.search(Some("nothing like this"), None).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn search_folds_non_ascii_case() -> anyhow::Result<()> {
        let store = SqliteCatalogStore::open_in_memory().await?;
        store
            .upsert(&book("https://www.packtpub.com/p/1", "Éléments de Rust", "Ölaf Ärn"))
            .await?;
        store
            .upsert(&book("https://www.packtpub.com/p/2", "Elements of Go", "Olaf Arn"))
            .await?;

        for query in ["Éléments", "éléments", "ÉLÉMENTS", "ölaf", "ÖLAF", "ärn"] {
            let hits = store.search(Some(query), None).await?;
            assert_eq!(
                hits.iter().map(|record| record.url.as_str()).collect::<Vec<_>>(),
                vec!["https://www.packtpub.com/p/1"],
                "{query}"
            );
        }
        let plain = store.search(Some("ELEMENTS"), None).await?;
        assert_eq!(plain.len(), 1);
        assert_eq!(plain[0].title, "Elements of Go");
        Ok(())
    }

    #[tokio::test]
    async fn catalog_without_folded_columns_is_upgraded() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let path = temp.path().join("catalog.db");
        {
            let pool = SqlitePoolOptions::new()
                .max_connections(1)
                .connect_with(SqliteConnectOptions::new().filename(&path).create_if_missing(true))
                .await?;
            sqlx::query(
                "CREATE TABLE books (url TEXT PRIMARY KEY NOT NULL, title TEXT NOT NULL, \
                 author TEXT NOT NULL, original_price TEXT, discounted_price TEXT, rating REAL, \
                 num_ratings INTEGER NOT NULL DEFAULT 0, pages INTEGER, edition TEXT NOT NULL, \
                 publication_date TEXT NOT NULL, key_benefits TEXT NOT NULL, \
                 description TEXT NOT NULL, what_you_will_learn TEXT NOT NULL, \
                 updated_at TEXT NOT NULL)",
            )
            .execute(&pool)
            .await?;
            sqlx::query(
                "INSERT INTO books VALUES ('https://www.packtpub.com/p/1', 'Über Rust', 'Ann', \
                 NULL, NULL, NULL, 0, NULL, '1st', '2024', '[]', 'd', '[]', '2024-01-01')",
            )
            .execute(&pool)
            .await?;
            pool.close().await;
        }

        let store = SqliteCatalogStore::open(&path).await?;
        let hits = store.search(Some("über"), None).await?;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "Über Rust");
        Ok(())
    }

    #[tokio::test]
    async fn missing_url_is_none() -> anyhow::Result<()> {
        let store = SqliteCatalogStore::open_in_memory().await?;
        assert_eq!(store.find_by_url("https://www.packtpub.com/p/x").await?, None);
        assert!(store.list_urls().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn file_database_persists_across_opens() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let path = temp.path().join("catalog.db");
        {
            let store = SqliteCatalogStore::open(&path).await?;
            store
                .upsert(&book("https://www.packtpub.com/p/1", "Kept", "Ann"))
                .await?;
        }

        let reopened = SqliteCatalogStore::open(&path).await?;
        assert_eq!(reopened.list_urls().await?, vec!["https://www.packtpub.com/p/1"]);
        Ok(())
    }
}

use std::collections::HashMap;

use anyhow::Context as _;
use serde::Serialize;

use crate::catalog::open_store;
use crate::cli::StoreArgs;
use crate::formats::BookRecord;
use crate::store::CatalogStore;

pub const PRICE_BINS: usize = 20;
pub const RATING_BINS: usize = 10;
pub const TOP_AUTHORS: usize = 10;
const MAX_RATING: f64 = 5.0;

/// Half-open `[lower, upper)`; the last bucket of a histogram also holds
/// values equal to its `upper`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bucket {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorCount {
    pub author: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogStats {
    pub total: usize,
    pub priced: usize,
    pub rated: usize,
    pub mean_rating: Option<f64>,
    pub price_histogram: Vec<Bucket>,
    pub rating_histogram: Vec<Bucket>,
    pub top_authors: Vec<AuthorCount>,
}

impl CatalogStats {
    pub fn from_records(records: &[BookRecord]) -> Self {
        let prices: Vec<f64> = records
            .iter()
            .filter_map(|record| record.discounted_price.as_ref())
            .map(|price| price.amount())
            .collect();
        let ratings: Vec<f64> = records.iter().filter_map(|record| record.rating).collect();

        let mean_rating = if ratings.is_empty() {
            None
        } else {
            Some(ratings.iter().sum::<f64>() / ratings.len() as f64)
        };

        let price_histogram = match min_max(&prices) {
            Some((min, max)) => histogram(&prices, min, max, PRICE_BINS),
            None => Vec::new(),
        };

        Self {
            total: records.len(),
            priced: prices.len(),
            rated: ratings.len(),
            mean_rating,
            price_histogram,
            rating_histogram: histogram(&ratings, 0.0, MAX_RATING, RATING_BINS),
            top_authors: top_authors(records, TOP_AUTHORS),
        }
    }
}

fn min_max(values: &[f64]) -> Option<(f64, f64)> {
    values.iter().fold(None, |acc, &value| match acc {
        None => Some((value, value)),
        Some((min, max)) => Some((min.min(value), max.max(value))),
    })
}

/// Equal-width bins over `[min, max]`. A zero-width range collapses to a
/// single bucket.
fn histogram(values: &[f64], min: f64, max: f64, bins: usize) -> Vec<Bucket> {
    let span = max - min;
    if span <= 0.0 || bins == 0 {
        return vec![Bucket {
            lower: min,
            upper: max,
            count: values.len(),
        }];
    }

    let width = span / bins as f64;
    let mut buckets: Vec<Bucket> = (0..bins)
        .map(|index| Bucket {
            lower: min + width * index as f64,
            upper: if index + 1 == bins {
                max
            } else {
                min + width * (index + 1) as f64
            },
            count: 0,
        })
        .collect();

    for &value in values {
        if !(min..=max).contains(&value) {
            continue;
        }
        let index = (((value - min) / width) as usize).min(bins - 1);
        buckets[index].count += 1;
    }
    buckets
}

/// Co-authors are credited individually. Ties are ordered by name.
fn top_authors(records: &[BookRecord], limit: usize) -> Vec<AuthorCount> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for record in records {
        for author in record.author.split(", ").map(str::trim) {
            if !author.is_empty() {
                *counts.entry(author).or_default() += 1;
            }
        }
    }

    let mut ranked: Vec<AuthorCount> = counts
        .into_iter()
        .map(|(author, count)| AuthorCount {
            author: author.to_owned(),
            count,
        })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.author.cmp(&b.author)));
    ranked.truncate(limit);
    ranked
}

pub async fn compute(store: &dyn CatalogStore) -> anyhow::Result<CatalogStats> {
    let records = store.search(None, None).await.context("load catalog")?;
    Ok(CatalogStats::from_records(&records))
}

pub async fn run(args: StoreArgs) -> anyhow::Result<()> {
    let store = open_store(&args).await?;
    let stats = compute(&store).await?;
    let json = serde_json::to_string_pretty(&stats).context("serialize stats")?;
    println!("{json}");
    Ok(())
}

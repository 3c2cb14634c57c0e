use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Field values as read off a rendered product page.
///
/// `None` means the locator never matched within its timeout. Nothing here
/// has been cleaned or coerced yet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawBook {
    pub url: String,
    #[serde(default, deserialize_with = "text_or_number")]
    pub title: Option<String>,
    #[serde(default, alias = "author", deserialize_with = "one_or_many")]
    pub authors: Vec<String>,
    #[serde(default, deserialize_with = "text_or_number")]
    pub original_price: Option<String>,
    #[serde(default, deserialize_with = "text_or_number")]
    pub discounted_price: Option<String>,
    #[serde(default, deserialize_with = "text_or_number")]
    pub rating: Option<String>,
    #[serde(default, deserialize_with = "text_or_number")]
    pub num_ratings: Option<String>,
    #[serde(default, deserialize_with = "text_or_number")]
    pub pages: Option<String>,
    #[serde(default, deserialize_with = "text_or_number")]
    pub edition: Option<String>,
    #[serde(default, deserialize_with = "text_or_number")]
    pub publication_date: Option<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub key_benefits: Vec<String>,
    #[serde(default, deserialize_with = "text_or_number")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub what_you_will_learn: Vec<String>,
}

/// A cleaned, validated catalog entry. `url` is its only identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookRecord {
    pub url: String,
    pub title: String,
    pub author: String,
    #[serde(with = "price_or_na")]
    pub original_price: Option<Price>,
    #[serde(with = "price_or_na")]
    pub discounted_price: Option<Price>,
    pub rating: Option<f64>,
    pub num_ratings: u32,
    pub pages: Option<u32>,
    pub edition: String,
    pub publication_date: String,
    pub key_benefits: Vec<String>,
    pub description: String,
    pub what_you_will_learn: Vec<String>,
}

/// Text shown wherever a price could not be read.
pub const PRICE_UNAVAILABLE: &str = "N/A";

/// A dollar amount kept as the decimal text that was scraped (`"39.99"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Price(String);

impl Price {
    /// Keeps only digits and the decimal point, then requires the rest to
    /// be a finite number. `"USD 39.99"` and `"$39.99"` both give `39.99`.
    pub fn parse(raw: &str) -> Option<Self> {
        let digits: String = raw
            .chars()
            .filter(|ch| ch.is_ascii_digit() || *ch == '.')
            .collect();
        let value = digits.parse::<f64>().ok()?;
        if !value.is_finite() {
            return None;
        }
        Some(Self(digits))
    }

    pub fn amount(&self) -> f64 {
        self.0.parse().unwrap_or_default()
    }

    pub fn digits(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.0)
    }
}

pub fn display_price(price: Option<&Price>) -> String {
    match price {
        Some(price) => price.to_string(),
        None => PRICE_UNAVAILABLE.to_owned(),
    }
}

impl From<&BookRecord> for RawBook {
    fn from(record: &BookRecord) -> Self {
        Self {
            url: record.url.clone(),
            title: Some(record.title.clone()),
            authors: vec![record.author.clone()],
            original_price: record.original_price.as_ref().map(ToString::to_string),
            discounted_price: record.discounted_price.as_ref().map(ToString::to_string),
            rating: record.rating.map(|rating| rating.to_string()),
            num_ratings: Some(record.num_ratings.to_string()),
            pages: record.pages.map(|pages| pages.to_string()),
            edition: Some(record.edition.clone()),
            publication_date: Some(record.publication_date.clone()),
            key_benefits: record.key_benefits.clone(),
            description: Some(record.description.clone()),
            what_you_will_learn: record.what_you_will_learn.clone(),
        }
    }
}

mod price_or_na {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::{Price, display_price};

    pub fn serialize<S: Serializer>(price: &Option<Price>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&display_price(price.as_ref()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Price>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().and_then(Price::parse))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Integer(i64),
    Float(f64),
}

impl Scalar {
    fn into_text(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Integer(value) => value.to_string(),
            Self::Float(value) => value.to_string(),
        }
    }
}

fn text_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<Scalar>::deserialize(deserializer)?.map(Scalar::into_text))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        Some(OneOrMany::One(value)) => vec![value],
        Some(OneOrMany::Many(values)) => values,
        None => Vec::new(),
    })
}

use crate::formats::{BookRecord, Price, RawBook};

pub const KEY_BENEFITS_PLACEHOLDER: &str = "No key benefits found";
pub const LEARNING_PLACEHOLDER: &str = "No information found";

const AUTHOR_CONNECTORS: &[&str] = &["by", "and", "&", "with"];
const RATING_SUFFIXES: &[&str] = &["out of 5 stars", "out of 5", "/5", "stars", "star"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("missing or empty required field: {0}")]
    MissingField(&'static str),
}

/// Cleans and coerces a raw extraction into a catalog record.
///
/// Fails without producing anything when a required text field
/// (`url`, `title`, `author`, `edition`, `publication_date`,
/// `description`) is absent or blank after cleaning. Prices, rating,
/// counts and lists are always defaulted.
pub fn normalize(raw: &RawBook) -> Result<BookRecord, ValidationError> {
    let url = clean_text(&raw.url);
    let title = clean_optional(raw.title.as_deref());
    let author = normalize_authors(&raw.authors);
    let edition = clean_optional(raw.edition.as_deref());
    let publication_date = clean_optional(raw.publication_date.as_deref());
    let description = clean_optional(raw.description.as_deref());

    let original_price = raw.original_price.as_deref().and_then(Price::parse);
    let discounted_price = raw.discounted_price.as_deref().and_then(Price::parse);
    let rating = raw.rating.as_deref().and_then(parse_rating);
    let num_ratings = raw.num_ratings.as_deref().map_or(0, parse_num_ratings);
    let pages = raw.pages.as_deref().and_then(parse_pages);

    let key_benefits = normalize_list(&raw.key_benefits, KEY_BENEFITS_PLACEHOLDER);
    let what_you_will_learn = normalize_list(&raw.what_you_will_learn, LEARNING_PLACEHOLDER);

    Ok(BookRecord {
        url: required("url", Some(url))?,
        title: required("title", title)?,
        author: required("author", author)?,
        original_price,
        discounted_price,
        rating,
        num_ratings,
        pages,
        edition: required("edition", edition)?,
        publication_date: required("publication_date", publication_date)?,
        key_benefits,
        description: required("description", description)?,
        what_you_will_learn,
    })
}

/// Trims and collapses every run of whitespace to a single space.
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Splits author entries on separators, drops leading connector words
/// ("By", "and", ...), and rejoins the names with `", "`.
pub fn normalize_authors(entries: &[String]) -> Option<String> {
    let names: Vec<String> = entries
        .iter()
        .flat_map(|entry| entry.split([',', ';', '&', '\n']))
        .flat_map(|part| part.split(" and "))
        .map(strip_connectors)
        .filter(|name| !name.is_empty())
        .collect();

    if names.is_empty() {
        return None;
    }
    Some(names.join(", "))
}

fn strip_connectors(part: &str) -> String {
    let mut words: Vec<&str> = part.split_whitespace().collect();
    while let Some(first) = words.first() {
        let word = first.trim_end_matches(':').to_ascii_lowercase();
        if !AUTHOR_CONNECTORS.contains(&word.as_str()) {
            break;
        }
        words.remove(0);
    }
    words.join(" ")
}

/// `"4.5 out of 5 stars"` gives `4.5`. Anything unparsable or outside
/// 0–5 gives `None`.
pub fn parse_rating(raw: &str) -> Option<f64> {
    let lowered = clean_text(raw).to_ascii_lowercase();
    let mut text = lowered.as_str();
    for suffix in RATING_SUFFIXES {
        if let Some(stripped) = text.strip_suffix(suffix) {
            text = stripped.trim_end();
            break;
        }
    }
    text.parse::<f64>()
        .ok()
        .filter(|rating| rating.is_finite() && (0.0..=5.0).contains(rating))
}

/// `"(128 Ratings)"` gives `128`; no digits gives `0`.
pub fn parse_num_ratings(raw: &str) -> u32 {
    digits_only(raw).unwrap_or(0)
}

/// `"342 pages"` gives `Some(342)`; no digits gives `None`.
pub fn parse_pages(raw: &str) -> Option<u32> {
    digits_only(raw)
}

fn digits_only(raw: &str) -> Option<u32> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    digits.parse().ok()
}

fn normalize_list(items: &[String], placeholder: &str) -> Vec<String> {
    let cleaned: Vec<String> = items
        .iter()
        .map(|item| clean_text(item))
        .filter(|item| !item.is_empty())
        .collect();
    if cleaned.is_empty() {
        return vec![placeholder.to_owned()];
    }
    cleaned
}

fn clean_optional(text: Option<&str>) -> Option<String> {
    text.map(clean_text).filter(|text| !text.is_empty())
}

fn required(field: &'static str, value: Option<String>) -> Result<String, ValidationError> {
    value
        .filter(|value| !value.is_empty())
        .ok_or(ValidationError::MissingField(field))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_raw() -> RawBook {
        RawBook {
            url: "https://www.packtpub.com/en-us/product/building-llm-powered-applications"
                .to_owned(),
            title: Some("  Building LLM Powered\n   Applications ".to_owned()),
            authors: vec!["By".to_owned(), "Valentina Alto".to_owned()],
            original_price: Some("$39.99".to_owned()),
            discounted_price: Some("USD 27.98".to_owned()),
            rating: Some("4.5 out of 5 stars".to_owned()),
            num_ratings: Some("(128 Ratings)".to_owned()),
            pages: Some("342 pages".to_owned()),
            edition: Some("1st Edition".to_owned()),
            publication_date: Some("May 2024".to_owned()),
            key_benefits: vec![
                " Embed LLMs into real-world applications ".to_owned(),
                "   ".to_owned(),
            ],
            description: Some("A book about\tcreating intelligent apps.".to_owned()),
            what_you_will_learn: Vec::new(),
        }
    }

    #[test]
    fn normalizes_a_complete_page() -> anyhow::Result<()> {
        let record = normalize(&sample_raw())?;

        assert_eq!(record.title, "Building LLM Powered Applications");
        assert_eq!(record.author, "Valentina Alto");
        assert_eq!(record.original_price.map(|p| p.to_string()).as_deref(), Some("$39.99"));
        assert_eq!(record.discounted_price.map(|p| p.to_string()).as_deref(), Some("$27.98"));
        assert_eq!(record.rating, Some(4.5));
        assert_eq!(record.num_ratings, 128);
        assert_eq!(record.pages, Some(342));
        assert_eq!(record.description, "A book about creating intelligent apps.");
        assert_eq!(
            record.key_benefits,
            vec!["Embed LLMs into real-world applications".to_owned()]
        );
        assert_eq!(record.what_you_will_learn, vec![LEARNING_PLACEHOLDER.to_owned()]);
        Ok(())
    }

    #[test]
    fn normalize_is_idempotent() -> anyhow::Result<()> {
        let mut variants = vec![sample_raw()];

        let mut sparse = sample_raw();
        sparse.original_price = None;
        sparse.discounted_price = Some("free".to_owned());
        sparse.rating = Some("Rating not found".to_owned());
        sparse.num_ratings = None;
        sparse.pages = Some("Pages not specified".to_owned());
        sparse.key_benefits.clear();
        sparse.authors = vec!["By, Jane Doe and John Roe".to_owned()];
        variants.push(sparse);

        for raw in variants {
            let once = normalize(&raw)?;
            let twice = normalize(&RawBook::from(&once))?;
            assert_eq!(twice, once);
        }
        Ok(())
    }

    #[test]
    fn missing_required_field_rejects_whole_record() {
        let cases: [(&str, fn(&mut RawBook)); 6] = [
            ("url", |raw| raw.url = "  ".to_owned()),
            ("title", |raw| raw.title = None),
            ("author", |raw| raw.authors = vec!["By".to_owned()]),
            ("edition", |raw| raw.edition = Some("\n".to_owned())),
            ("publication_date", |raw| raw.publication_date = None),
            ("description", |raw| raw.description = Some(String::new())),
        ];

        for (field, strip) in cases {
            let mut raw = sample_raw();
            strip(&mut raw);
            assert_eq!(normalize(&raw), Err(ValidationError::MissingField(field)));
        }
    }

    #[test]
    fn price_forms() {
        for raw in ["$39.99", "39.99", "USD 39.99"] {
            assert_eq!(
                Price::parse(raw).map(|p| p.to_string()).as_deref(),
                Some("$39.99"),
                "{raw}"
            );
        }
        assert_eq!(Price::parse("Price not found"), None);
        assert_eq!(Price::parse("1.2.3"), None);
    }

    #[test]
    fn rating_forms() {
        assert_eq!(parse_rating("4.5 out of 5 stars"), Some(4.5));
        assert_eq!(parse_rating(" 5 "), Some(5.0));
        assert_eq!(parse_rating("3.8/5"), Some(3.8));
        assert_eq!(parse_rating("Rating not found"), None);
        assert_eq!(parse_rating("7"), None);
    }

    #[test]
    fn count_forms() {
        assert_eq!(parse_num_ratings("(128 Ratings)"), 128);
        assert_eq!(parse_num_ratings("(1,024 Ratings)"), 1024);
        assert_eq!(parse_num_ratings("0"), 0);
        assert_eq!(parse_num_ratings("Not found"), 0);
        assert_eq!(parse_pages("342 pages"), Some(342));
        assert_eq!(parse_pages("Pages not specified"), None);
    }

    #[test]
    fn author_lists_are_split_and_rejoined() {
        let entries = vec![
            "By, Jane Doe,, John Roe".to_owned(),
            "and Ann Lee & Bo Li".to_owned(),
            "Byron Katz".to_owned(),
        ];
        assert_eq!(
            normalize_authors(&entries).as_deref(),
            Some("Jane Doe, John Roe, Ann Lee, Bo Li, Byron Katz")
        );
        assert_eq!(normalize_authors(&["By".to_owned()]), None);
    }
}

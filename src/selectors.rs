use std::fmt;
use std::path::Path;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

/// How to find an element on a rendered page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "by", content = "value", rename_all = "snake_case")]
pub enum Locator {
    Css(String),
    ClassName(String),
    #[serde(rename = "xpath")]
    XPath(String),
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css(selector.into())
    }

    pub fn class_name(name: impl Into<String>) -> Self {
        Self::ClassName(name.into())
    }

    pub fn xpath(expression: impl Into<String>) -> Self {
        Self::XPath(expression.into())
    }

    pub fn value(&self) -> &str {
        match self {
            Self::Css(value) | Self::ClassName(value) | Self::XPath(value) => value,
        }
    }

    /// CSS form of a class-name or CSS locator; `None` for XPath.
    ///
    /// A compound class attribute (`"authors desktop"`) becomes `.authors.desktop`.
    pub fn to_css(&self) -> Option<String> {
        match self {
            Self::Css(selector) => Some(selector.clone()),
            Self::ClassName(name) => Some(
                name.split_whitespace()
                    .map(|class| format!(".{class}"))
                    .collect::<String>(),
            ),
            Self::XPath(_) => None,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.value().trim().is_empty() {
            return Err(format!("empty {} locator", self.kind()));
        }
        Ok(())
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Css(_) => "css",
            Self::ClassName(_) => "class_name",
            Self::XPath(_) => "xpath",
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.kind(), self.value())
    }
}

/// Locators for every product field. Each field tries its locators in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Selectors {
    pub title: Vec<Locator>,
    pub authors: Vec<Locator>,
    pub original_price: Vec<Locator>,
    pub discounted_price: Vec<Locator>,
    pub rating: Vec<Locator>,
    pub num_ratings: Vec<Locator>,
    pub pages: Vec<Locator>,
    pub edition: Vec<Locator>,
    pub publication_date: Vec<Locator>,
    pub key_benefits: Vec<Locator>,
    pub description: Vec<Locator>,
    pub what_you_will_learn: Vec<Locator>,
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            title: vec![Locator::class_name("product-title")],
            authors: vec![Locator::xpath(
                "//div[contains(@class, 'authors desktop')]/span[not(@class)]",
            )],
            original_price: vec![Locator::css(".product-details-price del")],
            discounted_price: vec![Locator::xpath(
                "//*[contains(@class, 'product-details-price')]//span[contains(@class, 'fw-600')]",
            )],
            rating: vec![Locator::class_name("star-rating-total-rating-medium")],
            num_ratings: vec![Locator::class_name("star-rating-total-count")],
            pages: vec![
                Locator::xpath(
                    "//div[contains(@class, 'product-details-section-key')][normalize-space()='Pages']/following-sibling::div[1]",
                ),
                Locator::class_name("product-pages"),
            ],
            edition: vec![
                Locator::xpath(
                    "//div[contains(@class, 'product-details-section-key')][normalize-space()='Edition']/following-sibling::div[1]",
                ),
                Locator::class_name("product-edition"),
            ],
            publication_date: vec![
                Locator::xpath(
                    "//div[contains(@class, 'product-details-section-key')][normalize-space()='Published']/following-sibling::div[1]",
                ),
                Locator::class_name("product-publication-date"),
            ],
            key_benefits: vec![Locator::css("#key-benefits ul li")],
            description: vec![
                Locator::css("#description .product-book-content-details"),
                Locator::class_name("product-book-content-details"),
            ],
            what_you_will_learn: vec![Locator::css("#what-you-will-learn ul li")],
        }
    }
}

impl Selectors {
    /// Reads a YAML override. Fields left out keep their defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("read selectors: {}", path.display()))?;
        let selectors: Self = serde_yaml::from_str(&yaml)
            .with_context(|| format!("parse selectors: {}", path.display()))?;
        selectors.validate()?;
        Ok(selectors)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        for (field, locators) in self.fields() {
            if locators.is_empty() {
                anyhow::bail!("selectors for {field} must not be empty");
            }
            for locator in locators {
                locator
                    .validate()
                    .map_err(|reason| anyhow::anyhow!("selectors for {field}: {reason}"))?;
            }
        }
        Ok(())
    }

    fn fields(&self) -> [(&'static str, &[Locator]); 12] {
        [
            ("title", self.title.as_slice()),
            ("authors", self.authors.as_slice()),
            ("original_price", self.original_price.as_slice()),
            ("discounted_price", self.discounted_price.as_slice()),
            ("rating", self.rating.as_slice()),
            ("num_ratings", self.num_ratings.as_slice()),
            ("pages", self.pages.as_slice()),
            ("edition", self.edition.as_slice()),
            ("publication_date", self.publication_date.as_slice()),
            ("key_benefits", self.key_benefits.as_slice()),
            ("description", self.description.as_slice()),
            ("what_you_will_learn", self.what_you_will_learn.as_slice()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_names_become_compound_css() {
        assert_eq!(
            Locator::class_name("authors desktop").to_css().as_deref(),
            Some(".authors.desktop")
        );
        assert_eq!(Locator::xpath("//span").to_css(), None);
    }

    #[test]
    fn defaults_are_valid() -> anyhow::Result<()> {
        Selectors::default().validate()
    }

    #[test]
    fn yaml_override_keeps_unlisted_defaults() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let path = temp.path().join("selectors.yaml");
        std::fs::write(
            &path,
            "title:\n  - by: css\n    value: h1.title\n  - by: xpath\n    value: //h1\n",
        )?;

        let selectors = Selectors::load(&path)?;
        assert_eq!(
            selectors.title,
            vec![Locator::css("h1.title"), Locator::xpath("//h1")]
        );
        assert_eq!(selectors.rating, Selectors::default().rating);
        Ok(())
    }

    #[test]
    fn empty_locator_is_rejected() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let path = temp.path().join("selectors.yaml");
        std::fs::write(&path, "rating:\n  - by: class_name\n    value: \"  \"\n")?;

        let err = Selectors::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("selectors for rating"));
        Ok(())
    }
}

//! PII detection patterns and redaction appearance.
//!
//! The catalog is built once at start-up and shared read-only by every
//! redaction call, so it carries no interior mutability.

mod style;

pub use style::{RedactionStyle, Rgb};

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("pattern {name} failed to compile: {source}")]
    Compile {
        name: &'static str,
        #[source]
        source: regex::Error,
    },
}

/// PII category
///
/// The closed set of categories the catalog knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PiiCategory {
    Email,
    PhoneNumber,
    Ssn,
    CreditCard,
}

impl PiiCategory {
    pub const ALL: [PiiCategory; 4] = [
        PiiCategory::Email,
        PiiCategory::PhoneNumber,
        PiiCategory::Ssn,
        PiiCategory::CreditCard,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PiiCategory::Email => "EMAIL",
            PiiCategory::PhoneNumber => "PHONE_NUMBER",
            PiiCategory::Ssn => "SSN",
            PiiCategory::CreditCard => "CREDIT_CARD",
        }
    }

    fn source(&self) -> &'static str {
        match self {
            PiiCategory::Email => r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}",
            PiiCategory::PhoneNumber => r"\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}",
            PiiCategory::Ssn => r"\b\d{3}-\d{2}-\d{4}\b",
            PiiCategory::CreditCard => r"\b(?:\d[ -]*?){13,16}\b",
        }
    }
}

impl fmt::Display for PiiCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PiiCategory {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PiiCategory::ALL
            .into_iter()
            .find(|c| c.name() == s)
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown PII category: {0}")]
pub struct UnknownCategory(pub String);

/// A compiled detection rule.
#[derive(Debug, Clone)]
pub struct DetectionPattern {
    pub category: PiiCategory,
    pub matcher: Regex,
}

impl DetectionPattern {
    pub fn name(&self) -> &'static str {
        self.category.name()
    }
}

/// Which categories a caller wants redacted.
///
/// Built from a loose `name -> enabled` map; names the catalog does not know
/// are dropped on construction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, bool>", into = "BTreeMap<String, bool>")]
pub struct PatternSelection {
    flags: BTreeMap<PiiCategory, bool>,
}

impl PatternSelection {
    /// Every known category enabled.
    pub fn all() -> Self {
        PiiCategory::ALL.into_iter().collect()
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn set(&mut self, category: PiiCategory, enabled: bool) {
        self.flags.insert(category, enabled);
    }

    pub fn with(mut self, category: PiiCategory, enabled: bool) -> Self {
        self.set(category, enabled);
        self
    }

    pub fn is_enabled(&self, category: PiiCategory) -> bool {
        self.flags.get(&category).copied().unwrap_or(false)
    }

    pub fn enabled(&self) -> impl Iterator<Item = PiiCategory> + '_ {
        self.flags
            .iter()
            .filter(|(_, enabled)| **enabled)
            .map(|(category, _)| *category)
    }

    pub fn is_empty(&self) -> bool {
        self.enabled().next().is_none()
    }
}

impl FromIterator<PiiCategory> for PatternSelection {
    fn from_iter<I: IntoIterator<Item = PiiCategory>>(iter: I) -> Self {
        Self {
            flags: iter.into_iter().map(|c| (c, true)).collect(),
        }
    }
}

impl From<BTreeMap<String, bool>> for PatternSelection {
    fn from(raw: BTreeMap<String, bool>) -> Self {
        let mut flags = BTreeMap::new();
        for (name, enabled) in raw {
            match name.parse::<PiiCategory>() {
                Ok(category) => {
                    flags.insert(category, enabled);
                }
                Err(_) => log::debug!("[Catalog] ignoring unknown category {:?}", name),
            }
        }
        Self { flags }
    }
}

impl From<PatternSelection> for BTreeMap<String, bool> {
    fn from(selection: PatternSelection) -> Self {
        selection
            .flags
            .into_iter()
            .map(|(category, enabled)| (category.name().to_string(), enabled))
            .collect()
    }
}

/// Pattern catalog
///
/// Fixed, read-only registry of the built-in detection patterns.
#[derive(Debug, Clone)]
pub struct PatternCatalog {
    patterns: Vec<DetectionPattern>,
}

impl PatternCatalog {
    /// Compiles the built-in patterns. A failure here is fatal for start-up.
    pub fn builtin() -> Result<Self, CatalogError> {
        let patterns = PiiCategory::ALL
            .into_iter()
            .map(|category| {
                Regex::new(category.source())
                    .map(|matcher| DetectionPattern { category, matcher })
                    .map_err(|source| CatalogError::Compile {
                        name: category.name(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        log::debug!("[Catalog] compiled {} patterns", patterns.len());
        Ok(Self { patterns })
    }

    pub fn get(&self, category: PiiCategory) -> Option<&DetectionPattern> {
        self.patterns.iter().find(|p| p.category == category)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.patterns.iter().map(DetectionPattern::name).collect()
    }

    pub fn patterns(&self) -> &[DetectionPattern] {
        &self.patterns
    }

    /// Patterns enabled by `selection`, in catalog order.
    pub fn enabled(&self, selection: &PatternSelection) -> Vec<&DetectionPattern> {
        self.patterns
            .iter()
            .filter(|p| selection.is_enabled(p.category))
            .collect()
    }

    /// Byte ranges of every non-overlapping match of `category` in `text`.
    pub fn find_all(&self, category: PiiCategory, text: &str) -> Vec<(usize, usize)> {
        self.get(category)
            .map(|p| p.matcher.find_iter(text).map(|m| (m.start(), m.end())).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> PatternCatalog {
        PatternCatalog::builtin().unwrap()
    }

    fn hits(text: &str) -> Vec<PiiCategory> {
        let catalog = catalog();
        PiiCategory::ALL
            .into_iter()
            .flat_map(|c| std::iter::repeat(c).take(catalog.find_all(c, text).len()))
            .collect()
    }

    #[test]
    fn test_builtin_compiles_all_categories() {
        assert_eq!(
            catalog().names(),
            vec!["EMAIL", "PHONE_NUMBER", "SSN", "CREDIT_CARD"]
        );
    }

    #[test]
    fn test_single_instance_per_category() {
        assert_eq!(hits("Contact: jane.doe@example.com"), vec![PiiCategory::Email]);
        assert_eq!(hits("Call (555) 123-4567 today"), vec![PiiCategory::PhoneNumber]);
        assert_eq!(hits("SSN: 123-45-6789"), vec![PiiCategory::Ssn]);
        assert_eq!(hits("Card 4111-1111-1111-1111 on file"), vec![PiiCategory::CreditCard]);
    }

    #[test]
    fn test_placeholder_matches_nothing() {
        assert!(hits("[REDACTED]").is_empty());
        assert!(hits("Contact: [REDACTED] [REDACTED]").is_empty());
    }

    #[test]
    fn test_category_names_round_trip() {
        for category in PiiCategory::ALL {
            assert_eq!(category.name().parse::<PiiCategory>(), Ok(category));
        }
        assert!("IMAGES".parse::<PiiCategory>().is_err());
    }

    #[test]
    fn test_selection_ignores_unknown_keys() {
        let mut raw = BTreeMap::new();
        raw.insert("EMAIL".to_string(), true);
        raw.insert("SSN".to_string(), false);
        raw.insert("PASSPORT".to_string(), true);

        let selection = PatternSelection::from(raw);
        assert!(selection.is_enabled(PiiCategory::Email));
        assert!(!selection.is_enabled(PiiCategory::Ssn));
        assert!(!selection.is_enabled(PiiCategory::CreditCard));

        let enabled: Vec<_> = catalog().enabled(&selection).iter().map(|p| p.name()).collect();
        assert_eq!(enabled, vec!["EMAIL"]);
    }

    #[test]
    fn test_selection_deserializes_from_json() {
        let selection: PatternSelection =
            serde_json::from_str(r#"{"PHONE_NUMBER": true, "IMAGES": true}"#).unwrap();
        assert_eq!(selection.enabled().collect::<Vec<_>>(), vec![PiiCategory::PhoneNumber]);
    }

    #[test]
    fn test_default_selection_is_empty() {
        assert!(PatternSelection::default().is_empty());
        assert_eq!(PatternSelection::all().enabled().count(), 4);
    }
}

//! What a caller asks to have redacted.

use scrub_rules::PatternSelection;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;
use std::str::FromStr;

/// Flag that toggles image redaction in a flat flag map.
pub const IMAGES_FLAG: &str = "IMAGES";

/// Inclusive, 1-based page range as entered by a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRange {
    pub start: u32,
    pub end: u32,
}

impl PageRange {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }
}

impl fmt::Display for PageRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid page range {0:?}, expected START-END")]
pub struct ParsePageRangeError(pub String);

impl FromStr for PageRange {
    type Err = ParsePageRangeError;

    /// Parses `START-END`, or a single page number.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParsePageRangeError(s.to_string());
        let (start, end) = match s.split_once('-') {
            Some((start, end)) => (start.trim(), end.trim()),
            None => (s.trim(), s.trim()),
        };
        Ok(PageRange {
            start: start.parse().map_err(|_| err())?,
            end: end.parse().map_err(|_| err())?,
        })
    }
}

/// Parameters of one redaction call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RedactionRequest {
    pub pattern_selection: PatternSelection,
    pub images_enabled: bool,
    /// `None` means every page.
    pub page_range: Option<PageRange>,
    pub custom_phrases: Vec<String>,
    /// Case-insensitive matching of custom phrases.
    pub ignore_case: bool,
}

impl RedactionRequest {
    /// Builds a request from a flat `name -> enabled` map, where
    /// [`IMAGES_FLAG`] toggles image redaction and the other keys select
    /// pattern categories. Unknown keys are ignored.
    pub fn from_flags(
        flags: &BTreeMap<String, bool>,
        page_range: Option<PageRange>,
        custom_phrases: Vec<String>,
    ) -> Self {
        let images_enabled = flags.get(IMAGES_FLAG).copied().unwrap_or(false);
        Self {
            pattern_selection: PatternSelection::from(flags.clone()),
            images_enabled,
            page_range,
            custom_phrases,
            ignore_case: false,
        }
    }

    /// Phrases that can match anything; blank entries never do.
    pub fn phrases(&self) -> impl Iterator<Item = &str> {
        self.custom_phrases
            .iter()
            .map(String::as_str)
            .filter(|p| !p.trim().is_empty())
    }

    /// True when nothing at all is requested.
    pub fn is_empty(&self) -> bool {
        self.pattern_selection.is_empty() && !self.images_enabled && self.phrases().next().is_none()
    }
}

/// Turns an optional 1-based inclusive range into 0-based page indices,
/// clamped to the document. A range whose start lies past its end after
/// clamping selects no pages.
pub fn resolve_page_range(range: Option<PageRange>, page_count: usize) -> Range<usize> {
    let Some(range) = range else {
        return 0..page_count;
    };
    let start = range.start.max(1) as usize;
    let end = (range.end as usize).min(page_count);
    if start > end {
        0..0
    } else {
        start - 1..end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scrub_rules::PiiCategory;

    #[test]
    fn test_resolve_page_range() {
        assert_eq!(resolve_page_range(None, 5), 0..5);
        assert_eq!(resolve_page_range(Some(PageRange::new(2, 4)), 5), 1..4);
        assert_eq!(resolve_page_range(Some(PageRange::new(0, 99)), 5), 0..5);
        assert_eq!(resolve_page_range(Some(PageRange::new(3, 3)), 5), 2..3);
        assert!(resolve_page_range(Some(PageRange::new(2, 1)), 5).is_empty());
        assert!(resolve_page_range(Some(PageRange::new(7, 9)), 5).is_empty());
        assert!(resolve_page_range(None, 0).is_empty());
    }

    #[test]
    fn test_parse_page_range() {
        assert_eq!("2-5".parse::<PageRange>(), Ok(PageRange::new(2, 5)));
        assert_eq!(" 3 ".parse::<PageRange>(), Ok(PageRange::new(3, 3)));
        assert!("a-b".parse::<PageRange>().is_err());
        assert!("-3".parse::<PageRange>().is_err());
    }

    #[test]
    fn test_from_flags() {
        let flags: BTreeMap<String, bool> = [
            ("EMAIL".to_string(), true),
            ("SSN".to_string(), false),
            ("IMAGES".to_string(), true),
            ("PASSPORT".to_string(), true),
        ]
        .into_iter()
        .collect();
        let request = RedactionRequest::from_flags(&flags, None, vec!["Acme".into()]);
        assert!(request.images_enabled);
        assert!(request.pattern_selection.is_enabled(PiiCategory::Email));
        assert!(!request.pattern_selection.is_enabled(PiiCategory::Ssn));
        assert!(!request.pattern_selection.is_enabled(PiiCategory::PhoneNumber));
        assert_eq!(request.custom_phrases, vec!["Acme".to_string()]);
    }

    #[test]
    fn test_request_json_defaults() {
        let request: RedactionRequest = serde_json::from_str(
            r#"{"patternSelection": {"EMAIL": true}, "customPhrases": ["x", "  "], "pageRange": {"start": 1, "end": 2}}"#,
        )
        .unwrap();
        assert!(!request.images_enabled);
        assert!(!request.ignore_case);
        assert_eq!(request.page_range, Some(PageRange::new(1, 2)));
        assert_eq!(request.phrases().collect::<Vec<_>>(), vec!["x"]);
        assert!(!request.is_empty());
        assert!(RedactionRequest::default().is_empty());
    }
}

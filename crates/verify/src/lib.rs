//! Post-processing verification checks.
//!
//! Re-reads a redacted document and confirms that nothing the request
//! matched in the original can still be recovered from it.

use scrub_pdf::{LoadError, PdfDocument, PhraseMatcher, ScanError};
use scrub_rules::DetectionPattern;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::ops::Range;

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("cannot open document: {0}")]
    Load(#[from] LoadError),
    #[error("cannot read page text: {0}")]
    Scan(#[from] ScanError),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VerifyOptions {
    /// Search the extractable page text.
    pub text_search: bool,
    /// Search the raw, decompressed data of every stream.
    pub stream_search: bool,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            text_search: true,
            stream_search: true,
        }
    }
}

/// What was redacted: the matchers and pages of the original request.
pub struct VerifyScope<'a> {
    pub patterns: &'a [&'a DetectionPattern],
    pub phrases: &'a [PhraseMatcher],
    /// 0-based page indices that were redacted.
    pub pages: Range<usize>,
    pub images: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LeakLocation {
    Text,
    Stream,
}

/// A matched string that survived redaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Leak {
    /// 1-based page the string was matched on in the original
    pub page: u32,
    pub text: String,
    pub location: LeakLocation,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResult {
    pub ok: bool,
    /// Distinct strings the original matched inside the redacted pages.
    pub checked: usize,
    pub leaks: Vec<Leak>,
    /// Images still drawn on redacted pages when images were requested.
    pub images_remaining: usize,
    pub warnings: Vec<String>,
}

fn contains_bytes(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty() && haystack.windows(needle.len()).any(|w| w == needle)
}

/// Every `(page, text)` the scope matches in `doc`, page by page.
fn findings(doc: &PdfDocument, scope: &VerifyScope<'_>) -> Result<Vec<(u32, String)>, VerifyError> {
    let mut found = BTreeSet::new();
    for index in scope.pages.clone().take_while(|i| *i < doc.page_count()) {
        let text = doc.page(index)?.layout.text;
        let number = index as u32 + 1;
        for pattern in scope.patterns {
            for m in pattern.matcher.find_iter(&text) {
                found.insert((number, m.as_str().to_string()));
            }
        }
        for phrase in scope.phrases {
            for (start, end) in phrase.find_all(&text) {
                found.insert((number, text[start..end].to_string()));
            }
        }
    }
    Ok(found.into_iter().collect())
}

/// Checks `redacted` against what `scope` matches in `original`.
///
/// Strings that also occur on pages outside the redacted range are expected
/// to survive there and are not searched for in raw streams.
pub fn verify_output(
    original: &[u8],
    redacted: &[u8],
    scope: &VerifyScope<'_>,
    options: &VerifyOptions,
) -> Result<VerifyResult, VerifyError> {
    let before = PdfDocument::load(original)?;
    let after = PdfDocument::load(redacted)?;
    let mut result = VerifyResult::default();

    if before.page_count() != after.page_count() {
        result.warnings.push(format!(
            "page count changed from {} to {}",
            before.page_count(),
            after.page_count()
        ));
    }

    let found = findings(&before, scope)?;
    result.checked = found.iter().map(|(_, text)| text).collect::<BTreeSet<_>>().len();

    let untouched: Vec<String> = (0..before.page_count())
        .filter(|i| !scope.pages.contains(i))
        .map(|i| before.page(i).map(|page| page.layout.text))
        .collect::<Result<_, _>>()?;

    if options.text_search {
        for (page, text) in &found {
            let index = (*page - 1) as usize;
            if index >= after.page_count() {
                continue;
            }
            if after.page(index)?.layout.text.contains(text.as_str()) {
                result.leaks.push(Leak {
                    page: *page,
                    text: text.clone(),
                    location: LeakLocation::Text,
                });
            }
        }
    }

    if options.stream_search {
        let streams: Vec<Vec<u8>> = after.stream_data().collect();
        for (page, text) in &found {
            if untouched.iter().any(|t| t.contains(text.as_str())) {
                continue;
            }
            if streams.iter().any(|s| contains_bytes(s, text.as_bytes())) {
                result.leaks.push(Leak {
                    page: *page,
                    text: text.clone(),
                    location: LeakLocation::Stream,
                });
            }
        }
    }

    if scope.images {
        for index in scope.pages.clone().take_while(|i| *i < after.page_count()) {
            result.images_remaining += after.page(index)?.images.len();
        }
    }

    result.ok = result.leaks.is_empty() && result.images_remaining == 0;
    log::info!(
        "[Verify] checked {} strings, {} leaks, {} images remaining",
        result.checked,
        result.leaks.len(),
        result.images_remaining
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scrub_core::{PageRange, RedactionRequest, Redactor};
    use scrub_pdf::fixture::{FixturePage, PdfFixture};
    use scrub_rules::{PatternCatalog, PatternSelection};

    fn input() -> Vec<u8> {
        PdfFixture::new()
            .page(FixturePage::new().line("Contact: jane.doe@example.com"))
            .page(FixturePage::new().line("SSN: 123-45-6789").image(72.0, 500.0, 40.0, 40.0))
            .build()
    }

    #[test]
    fn test_redacted_output_passes() {
        let request = RedactionRequest {
            pattern_selection: PatternSelection::all(),
            images_enabled: true,
            ..Default::default()
        };
        let original = input();
        let redacted = Redactor::new().unwrap().process(&original, &request).unwrap();

        let catalog = PatternCatalog::builtin().unwrap();
        let patterns = catalog.enabled(&request.pattern_selection);
        let scope = VerifyScope {
            patterns: &patterns,
            phrases: &[],
            pages: 0..2,
            images: true,
        };
        let result = verify_output(&original, &redacted, &scope, &VerifyOptions::default()).unwrap();
        assert!(result.ok, "{:?}", result.leaks);
        assert_eq!(result.checked, 2);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_unredacted_output_leaks() {
        let original = input();
        let catalog = PatternCatalog::builtin().unwrap();
        let patterns = catalog.enabled(&PatternSelection::all());
        let phrases = PhraseMatcher::compile(&["Contact"], false);
        let scope = VerifyScope {
            patterns: &patterns,
            phrases: &phrases,
            pages: 0..2,
            images: true,
        };
        let result = verify_output(&original, &original, &scope, &VerifyOptions::default()).unwrap();
        assert!(!result.ok);
        assert_eq!(result.images_remaining, 1);
        assert!(result
            .leaks
            .iter()
            .any(|l| l.page == 2 && l.text == "123-45-6789" && l.location == LeakLocation::Text));
        assert!(result.leaks.iter().any(|l| l.location == LeakLocation::Stream));
    }

    #[test]
    fn test_pages_outside_range_are_ignored() {
        let request = RedactionRequest {
            pattern_selection: PatternSelection::all(),
            page_range: Some(PageRange::new(1, 1)),
            ..Default::default()
        };
        let original = input();
        let redacted = Redactor::new().unwrap().process(&original, &request).unwrap();

        let catalog = PatternCatalog::builtin().unwrap();
        let patterns = catalog.enabled(&request.pattern_selection);
        let scope = VerifyScope {
            patterns: &patterns,
            phrases: &[],
            pages: 0..1,
            images: false,
        };
        let result = verify_output(&original, &redacted, &scope, &VerifyOptions::default()).unwrap();
        assert!(result.ok);
        assert_eq!(result.checked, 1);
    }
}

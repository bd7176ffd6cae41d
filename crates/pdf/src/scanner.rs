//! Page scanning: turns a page's text layout and image placements into
//! regions to redact.

use crate::document::PageView;
use crate::geometry::Quad;
use regex::{Regex, RegexBuilder};
use scrub_rules::{DetectionPattern, PiiCategory};
use serde::{Deserialize, Serialize};

/// What caused a region to be marked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RegionSource {
    Pattern(PiiCategory),
    Custom,
    Image,
}

/// An area of one page, in default user space, scheduled for redaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionMatch {
    /// 1-based page number
    pub page: u32,
    pub quad: Quad,
    pub source: RegionSource,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ScanOptions {
    pub include_images: bool,
}

/// A user supplied phrase, prepared for searching page text.
#[derive(Debug, Clone)]
pub enum PhraseMatcher {
    Literal(String),
    Folded(Regex),
}

impl PhraseMatcher {
    /// Returns `None` for blank phrases, which never match anything.
    pub fn new(phrase: &str, ignore_case: bool) -> Option<Self> {
        if phrase.trim().is_empty() {
            return None;
        }
        if !ignore_case {
            return Some(PhraseMatcher::Literal(phrase.to_string()));
        }
        match RegexBuilder::new(&regex::escape(phrase))
            .case_insensitive(true)
            .build()
        {
            Ok(re) => Some(PhraseMatcher::Folded(re)),
            Err(e) => {
                log::warn!("[Scanner] phrase too large for case folding, matching literally: {}", e);
                Some(PhraseMatcher::Literal(phrase.to_string()))
            }
        }
    }

    /// Prepares every non-blank phrase.
    pub fn compile<S: AsRef<str>>(phrases: &[S], ignore_case: bool) -> Vec<Self> {
        phrases
            .iter()
            .filter_map(|p| Self::new(p.as_ref(), ignore_case))
            .collect()
    }

    /// Byte ranges of all non-overlapping occurrences in `text`.
    pub fn find_all(&self, text: &str) -> Vec<(usize, usize)> {
        match self {
            PhraseMatcher::Literal(phrase) => text
                .match_indices(phrase.as_str())
                .map(|(start, m)| (start, start + m.len()))
                .collect(),
            PhraseMatcher::Folded(re) => re.find_iter(text).map(|m| (m.start(), m.end())).collect(),
        }
    }
}

/// Finds every region on `page` matched by the enabled patterns, the custom
/// phrases and, when requested, the page's images.
///
/// Matches are not merged: a match that wraps onto a second line yields a
/// region per line, and overlapping matches from different sources are all
/// reported.
pub fn scan(
    page: &PageView,
    patterns: &[&DetectionPattern],
    phrases: &[PhraseMatcher],
    options: &ScanOptions,
) -> Vec<RegionMatch> {
    let mut regions = Vec::new();
    let layout = &page.layout;

    if !layout.is_empty() {
        for pattern in patterns {
            for m in pattern.matcher.find_iter(&layout.text) {
                for quad in layout.quads_for(m.start(), m.end()) {
                    regions.push(RegionMatch {
                        page: page.number,
                        quad,
                        source: RegionSource::Pattern(pattern.category),
                    });
                }
            }
        }

        for phrase in phrases {
            for (start, end) in phrase.find_all(&layout.text) {
                for quad in layout.quads_for(start, end) {
                    regions.push(RegionMatch {
                        page: page.number,
                        quad,
                        source: RegionSource::Custom,
                    });
                }
            }
        }
    }

    if options.include_images {
        regions.extend(page.images.iter().map(|image| RegionMatch {
            page: page.number,
            quad: image.quad,
            source: RegionSource::Image,
        }));
    }

    log::debug!(
        "[Scanner] page {}: {} glyphs, {} images, {} regions",
        page.number,
        layout.glyphs.len(),
        page.images.len(),
        regions.len()
    );
    regions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::PdfDocument;
    use crate::fixture::{FixturePage, PdfFixture};
    use scrub_rules::{PatternCatalog, PatternSelection};

    fn first_page(page: FixturePage) -> PageView {
        let bytes = PdfFixture::new().page(page).build();
        PdfDocument::load(&bytes).unwrap().page(0).unwrap()
    }

    #[test]
    fn test_email_yields_one_region() {
        let catalog = PatternCatalog::builtin().unwrap();
        let selection = PatternSelection::none().with(PiiCategory::Email, true);
        let page = first_page(FixturePage::new().line("Contact: jane.doe@example.com"));

        let regions = scan(&page, &catalog.enabled(&selection), &[], &ScanOptions::default());
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].source, RegionSource::Pattern(PiiCategory::Email));
        assert_eq!(regions[0].page, 1);

        // the region starts after "Contact: " and ends with the line
        let line = &page.layout.glyphs;
        let rect = regions[0].quad.rect();
        assert!((rect.x0 - line[9].quad.rect().x0).abs() < 1e-3);
        assert!((rect.x1 - line.last().unwrap().quad.rect().x1).abs() < 1e-3);
    }

    #[test]
    fn test_each_category_matches_only_itself() {
        let catalog = PatternCatalog::builtin().unwrap();
        let cases = [
            (PiiCategory::Email, "Contact: jane.doe@example.com"),
            (PiiCategory::PhoneNumber, "Call (555) 123-4567 today"),
            (PiiCategory::Ssn, "SSN: 123-45-6789"),
            (PiiCategory::CreditCard, "Card 4111-1111-1111-1111 on file"),
        ];
        for (category, text) in cases {
            let page = first_page(FixturePage::new().line(text));
            let regions = scan(
                &page,
                &catalog.enabled(&PatternSelection::all()),
                &[],
                &ScanOptions::default(),
            );
            assert_eq!(regions.len(), 1, "{}", text);
            assert_eq!(regions[0].source, RegionSource::Pattern(category));
        }
    }

    #[test]
    fn test_phrase_occurrences() {
        let page = first_page(
            FixturePage::new()
                .line("Project Phoenix kicks off.")
                .line("Budget for Project Phoenix is set."),
        );
        let phrases = PhraseMatcher::compile(&["Project Phoenix", "   "], false);
        assert_eq!(phrases.len(), 1);

        let regions = scan(&page, &[], &phrases, &ScanOptions::default());
        assert_eq!(regions.len(), 2);
        assert!(regions.iter().all(|r| r.source == RegionSource::Custom));
        assert!(regions[0].quad.rect().y0 > regions[1].quad.rect().y0);
    }

    #[test]
    fn test_phrase_case_folding() {
        let page = first_page(FixturePage::new().line("project PHOENIX"));
        let exact = PhraseMatcher::compile(&["Project Phoenix"], false);
        let folded = PhraseMatcher::compile(&["Project Phoenix"], true);
        assert!(scan(&page, &[], &exact, &ScanOptions::default()).is_empty());
        assert_eq!(scan(&page, &[], &folded, &ScanOptions::default()).len(), 1);
    }

    #[test]
    fn test_images_only_when_requested() {
        let page = first_page(FixturePage::new().line("caption").image(72.0, 400.0, 200.0, 150.0));
        assert!(scan(&page, &[], &[], &ScanOptions::default()).is_empty());

        let regions = scan(&page, &[], &[], &ScanOptions { include_images: true });
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].source, RegionSource::Image);
        let rect = regions[0].quad.rect();
        assert_eq!((rect.x0, rect.y0, rect.x1, rect.y1), (72.0, 400.0, 272.0, 550.0));
    }

    #[test]
    fn test_no_text_no_matches() {
        let catalog = PatternCatalog::builtin().unwrap();
        let page = first_page(FixturePage::new());
        let phrases = PhraseMatcher::compile(&["anything"], false);
        let regions = scan(
            &page,
            &catalog.enabled(&PatternSelection::all()),
            &phrases,
            &ScanOptions { include_images: true },
        );
        assert!(regions.is_empty());
    }
}

//! Document pipeline: load, scan and redact each page in range, save.

use crate::request::{resolve_page_range, RedactionRequest};
use crate::{RedactError, Result};
use scrub_pdf::{scan, ApplyReport, PdfDocument, PhraseMatcher, RegionMatch, RegionSource, ScanOptions};
use scrub_rules::{CatalogError, PatternCatalog, RedactionStyle};
use serde::Serialize;
use std::collections::BTreeMap;

/// Counts for one examined page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageReport {
    /// 1-based page number
    pub page: u32,
    pub regions: usize,
    /// Regions per source: category names, `CUSTOM` or `IMAGE`.
    pub by_source: BTreeMap<String, usize>,
    pub glyphs_removed: usize,
    pub images_removed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedactionReport {
    /// One entry per examined page, in page order.
    pub pages: Vec<PageReport>,
}

impl RedactionReport {
    pub fn pages_examined(&self) -> usize {
        self.pages.len()
    }

    pub fn total_regions(&self) -> usize {
        self.pages.iter().map(|p| p.regions).sum()
    }

    /// Regions attributed to `source` over all pages.
    pub fn count(&self, source: RegionSource) -> usize {
        let label = source_label(source);
        self.pages
            .iter()
            .filter_map(|p| p.by_source.get(&label))
            .sum()
    }

    fn record(&mut self, page: u32, regions: &[RegionMatch], applied: ApplyReport) {
        let mut by_source = BTreeMap::new();
        for region in regions {
            *by_source.entry(source_label(region.source)).or_insert(0) += 1;
        }
        self.pages.push(PageReport {
            page,
            regions: regions.len(),
            by_source,
            glyphs_removed: applied.glyphs_removed,
            images_removed: applied.images_removed,
        });
    }
}

fn source_label(source: RegionSource) -> String {
    match source {
        RegionSource::Pattern(category) => category.name().to_string(),
        RegionSource::Custom => "CUSTOM".to_string(),
        RegionSource::Image => "IMAGE".to_string(),
    }
}

/// Redacted bytes together with what was done to produce them.
#[derive(Debug, Clone)]
pub struct RedactionOutcome {
    pub bytes: Vec<u8>,
    pub report: RedactionReport,
}

/// Redaction entry point. Shares its catalog and style read-only, so one
/// instance can serve any number of documents, also concurrently.
#[derive(Debug, Clone)]
pub struct Redactor {
    catalog: PatternCatalog,
    style: RedactionStyle,
}

impl Redactor {
    /// Redactor over the built-in patterns with the default style.
    pub fn new() -> std::result::Result<Self, CatalogError> {
        Ok(Self::with_catalog(PatternCatalog::builtin()?, RedactionStyle::default()))
    }

    pub fn with_catalog(catalog: PatternCatalog, style: RedactionStyle) -> Self {
        Self { catalog, style }
    }

    pub fn with_style(mut self, style: RedactionStyle) -> Self {
        self.style = style;
        self
    }

    pub fn catalog(&self) -> &PatternCatalog {
        &self.catalog
    }

    pub fn style(&self) -> &RedactionStyle {
        &self.style
    }

    /// Redacts `bytes` according to `request` and returns the new document.
    pub fn process(&self, bytes: &[u8], request: &RedactionRequest) -> Result<Vec<u8>> {
        self.process_with_report(bytes, request).map(|outcome| outcome.bytes)
    }

    /// Like [`Redactor::process`], also reporting what was found per page.
    ///
    /// Pages are handled one at a time in increasing order; every region of a
    /// page is committed in a single pass before the next page is read. Any
    /// failure aborts the whole document: no partial output is returned.
    pub fn process_with_report(&self, bytes: &[u8], request: &RedactionRequest) -> Result<RedactionOutcome> {
        let mut doc = PdfDocument::load(bytes)?;
        let pages = resolve_page_range(request.page_range, doc.page_count());

        let patterns = self.catalog.enabled(&request.pattern_selection);
        let phrases = PhraseMatcher::compile(&request.custom_phrases, request.ignore_case);
        let options = ScanOptions {
            include_images: request.images_enabled,
        };
        log::debug!(
            "[Pipeline] {} pages, range {:?}, {} patterns, {} phrases, images {}",
            doc.page_count(),
            pages,
            patterns.len(),
            phrases.len(),
            options.include_images
        );

        let mut report = RedactionReport::default();
        for index in pages {
            let number = index as u32 + 1;
            let page = doc
                .page(index)
                .map_err(|source| RedactError::Scan { page: number, source })?;
            let regions = scan(&page, &patterns, &phrases, &options);
            let applied = doc
                .apply(&page, &regions, &self.style)
                .map_err(|source| RedactError::Apply { page: number, source })?;
            report.record(number, &regions, applied);
        }

        let bytes = doc.save()?;
        log::info!(
            "[Pipeline] examined {} pages, redacted {} regions",
            report.pages_examined(),
            report.total_regions()
        );
        Ok(RedactionOutcome { bytes, report })
    }
}

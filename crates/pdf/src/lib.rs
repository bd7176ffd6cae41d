//! PDF scanning and redaction.
//!
//! [`PdfDocument`] owns a parsed document for the duration of one redaction
//! call. Pages are read into [`PageView`]s, [`scan`] turns a view into
//! [`RegionMatch`]es and [`PdfDocument::apply`] removes whatever lies under
//! them before stamping the placeholder.

mod applicator;
mod cmap;
mod document;
mod font;
pub mod geometry;
mod layout;
mod scanner;
mod utils;

#[cfg(any(test, feature = "fixtures"))]
pub mod fixture;

pub use applicator::ApplyReport;
pub use document::{PageView, PdfDocument};
pub use geometry::{Point, Quad, Rect};
pub use layout::{FormXObject, Glyph, ImagePlacement, StreamRef, TextLayout};
pub use scanner::{scan, PhraseMatcher, RegionMatch, RegionSource, ScanOptions};

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("not a readable PDF: {0}")]
    Parse(#[from] lopdf::Error),
    #[error("document is encrypted")]
    Encrypted,
}

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("page index {0} is out of range")]
    MissingPage(usize),
    #[error("malformed page object: {0}")]
    Malformed(String),
    #[error("content stream could not be decoded: {0}")]
    Content(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    #[error("region geometry is not finite")]
    InvalidRegion,
    #[error("malformed page object: {0}")]
    Malformed(String),
    #[error("content stream could not be encoded: {0}")]
    Content(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SerializeError {
    #[error("failed to write document: {0}")]
    Io(#[from] std::io::Error),
}

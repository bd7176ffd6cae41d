//! Core orchestration for redaction tasks.
//!
//! A [`Redactor`] holds the compiled pattern catalog and the redaction style
//! and turns PDF bytes plus a [`RedactionRequest`] into redacted PDF bytes.

pub mod batch;
pub mod pipeline;
pub mod request;

pub use batch::{BatchOutcome, InputFile};
pub use pipeline::{PageReport, RedactionOutcome, RedactionReport, Redactor};
pub use request::{resolve_page_range, PageRange, ParsePageRangeError, RedactionRequest};

pub use scrub_pdf::{ApplyError, LoadError, RegionMatch, RegionSource, ScanError, SerializeError};
pub use scrub_rules::{CatalogError, PatternCatalog, PatternSelection, PiiCategory, RedactionStyle, Rgb};

use serde::{Deserialize, Serialize};
use std::fmt;

pub type Result<T> = std::result::Result<T, RedactError>;

#[derive(Debug, thiserror::Error)]
pub enum RedactError {
    #[error("cannot open document: {0}")]
    Load(#[from] LoadError),
    #[error("page {page}: {source}")]
    Scan {
        page: u32,
        #[source]
        source: ScanError,
    },
    #[error("page {page}: {source}")]
    Apply {
        page: u32,
        #[source]
        source: ApplyError,
    },
    #[error("cannot write document: {0}")]
    Serialize(#[from] SerializeError),
}

/// Coarse failure class, for callers that only display or count errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    Load,
    Scan,
    Apply,
    Serialize,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Load => "load",
            ErrorKind::Scan => "scan",
            ErrorKind::Apply => "apply",
            ErrorKind::Serialize => "serialize",
        };
        f.write_str(name)
    }
}

impl RedactError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RedactError::Load(_) => ErrorKind::Load,
            RedactError::Scan { .. } => ErrorKind::Scan,
            RedactError::Apply { .. } => ErrorKind::Apply,
            RedactError::Serialize(_) => ErrorKind::Serialize,
        }
    }

    /// The 1-based page the failure happened on, when it is page specific.
    pub fn page(&self) -> Option<u32> {
        match self {
            RedactError::Scan { page, .. } | RedactError::Apply { page, .. } => Some(*page),
            _ => None,
        }
    }
}

//! Bulk mode: many documents, one request.

use crate::pipeline::{RedactionOutcome, Redactor};
use crate::request::RedactionRequest;
use crate::RedactError;
use rayon::prelude::*;

/// A named document to redact.
#[derive(Debug, Clone)]
pub struct InputFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl InputFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }
}

/// Result for one file of a batch.
#[derive(Debug)]
pub struct BatchOutcome {
    pub name: String,
    pub result: Result<RedactionOutcome, RedactError>,
}

impl BatchOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

impl Redactor {
    /// Redacts every file with the same request.
    ///
    /// Files run in parallel on a rayon pool of `workers` threads (all cores
    /// when `None`). Each file succeeds or fails on its own and outcomes come
    /// back in input order.
    pub fn process_batch(
        &self,
        files: &[InputFile],
        request: &RedactionRequest,
        workers: Option<usize>,
    ) -> Vec<BatchOutcome> {
        self.process_batch_with_progress(files, request, workers, |_| {})
    }

    /// [`Redactor::process_batch`] calling `progress` as each file finishes,
    /// in completion order.
    pub fn process_batch_with_progress<F>(
        &self,
        files: &[InputFile],
        request: &RedactionRequest,
        workers: Option<usize>,
        progress: F,
    ) -> Vec<BatchOutcome>
    where
        F: Fn(&BatchOutcome) + Sync,
    {
        let run = || {
            files
                .par_iter()
                .map(|file| {
                    let result = self.process_with_report(&file.bytes, request);
                    if let Err(e) = &result {
                        log::warn!("[Batch] {} failed: {}", file.name, e);
                    }
                    let outcome = BatchOutcome {
                        name: file.name.clone(),
                        result,
                    };
                    progress(&outcome);
                    outcome
                })
                .collect::<Vec<_>>()
        };

        let outcomes = match workers {
            Some(n) => match rayon::ThreadPoolBuilder::new().num_threads(n.max(1)).build() {
                Ok(pool) => pool.install(run),
                Err(e) => {
                    log::warn!("[Batch] cannot build a pool of {} workers, using the global pool: {}", n, e);
                    run()
                }
            },
            None => run(),
        };

        let failed = outcomes.iter().filter(|o| !o.is_ok()).count();
        log::info!("[Batch] processed {} files, {} failed", outcomes.len(), failed);
        outcomes
    }
}

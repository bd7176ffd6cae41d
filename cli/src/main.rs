mod cli;
mod config;
mod report;

use anyhow::{Context, Result};
use clap::Parser;
use config::{load_config, AppConfig, Settings};
use report::{Row, Status};
use scrub_core::{resolve_page_range, InputFile, RedactionOutcome, Redactor};
use scrub_pdf::PhraseMatcher;
use scrub_verify::{verify_output, VerifyOptions, VerifyScope};
use std::fs;
use std::path::Path;
use std::process::ExitCode;

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Checks a redacted file against its original; `None` when it is clean.
fn leaks(redactor: &Redactor, settings: &Settings, original: &[u8], outcome: &RedactionOutcome) -> Result<Option<String>> {
    let request = &settings.request;
    let patterns = redactor.catalog().enabled(&request.pattern_selection);
    let phrases = PhraseMatcher::compile(&request.custom_phrases, request.ignore_case);
    let scope = VerifyScope {
        patterns: &patterns,
        phrases: &phrases,
        // clamped to the document by the verifier
        pages: resolve_page_range(request.page_range, usize::MAX),
        images: request.images_enabled,
    };
    let result = verify_output(original, &outcome.bytes, &scope, &VerifyOptions::default())?;
    for warning in &result.warnings {
        tracing::warn!("{}", warning);
    }
    if result.ok {
        return Ok(None);
    }
    let mut pages: Vec<u32> = result.leaks.iter().map(|l| l.page).collect();
    pages.sort_unstable();
    pages.dedup();
    Ok(Some(format!(
        "{} strings and {} images recoverable (pages {:?})",
        result.leaks.len(),
        result.images_remaining,
        pages
    )))
}

fn run(cli: cli::Cli) -> Result<bool> {
    let config = match &cli.config {
        Some(path) => load_config(path).with_context(|| format!("reading config {}", path.display()))?,
        None => AppConfig::default(),
    };
    let settings = Settings::resolve(&cli, config)?;
    let redactor = Redactor::new()?.with_style(settings.style.clone());

    if settings.request.is_empty() {
        tracing::warn!("nothing selected for redaction; outputs will only be re-encoded");
    }
    if let Some(dir) = &settings.output_dir {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }

    // Unreadable inputs get their row now; the rest go to the batch.
    let mut rows: Vec<Option<Row>> = Vec::with_capacity(cli.files.len());
    let mut inputs = Vec::new();
    for path in &cli.files {
        let name = path.display().to_string();
        match fs::read(path) {
            Ok(bytes) => {
                rows.push(None);
                inputs.push(InputFile::new(name, bytes));
            }
            Err(e) => rows.push(Some(Row::failed(name, e))),
        }
    }

    let outcomes = redactor.process_batch_with_progress(&inputs, &settings.request, settings.jobs, |outcome| {
        tracing::info!(file = %outcome.name, ok = outcome.is_ok(), "finished");
    });

    let mut finished = inputs.iter().zip(outcomes);
    for (slot, path) in rows.iter_mut().zip(&cli.files) {
        if slot.is_some() {
            continue;
        }
        let Some((input, outcome)) = finished.next() else {
            break;
        };
        let row = match outcome.result {
            Ok(redacted) => write_output(&redactor, &settings, path, &input.bytes, &redacted),
            Err(e) => Row::failed(outcome.name, e),
        };
        *slot = Some(row);
    }

    let rows: Vec<Row> = rows.into_iter().flatten().collect();
    print!("{}", report::render(&rows));
    Ok(rows.iter().all(Row::is_ok))
}

fn write_output(redactor: &Redactor, settings: &Settings, input: &Path, original: &[u8], redacted: &RedactionOutcome) -> Row {
    let name = input.display().to_string();
    let target = settings.output_path(input);

    let verdict = if settings.verify {
        match leaks(redactor, settings, original, redacted) {
            Ok(verdict) => verdict,
            Err(e) => return Row::failed(name, format!("verification failed: {:#}", e)),
        }
    } else {
        None
    };

    let regions = Some(redacted.report.total_regions());
    if let Some(problem) = verdict {
        tracing::warn!(file = %name, "recoverable content left, output not written");
        return Row {
            file: name,
            status: Status::Leaked,
            regions,
            detail: format!("not written: {}", problem),
        };
    }

    if let Err(e) = fs::write(&target, &redacted.bytes) {
        return Row::failed(name, format!("cannot write {}: {}", target.display(), e));
    }
    Row {
        file: name,
        status: Status::Ok,
        regions,
        detail: target.display().to_string(),
    }
}

fn main() -> ExitCode {
    let cli = cli::Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_SUFFIX;
    use scrub_core::{PatternSelection, PiiCategory, RedactionRequest, RedactionStyle};
    use scrub_pdf::fixture::{FixturePage, PdfFixture};

    fn verifying_settings(dir: &Path) -> Settings {
        Settings {
            request: RedactionRequest {
                pattern_selection: PatternSelection::none().with(PiiCategory::Email, true),
                ..Default::default()
            },
            style: RedactionStyle::default(),
            output_dir: Some(dir.to_path_buf()),
            suffix: DEFAULT_SUFFIX.to_string(),
            jobs: None,
            verify: true,
        }
    }

    #[test]
    fn test_leaking_output_is_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let settings = verifying_settings(dir.path());
        let redactor = Redactor::new().unwrap();
        let input = Path::new("in/report.pdf");
        let original = PdfFixture::new()
            .page(FixturePage::new().line("mail jane@example.com"))
            .build();

        // re-encoded without redaction, so the address is still there
        let unredacted = redactor
            .process_with_report(&original, &RedactionRequest::default())
            .unwrap();
        let row = write_output(&redactor, &settings, input, &original, &unredacted);
        assert_eq!(row.status, Status::Leaked);
        assert!(row.detail.starts_with("not written"));
        assert!(!settings.output_path(input).exists());

        let redacted = redactor.process_with_report(&original, &settings.request).unwrap();
        let row = write_output(&redactor, &settings, input, &original, &redacted);
        assert_eq!(row.status, Status::Ok);
        assert!(settings.output_path(input).exists());
    }
}

use crate::cli::Cli;
use scrub_core::{PatternSelection, PiiCategory, RedactionRequest, RedactionStyle};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_SUFFIX: &str = "_redacted";

/// Settings read from `--config`. Every field is optional; flags win.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct AppConfig {
    // ============ What to redact ============
    /// Category names; all when absent
    pub patterns: Option<Vec<String>>,
    pub images: Option<bool>,
    pub phrases: Vec<String>,
    pub ignore_case: Option<bool>,

    // ============ How it looks ============
    pub style: Option<RedactionStyle>,

    // ============ Output ============
    pub output_dir: Option<PathBuf>,
    pub suffix: Option<String>,
    pub jobs: Option<usize>,
    pub verify: Option<bool>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown pattern category {0:?}")]
    UnknownCategory(String),
}

pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

/// Everything a run needs, after merging the config file and the flags.
#[derive(Debug, Clone)]
pub struct Settings {
    pub request: RedactionRequest,
    pub style: RedactionStyle,
    pub output_dir: Option<PathBuf>,
    pub suffix: String,
    pub jobs: Option<usize>,
    pub verify: bool,
}

fn parse_categories(names: &[String]) -> Result<PatternSelection, ConfigError> {
    names
        .iter()
        .map(|name| name.trim())
        .filter(|name| !name.is_empty())
        .map(|name| {
            name.to_ascii_uppercase()
                .parse::<PiiCategory>()
                .map_err(|_| ConfigError::UnknownCategory(name.to_string()))
        })
        .collect()
}

/// Trimmed phrases without blanks, in order of appearance.
pub fn clean_phrases<I, S>(phrases: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    phrases
        .into_iter()
        .map(|p| p.as_ref().trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

impl Settings {
    pub fn resolve(cli: &Cli, config: AppConfig) -> Result<Self, ConfigError> {
        let pattern_selection = if cli.no_patterns {
            PatternSelection::none()
        } else if let Some(names) = cli.patterns.as_ref().or(config.patterns.as_ref()) {
            parse_categories(names)?
        } else {
            PatternSelection::all()
        };

        let mut phrases = config.phrases;
        phrases.extend(cli.phrases.iter().cloned());
        if let Some(path) = &cli.phrases_file {
            let raw = fs::read_to_string(path)?;
            phrases.extend(raw.lines().map(str::to_string));
        }

        let request = RedactionRequest {
            pattern_selection,
            images_enabled: cli.images || config.images.unwrap_or(false),
            page_range: cli.pages,
            custom_phrases: clean_phrases(phrases),
            ignore_case: cli.ignore_case || config.ignore_case.unwrap_or(false),
        };

        Ok(Settings {
            request,
            style: config.style.unwrap_or_default(),
            output_dir: cli.output_dir.clone().or(config.output_dir),
            suffix: cli
                .suffix
                .clone()
                .or(config.suffix)
                .unwrap_or_else(|| DEFAULT_SUFFIX.to_string()),
            jobs: cli.jobs.or(config.jobs),
            verify: cli.verify || config.verify.unwrap_or(false),
        })
    }

    /// `<dir>/<stem><suffix>.pdf`, where `dir` defaults to the input's own.
    pub fn output_path(&self, input: &Path) -> PathBuf {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        let dir = match &self.output_dir {
            Some(dir) => dir.clone(),
            None => input.parent().map(Path::to_path_buf).unwrap_or_default(),
        };
        dir.join(format!("{}{}.pdf", stem, self.suffix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("scrub").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::resolve(&cli(&["in/a.pdf"]), AppConfig::default()).unwrap();
        assert_eq!(settings.request.pattern_selection, PatternSelection::all());
        assert!(!settings.request.images_enabled);
        assert!(settings.request.custom_phrases.is_empty());
        assert_eq!(settings.suffix, "_redacted");
        assert_eq!(settings.output_path(Path::new("in/a.pdf")), PathBuf::from("in/a_redacted.pdf"));
    }

    #[test]
    fn test_flags_override_config() {
        let config: AppConfig = serde_json::from_str(
            r#"{"patterns": ["SSN"], "images": true, "phrases": ["  Acme  ", ""], "suffix": "-clean", "outputDir": "out"}"#,
        )
        .unwrap();
        let settings = Settings::resolve(
            &cli(&["a.pdf", "--patterns", "email", "--phrase", "Phoenix", "--suffix", "_x"]),
            config,
        )
        .unwrap();
        let selection = &settings.request.pattern_selection;
        assert!(selection.is_enabled(PiiCategory::Email));
        assert!(!selection.is_enabled(PiiCategory::Ssn));
        assert!(settings.request.images_enabled);
        assert_eq!(settings.request.custom_phrases, vec!["Acme", "Phoenix"]);
        assert_eq!(settings.output_path(Path::new("a.pdf")), PathBuf::from("out/a_x.pdf"));
    }

    #[test]
    fn test_no_patterns_and_unknown_category() {
        let settings = Settings::resolve(&cli(&["a.pdf", "--no-patterns"]), AppConfig::default()).unwrap();
        assert!(settings.request.pattern_selection.is_empty());

        let err = Settings::resolve(&cli(&["a.pdf", "--patterns", "PASSPORT"]), AppConfig::default()).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownCategory(name) if name == "PASSPORT"));
    }

    #[test]
    fn test_phrases_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "Project Phoenix\n\n   \n  Acme Corp  ").unwrap();
        let path = file.path().to_string_lossy().into_owned();
        let settings = Settings::resolve(&cli(&["a.pdf", "--phrases-file", &path]), AppConfig::default()).unwrap();
        assert_eq!(settings.request.custom_phrases, vec!["Project Phoenix", "Acme Corp"]);
    }

    #[test]
    fn test_load_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"ignoreCase": true, "style": {{"placeholderText": "XXX"}}}}"#).unwrap();
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.ignore_case, Some(true));
        assert_eq!(config.style.map(|s| s.placeholder_text), Some("XXX".to_string()));
    }
}

use clap::Parser;
use scrub_core::PageRange;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "scrub")]
#[command(about = "Redact PII, custom phrases and images from PDF files", long_about = None)]
#[command(version)]
pub struct Cli {
    /// PDF files to redact
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Directory for redacted files (default: next to each input)
    #[arg(long, short = 'o')]
    pub output_dir: Option<PathBuf>,

    /// Appended to the input file stem to name the output
    #[arg(long)]
    pub suffix: Option<String>,

    /// Comma separated categories: EMAIL, PHONE_NUMBER, SSN, CREDIT_CARD (default: all)
    #[arg(long, value_delimiter = ',', conflicts_with = "no_patterns")]
    pub patterns: Option<Vec<String>>,

    /// Disable every built-in pattern
    #[arg(long)]
    pub no_patterns: bool,

    /// Remove every image drawn on the selected pages
    #[arg(long)]
    pub images: bool,

    /// Only redact pages START-END (1-based, inclusive)
    #[arg(long, value_name = "START-END")]
    pub pages: Option<PageRange>,

    /// Exact text to redact; may be repeated
    #[arg(long = "phrase", value_name = "TEXT")]
    pub phrases: Vec<String>,

    /// File with one phrase per line
    #[arg(long, value_name = "FILE")]
    pub phrases_file: Option<PathBuf>,

    /// Match custom phrases regardless of case
    #[arg(long)]
    pub ignore_case: bool,

    /// Number of files processed in parallel (default: all cores)
    #[arg(long, short = 'j')]
    pub jobs: Option<usize>,

    /// Re-read each output and check that nothing matched survives
    #[arg(long)]
    pub verify: bool,

    /// JSON configuration file; command line flags take precedence
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// More log output (-v info, -vv debug)
    #[arg(long, short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags() {
        let cli = Cli::try_parse_from([
            "scrub",
            "a.pdf",
            "b.pdf",
            "--patterns",
            "EMAIL,SSN",
            "--pages",
            "2-4",
            "--phrase",
            "Project Phoenix",
            "--phrase",
            "Acme",
            "-vv",
        ])
        .unwrap();
        assert_eq!(cli.files.len(), 2);
        assert_eq!(cli.patterns, Some(vec!["EMAIL".to_string(), "SSN".to_string()]));
        assert_eq!(cli.pages, Some(PageRange::new(2, 4)));
        assert_eq!(cli.phrases, vec!["Project Phoenix", "Acme"]);
        assert_eq!(cli.verbose, 2);
        assert!(!cli.images);
    }

    #[test]
    fn test_patterns_conflict_with_no_patterns() {
        assert!(Cli::try_parse_from(["scrub", "a.pdf", "--patterns", "EMAIL", "--no-patterns"]).is_err());
        assert!(Cli::try_parse_from(["scrub"]).is_err());
    }
}

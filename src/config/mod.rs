pub mod cli;
pub mod toml_config;

use crate::core::analyst::TextScope;
use crate::domain::ports::ConfigProvider;
use serde::{Deserialize, Serialize};

#[cfg(feature = "cli")]
use clap::{Args, Parser, Subcommand};
#[cfg(feature = "cli")]
use std::path::PathBuf;

#[cfg(feature = "cli")]
#[derive(Debug, Parser)]
#[command(name = "page-analyst", version)]
#[command(about = "Fetches web pages and scores them against a weighted term dictionary")]
pub struct Cli {
    /// TOML settings file (defaults to ./page-analyst.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Term dictionary, overriding terms.path
    #[arg(long, global = true)]
    pub terms: Option<PathBuf>,

    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Emit logs as JSON lines")]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[cfg(feature = "cli")]
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Analyze one URL, text or local file and print the result as JSON
    Analyze(AnalyzeArgs),
    /// Analyze every URL of a list file into a zipped report
    Batch(BatchArgs),
    /// Validate the term dictionary and print its statistics
    Terms(TermsArgs),
}

#[cfg(feature = "cli")]
#[derive(Debug, Args)]
#[command(group(clap::ArgGroup::new("input").required(true).multiple(true).args(["url", "text", "file"])))]
pub struct AnalyzeArgs {
    /// Page to fetch; with --text or --file it only serves as the link base
    #[arg(long)]
    pub url: Option<String>,

    #[arg(long, conflicts_with = "file")]
    pub text: Option<String>,

    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Content type of --text or --file input, e.g. text/html
    #[arg(long)]
    pub content_type: Option<String>,

    /// body, title_and_meta or full
    #[arg(long)]
    pub scope: Option<TextScope>,
}

#[cfg(feature = "cli")]
#[derive(Debug, Args)]
pub struct BatchArgs {
    /// URL list (.txt, .csv or .json)
    #[arg(long)]
    pub input: String,

    #[arg(long)]
    pub output: Option<String>,

    #[arg(long)]
    pub concurrency: Option<usize>,
}

#[cfg(feature = "cli")]
#[derive(Debug, Args)]
pub struct TermsArgs {
    /// Show the entry a term resolves to
    #[arg(long)]
    pub lookup: Option<String>,
}

/// Resolved settings of one batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSettings {
    pub input_path: String,
    pub output_path: String,
    pub concurrent_requests: usize,
}

impl ConfigProvider for BatchSettings {
    fn input_path(&self) -> &str {
        &self.input_path
    }

    fn output_path(&self) -> &str {
        &self.output_path
    }

    fn concurrent_requests(&self) -> usize {
        self.concurrent_requests
    }
}

#[cfg(all(test, feature = "cli"))]
mod tests {
    use super::*;

    #[test]
    fn test_parse_analyze_url() {
        let cli = Cli::try_parse_from([
            "page-analyst",
            "-v",
            "analyze",
            "--url",
            "https://example.com/",
            "--scope",
            "full",
        ])
        .unwrap();

        assert!(cli.verbose);
        match cli.command {
            Command::Analyze(args) => {
                assert_eq!(args.url.as_deref(), Some("https://example.com/"));
                assert_eq!(args.scope, Some(TextScope::Full));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_analyze_requires_input() {
        assert!(Cli::try_parse_from(["page-analyst", "analyze"]).is_err());
        assert!(Cli::try_parse_from([
            "page-analyst",
            "analyze",
            "--text",
            "a",
            "--file",
            "b.html"
        ])
        .is_err());
    }

    #[test]
    fn test_parse_batch_with_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "page-analyst",
            "batch",
            "--input",
            "urls.txt",
            "--concurrency",
            "3",
            "--terms",
            "custom.json",
        ])
        .unwrap();

        assert_eq!(cli.terms, Some(PathBuf::from("custom.json")));
        match cli.command {
            Command::Batch(args) => {
                assert_eq!(args.input, "urls.txt");
                assert_eq!(args.concurrency, Some(3));
                assert!(args.output.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}

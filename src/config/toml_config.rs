use crate::core::analyst::{AnalysisOptions, TextScope};
use crate::core::extractor::ExtractOptions;
use crate::core::fetcher::FetchOptions;
use crate::core::orchestrator::PipelineSettings;
use crate::utils::error::ConfigError;
use crate::utils::validation::{
    validate_non_empty_string, validate_path, validate_positive_number, validate_range, Validate,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "page-analyst.toml";
pub const DEFAULT_TERMS_FILE: &str = "nT.json";

static ENV_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("static pattern"));

/// Application settings. Every section and field is optional in the file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub terms: TermsConfig,
    pub fetch: FetchConfig,
    pub extract: ExtractConfig,
    pub analysis: AnalysisConfig,
    pub batch: BatchConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TermsConfig {
    pub path: String,
}

impl Default for TermsConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_TERMS_FILE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub timeout_seconds: u64,
    pub max_redirects: usize,
    pub max_body_bytes: u64,
    pub retry_attempts: u32,
    pub retry_backoff_ms: u64,
    pub user_agent: Option<String>,
    pub respect_robots: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        let defaults = FetchOptions::default();
        Self {
            timeout_seconds: defaults.timeout.as_secs(),
            max_redirects: defaults.max_redirects,
            max_body_bytes: defaults.max_body_bytes,
            retry_attempts: defaults.max_retries,
            retry_backoff_ms: defaults.backoff_base.as_millis() as u64,
            user_agent: None,
            respect_robots: defaults.respect_robots,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    pub min_block_chars: usize,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            min_block_chars: ExtractOptions::default().min_block_chars,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub scope: TextScope,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub output_path: String,
    pub concurrent_requests: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            output_path: "./output".to_string(),
            concurrent_requests: 5,
        }
    }
}

impl AppConfig {
    /// Loads settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let processed = Self::substitute_env_vars(content);
        Ok(toml::from_str(&processed)?)
    }

    /// The explicit file when given, else `page-analyst.toml` if present, else defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::from_file(path),
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                tracing::debug!("Using {} from the working directory", DEFAULT_CONFIG_FILE);
                Self::from_file(DEFAULT_CONFIG_FILE)
            }
            None => Ok(Self::default()),
        }
    }

    /// Replaces `${NAME}` with the environment variable; unknown names are left as is.
    fn substitute_env_vars(content: &str) -> String {
        ENV_VAR
            .replace_all(content, |caps: &regex::Captures| {
                let name = &caps[1];
                std::env::var(name).unwrap_or_else(|_| format!("${{{}}}", name))
            })
            .into_owned()
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        let defaults = FetchOptions::default();
        PipelineSettings {
            fetch: FetchOptions {
                timeout: Duration::from_secs(self.fetch.timeout_seconds),
                max_redirects: self.fetch.max_redirects,
                max_body_bytes: self.fetch.max_body_bytes,
                max_retries: self.fetch.retry_attempts,
                backoff_base: Duration::from_millis(self.fetch.retry_backoff_ms),
                user_agent: self
                    .fetch
                    .user_agent
                    .clone()
                    .unwrap_or(defaults.user_agent),
                respect_robots: self.fetch.respect_robots,
                ..defaults
            },
            extract: ExtractOptions {
                min_block_chars: self.extract.min_block_chars,
            },
            analysis: AnalysisOptions {
                scope: self.analysis.scope,
            },
        }
    }
}

impl Validate for AppConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        validate_path("terms.path", &self.terms.path)?;
        validate_range("fetch.timeout_seconds", self.fetch.timeout_seconds, 1, 300)?;
        validate_range("fetch.max_redirects", self.fetch.max_redirects, 0, 20)?;
        validate_positive_number(
            "fetch.max_body_bytes",
            self.fetch.max_body_bytes as usize,
            1024,
        )?;
        validate_range("fetch.retry_attempts", self.fetch.retry_attempts, 0, 10)?;
        validate_range("fetch.retry_backoff_ms", self.fetch.retry_backoff_ms, 0, 60_000)?;
        if let Some(agent) = &self.fetch.user_agent {
            validate_non_empty_string("fetch.user_agent", agent)?;
        }
        validate_positive_number("extract.min_block_chars", self.extract.min_block_chars, 1)?;
        validate_path("batch.output_path", &self.batch.output_path)?;
        validate_positive_number("batch.concurrent_requests", self.batch.concurrent_requests, 1)?;
        Ok(())
    }
}

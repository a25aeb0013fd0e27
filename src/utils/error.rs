use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Term dictionary and application configuration failures. Fatal at startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed term configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Term '{term}' is defined twice with conflicting values ({first} vs {second})")]
    DuplicateTerm {
        term: String,
        first: String,
        second: String,
    },

    #[error("Invalid term '{term}': {reason}")]
    InvalidTerm { term: String, reason: String },

    #[error("Term configuration contains no terms")]
    NoTerms,

    #[error("Invalid value for {field}: '{value}' ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    Missing { field: String },
}

/// Per-request retrieval failures, carried in `FetchResult::error`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("server answered with HTTP {0}")]
    HttpError(u16),

    #[error("response body exceeds {limit} bytes")]
    TooLarge { limit: u64 },

    #[error("redirect loop or too many redirects")]
    RedirectLoop,

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("fetching is disallowed by robots.txt")]
    RobotsDisallowed,
}

impl FetchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::Timeout => ErrorKind::Timeout,
            FetchError::ConnectionFailed(_) => ErrorKind::ConnectionFailed,
            FetchError::HttpError(_) => ErrorKind::HttpError,
            FetchError::TooLarge { .. } => ErrorKind::TooLarge,
            FetchError::RedirectLoop => ErrorKind::RedirectLoop,
            FetchError::InvalidUrl(_) => ErrorKind::InvalidUrl,
            FetchError::RobotsDisallowed => ErrorKind::RobotsDisallowed,
        }
    }

    pub fn http_status(&self) -> Option<u16> {
        match self {
            FetchError::HttpError(code) => Some(*code),
            _ => None,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("content is empty")]
    Empty,

    #[error("content is not textual: {0}")]
    NonTextual(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("term dictionary is empty or was never loaded")]
    NoTerms,
}

/// Serialized error kind of a failed pipeline response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Timeout,
    ConnectionFailed,
    HttpError,
    TooLarge,
    RedirectLoop,
    InvalidUrl,
    RobotsDisallowed,
    Extraction,
    Analysis,
    InvalidRequest,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Timeout => "timeout",
            ErrorKind::ConnectionFailed => "connection_failed",
            ErrorKind::HttpError => "http_error",
            ErrorKind::TooLarge => "too_large",
            ErrorKind::RedirectLoop => "redirect_loop",
            ErrorKind::InvalidUrl => "invalid_url",
            ErrorKind::RobotsDisallowed => "robots_disallowed",
            ErrorKind::Extraction => "extraction",
            ErrorKind::Analysis => "analysis",
            ErrorKind::InvalidRequest => "invalid_request",
        }
    }

    /// Faults of this service rather than of the caller or the remote site.
    pub fn is_server_fault(&self) -> bool {
        matches!(self, ErrorKind::Analysis)
    }

    /// Failures that may go away when the same request is repeated later.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorKind::Timeout | ErrorKind::ConnectionFailed | ErrorKind::HttpError
        )
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Analysis failed: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV processing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Zip operation failed: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Processing error: {message}")]
    Processing { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Network,
    Content,
    Analysis,
    Storage,
    Processing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl Error {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Config(_) | Error::Validation { .. } => ErrorCategory::Configuration,
            Error::Fetch(_) | Error::Http(_) => ErrorCategory::Network,
            Error::Extraction(_) => ErrorCategory::Content,
            Error::Analysis(_) => ErrorCategory::Analysis,
            Error::Io(_) | Error::Zip(_) => ErrorCategory::Storage,
            Error::Csv(_) | Error::Serialization(_) | Error::Processing { .. } => {
                ErrorCategory::Processing
            }
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Error::Config(_) | Error::Validation { .. } | Error::Analysis(_) => {
                ErrorSeverity::Critical
            }
            Error::Fetch(e) if e.kind().is_transient() => ErrorSeverity::Medium,
            Error::Http(_) => ErrorSeverity::Medium,
            Error::Extraction(_) => ErrorSeverity::Low,
            _ => ErrorSeverity::High,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            Error::Config(ConfigError::DuplicateTerm { .. }) => {
                "Remove or reconcile the duplicated term in the dictionary"
            }
            Error::Config(ConfigError::Io { .. }) => {
                "Check that the dictionary path exists and is readable"
            }
            Error::Config(_) | Error::Validation { .. } => {
                "Fix the configuration file and start again"
            }
            Error::Fetch(FetchError::Timeout) => "Retry later or raise fetch.timeout_seconds",
            Error::Fetch(FetchError::TooLarge { .. }) => "Raise fetch.max_body_bytes",
            Error::Fetch(FetchError::RobotsDisallowed) => {
                "The site forbids crawling this path; disable fetch.respect_robots only if permitted"
            }
            Error::Fetch(_) | Error::Http(_) => "Check the URL and network connectivity",
            Error::Extraction(_) => "Supply an HTML or plain text document",
            Error::Analysis(_) => "Load a non-empty term dictionary before analyzing",
            Error::Io(_) | Error::Zip(_) => "Check the output directory permissions and free space",
            Error::Csv(_) | Error::Serialization(_) | Error::Processing { .. } => {
                "Inspect the input file for malformed rows"
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Configuration => format!("Configuration problem: {}", self),
            ErrorCategory::Network => format!("Could not retrieve the page: {}", self),
            ErrorCategory::Content => format!("Could not read the page content: {}", self),
            ErrorCategory::Analysis => format!("Analysis unavailable: {}", self),
            ErrorCategory::Storage => format!("Could not write the results: {}", self),
            ErrorCategory::Processing => format!("Could not process the input: {}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

use crate::utils::error::{ErrorKind, FetchError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// One dictionary entry. `term` is the normalized key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermEntry {
    pub term: String,
    pub weight: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStatus {
    Success,
    Failure,
}

/// Outcome of one retrieval. Handed to the extractor by value.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub url: String,
    /// URL after redirects, when it differs from `url`.
    pub final_url: Option<String>,
    pub status: FetchStatus,
    pub http_status: Option<u16>,
    pub body: Option<Vec<u8>>,
    pub content_type: Option<String>,
    /// Charset declared by the transport, or "unknown".
    pub encoding: String,
    pub elapsed_ms: u64,
    pub attempts: u32,
    pub error: Option<FetchError>,
}

impl FetchResult {
    /// Directly supplied content; no network access involved.
    pub fn raw(text: impl Into<String>) -> Self {
        Self {
            encoding: "utf-8".to_string(),
            ..Self::raw_bytes(text.into().into_bytes())
        }
    }

    /// Directly supplied bytes of unknown charset, e.g. a local file.
    pub fn raw_bytes(body: Vec<u8>) -> Self {
        Self {
            url: String::new(),
            final_url: None,
            status: FetchStatus::Success,
            http_status: None,
            body: Some(body),
            content_type: None,
            encoding: "unknown".to_string(),
            elapsed_ms: 0,
            attempts: 0,
            error: None,
        }
    }

    pub fn failure(url: impl Into<String>, error: FetchError, attempts: u32, elapsed_ms: u64) -> Self {
        Self {
            url: url.into(),
            final_url: None,
            status: FetchStatus::Failure,
            http_status: error.http_status(),
            body: None,
            content_type: None,
            encoding: "unknown".to_string(),
            elapsed_ms,
            attempts,
            error: Some(error),
        }
    }

    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_content_type(mut self, content_type: Option<String>) -> Self {
        self.content_type = content_type;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == FetchStatus::Success
    }

    /// The URL links should be resolved against.
    pub fn effective_url(&self) -> Option<&str> {
        self.final_url
            .as_deref()
            .or(Some(self.url.as_str()))
            .filter(|u| !u.is_empty())
    }

    pub fn summary(&self) -> FetchSummary {
        FetchSummary {
            url: (!self.url.is_empty()).then(|| self.url.clone()),
            final_url: self.final_url.clone(),
            status: self.status,
            http_status: self.http_status,
            content_type: self.content_type.clone(),
            encoding: self.encoding.clone(),
            elapsed_ms: self.elapsed_ms,
            attempts: self.attempts,
            bytes: self.body.as_ref().map(|b| b.len()).unwrap_or(0),
        }
    }
}

/// Serializable view of a `FetchResult` without the body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchSummary {
    pub url: Option<String>,
    pub final_url: Option<String>,
    pub status: FetchStatus,
    pub http_status: Option<u16>,
    pub content_type: Option<String>,
    pub encoding: String,
    pub elapsed_ms: u64,
    pub attempts: u32,
    pub bytes: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageMeta {
    pub description: Option<String>,
    pub keywords: Option<String>,
}

/// Normalized document. Immutable once produced by the extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub source_url: Option<String>,
    pub title: Option<String>,
    pub text_blocks: Vec<String>,
    pub links: BTreeSet<String>,
    pub meta: PageMeta,
    pub language: Option<String>,
    pub encoding: String,
    pub extracted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermMatch {
    pub term: String,
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
    pub weight: f64,
    /// Char offsets into the normalized analyzed text.
    pub positions: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub category: String,
    pub theme: Option<String>,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    #[serde(skip)]
    pub document: Arc<Document>,
    pub matches: Vec<TermMatch>,
    pub score: f64,
    pub score_by_category: BTreeMap<String, f64>,
    pub classification: Option<Classification>,
    pub token_count: usize,
    pub termset_version: u64,
}

/// A URL to fetch, text to analyze directly, or raw bytes such as a local
/// file. Supplied content wins over the URL, which then only serves as the
/// base for links. `text` wins over `body`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineRequest {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    /// Undecoded content; its charset is detected like a fetched body's.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Vec<u8>>,
    #[serde(default)]
    pub content_type: Option<String>,
}

impl PipelineRequest {
    pub fn url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Default::default()
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn bytes(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: Some(body.into()),
            ..Default::default()
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Succeeded,
    Failed,
}

impl PipelineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStatus::Succeeded => "succeeded",
            PipelineStatus::Failed => "failed",
        }
    }
}

/// Error as shown to callers: a kind plus proximate cause, never internals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseError {
    pub kind: ErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    pub message: String,
}

impl ResponseError {
    /// Whether repeating the same request later may succeed.
    pub fn is_retriable(&self) -> bool {
        match self.kind {
            ErrorKind::Timeout | ErrorKind::ConnectionFailed => true,
            ErrorKind::HttpError => self.http_status.is_some_and(|s| s >= 500 || s == 429),
            _ => false,
        }
    }
}

impl From<&FetchError> for ResponseError {
    fn from(error: &FetchError) -> Self {
        Self {
            kind: error.kind(),
            http_status: error.http_status(),
            message: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineResponse {
    pub status: PipelineStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetch: Option<FetchSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<Arc<Document>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<AnalysisResult>,
    pub termset_version: u64,
}

impl PipelineResponse {
    pub fn is_success(&self) -> bool {
        self.status == PipelineStatus::Succeeded
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}

/// One analyzed URL of a batch run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchEntry {
    pub url: String,
    pub response: PipelineResponse,
}

#[derive(Debug, Clone)]
pub struct BatchReport {
    pub entries: Vec<BatchEntry>,
    pub csv_output: String,
    pub failures: Vec<BatchEntry>,
}

//! Runs one request through fetch, extraction and analysis.
//!
//! The term dictionary snapshot is taken once when a request starts and used
//! for its whole lifetime, so a reload published mid-request never mixes
//! dictionary versions inside one result.

use crate::core::analyst::{AnalysisOptions, Analyst};
use crate::core::extractor::{ExtractOptions, Extractor};
use crate::core::fetcher::{fetch_raw, fetch_raw_bytes, FetchOptions};
use crate::core::terms::TermStore;
use crate::domain::model::{
    FetchSummary, PipelineRequest, PipelineResponse, PipelineStatus, ResponseError,
};
use crate::domain::ports::Fetch;
use crate::utils::error::ErrorKind;
use std::sync::Arc;

/// Per-stage options for an [`Orchestrator`].
#[derive(Debug, Clone, Default)]
pub struct PipelineSettings {
    pub fetch: FetchOptions,
    pub extract: ExtractOptions,
    pub analysis: AnalysisOptions,
}

pub struct Orchestrator<F: Fetch> {
    fetcher: F,
    store: Arc<TermStore>,
    extractor: Extractor,
    analyst: Analyst,
    fetch_options: FetchOptions,
}

impl<F: Fetch> Orchestrator<F> {
    pub fn new(fetcher: F, store: Arc<TermStore>, settings: PipelineSettings) -> Self {
        Self {
            fetcher,
            store,
            extractor: Extractor::new(settings.extract),
            analyst: Analyst::new(settings.analysis),
            fetch_options: settings.fetch,
        }
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub fn store(&self) -> &Arc<TermStore> {
        &self.store
    }

    /// Never fails as a call; stage failures are reported in the response.
    pub async fn run(&self, request: PipelineRequest) -> PipelineResponse {
        let terms = self.store.snapshot();
        let version = terms.version();
        let PipelineRequest {
            url,
            text,
            body,
            content_type,
        } = request;
        let label = url.clone().unwrap_or_else(|| "<text>".to_string());

        let fetched = match (text, body, url) {
            (Some(text), _, url) => fetch_raw(text)
                .with_source_url(url.unwrap_or_default())
                .with_content_type(content_type),
            (None, Some(body), url) => fetch_raw_bytes(body)
                .with_source_url(url.unwrap_or_default())
                .with_content_type(content_type),
            (None, None, Some(url)) => self.fetcher.fetch(&url, &self.fetch_options).await,
            (None, None, None) => {
                let error = ResponseError {
                    kind: ErrorKind::InvalidRequest,
                    http_status: None,
                    message: "request needs a url, text or body".to_string(),
                };
                return failed(error, None, version);
            }
        };

        let summary = fetched.summary();
        if let Some(error) = fetched.error.as_ref() {
            tracing::warn!("Request for {} failed while fetching: {}", label, error);
            return failed(error.into(), Some(summary), version);
        }

        let document = match self.extractor.extract(fetched) {
            Ok(document) => Arc::new(document),
            Err(e) => {
                tracing::warn!("Request for {} failed during extraction: {}", label, e);
                let error = ResponseError {
                    kind: ErrorKind::Extraction,
                    http_status: summary.http_status,
                    message: e.to_string(),
                };
                return failed(error, Some(summary), version);
            }
        };

        match self.analyst.analyze(Arc::clone(&document), &terms) {
            Ok(analysis) => {
                tracing::info!(
                    "Analyzed {}: score {} with {} matched term(s), dictionary v{}",
                    label,
                    analysis.score,
                    analysis.matches.len(),
                    version
                );
                PipelineResponse {
                    status: PipelineStatus::Succeeded,
                    error: None,
                    fetch: Some(summary),
                    document: Some(document),
                    analysis: Some(analysis),
                    termset_version: version,
                }
            }
            Err(e) => {
                tracing::error!("Request for {} failed during analysis: {}", label, e);
                PipelineResponse {
                    status: PipelineStatus::Failed,
                    error: Some(ResponseError {
                        kind: ErrorKind::Analysis,
                        http_status: None,
                        message: e.to_string(),
                    }),
                    fetch: Some(summary),
                    document: Some(document),
                    analysis: None,
                    termset_version: version,
                }
            }
        }
    }
}

fn failed(error: ResponseError, fetch: Option<FetchSummary>, version: u64) -> PipelineResponse {
    PipelineResponse {
        status: PipelineStatus::Failed,
        error: Some(error),
        fetch,
        document: None,
        analysis: None,
        termset_version: version,
    }
}

use crate::core::fetcher::FetchOptions;
use crate::domain::model::{BatchReport, FetchResult, PipelineRequest};
use crate::utils::error::Result;
use async_trait::async_trait;

/// Source of raw page content. Failures are reported inside the result.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, url: &str, options: &FetchOptions) -> FetchResult;
}

/// Destination of batch reports.
pub trait Storage: Send + Sync {
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

pub trait ConfigProvider: Send + Sync {
    fn input_path(&self) -> &str;
    fn output_path(&self) -> &str;
    fn concurrent_requests(&self) -> usize;
}

/// The three phases of a batch run over a URL list.
#[async_trait]
pub trait BatchJob: Send + Sync {
    async fn extract(&self) -> Result<Vec<PipelineRequest>>;
    async fn transform(&self, requests: Vec<PipelineRequest>) -> Result<BatchReport>;
    async fn load(&self, report: BatchReport) -> Result<String>;
}

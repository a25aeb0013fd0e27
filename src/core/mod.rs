pub mod analyst;
pub mod engine;
pub mod extractor;
pub mod fetcher;
pub mod orchestrator;
pub mod robots;
pub mod terms;
pub mod text;

pub use crate::domain::model::{Document, FetchResult, PipelineRequest, PipelineResponse};
pub use crate::domain::ports::{BatchJob, ConfigProvider, Fetch, Storage};
pub use crate::utils::error::Result;

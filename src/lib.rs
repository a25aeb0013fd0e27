pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::Cli;
pub use config::{cli::LocalStorage, toml_config::AppConfig, BatchSettings};

pub use app::batch::BatchPipeline;
pub use core::{
    analyst::{Analyst, TextScope},
    engine::BatchEngine,
    extractor::Extractor,
    fetcher::{FetchOptions, HttpFetcher},
    orchestrator::{Orchestrator, PipelineSettings},
    terms::{TermSet, TermStore},
};
pub use utils::error::{Error, Result};

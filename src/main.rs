use anyhow::Context;
use clap::Parser;
use page_analyst::app::input::read_input_file;
use page_analyst::config::{AnalyzeArgs, BatchArgs, Command, TermsArgs};
use page_analyst::domain::model::{PipelineRequest, PipelineResponse};
use page_analyst::utils::error::{ConfigError, Error, ErrorKind, ErrorSeverity};
use page_analyst::utils::{logger, validation::Validate};
use page_analyst::{
    AppConfig, BatchEngine, BatchPipeline, BatchSettings, Cli, HttpFetcher, LocalStorage,
    Orchestrator, TermStore,
};
use std::collections::BTreeMap;
use std::sync::Arc;

const EXIT_REQUEST_FAILED: i32 = 1;
const EXIT_RETRIABLE: i32 = 2;
const EXIT_CONFIG: i32 = 3;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.json_logs {
        logger::init_json_logger(cli.verbose);
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    tracing::info!("Starting page-analyst {}", env!("CARGO_PKG_VERSION"));

    let mut config = AppConfig::discover(cli.config.as_deref()).unwrap_or_else(|e| config_failure(e));
    if let Some(terms) = &cli.terms {
        config.terms.path = terms.to_string_lossy().into_owned();
    }
    if let Err(e) = config.validate() {
        config_failure(e);
    }
    if cli.verbose {
        tracing::debug!("Effective config: {:?}", config);
    }

    let store = TermStore::load(&config.terms.path).unwrap_or_else(|e| config_failure(e));
    let store = Arc::new(store);

    let code = match cli.command {
        Command::Analyze(args) => analyze(args, &config, store).await?,
        Command::Batch(args) => batch(args, &config, store).await?,
        Command::Terms(args) => terms(args, &store)?,
    };

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

fn config_failure(e: ConfigError) -> ! {
    let e = Error::from(e);
    tracing::error!("Configuration rejected: {}", e);
    tracing::error!("Suggestion: {}", e.recovery_suggestion());
    eprintln!("{}", e.user_friendly_message());
    std::process::exit(EXIT_CONFIG);
}

async fn analyze(args: AnalyzeArgs, config: &AppConfig, store: Arc<TermStore>) -> anyhow::Result<i32> {
    let mut settings = config.pipeline_settings();
    if let Some(scope) = args.scope {
        settings.analysis.scope = scope;
    }

    let request = match (args.text, &args.file) {
        (Some(text), _) => PipelineRequest {
            text: Some(text),
            content_type: args.content_type,
            ..Default::default()
        },
        (None, Some(path)) => read_input_file(path, args.content_type)
            .with_context(|| format!("Cannot read input file {}", path.display()))?,
        (None, None) => PipelineRequest {
            content_type: args.content_type,
            ..Default::default()
        },
    };
    let request = PipelineRequest {
        url: args.url,
        ..request
    };

    let orchestrator = Orchestrator::new(HttpFetcher::new()?, store, settings);
    let response = orchestrator.run(request).await;

    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(exit_code(&response))
}

fn exit_code(response: &PipelineResponse) -> i32 {
    match &response.error {
        None => 0,
        Some(error) if error.kind == ErrorKind::Analysis => EXIT_CONFIG,
        Some(error) if error.is_retriable() => EXIT_RETRIABLE,
        Some(_) => EXIT_REQUEST_FAILED,
    }
}

async fn batch(args: BatchArgs, config: &AppConfig, store: Arc<TermStore>) -> anyhow::Result<i32> {
    let settings = BatchSettings {
        input_path: args.input,
        output_path: args.output.unwrap_or_else(|| config.batch.output_path.clone()),
        concurrent_requests: args
            .concurrency
            .unwrap_or(config.batch.concurrent_requests),
    };
    if let Err(e) = page_analyst::utils::validation::validate_positive_number(
        "concurrency",
        settings.concurrent_requests,
        1,
    ) {
        config_failure(e);
    }

    let storage = LocalStorage::new(settings.output_path.clone());
    let orchestrator = Arc::new(Orchestrator::new(
        HttpFetcher::new()?,
        store,
        config.pipeline_settings(),
    ));
    let engine = BatchEngine::new(BatchPipeline::new(storage, settings, orchestrator));

    match engine.run().await {
        Ok(output_path) => {
            tracing::info!("Batch analysis completed");
            println!("Report saved to: {}", output_path);
            Ok(0)
        }
        Err(e) => {
            tracing::error!(
                "Batch analysis failed: {} (Category: {:?}, Severity: {:?})",
                e,
                e.category(),
                e.severity()
            );
            tracing::error!("Recovery suggestion: {}", e.recovery_suggestion());
            eprintln!("{}", e.user_friendly_message());
            eprintln!("Suggestion: {}", e.recovery_suggestion());

            Ok(match e.severity() {
                ErrorSeverity::Critical => EXIT_CONFIG,
                ErrorSeverity::Medium => EXIT_RETRIABLE,
                ErrorSeverity::Low | ErrorSeverity::High => EXIT_REQUEST_FAILED,
            })
        }
    }
}

fn terms(args: TermsArgs, store: &TermStore) -> anyhow::Result<i32> {
    let set = store.snapshot();

    if let Some(term) = args.lookup {
        return match set.lookup(&term) {
            Some(entry) => {
                println!("{}", serde_json::to_string_pretty(entry)?);
                Ok(0)
            }
            None => {
                eprintln!("'{}' is not in the dictionary", term);
                Ok(EXIT_REQUEST_FAILED)
            }
        };
    }

    let mut categories: BTreeMap<&str, usize> = BTreeMap::new();
    let mut uncategorized = 0;
    for entry in set.entries() {
        match entry.category.as_deref() {
            Some(category) => *categories.entry(category).or_insert(0) += 1,
            None => uncategorized += 1,
        }
    }

    let stats = serde_json::json!({
        "source": set.source(),
        "version": set.version(),
        "terms": set.len(),
        "max_phrase_tokens": set.max_phrase_tokens(),
        "categories": categories,
        "uncategorized": uncategorized,
    });
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(0)
}

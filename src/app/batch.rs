//! Batch analysis of a URL list file into a zipped report.

use crate::core::orchestrator::Orchestrator;
use crate::domain::model::{BatchEntry, BatchReport, PipelineRequest, PipelineResponse};
use crate::domain::ports::{BatchJob, ConfigProvider, Fetch, Storage};
use crate::utils::error::{Error, Result};
use crate::utils::validation::validate_file_extension;
use calamine::{Data, Reader, Xlsx, XlsxError};
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;
use zip::write::{FileOptions, ZipWriter};

pub const REPORT_FILE: &str = "analysis_report.zip";

const CSV_HEADER: [&str; 8] = [
    "url",
    "status",
    "error_kind",
    "http_status",
    "score",
    "category",
    "theme",
    "match_count",
];

/// Reads URLs from a `.txt`, `.csv`, `.json` or `.xlsx` file.
pub fn read_url_list<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let path = path.as_ref();
    let extension = validate_file_extension(
        "input",
        &path.to_string_lossy(),
        &["txt", "csv", "json", "xlsx"],
    )?;
    let data = std::fs::read(path)?;
    if extension == "xlsx" {
        return parse_xlsx_url_list(data);
    }
    let content = String::from_utf8(data).map_err(|e| Error::Validation {
        message: format!("URL list {} is not UTF-8: {}", path.display(), e),
    })?;
    parse_url_list(&content, &extension)
}

/// First column of the first worksheet. A leading `url` header and blank
/// cells are skipped.
pub fn parse_xlsx_url_list(data: Vec<u8>) -> Result<Vec<String>> {
    let invalid = |e: XlsxError| Error::Validation {
        message: format!("Cannot read spreadsheet URL list: {}", e),
    };
    let mut workbook = Xlsx::new(Cursor::new(data)).map_err(invalid)?;
    let Some(range) = workbook.worksheet_range_at(0) else {
        return Err(Error::Validation {
            message: "Spreadsheet URL list has no worksheet".to_string(),
        });
    };
    let range = range.map_err(invalid)?;

    let mut urls = Vec::new();
    let (Some((first_row, _)), Some((last_row, _))) = (range.start(), range.end()) else {
        return Ok(urls);
    };
    for row in first_row..=last_row {
        let cell = match range.get_value((row, 0)) {
            Some(Data::Empty) | None => continue,
            Some(value) => value.to_string(),
        };
        if urls.is_empty() && cell.trim().eq_ignore_ascii_case("url") {
            continue;
        }
        push_url(&mut urls, &cell);
    }
    Ok(urls)
}

/// Parses a URL list. `extension` is one of `txt`, `csv` or `json`.
pub fn parse_url_list(content: &str, extension: &str) -> Result<Vec<String>> {
    let mut urls = Vec::new();
    match extension {
        "txt" => {
            for line in content.lines() {
                let line = line.trim();
                if !line.starts_with('#') {
                    push_url(&mut urls, line);
                }
            }
        }
        "csv" => {
            let mut reader = csv::ReaderBuilder::new()
                .has_headers(false)
                .flexible(true)
                .trim(csv::Trim::All)
                .from_reader(content.as_bytes());
            for (row, record) in reader.records().enumerate() {
                let record = record?;
                let Some(first) = record.get(0) else {
                    continue;
                };
                if row == 0 && first.eq_ignore_ascii_case("url") {
                    continue;
                }
                push_url(&mut urls, first);
            }
        }
        "json" => {
            let value: serde_json::Value = serde_json::from_str(content)?;
            let serde_json::Value::Array(items) = value else {
                return Err(Error::Validation {
                    message: "JSON URL list must be an array".to_string(),
                });
            };
            for item in items {
                match &item {
                    serde_json::Value::String(url) => push_url(&mut urls, url),
                    serde_json::Value::Object(obj) => {
                        match obj.get("url").or_else(|| obj.get("domain")).and_then(|v| v.as_str()) {
                            Some(url) => push_url(&mut urls, url),
                            None => tracing::warn!("Skipping JSON entry without url or domain: {}", item),
                        }
                    }
                    other => tracing::warn!("Skipping unsupported JSON entry: {}", other),
                }
            }
        }
        other => {
            return Err(Error::Validation {
                message: format!("Unsupported URL list format: {}", other),
            })
        }
    }
    Ok(urls)
}

fn push_url(urls: &mut Vec<String>, raw: &str) {
    let raw = raw.trim();
    if raw.is_empty() {
        return;
    }
    if raw.contains("://") {
        urls.push(raw.to_string());
    } else {
        urls.push(format!("https://{}", raw));
    }
}

pub struct BatchPipeline<S: Storage, C: ConfigProvider, F: Fetch + 'static> {
    storage: S,
    config: C,
    orchestrator: Arc<Orchestrator<F>>,
}

impl<S: Storage, C: ConfigProvider, F: Fetch + 'static> BatchPipeline<S, C, F> {
    pub fn new(storage: S, config: C, orchestrator: Arc<Orchestrator<F>>) -> Self {
        Self {
            storage,
            config,
            orchestrator,
        }
    }
}

fn csv_row(entry: &BatchEntry) -> [String; 8] {
    let response = &entry.response;
    let error = response.error.as_ref();
    let analysis = response.analysis.as_ref();
    let classification = analysis.and_then(|a| a.classification.as_ref());
    [
        entry.url.clone(),
        response.status.as_str().to_string(),
        error.map(|e| e.kind.as_str().to_string()).unwrap_or_default(),
        error
            .and_then(|e| e.http_status)
            .or_else(|| response.fetch.as_ref().and_then(|f| f.http_status))
            .map(|s| s.to_string())
            .unwrap_or_default(),
        analysis.map(|a| a.score.to_string()).unwrap_or_default(),
        classification.map(|c| c.category.clone()).unwrap_or_default(),
        classification
            .and_then(|c| c.theme.clone())
            .unwrap_or_default(),
        analysis
            .map(|a| a.matches.len().to_string())
            .unwrap_or_default(),
    ]
}

fn render_csv(entries: &[BatchEntry]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADER)?;
    for entry in entries {
        writer.write_record(csv_row(entry))?;
    }
    let bytes = writer.into_inner().map_err(|e| Error::Processing {
        message: format!("Cannot finish CSV report: {}", e),
    })?;
    String::from_utf8(bytes).map_err(|e| Error::Processing {
        message: format!("CSV report is not UTF-8: {}", e),
    })
}

#[async_trait::async_trait]
impl<S: Storage, C: ConfigProvider, F: Fetch + 'static> BatchJob for BatchPipeline<S, C, F> {
    async fn extract(&self) -> Result<Vec<PipelineRequest>> {
        tracing::debug!("Reading URL list from: {}", self.config.input_path());
        let urls = read_url_list(self.config.input_path())?;
        if urls.is_empty() {
            tracing::warn!("URL list {} is empty", self.config.input_path());
        }
        Ok(urls.into_iter().map(PipelineRequest::url).collect())
    }

    async fn transform(&self, requests: Vec<PipelineRequest>) -> Result<BatchReport> {
        let limit = self.config.concurrent_requests().max(1);
        tracing::debug!("Analyzing {} URL(s), {} at a time", requests.len(), limit);

        let semaphore = Arc::new(Semaphore::new(limit));
        let mut handles = Vec::with_capacity(requests.len());
        for request in requests {
            let url = request.url.clone().unwrap_or_default();
            let orchestrator = Arc::clone(&self.orchestrator);
            let semaphore = Arc::clone(&semaphore);
            let handle = tokio::spawn(async move {
                let _permit = semaphore.acquire().await.ok();
                orchestrator.run(request).await
            });
            handles.push((url, handle));
        }

        let mut entries = Vec::with_capacity(handles.len());
        for (url, handle) in handles {
            let response: PipelineResponse = handle.await.map_err(|e| Error::Processing {
                message: format!("Analysis task for {} did not complete: {}", url, e),
            })?;
            entries.push(BatchEntry { url, response });
        }

        let failures: Vec<BatchEntry> = entries
            .iter()
            .filter(|e| !e.response.is_success())
            .cloned()
            .collect();

        Ok(BatchReport {
            csv_output: render_csv(&entries)?,
            entries,
            failures,
        })
    }

    async fn load(&self, report: BatchReport) -> Result<String> {
        let output_path = format!("{}/{}", self.config.output_path(), REPORT_FILE);

        tracing::debug!(
            "Creating ZIP file with {} files",
            2 + if report.failures.is_empty() { 0 } else { 1 }
        );

        let zip_data = {
            let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));

            zip.start_file::<_, ()>("report.csv", FileOptions::default())?;
            zip.write_all(report.csv_output.as_bytes())?;

            zip.start_file::<_, ()>("report.json", FileOptions::default())?;
            let json_data = serde_json::to_string_pretty(&report.entries)?;
            zip.write_all(json_data.as_bytes())?;

            if !report.failures.is_empty() {
                zip.start_file::<_, ()>("failures.json", FileOptions::default())?;
                let json_data = serde_json::to_string_pretty(&report.failures)?;
                zip.write_all(json_data.as_bytes())?;
            }

            let cursor = zip.finish()?;
            cursor.into_inner()
        };

        tracing::debug!("Writing ZIP file ({} bytes) to storage", zip_data.len());
        self.storage.write_file(REPORT_FILE, &zip_data).await?;

        Ok(output_path)
    }
}

use httpmock::prelude::*;
use page_analyst::core::fetcher::FetchOptions;
use page_analyst::{
    BatchEngine, BatchPipeline, BatchSettings, HttpFetcher, LocalStorage, Orchestrator,
    PipelineSettings, TermSet, TermStore,
};
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

#[tokio::test]
async fn test_end_to_end_batch_report() {
    let temp_dir = TempDir::new().unwrap();
    let output_path = temp_dir.path().join("out").to_string_lossy().into_owned();

    let server = MockServer::start();
    let spam = server.mock(|when, then| {
        when.method(GET).path("/spam");
        then.status(200)
            .header("Content-Type", "text/html")
            .body("<p>Cheap pills. Click here now!</p>");
    });
    let shop = server.mock(|when, then| {
        when.method(GET).path("/shop");
        then.status(200)
            .header("Content-Type", "text/plain")
            .body("A fine watch.\n\nAnother watch.");
    });
    let broken = server.mock(|when, then| {
        when.method(GET).path("/broken");
        then.status(500);
    });

    let input = temp_dir.path().join("urls.csv");
    std::fs::write(
        &input,
        format!(
            "url\n{}\n{}\n{}\n",
            server.url("/spam"),
            server.url("/broken"),
            server.url("/shop")
        ),
    )
    .unwrap();

    let terms = TermSet::from_json_str(
        r#"[{"term": "cheap", "weight": -2, "category": "spam"},
            {"term": "click here", "weight": -5, "category": "spam"},
            {"term": "watch", "weight": 2, "category": "shopping", "theme": "watches"}]"#,
    )
    .unwrap();
    let settings = PipelineSettings {
        fetch: FetchOptions {
            max_retries: 1,
            backoff_base: Duration::from_millis(5),
            ..FetchOptions::default()
        },
        ..PipelineSettings::default()
    };
    let orchestrator = Arc::new(Orchestrator::new(
        HttpFetcher::new().unwrap(),
        Arc::new(TermStore::new(terms)),
        settings,
    ));
    let config = BatchSettings {
        input_path: input.to_string_lossy().into_owned(),
        output_path: output_path.clone(),
        concurrent_requests: 2,
    };

    let engine = BatchEngine::new(BatchPipeline::new(
        LocalStorage::new(output_path.clone()),
        config,
        orchestrator,
    ));
    let result = engine.run().await.unwrap();

    spam.assert();
    shop.assert();
    broken.assert_hits(2);
    assert!(result.ends_with("analysis_report.zip"));

    let full_path = std::path::Path::new(&output_path).join("analysis_report.zip");
    let zip_data = std::fs::read(&full_path).unwrap();
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(zip_data)).unwrap();
    assert_eq!(archive.len(), 3);

    let mut csv_content = String::new();
    archive
        .by_name("report.csv")
        .unwrap()
        .read_to_string(&mut csv_content)
        .unwrap();
    let lines: Vec<&str> = csv_content.lines().collect();
    assert_eq!(
        lines[0],
        "url,status,error_kind,http_status,score,category,theme,match_count"
    );
    assert_eq!(lines[1], format!("{},succeeded,,200,-7,,,2", server.url("/spam")));
    assert_eq!(lines[2], format!("{},failed,http_error,500,,,,", server.url("/broken")));
    assert_eq!(
        lines[3],
        format!("{},succeeded,,200,4,shopping,watches,1", server.url("/shop"))
    );

    let mut failures = String::new();
    archive
        .by_name("failures.json")
        .unwrap()
        .read_to_string(&mut failures)
        .unwrap();
    let failures: serde_json::Value = serde_json::from_str(&failures).unwrap();
    assert_eq!(failures.as_array().unwrap().len(), 1);
    assert_eq!(failures[0]["response"]["error"]["http_status"], 500);
}

#[tokio::test]
async fn test_unsupported_input_format_fails_the_run() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("urls.ods");
    std::fs::write(&input, "not a supported list").unwrap();

    let orchestrator = Arc::new(Orchestrator::new(
        HttpFetcher::new().unwrap(),
        Arc::new(TermStore::new(
            TermSet::from_json_str(r#"[{"term": "x", "weight": 1}]"#).unwrap(),
        )),
        PipelineSettings::default(),
    ));
    let config = BatchSettings {
        input_path: input.to_string_lossy().into_owned(),
        output_path: temp_dir.path().to_string_lossy().into_owned(),
        concurrent_requests: 1,
    };
    let engine = BatchEngine::new(BatchPipeline::new(
        LocalStorage::new(config.output_path.clone()),
        config,
        orchestrator,
    ));

    let err = engine.run().await.unwrap_err();
    assert!(err.to_string().contains("ods"));
    assert!(!temp_dir.path().join("analysis_report.zip").exists());
}

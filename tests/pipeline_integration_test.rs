use httpmock::prelude::*;
use page_analyst::app::input::read_input_file;
use page_analyst::domain::model::{PipelineRequest, PipelineStatus};
use page_analyst::utils::error::ErrorKind;
use page_analyst::{
    FetchOptions, HttpFetcher, Orchestrator, PipelineSettings, TermSet, TermStore, TextScope,
};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;

const DICTIONARY: &str = r#"{
    "terms": [
        {"term": "cheap", "weight": -2, "category": "spam"},
        {"term": "click here", "weight": -5, "category": "spam"},
        {"term": "watch", "weight": 3, "category": "shopping", "theme": "watches"},
        {"term": "swiss watch", "weight": 6, "category": "shopping", "theme": "watches"}
    ]
}"#;

fn orchestrator(settings: PipelineSettings) -> Orchestrator<HttpFetcher> {
    let store = TermStore::new(TermSet::from_json_str(DICTIONARY).unwrap());
    Orchestrator::new(HttpFetcher::new().unwrap(), Arc::new(store), settings)
}

fn fast_settings() -> PipelineSettings {
    PipelineSettings {
        fetch: FetchOptions {
            timeout: Duration::from_millis(300),
            backoff_base: Duration::from_millis(10),
            ..FetchOptions::default()
        },
        ..PipelineSettings::default()
    }
}

#[tokio::test]
async fn test_end_to_end_html_page() {
    let server = MockServer::start();
    let page = server.mock(|when, then| {
        when.method(GET).path("/shop");
        then.status(200)
            .header("Content-Type", "text/html; charset=utf-8")
            .body(
                r#"<!DOCTYPE html>
<html lang="en">
<head>
  <title>Swiss Watch Outlet</title>
  <meta name="description" content="Cheap watches every day">
  <script>var cheap = "click here";</script>
</head>
<body>
  <nav><a href="/cart">Click here for cart</a></nav>
  <h1>Our swiss watch collection</h1>
  <p>Every watch is checked by hand. <a href="/about#us">About</a></p>
  <footer>cheap cheap cheap</footer>
</body>
</html>"#,
            );
    });

    let response = orchestrator(fast_settings())
        .run(PipelineRequest::url(server.url("/shop")))
        .await;

    page.assert();
    assert_eq!(response.status, PipelineStatus::Succeeded);

    let document = response.document.as_ref().unwrap();
    assert_eq!(document.title.as_deref(), Some("Swiss Watch Outlet"));
    assert_eq!(document.language.as_deref(), Some("en"));
    assert_eq!(
        document.meta.description.as_deref(),
        Some("Cheap watches every day")
    );
    assert!(document.links.contains(&server.url("/about")));

    let analysis = response.analysis.as_ref().unwrap();
    let terms: Vec<&str> = analysis.matches.iter().map(|m| m.term.as_str()).collect();
    assert_eq!(terms, vec!["swiss watch", "watch"]);
    assert_eq!(analysis.score, 9.0);
    let classification = analysis.classification.as_ref().unwrap();
    assert_eq!(classification.category, "shopping");
    assert_eq!(classification.theme.as_deref(), Some("watches"));

    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["status"], "succeeded");
    assert_eq!(json["fetch"]["http_status"], 200);
    assert_eq!(json["analysis"]["termset_version"], 1);
}

#[tokio::test]
async fn test_title_and_meta_scope_over_http() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/");
        then.status(200)
            .header("Content-Type", "text/html")
            .body("<title>Cheap deals</title><meta name=keywords content='click here'><p>plain body</p>");
    });

    let mut settings = fast_settings();
    settings.analysis.scope = TextScope::TitleAndMeta;
    let response = orchestrator(settings)
        .run(PipelineRequest::url(server.url("/")))
        .await;

    assert_eq!(response.analysis.unwrap().score, -7.0);
}

#[tokio::test]
async fn test_timeout_reports_failure_without_analysis() {
    let server = MockServer::start();
    let slow = server.mock(|when, then| {
        when.method(GET).path("/slow");
        then.status(200).body("late").delay(Duration::from_millis(1500));
    });

    let mut settings = fast_settings();
    settings.fetch.max_retries = 1;
    let response = orchestrator(settings)
        .run(PipelineRequest::url(server.url("/slow")))
        .await;

    assert_eq!(response.status, PipelineStatus::Failed);
    assert_eq!(response.error_kind(), Some(ErrorKind::Timeout));
    assert!(response.error.as_ref().unwrap().is_retriable());
    assert!(response.document.is_none());
    assert!(response.analysis.is_none());
    assert_eq!(response.fetch.unwrap().attempts, 2);
    slow.assert_hits(2);
}

#[tokio::test]
async fn test_not_found_is_not_retried() {
    let server = MockServer::start();
    let missing = server.mock(|when, then| {
        when.method(GET).path("/gone");
        then.status(404).body("nope");
    });

    let response = orchestrator(fast_settings())
        .run(PipelineRequest::url(server.url("/gone")))
        .await;

    missing.assert_hits(1);
    let error = response.error.unwrap();
    assert_eq!(error.kind, ErrorKind::HttpError);
    assert_eq!(error.http_status, Some(404));
    assert!(!error.is_retriable());
}

#[tokio::test]
async fn test_raw_text_never_touches_the_network() {
    let response = orchestrator(fast_settings())
        .run(PipelineRequest::text("Buy cheap watches now!!! Click here."))
        .await;

    assert!(response.is_success());
    let analysis = response.analysis.unwrap();
    assert_eq!(analysis.score, -7.0);
    assert_eq!(analysis.matches[0].positions, vec![4]);
    assert_eq!(analysis.matches[1].positions, vec![22]);
    assert!(response.document.unwrap().source_url.is_none());
}

#[tokio::test]
async fn test_local_files_keep_their_charset_and_binary_fails_softly() {
    let dir = tempfile::tempdir().unwrap();

    let (encoded, _, _) = encoding_rs::WINDOWS_1251.encode("Дешевые часы, cheap watch");
    let mut html = b"<html><head><meta charset=\"windows-1251\"><title>t</title></head><body><p>".to_vec();
    html.extend_from_slice(&encoded);
    html.extend_from_slice(b"</p></body></html>");
    let legacy = dir.path().join("legacy.html");
    std::fs::write(&legacy, &html).unwrap();

    let png = dir.path().join("logo.png");
    std::fs::write(&png, b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR\x00\x00\x00\x10").unwrap();

    let orchestrator = orchestrator(fast_settings());

    let response = orchestrator
        .run(read_input_file(&legacy, None).unwrap())
        .await;
    assert!(response.is_success());
    let document = response.document.unwrap();
    assert_eq!(document.encoding, "windows-1251");
    assert_eq!(document.text_blocks, vec!["Дешевые часы, cheap watch"]);
    assert_eq!(response.analysis.unwrap().score, 1.0);

    let response = orchestrator.run(read_input_file(&png, None).unwrap()).await;
    assert_eq!(response.status, PipelineStatus::Failed);
    assert_eq!(response.error_kind(), Some(ErrorKind::Extraction));
    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["status"], "failed");
    assert_eq!(json["error"]["kind"], "extraction");
}

#[test]
fn test_reload_from_disk_applies_to_later_requests() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(br#"[{"term": "cheap", "weight": -2}]"#).unwrap();

    let store = Arc::new(TermStore::load(file.path()).unwrap());
    let orchestrator = Orchestrator::new(
        HttpFetcher::new().unwrap(),
        Arc::clone(&store),
        PipelineSettings::default(),
    );

    let before = tokio_test::block_on(orchestrator.run(PipelineRequest::text("cheap cheap")));
    assert_eq!(before.analysis.unwrap().score, -4.0);

    std::fs::write(file.path(), r#"[{"term": "cheap", "weight": -10}]"#).unwrap();
    store.reload().unwrap();

    let after = tokio_test::block_on(orchestrator.run(PipelineRequest::text("cheap cheap")));
    assert_eq!(after.termset_version, 2);
    assert_eq!(after.analysis.unwrap().score, -20.0);

    std::fs::write(file.path(), r#"[{"term": "cheap", "weight": -1}, {"term": "Cheap", "weight": 4}]"#)
        .unwrap();
    assert!(store.reload().is_err());

    let kept = tokio_test::block_on(orchestrator.run(PipelineRequest::text("cheap")));
    assert_eq!(kept.termset_version, 2);
    assert_eq!(kept.analysis.unwrap().score, -10.0);
}

#[test]
fn test_bundled_dictionary_loads() {
    let set = TermSet::load(concat!(env!("CARGO_MANIFEST_DIR"), "/nT.json")).unwrap();

    assert!(set.len() >= 20);
    assert_eq!(set.max_phrase_tokens(), 2);
    assert_eq!(set.lookup("Click  HERE").unwrap().weight, -5.0);
    assert!(set.categories().contains("spam"));
}

//! End-to-end harvest runs against a mock server

use page_harvest::config::{parse_config, Config};
use page_harvest::progress::ProgressError;
use page_harvest::{HarvestError, Harvester, ProgressStore, RunOutcome};
use std::path::Path;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// A court-records style config: JSON listing plus one document per record
fn records_config(server: &MockServer, dir: &TempDir) -> Config {
    let content = format!(
        r#"
[harvest]
concurrency = 3
page-size = 2
max-consecutive-page-failures = 1

[retry]
max-attempts = 2
base-delay-ms = 1
max-delay-ms = 5

[output]
progress-path = "{progress}"
output-path = "{output}"
columns = ["id", "daire", "doc_text"]

[listing.request]
url = "{uri}/search?page={{page}}&size={{page_size}}"

[listing.parser]
kind = "json"
records-pointer = "/data/data"
id-field = "id"

[document]
column = "doc_text"

[document.request]
url = "{uri}/document/{{id}}"
"#,
        uri = server.uri(),
        progress = dir.path().join("progress.json").display(),
        output = dir.path().join("out/docs.csv").display(),
    );
    parse_config(&content).unwrap()
}

fn listing(ids: &[u32]) -> serde_json::Value {
    let records: Vec<_> = ids
        .iter()
        .map(|id| serde_json::json!({"id": id, "daire": format!("{}. Hukuk Dairesi", id)}))
        .collect();
    serde_json::json!({"data": {"data": records}})
}

async fn mount_listing(server: &MockServer, page: u32, ids: &[u32], expected_calls: u64) {
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("page", page.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing(ids)))
        .expect(expected_calls)
        .mount(server)
        .await;
}

async fn mount_document(server: &MockServer, id: u32, expected_calls: u64) {
    Mock::given(method("GET"))
        .and(path(format!("/document/{}", id)))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!("karar metni {}", id)))
        .expect(expected_calls)
        .mount(server)
        .await;
}

fn read_rows(path: &str) -> Vec<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path)
        .unwrap();
    reader
        .records()
        .map(|r| r.unwrap().iter().map(str::to_string).collect())
        .collect()
}

#[tokio::test]
async fn test_full_harvest_then_resume() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = records_config(&server, &dir);

    mount_listing(&server, 1, &[1, 2], 1).await;
    mount_listing(&server, 2, &[3, 4], 1).await;
    mount_listing(&server, 3, &[], 1).await;
    for id in 1..=4 {
        mount_document(&server, id, 1).await;
    }

    let mut harvester = Harvester::new(&config, Some("hash-1".to_string())).unwrap();
    let summary = harvester.run().await.unwrap();

    assert_eq!(summary.outcome, Some(RunOutcome::EndOfData));
    assert_eq!(summary.pages_done, 2);
    assert_eq!(summary.units_stored, 4);
    server.verify().await;

    let rows = read_rows(&config.output.output_path);
    assert_eq!(rows[0], vec!["id", "daire", "doc_text"]);
    assert_eq!(rows.len(), 5);
    let mut ids: Vec<&str> = rows[1..].iter().map(|row| row[0].as_str()).collect();
    ids.sort();
    assert_eq!(ids, vec!["1", "2", "3", "4"]);
    let row = rows.iter().find(|row| row[0] == "3").unwrap();
    assert_eq!(row[1], "3. Hukuk Dairesi");
    assert_eq!(row[2], "karar metni 3");

    let progress = ProgressStore::load(Path::new(&config.output.progress_path)).unwrap();
    assert_eq!(progress.config_hash(), Some("hash-1"));
    assert_eq!(
        progress.state().completed_pages.iter().copied().collect::<Vec<_>>(),
        vec![1, 2]
    );

    // Second run: the listing grew by one page, nothing done is fetched again
    server.reset().await;
    mount_listing(&server, 1, &[1, 2], 0).await;
    mount_listing(&server, 2, &[3, 4], 0).await;
    mount_listing(&server, 3, &[5], 1).await;
    mount_listing(&server, 4, &[], 1).await;
    for id in 1..=4 {
        mount_document(&server, id, 0).await;
    }
    mount_document(&server, 5, 1).await;

    let mut harvester = Harvester::new(&config, Some("hash-1".to_string())).unwrap();
    let summary = harvester.run().await.unwrap();

    assert_eq!(summary.pages_skipped, 2);
    assert_eq!(summary.units_stored, 1);
    server.verify().await;

    let rows = read_rows(&config.output.output_path);
    assert_eq!(rows.len(), 6);
    assert_eq!(rows.iter().filter(|row| row[0] == "id").count(), 1);
}

#[tokio::test]
async fn test_abandoned_units_can_be_requeued() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = records_config(&server, &dir);

    mount_listing(&server, 1, &[1, 2], 1).await;
    mount_listing(&server, 2, &[], 1).await;
    mount_document(&server, 1, 1).await;
    Mock::given(method("GET"))
        .and(path("/document/2"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let summary = Harvester::new(&config, None)
        .unwrap()
        .run()
        .await
        .unwrap();
    assert_eq!(summary.units_abandoned, 1);
    server.verify().await;

    let mut progress = ProgressStore::load(Path::new(&config.output.progress_path)).unwrap();
    assert!(progress.is_page_done(1));
    assert_eq!(progress.requeue_abandoned().unwrap(), vec![1]);

    // The reopened page is listed again but only the abandoned unit is fetched
    server.reset().await;
    mount_listing(&server, 1, &[1, 2], 1).await;
    mount_listing(&server, 2, &[], 1).await;
    mount_document(&server, 1, 0).await;
    mount_document(&server, 2, 1).await;

    let summary = Harvester::new(&config, None)
        .unwrap()
        .run()
        .await
        .unwrap();
    assert_eq!(summary.units_stored, 1);
    assert_eq!(summary.units_skipped, 1);
    server.verify().await;

    let rows = read_rows(&config.output.output_path);
    assert_eq!(rows.len(), 3);
}

#[tokio::test]
async fn test_outage_halts_without_committing() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = records_config(&server, &dir);

    // Threshold 1: the second consecutive failed page halts the run
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(503))
        .expect(4)
        .mount(&server)
        .await;

    let mut harvester = Harvester::new(&config, None).unwrap();
    let summary = harvester.run().await.unwrap();

    assert_eq!(summary.outcome, Some(RunOutcome::Halted));
    assert_eq!(summary.pages_failed, vec![1, 2]);
    assert!(harvester.progress().state().completed_pages.is_empty());
    server.verify().await;
}

#[tokio::test]
async fn test_listing_only_html_harvest_to_jsonl() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("companies.jsonl");

    let content = format!(
        r#"
[harvest]
concurrency = 1
end-page = 2

[output]
progress-path = "{progress}"
output-path = "{output}"
format = "jsonl"
columns = ["cin", "name"]

[listing.request]
url = "{uri}/company-list/p-{{page}}-company.html"

[listing.parser]
kind = "html-table"
row-selector = "table#table tr"
columns = ["cin", "name"]
id-column = "cin"
"#,
        uri = server.uri(),
        progress = dir.path().join("progress.json").display(),
        output = output.display(),
    );
    let config = parse_config(&content).unwrap();

    for page in 1..=2u32 {
        let body = format!(
            "<table id=\"table\"><tr><th>CIN</th><th>Name</th></tr>\
             <tr><td>U{page}0001</td><td>Company {page}A</td></tr>\
             <tr><td>U{page}0002</td><td>Company {page}B</td></tr></table>"
        );
        Mock::given(method("GET"))
            .and(path(format!("/company-list/p-{}-company.html", page)))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .expect(1)
            .mount(&server)
            .await;
    }

    let summary = Harvester::new(&config, None)
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(summary.outcome, Some(RunOutcome::Completed));
    assert_eq!(summary.units_stored, 4);
    server.verify().await;

    let content = std::fs::read_to_string(&output).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0], r#"{"cin":"U10001","name":"Company 1A"}"#);
}

#[tokio::test]
async fn test_corrupt_progress_fails_before_output_is_touched() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = records_config(&server, &dir);
    std::fs::write(&config.output.progress_path, "{\"completed_pages\": [1,").unwrap();

    let result = Harvester::new(&config, None);

    assert!(matches!(
        result,
        Err(HarvestError::Progress(ProgressError::Corrupt { .. }))
    ));
    assert!(!Path::new(&config.output.output_path).exists());
}

#[tokio::test]
async fn test_missing_credentials_fail_at_startup() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let mut config = records_config(&server, &dir);
    config.client.api_key_env = Some("PAGE_HARVEST_IT_UNSET_KEY".to_string());

    let result = Harvester::new(&config, None);

    assert!(matches!(
        result,
        Err(HarvestError::MissingCredentials { var }) if var == "PAGE_HARVEST_IT_UNSET_KEY"
    ));
    assert!(!Path::new(&config.output.output_path).exists());
}

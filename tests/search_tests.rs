//! Pagination and harvest tests against a mock Scopus endpoint.

use std::time::{Duration, Instant};

use serde_json::{json, Value};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use scopus_harvest::config::Config;
use scopus_harvest::output::RecordWriter;
use scopus_harvest::pipeline;
use scopus_harvest::query::{self, EidRow, Grouping, IdentifierKind};
use scopus_harvest::record::{PiPolicy, Record};
use scopus_harvest::scopus::ScopusClient;
use scopus_harvest::ScopusError;

const SEARCH_PATH: &str = "/content/search/scopus";

fn client(server: &MockServer) -> ScopusClient {
    ScopusClient::new(Config::for_testing(&server.uri())).unwrap()
}

fn entry(n: u64) -> Value {
    json!({
        "dc:identifier": format!("SCOPUS_ID:{}", n),
        "eid": format!("2-s2.0-{}", n),
        "dc:title": format!("Paper {}", n),
        "citedby-count": n.to_string(),
        "author": [
            {"authid": "100", "given-name": "Ada", "surname": "Lovelace"},
            {"authid": "200", "given-name": "Alan", "surname": "Turing"}
        ],
        "link": [{"@ref": "scopus", "@href": format!("https://www.scopus.com/record/{}", n)}]
    })
}

fn page(start: u64, total: u64, per_page: u64, entries: Vec<Value>) -> Value {
    json!({
        "search-results": {
            "opensearch:totalResults": total.to_string(),
            "opensearch:startIndex": start.to_string(),
            "opensearch:itemsPerPage": per_page.to_string(),
            "entry": entries
        }
    })
}

fn read_records(bytes: &[u8]) -> Vec<Record> {
    csv::Reader::from_reader(bytes)
        .deserialize()
        .collect::<Result<Vec<Record>, _>>()
        .unwrap()
}

async fn mount_page(server: &MockServer, start: u64, body: Value) {
    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .and(query_param("start", start.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(1)
        .mount(server)
        .await;
}

async fn mount_catch_all_unexpected(server: &MockServer) {
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .with_priority(10)
        .expect(0)
        .mount(server)
        .await;
}

// =============================================================================
// Pagination
// =============================================================================

#[tokio::test]
async fn test_requests_ceil_total_over_per_page() {
    let server = MockServer::start().await;

    mount_page(&server, 0, page(0, 60, 25, (1..=25).map(entry).collect())).await;
    mount_page(&server, 25, page(25, 60, 25, (26..=50).map(entry).collect())).await;
    mount_page(&server, 50, page(50, 60, 25, (51..=60).map(entry).collect())).await;
    mount_catch_all_unexpected(&server).await;

    let outcome = client(&server).search("AU-ID(100)").await.unwrap();

    assert_eq!(outcome.pages, 3);
    assert_eq!(outcome.total, 60);
    assert_eq!(outcome.entries.len(), 60);
}

#[tokio::test]
async fn test_single_page_when_total_fits() {
    let server = MockServer::start().await;

    mount_page(&server, 0, page(0, 25, 25, (1..=25).map(entry).collect())).await;
    mount_catch_all_unexpected(&server).await;

    let outcome = client(&server).search("AU-ID(100)").await.unwrap();
    assert_eq!(outcome.pages, 1);
}

#[tokio::test]
async fn test_empty_result_set_placeholder_skipped() {
    let server = MockServer::start().await;

    let body = page(0, 0, 0, vec![json!({"@_fa": "true", "error": "Result set was empty"})]);
    mount_page(&server, 0, body).await;

    let outcome = client(&server).search("AU-ID(999)").await.unwrap();
    assert_eq!(outcome.pages, 1);
    assert!(outcome.entries.is_empty());
}

#[tokio::test]
async fn test_sends_api_key_and_query_params() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .and(header("X-ELS-APIKey", "test-key"))
        .and(query_param("query", "AU-ID(100) OR AU-ID(200)"))
        .and(query_param("view", "COMPLETE"))
        .and(query_param("count", "25"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(0, 1, 25, vec![entry(1)])))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = client(&server)
        .search("AU-ID(100) OR AU-ID(200)")
        .await
        .unwrap();
    assert_eq!(outcome.entries.len(), 1);
}

#[tokio::test]
async fn test_sends_field_param_when_configured() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .and(query_param("field", "dc:identifier,eid,dc:title"))
        .and(query_param("start", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(0, 1, 25, vec![entry(1)])))
        .expect(1)
        .mount(&server)
        .await;
    mount_catch_all_unexpected(&server).await;

    let mut config = Config::for_testing(&server.uri());
    config.fields = Some("dc:identifier,eid,dc:title".to_string());
    let client = ScopusClient::new(config).unwrap();

    let outcome = client.search("AU-ID(100)").await.unwrap();
    assert_eq!(outcome.entries.len(), 1);
}

#[tokio::test]
async fn test_request_delay_between_pages() {
    let server = MockServer::start().await;

    mount_page(&server, 0, page(0, 60, 25, (1..=25).map(entry).collect())).await;
    mount_page(&server, 25, page(25, 60, 25, (26..=50).map(entry).collect())).await;
    mount_page(&server, 50, page(50, 60, 25, (51..=60).map(entry).collect())).await;
    mount_catch_all_unexpected(&server).await;

    let mut config = Config::for_testing(&server.uri());
    config.request_delay = Duration::from_millis(100);
    let client = ScopusClient::new(config).unwrap();

    let started = Instant::now();
    let outcome = client.search("AU-ID(100)").await.unwrap();

    // Two pauses: none before the first page.
    assert!(started.elapsed() >= Duration::from_millis(200));
    assert_eq!(outcome.pages, 3);
    assert_eq!(outcome.entries.len(), 60);
}

// =============================================================================
// Error Handling
// =============================================================================

#[tokio::test]
async fn test_non_success_status_aborts_query() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_string("Invalid API key"))
        .expect(1)
        .mount(&server)
        .await;

    let result = client(&server).search("AU-ID(1)").await;
    match result {
        Err(ScopusError::Api { code, message }) => {
            assert_eq!(code, 401);
            assert!(message.contains("Invalid API key"));
        }
        other => panic!("expected Api error, got {:?}", other.map(|o| o.pages)),
    }
}

#[tokio::test]
async fn test_missing_search_results_aborts_query() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "service-error": {"status": {"statusCode": "INVALID_INPUT"}}
        })))
        .mount(&server)
        .await;

    let result = client(&server).search("AU-ID(1)").await;
    assert!(matches!(result, Err(ScopusError::MissingResults(_))));
}

#[tokio::test]
async fn test_malformed_body_is_parse_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let result = client(&server).search("AU-ID(1)").await;
    assert!(matches!(result, Err(ScopusError::Parse(_))));
}

// =============================================================================
// Harvest Pipeline
// =============================================================================

#[tokio::test]
async fn test_harvest_continues_after_failed_query() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .and(query_param("query", "AU-ID(100)"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .and(query_param("query", "AU-ID(200)"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(page(0, 2, 25, vec![entry(1), entry(2)])),
        )
        .mount(&server)
        .await;

    let blocks = query::parse_id_list("# Lovelace\n100\n# Turing\n200\n");
    let queries = query::build_queries(&blocks, IdentifierKind::AuthorId, None, Grouping::PerOwner);
    assert_eq!(queries.len(), 2);

    let mut writer = RecordWriter::new(Vec::new()).unwrap();
    let summary = pipeline::harvest(&client(&server), &queries, PiPolicy::ReverseScan, &mut writer)
        .await
        .unwrap();
    let records = read_records(&writer.finish().unwrap());

    assert_eq!(summary.failed_queries, 1);
    assert_eq!(summary.written, 2);
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].pi, "Alan Turing");
    assert_eq!(records[0].scopus_link, "https://www.scopus.com/record/1");
    assert_eq!(records[0].abstract_link, "");
}

#[tokio::test]
async fn test_owner_policy_on_combined_query() {
    let server = MockServer::start().await;

    let smith_only = json!({
        "dc:identifier": "SCOPUS_ID:5",
        "eid": "2-s2.0-5",
        "author": [
            {"authid": "300", "given-name": "Grace", "surname": "Hopper"},
            {"authid": "100", "given-name": "Ada", "surname": "Lovelace"}
        ]
    });
    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .and(query_param("query", "AU-ID(100) OR AU-ID(200)"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(page(0, 2, 25, vec![smith_only, entry(1)])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let blocks = query::parse_id_list("# Smith Lab\n100\n# Jones Lab\n200\n");
    let queries = query::build_queries(&blocks, IdentifierKind::AuthorId, None, Grouping::Combined);
    assert_eq!(queries.len(), 1);

    let mut writer = RecordWriter::new(Vec::new()).unwrap();
    pipeline::harvest(&client(&server), &queries, PiPolicy::Owner, &mut writer)
        .await
        .unwrap();
    let records = read_records(&writer.finish().unwrap());

    assert_eq!(records[0].pi, "Smith Lab");
    // Last listed author 200 belongs to the Jones block.
    assert_eq!(records[1].pi, "Jones Lab");
}

#[tokio::test]
async fn test_harvest_dedups_and_collects_missed() {
    let server = MockServer::start().await;

    let broken = json!({"eid": "2-s2.0-77", "dc:identifier": "garbage", "dc:title": "Broken"});
    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(page(0, 4, 25, vec![entry(1), entry(1), broken, entry(2)])),
        )
        .mount(&server)
        .await;

    let queries = vec![query::Query::raw("AFFIL(example)")];
    let mut writer = RecordWriter::new(Vec::new()).unwrap();
    let summary = pipeline::harvest(&client(&server), &queries, PiPolicy::Owner, &mut writer)
        .await
        .unwrap();

    assert_eq!(summary.written, 2);
    assert_eq!(summary.duplicates, 1);
    assert_eq!(summary.missed, vec!["2-s2.0-77".to_string()]);

    let records = read_records(&writer.finish().unwrap());
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].authors, "Ada Lovelace;Alan Turing");
}

#[tokio::test]
async fn test_lookup_uses_row_pi() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .and(query_param("query", "EID(2-s2.0-1)"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(0, 1, 25, vec![entry(1)])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .and(query_param("query", "EID(2-s2.0-2)"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(
            0,
            0,
            0,
            vec![json!({"error": "Result set was empty"})],
        )))
        .mount(&server)
        .await;

    let rows = vec![
        EidRow {
            eid: "2-s2.0-1".to_string(),
            pi: "Grace Hopper".to_string(),
        },
        EidRow {
            eid: "2-s2.0-2".to_string(),
            pi: "Ada Lovelace".to_string(),
        },
    ];
    let mut writer = RecordWriter::new(Vec::new()).unwrap();
    let summary = pipeline::lookup_eids(&client(&server), &rows, &mut writer)
        .await
        .unwrap();
    let records = read_records(&writer.finish().unwrap());

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].pi, "Grace Hopper");
    assert_eq!(summary.missed, vec!["2-s2.0-2,Ada Lovelace".to_string()]);
}

//! Remote annotation client against a mock annotator.

use chrono::{TimeZone, Utc};
use geoannotate::{AnnotationClient, Error};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, Respond, ResponseTemplate};

const RESPONSE: &str = r#"{
    "AnnotatorDate": "2019-01-01T12:00:00Z",
    "Annotations": {
        "84.1.28.246": {
            "Geo": {"country_code": "GB", "city": "London", "latitude": 51.5, "longitude": -0.09},
            "Network": {"CIDR": "84.1.28.0/24", "ASNumber": 5483, "Systems": [{"ASNs": [5483]}]}
        }
    }
}"#;

/// Answers 503 for the first `busy` requests, then 200.
struct BusyResponder {
    count: Arc<AtomicUsize>,
    busy: usize,
}

impl Respond for BusyResponder {
    fn respond(&self, _request: &wiremock::Request) -> ResponseTemplate {
        let count = self.count.fetch_add(1, Ordering::SeqCst);
        if count < self.busy {
            ResponseTemplate::new(503).set_body_string("datasets loading")
        } else {
            ResponseTemplate::new(200).set_body_raw(RESPONSE, "application/json")
        }
    }
}

async fn busy_server(busy: usize) -> (MockServer, Arc<AtomicUsize>) {
    let server = MockServer::start().await;
    let count = Arc::new(AtomicUsize::new(0));
    Mock::given(method("POST"))
        .and(path("/annotate"))
        .and(body_partial_json(serde_json::json!({"RequestType": "Annotate v2.0"})))
        .respond_with(BusyResponder {
            count: count.clone(),
            busy,
        })
        .mount(&server)
        .await;
    (server, count)
}

fn ips() -> Vec<String> {
    vec!["84.1.28.246".to_string()]
}

#[tokio::test]
async fn test_annotate_success() {
    let (server, count) = busy_server(0).await;
    let client = AnnotationClient::new(format!("{}/annotate", server.uri())).unwrap();

    let date = Utc.with_ymd_and_hms(2019, 2, 1, 0, 0, 0).unwrap();
    let response = client
        .annotate(date, ips(), "test", Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(response.annotator_date, Utc.with_ymd_and_hms(2019, 1, 1, 12, 0, 0).unwrap());
    let network = response.annotations["84.1.28.246"].network.as_ref().unwrap();
    assert_eq!(network.as_number, 5483);
    assert_eq!(network.cidr, "84.1.28.0/24");
}

#[tokio::test]
async fn test_retries_while_loading() {
    let (server, count) = busy_server(3).await;
    let client = AnnotationClient::new(format!("{}/annotate", server.uri())).unwrap();

    let response = client
        .annotate(Utc::now(), ips(), "test", Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(count.load(Ordering::SeqCst), 4);
    assert_eq!(response.annotations.len(), 1);
}

#[tokio::test]
async fn test_deadline_expires_while_loading() {
    let (server, count) = busy_server(3).await;
    let client = AnnotationClient::new(format!("{}/annotate", server.uri())).unwrap();

    let result = client
        .annotate(Utc::now(), ips(), "test", Duration::from_secs(2))
        .await;

    assert!(matches!(result, Err(Error::Timeout)));
    assert!(count.load(Ordering::SeqCst) < 4);
}

#[tokio::test]
async fn test_short_retry_delay() {
    let (server, count) = busy_server(3).await;
    let client = AnnotationClient::new(format!("{}/annotate", server.uri()))
        .unwrap()
        .with_retry_delay(Duration::from_millis(20));

    client
        .annotate(Utc::now(), ips(), "test", Duration::from_secs(2))
        .await
        .unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_other_status_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_string("unsupported request type"))
        .expect(1)
        .mount(&server)
        .await;
    let client = AnnotationClient::new(format!("{}/annotate", server.uri())).unwrap();

    let result = client
        .annotate(Utc::now(), ips(), "test", Duration::from_secs(5))
        .await;

    match result {
        Err(Error::HttpStatus { status, body }) => {
            assert_eq!(status, 400);
            assert!(body.contains("unsupported"));
        }
        other => panic!("expected status error, got {:?}", other),
    }
}

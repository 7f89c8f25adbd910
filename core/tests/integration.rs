//! End-to-end tests against the live mock server.
//!
//! # Design
//! Each test starts the mock server on a random port and drives the real
//! `reqwest` transport through `Client`, so request building, session reuse,
//! status classification, decoding and transfers are checked over actual
//! HTTP.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use endpoint_core::{
    BackgroundSession, Client, ClientConfig, CustomSession, Empty, EphemeralSession, KeyStrategy, NetworkError,
    NoopLogger, ProgressEvent, Request, SessionConfiguration, TransportErrorKind,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct User {
    id: u64,
    name: String,
    email: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct NewUser {
    name: String,
    email: String,
}

#[derive(Debug, Serialize)]
struct Search {
    name: String,
    limit: u32,
}

#[derive(Debug, Deserialize)]
struct Receipt {
    size: usize,
}

/// Start the mock server on a random port and return its base URL.
async fn spawn_server() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(mock_server::run(listener));
    format!("http://{addr}")
}

fn client(base_url: &str) -> Client {
    Client::new(
        ClientConfig::builder(base_url)
            .logger(Arc::new(NoopLogger))
            .build(),
    )
}

fn assert_monotonic_fractions<T>(events: &[Result<ProgressEvent<T>, NetworkError>]) {
    let fractions: Vec<f64> = events
        .iter()
        .filter_map(|event| event.as_ref().ok().and_then(ProgressEvent::fraction))
        .collect();
    assert!(fractions.iter().all(|f| (0.0..=1.0).contains(f)), "{fractions:?}");
    assert!(fractions.windows(2).all(|w| w[0] <= w[1]), "{fractions:?}");
}

#[tokio::test]
async fn create_then_fetch_user() {
    let client = client(&spawn_server().await);

    let created: User = client
        .execute(&Request::<User>::post("/users").with_body(NewUser {
            name: "a".to_string(),
            email: "a@test.com".to_string(),
        }))
        .await
        .unwrap();
    assert_eq!(created.id, 1);

    let fetched = client.execute(&Request::<User>::get("/users/1")).await.unwrap();
    assert_eq!(fetched, created);

    let listed = client.execute(&Request::<Vec<User>>::get("/users")).await.unwrap();
    assert_eq!(listed, vec![created]);
}

#[tokio::test]
async fn missing_user_is_not_found_and_delete_returns_empty() {
    let client = client(&spawn_server().await);

    let err = client.execute(&Request::<User>::get("/users/99")).await.unwrap_err();
    assert!(matches!(err, NetworkError::NotFound));

    client
        .execute(&Request::<User>::post("/users").with_body(NewUser {
            name: "b".to_string(),
            email: "b@test.com".to_string(),
        }))
        .await
        .unwrap();
    let deleted: Empty = client.execute(&Request::<Empty>::delete("/users/1")).await.unwrap();
    assert_eq!(deleted, Empty);
}

#[tokio::test]
async fn posting_a_body_to_a_missing_resource_is_not_found() {
    let client = client(&spawn_server().await);
    let err = client
        .execute(&Request::<User>::post("/status/404").with_body(NewUser {
            name: "John".to_string(),
            email: "john@test.com".to_string(),
        }))
        .await
        .unwrap_err();
    assert!(matches!(err, NetworkError::NotFound));
}

#[tokio::test]
async fn statuses_map_to_error_variants() {
    let client = client(&spawn_server().await);
    let cases = [
        (401, "Unauthorized"),
        (403, "Forbidden"),
        (418, "ClientError { status: 418 }"),
        (503, "ServerError { status: 503 }"),
    ];
    for (code, expected) in cases {
        let err = client
            .execute(&Request::<Empty>::get(format!("/status/{code}")))
            .await
            .unwrap_err();
        assert_eq!(format!("{err:?}"), expected);
        assert_eq!(err.is_retryable(), code >= 500);
    }
}

#[tokio::test]
async fn query_is_serialized_into_pairs() {
    let client = client(&spawn_server().await);
    let pairs = client
        .execute(&Request::<Vec<(String, String)>>::get("/search").with_query(Search {
            name: "John".to_string(),
            limit: 10,
        }))
        .await
        .unwrap();
    assert_eq!(pairs.len(), 2);
    assert!(pairs.contains(&("name".to_string(), "John".to_string())));
    assert!(pairs.contains(&("limit".to_string(), "10".to_string())));
}

#[tokio::test]
async fn request_headers_override_client_defaults() {
    let base_url = spawn_server().await;
    let client = Client::new(
        ClientConfig::builder(&base_url)
            .default_header("x-client", "endpoint-core")
            .default_header("x-shared", "client")
            .logger(Arc::new(NoopLogger))
            .build(),
    );

    let echoed = client
        .execute(&Request::<BTreeMap<String, String>>::get("/headers").with_header("x-shared", "request"))
        .await
        .unwrap();
    assert_eq!(echoed["x-client"], "endpoint-core");
    assert_eq!(echoed["x-shared"], "request");
    assert_eq!(echoed["accept"], "application/json");
    assert_eq!(echoed["content-type"], "application/json");
}

#[tokio::test]
async fn key_strategy_applies_on_the_wire() {
    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Profile {
        user_id: u64,
        display_name: String,
    }

    let base_url = spawn_server().await;
    let camel = Client::new(
        ClientConfig::builder(&base_url)
            .key_strategy(KeyStrategy::CamelCaseWire)
            .logger(Arc::new(NoopLogger))
            .build(),
    );
    let profile = Profile {
        user_id: 3,
        display_name: "Grace".to_string(),
    };

    let roundtrip: Profile = camel
        .execute(&Request::<Profile>::post("/echo").with_body(Profile {
            user_id: 3,
            display_name: "Grace".to_string(),
        }))
        .await
        .unwrap();
    assert_eq!(roundtrip, profile);

    #[derive(Serialize)]
    struct Filter {
        display_name: String,
    }
    let pairs = camel
        .execute(&Request::<Vec<(String, String)>>::get("/search").with_query(Filter {
            display_name: "Grace".to_string(),
        }))
        .await
        .unwrap();
    assert_eq!(pairs, vec![("displayName".to_string(), "Grace".to_string())]);
}

#[tokio::test]
async fn unreachable_host_is_a_retryable_transport_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = client(&format!("http://{addr}"));
    let err = client.execute(&Request::<Empty>::get("/users")).await.unwrap_err();
    assert!(matches!(err, NetworkError::Transport(_)), "{err:?}");
    assert!(err.is_retryable());
}

#[tokio::test]
async fn sessions_are_shared_across_calls() {
    let client = client(&spawn_server().await);

    let mut calls = Vec::new();
    for i in 0..8 {
        let client = client.clone();
        calls.push(tokio::spawn(async move {
            client
                .execute(&Request::<User>::post("/users").with_body(NewUser {
                    name: format!("user-{i}"),
                    email: format!("user-{i}@test.com"),
                }))
                .await
        }));
    }
    for call in calls {
        call.await.unwrap().unwrap();
    }
    client
        .execute(&Request::<Vec<User>>::get("/users").with_session(EphemeralSession))
        .await
        .unwrap();

    assert_eq!(client.sessions().len().await, 2);
}

#[tokio::test]
async fn download_writes_the_file_and_completes_once() {
    let client = client(&spawn_server().await);
    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("download.bin");

    let events: Vec<_> = client
        .download(&Request::<Empty>::get("/files/1024"), &destination)
        .collect()
        .await;

    let completions = events
        .iter()
        .filter(|event| matches!(event, Ok(ProgressEvent::Completed(_))))
        .count();
    assert_eq!(completions, 1);
    assert!(matches!(events.last(), Some(Ok(ProgressEvent::Completed(path))) if *path == destination));
    assert_monotonic_fractions(&events);
    assert_eq!(std::fs::read(&destination).unwrap(), mock_server::file_contents(1024));
}

#[tokio::test]
async fn failed_download_ends_with_the_error() {
    let client = client(&spawn_server().await);
    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("missing.bin");

    let result = client
        .download(&Request::<Empty>::get("/status/404"), &destination)
        .completion()
        .await;
    assert!(matches!(result, Err(NetworkError::NotFound)));
    assert!(!destination.exists());
}

#[tokio::test]
async fn dropping_a_download_leaves_no_destination_file() {
    let client = client(&spawn_server().await);
    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("partial.bin");

    let mut transfer = client.download(&Request::<Empty>::get("/slow/40"), &destination);
    let first = transfer.next().await.unwrap().unwrap();
    assert!(matches!(first, ProgressEvent::Progress(f) if f < 1.0));
    drop(transfer);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!destination.exists());
}

#[tokio::test]
async fn upload_streams_the_file_and_decodes_the_receipt() {
    let client = client(&spawn_server().await);
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("upload.bin");
    std::fs::write(&source, mock_server::file_contents(200_000)).unwrap();

    let request = Request::<Receipt>::post("/uploads")
        .with_header("Content-Type", "application/octet-stream")
        .with_session(BackgroundSession::new("uploads"));
    let events: Vec<_> = client.upload(&request, &source).collect().await;

    assert_monotonic_fractions(&events);
    match events.last() {
        Some(Ok(ProgressEvent::Completed(receipt))) => assert_eq!(receipt.size, 200_000),
        other => panic!("unexpected terminal event: {other:?}"),
    }
    assert!(events[..events.len() - 1]
        .iter()
        .all(|event| matches!(event, Ok(ProgressEvent::Progress(_)))));
}

#[tokio::test]
async fn cancelling_a_slow_execute_returns_promptly() {
    let client = client(&spawn_server().await);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let err = client
        .execute_cancellable(&Request::<Empty>::get("/slow/40"), &cancel)
        .await
        .unwrap_err();
    assert!(
        matches!(err, NetworkError::Transport(ref e) if e.kind == TransportErrorKind::Cancelled),
        "{err:?}"
    );
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn dropping_an_upload_records_nothing() {
    let client = client(&spawn_server().await);
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("large.bin");
    std::fs::write(&source, mock_server::file_contents(32 << 20)).unwrap();

    let request = Request::<Receipt>::post("/uploads/slow")
        .with_header("Content-Type", "application/octet-stream");
    let mut transfer = client.upload(&request, &source);
    let first = transfer.next().await.unwrap().unwrap();
    assert!(matches!(first, ProgressEvent::Progress(f) if f < 1.0));
    drop(transfer);

    tokio::time::sleep(Duration::from_millis(500)).await;
    let stored = client
        .execute(&Request::<Vec<serde_json::Value>>::get("/uploads"))
        .await
        .unwrap();
    assert!(stored.is_empty(), "{stored:?}");
}

#[tokio::test]
async fn session_timeout_bounds_requests_but_not_downloads() {
    let client = client(&spawn_server().await);
    let session = CustomSession::new(
        "short-timeout",
        SessionConfiguration::default_config().with_timeout(Duration::from_millis(200)),
    );

    let err = client
        .execute(&Request::<Empty>::get("/slow/10").with_session(session.clone()))
        .await
        .unwrap_err();
    assert!(
        matches!(err, NetworkError::Transport(ref e) if e.kind == TransportErrorKind::Timeout),
        "{err:?}"
    );

    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("slow.bin");
    let saved = client
        .download(&Request::<Empty>::get("/slow/10").with_session(session), &destination)
        .completion()
        .await
        .unwrap();
    assert_eq!(saved, destination);
    assert_eq!(
        std::fs::metadata(&destination).unwrap().len(),
        10 * mock_server::SLOW_CHUNK as u64
    );
}

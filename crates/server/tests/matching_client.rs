use std::time::Duration;

use httpmock::prelude::*;
use jobboard_server::matching::{MatchingClient, MatchingError, RemoteMatch, RetryPolicy};
use serde_json::json;

fn client(server: &MockServer, retries: u32) -> MatchingClient {
    MatchingClient::with_policy(
        &server.base_url(),
        Duration::from_secs(2),
        RetryPolicy::new(retries, 1, 2),
    )
    .unwrap()
}

#[tokio::test]
async fn health_succeeds_on_2xx() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/health");
            then.status(200).json_body(json!({"status": "ok"}));
        })
        .await;

    client(&server, 0).health().await.unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn spanish_match_payload_is_decoded() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/candidatos/7/matches");
            then.status(200).json_body(json!([
                {"vacante_id": 3, "porcentaje": 87.5},
                {"vacante_id": 4, "porcentaje": 40}
            ]));
        })
        .await;

    let matches = client(&server, 0).candidate_matches(7).await.unwrap();
    assert_eq!(
        matches,
        vec![
            RemoteMatch { vacancy_id: 3, percentage: 87.5 },
            RemoteMatch { vacancy_id: 4, percentage: 40.0 },
        ]
    );
}

#[tokio::test]
async fn wrapped_english_payload_is_decoded() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/candidatos/2/matches");
            then.status(200)
                .json_body(json!({"matches": [{"vacancy_id": 9, "score": 61.0}]}));
        })
        .await;

    let matches = client(&server, 0).candidate_matches(2).await.unwrap();
    assert_eq!(matches, vec![RemoteMatch { vacancy_id: 9, percentage: 61.0 }]);
}

#[tokio::test]
async fn server_errors_are_retried() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/candidatos/1/matches");
            then.status(503).body("down");
        })
        .await;

    let err = client(&server, 2).candidate_matches(1).await.unwrap_err();
    assert!(matches!(err, MatchingError::Status { status: 503, .. }), "{err}");
    assert_eq!(mock.hits_async().await, 3);
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/candidatos/1/matches");
            then.status(404).body("no such candidate");
        })
        .await;

    let err = client(&server, 3).candidate_matches(1).await.unwrap_err();
    assert!(matches!(err, MatchingError::Status { status: 404, .. }), "{err}");
    assert_eq!(mock.hits_async().await, 1);
}

#[tokio::test]
async fn garbage_payload_is_a_decode_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/candidatos/5/matches");
            then.status(200).body("<html>oops</html>");
        })
        .await;

    let err = client(&server, 3).candidate_matches(5).await.unwrap_err();
    assert!(matches!(err, MatchingError::Decode(_)), "{err}");
}

#[tokio::test]
async fn cv_upload_posts_multipart_file() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/candidatos/11/upload-cv")
                .header_exists("content-type")
                .body_contains("name=\"file\"")
                .body_contains("filename=\"resume.pdf\"");
            then.status(200).json_body(json!({"mensaje": "procesado"}));
        })
        .await;

    let reply = client(&server, 0)
        .upload_cv(11, "resume.pdf", "application/pdf", b"%PDF-1.4 test".to_vec())
        .await
        .unwrap();
    mock.assert_async().await;
    assert_eq!(reply.message.as_deref(), Some("procesado"));
}

#[tokio::test]
async fn unreachable_service_is_a_connect_error() {
    let client = MatchingClient::with_policy(
        "http://127.0.0.1:9",
        Duration::from_secs(2),
        RetryPolicy::none(),
    )
    .unwrap();
    let err = client.health().await.unwrap_err();
    assert!(matches!(err, MatchingError::Connect(_) | MatchingError::Timeout), "{err}");
}

use std::time::Duration;

use chrono::{TimeZone, Utc};
use log_digest::analyzer::Analyzer;
use log_digest::config::Config;
use log_digest::error::AnalysisError;
use log_digest::metrics::ANALYSIS_RETRIES;
use log_digest::schema::{Conversation, Direction, LogEntry, Sentiment};
use serde_json::{json, Value};
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(server_url: &str, max_retries: u32) -> Config {
    Config {
        openai_base_url: server_url.to_string(),
        openai_key: "sk-test".to_string(),
        analysis_max_retries: max_retries,
        analysis_retry_base_ms: 1,
        analysis_concurrency: 3,
        http_timeout_secs: 5,
        ..Config::default()
    }
}

fn conversation(id: &str, user: &str) -> Conversation {
    Conversation {
        id: id.to_string(),
        user_id: user.to_string(),
        entries: vec![
            LogEntry {
                user_id: user.to_string(),
                timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap(),
                direction: Direction::User,
                text: "My package never arrived".to_string(),
                log_id: Some(format!("log_{user}")),
                source: Some("production".to_string()),
            },
            LogEntry {
                user_id: user.to_string(),
                timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap(),
                direction: Direction::Bot,
                text: "I've opened a claim for you.".to_string(),
                log_id: Some(format!("log_{user}")),
                source: Some("production".to_string()),
            },
        ],
    }
}

fn completion(payload: Value) -> Value {
    json!({
        "id": "chatcmpl-test",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": payload.to_string() },
            "finish_reason": "stop"
        }]
    })
}

fn ok_payload(sentiment: &str, theme: &str) -> Value {
    json!({
        "sentiment": sentiment,
        "pain_points": [{ "text": "Package missing", "log_id": "log_u1" }],
        "highlights": [],
        "themes": [theme]
    })
}

#[tokio::test]
async fn test_analyze_sends_transcript_and_parses_result() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_string_contains("User (log_u1): My package never arrived"))
        .and(body_string_contains("json_object"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(ok_payload("negative", "shipping"))))
        .expect(1)
        .mount(&server)
        .await;

    let analyzer = Analyzer::new(&test_config(&server.uri(), 0)).unwrap();
    let result = analyzer.analyze(&conversation("conv_1", "u1")).await.unwrap();

    assert_eq!(result.conversation_id, "conv_1");
    assert_eq!(result.sentiment, Sentiment::Negative);
    assert_eq!(result.themes, ["shipping"]);
    assert_eq!(result.pain_points[0].log_id.as_deref(), Some("log_u1"));
}

#[tokio::test]
async fn test_rate_limit_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(ok_payload("positive", "billing"))))
        .expect(1)
        .mount(&server)
        .await;

    let analyzer = Analyzer::new(&test_config(&server.uri(), 3)).unwrap();
    let result = analyzer.analyze(&conversation("conv_1", "u1")).await.unwrap();
    assert_eq!(result.sentiment, Sentiment::Positive);
}

#[tokio::test]
async fn test_retries_are_bounded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(3)
        .mount(&server)
        .await;

    let analyzer = Analyzer::new(&test_config(&server.uri(), 2)).unwrap();
    let err = analyzer.analyze(&conversation("conv_1", "u1")).await.unwrap_err();
    assert!(matches!(err, AnalysisError::Status { status: 500, .. }));
}

#[tokio::test]
async fn test_timeout_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(completion(ok_payload("negative", "slow")))
                .set_delay(Duration::from_secs(3)),
        )
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(ok_payload("positive", "fast"))))
        .expect(1)
        .mount(&server)
        .await;

    let cfg = Config {
        http_timeout_secs: 1,
        ..test_config(&server.uri(), 1)
    };
    let analyzer = Analyzer::new(&cfg).unwrap();
    let result = analyzer.analyze(&conversation("conv_1", "u1")).await.unwrap();
    assert_eq!(result.themes, ["fast"]);
}

#[tokio::test]
async fn test_connection_refused_is_retried_then_reported() {
    let retries_before = ANALYSIS_RETRIES.get();
    let analyzer = Analyzer::new(&test_config("http://127.0.0.1:1", 2)).unwrap();
    let err = analyzer.analyze(&conversation("conv_1", "u1")).await.unwrap_err();

    assert!(matches!(err, AnalysisError::Http(ref e) if e.is_connect()));
    assert!(ANALYSIS_RETRIES.get() - retries_before >= 2.0);
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
        .expect(1)
        .mount(&server)
        .await;

    let analyzer = Analyzer::new(&test_config(&server.uri(), 3)).unwrap();
    let err = analyzer.analyze(&conversation("conv_1", "u1")).await.unwrap_err();
    assert!(matches!(err, AnalysisError::Status { status: 400, .. }));
}

#[tokio::test]
async fn test_incomplete_response_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(completion(json!({ "sentiment": "positive", "themes": [] }))),
        )
        .mount(&server)
        .await;

    let analyzer = Analyzer::new(&test_config(&server.uri(), 3)).unwrap();
    let err = analyzer.analyze(&conversation("conv_1", "u1")).await.unwrap_err();
    assert!(matches!(err, AnalysisError::Malformed(_)));
}

#[tokio::test]
async fn test_analyze_all_keeps_conversation_order_and_collects_failures() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("Conversation conv_2"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("Conversation conv_1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(completion(ok_payload("neutral", "first")))
                .set_delay(Duration::from_millis(200)),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("Conversation conv_3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(ok_payload("positive", "third"))))
        .mount(&server)
        .await;

    let analyzer = Analyzer::new(&test_config(&server.uri(), 0)).unwrap();
    let conversations = vec![
        conversation("conv_1", "u1"),
        conversation("conv_2", "u2"),
        conversation("conv_3", "u3"),
    ];
    let batch = analyzer.analyze_all(&conversations).await;

    let ids: Vec<_> = batch.results.iter().map(|r| r.conversation_id.as_str()).collect();
    assert_eq!(ids, ["conv_1", "conv_3"]);
    assert_eq!(batch.failures.len(), 1);
    assert_eq!(batch.failures[0].conversation_id, "conv_2");
}

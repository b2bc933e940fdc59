use pipeline::{PlatformName, TargetId, TargetType};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::*;

fn message() -> OutboundMessage {
    OutboundMessage {
        platform: PlatformName::new("telegram").unwrap(),
        target_type: TargetType::Group,
        target_id: TargetId::new("team").unwrap(),
        text: "[GitHub] Push to octo/hello".to_string(),
    }
}

fn messenger(server: &MockServer, max_retries: u32) -> HttpMessenger {
    HttpMessenger::new(GatewayConfig {
        url: server.uri(),
        token: Some("gw-token".to_string()),
        timeout: Duration::from_secs(5),
        max_retries,
        backoff: Duration::from_millis(1),
    })
    .unwrap()
}

#[tokio::test]
async fn posts_message_with_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/send"))
        .and(header("authorization", "Bearer gw-token"))
        .and(body_json(json!({
            "platform": "telegram",
            "target_type": "group",
            "target_id": "team",
            "text": "[GitHub] Push to octo/hello",
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    messenger(&server, 3).send(&message()).await.unwrap();
}

#[tokio::test]
async fn server_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/send"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/send"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    messenger(&server, 3).send(&message()).await.unwrap();
}

#[tokio::test]
async fn retries_are_bounded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("down"))
        .expect(3)
        .mount(&server)
        .await;

    let err = messenger(&server, 2).send(&message()).await.unwrap_err();
    assert!(matches!(err, SendError::Rejected { status: 500, ref message } if message == "down"));
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_string("unknown chat"))
        .expect(1)
        .mount(&server)
        .await;

    let err = messenger(&server, 3).send(&message()).await.unwrap_err();
    assert_eq!(err.retry_policy(), RetryPolicy::NonRetryable);
}

#[tokio::test]
async fn unreachable_gateway_is_a_transport_error() {
    let messenger = HttpMessenger::new(GatewayConfig {
        max_retries: 1,
        backoff: Duration::from_millis(1),
        ..GatewayConfig::new("http://127.0.0.1:1")
    })
    .unwrap();

    let err = messenger.send(&message()).await.unwrap_err();
    assert!(matches!(err, SendError::Transport { .. }));
}

#[test]
fn endpoint_keeps_the_base_path() {
    let m = HttpMessenger::new(GatewayConfig::new("https://gw.example.com/api/")).unwrap();
    assert_eq!(m.endpoint().as_str(), "https://gw.example.com/api/send");
}

#[test]
fn invalid_url_is_rejected() {
    let err = HttpMessenger::new(GatewayConfig::new("not a url")).unwrap_err();
    assert!(matches!(err, GatewayError::InvalidUrl { .. }));
}

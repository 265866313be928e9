//! `HttpPresenceAdapter` integration tests against a wiremock upstream.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use common::secret::SecretString;
use pk_test_utils::fixtures::{
    envelope_body, identity_body, not_logged_in_body, ok_body, token_body,
};
use presence_keeper::config::Config;
use presence_keeper::errors::PkError;
use presence_keeper::models::ExternalIdentity;
use presence_keeper::services::{HttpPresenceAdapter, PresenceAdapter};
use std::collections::HashMap;
use std::time::Duration;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn adapter_for(server: &MockServer, extra: &[(&str, &str)]) -> HttpPresenceAdapter {
    let mut vars = HashMap::from([("UPSTREAM_BASE_URL".to_string(), server.uri())]);
    for (key, value) in extra {
        vars.insert((*key).to_string(), (*value).to_string());
    }
    let config = Config::from_vars(&vars).expect("config should load");
    HttpPresenceAdapter::new(&config).expect("adapter should build")
}

fn cookie() -> SecretString {
    SecretString::from("sid=abc123")
}

fn identity() -> ExternalIdentity {
    ExternalIdentity {
        user_id: "10001".to_string(),
        display_name: "tester".to_string(),
    }
}

fn jsonp_ok(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_string(body)
}

async fn mount_default_pipeline(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/Chatroom/getRoomInfo"))
        .respond_with(jsonp_ok(ok_body()))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/Chatroom/getToken"))
        .and(query_param("cid", "25293"))
        .respond_with(jsonp_ok(token_body("tok-1")))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/Chatroom/join"))
        .and(body_string_contains("token=tok-1"))
        .respond_with(jsonp_ok(ok_body()))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/Chatroom/refreshMembers"))
        .respond_with(jsonp_ok(ok_body()))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/Chatroom/reportOnline"))
        .respond_with(jsonp_ok(ok_body()))
        .mount(server)
        .await;
}

// ============================================================================
// Identity lookup
// ============================================================================

#[tokio::test]
async fn test_lookup_identity_sends_cookie_and_parses_user() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/Chatroom/getuserinfo"))
        .and(header("cookie", "sid=abc123"))
        .respond_with(jsonp_ok(identity_body("10290613", "night-owl")))
        .expect(1)
        .mount(&server)
        .await;

    let identity = adapter_for(&server, &[])
        .lookup_identity(&cookie())
        .await
        .unwrap();

    assert_eq!(identity.user_id, "10290613");
    assert_eq!(identity.display_name, "night-owl");
}

#[tokio::test]
async fn test_lookup_identity_sends_browser_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/Chatroom/getuserinfo"))
        .and(header("user-agent", "pk-test-agent"))
        .and(header("referer", format!("{}/", server.uri()).as_str()))
        .respond_with(jsonp_ok(identity_body("1", "A")))
        .expect(1)
        .mount(&server)
        .await;

    let result = adapter_for(&server, &[("BROWSER_USER_AGENT", "pk-test-agent")])
        .lookup_identity(&cookie())
        .await;

    assert!(result.is_ok(), "unexpected {result:?}");
}

#[tokio::test]
async fn test_lookup_identity_not_logged_in_is_remote_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/Chatroom/getuserinfo"))
        .respond_with(jsonp_ok(not_logged_in_body()))
        .mount(&server)
        .await;

    let result = adapter_for(&server, &[]).lookup_identity(&cookie()).await;

    assert!(matches!(result, Err(PkError::Remote { code: 401, .. })));
}

#[tokio::test]
async fn test_lookup_identity_without_jsonp_wrapper_is_parse_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/Chatroom/getuserinfo"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>login</html>"))
        .mount(&server)
        .await;

    let result = adapter_for(&server, &[]).lookup_identity(&cookie()).await;

    assert!(matches!(result, Err(PkError::Parse(_))));
}

#[tokio::test]
async fn test_lookup_identity_http_error_is_remote_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/Chatroom/getuserinfo"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let result = adapter_for(&server, &[]).lookup_identity(&cookie()).await;

    assert!(matches!(result, Err(PkError::Remote { code: 503, .. })));
}

#[tokio::test]
async fn test_slow_upstream_is_network_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/Chatroom/getuserinfo"))
        .respond_with(jsonp_ok(identity_body("1", "A")).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let result = adapter_for(&server, &[("UPSTREAM_TIMEOUT_SECONDS", "1")])
        .lookup_identity(&cookie())
        .await;

    assert!(matches!(result, Err(PkError::Network(_))));
}

#[tokio::test]
async fn test_unreachable_upstream_is_network_error() {
    let vars = HashMap::from([(
        "UPSTREAM_BASE_URL".to_string(),
        "http://127.0.0.1:1".to_string(),
    )]);
    let config = Config::from_vars(&vars).unwrap();
    let adapter = HttpPresenceAdapter::new(&config).unwrap();

    let result = adapter.lookup_identity(&cookie()).await;

    assert!(matches!(result, Err(PkError::Network(_))));
}

// ============================================================================
// Join pipeline
// ============================================================================

#[tokio::test]
async fn test_join_room_runs_default_pipeline() {
    let server = MockServer::start().await;
    mount_default_pipeline(&server).await;

    let outcome = adapter_for(&server, &[])
        .join_room("25293", &cookie(), &identity())
        .await
        .unwrap();

    assert_eq!(outcome.values.get("token").map(String::as_str), Some("tok-1"));
    assert!(outcome.reported());
    assert!(outcome.failed_steps.is_empty());
    assert_eq!(
        outcome.completed_steps,
        vec![
            "room_info",
            "issue_token",
            "join",
            "refresh_membership",
            "report_presence"
        ]
    );
}

#[tokio::test]
async fn test_join_room_tolerates_optional_step_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/Chatroom/refreshMembers"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    mount_default_pipeline(&server).await;

    let outcome = adapter_for(&server, &[])
        .join_room("25293", &cookie(), &identity())
        .await
        .unwrap();

    assert_eq!(outcome.failed_steps, vec!["refresh_membership"]);
    assert!(outcome.reported());
}

#[tokio::test]
async fn test_join_room_aborts_on_required_step_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/Chatroom/getToken"))
        .respond_with(jsonp_ok(envelope_body(500, "room closed")))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/Chatroom/join"))
        .respond_with(jsonp_ok(ok_body()))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/Chatroom/getRoomInfo"))
        .respond_with(jsonp_ok(ok_body()))
        .mount(&server)
        .await;

    let result = adapter_for(&server, &[])
        .join_room("25293", &cookie(), &identity())
        .await;

    assert!(matches!(result, Err(PkError::Remote { code: 500, .. })));
}

#[tokio::test]
async fn test_join_room_uses_configured_pipeline() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/enter"))
        .and(body_string_contains("cid=25293"))
        .and(body_string_contains("uid=10001"))
        .respond_with(jsonp_ok(ok_body()))
        .expect(1)
        .mount(&server)
        .await;

    let pipeline = r#"[{"name":"enter","method":"POST","url":"/enter","required":true}]"#;
    let outcome = adapter_for(&server, &[("BOOTSTRAP_PIPELINE", pipeline)])
        .join_room("25293", &cookie(), &identity())
        .await
        .unwrap();

    assert_eq!(outcome.completed_steps, vec!["enter"]);
    assert!(!outcome.reported());
}

// ============================================================================
// Ping and report
// ============================================================================

#[tokio::test]
async fn test_ping_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/Activitymanagement/activity"))
        .and(query_param("cid", "25293"))
        .and(header("cookie", "sid=abc123"))
        .respond_with(jsonp_ok(ok_body()))
        .expect(1)
        .mount(&server)
        .await;

    let alive = adapter_for(&server, &[])
        .ping("25293", &cookie())
        .await
        .unwrap();

    assert!(alive);
}

#[tokio::test]
async fn test_ping_expired_envelope_returns_false() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/Activitymanagement/activity"))
        .respond_with(jsonp_ok(not_logged_in_body()))
        .mount(&server)
        .await;

    let alive = adapter_for(&server, &[])
        .ping("25293", &cookie())
        .await
        .unwrap();

    assert!(!alive);
}

#[tokio::test]
async fn test_ping_unauthorized_status_returns_false() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/Activitymanagement/activity"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let alive = adapter_for(&server, &[])
        .ping("25293", &cookie())
        .await
        .unwrap();

    assert!(!alive);
}

#[tokio::test]
async fn test_ping_non_jsonp_body_counts_as_alive() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/Activitymanagement/activity"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let alive = adapter_for(&server, &[])
        .ping("25293", &cookie())
        .await
        .unwrap();

    assert!(alive);
}

#[tokio::test]
async fn test_ping_server_error_is_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/Activitymanagement/activity"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let result = adapter_for(&server, &[]).ping("25293", &cookie()).await;

    assert!(matches!(result, Err(PkError::Remote { code: 500, .. })));
}

#[tokio::test]
async fn test_report_posts_room_and_user() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/Chatroom/reportOnline"))
        .and(body_string_contains("cid=25293"))
        .and(body_string_contains("uid=10001"))
        .respond_with(jsonp_ok(ok_body()))
        .expect(1)
        .mount(&server)
        .await;

    let accepted = adapter_for(&server, &[])
        .report("25293", "10001")
        .await
        .unwrap();

    assert!(accepted);
}

#[tokio::test]
async fn test_report_http_error_returns_false() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/Chatroom/reportOnline"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let accepted = adapter_for(&server, &[])
        .report("25293", "10001")
        .await
        .unwrap();

    assert!(!accepted);
}

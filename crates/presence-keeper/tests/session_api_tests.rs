//! Session API integration tests.
//!
//! Drives `/api/update-config`, `/api/update-cookie` and `/api/status`
//! through the real router with a scripted upstream adapter.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use pk_test_utils::TestPkServer;
use presence_keeper::errors::PkError;
use presence_keeper::services::upstream::mock::MockPresenceAdapter;
use presence_keeper::services::TickOutcome;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

async fn post_json(
    server: &TestPkServer,
    path: &str,
    body: &Value,
) -> Result<(u16, Value), anyhow::Error> {
    let response = reqwest::Client::new()
        .post(format!("{}{}", server.url(), path))
        .json(body)
        .send()
        .await?;
    let status = response.status().as_u16();
    Ok((status, response.json().await?))
}

async fn get_status(server: &TestPkServer) -> Result<Value, anyhow::Error> {
    Ok(reqwest::get(format!("{}/api/status", server.url()))
        .await?
        .json()
        .await?)
}

#[tokio::test]
async fn test_status_before_configuration() -> Result<(), anyhow::Error> {
    let server = TestPkServer::spawn(Arc::new(MockPresenceAdapter::succeeding())).await?;

    let status = get_status(&server).await?;

    assert_eq!(status["isConnected"], false);
    assert_eq!(status["retryCount"], 0);
    assert!(status["roomId"].is_null());
    assert!(status["userId"].is_null());
    assert!(status["lastHeartbeat"].is_null());
    assert!(status["startTime"].is_string());
    assert!(status["uptime"].as_i64().is_some_and(|u| u >= 0));

    Ok(())
}

#[tokio::test]
async fn test_update_config_connects_session() -> Result<(), anyhow::Error> {
    let adapter = Arc::new(MockPresenceAdapter::succeeding());
    let server = TestPkServer::spawn(Arc::clone(&adapter)).await?;

    let (status, body) = post_json(
        &server,
        "/api/update-config",
        &json!({"roomId": "25293", "cookie": "validCookie"}),
    )
    .await?;

    assert_eq!(status, 200);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["isConnected"], true);
    assert_eq!(body["data"]["roomId"], "25293");
    assert_eq!(body["data"]["userId"], "10001");
    assert_eq!(body["data"]["nickname"], "tester");
    assert!(!body.to_string().contains("validCookie"));

    let snapshot = get_status(&server).await?;
    assert_eq!(snapshot["isConnected"], true);
    assert_eq!(snapshot["retryCount"], 0);
    assert_eq!(snapshot["roomId"], "25293");
    assert_eq!(adapter.join_count(), 1);

    server.controller().shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_update_config_rejects_blank_fields() -> Result<(), anyhow::Error> {
    let adapter = Arc::new(MockPresenceAdapter::succeeding());
    let server = TestPkServer::spawn(Arc::clone(&adapter)).await?;

    for body in [
        json!({"roomId": "", "cookie": "validCookie"}),
        json!({"roomId": "25293", "cookie": "   "}),
        json!({"roomId": "25293"}),
        json!({}),
    ] {
        let (status, response) = post_json(&server, "/api/update-config", &body).await?;
        assert_eq!(status, 400, "body {body} should be rejected");
        assert_eq!(response["success"], false);
        assert!(response["message"].is_string());
    }

    let snapshot = get_status(&server).await?;
    assert_eq!(snapshot["isConnected"], false);
    assert!(snapshot["roomId"].is_null());
    assert_eq!(adapter.lookup_count(), 0);

    Ok(())
}

#[tokio::test]
async fn test_update_config_malformed_json_returns_400() -> Result<(), anyhow::Error> {
    let server = TestPkServer::spawn(Arc::new(MockPresenceAdapter::succeeding())).await?;

    let response = reqwest::Client::new()
        .post(format!("{}/api/update-config", server.url()))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await?;

    assert_eq!(response.status(), 400);
    let body: Value = response.json().await?;
    assert_eq!(body["success"], false);
    assert!(body["message"].is_string());

    Ok(())
}

#[tokio::test]
async fn test_update_cookie_without_content_type_returns_json_400() -> Result<(), anyhow::Error> {
    let server = TestPkServer::spawn(Arc::new(MockPresenceAdapter::succeeding())).await?;

    let response = reqwest::Client::new()
        .post(format!("{}/api/update-cookie", server.url()))
        .body(r#"{"cookie":"validCookie"}"#)
        .send()
        .await?;

    assert_eq!(response.status(), 400);
    let body: Value = response.json().await?;
    assert_eq!(body["success"], false);

    Ok(())
}

#[tokio::test]
async fn test_update_config_rejected_credential_returns_401() -> Result<(), anyhow::Error> {
    let server = TestPkServer::spawn(Arc::new(MockPresenceAdapter::rejecting_identity(
        "not logged in",
    )))
    .await?;

    let (status, body) = post_json(
        &server,
        "/api/update-config",
        &json!({"roomId": "25293", "cookie": "expiredCookie"}),
    )
    .await?;

    assert_eq!(status, 401);
    assert_eq!(body["success"], false);
    assert!(body["message"]
        .as_str()
        .is_some_and(|m| m.contains("not logged in")));
    assert!(!body.to_string().contains("expiredCookie"));

    let snapshot = get_status(&server).await?;
    assert_eq!(snapshot["isConnected"], false);

    Ok(())
}

#[tokio::test]
async fn test_update_config_join_network_failure_returns_504() -> Result<(), anyhow::Error> {
    let adapter = Arc::new(
        MockPresenceAdapter::succeeding().with_join_result(Err(PkError::Network(
            "upstream request timed out".to_string(),
        ))),
    );
    let server = TestPkServer::spawn(adapter).await?;

    let (status, body) = post_json(
        &server,
        "/api/update-config",
        &json!({"roomId": "25293", "cookie": "validCookie"}),
    )
    .await?;

    assert_eq!(status, 504);
    assert_eq!(body["success"], false);

    let snapshot = get_status(&server).await?;
    assert_eq!(snapshot["isConnected"], false);
    assert_eq!(snapshot["roomId"], "25293");

    Ok(())
}

#[tokio::test]
async fn test_update_cookie_requires_known_room() -> Result<(), anyhow::Error> {
    let server = TestPkServer::spawn(Arc::new(MockPresenceAdapter::succeeding())).await?;

    let (status, body) =
        post_json(&server, "/api/update-cookie", &json!({"cookie": "validCookie"})).await?;

    assert_eq!(status, 400);
    assert_eq!(body["success"], false);

    Ok(())
}

#[tokio::test]
async fn test_update_cookie_keeps_current_room() -> Result<(), anyhow::Error> {
    let adapter = Arc::new(MockPresenceAdapter::succeeding());
    let server = TestPkServer::spawn(Arc::clone(&adapter)).await?;

    post_json(
        &server,
        "/api/update-config",
        &json!({"roomId": "25293", "cookie": "validCookie"}),
    )
    .await?;

    let (status, body) =
        post_json(&server, "/api/update-cookie", &json!({"cookie": "freshCookie"})).await?;

    assert_eq!(status, 200);
    assert_eq!(body["data"]["roomId"], "25293");
    assert_eq!(body["data"]["isConnected"], true);
    assert_eq!(adapter.lookup_count(), 2);

    server.controller().shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_update_cookie_falls_back_to_default_room() -> Result<(), anyhow::Error> {
    let server = TestPkServer::spawn_with_vars(
        Arc::new(MockPresenceAdapter::succeeding()),
        HashMap::from([("DEFAULT_ROOM_ID".to_string(), "25293".to_string())]),
    )
    .await?;

    let (status, body) =
        post_json(&server, "/api/update-cookie", &json!({"cookie": "validCookie"})).await?;

    assert_eq!(status, 200);
    assert_eq!(body["data"]["roomId"], "25293");

    server.controller().shutdown().await;
    Ok(())
}

/// Room 25293: connect, fail three keep-alive ticks, observe exactly one
/// re-join and a healthy session afterwards.
#[tokio::test]
async fn test_room_25293_reconnects_after_max_retries() -> Result<(), anyhow::Error> {
    let adapter = Arc::new(MockPresenceAdapter::succeeding());
    let server = TestPkServer::spawn(Arc::clone(&adapter)).await?;

    let (status, _) = post_json(
        &server,
        "/api/update-config",
        &json!({"roomId": "25293", "cookie": "validCookie"}),
    )
    .await?;
    assert_eq!(status, 200);

    adapter
        .push_ping_results(vec![
            Err(PkError::Network("down".to_string())),
            Err(PkError::Network("down".to_string())),
            Err(PkError::Network("down".to_string())),
        ])
        .await;

    let controller = server.controller();
    assert_eq!(
        controller.tick().await,
        TickOutcome::Degraded { retry_count: 1 }
    );
    assert_eq!(get_status(&server).await?["retryCount"], 1);
    assert_eq!(
        controller.tick().await,
        TickOutcome::Degraded { retry_count: 2 }
    );
    assert_eq!(controller.tick().await, TickOutcome::Reconnected);
    assert_eq!(adapter.join_count(), 2);

    let snapshot = get_status(&server).await?;
    assert_eq!(snapshot["isConnected"], true);
    assert_eq!(snapshot["retryCount"], 0);
    assert_eq!(snapshot["roomId"], "25293");
    assert_eq!(snapshot["userId"], "10001");

    assert_eq!(controller.tick().await, TickOutcome::Healthy);
    assert!(get_status(&server).await?["lastHeartbeat"].is_string());

    controller.shutdown().await;
    Ok(())
}

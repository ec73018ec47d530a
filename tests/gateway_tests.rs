mod common;

use common::*;
use helpdesk_client::identity::TokenStore;
use helpdesk_client::{ApiError, RequestDescriptor};

#[tokio::test]
async fn stored_token_is_sent_as_bearer() {
    let (backend, base) = spawn_backend().await;
    backend.grant("tok123", alice());
    let h = harness(config_for(&base), Some("tok123"));

    let devices = h.client.api().admin_devices().await.expect("list devices");
    assert_eq!(devices.len(), 2);
    assert_eq!(backend.auth_headers(ADMIN_DEVICES), vec![Some("Bearer tok123".to_string())]);
    assert_eq!(h.nav.history(), Vec::<String>::new());
}

#[tokio::test]
async fn no_token_means_no_authorization_header() {
    let (backend, base) = spawn_backend().await;
    let h = harness(config_for(&base), None);

    let err = h.client.gateway().send(RequestDescriptor::get("/api/v1/devices/admin/devices")).await.unwrap_err();
    assert!(err.is_unauthorized());
    assert_eq!(backend.auth_headers(ADMIN_DEVICES), vec![None]);
}

#[tokio::test]
async fn rejected_credential_is_cleared_and_login_forced() {
    let (backend, base) = spawn_backend().await;
    // "expired" was never granted, so the backend answers 401
    let h = harness(config_for(&base), Some("expired"));

    let err = h.client.api().admin_devices().await.unwrap_err();
    assert!(matches!(err, ApiError::Unauthorized { .. }));
    assert_eq!(h.store.get(), None);
    assert_eq!(h.nav.current().as_deref(), Some("/login"));
    assert_eq!(backend.auth_headers(ADMIN_DEVICES), vec![Some("Bearer expired".to_string())]);
}

#[tokio::test]
async fn concurrent_rejections_navigate_once() {
    let (_backend, base) = spawn_backend().await;
    let h = harness(config_for(&base), Some("expired"));
    let gw = h.client.gateway();

    let calls = (0..5).map(|i| gw.send(RequestDescriptor::get(format!("/api/v1/devices/{}", i))));
    let results = futures::future::join_all(calls).await;

    assert!(results.iter().all(|r| matches!(r, Err(ApiError::Unauthorized { .. }))));
    assert_eq!(h.store.get(), None);
    assert_eq!(h.nav.count("/login"), 1);
}

#[tokio::test]
async fn other_failures_leave_the_session_alone() {
    let (backend, base) = spawn_backend().await;
    backend.grant("tok123", alice());
    let h = harness(config_for(&base), Some("tok123"));

    let err = h.client.api().users().await.unwrap_err();
    assert!(matches!(err, ApiError::Forbidden { .. }));
    assert_eq!(err.message(), "Not enough permissions");

    let err = h.client.api().device(999).await.unwrap_err();
    assert_eq!(err.http_status(), Some(404));

    let err = h.client.api().priorities().await.unwrap_err();
    assert!(matches!(err, ApiError::Server { status: 500, .. }));

    assert_eq!(h.store.get().as_deref(), Some("tok123"));
    assert!(h.nav.history().is_empty());
}

#[tokio::test]
async fn transport_failure_does_not_end_the_session() {
    let h = harness(config_for(&dead_base_url()), Some("tok123"));

    let err = h.client.gateway().send(RequestDescriptor::get("/api/v1/tickets")).await.unwrap_err();
    assert!(matches!(err, ApiError::Transport { .. }));
    assert!(err.is_retryable());
    assert_eq!(h.store.get().as_deref(), Some("tok123"));
    assert!(h.nav.history().is_empty());
}

#[tokio::test]
async fn every_request_carries_a_distinct_request_id() {
    let (backend, base) = spawn_backend().await;
    backend.grant("tok123", alice());
    let h = harness(config_for(&base), Some("tok123"));

    let gw = h.client.gateway();
    gw.send(RequestDescriptor::get("/api/v1/tickets")).await.expect("first");
    gw.send(RequestDescriptor::get("/api/v1/tickets")).await.expect("second");

    let ids = backend.request_ids();
    assert_eq!(ids.len(), 2);
    assert_ne!(ids[0], ids[1]);
}

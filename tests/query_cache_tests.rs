mod common;

use common::*;
use helpdesk_client::resources::{keys, TicketFilter};
use helpdesk_client::ApiError;

#[tokio::test]
async fn deleted_device_disappears_from_the_list() {
    let (backend, base) = spawn_backend().await;
    backend.grant("tok123", alice());
    let h = harness(config_for(&base), Some("tok123"));
    let api = h.client.api();

    let before = api.admin_devices().await.expect("list");
    assert!(before.iter().any(|d| d.device_id == 5));

    api.delete_device(5).await.expect("delete");
    assert!(h.client.queries().is_invalidated(&keys::admin_devices()));

    let after = api.admin_devices().await.expect("list again");
    assert!(after.iter().all(|d| d.device_id != 5));
    assert_eq!(backend.hits(ADMIN_DEVICES), 2);
    assert_eq!(backend.device_ids(), vec![12]);
}

#[tokio::test]
async fn failed_mutation_keeps_cached_reads() {
    let (backend, base) = spawn_backend().await;
    backend.grant("tok123", alice());
    let h = harness(config_for(&base), Some("tok123"));
    let api = h.client.api();

    api.admin_devices().await.expect("list");
    let err = api.delete_device(99).await.unwrap_err();
    assert!(matches!(err, ApiError::NotFound { .. }));
    assert!(!h.client.queries().is_invalidated(&keys::admin_devices()));

    api.admin_devices().await.expect("cached list");
    assert_eq!(backend.hits(ADMIN_DEVICES), 1);
}

#[tokio::test]
async fn concurrent_reads_share_one_request() {
    let (backend, base) = spawn_backend().await;
    backend.grant("tok123", alice());
    let h = harness(config_for(&base), Some("tok123"));
    let api = h.client.api();

    let (a, b, c) = tokio::join!(api.admin_devices(), api.admin_devices(), api.admin_devices());
    assert_eq!(a.unwrap().len(), 2);
    assert_eq!(b.unwrap().len(), 2);
    assert_eq!(c.unwrap().len(), 2);
    assert_eq!(backend.hits(ADMIN_DEVICES), 1);
}

#[tokio::test]
async fn session_end_drops_cached_queries() {
    let (backend, base) = spawn_backend().await;
    backend.grant("tok123", alice());
    let h = harness(config_for(&base), Some("tok123"));
    let api = h.client.api();

    api.admin_devices().await.expect("list");
    assert!(!h.client.queries().is_empty());

    // a 401 on an unrelated call ends the session and with it the cache
    backend.revoke_all();
    let err = api.tickets(&Default::default()).await.unwrap_err();
    assert!(err.is_unauthorized());
    assert!(h.client.queries().is_empty());
    assert_eq!(h.nav.current().as_deref(), Some("/login"));
}

#[tokio::test]
async fn login_starts_with_an_empty_cache() {
    let (backend, base) = spawn_backend().await;
    backend.grant("tok-old", alice());
    let h = harness(config_for(&base), Some("tok-old"));

    h.client.api().admin_devices().await.expect("list");
    h.client.login("alice", "correct-pw").await.expect("login");
    assert!(h.client.queries().is_empty());

    h.client.api().admin_devices().await.expect("list as new session");
    assert_eq!(backend.auth_headers(ADMIN_DEVICES), vec![Some("Bearer tok-old".to_string()), Some("Bearer tok123".to_string())]);
}

#[tokio::test]
async fn ticket_list_parses_with_related_objects() {
    let (backend, base) = spawn_backend().await;
    backend.grant("tok123", alice());
    let h = harness(config_for(&base), Some("tok123"));
    let api = h.client.api();

    let tickets = api.tickets(&TicketFilter::default()).await.expect("tickets");
    assert_eq!(tickets.len(), 1);
    let t = &tickets[0];
    assert_eq!(t.ticket_id, 7);
    assert!(!t.is_closed());
    assert_eq!(t.created_at.to_rfc3339(), "2024-03-01T09:30:00.123456+00:00");
    assert_eq!(t.updated_at.to_rfc3339(), "2024-03-01T09:45:00+00:00");
    assert_eq!(t.status.as_ref().map(|s| s.name.as_str()), Some("In Progress"));
    assert_eq!(t.device.as_ref().and_then(|d| d.device_type.as_ref()).map(|dt| dt.name.as_str()), Some("Printer"));
    assert_eq!(t.user.as_ref().map(|u| u.username.as_str()), Some("alice"));
    assert_eq!(t.files[0].file_name, "jam.jpg");
    assert_eq!(t.assignments[0].technician_username.as_deref(), Some("bob"));

    // the same list comes from the cache the second time
    let again = api.tickets(&TicketFilter::default()).await.expect("cached tickets");
    assert_eq!(again[0], *t);
    assert_eq!(backend.hits(TICKETS), 1);
}

#[tokio::test]
async fn status_list_is_read_from_the_public_route() {
    let (backend, base) = spawn_backend().await;
    backend.grant("tok123", alice());
    let h = harness(config_for(&base), Some("tok123"));

    let statuses = h.client.api().statuses().await.expect("statuses");
    let names: Vec<&str> = statuses.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["New", "In Progress", "Closed"]);
    assert!(statuses[2].is_final);
    assert_eq!(backend.auth_headers(STATUSES), vec![Some("Bearer tok123".to_string())]);
}

#[tokio::test]
async fn admin_reads_the_user_list() {
    let (backend, base) = spawn_backend().await;
    backend.grant("tok-admin", admin());
    let h = harness(config_for(&base), Some("tok-admin"));

    let users = h.client.api().users().await.expect("users");
    assert_eq!(users.iter().map(|u| u.username.as_str()).collect::<Vec<_>>(), vec!["admin", "alice"]);
    assert_eq!(users[0].created_at.map(|t| t.to_rfc3339()).as_deref(), Some("2024-01-01T00:00:00+00:00"));
    assert!(users[0].updated_at.is_none());
    assert!(users[1].updated_at.is_some());
    assert_eq!(backend.hits(ADMIN_USERS), 1);
}

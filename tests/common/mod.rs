#![allow(dead_code)]

// In-process stand-in for the helpdesk backend, bound to an ephemeral localhost port.
// Records every Authorization header it sees and counts hits per route.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Form, Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};

use helpdesk_client::identity::{MemoryTokenStore, RecordingNavigator, TokenStore};
use helpdesk_client::{ClientConfig, HelpdeskClient};

pub const ME: &str = "GET /api/v1/users/me";
pub const ADMIN_DEVICES: &str = "GET /api/v1/devices/admin/devices";
pub const LOGIN: &str = "POST /api/auth/login";
pub const STATUSES: &str = "GET /api/v1/statuses/statuses";
pub const TICKETS: &str = "GET /api/v1/tickets";
pub const ADMIN_USERS: &str = "GET /api/v1/users/admin/users";

pub struct Backend {
    /// bearer token -> user record served by who-am-i
    sessions: Mutex<HashMap<String, Value>>,
    devices: Mutex<Vec<Value>>,
    hits: Mutex<HashMap<String, usize>>,
    auth_seen: Mutex<Vec<(String, Option<String>)>>,
    request_ids: Mutex<Vec<String>>,
    delay: Mutex<Duration>,
}

pub fn alice() -> Value {
    json!({
        "user_id": 3, "username": "alice", "email": "alice@example.com",
        "first_name": "Alice", "last_name": "Smith", "department": "Accounting",
        "role_id": 2, "is_active": true,
        "created_at": "2024-01-01T00:00:00+00:00", "updated_at": "2024-02-10T08:15:30.250000Z"
    })
}

pub fn admin() -> Value {
    json!({
        "user_id": 1, "username": "admin", "email": "admin@example.com",
        "first_name": "Helpdesk", "last_name": "Admin", "department": "IT",
        "role_id": 1, "is_active": true, "created_at": "2023-12-31T21:00:00-03:00", "updated_at": null
    })
}

fn statuses() -> Value {
    json!([
        {"status_id": 1, "name": "New", "display_order": 1, "is_final": false},
        {"status_id": 2, "name": "In Progress", "display_order": 2, "is_final": false},
        {"status_id": 4, "name": "Closed", "display_order": 4, "is_final": true},
    ])
}

/// One ticket as the list endpoint returns it: offset timestamps and expanded relations.
pub fn printer_ticket() -> Value {
    json!({
        "ticket_id": 7, "device_id": 5, "user_id": 3,
        "description": "Printer jams on tray 2", "priority_id": 2, "status_id": 2,
        "resolution_notes": null,
        "created_at": "2024-03-01T09:30:00.123456+00:00",
        "updated_at": "2024-03-01T12:45:00+03:00",
        "closed_at": null,
        "files": [{
            "file_id": 11, "ticket_id": 7, "file_name": "jam.jpg", "file_type": "image/jpeg",
            "file_size": 48213, "file_path": "uploads/7/jam.jpg", "uploaded_at": "2024-03-01T09:31:02Z"
        }],
        "user": alice(),
        "device": {"device_id": 5, "name": "HP LaserJet", "device_type_id": 1, "inventory_number": "INV-5", "device_type": {"device_type_id": 1, "name": "Printer"}},
        "priority": {"priority_id": 2, "name": "Medium", "display_order": 2},
        "status": {"status_id": 2, "name": "In Progress", "display_order": 2, "is_final": false},
        "assignments": [{
            "assignment_id": 1, "ticket_id": 7, "technician_id": 9, "assigned_at": "2024-03-01T10:00:00+00:00",
            "technician_name": "Bob Tech", "technician_username": "bob"
        }]
    })
}

impl Backend {
    fn new() -> Self {
        Backend {
            sessions: Mutex::new(HashMap::new()),
            devices: Mutex::new(vec![
                json!({"device_id": 5, "name": "HP LaserJet", "device_type_id": 1, "inventory_number": "INV-5", "device_type": {"device_type_id": 1, "name": "Printer"}}),
                json!({"device_id": 12, "name": "Dell P2419H", "device_type_id": 2, "inventory_number": null, "device_type": {"device_type_id": 2, "name": "Monitor"}}),
            ]),
            hits: Mutex::new(HashMap::new()),
            auth_seen: Mutex::new(Vec::new()),
            request_ids: Mutex::new(Vec::new()),
            delay: Mutex::new(Duration::from_millis(30)),
        }
    }

    pub fn grant(&self, token: &str, user: Value) { self.sessions.lock().insert(token.to_string(), user); }

    /// Every issued token stops being accepted, as if it had expired server-side.
    pub fn revoke_all(&self) { self.sessions.lock().clear(); }

    pub fn hits(&self, route: &str) -> usize { self.hits.lock().get(route).copied().unwrap_or(0) }

    /// Authorization header values seen on `route`, in arrival order.
    pub fn auth_headers(&self, route: &str) -> Vec<Option<String>> {
        self.auth_seen.lock().iter().filter(|(r, _)| r == route).map(|(_, h)| h.clone()).collect()
    }

    pub fn request_ids(&self) -> Vec<String> { self.request_ids.lock().clone() }

    pub fn device_ids(&self) -> Vec<i64> { self.devices.lock().iter().filter_map(|d| d["device_id"].as_i64()).collect() }

    fn record(&self, route: &str, headers: &HeaderMap) {
        *self.hits.lock().entry(route.to_string()).or_insert(0) += 1;
        let auth = headers.get("authorization").and_then(|v| v.to_str().ok()).map(String::from);
        self.auth_seen.lock().push((route.to_string(), auth));
        if let Some(id) = headers.get("x-request-id").and_then(|v| v.to_str().ok()) {
            self.request_ids.lock().push(id.to_string());
        }
    }

    fn user_for(&self, headers: &HeaderMap) -> Option<Value> {
        let raw = headers.get("authorization")?.to_str().ok()?;
        let token = raw.strip_prefix("Bearer ")?;
        self.sessions.lock().get(token).cloned()
    }

    async fn pause(&self) {
        let d = *self.delay.lock();
        tokio::time::sleep(d).await;
    }
}

fn detail(status: StatusCode, msg: &str) -> Response { (status, Json(json!({ "detail": msg }))).into_response() }

fn unauthorized() -> Response { detail(StatusCode::UNAUTHORIZED, "Could not validate credentials") }

async fn login(State(b): State<Arc<Backend>>, headers: HeaderMap, Form(f): Form<HashMap<String, String>>) -> Response {
    b.record(LOGIN, &headers);
    match (f.get("username").map(String::as_str), f.get("password").map(String::as_str)) {
        (Some("alice"), Some("correct-pw")) => {
            b.grant("tok123", alice());
            Json(json!({ "access_token": "tok123", "token_type": "bearer" })).into_response()
        }
        _ => detail(StatusCode::UNAUTHORIZED, "Incorrect username or password"),
    }
}

async fn me(State(b): State<Arc<Backend>>, headers: HeaderMap) -> Response {
    b.record(ME, &headers);
    b.pause().await;
    match b.user_for(&headers) {
        Some(u) => Json(u).into_response(),
        None => unauthorized(),
    }
}

async fn admin_devices(State(b): State<Arc<Backend>>, headers: HeaderMap) -> Response {
    b.record(ADMIN_DEVICES, &headers);
    b.pause().await;
    if b.user_for(&headers).is_none() { return unauthorized(); }
    Json(Value::Array(b.devices.lock().clone())).into_response()
}

async fn delete_device(State(b): State<Arc<Backend>>, headers: HeaderMap, Path(id): Path<i64>) -> Response {
    b.record("DELETE /api/v1/devices/admin/devices/{id}", &headers);
    if b.user_for(&headers).is_none() { return unauthorized(); }
    let mut devices = b.devices.lock();
    match devices.iter().position(|d| d["device_id"].as_i64() == Some(id)) {
        Some(i) => Json(devices.remove(i)).into_response(),
        None => detail(StatusCode::NOT_FOUND, "Device not found"),
    }
}

async fn device(State(b): State<Arc<Backend>>, headers: HeaderMap, Path(id): Path<i64>) -> Response {
    b.record("GET /api/v1/devices/{id}", &headers);
    if b.user_for(&headers).is_none() { return unauthorized(); }
    let found = b.devices.lock().iter().find(|d| d["device_id"].as_i64() == Some(id)).cloned();
    match found {
        Some(d) => Json(d).into_response(),
        None => detail(StatusCode::NOT_FOUND, "Device not found"),
    }
}

// admin-only listing; alice is not an admin
async fn admin_users(State(b): State<Arc<Backend>>, headers: HeaderMap) -> Response {
    b.record(ADMIN_USERS, &headers);
    match b.user_for(&headers) {
        None => unauthorized(),
        Some(u) if u["role_id"].as_i64() == Some(1) => Json(json!([admin(), alice()])).into_response(),
        Some(_) => detail(StatusCode::FORBIDDEN, "Not enough permissions"),
    }
}

async fn list_statuses(State(b): State<Arc<Backend>>, headers: HeaderMap) -> Response {
    b.record(STATUSES, &headers);
    if b.user_for(&headers).is_none() { return unauthorized(); }
    Json(statuses()).into_response()
}

async fn priorities(State(b): State<Arc<Backend>>, headers: HeaderMap) -> Response {
    b.record("GET /api/v1/priorities", &headers);
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
}

async fn tickets(State(b): State<Arc<Backend>>, headers: HeaderMap) -> Response {
    b.record(TICKETS, &headers);
    if b.user_for(&headers).is_none() { return unauthorized(); }
    Json(json!([printer_ticket()])).into_response()
}

pub async fn spawn_backend() -> (Arc<Backend>, String) {
    let backend = Arc::new(Backend::new());
    let app = Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/v1/users/me", get(me))
        .route("/api/v1/users/admin/users", get(admin_users))
        .route("/api/v1/devices/admin/devices", get(admin_devices))
        .route("/api/v1/devices/admin/devices/{id}", delete(delete_device))
        .route("/api/v1/devices/{id}", get(device))
        .route("/api/v1/priorities", get(priorities))
        .route("/api/v1/statuses/statuses", get(list_statuses))
        .route("/api/v1/tickets", get(tickets))
        .with_state(Arc::clone(&backend));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind 127.0.0.1:0");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            eprintln!("fake backend error: {e:?}");
        }
    });
    (backend, format!("http://{}", addr))
}

/// A base URL nothing listens on.
pub fn dead_base_url() -> String {
    let listener = std::net::TcpListener::bind(("127.0.0.1", 0)).expect("bind 127.0.0.1:0");
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{}", port)
}

pub fn config_for(base: &str) -> ClientConfig {
    ClientConfig { api_base_url: base.to_string(), ..ClientConfig::default() }
}

pub struct Harness {
    pub client: HelpdeskClient,
    pub store: Arc<MemoryTokenStore>,
    pub nav: Arc<RecordingNavigator>,
}

pub fn harness(config: ClientConfig, token: Option<&str>) -> Harness {
    let store = Arc::new(match token { Some(t) => MemoryTokenStore::with_token(t), None => MemoryTokenStore::new() });
    let nav = Arc::new(RecordingNavigator::new());
    let tokens: Arc<dyn TokenStore> = store.clone();
    let client = HelpdeskClient::new(config, tokens, nav.clone()).expect("client");
    Harness { client, store, nav }
}

//!
//! Authenticated request gateway
//! -----------------------------
//! Single chokepoint for every backend call. Outgoing requests pass through a
//! middleware chain registered once at construction:
//! - `RequestId` tags the request with an `x-request-id` for log correlation.
//! - `BearerAuth` attaches `Authorization: Bearer <credential>` when one is stored,
//!   and strips any Authorization header otherwise.
//! - `UnauthorizedIntercept` clears the session and forces the login route when the
//!   backend answers 401. The error is still returned to the caller.
//!
//! Transport failures and non-401 error responses are returned untouched.

use std::sync::Arc;
use std::time::Instant;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::{ApiError, ApiResult};
use crate::identity::SessionContext;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(Value),
    /// `application/x-www-form-urlencoded` fields, in order.
    Form(Vec<(String, String)>),
}

/// An outgoing call. Built by callers; middleware only touches `headers`.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: RequestBody,
    pub headers: HeaderMap,
    /// Sent without a credential and exempt from the 401 intercept (the login call).
    pub anonymous: bool,
}

impl RequestDescriptor {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self { method, path: path.into(), query: Vec::new(), body: RequestBody::Empty, headers: HeaderMap::new(), anonymous: false }
    }

    pub fn get(path: impl Into<String>) -> Self { Self::new(Method::GET, path) }
    pub fn post(path: impl Into<String>) -> Self { Self::new(Method::POST, path) }
    pub fn put(path: impl Into<String>) -> Self { Self::new(Method::PUT, path) }
    pub fn patch(path: impl Into<String>) -> Self { Self::new(Method::PATCH, path) }
    pub fn delete(path: impl Into<String>) -> Self { Self::new(Method::DELETE, path) }

    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn query_opt<V: ToString>(self, key: &str, value: Option<V>) -> Self {
        match value { Some(v) => self.query(key, v), None => self }
    }

    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> ApiResult<Self> {
        self.body = RequestBody::Json(serde_json::to_value(body)?);
        Ok(self)
    }

    pub fn form<'a, I>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        self.body = RequestBody::Form(fields.into_iter().map(|(k, v)| (k.to_string(), v.to_string())).collect());
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn anonymous(mut self) -> Self {
        self.anonymous = true;
        self
    }
}

/// A successful (2xx) backend response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn json<T: DeserializeOwned>(&self) -> ApiResult<T> {
        serde_json::from_slice(&self.body).map_err(|e| ApiError::decode("decode_error".to_string(), format!("unexpected response body: {}", e)))
    }

    pub fn text(&self) -> String { String::from_utf8_lossy(&self.body).into_owned() }
}

/// One link of the gateway's chain. `on_request` may only adjust headers; an error aborts the call.
pub trait Middleware: Send + Sync {
    fn on_request(&self, _req: &mut RequestDescriptor) -> ApiResult<()> { Ok(()) }
    fn on_response(&self, _req: &RequestDescriptor, _outcome: &ApiResult<ApiResponse>) {}
}

pub struct RequestId;

impl Middleware for RequestId {
    fn on_request(&self, req: &mut RequestDescriptor) -> ApiResult<()> {
        if !req.headers.contains_key(REQUEST_ID_HEADER) {
            let id = uuid::Uuid::new_v4().to_string();
            let value = HeaderValue::from_str(&id).map_err(|e| ApiError::config("bad_header".to_string(), e.to_string()))?;
            req.headers.insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
        }
        Ok(())
    }
}

pub struct BearerAuth {
    context: Arc<SessionContext>,
}

impl BearerAuth {
    pub fn new(context: Arc<SessionContext>) -> Self { Self { context } }
}

impl Middleware for BearerAuth {
    fn on_request(&self, req: &mut RequestDescriptor) -> ApiResult<()> {
        req.headers.remove(AUTHORIZATION);
        if req.anonymous { return Ok(()); }
        if let Some(token) = self.context.token() {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| ApiError::storage("invalid_token", "stored credential is not a valid header value"))?;
            value.set_sensitive(true);
            req.headers.insert(AUTHORIZATION, value);
        }
        Ok(())
    }
}

pub struct UnauthorizedIntercept {
    context: Arc<SessionContext>,
}

impl UnauthorizedIntercept {
    pub fn new(context: Arc<SessionContext>) -> Self { Self { context } }
}

impl Middleware for UnauthorizedIntercept {
    fn on_response(&self, req: &RequestDescriptor, outcome: &ApiResult<ApiResponse>) {
        if req.anonymous { return; }
        if let Err(e) = outcome {
            if e.is_unauthorized() {
                self.context.handle_unauthorized();
            }
        }
    }
}

pub struct Gateway {
    base: Url,
    client: reqwest::Client,
    middleware: Vec<Arc<dyn Middleware>>,
}

impl Gateway {
    /// Gateway with the standard chain (request id, bearer auth, 401 intercept).
    pub fn new(config: &ClientConfig, context: Arc<SessionContext>) -> ApiResult<Self> {
        let mut builder = reqwest::Client::builder().cookie_store(true);
        if let Some(t) = config.request_timeout() { builder = builder.timeout(t); }
        let client = builder.build()?;
        Ok(Self::with_client(config.base_url()?, client, context))
    }

    pub fn with_client(base: Url, client: reqwest::Client, context: Arc<SessionContext>) -> Self {
        Self {
            base,
            client,
            middleware: vec![
                Arc::new(RequestId),
                Arc::new(BearerAuth::new(context.clone())),
                Arc::new(UnauthorizedIntercept::new(context)),
            ],
        }
    }

    /// Append a middleware after the standard chain.
    pub fn with_middleware(mut self, m: Arc<dyn Middleware>) -> Self {
        self.middleware.push(m);
        self
    }

    pub fn base_url(&self) -> &Url { &self.base }

    pub fn url_for(&self, req: &RequestDescriptor) -> ApiResult<Url> {
        // keep any path prefix on the base (e.g. a reverse-proxy mount point)
        let joined = format!("{}/{}", self.base.as_str().trim_end_matches('/'), req.path.trim_start_matches('/'));
        let mut url = Url::parse(&joined).map_err(|e| ApiError::config("bad_url".to_string(), format!("{}: {}", joined, e)))?;
        if !req.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in &req.query { pairs.append_pair(k, v); }
        }
        Ok(url)
    }

    pub async fn send(&self, mut req: RequestDescriptor) -> ApiResult<ApiResponse> {
        for m in &self.middleware { m.on_request(&mut req)?; }
        let outcome = self.dispatch(&req).await;
        for m in &self.middleware { m.on_response(&req, &outcome); }
        outcome
    }

    pub async fn send_json<T: DeserializeOwned>(&self, req: RequestDescriptor) -> ApiResult<T> {
        self.send(req).await?.json()
    }

    /// For endpoints whose body the caller does not need (204s, delete echoes).
    pub async fn send_empty(&self, req: RequestDescriptor) -> ApiResult<()> {
        self.send(req).await.map(|_| ())
    }

    async fn dispatch(&self, req: &RequestDescriptor) -> ApiResult<ApiResponse> {
        let url = self.url_for(req)?;
        let started = Instant::now();
        let request_id = req.headers.get(REQUEST_ID_HEADER).and_then(|v| v.to_str().ok()).unwrap_or("").to_string();
        let mut builder = self.client.request(req.method.clone(), url).headers(req.headers.clone());
        builder = match &req.body {
            RequestBody::Empty => builder,
            RequestBody::Json(v) => builder.json(v),
            RequestBody::Form(fields) => builder
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(encode_form(fields)),
        };
        let resp = match builder.send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(target: "gateway", request_id = %request_id, method = %req.method, path = %req.path, error = %e, "transport failure");
                return Err(e.into());
            }
        };
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp.bytes().await.map_err(ApiError::from)?.to_vec();
        debug!(
            target: "gateway",
            request_id = %request_id,
            method = %req.method,
            path = %req.path,
            status = status.as_u16(),
            authenticated = req.headers.contains_key(AUTHORIZATION),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "response"
        );
        if !status.is_success() {
            return Err(ApiError::from_status(status.as_u16(), &String::from_utf8_lossy(&body)));
        }
        Ok(ApiResponse { status: status.as_u16(), headers, body })
    }
}

pub fn encode_form(fields: &[(String, String)]) -> String {
    fields
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{MemoryTokenStore, NoopNavigator, TokenStore};

    fn context(token: Option<&str>) -> Arc<SessionContext> {
        let store: Arc<dyn TokenStore> = Arc::new(match token { Some(t) => MemoryTokenStore::with_token(t), None => MemoryTokenStore::new() });
        Arc::new(SessionContext::new(store, Arc::new(NoopNavigator), "/login"))
    }

    #[test]
    fn bearer_attached_only_when_present() {
        let mw = BearerAuth::new(context(Some("tok123")));
        let mut req = RequestDescriptor::get("/api/v1/tickets");
        mw.on_request(&mut req).unwrap();
        assert_eq!(req.headers.get(AUTHORIZATION).unwrap().to_str().unwrap(), "Bearer tok123");

        let mw = BearerAuth::new(context(None));
        let mut req = RequestDescriptor::get("/api/v1/tickets").header(AUTHORIZATION, HeaderValue::from_static("Bearer stale"));
        mw.on_request(&mut req).unwrap();
        assert!(req.headers.get(AUTHORIZATION).is_none());
    }

    #[test]
    fn anonymous_requests_never_carry_credentials() {
        let mw = BearerAuth::new(context(Some("tok123")));
        let mut req = RequestDescriptor::post("/api/auth/login").anonymous();
        mw.on_request(&mut req).unwrap();
        assert!(req.headers.get(AUTHORIZATION).is_none());
    }

    #[test]
    fn form_fields_are_url_encoded() {
        let body = encode_form(&[("username".into(), "alice".into()), ("password".into(), "p@ss w&rd=1".into())]);
        assert_eq!(body, "username=alice&password=p%40ss%20w%26rd%3D1");
    }

    #[test]
    fn url_keeps_base_prefix_and_query() {
        let gw = Gateway::with_client(Url::parse("http://host:8000/proxy/").unwrap(), reqwest::Client::new(), context(None));
        let req = RequestDescriptor::get("/api/v1/tickets").query("skip", 0).query_opt("search", Some("printer jam")).query_opt::<i64>("status_id", None);
        let url = gw.url_for(&req).unwrap();
        assert_eq!(url.as_str(), "http://host:8000/proxy/api/v1/tickets?skip=0&search=printer+jam");
    }

    #[test]
    fn request_id_is_added_once() {
        let mut req = RequestDescriptor::get("/x");
        RequestId.on_request(&mut req).unwrap();
        let first = req.headers.get(REQUEST_ID_HEADER).cloned().unwrap();
        RequestId.on_request(&mut req).unwrap();
        assert_eq!(req.headers.get(REQUEST_ID_HEADER), Some(&first));
    }
}

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::navigation::Navigator;
use super::principal::Principal;
use super::token_store::{BearerToken, TokenStore};
use crate::error::ApiResult;
use crate::gateway::{Gateway, RequestDescriptor};

pub const WHO_AM_I_PATH: &str = "/api/v1/users/me";

type SessionEndListener = Arc<dyn Fn() + Send + Sync>;

/// Observable state of the principal slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrincipalState {
    Absent,
    Loading,
    Present(Principal),
}

#[derive(Debug, Default)]
struct PrincipalSlot {
    value: Option<Principal>,
    fetched_at: Option<Instant>,
    loading: bool,
    /// Set on mount and whenever the credential changes; forces the next read to hit the backend.
    needs_revalidation: bool,
    /// Bumped on every credential change so a fetch started under an older credential
    /// cannot publish its result.
    generation: u64,
}

/// Process-wide session state handed to the gateway, login flow and session resolver:
/// the credential store, the forced-navigation hook and the cached principal.
pub struct SessionContext {
    tokens: Arc<dyn TokenStore>,
    navigator: Arc<dyn Navigator>,
    login_route: String,
    /// Latched once the login route has been forced for the current credential lifetime.
    ended: AtomicBool,
    principal: Mutex<PrincipalSlot>,
    listeners: Mutex<Vec<SessionEndListener>>,
}

impl SessionContext {
    pub fn new(tokens: Arc<dyn TokenStore>, navigator: Arc<dyn Navigator>, login_route: impl Into<String>) -> Self {
        Self {
            tokens,
            navigator,
            login_route: login_route.into(),
            ended: AtomicBool::new(false),
            principal: Mutex::new(PrincipalSlot { needs_revalidation: true, ..Default::default() }),
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn token(&self) -> Option<BearerToken> { self.tokens.get() }

    pub fn is_authenticated(&self) -> bool { self.tokens.get().is_some() }

    pub fn login_route(&self) -> &str { &self.login_route }

    /// Register a hook run whenever the session ends (forced or explicit logout).
    pub fn on_session_end<F>(&self, listener: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.listeners.lock().push(Arc::new(listener));
    }

    /// Persist a freshly issued credential and drop whatever principal was cached.
    pub fn store_token(&self, token: &str) -> ApiResult<()> {
        self.tokens.set(token)?;
        self.ended.store(false, Ordering::SeqCst);
        self.invalidate_principal();
        info!(target: "session", "credential stored");
        Ok(())
    }

    pub fn invalidate_principal(&self) {
        let mut slot = self.principal.lock();
        slot.value = None;
        slot.fetched_at = None;
        slot.needs_revalidation = true;
        slot.generation += 1;
    }

    pub fn navigate(&self, route: &str) { self.navigator.navigate(route); }

    /// Reaction to a backend "unauthorized" answer. Clearing is repeated on every call;
    /// listeners and the forced navigation run once per credential lifetime.
    /// Returns true when this call performed the navigation.
    pub fn handle_unauthorized(&self) -> bool {
        if let Err(e) = self.tokens.clear() {
            warn!(target: "session", error = %e, "failed to clear credential after 401");
        }
        self.invalidate_principal();
        if self.ended.swap(true, Ordering::SeqCst) {
            debug!(target: "session", "session already ended, skipping navigation");
            return false;
        }
        warn!(target: "session", route = %self.login_route, "credential rejected by backend, forcing login");
        self.end_session();
        true
    }

    /// Explicit logout requested by the user.
    pub fn logout(&self) -> ApiResult<()> {
        let cleared = self.tokens.clear();
        self.invalidate_principal();
        self.ended.store(true, Ordering::SeqCst);
        info!(target: "session", "logged out");
        self.end_session();
        cleared
    }

    fn end_session(&self) {
        let listeners: Vec<SessionEndListener> = self.listeners.lock().clone();
        for l in listeners { l(); }
        self.navigator.navigate(&self.login_route);
    }

    pub fn principal_state(&self) -> PrincipalState {
        let slot = self.principal.lock();
        match (&slot.value, slot.loading) {
            (Some(p), _) => PrincipalState::Present(p.clone()),
            (None, true) => PrincipalState::Loading,
            (None, false) => PrincipalState::Absent,
        }
    }
}

/// Resolves the current principal, serving it from memory within the freshness window.
pub struct SessionResolver {
    context: Arc<SessionContext>,
    gateway: Arc<Gateway>,
    freshness: Duration,
    fetch_lock: tokio::sync::Mutex<()>,
}

impl SessionResolver {
    pub fn new(context: Arc<SessionContext>, gateway: Arc<Gateway>, freshness: Duration) -> Self {
        Self { context, gateway, freshness, fetch_lock: tokio::sync::Mutex::new(()) }
    }

    /// A new screen/page is shown: the next read re-validates regardless of freshness.
    pub fn mount(&self) {
        self.context.principal.lock().needs_revalidation = true;
    }

    pub fn state(&self) -> PrincipalState { self.context.principal_state() }

    pub async fn current_principal(&self) -> Option<Principal> {
        if !self.context.is_authenticated() {
            let mut slot = self.context.principal.lock();
            slot.value = None;
            slot.fetched_at = None;
            return None;
        }
        if let Some(p) = self.fresh() { return Some(p); }

        // one who-am-i call at a time; latecomers re-check the slot the winner filled
        let _guard = self.fetch_lock.lock().await;
        if let Some(p) = self.fresh() { return Some(p); }
        if !self.context.is_authenticated() { return None; }

        let generation = {
            let mut slot = self.context.principal.lock();
            slot.loading = true;
            slot.generation
        };
        let mut result = self.gateway.send_json::<Principal>(RequestDescriptor::get(WHO_AM_I_PATH)).await;
        if matches!(&result, Err(e) if e.is_retryable()) {
            debug!(target: "session", "who-am-i transport failure, retrying once");
            result = self.gateway.send_json::<Principal>(RequestDescriptor::get(WHO_AM_I_PATH)).await;
        }
        let mut slot = self.context.principal.lock();
        slot.loading = false;
        match result {
            Ok(p) => {
                if slot.generation != generation {
                    debug!(target: "session", "credential changed during who-am-i, discarding result");
                    return None;
                }
                debug!(target: "session", user_id = p.user_id, username = %p.username, "principal resolved");
                slot.value = Some(p.clone());
                slot.fetched_at = Some(Instant::now());
                slot.needs_revalidation = false;
                Some(p)
            }
            Err(e) => {
                // a 401 has already been handled by the gateway intercept
                warn!(target: "session", error = %e, "who-am-i failed");
                slot.value = None;
                slot.fetched_at = None;
                None
            }
        }
    }

    fn fresh(&self) -> Option<Principal> {
        let slot = self.context.principal.lock();
        if slot.needs_revalidation { return None; }
        match (&slot.value, slot.fetched_at) {
            (Some(p), Some(at)) if at.elapsed() < self.freshness => Some(p.clone()),
            _ => None,
        }
    }
}

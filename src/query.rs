//! Query/cache coordinator.
//!
//! Screens read entities through [`QueryCoordinator::query`] under a semantic key
//! (`["tickets"]`, `["ticket", "7"]`, ...). Concurrent reads of one key share a single
//! in-flight fetch. A cached value older than the staleness window is returned at once
//! while a background refetch runs. [`QueryCoordinator::invalidate`] marks every key
//! under a prefix so its next read waits for fresh data; mutations call it for every
//! key they may have touched. Entries nobody has read for `gc_time` are dropped.

use std::any::Any;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::error::{ApiError, ApiResult};

type AnyValue = Arc<dyn Any + Send + Sync>;
type SharedFetch = Shared<BoxFuture<'static, Result<AnyValue, ApiError>>>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey(Vec<String>);

impl QueryKey {
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        QueryKey(parts.into_iter().map(Into::into).collect())
    }

    /// Extend with a discriminating parameter, e.g. an entity id.
    pub fn with(mut self, part: impl ToString) -> Self {
        self.0.push(part.to_string());
        self
    }

    pub fn parts(&self) -> &[String] { &self.0 }

    pub fn starts_with(&self, prefix: &QueryKey) -> bool { self.0.starts_with(&prefix.0) }
}

impl Display for QueryKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result { write!(f, "[{}]", self.0.join(", ")) }
}

impl From<&str> for QueryKey {
    fn from(s: &str) -> Self { QueryKey(vec![s.to_string()]) }
}

#[derive(Debug, Clone, Copy)]
pub struct QueryOptions {
    pub stale_time: Duration,
    /// Extra attempts after a retryable (transport) failure.
    pub retry: u32,
    /// Entries idle for longer than this are evicted.
    pub gc_time: Duration,
}

pub const DEFAULT_GC_TIME: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    Idle,
    Loading,
    Success,
    Error,
}

#[derive(Debug, Clone)]
pub struct QueryResult<T> {
    pub data: Option<Arc<T>>,
    pub error: Option<ApiError>,
    /// No data yet and a fetch is running.
    pub is_loading: bool,
    /// A background refetch is running behind `data`.
    pub is_fetching: bool,
}

impl<T> QueryResult<T> {
    pub fn into_result(self) -> ApiResult<Arc<T>> {
        match (self.error, self.data) {
            (Some(e), _) => Err(e),
            (None, Some(d)) => Ok(d),
            (None, None) => Err(ApiError::decode("no_data", "query produced no data")),
        }
    }
}

struct Entry {
    data: Option<AnyValue>,
    error: Option<ApiError>,
    updated_at: Option<Instant>,
    /// Last read or publish; drives eviction.
    touched_at: Instant,
    invalidated: bool,
    /// Replaced on invalidation; a fetch that started under an older epoch does not publish.
    epoch: u64,
}

impl Entry {
    fn new(epoch: u64) -> Self {
        Entry { data: None, error: None, updated_at: None, touched_at: Instant::now(), invalidated: false, epoch }
    }
}

#[derive(Default)]
struct State {
    entries: HashMap<QueryKey, Entry>,
    in_flight: HashMap<QueryKey, (u64, SharedFetch)>,
    /// Bumped by `clear`; fetches from before a clear never publish.
    clears: u64,
    /// Epochs are unique across entries, so an evicted and recreated key never reuses one.
    last_epoch: u64,
}

impl State {
    fn next_epoch(&mut self) -> u64 {
        self.last_epoch += 1;
        self.last_epoch
    }

    fn evict_idle(&mut self, gc_time: Duration) -> usize {
        let before = self.entries.len();
        let in_flight = &self.in_flight;
        self.entries.retain(|k, e| in_flight.contains_key(k) || e.touched_at.elapsed() < gc_time);
        before - self.entries.len()
    }
}

struct Inner {
    state: Mutex<State>,
    defaults: QueryOptions,
    next_fetch_id: AtomicU64,
}

#[derive(Clone)]
pub struct QueryCoordinator {
    inner: Arc<Inner>,
}

enum Plan {
    Fresh(AnyValue),
    Revalidate(AnyValue, SharedFetch, bool),
    Wait(SharedFetch),
}

impl QueryCoordinator {
    pub fn new(stale_time: Duration) -> Self {
        Self::with_options(QueryOptions { stale_time, retry: 0, gc_time: DEFAULT_GC_TIME })
    }

    pub fn with_options(defaults: QueryOptions) -> Self {
        Self { inner: Arc::new(Inner { state: Mutex::new(State::default()), defaults, next_fetch_id: AtomicU64::new(1) }) }
    }

    pub fn defaults(&self) -> QueryOptions { self.inner.defaults }

    pub async fn query<T, F, Fut>(&self, key: QueryKey, fetcher: F) -> QueryResult<T>
    where
        T: Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ApiResult<T>> + Send + 'static,
    {
        self.query_with(key, self.inner.defaults, fetcher).await
    }

    pub async fn query_with<T, F, Fut>(&self, key: QueryKey, opts: QueryOptions, fetcher: F) -> QueryResult<T>
    where
        T: Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ApiResult<T>> + Send + 'static,
    {
        let plan = {
            let mut st = self.inner.state.lock();
            if let Some(e) = st.entries.get_mut(&key) { e.touched_at = Instant::now(); }
            let cached = st.entries.get(&key).and_then(|e| {
                let data = e.data.clone()?;
                let fresh = !e.invalidated && e.updated_at.map(|at| at.elapsed() < opts.stale_time).unwrap_or(false);
                Some((data, fresh, e.invalidated))
            });
            match cached {
                Some((data, true, _)) => Plan::Fresh(data),
                Some((data, false, false)) => {
                    let (fetch, started) = self.join_or_start(&mut st, &key, opts, fetcher);
                    Plan::Revalidate(data, fetch, started)
                }
                _ => Plan::Wait(self.join_or_start(&mut st, &key, opts, fetcher).0),
            }
        };

        match plan {
            Plan::Fresh(data) => {
                trace!(target: "query", key = %key, "cache hit");
                typed(&key, Ok(data), false)
            }
            Plan::Revalidate(data, fetch, started) => {
                debug!(target: "query", key = %key, "stale, revalidating in background");
                if started { tokio::spawn(fetch); }
                typed(&key, Ok(data), true)
            }
            Plan::Wait(fetch) => {
                let outcome = fetch.await;
                match outcome {
                    Ok(v) => typed(&key, Ok(v), false),
                    Err(e) => {
                        // keep showing what we had alongside the error
                        let previous = self.inner.state.lock().entries.get(&key).and_then(|en| en.data.clone());
                        let mut r: QueryResult<T> = match previous { Some(p) => typed(&key, Ok(p), false), None => QueryResult { data: None, error: None, is_loading: false, is_fetching: false } };
                        r.error = Some(e);
                        r
                    }
                }
            }
        }
    }

    fn join_or_start<T, F, Fut>(&self, st: &mut State, key: &QueryKey, opts: QueryOptions, fetcher: F) -> (SharedFetch, bool)
    where
        T: Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ApiResult<T>> + Send + 'static,
    {
        if let Some((_, fetch)) = st.in_flight.get(key) {
            trace!(target: "query", key = %key, "joining in-flight fetch");
            return (fetch.clone(), false);
        }
        let id = self.inner.next_fetch_id.fetch_add(1, Ordering::Relaxed);
        let fresh = st.next_epoch();
        let epoch = (st.clears, st.entries.entry(key.clone()).or_insert_with(|| Entry::new(fresh)).epoch);
        let inner = Arc::clone(&self.inner);
        let k = key.clone();
        let fut = async move {
            let mut attempt = 0u32;
            let result = loop {
                match fetcher().await {
                    Err(e) if e.is_retryable() && attempt < opts.retry => {
                        attempt += 1;
                        debug!(target: "query", key = %k, attempt, error = %e, "retrying fetch");
                    }
                    other => break other,
                }
            };
            let result = result.map(|v| Arc::new(v) as AnyValue);
            inner.complete(&k, id, epoch, &result);
            result
        }
        .boxed()
        .shared();
        st.in_flight.insert(key.clone(), (id, fut.clone()));
        debug!(target: "query", key = %key, "fetch started");
        (fut, true)
    }

    /// Mark every key under `prefix` so its next read waits for a refetch.
    pub fn invalidate(&self, prefix: &QueryKey) -> usize {
        let mut st = self.inner.state.lock();
        let epoch = st.next_epoch();
        let mut n = 0;
        for (k, e) in st.entries.iter_mut() {
            if k.starts_with(prefix) {
                e.invalidated = true;
                e.epoch = epoch;
                n += 1;
            }
        }
        // later readers must not join a fetch that began before the invalidation
        st.in_flight.retain(|k, _| !k.starts_with(prefix));
        debug!(target: "query", prefix = %prefix, invalidated = n, "invalidate");
        n
    }

    pub fn remove(&self, key: &QueryKey) {
        let mut st = self.inner.state.lock();
        st.entries.remove(key);
        st.in_flight.remove(key);
    }

    /// Drop everything, e.g. when the session ends.
    pub fn clear(&self) {
        let mut st = self.inner.state.lock();
        st.entries.clear();
        st.in_flight.clear();
        st.clears += 1;
        debug!(target: "query", "cache cleared");
    }

    /// Run a mutation. Callers invalidate affected keys on success.
    pub async fn mutate<T, Fut>(&self, fut: Fut) -> ApiResult<T>
    where
        Fut: Future<Output = ApiResult<T>>,
    {
        let out = fut.await;
        if let Err(e) = &out { debug!(target: "query", error = %e, "mutation failed"); }
        out
    }

    /// Run a mutation and, only if it succeeds, invalidate each given key prefix.
    pub async fn mutate_and_invalidate<T, Fut>(&self, fut: Fut, keys: &[QueryKey]) -> ApiResult<T>
    where
        Fut: Future<Output = ApiResult<T>>,
    {
        let out = self.mutate(fut).await?;
        for k in keys { self.invalidate(k); }
        Ok(out)
    }

    /// Last stored value for a key without triggering a fetch.
    pub fn cached<T: Send + Sync + 'static>(&self, key: &QueryKey) -> Option<Arc<T>> {
        let data = self.inner.state.lock().entries.get(key)?.data.clone()?;
        data.downcast::<T>().ok()
    }

    pub fn is_invalidated(&self, key: &QueryKey) -> bool {
        self.inner.state.lock().entries.get(key).map(|e| e.invalidated).unwrap_or(false)
    }

    pub fn status(&self, key: &QueryKey) -> QueryStatus {
        let st = self.inner.state.lock();
        let entry = st.entries.get(key);
        if entry.map(|e| e.error.is_some()).unwrap_or(false) && !st.in_flight.contains_key(key) { return QueryStatus::Error; }
        match (entry.and_then(|e| e.data.as_ref()), st.in_flight.contains_key(key)) {
            (Some(_), _) => QueryStatus::Success,
            (None, true) => QueryStatus::Loading,
            (None, false) => QueryStatus::Idle,
        }
    }

    /// Evict every entry idle for longer than `gc_time`. Also runs after each completed fetch.
    pub fn collect_garbage(&self) -> usize {
        self.inner.state.lock().evict_idle(self.inner.defaults.gc_time)
    }

    pub fn len(&self) -> usize { self.inner.state.lock().entries.values().filter(|e| e.data.is_some()).count() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

impl Inner {
    fn complete(&self, key: &QueryKey, id: u64, epoch: (u64, u64), result: &Result<AnyValue, ApiError>) {
        let mut st = self.state.lock();
        if st.in_flight.get(key).map(|(i, _)| *i == id).unwrap_or(false) {
            st.in_flight.remove(key);
        }
        if st.clears != epoch.0 { return; }
        if let Some(entry) = st.entries.get_mut(key) {
            if entry.epoch != epoch.1 {
                debug!(target: "query", key = %key, "result predates invalidation, not stored");
            } else {
                match result {
                    Ok(v) => {
                        entry.data = Some(v.clone());
                        entry.error = None;
                        entry.updated_at = Some(Instant::now());
                        entry.invalidated = false;
                    }
                    Err(e) => entry.error = Some(e.clone()),
                }
                entry.touched_at = Instant::now();
            }
        }
        let evicted = st.evict_idle(self.defaults.gc_time);
        if evicted > 0 { debug!(target: "query", evicted, "evicted idle entries"); }
    }
}

fn typed<T: Send + Sync + 'static>(key: &QueryKey, value: Result<AnyValue, ApiError>, is_fetching: bool) -> QueryResult<T> {
    match value.and_then(|v| v.downcast::<T>().map_err(|_| ApiError::decode("query_type_mismatch".to_string(), format!("key {} holds a different type", key)))) {
        Ok(data) => QueryResult { data: Some(data), error: None, is_loading: false, is_fetching },
        Err(e) => QueryResult { data: None, error: Some(e), is_loading: false, is_fetching },
    }
}

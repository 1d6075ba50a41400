// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Cached async resources with deduplicated fetches and interval refresh.
//!
//! Every per-user read (profile, subscription, readings, jobs, forecasts) goes
//! through one [`QueryCache`] instance per row type. Each key owns a watch
//! channel holding the latest [`QueryState`]; at most one fetch per key is in
//! flight, and every caller that arrives while it runs awaits the same result.

use crate::error::AppError;
use crate::models::{Forecast, Job, Profile, Reading, Subscription};
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Query kinds used as the first component of a [`QueryKey`].
pub mod kinds {
    pub const PROFILE: &str = "profile";
    pub const SUBSCRIPTION: &str = "subscription";
    pub const READINGS: &str = "readings";
    pub const JOBS: &str = "jobs";
    pub const FORECASTS: &str = "forecasts";
}

/// Cache key: (resource kind, user id, optional filter discriminator).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    pub kind: &'static str,
    pub user_id: String,
    pub filter: Option<String>,
}

impl QueryKey {
    pub fn new(kind: &'static str, user_id: impl Into<String>) -> Self {
        Self {
            kind,
            user_id: user_id.into(),
            filter: None,
        }
    }

    pub fn with_filter(kind: &'static str, user_id: impl Into<String>, filter: String) -> Self {
        Self {
            kind,
            user_id: user_id.into(),
            filter: Some(filter),
        }
    }
}

/// Snapshot of one cached resource.
#[derive(Debug)]
pub struct QueryState<T> {
    /// Last successfully fetched value (kept across failed refreshes)
    pub data: Option<Arc<T>>,
    /// Error from the most recent fetch, cleared on success
    pub error: Option<String>,
    pub fetching: bool,
    pub updated_at: Option<Instant>,
    /// Set by `invalidate`; forces the next `get` to refetch
    pub stale: bool,
}

// Manual impls: `T` itself need not be Clone or Default.
impl<T> Clone for QueryState<T> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            error: self.error.clone(),
            fetching: self.fetching,
            updated_at: self.updated_at,
            stale: self.stale,
        }
    }
}

impl<T> Default for QueryState<T> {
    fn default() -> Self {
        Self {
            data: None,
            error: None,
            fetching: false,
            updated_at: None,
            stale: false,
        }
    }
}

impl<T> QueryState<T> {
    /// No value and no error yet: the first fetch has not settled.
    pub fn is_loading(&self) -> bool {
        self.data.is_none() && self.error.is_none()
    }

    /// Whether the snapshot can be served without refetching.
    pub fn is_fresh(&self, max_age: Duration) -> bool {
        self.data.is_some()
            && !self.stale
            && self
                .updated_at
                .is_some_and(|updated| updated.elapsed() < max_age)
    }

    /// Last-known data, or the error that kept any from loading.
    pub fn into_data(self) -> Result<Arc<T>, AppError> {
        match (self.data, self.error) {
            (Some(data), _) => Ok(data),
            (None, Some(error)) => Err(AppError::Store(error)),
            (None, None) => Err(AppError::Internal(anyhow::anyhow!("Query has not loaded"))),
        }
    }
}

struct Entry<T> {
    tx: watch::Sender<QueryState<T>>,
}

/// Generic per-key cache of async resources.
pub struct QueryCache<T> {
    entries: Arc<DashMap<QueryKey, Arc<Entry<T>>>>,
}

impl<T> Clone for QueryCache<T> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl<T> Default for QueryCache<T> {
    fn default() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
        }
    }
}

impl<T: Send + Sync + 'static> QueryCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, key: &QueryKey) -> Arc<Entry<T>> {
        self.entries
            .entry(key.clone())
            .or_insert_with(|| {
                let (tx, _) = watch::channel(QueryState::default());
                Arc::new(Entry { tx })
            })
            .clone()
    }

    /// Run `fut` for `key` unless a fetch is already in flight, then wait for
    /// whichever fetch is running to settle.
    ///
    /// The fetch runs on its own task: a caller that goes away does not
    /// cancel it, and its result still lands in the cache.
    pub async fn fetch<F>(&self, key: &QueryKey, fut: F) -> QueryState<T>
    where
        F: Future<Output = Result<T, AppError>> + Send + 'static,
    {
        let entry = self.entry(key);
        let mut rx = entry.tx.subscribe();

        let claimed = entry.tx.send_if_modified(|state| {
            if state.fetching {
                false
            } else {
                state.fetching = true;
                true
            }
        });

        if claimed {
            let guard = FetchGuard {
                entry: entry.clone(),
                kind: key.kind,
                settled: false,
            };
            tokio::spawn(async move {
                let result = fut.await;
                guard.settle(result);
            });
        } else {
            tracing::trace!(kind = key.kind, user_id = %key.user_id, "Joining in-flight fetch");
        }

        let settled = rx.wait_for(|state| !state.fetching).await.map(|s| s.clone());
        settled.unwrap_or_else(|_| entry.tx.borrow().clone())
    }

    /// Return the cached snapshot if it is younger than `max_age`, otherwise
    /// fetch with `fetcher`.
    pub async fn get<F, Fut>(&self, key: &QueryKey, max_age: Duration, fetcher: F) -> QueryState<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, AppError>> + Send + 'static,
    {
        if let Some(state) = self.peek(key) {
            if state.is_fresh(max_age) {
                return state;
            }
        }
        self.fetch(key, fetcher()).await
    }

    /// Replace the snapshot with a known value (e.g. a mutation's result).
    pub fn set(&self, key: &QueryKey, value: T) {
        self.entry(key).tx.send_modify(|state| {
            state.data = Some(Arc::new(value));
            state.error = None;
            state.updated_at = Some(Instant::now());
            state.stale = false;
        });
    }

    /// Mark the snapshot stale so the next `get` refetches. Data stays visible.
    pub fn invalidate(&self, key: &QueryKey) {
        if let Some(entry) = self.entries.get(key) {
            entry.tx.send_modify(|state| state.stale = true);
        }
    }

    /// Drop every entry belonging to `user_id`.
    pub fn evict_user(&self, user_id: &str) {
        self.entries.retain(|key, _| key.user_id != user_id);
    }

    /// Drop entries nobody watches that have not settled a fetch within
    /// `max_idle`. Returns how many were removed.
    pub fn sweep(&self, max_idle: Duration) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| {
            let state = entry.tx.borrow();
            entry.tx.receiver_count() > 0
                || state.fetching
                || state
                    .updated_at
                    .is_some_and(|updated| updated.elapsed() < max_idle)
        });
        before.saturating_sub(self.entries.len())
    }

    pub fn peek(&self, key: &QueryKey) -> Option<QueryState<T>> {
        self.entries.get(key).map(|entry| entry.tx.borrow().clone())
    }

    /// Watch every snapshot change for `key`.
    pub fn subscribe(&self, key: &QueryKey) -> watch::Receiver<QueryState<T>> {
        self.entry(key).tx.subscribe()
    }

    /// Fetch immediately, then every `interval` until the handle is dropped.
    pub fn poll<F, Fut>(&self, key: QueryKey, interval: Duration, fetcher: F) -> PollHandle
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, AppError>> + Send + 'static,
    {
        let cache = self.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                cache.fetch(&key, fetcher()).await;
            }
        });
        PollHandle { task }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Resets `fetching` if the fetch task dies before settling.
struct FetchGuard<T> {
    entry: Arc<Entry<T>>,
    kind: &'static str,
    settled: bool,
}

impl<T> FetchGuard<T> {
    fn settle(mut self, result: Result<T, AppError>) {
        self.settled = true;
        match result {
            Ok(data) => self.entry.tx.send_modify(|state| {
                state.data = Some(Arc::new(data));
                state.error = None;
                state.fetching = false;
                state.updated_at = Some(Instant::now());
                state.stale = false;
            }),
            Err(e) => {
                tracing::warn!(kind = self.kind, error = %e, "Query fetch failed, keeping last snapshot");
                self.entry.tx.send_modify(|state| {
                    state.error = Some(e.to_string());
                    state.fetching = false;
                });
            }
        }
    }
}

impl<T> Drop for FetchGuard<T> {
    fn drop(&mut self) {
        if !self.settled {
            self.entry.tx.send_modify(|state| {
                state.fetching = false;
                if state.error.is_none() {
                    state.error = Some("fetch aborted".to_string());
                }
            });
        }
    }
}

/// Keeps an interval refresh alive. Dropping it stops scheduling new fetches;
/// a fetch already in flight still completes into the cache.
#[derive(Debug)]
pub struct PollHandle {
    task: JoinHandle<()>,
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// One cache per row type.
#[derive(Clone, Default)]
pub struct Queries {
    pub profiles: QueryCache<Option<Profile>>,
    pub subscriptions: QueryCache<Option<Subscription>>,
    pub readings: QueryCache<Vec<Reading>>,
    pub jobs: QueryCache<Vec<Job>>,
    pub forecasts: QueryCache<Vec<Forecast>>,
}

impl Queries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Session teardown: forget everything cached for `user_id`.
    pub fn evict_user(&self, user_id: &str) {
        self.profiles.evict_user(user_id);
        self.subscriptions.evict_user(user_id);
        self.readings.evict_user(user_id);
        self.jobs.evict_user(user_id);
        self.forecasts.evict_user(user_id);
        tracing::debug!(user_id, "Evicted cached queries");
    }

    /// Drop idle, unwatched entries from every cache.
    pub fn sweep(&self, max_idle: Duration) -> usize {
        self.profiles.sweep(max_idle)
            + self.subscriptions.sweep(max_idle)
            + self.readings.sweep(max_idle)
            + self.jobs.sweep(max_idle)
            + self.forecasts.sweep(max_idle)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
            + self.subscriptions.len()
            + self.readings.len()
            + self.jobs.len()
            + self.forecasts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

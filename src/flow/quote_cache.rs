use std::fmt::Display;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{Quote, QuoteKey};

/// Result of looking up the quote for a key.
#[derive(Debug, Clone, PartialEq)]
pub enum QuoteLookup {
    /// Empty amount: nothing to quote.
    Empty,
    /// A request for this key is already on the wire.
    Pending,
    Ready(Quote),
    /// The request for this key failed; it is not retried until the key changes.
    Failed,
    /// The key changed while this request was in flight; its result was dropped.
    Superseded,
}

/// Outcome of a quote lookup without the quote itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteStatus {
    Empty,
    Pending,
    Ready,
    Failed,
    Superseded,
}

impl QuoteLookup {
    pub fn status(&self) -> QuoteStatus {
        match self {
            QuoteLookup::Empty => QuoteStatus::Empty,
            QuoteLookup::Pending => QuoteStatus::Pending,
            QuoteLookup::Ready(_) => QuoteStatus::Ready,
            QuoteLookup::Failed => QuoteStatus::Failed,
            QuoteLookup::Superseded => QuoteStatus::Superseded,
        }
    }

    pub fn into_quote(self) -> Option<Quote> {
        match self {
            QuoteLookup::Ready(q) => Some(q),
            _ => None,
        }
    }
}

#[derive(Debug)]
enum Entry {
    Vacant,
    InFlight,
    Ready(Quote),
    Failed,
}

#[derive(Debug)]
struct CacheInner {
    key: Option<QuoteKey>,
    /// Bumped whenever the current entry is invalidated.
    generation: u64,
    entry: Entry,
}

/// Single-slot quote cache keyed by (sell token, buy token, account, amount).
///
/// Only the most recent key is kept. Changing the key drops the previous
/// entry and any response still in flight for it.
#[derive(Debug)]
pub struct QuoteCache {
    inner: Mutex<CacheInner>,
}

impl Default for QuoteCache {
    fn default() -> Self {
        Self::new()
    }
}

impl QuoteCache {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                key: None,
                generation: 0,
                entry: Entry::Vacant,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the cached quote for `key`, or run `fetch` once to obtain it.
    ///
    /// Expired quotes are evicted and refetched; failures are remembered.
    pub async fn resolve<F, Fut, E>(&self, key: QuoteKey, now: DateTime<Utc>, fetch: F) -> QuoteLookup
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Quote, E>>,
        E: Display,
    {
        let generation = {
            let mut locked = self.lock();
            let inner = &mut *locked;
            if inner.key.as_ref() != Some(&key) {
                tracing::debug!(key = %key, "Quote key changed, invalidating cache");
                inner.key = Some(key.clone());
                inner.generation += 1;
                inner.entry = Entry::Vacant;
            }

            if key.is_empty() {
                return QuoteLookup::Empty;
            }

            match &inner.entry {
                Entry::Ready(q) if q.is_fresh(now) => return QuoteLookup::Ready(q.clone()),
                Entry::Ready(q) => {
                    tracing::debug!(expired_at = %q.expires_at, "Cached quote expired, refetching");
                    inner.generation += 1;
                }
                Entry::InFlight => return QuoteLookup::Pending,
                Entry::Failed => return QuoteLookup::Failed,
                Entry::Vacant => {}
            }

            inner.entry = Entry::InFlight;
            inner.generation
        };

        let mut guard = InFlightGuard {
            cache: self,
            generation,
            armed: true,
        };
        let result = fetch().await;
        guard.armed = false;

        let mut inner = self.lock();
        if inner.generation != generation {
            tracing::debug!(key = %key, "Discarding superseded quote response");
            return QuoteLookup::Superseded;
        }

        match result {
            Ok(quote) => {
                inner.entry = Entry::Ready(quote.clone());
                QuoteLookup::Ready(quote)
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Quote request failed");
                inner.entry = Entry::Failed;
                QuoteLookup::Failed
            }
        }
    }

    /// The quote for `key` if it is cached and still fresh. Never fetches.
    pub fn current(&self, key: &QuoteKey, now: DateTime<Utc>) -> Option<Quote> {
        let inner = self.lock();
        if inner.key.as_ref() != Some(key) {
            return None;
        }
        match &inner.entry {
            Entry::Ready(q) if q.is_fresh(now) => Some(q.clone()),
            _ => None,
        }
    }

    /// Like [`current`](Self::current) but also returns an expired quote.
    pub fn peek(&self, key: &QuoteKey) -> Option<Quote> {
        let inner = self.lock();
        match (&inner.key, &inner.entry) {
            (Some(k), Entry::Ready(q)) if k == key => Some(q.clone()),
            _ => None,
        }
    }

    /// Forget everything, including responses still in flight.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.key = None;
        inner.generation += 1;
        inner.entry = Entry::Vacant;
    }
}

/// Resets an in-flight entry if the request future is dropped before
/// completing, so the key can be fetched again.
struct InFlightGuard<'a> {
    cache: &'a QuoteCache,
    generation: u64,
    armed: bool,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut inner = self.cache.lock();
        if inner.generation == self.generation && matches!(inner.entry, Entry::InFlight) {
            inner.entry = Entry::Vacant;
        }
    }
}

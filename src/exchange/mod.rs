// src/exchange/mod.rs

//! Cross-rule data exchange.
//!
//! A single [`ExchangeStore`] is shared by every run that the owning
//! [`RuleEngine`](crate::engine::RuleEngine) (or several engines, if the
//! caller hands the same `Arc` to each) executes. Entries are keyed by
//! `(RunId, key)`, so concurrently executing runs never see each other's
//! values.
//!
//! Reads block until the value shows up or the timeout elapses. Writers
//! wake blocked readers through a condition variable (synchronous readers)
//! and a [`Notify`] (asynchronous readers); nobody polls.
//!
//! Entries are never expired. A long-lived store grows with every key
//! written; callers pick keys accordingly.

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tokio::sync::Notify;
use tracing::{debug, trace};
use ulid::Ulid;

use crate::errors::{EngineError, Result};
use crate::rule::Payload;

/// Identifier of one engine run.
///
/// Generated fresh for every `execute` call and stamped onto every rule of
/// that run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RunId(Ulid);

impl RunId {
    pub fn new() -> Self {
        RunId(Ulid::new())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

type ExchangeKey = (RunId, String);

/// Run-scoped key/value side channel with blocking, timeout-bounded reads.
#[derive(Default)]
pub struct ExchangeStore {
    entries: Mutex<HashMap<ExchangeKey, Payload>>,
    changed: Condvar,
    notify: Notify,
}

impl fmt::Debug for ExchangeStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExchangeStore")
            .field("entries", &self.len())
            .finish_non_exhaustive()
    }
}

impl ExchangeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store or overwrite `value` under `(run, key)` and wake every waiting
    /// reader.
    pub fn put(&self, run: RunId, key: impl Into<String>, value: Payload) {
        let key = key.into();
        trace!(run_id = %run, key = %key, "exchange put");
        {
            let mut entries = self.entries.lock();
            entries.insert((run, key), value);
        }
        self.changed.notify_all();
        self.notify.notify_waiters();
    }

    /// Non-blocking lookup.
    pub fn peek(&self, run: RunId, key: &str) -> Option<Payload> {
        self.entries.lock().get(&(run, key.to_string())).cloned()
    }

    /// Block the calling thread until `(run, key)` holds a value, or fail
    /// with [`EngineError::ExchangeTimeout`] once `timeout` has elapsed.
    ///
    /// A timeout too large to form a deadline (`Duration::MAX`) waits
    /// without one. Do not call this from an async task; use
    /// [`get_async`](Self::get_async).
    pub fn get(&self, run: RunId, key: &str, timeout: Duration) -> Result<Payload> {
        let lookup = (run, key.to_string());

        let mut entries = self.entries.lock();
        if let Some(value) = entries.get(&lookup) {
            return Ok(value.clone());
        }

        let deadline = Instant::now().checked_add(timeout);
        loop {
            match deadline {
                Some(deadline) => {
                    if self.changed.wait_until(&mut entries, deadline).timed_out() {
                        // A writer may have slipped in right at the deadline.
                        return entries
                            .get(&lookup)
                            .cloned()
                            .ok_or_else(|| timed_out(run, key, timeout));
                    }
                }
                None => self.changed.wait(&mut entries),
            }
            if let Some(value) = entries.get(&lookup) {
                return Ok(value.clone());
            }
        }
    }

    /// Asynchronous counterpart of [`get`](Self::get) with the same
    /// timeout contract.
    pub async fn get_async(&self, run: RunId, key: &str, timeout: Duration) -> Result<Payload> {
        if let Some(value) = self.peek(run, key) {
            return Ok(value);
        }

        let deadline = tokio::time::Instant::now().checked_add(timeout);
        loop {
            // Register interest before looking, so a put between the lookup
            // and the await still wakes us.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(value) = self.peek(run, key) {
                return Ok(value);
            }

            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        return self.peek(run, key).ok_or_else(|| timed_out(run, key, timeout));
                    }
                }
                None => notified.await,
            }
        }
    }

    /// Number of entries across all runs.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn timed_out(run: RunId, key: &str, timeout: Duration) -> EngineError {
    debug!(run_id = %run, key, ?timeout, "exchange read timed out");
    EngineError::ExchangeTimeout {
        key: key.to_string(),
        timeout,
    }
}

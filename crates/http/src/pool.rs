//! Per-client connection pool.
//!
//! Idle connections are stored per `(scheme, host, port)` key in a bounded
//! deque, newest first. The pool only ever hands a connection to one
//! borrower at a time: `checkout` removes it, `release` puts it back when
//! the exchange left it reusable. Closing the pool drops every idle
//! connection and makes further checkouts fail with [`Error::PoolClosed`].

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tracing::{debug, trace};

use crate::connection::HttpConnection;
use crate::error::Error;
use crate::uri::ConnectionKey;

const DEFAULT_MAX_IDLE_PER_KEY: usize = 8;

/// A cloneable handle to the client's idle-connection store.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<Mutex<PoolInner>>,
}

struct PoolInner {
    idle: HashMap<ConnectionKey, VecDeque<IdleConnection>>,
    max_idle_per_key: usize,
    closed: bool,
}

struct IdleConnection {
    connection: HttpConnection,
    since: Instant,
}

impl Pool {
    pub fn new(max_idle_per_key: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(PoolInner {
                idle: HashMap::new(),
                max_idle_per_key,
                closed: false,
            })),
        }
    }

    /// A pool that disables reuse entirely: every release closes.
    pub fn disabled() -> Self {
        Self::new(0)
    }

    /// Takes an idle connection for `key`, if one is available. Errors only
    /// when the pool is closed.
    pub fn checkout(&self, key: &ConnectionKey) -> Result<Option<HttpConnection>, Error> {
        let mut inner = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if inner.closed {
            return Err(Error::PoolClosed);
        }
        let idle = match inner.idle.get_mut(key) {
            Some(deque) => deque.pop_front(),
            None => None,
        };
        match idle {
            Some(entry) => {
                trace!(%key, idle_for = ?entry.since.elapsed(), "reusing pooled connection");
                Ok(Some(entry.connection))
            }
            None => Ok(None),
        }
    }

    /// Returns a connection after an exchange. Connections that are not
    /// reusable, or that exceed the per-key bound, are dropped (closed).
    pub fn release(&self, key: ConnectionKey, connection: HttpConnection) {
        if !connection.is_reusable() {
            trace!(%key, "dropping non-reusable connection");
            return;
        }
        let mut inner = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if inner.closed {
            return;
        }
        let max = inner.max_idle_per_key;
        let deque = inner.idle.entry(key).or_default();
        if deque.len() >= max {
            trace!("idle bound reached, closing connection instead of pooling");
            return;
        }
        deque.push_front(IdleConnection { connection, since: Instant::now() });
    }

    /// Drops all idle connections and rejects future checkouts.
    pub fn close(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if !inner.closed {
            debug!(idle = inner.idle.values().map(VecDeque::len).sum::<usize>(), "closing pool");
        }
        inner.closed = true;
        inner.idle.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).closed
    }

    /// Number of idle connections currently stored for `key`.
    pub fn idle_count(&self, key: &ConnectionKey) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .idle
            .get(key)
            .map(VecDeque::len)
            .unwrap_or(0)
    }
}

impl Default for Pool {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_IDLE_PER_KEY)
    }
}

//! Connection pooling for clients.
//!
//! A [`ConnectionPool`] holds at most one live connection per [`PoolKey`]. The pool is
//! owned by whoever makes the calls and is only mutated through `&mut`, so a
//! connection is never handed to two callers at once. There is no capacity bound
//! and no idle timeout: entries live until they are evicted, the pool is reset or
//! dropped, or the peer is found to have closed the connection.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;

use tracing::{debug, info, trace};

mod key;

pub use self::key::PoolKey;
use super::conn::HttpConnection;

/// A connection which can be stored in a [`ConnectionPool`].
pub trait PoolableConnection: Send + 'static {
    /// Whether the connection can still carry requests.
    fn is_open(&self) -> bool;
}

/// A pool of connections to remote hosts.
pub struct ConnectionPool<C = HttpConnection> {
    connections: HashMap<PoolKey, C>,
}

impl<C> fmt::Debug for ConnectionPool<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("keys", &self.connections.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<C> Default for ConnectionPool<C> {
    fn default() -> Self {
        Self {
            connections: HashMap::new(),
        }
    }
}

impl<C: PoolableConnection> ConnectionPool<C> {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the connection for `key`, running `connect` when there is none.
    ///
    /// A cached connection which the peer has closed is dropped and replaced. When
    /// `connect` fails, the pool is left without an entry for `key`.
    pub async fn acquire<F, Fut, E>(&mut self, key: &PoolKey, connect: F) -> Result<&mut C, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<C, E>>,
    {
        if let Some(conn) = self.connections.get(key) {
            if conn.is_open() {
                debug!(%key, "pooled connection found");
            } else {
                trace!(%key, "pooled connection closed by peer");
                self.connections.remove(key);
            }
        }

        match self.connections.entry(key.clone()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                debug!(%key, "creating pooled connection");
                let conn = connect().await?;
                Ok(entry.insert(conn))
            }
        }
    }

    /// Remove the connection for `key`, returning it.
    pub fn evict(&mut self, key: &PoolKey) -> Option<C> {
        let conn = self.connections.remove(key);
        if conn.is_some() {
            info!(%key, "evicting pooled connection");
        }
        conn
    }

    /// Close every pooled connection.
    pub fn reset(&mut self) {
        trace!(len = self.connections.len(), "resetting pool");
        self.connections.clear();
    }

    /// Number of pooled connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether the pool holds no connections.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Whether a connection for `key` is pooled.
    pub fn contains(&self, key: &PoolKey) -> bool {
        self.connections.contains_key(key)
    }
}

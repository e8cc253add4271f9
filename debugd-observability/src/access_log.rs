use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Mutex, MutexGuard};

/// Structured access log entry. Field order is the `/logs` wire order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessLogEntry {
    pub timestamp: String,
    pub method: String,
    /// Raw request target, query string included.
    pub path: String,
    pub client_address: String,
    pub client_port: u16,
    pub user_agent: String,
    pub referer: String,
    pub host: String,
}

impl AccessLogEntry {
    /// Build an entry from a parsed request head. Missing `User-Agent`,
    /// `Referer` and `Host` headers are recorded as empty strings.
    pub fn from_request(
        timestamp: String,
        method: &str,
        path: &str,
        peer: SocketAddr,
        headers: &[(&str, &str)],
    ) -> Self {
        let header = |name: &str| {
            headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| (*v).to_string())
                .unwrap_or_default()
        };
        Self {
            timestamp,
            method: method.to_string(),
            path: path.to_string(),
            client_address: peer.ip().to_string(),
            client_port: peer.port(),
            user_agent: header("user-agent"),
            referer: header("referer"),
            host: header("host"),
        }
    }
}

/// Where the request handler records access entries.
///
/// Implementations must serialize `append` and `snapshot` against each
/// other, and `snapshot` must hand back an owned copy.
pub trait AccessLogStore: Send + Sync {
    fn append(&self, entry: AccessLogEntry);
    fn snapshot(&self) -> Vec<AccessLogEntry>;
}

/// Bounded FIFO of the most recent access entries, oldest first.
///
/// Once `capacity` is reached every append evicts the oldest entry.
pub struct AccessLogBuffer {
    capacity: usize,
    entries: Mutex<VecDeque<AccessLogEntry>>,
}

impl AccessLogBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // A panic while holding the lock cannot leave the deque half-updated,
    // so a poisoned lock is still safe to use.
    fn lock(&self) -> MutexGuard<'_, VecDeque<AccessLogEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl AccessLogStore for AccessLogBuffer {
    fn append(&self, entry: AccessLogEntry) {
        let mut entries = self.lock();
        entries.push_back(entry);
        while entries.len() > self.capacity {
            entries.pop_front();
        }
    }

    fn snapshot(&self) -> Vec<AccessLogEntry> {
        self.lock().iter().cloned().collect()
    }
}

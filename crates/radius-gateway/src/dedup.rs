//! Duplicate request suppression
//!
//! A NAS retransmits a request it got no answer for with the same
//! identifier and authenticator (RFC 2865 Section 2). Requests already seen
//! within the window are dropped and counted, so a slow backend is not asked
//! twice for the same work.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::time;
use tracing::debug;

/// Identity of a request on the wire
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct RequestFingerprint {
    pub listener: String,
    pub source: SocketAddr,
    pub identifier: u8,
    pub authenticator: [u8; 16],
}

impl RequestFingerprint {
    pub fn new(listener: &str, source: SocketAddr, identifier: u8, authenticator: [u8; 16]) -> Self {
        RequestFingerprint {
            listener: listener.to_string(),
            source,
            identifier,
            authenticator,
        }
    }
}

/// Window of recently seen requests
///
/// Expired entries are removed by a background task running four times per
/// TTL; when the window is full an arbitrary entry is evicted.
pub struct DedupCache {
    entries: Arc<DashMap<RequestFingerprint, Instant>>,
    ttl: Duration,
    max_entries: usize,
    dropped: AtomicU64,
    cleanup_running: Arc<AtomicBool>,
}

impl DedupCache {
    /// Must be called within a tokio runtime
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self::new_internal(ttl, max_entries, true)
    }

    #[cfg(test)]
    fn new_no_background(ttl: Duration, max_entries: usize) -> Self {
        Self::new_internal(ttl, max_entries, false)
    }

    fn new_internal(ttl: Duration, max_entries: usize, start_background: bool) -> Self {
        let entries: Arc<DashMap<RequestFingerprint, Instant>> = Arc::new(DashMap::new());
        let cleanup_running = Arc::new(AtomicBool::new(start_background));

        if start_background {
            let entries = Arc::clone(&entries);
            let running = Arc::clone(&cleanup_running);
            let cleanup_interval = (ttl / 4).max(Duration::from_millis(10));

            tokio::spawn(async move {
                let mut interval = time::interval(cleanup_interval);
                interval.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

                while running.load(Ordering::Relaxed) {
                    interval.tick().await;
                    let before = entries.len();
                    entries.retain(|_, seen_at| seen_at.elapsed() <= ttl);
                    let removed = before.saturating_sub(entries.len());
                    if removed > 0 {
                        debug!(removed = removed, remaining = entries.len(), "Dedup window cleanup");
                    }
                }
            });
        }

        DedupCache {
            entries,
            ttl,
            max_entries,
            dropped: AtomicU64::new(0),
            cleanup_running,
        }
    }

    /// Record the request; `true` if it was already seen within the window
    ///
    /// Lookup and insert happen under one shard lock, so of several copies
    /// racing on different tasks exactly one is admitted.
    pub fn check_and_insert(&self, fingerprint: RequestFingerprint) -> bool {
        if self.entries.len() >= self.max_entries && !self.entries.contains_key(&fingerprint) {
            let victim = self.entries.iter().next().map(|entry| entry.key().clone());
            if let Some(victim) = victim {
                self.entries.remove(&victim);
            }
        }

        let now = Instant::now();
        match self.entries.entry(fingerprint) {
            Entry::Occupied(mut entry) => {
                if now.duration_since(*entry.get()) <= self.ttl {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    true
                } else {
                    entry.insert(now);
                    false
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
                false
            }
        }
    }

    /// Requests dropped as duplicates since startup
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Drop for DedupCache {
    fn drop(&mut self) {
        self.cleanup_running.store(false, Ordering::Relaxed);
    }
}

//! Process-local resolution cache sitting in front of the registry store.
//!
//! Entries are only ever written from an authoritative store hit. There are
//! no negative entries: an absent key means "ask the store".

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use crate::record::ServiceRecord;

/// How the cache bounds itself. Chosen once, at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvictionPolicy {
    /// Entries live for the lifetime of the process.
    #[default]
    Unbounded,
    /// Keep at most this many entries, evicting the oldest insert first.
    MaxEntries(usize),
    /// Entries older than this are treated as absent and dropped on the
    /// next read of that key or the next insert of a new key.
    Ttl(Duration),
}

struct CacheEntry {
    record: Arc<ServiceRecord>,
    inserted_at_ms: u64,
    /// Insertion order, used to pick a victim under `MaxEntries`.
    seq: u64,
}

/// Concurrent identifier -> record map.
///
/// Records are shared behind `Arc`, so a reader always sees a fully built
/// record. Two concurrent `put`s for the same identifier race; the last
/// writer wins.
pub struct ResolutionCache {
    entries: DashMap<String, CacheEntry>,
    policy: EvictionPolicy,
    next_seq: AtomicU64,
}

impl Default for ResolutionCache {
    fn default() -> Self {
        Self::new(EvictionPolicy::default())
    }
}

impl ResolutionCache {
    pub fn new(policy: EvictionPolicy) -> Self {
        Self {
            entries: DashMap::new(),
            policy,
            next_seq: AtomicU64::new(0),
        }
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }

    /// Look up a record. Never performs I/O.
    pub fn get(&self, id: &str) -> Option<Arc<ServiceRecord>> {
        self.get_at(id, current_time_ms())
    }

    /// Insert or overwrite the record for `id`.
    pub fn put(&self, id: &str, record: Arc<ServiceRecord>) {
        self.put_at(id, record, current_time_ms())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn get_at(&self, id: &str, now_ms: u64) -> Option<Arc<ServiceRecord>> {
        {
            let entry = self.entries.get(id)?;
            if self.is_fresh(&entry, now_ms) {
                return Some(Arc::clone(&entry.record));
            }
        }
        // Read guard released above. Re-check so a concurrent refresh survives.
        self.entries
            .remove_if(id, |_, entry| !self.is_fresh(entry, now_ms));
        None
    }

    fn put_at(&self, id: &str, record: Arc<ServiceRecord>, now_ms: u64) {
        match self.policy {
            EvictionPolicy::MaxEntries(0) => return,
            EvictionPolicy::MaxEntries(max) => {
                if !self.entries.contains_key(id) {
                    while self.entries.len() >= max {
                        if !self.evict_oldest() {
                            break;
                        }
                    }
                }
            }
            EvictionPolicy::Ttl(_) => {
                if !self.entries.contains_key(id) {
                    self.entries.retain(|_, entry| self.is_fresh(entry, now_ms));
                }
            }
            EvictionPolicy::Unbounded => {}
        }

        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        self.entries.insert(
            id.to_string(),
            CacheEntry {
                record,
                inserted_at_ms: now_ms,
                seq,
            },
        );
    }

    /// Remove the entry with the lowest insertion sequence.
    /// Returns false if the cache was empty.
    fn evict_oldest(&self) -> bool {
        let victim = self
            .entries
            .iter()
            .min_by_key(|entry| entry.seq)
            .map(|entry| entry.key().clone());

        match victim {
            Some(key) => {
                tracing::debug!(id = %key, "evicting cache entry");
                self.entries.remove(&key);
                true
            }
            None => false,
        }
    }

    fn is_fresh(&self, entry: &CacheEntry, now_ms: u64) -> bool {
        match self.policy {
            EvictionPolicy::Ttl(ttl) => {
                now_ms.saturating_sub(entry.inserted_at_ms) < ttl.as_millis() as u64
            }
            EvictionPolicy::Unbounded | EvictionPolicy::MaxEntries(_) => true,
        }
    }
}

fn current_time_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

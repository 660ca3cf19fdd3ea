//! RegistryStore trait and the in-memory implementation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tokio::sync::RwLock;

use crate::record::ServiceRecord;

/// Errors a registry backend can report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backend could not be reached, timed out, or failed server-side.
    Unavailable(String),
    /// A record with this identifier already exists.
    Duplicate(String),
    /// The backend refused the record as malformed.
    Rejected(String),
    /// Anything else, e.g. an unparseable response.
    Backend(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Unavailable(e) => write!(f, "registry unavailable: {}", e),
            StoreError::Duplicate(id) => write!(f, "service '{}' is already registered", id),
            StoreError::Rejected(e) => write!(f, "rejected by registry: {}", e),
            StoreError::Backend(e) => write!(f, "registry error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {}

/// Durable source of truth for service records.
#[async_trait::async_trait]
pub trait RegistryStore: Send + Sync {
    /// Look up a record. `Ok(None)` means the store answered and has no match.
    async fn find_by_identifier(&self, id: &str) -> Result<Option<ServiceRecord>, StoreError>;

    /// Persist a new record.
    async fn insert(&self, record: ServiceRecord) -> Result<(), StoreError>;
}

/// Registry held in process memory, optionally seeded from config.
///
/// Counts lookups and can be switched "unreachable", which makes it usable
/// as a test double for the resolver.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, ServiceRecord>>,
    find_calls: AtomicUsize,
    unreachable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated with `records`. Later duplicates win.
    pub fn with_records(records: impl IntoIterator<Item = ServiceRecord>) -> Self {
        let map = records
            .into_iter()
            .map(|record| (record.id.clone(), record))
            .collect();
        Self {
            records: RwLock::new(map),
            ..Self::default()
        }
    }

    /// Number of `find_by_identifier` calls made so far.
    pub fn find_calls(&self) -> usize {
        self.find_calls.load(Ordering::SeqCst)
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    fn check_reachable(&self) -> Result<(), StoreError> {
        if self.unreachable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait::async_trait]
impl RegistryStore for MemoryStore {
    async fn find_by_identifier(&self, id: &str) -> Result<Option<ServiceRecord>, StoreError> {
        self.find_calls.fetch_add(1, Ordering::SeqCst);
        self.check_reachable()?;
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn insert(&self, record: ServiceRecord) -> Result<(), StoreError> {
        self.check_reachable()?;
        let mut records = self.records.write().await;
        if records.contains_key(&record.id) {
            return Err(StoreError::Duplicate(record.id));
        }
        records.insert(record.id.clone(), record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_find_missing_returns_none() {
        let store = MemoryStore::new();
        let result = store.find_by_identifier("nope").await;
        assert_eq!(result, Ok(None));
        assert_eq!(store.find_calls(), 1);
    }

    #[tokio::test]
    async fn test_insert_then_find() {
        let store = MemoryStore::new();
        let record = ServiceRecord::new("hello", "hello-world", "http://svc:9000");
        store.insert(record.clone()).await.unwrap();

        let found = store.find_by_identifier("hello").await.unwrap();
        assert_eq!(found, Some(record));
    }

    #[tokio::test]
    async fn test_insert_duplicate_is_rejected() {
        let store = MemoryStore::with_records([ServiceRecord::new("hello", "a", "http://a")]);
        let result = store
            .insert(ServiceRecord::new("hello", "b", "http://b"))
            .await;

        assert_eq!(result, Err(StoreError::Duplicate("hello".to_string())));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_unreachable_store_fails_every_call() {
        let store = MemoryStore::with_records([ServiceRecord::new("hello", "a", "http://a")]);
        store.set_unreachable(true);

        assert!(matches!(
            store.find_by_identifier("hello").await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(matches!(
            store.insert(ServiceRecord::new("x", "x", "http://x")).await,
            Err(StoreError::Unavailable(_))
        ));

        store.set_unreachable(false);
        assert!(store.find_by_identifier("hello").await.unwrap().is_some());
    }
}

//! Turns a service identifier into a service record.
//!
//! Read-through: the cache is consulted first and the registry store only on
//! a miss. Store hits populate the cache. Store misses and store failures are
//! not cached, so an unknown identifier costs one store query per lookup.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::record::{RecordError, ServiceRecord};
use crate::registry::{RegistryStore, ResolutionCache, StoreError};
use crate::stats::{ResolverStats, StatsSnapshot};

/// The only failure `resolve` reports. Covers both "no such service" and
/// "registry unreachable"; callers respond the same way to either.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotFound {
    pub id: String,
}

impl std::fmt::Display for NotFound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "service '{}' not found", self.id)
    }
}

impl std::error::Error for NotFound {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterError {
    Invalid(RecordError),
    /// The store refused the record.
    Rejected(String),
    Duplicate(String),
    Unavailable(String),
}

impl std::fmt::Display for RegisterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegisterError::Invalid(e) => write!(f, "invalid service record: {}", e),
            RegisterError::Rejected(e) => write!(f, "service record rejected: {}", e),
            RegisterError::Duplicate(id) => write!(f, "service '{}' is already registered", id),
            RegisterError::Unavailable(e) => write!(f, "registry unavailable: {}", e),
        }
    }
}

impl std::error::Error for RegisterError {}

impl From<StoreError> for RegisterError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Duplicate(id) => RegisterError::Duplicate(id),
            StoreError::Rejected(msg) => RegisterError::Rejected(msg),
            StoreError::Unavailable(msg) | StoreError::Backend(msg) => {
                RegisterError::Unavailable(msg)
            }
        }
    }
}

/// Internal outcome of a lookup, before it is collapsed to `NotFound`.
#[derive(Debug)]
pub enum Lookup {
    Cached(Arc<ServiceRecord>),
    Fetched(Arc<ServiceRecord>),
    Absent,
    StoreFailed(StoreError),
}

#[derive(Clone)]
pub struct ServiceResolver {
    cache: Arc<ResolutionCache>,
    store: Arc<dyn RegistryStore>,
    stats: Arc<ResolverStats>,
}

impl ServiceResolver {
    pub fn new(cache: Arc<ResolutionCache>, store: Arc<dyn RegistryStore>) -> Self {
        Self {
            cache,
            store,
            stats: Arc::new(ResolverStats::new()),
        }
    }

    /// Resolve `id`, going to the store at most once.
    pub async fn resolve(&self, id: &str) -> Result<Arc<ServiceRecord>, NotFound> {
        match self.lookup(id).await {
            Lookup::Cached(record) | Lookup::Fetched(record) => Ok(record),
            Lookup::Absent | Lookup::StoreFailed(_) => Err(NotFound { id: id.to_string() }),
        }
    }

    /// Same as [`resolve`](Self::resolve) but keeps the reason for a miss.
    pub async fn lookup(&self, id: &str) -> Lookup {
        let start = Instant::now();

        if let Some(record) = self.cache.get(id) {
            let elapsed = start.elapsed();
            self.stats.record_hit(elapsed);
            info!(
                id,
                source = "cache",
                elapsed_ms = as_millis_f64(elapsed),
                "service retrieved"
            );
            return Lookup::Cached(record);
        }

        match self.store.find_by_identifier(id).await {
            Ok(Some(record)) if record.id != id => {
                let elapsed = start.elapsed();
                self.stats.record_store_error(elapsed);
                warn!(
                    id,
                    returned_id = %record.id,
                    elapsed_ms = as_millis_f64(elapsed),
                    "registry returned a record for another identifier"
                );
                Lookup::StoreFailed(StoreError::Backend(format!(
                    "expected record '{}', got '{}'",
                    id, record.id
                )))
            }
            Ok(Some(record)) => {
                let record = Arc::new(record);
                self.cache.put(id, Arc::clone(&record));
                let elapsed = start.elapsed();
                self.stats.record_miss(elapsed);
                info!(
                    id,
                    source = "store",
                    elapsed_ms = as_millis_f64(elapsed),
                    "service retrieved"
                );
                Lookup::Fetched(record)
            }
            Ok(None) => {
                let elapsed = start.elapsed();
                self.stats.record_not_found(elapsed);
                info!(
                    id,
                    elapsed_ms = as_millis_f64(elapsed),
                    "service not found in registry"
                );
                Lookup::Absent
            }
            Err(e) => {
                let elapsed = start.elapsed();
                self.stats.record_store_error(elapsed);
                warn!(
                    id,
                    error = %e,
                    elapsed_ms = as_millis_f64(elapsed),
                    "registry lookup failed"
                );
                Lookup::StoreFailed(e)
            }
        }
    }

    /// Validate and persist a new record. Does not touch the cache.
    pub async fn register(&self, record: ServiceRecord) -> Result<(), RegisterError> {
        record.validate().map_err(RegisterError::Invalid)?;
        let id = record.id.clone();
        self.store.insert(record).await.map_err(|e| {
            warn!(id = %id, error = %e, "service registration failed");
            RegisterError::from(e)
        })?;
        info!(id = %id, "service registered");
        Ok(())
    }

    pub fn cache(&self) -> &ResolutionCache {
        &self.cache
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

pub(crate) fn as_millis_f64(elapsed: Duration) -> f64 {
    elapsed.as_secs_f64() * 1000.0
}

// src/registry/mod.rs
//! Service registry: the backing store and the resolution cache in front of it.

pub mod cache;
pub mod http_store;
pub mod store;

pub use cache::{EvictionPolicy, ResolutionCache};
pub use http_store::HttpStore;
pub use store::{MemoryStore, RegistryStore, StoreError};

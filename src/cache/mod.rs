//! Versioned read-through cache
//!
//! `GenerationStore` persists named cache generations to disk. `CacheManager`
//! owns one generation: it seeds it on install, prunes the others on
//! activation, and mediates requests cache-first with network fallback.

mod manager;
mod store;

pub use manager::{
    Activation, CacheManager, Handled, Installed, Mediation, RefreshReport, ResponseSource,
};
pub use store::{CachedResponse, GenerationStore, StagedGeneration};

//! dictcache - offline read-through cache for the E2B dictionary web app
//!
//! The library holds the cache worker (`cache`), its configuration, the
//! network seam, background sync and event dispatch. The `dictcache` binary
//! plays the host that dispatches events.

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod events;
pub mod net;
pub mod refresh;

//! Control-plane side of the gateway.
//!
//! The playout control plane is the consumer of ingested rundowns. The
//! watcher only ever talks to it through [`PlayoutClient`]: status
//! reporting, the previously-ingested segment cache (consulted on cold
//! start so a restart does not re-emit unchanged content) and the device
//! settings document with its change notifications.
//!
//! The concrete wire client lives outside this repository;
//! [`MemoryPlayoutClient`] is the in-memory implementation used by tests.

mod client;
mod memory;
mod model;

pub use client::PlayoutClient;
pub use memory::MemoryPlayoutClient;
pub use model::{CachedSegment, DeviceSettings, PlayoutError, Result, StatusCode, WatchedQueue};

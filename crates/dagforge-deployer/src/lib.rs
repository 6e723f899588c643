//! Object store backends and the artifact sync pipeline for dagforge.
//!
//! Provides:
//! - A registry of storage backends keyed by URL scheme (`gs`, `file`, `mem`)
//! - The per-project store factory
//! - The sync pipeline that uploads compiled artifacts and collects stale ones
//! - Per-project locks and the scheduler bootstrap driver

pub mod bootstrap;
pub mod file;
pub mod gcs;
pub mod locks;
pub mod memory;
pub mod store;
pub mod sync;

pub use bootstrap::{BootstrapOutcome, Bootstrapper};
pub use file::FileBackend;
pub use gcs::GcsBackend;
pub use locks::ProjectLocks;
pub use memory::{MemoryBackend, MemoryStore};
pub use store::{ProjectStoreFactory, StoreBackend, StoreFactory, StoreRegistry};
pub use sync::{SyncOptions, SyncPipeline, SyncReport};

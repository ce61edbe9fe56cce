//! Local snapshot module for offline data access.
//!
//! This module provides the `SnapshotStore` for persisting the last good
//! copy of each collection, the pending-operation queue and the local id
//! counter as JSON files. Snapshots are only read when the API cannot be
//! reached at start-up; they are rewritten after every successful save.

pub mod snapshot;

pub use snapshot::{CachedData, SnapshotAges, SnapshotStore};

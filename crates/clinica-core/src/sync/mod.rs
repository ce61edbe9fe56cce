//! Background synchronization.
//!
//! [`SyncWorker`] replays the store's pending queue on a timer and reacts to
//! connectivity signals, the native stand-in for browser online/offline
//! events.

pub mod worker;

pub use worker::{ConnectivitySignal, SyncHandle, SyncWorker};

//! Core library for the clinica admin client.
//!
//! Mediates between feature modules (patients, sales, payments, sessions,
//! offers, boxes) and the clinic's REST API:
//!
//! - [`api`]: HTTP client with timeout, retry, and a short-TTL read cache
//! - [`cache`]: on-disk snapshots used as last-resort fallback data
//! - [`store`]: in-memory collections with optimistic offline writes and a
//!   pending-operation queue
//! - [`sync`]: background worker replaying the queue when connectivity returns
//! - [`services`]: typed save/remove/list handlers used by the front-end

pub mod api;
pub mod cache;
pub mod config;
pub mod models;
pub mod services;
pub mod store;
pub mod sync;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{ApiClient, ApiError};
pub use config::AppConfig;
pub use store::{ClinicStore, StoreError, StoreEvent};

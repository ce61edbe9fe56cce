//! REST API client module for the clinic back-end.
//!
//! This module provides the `ApiClient` for communicating with the clinic
//! API. Reads go through a short-lived URL-keyed cache; writes bypass it
//! and invalidate the affected resource entries.
//!
//! Requests time out after `API_TIMEOUT` and are retried `API_RETRIES`
//! times with linearly increasing backoff.

pub mod client;
pub mod endpoints;
pub mod error;
pub mod read_cache;
pub mod transport;

pub use client::ApiClient;
pub use endpoints::{EntityApi, LogQuery, Resource};
pub use error::ApiError;
pub use read_cache::{ReadCache, ResourceKey};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, Method, RequestBody, Transport, Upload};

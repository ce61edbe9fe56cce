//! API client for communicating with the clinic REST API.
//!
//! This module provides the `ApiClient` struct: URL building, the GET read
//! cache, write-side invalidation, and the timeout/retry policy shared by
//! every call.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::read_cache::{ReadCache, ResourceKey};
use super::transport::{HttpRequest, HttpTransport, Method, RequestBody, Transport, Upload};
use super::ApiError;
use crate::config::AppConfig;

// ============================================================================
// Constants
// ============================================================================

/// Backoff step between attempts; attempt `n` waits `n` steps.
const BACKOFF_STEP_MS: u64 = 1000;

/// API client for the clinic back-end.
/// Clone is cheap - transport and read cache are shared through Arc.
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    base_url: String,
    timeout: Duration,
    retries: u32,
    read_cache: Option<Arc<Mutex<ReadCache>>>,
}

impl ApiClient {
    /// Create a new API client backed by reqwest
    pub fn new(config: &AppConfig) -> Result<Self, ApiError> {
        let transport = HttpTransport::new()?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Create a client over an arbitrary transport
    pub fn with_transport(config: &AppConfig, transport: Arc<dyn Transport>) -> Self {
        let read_cache = config
            .cache_enabled
            .then(|| Arc::new(Mutex::new(ReadCache::new(config.cache_ttl()))));

        Self {
            transport,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            timeout: config.api_timeout(),
            retries: config.api_retries,
            read_cache,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Join `endpoint` onto the base URL and append query parameters.
    pub fn build_url(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<String, ApiError> {
        let raw = format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'));
        let mut url = reqwest::Url::parse(&raw)
            .map_err(|e| ApiError::InvalidUrl(format!("{}: {}", raw, e)))?;
        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params);
        }
        Ok(url.to_string())
    }

    fn cache(&self) -> Option<MutexGuard<'_, ReadCache>> {
        self.read_cache
            .as_ref()
            .map(|c| c.lock().unwrap_or_else(PoisonError::into_inner))
    }

    // ===== Reads =====

    /// GET `endpoint`, answering from the read cache while the entry is fresh.
    /// A cache hit returns the same `Arc` as the original response.
    pub async fn get_json(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<Arc<Value>, ApiError> {
        let url = self.build_url(endpoint, params)?;

        if let Some(hit) = self.cache().and_then(|mut c| c.get(&url)) {
            debug!(url = %url, "Read cache hit");
            return Ok(hit);
        }

        let value = Arc::new(self.execute(Method::Get, &url, RequestBody::Empty).await?);

        if let Some(mut cache) = self.cache() {
            cache.insert(url, endpoint, Arc::clone(&value));
        }
        Ok(value)
    }

    pub async fn get<T: DeserializeOwned>(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<T, ApiError> {
        let value = self.get_json(endpoint, params).await?;
        serde_json::from_value(Value::clone(&value))
            .map_err(|e| ApiError::InvalidResponse(format!("{}: {}", endpoint, e)))
    }

    // ===== Writes =====

    pub async fn post<B: Serialize + ?Sized>(&self, endpoint: &str, body: &B) -> Result<Value, ApiError> {
        self.write(Method::Post, endpoint, json_body(body)?).await
    }

    pub async fn put<B: Serialize + ?Sized>(&self, endpoint: &str, body: &B) -> Result<Value, ApiError> {
        self.write(Method::Put, endpoint, json_body(body)?).await
    }

    pub async fn delete(&self, endpoint: &str) -> Result<Value, ApiError> {
        self.write(Method::Delete, endpoint, RequestBody::Empty).await
    }

    /// POST a multipart file upload.
    pub async fn upload(&self, endpoint: &str, upload: Upload) -> Result<Value, ApiError> {
        self.write(Method::Post, endpoint, RequestBody::Multipart(upload)).await
    }

    /// Writes never read the cache. Whatever the outcome, entries the write
    /// may have made stale are dropped afterwards.
    async fn write(&self, method: Method, endpoint: &str, body: RequestBody) -> Result<Value, ApiError> {
        let url = self.build_url(endpoint, &[])?;
        let result = self.execute(method, &url, body).await;
        self.invalidate(endpoint);
        result
    }

    /// Drop cached reads made stale by a write to `endpoint`.
    pub fn invalidate(&self, endpoint: &str) {
        if let Some(mut cache) = self.cache() {
            let key = ResourceKey::from_endpoint(endpoint);
            let removed = cache.invalidate(&key);
            if removed > 0 {
                debug!(resource = %key.resource, id = ?key.id, removed, "Invalidated read cache");
            }
        }
    }

    pub fn clear_cache(&self) {
        if let Some(mut cache) = self.cache() {
            cache.clear();
        }
    }

    pub fn is_cached(&self, endpoint: &str, params: &[(&str, &str)]) -> bool {
        match (self.build_url(endpoint, params), self.cache()) {
            (Ok(url), Some(cache)) => cache.contains(&url),
            _ => false,
        }
    }

    // ===== Retry loop =====

    async fn execute(&self, method: Method, url: &str, body: RequestBody) -> Result<Value, ApiError> {
        let max_attempts = self.retries.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let request = HttpRequest {
                method,
                url: url.to_string(),
                body: body.clone(),
            };

            match self.send_once(request).await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_retryable() => {
                    warn!(%method, url, attempt, error = %e, "Request failed, not retrying");
                    return Err(e);
                }
                Err(e) if attempt >= max_attempts => {
                    warn!(%method, url, attempts = attempt, error = %e, "Request failed, retries exhausted");
                    return Err(e);
                }
                Err(e) => {
                    let backoff_ms = BACKOFF_STEP_MS * u64::from(attempt);
                    warn!(%method, url, attempt, backoff_ms, error = %e, "Request failed, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                }
            }
        }
    }

    async fn send_once(&self, request: HttpRequest) -> Result<Value, ApiError> {
        let url = request.url.clone();
        let response = match tokio::time::timeout(self.timeout, self.transport.send(request)).await {
            Ok(result) => result?,
            Err(_) => return Err(ApiError::Timeout(self.timeout)),
        };

        if !response.is_success() {
            return Err(ApiError::from_status(response.status, &response.reason, &response.body));
        }

        if response.body.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&response.body)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse JSON from {}: {}", url, e)))
    }
}

fn json_body<B: Serialize + ?Sized>(body: &B) -> Result<RequestBody, ApiError> {
    serde_json::to_value(body)
        .map(RequestBody::Json)
        .map_err(|e| ApiError::InvalidResponse(format!("Failed to serialize request body: {}", e)))
}

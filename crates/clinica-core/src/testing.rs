//! Test doubles shared by the unit tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::api::{ApiClient, ApiError, HttpRequest, HttpResponse, Transport};
use crate::config::AppConfig;

pub(crate) const BASE_URL: &str = "http://clinic.test/api";

type Handler = dyn Fn(&HttpRequest) -> Result<HttpResponse, ApiError> + Send + Sync;

/// In-memory transport answering from a closure and recording every request.
pub(crate) struct FakeTransport {
    handler: Box<Handler>,
    delay: Option<Duration>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl FakeTransport {
    pub(crate) fn new(
        handler: impl Fn(&HttpRequest) -> Result<HttpResponse, ApiError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            handler: Box::new(handler),
            delay: None,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn with_delay(
        delay: Duration,
        handler: impl Fn(&HttpRequest) -> Result<HttpResponse, ApiError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            handler: Box::new(handler),
            delay: Some(delay),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Requests other than health probes, as `"METHOD path"`.
    pub(crate) fn calls(&self) -> Vec<String> {
        self.requests()
            .iter()
            .filter(|r| path(r) != "health")
            .map(|r| format!("{} {}", r.method, path(r)))
            .collect()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.handler)(&request)
    }
}

/// Path of the request relative to the base URL, without query string.
pub(crate) fn path(request: &HttpRequest) -> &str {
    let rest = request.url.strip_prefix(BASE_URL).unwrap_or(&request.url);
    rest.trim_start_matches('/').split('?').next().unwrap_or_default()
}

pub(crate) fn ok(body: Value) -> Result<HttpResponse, ApiError> {
    status(200, "OK", body)
}

pub(crate) fn status(status: u16, reason: &str, body: Value) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse {
        status,
        reason: reason.to_string(),
        body: body.to_string(),
    })
}

pub(crate) fn offline() -> Result<HttpResponse, ApiError> {
    Err(ApiError::Network("connection refused".to_string()))
}

pub(crate) fn config() -> AppConfig {
    AppConfig {
        api_url: BASE_URL.to_string(),
        ..AppConfig::default()
    }
}

/// Client with a single attempt per request, so failure paths stay fast.
pub(crate) fn single_attempt_client(transport: Arc<FakeTransport>) -> ApiClient {
    let config = AppConfig {
        api_retries: 1,
        ..config()
    };
    ApiClient::with_transport(&config, transport)
}

pub(crate) fn client(transport: Arc<FakeTransport>) -> ApiClient {
    ApiClient::with_transport(&config(), transport)
}

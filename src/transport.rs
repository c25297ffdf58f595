use std::sync::Arc;
use std::time::Duration;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method};
use serde_json::Value;
use tracing::{debug, warn};
use crate::error::TransportError;
use crate::registry::{ServiceName, ServiceRegistry};

#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
  pub method: Method,
  pub body: Option<Value>,
  pub headers: HeaderMap,
  pub query: Vec<(String, String)>,
}

impl RequestOptions {
  pub fn get() -> Self {
    Self::default()
  }

  pub fn post(body: Value) -> Self {
    Self { method: Method::POST, body: Some(body), ..Default::default() }
  }

  pub fn with_query(mut self, key: &str, value: impl ToString) -> Self {
    self.query.push((key.into(), value.to_string()));
    self
  }

  pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
    self.headers.insert(name, value);
    self
  }
}

/// One logical request per call against a registered service. Holds no per-request state.
#[derive(Debug, Clone)]
pub struct Transport {
  client: Client,
  registry: Arc<ServiceRegistry>,
  timeout: Duration,
}

impl Transport {
  pub fn new(registry: Arc<ServiceRegistry>, timeout: Duration) -> Result<Self, TransportError> {
    let client = Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| TransportError::Network(e.to_string()))?;
    Ok(Self { client, registry, timeout })
  }

  pub fn registry(&self) -> &ServiceRegistry {
    &self.registry
  }

  pub fn timeout(&self) -> Duration {
    self.timeout
  }

  pub async fn send(
    &self,
    service: ServiceName,
    endpoint_path: &str,
    options: RequestOptions,
  ) -> Result<Value, TransportError> {
    let descriptor = self.registry.resolve(service)?;
    let url = descriptor.url_for(endpoint_path)?;

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    // caller headers win
    for (name, value) in options.headers.iter() {
      headers.insert(name.clone(), value.clone());
    }

    let mut request = self.client.request(options.method.clone(), url.clone()).headers(headers);
    if !options.query.is_empty() {
      request = request.query(&options.query);
    }
    if let Some(body) = &options.body {
      let bytes = serde_json::to_vec(body).map_err(|e| TransportError::InvalidBody(e.to_string()))?;
      request = request.body(bytes);
    }

    debug!("{} {} -> {}", options.method, url, service);
    let response = request.send().await.map_err(|e| {
      warn!("{} request to {} failed: {}", service, url, e);
      TransportError::Network(e.to_string())
    })?;

    let status = response.status();
    if !status.is_success() {
      warn!("{} responded {} for {}", service, status, url);
      return Err(TransportError::HttpStatus {
        status: status.as_u16(),
        status_text: status.canonical_reason().unwrap_or("").into(),
      });
    }

    let bytes = response
      .bytes()
      .await
      .map_err(|e| TransportError::Network(e.to_string()))?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
      return Ok(Value::Null);
    }
    serde_json::from_slice(&bytes).map_err(|e| TransportError::InvalidBody(e.to_string()))
  }
}

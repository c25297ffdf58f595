use std::collections::{BTreeMap, HashMap};
use std::fmt;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use crate::config::Config;
use crate::error::TransportError;

pub const HEALTH: &str = "health";
pub const CHAT: &str = "chat";
pub const SEARCH: &str = "search";
pub const SENTIMENT: &str = "sentiment";
pub const STRIPE_EVENTS: &str = "stripe_events";
pub const CONVERSATIONS: &str = "conversations";
pub const QUEUE: &str = "queue";
pub const WEBHOOK: &str = "webhook";
pub const NOTIFY: &str = "notify";
pub const PROCESS: &str = "process";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceName {
  Backend,
  QueueService,
  WorkerService,
}

impl ServiceName {
  pub fn as_str(&self) -> &'static str {
    match self {
      ServiceName::Backend => "backend",
      ServiceName::QueueService => "queue_service",
      ServiceName::WorkerService => "worker_service",
    }
  }
}

impl fmt::Display for ServiceName {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.pad(self.as_str())
  }
}

#[derive(Debug, Clone)]
pub struct ServiceDescriptor {
  pub name: ServiceName,
  pub base_address: Url,
  pub endpoints: HashMap<String, String>,
}

impl ServiceDescriptor {
  pub fn new(name: ServiceName, base_address: Url) -> Self {
    Self { name, base_address, endpoints: HashMap::new() }
  }

  pub fn with_endpoint(mut self, logical: &str, path: &str) -> Self {
    self.endpoints.insert(logical.into(), path.into());
    self
  }

  pub fn endpoint(&self, logical: &str) -> Result<&str, TransportError> {
    self
      .endpoints
      .get(logical)
      .map(String::as_str)
      .ok_or_else(|| TransportError::UnknownEndpoint {
        service: self.name,
        endpoint: logical.into(),
      })
  }

  /// Joins the base address and a path without dropping any path prefix on the base.
  pub fn url_for(&self, path: &str) -> Result<Url, TransportError> {
    let base = self.base_address.as_str().trim_end_matches('/');
    let joined = if path.starts_with('/') {
      format!("{base}{path}")
    } else {
      format!("{base}/{path}")
    };
    Url::parse(&joined).map_err(|e| TransportError::InvalidUrl(format!("{joined}: {e}")))
  }

  pub fn backend(base_address: Url) -> Self {
    Self::new(ServiceName::Backend, base_address)
      .with_endpoint(HEALTH, "/health")
      .with_endpoint(CHAT, "/chat")
      .with_endpoint(SEARCH, "/search")
      .with_endpoint(SENTIMENT, "/analytics/sentiment")
      .with_endpoint(STRIPE_EVENTS, "/stripe/events")
      .with_endpoint(CONVERSATIONS, "/conversations")
  }

  pub fn queue_service(base_address: Url) -> Self {
    Self::new(ServiceName::QueueService, base_address)
      .with_endpoint(HEALTH, "/health")
      .with_endpoint(QUEUE, "/_queue")
      .with_endpoint(WEBHOOK, "/webhook")
      .with_endpoint(NOTIFY, "/notify")
  }

  pub fn worker_service(base_address: Url) -> Self {
    Self::new(ServiceName::WorkerService, base_address)
      .with_endpoint(HEALTH, "/health")
      .with_endpoint(PROCESS, "/process")
  }
}

/// Read-only after construction. Ordered so polling and display are deterministic.
#[derive(Debug, Clone, Default)]
pub struct ServiceRegistry {
  services: BTreeMap<ServiceName, ServiceDescriptor>,
}

impl ServiceRegistry {
  pub fn from_config(config: &Config) -> Self {
    Self::default()
      .register(ServiceDescriptor::backend(config.backend_url.clone()))
      .register(ServiceDescriptor::queue_service(config.queue_service_url.clone()))
      .register(ServiceDescriptor::worker_service(config.worker_service_url.clone()))
  }

  pub fn register(mut self, descriptor: ServiceDescriptor) -> Self {
    self.services.insert(descriptor.name, descriptor);
    self
  }

  pub fn resolve(&self, name: ServiceName) -> Result<&ServiceDescriptor, TransportError> {
    self.services.get(&name).ok_or(TransportError::UnknownService(name))
  }

  pub fn endpoint(&self, name: ServiceName, logical: &str) -> Result<&str, TransportError> {
    self.resolve(name)?.endpoint(logical)
  }

  pub fn names(&self) -> impl Iterator<Item = ServiceName> + '_ {
    self.services.keys().copied()
  }

  pub fn len(&self) -> usize {
    self.services.len()
  }

  pub fn is_empty(&self) -> bool {
    self.services.is_empty()
  }
}

#![allow(dead_code)]

use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;
use desk_orchestrator::transport::Transport;
use desk_orchestrator::{ServiceDescriptor, ServiceRegistry};
use reqwest::Url;
use serde_json::{Value, json};
use warp::Filter;

/// Serves `routes` on an ephemeral localhost port for the rest of the test.
pub fn serve<F>(routes: F) -> Url
where
  F: Filter<Error = warp::Rejection> + Clone + Send + Sync + 'static,
  F::Extract: warp::Reply,
{
  let (addr, server) = warp::serve(routes).bind_ephemeral(([127, 0, 0, 1], 0));
  tokio::spawn(server);
  Url::parse(&format!("http://{addr}")).unwrap()
}

/// An address nothing listens on.
pub fn closed_url() -> Url {
  let listener = TcpListener::bind("127.0.0.1:0").unwrap();
  let addr = listener.local_addr().unwrap();
  drop(listener);
  Url::parse(&format!("http://{addr}")).unwrap()
}

pub fn health_route(
  body: Value,
) -> impl Filter<Extract = (warp::reply::Json,), Error = warp::Rejection> + Clone + Send + Sync + 'static {
  warp::path("health")
    .and(warp::get())
    .map(move || warp::reply::json(&body))
}

pub fn healthy() -> Value {
  json!({"status": "healthy"})
}

pub fn registry(backend: Url, queue: Url, worker: Url) -> Arc<ServiceRegistry> {
  Arc::new(
    ServiceRegistry::default()
      .register(ServiceDescriptor::backend(backend))
      .register(ServiceDescriptor::queue_service(queue))
      .register(ServiceDescriptor::worker_service(worker)),
  )
}

pub fn transport(registry: Arc<ServiceRegistry>, timeout: Duration) -> Transport {
  Transport::new(registry, timeout).unwrap()
}

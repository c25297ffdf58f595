mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use desk_orchestrator::transport::RequestOptions;
use desk_orchestrator::{ServiceDescriptor, ServiceName, ServiceRegistry, TransportError};
use reqwest::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use serde_json::{Value, json};
use tokio_test::assert_ok;
use warp::Filter;
use warp::http::StatusCode;

use common::{closed_url, healthy, serve, transport};

fn backend_only(url: reqwest::Url) -> Arc<ServiceRegistry> {
  Arc::new(ServiceRegistry::default().register(ServiceDescriptor::backend(url)))
}

#[tokio::test]
async fn success_returns_json_body() {
  let url = serve(common::health_route(json!({"status": "healthy", "services": {"qdrant": "healthy"}})));
  let transport = transport(backend_only(url), Duration::from_secs(2));
  let body = assert_ok!(transport.send(ServiceName::Backend, "/health", RequestOptions::get()).await);
  assert_eq!(body["services"]["qdrant"], "healthy");
}

#[tokio::test]
async fn non_success_status_carries_code_and_text() {
  let url = serve(warp::path("health").map(|| {
    warp::reply::with_status(warp::reply::json(&json!({"detail": "Service unavailable"})), StatusCode::SERVICE_UNAVAILABLE)
  }));
  let transport = transport(backend_only(url), Duration::from_secs(2));
  let err = transport.send(ServiceName::Backend, "/health", RequestOptions::get()).await.unwrap_err();
  assert_eq!(
    err,
    TransportError::HttpStatus { status: 503, status_text: "Service Unavailable".into() }
  );
}

#[tokio::test]
async fn connection_refused_is_a_network_failure() {
  let transport = transport(backend_only(closed_url()), Duration::from_secs(2));
  let err = transport.send(ServiceName::Backend, "/health", RequestOptions::get()).await.unwrap_err();
  assert!(err.is_network(), "{err:?}");
}

#[tokio::test]
async fn timeout_is_reported_like_a_network_failure() {
  let url = serve(warp::path("health").and_then(|| async {
    tokio::time::sleep(Duration::from_millis(500)).await;
    Ok::<_, warp::Rejection>(warp::reply::json(&healthy()))
  }));
  let transport = transport(backend_only(url), Duration::from_millis(50));
  let err = transport.send(ServiceName::Backend, "/health", RequestOptions::get()).await.unwrap_err();
  assert!(err.is_network(), "{err:?}");
}

#[tokio::test]
async fn unregistered_service_fails_without_a_request() {
  let transport = transport(backend_only(closed_url()), Duration::from_secs(2));
  let err = transport.send(ServiceName::WorkerService, "/health", RequestOptions::get()).await.unwrap_err();
  assert_eq!(err, TransportError::UnknownService(ServiceName::WorkerService));
}

fn echo_headers() -> impl Filter<Extract = (warp::reply::Json,), Error = warp::Rejection> + Clone + Send + Sync + 'static {
  warp::path("chat")
    .and(warp::post())
    .and(warp::header::<String>("content-type"))
    .and(warp::header::optional::<String>("x-desk-agent"))
    .and(warp::body::bytes())
    .map(|content_type: String, agent: Option<String>, body: warp::hyper::body::Bytes| {
      let echo: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
      warp::reply::json(&json!({"content_type": content_type, "agent": agent, "echo": echo}))
    })
}

#[tokio::test]
async fn json_content_type_is_sent_by_default() {
  let url = serve(echo_headers());
  let transport = transport(backend_only(url), Duration::from_secs(2));
  let reply = transport
    .send(ServiceName::Backend, "/chat", RequestOptions::post(json!({"user": "u", "message": "hi"})))
    .await
    .unwrap();
  assert_eq!(reply["content_type"], "application/json");
  assert_eq!(reply["echo"]["message"], "hi");
  assert_eq!(reply["agent"], Value::Null);
}

#[tokio::test]
async fn caller_headers_win_over_defaults() {
  let url = serve(echo_headers());
  let transport = transport(backend_only(url), Duration::from_secs(2));
  let options = RequestOptions::post(json!({"user": "u", "message": "hi"}))
    .with_header(CONTENT_TYPE, HeaderValue::from_static("application/vnd.desk+json"))
    .with_header(HeaderName::from_static("x-desk-agent"), HeaderValue::from_static("agent-7"));
  let reply = transport.send(ServiceName::Backend, "/chat", options).await.unwrap();
  assert_eq!(reply["content_type"], "application/vnd.desk+json");
  assert_eq!(reply["agent"], "agent-7");
}

#[tokio::test]
async fn query_parameters_are_appended() {
  let url = serve(
    warp::path!("stripe" / "events")
      .and(warp::query::<HashMap<String, String>>())
      .map(|q: HashMap<String, String>| warp::reply::json(&json!({"limit": q.get("limit")}))),
  );
  let transport = transport(backend_only(url), Duration::from_secs(2));
  let reply = transport
    .send(ServiceName::Backend, "/stripe/events", RequestOptions::get().with_query("limit", 10))
    .await
    .unwrap();
  assert_eq!(reply["limit"], "10");
}

#[tokio::test]
async fn non_json_body_is_invalid_and_empty_body_is_null() {
  let url = serve(
    warp::path("health")
      .map(|| "all good")
      .or(warp::path("notify").map(warp::reply)),
  );
  let transport = transport(backend_only(url), Duration::from_secs(2));
  let err = transport.send(ServiceName::Backend, "/health", RequestOptions::get()).await.unwrap_err();
  assert!(matches!(err, TransportError::InvalidBody(_)));
  let empty = transport.send(ServiceName::Backend, "/notify", RequestOptions::get()).await.unwrap();
  assert_eq!(empty, Value::Null);
}

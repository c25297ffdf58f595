mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use chrono::Utc;
use desk_orchestrator::health::HealthMonitor;
use desk_orchestrator::ledger::TaskLedger;
use desk_orchestrator::{ChangeEvent, HealthSnapshot, HealthStatus, Notifier, ServiceName};
use serde_json::json;
use warp::Filter;
use warp::http::StatusCode;

use common::{closed_url, health_route, healthy, registry, serve, transport};

fn slow_health(delay: Duration) -> reqwest::Url {
  serve(warp::path("health").and_then(move || async move {
    tokio::time::sleep(delay).await;
    Ok::<_, warp::Rejection>(warp::reply::json(&json!({"status": "healthy"})))
  }))
}

#[tokio::test]
async fn mixed_results_roll_up_to_the_worst() {
  let backend = serve(health_route(json!({
    "status": "healthy",
    "services": {"qdrant": "healthy", "embeddings": "healthy", "stripe": "connected"}
  })));
  let queue = serve(health_route(json!({"status": "unhealthy", "services": {"backend": "unhealthy"}})));
  let monitor = HealthMonitor::new(
    transport(registry(backend, queue, closed_url()), Duration::from_secs(1)),
    Duration::from_secs(5),
  );

  let health = monitor.poll_now().await;
  assert_eq!(health.status_of(ServiceName::Backend), Some(HealthStatus::Healthy));
  assert_eq!(health.status_of(ServiceName::QueueService), Some(HealthStatus::Degraded));
  assert_eq!(health.status_of(ServiceName::WorkerService), Some(HealthStatus::Unreachable));
  assert_eq!(health.overall, Some(HealthStatus::Unreachable));
  let detail = health.per_service[&ServiceName::Backend].detail.as_ref().unwrap();
  assert_eq!(detail["stripe"], "connected");
}

#[tokio::test]
async fn all_healthy_is_healthy() {
  let worker = serve(health_route(json!({"status": "healthy", "worker": "ready"})));
  let monitor = HealthMonitor::new(
    transport(
      registry(serve(health_route(healthy())), serve(health_route(healthy())), worker),
      Duration::from_secs(1),
    ),
    Duration::from_secs(5),
  );
  let health = monitor.poll_now().await;
  assert_eq!(health.overall, Some(HealthStatus::Healthy));
  assert_eq!(health.per_service.len(), 3);
}

#[tokio::test]
async fn reads_do_not_mutate() {
  let monitor = HealthMonitor::new(
    transport(
      registry(serve(health_route(healthy())), closed_url(), closed_url()),
      Duration::from_secs(1),
    ),
    Duration::from_secs(5),
  );
  monitor.poll_now().await;
  assert_eq!(monitor.current(), monitor.current());
}

#[tokio::test]
async fn service_recovers_on_the_next_poll() {
  let up = Arc::new(AtomicBool::new(false));
  let flag = up.clone();
  let backend = serve(warp::path("health").map(move || {
    if flag.load(Ordering::SeqCst) {
      warp::reply::with_status(warp::reply::json(&json!({"status": "healthy"})), StatusCode::OK)
    } else {
      warp::reply::with_status(warp::reply::json(&json!({"detail": "down"})), StatusCode::SERVICE_UNAVAILABLE)
    }
  }));
  let monitor = HealthMonitor::new(
    transport(registry(backend, closed_url(), closed_url()), Duration::from_secs(1)),
    Duration::from_secs(5),
  );

  let health = monitor.poll_now().await;
  assert_eq!(health.status_of(ServiceName::Backend), Some(HealthStatus::Unreachable));
  up.store(true, Ordering::SeqCst);
  let health = monitor.poll_now().await;
  assert_eq!(health.status_of(ServiceName::Backend), Some(HealthStatus::Healthy));
}

#[tokio::test]
async fn slow_service_does_not_hold_back_the_others() {
  let backend = slow_health(Duration::from_millis(600));
  let queue = serve(health_route(healthy()));
  let monitor = HealthMonitor::new(
    transport(registry(backend, queue, closed_url()), Duration::from_secs(1)),
    Duration::from_secs(10),
  );

  monitor.start();
  tokio::time::sleep(Duration::from_millis(250)).await;
  let partial = monitor.current();
  assert_eq!(partial.status_of(ServiceName::QueueService), Some(HealthStatus::Healthy));
  assert_eq!(partial.status_of(ServiceName::WorkerService), Some(HealthStatus::Unreachable));
  assert_eq!(partial.status_of(ServiceName::Backend), None);

  tokio::time::sleep(Duration::from_millis(600)).await;
  assert_eq!(monitor.current().status_of(ServiceName::Backend), Some(HealthStatus::Healthy));
  monitor.stop();
}

#[tokio::test]
async fn in_flight_poll_lands_after_stop() {
  let backend = slow_health(Duration::from_millis(200));
  let monitor = HealthMonitor::new(
    transport(registry(backend, closed_url(), closed_url()), Duration::from_millis(500)),
    Duration::from_secs(1),
  );
  monitor.start();
  tokio::time::sleep(Duration::from_millis(50)).await;
  monitor.stop();
  assert!(!monitor.is_running());
  tokio::time::sleep(Duration::from_millis(400)).await;
  assert_eq!(monitor.current().status_of(ServiceName::Backend), Some(HealthStatus::Healthy));
}

#[tokio::test]
async fn stopped_monitor_goes_quiet_within_one_interval() {
  let interval = Duration::from_millis(100);
  let monitor = HealthMonitor::new(
    transport(
      registry(serve(health_route(healthy())), serve(health_route(healthy())), closed_url()),
      interval,
    ),
    interval,
  );
  let ledger = TaskLedger::new();
  let notifier = Notifier::new(monitor.watch(), ledger.watch());
  let notifications = Arc::new(AtomicUsize::new(0));
  let counter = notifications.clone();
  let _sub = notifier.on_change(move |event| {
    if let ChangeEvent::Health(_) = event {
      counter.fetch_add(1, Ordering::SeqCst);
    }
  });

  monitor.start();
  tokio::time::sleep(Duration::from_millis(350)).await;
  monitor.stop();
  assert!(notifications.load(Ordering::SeqCst) > 0);

  tokio::time::sleep(interval).await;
  let settled = notifications.load(Ordering::SeqCst);
  tokio::time::sleep(interval * 4).await;
  assert_eq!(notifications.load(Ordering::SeqCst), settled);
}

#[tokio::test]
async fn start_is_idempotent() {
  let monitor = HealthMonitor::new(
    transport(registry(closed_url(), closed_url(), closed_url()), Duration::from_millis(100)),
    Duration::from_secs(1),
  );
  let first = monitor.start();
  let second = monitor.start();
  assert!(monitor.is_running());
  first.cancel();
  assert!(second.is_cancelled());
  monitor.stop();
  assert!(!monitor.is_running());
}

#[tokio::test]
async fn cancelled_handle_lets_start_spin_up_a_new_ticker() {
  let monitor = HealthMonitor::new(
    transport(
      registry(serve(health_route(healthy())), closed_url(), closed_url()),
      Duration::from_millis(100),
    ),
    Duration::from_millis(200),
  );
  let first = monitor.start();
  first.cancel();
  assert!(!monitor.is_running());

  let second = monitor.start();
  assert!(!second.is_cancelled());
  assert!(monitor.is_running());
  tokio::time::sleep(Duration::from_millis(150)).await;
  assert_eq!(monitor.current().status_of(ServiceName::Backend), Some(HealthStatus::Healthy));
  monitor.stop();
  assert!(second.is_cancelled());
}

#[tokio::test]
async fn poll_is_cut_off_at_the_interval() {
  let transport = transport(
    registry(slow_health(Duration::from_secs(3)), closed_url(), closed_url()),
    Duration::from_secs(10),
  );
  assert_eq!(transport.timeout(), Duration::from_secs(10));
  let monitor = HealthMonitor::new(transport, Duration::from_millis(200));

  let started = Instant::now();
  let health = monitor.poll_now().await;
  assert!(started.elapsed() < Duration::from_secs(1), "{:?}", started.elapsed());
  assert_eq!(health.status_of(ServiceName::Backend), Some(HealthStatus::Unreachable));
}

#[tokio::test]
async fn late_snapshot_is_discarded() {
  let monitor = HealthMonitor::new(
    transport(registry(closed_url(), closed_url(), closed_url()), Duration::from_millis(100)),
    Duration::from_secs(1),
  );
  let now = Utc::now();
  let fresh = HealthSnapshot {
    service_name: ServiceName::QueueService,
    status: HealthStatus::Healthy,
    detail: None,
    observed_at: now,
  };
  let stale = HealthSnapshot {
    status: HealthStatus::Unreachable,
    observed_at: now - chrono::Duration::seconds(30),
    ..fresh.clone()
  };
  assert!(monitor.apply_snapshot(fresh).await);
  assert!(!monitor.apply_snapshot(stale).await);
  assert_eq!(monitor.current().status_of(ServiceName::QueueService), Some(HealthStatus::Healthy));
}

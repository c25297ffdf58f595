//! Periodic health polling of every registered service.
//!
//! Each tick spawns one poll per service. A poll owns its own task, so a slow or dead
//! service never holds up the others, and stopping the ticker leaves in-flight polls
//! alone; their results are still applied when they arrive.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::{Mutex, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use crate::error::TransportError;
use crate::models::{AggregateHealth, HealthSnapshot, HealthStatus};
use crate::registry::{HEALTH, ServiceName};
use crate::transport::{RequestOptions, Transport};

/// `/health` body shared by all three services.
#[derive(Debug, Deserialize)]
pub struct HealthResponse {
  pub status: String,
  #[serde(default)]
  pub services: Option<BTreeMap<String, String>>,
  #[serde(default)]
  pub worker: Option<String>,
}

fn status_from_str(raw: &str) -> Option<HealthStatus> {
  match raw.trim().to_ascii_lowercase().as_str() {
    "healthy" | "ok" | "running" => Some(HealthStatus::Healthy),
    "degraded" | "unhealthy" => Some(HealthStatus::Degraded),
    _ => None,
  }
}

/// Maps one poll outcome onto a snapshot.
pub fn classify(
  service: ServiceName,
  outcome: Result<Value, TransportError>,
  observed_at: DateTime<Utc>,
) -> HealthSnapshot {
  let (status, detail) = match outcome {
    Ok(body) => match serde_json::from_value::<HealthResponse>(body) {
      Ok(resp) => {
        let detail = resp
          .services
          .or_else(|| resp.worker.map(|w| BTreeMap::from([("worker".to_string(), w)])));
        let status = status_from_str(&resp.status).unwrap_or_else(|| {
          warn!("{} reported unrecognised status '{}'", service, resp.status);
          HealthStatus::Degraded
        });
        (status, detail)
      }
      Err(e) => {
        warn!("{} health body did not match schema: {}", service, e);
        (HealthStatus::Degraded, None)
      }
    },
    // It answered, but not with anything we can read.
    Err(TransportError::InvalidBody(e)) => {
      warn!("{} health body is not JSON: {}", service, e);
      (HealthStatus::Degraded, None)
    }
    Err(e) => {
      warn!("{} health check failed: {}", service, e);
      (HealthStatus::Unreachable, None)
    }
  };
  HealthSnapshot { service_name: service, status, detail, observed_at }
}

struct Shared {
  transport: Transport,
  interval: Duration,
  state: Mutex<AggregateHealth>,
  published: watch::Sender<AggregateHealth>,
}

impl Shared {
  async fn apply(&self, snapshot: HealthSnapshot) -> bool {
    let mut state = self.state.lock().await;
    let service = snapshot.service_name;
    let previous = state.status_of(service);
    let status = snapshot.status;
    if !state.apply(snapshot) {
      debug!("Discarded stale health snapshot for {}", service);
      return false;
    }
    if previous != Some(status) {
      info!("{} is now {}", service, status);
    }
    self.published.send_replace(state.clone());
    true
  }

  async fn poll(self: Arc<Self>, service: ServiceName) {
    let observed_at = Utc::now();
    let outcome = match self.transport.registry().endpoint(service, HEALTH) {
      Ok(path) => {
        let path = path.to_string();
        let request = self.transport.send(service, &path, RequestOptions::get());
        // No poll outlives its interval, whatever the transport timeout.
        match tokio::time::timeout(self.interval, request).await {
          Ok(outcome) => outcome,
          Err(_) => Err(TransportError::Network(format!("no answer within {:?}", self.interval))),
        }
      }
      Err(e) => Err(e),
    };
    self.apply(classify(service, outcome, observed_at)).await;
  }

  fn spawn_cycle(self: &Arc<Self>) -> Vec<tokio::task::JoinHandle<()>> {
    self
      .transport
      .registry()
      .names()
      .map(|service| tokio::spawn(self.clone().poll(service)))
      .collect()
  }
}

pub struct HealthMonitor {
  shared: Arc<Shared>,
  interval: Duration,
  ticker: StdMutex<Option<CancellationToken>>,
}

impl HealthMonitor {
  /// Each poll is cut off after `interval` even when the transport timeout is longer,
  /// so a stopped monitor goes quiet within one interval.
  pub fn new(transport: Transport, interval: Duration) -> Self {
    if transport.timeout() > interval {
      warn!(
        "Request timeout {:?} exceeds poll interval {:?}; health polls are capped at the interval",
        transport.timeout(),
        interval
      );
    }
    let (published, _) = watch::channel(AggregateHealth::default());
    Self {
      shared: Arc::new(Shared {
        transport,
        interval,
        state: Mutex::new(AggregateHealth::default()),
        published,
      }),
      interval,
      ticker: StdMutex::new(None),
    }
  }

  pub fn interval(&self) -> Duration {
    self.interval
  }

  pub fn watch(&self) -> watch::Receiver<AggregateHealth> {
    self.shared.published.subscribe()
  }

  pub fn current(&self) -> AggregateHealth {
    self.shared.published.borrow().clone()
  }

  pub fn is_running(&self) -> bool {
    self
      .ticker
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .as_ref()
      .is_some_and(|token| !token.is_cancelled())
  }

  /// Starts the ticker on the current tokio runtime. The first cycle fires immediately.
  /// Calling `start` on a running monitor returns the existing token. Cancelling the
  /// returned token stops the ticker, and a later `start` spins up a fresh one.
  pub fn start(&self) -> CancellationToken {
    let mut ticker = self.ticker.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(token) = ticker.as_ref().filter(|token| !token.is_cancelled()) {
      return token.clone();
    }

    let token = CancellationToken::new();
    let cancelled = token.clone();
    let shared = self.shared.clone();
    let period = self.interval;
    info!("Health monitor started, polling every {:?}", period);

    tokio::spawn(async move {
      let mut interval = tokio::time::interval(period);
      interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
      loop {
        tokio::select! {
          _ = cancelled.cancelled() => {
            debug!("Health monitor ticker cancelled");
            break;
          }
          _ = interval.tick() => {
            shared.spawn_cycle();
          }
        }
      }
    });

    *ticker = Some(token.clone());
    token
  }

  /// Cancels future ticks. Polls already in flight still land.
  pub fn stop(&self) {
    if let Some(token) = self.ticker.lock().unwrap_or_else(|e| e.into_inner()).take() {
      token.cancel();
      info!("Health monitor stopped");
    }
  }

  /// Runs one cycle right away and waits for every poll in it to land.
  pub async fn poll_now(&self) -> AggregateHealth {
    for joined in join_all(self.shared.spawn_cycle()).await {
      if let Err(e) = joined {
        warn!("Health poll task failed: {}", e);
      }
    }
    self.current()
  }

  /// Applies an externally produced snapshot under the same ordering rule as polls.
  pub async fn apply_snapshot(&self, snapshot: HealthSnapshot) -> bool {
    self.shared.apply(snapshot).await
  }
}

impl Drop for HealthMonitor {
  fn drop(&mut self) {
    self.stop();
  }
}

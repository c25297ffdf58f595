use std::collections::BTreeMap;
use std::fmt;
use serde::{Serialize, Deserialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use crate::registry::ServiceName;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
  Queued,
  Processing,
  Completed,
  Failed,
}

impl TaskState {
  pub fn is_terminal(&self) -> bool {
    matches!(self, TaskState::Completed | TaskState::Failed)
  }

  /// Forward-only lifecycle. A queued task may be rejected before any worker claims it,
  /// but it can never complete without passing through `Processing`.
  pub fn can_transition_to(&self, next: TaskState) -> bool {
    matches!(
      (self, next),
      (TaskState::Queued, TaskState::Processing)
        | (TaskState::Queued, TaskState::Failed)
        | (TaskState::Processing, TaskState::Completed)
        | (TaskState::Processing, TaskState::Failed)
    )
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      TaskState::Queued => "queued",
      TaskState::Processing => "processing",
      TaskState::Completed => "completed",
      TaskState::Failed => "failed",
    }
  }
}

impl fmt::Display for TaskState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.pad(self.as_str())
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
  pub id: Uuid,
  pub task_type: String,
  pub payload: serde_json::Value,
  pub priority: u32,
  pub state: TaskState,
  pub submitted_at: DateTime<Utc>,
  pub last_updated_at: DateTime<Utc>,
  pub remote_id: Option<String>,
  pub error: Option<String>,
}

impl TaskRecord {
  pub fn queued(task_type: &str, payload: serde_json::Value, priority: u32, remote_id: Option<String>) -> Self {
    let now = Utc::now();
    Self {
      id: Uuid::new_v4(),
      task_type: task_type.into(),
      payload,
      priority,
      state: TaskState::Queued,
      submitted_at: now,
      last_updated_at: now,
      remote_id,
      error: None,
    }
  }
}

/// A status update for a tracked task pushed by something outside the console.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEvent {
  pub id: Uuid,
  pub state: TaskState,
  #[serde(default)]
  pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
  Healthy,
  Degraded,
  Unreachable,
}

impl HealthStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      HealthStatus::Healthy => "healthy",
      HealthStatus::Degraded => "degraded",
      HealthStatus::Unreachable => "unreachable",
    }
  }
}

impl fmt::Display for HealthStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.pad(self.as_str())
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSnapshot {
  pub service_name: ServiceName,
  pub status: HealthStatus,
  pub detail: Option<BTreeMap<String, String>>,
  pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateHealth {
  /// `None` until the first snapshot lands.
  pub overall: Option<HealthStatus>,
  pub per_service: BTreeMap<ServiceName, HealthSnapshot>,
}

impl AggregateHealth {
  /// Worst status wins: unreachable over degraded over healthy.
  pub fn merge<'a, I>(statuses: I) -> Option<HealthStatus>
  where
    I: IntoIterator<Item = &'a HealthStatus>,
  {
    statuses.into_iter().copied().max()
  }

  /// Stores `snapshot` unless an equal-or-newer observation for the same service is
  /// already held. Returns whether anything changed.
  pub fn apply(&mut self, snapshot: HealthSnapshot) -> bool {
    if let Some(current) = self.per_service.get(&snapshot.service_name) {
      if snapshot.observed_at < current.observed_at {
        return false;
      }
    }
    self.per_service.insert(snapshot.service_name, snapshot);
    self.overall = Self::merge(self.per_service.values().map(|s| &s.status));
    true
  }

  pub fn status_of(&self, service: ServiceName) -> Option<HealthStatus> {
    self.per_service.get(&service).map(|s| s.status)
  }
}

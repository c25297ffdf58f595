use std::sync::Arc;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{error, info};
use crate::error::SubmissionError;
use crate::ledger::TaskLedger;
use crate::models::TaskRecord;
use crate::registry::{QUEUE, ServiceName};
use crate::transport::{RequestOptions, Transport};

pub const DEFAULT_PRIORITY: i64 = 1;

/// Acknowledgement from the queue service. Every field is optional; only an id is used.
#[derive(Debug, Default, Deserialize)]
pub struct QueueAck {
  #[serde(default)]
  pub status: Option<String>,
  #[serde(default)]
  pub task_id: Option<Value>,
  #[serde(default)]
  pub id: Option<Value>,
}

impl QueueAck {
  pub fn remote_id(&self) -> Option<String> {
    self.task_id.as_ref().or(self.id.as_ref()).and_then(|v| match v {
      Value::String(s) if !s.is_empty() => Some(s.clone()),
      Value::Number(n) => Some(n.to_string()),
      _ => None,
    })
  }
}

#[derive(Clone)]
pub struct TaskSubmitter {
  transport: Transport,
  ledger: Arc<TaskLedger>,
}

impl TaskSubmitter {
  pub fn new(transport: Transport, ledger: Arc<TaskLedger>) -> Self {
    Self { transport, ledger }
  }

  /// Queues a task and records it locally. Nothing touches the ledger unless the queue
  /// service accepted the request.
  pub async fn submit(
    &self,
    task_type: &str,
    payload: Value,
    priority: i64,
  ) -> Result<TaskRecord, SubmissionError> {
    let task_type = task_type.trim();
    if task_type.is_empty() {
      return Err(SubmissionError::InvalidRequest("task type must not be empty".into()));
    }
    if priority < 0 {
      return Err(SubmissionError::InvalidRequest(format!("priority must not be negative, got {priority}")));
    }
    let priority = u32::try_from(priority).map_err(|_| {
      SubmissionError::InvalidRequest(format!("priority {priority} is out of range (max {})", u32::MAX))
    })?;

    let path = self.transport.registry().endpoint(ServiceName::QueueService, QUEUE)?.to_string();
    let body = json!({
      "task_type": task_type,
      "payload": payload,
      "priority": priority,
    });

    let ack = self
      .transport
      .send(ServiceName::QueueService, &path, RequestOptions::post(body))
      .await
      .map_err(|e| {
        error!("Failed to queue {} task: {}", task_type, e);
        SubmissionError::Transport(e)
      })?;

    // A 2xx with an odd body is still an accepted submission.
    let ack: QueueAck = serde_json::from_value(ack).unwrap_or_default();
    let record = TaskRecord::queued(task_type, payload, priority, ack.remote_id());
    self.ledger.insert(record.clone()).await?;
    info!(
      "Task {} ({}) queued, remote status {}",
      record.id,
      record.task_type,
      ack.status.as_deref().unwrap_or("n/a")
    );
    Ok(record)
  }

  pub async fn submit_default(&self, task_type: &str, payload: Value) -> Result<TaskRecord, SubmissionError> {
    self.submit(task_type, payload, DEFAULT_PRIORITY).await
  }
}

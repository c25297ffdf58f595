use std::collections::VecDeque;
use chrono::Utc;
use tokio::sync::{Mutex, watch};
use tracing::{info, warn};
use uuid::Uuid;
use crate::error::LedgerError;
use crate::models::{TaskEvent, TaskRecord, TaskState};

/// Newest-first record of every task this process has submitted.
///
/// All mutation goes through `insert` and `transition`; every successful mutation
/// republishes a full copy on the watch channel handed out by `watch`.
pub struct TaskLedger {
  records: Mutex<VecDeque<TaskRecord>>,
  published: watch::Sender<Vec<TaskRecord>>,
}

impl Default for TaskLedger {
  fn default() -> Self {
    Self::new()
  }
}

impl TaskLedger {
  pub fn new() -> Self {
    let (published, _) = watch::channel(Vec::new());
    Self {
      records: Mutex::new(VecDeque::new()),
      published,
    }
  }

  pub fn watch(&self) -> watch::Receiver<Vec<TaskRecord>> {
    self.published.subscribe()
  }

  pub async fn insert(&self, record: TaskRecord) -> Result<(), LedgerError> {
    let mut records = self.records.lock().await;
    if records.iter().any(|r| r.id == record.id) {
      return Err(LedgerError::DuplicateTask(record.id));
    }
    info!("Task {} ({}) added to ledger", record.id, record.task_type);
    records.push_front(record);
    self.publish(&records);
    Ok(())
  }

  pub async fn transition(
    &self,
    id: Uuid,
    new_state: TaskState,
    annotation: Option<String>,
  ) -> Result<TaskRecord, LedgerError> {
    let mut records = self.records.lock().await;
    let record = records
      .iter_mut()
      .find(|r| r.id == id)
      .ok_or(LedgerError::UnknownTask(id))?;

    let from = record.state;
    // Terminal records only accept a fresh error annotation on the same state.
    let annotating = from.is_terminal() && from == new_state && annotation.is_some();
    if !annotating && !from.can_transition_to(new_state) {
      warn!("Rejected transition {} -> {} for task {}", from, new_state, id);
      return Err(LedgerError::InvalidTransition { id, from, to: new_state });
    }

    record.state = new_state;
    record.last_updated_at = Utc::now();
    if annotation.is_some() {
      record.error = annotation;
    }
    info!("Task {} moved {} -> {}", id, from, new_state);

    let updated = record.clone();
    self.publish(&records);
    Ok(updated)
  }

  pub async fn apply_event(&self, event: TaskEvent) -> Result<TaskRecord, LedgerError> {
    self.transition(event.id, event.state, event.error).await
  }

  pub async fn get(&self, id: Uuid) -> Option<TaskRecord> {
    self.records.lock().await.iter().find(|r| r.id == id).cloned()
  }

  pub async fn snapshot(&self) -> Vec<TaskRecord> {
    self.records.lock().await.iter().cloned().collect()
  }

  pub async fn len(&self) -> usize {
    self.records.lock().await.len()
  }

  pub async fn is_empty(&self) -> bool {
    self.records.lock().await.is_empty()
  }

  fn publish(&self, records: &VecDeque<TaskRecord>) {
    self.published.send_replace(records.iter().cloned().collect());
  }
}

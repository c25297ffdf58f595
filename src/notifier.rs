use futures::Stream;
use tokio::sync::watch;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use crate::models::{AggregateHealth, TaskRecord};

#[derive(Debug, Clone)]
pub enum ChangeEvent {
  Health(AggregateHealth),
  Tasks(Vec<TaskRecord>),
}

/// Read side for presentation code. Built on watch channels, so a slow listener may
/// miss intermediate values but always sees the latest one.
#[derive(Clone)]
pub struct Notifier {
  health: watch::Receiver<AggregateHealth>,
  tasks: watch::Receiver<Vec<TaskRecord>>,
}

impl Notifier {
  pub fn new(health: watch::Receiver<AggregateHealth>, tasks: watch::Receiver<Vec<TaskRecord>>) -> Self {
    Self { health, tasks }
  }

  pub fn health(&self) -> AggregateHealth {
    self.health.borrow().clone()
  }

  pub fn tasks(&self) -> Vec<TaskRecord> {
    self.tasks.borrow().clone()
  }

  /// Every change after this call, health and ledger interleaved.
  pub fn changes(&self) -> impl Stream<Item = ChangeEvent> + Send + 'static {
    let health = WatchStream::from_changes(self.health.clone()).map(ChangeEvent::Health);
    let tasks = WatchStream::from_changes(self.tasks.clone()).map(ChangeEvent::Tasks);
    health.merge(tasks)
  }

  /// Calls `listener` on every change until the returned subscription is dropped.
  pub fn on_change<F>(&self, listener: F) -> Subscription
  where
    F: Fn(ChangeEvent) + Send + 'static,
  {
    let token = CancellationToken::new();
    let cancelled = token.clone();
    let mut changes = Box::pin(self.changes());
    tokio::spawn(async move {
      loop {
        tokio::select! {
          biased;
          _ = cancelled.cancelled() => break,
          next = changes.next() => match next {
            Some(event) => listener(event),
            None => break,
          },
        }
      }
    });
    Subscription { token }
  }
}

#[must_use = "dropping a subscription stops delivery"]
pub struct Subscription {
  token: CancellationToken,
}

impl Subscription {
  pub fn unsubscribe(self) {
    self.token.cancel();
  }

  pub fn is_active(&self) -> bool {
    !self.token.is_cancelled()
  }
}

impl Drop for Subscription {
  fn drop(&mut self) {
    self.token.cancel();
  }
}

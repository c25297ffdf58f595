use thiserror::Error;
use uuid::Uuid;
use crate::models::TaskState;
use crate::registry::ServiceName;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
  #[error("service '{0}' is not registered")]
  UnknownService(ServiceName),

  #[error("service '{service}' has no '{endpoint}' endpoint")]
  UnknownEndpoint { service: ServiceName, endpoint: String },

  #[error("request failed: {status} {status_text}")]
  HttpStatus { status: u16, status_text: String },

  #[error("cannot build request url: {0}")]
  InvalidUrl(String),

  #[error("network failure: {0}")]
  Network(String),

  #[error("response body is not valid JSON: {0}")]
  InvalidBody(String),
}

impl TransportError {
  /// True when the remote end produced no usable HTTP response at all.
  pub fn is_network(&self) -> bool {
    matches!(self, TransportError::Network(_))
  }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SubmissionError {
  #[error("invalid task request: {0}")]
  InvalidRequest(String),

  #[error("task submission failed: {0}")]
  Transport(#[from] TransportError),

  #[error("could not record task: {0}")]
  Ledger(#[from] LedgerError),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
  #[error("task {0} is not in the ledger")]
  UnknownTask(Uuid),

  #[error("task {id} cannot move from {from} to {to}")]
  InvalidTransition { id: Uuid, from: TaskState, to: TaskState },

  #[error("task {0} is already in the ledger")]
  DuplicateTask(Uuid),
}

#[derive(Debug, Error)]
pub enum ServiceCallError {
  #[error("invalid request: {0}")]
  InvalidRequest(String),

  #[error(transparent)]
  Transport(#[from] TransportError),

  #[error("unexpected response shape: {0}")]
  Schema(#[from] serde_json::Error),
}

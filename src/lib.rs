pub mod config;
pub mod context;
pub mod error;
pub mod health;
pub mod ledger;
pub mod models;
pub mod notifier;
pub mod registry;
pub mod services;
pub mod submitter;
pub mod transport;

pub use context::ConsoleContext;
pub use error::{LedgerError, ServiceCallError, SubmissionError, TransportError};
pub use models::{AggregateHealth, HealthSnapshot, HealthStatus, TaskEvent, TaskRecord, TaskState};
pub use notifier::{ChangeEvent, Notifier, Subscription};
pub use registry::{ServiceDescriptor, ServiceName, ServiceRegistry};

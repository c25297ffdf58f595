use std::sync::Arc;
use anyhow::{Context, Result};
use tracing::info;
use crate::config::Config;
use crate::health::HealthMonitor;
use crate::ledger::TaskLedger;
use crate::notifier::Notifier;
use crate::registry::ServiceRegistry;
use crate::services::ServiceClient;
use crate::submitter::TaskSubmitter;
use crate::transport::Transport;

/// Everything the console needs, built once per process and passed around by reference.
pub struct ConsoleContext {
  pub config: Config,
  pub registry: Arc<ServiceRegistry>,
  pub monitor: HealthMonitor,
  pub ledger: Arc<TaskLedger>,
  pub submitter: TaskSubmitter,
  pub services: ServiceClient,
  pub notifier: Notifier,
}

impl ConsoleContext {
  pub fn new(config: Config) -> Result<Self> {
    let registry = Arc::new(ServiceRegistry::from_config(&config));
    Self::with_registry(config, registry)
  }

  /// Same as `new` but with a caller-built registry, for deployments that run without
  /// one of the services.
  pub fn with_registry(config: Config, registry: Arc<ServiceRegistry>) -> Result<Self> {
    config.validate()?;
    let transport = Transport::new(registry.clone(), config.request_timeout)
      .context("Failed to build HTTP transport")?;
    let monitor = HealthMonitor::new(transport.clone(), config.poll_interval);
    let ledger = Arc::new(TaskLedger::new());
    let submitter = TaskSubmitter::new(transport.clone(), ledger.clone());
    let services = ServiceClient::new(transport);
    let notifier = Notifier::new(monitor.watch(), ledger.watch());

    for name in registry.names() {
      if let Ok(desc) = registry.resolve(name) {
        info!("Registered {} at {}", name, desc.base_address);
      }
    }

    Ok(Self { config, registry, monitor, ledger, submitter, services, notifier })
  }
}

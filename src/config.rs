use std::env;
use std::time::Duration;
use anyhow::{Context, Result, anyhow, bail};
use regex::Regex;
use reqwest::Url;

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";
pub const DEFAULT_QUEUE_SERVICE_URL: &str = "http://localhost:8001";
pub const DEFAULT_WORKER_SERVICE_URL: &str = "http://localhost:8002";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_USER: &str = "demo-user-123";
pub const DEFAULT_LOG_FILE: &str = "desk_console.log";

#[derive(Debug, Clone)]
pub struct Config {
  pub backend_url: Url,
  pub queue_service_url: Url,
  pub worker_service_url: Url,
  pub poll_interval: Duration,
  pub request_timeout: Duration,
  pub user: String,
  pub log_file: String,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      backend_url: Url::parse(DEFAULT_BACKEND_URL).expect("default backend url"),
      queue_service_url: Url::parse(DEFAULT_QUEUE_SERVICE_URL).expect("default queue url"),
      worker_service_url: Url::parse(DEFAULT_WORKER_SERVICE_URL).expect("default worker url"),
      poll_interval: DEFAULT_POLL_INTERVAL,
      request_timeout: DEFAULT_REQUEST_TIMEOUT,
      user: DEFAULT_USER.into(),
      log_file: DEFAULT_LOG_FILE.into(),
    }
  }
}

impl Config {
  pub fn from_env() -> Result<Self> {
    Self::from_lookup(|key| env::var(key).ok())
  }

  /// Builds a config from an arbitrary key lookup; `from_env` passes the process environment.
  pub fn from_lookup<F>(lookup: F) -> Result<Self>
  where
    F: Fn(&str) -> Option<String>,
  {
    let url = |key: &str, default: &str| -> Result<Url> {
      let raw = lookup(key).unwrap_or_else(|| default.into());
      Url::parse(&raw).with_context(|| format!("{key} is not a valid URL: {raw}"))
    };
    let duration = |key: &str, default: Duration| -> Result<Duration> {
      match lookup(key) {
        Some(raw) => parse_duration(&raw).with_context(|| format!("{key} is not a valid duration")),
        None => Ok(default),
      }
    };

    let config = Self {
      backend_url: url("BACKEND_URL", DEFAULT_BACKEND_URL)?,
      queue_service_url: url("QUEUE_SERVICE_URL", DEFAULT_QUEUE_SERVICE_URL)?,
      worker_service_url: url("WORKER_SERVICE_URL", DEFAULT_WORKER_SERVICE_URL)?,
      poll_interval: duration("POLL_INTERVAL", DEFAULT_POLL_INTERVAL)?,
      request_timeout: duration("REQUEST_TIMEOUT", DEFAULT_REQUEST_TIMEOUT)?,
      user: lookup("CONSOLE_USER").unwrap_or_else(|| DEFAULT_USER.into()),
      log_file: lookup("CONSOLE_LOG_FILE").unwrap_or_else(|| DEFAULT_LOG_FILE.into()),
    };
    config.validate()?;
    Ok(config)
  }

  pub fn validate(&self) -> Result<()> {
    if self.poll_interval.is_zero() {
      bail!("poll interval must be greater than zero");
    }
    if self.request_timeout.is_zero() {
      bail!("request timeout must be greater than zero");
    }
    // A stopped monitor must go quiet within one interval, so no poll may outlive it.
    if self.request_timeout > self.poll_interval {
      bail!(
        "request timeout ({:?}) must not exceed the poll interval ({:?})",
        self.request_timeout,
        self.poll_interval
      );
    }
    Ok(())
  }
}

/// Parses `250ms`, `10s`, `2m` or a bare number of seconds.
pub fn parse_duration(raw: &str) -> Result<Duration> {
  let re = Regex::new(r"^\s*(\d+)\s*(ms|s|m)?\s*$")?;
  let caps = re
    .captures(raw)
    .ok_or_else(|| anyhow!("unrecognised duration '{raw}'"))?;
  let value: u64 = caps[1].parse()?;
  Ok(match caps.get(2).map(|m| m.as_str()) {
    Some("ms") => Duration::from_millis(value),
    Some("m") => Duration::from_secs(value * 60),
    _ => Duration::from_secs(value),
  })
}

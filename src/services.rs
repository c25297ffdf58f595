//! Typed calls for the rest of the backend, queue and worker endpoints.
//!
//! None of these retry. A failure goes straight back to the caller.

use std::collections::BTreeMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{error, info};
use crate::error::ServiceCallError;
use crate::registry::{
  CHAT, CONVERSATIONS, NOTIFY, PROCESS, SEARCH, SENTIMENT, STRIPE_EVENTS, ServiceName, WEBHOOK,
};
use crate::transport::{RequestOptions, Transport};

pub const DEFAULT_SEARCH_LIMIT: u32 = 5;
pub const DEFAULT_EVENT_LIMIT: u32 = 10;
pub const DEFAULT_ANALYTICS_DAYS: u32 = 7;

#[derive(Debug, Serialize)]
pub struct ChatRequest<'a> {
  pub user: &'a str,
  pub message: &'a str,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub session_id: Option<&'a str>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatReply {
  pub response: String,
  #[serde(default)]
  pub sentiment: BTreeMap<String, f64>,
  #[serde(default)]
  pub actions_taken: Vec<String>,
  #[serde(default)]
  pub session_id: Option<String>,
}

impl ChatReply {
  pub fn took_payment_action(&self) -> bool {
    self.actions_taken.iter().any(|a| a.contains("payment"))
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchReply {
  pub results: Vec<Value>,
  #[serde(default)]
  pub total_count: Option<u64>,
}

/// The analytics payload has never been pinned down, so every known field is optional
/// and anything else is kept verbatim.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SentimentAnalytics {
  #[serde(default)]
  pub period: Option<String>,
  #[serde(default)]
  pub avg_sentiment: Option<BTreeMap<String, f64>>,
  #[serde(default)]
  pub total_conversations: Option<u64>,
  #[serde(default)]
  pub trend: Option<String>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentEvent {
  pub id: String,
  #[serde(rename = "type")]
  pub event_type: String,
  #[serde(default)]
  pub created: Option<i64>,
  #[serde(default)]
  pub data: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct PaymentEventsReply {
  #[serde(default)]
  events: Vec<PaymentEvent>,
}

#[derive(Debug, Deserialize)]
struct ConversationsReply {
  #[serde(default)]
  conversations: Vec<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerReply {
  pub status: String,
  #[serde(default)]
  pub result: Option<Value>,
}

fn require(value: &str, what: &str) -> Result<(), ServiceCallError> {
  if value.trim().is_empty() {
    return Err(ServiceCallError::InvalidRequest(format!("{what} must not be empty")));
  }
  Ok(())
}

/// Characters that survive as-is inside a single path segment.
fn is_path_safe(c: char) -> bool {
  c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~' | '@')
}

fn require_positive(value: u32, what: &str) -> Result<(), ServiceCallError> {
  if value == 0 {
    return Err(ServiceCallError::InvalidRequest(format!("{what} must be greater than zero")));
  }
  Ok(())
}

#[derive(Clone)]
pub struct ServiceClient {
  transport: Transport,
}

impl ServiceClient {
  pub fn new(transport: Transport) -> Self {
    Self { transport }
  }

  async fn call<T: DeserializeOwned>(
    &self,
    service: ServiceName,
    endpoint: &str,
    suffix: &str,
    options: RequestOptions,
  ) -> Result<T, ServiceCallError> {
    let path = format!("{}{}", self.transport.registry().endpoint(service, endpoint)?, suffix);
    let body = self.transport.send(service, &path, options).await.map_err(|e| {
      error!("{} call to {} failed: {}", service, path, e);
      e
    })?;
    Ok(serde_json::from_value(body)?)
  }

  pub async fn chat(&self, user: &str, message: &str, session_id: Option<&str>) -> Result<ChatReply, ServiceCallError> {
    require(user, "user")?;
    require(message, "message")?;
    let body = serde_json::to_value(ChatRequest { user, message, session_id })?;
    let reply: ChatReply = self.call(ServiceName::Backend, CHAT, "", RequestOptions::post(body)).await?;
    info!("Chat reply for {} with {} actions", user, reply.actions_taken.len());
    Ok(reply)
  }

  pub async fn search(&self, query: &str, limit: u32, include_images: bool) -> Result<SearchReply, ServiceCallError> {
    require(query, "query")?;
    require_positive(limit, "limit")?;
    let body = json!({ "query": query, "limit": limit, "include_images": include_images });
    self.call(ServiceName::Backend, SEARCH, "", RequestOptions::post(body)).await
  }

  pub async fn sentiment_analytics(&self, days: u32) -> Result<SentimentAnalytics, ServiceCallError> {
    require_positive(days, "days")?;
    let options = RequestOptions::get().with_query("days", days);
    self.call(ServiceName::Backend, SENTIMENT, "", options).await
  }

  pub async fn payment_events(&self, limit: u32) -> Result<Vec<PaymentEvent>, ServiceCallError> {
    require_positive(limit, "limit")?;
    let options = RequestOptions::get().with_query("limit", limit);
    let reply: PaymentEventsReply = self.call(ServiceName::Backend, STRIPE_EVENTS, "", options).await?;
    Ok(reply.events)
  }

  pub async fn conversations(&self, user: &str, limit: u32) -> Result<Vec<Value>, ServiceCallError> {
    require(user, "user")?;
    require_positive(limit, "limit")?;
    let user = user.trim();
    if !user.chars().all(is_path_safe) {
      return Err(ServiceCallError::InvalidRequest(format!(
        "user '{user}' may only contain letters, digits and '-', '.', '_', '~', '@'"
      )));
    }
    let options = RequestOptions::get().with_query("limit", limit);
    let suffix = format!("/{user}");
    let reply: ConversationsReply = self.call(ServiceName::Backend, CONVERSATIONS, &suffix, options).await?;
    Ok(reply.conversations)
  }

  pub async fn send_webhook(&self, source: &str, event_type: &str, data: Value) -> Result<Value, ServiceCallError> {
    require(source, "source")?;
    require(event_type, "event type")?;
    let body = json!({ "source": source, "event_type": event_type, "data": data });
    let ack = self.call(ServiceName::QueueService, WEBHOOK, "", RequestOptions::post(body)).await?;
    info!("Webhook {}:{} forwarded", source, event_type);
    Ok(ack)
  }

  pub async fn notify(&self, notification: Value) -> Result<Value, ServiceCallError> {
    self.call(ServiceName::QueueService, NOTIFY, "", RequestOptions::post(notification)).await
  }

  /// Hands a task straight to the worker, bypassing the queue.
  pub async fn process_on_worker(&self, task_type: &str, payload: Value) -> Result<WorkerReply, ServiceCallError> {
    require(task_type, "task type")?;
    let body = json!({ "task_type": task_type, "payload": payload });
    self.call(ServiceName::WorkerService, PROCESS, "", RequestOptions::post(body)).await
  }
}

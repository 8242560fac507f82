//! Request and response types for reflection and event methods.

use serde::{Deserialize, Serialize};

/// Parameters for triggering a reflection cycle.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerReflectionParams {
    /// Bypass the scheduler and reflector rate limits (default: true)
    #[serde(default = "default_true")]
    pub force: bool,
}

/// Parameters for a topic reflection.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicReflectionParams {
    pub topic: String,
}

/// Parameters for reporting a named event.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventNotifyParams {
    pub event_type: String,
}

/// Outcome of a reflection request.
#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReflectionResponse {
    /// "success" when a prompt was produced, "no_insight" otherwise
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

impl ReflectionResponse {
    pub const SUCCESS: &'static str = "success";
    pub const NO_INSIGHT: &'static str = "no_insight";
}

impl From<Option<String>> for ReflectionResponse {
    fn from(prompt: Option<String>) -> Self {
        let status = if prompt.is_some() {
            Self::SUCCESS
        } else {
            Self::NO_INSIGHT
        };
        Self {
            status: status.to_string(),
            prompt,
        }
    }
}

/// Outcome of an event notification.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventNotifyResponse {
    pub event_type: String,
    #[serde(flatten)]
    pub reflection: ReflectionResponse,
}

fn default_true() -> bool {
    true
}

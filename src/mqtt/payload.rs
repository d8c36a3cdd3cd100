//! Wire payloads for the request/reply exchange with the workflow engine.

use crate::config::REQUEST_SOURCE_TAG;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outbound transcript published to the request topic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequestPayload {
    pub text: String,
    pub lang: String,
    pub timestamp: String,
    pub corr_id: String,
    pub reply_topic: String,
    pub source: String,
}

impl RequestPayload {
    /// Build a request with a fresh correlation id and an RFC 3339 timestamp.
    pub fn new(text: &str, lang: &str, base_reply_topic: &str) -> Self {
        let corr_id = Uuid::new_v4().to_string();
        let reply_topic = format!("{base_reply_topic}/{corr_id}");
        Self {
            text: text.to_string(),
            lang: lang.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            corr_id,
            reply_topic,
            source: REQUEST_SOURCE_TAG.to_string(),
        }
    }
}

/// Inbound reply from the workflow engine.
///
/// Producers are inconsistent about field names, so both the `reply` and
/// `text` content keys are accepted, and `correlation_id` aliases `corr_id`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReplyPayload {
    #[serde(default, alias = "correlation_id")]
    pub corr_id: Option<String>,
    #[serde(default)]
    pub reply: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

impl ReplyPayload {
    /// The spoken content: `reply` wins over `text`, empty strings count as
    /// absent.
    pub fn reply_text(&self) -> Option<&str> {
        for candidate in [self.reply.as_deref(), self.text.as_deref()] {
            match candidate {
                Some(value) if !value.trim().is_empty() => return Some(value),
                _ => {}
            }
        }
        None
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// Server-assigned conversation id. The backend happens to use integers, but the
// client never does arithmetic on it, so it is kept as an opaque string.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// One row of the history sidebar
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ConversationSummary {
    pub id: ConversationId,
    pub prompt_preview: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_tag: Option<String>, // e.g. a job-role hint
}

// The answer of a single upstream model
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ProviderResponse {
    pub provider_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub latency_ms: u64,
    pub succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_text: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Synthesis {
    pub content: String,
    // "Fallback" when the backend could not synthesize and echoed one answer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

// Full conversation, fetched on demand when a summary is selected
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ConversationDetail {
    pub id: ConversationId,
    pub prompt: String,
    pub provider_responses: Vec<ProviderResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synthesis: Option<Synthesis>,
}

// Result of a successful `process` call
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ProcessResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<ConversationId>,
    pub provider_responses: Vec<ProviderResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synthesis: Option<Synthesis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synthesis_error: Option<String>,
}

impl ProcessResult {
    pub fn succeeded_count(&self) -> usize {
        self.provider_responses.iter().filter(|r| r.succeeded).count()
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum NotificationKind {
    Error,
    Success,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct UiNotification {
    pub id: Uuid,
    pub kind: NotificationKind,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

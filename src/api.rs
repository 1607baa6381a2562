use crate::error::GatewayError;
use crate::models::{
    ConversationDetail, ConversationId, ConversationSummary, ProcessResult, ProviderResponse,
    Synthesis,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::{Client, Response, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Number of characters of the prompt shown in the history list.
pub const PREVIEW_CHARS: usize = 60;

// Trait defining the contract of the aggregation backend
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    /// Fans the prompt out to every model and returns their answers plus the synthesis.
    async fn process(&self, prompt: &str, user_id: u64) -> Result<ProcessResult, GatewayError>;

    /// Newest first, as stored remotely.
    async fn list_conversations(&self, user_id: u64) -> Result<Vec<ConversationSummary>, GatewayError>;

    async fn get_conversation(&self, id: &ConversationId) -> Result<ConversationDetail, GatewayError>;

    async fn delete_conversation(&self, id: &ConversationId) -> Result<(), GatewayError>;
}

// --- Wire types ---

#[derive(Serialize, Debug)]
struct ProcessRequestBody<'a> {
    prompt: &'a str,
    user_id: u64,
}

#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum WireId {
    Int(i64),
    Text(String),
}

impl From<WireId> for ConversationId {
    fn from(id: WireId) -> Self {
        match id {
            WireId::Int(n) => ConversationId::new(n.to_string()),
            WireId::Text(s) => ConversationId::new(s),
        }
    }
}

#[derive(Deserialize, Debug)]
struct WireProviderResponse {
    #[serde(default)]
    provider: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default, alias = "latencyMs", alias = "latency_ms")]
    latency: Option<f64>,
    #[serde(default, alias = "succeeded")]
    success: bool,
}

// `process` returns an object, stored conversations keep only the text
#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum WireSynthesis {
    Text(String),
    Object {
        #[serde(default)]
        content: Option<String>,
        #[serde(default)]
        provider: Option<String>,
        #[serde(default)]
        error: Option<String>,
    },
}

#[derive(Deserialize, Debug)]
struct WireProcessResponse {
    #[serde(default)]
    conversation_id: Option<WireId>,
    #[serde(default)]
    responses: Vec<WireProviderResponse>,
    #[serde(default)]
    synthesis: Option<WireSynthesis>,
}

#[derive(Deserialize, Debug)]
struct WireConversation {
    id: WireId,
    #[serde(default)]
    prompt: String,
    #[serde(default, alias = "createdAt")]
    created_at: Option<String>,
    #[serde(default)]
    context: Option<serde_json::Value>,
    #[serde(default)]
    responses: Option<Vec<WireProviderResponse>>,
    #[serde(default)]
    synthesis: Option<WireSynthesis>,
}

impl From<WireProviderResponse> for ProviderResponse {
    fn from(wire: WireProviderResponse) -> Self {
        let latency_ms = wire.latency.filter(|l| l.is_finite() && *l > 0.0).map_or(0, |l| l.round() as u64);
        if wire.success {
            ProviderResponse {
                provider_name: wire.provider,
                content: Some(wire.content.unwrap_or_default()),
                latency_ms,
                succeeded: true,
                error_text: None,
            }
        } else {
            ProviderResponse {
                provider_name: wire.provider,
                content: None,
                latency_ms,
                succeeded: false,
                error_text: Some(wire.error.unwrap_or_else(|| "Service unavailable".to_string())),
            }
        }
    }
}

// Splits the wire synthesis into the displayable answer or the reason there is none.
fn split_synthesis(wire: Option<WireSynthesis>) -> (Option<Synthesis>, Option<String>) {
    match wire {
        Some(WireSynthesis::Text(content)) if !content.trim().is_empty() => {
            (Some(Synthesis { content, provider: None }), None)
        }
        Some(WireSynthesis::Object { content: Some(content), provider, .. }) if !content.trim().is_empty() => {
            (Some(Synthesis { content, provider }), None)
        }
        Some(WireSynthesis::Object { error: Some(error), .. }) => (None, Some(error)),
        _ => (None, None),
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, GatewayError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    // The backend stores naive UTC datetimes
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .map(|naive| naive.and_utc())
        .map_err(|e| GatewayError::Decode(format!("Invalid timestamp '{}': {}", raw, e)))
}

fn context_tag(context: &serde_json::Value) -> Option<String> {
    let tag = match context {
        serde_json::Value::String(s) => Some(s.as_str()),
        serde_json::Value::Object(_) => context
            .pointer("/personal_info/job_role")
            .and_then(serde_json::Value::as_str),
        _ => None,
    };
    tag.map(str::trim).filter(|t| !t.is_empty()).map(str::to_string)
}

/// Collapses whitespace and truncates the prompt for the history list.
pub fn prompt_preview(prompt: &str) -> String {
    let flattened = prompt.split_whitespace().collect::<Vec<_>>().join(" ");
    if flattened.chars().count() <= PREVIEW_CHARS {
        return flattened;
    }
    let mut preview: String = flattened.chars().take(PREVIEW_CHARS).collect();
    preview.push('…');
    preview
}

fn decode<T: for<'de> Deserialize<'de>>(body: &str) -> Result<T, GatewayError> {
    serde_json::from_str(body).map_err(|e| GatewayError::Decode(e.to_string()))
}

fn decode_process(body: &str) -> Result<ProcessResult, GatewayError> {
    let wire: WireProcessResponse = decode(body)?;
    let (synthesis, synthesis_error) = split_synthesis(wire.synthesis);
    Ok(ProcessResult {
        conversation_id: wire.conversation_id.map(ConversationId::from),
        provider_responses: wire.responses.into_iter().map(ProviderResponse::from).collect(),
        synthesis,
        synthesis_error,
    })
}

fn decode_summaries(body: &str) -> Result<Vec<ConversationSummary>, GatewayError> {
    let wire: Vec<WireConversation> = decode(body)?;
    wire.into_iter()
        .map(|conversation| {
            let id = ConversationId::from(conversation.id);
            let created_at = conversation
                .created_at
                .as_deref()
                .ok_or_else(|| GatewayError::Decode(format!("Conversation {} has no created_at", id)))
                .and_then(parse_timestamp)?;
            Ok(ConversationSummary {
                prompt_preview: prompt_preview(&conversation.prompt),
                created_at,
                context_tag: conversation.context.as_ref().and_then(context_tag),
                id,
            })
        })
        .collect()
}

fn decode_detail(body: &str) -> Result<ConversationDetail, GatewayError> {
    let wire: WireConversation = decode(body)?;
    let (synthesis, _) = split_synthesis(wire.synthesis);
    Ok(ConversationDetail {
        id: wire.id.into(),
        prompt: wire.prompt,
        provider_responses: wire
            .responses
            .unwrap_or_default()
            .into_iter()
            .map(ProviderResponse::from)
            .collect(),
        synthesis,
    })
}

// Pulls the FastAPI-style `{"detail": "..."}` message out of an error body.
fn extract_detail(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value.get("detail")?.as_str().map(str::to_string)
}

async fn check_status(response: Response) -> Result<Response, GatewayError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    log::error!("Gateway request failed with status {}: {}", status, body);
    Err(GatewayError::from_status(status.as_u16(), extract_detail(&body)))
}

// --- HTTP implementation ---

pub struct HttpGateway {
    client: Client,
    base_url: Url,
}

impl HttpGateway {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url).context(format!("Invalid gateway URL '{}'", base_url))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("Gateway URL '{}' cannot be used as a base URL", base_url);
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client, base_url })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, GatewayError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| GatewayError::Network(format!("Invalid gateway URL '{}'", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

#[async_trait]
impl RemoteGateway for HttpGateway {
    async fn process(&self, prompt: &str, user_id: u64) -> Result<ProcessResult, GatewayError> {
        let url = self.endpoint(&["process"])?;
        log::info!("Sending prompt ({} chars) to {}", prompt.chars().count(), url);

        let response = self
            .client
            .post(url)
            .json(&ProcessRequestBody { prompt, user_id })
            .send()
            .await?;
        let body = check_status(response).await?.text().await?;
        let result = decode_process(&body)?;
        log::info!(
            "Received {} responses ({} succeeded), synthesis: {}",
            result.provider_responses.len(),
            result.succeeded_count(),
            result.synthesis.is_some()
        );
        Ok(result)
    }

    async fn list_conversations(&self, user_id: u64) -> Result<Vec<ConversationSummary>, GatewayError> {
        let url = self.endpoint(&["conversations"])?;
        log::debug!("Listing conversations for user {}", user_id);

        let response = self
            .client
            .get(url)
            .query(&[("user_id", user_id)])
            .send()
            .await?;
        let body = check_status(response).await?.text().await?;
        decode_summaries(&body)
    }

    async fn get_conversation(&self, id: &ConversationId) -> Result<ConversationDetail, GatewayError> {
        let url = self.endpoint(&["conversations", id.as_str()])?;
        log::debug!("Fetching conversation {}", id);

        let response = self.client.get(url).send().await?;
        let body = check_status(response).await?.text().await?;
        decode_detail(&body)
    }

    async fn delete_conversation(&self, id: &ConversationId) -> Result<(), GatewayError> {
        let url = self.endpoint(&["conversations", id.as_str()])?;
        log::warn!("Deleting conversation {}", id);

        let response = self.client.delete(url).send().await?;
        check_status(response).await?;
        Ok(())
    }
}

// View models for results and history, plus the seams to the markdown
// renderer, the math typesetter and whatever displays them.

use crate::models::{
    ConversationDetail, ConversationId, ConversationSummary, ProcessResult, ProviderResponse,
    Synthesis,
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::Local;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Turns markdown into markup that is safe to display as-is. Sanitizing is
/// the implementation's job.
pub trait MarkdownRenderer: Send + Sync {
    fn render(&self, markdown: &str) -> String;
}

#[async_trait]
pub trait MathTypesetter: Send + Sync {
    async fn typeset(&self, scope: &str) -> Result<()>;
}

/// Where view models end up (a page, a terminal, a test recorder).
pub trait Surface: Send + Sync {
    fn set_loading(&self, visible: bool);
    /// Drops the response cards and hides the synthesis panel.
    fn clear_results(&self);
    fn show_results(&self, view: &ResultsView) -> Result<()>;
    fn clear_prompt(&self);
    /// Hint only; the limiter stays the authority.
    fn show_remaining(&self, remaining: usize, capacity: usize);
}

// Terminal-safe renderer: keeps the markdown text, strips control characters
pub struct PlainTextRenderer;

impl MarkdownRenderer for PlainTextRenderer {
    fn render(&self, markdown: &str) -> String {
        markdown
            .chars()
            .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
            .collect()
    }
}

pub struct NoopTypesetter;

#[async_trait]
impl MathTypesetter for NoopTypesetter {
    async fn typeset(&self, scope: &str) -> Result<()> {
        log::debug!("Math typesetting skipped for {}", scope);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResponseCard {
    pub provider: String,
    pub body: String,
    pub latency_label: String,
    pub succeeded: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SynthesisPanel {
    Ready { body: String, provider: Option<String> },
    Unavailable { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResultsView {
    pub prompt: Option<String>,
    pub cards: Vec<ResponseCard>,
    pub synthesis: Option<SynthesisPanel>,
    // Raw content carries math delimiters; typeset after display
    pub has_math: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntryView {
    pub id: ConversationId,
    pub position: usize,
    pub preview: String,
    pub created_label: String,
    pub context_tag: Option<String>,
    pub active: bool,
}

pub fn format_latency(latency_ms: u64) -> String {
    if latency_ms < 1000 {
        format!("{}ms", latency_ms)
    } else {
        format!("{:.1}s", latency_ms as f64 / 1000.0)
    }
}

/// Display math (`$$`, `\[ \]`), inline `\( \)` and LaTeX environments.
pub fn contains_math(text: &str) -> bool {
    text.contains("$$") || text.contains("\\(") || text.contains("\\[") || text.contains("\\begin{")
}

pub struct PresentationAdapter {
    renderer: Arc<dyn MarkdownRenderer>,
    typesetter: Arc<dyn MathTypesetter>,
}

impl PresentationAdapter {
    pub fn new(renderer: Arc<dyn MarkdownRenderer>, typesetter: Arc<dyn MathTypesetter>) -> Self {
        Self { renderer, typesetter }
    }

    pub fn results_view(&self, result: &ProcessResult) -> ResultsView {
        self.build(
            None,
            &result.provider_responses,
            result.synthesis.as_ref(),
            result.synthesis_error.as_deref(),
        )
    }

    pub fn detail_view(&self, detail: &ConversationDetail) -> ResultsView {
        self.build(
            Some(detail.prompt.clone()),
            &detail.provider_responses,
            detail.synthesis.as_ref(),
            None,
        )
    }

    fn build(
        &self,
        prompt: Option<String>,
        responses: &[ProviderResponse],
        synthesis: Option<&Synthesis>,
        synthesis_error: Option<&str>,
    ) -> ResultsView {
        let mut has_math = false;
        let cards = responses
            .iter()
            .map(|response| {
                let body = match (&response.content, response.succeeded) {
                    (Some(content), true) => {
                        has_math |= contains_math(content);
                        self.renderer.render(content)
                    }
                    _ => format!(
                        "Error: {}",
                        response.error_text.as_deref().unwrap_or("Service unavailable")
                    ),
                };
                ResponseCard {
                    provider: response.provider_name.clone(),
                    body,
                    latency_label: format_latency(response.latency_ms),
                    succeeded: response.succeeded,
                }
            })
            .collect();

        let synthesis = match (synthesis, synthesis_error) {
            (Some(synthesis), _) => {
                has_math |= contains_math(&synthesis.content);
                Some(SynthesisPanel::Ready {
                    body: self.renderer.render(&synthesis.content),
                    provider: synthesis.provider.clone(),
                })
            }
            (None, Some(reason)) => Some(SynthesisPanel::Unavailable {
                reason: reason.to_string(),
            }),
            (None, None) => None,
        };

        ResultsView {
            prompt,
            cards,
            synthesis,
            has_math,
        }
    }

    pub fn history_view(
        &self,
        entries: &[ConversationSummary],
        active: Option<&ConversationId>,
    ) -> Vec<HistoryEntryView> {
        entries
            .iter()
            .enumerate()
            .map(|(index, entry)| HistoryEntryView {
                id: entry.id.clone(),
                position: index + 1,
                preview: entry.prompt_preview.clone(),
                created_label: entry
                    .created_at
                    .with_timezone(&Local)
                    .format("%Y-%m-%d %H:%M")
                    .to_string(),
                context_tag: entry.context_tag.clone(),
                active: active == Some(&entry.id),
            })
            .collect()
    }

    /// Fire-and-forget: failures are logged, never shown, never awaited by the
    /// request lifecycle.
    pub fn typeset(&self, scope: &str) -> JoinHandle<()> {
        let typesetter = Arc::clone(&self.typesetter);
        let scope = scope.to_string();
        tokio::spawn(async move {
            if let Err(e) = typesetter.typeset(&scope).await {
                log::warn!("Math typesetting failed for {}: {:#}", scope, e);
            }
        })
    }
}

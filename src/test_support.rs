// Fakes shared by the unit tests

use crate::api::RemoteGateway;
use crate::error::GatewayError;
use crate::history::Confirmer;
use crate::models::{
    ConversationDetail, ConversationId, ConversationSummary, ProcessResult, ProviderResponse,
};
use crate::presentation::{MarkdownRenderer, MathTypesetter, ResultsView, Surface};
use crate::controller::Clock;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

pub fn summary(id: &str, created_secs: i64) -> ConversationSummary {
    ConversationSummary {
        id: ConversationId::new(id),
        prompt_preview: format!("prompt {}", id),
        created_at: DateTime::from_timestamp(created_secs, 0).unwrap(),
        context_tag: None,
    }
}

pub fn ok_response(provider: &str, content: &str) -> ProviderResponse {
    ProviderResponse {
        provider_name: provider.to_string(),
        content: Some(content.to_string()),
        latency_ms: 120,
        succeeded: true,
        error_text: None,
    }
}

pub fn failed_response(provider: &str, error: &str) -> ProviderResponse {
    ProviderResponse {
        provider_name: provider.to_string(),
        content: None,
        latency_ms: 30_000,
        succeeded: false,
        error_text: Some(error.to_string()),
    }
}

#[derive(Default)]
struct FakeState {
    conversations: Vec<ConversationSummary>,
    process_result: Option<ProcessResult>,
    process_error: Option<GatewayError>,
    list_error: Option<GatewayError>,
    delete_error: Option<GatewayError>,
    last_prompt: Option<String>,
    last_user_id: Option<u64>,
    gate: Option<Arc<Notify>>,
    list_gate: Option<Arc<Notify>>,
}

#[derive(Default)]
pub struct FakeGateway {
    state: Mutex<FakeState>,
    process_calls: AtomicUsize,
    list_calls: AtomicUsize,
    get_calls: AtomicUsize,
    delete_calls: AtomicUsize,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_conversations(&self, conversations: Vec<ConversationSummary>) {
        self.state.lock().unwrap().conversations = conversations;
    }

    pub fn set_process_result(&self, result: ProcessResult) {
        self.state.lock().unwrap().process_result = Some(result);
    }

    pub fn fail_process(&self, error: GatewayError) {
        self.state.lock().unwrap().process_error = Some(error);
    }

    pub fn fail_list(&self, error: GatewayError) {
        self.state.lock().unwrap().list_error = Some(error);
    }

    pub fn fail_delete(&self, error: GatewayError) {
        self.state.lock().unwrap().delete_error = Some(error);
    }

    /// `process` blocks until the returned handle is notified.
    pub fn hold_process(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.state.lock().unwrap().gate = Some(gate.clone());
        gate
    }

    /// The next `list_conversations` reads the list, then blocks until the
    /// returned handle is notified. Later calls are not held.
    pub fn hold_list(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.state.lock().unwrap().list_gate = Some(gate.clone());
        gate
    }

    pub fn process_calls(&self) -> usize {
        self.process_calls.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.state.lock().unwrap().last_prompt.clone()
    }

    pub fn last_user_id(&self) -> Option<u64> {
        self.state.lock().unwrap().last_user_id
    }
}

#[async_trait]
impl RemoteGateway for FakeGateway {
    async fn process(&self, prompt: &str, user_id: u64) -> Result<ProcessResult, GatewayError> {
        self.process_calls.fetch_add(1, Ordering::SeqCst);
        let gate = {
            let mut state = self.state.lock().unwrap();
            state.last_prompt = Some(prompt.to_string());
            state.last_user_id = Some(user_id);
            state.gate.clone()
        };
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let state = self.state.lock().unwrap();
        if let Some(error) = &state.process_error {
            return Err(error.clone());
        }
        Ok(state.process_result.clone().unwrap_or_else(|| ProcessResult {
            conversation_id: Some(ConversationId::new("100")),
            provider_responses: vec![ok_response("ChatGPT", "first"), ok_response("Gemini", "second")],
            synthesis: None,
            synthesis_error: None,
        }))
    }

    async fn list_conversations(&self, _user_id: u64) -> Result<Vec<ConversationSummary>, GatewayError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let (result, gate) = {
            let mut state = self.state.lock().unwrap();
            let result = match &state.list_error {
                Some(error) => Err(error.clone()),
                None => Ok(state.conversations.clone()),
            };
            (result, state.list_gate.take())
        };
        if let Some(gate) = gate {
            gate.notified().await;
        }
        result
    }

    async fn get_conversation(&self, id: &ConversationId) -> Result<ConversationDetail, GatewayError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().unwrap();
        state
            .conversations
            .iter()
            .find(|c| &c.id == id)
            .map(|c| ConversationDetail {
                id: c.id.clone(),
                prompt: c.prompt_preview.clone(),
                provider_responses: vec![ok_response("ChatGPT", "stored")],
                synthesis: None,
            })
            .ok_or_else(|| GatewayError::from_status(404, Some("Conversation not found".into())))
    }

    async fn delete_conversation(&self, id: &ConversationId) -> Result<(), GatewayError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        if let Some(error) = &state.delete_error {
            return Err(error.clone());
        }
        state.conversations.retain(|c| &c.id != id);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceEvent {
    Loading(bool),
    ClearResults,
    ShowResults(usize),
    ClearPrompt,
    Remaining(usize, usize),
}

#[derive(Default)]
pub struct RecordingSurface {
    events: Mutex<Vec<SurfaceEvent>>,
    last_shown: Mutex<Option<ResultsView>>,
    fail_show: AtomicBool,
}

impl RecordingSurface {
    pub fn events(&self) -> Vec<SurfaceEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn last_shown(&self) -> Option<ResultsView> {
        self.last_shown.lock().unwrap().clone()
    }

    pub fn fail_show_results(&self) {
        self.fail_show.store(true, Ordering::SeqCst);
    }

    fn record(&self, event: SurfaceEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl Surface for RecordingSurface {
    fn set_loading(&self, visible: bool) {
        self.record(SurfaceEvent::Loading(visible));
    }

    fn clear_results(&self) {
        self.record(SurfaceEvent::ClearResults);
    }

    fn show_results(&self, view: &ResultsView) -> anyhow::Result<()> {
        if self.fail_show.load(Ordering::SeqCst) {
            anyhow::bail!("results container missing");
        }
        self.record(SurfaceEvent::ShowResults(view.cards.len()));
        *self.last_shown.lock().unwrap() = Some(view.clone());
        Ok(())
    }

    fn clear_prompt(&self) {
        self.record(SurfaceEvent::ClearPrompt);
    }

    fn show_remaining(&self, remaining: usize, capacity: usize) {
        self.record(SurfaceEvent::Remaining(remaining, capacity));
    }
}

pub struct ManualClock {
    now_ms: AtomicI64,
}

impl ManualClock {
    pub fn new(now_ms: i64) -> Self {
        Self {
            now_ms: AtomicI64::new(now_ms),
        }
    }

    pub fn set_ms(&self, now_ms: i64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.now_ms.load(Ordering::SeqCst)).unwrap()
    }
}

#[derive(Default)]
pub struct CountingRenderer {
    calls: AtomicUsize,
}

impl CountingRenderer {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl MarkdownRenderer for CountingRenderer {
    fn render(&self, markdown: &str) -> String {
        self.calls.fetch_add(1, Ordering::SeqCst);
        format!("<{}>", markdown)
    }
}

#[derive(Default)]
pub struct FailingTypesetter {
    calls: AtomicUsize,
}

impl FailingTypesetter {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MathTypesetter for FailingTypesetter {
    async fn typeset(&self, _scope: &str) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("typesetter not loaded")
    }
}

pub struct FixedConfirmer(pub bool);

#[async_trait]
impl Confirmer for FixedConfirmer {
    async fn confirm(&self, _question: &str) -> bool {
        self.0
    }
}

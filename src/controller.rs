// Drives one prompt submission from idle, through the remote call, back to idle.
//
// Phases: `Idle -> Validating -> Admitting -> InFlight -> Settling -> Idle`.
// The guard is taken before the limiter is consulted and before anything is
// sent, so a second submission arriving while one is pending is turned away
// by the guard. Everything after admission is torn down by `FlightScope`'s
// `Drop`, which runs on every exit path.

use crate::api::RemoteGateway;
use crate::error::{GatewayError, SubmitError};
use crate::history::HistoryStore;
use crate::models::ProcessResult;
use crate::notifications::NotificationQueue;
use crate::presentation::{PresentationAdapter, Surface};
use crate::rate_limit::{Admission, RateLimiter};
use crate::single_flight::{FlightPermit, SingleFlightGuard, SubmissionState};
use chrono::{DateTime, Local, Utc};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitPhase {
    Idle,
    Validating,
    Admitting,
    InFlight,
    Settling,
}

#[derive(Debug, Clone, Copy)]
pub struct ControllerSettings {
    pub user_id: u64,
    pub rate_limit: usize,
    pub rate_window_ms: u64,
}

// Owns the flight from guard acquisition until drop.
struct FlightScope<'a> {
    permit: Option<FlightPermit<'a>>,
    surface: &'a dyn Surface,
    phase: &'a watch::Sender<SubmitPhase>,
    loading: bool,
}

impl<'a> FlightScope<'a> {
    fn admitting(
        permit: FlightPermit<'a>,
        surface: &'a dyn Surface,
        phase: &'a watch::Sender<SubmitPhase>,
    ) -> Self {
        phase.send_replace(SubmitPhase::Admitting);
        Self {
            permit: Some(permit),
            surface,
            phase,
            loading: false,
        }
    }

    fn launch(&mut self) {
        self.phase.send_replace(SubmitPhase::InFlight);
        self.loading = true;
        self.surface.set_loading(true);
        // Optimistic clear: stale answers go away before the new ones exist
        self.surface.clear_results();
    }

    fn settling(&self) {
        self.phase.send_replace(SubmitPhase::Settling);
    }
}

impl Drop for FlightScope<'_> {
    fn drop(&mut self) {
        if self.loading {
            self.surface.set_loading(false);
        }
        drop(self.permit.take());
        self.phase.send_replace(SubmitPhase::Idle);
    }
}

pub struct RequestController {
    gateway: Arc<dyn RemoteGateway>,
    history: Arc<HistoryStore>,
    notifications: Arc<NotificationQueue>,
    presenter: Arc<PresentationAdapter>,
    surface: Arc<dyn Surface>,
    clock: Arc<dyn Clock>,
    limiter: Mutex<RateLimiter>,
    guard: SingleFlightGuard,
    phase: watch::Sender<SubmitPhase>,
    user_id: u64,
}

impl RequestController {
    pub fn new(
        gateway: Arc<dyn RemoteGateway>,
        history: Arc<HistoryStore>,
        notifications: Arc<NotificationQueue>,
        presenter: Arc<PresentationAdapter>,
        surface: Arc<dyn Surface>,
        settings: ControllerSettings,
    ) -> Self {
        let (phase, _) = watch::channel(SubmitPhase::Idle);
        Self {
            gateway,
            history,
            notifications,
            presenter,
            surface,
            clock: Arc::new(SystemClock),
            limiter: Mutex::new(RateLimiter::new(settings.rate_limit, settings.rate_window_ms)),
            guard: SingleFlightGuard::new(),
            phase,
            user_id: settings.user_id,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn phase(&self) -> SubmitPhase {
        *self.phase.borrow()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<SubmitPhase> {
        self.phase.subscribe()
    }

    pub fn submission_state(&self) -> SubmissionState {
        self.guard.state()
    }

    pub async fn remaining_requests(&self) -> usize {
        self.limiter.lock().await.remaining()
    }

    /// Submits a prompt. Every failure has already been turned into exactly one
    /// error notification by the time this returns; the `Err` is for callers
    /// that want to react programmatically.
    pub async fn submit(&self, prompt: &str) -> Result<ProcessResult, SubmitError> {
        log::debug!("Submission: {:?}", SubmitPhase::Validating);
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(self.reject(SubmitError::EmptyPrompt));
        }

        let Some(permit) = self.guard.try_enter() else {
            return Err(self.reject(SubmitError::AlreadyInProgress));
        };
        let mut flight = FlightScope::admitting(permit, self.surface.as_ref(), &self.phase);

        let now_ms = self.clock.now().timestamp_millis();
        let (admission, capacity) = {
            let mut limiter = self.limiter.lock().await;
            (limiter.try_admit(now_ms), limiter.capacity())
        };
        self.surface.show_remaining(admission.remaining(), capacity);
        if let Admission::Rejected {
            wait_seconds,
            retry_at_ms,
            ..
        } = admission
        {
            return Err(self.reject(SubmitError::RateLimited {
                wait_seconds,
                retry_at: format_retry_clock(retry_at_ms),
            }));
        }

        flight.launch();
        log::info!("Submitting prompt for user {}", self.user_id);
        let outcome = self.gateway.process(prompt, self.user_id).await;
        flight.settling();

        self.settle(outcome).await
    }

    async fn settle(&self, outcome: Result<ProcessResult, GatewayError>) -> Result<ProcessResult, SubmitError> {
        let result = match outcome {
            Ok(result) => result,
            Err(e) => {
                log::error!("Prompt processing failed: {:?}", e);
                return Err(self.reject(SubmitError::Transport(e)));
            }
        };

        let view = self.presenter.results_view(&result);
        let displayed = self.surface.show_results(&view);
        if displayed.is_ok() && view.has_math {
            // Fire-and-forget
            let _ = self.presenter.typeset("results");
        }
        self.surface.clear_prompt();

        // The conversation is stored remotely either way, so the list changes.
        if let Err(e) = self.history.refresh(self.user_id).await {
            log::debug!("History refresh after submit failed: {}", e);
        }

        match displayed {
            Ok(()) => {
                self.notifications.success(format!(
                    "Received {} of {} responses",
                    result.succeeded_count(),
                    result.provider_responses.len()
                ));
                Ok(result)
            }
            Err(e) => {
                log::error!("Failed to display results: {:#}", e);
                Err(self.reject(SubmitError::Display(e.to_string())))
            }
        }
    }

    fn reject(&self, error: SubmitError) -> SubmitError {
        if error.is_local() {
            log::info!("Submission rejected: {}", error);
        }
        self.notifications.error(error.to_string());
        error
    }
}

fn format_retry_clock(retry_at_ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(retry_at_ms)
        .map(|at| at.with_timezone(&Local).format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "later".to_string())
}

use crate::api::RemoteGateway;
use crate::config::AppConfig;
use crate::controller::{ControllerSettings, RequestController};
use crate::history::HistoryStore;
use crate::notifications::NotificationQueue;
use crate::presentation::{MarkdownRenderer, MathTypesetter, PresentationAdapter, Surface};
use std::sync::Arc;

// Everything the front end needs, wired once at start-up
#[derive(Clone)] // Cheap: every field is shared
pub struct AppState {
    pub config: AppConfig,
    pub gateway: Arc<dyn RemoteGateway>,
    pub notifications: Arc<NotificationQueue>,
    pub history: Arc<HistoryStore>,
    pub presenter: Arc<PresentationAdapter>,
    pub controller: Arc<RequestController>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        gateway: Arc<dyn RemoteGateway>,
        surface: Arc<dyn Surface>,
        renderer: Arc<dyn MarkdownRenderer>,
        typesetter: Arc<dyn MathTypesetter>,
    ) -> Self {
        let notifications = Arc::new(NotificationQueue::new(config.error_ttl, config.success_ttl));
        let history = Arc::new(HistoryStore::new(gateway.clone(), notifications.clone()));
        let presenter = Arc::new(PresentationAdapter::new(renderer, typesetter));
        let controller = Arc::new(RequestController::new(
            gateway.clone(),
            history.clone(),
            notifications.clone(),
            presenter.clone(),
            surface,
            ControllerSettings {
                user_id: config.user_id,
                rate_limit: config.rate_limit,
                rate_window_ms: config.rate_window_ms,
            },
        ));

        Self {
            config,
            gateway,
            notifications,
            history,
            presenter,
            controller,
        }
    }
}

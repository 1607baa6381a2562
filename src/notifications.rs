use crate::models::{NotificationKind, UiNotification};
use chrono::Utc;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;

pub const DEFAULT_ERROR_TTL: Duration = Duration::from_millis(5000);
pub const DEFAULT_SUCCESS_TTL: Duration = Duration::from_millis(3000);

// Emitted to front ends as notifications come and go
#[derive(Debug, Clone, PartialEq)]
pub enum NotificationEvent {
    Shown(UiNotification),
    Expired(Uuid),
    Dismissed(Uuid),
}

/// Transient user-facing messages. Each one owns its own expiry timer, so
/// expiring or dismissing one never touches another.
///
/// `push` spawns the timer on the current tokio runtime.
pub struct NotificationQueue {
    // Sequence number keeps display order stable; DashMap iteration is unordered.
    live: Arc<DashMap<Uuid, (u64, UiNotification)>>,
    next_seq: AtomicU64,
    error_ttl: Duration,
    success_ttl: Duration,
    events: broadcast::Sender<NotificationEvent>,
}

impl NotificationQueue {
    pub fn new(error_ttl: Duration, success_ttl: Duration) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            live: Arc::new(DashMap::new()),
            next_seq: AtomicU64::new(0),
            error_ttl,
            success_ttl,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NotificationEvent> {
        self.events.subscribe()
    }

    pub fn ttl_for(&self, kind: NotificationKind) -> Duration {
        match kind {
            NotificationKind::Error => self.error_ttl,
            NotificationKind::Success => self.success_ttl,
        }
    }

    pub fn error(&self, message: impl Into<String>) -> Uuid {
        self.push(NotificationKind::Error, message)
    }

    pub fn success(&self, message: impl Into<String>) -> Uuid {
        self.push(NotificationKind::Success, message)
    }

    pub fn push(&self, kind: NotificationKind, message: impl Into<String>) -> Uuid {
        let notification = UiNotification {
            id: Uuid::new_v4(),
            kind,
            message: message.into(),
            created_at: Utc::now(),
        };
        let id = notification.id;
        match kind {
            NotificationKind::Error => log::warn!("Notify error: {}", notification.message),
            NotificationKind::Success => log::info!("Notify success: {}", notification.message),
        }

        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        self.live.insert(id, (seq, notification.clone()));
        if self.events.send(NotificationEvent::Shown(notification)).is_err() {
            log::debug!("No notification subscribers for {}", id);
        }

        let live = Arc::clone(&self.live);
        let events = self.events.clone();
        let ttl = self.ttl_for(kind);
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            // Already gone if the user dismissed it
            if live.remove(&id).is_some() {
                let _ = events.send(NotificationEvent::Expired(id));
            }
        });

        id
    }

    /// Removes a notification before its timer fires. Returns false if it was
    /// already gone.
    pub fn dismiss(&self, id: Uuid) -> bool {
        if self.live.remove(&id).is_none() {
            return false;
        }
        let _ = self.events.send(NotificationEvent::Dismissed(id));
        true
    }

    /// Live notifications, oldest first.
    pub fn active(&self) -> Vec<UiNotification> {
        let mut entries: Vec<(u64, UiNotification)> =
            self.live.iter().map(|entry| entry.value().clone()).collect();
        entries.sort_by_key(|(seq, _)| *seq);
        entries.into_iter().map(|(_, n)| n).collect()
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }
}

impl Default for NotificationQueue {
    fn default() -> Self {
        Self::new(DEFAULT_ERROR_TTL, DEFAULT_SUCCESS_TTL)
    }
}

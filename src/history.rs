// Client-side cache of the remote conversation history.
//
// The cache only reflects what the backend acknowledged. A refresh replaces it
// wholesale, and a delete removes an entry only after the remote delete
// succeeded. A list that was in transit while a delete was acknowledged, or
// that was overtaken by a newer refresh, never undoes either.

use crate::api::RemoteGateway;
use crate::error::GatewayError;
use crate::models::{ConversationDetail, ConversationId, ConversationSummary};
use crate::notifications::NotificationQueue;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Asks the user before a destructive action.
#[async_trait]
pub trait Confirmer: Send + Sync {
    async fn confirm(&self, question: &str) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    Cancelled,
}

#[derive(Debug, Default)]
struct HistoryCache {
    entries: Vec<ConversationSummary>,
    active: Option<ConversationId>,
    // Acknowledged deletes, tagged with the value of `deletes` they produced
    tombstones: Vec<(u64, ConversationId)>,
    deletes: u64,
    refreshes_issued: u64,
    refresh_applied: u64,
}

impl HistoryCache {
    fn contains(&self, id: &ConversationId) -> bool {
        self.entries.iter().any(|entry| &entry.id == id)
    }
}

pub struct HistoryStore {
    gateway: Arc<dyn RemoteGateway>,
    notifications: Arc<NotificationQueue>,
    cache: Mutex<HistoryCache>,
}

impl HistoryStore {
    pub fn new(gateway: Arc<dyn RemoteGateway>, notifications: Arc<NotificationQueue>) -> Self {
        Self {
            gateway,
            notifications,
            cache: Mutex::new(HistoryCache::default()),
        }
    }

    /// Reloads the whole list, keeping the backend's (newest first) order.
    /// On failure the previous list is kept.
    pub async fn refresh(&self, user_id: u64) -> Result<Vec<ConversationSummary>, GatewayError> {
        let (ticket, deletes_seen) = {
            let mut cache = self.cache.lock().await;
            cache.refreshes_issued += 1;
            (cache.refreshes_issued, cache.deletes)
        };

        let mut entries = match self.gateway.list_conversations(user_id).await {
            Ok(entries) => entries,
            Err(e) => {
                log::error!("Failed to refresh history for user {}: {}", user_id, e);
                self.notifications.error(format!("Failed to load history: {}", e));
                return Err(e);
            }
        };

        let mut cache = self.cache.lock().await;
        if ticket < cache.refresh_applied {
            log::debug!("Discarding history refresh #{} overtaken by #{}", ticket, cache.refresh_applied);
            return Ok(cache.entries.clone());
        }
        cache.refresh_applied = ticket;

        // Deletes acknowledged after this list was requested may still be in it
        entries.retain(|entry| {
            !cache
                .tombstones
                .iter()
                .any(|(seq, id)| *seq > deletes_seen && id == &entry.id)
        });
        // Refreshes issued from here on already see these deletes
        cache.tombstones.retain(|(seq, _)| *seq > deletes_seen);

        cache.entries = entries;
        if let Some(active) = cache.active.take() {
            if cache.contains(&active) {
                cache.active = Some(active);
            }
        }
        log::info!("History refreshed: {} conversations", cache.entries.len());
        Ok(cache.entries.clone())
    }

    /// Always fetches from the backend. The active mark moves to `id` only
    /// once the fetch succeeded.
    pub async fn select(&self, id: &ConversationId) -> Result<ConversationDetail, GatewayError> {
        match self.gateway.get_conversation(id).await {
            Ok(detail) => {
                // Swapped under one lock: never zero or two active entries in between
                self.cache.lock().await.active = Some(id.clone());
                Ok(detail)
            }
            Err(e) => {
                log::error!("Failed to load conversation {}: {}", id, e);
                self.notifications.error(format!("Failed to load conversation: {}", e));
                Err(e)
            }
        }
    }

    /// Deletes after explicit confirmation. The entry leaves the local list
    /// only when the backend acknowledged the delete.
    pub async fn delete(
        &self,
        id: &ConversationId,
        confirmer: &dyn Confirmer,
    ) -> Result<DeleteOutcome, GatewayError> {
        if !confirmer
            .confirm("Are you sure you want to delete this conversation?")
            .await
        {
            log::debug!("Delete of conversation {} cancelled", id);
            return Ok(DeleteOutcome::Cancelled);
        }

        if let Err(e) = self.gateway.delete_conversation(id).await {
            log::error!("Failed to delete conversation {}: {}", id, e);
            self.notifications.error(format!("Failed to delete conversation: {}", e));
            return Err(e);
        }

        {
            let mut cache = self.cache.lock().await;
            cache.entries.retain(|entry| &entry.id != id);
            cache.deletes += 1;
            let seq = cache.deletes;
            cache.tombstones.push((seq, id.clone()));
            if cache.active.as_ref() == Some(id) {
                cache.active = None;
            }
        }
        self.notifications.success("Conversation deleted");
        Ok(DeleteOutcome::Deleted)
    }

    /// Moves one entry within the local list. The next refresh restores the
    /// backend order.
    pub async fn reorder(&self, from: usize, to: usize) -> bool {
        let mut cache = self.cache.lock().await;
        let len = cache.entries.len();
        if from >= len || to >= len {
            return false;
        }
        let entry = cache.entries.remove(from);
        cache.entries.insert(to, entry);
        true
    }

    pub async fn entries(&self) -> Vec<ConversationSummary> {
        self.cache.lock().await.entries.clone()
    }

    pub async fn active(&self) -> Option<ConversationId> {
        self.cache.lock().await.active.clone()
    }

    /// Entries together with the active id, read under one lock.
    pub async fn snapshot(&self) -> (Vec<ConversationSummary>, Option<ConversationId>) {
        let cache = self.cache.lock().await;
        (cache.entries.clone(), cache.active.clone())
    }

    pub async fn id_at(&self, index: usize) -> Option<ConversationId> {
        self.cache
            .lock()
            .await
            .entries
            .get(index)
            .map(|entry| entry.id.clone())
    }
}

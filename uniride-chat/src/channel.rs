use chrono::{Offset, Utc};
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uniride_core::persistence::{best_effort, spawn_best_effort};
use uniride_core::repository::ChatRepository;
use uniride_core::{CoreError, TripId, SYSTEM_SENDER};

use crate::models::{ChatMessage, ChatStats, MessageKind};
use crate::presence::TypingTracker;

pub const WELCOME_MESSAGE: &str = "Connection established. You can now chat safely.";

const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Limits applied to every trip chat.
#[derive(Debug, Clone)]
pub struct ChatPolicy {
    /// Log length that triggers truncation.
    pub max_messages: usize,
    /// Log length kept after truncation (most recent messages).
    pub keep_messages: usize,
    pub max_body_chars: usize,
    pub typing_ttl: chrono::Duration,
    /// Zone of the `displayTime` shown to participants.
    pub display_offset: chrono::FixedOffset,
}

impl Default for ChatPolicy {
    fn default() -> Self {
        Self {
            max_messages: 100,
            keep_messages: 80,
            max_body_chars: 500,
            typing_ttl: chrono::Duration::seconds(3),
            display_offset: chrono::Utc.fix(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Incomplete message: {0}")]
    Incomplete(&'static str),
}

impl From<ChatError> for CoreError {
    fn from(e: ChatError) -> Self {
        CoreError::Validation(e.to_string())
    }
}

/// Per-trip message logs and typing presence.
///
/// Logs live in memory and are mirrored to the [`ChatRepository`] without
/// waiting on it; the repository is only read back by [`ChatChannel::history`].
pub struct ChatChannel {
    logs: RwLock<HashMap<TripId, Vec<ChatMessage>>>,
    presence: Arc<TypingTracker>,
    store: Arc<dyn ChatRepository>,
    policy: ChatPolicy,
}

impl ChatChannel {
    pub fn new(store: Arc<dyn ChatRepository>, policy: ChatPolicy) -> Self {
        Self {
            logs: RwLock::new(HashMap::new()),
            presence: Arc::new(TypingTracker::new(policy.typing_ttl)),
            store,
            policy,
        }
    }

    /// Make sure an (empty) log exists for the trip.
    pub async fn open(&self, trip_id: TripId) {
        self.logs.write().await.entry(trip_id).or_default();
    }

    /// Create the log with a single system message unless it already exists.
    /// Returns whether the log was created.
    pub async fn seed(&self, trip_id: TripId, text: &str) -> bool {
        let mut logs = self.logs.write().await;
        if logs.contains_key(&trip_id) {
            return false;
        }
        logs.insert(
            trip_id,
            vec![ChatMessage::new(SYSTEM_SENDER, text, MessageKind::System)
                .shown_at(self.policy.display_offset)],
        );
        true
    }

    /// The trip's log ordered by timestamp; first access greets the participants.
    pub async fn get_or_create(&self, trip_id: TripId) -> Vec<ChatMessage> {
        if self.seed(trip_id, WELCOME_MESSAGE).await {
            debug!("Chat opened for trip {}", trip_id);
        }
        self.messages(trip_id).await
    }

    /// Snapshot of the in-memory log, sorted by timestamp. Empty if absent.
    pub async fn messages(&self, trip_id: TripId) -> Vec<ChatMessage> {
        let mut log = self
            .logs
            .read()
            .await
            .get(&trip_id)
            .cloned()
            .unwrap_or_default();
        log.sort_by_key(|m| m.timestamp);
        log
    }

    /// Append a message and mirror it to storage in the background.
    pub async fn append(
        &self,
        trip_id: TripId,
        sender: &str,
        body: &str,
        kind: MessageKind,
    ) -> Result<ChatMessage, ChatError> {
        let sender = sender.trim();
        let body = body.trim();
        if sender.is_empty() {
            return Err(ChatError::Incomplete("sender"));
        }
        if body.is_empty() {
            return Err(ChatError::Incomplete("message"));
        }

        let body: String = body.chars().take(self.policy.max_body_chars).collect();
        let mut message = ChatMessage::new(sender, &body, kind).shown_at(self.policy.display_offset);
        message.message_id = Some(message_id(message.timestamp.timestamp_millis()));

        self.push(trip_id, message.clone()).await;
        self.presence.stop(trip_id, sender).await;

        let store = self.store.clone();
        let (sender, kind) = (sender.to_string(), kind.as_str());
        spawn_best_effort("chat.save_message", async move {
            store.save_message(trip_id, &sender, &body, kind).await
        });

        Ok(message)
    }

    /// Inject a system message into the in-memory log only.
    pub async fn system(&self, trip_id: TripId, text: &str) -> ChatMessage {
        let message = ChatMessage::new(SYSTEM_SENDER, text, MessageKind::System)
            .shown_at(self.policy.display_offset);
        self.push(trip_id, message.clone()).await;
        message
    }

    async fn push(&self, trip_id: TripId, message: ChatMessage) {
        let mut logs = self.logs.write().await;
        let log = logs.entry(trip_id).or_default();
        log.push(message);
        if log.len() > self.policy.max_messages {
            let drop = log.len() - self.policy.keep_messages;
            log.drain(..drop);
            debug!("Chat log for trip {} truncated by {}", trip_id, drop);
        }
    }

    /// Durable history of the trip, or the in-memory log when storage fails.
    pub async fn history(&self, trip_id: TripId) -> Vec<ChatMessage> {
        match best_effort("chat.load_messages", self.store.load_messages(trip_id)).await {
            Ok(stored) => {
                let mut history: Vec<ChatMessage> =
                    stored
                        .into_iter()
                        .map(|m| ChatMessage::from(m).shown_at(self.policy.display_offset))
                        .collect();
                history.sort_by_key(|m| m.timestamp);
                history
            }
            Err(_) => self.messages(trip_id).await,
        }
    }

    /// Set or clear the typing signal of `sender`. A set signal is cleared
    /// after the ttl unless a newer one replaced it.
    pub async fn typing(&self, trip_id: TripId, sender: &str, is_typing: bool) {
        let sender = sender.trim();
        if sender.is_empty() {
            return;
        }
        if !is_typing {
            self.presence.stop(trip_id, sender).await;
            return;
        }

        let stamp = self.presence.touch(trip_id, sender).await;
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let presence = self.presence.clone();
        let sender = sender.to_string();
        let delay = presence.ttl().to_std().unwrap_or_default();
        handle.spawn(async move {
            tokio::time::sleep(delay).await;
            presence.expire_if_unchanged(trip_id, &sender, stamp).await;
        });
    }

    pub async fn currently_typing(&self, trip_id: TripId) -> Vec<String> {
        self.presence.active(trip_id).await
    }

    /// Drop the trip's log and every typing entry it holds.
    pub async fn clear(&self, trip_id: TripId) {
        let removed = self.logs.write().await.remove(&trip_id).map_or(0, |l| l.len());
        let typing = self.presence.clear_trip(trip_id).await;
        info!(
            "Chat cleared for trip {} ({} messages, {} typing entries)",
            trip_id, removed, typing
        );
    }

    pub async fn stats(&self) -> ChatStats {
        let logs = self.logs.read().await;
        ChatStats {
            total_trips_with_chat: logs.len(),
            total_messages: logs.values().map(Vec::len).sum(),
            users_typing: self.presence.keys().await,
        }
    }
}

/// Millisecond timestamp followed by nine random base-36 characters.
fn message_id(millis: i64) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..9)
        .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
        .collect();
    format!("{}{}", millis, suffix)
}

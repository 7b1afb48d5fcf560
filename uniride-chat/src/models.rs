use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use uniride_core::repository::StoredMessage;

/// Message origin
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    System,
    User,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::System => "system",
            MessageKind::User => "user",
        }
    }

    /// Anything not explicitly `system` is treated as a user message.
    pub fn from_label(label: &str) -> Self {
        if label.eq_ignore_ascii_case("system") {
            MessageKind::System
        } else {
            MessageKind::User
        }
    }
}

/// One entry of a trip's chat log
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    pub sender: String,
    #[serde(rename = "message")]
    pub body: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub timestamp: DateTime<Utc>,
    pub display_time: String,
}

impl ChatMessage {
    pub fn new(sender: &str, body: &str, kind: MessageKind) -> Self {
        Self::at(sender, body, kind, Utc::now())
    }

    pub fn at(sender: &str, body: &str, kind: MessageKind, timestamp: DateTime<Utc>) -> Self {
        Self {
            message_id: None,
            sender: sender.to_string(),
            body: body.to_string(),
            kind,
            timestamp,
            display_time: display_time(timestamp, Utc.fix()),
        }
    }

    /// Re-render the display time in the given zone.
    pub fn shown_at(mut self, offset: FixedOffset) -> Self {
        self.display_time = display_time(self.timestamp, offset);
        self
    }
}

impl From<StoredMessage> for ChatMessage {
    fn from(stored: StoredMessage) -> Self {
        Self::at(
            &stored.sender,
            &stored.body,
            MessageKind::from_label(&stored.kind),
            stored.sent_at,
        )
    }
}

/// Hour and minute shown next to a message, in the zone of `offset`.
pub fn display_time(at: DateTime<Utc>, offset: FixedOffset) -> String {
    at.with_timezone(&offset).format("%H:%M").to_string()
}

/// Diagnostic counters of the chat channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatStats {
    pub total_trips_with_chat: usize,
    pub total_messages: usize,
    pub users_typing: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_message_wire_names() {
        let at = Utc.with_ymd_and_hms(2025, 3, 4, 9, 7, 0).unwrap();
        let msg = ChatMessage::at("Ana", "hola", MessageKind::User, at);
        let json = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["message"], "hola");
        assert_eq!(json["type"], "user");
        assert_eq!(json["displayTime"], "09:07");
        assert!(json.get("messageId").is_none());
    }

    #[test]
    fn test_display_time_follows_offset() {
        let at = Utc.with_ymd_and_hms(2025, 3, 4, 3, 7, 0).unwrap();
        let campus = FixedOffset::west_opt(5 * 3600).unwrap();
        let msg = ChatMessage::at("Ana", "hola", MessageKind::User, at).shown_at(campus);

        assert_eq!(msg.display_time, "22:07");
        assert_eq!(msg.timestamp, at);
    }

    #[test]
    fn test_kind_from_stored_label() {
        assert_eq!(MessageKind::from_label("SYSTEM"), MessageKind::System);
        assert_eq!(MessageKind::from_label("user"), MessageKind::User);
        assert_eq!(MessageKind::from_label(""), MessageKind::User);
    }
}

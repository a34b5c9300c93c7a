use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

/// Fixed-width wire/storage timestamp, `YYYY-MM-DD hh:mm:ss`.
const TIMESTAMP_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Text,
    Image,
    Voice,
    System,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Text => "text",
            EventKind::Image => "image",
            EventKind::Voice => "voice",
            EventKind::System => "system",
        }
    }

    /// Lenient parse for values coming back out of storage; anything
    /// unrecognized degrades to `text`.
    pub fn parse(s: &str) -> Self {
        match s {
            "image" => EventKind::Image,
            "voice" => EventKind::Voice,
            "system" => EventKind::System,
            _ => EventKind::Text,
        }
    }
}

/// One chat event, immutable once constructed. Serializes directly into the
/// outbound wire shape `{nickname, type, content, media_url, created_at}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatEvent {
    pub nickname: String,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub content: String,
    pub media_url: String,
    pub created_at: String,
}

impl ChatEvent {
    /// Builds an event stamped with the current timestamp.
    pub fn new(
        nickname: impl Into<String>,
        kind: EventKind,
        content: impl Into<String>,
        media_url: impl Into<String>,
    ) -> Self {
        Self {
            nickname: nickname.into(),
            kind,
            content: content.into(),
            media_url: media_url.into(),
            created_at: current_timestamp(),
        }
    }
}

/// What a client is allowed to say. Author and timestamp are always stamped
/// server-side; anything the client supplies for those is ignored.
#[derive(Debug, Default, Deserialize)]
pub struct InboundEvent {
    #[serde(rename = "type", default)]
    pub kind: Option<EventKind>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub media_url: String,
}

impl InboundEvent {
    pub fn into_event(self, nickname: &str) -> ChatEvent {
        // `system` is reserved for server-synthesized announcements; a
        // client claiming it is treated as plain text.
        let kind = match self.kind {
            None | Some(EventKind::System) => EventKind::Text,
            Some(kind) => kind,
        };
        ChatEvent::new(nickname, kind, self.content, self.media_url)
    }
}

/// Current local time as the fixed-width wire string. Falls back to UTC when
/// the local offset cannot be determined (e.g. multi-threaded unix).
pub fn current_timestamp() -> String {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    now.format(TIMESTAMP_FORMAT).unwrap_or_default()
}

use serde::Serialize;

use crate::db::models::{Conversation, Message};

/// Notification pushed to live sessions.
///
/// Serialized as `{"type": <tag>, "data": <payload>}`. The set of variants is
/// closed so the hub only ever deals with already-encoded frames.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "type", content = "data")]
pub enum Event {
    #[serde(rename = "message:new")]
    MessageNew(Message),
    #[serde(rename = "conversation:new")]
    ConversationNew(Conversation),
}

impl Event {
    /// Wire tag of this event.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::MessageNew(_) => "message:new",
            Event::ConversationNew(_) => "conversation:new",
        }
    }

    pub fn to_frame(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

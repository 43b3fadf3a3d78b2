//! Push helpers for chat events.
//! Resolve who should hear about a change and hand the event to the hub.

use crate::db::models::{Conversation, Message};
use crate::ws::{Event, Hub, UserId};

/// Push a freshly stored message to every participant of its conversation,
/// the sender's other devices included.
pub fn broadcast_new_message(hub: &Hub, participants: &[UserId], message: Message) {
    hub.broadcast(participants, &Event::MessageNew(message));
}

/// Announce a new conversation to its participants.
pub fn broadcast_new_conversation(hub: &Hub, participants: &[UserId], conversation: Conversation) {
    hub.broadcast(participants, &Event::ConversationNew(conversation));
}

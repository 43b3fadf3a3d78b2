pub mod broadcast;
pub mod conversations;
pub mod messages;

//! Live push channel: session registry, per-connection runtime, and the
//! authenticated upgrade endpoint.

pub mod actor;
pub mod connection;
pub mod event;
pub mod handler;
pub mod hub;
pub mod session;

/// Stable numeric user identity issued by the accounts table.
pub type UserId = i64;

pub use event::Event;
pub use hub::Hub;
pub use session::{Session, SessionState};

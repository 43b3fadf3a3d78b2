use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::config::PushConfig;
use crate::ws::actor;
use crate::ws::connection::{Frame, PushConnection};
use crate::ws::event::Event;
use crate::ws::session::{Enqueue, Session};
use crate::ws::UserId;

/// Directory of live push sessions, keyed by user.
///
/// A user may hold any number of sessions (one per device or tab). Each
/// identity's set lives behind its own DashMap shard lock: `broadcast` takes
/// it shared, `add_session` / `remove_session` take it exclusive. The lock
/// never covers socket I/O, only the map and non-blocking enqueues.
pub struct Hub {
    sessions: DashMap<UserId, HashMap<Uuid, Arc<Session>>>,
    config: PushConfig,
}

impl Hub {
    pub fn new(config: PushConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &PushConfig {
        &self.config
    }

    /// Register a new session for `user_id` over `connection` and start its
    /// delivery loop, liveness probe and inbound drain.
    pub fn add_session<C: PushConnection>(&self, user_id: UserId, connection: C) -> Arc<Session> {
        let (tx, rx) = mpsc::channel(self.config.queue_capacity);
        let session = Arc::new(Session::new(user_id, tx));

        let session_count = {
            let mut sessions = self.sessions.entry(user_id).or_default();
            sessions.insert(session.id(), session.clone());
            sessions.len()
        };

        actor::spawn_session(&session, connection, rx, &self.config);
        session.mark_open();

        tracing::debug!(
            user_id = %user_id,
            session_id = %session.id(),
            connections = session_count,
            "Session registered"
        );

        session
    }

    /// Cancel a session and drop it from the directory. The identity key is
    /// pruned when its last session goes. Calling it again is a no-op.
    pub fn remove_session(&self, session: &Session) {
        let user_id = session.user_id();

        let now_empty = match self.sessions.get_mut(&user_id) {
            Some(mut sessions) => {
                // Cancel under the same lock as the removal so a concurrent
                // broadcast can never reach a cancelled session.
                if !session.begin_close() {
                    return;
                }
                sessions.remove(&session.id());
                sessions.is_empty()
            }
            None => {
                session.begin_close();
                return;
            }
        };

        if now_empty {
            self.sessions.remove_if(&user_id, |_, sessions| sessions.is_empty());
        }

        tracing::debug!(
            user_id = %user_id,
            session_id = %session.id(),
            dropped_events = session.dropped_events(),
            "Session removed"
        );
    }

    /// Fan `event` out to every live session of every listed user.
    ///
    /// Never blocks: a session whose queue is full loses this event, users
    /// without sessions are skipped, and nothing is reported back.
    pub fn broadcast(&self, user_ids: &[UserId], event: &Event) {
        let frame = match event.to_frame() {
            Ok(json) => Frame::from(json),
            Err(e) => {
                tracing::error!(kind = event.kind(), error = %e, "Failed to serialize push event");
                return;
            }
        };

        let mut delivered = 0usize;
        for user_id in user_ids {
            let Some(sessions) = self.sessions.get(user_id) else {
                continue;
            };
            for session in sessions.values() {
                match session.try_enqueue(frame.clone()) {
                    Enqueue::Queued => delivered += 1,
                    Enqueue::Dropped => {
                        tracing::debug!(
                            user_id = %user_id,
                            session_id = %session.id(),
                            kind = event.kind(),
                            "Outbound queue full, event dropped"
                        );
                    }
                    Enqueue::Closed => {}
                }
            }
        }

        tracing::debug!(
            kind = event.kind(),
            targets = user_ids.len(),
            queued = delivered,
            "Push event fanned out"
        );
    }

    /// Tear down every session, e.g. on process shutdown.
    pub fn shutdown(&self) {
        let all: Vec<Arc<Session>> = self
            .sessions
            .iter()
            .flat_map(|entry| entry.value().values().cloned().collect::<Vec<_>>())
            .collect();

        for session in &all {
            self.remove_session(session);
        }

        tracing::info!(sessions = all.len(), "Push hub shut down");
    }

    /// Total live sessions across all users.
    pub fn session_count(&self) -> usize {
        self.sessions.iter().map(|entry| entry.value().len()).sum()
    }

    /// Users with at least one live session.
    pub fn user_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_online(&self, user_id: UserId) -> bool {
        self.sessions.contains_key(&user_id)
    }

    pub fn sessions_for(&self, user_id: UserId) -> Vec<Arc<Session>> {
        self.sessions
            .get(&user_id)
            .map(|sessions| sessions.values().cloned().collect())
            .unwrap_or_default()
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(PushConfig::default())
    }
}

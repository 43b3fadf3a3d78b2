//! REST endpoints for message history and sending.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::auth::middleware::Claims;
use crate::chat::broadcast;
use crate::db::{self, models::Message};
use crate::state::AppState;

/// Default page size for message history.
const DEFAULT_LIMIT: u32 = 30;
/// Maximum page size for message history.
const MAX_LIMIT: u32 = 200;

/// Raw paging parameters. Kept as text so that malformed values fall back
/// to defaults instead of rejecting the request.
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<String>,
    pub before_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageList {
    pub data: Vec<Message>,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub body: String,
}

#[derive(Debug, Serialize)]
pub struct MessageEnvelope {
    pub data: Message,
}

/// Page size from the query: unparsable or out-of-range values fall back to
/// the default.
fn page_limit(requested: Option<&str>) -> u32 {
    match requested.and_then(|v| v.trim().parse::<u32>().ok()) {
        Some(limit) if (1..=MAX_LIMIT).contains(&limit) => limit,
        _ => DEFAULT_LIMIT,
    }
}

/// Exclusive upper bound on message ids. Anything but a positive id means
/// "start from the newest message".
fn before_bound(requested: Option<&str>) -> i64 {
    match requested.and_then(|v| v.trim().parse::<i64>().ok()) {
        Some(id) if id > 0 => id,
        _ => i64::MAX,
    }
}

/// Map a membership lookup onto the HTTP outcome.
fn require_participant(membership: Option<bool>) -> Result<(), StatusCode> {
    match membership {
        Some(true) => Ok(()),
        Some(false) => Err(StatusCode::FORBIDDEN),
        None => Err(StatusCode::NOT_FOUND),
    }
}

/// GET /api/v1/conversations/{id}/messages?limit=&before_id=
/// Newest page of history (or the page before `before_id`), oldest first.
pub async fn list_messages(
    State(state): State<AppState>,
    claims: Claims,
    Path(conversation_id): Path<i64>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<MessageList>, StatusCode> {
    let pool = state.db.clone();
    let user_id = claims.user_id;
    let limit = page_limit(query.limit.as_deref());
    let before_id = before_bound(query.before_id.as_deref());

    let data = tokio::task::spawn_blocking(move || {
        let conn = pool.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        require_participant(
            db::is_participant(&conn, conversation_id, user_id)
                .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?,
        )?;

        let mut stmt = conn
            .prepare(
                "SELECT id, conversation_id, sender_id, body, created_at
                 FROM messages
                 WHERE conversation_id = ?1 AND id < ?2
                 ORDER BY id DESC
                 LIMIT ?3",
            )
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        let mut messages: Vec<Message> = stmt
            .query_map(
                rusqlite::params![conversation_id, before_id, limit],
                Message::from_row,
            )
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
            .filter_map(|r| r.ok())
            .collect();

        // Fetched newest-first for the LIMIT; clients read oldest-first.
        messages.reverse();
        Ok::<_, StatusCode>(messages)
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    Ok(Json(MessageList { data }))
}

/// POST /api/v1/conversations/{id}/messages
/// Store a message, then push `message:new` to every participant's live
/// sessions. Delivery is best effort and never affects the response.
pub async fn send_message(
    State(state): State<AppState>,
    claims: Claims,
    Path(conversation_id): Path<i64>,
    Json(body): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<MessageEnvelope>), StatusCode> {
    if body.body.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let pool = state.db.clone();
    let sender_id = claims.user_id;
    let text = body.body;

    let (message, participants) = tokio::task::spawn_blocking(move || {
        let mut conn = pool.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        require_participant(
            db::is_participant(&conn, conversation_id, sender_id)
                .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?,
        )?;

        let now = Utc::now().to_rfc3339();
        let tx = conn
            .transaction()
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        tx.execute(
            "INSERT INTO messages (conversation_id, sender_id, body, created_at) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![conversation_id, sender_id, text, now],
        )
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        let message_id = tx.last_insert_rowid();

        tx.execute(
            "UPDATE conversations SET updated_at = ?1 WHERE id = ?2",
            rusqlite::params![now, conversation_id],
        )
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        let participants = db::fetch_participants(&tx, conversation_id)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        tx.commit().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        let message = Message {
            id: message_id,
            conversation_id,
            sender_id,
            body: text,
            created_at: now,
        };
        Ok::<_, StatusCode>((message, participants))
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    broadcast::broadcast_new_message(&state.hub, &participants, message.clone());

    Ok((StatusCode::CREATED, Json(MessageEnvelope { data: message })))
}

//! REST endpoints for direct conversations.

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::auth::middleware::Claims;
use crate::chat::broadcast;
use crate::db::models::Conversation;
use crate::state::AppState;
use crate::ws::UserId;

#[derive(Debug, Deserialize)]
pub struct CreateDirectRequest {
    pub other_user_id: UserId,
}

#[derive(Debug, Serialize)]
pub struct CreateDirectResponse {
    pub conversation_id: i64,
}

#[derive(Debug, Serialize)]
pub struct ConversationList {
    pub data: Vec<Conversation>,
}

/// POST /api/v1/conversations/direct
/// Always opens a new conversation between the caller and `other_user_id`.
pub async fn create_direct_conversation(
    State(state): State<AppState>,
    claims: Claims,
    Json(body): Json<CreateDirectRequest>,
) -> Result<(StatusCode, Json<CreateDirectResponse>), StatusCode> {
    let user_id = claims.user_id;
    let other_user_id = body.other_user_id;
    if user_id == other_user_id {
        return Err(StatusCode::BAD_REQUEST);
    }

    let db = state.db.clone();
    let conversation = tokio::task::spawn_blocking(move || {
        let mut conn = db.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        let other_exists: bool = conn
            .query_row(
                "SELECT COUNT(*) FROM users WHERE id = ?1",
                rusqlite::params![other_user_id],
                |row| row.get::<_, i64>(0).map(|c| c > 0),
            )
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        if !other_exists {
            return Err(StatusCode::NOT_FOUND);
        }

        let now = Utc::now().to_rfc3339();
        let tx = conn
            .transaction()
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        tx.execute(
            "INSERT INTO conversations (kind, created_at, updated_at) VALUES ('direct', ?1, ?1)",
            rusqlite::params![now],
        )
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        let conversation_id = tx.last_insert_rowid();

        for participant in [user_id, other_user_id] {
            tx.execute(
                "INSERT INTO conversation_participants (conversation_id, user_id, created_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![conversation_id, participant, now],
            )
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        }

        tx.commit().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        Ok::<_, StatusCode>(Conversation {
            id: conversation_id,
            kind: "direct".to_string(),
            created_at: now.clone(),
            updated_at: now,
        })
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    tracing::debug!(
        conversation_id = conversation.id,
        user_id = %user_id,
        other_user_id = %other_user_id,
        "Direct conversation created"
    );

    let conversation_id = conversation.id;
    broadcast::broadcast_new_conversation(&state.hub, &[user_id, other_user_id], conversation);

    Ok((
        StatusCode::CREATED,
        Json(CreateDirectResponse { conversation_id }),
    ))
}

/// GET /api/v1/conversations
/// Conversations the caller takes part in, most recently active first.
pub async fn list_conversations(
    State(state): State<AppState>,
    claims: Claims,
) -> Result<Json<ConversationList>, StatusCode> {
    let db = state.db.clone();
    let user_id = claims.user_id;

    let data = tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        let mut stmt = conn
            .prepare(
                "SELECT c.id, c.kind, c.created_at, c.updated_at
                 FROM conversations c
                 JOIN conversation_participants p ON p.conversation_id = c.id
                 WHERE p.user_id = ?1
                 ORDER BY c.updated_at DESC, c.id DESC",
            )
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        let conversations: Vec<Conversation> = stmt
            .query_map(rusqlite::params![user_id], Conversation::from_row)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
            .filter_map(|r| r.ok())
            .collect();

        Ok::<_, StatusCode>(conversations)
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    Ok(Json(ConversationList { data }))
}

//! Account creation and password login.

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use rusqlite::OptionalExtension;
use serde::{Deserialize, Serialize};

use crate::auth::jwt;
use crate::db::models::User;
use crate::state::AppState;

/// Minimum accepted password length.
const MIN_PASSWORD_LENGTH: usize = 6;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub user: User,
}

/// POST /api/v1/auth/register
/// Creates an account. Duplicate email → 409.
pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<User>), StatusCode> {
    let name = body.name.trim().to_string();
    let email = body.email.trim().to_lowercase();
    if name.is_empty() || !email.contains('@') || body.password.len() < MIN_PASSWORD_LENGTH {
        return Err(StatusCode::BAD_REQUEST);
    }

    let db = state.db.clone();
    let password = body.password;

    let user = tokio::task::spawn_blocking(move || {
        // Argon2 hashing is CPU-bound; keep it off the async workers.
        let password_hash = password_auth::generate_hash(password);

        let conn = db.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        let now = Utc::now().to_rfc3339();

        let taken: Option<i64> = conn
            .query_row(
                "SELECT id FROM users WHERE email = ?1",
                rusqlite::params![email],
                |row| row.get(0),
            )
            .optional()
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        if taken.is_some() {
            return Err(StatusCode::CONFLICT);
        }

        conn.execute(
            "INSERT INTO users (name, email, password_hash, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?4)",
            rusqlite::params![name, email, password_hash, now],
        )
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        Ok::<_, StatusCode>(User {
            id: conn.last_insert_rowid(),
            name,
            email,
        })
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    tracing::info!(user_id = %user.id, "User registered");

    Ok((StatusCode::CREATED, Json(user)))
}

/// POST /api/v1/auth/login
/// Verifies the password and issues an access token. Unknown email and wrong
/// password are indistinguishable (401).
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, StatusCode> {
    let db = state.db.clone();
    let email = body.email.trim().to_lowercase();
    let password = body.password;

    let user = tokio::task::spawn_blocking(move || {
        let row: Option<(User, String)> = {
            let conn = db.lock().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
            conn.query_row(
                "SELECT id, name, email, password_hash FROM users WHERE email = ?1",
                rusqlite::params![email],
                |row| {
                    Ok((
                        User {
                            id: row.get(0)?,
                            name: row.get(1)?,
                            email: row.get(2)?,
                        },
                        row.get(3)?,
                    ))
                },
            )
            .optional()
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        };

        let (user, password_hash) = row.ok_or(StatusCode::UNAUTHORIZED)?;
        password_auth::verify_password(password, &password_hash)
            .map_err(|_| StatusCode::UNAUTHORIZED)?;
        Ok::<_, StatusCode>(user)
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    let access_token = jwt::issue_access_token(&state.jwt_secret, user.id, state.token_ttl_hours)
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to issue access token");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    tracing::info!(user_id = %user.id, "User logged in");

    Ok(Json(LoginResponse { access_token, user }))
}

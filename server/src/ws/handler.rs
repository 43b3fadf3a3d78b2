use std::sync::Arc;

use axum::{
    extract::{ws::WebSocket, Query, State, WebSocketUpgrade},
    http::{header, HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use crate::auth::jwt;
use crate::config::PushConfig;
use crate::state::AppState;
use crate::ws::{Hub, UserId};

/// Query parameters for the push connection.
/// Browsers cannot set an Authorization header on a WebSocket, so the
/// access token travels as `?token=JWT`.
#[derive(Debug, Deserialize)]
pub struct WsAuthQuery {
    pub token: Option<String>,
}

/// GET /ws?token=JWT
/// Push channel upgrade. The credential is checked before upgrading: a
/// missing, malformed, expired or forged token gets 401 and no session.
/// A browser origin other than the server's own host (or an allowed one)
/// gets 403.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<WsAuthQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(token) = params.token.filter(|t| !t.is_empty()) else {
        tracing::warn!("Push upgrade rejected: missing token");
        return StatusCode::UNAUTHORIZED.into_response();
    };

    let claims = match jwt::verify_credential(&state.jwt_secret, &token) {
        Ok(claims) => claims,
        Err(err) => {
            let reason = match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => "token expired",
                jsonwebtoken::errors::ErrorKind::InvalidSignature => "invalid signature",
                _ => "token invalid",
            };
            tracing::warn!(reason = reason, "Push upgrade rejected");
            return StatusCode::UNAUTHORIZED.into_response();
        }
    };

    let origin = headers.get(header::ORIGIN).and_then(|v| v.to_str().ok());
    let host = headers.get(header::HOST).and_then(|v| v.to_str().ok());
    if !origin_allowed(origin, host, state.hub.config()) {
        tracing::warn!(
            user_id = %claims.user_id,
            origin = origin.unwrap_or_default(),
            "Push upgrade rejected: origin not allowed"
        );
        return StatusCode::FORBIDDEN.into_response();
    }

    tracing::info!(user_id = %claims.user_id, "Push connection authenticated");

    let hub = state.hub.clone();
    ws.on_upgrade(move |socket| handle_authenticated(socket, hub, claims.user_id))
}

/// Same-origin rule for browser upgrades. Requests without an `Origin`
/// header come from non-browser clients and pass.
fn origin_allowed(origin: Option<&str>, host: Option<&str>, config: &PushConfig) -> bool {
    if config.insecure_skip_origin_check {
        return true;
    }
    let Some(origin) = origin else {
        return true;
    };
    // "null" and other opaque origins carry no authority and never match.
    let Some(origin_host) = origin
        .parse::<Uri>()
        .ok()
        .filter(|uri| uri.scheme().is_some())
        .and_then(|uri| uri.authority().map(|a| a.as_str().to_ascii_lowercase()))
    else {
        return false;
    };

    if host.is_some_and(|h| h.eq_ignore_ascii_case(&origin_host)) {
        return true;
    }

    config.allowed_origins.iter().any(|pattern| {
        let pattern = pattern.to_ascii_lowercase();
        match pattern.strip_prefix("*.") {
            Some(domain) => origin_host
                .strip_suffix(domain)
                .is_some_and(|sub| sub.ends_with('.') && sub.len() > 1),
            None => pattern == origin_host,
        }
    })
}

/// Hold the upgraded connection open until the peer leaves or the session
/// is torn down elsewhere, then deregister and wait for its duties to stop.
async fn handle_authenticated(socket: WebSocket, hub: Arc<Hub>, user_id: UserId) {
    let session = hub.add_session(user_id, socket);

    tracing::info!(
        user_id = %user_id,
        session_id = %session.id(),
        "Push session opened"
    );

    tokio::select! {
        () = session.peer_closed() => {}
        () = session.cancelled() => {}
    }

    hub.remove_session(&session);
    session.closed().await;

    tracing::info!(
        user_id = %user_id,
        session_id = %session.id(),
        dropped_events = session.dropped_events(),
        "Push session closed"
    );
}

//! Integration tests for direct conversations and message history.

use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Helper: start the server on a random port and return the base URL.
async fn start_test_server() -> String {
    let tmp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let data_dir = tmp_dir.path().to_str().unwrap().to_string();

    let db = chatline_server::db::init_db(&data_dir).expect("Failed to init DB");
    let jwt_secret = chatline_server::auth::jwt::load_or_generate_jwt_secret(None, &data_dir)
        .expect("Failed to generate JWT secret");

    let state = chatline_server::state::AppState {
        db,
        jwt_secret,
        token_ttl_hours: 1,
        hub: Arc::new(chatline_server::ws::Hub::default()),
    };

    let app = chatline_server::routes::build_router(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
        let _keep = tmp_dir;
    });

    format!("http://{}", addr)
}

/// Helper: register + login, return (access_token, user_id).
async fn register_and_login(base_url: &str, name: &str) -> (String, i64) {
    let client = reqwest::Client::new();
    let email = format!("{}@example.com", name.to_lowercase());

    client
        .post(format!("{}/api/v1/auth/register", base_url))
        .json(&json!({"name": name, "email": email, "password": "password123"}))
        .send()
        .await
        .unwrap();

    let resp = client
        .post(format!("{}/api/v1/auth/login", base_url))
        .json(&json!({"email": email, "password": "password123"}))
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = resp.json().await.unwrap();

    (
        body["access_token"].as_str().unwrap().to_string(),
        body["user"]["id"].as_i64().unwrap(),
    )
}

async fn create_direct(base_url: &str, token: &str, other_user_id: i64) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("{}/api/v1/conversations/direct", base_url))
        .bearer_auth(token)
        .json(&json!({"other_user_id": other_user_id}))
        .send()
        .await
        .unwrap()
}

async fn send_message(
    base_url: &str,
    token: &str,
    conversation_id: i64,
    body: &str,
) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!(
            "{}/api/v1/conversations/{}/messages",
            base_url, conversation_id
        ))
        .bearer_auth(token)
        .json(&json!({"body": body}))
        .send()
        .await
        .unwrap()
}

async fn history(base_url: &str, token: &str, conversation_id: i64, query: &str) -> reqwest::Response {
    reqwest::Client::new()
        .get(format!(
            "{}/api/v1/conversations/{}/messages{}",
            base_url, conversation_id, query
        ))
        .bearer_auth(token)
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_create_and_list_conversations() {
    let base_url = start_test_server().await;
    let (token1, _) = register_and_login(&base_url, "Alice").await;
    let (token2, user2) = register_and_login(&base_url, "Bob").await;
    let (token3, user3) = register_and_login(&base_url, "Carol").await;

    let resp = create_direct(&base_url, &token1, user2).await;
    assert_eq!(resp.status(), 201);
    let first: serde_json::Value = resp.json().await.unwrap();
    let first_id = first["conversation_id"].as_i64().unwrap();

    let resp = create_direct(&base_url, &token1, user3).await;
    assert_eq!(resp.status(), 201);
    let second: serde_json::Value = resp.json().await.unwrap();
    let second_id = second["conversation_id"].as_i64().unwrap();

    // Activity in the first conversation moves it to the top.
    assert_eq!(send_message(&base_url, &token1, first_id, "ping").await.status(), 201);

    let list: serde_json::Value = reqwest::Client::new()
        .get(format!("{}/api/v1/conversations", base_url))
        .bearer_auth(&token1)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let ids: Vec<i64> = list["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![first_id, second_id]);
    assert_eq!(list["data"][0]["type"], "direct");

    for (token, expected) in [(&token2, first_id), (&token3, second_id)] {
        let list: serde_json::Value = reqwest::Client::new()
            .get(format!("{}/api/v1/conversations", base_url))
            .bearer_auth(token)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let data = list["data"].as_array().unwrap();
        assert_eq!(data.len(), 1);
        assert_eq!(data[0]["id"], expected);
    }
}

#[tokio::test]
async fn test_create_direct_rejects_self_and_unknown_user() {
    let base_url = start_test_server().await;
    let (token, user_id) = register_and_login(&base_url, "Alice").await;

    assert_eq!(create_direct(&base_url, &token, user_id).await.status(), 400);
    assert_eq!(create_direct(&base_url, &token, 9999).await.status(), 404);
}

#[tokio::test]
async fn test_history_order_and_paging() {
    let base_url = start_test_server().await;
    let (token1, _) = register_and_login(&base_url, "Alice").await;
    let (token2, user2) = register_and_login(&base_url, "Bob").await;

    let created: serde_json::Value = create_direct(&base_url, &token1, user2)
        .await
        .json()
        .await
        .unwrap();
    let cid = created["conversation_id"].as_i64().unwrap();

    for i in 0..5 {
        let token = if i % 2 == 0 { &token1 } else { &token2 };
        let resp = send_message(&base_url, token, cid, &format!("m{}", i)).await;
        assert_eq!(resp.status(), 201);
        let sent: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(sent["data"]["body"], format!("m{}", i));
    }

    let page: serde_json::Value = history(&base_url, &token2, cid, "").await.json().await.unwrap();
    let bodies: Vec<&str> = page["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["body"].as_str().unwrap())
        .collect();
    assert_eq!(bodies, vec!["m0", "m1", "m2", "m3", "m4"]);

    // Newest two, still oldest first.
    let page: serde_json::Value = history(&base_url, &token1, cid, "?limit=2")
        .await
        .json()
        .await
        .unwrap();
    let data = page["data"].as_array().unwrap();
    assert_eq!(data.len(), 2);
    assert_eq!(data[0]["body"], "m3");
    assert_eq!(data[1]["body"], "m4");

    // The page before m3.
    let before = data[0]["id"].as_i64().unwrap();
    let page: serde_json::Value = history(&base_url, &token1, cid, &format!("?limit=2&before_id={}", before))
        .await
        .json()
        .await
        .unwrap();
    let bodies: Vec<&str> = page["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["body"].as_str().unwrap())
        .collect();
    assert_eq!(bodies, vec!["m1", "m2"]);
}

#[tokio::test]
async fn test_membership_is_enforced() {
    let base_url = start_test_server().await;
    let (token1, _) = register_and_login(&base_url, "Alice").await;
    let (_, user2) = register_and_login(&base_url, "Bob").await;
    let (token3, _) = register_and_login(&base_url, "Mallory").await;

    let created: serde_json::Value = create_direct(&base_url, &token1, user2)
        .await
        .json()
        .await
        .unwrap();
    let cid = created["conversation_id"].as_i64().unwrap();

    assert_eq!(history(&base_url, &token3, cid, "").await.status(), 403);
    assert_eq!(send_message(&base_url, &token3, cid, "let me in").await.status(), 403);

    assert_eq!(history(&base_url, &token1, 9999, "").await.status(), 404);
    assert_eq!(send_message(&base_url, &token1, 9999, "hello").await.status(), 404);
}

#[tokio::test]
async fn test_empty_message_rejected() {
    let base_url = start_test_server().await;
    let (token1, _) = register_and_login(&base_url, "Alice").await;
    let (_, user2) = register_and_login(&base_url, "Bob").await;

    let created: serde_json::Value = create_direct(&base_url, &token1, user2)
        .await
        .json()
        .await
        .unwrap();
    let cid = created["conversation_id"].as_i64().unwrap();

    assert_eq!(send_message(&base_url, &token1, cid, "   ").await.status(), 400);

    let page: serde_json::Value = history(&base_url, &token1, cid, "").await.json().await.unwrap();
    assert!(page["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_malformed_paging_falls_back_to_defaults() {
    let base_url = start_test_server().await;
    let (token1, _) = register_and_login(&base_url, "Alice").await;
    let (_, user2) = register_and_login(&base_url, "Bob").await;

    let created: serde_json::Value = create_direct(&base_url, &token1, user2)
        .await
        .json()
        .await
        .unwrap();
    let cid = created["conversation_id"].as_i64().unwrap();

    for i in 0..35 {
        let resp = send_message(&base_url, &token1, cid, &format!("m{}", i)).await;
        assert_eq!(resp.status(), 201);
    }

    for query in [
        "?limit=abc",
        "?limit=-1",
        "?limit=500",
        "?limit=0",
        "?before_id=nope",
        "?limit=abc&before_id=-7",
    ] {
        let resp = history(&base_url, &token1, cid, query).await;
        assert_eq!(resp.status(), 200, "query {}", query);
        let page: serde_json::Value = resp.json().await.unwrap();
        let data = page["data"].as_array().unwrap();
        assert_eq!(data.len(), 30, "query {}", query);
        // Default page is the newest 30, oldest first.
        assert_eq!(data[0]["body"], "m5", "query {}", query);
        assert_eq!(data[29]["body"], "m34", "query {}", query);
    }
}

//! HTTP smoke tests against a running server
//!
//! Start the server with a fresh database, then run:
//! `cargo test --test api_tests -- --ignored`

use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use uuid::Uuid;

const BASE_URL: &str = "http://localhost:8080/api/v1";

/// Register a throwaway account and return its token
async fn register(client: &Client) -> String {
    let response = client
        .post(format!("{}/auth/register", BASE_URL))
        .json(&json!({
            "email": format!("smoke-{}@example.com", Uuid::new_v4()),
            "password": "smoke-test-pass",
            "fullName": "Smoke Test"
        }))
        .send()
        .await
        .expect("Failed to send register request");

    assert_eq!(response.status(), StatusCode::CREATED);
    let body: Value = response.json().await.expect("Failed to parse register response");
    body["token"].as_str().expect("No token in response").to_string()
}

#[tokio::test]
#[ignore] // Run with: cargo test -- --ignored
async fn test_health_check() {
    let client = Client::new();

    let response = client
        .get(format!("{}/health", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
#[ignore]
async fn test_register_and_me() {
    let client = Client::new();
    let token = register(&client).await;

    let response = client
        .get(format!("{}/auth/me", BASE_URL))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["role"], "user");
    assert!(body.get("passwordHash").is_none());
}

#[tokio::test]
#[ignore]
async fn test_requires_authentication() {
    let client = Client::new();

    let response = client
        .get(format!("{}/borrowings", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["error"], "NotAuthenticated");
}

#[tokio::test]
#[ignore]
async fn test_settings_defaults() {
    let client = Client::new();

    let response = client
        .get(format!("{}/settings", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["individualBorrowDays"], 30);
    assert_eq!(body["groupBorrowDays"], 180);
}

#[tokio::test]
#[ignore]
async fn test_non_admin_cannot_create_book_or_sweep() {
    let client = Client::new();
    let token = register(&client).await;

    let response = client
        .post(format!("{}/books", BASE_URL))
        .bearer_auth(&token)
        .json(&json!({
            "title": "Smoke",
            "author": "Tester",
            "category": "test",
            "code": Uuid::new_v4().to_string(),
            "price": 10
        }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = client
        .post(format!("{}/admin/sweeps", BASE_URL))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
#[ignore]
async fn test_unknown_book_is_not_found() {
    let client = Client::new();

    let response = client
        .get(format!("{}/books/{}", BASE_URL, Uuid::new_v4()))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

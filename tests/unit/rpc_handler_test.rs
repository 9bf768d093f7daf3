//! Unit tests for the RPC handler: every JSON-RPC method dispatched by `handle_method`.
//!
//! These tests exercise each method through the same code path used by the
//! real `smartmark-rpc` binary, over the embedded backend in memory.

use serde_json::{json, Value};

use smartmark::app::App;
use smartmark::rpc_handler::handle_method;
use smartmark::services::backend::AnyBackend;
use smartmark::services::local_backend::LocalBackend;
use smartmark::types::session::OAuthCallback;
use smartmark::types::settings::AppSettings;

/// Create a fresh App plus the tokens an OAuth redirect for `ada@x.test` would carry.
fn setup() -> (App, OAuthCallback) {
    let backend = LocalBackend::open_in_memory().expect("Failed to open backend");
    let callback = backend.sign_in_as("ada@x.test").expect("Failed to issue tokens");
    let app = App::with_backend(AppSettings::default(), AnyBackend::Local(backend));
    (app, callback)
}

async fn signed_in() -> App {
    let (app, callback) = setup();
    let res = handle_method(&app, "auth.callback", &json!({
        "access_token": callback.access_token,
        "refresh_token": callback.refresh_token,
        "expires_at": callback.expires_at,
    }))
    .await
    .unwrap();
    assert_eq!(res["outcome"], "applied");
    app
}

// ─── Ping ───

#[tokio::test]
async fn test_ping() {
    let (app, _) = setup();
    let res = handle_method(&app, "ping", &json!({})).await.unwrap();
    assert_eq!(res, json!({"pong": true}));
}

// ─── Unknown method ───

#[tokio::test]
async fn test_unknown_method_returns_error() {
    let (app, _) = setup();
    let res = handle_method(&app, "nonexistent.method", &json!({})).await;
    assert!(res.unwrap_err().contains("unknown method"));
}

// ─── View / auth ───

#[tokio::test]
async fn test_view_init_without_session() {
    let (app, _) = setup();
    let res = handle_method(&app, "view.init", &json!({})).await.unwrap();

    assert_eq!(res["outcome"], json!({"skipped": "no_session"}));
    assert_eq!(res["state"]["authenticated"], false);
    assert_eq!(res["state"]["user"], Value::Null);
    assert_eq!(res["state"]["bookmarks"], json!([]));
}

#[tokio::test]
async fn test_auth_sign_in_returns_url() {
    let (app, _) = setup();
    let res = handle_method(&app, "auth.sign_in", &json!({})).await.unwrap();
    let url = res["url"].as_str().unwrap();
    assert!(url.contains("provider=google"));
}

#[tokio::test]
async fn test_auth_callback_requires_access_token() {
    let (app, _) = setup();
    let res = handle_method(&app, "auth.callback", &json!({})).await;
    assert!(res.unwrap_err().contains("missing access_token"));
}

/// The state exposed to the UI names the user but never carries tokens.
#[tokio::test]
async fn test_state_hides_tokens() {
    let app = signed_in().await;
    let state = handle_method(&app, "view.state", &json!({})).await.unwrap();

    assert_eq!(state["authenticated"], true);
    assert_eq!(state["user"]["email"], "ada@x.test");
    let text = state.to_string();
    assert!(!text.contains("access_token"));
    assert!(!text.contains("refresh_token"));
}

#[tokio::test]
async fn test_sign_out() {
    let app = signed_in().await;
    let res = handle_method(&app, "auth.sign_out", &json!({})).await.unwrap();
    assert_eq!(res, json!({"ok": true}));

    let state = handle_method(&app, "view.state", &json!({})).await.unwrap();
    assert_eq!(state["authenticated"], false);
}

// ─── Bookmarks ───

#[tokio::test]
async fn test_bookmark_add_list_delete() {
    let app = signed_in().await;

    let res = handle_method(&app, "bookmark.add", &json!({
        "title": "Docs",
        "url": "https://x.test"
    }))
    .await
    .unwrap();
    assert_eq!(res["outcome"], "applied");

    let list = handle_method(&app, "bookmark.list", &json!({})).await.unwrap();
    let arr = list.as_array().unwrap();
    assert_eq!(arr.len(), 1);
    assert_eq!(arr[0]["title"], "Docs");
    assert_eq!(arr[0]["url"], "https://x.test");
    let id = arr[0]["id"].as_str().unwrap().to_string();

    let res = handle_method(&app, "bookmark.delete", &json!({"id": id})).await.unwrap();
    assert_eq!(res["outcome"], "applied");

    let list = handle_method(&app, "bookmark.list", &json!({})).await.unwrap();
    assert_eq!(list, json!([]));
}

#[tokio::test]
async fn test_bookmark_add_missing_params() {
    let app = signed_in().await;
    let res = handle_method(&app, "bookmark.add", &json!({"title": "Docs"})).await;
    assert!(res.unwrap_err().contains("missing url"));
}

#[tokio::test]
async fn test_bookmark_add_empty_title_is_skipped() {
    let app = signed_in().await;
    let res = handle_method(&app, "bookmark.add", &json!({"title": "", "url": "https://x.test"}))
        .await
        .unwrap();
    assert_eq!(res["outcome"], json!({"skipped": "empty_field"}));
}

#[tokio::test]
async fn test_bookmark_add_without_session_is_skipped() {
    let (app, _) = setup();
    let res = handle_method(&app, "bookmark.add", &json!({"title": "Docs", "url": "https://x.test"}))
        .await
        .unwrap();
    assert_eq!(res["outcome"], json!({"skipped": "no_session"}));
}

#[tokio::test]
async fn test_bookmark_refresh() {
    let app = signed_in().await;
    let res = handle_method(&app, "bookmark.refresh", &json!({})).await.unwrap();
    assert_eq!(res["outcome"], "applied");
}

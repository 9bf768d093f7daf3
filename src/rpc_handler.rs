//! RPC method handler for the SmartMark JSON-RPC protocol.
//!
//! Kept apart from `rpc_server.rs` so it can be unit-tested independently.
//! `handle_method` dispatches a method call to the view controller held by the `App`.

use serde_json::{json, Value};

use crate::app::App;
use crate::types::session::{OAuthCallback, Principal};
use crate::types::view::{Outcome, ViewState};

/// Renders the view state for the UI. Tokens never leave the process.
pub fn state_to_json(state: &ViewState) -> Value {
    let user = state.session.as_ref().map(Principal::from);
    json!({
        "authenticated": state.is_authenticated(),
        "user": user,
        "submitting": state.submitting,
        "bookmarks": state.bookmarks,
    })
}

fn outcome_to_json(outcome: Outcome) -> Value {
    serde_json::to_value(outcome).unwrap_or(Value::Null)
}

fn str_param<'a>(params: &'a Value, name: &str) -> Result<&'a str, String> {
    params
        .get(name)
        .and_then(|v| v.as_str())
        .ok_or_else(|| format!("missing {}", name))
}

/// Dispatch a JSON-RPC method call to the appropriate handler.
///
/// Returns `Ok(Value)` on success or `Err(String)` with an error message.
pub async fn handle_method(app: &App, method: &str, params: &Value) -> Result<Value, String> {
    let controller = &app.controller;
    match method {
        "ping" => Ok(json!({"pong": true})),

        // ─── View ───
        "view.init" => {
            let outcome = controller.initialize().await;
            Ok(json!({"outcome": outcome_to_json(outcome), "state": state_to_json(&controller.state())}))
        }
        "view.state" => Ok(state_to_json(&controller.state())),

        // ─── Auth ───
        "auth.sign_in" => {
            let url = controller.sign_in().await.ok_or("sign-in unavailable")?;
            Ok(json!({"url": url}))
        }
        "auth.callback" => {
            let access_token = str_param(params, "access_token")?;
            let callback = OAuthCallback {
                access_token: access_token.to_string(),
                refresh_token: params.get("refresh_token").and_then(|v| v.as_str()).map(str::to_string),
                expires_at: params.get("expires_at").and_then(|v| v.as_i64()),
            };
            let outcome = controller.complete_sign_in(callback).await;
            Ok(json!({"outcome": outcome_to_json(outcome), "state": state_to_json(&controller.state())}))
        }
        "auth.sign_out" => {
            controller.sign_out().await;
            Ok(json!({"ok": true}))
        }

        // ─── Bookmarks ───
        "bookmark.list" => Ok(json!(controller.state().bookmarks)),
        "bookmark.add" => {
            let title = str_param(params, "title")?;
            let url = str_param(params, "url")?;
            let outcome = controller.create_bookmark(title, url).await;
            Ok(json!({"outcome": outcome_to_json(outcome)}))
        }
        "bookmark.delete" => {
            let id = str_param(params, "id")?;
            let outcome = controller.delete_bookmark(id).await;
            Ok(json!({"outcome": outcome_to_json(outcome)}))
        }
        "bookmark.refresh" => {
            let outcome = controller.refresh().await;
            Ok(json!({"outcome": outcome_to_json(outcome)}))
        }

        _ => Err(format!("unknown method: {}", method)),
    }
}

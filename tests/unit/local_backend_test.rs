//! Unit tests for the embedded SQLite backend: identity, row-level ownership
//! and the change feed.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use smartmark::services::backend::Backend;
use smartmark::services::local_backend::{LocalBackend, TOKEN_TTL_SECS};
use smartmark::types::bookmark::NewBookmark;
use smartmark::types::errors::BackendError;
use smartmark::types::event::{ChangeFilter, ChangeKind};
use smartmark::types::session::Session;
use tempfile::TempDir;

fn setup() -> LocalBackend {
    LocalBackend::open_in_memory().expect("Failed to open in-memory backend")
}

fn sign_in(backend: &LocalBackend, email: &str) -> Session {
    let callback = backend.sign_in_as(email).unwrap();
    backend.exchange_callback(&callback).unwrap()
}

fn add(backend: &LocalBackend, session: &Session, title: &str, url: &str) {
    backend
        .insert_bookmark(session, &NewBookmark::new(&session.user_id, title, url))
        .unwrap();
}

/// A clock the test can move forward.
fn manual_clock(start: DateTime<Utc>) -> (Arc<Mutex<DateTime<Utc>>>, smartmark::services::local_backend::Clock) {
    let now = Arc::new(Mutex::new(start));
    let handle = Arc::clone(&now);
    (now, Arc::new(move || *handle.lock().unwrap()))
}

// ─── Identity ───

#[test]
fn test_no_session_before_sign_in() {
    let backend = setup();
    assert!(backend.current_session().unwrap().is_none());
}

#[test]
fn test_exchange_callback_persists_session() {
    let backend = setup();
    let session = sign_in(&backend, "ada@x.test");

    assert_eq!(session.email.as_deref(), Some("ada@x.test"));
    let current = backend.current_session().unwrap().expect("session should be recovered");
    assert_eq!(current, session);
}

#[test]
fn test_unknown_callback_token_is_rejected() {
    let backend = setup();
    let mut callback = backend.sign_in_as("ada@x.test").unwrap();
    callback.access_token = "local.forged".to_string();

    assert!(matches!(backend.exchange_callback(&callback), Err(BackendError::AuthFailed(_))));
    assert!(backend.current_session().unwrap().is_none());
}

#[test]
fn test_sign_out_revokes_token() {
    let backend = setup();
    let session = sign_in(&backend, "ada@x.test");

    backend.sign_out().unwrap();

    assert!(backend.current_session().unwrap().is_none());
    assert!(matches!(
        backend.select_bookmarks(&session, &session.user_id),
        Err(BackendError::NotAuthenticated)
    ));
}

#[test]
fn test_sign_out_without_session_is_ok() {
    let backend = setup();
    assert!(backend.sign_out().is_ok());
}

/// An expired access token is rotated through its refresh token on recovery.
#[test]
fn test_expired_session_is_refreshed() {
    let (now, clock) = manual_clock(Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap());
    let backend = setup().with_clock(clock);
    let session = sign_in(&backend, "ada@x.test");

    *now.lock().unwrap() += chrono::Duration::seconds(TOKEN_TTL_SECS + 1);

    let refreshed = backend.current_session().unwrap().expect("refresh should succeed");
    assert_eq!(refreshed.user_id, session.user_id);
    assert_ne!(refreshed.access_token, session.access_token);
    assert!(
        backend.select_bookmarks(&session, &session.user_id).is_err(),
        "the rotated token must no longer authorize"
    );
    assert!(backend.select_bookmarks(&refreshed, &refreshed.user_id).is_ok());
}

#[test]
fn test_session_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("smartmark.db");
    let session = {
        let backend = LocalBackend::open(&path).unwrap();
        sign_in(&backend, "ada@x.test")
    };

    let backend = LocalBackend::open(&path).unwrap();
    assert_eq!(backend.current_session().unwrap(), Some(session));
}

// ─── Bookmarks ───

#[test]
fn test_insert_then_select_returns_row() {
    let backend = setup();
    let session = sign_in(&backend, "ada@x.test");

    add(&backend, &session, "Docs", "https://x.test");

    let rows = backend.select_bookmarks(&session, &session.user_id).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].title, "Docs");
    assert_eq!(rows[0].url, "https://x.test");
    assert_eq!(rows[0].user_id, session.user_id);
    assert!(!rows[0].id.is_empty());
}

#[test]
fn test_select_orders_newest_first() {
    let (now, clock) = manual_clock(Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap());
    let backend = setup().with_clock(clock);
    let session = sign_in(&backend, "ada@x.test");

    for title in ["first", "second", "third"] {
        add(&backend, &session, title, "https://x.test");
        *now.lock().unwrap() += chrono::Duration::seconds(1);
    }

    let titles: Vec<String> = backend
        .select_bookmarks(&session, &session.user_id)
        .unwrap()
        .into_iter()
        .map(|b| b.title)
        .collect();
    assert_eq!(titles, vec!["third", "second", "first"]);
}

#[test]
fn test_insert_for_another_user_is_refused() {
    let backend = setup();
    let ada = sign_in(&backend, "ada@x.test");
    let bob = sign_in(&backend, "bob@x.test");

    let result = backend.insert_bookmark(&ada, &NewBookmark::new(&bob.user_id, "T", "https://x.test"));

    assert!(matches!(result, Err(BackendError::Constraint(_))));
    assert!(backend.select_bookmarks(&bob, &bob.user_id).unwrap().is_empty());
}

#[test]
fn test_select_never_returns_foreign_rows() {
    let backend = setup();
    let ada = sign_in(&backend, "ada@x.test");
    let bob = sign_in(&backend, "bob@x.test");
    add(&backend, &bob, "Bob's", "https://bob.test");

    assert!(backend.select_bookmarks(&ada, &bob.user_id).unwrap().is_empty());
    assert!(backend.select_bookmarks(&ada, &ada.user_id).unwrap().is_empty());
}

/// Deleting another principal's row is not an error, but nothing is removed.
#[test]
fn test_delete_of_foreign_row_is_silently_ignored() {
    let backend = setup();
    let ada = sign_in(&backend, "ada@x.test");
    let bob = sign_in(&backend, "bob@x.test");
    add(&backend, &bob, "Bob's", "https://bob.test");
    let id = backend.select_bookmarks(&bob, &bob.user_id).unwrap()[0].id.clone();

    backend.delete_bookmark(&ada, &id).unwrap();

    assert_eq!(backend.select_bookmarks(&bob, &bob.user_id).unwrap().len(), 1);
}

#[test]
fn test_delete_own_row() {
    let backend = setup();
    let session = sign_in(&backend, "ada@x.test");
    add(&backend, &session, "Docs", "https://x.test");
    let id = backend.select_bookmarks(&session, &session.user_id).unwrap()[0].id.clone();

    backend.delete_bookmark(&session, &id).unwrap();

    assert!(backend.select_bookmarks(&session, &session.user_id).unwrap().is_empty());
}

#[test]
fn test_delete_unknown_id_is_ok() {
    let backend = setup();
    let session = sign_in(&backend, "ada@x.test");
    assert!(backend.delete_bookmark(&session, "missing").is_ok());
}

// ─── Change feed ───

#[tokio::test]
async fn test_subscription_receives_own_changes_only() {
    let backend = setup();
    let ada = sign_in(&backend, "ada@x.test");
    let bob = sign_in(&backend, "bob@x.test");
    let mut sub = backend.subscribe(&ada, &ChangeFilter::bookmarks_of(&ada.user_id)).unwrap();

    add(&backend, &bob, "Bob's", "https://bob.test");
    add(&backend, &ada, "Ada's", "https://ada.test");

    let event = tokio::time::timeout(Duration::from_secs(1), sub.events.recv())
        .await
        .expect("event should arrive")
        .expect("feed should be open");
    assert_eq!(event.kind, ChangeKind::Insert);
    assert!(sub.events.try_recv().is_err(), "Bob's insert must not reach Ada's feed");
}

#[test]
fn test_delete_publishes_event() {
    let backend = setup();
    let session = sign_in(&backend, "ada@x.test");
    add(&backend, &session, "Docs", "https://x.test");
    let id = backend.select_bookmarks(&session, &session.user_id).unwrap()[0].id.clone();
    let mut sub = backend
        .subscribe(&session, &ChangeFilter::bookmarks_of(&session.user_id))
        .unwrap();

    backend.delete_bookmark(&session, &id).unwrap();

    let event = sub.events.try_recv().expect("delete should be published");
    assert_eq!(event.kind, ChangeKind::Delete);
    assert_eq!(event.bookmark_id.as_deref(), Some(id.as_str()));
}

#[test]
fn test_subscribe_to_foreign_rows_is_refused() {
    let backend = setup();
    let ada = sign_in(&backend, "ada@x.test");
    let bob = sign_in(&backend, "bob@x.test");

    let result = backend.subscribe(&ada, &ChangeFilter::bookmarks_of(&bob.user_id));
    assert!(matches!(result, Err(BackendError::Constraint(_))));
    assert_eq!(backend.subscriber_count(), 0);
}

#[test]
fn test_unsubscribe_releases_subscription() {
    let backend = setup();
    let session = sign_in(&backend, "ada@x.test");
    let sub = backend
        .subscribe(&session, &ChangeFilter::bookmarks_of(&session.user_id))
        .unwrap();
    assert_eq!(backend.subscriber_count(), 1);

    backend.unsubscribe(sub.id);
    assert_eq!(backend.subscriber_count(), 0);
}

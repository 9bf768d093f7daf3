//! Hosted backend for SmartMark.
//!
//! Talks to a Supabase-compatible service over HTTP with a blocking `reqwest`
//! client: GoTrue-style `/auth/v1/*` endpoints for identity and a
//! PostgREST-style `/rest/v1/bookmarks` resource for rows. The session is
//! persisted locally so it survives restarts.
//!
//! The change feed is delivered by a watcher thread per subscription that
//! polls the owner's row ids and emits an event when they differ.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::database::Database;
use crate::services::backend::{Backend, Subscription, SubscriptionId};
use crate::services::change_hub::ChangeHub;
use crate::services::jwt;
use crate::services::session_store::{SessionStore, SessionStoreTrait};
use crate::types::bookmark::{Bookmark, NewBookmark, BOOKMARKS_TABLE};
use crate::types::errors::BackendError;
use crate::types::event::{ChangeEvent, ChangeFilter, ChangeKind};
use crate::types::session::{OAuthCallback, Session};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
struct UserResponse {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_at: Option<i64>,
    #[serde(default)]
    expires_in: Option<i64>,
    user: UserResponse,
}

/// Builds the URL that starts the provider's OAuth redirect flow.
pub fn build_authorize_url(
    base_url: &str,
    provider: &str,
    redirect_to: &str,
) -> Result<String, BackendError> {
    let endpoint = format!("{}/auth/v1/authorize", base_url.trim_end_matches('/'));
    let query = [("provider", provider), ("redirect_to", redirect_to)];
    let url = reqwest::Url::parse_with_params(&endpoint, &query)
        .map_err(|e| BackendError::Serialization(format!("invalid backend url: {}", e)))?;
    Ok(url.to_string())
}

/// Classifies a change between two polls of the owner's row ids: the set grew,
/// shrank, or kept its size with different members. `None` when nothing changed.
pub fn diff_kind(prev: &[String], next: &[String]) -> Option<ChangeKind> {
    if prev == next {
        return None;
    }
    Some(match next.len().cmp(&prev.len()) {
        std::cmp::Ordering::Greater => ChangeKind::Insert,
        std::cmp::Ordering::Less => ChangeKind::Delete,
        std::cmp::Ordering::Equal => ChangeKind::Update,
    })
}

/// Maps a non-success HTTP status to the error taxonomy.
pub fn map_status(status: StatusCode, body: &str) -> BackendError {
    match status.as_u16() {
        401 if body.contains("expired") => BackendError::SessionExpired,
        401 => BackendError::NotAuthenticated,
        400 | 403 | 404 | 409 | 422 => BackendError::Constraint(format!("{}: {}", status, body)),
        _ => BackendError::Network(format!("{}: {}", status, body)),
    }
}

/// On identity endpoints a rejected request means the credentials are bad.
fn as_auth_error(err: BackendError) -> BackendError {
    match err {
        BackendError::Constraint(msg) => BackendError::AuthFailed(msg),
        other => other,
    }
}

/// Cheap-to-clone HTTP client shared with watcher threads.
#[derive(Clone)]
struct RestClient {
    base_url: String,
    anon_key: String,
    http: Client,
}

impl RestClient {
    fn request(&self, method: Method, path: &str, token: Option<&str>) -> RequestBuilder {
        let url = format!("{}{}", self.base_url.trim_end_matches('/'), path);
        self.http
            .request(method, url)
            .header("apikey", &self.anon_key)
            .bearer_auth(token.unwrap_or(&self.anon_key))
    }

    fn check(resp: Response) -> Result<Response, BackendError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().unwrap_or_default();
        Err(map_status(status, &body))
    }

    fn fetch_user(&self, access_token: &str) -> Result<UserResponse, BackendError> {
        let resp = self.request(Method::GET, "/auth/v1/user", Some(access_token)).send()?;
        let user = Self::check(resp).map_err(as_auth_error)?.json::<UserResponse>()?;
        Ok(user)
    }

    fn refresh(&self, session: &Session) -> Result<Session, BackendError> {
        let refresh_token = session.refresh_token.as_deref().ok_or(BackendError::SessionExpired)?;
        let resp = self
            .request(Method::POST, "/auth/v1/token", None)
            .query(&[("grant_type", "refresh_token")])
            .json(&json!({ "refresh_token": refresh_token }))
            .send()?;
        let token = Self::check(resp).map_err(as_auth_error)?.json::<TokenResponse>()?;

        let now = chrono::Utc::now().timestamp();
        let expires_at = token
            .expires_at
            .or_else(|| token.expires_in.map(|secs| now + secs))
            .or_else(|| jwt::expiry_of(&token.access_token));
        Ok(Session {
            user_id: token.user.id,
            email: token.user.email.or_else(|| session.email.clone()),
            access_token: token.access_token,
            refresh_token: token.refresh_token.or_else(|| session.refresh_token.clone()),
            expires_at,
        })
    }

    fn select(&self, access_token: &str, user_id: &str) -> Result<Vec<Bookmark>, BackendError> {
        let owner = format!("eq.{}", user_id);
        let resp = self
            .request(Method::GET, "/rest/v1/bookmarks", Some(access_token))
            .query(&[("select", "*"), ("user_id", owner.as_str()), ("order", "created_at.desc")])
            .send()?;
        let rows = Self::check(resp)?.json::<Vec<Bookmark>>()?;
        Ok(rows)
    }
}

/// Backend backed by a hosted service.
pub struct RestBackend {
    client: RestClient,
    sessions: SessionStore,
    hub: Arc<ChangeHub>,
    watchers: Mutex<HashMap<SubscriptionId, Arc<AtomicBool>>>,
    poll_interval: Duration,
}

impl RestBackend {
    /// Creates a backend for the service at `base_url`. `db` holds the persisted session.
    ///
    /// Must not be called from inside an async runtime: the blocking client owns one.
    pub fn new(
        base_url: &str,
        anon_key: &str,
        db: Database,
        poll_interval: Duration,
    ) -> Result<Self, BackendError> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client: RestClient {
                base_url: base_url.to_string(),
                anon_key: anon_key.to_string(),
                http,
            },
            sessions: SessionStore::new(db.into_shared()),
            hub: Arc::new(ChangeHub::new()),
            watchers: Mutex::new(HashMap::new()),
            poll_interval,
        })
    }

    /// Polls `user_id`'s row ids with `session`'s token until `stop` is set.
    /// A rejected token ends the watcher with one last event, so the reload it
    /// triggers renews the session and subscribes again.
    fn spawn_watcher(
        &self,
        id: SubscriptionId,
        session: Session,
        user_id: String,
        stop: Arc<AtomicBool>,
    ) -> Result<(), BackendError> {
        let client = self.client.clone();
        let hub = Arc::clone(&self.hub);
        let interval = self.poll_interval;

        thread::Builder::new()
            .name(format!("smartmark-feed-{}", id))
            .spawn(move || {
                let mut last: Option<Vec<String>> = None;
                while !stop.load(Ordering::Relaxed) {
                    match client.select(&session.access_token, &user_id) {
                        Ok(rows) => {
                            let ids: Vec<String> = rows.into_iter().map(|b| b.id).collect();
                            let kind = last.as_deref().and_then(|prev| diff_kind(prev, &ids));
                            if let Some(kind) = kind {
                                if !hub.notify(id, ChangeEvent::new(kind, None)) {
                                    break;
                                }
                            }
                            last = Some(ids);
                        }
                        Err(e @ (BackendError::SessionExpired | BackendError::NotAuthenticated)) => {
                            warn!(id, error = %e, "change feed token rejected");
                            hub.notify(id, ChangeEvent::new(ChangeKind::Update, None));
                            break;
                        }
                        Err(e) => warn!(id, error = %e, "change feed poll failed"),
                    }
                    thread::sleep(interval);
                }
                debug!(id, "change feed watcher stopped");
            })
            .map_err(|e| {
                BackendError::Network(format!("failed to start change feed watcher: {}", e))
            })?;
        Ok(())
    }
}

impl Backend for RestBackend {
    fn current_session(&self) -> Result<Option<Session>, BackendError> {
        let Some(mut session) = self.sessions.load()? else {
            return Ok(None);
        };

        let now = chrono::Utc::now().timestamp();
        let expires_at = session.expires_at.or_else(|| jwt::expiry_of(&session.access_token));
        if jwt::is_expiring(expires_at, now) {
            match self.client.refresh(&session) {
                Ok(refreshed) => {
                    debug!(user_id = %refreshed.user_id, "refreshed expiring session");
                    session = refreshed;
                    self.sessions.save(&session)?;
                }
                Err(BackendError::AuthFailed(_) | BackendError::SessionExpired | BackendError::NotAuthenticated) => {
                    self.sessions.clear()?;
                    return Ok(None);
                }
                Err(e) => return Err(e),
            }
        }

        match self.client.fetch_user(&session.access_token) {
            Ok(user) => {
                if user.id != session.user_id || (user.email.is_some() && user.email != session.email) {
                    session.user_id = user.id;
                    session.email = user.email.or(session.email);
                    self.sessions.save(&session)?;
                }
                Ok(Some(session))
            }
            Err(BackendError::AuthFailed(_) | BackendError::SessionExpired | BackendError::NotAuthenticated) => {
                self.sessions.clear()?;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn authorize_url(&self, provider: &str, redirect_to: &str) -> Result<String, BackendError> {
        build_authorize_url(&self.client.base_url, provider, redirect_to)
    }

    fn exchange_callback(&self, callback: &OAuthCallback) -> Result<Session, BackendError> {
        let user = self.client.fetch_user(&callback.access_token)?;
        jwt::check_subject(&callback.access_token, &user.id)?;
        let session = Session {
            user_id: user.id,
            email: user.email,
            access_token: callback.access_token.clone(),
            refresh_token: callback.refresh_token.clone(),
            expires_at: callback.expires_at.or_else(|| jwt::expiry_of(&callback.access_token)),
        };
        self.sessions.save(&session)?;
        info!(user_id = %session.user_id, "signed in");
        Ok(session)
    }

    fn sign_out(&self) -> Result<(), BackendError> {
        if let Some(session) = self.sessions.load()? {
            let result = self
                .client
                .request(Method::POST, "/auth/v1/logout", Some(&session.access_token))
                .send()
                .map_err(BackendError::from)
                .and_then(RestClient::check);
            // The local session is dropped even if the server call fails.
            if let Err(e) = result {
                debug!(error = %e, "remote logout failed");
            }
        }
        self.sessions.clear()
    }

    fn insert_bookmark(&self, session: &Session, row: &NewBookmark) -> Result<(), BackendError> {
        let resp = self
            .client
            .request(Method::POST, "/rest/v1/bookmarks", Some(&session.access_token))
            .header("Prefer", "return=minimal")
            .json(&[row])
            .send()?;
        RestClient::check(resp)?;
        Ok(())
    }

    fn delete_bookmark(&self, session: &Session, id: &str) -> Result<(), BackendError> {
        let target = format!("eq.{}", id);
        let resp = self
            .client
            .request(Method::DELETE, "/rest/v1/bookmarks", Some(&session.access_token))
            .query(&[("id", target.as_str())])
            .send()?;
        RestClient::check(resp)?;
        Ok(())
    }

    fn select_bookmarks(&self, session: &Session, user_id: &str) -> Result<Vec<Bookmark>, BackendError> {
        self.client.select(&session.access_token, user_id)
    }

    fn subscribe(&self, session: &Session, filter: &ChangeFilter) -> Result<Subscription, BackendError> {
        if filter.table != BOOKMARKS_TABLE {
            return Err(BackendError::Unsupported(format!("change feed for table {}", filter.table)));
        }
        let subscription = self.hub.subscribe(filter.clone());
        let stop = Arc::new(AtomicBool::new(false));
        let watcher = self.spawn_watcher(
            subscription.id,
            session.clone(),
            filter.user_id.clone(),
            Arc::clone(&stop),
        );
        if let Err(e) = watcher {
            self.hub.unsubscribe(subscription.id);
            return Err(e);
        }
        self.watchers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(subscription.id, stop);
        Ok(subscription)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        let stop = self
            .watchers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&id);
        if let Some(stop) = stop {
            stop.store(true, Ordering::Relaxed);
        }
        self.hub.unsubscribe(id);
    }
}

impl Drop for RestBackend {
    fn drop(&mut self) {
        let watchers = self.watchers.get_mut().unwrap_or_else(|poisoned| poisoned.into_inner());
        for stop in watchers.values() {
            stop.store(true, Ordering::Relaxed);
        }
    }
}

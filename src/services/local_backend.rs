//! Embedded backend for SmartMark.
//!
//! Implements `Backend` on top of SQLite via `rusqlite`: an identity provider
//! that issues opaque tokens, the `bookmarks` table with row-level filtering
//! by owner, and an in-process change feed. Used for offline runs and tests.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};
use uuid::Uuid;

use crate::database::connection::{self, Database, SharedDatabase};
use crate::services::backend::{Backend, Subscription, SubscriptionId};
use crate::services::change_hub::ChangeHub;
use crate::services::session_store::{SessionStore, SessionStoreTrait};
use crate::types::bookmark::{Bookmark, NewBookmark, BOOKMARKS_TABLE};
use crate::types::errors::BackendError;
use crate::types::event::{ChangeEvent, ChangeFilter, ChangeKind};
use crate::types::session::{OAuthCallback, Session};

/// Lifetime of an issued access token.
pub const TOKEN_TTL_SECS: i64 = 3600;

const AUTHORIZE_ENDPOINT: &str = "smartmark://local/authorize";

/// Source of the current time. Injected so ordering can be tested deterministically.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Backend backed by a local SQLite database.
pub struct LocalBackend {
    db: SharedDatabase,
    sessions: SessionStore,
    hub: ChangeHub,
    clock: Clock,
}

impl LocalBackend {
    /// Opens (or creates) the backend database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, BackendError> {
        Ok(Self::from_database(Database::open(path)?))
    }

    pub fn open_in_memory() -> Result<Self, BackendError> {
        Ok(Self::from_database(Database::open_in_memory()?))
    }

    pub fn from_database(db: Database) -> Self {
        let db = db.into_shared();
        Self {
            sessions: SessionStore::new(Arc::clone(&db)),
            db,
            hub: ChangeHub::new(),
            clock: Arc::new(Utc::now),
        }
    }

    /// Replaces the clock used for `created_at` and token expiry.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    /// Plays the identity provider: signs `email` in (creating the user on
    /// first use) and returns the tokens the OAuth redirect would carry.
    pub fn sign_in_as(&self, email: &str) -> Result<OAuthCallback, BackendError> {
        if email.trim().is_empty() {
            return Err(BackendError::AuthFailed("email is required".to_string()));
        }
        let now = self.now().timestamp();
        let db = connection::lock(&self.db)?;
        let conn = db.connection();

        conn.execute(
            "INSERT OR IGNORE INTO users (id, email, created_at) VALUES (?1, ?2, ?3)",
            params![Uuid::new_v4().to_string(), email, now],
        )?;
        let user_id: String = conn.query_row(
            "SELECT id FROM users WHERE email = ?1",
            params![email],
            |row| row.get(0),
        )?;

        let (access_token, refresh_token, expires_at) = Self::issue_tokens(conn, &user_id, now)?;
        info!(%user_id, "issued local tokens");
        Ok(OAuthCallback {
            access_token,
            refresh_token: Some(refresh_token),
            expires_at: Some(expires_at),
        })
    }

    /// Number of live change feed subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.hub.subscriber_count()
    }

    fn issue_tokens(
        conn: &Connection,
        user_id: &str,
        now: i64,
    ) -> Result<(String, String, i64), BackendError> {
        let access_token = format!("local.{}", Uuid::new_v4().simple());
        let refresh_token = Uuid::new_v4().simple().to_string();
        let expires_at = now + TOKEN_TTL_SECS;
        conn.execute(
            "INSERT INTO auth_tokens (access_token, refresh_token, user_id, expires_at) VALUES (?1, ?2, ?3, ?4)",
            params![access_token, refresh_token, user_id, expires_at],
        )?;
        Ok((access_token, refresh_token, expires_at))
    }

    /// Resolves the principal behind a session's access token (`auth.uid()`).
    fn authorize(&self, conn: &Connection, session: &Session) -> Result<String, BackendError> {
        let row: Option<(String, i64)> = conn
            .query_row(
                "SELECT user_id, expires_at FROM auth_tokens WHERE access_token = ?1 AND revoked = 0",
                params![session.access_token],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            None => Err(BackendError::NotAuthenticated),
            Some((_, expires_at)) if expires_at <= self.now().timestamp() => Err(BackendError::SessionExpired),
            Some((user_id, _)) => Ok(user_id),
        }
    }

    /// Rotates an expired session using its refresh token.
    fn refresh(&self, session: &Session) -> Result<Session, BackendError> {
        let refresh_token = session.refresh_token.as_deref().ok_or(BackendError::SessionExpired)?;
        let now = self.now().timestamp();
        let db = connection::lock(&self.db)?;
        let conn = db.connection();

        let user_id: Option<String> = conn
            .query_row(
                "SELECT user_id FROM auth_tokens WHERE refresh_token = ?1 AND revoked = 0",
                params![refresh_token],
                |row| row.get(0),
            )
            .optional()?;
        let user_id = user_id.ok_or(BackendError::SessionExpired)?;

        conn.execute(
            "UPDATE auth_tokens SET revoked = 1 WHERE refresh_token = ?1",
            params![refresh_token],
        )?;
        let (access_token, refresh_token, expires_at) = Self::issue_tokens(conn, &user_id, now)?;
        Ok(Session {
            user_id,
            email: session.email.clone(),
            access_token,
            refresh_token: Some(refresh_token),
            expires_at: Some(expires_at),
        })
    }

    fn row_to_bookmark(row: &rusqlite::Row) -> rusqlite::Result<Bookmark> {
        let micros: i64 = row.get(4)?;
        let created_at = DateTime::<Utc>::from_timestamp_micros(micros)
            .ok_or(rusqlite::Error::IntegralValueOutOfRange(4, micros))?;
        Ok(Bookmark {
            id: row.get(0)?,
            user_id: row.get(1)?,
            title: row.get(2)?,
            url: row.get(3)?,
            created_at,
        })
    }
}

impl Backend for LocalBackend {
    fn current_session(&self) -> Result<Option<Session>, BackendError> {
        let Some(stored) = self.sessions.load()? else {
            return Ok(None);
        };

        let validated = {
            let db = connection::lock(&self.db)?;
            self.authorize(db.connection(), &stored)
        };

        match validated {
            Ok(_) => Ok(Some(stored)),
            Err(BackendError::SessionExpired) => match self.refresh(&stored) {
                Ok(session) => {
                    debug!(user_id = %session.user_id, "refreshed expired session");
                    self.sessions.save(&session)?;
                    Ok(Some(session))
                }
                Err(BackendError::SessionExpired) => {
                    self.sessions.clear()?;
                    Ok(None)
                }
                Err(e) => Err(e),
            },
            Err(BackendError::NotAuthenticated) => {
                self.sessions.clear()?;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn authorize_url(&self, provider: &str, redirect_to: &str) -> Result<String, BackendError> {
        let url = reqwest::Url::parse_with_params(
            AUTHORIZE_ENDPOINT,
            &[("provider", provider), ("redirect_to", redirect_to)],
        )
        .map_err(|e| BackendError::Serialization(e.to_string()))?;
        Ok(url.to_string())
    }

    fn exchange_callback(&self, callback: &OAuthCallback) -> Result<Session, BackendError> {
        let row: Option<(String, String, String, i64)> = {
            let db = connection::lock(&self.db)?;
            db.connection()
                .query_row(
                    "SELECT t.user_id, u.email, t.refresh_token, t.expires_at \
                     FROM auth_tokens t JOIN users u ON u.id = t.user_id \
                     WHERE t.access_token = ?1 AND t.revoked = 0",
                    params![callback.access_token],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
                )
                .optional()?
        };

        let (user_id, email, refresh_token, expires_at) =
            row.ok_or_else(|| BackendError::AuthFailed("unknown access token".to_string()))?;
        if expires_at <= self.now().timestamp() {
            return Err(BackendError::SessionExpired);
        }

        let session = Session {
            user_id,
            email: Some(email),
            access_token: callback.access_token.clone(),
            refresh_token: Some(refresh_token),
            expires_at: Some(expires_at),
        };
        self.sessions.save(&session)?;
        Ok(session)
    }

    fn sign_out(&self) -> Result<(), BackendError> {
        if let Some(session) = self.sessions.load()? {
            let db = connection::lock(&self.db)?;
            db.connection().execute(
                "UPDATE auth_tokens SET revoked = 1 WHERE access_token = ?1",
                params![session.access_token],
            )?;
        }
        self.sessions.clear()
    }

    fn insert_bookmark(&self, session: &Session, row: &NewBookmark) -> Result<(), BackendError> {
        let id = Uuid::new_v4().to_string();
        let owner = {
            let db = connection::lock(&self.db)?;
            let conn = db.connection();
            let uid = self.authorize(conn, session)?;
            if row.user_id != uid {
                return Err(BackendError::Constraint(format!(
                    "new row violates row-level security policy for table \"{}\"",
                    BOOKMARKS_TABLE
                )));
            }
            conn.execute(
                "INSERT INTO bookmarks (id, user_id, title, url, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, row.user_id, row.title, row.url, self.now().timestamp_micros()],
            )?;
            uid
        };

        self.hub.publish(BOOKMARKS_TABLE, &owner, &ChangeEvent::new(ChangeKind::Insert, Some(&id)));
        Ok(())
    }

    fn delete_bookmark(&self, session: &Session, id: &str) -> Result<(), BackendError> {
        let (owner, affected) = {
            let db = connection::lock(&self.db)?;
            let conn = db.connection();
            let uid = self.authorize(conn, session)?;
            let affected = conn.execute(
                "DELETE FROM bookmarks WHERE id = ?1 AND user_id = ?2",
                params![id, uid],
            )?;
            (uid, affected)
        };

        if affected > 0 {
            self.hub.publish(BOOKMARKS_TABLE, &owner, &ChangeEvent::new(ChangeKind::Delete, Some(id)));
        }
        Ok(())
    }

    fn select_bookmarks(&self, session: &Session, user_id: &str) -> Result<Vec<Bookmark>, BackendError> {
        let db = connection::lock(&self.db)?;
        let conn = db.connection();
        let uid = self.authorize(conn, session)?;

        let mut stmt = conn.prepare(
            "SELECT id, user_id, title, url, created_at FROM bookmarks \
             WHERE user_id = ?1 AND user_id = ?2 ORDER BY created_at DESC, seq ASC",
        )?;
        let rows = stmt.query_map(params![user_id, uid], Self::row_to_bookmark)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    fn subscribe(&self, session: &Session, filter: &ChangeFilter) -> Result<Subscription, BackendError> {
        let uid = {
            let db = connection::lock(&self.db)?;
            self.authorize(db.connection(), session)?
        };
        if filter.user_id != uid {
            return Err(BackendError::Constraint(
                "subscription filter reaches rows of another principal".to_string(),
            ));
        }
        let subscription = self.hub.subscribe(filter.clone());
        debug!(id = subscription.id, user_id = %uid, "change feed subscribed");
        Ok(subscription)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        if self.hub.unsubscribe(id) {
            debug!(id, "change feed released");
        }
    }
}

//! Persisted client session.
//!
//! Keeps the signed-in session in the `client_session` table (a single
//! `'default'` row) so a restart can recover it.

use rusqlite::params;

use crate::database::connection::{self, SharedDatabase};
use crate::types::errors::BackendError;
use crate::types::session::Session;

/// Trait defining persisted session operations.
pub trait SessionStoreTrait {
    fn save(&self, session: &Session) -> Result<(), BackendError>;
    fn load(&self) -> Result<Option<Session>, BackendError>;
    fn clear(&self) -> Result<(), BackendError>;
}

/// Session store backed by SQLite.
pub struct SessionStore {
    db: SharedDatabase,
}

impl SessionStore {
    pub fn new(db: SharedDatabase) -> Self {
        Self { db }
    }
}

impl SessionStoreTrait for SessionStore {
    fn save(&self, session: &Session) -> Result<(), BackendError> {
        let now = chrono::Utc::now().timestamp();
        let db = connection::lock(&self.db)?;
        db.connection().execute(
            "INSERT OR REPLACE INTO client_session (id, user_id, email, access_token, refresh_token, expires_at, updated_at) \
             VALUES ('default', ?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                session.user_id,
                session.email,
                session.access_token,
                session.refresh_token,
                session.expires_at,
                now
            ],
        )?;
        Ok(())
    }

    fn load(&self) -> Result<Option<Session>, BackendError> {
        let db = connection::lock(&self.db)?;
        let result = db.connection().query_row(
            "SELECT user_id, email, access_token, refresh_token, expires_at FROM client_session WHERE id = 'default'",
            [],
            |row| {
                Ok(Session {
                    user_id: row.get(0)?,
                    email: row.get(1)?,
                    access_token: row.get(2)?,
                    refresh_token: row.get(3)?,
                    expires_at: row.get(4)?,
                })
            },
        );

        match result {
            Ok(session) => Ok(Some(session)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn clear(&self) -> Result<(), BackendError> {
        let db = connection::lock(&self.db)?;
        db.connection().execute("DELETE FROM client_session", [])?;
        Ok(())
    }
}

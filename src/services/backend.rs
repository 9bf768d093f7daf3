//! The managed-backend contract the view controller is written against.
//!
//! A backend bundles three collaborators: the identity provider (sessions),
//! the `bookmarks` table with row-level filtering by owner, and a change
//! feed scoped to one owner's rows.

use tokio::sync::mpsc;

use crate::services::local_backend::LocalBackend;
use crate::services::rest_backend::RestBackend;
use crate::types::bookmark::{Bookmark, NewBookmark};
use crate::types::errors::BackendError;
use crate::types::event::{ChangeEvent, ChangeFilter};
use crate::types::session::{OAuthCallback, Session};

/// Identifier of a live change feed subscription.
pub type SubscriptionId = u64;

/// A live change feed. Events arrive until the backend is told to
/// [`Backend::unsubscribe`] or the backend goes away.
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub events: mpsc::UnboundedReceiver<ChangeEvent>,
}

/// Trait defining the backend operations consumed by the view.
///
/// Methods are blocking; async callers run them on a blocking thread.
pub trait Backend: Send + Sync + 'static {
    /// Recovers the persisted session, refreshing it if needed. `Ok(None)` when signed out.
    fn current_session(&self) -> Result<Option<Session>, BackendError>;
    /// URL that starts the OAuth redirect flow with `provider`.
    fn authorize_url(&self, provider: &str, redirect_to: &str) -> Result<String, BackendError>;
    /// Validates the tokens from the OAuth redirect and persists the session.
    fn exchange_callback(&self, callback: &OAuthCallback) -> Result<Session, BackendError>;
    /// Terminates the persisted session.
    fn sign_out(&self) -> Result<(), BackendError>;
    fn insert_bookmark(&self, session: &Session, row: &NewBookmark) -> Result<(), BackendError>;
    /// Deletes a row by id. Rows the principal does not own are left untouched.
    fn delete_bookmark(&self, session: &Session, id: &str) -> Result<(), BackendError>;
    /// All rows owned by `user_id`, newest first.
    fn select_bookmarks(&self, session: &Session, user_id: &str) -> Result<Vec<Bookmark>, BackendError>;
    fn subscribe(&self, session: &Session, filter: &ChangeFilter) -> Result<Subscription, BackendError>;
    /// Releases a subscription. Unknown ids are ignored.
    fn unsubscribe(&self, id: SubscriptionId);
}

/// The backend selected by configuration.
pub enum AnyBackend {
    Local(LocalBackend),
    Remote(RestBackend),
}

macro_rules! delegate {
    ($self:ident, $b:ident => $call:expr) => {
        match $self {
            AnyBackend::Local($b) => $call,
            AnyBackend::Remote($b) => $call,
        }
    };
}

impl Backend for AnyBackend {
    fn current_session(&self) -> Result<Option<Session>, BackendError> {
        delegate!(self, b => b.current_session())
    }

    fn authorize_url(&self, provider: &str, redirect_to: &str) -> Result<String, BackendError> {
        delegate!(self, b => b.authorize_url(provider, redirect_to))
    }

    fn exchange_callback(&self, callback: &OAuthCallback) -> Result<Session, BackendError> {
        delegate!(self, b => b.exchange_callback(callback))
    }

    fn sign_out(&self) -> Result<(), BackendError> {
        delegate!(self, b => b.sign_out())
    }

    fn insert_bookmark(&self, session: &Session, row: &NewBookmark) -> Result<(), BackendError> {
        delegate!(self, b => b.insert_bookmark(session, row))
    }

    fn delete_bookmark(&self, session: &Session, id: &str) -> Result<(), BackendError> {
        delegate!(self, b => b.delete_bookmark(session, id))
    }

    fn select_bookmarks(&self, session: &Session, user_id: &str) -> Result<Vec<Bookmark>, BackendError> {
        delegate!(self, b => b.select_bookmarks(session, user_id))
    }

    fn subscribe(&self, session: &Session, filter: &ChangeFilter) -> Result<Subscription, BackendError> {
        delegate!(self, b => b.subscribe(session, filter))
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        delegate!(self, b => b.unsubscribe(id))
    }
}
